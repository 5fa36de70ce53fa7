//! Aggregating MCP proxy engine.
//!
//! The engine supervises a heterogeneous fleet of upstream MCP servers
//! (stdio subprocesses, HTTP endpoints, SSE-bootstrapped endpoints), merges
//! their tools, prompts, and resources into one `server::name` namespace,
//! and exposes that namespace through a downstream MCP endpoint and a REST
//! facade. Gated calls pass through an interactive mediation layer with an
//! in-memory permission cache; completed calls can be appended to a
//! structured report.
//!
//! Component layering, leaves first: transport drivers ([`transport`]), the
//! upstream supervisor ([`upstream`]), the capability registry
//! ([`registry`]), name resolution ([`resolve`]), mediation ([`mediate`]),
//! the dispatch core ([`dispatch`]), the HTTP surfaces ([`server`]), and
//! the report sink ([`report`]).

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod mediate;
pub mod registry;
pub mod report;
pub mod resolve;
pub mod server;
pub mod transport;
pub mod upstream;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::ProxyConfig;
pub use dispatch::{Dispatcher, RuntimeFlags};
pub use error::{MediationError, ProxyError, ProxyResult, ResolveError};
pub use registry::Registry;
pub use report::ReportSink;
pub use server::{router, AppState};
