//! Capability registry: the process-wide map of supervised upstreams.
//!
//! Aggregated views are produced on demand by walking the map under its
//! read lock and copying descriptors with the `server::name` prefix
//! applied. The map is keyed by upstream name in a `BTreeMap`, so every
//! aggregated view lists upstreams in ascending name order and clients see
//! a stable catalog across unrelated calls.

use std::collections::BTreeMap;
use std::sync::Arc;

use maimcp_protocol::{PromptDescriptor, ResourceDescriptor, ToolDescriptor};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{error, info};

use crate::config::{ProxyConfig, ServerConfig};
use crate::error::ProxyResult;
use crate::upstream::Upstream;

/// Separator between a server prefix and a capability name in aggregated
/// identifiers.
pub const SEPARATOR: &str = "::";

/// Join a server name and a bare capability name into an aggregated
/// identifier.
pub fn qualified(server: &str, name: &str) -> String {
    format!("{server}{SEPARATOR}{name}")
}

/// Per-upstream summary for status listings.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamStatus {
    /// Upstream name
    pub name: String,
    /// Command line or URL
    pub command: String,
    /// Advertised tool count
    pub tools: usize,
    /// Advertised prompt count
    pub prompts: usize,
    /// Advertised resource count
    pub resources: usize,
}

/// The process-wide upstream registry.
pub struct Registry {
    upstreams: RwLock<BTreeMap<String, Arc<Upstream>>>,
    skip_prompts: bool,
}

impl Registry {
    /// Create an empty registry.
    pub fn new(skip_prompts: bool) -> Self {
        Self {
            upstreams: RwLock::new(BTreeMap::new()),
            skip_prompts,
        }
    }

    /// Whether prompt loading and the prompt capability are suppressed.
    pub fn skip_prompts(&self) -> bool {
        self.skip_prompts
    }

    /// Connect one upstream and register it.
    pub async fn start_server(&self, name: &str, config: ServerConfig) -> ProxyResult<()> {
        let upstream = Upstream::connect(name, config, self.skip_prompts).await?;
        info!(
            server = %name,
            tools = upstream.tools.read().len(),
            prompts = upstream.prompts.read().len(),
            resources = upstream.resources.read().len(),
            "registered upstream"
        );
        self.upstreams.write().insert(name.to_owned(), upstream);
        Ok(())
    }

    /// Start every enabled server in the configuration. Individual failures
    /// are logged and skipped; returns the number of upstreams registered.
    pub async fn start_all(&self, config: &ProxyConfig) -> usize {
        let mut started = 0;
        for (name, server) in config.enabled_servers() {
            match self.start_server(name, server.clone()).await {
                Ok(()) => started += 1,
                Err(e) => error!(server = %name, "failed to start: {e}"),
            }
        }
        started
    }

    /// Register an already-connected upstream.
    pub(crate) fn insert(&self, upstream: Arc<Upstream>) {
        self.upstreams
            .write()
            .insert(upstream.name().to_owned(), upstream);
    }

    /// Look up one upstream by name.
    pub fn get(&self, name: &str) -> Option<Arc<Upstream>> {
        self.upstreams.read().get(name).cloned()
    }

    /// Snapshot of all upstreams in ascending name order.
    pub fn all(&self) -> Vec<Arc<Upstream>> {
        self.upstreams.read().values().cloned().collect()
    }

    /// Stop one upstream and remove its record. Both of its background
    /// tasks have completed by the time the record is gone.
    pub async fn stop_server(&self, name: &str) -> bool {
        let upstream = self.upstreams.read().get(name).cloned();
        match upstream {
            Some(upstream) => {
                upstream.stop().await;
                self.upstreams.write().remove(name);
                true
            }
            None => false,
        }
    }

    /// Stop every upstream, then clear the registry.
    pub async fn stop_all_servers(&self) {
        let upstreams = self.all();
        for upstream in upstreams {
            upstream.stop().await;
        }
        self.upstreams.write().clear();
    }

    /// Aggregated tool catalog with `server::name` identifiers.
    pub fn aggregated_tools(&self) -> Vec<ToolDescriptor> {
        let mut out = Vec::new();
        for (name, upstream) in self.upstreams.read().iter() {
            for tool in upstream.tools.read().iter() {
                out.push(tool.with_name(qualified(name, &tool.name)));
            }
        }
        out
    }

    /// Aggregated prompt catalog with `server::name` identifiers.
    pub fn aggregated_prompts(&self) -> Vec<PromptDescriptor> {
        let mut out = Vec::new();
        for (name, upstream) in self.upstreams.read().iter() {
            for prompt in upstream.prompts.read().iter() {
                out.push(prompt.with_name(qualified(name, &prompt.name)));
            }
        }
        out
    }

    /// Aggregated resource catalog with `server::uri` identifiers.
    pub fn aggregated_resources(&self) -> Vec<ResourceDescriptor> {
        let mut out = Vec::new();
        for (name, upstream) in self.upstreams.read().iter() {
            for resource in upstream.resources.read().iter() {
                out.push(resource.with_uri(qualified(name, &resource.uri)));
            }
        }
        out
    }

    /// Status summary, one row per upstream in ascending name order.
    pub fn status(&self) -> Vec<UpstreamStatus> {
        self.upstreams
            .read()
            .values()
            .map(|u| UpstreamStatus {
                name: u.name().to_owned(),
                command: u.descriptor(),
                tools: u.tools.read().len(),
                prompts: u.prompts.read().len(),
                resources: u.resources.read().len(),
            })
            .collect()
    }
}
