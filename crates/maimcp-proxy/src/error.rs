//! Error types for the proxy engine.
//!
//! The engine distinguishes the failure domains the facades need to map
//! onto HTTP statuses and JSON-RPC codes: transport failures, upstream RPC
//! errors, embedded tool errors, name resolution failures, mediation
//! refusals, and protocol violations.

use thiserror::Error;

/// Result type for proxy operations
pub type ProxyResult<T> = std::result::Result<T, ProxyError>;

/// Name resolution failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// No upstream provides the capability
    #[error("{kind} '{name}' not found on any server")]
    NotFound {
        /// Capability kind ("tool", "prompt", "resource")
        kind: &'static str,
        /// Requested identifier
        name: String,
    },

    /// More than one upstream provides the capability
    #[error("{kind} '{name}' is available on multiple servers; prefix with server name")]
    Ambiguous {
        /// Capability kind
        kind: &'static str,
        /// Requested identifier
        name: String,
    },

    /// The `server::` prefix does not name a registered upstream
    #[error("unknown server '{server}'")]
    UnknownServer {
        /// Requested server prefix
        server: String,
    },
}

/// Mediation refusal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediationError {
    /// The permission cache or the operator denied the call
    #[error("tool execution rejected by user policy")]
    Denied,

    /// The operator cancelled the call from the modification dialog
    #[error("call cancelled by user")]
    Cancelled,

    /// Interactive mediation was required but the process runs
    /// non-interactively
    #[error("interactive approval required but running non-interactive")]
    NonInteractive,
}

/// Main error type for the proxy engine.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProxyError {
    /// I/O failure, deadline exceeded, or process exited while talking to an
    /// upstream
    #[error("transport error: {0}")]
    Transport(String),

    /// The upstream returned a JSON-RPC error; surfaced unchanged
    #[error("upstream error {code}: {message}")]
    Rpc {
        /// Upstream error code
        code: i32,
        /// Upstream error message
        message: String,
    },

    /// The upstream returned a success envelope carrying an embedded error
    #[error("tool error: {0}")]
    Tool(String),

    /// Unknown, ambiguous, or prefix-mismatched identifier
    #[error("{0}")]
    Resolution(#[from] ResolveError),

    /// Rejected by policy, cancelled, or prevented by non-interactive mode
    #[error("{0}")]
    Mediation(#[from] MediationError),

    /// Invalid JSON, batch request, missing method, bad params
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Invalid proxy configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProxyError {
    /// Transport-level failure with context.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Protocol violation with context.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Configuration failure with context.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// JSON-RPC error code this failure maps to on the MCP facade.
    pub fn rpc_code(&self) -> i32 {
        match self {
            Self::Rpc { code, .. } => *code,
            Self::Protocol(_) => maimcp_protocol::JsonRpcErrorCode::InvalidRequest.code(),
            _ => maimcp_protocol::JsonRpcErrorCode::ServerError.code(),
        }
    }

    /// Message carried to the caller. RPC errors keep the upstream's own
    /// wording.
    pub fn caller_message(&self) -> String {
        match self {
            Self::Rpc { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}
