//! Configuration model and loading.
//!
//! One JSON document describes the upstream fleet and the process-level
//! options. The same document is accepted inline (`-C`), through the
//! `MAI_AGENT_CONFIG` environment variable, or from a file (`-c PATH`); when
//! none of those are present the loader falls back to the MAI client
//! configuration at `~/.config/mai/mcps.json` (a bare server map with a
//! per-server `enabled` flag), and finally to an empty fleet.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{ProxyError, ProxyResult};

/// Default downstream bind address.
pub const DEFAULT_BASE_URL: &str = "127.0.0.1:8080";

/// Environment variable carrying an inline configuration document.
pub const CONFIG_ENV_VAR: &str = "MAI_AGENT_CONFIG";

/// Upstream transport kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Local subprocess speaking line-delimited JSON-RPC over stdio
    #[default]
    Stdio,
    /// Remote HTTP endpoint, one POST per request
    Http,
    /// SSE endpoint that yields the real HTTP endpoint on first contact
    Sse,
}

/// One upstream server entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Transport kind
    #[serde(rename = "type", default)]
    pub kind: TransportKind,
    /// Executable for stdio upstreams
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Arguments for stdio upstreams
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Extra environment for stdio upstreams
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Endpoint URL for http/sse upstreams
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Optional allow-list of tool names; when present, enumeration drops
    /// every tool not named here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow: Option<Vec<String>>,
    /// Disabled entries are skipped at startup (MAI client format)
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl ServerConfig {
    /// Human-readable command line or URL for status listings.
    pub fn descriptor(&self) -> String {
        match self.kind {
            TransportKind::Stdio => {
                let mut parts = vec![self.command.clone().unwrap_or_default()];
                parts.extend(self.args.iter().cloned());
                parts.join(" ")
            }
            TransportKind::Http | TransportKind::Sse => self.url.clone().unwrap_or_default(),
        }
    }

    /// Validate that the entry carries what its transport needs.
    pub fn validate(&self, name: &str) -> ProxyResult<()> {
        match self.kind {
            TransportKind::Stdio if self.command.as_deref().unwrap_or("").is_empty() => Err(
                ProxyError::configuration(format!("server '{name}': stdio entry needs a command")),
            ),
            TransportKind::Http | TransportKind::Sse
                if self.url.as_deref().unwrap_or("").is_empty() =>
            {
                Err(ProxyError::configuration(format!(
                    "server '{name}': {} entry needs a url",
                    if self.kind == TransportKind::Http {
                        "http"
                    } else {
                        "sse"
                    }
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Process-level options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Options {
    /// Bind address for the downstream HTTP surfaces
    pub base_url: String,
    /// Bypass interactive permission prompts entirely
    pub yolo: bool,
    /// Permissive name matching plus positional argument rebinding
    pub drunk: bool,
    /// Verbose logging
    pub debug: bool,
    /// Refuse instead of prompting on the terminal
    pub non_interactive: bool,
    /// Append a structured execution report to this path
    pub report: Option<PathBuf>,
    /// Never load prompts and advertise no prompt capability
    pub skip_prompts: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            yolo: false,
            drunk: false,
            debug: false,
            non_interactive: false,
            report: None,
            skip_prompts: false,
        }
    }
}

/// Full proxy configuration: the fleet plus the options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Upstreams keyed by logical name
    pub servers: BTreeMap<String, ServerConfig>,
    /// Process-level options
    #[serde(flatten)]
    pub options: Options,
}

impl ProxyConfig {
    /// Parse a configuration document.
    pub fn from_json(doc: &str) -> ProxyResult<Self> {
        let config: Self = serde_json::from_str(doc)
            .map_err(|e| ProxyError::configuration(format!("invalid configuration: {e}")))?;
        for (name, server) in &config.servers {
            server.validate(name)?;
        }
        Ok(config)
    }

    /// Read a configuration file.
    pub fn from_file(path: &Path) -> ProxyResult<Self> {
        let doc = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&doc)
    }

    /// Parse the MAI client configuration format: a bare
    /// `{"mcpServers": {...}}` map with per-server `enabled` flags and no
    /// process options.
    pub fn from_mai_json(doc: &str) -> ProxyResult<Self> {
        #[derive(Deserialize)]
        struct MaiConfig {
            #[serde(rename = "mcpServers", default)]
            mcp_servers: BTreeMap<String, ServerConfig>,
        }
        let mai: MaiConfig = serde_json::from_str(doc)
            .map_err(|e| ProxyError::configuration(format!("invalid MAI configuration: {e}")))?;
        let config = Self {
            servers: mai.mcp_servers,
            options: Options::default(),
        };
        for (name, server) in &config.servers {
            server.validate(name)?;
        }
        Ok(config)
    }

    /// Enabled servers only, in name order.
    pub fn enabled_servers(&self) -> impl Iterator<Item = (&String, &ServerConfig)> {
        self.servers.iter().filter(|(_, s)| s.enabled)
    }
}

/// Resolve the configuration from its sources, in precedence order:
/// inline document, `MAI_AGENT_CONFIG`, explicit file path, the MAI client
/// file, empty.
pub fn load(inline: Option<&str>, file: Option<&Path>) -> ProxyResult<ProxyConfig> {
    if let Some(doc) = inline {
        return ProxyConfig::from_json(doc);
    }
    if let Ok(doc) = std::env::var(CONFIG_ENV_VAR) {
        if !doc.trim().is_empty() {
            return ProxyConfig::from_json(&doc);
        }
    }
    if let Some(path) = file {
        return ProxyConfig::from_file(path);
    }
    if let Some(path) = mai_config_path() {
        if path.exists() {
            let doc = std::fs::read_to_string(&path).map_err(|e| {
                ProxyError::configuration(format!("cannot read {}: {e}", path.display()))
            })?;
            return ProxyConfig::from_mai_json(&doc);
        }
    }
    Ok(ProxyConfig::default())
}

/// `~/.config/mai/mcps.json`
fn mai_config_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config/mai/mcps.json"))
}

/// Name of the environment variable holding the bearer token for an HTTP
/// upstream: `MAI_MCP_AUTH_` plus the host, uppercased, with `.` and `-`
/// replaced by `_`.
pub fn auth_env_var(host: &str) -> String {
    let mangled: String = host
        .chars()
        .map(|c| match c {
            '.' | '-' => '_',
            other => other.to_ascii_uppercase(),
        })
        .collect();
    format!("MAI_MCP_AUTH_{mangled}")
}

/// Bearer token for an upstream URL, if its host has one configured in the
/// environment.
pub fn auth_token_for_url(raw_url: &str) -> Option<String> {
    let parsed = url::Url::parse(raw_url).ok()?;
    let host = parsed.host_str()?;
    std::env::var(auth_env_var(host)).ok().filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn full_document_round_trip() {
        let config = ProxyConfig::from_json(
            r#"{
                "servers": {
                    "files": {"command": "mcp-files", "args": ["--root", "/tmp"]},
                    "remote": {"type": "http", "url": "https://api.example.com/mcp"},
                    "events": {"type": "sse", "url": "https://api.example.com/sse", "enabled": false}
                },
                "baseUrl": "127.0.0.1:9000",
                "drunk": true,
                "report": "/tmp/report.json"
            }"#,
        )
        .unwrap();
        assert_eq!(config.servers.len(), 3);
        assert_eq!(config.options.base_url, "127.0.0.1:9000");
        assert!(config.options.drunk);
        assert!(!config.options.yolo);
        assert_eq!(config.enabled_servers().count(), 2);
        assert_eq!(
            config.servers["files"].descriptor(),
            "mcp-files --root /tmp"
        );
    }

    #[test]
    fn stdio_without_command_is_rejected() {
        let err = ProxyConfig::from_json(r#"{"servers": {"bad": {}}}"#).unwrap_err();
        assert!(err.to_string().contains("needs a command"));
    }

    #[test]
    fn http_without_url_is_rejected() {
        let err =
            ProxyConfig::from_json(r#"{"servers": {"bad": {"type": "http"}}}"#).unwrap_err();
        assert!(err.to_string().contains("needs a url"));
    }

    #[test]
    fn mai_format_respects_enabled_flag() {
        let config = ProxyConfig::from_mai_json(
            r#"{
                "mcpServers": {
                    "notes": {"command": "mcp-notes", "enabled": false},
                    "files": {"command": "mcp-files"}
                }
            }"#,
        )
        .unwrap();
        let enabled: Vec<_> = config.enabled_servers().map(|(n, _)| n.as_str()).collect();
        assert_eq!(enabled, vec!["files"]);
    }

    #[test]
    fn inline_takes_precedence_over_file() {
        let config = load(Some(r#"{"servers": {}, "yolo": true}"#), None).unwrap();
        assert!(config.options.yolo);
    }

    #[test]
    fn auth_env_var_mangling() {
        assert_eq!(auth_env_var("api.example-host.com"), "MAI_MCP_AUTH_API_EXAMPLE_HOST_COM");
    }
}
