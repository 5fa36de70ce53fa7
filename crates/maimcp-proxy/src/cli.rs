//! Command-line flags for the proxy binary.

use clap::Parser;
use std::path::PathBuf;

use crate::config::Options;

/// Aggregating MCP proxy.
#[derive(Debug, Parser)]
#[command(name = "maimcp-proxy", version, about)]
pub struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Inline JSON configuration document
    #[arg(short = 'C', long = "config-json")]
    pub config_json: Option<String>,

    /// Never load prompts and advertise no prompt capability
    #[arg(short = 'p', long = "skip-prompts")]
    pub skip_prompts: bool,

    /// Bypass interactive permission prompts
    #[arg(long)]
    pub yolo: bool,

    /// Permissive name matching and positional argument rebinding
    #[arg(long)]
    pub drunk: bool,

    /// Verbose logging
    #[arg(long)]
    pub debug: bool,

    /// Refuse gated calls instead of prompting the terminal
    #[arg(long = "non-interactive")]
    pub non_interactive: bool,

    /// Append an execution report to this path
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Downstream bind address
    #[arg(long = "base-url")]
    pub base_url: Option<String>,
}

impl Cli {
    /// Fold the flags into configuration options; flags win over the
    /// configuration document.
    pub fn apply(&self, options: &mut Options) {
        options.yolo |= self.yolo;
        options.drunk |= self.drunk;
        options.debug |= self.debug;
        options.non_interactive |= self.non_interactive;
        options.skip_prompts |= self.skip_prompts;
        if let Some(report) = &self.report {
            options.report = Some(report.clone());
        }
        if let Some(base_url) = &self.base_url {
            options.base_url = base_url.clone();
        }
    }
}
