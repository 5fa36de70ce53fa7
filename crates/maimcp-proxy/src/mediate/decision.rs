//! Interactive decision sources.
//!
//! The dispatch core asks a [`DecisionSource`] what to do when a gated call
//! misses the permission cache. The default source talks to the controlling
//! terminal; tests (and embedders) substitute [`ScriptedDecisions`]. The
//! exact prompt wording is deliberately unspecified; only the option sets
//! matter.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::error::{ProxyError, ProxyResult};

/// Operator decision for a gated tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolDecision {
    /// Forward this one call
    AllowOnce,
    /// Refuse this one call
    DenyOnce,
    /// Forward this tool forever
    AlwaysAllow,
    /// Forward this tool with exactly these arguments forever
    AlwaysAllowWithArgs,
    /// Refuse this tool forever
    NeverAllow,
    /// Forward every gated call forever (flips the process into yolo mode)
    AllowAll,
    /// Open the modification dialog
    Modify,
    /// Answer the caller with this text instead of forwarding
    Custom(String),
}

/// Operator decision when the requested tool does not resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissingToolDecision {
    /// Report not-found to the caller
    NotFound,
    /// Answer the caller with this text
    Custom(String),
    /// Browse the catalog, then open the modification dialog
    Modify,
    /// Answer with guidance text steering the caller to other tools
    Guide(String),
    /// Report not-found now and for every future miss of this identifier
    AlwaysNotFound,
}

/// Operator decision for a gated prompt fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptDecision {
    /// Forward this one fetch
    AllowOnce,
    /// Refuse this one fetch
    DenyOnce,
    /// Forward this prompt forever
    AlwaysAllow,
    /// Refuse this prompt forever
    NeverAllow,
    /// Answer the caller with this text instead of forwarding
    Custom(String),
}

/// Injectable source of interactive decisions.
#[async_trait]
pub trait DecisionSource: Send + Sync {
    /// Decide a gated tool call.
    async fn decide_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: &Value,
    ) -> ProxyResult<ToolDecision>;

    /// Decide what to answer for an unresolvable tool identifier.
    /// `catalog` lists the aggregated tool names currently available.
    async fn decide_missing_tool(
        &self,
        ident: &str,
        catalog: &[String],
    ) -> ProxyResult<MissingToolDecision>;

    /// Decide a gated prompt fetch.
    async fn decide_prompt(
        &self,
        server: &str,
        prompt: &str,
        arguments: &Value,
    ) -> ProxyResult<PromptDecision>;

    /// Read one modification-dialog line.
    async fn read_modification(&self) -> ProxyResult<String>;
}

/// Default decision source: the controlling terminal.
pub struct TerminalDecisions;

impl TerminalDecisions {
    async fn prompt_line(&self, text: &str) -> ProxyResult<String> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(text.as_bytes()).await?;
        stdout.flush().await?;
        let mut line = String::new();
        let mut reader = BufReader::new(tokio::io::stdin());
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(ProxyError::transport("terminal closed".to_owned()));
        }
        Ok(line.trim().to_owned())
    }
}

#[async_trait]
impl DecisionSource for TerminalDecisions {
    async fn decide_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: &Value,
    ) -> ProxyResult<ToolDecision> {
        loop {
            let answer = self
                .prompt_line(&format!(
                    "\n{server}::{tool} {arguments}\n\
                     [y]es once  [n]o once  [a]lways  always with these ar[g]s  \
                     ne[v]er  [Y] all tools  [m]odify  [c]ustom response > "
                ))
                .await?;
            return Ok(match answer.as_str() {
                "y" => ToolDecision::AllowOnce,
                "n" => ToolDecision::DenyOnce,
                "a" => ToolDecision::AlwaysAllow,
                "g" => ToolDecision::AlwaysAllowWithArgs,
                "v" => ToolDecision::NeverAllow,
                "Y" => ToolDecision::AllowAll,
                "m" => ToolDecision::Modify,
                "c" => ToolDecision::Custom(self.prompt_line("response > ").await?),
                _ => continue,
            });
        }
    }

    async fn decide_missing_tool(
        &self,
        ident: &str,
        catalog: &[String],
    ) -> ProxyResult<MissingToolDecision> {
        loop {
            let answer = self
                .prompt_line(&format!(
                    "\ntool '{ident}' not found\n\
                     [n]ot found  [c]ustom response  [b]rowse and modify  \
                     [g]uide the caller  [N] always not found > "
                ))
                .await?;
            return Ok(match answer.as_str() {
                "n" => MissingToolDecision::NotFound,
                "c" => MissingToolDecision::Custom(self.prompt_line("response > ").await?),
                "b" => {
                    let mut stdout = tokio::io::stdout();
                    for name in catalog {
                        stdout.write_all(format!("  {name}\n").as_bytes()).await?;
                    }
                    stdout.flush().await?;
                    MissingToolDecision::Modify
                }
                "g" => MissingToolDecision::Guide(self.prompt_line("guidance > ").await?),
                "N" => MissingToolDecision::AlwaysNotFound,
                _ => continue,
            });
        }
    }

    async fn decide_prompt(
        &self,
        server: &str,
        prompt: &str,
        arguments: &Value,
    ) -> ProxyResult<PromptDecision> {
        loop {
            let answer = self
                .prompt_line(&format!(
                    "\nprompt {server}::{prompt} {arguments}\n\
                     [y]es once  [n]o once  [a]lways  ne[v]er  [c]ustom response > "
                ))
                .await?;
            return Ok(match answer.as_str() {
                "y" => PromptDecision::AllowOnce,
                "n" => PromptDecision::DenyOnce,
                "a" => PromptDecision::AlwaysAllow,
                "v" => PromptDecision::NeverAllow,
                "c" => PromptDecision::Custom(self.prompt_line("response > ").await?),
                _ => continue,
            });
        }
    }

    async fn read_modification(&self) -> ProxyResult<String> {
        self.prompt_line("modify ({\"name\":..,\"arguments\":..} | name k=v .. | cancel) > ")
            .await
    }
}

/// Scripted decision source for tests and non-terminal embeddings: answers
/// are popped from per-kind queues.
#[derive(Default)]
pub struct ScriptedDecisions {
    tools: Mutex<VecDeque<ToolDecision>>,
    missing: Mutex<VecDeque<MissingToolDecision>>,
    prompts: Mutex<VecDeque<PromptDecision>>,
    modifications: Mutex<VecDeque<String>>,
}

impl ScriptedDecisions {
    /// Empty script; any consultation fails.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a tool decision.
    pub fn push_tool(self, decision: ToolDecision) -> Self {
        self.tools.lock().push_back(decision);
        self
    }

    /// Queue a missing-tool decision.
    pub fn push_missing(self, decision: MissingToolDecision) -> Self {
        self.missing.lock().push_back(decision);
        self
    }

    /// Queue a prompt decision.
    pub fn push_prompt(self, decision: PromptDecision) -> Self {
        self.prompts.lock().push_back(decision);
        self
    }

    /// Queue a modification-dialog line.
    pub fn push_modification(self, line: impl Into<String>) -> Self {
        self.modifications.lock().push_back(line.into());
        self
    }
}

#[async_trait]
impl DecisionSource for ScriptedDecisions {
    async fn decide_tool(&self, _: &str, _: &str, _: &Value) -> ProxyResult<ToolDecision> {
        self.tools
            .lock()
            .pop_front()
            .ok_or_else(|| ProxyError::protocol("no scripted tool decision"))
    }

    async fn decide_missing_tool(
        &self,
        _: &str,
        _: &[String],
    ) -> ProxyResult<MissingToolDecision> {
        self.missing
            .lock()
            .pop_front()
            .ok_or_else(|| ProxyError::protocol("no scripted missing-tool decision"))
    }

    async fn decide_prompt(&self, _: &str, _: &str, _: &Value) -> ProxyResult<PromptDecision> {
        self.prompts
            .lock()
            .pop_front()
            .ok_or_else(|| ProxyError::protocol("no scripted prompt decision"))
    }

    async fn read_modification(&self) -> ProxyResult<String> {
        self.modifications
            .lock()
            .pop_front()
            .ok_or_else(|| ProxyError::protocol("no scripted modification"))
    }
}
