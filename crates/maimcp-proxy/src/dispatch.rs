//! Dispatch core: resolve, gate, reshape, forward, interpret, record.
//!
//! Both facades (the MCP endpoint and the REST routes) funnel every gated
//! call through this one path, so mediation and drunk-mode reshaping cannot
//! diverge between them. The arguments that reach an upstream are either
//! exactly the ones supplied or the ones produced by the modification
//! dialog, never a silent mutation (drunk-mode rebinding is opt-in and
//! scoped to `tools/call`).

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use maimcp_protocol::{GetPromptResult, PromptMessage, ToolCallResult};
use parking_lot::RwLock;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::{MediationError, ProxyError, ProxyResult, ResolveError};
use crate::mediate::{
    parse_modification, reshape_arguments, DecisionSource, MissingToolDecision, Modification,
    PermissionCache, PromptDecision, ToolDecision,
};
use crate::registry::Registry;
use crate::report::ReportSink;
use crate::resolve::{resolve, Kind, Resolved};

/// Process-wide runtime switches. Yolo is atomic because a
/// permit-all-forever decision flips it at runtime.
pub struct RuntimeFlags {
    yolo: AtomicBool,
    /// Permissive matching plus positional rebinding
    pub drunk: bool,
    /// Refuse instead of prompting
    pub non_interactive: bool,
    /// Prompts are never loaded or advertised
    pub skip_prompts: bool,
}

impl RuntimeFlags {
    /// Build from configuration options.
    pub fn new(yolo: bool, drunk: bool, non_interactive: bool, skip_prompts: bool) -> Self {
        Self {
            yolo: AtomicBool::new(yolo),
            drunk,
            non_interactive,
            skip_prompts,
        }
    }

    /// Whether permission prompts are bypassed.
    pub fn yolo(&self) -> bool {
        self.yolo.load(Ordering::Relaxed)
    }

    /// Bypass permission prompts from now on.
    pub fn set_yolo(&self) {
        self.yolo.store(true, Ordering::Relaxed);
    }
}

/// Result of a dispatched tool call: the raw structured result for native
/// consumers and the flattened text (with pagination footer) for plain-text
/// consumers.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    /// Upstream result, verbatim
    pub raw: Value,
    /// Flattened `content` text
    pub text: String,
}

impl ToolOutcome {
    fn synthesized(text: String) -> Self {
        Self {
            raw: json!({"content": [{"type": "text", "text": text}]}),
            text,
        }
    }
}

enum Gate {
    Proceed,
    Custom(String),
    Modify,
}

/// Executes resolved calls against the registry.
pub struct Dispatcher {
    registry: Arc<Registry>,
    permissions: Arc<PermissionCache>,
    decisions: Arc<dyn DecisionSource>,
    report: Arc<ReportSink>,
    flags: Arc<RuntimeFlags>,
    /// Identifiers the operator chose to always answer not-found for
    always_not_found: RwLock<HashSet<String>>,
}

impl Dispatcher {
    /// Assemble the dispatch core.
    pub fn new(
        registry: Arc<Registry>,
        permissions: Arc<PermissionCache>,
        decisions: Arc<dyn DecisionSource>,
        report: Arc<ReportSink>,
        flags: Arc<RuntimeFlags>,
    ) -> Self {
        Self {
            registry,
            permissions,
            decisions,
            report,
            flags,
            always_not_found: RwLock::new(HashSet::new()),
        }
    }

    /// Runtime switches.
    pub fn flags(&self) -> &RuntimeFlags {
        &self.flags
    }

    /// Execute a tool call end to end.
    pub async fn call_tool(&self, ident: &str, arguments: Value) -> ProxyResult<ToolOutcome> {
        let mut ident = ident.to_owned();
        let mut arguments = ensure_object(arguments);
        let mut modified = false;

        loop {
            if self.always_not_found.read().contains(&ident) {
                return Err(ResolveError::NotFound {
                    kind: "tool",
                    name: ident,
                }
                .into());
            }

            let resolved = match resolve(&self.registry, Kind::Tool, &ident, self.flags.drunk) {
                Ok(resolved) => resolved,
                Err(err @ ResolveError::NotFound { .. })
                    if !self.flags.non_interactive && !self.flags.yolo() =>
                {
                    match self.handle_missing_tool(&ident, err).await? {
                        Retry::Done(outcome) => return Ok(outcome),
                        Retry::Again { name, args } => {
                            if modified {
                                return Err(MediationError::Cancelled.into());
                            }
                            modified = true;
                            ident = name;
                            arguments = ensure_object(args);
                            continue;
                        }
                    }
                }
                Err(err) => return Err(err.into()),
            };

            match self.gate_tool(&resolved, &arguments).await? {
                Gate::Proceed => {}
                Gate::Custom(text) => return Ok(ToolOutcome::synthesized(text)),
                Gate::Modify => {
                    // The resolver and the gate re-run once after a
                    // modification; a second modification is refused.
                    if modified {
                        return Err(MediationError::Cancelled.into());
                    }
                    let line = self.decisions.read_modification().await?;
                    match parse_modification(&line)? {
                        Modification::Cancel => return Err(MediationError::Cancelled.into()),
                        Modification::Call { name, arguments: args } => {
                            modified = true;
                            ident = name;
                            arguments = ensure_object(args);
                            continue;
                        }
                    }
                }
            }

            let forwarded = if self.flags.drunk {
                let params = resolved.upstream.tool_params(&resolved.name);
                reshape_arguments(&arguments, &params)
            } else {
                arguments
            };
            return self.forward_tool(&resolved, forwarded).await;
        }
    }

    async fn handle_missing_tool(&self, ident: &str, err: ResolveError) -> ProxyResult<Retry> {
        let catalog: Vec<String> = self
            .registry
            .aggregated_tools()
            .into_iter()
            .map(|t| t.name)
            .collect();
        match self.decisions.decide_missing_tool(ident, &catalog).await? {
            MissingToolDecision::NotFound => Err(err.into()),
            MissingToolDecision::Custom(text) => Ok(Retry::Done(ToolOutcome::synthesized(text))),
            MissingToolDecision::Guide(text) => Ok(Retry::Done(ToolOutcome::synthesized(text))),
            MissingToolDecision::Modify => {
                let line = self.decisions.read_modification().await?;
                match parse_modification(&line)? {
                    Modification::Cancel => Err(MediationError::Cancelled.into()),
                    Modification::Call { name, arguments } => {
                        Ok(Retry::Again { name, args: arguments })
                    }
                }
            }
            MissingToolDecision::AlwaysNotFound => {
                self.always_not_found.write().insert(ident.to_owned());
                Err(err.into())
            }
        }
    }

    async fn gate_tool(&self, resolved: &Resolved, arguments: &Value) -> ProxyResult<Gate> {
        match self.permissions.lookup(&resolved.name, arguments) {
            Some(true) => return Ok(Gate::Proceed),
            Some(false) => return Err(MediationError::Denied.into()),
            None => {}
        }
        if self.flags.yolo() {
            return Ok(Gate::Proceed);
        }
        if self.flags.non_interactive {
            return Err(MediationError::NonInteractive.into());
        }
        let decision = self
            .decisions
            .decide_tool(resolved.upstream.name(), &resolved.name, arguments)
            .await?;
        debug!(tool = %resolved.name, ?decision, "interactive decision");
        Ok(match decision {
            ToolDecision::AllowOnce => Gate::Proceed,
            ToolDecision::DenyOnce => return Err(MediationError::Denied.into()),
            ToolDecision::AlwaysAllow => {
                self.permissions.set_name(&resolved.name, true);
                Gate::Proceed
            }
            ToolDecision::AlwaysAllowWithArgs => {
                self.permissions.set_with_args(&resolved.name, arguments, true);
                Gate::Proceed
            }
            ToolDecision::NeverAllow => {
                self.permissions.set_name(&resolved.name, false);
                return Err(MediationError::Denied.into());
            }
            ToolDecision::AllowAll => {
                self.permissions.allow_all();
                self.flags.set_yolo();
                Gate::Proceed
            }
            ToolDecision::Modify => Gate::Modify,
            ToolDecision::Custom(text) => Gate::Custom(text),
        })
    }

    async fn forward_tool(&self, resolved: &Resolved, arguments: Value) -> ProxyResult<ToolOutcome> {
        let server = resolved.upstream.name().to_owned();
        let params = json!({"name": resolved.name, "arguments": arguments});
        let raw = match resolved.upstream.rpc("tools/call", params).await {
            Ok(raw) => raw,
            Err(e) => {
                self.report
                    .append(&server, &resolved.name, &arguments, Err(&e.to_string()));
                return Err(e);
            }
        };
        let decoded: ToolCallResult = serde_json::from_value(raw.clone())
            .map_err(|e| ProxyError::protocol(format!("undecodable tool result: {e}")))?;
        if decoded.is_error {
            let text = decoded.flatten_text();
            self.report
                .append(&server, &resolved.name, &arguments, Err(&text));
            return Err(ProxyError::Tool(text));
        }
        let mut text = decoded.flatten_text();
        if let Some(footer) = decoded.pagination_footer() {
            if !text.is_empty() {
                text.push_str("\n\n");
            }
            text.push_str(&footer);
        }
        self.report
            .append(&server, &resolved.name, &arguments, Ok(&text));
        Ok(ToolOutcome { raw, text })
    }

    /// Fetch a prompt end to end. Returns the raw `prompts/get` result.
    pub async fn get_prompt(&self, ident: &str, arguments: Value) -> ProxyResult<Value> {
        let arguments = ensure_object(arguments);
        let resolved = resolve(&self.registry, Kind::Prompt, ident, self.flags.drunk)?;

        match self.permissions.lookup(&resolved.name, &arguments) {
            Some(true) => {}
            Some(false) => return Err(MediationError::Denied.into()),
            None => {
                if !self.flags.yolo() {
                    if self.flags.non_interactive {
                        return Err(MediationError::NonInteractive.into());
                    }
                    let decision = self
                        .decisions
                        .decide_prompt(resolved.upstream.name(), &resolved.name, &arguments)
                        .await?;
                    match decision {
                        PromptDecision::AllowOnce => {}
                        PromptDecision::DenyOnce => return Err(MediationError::Denied.into()),
                        PromptDecision::AlwaysAllow => {
                            self.permissions.set_name(&resolved.name, true);
                        }
                        PromptDecision::NeverAllow => {
                            self.permissions.set_name(&resolved.name, false);
                            return Err(MediationError::Denied.into());
                        }
                        PromptDecision::Custom(text) => {
                            return Ok(serde_json::to_value(synthesized_prompt(text))?);
                        }
                    }
                }
            }
        }

        let params = json!({"name": resolved.name, "arguments": arguments});
        resolved.upstream.rpc("prompts/get", params).await
    }

    /// Read a resource end to end. Ungated.
    pub async fn read_resource(&self, ident: &str) -> ProxyResult<Value> {
        let resolved = resolve(&self.registry, Kind::Resource, ident, self.flags.drunk)?;
        let params = json!({"uri": resolved.name});
        resolved.upstream.rpc("resources/read", params).await
    }
}

enum Retry {
    Done(ToolOutcome),
    Again { name: String, args: Value },
}

/// A synthesized single-message prompt result.
pub fn synthesized_prompt(text: String) -> GetPromptResult {
    GetPromptResult {
        description: None,
        messages: vec![PromptMessage::user_text(text)],
    }
}

fn ensure_object(value: Value) -> Value {
    match value {
        Value::Object(_) => value,
        Value::Null => Value::Object(Map::new()),
        other => json!({"value": other}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mediate::ScriptedDecisions;
    use crate::testutil::{upstream_with_driver, upstream_with_tools, MockDriver};
    use pretty_assertions::assert_eq;

    struct Harness {
        registry: Arc<Registry>,
        permissions: Arc<PermissionCache>,
        report: Arc<ReportSink>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                registry: Arc::new(Registry::new(false)),
                permissions: Arc::new(PermissionCache::new()),
                report: Arc::new(ReportSink::in_memory()),
            }
        }

        fn dispatcher(&self, decisions: ScriptedDecisions, flags: RuntimeFlags) -> Dispatcher {
            Dispatcher::new(
                self.registry.clone(),
                self.permissions.clone(),
                Arc::new(decisions),
                self.report.clone(),
                Arc::new(flags),
            )
        }
    }

    fn yolo_flags() -> RuntimeFlags {
        RuntimeFlags::new(true, false, false, false)
    }

    #[tokio::test]
    async fn qualified_call_forwards_bare_name() {
        let harness = Harness::new();
        let driver = MockDriver::new().on(
            "tools/call",
            json!({"content": [{"type": "text", "text": "pong"}]}),
        );
        harness.registry.insert(upstream_with_driver(
            "b",
            &["ping"],
            Arc::new(driver.clone()),
        ));
        harness.registry.insert(upstream_with_tools("a", &["ping"]));

        let dispatcher = harness.dispatcher(ScriptedDecisions::new(), yolo_flags());
        let outcome = dispatcher.call_tool("b::ping", json!({})).await.unwrap();
        assert_eq!(outcome.text, "pong");
        assert_eq!(
            driver.last_params("tools/call").unwrap()["name"],
            json!("ping")
        );
    }

    #[tokio::test]
    async fn ambiguous_bare_name_fails_without_contacting_upstreams() {
        let harness = Harness::new();
        harness.registry.insert(upstream_with_tools("a", &["ping"]));
        harness.registry.insert(upstream_with_tools("b", &["ping"]));
        let dispatcher = harness.dispatcher(ScriptedDecisions::new(), yolo_flags());
        let err = dispatcher.call_tool("ping", json!({})).await.unwrap_err();
        assert_eq!(
            err.caller_message(),
            "tool 'ping' is available on multiple servers; prefix with server name"
        );
    }

    #[tokio::test]
    async fn cached_denial_refuses_before_forwarding() {
        let harness = Harness::new();
        let driver = MockDriver::new().on("tools/call", json!({"content": []}));
        harness.registry.insert(upstream_with_driver(
            "u",
            &["dangerous"],
            Arc::new(driver.clone()),
        ));
        harness.permissions.set_name("dangerous", false);

        let dispatcher = harness.dispatcher(ScriptedDecisions::new(), yolo_flags());
        let err = dispatcher
            .call_tool("dangerous", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProxyError::Mediation(MediationError::Denied)
        ));
        assert!(!driver.was_called("tools/call"));
    }

    #[tokio::test]
    async fn non_interactive_miss_is_refused() {
        let harness = Harness::new();
        harness.registry.insert(upstream_with_tools("u", &["t"]));
        let flags = RuntimeFlags::new(false, false, true, false);
        let dispatcher = harness.dispatcher(ScriptedDecisions::new(), flags);
        let err = dispatcher.call_tool("t", json!({})).await.unwrap_err();
        assert!(matches!(
            err,
            ProxyError::Mediation(MediationError::NonInteractive)
        ));
    }

    #[tokio::test]
    async fn allow_all_decision_flips_yolo() {
        let harness = Harness::new();
        let driver = MockDriver::new().on("tools/call", json!({"content": []}));
        harness
            .registry
            .insert(upstream_with_driver("u", &["t"], Arc::new(driver)));
        let decisions = ScriptedDecisions::new().push_tool(ToolDecision::AllowAll);
        let flags = RuntimeFlags::new(false, false, false, false);
        let dispatcher = harness.dispatcher(decisions, flags);
        dispatcher.call_tool("t", json!({})).await.unwrap();
        assert!(dispatcher.flags().yolo());
        // Second call proceeds without any scripted decision left.
        dispatcher.call_tool("t", json!({})).await.unwrap();
    }

    #[tokio::test]
    async fn modification_rewrites_the_call_once() {
        let harness = Harness::new();
        let driver = MockDriver::new().on("tools/call", json!({"content": []}));
        harness.registry.insert(upstream_with_driver(
            "u",
            &["safe", "risky"],
            Arc::new(driver.clone()),
        ));
        let decisions = ScriptedDecisions::new()
            .push_tool(ToolDecision::Modify)
            .push_modification("safe path=/tmp count=2")
            .push_tool(ToolDecision::AllowOnce);
        let flags = RuntimeFlags::new(false, false, false, false);
        let dispatcher = harness.dispatcher(decisions, flags);
        dispatcher.call_tool("risky", json!({"x": 1})).await.unwrap();
        let params = driver.last_params("tools/call").unwrap();
        assert_eq!(params["name"], json!("safe"));
        assert_eq!(params["arguments"], json!({"path": "/tmp", "count": 2}));
    }

    #[tokio::test]
    async fn second_modification_is_refused() {
        let harness = Harness::new();
        harness.registry.insert(upstream_with_tools("u", &["a", "b"]));
        let decisions = ScriptedDecisions::new()
            .push_tool(ToolDecision::Modify)
            .push_modification("b")
            .push_tool(ToolDecision::Modify);
        let flags = RuntimeFlags::new(false, false, false, false);
        let dispatcher = harness.dispatcher(decisions, flags);
        let err = dispatcher.call_tool("a", json!({})).await.unwrap_err();
        assert!(matches!(
            err,
            ProxyError::Mediation(MediationError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn drunk_mode_rebinds_positionally_in_dispatch() {
        let harness = Harness::new();
        let driver = MockDriver::new().on("tools/call", json!({"content": []}));
        let schema = json!({
            "type": "object",
            "properties": {"name": {"type": "string"}, "greeting": {"type": "string"}}
        });
        harness.registry.insert(crate::testutil::upstream_with_schema(
            "u",
            "greet",
            schema,
            Arc::new(driver.clone()),
        ));
        let flags = RuntimeFlags::new(true, true, false, false);
        let dispatcher = harness.dispatcher(ScriptedDecisions::new(), flags);
        dispatcher
            .call_tool("greet", json!({"0": "world", "1": "hi"}))
            .await
            .unwrap();
        assert_eq!(
            driver.last_params("tools/call").unwrap()["arguments"],
            json!({"name": "world", "greeting": "hi"})
        );
    }

    #[tokio::test]
    async fn embedded_error_surfaces_as_tool_error() {
        let harness = Harness::new();
        let driver = MockDriver::new().on(
            "tools/call",
            json!({"isError": true, "content": [{"type": "text", "text": "disk on fire"}]}),
        );
        harness
            .registry
            .insert(upstream_with_driver("u", &["t"], Arc::new(driver)));
        let dispatcher = harness.dispatcher(ScriptedDecisions::new(), yolo_flags());
        let err = dispatcher.call_tool("t", json!({})).await.unwrap_err();
        assert!(matches!(err, ProxyError::Tool(ref t) if t == "disk on fire"));
    }

    #[tokio::test]
    async fn pagination_footer_is_appended_to_text() {
        let harness = Harness::new();
        let driver = MockDriver::new().on(
            "tools/call",
            json!({
                "content": [{"type": "text", "text": "row"}],
                "page": 1, "totalPages": 3, "nextPageToken": "tok"
            }),
        );
        harness
            .registry
            .insert(upstream_with_driver("u", &["t"], Arc::new(driver)));
        let dispatcher = harness.dispatcher(ScriptedDecisions::new(), yolo_flags());
        let outcome = dispatcher.call_tool("t", json!({})).await.unwrap();
        assert_eq!(outcome.text, "row\n\nPages left: 2 (next_page_token: tok)");
        // The raw result is untouched.
        assert_eq!(outcome.raw["totalPages"], json!(3));
    }

    #[tokio::test]
    async fn every_completed_call_appends_exactly_one_report_entry() {
        let harness = Harness::new();
        let ok_driver = MockDriver::new().on("tools/call", json!({"content": []}));
        let err_driver = MockDriver::new().error("tools/call", -32000, "down");
        harness
            .registry
            .insert(upstream_with_driver("good", &["t"], Arc::new(ok_driver)));
        harness
            .registry
            .insert(upstream_with_driver("bad", &["u"], Arc::new(err_driver)));
        let dispatcher = harness.dispatcher(ScriptedDecisions::new(), yolo_flags());

        dispatcher.call_tool("good::t", json!({})).await.unwrap();
        dispatcher.call_tool("bad::u", json!({})).await.unwrap_err();

        let entries = harness.report.entries_snapshot();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].error.is_none());
        assert!(entries[1].error.is_some());
    }

    #[tokio::test]
    async fn always_not_found_sticks() {
        let harness = Harness::new();
        harness.registry.insert(upstream_with_tools("u", &["t"]));
        let decisions =
            ScriptedDecisions::new().push_missing(MissingToolDecision::AlwaysNotFound);
        let flags = RuntimeFlags::new(false, false, false, false);
        let dispatcher = harness.dispatcher(decisions, flags);
        dispatcher.call_tool("ghost", json!({})).await.unwrap_err();
        // Second miss never consults the (now empty) script.
        let err = dispatcher.call_tool("ghost", json!({})).await.unwrap_err();
        assert!(matches!(
            err,
            ProxyError::Resolution(ResolveError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn prompt_custom_decision_synthesizes_result() {
        let harness = Harness::new();
        harness
            .registry
            .insert(crate::testutil::upstream_with_prompts("u", &["summarize"]));
        let decisions =
            ScriptedDecisions::new().push_prompt(PromptDecision::Custom("use the notes".into()));
        let flags = RuntimeFlags::new(false, false, false, false);
        let dispatcher = harness.dispatcher(decisions, flags);
        let result = dispatcher
            .get_prompt("summarize", json!({}))
            .await
            .unwrap();
        assert_eq!(result["messages"][0]["role"], json!("user"));
        assert_eq!(
            result["messages"][0]["content"]["text"],
            json!("use the notes")
        );
    }
}
