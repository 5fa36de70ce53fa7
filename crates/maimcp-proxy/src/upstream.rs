//! Upstream lifecycle: spawn, handshake, enumerate, monitor, restart, stop.
//!
//! Each upstream owns its transport driver, its three capability slices, and
//! (for stdio upstreams) two background workers: a stderr drain and a child
//! monitor. Both workers observe a control flag on the record and are
//! awaited to completion before the record is dropped. A supervised child
//! that exits is restarted after one second: pipes are reopened, the
//! handshake is replayed, and the catalogs reloaded.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use maimcp_protocol::{
    JsonRpcNotification, JsonRpcRequest, PromptDescriptor, ResourceDescriptor, ToolDescriptor,
    PROTOCOL_VERSION,
};
use parking_lot::RwLock;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{auth_token_for_url, ServerConfig, TransportKind};
use crate::error::{ProxyError, ProxyResult};
use crate::transport::{bootstrap_endpoint, Driver, HttpDriver, StdioDriver};

/// Pause before a supervised restart.
const RESTART_DELAY: Duration = Duration::from_secs(1);

/// Grace period between SIGTERM and SIGKILL at shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Default)]
struct Tasks {
    drain: Option<JoinHandle<()>>,
    monitor: Option<JoinHandle<()>>,
}

/// One supervised upstream server.
pub struct Upstream {
    name: String,
    config: ServerConfig,
    skip_prompts: bool,
    driver: RwLock<Arc<dyn Driver>>,
    next_id: AtomicU64,
    /// Tools currently advertised (already filtered by the allow-list)
    pub tools: RwLock<Vec<ToolDescriptor>>,
    /// Prompts currently advertised (empty when prompts are skipped)
    pub prompts: RwLock<Vec<PromptDescriptor>>,
    /// Resources currently advertised
    pub resources: RwLock<Vec<ResourceDescriptor>>,
    /// While set, the monitor restarts an exited child
    supervise: AtomicBool,
    /// While set, the drain keeps forwarding stderr lines to the log
    drain: AtomicBool,
    pid: AtomicU32,
    tasks: tokio::sync::Mutex<Tasks>,
}

impl Upstream {
    fn new(
        name: impl Into<String>,
        config: ServerConfig,
        skip_prompts: bool,
        driver: Arc<dyn Driver>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            skip_prompts,
            driver: RwLock::new(driver),
            next_id: AtomicU64::new(1),
            tools: RwLock::new(Vec::new()),
            prompts: RwLock::new(Vec::new()),
            resources: RwLock::new(Vec::new()),
            supervise: AtomicBool::new(false),
            drain: AtomicBool::new(false),
            pid: AtomicU32::new(0),
            tasks: tokio::sync::Mutex::new(Tasks::default()),
        }
    }

    /// Build a record around an existing driver without spawning anything.
    /// Used for HTTP upstreams and by tests.
    pub(crate) fn with_driver(
        name: impl Into<String>,
        config: ServerConfig,
        skip_prompts: bool,
        driver: Arc<dyn Driver>,
    ) -> Arc<Self> {
        Arc::new(Self::new(name, config, skip_prompts, driver))
    }

    /// Upstream name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Command line or URL, for status listings.
    pub fn descriptor(&self) -> String {
        self.config.descriptor()
    }

    /// Open the transport, run the MCP handshake, and load the catalogs.
    ///
    /// # Errors
    ///
    /// Fails if the transport cannot be opened or the `initialize` exchange
    /// fails; such an upstream is never registered. A failing `tools/list`
    /// is only logged; the upstream is still served, and calls against its
    /// stale catalog surface the transport error.
    pub async fn connect(
        name: &str,
        config: ServerConfig,
        skip_prompts: bool,
    ) -> ProxyResult<Arc<Self>> {
        match config.kind {
            TransportKind::Stdio => Self::connect_stdio(name, config, skip_prompts).await,
            TransportKind::Http => {
                let url = config.url.clone().unwrap_or_default();
                let driver = HttpDriver::new(name, &url, auth_token_for_url(&url))?;
                let up = Self::with_driver(name, config, skip_prompts, Arc::new(driver));
                up.handshake().await?;
                up.enumerate_logged().await;
                Ok(up)
            }
            TransportKind::Sse => {
                let url = config.url.clone().unwrap_or_default();
                let endpoint = bootstrap_endpoint(name, &url).await?;
                debug!(server = %name, %endpoint, "SSE bootstrap complete");
                let driver = HttpDriver::new(name, &endpoint, auth_token_for_url(&url))?;
                let up = Self::with_driver(name, config, skip_prompts, Arc::new(driver));
                up.handshake().await?;
                up.enumerate_logged().await;
                Ok(up)
            }
        }
    }

    async fn connect_stdio(
        name: &str,
        config: ServerConfig,
        skip_prompts: bool,
    ) -> ProxyResult<Arc<Self>> {
        let (child, driver, stderr) = spawn_child(name, &config)?;
        let up = Self::with_driver(name, config, skip_prompts, Arc::new(driver));
        up.pid.store(child.id().unwrap_or(0), Ordering::Relaxed);
        up.drain.store(true, Ordering::Relaxed);
        up.supervise.store(true, Ordering::Relaxed);
        let drain = up.clone().spawn_drain(stderr);
        if let Err(e) = up.handshake().await {
            // Child dies with the dropped handles (kill_on_drop); let the
            // drain observe the closed pipe before reporting failure.
            up.drain.store(false, Ordering::Relaxed);
            up.supervise.store(false, Ordering::Relaxed);
            drop(child);
            let _ = drain.await;
            return Err(e);
        }
        up.enumerate_logged().await;
        let monitor = up.clone().spawn_monitor(child);
        *up.tasks.lock().await = Tasks {
            drain: Some(drain),
            monitor: Some(monitor),
        };
        Ok(up)
    }

    /// Declared parameters of one of this upstream's tools, in declaration
    /// order. Empty when the tool is unknown or declares no schema.
    pub fn tool_params(&self, tool: &str) -> Vec<maimcp_protocol::ToolParam> {
        self.tools
            .read()
            .iter()
            .find(|t| t.name == tool)
            .map(|t| t.params().to_vec())
            .unwrap_or_default()
    }

    /// Send a request through the current driver and unwrap the JSON-RPC
    /// envelope. Upstream RPC errors surface unchanged.
    pub async fn rpc(&self, method: &str, params: Value) -> ProxyResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) as i64;
        let driver = self.driver.read().clone();
        let response = driver.send(JsonRpcRequest::new(method, params, id)).await?;
        response.into_result().map_err(|e| ProxyError::Rpc {
            code: e.code,
            message: e.message,
        })
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> ProxyResult<()> {
        let driver = self.driver.read().clone();
        driver.notify(JsonRpcNotification::new(method, params)).await
    }

    /// MCP initialization: `initialize`, then the `initialized` notification
    /// (sent without awaiting a reply).
    async fn handshake(&self) -> ProxyResult<()> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {"tools": {}, "prompts": {}, "resources": {}},
            "clientInfo": {
                "name": "maimcp-proxy",
                "version": env!("CARGO_PKG_VERSION"),
            },
        });
        self.rpc("initialize", params).await?;
        self.notify("notifications/initialized", None).await?;
        Ok(())
    }

    /// Load the three catalogs. `tools/list` is required; prompts and
    /// resources are best-effort since not all upstreams implement them.
    pub(crate) async fn load_catalogs(&self) -> ProxyResult<()> {
        let result = self.rpc("tools/list", json!({})).await?;
        let mut tools: Vec<ToolDescriptor> =
            serde_json::from_value(result.get("tools").cloned().unwrap_or(json!([])))?;
        if let Some(allow) = &self.config.allow {
            tools.retain(|t| allow.iter().any(|a| a == &t.name));
        }
        *self.tools.write() = tools;

        if !self.skip_prompts {
            match self.rpc("prompts/list", json!({})).await {
                Ok(result) => {
                    let prompts: Vec<PromptDescriptor> =
                        serde_json::from_value(result.get("prompts").cloned().unwrap_or(json!([])))
                            .unwrap_or_default();
                    *self.prompts.write() = prompts;
                }
                Err(e) => debug!(server = %self.name, "prompts/list unavailable: {e}"),
            }
        }

        match self.rpc("resources/list", json!({})).await {
            Ok(result) => {
                let resources: Vec<ResourceDescriptor> =
                    serde_json::from_value(result.get("resources").cloned().unwrap_or(json!([])))
                        .unwrap_or_default();
                *self.resources.write() = resources;
            }
            Err(e) => debug!(server = %self.name, "resources/list unavailable: {e}"),
        }
        Ok(())
    }

    async fn enumerate_logged(&self) {
        if let Err(e) = self.load_catalogs().await {
            warn!(server = %self.name, "tools/list failed, serving stale catalog: {e}");
        }
    }

    fn spawn_drain(self: Arc<Self>, stderr: ChildStderr) -> JoinHandle<()> {
        let up = self;
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while up.drain.load(Ordering::Relaxed) {
                match lines.next_line().await {
                    Ok(Some(line)) => warn!(server = %up.name, "{line}"),
                    Ok(None) => break,
                    Err(e) => {
                        debug!(server = %up.name, "stderr read error: {e}");
                        break;
                    }
                }
            }
            debug!(server = %up.name, "stderr drain finished");
        })
    }

    fn spawn_monitor(self: Arc<Self>, mut child: Child) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let status = child.wait().await;
                if !self.supervise.load(Ordering::Relaxed) {
                    break;
                }
                warn!(server = %self.name, ?status, "process exited, restarting in 1s");
                tokio::time::sleep(RESTART_DELAY).await;
                if !self.supervise.load(Ordering::Relaxed) {
                    break;
                }
                match self.clone().restart().await {
                    Ok(new_child) => child = new_child,
                    Err(e) => {
                        error!(server = %self.name, "restart failed: {e}");
                        break;
                    }
                }
            }
            debug!(server = %self.name, "monitor finished");
        })
    }

    /// Reopen pipes, replay the handshake, reload the catalogs.
    async fn restart(self: Arc<Self>) -> ProxyResult<Child> {
        let (child, driver, stderr) = spawn_child(&self.name, &self.config)?;
        self.pid.store(child.id().unwrap_or(0), Ordering::Relaxed);
        *self.driver.write() = Arc::new(driver);
        let new_drain = self.clone().spawn_drain(stderr);
        {
            let mut tasks = self.tasks.lock().await;
            if let Some(old) = tasks.drain.take() {
                let _ = old.await;
            }
            tasks.drain = Some(new_drain);
        }
        self.handshake().await?;
        self.load_catalogs().await?;
        info!(server = %self.name, "restarted");
        Ok(child)
    }

    /// Orderly shutdown: clear the control flags, close the transport, then
    /// SIGTERM the child and escalate to SIGKILL after the grace period.
    /// Returns once both background tasks have completed.
    ///
    /// The tasks mutex is never held across the waits below: the monitor may
    /// be mid-restart and needs that lock to finish.
    pub async fn stop(&self) {
        self.supervise.store(false, Ordering::Relaxed);
        self.drain.store(false, Ordering::Relaxed);
        let driver = self.driver.read().clone();
        driver.close().await;

        let monitor = self.tasks.lock().await.monitor.take();
        if let Some(mut monitor) = monitor {
            signal_pid(self.pid.load(Ordering::Relaxed), Signal::Term);
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut monitor)
                .await
                .is_err()
            {
                // Re-read the pid: a racing restart may have swapped in a
                // fresh child since the TERM.
                signal_pid(self.pid.load(Ordering::Relaxed), Signal::Kill);
                let _ = monitor.await;
            }
        }
        // Taken only after the monitor has finished, so a racing restart
        // cannot leave a fresh drain task behind.
        let drain = self.tasks.lock().await.drain.take();
        if let Some(drain) = drain {
            let _ = drain.await;
        }
        info!(server = %self.name, "stopped");
    }
}

fn spawn_child(name: &str, config: &ServerConfig) -> ProxyResult<(Child, StdioDriver, ChildStderr)> {
    let command = config
        .command
        .as_deref()
        .ok_or_else(|| ProxyError::configuration(format!("server '{name}' has no command")))?;
    let mut cmd = Command::new(command);
    cmd.args(&config.args)
        .envs(&config.env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    let mut child = cmd
        .spawn()
        .map_err(|e| ProxyError::transport(format!("'{name}': failed to spawn {command}: {e}")))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| ProxyError::transport(format!("'{name}': child stderr not piped")))?;
    let driver = StdioDriver::from_child(name, &mut child)?;
    Ok((child, driver, stderr))
}

enum Signal {
    Term,
    Kill,
}

#[cfg(unix)]
fn signal_pid(pid: u32, signal: Signal) {
    if pid == 0 {
        return;
    }
    let sig = match signal {
        Signal::Term => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    };
    // Best effort: the process may already be gone.
    unsafe {
        libc::kill(pid as libc::pid_t, sig);
    }
}

#[cfg(not(unix))]
fn signal_pid(_pid: u32, _signal: Signal) {}
