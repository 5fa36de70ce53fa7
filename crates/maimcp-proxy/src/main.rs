//! Proxy binary: parse flags, load configuration, start the fleet, serve.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use maimcp_proxy::cli::Cli;
use maimcp_proxy::mediate::{DecisionSource, PermissionCache, TerminalDecisions};
use maimcp_proxy::{config, router, AppState, Dispatcher, Registry, ReportSink, RuntimeFlags};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = match config::load(cli.config_json.as_deref(), cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    cli.apply(&mut config.options);

    let registry = Arc::new(Registry::new(config.options.skip_prompts));
    let flags = Arc::new(RuntimeFlags::new(
        config.options.yolo,
        config.options.drunk,
        config.options.non_interactive,
        config.options.skip_prompts,
    ));
    let decisions: Arc<dyn DecisionSource> = Arc::new(TerminalDecisions);
    let dispatcher = Arc::new(Dispatcher::new(
        registry.clone(),
        Arc::new(PermissionCache::new()),
        decisions,
        Arc::new(ReportSink::new(config.options.report.clone())),
        flags,
    ));

    let started = registry.start_all(&config).await;
    info!(
        started,
        configured = config.enabled_servers().count(),
        "upstream fleet ready"
    );

    let listener = match tokio::net::TcpListener::bind(&config.options.base_url).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("cannot bind {}: {e}", config.options.base_url);
            registry.stop_all_servers().await;
            return ExitCode::FAILURE;
        }
    };
    info!("listening on {}", config.options.base_url);

    let app = router(AppState::new(registry.clone(), dispatcher));
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("server error: {e}");
        registry.stop_all_servers().await;
        return ExitCode::FAILURE;
    }

    info!("shutting down upstream fleet");
    registry.stop_all_servers().await;
    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sigterm) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sigterm.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
