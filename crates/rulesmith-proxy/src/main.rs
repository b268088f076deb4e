//! Rulesmith Proxy
//!
//! Backend for the rule authoring UI: accepts a rule name, an intent and
//! reference media, prompts a multimodal model for a structured rule graph,
//! and only ever answers with a rule that passed validation.

use anyhow::Result;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use tokio::signal;
use tracing::{info, warn};

use rulesmith_proxy::cli::{schema_document, validate_rule_file, Cli, Commands, ServeArgs};
use rulesmith_proxy::{create_router, AppState, ServiceConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Serve(args) => serve(args).await,
        Commands::Validate { path } => {
            println!("{}", validate_rule_file(&path)?);
            Ok(())
        }
        Commands::Schema => {
            println!("{}", schema_document()?);
            Ok(())
        }
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    info!("Starting Rulesmith Proxy");

    // Load configuration
    let config = ServiceConfig::load(&args)?;
    info!("Configuration loaded successfully");
    info!("Model endpoint: {}", config.model.base_url);
    info!("Model: {}", config.model.model);

    // Initialize metrics
    let metrics_handle = init_metrics()?;

    let addr: SocketAddr = format!("{}:{}", config.server.listen, config.server.port).parse()?;
    let state = AppState::new(config, metrics_handle).await?;
    info!("Application state initialized successfully");

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Proxy listening on http://{}", addr);

    // Graceful shutdown handler
    let shutdown = async {
        shutdown_signal().await;
        warn!("Shutdown signal received, stopping server...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("rulesmith=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rulesmith=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!(
        "rulesmith_requests_total",
        "Total number of requests processed by endpoint"
    );
    metrics::describe_counter!(
        "rulesmith_validation_failures_total",
        "Model outputs rejected by the rule validator, by rule number"
    );
    metrics::describe_counter!(
        "rulesmith_upstream_errors_total",
        "Failed model calls by error kind"
    );
    metrics::describe_counter!(
        "rulesmith_media_skipped_total",
        "Uploaded files skipped because they are neither image nor video"
    );
    metrics::describe_histogram!(
        "rulesmith_upstream_latency_ms",
        metrics::Unit::Milliseconds,
        "Model call latency in milliseconds"
    );

    info!("Metrics exporter initialized");
    Ok(handle)
}
