// Main entry point - Dependency injection and server setup
mod domain;
mod application;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc};
use anyhow::Context;
use axum::{routing::{get, post}, Router};
use tokio::sync::{mpsc, watch};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::aggregator::Aggregator;
use crate::application::ingest_service::IngestService;
use crate::application::notifier::ReportNotifier;
use crate::application::report_assembler::ReportAssembler;
use crate::application::timeout_monitor::TimeoutMonitor;
use crate::domain::layout::LayoutPlanner;
use crate::infrastructure::config::load_app_config;
use crate::infrastructure::file_notifier::FileNotifier;
use crate::infrastructure::html_renderer::{HtmlRenderer, ReportLogo};
use crate::infrastructure::ultramsg_notifier::UltraMsgNotifier;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{flush_site, health_check, ingest_reading, pending_sites};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = load_app_config()?;
    let sites = Arc::new(config.site_registry()?);
    if sites.is_empty() {
        tracing::warn!("No sites configured; every reading will be dropped");
    } else {
        tracing::info!(sites = sites.len(), "Site registry loaded");
    }

    // Create outbound adapters (infrastructure layer)
    let logo = config
        .report
        .logo_path
        .as_deref()
        .map(ReportLogo::load)
        .transpose()?;
    let renderer = Arc::new(
        HtmlRenderer::new(config.layout.clone(), config.color_scale.clone())
            .with_logo(logo)
            .with_author(config.report.author.clone()),
    );
    let notifier: Arc<dyn ReportNotifier> = if config.notifier.has_credentials() {
        Arc::new(UltraMsgNotifier::new(&config.notifier)?)
    } else {
        let file_notifier = FileNotifier::new(config.report.reports_dir.clone());
        tracing::warn!(
            dir = %file_notifier.root().display(),
            "UltraMsg credentials missing; reports will be written to disk"
        );
        Arc::new(file_notifier)
    };

    // Create services (application layer)
    let aggregator = Arc::new(Aggregator::new());
    let assembler = ReportAssembler::new(LayoutPlanner::new(config.layout.clone(), config.color_scale.clone()));
    let monitor = Arc::new(TimeoutMonitor::new(
        aggregator.clone(),
        sites.clone(),
        assembler,
        renderer,
        notifier,
        config.report.monitor_settings()?,
    ));

    let (command_tx, command_rx) = mpsc::channel(16);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor_task = tokio::spawn(monitor.clone().run(command_rx, shutdown_rx));

    // Create application state
    let state = Arc::new(AppState {
        ingest_service: IngestService::new(aggregator.clone(), sites.clone()),
        aggregator,
        monitor,
        sites,
        commands: command_tx,
    });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/readings/:site/:unit", post(ingest_reading))
        .route("/sites/pending", get(pending_sites))
        .route("/sites/:site/flush", post(flush_site))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.server.bind))?;
    tracing::info!("Starting silo-thermal-reports service on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    // Let an in-flight scan finish before exiting
    let _ = shutdown_tx.send(true);
    monitor_task.await.context("Timeout monitor task panicked")?;

    Ok(())
}
