// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use std::sync::Arc;
use axum::{routing::{get, post}, Router};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::chart_style_service::ChartStyleService;
use crate::application::clock::SystemClock;
use crate::application::serial_session::SerialSession;
use crate::infrastructure::broadcast_notifier::BroadcastNotifier;
use crate::infrastructure::config::load_dashboard_config;
use crate::infrastructure::gemini_assistant::GeminiAssistant;
use crate::infrastructure::serial_port::{watch_port_presence, SerialPortConnector};
use crate::presentation::app_state::AppState;
use crate::presentation::events::stream_events;
use crate::presentation::handlers::{
    connect, disconnect, enhance_chart, export_readings, get_chart_style, get_readings,
    get_status, health_check, set_fan, suggest_title, write_message,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let dashboard_config = load_dashboard_config()?;
    let addr = dashboard_config.bind_addr()?;

    // Device session (application layer over the serial adapter)
    let notifier = Arc::new(BroadcastNotifier::new());
    let clock = Arc::new(SystemClock);
    let connector = Arc::new(SerialPortConnector::new(&dashboard_config.serial));
    let session = SerialSession::spawn(
        connector,
        notifier.clone(),
        clock.clone(),
        dashboard_config.ingestion_settings(),
    );
    tokio::spawn(watch_port_presence(session.clone(), dashboard_config.serial.clone()));

    // AI collaborator
    let assistant = Arc::new(GeminiAssistant::new(&dashboard_config.assistant)?);
    let chart_styles = ChartStyleService::new(assistant);

    // Create application state
    let shutdown = CancellationToken::new();
    let state = Arc::new(AppState {
        session: session.clone(),
        chart_styles,
        notifier,
        clock,
        shutdown: shutdown.clone(),
    });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/api/status", get(get_status))
        .route("/api/readings", get(get_readings))
        .route("/api/readings.csv", get(export_readings))
        .route("/api/events", get(stream_events))
        .route("/api/connect", post(connect))
        .route("/api/disconnect", post(disconnect))
        .route("/api/write", post(write_message))
        .route("/api/fan", post(set_fan))
        .route("/api/chart-style", get(get_chart_style).post(enhance_chart))
        .route("/api/chart-title", post(suggest_title))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    tracing::info!("Starting sensor-dashboard service on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    // Release the device before exiting
    if let Err(e) = session.shutdown().await {
        tracing::warn!("Serial session already stopped: {}", e);
    }

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
    shutdown.cancel();
}
