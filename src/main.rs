//! IncidentFlow - customer incident automation service
//!
//! Ingests customer incidents over HTTP, classifies them, opens tickets,
//! persists everything in sled and drives acknowledgment + reminder
//! notifications across email, SMS and WhatsApp.
//!
//! # Usage
//!
//! ```bash
//! # Run with defaults (listens on 0.0.0.0:8000, sled db at ./incidents_db)
//! cargo run --release
//!
//! # Custom bind address and database location
//! cargo run --release -- --addr 127.0.0.1:9000 --db /var/lib/incidentflow
//!
//! # Short reminder window for manual testing
//! cargo run --release -- --reminder-delay-secs 60
//! ```
//!
//! # Environment Variables
//!
//! - `GOOGLE_API_KEY`: classification service API key (unset = fallback mode)
//! - `SENDER_EMAIL` / `SENDER_PASSWORD`: SMTP credentials for the email channel
//! - `INCIDENTFLOW_CONFIG`: path to a TOML config file
//! - `RUST_LOG`: logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use incidentflow::api::{create_app, ApiState};
use incidentflow::config::{self, ServiceConfig};
use incidentflow::notify::{Dispatcher, EmailSender};
use incidentflow::reminder::ReminderScheduler;
use incidentflow::store::{IncidentStore, SledIncidentStore};
use incidentflow::ticketing::TicketClient;
use incidentflow::{GeminiClassifier, IncidentPipeline};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "incidentflow")]
#[command(about = "IncidentFlow customer incident automation service")]
#[command(version)]
struct CliArgs {
    /// Override the server bind address (default from config, "0.0.0.0:8000")
    #[arg(short, long)]
    addr: Option<String>,

    /// Override the sled database path
    #[arg(long)]
    db: Option<String>,

    /// Override the reminder delay in seconds (default 86400 = 24h)
    #[arg(long)]
    reminder_delay_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env before anything reads the environment
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    // Load service configuration
    let mut service_config = ServiceConfig::load();
    if let Some(addr) = args.addr {
        service_config.server.listen_addr = addr;
    }
    if let Some(db) = args.db {
        service_config.storage.db_path = db;
    }
    if let Some(delay) = args.reminder_delay_secs {
        service_config.reminder.delay_secs = delay;
    }
    config::init(service_config);
    let cfg = config::get();

    info!("IncidentFlow - customer incident automation");
    info!(
        listen_addr = %cfg.server.listen_addr,
        db_path = %cfg.storage.db_path,
        reminder_delay_secs = cfg.reminder.delay_secs,
        "Starting up"
    );

    // Storage — the single source of truth
    let store: Arc<dyn IncidentStore> = Arc::new(
        SledIncidentStore::open(&cfg.storage.db_path).context("Failed to open incident storage")?,
    );

    // Classification boundary
    let api_key = std::env::var("GOOGLE_API_KEY").unwrap_or_default();
    if api_key.is_empty() {
        warn!("GOOGLE_API_KEY not set — classification will run in fallback mode");
    }
    let classifier = Arc::new(GeminiClassifier::new(
        &cfg.classifier.base_url,
        &cfg.classifier.model,
        &api_key,
        Duration::from_secs(cfg.classifier.timeout_secs),
    ));

    // Ticketing boundary
    let tickets = TicketClient::new(
        &cfg.ticketing.endpoint,
        Duration::from_secs(cfg.ticketing.timeout_secs),
    );

    // Notification fan-out
    let email = EmailSender::from_env(&cfg.email.smtp_host, cfg.email.smtp_port);
    let dispatcher = Arc::new(Dispatcher::with_default_senders(store.clone(), email));

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    // Reminder scheduling, with startup recovery of armed-but-unfired checks
    let scheduler = ReminderScheduler::new(
        store.clone(),
        dispatcher.clone(),
        Duration::from_secs(cfg.reminder.delay_secs),
        cancel_token.clone(),
    );
    if cfg.reminder.recover_on_startup {
        match scheduler.recover() {
            Ok(count) => info!(count, "Reminder recovery scan complete"),
            Err(e) => warn!(error = %e, "Reminder recovery scan failed"),
        }
    }

    // Pipeline + HTTP surface
    let pipeline = Arc::new(IncidentPipeline::new(
        classifier,
        tickets,
        store.clone(),
        dispatcher,
        scheduler,
    ));
    let app = create_app(ApiState::new(pipeline, store));

    let listener = tokio::net::TcpListener::bind(&cfg.server.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.server.listen_addr))?;
    info!(addr = %cfg.server.listen_addr, "HTTP server listening");

    let server_token = cancel_token.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_token.cancelled().await })
        .await
        .context("HTTP server error")?;

    info!("IncidentFlow shutdown complete");
    Ok(())
}
