//! Cabin monitor - seat occupancy reconciliation for an aircraft cabin
//!
//! Consumes noisy per-cycle classifications from an external vision pipeline
//! and the seatbelt sensor, stabilizes them over evidence windows, and emits
//! de-duplicated seat status and welcome notifications.
//!
//! Module structure:
//! - `domain/` - Core types (SeatId, ClassificationEvent, EvidenceWindow)
//! - `io/` - External interfaces (MQTT, GPIO belt, enrollment, egress)
//! - `services/` - Business logic (Monitor, Reconciler, Matcher, Channels)
//! - `infra/` - Infrastructure (Config, Metrics, Broker)

use cabin_monitor::infra::{Config, Metrics};
use cabin_monitor::io::{create_egress_channel, BeltMonitor, MqttPublisher};
use cabin_monitor::services::Monitor;
use clap::Parser;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Cabin monitor - passenger seat reconciliation
#[derive(Parser, Debug)]
#[command(name = "cabin-monitor", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/cabin.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(git_hash = %env!("GIT_HASH"), "cabin-monitor starting");

    let args = Args::parse();

    // Configuration errors are fatal before any task starts
    let config = Config::load(&args.config)?;

    // Start embedded MQTT broker with config
    cabin_monitor::infra::broker::start_embedded_broker(&config);

    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        mqtt_host = %config.mqtt_host(),
        mqtt_port = %config.mqtt_port(),
        vision_topic = %config.mqtt_vision_topic(),
        seats = ?config.seats(),
        window_capacity = %config.window_capacity(),
        batch_size = %config.batch_size(),
        identity_tolerance = %config.identity_tolerance(),
        prometheus_port = %config.prometheus_port(),
        "config_loaded"
    );

    // One id per monitoring session, stamped on every egress payload
    let session_id = Uuid::now_v7().to_string();
    info!(session = %session_id, "session_started");

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Shared metrics with seat gauges
    let metrics = Arc::new(Metrics::new());
    let seat_names: Vec<String> =
        config.seats().iter().map(|s| s.as_str().to_string()).collect();
    metrics.set_seats(&seat_names);

    // Enrolled passengers are loaded once and frozen for the session.
    // An empty or failed load degrades to all-unknown behavior.
    let enrolled =
        Arc::new(cabin_monitor::io::load_enrollment(config.enrollment_file(), &metrics));

    // Create event channel (bounded for backpressure)
    let (event_tx, event_rx) = mpsc::channel(1000);

    // Start seatbelt monitor
    let belt_monitor = BeltMonitor::new(&config, event_tx.clone(), metrics.clone());
    let belt_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        belt_monitor.run(belt_shutdown).await;
    });

    // Start MQTT vision client
    let vision_config = config.clone();
    let vision_metrics = metrics.clone();
    let vision_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) = cabin_monitor::io::mqtt::start_vision_client(
            &vision_config,
            event_tx,
            vision_metrics,
            vision_shutdown,
        )
        .await
        {
            tracing::error!(error = %e, "vision client error");
        }
    });

    // Start Prometheus metrics HTTP server (if port > 0)
    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let prom_metrics = metrics.clone();
        let prom_site = config.site_id().to_string();
        let prom_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = cabin_monitor::io::prometheus::start_metrics_server(
                prometheus_port,
                prom_metrics,
                prom_site,
                prom_shutdown,
            )
            .await
            {
                tracing::error!(error = %e, "Prometheus metrics server error");
            }
        });
    }

    // Create MQTT egress channel and publisher (if enabled)
    let egress_sender = if config.mqtt_egress_enabled() {
        let (egress_sender, egress_rx) =
            create_egress_channel(1000, config.site_id().to_string(), session_id.clone());

        let publisher = MqttPublisher::new(&config, egress_rx);
        let publisher_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            publisher.run(publisher_shutdown).await;
        });

        Some(egress_sender)
    } else {
        None
    };

    // Start the metrics reporter: one report() call per interval feeds both
    // the log line and the MQTT metrics snapshot
    let reporter_metrics = metrics.clone();
    let reporter_egress = egress_sender.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            let summary = reporter_metrics.report();
            summary.log();
            if let Some(ref sender) = reporter_egress {
                sender.send_metrics(summary);
            }
        }
    });

    // Start monitor (main event processing loop)
    let mut monitor = Monitor::new(&config, enrolled, metrics, egress_sender);
    info!("monitor_wired");

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx;
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    // Run monitor - consumes events until shutdown or channel close,
    // then resets all reconciliation state
    monitor.run(event_rx, shutdown_rx).await;

    info!("cabin-monitor shutdown complete");
    Ok(())
}
