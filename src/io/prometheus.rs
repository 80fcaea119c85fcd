//! Prometheus metrics HTTP endpoint
//!
//! Exposes monitor metrics in Prometheus text format at /metrics.
//! Uses hyper for the HTTP server. Periodic histograms live in the MQTT
//! metrics payloads; this endpoint serves the monotonic counters and the
//! per-seat status gauges.

use crate::infra::metrics::Metrics;
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with site label
fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    site: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(metrics: &Metrics, site: &str) -> String {
    let mut output = String::with_capacity(4096);

    write_metric(
        &mut output,
        "cabin_events_total",
        "Total monitor events processed",
        MetricType::Counter,
        site,
        metrics.events_total(),
    );
    write_metric(
        &mut output,
        "cabin_frames_total",
        "Vision cycles processed",
        MetricType::Counter,
        site,
        metrics.frames_total(),
    );
    write_metric(
        &mut output,
        "cabin_batches_total",
        "Stabilization passes completed",
        MetricType::Counter,
        site,
        metrics.batches_total(),
    );
    write_metric(
        &mut output,
        "cabin_notifications_total",
        "Seat status notifications emitted",
        MetricType::Counter,
        site,
        metrics.notifications_total(),
    );
    write_metric(
        &mut output,
        "cabin_welcomes_total",
        "Passenger welcome one-shots emitted",
        MetricType::Counter,
        site,
        metrics.welcomes_total(),
    );
    write_metric(
        &mut output,
        "cabin_classify_errors_total",
        "Degraded classification cycles",
        MetricType::Counter,
        site,
        metrics.classify_errors_total(),
    );
    write_metric(
        &mut output,
        "cabin_belt_read_failures_total",
        "Seatbelt reads that fell back to all-false",
        MetricType::Counter,
        site,
        metrics.belt_read_failures_total(),
    );
    write_metric(
        &mut output,
        "cabin_enrollment_skipped_total",
        "Enrollment records skipped at load",
        MetricType::Counter,
        site,
        metrics.enrollment_skipped_total(),
    );
    write_metric(
        &mut output,
        "cabin_events_dropped_total",
        "Ingest events dropped due to channel full",
        MetricType::Counter,
        site,
        metrics.events_dropped(),
    );

    // Seat status gauges: 0=empty 1=correct 2=incorrect 3=unauthorized 4=ready
    let _ = writeln!(
        output,
        "# HELP cabin_seat_status Current seat status (0=empty 1=correct 2=incorrect 3=unauthorized 4=ready)"
    );
    let _ = writeln!(output, "# TYPE cabin_seat_status gauge");
    for (seat, status) in metrics.seat_statuses() {
        let _ =
            writeln!(output, "cabin_seat_status{{site=\"{site}\",seat=\"{seat}\"}} {status}");
    }

    output
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    site_id: Arc<String>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let body = format_prometheus_metrics(&metrics, &site_id);
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
                .body(Full::new(Bytes::from(body)))
                .expect("static response should not fail"))
        }
        (&Method::GET, "/health") => Ok(Response::builder()
            .status(StatusCode::OK)
            .body(Full::new(Bytes::from("ok")))
            .expect("static response should not fail")),
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("Not Found")))
            .expect("static response should not fail")),
    }
}

/// Start the Prometheus metrics HTTP server
pub async fn start_metrics_server(
    port: u16,
    metrics: Arc<Metrics>,
    site_id: String,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    let site_id = Arc::new(site_id);

    info!(port = %port, site = %site_id, "prometheus_metrics_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();
                        let site_id = site_id.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let metrics = metrics.clone();
                                let site_id = site_id.clone();
                                async move { handle_request(req, metrics, site_id).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "prometheus_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "prometheus_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("prometheus_metrics_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}
