//! MQTT client for receiving vision pipeline messages
//!
//! The external vision pipeline (face embedding extractor, object/weapon
//! detector, behaviour classifier) publishes JSON messages to a single
//! topic. Each message becomes one `MonitorEvent`; malformed payloads are
//! logged and skipped, never propagated.

use crate::domain::types::{MonitorEvent, SeatId, VisionMessage};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Start the MQTT client and send parsed events to the channel
///
/// Events are sent via try_send to avoid blocking the MQTT eventloop.
/// Dropped events are counted in metrics and logged (rate-limited).
pub async fn start_vision_client(
    config: &Config,
    event_tx: mpsc::Sender<MonitorEvent>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut mqttoptions = MqttOptions::new("cabin-monitor", config.mqtt_host(), config.mqtt_port());
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    // Set credentials if configured
    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        mqttoptions.set_credentials(username, password);
    }

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);
    client.subscribe(config.mqtt_vision_topic(), QoS::AtMostOnce).await?;

    info!(
        topic = %config.mqtt_vision_topic(),
        host = %config.mqtt_host(),
        port = %config.mqtt_port(),
        "vision_client_subscribed"
    );

    // Rate-limit drop warnings to 1 per second
    let mut last_drop_warn = Instant::now() - Duration::from_secs(2);

    loop {
        tokio::select! {
            // Check for shutdown signal
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("vision_client_shutdown");
                    return Ok(());
                }
            }
            // Process MQTT events
            result = eventloop.poll() => {
                match result {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let received_at = Instant::now();

                        let Ok(json_str) = std::str::from_utf8(&publish.payload) else {
                            warn!(topic = %publish.topic, "invalid_utf8_in_vision_payload");
                            continue;
                        };

                        let Some(event) = parse_vision_message(json_str, received_at) else {
                            continue;
                        };

                        if let Err(e) = event_tx.try_send(event) {
                            match e {
                                TrySendError::Full(_) => {
                                    metrics.record_event_dropped();
                                    if last_drop_warn.elapsed() > Duration::from_secs(1) {
                                        warn!("vision_event_dropped: channel full");
                                        last_drop_warn = Instant::now();
                                    }
                                }
                                TrySendError::Closed(_) => {
                                    warn!("vision_event_channel_closed");
                                    return Ok(());
                                }
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("vision_client_connected");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "vision_client_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
}

/// Parse a vision pipeline JSON message into a monitor event.
///
/// Frame seats are sorted by name so downstream processing order is
/// reproducible regardless of JSON map order.
pub fn parse_vision_message(json_str: &str, received_at: Instant) -> Option<MonitorEvent> {
    let message: VisionMessage = match serde_json::from_str(json_str) {
        Ok(m) => m,
        Err(e) => {
            debug!(error = %e, "vision_message_parse_failed");
            return None;
        }
    };

    let event = match message {
        VisionMessage::Frame { cycle, seats } => {
            let mut seat_embeddings: Vec<_> = seats
                .into_iter()
                .map(|(seat, observation)| (SeatId(seat), observation.embeddings))
                .collect();
            seat_embeddings.sort_by(|a, b| a.0.cmp(&b.0));

            MonitorEvent::Frame(crate::domain::types::CycleFrame {
                cycle_id: cycle,
                seats: seat_embeddings,
                received_at,
            })
        }
        VisionMessage::Objects { channel, labels } => MonitorEvent::Objects { channel, labels },
        VisionMessage::Weapon { present } => MonitorEvent::Weapon { present },
        VisionMessage::Behaviour { seat, label } => {
            MonitorEvent::Behaviour { seat: SeatId(seat), label }
        }
    };

    Some(event)
}
