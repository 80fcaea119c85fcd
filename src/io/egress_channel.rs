//! Typed channel for MQTT egress messages
//!
//! Provides a non-blocking way to send events to the MQTT publisher.
//! Uses bounded mpsc channels to prevent unbounded memory growth.

use crate::domain::types::{epoch_ms, SeatNotification};
use crate::infra::metrics::{MetricsSummary, METRICS_NUM_BUCKETS};
use serde::Serialize;
use tokio::sync::mpsc;

/// Messages that can be sent to the MQTT publisher
#[derive(Debug)]
pub enum EgressMessage {
    /// Seat status change or welcome one-shot
    Notification(NotificationPayload),
    /// Per-cycle cabin state snapshot for display consumers
    Snapshot(CabinSnapshotPayload),
    /// Periodic metrics snapshot
    Metrics(MetricsPayload),
}

/// Payload for status-change and welcome notifications
#[derive(Debug, Clone, Serialize)]
pub struct NotificationPayload {
    /// Site identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    /// Monitoring session identifier (UUIDv7)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    /// Timestamp (epoch ms)
    pub ts: u64,
    /// "status" or "welcome"
    pub kind: &'static str,
    pub seat: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passenger: Option<String>,
    /// Seat status for kind = "status"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<&'static str>,
}

impl NotificationPayload {
    pub fn from_notification(notification: &SeatNotification) -> Self {
        match notification {
            SeatNotification::StatusChanged { seat, passenger, status } => Self {
                site: None,
                session: None,
                ts: epoch_ms(),
                kind: "status",
                seat: seat.as_str().to_string(),
                passenger: passenger.clone(),
                status: Some(status.as_str()),
            },
            SeatNotification::Welcome { seat, passenger } => Self {
                site: None,
                session: None,
                ts: epoch_ms(),
                kind: "welcome",
                seat: seat.as_str().to_string(),
                passenger: Some(passenger.clone()),
                status: None,
            },
        }
    }
}

/// Stabilized view of one seat for the display layer
#[derive(Debug, Clone, Serialize)]
pub struct SeatSnapshot {
    pub seat: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passenger: Option<String>,
    pub belt: bool,
    /// Smoothed behaviour class for the seat
    pub behaviour: String,
    /// Smoothed set of visible objects in the seat region
    pub objects: Vec<String>,
}

/// Payload for per-cycle cabin state snapshots
#[derive(Debug, Clone, Serialize)]
pub struct CabinSnapshotPayload {
    /// Site identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    /// Monitoring session identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    /// Timestamp (epoch ms)
    pub ts: u64,
    /// Cycle the snapshot was taken at
    pub cycle: u64,
    pub seats: Vec<SeatSnapshot>,
    /// Smoothed cabin-wide weapon presence
    pub weapon_present: bool,
}

/// Payload for metrics snapshot
#[derive(Debug, Serialize)]
pub struct MetricsPayload {
    /// Site identifier
    pub site: String,
    /// Timestamp (epoch ms)
    pub ts: u64,
    /// Total events processed
    pub events_total: u64,
    /// Events per second
    pub events_per_sec: f64,
    /// Average processing latency (microseconds)
    pub avg_latency_us: u64,
    /// Max processing latency (microseconds)
    pub max_latency_us: u64,
    /// Event processing latency histogram buckets (Prometheus-style exponential)
    /// Bounds: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200 µs
    pub lat_buckets: [u64; METRICS_NUM_BUCKETS],
    /// 50th percentile latency (µs)
    pub lat_p50_us: u64,
    /// 95th percentile latency (µs)
    pub lat_p95_us: u64,
    /// 99th percentile latency (µs)
    pub lat_p99_us: u64,
    /// Vision cycles processed
    pub frames_total: u64,
    /// Stabilization passes completed
    pub batches_total: u64,
    /// Status notifications emitted
    pub notifications_total: u64,
    /// Welcome one-shots emitted
    pub welcomes_total: u64,
    /// Degraded classification cycles
    pub classify_errors_total: u64,
    /// Seatbelt reads that fell back to all-false
    pub belt_read_failures_total: u64,
    /// Ingest events dropped due to channel full
    pub events_dropped: u64,
    /// Seats currently not Empty
    pub occupied_seats: usize,
    /// Seats currently Ready
    pub ready_seats: usize,
}

impl MetricsPayload {
    /// Create a metrics payload from a summary with site info
    pub fn from_summary(summary: MetricsSummary, site: String) -> Self {
        Self {
            site,
            ts: epoch_ms(),
            events_total: summary.events_total,
            events_per_sec: summary.events_per_sec,
            avg_latency_us: summary.avg_process_latency_us,
            max_latency_us: summary.max_process_latency_us,
            lat_buckets: summary.lat_buckets,
            lat_p50_us: summary.lat_p50_us,
            lat_p95_us: summary.lat_p95_us,
            lat_p99_us: summary.lat_p99_us,
            frames_total: summary.frames_total,
            batches_total: summary.batches_total,
            notifications_total: summary.notifications_total,
            welcomes_total: summary.welcomes_total,
            classify_errors_total: summary.classify_errors_total,
            belt_read_failures_total: summary.belt_read_failures_total,
            events_dropped: summary.events_dropped,
            occupied_seats: summary.occupied_seats,
            ready_seats: summary.ready_seats,
        }
    }
}

/// Sender handle for egress messages
///
/// Clone this to share across multiple producers.
/// Non-blocking - if the channel is full, messages are dropped.
#[derive(Clone)]
pub struct EgressSender {
    tx: mpsc::Sender<EgressMessage>,
    site_id: String,
    session_id: String,
}

impl EgressSender {
    /// Create a new sender from an mpsc sender
    pub fn new(tx: mpsc::Sender<EgressMessage>, site_id: String, session_id: String) -> Self {
        Self { tx, site_id, session_id }
    }

    /// Send a status-change or welcome notification
    /// Injects site_id and session_id into the payload
    pub fn send_notification(&self, notification: &SeatNotification) {
        let mut payload = NotificationPayload::from_notification(notification);
        payload.site = Some(self.site_id.clone());
        payload.session = Some(self.session_id.clone());
        // Use try_send to avoid blocking - drop if channel full
        let _ = self.tx.try_send(EgressMessage::Notification(payload));
    }

    /// Send a cabin state snapshot for live display
    /// Injects site_id and session_id into the payload
    pub fn send_snapshot(&self, mut payload: CabinSnapshotPayload) {
        payload.site = Some(self.site_id.clone());
        payload.session = Some(self.session_id.clone());
        let _ = self.tx.try_send(EgressMessage::Snapshot(payload));
    }

    /// Send a metrics snapshot
    pub fn send_metrics(&self, summary: MetricsSummary) {
        let payload = MetricsPayload::from_summary(summary, self.site_id.clone());
        let _ = self.tx.try_send(EgressMessage::Metrics(payload));
    }
}

/// Create a new egress channel pair
///
/// Returns (sender, receiver) where sender can be cloned and shared.
/// Buffer size determines how many messages can be queued.
pub fn create_egress_channel(
    buffer_size: usize,
    site_id: String,
    session_id: String,
) -> (EgressSender, mpsc::Receiver<EgressMessage>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (EgressSender::new(tx, site_id, session_id), rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{SeatId, SeatStatus};

    #[test]
    fn test_notification_payload_from_status_change() {
        let notification = SeatNotification::StatusChanged {
            seat: SeatId::new("A1"),
            passenger: Some("Alice".to_string()),
            status: SeatStatus::Ready,
        };

        let payload = NotificationPayload::from_notification(&notification);

        assert_eq!(payload.kind, "status");
        assert_eq!(payload.seat, "A1");
        assert_eq!(payload.passenger.as_deref(), Some("Alice"));
        assert_eq!(payload.status, Some("ready"));
        assert!(payload.ts > 0);
    }

    #[test]
    fn test_notification_payload_from_welcome() {
        let notification = SeatNotification::Welcome {
            seat: SeatId::new("B2"),
            passenger: "Bob".to_string(),
        };

        let payload = NotificationPayload::from_notification(&notification);

        assert_eq!(payload.kind, "welcome");
        assert_eq!(payload.seat, "B2");
        assert_eq!(payload.passenger.as_deref(), Some("Bob"));
        assert!(payload.status.is_none());
    }

    #[tokio::test]
    async fn test_sender_injects_site_and_session() {
        let (sender, mut rx) =
            create_egress_channel(8, "cabin-1".to_string(), "sess-1".to_string());

        sender.send_notification(&SeatNotification::Welcome {
            seat: SeatId::new("A1"),
            passenger: "Alice".to_string(),
        });

        match rx.recv().await.unwrap() {
            EgressMessage::Notification(payload) => {
                assert_eq!(payload.site.as_deref(), Some("cabin-1"));
                assert_eq!(payload.session.as_deref(), Some("sess-1"));
            }
            other => panic!("expected notification, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_full_channel_drops_instead_of_blocking() {
        let (sender, _rx) = create_egress_channel(1, "s".to_string(), "x".to_string());

        let welcome = SeatNotification::Welcome {
            seat: SeatId::new("A1"),
            passenger: "Alice".to_string(),
        };

        // Second send overflows the buffer; must not block or panic
        sender.send_notification(&welcome);
        sender.send_notification(&welcome);
    }
}
