//! Notification egress - writes emitted notifications to file
//!
//! Notifications are written in JSONL format (one JSON object per line)
//! to the file specified in config. Voice and GUI consumers are external;
//! this file is the durable record of what was emitted.

use crate::domain::types::{epoch_ms, SeatNotification};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, error, info};

#[derive(Serialize)]
struct NotificationRecord<'a> {
    ts: u64,
    kind: &'static str,
    seat: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    passenger: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<&'static str>,
}

/// Egress writer for notifications
pub struct Egress {
    file_path: String,
}

impl Egress {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "egress_initialized");
        Self { file_path: file_path.to_string() }
    }

    /// Write one notification to the egress file
    /// Returns true if successful, false otherwise
    pub fn write_notification(&self, notification: &SeatNotification) -> bool {
        let record = match notification {
            SeatNotification::StatusChanged { seat, passenger, status } => NotificationRecord {
                ts: epoch_ms(),
                kind: "status",
                seat: seat.as_str(),
                passenger: passenger.as_deref(),
                status: Some(status.as_str()),
            },
            SeatNotification::Welcome { seat, passenger } => NotificationRecord {
                ts: epoch_ms(),
                kind: "welcome",
                seat: seat.as_str(),
                passenger: Some(passenger),
                status: None,
            },
        };

        let json = match serde_json::to_string(&record) {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "notification_serialize_failed");
                return false;
            }
        };

        match self.append_line(&json) {
            Ok(()) => {
                info!(
                    kind = %record.kind,
                    seat = %record.seat,
                    passenger = %record.passenger.unwrap_or("-"),
                    status = %record.status.unwrap_or("-"),
                    "notification_egressed"
                );
                true
            }
            Err(e) => {
                error!(seat = %record.seat, error = %e, "notification_egress_failed");
                false
            }
        }
    }

    /// Append a line to the egress file
    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path, bytes = %line.len(), "egress_written");

        Ok(())
    }

    /// Write multiple notifications, returning the success count
    pub fn write_notifications(&self, notifications: &[SeatNotification]) -> usize {
        let mut success_count = 0;
        for notification in notifications {
            if self.write_notification(notification) {
                success_count += 1;
            }
        }
        success_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{SeatId, SeatStatus};
    use std::fs;
    use tempfile::tempdir;

    fn status_changed(seat: &str, passenger: Option<&str>, status: SeatStatus) -> SeatNotification {
        SeatNotification::StatusChanged {
            seat: SeatId::new(seat),
            passenger: passenger.map(|p| p.to_string()),
            status,
        }
    }

    #[test]
    fn test_egress_new() {
        let egress = Egress::new("test.jsonl");
        assert_eq!(egress.file_path, "test.jsonl");
    }

    #[test]
    fn test_write_status_notification() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("notifications.jsonl");
        let egress = Egress::new(file_path.to_str().unwrap());

        let result =
            egress.write_notification(&status_changed("A1", Some("Alice"), SeatStatus::Ready));
        assert!(result);

        let content = fs::read_to_string(&file_path).unwrap();
        assert!(content.ends_with('\n'));

        let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(parsed["kind"], "status");
        assert_eq!(parsed["seat"], "A1");
        assert_eq!(parsed["passenger"], "Alice");
        assert_eq!(parsed["status"], "ready");
        assert!(parsed["ts"].as_u64().unwrap() > 0);
    }

    #[test]
    fn test_write_welcome_notification() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("notifications.jsonl");
        let egress = Egress::new(file_path.to_str().unwrap());

        egress.write_notification(&SeatNotification::Welcome {
            seat: SeatId::new("B1"),
            passenger: "Bob".to_string(),
        });

        let content = fs::read_to_string(&file_path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(parsed["kind"], "welcome");
        assert_eq!(parsed["passenger"], "Bob");
        assert!(parsed.get("status").is_none());
    }

    #[test]
    fn test_empty_seat_omits_passenger() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("notifications.jsonl");
        let egress = Egress::new(file_path.to_str().unwrap());

        egress.write_notification(&status_changed("A2", None, SeatStatus::Empty));

        let content = fs::read_to_string(&file_path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert!(parsed.get("passenger").is_none());
        assert_eq!(parsed["status"], "empty");
    }

    #[test]
    fn test_write_notifications_batch() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("notifications.jsonl");
        let egress = Egress::new(file_path.to_str().unwrap());

        let notifications = vec![
            status_changed("A1", Some("Alice"), SeatStatus::Correct),
            SeatNotification::Welcome { seat: SeatId::new("A1"), passenger: "Alice".to_string() },
            status_changed("A2", None, SeatStatus::Unauthorized),
        ];

        let count = egress.write_notifications(&notifications);
        assert_eq!(count, 3);

        let content = fs::read_to_string(&file_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        for line in lines {
            let _parsed: serde_json::Value = serde_json::from_str(line).unwrap();
        }
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let nested_path = dir.path().join("nested").join("dir").join("notifications.jsonl");
        let egress = Egress::new(nested_path.to_str().unwrap());

        let result =
            egress.write_notification(&status_changed("A1", Some("Alice"), SeatStatus::Correct));
        assert!(result);
        assert!(nested_path.exists());
    }

    #[test]
    fn test_append_mode() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("notifications.jsonl");

        fs::write(&file_path, "{\"existing\":\"data\"}\n").unwrap();

        let egress = Egress::new(file_path.to_str().unwrap());
        egress.write_notification(&status_changed("A1", None, SeatStatus::Empty));

        let content = fs::read_to_string(&file_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("existing"));
        assert!(lines[1].contains("empty"));
    }
}
