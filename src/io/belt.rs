//! Seatbelt sensor monitoring over sysfs GPIO
//!
//! Each seat maps to one GPIO line; a high level means the buckle is
//! latched. The poller publishes a full per-seat map whenever any reading
//! changes. Any read failure substitutes `false` for every seat - a belt
//! that cannot be read is treated as not engaged.

use crate::domain::types::{MonitorEvent, SeatId};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use anyhow::Context;
use rustc_hash::FxHashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::interval;
use tracing::{debug, info, warn};

pub struct BeltMonitor {
    pins: Vec<(SeatId, u32)>,
    gpio_root: PathBuf,
    poll_interval: Duration,
    last: Option<FxHashMap<SeatId, bool>>,
    event_tx: mpsc::Sender<MonitorEvent>,
    metrics: Arc<Metrics>,
}

impl BeltMonitor {
    pub fn new(config: &Config, event_tx: mpsc::Sender<MonitorEvent>, metrics: Arc<Metrics>) -> Self {
        Self {
            pins: config.belt_pins().to_vec(),
            gpio_root: PathBuf::from(config.belt_gpio_root()),
            poll_interval: Duration::from_millis(config.belt_poll_interval_ms()),
            last: None,
            event_tx,
            metrics,
        }
    }

    fn read_pin(&self, pin: u32) -> anyhow::Result<bool> {
        let path = self.gpio_root.join(format!("gpio{}", pin)).join("value");
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read GPIO value {}", path.display()))?;
        Ok(raw.trim() == "1")
    }

    /// Read every configured pin. On any failure the whole map degrades to
    /// false - partial readings would let a stale "engaged" survive a
    /// broken sensor.
    pub fn read_all(&self) -> FxHashMap<SeatId, bool> {
        let mut engaged = FxHashMap::default();

        for (seat, pin) in &self.pins {
            match self.read_pin(*pin) {
                Ok(state) => {
                    engaged.insert(seat.clone(), state);
                }
                Err(e) => {
                    warn!(seat = %seat, pin = %pin, error = %e, "belt_read_failed");
                    self.metrics.record_belt_read_failure();
                    return self.all_disengaged();
                }
            }
        }

        engaged
    }

    fn all_disengaged(&self) -> FxHashMap<SeatId, bool> {
        self.pins.iter().map(|(seat, _)| (seat.clone(), false)).collect()
    }

    /// Start the polling loop
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        if self.pins.is_empty() {
            info!("belt_monitor_disabled_no_pins");
            return;
        }

        info!(
            gpio_root = %self.gpio_root.display(),
            pins = %self.pins.len(),
            poll_interval_ms = %self.poll_interval.as_millis(),
            "belt_monitor_started"
        );

        let mut poll_timer = interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("belt_monitor_shutdown");
                        return;
                    }
                }
                _ = poll_timer.tick() => {}
            }

            let engaged = self.read_all();

            if self.last.as_ref() != Some(&engaged) {
                let latched = engaged.values().filter(|&&v| v).count();
                info!(latched = %latched, total = %engaged.len(), "belt_state_changed");

                if let Err(e) = self.event_tx.try_send(MonitorEvent::Belt { engaged: engaged.clone() }) {
                    warn!(error = %e, "failed to send belt state event");
                }

                self.last = Some(engaged);
            } else {
                // Routine polling stays at debug level to avoid log spam
                debug!(pins = %engaged.len(), "belt_poll_unchanged");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn monitor_with_root(root: &std::path::Path) -> (BeltMonitor, mpsc::Receiver<MonitorEvent>) {
        let (tx, rx) = mpsc::channel(8);
        let mut monitor =
            BeltMonitor::new(&Config::default(), tx, Arc::new(Metrics::new()));
        monitor.gpio_root = root.to_path_buf();
        (monitor, rx)
    }

    fn write_pin(root: &std::path::Path, pin: u32, value: &str) {
        let dir = root.join(format!("gpio{}", pin));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("value"), value).unwrap();
    }

    #[test]
    fn test_read_all_reports_latched_pins() {
        let dir = tempdir().unwrap();
        // Default pin map: A1=31, A2=7, B1=33, B2=29
        write_pin(dir.path(), 31, "1\n");
        write_pin(dir.path(), 7, "0\n");
        write_pin(dir.path(), 33, "1\n");
        write_pin(dir.path(), 29, "0\n");

        let (monitor, _rx) = monitor_with_root(dir.path());
        let engaged = monitor.read_all();

        assert_eq!(engaged[&SeatId::new("A1")], true);
        assert_eq!(engaged[&SeatId::new("A2")], false);
        assert_eq!(engaged[&SeatId::new("B1")], true);
        assert_eq!(engaged[&SeatId::new("B2")], false);
    }

    #[test]
    fn test_read_failure_degrades_every_seat_to_false() {
        let dir = tempdir().unwrap();
        // Only one pin present; the others will fail to read
        write_pin(dir.path(), 31, "1\n");

        let (monitor, _rx) = monitor_with_root(dir.path());
        let engaged = monitor.read_all();

        assert_eq!(engaged.len(), 4);
        assert!(engaged.values().all(|&v| !v));
        assert_eq!(monitor.metrics.belt_read_failures_total(), 1);
    }

    #[test]
    fn test_unexpected_value_reads_as_disengaged() {
        let dir = tempdir().unwrap();
        write_pin(dir.path(), 31, "garbage\n");
        write_pin(dir.path(), 7, "1\n");
        write_pin(dir.path(), 33, "0\n");
        write_pin(dir.path(), 29, "0\n");

        let (monitor, _rx) = monitor_with_root(dir.path());
        let engaged = monitor.read_all();

        assert_eq!(engaged[&SeatId::new("A1")], false);
        assert_eq!(engaged[&SeatId::new("A2")], true);
    }
}
