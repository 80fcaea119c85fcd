//! Cabin monitor - central event processor
//!
//! The Monitor is the single consumer of the event channel and the only
//! writer of reconciliation state. Per event it:
//! - classifies frame embeddings into per-seat classification events
//! - feeds identity evidence windows and runs the reconciliation pass
//! - feeds detector channels (behaviour, objects, weapon presence)
//! - fans emitted notifications out to the file and MQTT sinks
//! - publishes a stabilized cabin snapshot per cycle for display consumers
//!
//! Stopping monitoring resets every window and seat state so a restarted
//! session starts clean.

use crate::domain::types::{
    epoch_ms, CycleFrame, EnrolledPassenger, MonitorEvent, SeatId, SeatNotification, SeatStatus,
};
use crate::infra::config::Config;
use crate::infra::metrics::{
    Metrics, SEAT_STATUS_CORRECT, SEAT_STATUS_EMPTY, SEAT_STATUS_INCORRECT, SEAT_STATUS_READY,
    SEAT_STATUS_UNAUTHORIZED,
};
use crate::io::egress::Egress;
use crate::io::egress_channel::{CabinSnapshotPayload, EgressSender, SeatSnapshot};
use crate::services::channels::ChannelAggregator;
use crate::services::classifier::SeatClassifier;
use crate::services::reconciler::SeatReconciler;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tracing::info;

/// Cabin-wide weapon presence channel key
const WEAPON_CHANNEL: &str = "cabin";

/// Default behaviour class when a seat channel has no evidence yet
const BEHAVIOUR_DEFAULT: &str = "Empty";

fn seat_status_code(status: SeatStatus) -> u64 {
    match status {
        SeatStatus::Empty => SEAT_STATUS_EMPTY,
        SeatStatus::Correct => SEAT_STATUS_CORRECT,
        SeatStatus::Incorrect => SEAT_STATUS_INCORRECT,
        SeatStatus::Unauthorized => SEAT_STATUS_UNAUTHORIZED,
        SeatStatus::Ready => SEAT_STATUS_READY,
    }
}

/// Central event processor for seat reconciliation and channel smoothing
pub struct Monitor {
    batch_size: usize,
    classifier: SeatClassifier,
    reconciler: SeatReconciler,
    /// Per-seat behaviour class channels (majority policy)
    behaviour: ChannelAggregator<String>,
    /// Cabin-wide weapon presence channel (majority policy)
    weapon: ChannelAggregator<bool>,
    /// Per-seat visible object channels (union policy)
    objects: ChannelAggregator<Vec<String>>,
    /// Latest seatbelt reading; absent seats read as disengaged
    belt: FxHashMap<SeatId, bool>,
    /// Writes emitted notifications to file
    egress: Egress,
    /// MQTT egress sender (optional)
    egress_sender: Option<EgressSender>,
    metrics: Arc<Metrics>,
}

impl Monitor {
    /// Create a new Monitor with the given configuration and dependencies
    pub fn new(
        config: &Config,
        enrolled: Arc<Vec<EnrolledPassenger>>,
        metrics: Arc<Metrics>,
        egress_sender: Option<EgressSender>,
    ) -> Self {
        let classifier =
            SeatClassifier::new(enrolled, config.identity_tolerance(), metrics.clone());
        let reconciler =
            SeatReconciler::new(config.seats(), config.window_capacity(), config.batch_size());
        let egress = Egress::new(config.egress_file());

        Self {
            batch_size: config.batch_size(),
            classifier,
            reconciler,
            behaviour: ChannelAggregator::new(config.channel_capacity()),
            weapon: ChannelAggregator::new(config.channel_capacity()),
            objects: ChannelAggregator::new(config.channel_capacity()),
            belt: FxHashMap::default(),
            egress,
            egress_sender,
            metrics,
        }
    }

    /// Start the monitor, consuming events from the channel.
    ///
    /// Exits when the channel closes or the shutdown signal fires; either
    /// way, all state is reset to session-start values.
    pub async fn run(
        &mut self,
        mut event_rx: mpsc::Receiver<MonitorEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("monitor_started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                event = event_rx.recv() => {
                    match event {
                        Some(e) => self.process_event(e),
                        None => break, // Channel closed
                    }
                }
            }
        }

        self.reset();
        info!("monitor_stopped");
    }

    /// Process a single event, dispatching to the appropriate handler
    pub fn process_event(&mut self, event: MonitorEvent) {
        let process_start = Instant::now();

        match event {
            MonitorEvent::Frame(frame) => {
                self.handle_frame(&frame);
            }
            MonitorEvent::Objects { channel, labels } => {
                self.objects.observe(&channel, labels);
            }
            MonitorEvent::Weapon { present } => {
                self.weapon.observe(WEAPON_CHANNEL, present);
            }
            MonitorEvent::Behaviour { seat, label } => {
                self.behaviour.observe(seat.as_str(), label);
            }
            MonitorEvent::Belt { engaged } => {
                self.belt = engaged;
            }
        }

        // Record processing latency (lock-free)
        let latency_us = process_start.elapsed().as_micros() as u64;
        self.metrics.record_event_processed(latency_us);
    }

    /// Classify a cycle frame, run the reconciliation pass, and publish
    fn handle_frame(&mut self, frame: &CycleFrame) {
        let events = self.classifier.classify_cycle(frame);
        for (seat, event) in &events {
            self.reconciler.observe(seat, event);
        }

        let due_batches = self
            .reconciler
            .seats()
            .iter()
            .filter(|seat| self.reconciler.pending_observations(seat) >= self.batch_size)
            .count();

        let notifications = self.reconciler.reconcile(&self.belt);

        if due_batches > 0 {
            self.metrics.record_batches(due_batches as u64);
            self.update_seat_gauges();
        }

        self.emit(&notifications);
        self.publish_snapshot(frame.cycle_id);
        self.metrics.record_frame();
    }

    /// Fan notifications out to the file egress and the MQTT publisher
    fn emit(&mut self, notifications: &[SeatNotification]) {
        if notifications.is_empty() {
            return;
        }

        self.egress.write_notifications(notifications);

        for notification in notifications {
            match notification {
                SeatNotification::StatusChanged { .. } => self.metrics.record_notification(),
                SeatNotification::Welcome { .. } => self.metrics.record_welcome(),
            }

            if let Some(ref sender) = self.egress_sender {
                sender.send_notification(notification);
            }
        }
    }

    /// Publish the stabilized cabin view for display consumers
    fn publish_snapshot(&self, cycle_id: u64) {
        let Some(ref sender) = self.egress_sender else { return };

        let seats = self
            .reconciler
            .seats()
            .iter()
            .filter_map(|seat| {
                let state = self.reconciler.state(seat)?;
                Some(SeatSnapshot {
                    seat: seat.as_str().to_string(),
                    status: state.status.as_str(),
                    passenger: state.passenger_name.clone(),
                    belt: state.belt_engaged,
                    behaviour: self
                        .behaviour
                        .stabilize(seat.as_str(), BEHAVIOUR_DEFAULT.to_string()),
                    objects: self.objects.stabilize_union(seat.as_str()),
                })
            })
            .collect();

        sender.send_snapshot(CabinSnapshotPayload {
            site: None,
            session: None,
            ts: epoch_ms(),
            cycle: cycle_id,
            seats,
            weapon_present: self.weapon.stabilize(WEAPON_CHANNEL, false),
        });
    }

    fn update_seat_gauges(&self) {
        for seat in self.reconciler.seats() {
            if let Some(state) = self.reconciler.state(seat) {
                self.metrics.set_seat_status(seat.as_str(), seat_status_code(state.status));
            }
        }
    }

    /// Reset all state to session-start values: windows emptied, all seats
    /// Empty, belt disengaged, nobody welcomed. Partial batches are
    /// discarded, not carried over.
    pub fn reset(&mut self) {
        self.reconciler.reset();
        self.behaviour.reset();
        self.weapon.reset();
        self.objects.reset();
        self.belt.clear();
        self.update_seat_gauges();
        info!("monitor_state_reset");
    }

    /// Current reconciled seat states (for diagnostics and tests)
    pub fn reconciler(&self) -> &SeatReconciler {
        &self.reconciler
    }
}
