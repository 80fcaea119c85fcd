//! Keyed evidence windows for non-seat-scoped detector channels
//!
//! Wraps one `EvidenceWindow` per detection channel (cabin-wide weapon
//! presence, per-seat behaviour class, per-seat visible object sets).
//! Windows are created on first observation and roll continuously; no
//! hysteresis or notification dedup happens here - consumers read the
//! stabilized value once per cycle for display.

use crate::domain::evidence::EvidenceWindow;
use rustc_hash::FxHashMap;
use std::hash::Hash;

pub struct ChannelAggregator<T> {
    capacity: usize,
    windows: FxHashMap<String, EvidenceWindow<T>>,
}

impl<T> ChannelAggregator<T> {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, windows: FxHashMap::default() }
    }

    /// Record an observation for a channel, creating its window on first use
    pub fn observe(&mut self, channel: &str, value: T) {
        self.windows
            .entry(channel.to_string())
            .or_insert_with(|| EvidenceWindow::new(self.capacity))
            .observe(value);
    }

    /// Drop the history of every channel (session stop)
    pub fn reset(&mut self) {
        for window in self.windows.values_mut() {
            window.reset();
        }
    }

    pub fn channel_count(&self) -> usize {
        self.windows.len()
    }
}

impl<T: Clone + Eq + Hash> ChannelAggregator<T> {
    /// Majority-vote label for a single-label channel. Unknown channels and
    /// empty windows return `default`.
    pub fn stabilize(&self, channel: &str, default: T) -> T {
        match self.windows.get(channel) {
            Some(window) => window.stabilize(default),
            None => default,
        }
    }
}

impl<T: Clone + Ord> ChannelAggregator<Vec<T>> {
    /// Union of all labels in the window for a set-valued channel. Unknown
    /// channels return the empty set.
    pub fn stabilize_union(&self, channel: &str) -> Vec<T> {
        match self.windows.get(channel) {
            Some(window) => window.stabilize_union(),
            None => Vec::new(),
        }
    }
}
