//! Shared types for the cabin monitor

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Newtype wrapper for seat names ("A1", "B2", ...) to provide type safety
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeatId(pub String);

impl SeatId {
    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SeatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SeatId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Externally visible status of a seat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatStatus {
    /// Nobody detected in the seat
    Empty,
    /// Enrolled passenger in their assigned seat, belt not engaged
    Correct,
    /// Enrolled passenger in somebody else's seat
    Incorrect,
    /// Unenrolled or ambiguous detection
    Unauthorized,
    /// Enrolled passenger in their assigned seat with belt engaged
    Ready,
}

impl SeatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatStatus::Empty => "empty",
            SeatStatus::Correct => "correct",
            SeatStatus::Incorrect => "incorrect",
            SeatStatus::Unauthorized => "unauthorized",
            SeatStatus::Ready => "ready",
        }
    }
}

/// Discrete per-cycle label fed into a seat's evidence window.
///
/// Correct/Incorrect is decided by comparing the matched passenger's
/// assigned seat against the seat the observation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityLabel {
    Empty,
    CorrectIdentity,
    IncorrectIdentity,
    UnauthorizedIdentity,
}

/// A known passenger with a reference embedding and an assigned seat.
///
/// Loaded once per session from the enrollment store, read-only after.
#[derive(Debug, Clone)]
pub struct EnrolledPassenger {
    pub name: String,
    pub assigned_seat: SeatId,
    pub embedding: Vec<f64>,
}

/// Outcome of classifying one seat region for one cycle
#[derive(Debug, Clone, PartialEq)]
pub enum ClassLabel {
    /// No face detected in the seat region
    Empty,
    /// Exactly one face, matched to an enrolled passenger
    Identified { name: String, assigned_seat: SeatId, distance: f64 },
    /// No enrolled match, or multiple/ambiguous detections
    Unauthorized,
}

/// One classification outcome per seat per cycle
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationEvent {
    pub cycle_id: u64,
    pub label: ClassLabel,
}

/// Raw face embedding vector produced by the external feature extractor
pub type Embedding = Vec<f64>;

/// Per-seat embeddings for one processing cycle
#[derive(Debug, Clone)]
pub struct CycleFrame {
    pub cycle_id: u64,
    /// Zero, one, or many embeddings per seat; exactly one is matchable
    pub seats: Vec<(SeatId, Vec<Embedding>)>,
    pub received_at: Instant,
}

/// Internal event fed to the monitor loop
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// A full cycle of per-seat embeddings from the vision pipeline
    Frame(CycleFrame),
    /// Set-valued detector channel observation (visible objects)
    Objects { channel: String, labels: Vec<String> },
    /// Cabin-wide weapon presence observation
    Weapon { present: bool },
    /// Per-seat behaviour class observation
    Behaviour { seat: SeatId, label: String },
    /// Fresh seatbelt reading for every seat
    Belt { engaged: FxHashMap<SeatId, bool> },
}

/// Reconciliation output delivered to the notification sinks
#[derive(Debug, Clone, PartialEq)]
pub enum SeatNotification {
    /// The stabilized status of a seat changed. Emitted at most once per
    /// real transition.
    StatusChanged { seat: SeatId, passenger: Option<String>, status: SeatStatus },
    /// First time this passenger was seen seated correctly this session
    Welcome { seat: SeatId, passenger: String },
}

/// Wire message published by the external vision pipeline
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VisionMessage {
    Frame {
        cycle: u64,
        #[serde(default)]
        seats: std::collections::HashMap<String, SeatObservation>,
    },
    Objects {
        channel: String,
        #[serde(default)]
        labels: Vec<String>,
    },
    Weapon {
        present: bool,
    },
    Behaviour {
        seat: String,
        label: String,
    },
}

/// Per-seat payload inside a frame message
#[derive(Debug, Default, Deserialize)]
pub struct SeatObservation {
    #[serde(default)]
    pub embeddings: Vec<Embedding>,
}
