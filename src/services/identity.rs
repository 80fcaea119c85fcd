//! Nearest-neighbor identity matching over the enrolled passenger set
//!
//! Pure function: same query + same enrolled set + same tolerance always
//! produces the same result. The enrolled set is small (single digits to low
//! tens), so a linear scan per detected face is fine.

use crate::domain::types::{EnrolledPassenger, SeatId};

/// Sentinel name used on the wire for an unmatched face
pub const UNKNOWN_NAME: &str = "Unknown";

/// Sentinel seat used on the wire for an unmatched face
pub const UNKNOWN_SEAT: &str = "Un";

/// Result of matching one query embedding against the enrolled set
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    /// Best candidate within tolerance
    Identified { name: String, assigned_seat: SeatId, distance: f64 },
    /// No candidate within tolerance. `distance` is the minimum found, or
    /// infinity when the enrolled set was empty.
    Unknown { distance: f64 },
}

impl MatchResult {
    /// Name and seat as they appear on the wire and in logs; unmatched
    /// results use the "Unknown"/"Un" sentinels.
    pub fn wire_identity(&self) -> (&str, &str) {
        match self {
            MatchResult::Identified { name, assigned_seat, .. } => {
                (name.as_str(), assigned_seat.as_str())
            }
            MatchResult::Unknown { .. } => (UNKNOWN_NAME, UNKNOWN_SEAT),
        }
    }

    pub fn distance(&self) -> f64 {
        match self {
            MatchResult::Identified { distance, .. } => *distance,
            MatchResult::Unknown { distance } => *distance,
        }
    }
}

/// Find the enrolled passenger whose embedding is closest to `query`.
///
/// Candidates whose embedding length differs from the query are skipped;
/// enrollment loading keeps dimensions consistent, so this only guards
/// against a malformed query.
pub fn nearest_enrolled(
    query: &[f64],
    enrolled: &[EnrolledPassenger],
    tolerance: f64,
) -> MatchResult {
    let mut best: Option<(&EnrolledPassenger, f64)> = None;

    for passenger in enrolled {
        if passenger.embedding.len() != query.len() {
            continue;
        }
        let distance = euclidean(query, &passenger.embedding);
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((passenger, distance)),
        }
    }

    match best {
        None => MatchResult::Unknown { distance: f64::INFINITY },
        Some((_, distance)) if distance > tolerance => MatchResult::Unknown { distance },
        Some((passenger, distance)) => MatchResult::Identified {
            name: passenger.name.clone(),
            assigned_seat: passenger.assigned_seat.clone(),
            distance,
        },
    }
}

#[inline]
fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum::<f64>().sqrt()
}
