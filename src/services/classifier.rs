//! Turns raw per-seat embeddings into classification events
//!
//! The external feature extractor returns zero, one, or many embeddings per
//! seat region. Exactly one is matchable; zero means the seat looks empty;
//! several means the detection is ambiguous and treated as unauthorized.

use crate::domain::types::{
    ClassLabel, ClassificationEvent, CycleFrame, EnrolledPassenger, SeatId,
};
use crate::infra::metrics::Metrics;
use crate::services::identity::{nearest_enrolled, MatchResult};
use std::sync::Arc;
use tracing::{debug, warn};

/// Stateless per-seat classifier over the frozen enrolled set
pub struct SeatClassifier {
    enrolled: Arc<Vec<EnrolledPassenger>>,
    tolerance: f64,
    /// Embedding length of the enrolled set (None when nothing is enrolled)
    embedding_dim: Option<usize>,
    metrics: Arc<Metrics>,
}

impl SeatClassifier {
    pub fn new(enrolled: Arc<Vec<EnrolledPassenger>>, tolerance: f64, metrics: Arc<Metrics>) -> Self {
        let embedding_dim = enrolled.first().map(|p| p.embedding.len());
        Self { enrolled, tolerance, embedding_dim, metrics }
    }

    /// Classify every seat in a cycle frame.
    ///
    /// A degraded observation for one seat never affects the others.
    pub fn classify_cycle(&self, frame: &CycleFrame) -> Vec<(SeatId, ClassificationEvent)> {
        frame
            .seats
            .iter()
            .map(|(seat, embeddings)| {
                let event = self.classify_seat(frame.cycle_id, seat, embeddings);
                (seat.clone(), event)
            })
            .collect()
    }

    fn classify_seat(
        &self,
        cycle_id: u64,
        seat: &SeatId,
        embeddings: &[Vec<f64>],
    ) -> ClassificationEvent {
        let label = match embeddings {
            [] => ClassLabel::Empty,
            [query] => self.match_single(seat, query),
            _ => {
                debug!(
                    seat = %seat,
                    cycle = %cycle_id,
                    detections = %embeddings.len(),
                    "ambiguous_seat_detection"
                );
                ClassLabel::Unauthorized
            }
        };

        ClassificationEvent { cycle_id, label }
    }

    fn match_single(&self, seat: &SeatId, query: &[f64]) -> ClassLabel {
        // A query that cannot be compared to anything enrolled is a degraded
        // cycle, not an intruder: observe the seat as empty and move on.
        if let Some(dim) = self.embedding_dim {
            if query.len() != dim {
                warn!(
                    seat = %seat,
                    got = %query.len(),
                    expected = %dim,
                    "embedding_dimension_mismatch"
                );
                self.metrics.record_classify_error();
                return ClassLabel::Empty;
            }
        }

        let result = nearest_enrolled(query, &self.enrolled, self.tolerance);
        let (matched, assigned) = result.wire_identity();
        debug!(
            seat = %seat,
            matched = %matched,
            assigned = %assigned,
            distance = %result.distance(),
            "face_verification"
        );

        match result {
            MatchResult::Identified { name, assigned_seat, distance } => {
                ClassLabel::Identified { name, assigned_seat, distance }
            }
            MatchResult::Unknown { .. } => ClassLabel::Unauthorized,
        }
    }
}
