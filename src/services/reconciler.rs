//! Per-seat reconciliation state machine
//!
//! Consumes stabilized identity evidence plus the seatbelt reading and owns
//! the externally visible seat states. Responsibilities:
//! - batch stabilization: a seat's status can only change after a full batch
//!   of observations agrees (flicker suppression)
//! - belt fusion: a correctly seated passenger becomes Ready only while the
//!   belt reads engaged, and drops back to Correct when it releases
//! - notification dedup: at most one status event per real transition, at
//!   most one welcome per passenger per session

use crate::domain::evidence::EvidenceWindow;
use crate::domain::types::{
    ClassLabel, ClassificationEvent, IdentityLabel, SeatId, SeatNotification, SeatStatus,
};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use tracing::{debug, info};

/// Reconciled state for a single seat
#[derive(Debug, Clone)]
pub struct SeatState {
    pub seat: SeatId,
    /// Name attached to the current status (None for Empty/Unauthorized)
    pub passenger_name: Option<String>,
    pub status: SeatStatus,
    /// Status of the last emitted notification. Updated only when a
    /// notification actually goes out.
    pub last_notified: Option<SeatStatus>,
    pub belt_engaged: bool,
    /// How many consecutive stabilization passes produced this status
    pub consecutive_same_status: u32,
}

impl SeatState {
    fn new(seat: SeatId) -> Self {
        Self {
            seat,
            passenger_name: None,
            status: SeatStatus::Empty,
            last_notified: None,
            belt_engaged: false,
            consecutive_same_status: 0,
        }
    }
}

/// Owns one evidence window and one `SeatState` per configured seat
pub struct SeatReconciler {
    seats: SmallVec<[SeatId; 4]>,
    window_capacity: usize,
    batch_size: usize,
    windows: FxHashMap<SeatId, EvidenceWindow<IdentityLabel>>,
    states: FxHashMap<SeatId, SeatState>,
    /// Most recent matched name per seat, attached to identity notifications
    last_identified: FxHashMap<SeatId, String>,
    /// Passengers already welcomed this session
    welcomed: FxHashSet<String>,
}

impl SeatReconciler {
    pub fn new(seats: &[SeatId], window_capacity: usize, batch_size: usize) -> Self {
        let windows = seats
            .iter()
            .map(|seat| (seat.clone(), EvidenceWindow::new(window_capacity)))
            .collect();
        let states =
            seats.iter().map(|seat| (seat.clone(), SeatState::new(seat.clone()))).collect();

        Self {
            seats: seats.iter().cloned().collect(),
            window_capacity,
            batch_size,
            windows,
            states,
            last_identified: FxHashMap::default(),
            welcomed: FxHashSet::default(),
        }
    }

    /// Feed one classification outcome into the seat's evidence window
    pub fn observe(&mut self, seat: &SeatId, event: &ClassificationEvent) {
        let Some(window) = self.windows.get_mut(seat) else {
            debug!(seat = %seat, "observation_for_untracked_seat");
            return;
        };

        let label = match &event.label {
            ClassLabel::Empty => IdentityLabel::Empty,
            ClassLabel::Identified { name, assigned_seat, .. } => {
                self.last_identified.insert(seat.clone(), name.clone());
                if assigned_seat == seat {
                    IdentityLabel::CorrectIdentity
                } else {
                    IdentityLabel::IncorrectIdentity
                }
            }
            ClassLabel::Unauthorized => IdentityLabel::UnauthorizedIdentity,
        };

        window.observe(label);
    }

    /// Run one reconciliation pass over every seat whose window has a full
    /// batch. Windows that complete a batch are reset, so batches never
    /// overlap. Returns the notifications to emit, in seat order.
    pub fn reconcile(&mut self, belt: &FxHashMap<SeatId, bool>) -> Vec<SeatNotification> {
        let mut notifications = Vec::new();

        for seat in self.seats.clone() {
            let Some(window) = self.windows.get_mut(&seat) else { continue };
            if window.len() < self.batch_size {
                continue;
            }

            let stabilized = window.stabilize(IdentityLabel::Empty);
            window.reset();

            let belt_engaged = belt.get(&seat).copied().unwrap_or(false);
            let target = match stabilized {
                IdentityLabel::Empty => SeatStatus::Empty,
                IdentityLabel::CorrectIdentity if belt_engaged => SeatStatus::Ready,
                IdentityLabel::CorrectIdentity => SeatStatus::Correct,
                IdentityLabel::IncorrectIdentity => SeatStatus::Incorrect,
                IdentityLabel::UnauthorizedIdentity => SeatStatus::Unauthorized,
            };

            let passenger = match stabilized {
                IdentityLabel::CorrectIdentity | IdentityLabel::IncorrectIdentity => {
                    self.last_identified.get(&seat).cloned()
                }
                _ => None,
            };

            let Some(state) = self.states.get_mut(&seat) else { continue };
            state.belt_engaged = belt_engaged;

            if target == state.status {
                state.consecutive_same_status += 1;
                debug!(
                    seat = %seat,
                    status = %target.as_str(),
                    consecutive = %state.consecutive_same_status,
                    "seat_status_stable"
                );
                continue;
            }

            info!(
                seat = %seat,
                from = %state.status.as_str(),
                to = %target.as_str(),
                passenger = %passenger.as_deref().unwrap_or("-"),
                "seat_status_changed"
            );

            state.status = target;
            state.passenger_name = passenger.clone();
            state.consecutive_same_status = 1;
            state.last_notified = Some(target);

            notifications.push(SeatNotification::StatusChanged {
                seat: seat.clone(),
                passenger: passenger.clone(),
                status: target,
            });

            // One-shot welcome on the first correct seating of a passenger
            if matches!(target, SeatStatus::Correct | SeatStatus::Ready) {
                if let Some(name) = passenger {
                    if self.welcomed.insert(name.clone()) {
                        info!(seat = %seat, passenger = %name, "passenger_welcomed");
                        notifications.push(SeatNotification::Welcome {
                            seat: seat.clone(),
                            passenger: name,
                        });
                    }
                }
            }
        }

        notifications
    }

    /// Reset everything to the session-start state: empty windows, all seats
    /// Empty, nobody welcomed. Used when monitoring stops so a restart is
    /// clean; partial batches are discarded.
    pub fn reset(&mut self) {
        for window in self.windows.values_mut() {
            window.reset();
        }
        for seat in &self.seats {
            self.states.insert(seat.clone(), SeatState::new(seat.clone()));
        }
        self.last_identified.clear();
        self.welcomed.clear();
    }

    /// Current state of a seat
    pub fn state(&self, seat: &SeatId) -> Option<&SeatState> {
        self.states.get(seat)
    }

    /// Seats in configuration order
    pub fn seats(&self) -> &[SeatId] {
        &self.seats
    }

    /// Number of observations buffered for a seat's current batch
    pub fn pending_observations(&self, seat: &SeatId) -> usize {
        self.windows.get(seat).map(|w| w.len()).unwrap_or(0)
    }

    #[allow(dead_code)]
    pub fn window_capacity(&self) -> usize {
        self.window_capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seats() -> Vec<SeatId> {
        vec![SeatId::new("S1"), SeatId::new("S2")]
    }

    fn reconciler() -> SeatReconciler {
        SeatReconciler::new(&seats(), 5, 5)
    }

    fn identified(cycle_id: u64, name: &str, assigned: &str) -> ClassificationEvent {
        ClassificationEvent {
            cycle_id,
            label: ClassLabel::Identified {
                name: name.to_string(),
                assigned_seat: SeatId::new(assigned),
                distance: 0.3,
            },
        }
    }

    fn empty(cycle_id: u64) -> ClassificationEvent {
        ClassificationEvent { cycle_id, label: ClassLabel::Empty }
    }

    fn unauthorized(cycle_id: u64) -> ClassificationEvent {
        ClassificationEvent { cycle_id, label: ClassLabel::Unauthorized }
    }

    fn no_belt() -> FxHashMap<SeatId, bool> {
        FxHashMap::default()
    }

    fn belt_for(seat: &str) -> FxHashMap<SeatId, bool> {
        let mut map = FxHashMap::default();
        map.insert(SeatId::new(seat), true);
        map
    }

    fn observe_batch(r: &mut SeatReconciler, seat: &str, events: &[ClassificationEvent]) {
        let seat = SeatId::new(seat);
        for event in events {
            r.observe(&seat, event);
        }
    }

    #[test]
    fn test_five_correct_observations_transition_to_correct() {
        let mut r = reconciler();
        let events: Vec<_> = (0..5).map(|i| identified(i, "Alice", "S1")).collect();
        observe_batch(&mut r, "S1", &events);

        let notifications = r.reconcile(&no_belt());

        // One status change plus the one-shot welcome
        assert_eq!(
            notifications,
            vec![
                SeatNotification::StatusChanged {
                    seat: SeatId::new("S1"),
                    passenger: Some("Alice".to_string()),
                    status: SeatStatus::Correct,
                },
                SeatNotification::Welcome {
                    seat: SeatId::new("S1"),
                    passenger: "Alice".to_string(),
                },
            ]
        );

        let state = r.state(&SeatId::new("S1")).unwrap();
        assert_eq!(state.status, SeatStatus::Correct);
        assert_eq!(state.last_notified, Some(SeatStatus::Correct));
        assert_eq!(state.consecutive_same_status, 1);
    }

    #[test]
    fn test_belt_engagement_promotes_to_ready_without_rewelcome() {
        let mut r = reconciler();

        let events: Vec<_> = (0..5).map(|i| identified(i, "Alice", "S1")).collect();
        observe_batch(&mut r, "S1", &events);
        r.reconcile(&no_belt());

        // Next batch with belt engaged
        let events: Vec<_> = (5..10).map(|i| identified(i, "Alice", "S1")).collect();
        observe_batch(&mut r, "S1", &events);
        let notifications = r.reconcile(&belt_for("S1"));

        assert_eq!(
            notifications,
            vec![SeatNotification::StatusChanged {
                seat: SeatId::new("S1"),
                passenger: Some("Alice".to_string()),
                status: SeatStatus::Ready,
            }]
        );

        let state = r.state(&SeatId::new("S1")).unwrap();
        assert_eq!(state.status, SeatStatus::Ready);
        assert!(state.belt_engaged);
    }

    #[test]
    fn test_belt_release_downgrades_ready_to_correct() {
        let mut r = reconciler();

        let events: Vec<_> = (0..5).map(|i| identified(i, "Alice", "S1")).collect();
        observe_batch(&mut r, "S1", &events);
        r.reconcile(&belt_for("S1"));
        assert_eq!(r.state(&SeatId::new("S1")).unwrap().status, SeatStatus::Ready);

        let events: Vec<_> = (5..10).map(|i| identified(i, "Alice", "S1")).collect();
        observe_batch(&mut r, "S1", &events);
        let notifications = r.reconcile(&no_belt());

        assert_eq!(notifications.len(), 1);
        assert!(matches!(
            notifications[0],
            SeatNotification::StatusChanged { status: SeatStatus::Correct, .. }
        ));
    }

    #[test]
    fn test_identical_batches_emit_once() {
        let mut r = reconciler();

        let events: Vec<_> = (0..5).map(|i| identified(i, "Alice", "S1")).collect();
        observe_batch(&mut r, "S1", &events);
        let first = r.reconcile(&no_belt());
        assert_eq!(first.len(), 2); // status + welcome

        let events: Vec<_> = (5..10).map(|i| identified(i, "Alice", "S1")).collect();
        observe_batch(&mut r, "S1", &events);
        let second = r.reconcile(&no_belt());

        assert!(second.is_empty());
        let state = r.state(&SeatId::new("S1")).unwrap();
        assert_eq!(state.consecutive_same_status, 2);
        assert_eq!(state.last_notified, Some(SeatStatus::Correct));
    }

    #[test]
    fn test_partial_batch_does_not_reconcile() {
        let mut r = reconciler();

        let events: Vec<_> = (0..4).map(|i| identified(i, "Alice", "S1")).collect();
        observe_batch(&mut r, "S1", &events);

        let notifications = r.reconcile(&no_belt());
        assert!(notifications.is_empty());
        assert_eq!(r.pending_observations(&SeatId::new("S1")), 4);
        assert_eq!(r.state(&SeatId::new("S1")).unwrap().status, SeatStatus::Empty);
    }

    #[test]
    fn test_window_reset_after_batch() {
        let mut r = reconciler();

        let events: Vec<_> = (0..5).map(|i| identified(i, "Alice", "S1")).collect();
        observe_batch(&mut r, "S1", &events);
        r.reconcile(&no_belt());

        assert_eq!(r.pending_observations(&SeatId::new("S1")), 0);
    }

    #[test]
    fn test_wrong_seat_is_incorrect() {
        let mut r = reconciler();

        // Bob assigned to S2 but observed in S1
        let events: Vec<_> = (0..5).map(|i| identified(i, "Bob", "S2")).collect();
        observe_batch(&mut r, "S1", &events);
        let notifications = r.reconcile(&no_belt());

        assert_eq!(
            notifications,
            vec![SeatNotification::StatusChanged {
                seat: SeatId::new("S1"),
                passenger: Some("Bob".to_string()),
                status: SeatStatus::Incorrect,
            }]
        );
    }

    #[test]
    fn test_majority_empty_beats_unauthorized_minority() {
        let mut r = reconciler();

        let events = vec![empty(0), empty(1), unauthorized(2), empty(3), unauthorized(4)];
        observe_batch(&mut r, "S1", &events);
        let notifications = r.reconcile(&no_belt());

        // 3x empty wins and Empty is the initial status, so nothing fires
        assert!(notifications.is_empty());
        assert_eq!(r.state(&SeatId::new("S1")).unwrap().status, SeatStatus::Empty);
    }

    #[test]
    fn test_unauthorized_majority_notifies_without_name() {
        let mut r = reconciler();

        let events: Vec<_> = (0..5).map(unauthorized).collect();
        observe_batch(&mut r, "S1", &events);
        let notifications = r.reconcile(&no_belt());

        assert_eq!(
            notifications,
            vec![SeatNotification::StatusChanged {
                seat: SeatId::new("S1"),
                passenger: None,
                status: SeatStatus::Unauthorized,
            }]
        );
    }

    #[test]
    fn test_welcome_not_reissued_after_leaving_and_returning() {
        let mut r = reconciler();

        let events: Vec<_> = (0..5).map(|i| identified(i, "Alice", "S1")).collect();
        observe_batch(&mut r, "S1", &events);
        r.reconcile(&no_belt());

        // Alice leaves
        let events: Vec<_> = (5..10).map(empty).collect();
        observe_batch(&mut r, "S1", &events);
        let leave = r.reconcile(&no_belt());
        assert_eq!(leave.len(), 1); // Empty status change only

        // Alice returns: status change fires, welcome does not
        let events: Vec<_> = (10..15).map(|i| identified(i, "Alice", "S1")).collect();
        observe_batch(&mut r, "S1", &events);
        let back = r.reconcile(&no_belt());

        assert_eq!(
            back,
            vec![SeatNotification::StatusChanged {
                seat: SeatId::new("S1"),
                passenger: Some("Alice".to_string()),
                status: SeatStatus::Correct,
            }]
        );
    }

    #[test]
    fn test_seats_reconcile_independently() {
        let mut r = reconciler();

        let events: Vec<_> = (0..5).map(|i| identified(i, "Alice", "S1")).collect();
        observe_batch(&mut r, "S1", &events);
        // S2 only has a partial batch
        let events: Vec<_> = (0..3).map(|i| identified(i, "Bob", "S2")).collect();
        observe_batch(&mut r, "S2", &events);

        let notifications = r.reconcile(&no_belt());

        assert_eq!(notifications.len(), 2); // S1 status + welcome
        assert_eq!(r.state(&SeatId::new("S2")).unwrap().status, SeatStatus::Empty);
        assert_eq!(r.pending_observations(&SeatId::new("S2")), 3);
    }

    #[test]
    fn test_untracked_seat_ignored() {
        let mut r = reconciler();

        r.observe(&SeatId::new("Z9"), &identified(0, "Alice", "Z9"));

        assert_eq!(r.pending_observations(&SeatId::new("Z9")), 0);
        assert!(r.state(&SeatId::new("Z9")).is_none());
    }

    #[test]
    fn test_reset_restores_session_start_state() {
        let mut r = reconciler();

        let events: Vec<_> = (0..5).map(|i| identified(i, "Alice", "S1")).collect();
        observe_batch(&mut r, "S1", &events);
        r.reconcile(&belt_for("S1"));
        r.observe(&SeatId::new("S2"), &identified(5, "Bob", "S2"));

        r.reset();

        let state = r.state(&SeatId::new("S1")).unwrap();
        assert_eq!(state.status, SeatStatus::Empty);
        assert_eq!(state.last_notified, None);
        assert!(!state.belt_engaged);
        assert_eq!(r.pending_observations(&SeatId::new("S2")), 0);

        // Welcome fires again in the new session
        let events: Vec<_> = (0..5).map(|i| identified(i, "Alice", "S1")).collect();
        observe_batch(&mut r, "S1", &events);
        let notifications = r.reconcile(&no_belt());
        assert!(notifications
            .iter()
            .any(|n| matches!(n, SeatNotification::Welcome { .. })));
    }
}
