//! Fixed-capacity evidence window with majority-vote stabilization
//!
//! Every noisy per-cycle classifier feeds one of these. Two stabilization
//! policies exist and are intentionally separate:
//! - `stabilize` - majority vote for single-label channels (identity,
//!   behaviour, weapon presence)
//! - `stabilize_union` - union of all labels for set-valued channels
//!   (visible object lists)

use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::hash::Hash;

/// Append-only FIFO history of classification outcomes for one tracked key
#[derive(Debug, Clone)]
pub struct EvidenceWindow<T> {
    capacity: usize,
    history: VecDeque<T>,
}

impl<T> EvidenceWindow<T> {
    /// Create a window holding at most `capacity` observations.
    ///
    /// Panics on zero capacity; config validation rejects it before any
    /// window is built.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "evidence window capacity must be positive");
        Self { capacity, history: VecDeque::with_capacity(capacity) }
    }

    /// Append an observation, evicting the oldest once at capacity
    pub fn observe(&mut self, label: T) {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(label);
    }

    /// Drop all history
    pub fn reset(&mut self) {
        self.history.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.history.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T: Clone + Eq + Hash> EvidenceWindow<T> {
    /// Return the label with the highest occurrence count in the window.
    ///
    /// Ties resolve to the label whose first occurrence index is smallest,
    /// so the result is reproducible for identical histories. An empty
    /// window returns `default`.
    pub fn stabilize(&self, default: T) -> T {
        if self.history.is_empty() {
            return default;
        }

        // (count, first occurrence index) per label
        let mut tally: FxHashMap<&T, (usize, usize)> = FxHashMap::default();
        for (idx, label) in self.history.iter().enumerate() {
            let entry = tally.entry(label).or_insert((0, idx));
            entry.0 += 1;
        }

        let mut best: Option<(&T, usize, usize)> = None;
        for (label, (count, first_idx)) in tally {
            let better = match best {
                None => true,
                Some((_, best_count, best_first)) => {
                    count > best_count || (count == best_count && first_idx < best_first)
                }
            };
            if better {
                best = Some((label, count, first_idx));
            }
        }

        best.map(|(label, _, _)| label.clone()).unwrap_or(default)
    }
}

impl<T: Clone + Ord> EvidenceWindow<Vec<T>> {
    /// Union of every label seen anywhere in the window, sorted and deduped.
    ///
    /// Used for set-valued channels where a single majority label would
    /// discard intermittently visible items.
    pub fn stabilize_union(&self) -> Vec<T> {
        let mut union: Vec<T> =
            self.history.iter().flat_map(|labels| labels.iter().cloned()).collect();
        union.sort();
        union.dedup();
        union
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "capacity must be positive")]
    fn test_zero_capacity_fails_fast() {
        let _ = EvidenceWindow::<u8>::new(0);
    }

    #[test]
    fn test_observe_respects_capacity() {
        let mut window = EvidenceWindow::new(3);

        for i in 0..10 {
            window.observe(i);
            assert!(window.len() <= 3);
        }

        // Oldest entries evicted in FIFO order
        assert_eq!(window.stabilize(0), 7); // 7, 8, 9 remain; tie -> earliest
    }

    #[test]
    fn test_stabilize_empty_returns_default() {
        let window = EvidenceWindow::<&str>::new(5);
        assert_eq!(window.stabilize("fallback"), "fallback");
    }

    #[test]
    fn test_stabilize_majority_wins() {
        let mut window = EvidenceWindow::new(5);
        for label in ["a", "b", "a", "a", "b"] {
            window.observe(label);
        }
        assert_eq!(window.stabilize("x"), "a");
    }

    #[test]
    fn test_stabilize_majority_beats_tie_break() {
        // 3x empty vs 2x unauthorized: count alone decides
        let mut window = EvidenceWindow::new(5);
        for label in ["unauthorized", "empty", "empty", "unauthorized", "empty"] {
            window.observe(label);
        }
        assert_eq!(window.stabilize("x"), "empty");
    }

    #[test]
    fn test_stabilize_tie_resolves_to_earliest_first_occurrence() {
        // 2-2-1 tie between "b" and "c"; "b" appears first at index 0
        let mut window = EvidenceWindow::new(5);
        for label in ["b", "c", "a", "c", "b"] {
            window.observe(label);
        }
        assert_eq!(window.stabilize("x"), "b");
    }

    #[test]
    fn test_stabilize_tie_break_deterministic_across_calls() {
        let mut window = EvidenceWindow::new(4);
        for label in ["c", "a", "a", "c"] {
            window.observe(label);
        }
        let first = window.stabilize("x");
        for _ in 0..50 {
            assert_eq!(window.stabilize("x"), first);
        }
        assert_eq!(first, "c");
    }

    #[test]
    fn test_reset_clears_history() {
        let mut window = EvidenceWindow::new(3);
        window.observe(1);
        window.observe(2);
        window.reset();

        assert!(window.is_empty());
        assert_eq!(window.stabilize(9), 9);
        assert_eq!(window.capacity(), 3);
    }

    #[test]
    fn test_eviction_changes_majority() {
        let mut window = EvidenceWindow::new(3);
        window.observe("a");
        window.observe("a");
        window.observe("b");
        assert_eq!(window.stabilize("x"), "a");

        // Two more "b" observations evict both "a"s
        window.observe("b");
        window.observe("b");
        assert_eq!(window.stabilize("x"), "b");
    }

    #[test]
    fn test_union_collects_all_labels() {
        let mut window = EvidenceWindow::new(3);
        window.observe(vec!["bottle".to_string(), "phone".to_string()]);
        window.observe(vec![]);
        window.observe(vec!["knife".to_string(), "bottle".to_string()]);

        let union = window.stabilize_union();
        assert_eq!(union, vec!["bottle", "knife", "phone"]);
    }

    #[test]
    fn test_union_empty_window() {
        let window = EvidenceWindow::<Vec<String>>::new(3);
        assert!(window.stabilize_union().is_empty());
    }

    #[test]
    fn test_union_respects_eviction() {
        let mut window = EvidenceWindow::new(2);
        window.observe(vec!["bag".to_string()]);
        window.observe(vec!["phone".to_string()]);
        window.observe(vec!["cup".to_string()]); // evicts "bag"

        let union = window.stabilize_union();
        assert_eq!(union, vec!["cup", "phone"]);
    }
}
