//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; reporting is the only operation
//! that needs synchronization (via atomic swap).
//!
//! NOTE: All atomics use Relaxed ordering intentionally—these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

/// Number of histogram buckets (exported for egress payloads)
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

/// Exported bucket bounds for Prometheus formatting
pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;

/// Seat status gauge values
pub const SEAT_STATUS_EMPTY: u64 = 0;
pub const SEAT_STATUS_CORRECT: u64 = 1;
pub const SEAT_STATUS_INCORRECT: u64 = 2;
pub const SEAT_STATUS_UNAUTHORIZED: u64 = 3;
pub const SEAT_STATUS_READY: u64 = 4;

/// Maximum number of seats to track
pub const MAX_SEATS: usize = 8;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Swap all buckets to zero and return their values
#[inline]
fn swap_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.swap(0, Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = (total as f64 * percentile) as u64;
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
///
/// All recording operations are lock-free using atomics.
/// The `report()` method atomically swaps periodic counters to get a
/// consistent snapshot.
pub struct Metrics {
    /// Total events ever processed (monotonic)
    events_total: AtomicU64,
    /// Events since last report (reset on report)
    events_since_report: AtomicU64,
    /// Sum of latencies in microseconds (reset on report)
    latency_sum_us: AtomicU64,
    /// Max latency in microseconds (reset on report)
    latency_max_us: AtomicU64,
    /// Event processing latency histogram buckets (reset on report)
    latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Vision cycles processed (monotonic)
    frames_total: AtomicU64,
    /// Stabilization passes completed (monotonic)
    batches_total: AtomicU64,
    /// Status-change notifications emitted (monotonic)
    notifications_total: AtomicU64,
    /// Welcome one-shots emitted (monotonic)
    welcomes_total: AtomicU64,
    /// Degraded classification cycles (monotonic)
    classify_errors_total: AtomicU64,
    /// Seatbelt reads that fell back to all-false (monotonic)
    belt_read_failures_total: AtomicU64,
    /// Enrollment records skipped at load (set once at startup)
    enrollment_skipped_total: AtomicU64,
    /// Ingest events dropped due to channel full (monotonic)
    events_dropped: AtomicU64,
    /// Current status per seat (gauge, SEAT_STATUS_* values)
    seat_status: [AtomicU64; MAX_SEATS],
    /// Seat names in gauge order (set once at init)
    seat_names: parking_lot::Mutex<Vec<String>>,
    /// Pre-computed seat name to index mapping (for lookup without mutex)
    seat_index: parking_lot::RwLock<FxHashMap<String, usize>>,
    /// Last report time (only accessed from reporter, not atomic)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            events_total: AtomicU64::new(0),
            events_since_report: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            frames_total: AtomicU64::new(0),
            batches_total: AtomicU64::new(0),
            notifications_total: AtomicU64::new(0),
            welcomes_total: AtomicU64::new(0),
            classify_errors_total: AtomicU64::new(0),
            belt_read_failures_total: AtomicU64::new(0),
            enrollment_skipped_total: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            seat_status: std::array::from_fn(|_| AtomicU64::new(SEAT_STATUS_EMPTY)),
            seat_names: parking_lot::Mutex::new(Vec::new()),
            seat_index: parking_lot::RwLock::new(FxHashMap::default()),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Set the monitored seat names (call once at initialization)
    pub fn set_seats(&self, seats: &[String]) {
        let mut names = self.seat_names.lock();
        names.clear();
        names.extend(seats.iter().take(MAX_SEATS).cloned());

        let mut index_map = self.seat_index.write();
        index_map.clear();
        for (idx, seat) in seats.iter().take(MAX_SEATS).enumerate() {
            index_map.insert(seat.clone(), idx);
        }
    }

    /// Update the status gauge for a seat (SEAT_STATUS_* values)
    #[inline]
    pub fn set_seat_status(&self, seat: &str, status: u64) {
        let index_map = self.seat_index.read();
        if let Some(&idx) = index_map.get(seat) {
            self.seat_status[idx].store(status, Ordering::Relaxed);
        }
    }

    /// Current status gauge for every seat, in configured order
    pub fn seat_statuses(&self) -> Vec<(String, u64)> {
        let names = self.seat_names.lock();
        names
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), self.seat_status[idx].load(Ordering::Relaxed)))
            .collect()
    }

    /// Record an event was processed with given latency (lock-free)
    #[inline]
    pub fn record_event_processed(&self, latency_us: u64) {
        self.events_total.fetch_add(1, Ordering::Relaxed);
        self.events_since_report.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);

        let bucket = bucket_index(latency_us);
        self.latency_buckets[bucket].fetch_add(1, Ordering::Relaxed);

        update_atomic_max(&self.latency_max_us, latency_us);
    }

    #[inline]
    pub fn record_frame(&self) {
        self.frames_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_batches(&self, count: u64) {
        self.batches_total.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_notification(&self) {
        self.notifications_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_welcome(&self) {
        self.welcomes_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_classify_error(&self) {
        self.classify_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_belt_read_failure(&self) {
        self.belt_read_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_enrollment_skipped(&self) {
        self.enrollment_skipped_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn events_total(&self) -> u64 {
        self.events_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn frames_total(&self) -> u64 {
        self.frames_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn batches_total(&self) -> u64 {
        self.batches_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn notifications_total(&self) -> u64 {
        self.notifications_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn welcomes_total(&self) -> u64 {
        self.welcomes_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn classify_errors_total(&self) -> u64 {
        self.classify_errors_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn belt_read_failures_total(&self) -> u64 {
        self.belt_read_failures_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn enrollment_skipped_total(&self) -> u64 {
        self.enrollment_skipped_total.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn events_dropped(&self) -> u64 {
        self.events_dropped.load(Ordering::Relaxed)
    }

    /// Calculate and return a metrics summary, then reset periodic counters
    ///
    /// This is the only method that resets counters. It uses atomic swap
    /// to get a consistent snapshot while allowing concurrent updates.
    pub fn report(&self) -> MetricsSummary {
        let events_count = self.events_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let max_latency = self.latency_max_us.swap(0, Ordering::Relaxed);
        let lat_buckets = swap_buckets(&self.latency_buckets);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let events_per_sec = if elapsed.as_secs_f64() > 0.0 {
            events_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        let avg_latency = if events_count > 0 { latency_sum / events_count } else { 0 };

        let seat_gauges = self.seat_statuses();
        let occupied_seats =
            seat_gauges.iter().filter(|(_, s)| *s != SEAT_STATUS_EMPTY).count();
        let ready_seats = seat_gauges.iter().filter(|(_, s)| *s == SEAT_STATUS_READY).count();

        MetricsSummary {
            events_total: self.events_total(),
            events_per_sec,
            avg_process_latency_us: avg_latency,
            max_process_latency_us: max_latency,
            lat_buckets,
            lat_p50_us: percentile_from_buckets(&lat_buckets, 0.50),
            lat_p95_us: percentile_from_buckets(&lat_buckets, 0.95),
            lat_p99_us: percentile_from_buckets(&lat_buckets, 0.99),
            frames_total: self.frames_total(),
            batches_total: self.batches_total(),
            notifications_total: self.notifications_total(),
            welcomes_total: self.welcomes_total(),
            classify_errors_total: self.classify_errors_total(),
            belt_read_failures_total: self.belt_read_failures_total(),
            events_dropped: self.events_dropped(),
            occupied_seats,
            ready_seats,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct MetricsSummary {
    pub events_total: u64,
    pub events_per_sec: f64,
    pub avg_process_latency_us: u64,
    pub max_process_latency_us: u64,
    /// Event processing latency histogram buckets
    /// Bounds: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200 µs
    pub lat_buckets: [u64; NUM_BUCKETS],
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
    /// Status-change notifications emitted
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

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            events_total = %self.events_total,
            events_per_sec = format!("{:.1}", self.events_per_sec),
            avg_latency_us = %self.avg_process_latency_us,
            max_latency_us = %self.max_process_latency_us,
            p50_us = %self.lat_p50_us,
            p95_us = %self.lat_p95_us,
            p99_us = %self.lat_p99_us,
            frames = %self.frames_total,
            batches = %self.batches_total,
            notifications = %self.notifications_total,
            welcomes = %self.welcomes_total,
            occupied_seats = %self.occupied_seats,
            ready_seats = %self.ready_seats,
            "metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.events_total(), 0);
        assert_eq!(metrics.notifications_total(), 0);
    }

    #[test]
    fn test_record_event() {
        let metrics = Metrics::new();

        metrics.record_event_processed(100);
        assert_eq!(metrics.events_total(), 1);

        metrics.record_event_processed(200);
        assert_eq!(metrics.events_total(), 2);
    }

    #[test]
    fn test_report_resets_periodic_counters() {
        let metrics = Metrics::new();

        metrics.record_event_processed(100);
        metrics.record_event_processed(200);
        metrics.record_event_processed(300);
        metrics.record_notification();

        let summary = metrics.report();

        assert_eq!(summary.events_total, 3);
        assert_eq!(summary.avg_process_latency_us, 200); // (100+200+300)/3
        assert_eq!(summary.max_process_latency_us, 300);
        assert_eq!(summary.notifications_total, 1);

        // Second report sees no periodic activity but keeps monotonic totals
        let summary = metrics.report();
        assert_eq!(summary.events_total, 3);
        assert_eq!(summary.avg_process_latency_us, 0);
        assert_eq!(summary.max_process_latency_us, 0);
    }

    #[test]
    fn test_report_empty() {
        let metrics = Metrics::new();
        let summary = metrics.report();

        assert_eq!(summary.events_total, 0);
        assert_eq!(summary.avg_process_latency_us, 0);
        assert_eq!(summary.occupied_seats, 0);
    }

    #[test]
    fn test_seat_status_gauges() {
        let metrics = Metrics::new();
        metrics.set_seats(&["A1".to_string(), "A2".to_string()]);

        metrics.set_seat_status("A1", SEAT_STATUS_READY);
        metrics.set_seat_status("A2", SEAT_STATUS_UNAUTHORIZED);
        metrics.set_seat_status("Z9", SEAT_STATUS_READY); // unknown seat ignored

        let statuses = metrics.seat_statuses();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0], ("A1".to_string(), SEAT_STATUS_READY));
        assert_eq!(statuses[1], ("A2".to_string(), SEAT_STATUS_UNAUTHORIZED));

        let summary = metrics.report();
        assert_eq!(summary.occupied_seats, 2);
        assert_eq!(summary.ready_seats, 1);
    }

    #[test]
    fn test_bucket_index() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(100), 0);
        assert_eq!(bucket_index(101), 1);
        assert_eq!(bucket_index(200), 1);
        assert_eq!(bucket_index(51200), 9);
        assert_eq!(bucket_index(51201), 10); // overflow
    }

    #[test]
    fn test_histogram_buckets() {
        let metrics = Metrics::new();

        metrics.record_event_processed(50); // bucket 0 (≤100)
        metrics.record_event_processed(150); // bucket 1 (≤200)
        metrics.record_event_processed(60000); // bucket 10 (overflow)

        let summary = metrics.report();

        assert_eq!(summary.lat_buckets[0], 1);
        assert_eq!(summary.lat_buckets[1], 1);
        assert_eq!(summary.lat_buckets[10], 1);
    }

    #[test]
    fn test_percentile_computation() {
        let metrics = Metrics::new();

        for _ in 0..100 {
            metrics.record_event_processed(150);
        }

        let summary = metrics.report();

        // All in bucket 1, upper bound 200
        assert_eq!(summary.lat_p50_us, 200);
        assert_eq!(summary.lat_p95_us, 200);
        assert_eq!(summary.lat_p99_us, 200);
    }

    #[test]
    fn test_max_latency_tracking() {
        let metrics = Metrics::new();

        metrics.record_event_processed(100);
        metrics.record_event_processed(500);
        metrics.record_event_processed(200);

        let summary = metrics.report();
        assert_eq!(summary.max_process_latency_us, 500);
    }

    #[test]
    fn test_concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let metrics = Arc::new(Metrics::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let m = metrics.clone();
            handles.push(thread::spawn(move || {
                for i in 0..1000 {
                    m.record_event_processed(i as u64);
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(metrics.events_total(), 10_000);
    }
}
