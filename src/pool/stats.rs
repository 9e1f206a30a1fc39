//! Usage statistics and the periodic utilisation report.

use super::handle::WorkerId;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::info;

/// Running counters kept by the coordinator. Advisory only: nothing here
/// feeds back into scheduling.
#[derive(Debug)]
pub struct StatsTracker {
    started_at: Instant,
    total_submitted: u64,
    total_completed: u64,
    drain_passes: u64,
    max_queue_len: usize,
    changed: bool,
}

impl Default for StatsTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsTracker {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            total_submitted: 0,
            total_completed: 0,
            drain_passes: 0,
            max_queue_len: 0,
            changed: false,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Count a submission that left the queue at `queue_len`. Returns the
    /// request number (1-based).
    pub fn record_submit(&mut self, queue_len: usize) -> u64 {
        self.total_submitted += 1;
        self.max_queue_len = self.max_queue_len.max(queue_len);
        self.total_submitted
    }

    pub fn record_drain_pass(&mut self) -> u64 {
        self.drain_passes += 1;
        self.drain_passes
    }

    pub fn record_dispatch(&mut self) {
        self.changed = true;
    }

    pub fn record_completion(&mut self) {
        self.total_completed += 1;
    }

    /// Build a report if anything was dispatched since the last one, and
    /// start a new reporting window.
    pub fn take_report(&mut self, per_worker: BTreeMap<WorkerId, u64>) -> Option<PoolReport> {
        if !self.changed {
            return None;
        }
        let report = PoolReport {
            per_worker,
            max_queue_len: self.max_queue_len,
        };
        self.changed = false;
        self.max_queue_len = 0;
        Some(report)
    }

    pub fn snapshot(
        &self,
        queue_len: usize,
        in_flight: usize,
        per_worker: BTreeMap<WorkerId, u64>,
        stalled: Vec<WorkerId>,
    ) -> PoolStats {
        PoolStats {
            total_submitted: self.total_submitted,
            total_completed: self.total_completed,
            drain_passes: self.drain_passes,
            queue_len,
            in_flight,
            max_queue_len: self.max_queue_len,
            per_worker,
            stalled,
            uptime_ms: self.started_at.elapsed().as_millis() as u64,
        }
    }
}

/// Point-in-time view of the pool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolStats {
    pub total_submitted: u64,
    pub total_completed: u64,
    pub drain_passes: u64,
    pub queue_len: usize,
    pub in_flight: usize,
    /// Largest queue length seen in the current reporting window.
    pub max_queue_len: usize,
    pub per_worker: BTreeMap<WorkerId, u64>,
    pub stalled: Vec<WorkerId>,
    pub uptime_ms: u64,
}

/// Utilisation since the previous report.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolReport {
    pub per_worker: BTreeMap<WorkerId, u64>,
    pub max_queue_len: usize,
}

impl PoolReport {
    /// Log the report, one line per worker.
    pub fn log(&self) {
        info!("Worker process utilisation:");
        for (worker, count) in &self.per_worker {
            info!(worker_id = %worker, dispatched = count, "  {}: {}", worker, count);
        }
        info!(max_queue_len = self.max_queue_len, "Max queue length: {}", self.max_queue_len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(pairs: &[(u32, u64)]) -> BTreeMap<WorkerId, u64> {
        pairs.iter().map(|&(w, c)| (WorkerId::new(w), c)).collect()
    }

    #[test]
    fn test_record_submit_tracks_max_queue() {
        let mut stats = StatsTracker::new();
        assert_eq!(stats.record_submit(1), 1);
        assert_eq!(stats.record_submit(3), 2);
        assert_eq!(stats.record_submit(2), 3);
        let snap = stats.snapshot(2, 0, BTreeMap::new(), Vec::new());
        assert_eq!(snap.max_queue_len, 3);
        assert_eq!(snap.total_submitted, 3);
    }

    #[test]
    fn test_no_report_without_dispatch() {
        let mut stats = StatsTracker::new();
        stats.record_submit(4);
        assert!(stats.take_report(counts(&[(1, 0)])).is_none());
    }

    #[test]
    fn test_report_resets_window() {
        let mut stats = StatsTracker::new();
        stats.record_submit(5);
        stats.record_dispatch();

        let report = stats.take_report(counts(&[(1, 2), (2, 3)])).unwrap();
        assert_eq!(report.max_queue_len, 5);
        assert_eq!(report.per_worker[&WorkerId::new(2)], 3);

        // New window: nothing changed, nothing reported.
        assert!(stats.take_report(counts(&[(1, 2), (2, 3)])).is_none());
        stats.record_dispatch();
        let report = stats.take_report(counts(&[(1, 3), (2, 3)])).unwrap();
        assert_eq!(report.max_queue_len, 0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut stats = StatsTracker::new();
        stats.record_submit(1);
        stats.record_completion();
        let snap = stats.snapshot(0, 0, counts(&[(42, 1)]), vec![]);
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["total_completed"], 1);
        assert_eq!(json["per_worker"]["42"], 1);
    }
}
