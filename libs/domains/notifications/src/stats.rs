//! Delivery statistics ledger.
//!
//! Tracks sent/failed counts, the last send timestamp and a bounded log of
//! recent delivery errors, globally and segmented per teacher. The ledger
//! backs the admin statistics endpoint: delivery failures are never raised
//! to callers, so this is the only place they become observable.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use uuid::Uuid;

/// Maximum number of recent errors kept per record.
pub const RECENT_ERRORS_CAP: usize = 10;

/// One entry in the recent-errors log.
#[derive(Debug, Clone, Serialize)]
pub struct RecentError {
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// Counters for one grouping (global or a single teacher).
#[derive(Debug, Default)]
struct LedgerRecord {
    sent: u64,
    failed: u64,
    last_send_at: Option<DateTime<Utc>>,
    /// Oldest first, capped at [`RECENT_ERRORS_CAP`].
    recent_errors: VecDeque<RecentError>,
}

impl LedgerRecord {
    fn record_success(&mut self, at: DateTime<Utc>) {
        self.sent += 1;
        self.last_send_at = Some(at);
    }

    fn record_failure(&mut self, message: &str, at: DateTime<Utc>) {
        self.failed += 1;
        if self.recent_errors.len() == RECENT_ERRORS_CAP {
            self.recent_errors.pop_front();
        }
        self.recent_errors.push_back(RecentError {
            message: message.to_string(),
            occurred_at: at,
        });
    }

    fn success_rate_percent(&self) -> u32 {
        let attempts = self.sent + self.failed;
        if attempts == 0 {
            return 0;
        }
        ((self.sent as f64 / attempts as f64) * 100.0).round() as u32
    }
}

/// Read-only view of delivery statistics, serialized as-is by the admin
/// reporting endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryStats {
    pub sent: u64,
    pub failed: u64,
    /// Live queue depth at snapshot time.
    pub queued: usize,
    /// Whether a drain task is currently active.
    pub draining: bool,
    pub last_send_at: Option<DateTime<Utc>>,
    /// Oldest-to-newest, capped at [`RECENT_ERRORS_CAP`].
    pub recent_errors: Vec<RecentError>,
    pub success_rate_percent: u32,
}

#[derive(Default)]
struct LedgerState {
    global: LedgerRecord,
    per_teacher: HashMap<Uuid, LedgerRecord>,
}

/// Process-wide delivery counters, global and segmented by teacher.
///
/// Per-teacher records are created lazily on first reference and only
/// removed by a reset-all. The map grows with distinct teacher ids, which
/// is bounded by the size of the institution's teaching staff.
#[derive(Default)]
pub struct DeliveryLedger {
    state: Mutex<LedgerState>,
}

impl DeliveryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a delivered message, globally and for `teacher_id` if given.
    pub fn record_success(&self, teacher_id: Option<Uuid>) {
        let now = Utc::now();
        let mut state = self.lock_state();
        state.global.record_success(now);
        if let Some(id) = teacher_id {
            state.per_teacher.entry(id).or_default().record_success(now);
        }
    }

    /// Count a message dropped after exhausting its attempts, appending the
    /// final error to the bounded recent-errors log.
    pub fn record_failure(&self, message: &str, teacher_id: Option<Uuid>) {
        let now = Utc::now();
        let mut state = self.lock_state();
        state.global.record_failure(message, now);
        if let Some(id) = teacher_id {
            state
                .per_teacher
                .entry(id)
                .or_default()
                .record_failure(message, now);
        }
    }

    /// Snapshot counters for the global record or one teacher's record.
    ///
    /// `queued` and `draining` describe live queue state and are supplied by
    /// the queue; a teacher with no record yet snapshots as all zeroes.
    pub fn snapshot(&self, teacher_id: Option<Uuid>, queued: usize, draining: bool) -> DeliveryStats {
        let state = self.lock_state();
        let record = match teacher_id {
            Some(id) => state.per_teacher.get(&id),
            None => Some(&state.global),
        };

        match record {
            Some(record) => DeliveryStats {
                sent: record.sent,
                failed: record.failed,
                queued,
                draining,
                last_send_at: record.last_send_at,
                recent_errors: record.recent_errors.iter().cloned().collect(),
                success_rate_percent: record.success_rate_percent(),
            },
            None => DeliveryStats {
                sent: 0,
                failed: 0,
                queued,
                draining,
                last_send_at: None,
                recent_errors: Vec::new(),
                success_rate_percent: 0,
            },
        }
    }

    /// Reset counters. `None` zeroes the global record and drops every
    /// per-teacher record; `Some(id)` resets only that teacher's record.
    pub fn reset(&self, teacher_id: Option<Uuid>) {
        let mut state = self.lock_state();
        match teacher_id {
            None => {
                state.global = LedgerRecord::default();
                state.per_teacher.clear();
            }
            Some(id) => {
                state.per_teacher.remove(&id);
            }
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        self.state.lock().expect("delivery ledger lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_without_attempts_has_zero_rate() {
        let ledger = DeliveryLedger::new();
        let stats = ledger.snapshot(None, 0, false);
        assert_eq!(stats.sent, 0);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.success_rate_percent, 0);
        assert!(stats.last_send_at.is_none());
        assert!(stats.recent_errors.is_empty());
    }

    #[test]
    fn test_success_rate_rounds() {
        let ledger = DeliveryLedger::new();
        for _ in 0..3 {
            ledger.record_success(None);
        }
        ledger.record_failure("SMTP connection refused", None);

        let stats = ledger.snapshot(None, 0, false);
        assert_eq!(stats.sent, 3);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.success_rate_percent, 75);
    }

    #[test]
    fn test_recent_errors_are_capped_and_chronological() {
        let ledger = DeliveryLedger::new();
        for i in 0..RECENT_ERRORS_CAP + 5 {
            ledger.record_failure(&format!("error {}", i), None);
        }

        let stats = ledger.snapshot(None, 0, false);
        assert_eq!(stats.failed, (RECENT_ERRORS_CAP + 5) as u64);
        assert_eq!(stats.recent_errors.len(), RECENT_ERRORS_CAP);
        // Oldest entries were evicted; the log starts at "error 5".
        assert_eq!(stats.recent_errors[0].message, "error 5");
        assert_eq!(
            stats.recent_errors.last().unwrap().message,
            format!("error {}", RECENT_ERRORS_CAP + 4)
        );
    }

    #[test]
    fn test_per_teacher_records_are_lazy() {
        let ledger = DeliveryLedger::new();
        let teacher = Uuid::new_v4();
        let other = Uuid::new_v4();

        ledger.record_success(Some(teacher));
        ledger.record_success(None);

        let teacher_stats = ledger.snapshot(Some(teacher), 0, false);
        assert_eq!(teacher_stats.sent, 1);

        // A teacher never referenced snapshots as zeroes.
        let other_stats = ledger.snapshot(Some(other), 0, false);
        assert_eq!(other_stats.sent, 0);
        assert_eq!(other_stats.success_rate_percent, 0);

        let global = ledger.snapshot(None, 0, false);
        assert_eq!(global.sent, 2);
    }

    #[test]
    fn test_failure_mirrors_to_teacher_record() {
        let ledger = DeliveryLedger::new();
        let teacher = Uuid::new_v4();

        ledger.record_failure("mailbox unavailable", Some(teacher));

        let teacher_stats = ledger.snapshot(Some(teacher), 0, false);
        assert_eq!(teacher_stats.failed, 1);
        assert_eq!(teacher_stats.recent_errors.len(), 1);
        assert_eq!(teacher_stats.recent_errors[0].message, "mailbox unavailable");

        let global = ledger.snapshot(None, 0, false);
        assert_eq!(global.failed, 1);
    }

    #[test]
    fn test_reset_all_clears_global_and_teachers() {
        let ledger = DeliveryLedger::new();
        let teacher = Uuid::new_v4();
        ledger.record_success(Some(teacher));
        ledger.record_failure("relay timeout", Some(teacher));

        ledger.reset(None);

        let global = ledger.snapshot(None, 0, false);
        assert_eq!(global.sent, 0);
        assert_eq!(global.failed, 0);
        assert!(global.recent_errors.is_empty());

        let teacher_stats = ledger.snapshot(Some(teacher), 0, false);
        assert_eq!(teacher_stats.sent, 0);
        assert_eq!(teacher_stats.failed, 0);
    }

    #[test]
    fn test_reset_single_teacher_keeps_global() {
        let ledger = DeliveryLedger::new();
        let teacher = Uuid::new_v4();
        ledger.record_success(Some(teacher));

        ledger.reset(Some(teacher));

        assert_eq!(ledger.snapshot(Some(teacher), 0, false).sent, 0);
        assert_eq!(ledger.snapshot(None, 0, false).sent, 1);
    }
}
