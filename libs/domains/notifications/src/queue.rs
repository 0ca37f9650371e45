//! In-process notification delivery queue.
//!
//! Business handlers append pre-rendered messages with
//! [`NotificationQueue::enqueue`] and return immediately; a single
//! background task drains the queue one message at a time through the
//! configured [`EmailProvider`]. A failed send keeps the job queued (moved
//! to the tail so other messages are not blocked) until its attempt limit
//! is reached, after which the job is dropped and the failure recorded in
//! the [`DeliveryLedger`]. Delivery never fails the operation that queued
//! the message.

use crate::error::NotificationError;
use crate::metrics::QueueMetrics;
use crate::models::{NotificationJob, NotificationKind};
use crate::providers::{EmailContent, EmailProvider};
use crate::stats::{DeliveryLedger, DeliveryStats};
use core_config::{env_parse_or, ConfigError, FromEnv};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Tuning knobs for the delivery loop.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Delivery attempts per job before it is dropped.
    pub max_attempts: u32,
    /// Pause after each successful send, a courtesy delay towards the
    /// provider's rate limits.
    pub send_delay: Duration,
    /// Pause before the next attempt after a failed send.
    pub retry_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            send_delay: Duration::from_millis(1000),
            retry_delay: Duration::from_millis(2000),
        }
    }
}

impl FromEnv for QueueConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            max_attempts: env_parse_or("NOTIFIER_MAX_ATTEMPTS", 3)?,
            send_delay: Duration::from_millis(env_parse_or("NOTIFIER_SEND_DELAY_MS", 1000)?),
            retry_delay: Duration::from_millis(env_parse_or("NOTIFIER_RETRY_DELAY_MS", 2000)?),
        })
    }
}

struct QueueState {
    jobs: VecDeque<NotificationJob>,
    /// True while a drain task is running. Checked and set under the same
    /// lock as `jobs`, so at most one drain task exists at any time.
    draining: bool,
}

/// In-process email queue with a single background drain task.
///
/// `enqueue` is fire-and-forget: it appends the job, spawns a drain task if
/// none is active, and returns the job id without waiting for delivery.
/// Delivery outcomes are observable only through
/// [`NotificationQueue::statistics`].
///
/// Jobs live in memory only; a process restart abandons anything still
/// queued.
pub struct NotificationQueue {
    state: Mutex<QueueState>,
    ledger: DeliveryLedger,
    provider: Arc<dyn EmailProvider>,
    config: QueueConfig,
    metrics: QueueMetrics,
}

impl NotificationQueue {
    pub fn new(provider: Arc<dyn EmailProvider>, config: QueueConfig) -> Self {
        Self {
            state: Mutex::new(QueueState {
                jobs: VecDeque::new(),
                draining: false,
            }),
            ledger: DeliveryLedger::new(),
            provider,
            config,
            metrics: QueueMetrics,
        }
    }

    /// Append a pre-rendered message to the queue and return its job id.
    ///
    /// Must be called from within a tokio runtime: when the queue is idle
    /// the drain task is spawned onto the current runtime.
    pub fn enqueue(
        self: &Arc<Self>,
        email: EmailContent,
        kind: NotificationKind,
        teacher_id: Option<Uuid>,
    ) -> Uuid {
        let job = NotificationJob::new(email, kind, teacher_id);
        let job_id = job.id;

        let (depth, start_drain) = {
            let mut state = self.lock_state();
            state.jobs.push_back(job);
            let start = !state.draining;
            if start {
                state.draining = true;
            }
            (state.jobs.len(), start)
        };

        self.metrics.queue_depth(depth);
        debug!(%job_id, %kind, depth, "Queued notification");

        if start_drain {
            let queue = Arc::clone(self);
            tokio::spawn(async move { queue.drain().await });
        }

        job_id
    }

    /// Snapshot delivery counters plus live queue state.
    ///
    /// With a `teacher_id`, counters come from that teacher's ledger record
    /// and `queued` counts only jobs attributed to that teacher.
    pub fn statistics(&self, teacher_id: Option<Uuid>) -> DeliveryStats {
        let (queued, draining) = {
            let state = self.lock_state();
            let queued = match teacher_id {
                Some(id) => state
                    .jobs
                    .iter()
                    .filter(|job| job.teacher_id == Some(id))
                    .count(),
                None => state.jobs.len(),
            };
            (queued, state.draining)
        };
        self.ledger.snapshot(teacher_id, queued, draining)
    }

    /// Reset delivery counters. Queue contents and in-flight jobs are
    /// unaffected.
    pub fn reset_statistics(&self, teacher_id: Option<Uuid>) {
        self.ledger.reset(teacher_id);
    }

    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().expect("notification queue lock poisoned")
    }

    /// Deliver queued jobs one at a time until the queue is empty.
    ///
    /// Only this task removes or reorders jobs, so the head entry is stable
    /// across the provider call even while other tasks keep enqueueing.
    /// The lock is never held across an await point.
    async fn drain(self: Arc<Self>) {
        debug!(provider = self.provider.name(), "Drain task started");

        loop {
            let job = {
                let mut state = self.lock_state();
                match state.jobs.front() {
                    Some(job) => job.clone(),
                    None => {
                        state.draining = false;
                        break;
                    }
                }
            };

            match self.provider.send(&job.email).await {
                Ok(sent) => {
                    self.finish_success(&job, sent.message_id.as_deref());
                    tokio::time::sleep(self.config.send_delay).await;
                }
                Err(err) => {
                    let retrying = self.finish_failure(&job, &err);
                    if retrying {
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                }
            }
        }

        debug!("Drain task finished, queue empty");
    }

    fn finish_success(&self, job: &NotificationJob, message_id: Option<&str>) {
        let depth = {
            let mut state = self.lock_state();
            state.jobs.pop_front();
            state.jobs.len()
        };

        self.ledger.record_success(job.teacher_id);
        self.metrics.message_sent(&job.kind);
        self.metrics.queue_depth(depth);

        info!(
            job_id = %job.id,
            kind = %job.kind,
            to = %job.email.to_email,
            message_id = ?message_id,
            "Notification delivered"
        );
    }

    /// Handle a failed attempt. Returns true when the job stays queued for
    /// another attempt.
    fn finish_failure(&self, job: &NotificationJob, err: &NotificationError) -> bool {
        let (attempts, exhausted, depth) = {
            let mut state = self.lock_state();
            // Single drain task: the head is still the job just attempted.
            let mut head = state
                .jobs
                .pop_front()
                .expect("attempted job missing from queue head");
            head.attempts += 1;
            let attempts = head.attempts;
            let exhausted = attempts >= self.config.max_attempts;
            if !exhausted {
                state.jobs.push_back(head);
            }
            (attempts, exhausted, state.jobs.len())
        };

        self.metrics.queue_depth(depth);

        if exhausted {
            self.ledger.record_failure(&err.to_string(), job.teacher_id);
            self.metrics.message_failed(&job.kind);
            error!(
                job_id = %job.id,
                kind = %job.kind,
                to = %job.email.to_email,
                attempts,
                error = %err,
                "Giving up on notification"
            );
            false
        } else {
            self.metrics.message_retried(&job.kind);
            warn!(
                job_id = %job.id,
                kind = %job.kind,
                attempts,
                error = %err,
                "Notification send failed, will retry"
            );
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NotificationResult;
    use crate::providers::SentEmail;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    /// Provider that fails the first `n` sends per recipient and records
    /// every attempt plus the order of successful deliveries.
    #[derive(Default)]
    struct ScriptedProvider {
        fail_first: StdMutex<HashMap<String, u32>>,
        attempts: StdMutex<Vec<String>>,
        delivered: StdMutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn always_ok() -> Self {
            Self::default()
        }

        fn failing(recipient: &str, times: u32) -> Self {
            let provider = Self::default();
            provider
                .fail_first
                .lock()
                .unwrap()
                .insert(recipient.to_string(), times);
            provider
        }

        fn attempts(&self) -> Vec<String> {
            self.attempts.lock().unwrap().clone()
        }

        fn delivered(&self) -> Vec<String> {
            self.delivered.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EmailProvider for ScriptedProvider {
        async fn send(&self, email: &EmailContent) -> NotificationResult<SentEmail> {
            self.attempts.lock().unwrap().push(email.to_email.clone());

            if let Some(remaining) = self.fail_first.lock().unwrap().get_mut(&email.to_email) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(NotificationError::ProviderError(
                        "451 temporary failure".to_string(),
                    ));
                }
            }

            self.delivered.lock().unwrap().push(email.to_email.clone());
            Ok(SentEmail {
                message_id: Some("scripted-id".to_string()),
                accepted: true,
            })
        }

        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn health_check(&self) -> NotificationResult<bool> {
            Ok(true)
        }
    }

    fn email_to(addr: &str) -> EmailContent {
        EmailContent {
            to_email: addr.to_string(),
            subject: "Attendance recorded".to_string(),
            html_body: "<p>body</p>".to_string(),
            text_body: "body".to_string(),
            ..Default::default()
        }
    }

    fn queue_with(provider: Arc<ScriptedProvider>) -> Arc<NotificationQueue> {
        Arc::new(NotificationQueue::new(provider, QueueConfig::default()))
    }

    /// Wait until the queue is empty and the drain task has exited. Runs
    /// under a paused clock, so the sleeps auto-advance.
    async fn wait_idle(queue: &NotificationQueue) {
        loop {
            let stats = queue.statistics(None);
            if stats.queued == 0 && !stats.draining {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_job_is_delivered() {
        let provider = Arc::new(ScriptedProvider::always_ok());
        let queue = queue_with(Arc::clone(&provider));

        queue.enqueue(
            email_to("ana@example.edu"),
            NotificationKind::AttendanceRecorded,
            None,
        );
        wait_idle(&queue).await;

        let stats = queue.statistics(None);
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.queued, 0);
        assert!(!stats.draining);
        assert!(stats.last_send_at.is_some());
        assert_eq!(provider.delivered(), vec!["ana@example.edu"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_reports_draining_immediately() {
        let provider = Arc::new(ScriptedProvider::always_ok());
        let queue = queue_with(provider);

        let job_id = queue.enqueue(
            email_to("ana@example.edu"),
            NotificationKind::AttendanceRecorded,
            None,
        );

        // The draining flag is set synchronously by enqueue, before the
        // spawned task gets a chance to run.
        let stats = queue.statistics(None);
        assert!(stats.draining);
        assert!(!job_id.is_nil());

        wait_idle(&queue).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_moves_to_tail() {
        // A fails once; B and C must not wait behind its retry.
        let provider = Arc::new(ScriptedProvider::failing("a@example.edu", 1));
        let queue = queue_with(Arc::clone(&provider));

        queue.enqueue(email_to("a@example.edu"), NotificationKind::EvaluationEdited, None);
        queue.enqueue(email_to("b@example.edu"), NotificationKind::EvaluationEdited, None);
        queue.enqueue(email_to("c@example.edu"), NotificationKind::EvaluationEdited, None);
        wait_idle(&queue).await;

        assert_eq!(
            provider.attempts(),
            vec![
                "a@example.edu",
                "b@example.edu",
                "c@example.edu",
                "a@example.edu"
            ]
        );
        assert_eq!(
            provider.delivered(),
            vec!["b@example.edu", "c@example.edu", "a@example.edu"]
        );

        let stats = queue.statistics(None);
        assert_eq!(stats.sent, 3);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_are_bounded_and_counted_once() {
        let provider = Arc::new(ScriptedProvider::failing("a@example.edu", u32::MAX));
        let queue = queue_with(Arc::clone(&provider));

        queue.enqueue(
            email_to("a@example.edu"),
            NotificationKind::GradeStructureCreated,
            None,
        );
        wait_idle(&queue).await;

        // Exactly max_attempts sends, then the job is dropped; one failure
        // recorded, not one per attempt.
        assert_eq!(provider.attempts().len(), 3);
        let stats = queue.statistics(None);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.sent, 0);
        assert_eq!(stats.queued, 0);
        assert_eq!(stats.recent_errors.len(), 1);
        assert!(stats.recent_errors[0].message.contains("451"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_recovers_within_attempt_limit() {
        let provider = Arc::new(ScriptedProvider::failing("a@example.edu", 2));
        let queue = queue_with(Arc::clone(&provider));
        let started = tokio::time::Instant::now();

        queue.enqueue(
            email_to("a@example.edu"),
            NotificationKind::AttendanceRecorded,
            None,
        );
        wait_idle(&queue).await;

        assert_eq!(provider.attempts().len(), 3);
        assert_eq!(provider.delivered(), vec!["a@example.edu"]);
        // Two failed attempts, so two retry backoffs elapsed on the paused
        // clock before the successful third attempt.
        assert!(started.elapsed() >= QueueConfig::default().retry_delay * 2);

        let stats = queue.statistics(None);
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.failed, 0);
        assert!(stats.recent_errors.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_enqueue_sends_each_job_once() {
        let provider = Arc::new(ScriptedProvider::always_ok());
        let queue = queue_with(Arc::clone(&provider));

        for i in 0..25 {
            queue.enqueue(
                email_to(&format!("student{}@example.edu", i)),
                NotificationKind::ProjectGroupAssigned,
                None,
            );
        }
        wait_idle(&queue).await;

        // A second concurrent drain task would show up as duplicate sends.
        assert_eq!(provider.attempts().len(), 25);
        assert_eq!(provider.delivered().len(), 25);
        assert_eq!(queue.statistics(None).sent, 25);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_restarts_after_going_idle() {
        let provider = Arc::new(ScriptedProvider::always_ok());
        let queue = queue_with(Arc::clone(&provider));

        queue.enqueue(email_to("a@example.edu"), NotificationKind::AttendanceRecorded, None);
        wait_idle(&queue).await;

        queue.enqueue(email_to("b@example.edu"), NotificationKind::AttendanceRecorded, None);
        wait_idle(&queue).await;

        assert_eq!(provider.delivered(), vec!["a@example.edu", "b@example.edu"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_statistics_segment_by_teacher() {
        let provider = Arc::new(ScriptedProvider::failing("fail@example.edu", u32::MAX));
        let queue = queue_with(provider);
        let teacher_a = Uuid::new_v4();
        let teacher_b = Uuid::new_v4();

        queue.enqueue(
            email_to("ok@example.edu"),
            NotificationKind::AttendanceRecorded,
            Some(teacher_a),
        );
        queue.enqueue(
            email_to("fail@example.edu"),
            NotificationKind::AttendanceRecorded,
            Some(teacher_b),
        );
        wait_idle(&queue).await;

        let a = queue.statistics(Some(teacher_a));
        assert_eq!(a.sent, 1);
        assert_eq!(a.failed, 0);
        assert_eq!(a.success_rate_percent, 100);

        let b = queue.statistics(Some(teacher_b));
        assert_eq!(b.sent, 0);
        assert_eq!(b.failed, 1);
        assert_eq!(b.recent_errors.len(), 1);

        let global = queue.statistics(None);
        assert_eq!(global.sent, 1);
        assert_eq!(global.failed, 1);
        assert_eq!(global.success_rate_percent, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_statistics_keeps_queue_contents() {
        let provider = Arc::new(ScriptedProvider::failing("a@example.edu", u32::MAX));
        let queue = queue_with(provider);

        queue.enqueue(
            email_to("a@example.edu"),
            NotificationKind::EvaluationEdited,
            None,
        );
        wait_idle(&queue).await;
        assert_eq!(queue.statistics(None).failed, 1);

        queue.reset_statistics(None);

        let stats = queue.statistics(None);
        assert_eq!(stats.sent, 0);
        assert_eq!(stats.failed, 0);
        assert!(stats.recent_errors.is_empty());
        assert_eq!(stats.success_rate_percent, 0);
    }

    #[test]
    fn test_queue_config_defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.send_delay, Duration::from_millis(1000));
        assert_eq!(config.retry_delay, Duration::from_millis(2000));
    }

    #[test]
    fn test_queue_config_from_env() {
        temp_env::with_vars(
            [
                ("NOTIFIER_MAX_ATTEMPTS", Some("5")),
                ("NOTIFIER_SEND_DELAY_MS", Some("250")),
                ("NOTIFIER_RETRY_DELAY_MS", Some("4000")),
            ],
            || {
                let config = QueueConfig::from_env().unwrap();
                assert_eq!(config.max_attempts, 5);
                assert_eq!(config.send_delay, Duration::from_millis(250));
                assert_eq!(config.retry_delay, Duration::from_millis(4000));
            },
        );
    }
}
