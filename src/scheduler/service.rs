//! Action scheduler
//!
//! Owns the polling loop that finds due reversals, performs them on the
//! platform, records the outcome in the store and writes the moderation log.

use super::{
    ActionKind, ActionStatus, ActionStore, ActionTransition, ScheduledAction, SchedulerError,
    SchedulerRequest, SchedulerResult,
};
use crate::audit::{ModerationLog, ModerationLogEntry};
use crate::clock::Clock;
use crate::platform::PlatformAdapter;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

type ActionKey = (ActionKind, String, String);

/// Counts from one `run_once` pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Due actions returned by the store
    pub due: usize,
    pub completed: usize,
    pub failed: usize,
    /// Due actions left alone, e.g. cancelled after the due query
    pub skipped: usize,
    /// The whole pass was skipped because another pass was in progress
    pub overlapped: bool,
}

impl PassReport {
    fn overlapped() -> Self {
        Self {
            overlapped: true,
            ..Self::default()
        }
    }
}

enum Outcome {
    Completed,
    Failed,
    Skipped,
}

/// Resets a running flag when dropped
struct FlagGuard(Arc<AtomicBool>);

impl Drop for FlagGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Durable executor of deferred reversals
#[derive(Clone)]
pub struct ActionScheduler {
    store: Arc<dyn ActionStore>,
    platform: Arc<dyn PlatformAdapter>,
    log: Arc<dyn ModerationLog>,
    clock: Arc<dyn Clock>,
    /// Issuer recorded on scheduled log entries
    system_identity: String,
    key_locks: Arc<DashMap<ActionKey, Arc<Mutex<()>>>>,
    pass_running: Arc<AtomicBool>,
    loop_running: Arc<AtomicBool>,
}

impl ActionScheduler {
    pub fn new(
        store: Arc<dyn ActionStore>,
        platform: Arc<dyn PlatformAdapter>,
        log: Arc<dyn ModerationLog>,
        clock: Arc<dyn Clock>,
        system_identity: impl Into<String>,
    ) -> Self {
        Self {
            store,
            platform,
            log,
            clock,
            system_identity: system_identity.into(),
            key_locks: Arc::new(DashMap::new()),
            pass_running: Arc::new(AtomicBool::new(false)),
            loop_running: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn ActionStore> {
        &self.store
    }

    fn key_lock(&self, key: &ActionKey) -> Arc<Mutex<()>> {
        let entry = self.key_locks.entry(key.clone()).or_default();
        Arc::clone(entry.value())
    }

    /// Drop the map entry for `key` once nobody else holds its lock
    fn release_key_lock(&self, key: &ActionKey, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.key_locks
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Record a pending reversal
    ///
    /// Duplicate pending entries for the same key are allowed; reversing an
    /// already-lifted restriction is a no-op on the platform.
    ///
    /// # Errors
    /// Returns an error if the store rejects the insert
    pub async fn enqueue(
        &self,
        kind: ActionKind,
        community: &str,
        subject: &str,
        execute_at: DateTime<Utc>,
        derived_from_timeout: bool,
    ) -> SchedulerResult<ScheduledAction> {
        let mut record = ScheduledAction::new(
            kind,
            community,
            subject,
            execute_at,
            self.clock.now(),
            derived_from_timeout,
        );
        record.id = self.store.insert(record.clone()).await?;

        info!(
            action_id = %record.id,
            kind = %kind,
            community = %community,
            subject = %subject,
            execute_at = %execute_at,
            derived_from_timeout,
            "Scheduled action enqueued"
        );

        Ok(record)
    }

    /// Cancel every pending action for the key
    ///
    /// Only stops future passes from picking the actions up. An execution
    /// already in flight for the key finishes first.
    ///
    /// # Errors
    /// Returns an error if the store update fails
    pub async fn cancel_pending(
        &self,
        kind: ActionKind,
        community: &str,
        subject: &str,
    ) -> SchedulerResult<usize> {
        let key = (kind, community.to_string(), subject.to_string());
        let lock = self.key_lock(&key);
        let result = {
            let _guard = lock.lock().await;
            self.store
                .cancel_all_pending(kind, community, subject, self.clock.now())
                .await
        };
        self.release_key_lock(&key, lock);
        let cancelled = result?;

        if cancelled > 0 {
            info!(
                kind = %kind,
                community = %community,
                subject = %subject,
                cancelled,
                "Cancelled pending scheduled actions"
            );
        }

        Ok(cancelled)
    }

    /// Execute every action due at `now`, one at a time
    ///
    /// A platform failure marks that action `failed` and the pass moves on.
    /// If another pass is still running this one does nothing.
    ///
    /// # Errors
    /// Returns an error if the due query fails; the tick is abandoned and
    /// pending actions stay pending for the next one
    pub async fn run_once(&self, now: DateTime<Utc>) -> SchedulerResult<PassReport> {
        if self.pass_running.swap(true, Ordering::AcqRel) {
            debug!("Previous scheduler pass still running, skipping");
            return Ok(PassReport::overlapped());
        }
        let _pass = FlagGuard(Arc::clone(&self.pass_running));

        let due = self.store.find_due(now).await?;
        let mut report = PassReport {
            due: due.len(),
            ..PassReport::default()
        };

        for action in &due {
            match self.execute(action).await {
                Outcome::Completed => report.completed += 1,
                Outcome::Failed => report.failed += 1,
                Outcome::Skipped => report.skipped += 1,
            }
        }

        if report.due > 0 {
            info!(
                due = report.due,
                completed = report.completed,
                failed = report.failed,
                skipped = report.skipped,
                "Scheduler pass finished"
            );
        }

        Ok(report)
    }

    async fn execute(&self, action: &ScheduledAction) -> Outcome {
        let key = (action.kind, action.community.clone(), action.subject.clone());
        let lock = self.key_lock(&key);
        let outcome = {
            let _guard = lock.lock().await;
            self.execute_locked(action).await
        };
        self.release_key_lock(&key, lock);
        outcome
    }

    async fn execute_locked(&self, action: &ScheduledAction) -> Outcome {
        // The due list may be stale by now.
        match self.store.get(&action.id).await {
            Ok(Some(current)) if current.status == ActionStatus::Pending => {}
            Ok(_) => {
                debug!(action_id = %action.id, "Scheduled action no longer pending, skipping");
                return Outcome::Skipped;
            }
            Err(e) => {
                error!(action_id = %action.id, error = %e, "Failed to re-read scheduled action");
                return Outcome::Skipped;
            }
        }

        let result = match action.kind {
            ActionKind::Unban => {
                self.platform
                    .remove_ban(&action.community, &action.subject)
                    .await
            }
            ActionKind::Unmute => {
                self.platform
                    .remove_mute(&action.community, &action.subject)
                    .await
            }
        };

        match result {
            Ok(()) => {
                let entry = ModerationLogEntry::new(
                    action.kind.log_kind(),
                    &action.community,
                    &action.subject,
                    &self.system_identity,
                    action.kind.log_reason(),
                    self.clock.now(),
                )
                .with_action_id(&action.id);
                if let Err(e) = self.log.append(entry).await {
                    warn!(action_id = %action.id, error = %e, "Failed to log scheduled action");
                }

                self.finish(action, ActionTransition::Complete {
                    at: self.clock.now(),
                })
                .await;
                Outcome::Completed
            }
            Err(e) => {
                error!(
                    action_id = %action.id,
                    kind = %action.kind,
                    community = %action.community,
                    subject = %action.subject,
                    error = %e,
                    "Failed to execute scheduled action"
                );

                self.finish(action, ActionTransition::Fail {
                    at: self.clock.now(),
                    error: e.to_string(),
                })
                .await;
                Outcome::Failed
            }
        }
    }

    async fn finish(&self, action: &ScheduledAction, transition: ActionTransition) {
        let target = transition.target();
        match self
            .store
            .transition(&action.id, ActionStatus::Pending, transition)
            .await
        {
            Ok(true) => {}
            Ok(false) => warn!(
                action_id = %action.id,
                target = %target,
                "Scheduled action left pending by another writer before it could be marked"
            ),
            Err(e) => error!(
                action_id = %action.id,
                target = %target,
                error = %e,
                "Failed to record scheduled action outcome, it stays pending and runs again"
            ),
        }
    }

    /// Spawn the polling loop
    ///
    /// Passes run inline in a single task, so a slow pass delays the next
    /// tick instead of overlapping it. Missed ticks are skipped.
    ///
    /// # Errors
    /// Returns `AlreadyRunning` if a loop started by this scheduler is alive
    pub fn start(&self, poll_interval: Duration) -> SchedulerResult<SchedulerHandle> {
        if self.loop_running.swap(true, Ordering::AcqRel) {
            return Err(SchedulerError::AlreadyRunning);
        }

        let (tx, rx) = mpsc::channel::<SchedulerRequest>(16);
        let scheduler = self.clone();
        let task = tokio::spawn(async move {
            let _running = FlagGuard(Arc::clone(&scheduler.loop_running));
            scheduler.poll_loop(rx, poll_interval).await;
        });

        Ok(SchedulerHandle { tx, task })
    }

    async fn poll_loop(&self, mut rx: Receiver<SchedulerRequest>, poll_interval: Duration) {
        info!(
            "Starting scheduler with {}s interval",
            poll_interval.as_secs_f64()
        );

        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                request = rx.recv() => {
                    match request {
                        Some(SchedulerRequest::RunNow) => {
                            debug!("Received request to run a scheduler pass");
                            self.tick().await;
                        }
                        Some(SchedulerRequest::Shutdown) | None => {
                            info!("Received shutdown request for scheduler");
                            break;
                        }
                    }
                },

                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }

        info!("Scheduler shut down");
    }

    async fn tick(&self) {
        if let Err(e) = self.run_once(self.clock.now()).await {
            error!(error = %e, "Scheduler pass abandoned");
        }
    }
}

/// Control handle for a running polling loop
pub struct SchedulerHandle {
    tx: Sender<SchedulerRequest>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Ask for an immediate pass
    ///
    /// # Errors
    /// Returns `NotRunning` if the loop has exited
    pub async fn run_now(&self) -> SchedulerResult<()> {
        self.tx
            .send(SchedulerRequest::RunNow)
            .await
            .map_err(|_| SchedulerError::NotRunning)
    }

    /// Stop the loop and wait for the current pass to finish
    pub async fn stop(self) {
        if self.tx.send(SchedulerRequest::Shutdown).await.is_err() {
            debug!("Scheduler loop already stopped");
        }
        if let Err(e) = self.task.await {
            error!(error = %e, "Scheduler task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryModerationLog;
    use crate::clock::ManualClock;
    use crate::error::{LogError, PlatformError, StoreError, StoreResult};
    use crate::platform::{BanReason, MemoryPlatform, MockPlatformAdapter, MuteChannel};
    use crate::scheduler::MemoryActionStore;
    use async_trait::async_trait;
    use tokio::sync::Notify;

    const SYSTEM: &str = "modsched";

    struct Fixture {
        store: MemoryActionStore,
        log: MemoryModerationLog,
        clock: ManualClock,
        scheduler: ActionScheduler,
    }

    fn fixture(platform: Arc<dyn PlatformAdapter>) -> Fixture {
        let store = MemoryActionStore::new();
        let log = MemoryModerationLog::new();
        let clock = ManualClock::new(Utc::now());
        let scheduler = ActionScheduler::new(
            Arc::new(store.clone()),
            platform,
            Arc::new(log.clone()),
            Arc::new(clock.clone()),
            SYSTEM,
        );
        Fixture {
            store,
            log,
            clock,
            scheduler,
        }
    }

    async fn status_of(store: &MemoryActionStore, id: &str) -> ActionStatus {
        store.get(id).await.unwrap().unwrap().status
    }

    #[tokio::test]
    async fn test_enqueue_creates_pending_record() {
        let f = fixture(Arc::new(MemoryPlatform::new()));
        let execute_at = f.clock.now() + chrono::Duration::minutes(90);

        let action = f
            .scheduler
            .enqueue(ActionKind::Unban, "rust", "ferris", execute_at, true)
            .await
            .unwrap();

        assert!(!action.id.is_empty());
        assert_eq!(action.status, ActionStatus::Pending);
        assert_eq!(action.created_at, f.clock.now());
        assert!(action.derived_from_timeout);
        assert_eq!(f.store.get(&action.id).await.unwrap(), Some(action));
    }

    #[tokio::test]
    async fn test_due_unban_is_executed_and_logged() {
        let mut platform = MockPlatformAdapter::new();
        platform
            .expect_remove_ban()
            .withf(|community, subject| community == "rust" && subject == "ferris")
            .times(1)
            .returning(|_, _| Ok(()));
        let f = fixture(Arc::new(platform));

        let action = f
            .scheduler
            .enqueue(
                ActionKind::Unban,
                "rust",
                "ferris",
                f.clock.now() + chrono::Duration::minutes(90),
                true,
            )
            .await
            .unwrap();

        // Not due yet
        let report = f.scheduler.run_once(f.clock.now()).await.unwrap();
        assert_eq!(report.due, 0);

        f.clock.advance(chrono::Duration::minutes(90));
        let report = f.scheduler.run_once(f.clock.now()).await.unwrap();
        assert_eq!(report.due, 1);
        assert_eq!(report.completed, 1);

        let record = f.store.get(&action.id).await.unwrap().unwrap();
        assert_eq!(record.status, ActionStatus::Completed);
        assert_eq!(record.completed_at, Some(f.clock.now()));

        let entries = f.log.entries_of("scheduled_unban");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].issuer, SYSTEM);
        assert_eq!(entries[0].reason, "Automatic unban");
        assert_eq!(entries[0].details.action_id.as_deref(), Some(action.id.as_str()));

        // Completed actions never run twice
        let report = f.scheduler.run_once(f.clock.now()).await.unwrap();
        assert_eq!(report.due, 0);
    }

    #[tokio::test]
    async fn test_unmute_dispatches_to_remove_mute() {
        let mut platform = MockPlatformAdapter::new();
        platform.expect_remove_ban().times(0);
        platform
            .expect_remove_mute()
            .times(1)
            .returning(|_, _| Ok(()));
        let f = fixture(Arc::new(platform));

        let now = f.clock.now();
        f.scheduler
            .enqueue(ActionKind::Unmute, "rust", "ferris", now, false)
            .await
            .unwrap();

        let report = f.scheduler.run_once(now).await.unwrap();
        assert_eq!(report.completed, 1);
        assert_eq!(f.log.entries_of("scheduled_unmute").len(), 1);
    }

    #[tokio::test]
    async fn test_key_locks_released_after_use() {
        let f = fixture(Arc::new(MemoryPlatform::new()));
        let now = f.clock.now();

        for i in 0..50 {
            let subject = format!("user-{i}");
            f.scheduler
                .enqueue(ActionKind::Unban, "rust", &subject, now, false)
                .await
                .unwrap();
            if i % 2 == 0 {
                f.scheduler
                    .cancel_pending(ActionKind::Unban, "rust", &subject)
                    .await
                    .unwrap();
            }
        }

        let report = f.scheduler.run_once(now).await.unwrap();
        assert_eq!(report.completed, 25);
        assert!(f.scheduler.key_locks.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_action_never_runs() {
        let mut platform = MockPlatformAdapter::new();
        platform.expect_remove_ban().times(0);
        let f = fixture(Arc::new(platform));

        let action = f
            .scheduler
            .enqueue(
                ActionKind::Unban,
                "rust",
                "ferris",
                f.clock.now() + chrono::Duration::hours(1),
                false,
            )
            .await
            .unwrap();

        let cancelled = f
            .scheduler
            .cancel_pending(ActionKind::Unban, "rust", "ferris")
            .await
            .unwrap();
        assert_eq!(cancelled, 1);

        f.clock.advance(chrono::Duration::hours(2));
        let report = f.scheduler.run_once(f.clock.now()).await.unwrap();
        assert_eq!(report.due, 0);

        let record = f.store.get(&action.id).await.unwrap().unwrap();
        assert_eq!(record.status, ActionStatus::Cancelled);
        assert!(record.completed_at.is_none());
        assert!(f.log.entries().is_empty());
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_the_batch() {
        let mut platform = MockPlatformAdapter::new();
        platform
            .expect_remove_ban()
            .times(3)
            .returning(|_, subject| {
                if subject == "second" {
                    Err(PlatformError::RateLimited)
                } else {
                    Ok(())
                }
            });
        let f = fixture(Arc::new(platform));

        let now = f.clock.now();
        let mut ids = Vec::new();
        for (offset, subject) in [(3, "first"), (2, "second"), (1, "third")] {
            let action = f
                .scheduler
                .enqueue(
                    ActionKind::Unban,
                    "rust",
                    subject,
                    now - chrono::Duration::minutes(offset),
                    false,
                )
                .await
                .unwrap();
            ids.push(action.id);
        }

        let report = f.scheduler.run_once(now).await.unwrap();
        assert_eq!(report.due, 3);
        assert_eq!(report.completed, 2);
        assert_eq!(report.failed, 1);

        assert_eq!(status_of(&f.store, &ids[0]).await, ActionStatus::Completed);
        assert_eq!(status_of(&f.store, &ids[2]).await, ActionStatus::Completed);

        let failed = f.store.get(&ids[1]).await.unwrap().unwrap();
        assert_eq!(failed.status, ActionStatus::Failed);
        assert_eq!(failed.last_error.as_deref(), Some("Platform rate limit hit"));
        assert!(failed.failed_at.is_some());

        // Failed actions are not retried
        let report = f.scheduler.run_once(now).await.unwrap();
        assert_eq!(report.due, 0);
        assert_eq!(f.log.entries_of("scheduled_unban").len(), 2);
    }

    struct UnavailableStore;

    #[async_trait]
    impl ActionStore for UnavailableStore {
        async fn insert(&self, _record: ScheduledAction) -> StoreResult<String> {
            Err(StoreError::Unavailable("offline".to_string()))
        }
        async fn get(&self, _id: &str) -> StoreResult<Option<ScheduledAction>> {
            Err(StoreError::Unavailable("offline".to_string()))
        }
        async fn find_due(&self, _now: DateTime<Utc>) -> StoreResult<Vec<ScheduledAction>> {
            Err(StoreError::Unavailable("offline".to_string()))
        }
        async fn transition(
            &self,
            _id: &str,
            _from: ActionStatus,
            _transition: ActionTransition,
        ) -> StoreResult<bool> {
            Err(StoreError::Unavailable("offline".to_string()))
        }
        async fn cancel_all_pending(
            &self,
            _kind: ActionKind,
            _community: &str,
            _subject: &str,
            _at: DateTime<Utc>,
        ) -> StoreResult<usize> {
            Err(StoreError::Unavailable("offline".to_string()))
        }
        async fn pending_for_community(
            &self,
            _community: &str,
        ) -> StoreResult<Vec<ScheduledAction>> {
            Err(StoreError::Unavailable("offline".to_string()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_abandons_the_tick() {
        let mut platform = MockPlatformAdapter::new();
        platform.expect_remove_ban().times(0);
        platform.expect_remove_mute().times(0);

        let scheduler = ActionScheduler::new(
            Arc::new(UnavailableStore),
            Arc::new(platform),
            Arc::new(MemoryModerationLog::new()),
            Arc::new(ManualClock::new(Utc::now())),
            SYSTEM,
        );

        let result = scheduler.run_once(Utc::now()).await;
        assert!(matches!(result, Err(SchedulerError::Store(StoreError::Unavailable(_)))));

        // The guard was released, so the next tick tries again
        let result = scheduler.run_once(Utc::now()).await;
        assert!(matches!(result, Err(SchedulerError::Store(_))));
    }

    struct BrokenLog;

    #[async_trait]
    impl ModerationLog for BrokenLog {
        async fn append(&self, _entry: ModerationLogEntry) -> Result<(), LogError> {
            Err(LogError("disk full".to_string()))
        }
    }

    #[tokio::test]
    async fn test_log_failure_does_not_fail_the_action() {
        let store = MemoryActionStore::new();
        let platform = MemoryPlatform::new();
        platform
            .apply_ban("rust", "ferris", &BanReason::new("spam"), Some(1))
            .await
            .unwrap();
        let scheduler = ActionScheduler::new(
            Arc::new(store.clone()),
            Arc::new(platform.clone()),
            Arc::new(BrokenLog),
            Arc::new(ManualClock::new(Utc::now())),
            SYSTEM,
        );

        let now = Utc::now();
        let action = scheduler
            .enqueue(ActionKind::Unban, "rust", "ferris", now, false)
            .await
            .unwrap();

        let report = scheduler.run_once(now).await.unwrap();
        assert_eq!(report.completed, 1);
        assert_eq!(status_of(&store, &action.id).await, ActionStatus::Completed);
        assert!(!platform.is_banned("rust", "ferris"));
    }

    #[tokio::test]
    async fn test_duplicate_pending_entries_are_harmless() {
        let platform = MemoryPlatform::new();
        platform
            .apply_mute("rust", "ferris", 3, MuteChannel::Comment)
            .await
            .unwrap();
        let f = fixture(Arc::new(platform.clone()));
        let now = f.clock.now();

        for _ in 0..2 {
            f.scheduler
                .enqueue(ActionKind::Unmute, "rust", "ferris", now, false)
                .await
                .unwrap();
        }

        let report = f.scheduler.run_once(now).await.unwrap();
        assert_eq!(report.completed, 2);
        assert!(!platform.is_muted("rust", "ferris"));
    }

    /// Platform whose unban blocks until released
    struct GatedPlatform {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl PlatformAdapter for GatedPlatform {
        async fn apply_ban(
            &self,
            _community: &str,
            _subject: &str,
            _reason: &BanReason,
            _duration_days: Option<u32>,
        ) -> crate::error::PlatformResult<()> {
            Ok(())
        }
        async fn remove_ban(&self, _community: &str, _subject: &str) -> crate::error::PlatformResult<()> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(())
        }
        async fn apply_mute(
            &self,
            _community: &str,
            _subject: &str,
            _duration_days: u32,
            _channel: MuteChannel,
        ) -> crate::error::PlatformResult<()> {
            Ok(())
        }
        async fn remove_mute(&self, _community: &str, _subject: &str) -> crate::error::PlatformResult<()> {
            Ok(())
        }
        async fn send_direct_message(
            &self,
            _recipient: &str,
            _title: &str,
            _body: &str,
        ) -> crate::error::PlatformResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_overlapping_pass_is_skipped() {
        let platform = Arc::new(GatedPlatform {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let f = fixture(platform.clone());
        let now = f.clock.now();
        let action = f
            .scheduler
            .enqueue(ActionKind::Unban, "rust", "ferris", now, false)
            .await
            .unwrap();

        let first = {
            let scheduler = f.scheduler.clone();
            tokio::spawn(async move { scheduler.run_once(now).await })
        };
        platform.entered.notified().await;

        let second = f.scheduler.run_once(now).await.unwrap();
        assert!(second.overlapped);
        assert_eq!(second.due, 0);

        platform.release.notify_one();
        let first = first.await.unwrap().unwrap();
        assert_eq!(first.completed, 1);
        assert_eq!(status_of(&f.store, &action.id).await, ActionStatus::Completed);
    }

    #[tokio::test]
    async fn test_cancel_waits_for_in_flight_execution() {
        let platform = Arc::new(GatedPlatform {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let f = fixture(platform.clone());
        let now = f.clock.now();
        let action = f
            .scheduler
            .enqueue(ActionKind::Unban, "rust", "ferris", now, false)
            .await
            .unwrap();

        let pass = {
            let scheduler = f.scheduler.clone();
            tokio::spawn(async move { scheduler.run_once(now).await })
        };
        platform.entered.notified().await;

        let cancel = {
            let scheduler = f.scheduler.clone();
            tokio::spawn(async move {
                scheduler
                    .cancel_pending(ActionKind::Unban, "rust", "ferris")
                    .await
            })
        };
        tokio::task::yield_now().await;
        platform.release.notify_one();

        pass.await.unwrap().unwrap();
        // The execution already claimed the record, so nothing is left to cancel
        assert_eq!(cancel.await.unwrap().unwrap(), 0);
        assert_eq!(status_of(&f.store, &action.id).await, ActionStatus::Completed);
        assert!(f.scheduler.key_locks.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_loop_runs_due_actions() {
        let platform = MemoryPlatform::new();
        platform
            .apply_ban("rust", "ferris", &BanReason::new("spam"), Some(1))
            .await
            .unwrap();
        let f = fixture(Arc::new(platform.clone()));

        let action = f
            .scheduler
            .enqueue(
                ActionKind::Unban,
                "rust",
                "ferris",
                f.clock.now() + chrono::Duration::minutes(1),
                false,
            )
            .await
            .unwrap();

        let handle = f.scheduler.start(Duration::from_secs(60)).unwrap();
        assert!(matches!(
            f.scheduler.start(Duration::from_secs(60)),
            Err(SchedulerError::AlreadyRunning)
        ));

        // First tick fires immediately, before the action is due
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(status_of(&f.store, &action.id).await, ActionStatus::Pending);

        f.clock.advance(chrono::Duration::minutes(1));
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(status_of(&f.store, &action.id).await, ActionStatus::Completed);
        assert!(!platform.is_banned("rust", "ferris"));

        handle.stop().await;
        tokio::task::yield_now().await;

        // A stopped scheduler can be started again
        let handle = f.scheduler.start(Duration::from_secs(60)).unwrap();
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_now_triggers_a_pass() {
        let f = fixture(Arc::new(MemoryPlatform::new()));
        let handle = f.scheduler.start(Duration::from_secs(3600)).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let action = f
            .scheduler
            .enqueue(ActionKind::Unmute, "rust", "ferris", f.clock.now(), false)
            .await
            .unwrap();

        handle.run_now().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(status_of(&f.store, &action.id).await, ActionStatus::Completed);

        handle.stop().await;
    }
}
