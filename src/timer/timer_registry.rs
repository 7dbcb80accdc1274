use dashmap::DashSet;
use std::sync::Arc;

use super::{
    alert::{AlertSink, TimerAlert},
    clock::Clock,
    timer_models::{TickOutcome, TimerPhase, TimerState},
    timer_repository::TimerStorage,
};
use crate::{
    error::{AppError, Result},
    websocket::{types::ViewMessage, ConnectionManager},
};

/// Per-task countdown state machine: `Stopped → Running → {Expired, Stopped}`.
/// Only Running tasks are tracked; expiry is reported through the tick that
/// performs it, after which the task reads as Stopped again.
///
/// One registry lives per worker context. Deadlines are persisted in shared
/// storage, so any other registry over the same storage reconstructs the same
/// timers without further coordination.
pub struct TimerRegistry {
    storage: Arc<dyn TimerStorage>,
    clock: Arc<dyn Clock>,
    alerts: Arc<dyn AlertSink>,
    views: ConnectionManager,
    running: DashSet<String>,
}

impl TimerRegistry {
    pub fn new(
        storage: Arc<dyn TimerStorage>,
        clock: Arc<dyn Clock>,
        alerts: Arc<dyn AlertSink>,
        views: ConnectionManager,
    ) -> Self {
        Self {
            storage,
            clock,
            alerts,
            views,
            running: DashSet::new(),
        }
    }

    pub fn phase(&self, task_id: &str) -> TimerPhase {
        if self.is_running(task_id) {
            TimerPhase::Running
        } else {
            TimerPhase::Stopped
        }
    }

    pub fn is_running(&self, task_id: &str) -> bool {
        self.running.contains(task_id)
    }

    pub fn running(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.running.iter().map(|id| id.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Moves `task_id` out of Running. Only one caller ever wins.
    fn leave_running(&self, task_id: &str) -> bool {
        self.running.remove(task_id).is_some()
    }

    pub async fn start(&self, task_id: &str, duration_secs: u64) -> Result<TimerState> {
        if duration_secs == 0 {
            return Err(AppError::Validation("duration must be positive".to_string()));
        }
        let timer = TimerState::new(task_id, self.clock.now_ms(), duration_secs);
        self.storage.save(&timer).await?;
        self.running.insert(task_id.to_string());

        tracing::info!("Timer started for task {} ({}s)", task_id, duration_secs);
        self.broadcast(task_id, duration_secs);
        Ok(timer)
    }

    /// Starts against an absolute deadline. A deadline already past starts nothing.
    pub async fn start_until(&self, task_id: &str, end_time: i64) -> Result<Option<TimerState>> {
        let timer = TimerState::until(task_id, end_time);
        let remaining = timer.remaining_secs(self.clock.now_ms());
        if remaining == 0 {
            tracing::debug!("Ignoring start for task {} with past deadline", task_id);
            return Ok(None);
        }
        self.storage.save(&timer).await?;
        self.running.insert(task_id.to_string());

        tracing::info!("Timer started for task {} until {}", task_id, end_time);
        self.broadcast(task_id, remaining);
        Ok(Some(timer))
    }

    /// Starts a timer for a task entering active work, unless one is already
    /// running here or persisted by another view. Returns whether it started.
    pub async fn auto_start(&self, task_id: &str, duration_secs: u64) -> Result<bool> {
        if self.is_running(task_id) {
            tracing::debug!("Timer for task {} already running, not auto-starting", task_id);
            return Ok(false);
        }
        if let Some(existing) = self.storage.load(task_id).await? {
            if !existing.is_expired(self.clock.now_ms()) {
                tracing::debug!("Adopting persisted timer for task {}", task_id);
                self.running.insert(task_id.to_string());
                return Ok(false);
            }
        }
        self.start(task_id, duration_secs).await?;
        Ok(true)
    }

    /// Removes the timer without an alert. Returns whether there was anything
    /// to stop, here or in storage.
    pub async fn stop(&self, task_id: &str) -> Result<bool> {
        let persisted = self.storage.remove(task_id).await?;
        let was_running = self.leave_running(task_id);

        tracing::info!("Timer stopped for task {}", task_id);
        Ok(persisted || was_running)
    }

    /// Re-derives remaining time from the persisted deadline and broadcasts it.
    pub async fn tick(&self, task_id: &str) -> Result<TickOutcome> {
        if !self.is_running(task_id) {
            return Ok(TickOutcome::Idle);
        }

        let timer = match self.storage.load(task_id).await? {
            Some(timer) => timer,
            None => {
                // Stopped or expired by another view.
                if self.leave_running(task_id) {
                    tracing::debug!("Timer for task {} vanished from storage", task_id);
                }
                return Ok(TickOutcome::Idle);
            }
        };

        let remaining = timer.remaining_secs(self.clock.now_ms());
        if remaining > 0 {
            self.broadcast(task_id, remaining);
            return Ok(TickOutcome::Running(remaining));
        }

        if !self.leave_running(task_id) {
            return Ok(TickOutcome::Idle);
        }
        self.broadcast(task_id, 0);
        self.alerts.fire(&TimerAlert::expired(task_id));
        tracing::info!("Timer expired for task {}", task_id);

        // A leftover entry is purged silently by the next restore.
        if let Err(e) = self.storage.remove(task_id).await {
            tracing::warn!("Failed to purge expired timer for task {}: {}", task_id, e);
        }
        Ok(TickOutcome::Expired)
    }

    /// Resumes every persisted timer still in the future and silently purges
    /// the rest. Returns the ids that entered Running.
    pub async fn restore(&self) -> Result<Vec<String>> {
        let timers = self.storage.load_all().await?;
        self.adopt(timers, false).await
    }

    /// Like `restore`, for deadlines a view supplied.
    pub async fn restore_from(&self, timers: Vec<TimerState>) -> Result<Vec<String>> {
        self.adopt(timers, true).await
    }

    async fn adopt(&self, timers: Vec<TimerState>, persist: bool) -> Result<Vec<String>> {
        let now = self.clock.now_ms();
        let mut restored = Vec::new();

        for timer in timers {
            if timer.is_expired(now) {
                if !persist {
                    self.storage.remove(&timer.task_id).await?;
                    tracing::debug!("Purged expired timer for task {}", timer.task_id);
                }
                continue;
            }
            if self.is_running(&timer.task_id) {
                continue;
            }
            if persist {
                self.storage.save(&timer).await?;
            }
            self.running.insert(timer.task_id.clone());
            restored.push(timer.task_id);
        }

        if !restored.is_empty() {
            tracing::info!("Restored {} timer(s)", restored.len());
        }
        Ok(restored)
    }

    /// Seconds left for a persisted, unexpired timer.
    pub async fn get(&self, task_id: &str) -> Result<Option<u64>> {
        let now = self.clock.now_ms();
        Ok(self
            .storage
            .load(task_id)
            .await?
            .map(|timer| timer.remaining_secs(now))
            .filter(|remaining| *remaining > 0))
    }

    /// Forgets running tasks. Persisted deadlines survive for the next start.
    pub fn shutdown(&self) {
        self.running.clear();
    }

    fn broadcast(&self, task_id: &str, time_left: u64) {
        self.views.broadcast(ViewMessage::TimerUpdate {
            task_id: task_id.to_string(),
            time_left,
        });
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::timer::{clock::ManualClock, timer_repository::MemoryTimerStorage};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    #[derive(Default)]
    pub(crate) struct RecordingAlerts {
        pub(crate) fired: Mutex<Vec<TimerAlert>>,
    }

    impl AlertSink for RecordingAlerts {
        fn fire(&self, alert: &TimerAlert) {
            self.fired.lock().unwrap().push(alert.clone());
        }
    }

    pub(crate) struct Harness {
        pub(crate) registry: Arc<TimerRegistry>,
        pub(crate) clock: Arc<ManualClock>,
        pub(crate) alerts: Arc<RecordingAlerts>,
        pub(crate) storage: MemoryTimerStorage,
        pub(crate) updates: mpsc::UnboundedReceiver<ViewMessage>,
        pub(crate) views: ConnectionManager,
    }

    pub(crate) fn harness_with(storage: MemoryTimerStorage, clock: Arc<ManualClock>) -> Harness {
        let alerts = Arc::new(RecordingAlerts::default());
        let views = ConnectionManager::new();
        let (tx, updates) = mpsc::unbounded_channel();
        views.add_view(tx);
        let registry = Arc::new(TimerRegistry::new(
            Arc::new(storage.clone()),
            clock.clone(),
            alerts.clone(),
            views.clone(),
        ));
        Harness {
            registry,
            clock,
            alerts,
            storage,
            updates,
            views,
        }
    }

    pub(crate) fn harness() -> Harness {
        harness_with(MemoryTimerStorage::new(), Arc::new(ManualClock::new(1_700_000_000_000)))
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ViewMessage>) -> Vec<ViewMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[tokio::test]
    async fn test_tick_after_pause_clamps_to_zero() {
        let mut h = harness();
        h.registry.start("T1", 10).await.unwrap();
        h.clock.advance_ms(12_000);

        assert_eq!(h.registry.tick("T1").await.unwrap(), TickOutcome::Expired);
        let updates = drain(&mut h.updates);
        assert_eq!(
            updates.last(),
            Some(&ViewMessage::TimerUpdate {
                task_id: "T1".into(),
                time_left: 0
            })
        );
        assert_eq!(h.registry.phase("T1"), TimerPhase::Stopped);
        assert!(h.registry.running().is_empty());
    }

    #[tokio::test]
    async fn test_expiry_fires_exactly_once() {
        let h = harness();
        h.registry.start("T1", 5).await.unwrap();

        for _ in 0..6 {
            h.clock.advance_ms(1_000);
            h.registry.tick("T1").await.unwrap();
        }
        assert_eq!(h.registry.tick("T1").await.unwrap(), TickOutcome::Idle);
        assert_eq!(h.registry.tick("T1").await.unwrap(), TickOutcome::Idle);

        let fired = h.alerts.fired.lock().unwrap();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0], TimerAlert::expired("T1"));
        assert!(fired[0].body.contains("T1"));
        drop(fired);
        assert!(h.storage.load("T1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tick_recomputes_from_deadline() {
        let h = harness();
        h.registry.start("T1", 100).await.unwrap();

        h.clock.advance_ms(1_000);
        assert_eq!(h.registry.tick("T1").await.unwrap(), TickOutcome::Running(99));
        // A long stall does not lag behind the wall clock.
        h.clock.advance_ms(40_500);
        assert_eq!(h.registry.tick("T1").await.unwrap(), TickOutcome::Running(58));
    }

    #[tokio::test]
    async fn test_stop_is_silent() {
        let h = harness();
        h.registry.start("T1", 30).await.unwrap();

        assert!(h.registry.stop("T1").await.unwrap());
        h.clock.advance_ms(60_000);
        assert_eq!(h.registry.tick("T1").await.unwrap(), TickOutcome::Idle);
        assert!(h.alerts.fired.lock().unwrap().is_empty());
        assert_eq!(h.registry.phase("T1"), TimerPhase::Stopped);
        assert_eq!(h.registry.get("T1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_restore_purges_expired_without_broadcast() {
        let mut h = harness();
        let now = h.clock.now_ms();
        h.storage.save(&TimerState::until("old", now - 1_000)).await.unwrap();
        h.storage.save(&TimerState::until("live", now + 30_000)).await.unwrap();

        let restored = h.registry.restore().await.unwrap();

        assert_eq!(restored, vec!["live".to_string()]);
        assert!(h.storage.load("old").await.unwrap().is_none());
        assert_eq!(h.registry.phase("old"), TimerPhase::Stopped);
        assert!(drain(&mut h.updates).is_empty());
        assert!(h.alerts.fired.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_restore_does_not_double_start() {
        let h = harness();
        h.registry.start("T1", 30).await.unwrap();

        assert!(h.registry.restore().await.unwrap().is_empty());
        assert_eq!(h.registry.running(), vec!["T1".to_string()]);
    }

    #[tokio::test]
    async fn test_restored_timer_wins_over_auto_start() {
        let storage = MemoryTimerStorage::new();
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let first = harness_with(storage.clone(), clock.clone());
        first.registry.start("T1", 600).await.unwrap();
        clock.advance_ms(200_000);

        // A second view over the same storage, as after a reload.
        let second = harness_with(storage, clock);
        second.registry.restore().await.unwrap();
        assert!(!second.registry.auto_start("T1", 600).await.unwrap());
        assert_eq!(second.registry.get("T1").await.unwrap(), Some(400));

        assert!(second.registry.auto_start("T2", 60).await.unwrap());
        assert_eq!(second.registry.get("T2").await.unwrap(), Some(60));
    }

    #[tokio::test]
    async fn test_auto_start_adopts_timer_persisted_elsewhere() {
        let h = harness();
        let now = h.clock.now_ms();
        h.storage.save(&TimerState::until("T1", now + 90_000)).await.unwrap();

        assert!(!h.registry.auto_start("T1", 600).await.unwrap());
        assert!(h.registry.is_running("T1"));
        assert_eq!(h.registry.get("T1").await.unwrap(), Some(90));
    }

    #[tokio::test]
    async fn test_expiry_in_one_view_stops_the_other_quietly() {
        let storage = MemoryTimerStorage::new();
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let a = harness_with(storage.clone(), clock.clone());
        let b = harness_with(storage, clock.clone());
        a.registry.start("T1", 5).await.unwrap();
        b.registry.restore().await.unwrap();

        clock.advance_ms(6_000);
        assert_eq!(a.registry.tick("T1").await.unwrap(), TickOutcome::Expired);
        assert_eq!(b.registry.tick("T1").await.unwrap(), TickOutcome::Idle);

        assert_eq!(a.alerts.fired.lock().unwrap().len(), 1);
        assert!(b.alerts.fired.lock().unwrap().is_empty());
        assert_eq!(b.registry.phase("T1"), TimerPhase::Stopped);
    }

    #[tokio::test]
    async fn test_start_until_and_restore_from() {
        let h = harness();
        let now = h.clock.now_ms();

        assert!(h.registry.start_until("past", now - 5).await.unwrap().is_none());
        assert!(h.registry.start_until("T1", now + 3_500).await.unwrap().is_some());
        assert_eq!(h.registry.get("T1").await.unwrap(), Some(3));

        let restored = h
            .registry
            .restore_from(vec![
                TimerState::until("T1", now + 9_000),
                TimerState::until("T2", now + 9_000),
                TimerState::until("T3", now - 9_000),
            ])
            .await
            .unwrap();
        assert_eq!(restored, vec!["T2".to_string()]);
        assert_eq!(h.registry.get("T1").await.unwrap(), Some(3));
        assert!(h.storage.load("T3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_zero_duration_rejected() {
        let h = harness();
        assert!(matches!(
            h.registry.start("T1", 0).await,
            Err(AppError::Validation(_))
        ));
        assert_eq!(h.views.view_count(), 1);
    }

    /// Storage whose removals fail while `fail_remove` is set.
    #[derive(Clone, Default)]
    struct FlakyStorage {
        inner: MemoryTimerStorage,
        fail_remove: Arc<std::sync::atomic::AtomicBool>,
    }

    #[async_trait::async_trait]
    impl TimerStorage for FlakyStorage {
        async fn load(&self, task_id: &str) -> Result<Option<TimerState>> {
            self.inner.load(task_id).await
        }
        async fn load_all(&self) -> Result<Vec<TimerState>> {
            self.inner.load_all().await
        }
        async fn save(&self, timer: &TimerState) -> Result<()> {
            self.inner.save(timer).await
        }
        async fn remove(&self, task_id: &str) -> Result<bool> {
            if self.fail_remove.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(AppError::Storage("disk busy".to_string()));
            }
            self.inner.remove(task_id).await
        }
    }

    #[tokio::test]
    async fn test_expiry_alert_survives_storage_failure() {
        let storage = FlakyStorage::default();
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let alerts = Arc::new(RecordingAlerts::default());
        let registry = TimerRegistry::new(
            Arc::new(storage.clone()),
            clock.clone(),
            alerts.clone(),
            ConnectionManager::new(),
        );
        registry.start("T1", 5).await.unwrap();

        storage.fail_remove.store(true, std::sync::atomic::Ordering::SeqCst);
        clock.advance_ms(6_000);
        assert_eq!(registry.tick("T1").await.unwrap(), TickOutcome::Expired);
        assert_eq!(registry.tick("T1").await.unwrap(), TickOutcome::Idle);
        assert_eq!(alerts.fired.lock().unwrap().len(), 1);

        // The leftover deadline is already past, so a restore drops it quietly.
        storage.fail_remove.store(false, std::sync::atomic::Ordering::SeqCst);
        assert!(registry.restore().await.unwrap().is_empty());
        assert!(storage.inner.load("T1").await.unwrap().is_none());
        assert_eq!(alerts.fired.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_and_expiry_leave_no_residue() {
        let h = harness();
        for i in 0..100 {
            assert!(!h.registry.stop(&format!("ghost-{}", i)).await.unwrap());
        }
        h.registry.start("T1", 1).await.unwrap();
        h.registry.start("T2", 60).await.unwrap();
        h.clock.advance_ms(2_000);
        assert_eq!(h.registry.tick("T1").await.unwrap(), TickOutcome::Expired);
        assert!(h.registry.stop("T2").await.unwrap());

        assert!(h.registry.running().is_empty());
        assert_eq!(h.registry.running.len(), 0);
    }
}
