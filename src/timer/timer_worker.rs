use dashmap::{mapref::entry::Entry, DashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use super::{timer_models::TickOutcome, timer_registry::TimerRegistry};
use crate::{
    error::{AppError, Result},
    websocket::{
        types::{ViewMessage, WorkerMessage},
        ConnectionManager,
    },
};

pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Drives the registry: one tick loop per running task, plus the
/// view ↔ worker message protocol.
#[derive(Clone)]
pub struct TimerWorker {
    registry: Arc<TimerRegistry>,
    views: ConnectionManager,
    loops: Arc<DashMap<String, JoinHandle<()>>>,
    tick_interval: Duration,
}

impl TimerWorker {
    pub fn new(registry: Arc<TimerRegistry>, views: ConnectionManager) -> Self {
        Self::with_interval(registry, views, TICK_INTERVAL)
    }

    pub fn with_interval(
        registry: Arc<TimerRegistry>,
        views: ConnectionManager,
        tick_interval: Duration,
    ) -> Self {
        Self {
            registry,
            views,
            loops: Arc::new(DashMap::new()),
            tick_interval,
        }
    }

    pub fn registry(&self) -> &Arc<TimerRegistry> {
        &self.registry
    }

    /// Restores persisted timers and asks open views for any they hold.
    pub async fn activate(&self) -> Result<usize> {
        let restored = self.registry.restore().await?;
        for task_id in &restored {
            self.ensure_loop(task_id);
        }
        self.views.broadcast(ViewMessage::GetAllTimers);
        tracing::info!("Timer worker active, {} timer(s) resumed", restored.len());
        Ok(restored.len())
    }

    pub fn view_attached(&self, view_id: &Uuid) {
        self.views.send_to_view(view_id, ViewMessage::GetAllTimers);
    }

    /// Applies one view message. The returned message, if any, goes back to
    /// the sender only.
    pub async fn handle(&self, message: WorkerMessage) -> Result<Option<ViewMessage>> {
        match message {
            WorkerMessage::StartTimer {
                task_id,
                duration,
                end_time,
            } => {
                match (duration, end_time) {
                    (_, Some(end_time)) => {
                        if self.registry.start_until(&task_id, end_time).await?.is_some() {
                            self.ensure_loop(&task_id);
                        }
                    }
                    (Some(duration), None) => {
                        self.registry.start(&task_id, duration).await?;
                        self.ensure_loop(&task_id);
                    }
                    (None, None) => {
                        return Err(AppError::BadRequest(
                            "START_TIMER needs duration or endTime".to_string(),
                        ))
                    }
                }
                Ok(None)
            }
            WorkerMessage::StopTimer { task_id } => {
                self.stop(&task_id).await?;
                Ok(None)
            }
            WorkerMessage::GetTimer { task_id } => {
                let time_left = self.registry.get(&task_id).await?;
                Ok(Some(ViewMessage::Timer { task_id, time_left }))
            }
            WorkerMessage::RestoreAllTimers { timer_data } => {
                let timers = timer_data.into_iter().map(Into::into).collect();
                for task_id in self.registry.restore_from(timers).await? {
                    self.ensure_loop(&task_id);
                }
                Ok(None)
            }
        }
    }

    pub async fn start(&self, task_id: &str, duration_secs: u64) -> Result<()> {
        self.registry.start(task_id, duration_secs).await?;
        self.ensure_loop(task_id);
        Ok(())
    }

    pub async fn auto_start(&self, task_id: &str, duration_secs: u64) -> Result<bool> {
        let started = self.registry.auto_start(task_id, duration_secs).await?;
        // Adopted timers need a loop too.
        if self.registry.is_running(task_id) {
            self.ensure_loop(task_id);
        }
        Ok(started)
    }

    pub async fn stop(&self, task_id: &str) -> Result<bool> {
        if let Some((_, handle)) = self.loops.remove(task_id) {
            handle.abort();
        }
        self.registry.stop(task_id).await
    }

    fn ensure_loop(&self, task_id: &str) {
        self.loops.retain(|_, handle| !handle.is_finished());
        // The entry holds the shard lock, so concurrent starts spawn one loop.
        match self.loops.entry(task_id.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_finished() {
                    entry.insert(self.spawn_loop(task_id));
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(self.spawn_loop(task_id));
            }
        }
    }

    fn spawn_loop(&self, task_id: &str) -> JoinHandle<()> {
        let registry = self.registry.clone();
        let interval = self.tick_interval;
        let id = task_id.to_string();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately; start already broadcast.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match registry.tick(&id).await {
                    Ok(TickOutcome::Running(_)) => {}
                    Ok(TickOutcome::Expired) | Ok(TickOutcome::Idle) => break,
                    Err(e) => tracing::warn!("Tick failed for task {}: {}", id, e),
                }
            }
            tracing::debug!("Tick loop for task {} finished", id);
        })
    }

    pub fn active_loops(&self) -> usize {
        self.loops.iter().filter(|entry| !entry.value().is_finished()).count()
    }

    /// Aborts every loop and forgets in-memory state.
    pub fn shutdown(&self) {
        for entry in self.loops.iter() {
            entry.value().abort();
        }
        self.loops.clear();
        self.registry.shutdown();
        tracing::info!("Timer worker stopped");
    }
}
