use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use validator::Validate;

use super::{
    notification_api::NotificationApi,
    notification_dto::normalize_notification_list,
    notification_models::{NavigationTarget, NotificationRecord, NotificationType},
    retry::RetryPolicy,
    unread_cache::{UnreadCountCache, UNREAD_CACHE_TTL},
};
use crate::{
    error::{AppError, Result},
    transport::{HandlerId, PushClient, CONNECT_EVENT, NOTIFICATION_EVENT},
};

pub const STORE_CAPACITY: usize = 50;
pub const FETCH_COOLDOWN: Duration = Duration::from_secs(5);

/// What views hear from the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    /// A freshly pushed notification worth a transient alert.
    Alert { notification: NotificationRecord },
    /// Something project-shaped changed; list views should reload.
    DataChanged { kind: NotificationType },
    Updated { unread_count: i64 },
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub capacity: usize,
    pub fetch_cooldown: Duration,
    pub unread_ttl: Duration,
    pub retry: RetryPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: STORE_CAPACITY,
            fetch_cooldown: FETCH_COOLDOWN,
            unread_ttl: UNREAD_CACHE_TTL,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Default)]
struct StoreState {
    records: Vec<NotificationRecord>,
    unread_count: i64,
    fetching: bool,
    last_fetch: Option<Instant>,
}

/// Clears the in-flight flag even when a fetch is cancelled mid-request.
struct FetchGuard<'a> {
    state: &'a Mutex<StoreState>,
}

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.fetching = false;
    }
}

/// Capped, deduplicated notification list plus unread counter.
///
/// `fetch` replaces the list wholesale and `receive` prepends pushed records;
/// when the two interleave, whichever lands last wins.
pub struct NotificationStore {
    api: Arc<dyn NotificationApi>,
    config: StoreConfig,
    unread_cache: UnreadCountCache,
    state: Mutex<StoreState>,
    events: broadcast::Sender<StoreEvent>,
    subscriptions: Mutex<Vec<(&'static str, HandlerId)>>,
    resync: Mutex<Option<JoinHandle<()>>>,
}

impl NotificationStore {
    pub fn new(api: Arc<dyn NotificationApi>) -> Self {
        Self::with_config(api, StoreConfig::default())
    }

    pub fn with_config(api: Arc<dyn NotificationApi>, config: StoreConfig) -> Self {
        let (events, _) = broadcast::channel(100);
        Self {
            unread_cache: UnreadCountCache::with_policy(api.clone(), config.unread_ttl, config.retry),
            api,
            config,
            state: Mutex::new(StoreState::default()),
            events,
            subscriptions: Mutex::new(Vec::new()),
            resync: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: StoreEvent) {
        let _ = self.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub fn records(&self) -> Vec<NotificationRecord> {
        self.lock().records.clone()
    }

    pub fn unread_count(&self) -> i64 {
        self.lock().unread_count
    }

    /// Reloads the full list. Returns `Ok(false)` without touching the network
    /// while another fetch is in flight or inside the cooldown window.
    pub async fn fetch(&self) -> Result<bool> {
        {
            let mut state = self.lock();
            if state.fetching {
                tracing::debug!("Notification fetch already in flight, skipping");
                return Ok(false);
            }
            if let Some(at) = state.last_fetch {
                if at.elapsed() < self.config.fetch_cooldown {
                    tracing::debug!("Notification fetch inside cooldown, skipping");
                    return Ok(false);
                }
            }
            state.fetching = true;
        }
        let _guard = FetchGuard { state: &self.state };

        let api = &self.api;
        let result = self
            .config
            .retry
            .run("notification list", || api.list())
            .await;
        self.lock().last_fetch = Some(Instant::now());

        let records = self.prepare(normalize_notification_list(result?));
        let unread = records.iter().filter(|r| !r.is_read).count() as i64;
        {
            let mut state = self.lock();
            state.records = records;
            state.unread_count = unread;
        }
        // The list is capped, so its unread tally is not the server's count.
        self.unread_cache.invalidate();

        tracing::debug!("Fetched notifications, {} unread", unread);
        self.emit(StoreEvent::Updated { unread_count: unread });
        Ok(true)
    }

    fn prepare(&self, records: Vec<NotificationRecord>) -> Vec<NotificationRecord> {
        let mut seen = HashSet::new();
        let mut records: Vec<_> = records
            .into_iter()
            .filter(|r| seen.insert(r.id.clone()))
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(self.config.capacity);
        records
    }

    /// Push delivery path. Returns whether the record was accepted.
    pub fn receive(&self, record: NotificationRecord) -> bool {
        if record.kind.is_housekeeping() {
            tracing::debug!("Ignoring housekeeping event {}", record.kind);
            return false;
        }
        if let Err(e) = record.validate() {
            tracing::debug!("Dropping incomplete notification: {}", e);
            return false;
        }

        let unread = {
            let mut state = self.lock();
            if state.records.iter().any(|r| r.id == record.id) {
                tracing::debug!("Duplicate notification {} ignored", record.id);
                return false;
            }
            state.records.insert(0, record.clone());
            state.records.truncate(self.config.capacity);
            if !record.is_read {
                state.unread_count += 1;
            }
            state.unread_count
        };
        self.unread_cache.invalidate();

        tracing::info!("Notification received: {}", record.message);
        let kind = record.kind;
        self.emit(StoreEvent::Alert {
            notification: record,
        });
        if kind.is_project_lifecycle() {
            self.emit(StoreEvent::DataChanged { kind });
        }
        self.emit(StoreEvent::Updated {
            unread_count: unread,
        });
        true
    }

    pub async fn mark_read(&self, id: &str) -> Result<()> {
        self.api.mark_read(id).await?;

        let unread = {
            let mut state = self.lock();
            let mut delta = 0;
            if let Some(record) = state.records.iter_mut().find(|r| r.id == id) {
                if !record.is_read {
                    record.is_read = true;
                    delta = 1;
                }
            }
            state.unread_count = (state.unread_count - delta).max(0);
            state.unread_count
        };
        self.after_mutation(unread);
        Ok(())
    }

    pub async fn mark_all_read(&self) -> Result<()> {
        self.api.mark_all_read().await?;

        {
            let mut state = self.lock();
            for record in state.records.iter_mut() {
                record.is_read = true;
            }
            state.unread_count = 0;
        }
        self.after_mutation(0);
        self.unread_cache.prime(0);
        Ok(())
    }

    pub async fn remove(&self, id: &str) -> Result<()> {
        self.api.delete(id).await?;

        let unread = {
            let mut state = self.lock();
            if let Some(pos) = state.records.iter().position(|r| r.id == id) {
                let removed = state.records.remove(pos);
                if !removed.is_read {
                    state.unread_count = (state.unread_count - 1).max(0);
                }
            }
            state.unread_count
        };
        self.after_mutation(unread);
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        self.api.clear().await?;

        {
            let mut state = self.lock();
            state.records.clear();
            state.unread_count = 0;
        }
        self.after_mutation(0);
        self.unread_cache.prime(0);
        Ok(())
    }

    fn after_mutation(&self, unread: i64) {
        self.unread_cache.invalidate();
        self.emit(StoreEvent::Updated {
            unread_count: unread,
        });
    }

    /// Pulls the server's count through the cache and adopts it as the badge value.
    pub async fn refresh_unread_count(&self) -> Result<i64> {
        let count = self.unread_cache.get_unread_count().await?;
        self.lock().unread_count = count;
        self.emit(StoreEvent::Updated {
            unread_count: count,
        });
        Ok(count)
    }

    /// Marks the notification read and resolves where it points. A rejected
    /// credential resolves to nothing rather than an error.
    pub async fn open(&self, id: &str) -> Result<Option<NavigationTarget>> {
        let (target, unread) = {
            let state = self.lock();
            let record = state
                .records
                .iter()
                .find(|r| r.id == id)
                .ok_or_else(|| AppError::NotFound(format!("notification {}", id)))?;
            (record.navigation_target(), !record.is_read)
        };

        if unread {
            match self.mark_read(id).await {
                Ok(()) => {}
                Err(AppError::Unauthorized(_)) => {
                    tracing::debug!("Navigation for {} suppressed: unauthorized", id);
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(target)
    }

    /// Routes `notification` push events into `receive` and resyncs on every
    /// (re)connection. Returns the registered handler ids.
    pub fn attach(self: &Arc<Self>, push: &PushClient) -> Vec<HandlerId> {
        let store = self.clone();
        let on_notification = push.on(NOTIFICATION_EVENT, move |payload| {
            match serde_json::from_value::<NotificationRecord>(payload.clone()) {
                Ok(record) => {
                    store.receive(record);
                }
                Err(e) => tracing::warn!("Unparseable notification payload: {}", e),
            }
        });

        let store = self.clone();
        let on_connect = push.on(CONNECT_EVENT, move |_| store.spawn_resync());

        let mut subscriptions = self.subscriptions.lock().unwrap_or_else(|e| e.into_inner());
        subscriptions.push((NOTIFICATION_EVENT, on_notification));
        subscriptions.push((CONNECT_EVENT, on_connect));
        vec![on_notification, on_connect]
    }

    /// Unregisters everything `attach` added and cancels a pending resync.
    pub fn detach(&self, push: &PushClient) {
        let subscriptions: Vec<_> = self
            .subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for (event, id) in subscriptions {
            push.off(event, id);
        }

        if let Some(handle) = self.resync.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
    }

    fn spawn_resync(self: &Arc<Self>) {
        let mut pending = self.resync.lock().unwrap_or_else(|e| e.into_inner());
        if pending.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let store = self.clone();
        *pending = Some(tokio::spawn(async move {
            if let Err(e) = store.fetch().await {
                tracing::warn!("Resync after connect failed: {}", e);
            }
        }));
    }
}
