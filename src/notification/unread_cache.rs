use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use super::{notification_api::NotificationApi, notification_dto::normalize_unread_count, retry::RetryPolicy};
use crate::error::Result;

pub const UNREAD_CACHE_TTL: Duration = Duration::from_secs(5);

type PendingCount = Shared<BoxFuture<'static, Result<i64>>>;

#[derive(Default)]
struct CacheState {
    value: Option<i64>,
    fetched_at: Option<Instant>,
    in_flight: Option<PendingCount>,
    /// Bumped on invalidate so a stale in-flight result does not repopulate the cache.
    generation: u64,
}

/// Short-TTL cache in front of the unread-count endpoint. Concurrent callers
/// share one request.
pub struct UnreadCountCache {
    api: Arc<dyn NotificationApi>,
    retry: RetryPolicy,
    ttl: Duration,
    state: Arc<Mutex<CacheState>>,
}

impl UnreadCountCache {
    pub fn new(api: Arc<dyn NotificationApi>) -> Self {
        Self::with_policy(api, UNREAD_CACHE_TTL, RetryPolicy::default())
    }

    pub fn with_policy(api: Arc<dyn NotificationApi>, ttl: Duration, retry: RetryPolicy) -> Self {
        Self {
            api,
            retry,
            ttl,
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    pub async fn get_unread_count(&self) -> Result<i64> {
        let pending = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

            if let (Some(value), Some(at)) = (state.value, state.fetched_at) {
                if at.elapsed() < self.ttl {
                    return Ok(value);
                }
            }

            match state.in_flight.clone() {
                Some(pending) => pending,
                None => {
                    let pending = self.request(state.generation);
                    state.in_flight = Some(pending.clone());
                    pending
                }
            }
        };

        pending.await
    }

    fn request(&self, generation: u64) -> PendingCount {
        let api = self.api.clone();
        let retry = self.retry;
        let shared_state = self.state.clone();

        async move {
            let result = retry
                .run("unread count", || api.unread_count())
                .await
                .map(normalize_unread_count);

            let mut state = shared_state.lock().unwrap_or_else(|e| e.into_inner());
            if state.generation == generation {
                state.in_flight = None;
                if let Ok(value) = result {
                    state.value = Some(value);
                    state.fetched_at = Some(Instant::now());
                }
            }
            if let Err(ref e) = result {
                tracing::warn!("Unread count fetch failed: {}", e);
            }
            result
        }
        .boxed()
        .shared()
    }

    /// Forces the next call to hit the server.
    pub fn invalidate(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.value = None;
        state.fetched_at = None;
        state.in_flight = None;
        state.generation += 1;
    }

    /// Seeds the cache with a value already known to be current.
    pub fn prime(&self, value: i64) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.value = Some(value.max(0));
        state.fetched_at = Some(Instant::now());
    }

    pub fn cached(&self) -> Option<i64> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).value
    }
}
