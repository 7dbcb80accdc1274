use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::{header::AUTHORIZATION, HeaderValue},
        Message,
    },
    MaybeTlsStream, WebSocketStream,
};

use super::push_types::{
    ConnectionStatus, ErrorHandler, EventHandler, HandlerId, PushEnvelope, CONNECT_EVENT,
};
use crate::error::{AppError, Result};

pub const RECONNECT_DELAY: Duration = Duration::from_secs(10);

type HandlerMap = DashMap<String, Vec<(HandlerId, EventHandler)>>;
type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Persistent push connection to the server with named-event subscription.
/// One connection loop per client, so at most one reconnect is ever pending.
pub struct PushClient {
    url: String,
    reconnect_delay: Duration,
    handlers: Arc<HandlerMap>,
    next_handler: AtomicU64,
    connection: Mutex<Option<JoinHandle<()>>>,
    status: Arc<watch::Sender<ConnectionStatus>>,
}

impl PushClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_reconnect_delay(url, RECONNECT_DELAY)
    }

    pub fn with_reconnect_delay(url: impl Into<String>, reconnect_delay: Duration) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Idle);
        Self {
            url: url.into(),
            reconnect_delay,
            handlers: Arc::new(DashMap::new()),
            next_handler: AtomicU64::new(0),
            connection: Mutex::new(None),
            status: Arc::new(status),
        }
    }

    /// Starts the connection loop. Returns `false` if one is already running.
    pub fn connect<F>(&self, credential: &str, on_error: F) -> bool
    where
        F: Fn(&AppError) + Send + Sync + 'static,
    {
        let mut connection = self.connection.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = connection.as_ref() {
            if !handle.is_finished() {
                tracing::debug!("Push connection already active");
                return false;
            }
        }

        let task = ConnectionTask {
            url: self.url.clone(),
            credential: credential.to_string(),
            reconnect_delay: self.reconnect_delay,
            handlers: self.handlers.clone(),
            status: self.status.clone(),
            on_error: Arc::new(on_error),
        };
        *connection = Some(tokio::spawn(task.run()));
        true
    }

    /// Tears down the connection and any pending reconnect.
    pub fn disconnect(&self) {
        let handle = self
            .connection
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.abort();
            self.status.send_replace(ConnectionStatus::Disconnected);
            tracing::info!("Push connection closed");
        }
    }

    pub fn on<F>(&self, event: &str, handler: F) -> HandlerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_handler.fetch_add(1, Ordering::SeqCst));
        self.handlers
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    pub fn off(&self, event: &str, id: HandlerId) -> bool {
        match self.handlers.get_mut(event) {
            Some(mut entry) => {
                let before = entry.len();
                entry.retain(|(handler_id, _)| *handler_id != id);
                entry.len() != before
            }
            None => false,
        }
    }

    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }
}

impl Drop for PushClient {
    fn drop(&mut self) {
        if let Some(handle) = self
            .connection
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }
    }
}

struct ConnectionTask {
    url: String,
    credential: String,
    reconnect_delay: Duration,
    handlers: Arc<HandlerMap>,
    status: Arc<watch::Sender<ConnectionStatus>>,
    on_error: ErrorHandler,
}

impl ConnectionTask {
    async fn run(self) {
        let mut outage = false;
        loop {
            let error = match self.open().await {
                Ok(socket) => {
                    if outage {
                        tracing::info!("Push connection restored");
                        self.status.send_replace(ConnectionStatus::Restored);
                    } else {
                        tracing::info!("Push connection established to {}", self.url);
                        self.status.send_replace(ConnectionStatus::Connected);
                    }
                    outage = false;
                    dispatch(&self.handlers, CONNECT_EVENT, &Value::Null);
                    self.pump(socket).await
                }
                Err(e) => e,
            };

            (self.on_error)(&error);
            if let AppError::Unauthorized(_) = error {
                tracing::error!("Push credential rejected, giving up: {}", error);
                self.status.send_replace(ConnectionStatus::Disconnected);
                return;
            }

            if !outage {
                outage = true;
                tracing::warn!(
                    "Push connection lost ({}), reconnecting in {:?}",
                    error,
                    self.reconnect_delay
                );
                self.status.send_replace(ConnectionStatus::Reconnecting);
            } else {
                tracing::debug!("Push reconnect failed: {}", error);
            }
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    async fn open(&self) -> Result<Socket> {
        let mut request = self.url.as_str().into_client_request()?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.credential))
            .map_err(|e| AppError::Transport(format!("invalid credential header: {}", e)))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (socket, _) = connect_async(request).await?;
        Ok(socket)
    }

    /// Forwards frames to handlers until the connection drops.
    async fn pump(&self, mut socket: Socket) -> AppError {
        while let Some(frame) = socket.next().await {
            match frame {
                Ok(Message::Text(text)) => match serde_json::from_str::<PushEnvelope>(&text) {
                    Ok(envelope) => dispatch(&self.handlers, &envelope.event, &envelope.data),
                    Err(e) => tracing::warn!("Dropping malformed push frame: {}", e),
                },
                Ok(Message::Ping(payload)) => {
                    let _ = socket.send(Message::Pong(payload)).await;
                }
                Ok(Message::Close(_)) => {
                    return AppError::Transport("server closed push connection".to_string())
                }
                Ok(_) => {}
                Err(e) => return e.into(),
            }
        }
        AppError::Transport("push stream ended".to_string())
    }
}

fn dispatch(handlers: &HandlerMap, event: &str, data: &Value) {
    // Clone out so handlers may call `on`/`off` without deadlocking the map.
    let targets: Vec<EventHandler> = handlers
        .get(event)
        .map(|entry| entry.iter().map(|(_, h)| h.clone()).collect())
        .unwrap_or_default();

    if targets.is_empty() {
        tracing::debug!("No handler for push event {}", event);
    }
    for handler in targets {
        handler(data);
    }
}
