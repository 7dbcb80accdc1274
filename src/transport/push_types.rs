use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::error::AppError;

/// Every frame on the push socket is `{"event": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushEnvelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

/// Dispatched locally after every successful (re)connection.
pub const CONNECT_EVENT: &str = "connect";
pub const NOTIFICATION_EVENT: &str = "notification";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(pub(crate) u64);

pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;
pub type ErrorHandler = Arc<dyn Fn(&AppError) + Send + Sync>;

/// User-visible connection indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Idle,
    Connected,
    /// Shown once per outage.
    Reconnecting,
    /// Replaces `Reconnecting` once the link is back.
    Restored,
    Disconnected,
}
