use crate::websocket::{types::ViewMessage, ConnectionManager};

pub const ALERT_TITLE: &str = "Time's up!";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerAlert {
    pub task_id: String,
    pub title: String,
    pub body: String,
}

impl TimerAlert {
    pub fn expired(task_id: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            title: ALERT_TITLE.to_string(),
            body: format!("The timer for task {} has finished.", task_id),
        }
    }
}

/// Where expiry alerts are presented.
pub trait AlertSink: Send + Sync + 'static {
    fn fire(&self, alert: &TimerAlert);
}

/// Logs the alert and pushes it to every open view.
#[derive(Clone)]
pub struct ViewAlertSink {
    views: ConnectionManager,
}

impl ViewAlertSink {
    pub fn new(views: ConnectionManager) -> Self {
        Self { views }
    }
}

impl AlertSink for ViewAlertSink {
    fn fire(&self, alert: &TimerAlert) {
        tracing::info!("{} {}", alert.title, alert.body);
        self.views.broadcast(ViewMessage::TimerExpired {
            task_id: alert.task_id.clone(),
            title: alert.title.clone(),
            body: alert.body.clone(),
        });
    }
}
