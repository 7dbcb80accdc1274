use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::types::ViewMessage;

pub type ViewSender = mpsc::UnboundedSender<ViewMessage>;

/// Open views, keyed by a per-connection id.
#[derive(Clone)]
pub struct ConnectionManager {
    connections: Arc<DashMap<Uuid, ViewSender>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(DashMap::new()),
        }
    }

    /// Register a view and return its id
    pub fn add_view(&self, sender: ViewSender) -> Uuid {
        let view_id = Uuid::new_v4();
        self.connections.insert(view_id, sender);
        tracing::info!("View {} attached", view_id);
        view_id
    }

    pub fn remove_view(&self, view_id: &Uuid) {
        self.connections.remove(view_id);
        tracing::info!("View {} detached", view_id);
    }

    /// Send a message to a specific view
    pub fn send_to_view(&self, view_id: &Uuid, message: ViewMessage) -> bool {
        if let Some(sender) = self.connections.get(view_id) {
            sender.send(message).is_ok()
        } else {
            false
        }
    }

    /// Fan a message out to every open view, pruning closed ones.
    pub fn broadcast(&self, message: ViewMessage) {
        self.connections
            .retain(|_, sender| sender.send(message.clone()).is_ok());
    }

    pub fn view_count(&self) -> usize {
        self.connections.len()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
