pub mod push_client;
pub mod push_types;

pub use push_client::{PushClient, RECONNECT_DELAY};
pub use push_types::{ConnectionStatus, HandlerId, PushEnvelope, CONNECT_EVENT, NOTIFICATION_EVENT};
