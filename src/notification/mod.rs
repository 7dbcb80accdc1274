// Declare submodules
pub mod notification_api;
pub mod notification_dto;
pub mod notification_handlers;
pub mod notification_models;
pub mod notification_service;
pub mod notification_store;
pub mod retry;
pub mod unread_cache;

// Re-export public items
pub use notification_api::{HttpNotificationApi, NotificationApi};
pub use notification_dto::{normalize_notification_list, normalize_unread_count};
pub use notification_handlers::{
    clear_notifications, delete_notification, get_notifications, mark_all_read, mark_read,
    notification_stream, open_notification,
};
pub use notification_models::{EntityKind, NavigationTarget, NotificationRecord, NotificationType};
pub use notification_service::start_notification_sync;
pub use notification_store::{NotificationStore, StoreConfig, StoreEvent, FETCH_COOLDOWN, STORE_CAPACITY};
pub use retry::RetryPolicy;
pub use unread_cache::{UnreadCountCache, UNREAD_CACHE_TTL};
