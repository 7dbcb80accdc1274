use serde::Deserialize;
use serde_json::Value;

use super::notification_models::NotificationRecord;

/// Every list shape the notification endpoint has been seen to return.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NotificationListShape {
    Bare(Vec<Value>),
    Data { data: Vec<Value> },
    Items { items: Vec<Value> },
}

/// Every unread-count shape the counting endpoint has been seen to return.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UnreadCountShape {
    Bare(f64),
    Count {
        count: f64,
    },
    UnreadCount {
        #[serde(rename = "unreadCount")]
        unread_count: f64,
    },
    Data {
        data: f64,
    },
}

/// Flattens a list response into records. Unknown shapes yield an empty list
/// and entries that do not parse are skipped.
pub fn normalize_notification_list(body: Value) -> Vec<NotificationRecord> {
    let entries = match serde_json::from_value::<NotificationListShape>(body) {
        Ok(NotificationListShape::Bare(entries))
        | Ok(NotificationListShape::Data { data: entries })
        | Ok(NotificationListShape::Items { items: entries }) => entries,
        Err(_) => {
            tracing::warn!("Unrecognised notification list shape, treating as empty");
            return Vec::new();
        }
    };

    entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value(entry) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("Skipping malformed notification: {}", e);
                None
            }
        })
        .collect()
}

/// Reduces a count response to a non-negative integer; anything unparseable is 0.
pub fn normalize_unread_count(body: Value) -> i64 {
    let raw = match serde_json::from_value::<UnreadCountShape>(body) {
        Ok(UnreadCountShape::Bare(n))
        | Ok(UnreadCountShape::Count { count: n })
        | Ok(UnreadCountShape::UnreadCount { unread_count: n })
        | Ok(UnreadCountShape::Data { data: n }) => n,
        Err(_) => return 0,
    };

    if raw.is_finite() && raw > 0.0 {
        raw.floor() as i64
    } else {
        0
    }
}
