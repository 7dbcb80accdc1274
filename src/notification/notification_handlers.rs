use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::Stream;
use serde::Serialize;
use std::convert::Infallible;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};

use super::notification_models::{NavigationTarget, NotificationRecord};
use crate::{error::Result, state::AppState};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSnapshot {
    pub notifications: Vec<NotificationRecord>,
    pub unread_count: i64,
}

/// Current store contents for a view that just opened.
pub async fn get_notifications(State(state): State<AppState>) -> Json<NotificationSnapshot> {
    Json(NotificationSnapshot {
        notifications: state.store.records(),
        unread_count: state.store.unread_count(),
    })
}

#[derive(Debug, Serialize)]
pub struct OpenResponse {
    pub target: Option<NavigationTarget>,
    pub path: Option<String>,
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.store.mark_read(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_all_read(State(state): State<AppState>) -> Result<StatusCode> {
    state.store.mark_all_read().await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_notification(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.store.remove(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn clear_notifications(State(state): State<AppState>) -> Result<StatusCode> {
    state.store.clear().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Marks the notification read and tells the view where to go.
pub async fn open_notification(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OpenResponse>> {
    let target = state.store.open(&id).await?;
    let path = target.as_ref().map(NavigationTarget::path);
    Ok(Json(OpenResponse { target, path }))
}

/// Stream store events to a view via Server-Sent Events
pub async fn notification_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let rx = state.store.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|event| match event {
        Ok(event) => match serde_json::to_string(&event) {
            Ok(json) => Some(Ok(Event::default().data(json))),
            Err(e) => {
                tracing::warn!("Failed to encode store event: {}", e);
                None
            }
        },
        // Lagged receivers skip ahead; the next Updated event carries the badge.
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
