use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use super::timer_dto::{StartTimerRequest, TimerResponse};
use crate::{
    error::{AppError, Result},
    state::AppState,
};

async fn describe(state: &AppState, task_id: &str) -> Result<TimerResponse> {
    let time_left = state.registry.get(task_id).await?;
    Ok(TimerResponse {
        task_id: task_id.to_string(),
        phase: state.registry.phase(task_id).to_string(),
        time_left,
    })
}

/// List timers running in this worker
#[utoipa::path(
    get,
    path = "/api/timers",
    responses(
        (status = 200, description = "Running timers", body = Vec<TimerResponse>)
    ),
    tag = "timers"
)]
pub async fn list_timers(State(state): State<AppState>) -> Result<Json<Vec<TimerResponse>>> {
    let mut timers = Vec::new();
    for task_id in state.registry.running() {
        timers.push(describe(&state, &task_id).await?);
    }
    Ok(Json(timers))
}

/// Get the remaining time for a task
#[utoipa::path(
    get,
    path = "/api/timers/{task_id}",
    params(
        ("task_id" = String, Path, description = "Task ID")
    ),
    responses(
        (status = 200, description = "Timer state", body = TimerResponse),
        (status = 404, description = "No timer for this task")
    ),
    tag = "timers"
)]
pub async fn get_timer(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TimerResponse>> {
    let timer = describe(&state, &task_id).await?;
    if timer.time_left.is_none() {
        return Err(AppError::NotFound(format!("No timer for task {}", task_id)));
    }
    Ok(Json(timer))
}

/// Start a countdown for a task
#[utoipa::path(
    post,
    path = "/api/timers/{task_id}/start",
    params(
        ("task_id" = String, Path, description = "Task ID")
    ),
    request_body = StartTimerRequest,
    responses(
        (status = 200, description = "Timer running", body = TimerResponse),
        (status = 400, description = "Invalid duration")
    ),
    tag = "timers"
)]
pub async fn start_timer(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Json(payload): Json<StartTimerRequest>,
) -> Result<Json<TimerResponse>> {
    payload.validate()?;

    if payload.auto {
        state.worker.auto_start(&task_id, payload.duration).await?;
    } else {
        state.worker.start(&task_id, payload.duration).await?;
    }

    Ok(Json(describe(&state, &task_id).await?))
}

/// Stop a countdown without an alert
#[utoipa::path(
    delete,
    path = "/api/timers/{task_id}",
    params(
        ("task_id" = String, Path, description = "Task ID")
    ),
    responses(
        (status = 204, description = "Timer stopped"),
        (status = 404, description = "No running timer")
    ),
    tag = "timers"
)]
pub async fn stop_timer(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<StatusCode> {
    if !state.worker.stop(&task_id).await? {
        return Err(AppError::NotFound(format!("No running timer for task {}", task_id)));
    }
    Ok(StatusCode::NO_CONTENT)
}
