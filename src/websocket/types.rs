use serde::{Deserialize, Serialize};

use crate::timer::timer_models::TimerState;

/// Worker → view messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViewMessage {
    #[serde(rename_all = "camelCase")]
    TimerUpdate { task_id: String, time_left: u64 },
    /// Reply to `GET_TIMER`; `None` when no timer is running.
    #[serde(rename_all = "camelCase")]
    Timer {
        task_id: String,
        time_left: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    TimerExpired {
        task_id: String,
        title: String,
        body: String,
    },
    /// Sent on worker activation: the view should answer with `RESTORE_ALL_TIMERS`.
    GetAllTimers,
    Error { message: String },
}

/// View → worker messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    #[serde(rename_all = "camelCase")]
    StartTimer {
        task_id: String,
        #[serde(default)]
        duration: Option<u64>,
        #[serde(default)]
        end_time: Option<i64>,
    },
    #[serde(rename_all = "camelCase")]
    StopTimer { task_id: String },
    #[serde(rename_all = "camelCase")]
    GetTimer { task_id: String },
    #[serde(rename_all = "camelCase")]
    RestoreAllTimers { timer_data: Vec<TimerEntry> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerEntry {
    pub task_id: String,
    pub end_time: i64,
}

impl From<TimerEntry> for TimerState {
    fn from(entry: TimerEntry) -> Self {
        TimerState::until(entry.task_id, entry.end_time)
    }
}
