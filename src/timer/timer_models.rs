use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Persisted countdown for one task. `end_time` is the only field that
/// drives behaviour; the rest is bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub task_id: String,
    pub end_time: i64,
    pub start_time: Option<i64>,
    pub duration: Option<i64>,
}

impl TimerState {
    pub fn new(task_id: impl Into<String>, now_ms: i64, duration_secs: u64) -> Self {
        let duration = i64::try_from(duration_secs).unwrap_or(i64::MAX / 1000);
        Self {
            task_id: task_id.into(),
            end_time: now_ms.saturating_add(duration.saturating_mul(1000)),
            start_time: Some(now_ms),
            duration: Some(duration),
        }
    }

    pub fn until(task_id: impl Into<String>, end_time: i64) -> Self {
        Self {
            task_id: task_id.into(),
            end_time,
            start_time: None,
            duration: None,
        }
    }

    /// Whole seconds left, clamped at zero.
    pub fn remaining_secs(&self, now_ms: i64) -> u64 {
        let left_ms = self.end_time.saturating_sub(now_ms);
        if left_ms <= 0 {
            0
        } else {
            (left_ms / 1000) as u64
        }
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.remaining_secs(now_ms) == 0
    }
}

/// Phase as seen from outside a tick. Expiry is the transition reported by
/// `TickOutcome::Expired`; afterwards the task reads as Stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerPhase {
    Stopped,
    Running,
}

impl std::fmt::Display for TimerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimerPhase::Stopped => write!(f, "Stopped"),
            TimerPhase::Running => write!(f, "Running"),
        }
    }
}

/// Result of a single tick for one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Running(u64),
    Expired,
    /// Not running here, or stopped elsewhere since the last tick.
    Idle,
}
