use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct StartTimerRequest {
    /// Countdown length in seconds.
    #[validate(range(min = 1, max = 86400))]
    pub duration: u64,
    /// Set when the task just entered an active-work state; a timer that is
    /// already running for the task is kept instead of reset.
    #[serde(default)]
    pub auto: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimerResponse {
    pub task_id: String,
    pub phase: String,
    pub time_left: Option<u64>,
}
