pub mod alert;
pub mod clock;
pub mod timer_dto;
pub mod timer_handlers;
pub mod timer_models;
pub mod timer_registry;
pub mod timer_repository;
pub mod timer_worker;

pub use alert::{AlertSink, TimerAlert, ViewAlertSink};
pub use clock::{Clock, ManualClock, SystemClock};
pub use timer_dto::{StartTimerRequest, TimerResponse};
pub use timer_handlers::{get_timer, list_timers, start_timer, stop_timer};
pub use timer_models::{TickOutcome, TimerPhase, TimerState};
pub use timer_registry::TimerRegistry;
pub use timer_repository::{MemoryTimerStorage, SqliteTimerStorage, TimerStorage};
pub use timer_worker::{TimerWorker, TICK_INTERVAL};
