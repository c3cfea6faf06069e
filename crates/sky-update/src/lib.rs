//! Background forecast updates for Sky
//!
//! Queues refresh requests, drains them one target at a time and schedules
//! the next automatic refresh.

pub mod coordinator;
pub mod queue;
pub mod render;
pub mod scheduler;
pub mod service;

pub use coordinator::{
    DrainReport, SkipReason, TargetOutcome, TargetReport, UpdateCoordinator, UpdateError,
};
pub use queue::UpdateQueue;
pub use render::{DayRow, WidgetRenderer, WidgetSnapshot};
pub use scheduler::{AlarmFired, AlarmScheduler, SchedulePolicy, TokioAlarm};
pub use service::{DrainHandle, UpdateService};
