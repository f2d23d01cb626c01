pub mod event;
pub mod event_log;
pub mod stats;

pub use event::{Event, EventStatus, EventType, NewEvent, SubmitEvent};
pub use event_log::{EventLog, LogStatus};
pub use stats::{QueueStats, StatusCounts, TypeCount};
