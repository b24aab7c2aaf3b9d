//! Normalized event stream: sinks, the jobstate log and notifications.

mod error;
mod jobstate;
mod notify;
mod sink;
mod types;

pub use error::SinkError;
pub use jobstate::{JobstateLog, JOBSTATE_FILE};
pub use notify::{
    LoggingDispatcher, Notification, NotificationDispatcher, NotificationQueue,
    NotificationTrigger,
};
pub use sink::{default_destination, EventSink, JsonLinesSink, MemorySink, NullSink};
pub use types::{EventKind, MonitorEvent};
