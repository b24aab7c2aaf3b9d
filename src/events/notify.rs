//! Notification triggers queued from emitted events.

use std::collections::VecDeque;

use super::types::{EventKind, MonitorEvent};
use crate::jobs::JobState;

/// A queued notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub trigger: NotificationTrigger,
    pub wf_uuid: String,
    pub job_id: Option<String>,
    pub submit_seq: Option<u32>,
    pub status: Option<i32>,
    pub timestamp: i64,
}

/// Event kinds that produce notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationTrigger {
    WorkflowEnd,
    JobFailure,
    JobSuccess,
    ScriptFailure,
}

impl NotificationTrigger {
    fn for_kind(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::WorkflowEnded => Some(Self::WorkflowEnd),
            EventKind::Job(JobState::JobFailure) => Some(Self::JobFailure),
            EventKind::Job(JobState::JobSuccess) => Some(Self::JobSuccess),
            EventKind::Job(JobState::PreScriptFailure | JobState::PostScriptFailure) => {
                Some(Self::ScriptFailure)
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkflowEnd => "workflow_end",
            Self::JobFailure => "job_failure",
            Self::JobSuccess => "job_success",
            Self::ScriptFailure => "script_failure",
        }
    }
}

/// Delivers queued notifications.
pub trait NotificationDispatcher: Send {
    fn dispatch(&mut self, notification: &Notification);
}

/// Writes each notification to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingDispatcher;

impl NotificationDispatcher for LoggingDispatcher {
    fn dispatch(&mut self, notification: &Notification) {
        tracing::info!(
            trigger = notification.trigger.as_str(),
            wf_uuid = %notification.wf_uuid,
            job_id = notification.job_id.as_deref().unwrap_or("-"),
            status = ?notification.status,
            "Notification"
        );
    }
}

/// FIFO of pending notifications.
#[derive(Debug)]
pub struct NotificationQueue {
    pending: VecDeque<Notification>,
    enabled: bool,
    max_parallel: usize,
}

impl NotificationQueue {
    /// A queue dispatching at most `max_parallel` notifications per
    /// cycle. Zero disables notifications.
    #[must_use]
    pub fn new(max_parallel: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            enabled: max_parallel > 0,
            max_parallel,
        }
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self::new(0)
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Queue a notification if `event` is a trigger.
    pub fn observe(&mut self, event: &MonitorEvent) {
        if !self.enabled {
            return;
        }
        if let Some(trigger) = NotificationTrigger::for_kind(&event.kind) {
            self.pending.push_back(Notification {
                trigger,
                wf_uuid: event.wf_uuid.clone(),
                job_id: event.job_id.clone(),
                submit_seq: event.submit_seq,
                status: event.status,
                timestamp: event.timestamp,
            });
        }
    }

    /// Dispatch up to `max_parallel` pending notifications.
    pub fn service(&mut self, dispatcher: &mut dyn NotificationDispatcher) -> usize {
        let mut sent = 0;
        while sent < self.max_parallel {
            let Some(notification) = self.pending.pop_front() else {
                break;
            };
            dispatcher.dispatch(&notification);
            sent += 1;
        }
        sent
    }

    /// Dispatch everything still pending.
    pub fn drain(&mut self, dispatcher: &mut dyn NotificationDispatcher) -> usize {
        let mut sent = 0;
        while let Some(notification) = self.pending.pop_front() {
            dispatcher.dispatch(&notification);
            sent += 1;
        }
        if sent > 0 {
            tracing::debug!(sent, "Drained pending notifications");
        }
        sent
    }
}
