//! Notification sinks for events about managed resources.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt;
use tracing::{info, warn};

use crate::certificate::ObjectRef;

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Normal,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Normal => write!(f, "Normal"),
            Severity::Warning => write!(f, "Warning"),
        }
    }
}

/// Sink for user-visible notifications about a resource.
///
/// Emission is fire-and-forget; sinks must not fail the caller.
pub trait EventRecorder: Send + Sync {
    fn emit(&self, subject: &ObjectRef, severity: Severity, reason: &str, message: &str);
}

/// Writes events to the tracing subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingRecorder;

impl EventRecorder for TracingRecorder {
    fn emit(&self, subject: &ObjectRef, severity: Severity, reason: &str, message: &str) {
        match severity {
            Severity::Normal => {
                info!(subject = %subject, reason = %reason, "{}", message)
            }
            Severity::Warning => {
                warn!(subject = %subject, reason = %reason, "{}", message)
            }
        }
    }
}

/// A recorded event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub subject: ObjectRef,
    pub severity: Severity,
    pub reason: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    events: Mutex<Vec<Event>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events recorded so far
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventRecorder for MemoryRecorder {
    fn emit(&self, subject: &ObjectRef, severity: Severity, reason: &str, message: &str) {
        self.events.lock().push(Event {
            subject: subject.clone(),
            severity,
            reason: reason.to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject() -> ObjectRef {
        ObjectRef {
            kind: "Certificate",
            scope: "default".to_string(),
            name: "web".to_string(),
        }
    }

    #[test]
    fn test_memory_recorder_collects_in_order() {
        let recorder = MemoryRecorder::new();
        recorder.emit(&subject(), Severity::Warning, "ErrCreateOrder", "first");
        recorder.emit(&subject(), Severity::Normal, "Issued", "second");

        let events = recorder.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].reason, "ErrCreateOrder");
        assert_eq!(events[0].severity, Severity::Warning);
        assert_eq!(events[1].message, "second");
        assert!(events[0].timestamp <= events[1].timestamp);
    }

    #[test]
    fn test_tracing_recorder_does_not_panic() {
        TracingRecorder.emit(&subject(), Severity::Warning, "ErrCreateOrder", "boom");
        TracingRecorder.emit(&subject(), Severity::Normal, "Ok", "fine");
    }
}
