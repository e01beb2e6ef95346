//! Progress events emitted by running background tasks.
//!
//! Events for a given task are delivered in the order they were produced;
//! `Completed` is always the last event for a task. When events cross a
//! process boundary they serialize as small JSON objects, e.g.
//! `{"kind":"ProgressUpdate","percent":42}`.

use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::{TaskSummary, ThreatDescriptor};

/// Whether to omit a `cancelled` marker from serialized output.
#[cfg(feature = "serde")]
fn is_false(value: &bool) -> bool {
    !*value
}

/// One unit of feedback from a running task.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event kinds
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(tag = "kind")
)]
#[non_exhaustive]
pub enum TaskEvent {
    /// A log line produced by the operation body.
    Log {
        /// The log line text.
        line: String,
    },
    /// Overall progress changed.
    ProgressUpdate {
        /// Progress percent, 0-100, non-decreasing per task.
        percent: u8,
    },
    /// A scan operation found a threat.
    ThreatFound {
        /// Filesystem path of the suspicious item.
        path: String,
        /// Threat category label.
        #[cfg_attr(feature = "serde", serde(rename = "type"))]
        category: String,
    },
    /// The task reached a terminal state. Always the last event.
    Completed {
        /// Whether the operation succeeded.
        success: bool,
        /// Human-readable completion message.
        message: String,
        /// Named counters accumulated during the run.
        #[cfg_attr(feature = "serde", serde(default))]
        counts: BTreeMap<String, u64>,
        /// True when the task ended because cancellation was observed,
        /// never set on plain failures.
        #[cfg_attr(
            feature = "serde",
            serde(default, skip_serializing_if = "is_false")
        )]
        cancelled: bool,
    },
}

impl TaskEvent {
    /// Build a `ThreatFound` event from a descriptor.
    #[must_use]
    pub fn threat(descriptor: ThreatDescriptor) -> Self {
        TaskEvent::ThreatFound {
            path: descriptor.path,
            category: descriptor.category,
        }
    }

    /// Build a successful `Completed` event from a summary.
    #[must_use]
    pub fn completed(summary: TaskSummary) -> Self {
        TaskEvent::Completed {
            success: true,
            message: summary.message,
            counts: summary.counts,
            cancelled: false,
        }
    }

    /// Build a failed `Completed` event.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        TaskEvent::Completed {
            success: false,
            message: message.into(),
            counts: BTreeMap::new(),
            cancelled: false,
        }
    }

    /// Build a cancelled `Completed` event.
    ///
    /// Cancelled completions are tagged distinctly so consumers never
    /// conflate them with failures.
    #[must_use]
    pub fn cancelled(message: impl Into<String>) -> Self {
        TaskEvent::Completed {
            success: false,
            message: message.into(),
            counts: BTreeMap::new(),
            cancelled: true,
        }
    }

    /// Returns true for `Completed` events.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskEvent::Completed { .. })
    }
}

/// A task event paired with its production timestamp.
///
/// This is the in-process delivery unit: subscribers receive ordered
/// envelopes and may use `at` for log rendering or latency measurement.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EventEnvelope {
    /// The event payload.
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub event: TaskEvent,
    /// When the event was produced.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub at: OffsetDateTime,
}

impl EventEnvelope {
    /// Wrap an event with the current timestamp.
    #[must_use]
    pub fn now(event: TaskEvent) -> Self {
        Self {
            event,
            at: OffsetDateTime::now_utc(),
        }
    }
}

#[cfg(all(test, feature = "serde"))]
mod tests {
    use super::*;

    #[test]
    fn test_progress_wire_shape() {
        let event = TaskEvent::ProgressUpdate { percent: 42 };
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"kind":"ProgressUpdate","percent":42}"#
        );
    }

    #[test]
    fn test_log_wire_shape() {
        let event = TaskEvent::Log {
            line: "Scanning C:\\Windows".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"kind":"Log","line":"Scanning C:\\Windows"}"#
        );
    }

    #[test]
    fn test_threat_wire_shape() {
        let event = TaskEvent::threat(ThreatDescriptor::new("/tmp/evil.exe", "pup"));
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"kind":"ThreatFound","path":"/tmp/evil.exe","type":"pup"}"#
        );
    }

    #[test]
    fn test_completed_wire_shape() {
        let event = TaskEvent::completed(TaskSummary::new("done").with_count("threats", 0));
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"kind":"Completed","success":true,"message":"done","counts":{"threats":0}}"#
        );
    }

    #[test]
    fn test_cancelled_marker_present_only_when_set() {
        let failed = serde_json::to_string(&TaskEvent::failed("boom")).unwrap();
        assert!(!failed.contains("cancelled"));

        let cancelled = serde_json::to_string(&TaskEvent::cancelled("stopped")).unwrap();
        assert!(cancelled.contains(r#""cancelled":true"#));
    }

    #[test]
    fn test_event_roundtrip() {
        let event = TaskEvent::completed(TaskSummary::new("ok").with_count("files", 3));
        let json = serde_json::to_string(&event).unwrap();
        let back: TaskEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }

    #[test]
    fn test_terminal_detection() {
        assert!(TaskEvent::failed("x").is_terminal());
        assert!(!TaskEvent::ProgressUpdate { percent: 1 }.is_terminal());
    }
}
