//! Core types for sysmend background tasks.

use core::fmt;
use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Unique identifier for one task invocation.
///
/// Every call to `launch` produces a fresh id, even for the same operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct TaskId(uuid::Uuid);

impl TaskId {
    /// Generate a new random task id.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Access the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a background task.
///
/// Valid transitions: `Pending -> Running -> {Succeeded | Failed | Cancelled}`,
/// plus `Running -> Cancelling -> Cancelled` when cancellation is requested
/// mid-flight. `Succeeded`, `Failed`, and `Cancelled` are terminal.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new states
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "snake_case")
)]
#[non_exhaustive]
#[repr(u8)]
pub enum TaskState {
    /// Task has been created but the worker has not started yet.
    Pending = 0,
    /// The worker is executing the operation body.
    Running = 1,
    /// Cancellation was requested; the operation has not yet observed it.
    Cancelling = 2,
    /// The operation finished successfully.
    Succeeded = 3,
    /// The operation returned an error or panicked.
    Failed = 4,
    /// The operation observed the cancellation request and exited cleanly.
    Cancelled = 5,
}

impl TaskState {
    /// Returns true for `Succeeded`, `Failed`, and `Cancelled`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Cancelled
        )
    }
}

impl TryFrom<u8> for TaskState {
    type Error = ParseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TaskState::Pending),
            1 => Ok(TaskState::Running),
            2 => Ok(TaskState::Cancelling),
            3 => Ok(TaskState::Succeeded),
            4 => Ok(TaskState::Failed),
            5 => Ok(TaskState::Cancelled),
            other => Err(ParseError::UnknownTaskState(other)),
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Pending => write!(f, "pending"),
            TaskState::Running => write!(f, "running"),
            TaskState::Cancelling => write!(f, "cancelling"),
            TaskState::Succeeded => write!(f, "succeeded"),
            TaskState::Failed => write!(f, "failed"),
            TaskState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A threat discovered during a scan operation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ThreatDescriptor {
    /// Filesystem path of the suspicious item.
    pub path: String,
    /// Threat category label (e.g. "adware", "pup").
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub category: String,
}

impl ThreatDescriptor {
    /// Create a new threat descriptor.
    pub fn new(path: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            category: category.into(),
        }
    }
}

/// Final result of a completed operation body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TaskSummary {
    /// Human-readable completion message.
    pub message: String,
    /// Named counters accumulated during the run (e.g. "threats" -> 0).
    #[cfg_attr(feature = "serde", serde(default))]
    pub counts: BTreeMap<String, u64>,
}

impl TaskSummary {
    /// Create a summary with a message and no counters.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            counts: BTreeMap::new(),
        }
    }

    /// Add or replace a named counter.
    #[must_use]
    pub fn with_count(mut self, name: impl Into<String>, value: u64) -> Self {
        self.counts.insert(name.into(), value);
        self
    }
}

/// A single operation parameter value.
///
/// Parameters form a flat key -> value map; only strings and booleans
/// are representable, matching the operation command surface.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(untagged))]
pub enum ParamValue {
    /// String parameter.
    Str(String),
    /// Boolean parameter.
    Bool(bool),
}

impl ParamValue {
    /// Return the string value, if this is a string parameter.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s),
            ParamValue::Bool(_) => None,
        }
    }

    /// Return the boolean value, if this is a boolean parameter.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            ParamValue::Str(_) => None,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Str(s) => write!(f, "{}", s),
            ParamValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Flat key -> value parameter map passed to an operation at launch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct OperationParams(BTreeMap<String, ParamValue>);

impl OperationParams {
    /// Create an empty parameter map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a parameter, replacing any existing value for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Look up a parameter by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    /// Look up an optional string parameter.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(ParamValue::as_str)
    }

    /// Look up an optional boolean parameter, defaulting to `false`.
    #[must_use]
    pub fn get_bool(&self, key: &str) -> bool {
        self.0.get(key).and_then(ParamValue::as_bool).unwrap_or(false)
    }

    /// Look up a required string parameter.
    pub fn require_str(&self, key: &str) -> Result<&str, ParseError> {
        match self.0.get(key) {
            Some(value) => value.as_str().ok_or_else(|| ParseError::WrongParamType {
                key: key.to_string(),
                expected: "string",
            }),
            None => Err(ParseError::MissingParam {
                key: key.to_string(),
            }),
        }
    }

    /// Number of parameters in the map.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over key/value pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, ParamValue)> for OperationParams {
    fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
