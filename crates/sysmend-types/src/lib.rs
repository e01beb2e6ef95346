//! Platform-agnostic types for the sysmend maintenance toolkit.
//!
//! This crate defines the data model shared by every layer of sysmend:
//! the background task state machine, ordered progress events, sensor
//! readings with their three-way rendering contract, and the flat
//! parameter map handed to operations.
//!
//! No execution logic lives here; see `sysmend-core` for the task runner
//! and telemetry poller built on these types.

pub mod error;
pub mod events;
pub mod reading;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use events::{EventEnvelope, TaskEvent};
pub use reading::{Measurement, SensorReading};
pub use types::{OperationParams, ParamValue, TaskId, TaskState, TaskSummary, ThreatDescriptor};
