//! Background task execution and adaptive telemetry polling for sysmend.
//!
//! Every sysmend tool (virus scan, system repair, disk check, network
//! reset) runs the same way: a long, possibly-failing, OS-dependent
//! operation executes off the interactive thread on its own worker,
//! streaming ordered progress events and observing cooperative
//! cancellation. Sensor telemetry is polled on a fixed cadence with
//! exponential backoff on repeated failure, so a broken driver produces a
//! calm countdown instead of an error storm.
//!
//! # Architecture
//!
//! - [`TaskRunner`] launches operations from an [`OperationCatalog`] and
//!   hands back a [`TaskHandle`]: observable state, monotone progress, a
//!   broadcast event stream, and a non-blocking cancel flag.
//! - [`SensorPoller`] wraps a [`SensorProbe`] with a [`BackoffPolicy`],
//!   always yielding a renderable reading; [`SensorStream`] drives it in
//!   the background.
//! - Errors inside an operation body never escape its handle: the worker
//!   boundary converts them (and panics) into a failed `Completed` event.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use sysmend_core::{CommandOperation, OperationCatalog, TaskRunner};
//! use sysmend_types::OperationParams;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let catalog = OperationCatalog::new().with(
//!         "flush_dns",
//!         Arc::new(
//!             CommandOperation::new("network_reset", "DNS cache flushed")
//!                 .step("resolvectl", ["flush-caches"]),
//!         ),
//!     );
//!
//!     let runner = TaskRunner::new(Arc::new(catalog));
//!     let handle = runner.launch("flush_dns", OperationParams::new())?;
//!
//!     let mut events = handle.subscribe();
//!     while let Ok(envelope) = events.recv().await {
//!         println!("{:?}", envelope.event);
//!     }
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod catalog;
pub mod error;
pub mod handle;
pub mod mock;
pub mod poller;
pub mod runner;

// Re-export the shared data model for convenience.
pub use sysmend_types::{
    EventEnvelope, Measurement, OperationParams, ParamValue, SensorReading, TaskEvent, TaskId,
    TaskState, TaskSummary, ThreatDescriptor,
};

pub use backoff::{BackoffPolicy, BackoffState};
pub use catalog::{CommandOperation, CommandStep, Operation, OperationCatalog};
pub use error::{Error, Result};
pub use handle::{EventReceiver, EventSender, TaskHandle};
pub use mock::{MockOperation, MockProbe};
pub use poller::{Measurements, PollerOptions, SensorPoller, SensorProbe, SensorStream,
    SensorStreamOptions};
pub use runner::{OperationContext, TaskRunner};
