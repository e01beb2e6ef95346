//! Background task execution.
//!
//! [`TaskRunner`] executes named operations from an
//! [`OperationCatalog`](crate::OperationCatalog) on dedicated workers,
//! streaming ordered progress events to each task's subscribers. Launch
//! validation is synchronous: an unregistered operation id or a busy tool
//! surface is reported to the caller before any worker exists or any
//! event is emitted. Everything that goes wrong after launch (operation
//! errors, panics, cancellation) is absorbed at the worker boundary into
//! a single terminal `Completed` event; a worker never crashes the
//! process and never affects other handles.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use futures::FutureExt;
use tracing::{debug, info, warn};

use sysmend_types::{OperationParams, TaskEvent, TaskState, ThreatDescriptor};

use crate::catalog::OperationCatalog;
use crate::error::{Error, Result};
use crate::handle::{DEFAULT_EVENT_CAPACITY, TaskHandle};

/// Step-reporting context handed to an operation body.
///
/// Operations use it to stream feedback and to observe cancellation
/// between discrete sub-steps (per file scanned, per subprocess call).
#[derive(Clone)]
pub struct OperationContext {
    handle: Arc<TaskHandle>,
}

impl OperationContext {
    pub(crate) fn new(handle: Arc<TaskHandle>) -> Self {
        Self { handle }
    }

    /// Whether the consumer has requested cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.handle.is_cancel_requested()
    }

    /// Bail out with [`Error::Cancelled`] if cancellation was requested.
    ///
    /// Operation bodies call this at the top of each discrete step.
    pub fn ensure_active(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Report overall progress, 0-100.
    ///
    /// Progress is monotone per task: a report lower than the current
    /// value is a programming error and is clamped, not propagated.
    pub fn report_progress(&self, percent: u8) {
        let effective = self.handle.bump_progress(percent);
        self.handle.send(TaskEvent::ProgressUpdate {
            percent: effective,
        });
    }

    /// Report a log line.
    pub fn report_log(&self, line: impl Into<String>) {
        self.handle.send(TaskEvent::Log { line: line.into() });
    }

    /// Report a discovered threat.
    pub fn report_threat(&self, descriptor: ThreatDescriptor) {
        self.handle.send(TaskEvent::threat(descriptor));
    }
}

/// Executes named operations on worker tasks.
pub struct TaskRunner {
    catalog: Arc<OperationCatalog>,
    /// Most recent handle per tool surface. An entry whose handle is
    /// non-terminal blocks further launches on that surface.
    active: RwLock<HashMap<String, Arc<TaskHandle>>>,
    event_capacity: usize,
}

impl TaskRunner {
    /// Create a runner over the given catalog.
    pub fn new(catalog: Arc<OperationCatalog>) -> Self {
        Self::with_event_capacity(catalog, DEFAULT_EVENT_CAPACITY)
    }

    /// Create a runner with a custom per-task event channel capacity.
    pub fn with_event_capacity(catalog: Arc<OperationCatalog>, event_capacity: usize) -> Self {
        Self {
            catalog,
            active: RwLock::new(HashMap::new()),
            event_capacity,
        }
    }

    /// The catalog this runner dispatches into.
    pub fn catalog(&self) -> &Arc<OperationCatalog> {
        &self.catalog
    }

    /// Launch an operation on a dedicated worker.
    ///
    /// Fails fast, before any worker is created or event emitted, with
    /// [`Error::UnknownOperation`] for an unregistered id or
    /// [`Error::AlreadyRunning`] while a prior task on the same tool
    /// surface is non-terminal. Otherwise the returned handle is already
    /// `Running` and events are flowing.
    ///
    /// Must be called from within a tokio runtime.
    pub fn launch(
        &self,
        operation_id: &str,
        params: OperationParams,
    ) -> Result<Arc<TaskHandle>> {
        let operation = self
            .catalog
            .get(operation_id)
            .ok_or_else(|| Error::unknown_operation(operation_id))?;
        let surface = operation.surface().to_string();

        let handle = {
            let mut active = self.active.write().unwrap_or_else(|e| e.into_inner());
            if let Some(existing) = active.get(&surface)
                && !existing.state().is_terminal()
            {
                return Err(Error::already_running(&surface, operation_id));
            }

            let handle = Arc::new(TaskHandle::new(
                operation_id,
                &surface,
                self.event_capacity,
            ));
            active.insert(surface.clone(), Arc::clone(&handle));
            handle
        };

        handle.set_state(TaskState::Running);
        info!(
            task = %handle.id(),
            operation = operation_id,
            surface = %surface,
            "launching operation"
        );

        let worker_handle = Arc::clone(&handle);
        tokio::spawn(async move {
            let ctx = OperationContext::new(Arc::clone(&worker_handle));
            let body = operation.execute(&params, &ctx);
            let outcome = std::panic::AssertUnwindSafe(body).catch_unwind().await;

            match outcome {
                // A cancel can land after the operation's last flag check;
                // Cancelling never transitions to Succeeded.
                Ok(Ok(_)) if worker_handle.is_cancel_requested() => {
                    info!(task = %worker_handle.id(), "operation cancelled at completion");
                    worker_handle.send(TaskEvent::cancelled("Operation cancelled"));
                    worker_handle.set_state(TaskState::Cancelled);
                }
                Ok(Ok(summary)) => {
                    debug!(task = %worker_handle.id(), "operation succeeded");
                    worker_handle.send(TaskEvent::completed(summary));
                    worker_handle.set_state(TaskState::Succeeded);
                }
                Ok(Err(Error::Cancelled)) => {
                    info!(task = %worker_handle.id(), "operation cancelled");
                    worker_handle.send(TaskEvent::cancelled("Operation cancelled"));
                    worker_handle.set_state(TaskState::Cancelled);
                }
                Ok(Err(e)) => {
                    warn!(task = %worker_handle.id(), "operation failed: {}", e);
                    worker_handle.send(TaskEvent::failed(e.to_string()));
                    worker_handle.set_state(TaskState::Failed);
                }
                Err(panic) => {
                    let message = panic_message(panic);
                    warn!(task = %worker_handle.id(), "operation panicked: {}", message);
                    worker_handle.send(TaskEvent::failed(format!(
                        "Internal error: {}",
                        message
                    )));
                    worker_handle.set_state(TaskState::Failed);
                }
            }

            worker_handle.close_events();
        });

        Ok(handle)
    }

    /// Request cancellation of a handle. Never blocks.
    pub fn cancel(&self, handle: &TaskHandle) {
        handle.cancel();
    }

    /// The current handle for a tool surface, if any was ever launched.
    pub fn active(&self, surface: &str) -> Option<Arc<TaskHandle>> {
        let active = self.active.read().unwrap_or_else(|e| e.into_inner());
        active.get(surface).cloned()
    }

    /// Number of surfaces with a non-terminal task.
    pub fn running_count(&self) -> usize {
        let active = self.active.read().unwrap_or_else(|e| e.into_inner());
        active
            .values()
            .filter(|h| !h.state().is_terminal())
            .count()
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
