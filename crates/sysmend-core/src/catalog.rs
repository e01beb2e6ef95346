//! Operation catalog: named operations and their platform commands.
//!
//! The catalog maps opaque operation identifiers ("check_health",
//! "flush_dns", "quick_scan", ...) to concrete [`Operation`]
//! implementations. Unknown identifiers are a hard launch-time error;
//! no identifier ever silently no-ops.
//!
//! [`CommandOperation`] is the reusable building block for operations
//! that translate into a sequence of OS subprocess invocations. It checks
//! cancellation between steps and terminates a live child process when
//! cancellation arrives mid-command.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use sysmend_types::{OperationParams, TaskSummary};

use crate::error::{Error, Result};
use crate::runner::OperationContext;

/// A named, long-running, possibly-failing maintenance operation.
///
/// Implementations must check [`OperationContext::is_cancelled`] (or call
/// [`OperationContext::ensure_active`]) at reasonable intervals, at
/// minimum once per discrete sub-step, and return promptly when
/// cancellation is requested.
#[async_trait]
pub trait Operation: Send + Sync {
    /// The tool surface this operation occupies. At most one task per
    /// surface is active at a time; operations on different surfaces run
    /// concurrently.
    fn surface(&self) -> &str;

    /// Execute the operation body.
    async fn execute(&self, params: &OperationParams, ctx: &OperationContext)
    -> Result<TaskSummary>;
}

/// Registry mapping operation identifiers to implementations.
#[derive(Default)]
pub struct OperationCatalog {
    entries: HashMap<String, Arc<dyn Operation>>,
}

impl OperationCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operation under an identifier, replacing any previous
    /// entry for the same id.
    pub fn register(&mut self, id: impl Into<String>, operation: Arc<dyn Operation>) {
        let id = id.into();
        debug!(operation = %id, surface = operation.surface(), "registering operation");
        self.entries.insert(id, operation);
    }

    /// Builder-style register.
    #[must_use]
    pub fn with(mut self, id: impl Into<String>, operation: Arc<dyn Operation>) -> Self {
        self.register(id, operation);
        self
    }

    /// Look up an operation by identifier.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<dyn Operation>> {
        self.entries.get(id).cloned()
    }

    /// Whether an identifier is registered.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// All registered identifiers, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Number of registered operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One subprocess invocation within a [`CommandOperation`].
#[derive(Debug, Clone)]
pub struct CommandStep {
    /// Program to invoke.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<String>,
}

impl CommandStep {
    /// Create a command step.
    pub fn new(
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    fn render(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// How often a running child process is checked against the cancel flag.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// An operation that runs a fixed sequence of OS commands.
///
/// Each step reports a log line and a progress update; cancellation is
/// observed between steps and, for a command already in flight, by
/// sending the child a termination signal.
pub struct CommandOperation {
    surface: String,
    summary_message: String,
    steps: Vec<CommandStep>,
}

impl CommandOperation {
    /// Create a command operation on the given tool surface.
    pub fn new(surface: impl Into<String>, summary_message: impl Into<String>) -> Self {
        Self {
            surface: surface.into(),
            summary_message: summary_message.into(),
            steps: Vec::new(),
        }
    }

    /// Append a command step.
    #[must_use]
    pub fn step(
        mut self,
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.steps.push(CommandStep::new(program, args));
        self
    }

    async fn run_step(&self, step: &CommandStep, ctx: &OperationContext) -> Result<()> {
        info!(command = %step.render(), "running command step");
        let mut child = Command::new(&step.program)
            .args(&step.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let mut poll = tokio::time::interval(CANCEL_POLL_INTERVAL);
        let status = loop {
            tokio::select! {
                status = child.wait() => break status?,
                _ = poll.tick() => {
                    if ctx.is_cancelled() {
                        // Cooperative cancellation reached a live child:
                        // signal it and reap before reporting.
                        let _ = child.start_kill();
                        let _ = child.wait().await;
                        return Err(Error::Cancelled);
                    }
                }
            }
        };

        if !status.success() {
            return Err(Error::CommandFailed {
                program: step.program.clone(),
                status,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Operation for CommandOperation {
    fn surface(&self) -> &str {
        &self.surface
    }

    async fn execute(
        &self,
        _params: &OperationParams,
        ctx: &OperationContext,
    ) -> Result<TaskSummary> {
        let total = self.steps.len();
        for (index, step) in self.steps.iter().enumerate() {
            ctx.ensure_active()?;
            ctx.report_log(format!("[{}/{}] {}", index + 1, total, step.render()));
            self.run_step(step, ctx).await?;
            let percent = ((index + 1) * 100 / total.max(1)) as u8;
            ctx.report_progress(percent);
        }

        Ok(TaskSummary::new(&self.summary_message).with_count("commands", total as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use sysmend_types::TaskState;

    use crate::mock::MockOperation;
    use crate::runner::TaskRunner;

    #[test]
    fn test_catalog_register_and_lookup() {
        let catalog = OperationCatalog::new()
            .with("quick_scan", Arc::new(MockOperation::new("virus_scan")))
            .with("flush_dns", Arc::new(MockOperation::new("network_reset")));

        assert_eq!(catalog.len(), 2);
        assert!(catalog.contains("quick_scan"));
        assert!(!catalog.contains("frobnicate"));
        assert!(catalog.get("flush_dns").is_some());
        assert_eq!(catalog.ids(), vec!["flush_dns", "quick_scan"]);
    }

    #[test]
    fn test_register_replaces_entry() {
        let mut catalog = OperationCatalog::new();
        catalog.register("quick_scan", Arc::new(MockOperation::new("virus_scan")));
        catalog.register("quick_scan", Arc::new(MockOperation::new("other_surface")));

        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("quick_scan").unwrap().surface(), "other_surface");
    }

    #[test]
    fn test_command_step_render() {
        let step = CommandStep::new("ipconfig", ["/flushdns"]);
        assert_eq!(step.render(), "ipconfig /flushdns");

        let bare = CommandStep::new("sync", Vec::<String>::new());
        assert_eq!(bare.render(), "sync");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_operation_runs_steps() {
        let catalog = OperationCatalog::new().with(
            "noop",
            Arc::new(
                CommandOperation::new("maintenance", "Maintenance complete")
                    .step("true", Vec::<String>::new())
                    .step("true", Vec::<String>::new()),
            ),
        );
        let runner = TaskRunner::new(Arc::new(catalog));

        let handle = runner
            .launch("noop", sysmend_types::OperationParams::new())
            .unwrap();
        let mut rx = handle.subscribe();
        let mut last = None;
        while let Ok(envelope) = rx.recv().await {
            last = Some(envelope.event);
        }

        assert!(matches!(
            last,
            Some(sysmend_types::TaskEvent::Completed { success: true, .. })
        ));
        assert_eq!(handle.state(), TaskState::Succeeded);
        assert_eq!(handle.progress(), 100);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_operation_failure() {
        let catalog = OperationCatalog::new().with(
            "doomed",
            Arc::new(
                CommandOperation::new("maintenance", "never")
                    .step("false", Vec::<String>::new()),
            ),
        );
        let runner = TaskRunner::new(Arc::new(catalog));

        let handle = runner
            .launch("doomed", sysmend_types::OperationParams::new())
            .unwrap();
        let mut rx = handle.subscribe();
        let mut last = None;
        while let Ok(envelope) = rx.recv().await {
            last = Some(envelope.event);
        }

        assert!(matches!(
            last,
            Some(sysmend_types::TaskEvent::Completed { success: false, .. })
        ));
        assert_eq!(handle.state(), TaskState::Failed);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_operation_cancel_kills_child() {
        let catalog = OperationCatalog::new().with(
            "slow",
            Arc::new(
                CommandOperation::new("maintenance", "never")
                    .step("sleep", ["30"]),
            ),
        );
        let runner = TaskRunner::new(Arc::new(catalog));

        let handle = runner
            .launch("slow", sysmend_types::OperationParams::new())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.cancel();

        let started = std::time::Instant::now();
        let mut rx = handle.subscribe();
        while rx.recv().await.is_ok() {}

        // Bounded by the cancel poll interval, not the sleep duration.
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(handle.state(), TaskState::Cancelled);
    }
}
