//! Observable, cancellable handles to running background tasks.
//!
//! A [`TaskHandle`] is written only by its owning worker, with one
//! exception: the cancellation flag, which the consumer sets through
//! [`TaskHandle::cancel`]. That flag is an atomic, not a lock, and is
//! observed cooperatively by the operation between discrete steps.

use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use tokio::sync::broadcast;

use sysmend_types::{EventEnvelope, TaskEvent, TaskId, TaskState};

/// Sender for task events.
pub type EventSender = broadcast::Sender<EventEnvelope>;

/// Receiver for task events.
pub type EventReceiver = broadcast::Receiver<EventEnvelope>;

/// Default event channel capacity per task.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Handle to one background task invocation.
///
/// Events are broadcast: a log pane and a progress bar can subscribe
/// independently and both observe the same ordered stream, ending with
/// exactly one `Completed` event after which the channel closes.
#[derive(Debug)]
pub struct TaskHandle {
    id: TaskId,
    operation: String,
    surface: String,
    state: AtomicU8,
    progress: AtomicU8,
    cancel_requested: AtomicBool,
    /// Taken (set to None) once the terminal event has been sent, closing
    /// every subscriber's receiver.
    events: RwLock<Option<EventSender>>,
}

impl TaskHandle {
    pub(crate) fn new(
        operation: impl Into<String>,
        surface: impl Into<String>,
        event_capacity: usize,
    ) -> Self {
        let (sender, _) = broadcast::channel(event_capacity);
        Self {
            id: TaskId::new(),
            operation: operation.into(),
            surface: surface.into(),
            state: AtomicU8::new(TaskState::Pending as u8),
            progress: AtomicU8::new(0),
            cancel_requested: AtomicBool::new(false),
            events: RwLock::new(Some(sender)),
        }
    }

    /// Unique id of this invocation.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// The operation identifier this task is executing.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// The tool surface this task occupies.
    pub fn surface(&self) -> &str {
        &self.surface
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TaskState {
        // The cell only ever holds TaskState discriminants.
        TaskState::try_from(self.state.load(Ordering::SeqCst)).unwrap_or(TaskState::Failed)
    }

    /// Current progress percent, 0-100, non-decreasing.
    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::SeqCst)
    }

    /// Request cooperative cancellation. Never blocks.
    ///
    /// The running operation observes the flag between discrete steps and
    /// exits cleanly with a `Completed` event tagged cancelled. Moves a
    /// `Running` task to `Cancelling`; terminal tasks are unaffected.
    pub fn cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
        let _ = self.state.compare_exchange(
            TaskState::Running as u8,
            TaskState::Cancelling as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Whether cancellation has been requested.
    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    /// Subscribe to this task's event stream.
    ///
    /// Subscribers attached after the task reached a terminal state get a
    /// receiver that reports the channel as closed.
    pub fn subscribe(&self) -> EventReceiver {
        let guard = self.events.read().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(sender) => sender.subscribe(),
            None => {
                let (sender, receiver) = broadcast::channel(1);
                drop(sender);
                receiver
            }
        }
    }

    pub(crate) fn set_state(&self, state: TaskState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Raise progress to `percent` (capped at 100), never lowering it.
    /// Returns the effective value after clamping.
    pub(crate) fn bump_progress(&self, percent: u8) -> u8 {
        let capped = percent.min(100);
        let previous = self.progress.fetch_max(capped, Ordering::SeqCst);
        previous.max(capped)
    }

    /// Send an event to all subscribers, stamping it with the current time.
    pub(crate) fn send(&self, event: TaskEvent) {
        let guard = self.events.read().unwrap_or_else(|e| e.into_inner());
        if let Some(sender) = guard.as_ref() {
            // Ignore error if no receivers.
            let _ = sender.send(EventEnvelope::now(event));
        }
    }

    /// Drop the event sender so subscribers observe end-of-stream.
    pub(crate) fn close_events(&self) {
        let mut guard = self.events.write().unwrap_or_else(|e| e.into_inner());
        *guard = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> TaskHandle {
        TaskHandle::new("quick_scan", "virus_scan", DEFAULT_EVENT_CAPACITY)
    }

    #[test]
    fn test_new_handle_is_pending() {
        let h = handle();
        assert_eq!(h.state(), TaskState::Pending);
        assert_eq!(h.progress(), 0);
        assert!(!h.is_cancel_requested());
    }

    #[test]
    fn test_ids_unique_per_invocation() {
        assert_ne!(handle().id(), handle().id());
    }

    #[test]
    fn test_progress_is_clamped_monotone() {
        let h = handle();
        assert_eq!(h.bump_progress(50), 50);
        // A lower report is a programming error: clamped, not propagated.
        assert_eq!(h.bump_progress(30), 50);
        assert_eq!(h.bump_progress(60), 60);
        assert_eq!(h.bump_progress(200), 100);
        assert_eq!(h.progress(), 100);
    }

    #[test]
    fn test_cancel_moves_running_to_cancelling() {
        let h = handle();
        h.set_state(TaskState::Running);
        h.cancel();
        assert!(h.is_cancel_requested());
        assert_eq!(h.state(), TaskState::Cancelling);
    }

    #[test]
    fn test_cancel_leaves_terminal_state_alone() {
        let h = handle();
        h.set_state(TaskState::Succeeded);
        h.cancel();
        assert!(h.is_cancel_requested());
        assert_eq!(h.state(), TaskState::Succeeded);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_multiple_subscribers() {
        let h = handle();
        let mut a = h.subscribe();
        let mut b = h.subscribe();

        h.send(TaskEvent::ProgressUpdate { percent: 10 });

        let ea = a.recv().await.unwrap();
        let eb = b.recv().await.unwrap();
        assert_eq!(ea.event, eb.event);
    }

    #[tokio::test]
    async fn test_subscribe_after_close_is_closed() {
        let h = handle();
        h.close_events();
        let mut rx = h.subscribe();
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }
}
