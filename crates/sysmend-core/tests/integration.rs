//! Integration tests for sysmend-core.
//!
//! These exercise the full launch -> stream -> terminal-event path using
//! mock operations and probes; no OS commands or sensor hardware are
//! required.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sysmend_core::{
    BackoffPolicy, Error, MockOperation, MockProbe, OperationCatalog, PollerOptions,
    SensorPoller, SensorReading, TaskEvent, TaskRunner, TaskState,
};
use sysmend_types::{Measurement, OperationParams, ThreatDescriptor};

fn catalog() -> Arc<OperationCatalog> {
    Arc::new(
        OperationCatalog::new()
            .with(
                "quick_scan",
                Arc::new(
                    MockOperation::new("virus_scan")
                        .steps(20)
                        .step_delay(Duration::from_millis(5))
                        .with_threat(ThreatDescriptor::new("/tmp/evil.exe", "pup")),
                ),
            )
            .with(
                "full_scan",
                Arc::new(
                    MockOperation::new("virus_scan")
                        .steps(50)
                        .step_delay(Duration::from_millis(5)),
                ),
            )
            .with(
                "check_health",
                Arc::new(MockOperation::new("system_repair").steps(5)),
            ),
    )
}

async fn collect(handle: &sysmend_core::TaskHandle) -> Vec<TaskEvent> {
    let mut rx = handle.subscribe();
    let mut events = Vec::new();
    while let Ok(envelope) = rx.recv().await {
        events.push(envelope.event);
    }
    events
}

#[tokio::test]
async fn test_full_run_event_contract() {
    let runner = TaskRunner::new(catalog());
    let handle = runner.launch("quick_scan", OperationParams::new()).unwrap();

    let events = collect(&handle).await;

    // Exactly one Completed, always last.
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    assert!(events.last().unwrap().is_terminal());

    // Progress never rewinds and ends at 100.
    let percents: Vec<u8> = events
        .iter()
        .filter_map(|e| match e {
            TaskEvent::ProgressUpdate { percent } => Some(*percent),
            _ => None,
        })
        .collect();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(percents.last(), Some(&100));

    // The injected threat made it through, and into the counts.
    assert!(events
        .iter()
        .any(|e| matches!(e, TaskEvent::ThreatFound { category, .. } if category == "pup")));
    match events.last().unwrap() {
        TaskEvent::Completed {
            success, counts, ..
        } => {
            assert!(success);
            assert_eq!(counts.get("threats"), Some(&1));
        }
        other => panic!("expected Completed, got {:?}", other),
    }
    assert_eq!(handle.state(), TaskState::Succeeded);
}

#[tokio::test]
async fn test_surface_exclusivity_across_operations() {
    let runner = TaskRunner::new(catalog());

    // quick_scan occupies the virus_scan surface...
    let scan = runner.launch("quick_scan", OperationParams::new()).unwrap();

    // ...so full_scan (same surface) is rejected, while check_health
    // (different surface) runs concurrently.
    assert!(matches!(
        runner.launch("full_scan", OperationParams::new()),
        Err(Error::AlreadyRunning { .. })
    ));
    let health = runner
        .launch("check_health", OperationParams::new())
        .unwrap();

    collect(&health).await;
    collect(&scan).await;

    // Terminal handles free their surfaces.
    assert!(runner.launch("full_scan", OperationParams::new()).is_ok());
}

#[tokio::test]
async fn test_two_subscribers_see_identical_streams() {
    let runner = TaskRunner::new(catalog());
    let handle = runner
        .launch("check_health", OperationParams::new())
        .unwrap();

    let mut log_pane = handle.subscribe();
    let mut progress_bar = handle.subscribe();

    let mut a = Vec::new();
    while let Ok(envelope) = log_pane.recv().await {
        a.push(envelope.event);
    }
    let mut b = Vec::new();
    while let Ok(envelope) = progress_bar.recv().await {
        b.push(envelope.event);
    }

    assert_eq!(a, b);
    assert!(!a.is_empty());
}

#[tokio::test]
async fn test_cancellation_latency_bounded_by_step() {
    let runner = TaskRunner::new(Arc::new(OperationCatalog::new().with(
        "slow_scan",
        Arc::new(
            MockOperation::new("virus_scan")
                .steps(100)
                .step_delay(Duration::from_millis(10)),
        ),
    )));

    let handle = runner.launch("slow_scan", OperationParams::new()).unwrap();
    tokio::time::sleep(Duration::from_millis(25)).await;
    runner.cancel(&handle);

    let started = Instant::now();
    let events = collect(&handle).await;
    assert!(started.elapsed() < Duration::from_millis(500));

    match events.last().unwrap() {
        TaskEvent::Completed {
            success, cancelled, ..
        } => {
            assert!(!success);
            assert!(cancelled);
        }
        other => panic!("expected Completed, got {:?}", other),
    }
    assert_eq!(handle.state(), TaskState::Cancelled);
}

#[tokio::test]
async fn test_poller_full_cycle() {
    // Fails three times, then recovers: Unavailable twice (attempts),
    // countdowns while suppressed, then the measurement comes back.
    let probe = MockProbe::new("cpu_temp")
        .with_measurement("CPU", Measurement::new(42.0, "°C"))
        .fail_times(3, "driver busy");
    let mut poller = SensorPoller::with_options(
        probe,
        PollerOptions::with_preferred_key("CPU").backoff(BackoffPolicy::new(
            Duration::from_secs(1),
            Duration::from_secs(60),
        )),
    );

    let start = Instant::now();
    assert_eq!(poller.poll(start).await, SensorReading::Unavailable);
    assert_eq!(poller.poll(start).await, SensorReading::Unavailable);

    // Third tick arrives inside the 2s suppression window.
    let reading = poller.poll(start + Duration::from_millis(500)).await;
    assert!(matches!(reading, SensorReading::RetryingIn(_)));

    // Past the window: third failure, delay rises to 4s.
    let after = start + Duration::from_secs(2);
    assert_eq!(poller.poll(after).await, SensorReading::Unavailable);
    assert_eq!(
        poller.backoff_state().current_delay,
        Duration::from_secs(4)
    );

    // Past that window too: probe succeeds, backoff collapses.
    let recovered = after + Duration::from_secs(4);
    let reading = poller.poll(recovered).await;
    assert_eq!(reading.to_string(), "42.0°C");
    assert_eq!(poller.backoff_state().consecutive_failures, 0);
}
