//! Lifecycle engine scenarios against mock driver and dispatcher.
//!
//! Time is tokio-virtual (`start_paused`), so report ticks and the scripted
//! task-script duration interleave deterministically.

mod common;

use arrebol_worker::lifecycle::LifecycleEngine;
use arrebol_worker::task::TaskState;
use common::mock_dispatcher::MockDispatcher;
use common::mock_driver::{MockBehavior, MockContainerDriver};
use common::{test_task, test_worker};
use std::sync::Arc;
use std::time::Duration;

fn engine_with(
    behavior: MockBehavior,
) -> (LifecycleEngine, Arc<MockContainerDriver>, Arc<MockDispatcher>) {
    let driver = Arc::new(MockContainerDriver::new(behavior));
    let dispatcher = Arc::new(MockDispatcher::new(1));
    let engine = LifecycleEngine::new(driver.clone(), dispatcher.clone(), "/opt/arrebol/bin");
    (engine, driver, dispatcher)
}

#[tokio::test(start_paused = true)]
async fn happy_path_reports_progress_then_finishes() {
    let behavior = MockBehavior {
        run_duration: Duration::from_millis(2500),
        ..Default::default()
    }
    .with_reads(&["0\r\n", "0\r\n0\r\n"]);
    let (engine, _, dispatcher) = engine_with(behavior);

    let task = test_task(7, &["echo a", "echo b", "echo c"]);
    let state = engine.run_task(&test_worker(), task).await.unwrap();
    assert_eq!(state, TaskState::Finished);

    let reports = dispatcher.reports();
    let progress: Vec<u8> = reports.iter().map(|t| t.progress).collect();
    assert_eq!(progress, vec![33, 66, 100]);

    // Only the last report is terminal, and it is Finished.
    assert!(reports[..reports.len() - 1].iter().all(|t| t.state == TaskState::Running));
    assert_eq!(reports.last().unwrap().state, TaskState::Finished);
}

#[tokio::test(start_paused = true)]
async fn progress_is_non_decreasing_and_bounded() {
    let behavior = MockBehavior {
        run_duration: Duration::from_millis(4500),
        ..Default::default()
    }
    .with_reads(&["", "0\r\n", "0\r\n0\r\n", "0\r\n0\r\n", "0\r\n0\r\n0\r\n"]);
    let (engine, _, dispatcher) = engine_with(behavior);

    let task = test_task(8, &["a", "b", "c"]);
    engine.run_task(&test_worker(), task).await.unwrap();

    let progress: Vec<u8> = dispatcher.reports().iter().map(|t| t.progress).collect();
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "non-decreasing: {progress:?}");
    assert!(progress.iter().all(|p| *p <= 100));
}

#[tokio::test(start_paused = true)]
async fn empty_command_list_reports_exactly_once() {
    let (engine, _, dispatcher) = engine_with(MockBehavior::default());

    let task = test_task(9, &[]);
    let state = engine.run_task(&test_worker(), task).await.unwrap();
    assert_eq!(state, TaskState::Finished);

    let reports = dispatcher.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].progress, 100);
    assert_eq!(reports[0].state, TaskState::Finished);
}

#[tokio::test(start_paused = true)]
async fn missing_image_is_pulled_transparently() {
    let behavior = MockBehavior {
        image_present: false,
        run_duration: Duration::from_millis(2500),
        ..Default::default()
    }
    .with_reads(&["0\r\n", "0\r\n0\r\n"]);
    let (engine, driver, dispatcher) = engine_with(behavior);

    let task = test_task(10, &["echo a", "echo b", "echo c"]);
    let state = engine.run_task(&test_worker(), task).await.unwrap();

    assert_eq!(state, TaskState::Finished);
    assert!(driver.calls().contains(&"pull_image".to_string()));
    // Reports are indistinguishable from the image-already-present path.
    let progress: Vec<u8> = dispatcher.reports().iter().map(|t| t.progress).collect();
    assert_eq!(progress, vec![33, 66, 100]);
}

#[tokio::test(start_paused = true)]
async fn pull_failure_fails_the_task() {
    let behavior = MockBehavior {
        image_present: false,
        pull_error: Some("registry unreachable".to_string()),
        ..Default::default()
    };
    let (engine, _, dispatcher) = engine_with(behavior);

    let task = test_task(11, &["echo a"]);
    let state = engine.run_task(&test_worker(), task).await.unwrap();

    assert_eq!(state, TaskState::Failed);
    assert_eq!(dispatcher.reports().last().unwrap().state, TaskState::Failed);
}

#[tokio::test(start_paused = true)]
async fn mid_run_failure_keeps_last_probed_progress() {
    let behavior = MockBehavior {
        run_duration: Duration::from_millis(2500),
        run_error: Some("task script aborted".to_string()),
        ..Default::default()
    }
    .with_reads(&["0\r\n0\r\n"]);
    let (engine, _, dispatcher) = engine_with(behavior);

    // Two of five commands land in the exit-code file before the failure.
    let task = test_task(12, &["a", "b", "c", "d", "e"]);
    let state = engine.run_task(&test_worker(), task).await.unwrap();
    assert_eq!(state, TaskState::Failed);

    let reports = dispatcher.reports();
    assert!(reports.iter().any(|t| t.progress == 40 && t.state == TaskState::Running));

    let last = reports.last().unwrap();
    assert_eq!(last.state, TaskState::Failed);
    assert_eq!(last.progress, 40);
}

#[tokio::test(start_paused = true)]
async fn track_read_failure_reports_zero_then_recovers() {
    let behavior = MockBehavior {
        run_duration: Duration::from_millis(3500),
        reads: vec![
            Err("file not found".to_string()),
            Ok(b"0\r\n".to_vec()),
            Ok(b"0\r\n0\r\n".to_vec()),
        ],
        ..Default::default()
    };
    let (engine, _, dispatcher) = engine_with(behavior);

    let task = test_task(13, &["echo a", "echo b"]);
    let state = engine.run_task(&test_worker(), task).await.unwrap();
    assert_eq!(state, TaskState::Finished);

    let progress: Vec<u8> = dispatcher.reports().iter().map(|t| t.progress).collect();
    // First probe fails: the initial value is reported and the engine keeps
    // going; the following ticks see the file normally.
    assert_eq!(progress, vec![0, 50, 100, 100]);
}

#[tokio::test(start_paused = true)]
async fn exit_code_overrun_is_clamped_to_100() {
    let behavior = MockBehavior {
        run_duration: Duration::from_millis(1500),
        ..Default::default()
    }
    .with_reads(&["0\r\n0\r\n0\r\n0\r\n"]);
    let (engine, _, dispatcher) = engine_with(behavior);

    let task = test_task(14, &["echo a", "echo b"]);
    engine.run_task(&test_worker(), task).await.unwrap();

    assert!(dispatcher.reports().iter().all(|t| t.progress <= 100));
}

#[tokio::test(start_paused = true)]
async fn non_positive_report_interval_rejects_the_task() {
    let (engine, driver, dispatcher) = engine_with(MockBehavior::default());

    let mut task = test_task(15, &["echo a"]);
    task.report_interval = 0;

    let state = engine.run_task(&test_worker(), task).await.unwrap();
    assert_eq!(state, TaskState::Failed);

    // One Failed report, and the container runtime was never touched.
    let reports = dispatcher.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].state, TaskState::Failed);
    assert!(driver.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn container_is_torn_down_after_success_and_failure() {
    for run_error in [None, Some("boom".to_string())] {
        let behavior = MockBehavior {
            run_duration: Duration::from_millis(500),
            run_error,
            ..Default::default()
        };
        let (engine, driver, _) = engine_with(behavior);

        engine.run_task(&test_worker(), test_task(16, &["echo a"])).await.unwrap();

        let calls = driver.calls();
        assert!(calls.contains(&"stop_container".to_string()));
        assert!(calls.contains(&"remove_container".to_string()));
    }
}
