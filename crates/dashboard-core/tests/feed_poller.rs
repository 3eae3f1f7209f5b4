use std::sync::Arc;
use std::time::Duration;

use dashboard_core::mocks::{sample_event, GatedSource, RecordingObserver, StaticSource};
use dashboard_core::{AnalysisStatus, FeedPoller, FetchHalf, StatusMap, TickOutcome};

#[tokio::test]
async fn test_older_tick_never_overwrites_newer_one() {
    let source = Arc::new(GatedSource::new());
    let window_1 = source.expect_window();
    let status_1 = source.expect_statuses();
    let window_2 = source.expect_window();
    let status_2 = source.expect_statuses();
    let observer = Arc::new(RecordingObserver::default());
    let poller = FeedPoller::from_arc(source.clone()).with_observer(observer.clone());

    let tick_1 = poller.poll_now();
    source.wait_for_window_calls(1).await;
    let tick_2 = poller.poll_now();
    source.wait_for_window_calls(2).await;

    // Tick 2 resolves first
    window_2.send(Ok(vec![sample_event(2, "api", "error")])).unwrap();
    status_2.send(Ok(StatusMap::from([(2, AnalysisStatus::Completed)]))).unwrap();
    assert_eq!(
        tick_2.await.unwrap(),
        TickOutcome::Applied { seq: 2, window_ok: true, statuses_ok: true }
    );

    window_1.send(Ok(vec![sample_event(1, "api", "info")])).unwrap();
    status_1.send(Ok(StatusMap::new())).unwrap();
    assert_eq!(tick_1.await.unwrap(), TickOutcome::Stale { seq: 1, latest: 2 });

    let snapshot = poller.snapshot();
    assert_eq!(snapshot.seq, 2);
    assert_eq!(snapshot.window.len(), 1);
    assert_eq!(snapshot.window[0].id, 2);
    assert_eq!(snapshot.backend_status(2), AnalysisStatus::Completed);
    assert_eq!(*observer.stale.lock().unwrap(), vec![(1, 2)]);
    assert_eq!(*observer.published.lock().unwrap(), vec![2]);
}

#[tokio::test]
async fn test_results_after_stop_are_discarded() {
    let source = Arc::new(GatedSource::new());
    let window = source.expect_window();
    let statuses = source.expect_statuses();
    let poller = FeedPoller::from_arc(source.clone());
    let mut updates = poller.subscribe();

    let tick = poller.poll_now();
    source.wait_for_window_calls(1).await;
    poller.stop();

    window.send(Ok(vec![sample_event(1, "api", "error")])).unwrap();
    statuses.send(Ok(StatusMap::new())).unwrap();

    assert_eq!(tick.await.unwrap(), TickOutcome::Stopped { seq: 1 });
    assert_eq!(poller.snapshot().seq, 0);
    assert!(poller.snapshot().window.is_empty());
    assert!(!updates.has_changed().unwrap_or(false));
    assert!(poller.is_stopped());
    assert!(poller.start(Duration::from_millis(100), 20).is_err());
}

#[tokio::test]
async fn test_failed_half_keeps_previous_value() {
    let source = Arc::new(StaticSource::new(
        vec![sample_event(1, "api", "info"), sample_event(2, "api", "error")],
        StatusMap::new(),
    ));
    let observer = Arc::new(RecordingObserver::default());
    let poller = FeedPoller::from_arc(source.clone()).with_observer(observer.clone());

    let first = poller.poll_now().await.unwrap();
    assert!(matches!(first, TickOutcome::Applied { window_ok: true, statuses_ok: true, .. }));
    assert!(poller.snapshot().loaded);

    source.fail_window(Some("connection refused"));
    source.set_statuses(StatusMap::from([(2, AnalysisStatus::Analyzing)]));
    let second = poller.poll_now().await.unwrap();
    assert_eq!(second, TickOutcome::Applied { seq: 2, window_ok: false, statuses_ok: true });

    let snapshot = poller.snapshot();
    assert_eq!(snapshot.window.len(), 2, "stale window stays visible");
    assert!(snapshot.window_error.as_deref().unwrap().contains("connection refused"));
    assert!(snapshot.is_degraded());
    assert_eq!(snapshot.backend_status(2), AnalysisStatus::Analyzing);

    {
        let failures = observer.failures.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, 2);
        assert_eq!(failures[0].1, FetchHalf::Window);
    }

    source.fail_window(None);
    poller.poll_now().await.unwrap();
    assert!(!poller.snapshot().is_degraded());
}

#[tokio::test]
async fn test_status_failure_keeps_previous_map() {
    let source = Arc::new(StaticSource::new(
        vec![sample_event(5, "api", "info")],
        StatusMap::from([(5, AnalysisStatus::Completed)]),
    ));
    let poller = FeedPoller::from_arc(source.clone());
    poller.poll_now().await.unwrap();

    source.fail_statuses(Some("502 bad gateway"));
    let outcome = poller.poll_now().await.unwrap();
    assert_eq!(outcome, TickOutcome::Applied { seq: 2, window_ok: true, statuses_ok: false });
    let snapshot = poller.snapshot();
    assert_eq!(snapshot.backend_status(5), AnalysisStatus::Completed);
    assert!(snapshot.status_error.is_some());
    assert!(snapshot.window_error.is_none());
}

#[tokio::test]
async fn test_system_filter_reaches_the_source() {
    let source = Arc::new(StaticSource::new(Vec::new(), StatusMap::new()));
    let poller = FeedPoller::from_arc(source.clone());

    poller.set_system_filter(Some("billing".to_string()));
    poller.poll_now().await.unwrap();
    assert_eq!(source.last_query().unwrap().system_id.as_deref(), Some("billing"));

    poller.set_system_filter(None);
    poller.poll_now().await.unwrap();
    assert_eq!(source.last_query().unwrap().system_id, None);
}

#[tokio::test(start_paused = true)]
async fn test_start_ticks_immediately_then_on_cadence() {
    let source = Arc::new(StaticSource::new(
        (1..=10).map(|id| sample_event(id, "api", "info")).collect(),
        StatusMap::new(),
    ));
    let poller = FeedPoller::from_arc(source.clone());
    poller.start(Duration::from_millis(100), 5).unwrap();

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(source.window_calls(), 1);
    assert_eq!(source.status_calls(), 1);
    assert_eq!(poller.snapshot().window.len(), 5);
    assert_eq!(source.last_query().unwrap().limit, 5);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(source.window_calls(), 2);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(source.window_calls(), 4);
    poller.stop();
}

#[tokio::test(start_paused = true)]
async fn test_pause_lets_in_flight_tick_land_and_resume_ticks_immediately() {
    let source = Arc::new(GatedSource::new());
    let window_1 = source.expect_window();
    let status_1 = source.expect_statuses();
    let poller = FeedPoller::from_arc(source.clone());
    let mut updates = poller.subscribe();

    poller.start(Duration::from_millis(100), 20).unwrap();
    source.wait_for_window_calls(1).await;
    poller.pause();
    assert!(!poller.is_live());

    // The tick dispatched before the pause still lands
    window_1.send(Ok(vec![sample_event(1, "api", "info")])).unwrap();
    status_1.send(Ok(StatusMap::new())).unwrap();
    updates.changed().await.unwrap();
    assert_eq!(updates.borrow_and_update().seq, 1);

    // No tick is scheduled while paused
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(source.window_calls(), 1);

    let window_2 = source.expect_window();
    let status_2 = source.expect_statuses();
    poller.resume();
    source.wait_for_window_calls(2).await;
    window_2.send(Ok(vec![sample_event(2, "api", "error")])).unwrap();
    status_2.send(Ok(StatusMap::new())).unwrap();
    updates.changed().await.unwrap();
    assert_eq!(updates.borrow_and_update().window[0].id, 2);

    // Then the original cadence
    let window_3 = source.expect_window();
    let status_3 = source.expect_statuses();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(source.window_calls(), 2);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(source.window_calls(), 3);

    drop((window_3, status_3));
    poller.stop();
}

#[tokio::test(start_paused = true)]
async fn test_back_to_back_pause_resume_restarts_cadence() {
    let source = Arc::new(StaticSource::new(vec![sample_event(1, "api", "info")], StatusMap::new()));
    let poller = FeedPoller::from_arc(source.clone());
    poller.start(Duration::from_millis(1000), 20).unwrap();

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(source.window_calls(), 1);

    // Both land before the driver wakes up again
    poller.pause();
    poller.resume();
    assert!(poller.is_live());

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(source.window_calls(), 2, "resume must tick immediately");

    // The cadence restarts from the resume, not from the original start
    tokio::time::sleep(Duration::from_millis(985)).await;
    assert_eq!(source.window_calls(), 2);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(source.window_calls(), 3);
    poller.stop();
}

#[tokio::test(start_paused = true)]
async fn test_no_tick_is_issued_after_pause_returns() {
    for _ in 0..32 {
        let source = Arc::new(StaticSource::new(vec![sample_event(1, "api", "info")], StatusMap::new()));
        let poller = FeedPoller::from_arc(source.clone());
        poller.start(Duration::from_millis(100), 20).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        // Land exactly on the instant the next tick is due
        tokio::time::sleep(Duration::from_millis(99)).await;
        poller.pause();
        let issued = poller.last_issued();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(poller.last_issued(), issued);
        assert!(source.window_calls() as u64 <= issued);
        poller.stop();
    }
}

#[tokio::test]
async fn test_resume_while_live_is_a_no_op() {
    let source = Arc::new(StaticSource::new(Vec::new(), StatusMap::new()));
    let poller = FeedPoller::from_arc(source.clone());
    assert_eq!(poller.last_issued(), 0);
    poller.resume();
    assert!(poller.is_live());
    poller.poll_now().await.unwrap();
    assert_eq!(poller.last_issued(), 1);
}
