//! Session driver over paused tokio time
//!
//! The ticker and the controller's clock both run on tokio time, so a
//! paused runtime fast-forwards through whole sessions.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use driftwave::{
    CompletedSession, ContextRole, ControllerOptions, EngineError, MemoryMediaSession,
    MonotonicClock, NoiseVariant, OfflineContextFactory, SessionController, SessionDriver,
    SessionMode, SessionState, Visibility,
};
use tokio_test::{assert_err, assert_ok};

type Completed = Arc<Mutex<Vec<CompletedSession>>>;

fn controller(completed: Completed) -> (Arc<OfflineContextFactory>, SessionController) {
    let factory = Arc::new(OfflineContextFactory::new(8000).with_latency(Duration::from_millis(5)));
    let controller = SessionController::new(
        factory.clone(),
        Arc::new(MemoryMediaSession::new()),
        Arc::new(MonotonicClock::new()),
        ControllerOptions::default(),
    )
    .with_completion(move |done| {
        completed.lock().unwrap().push(done.clone());
    });
    (factory, controller)
}

#[tokio::test(start_paused = true)]
async fn timed_session_runs_to_completion() {
    let completed = Completed::default();
    let (factory, controller) = controller(Arc::clone(&completed));
    let (handle, driver) = SessionDriver::spawn(controller);

    assert_ok!(handle.set_duration(Some(Duration::from_secs(60))));
    assert_ok!(handle.select_mode(SessionMode::tone_pair(10.0)));
    assert_ok!(handle.play());

    let playing = assert_ok!(handle.wait_for_state(SessionState::Playing).await);
    assert_eq!(playing.snapshot.beat_frequency, Some(10.0));
    assert!(playing.last_error.is_none());

    let done = assert_ok!(handle.wait_for_state(SessionState::Idle).await);
    assert_eq!(done.snapshot.elapsed_seconds, 0.0);
    assert_eq!(factory.registry().open_count(), 0);
    {
        let completed = completed.lock().unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].mode, "tone:10");
        assert_eq!(completed[0].duration_seconds, Some(60.0));
        assert_eq!(completed[0].elapsed_seconds, 60.0);
    }

    drop(handle);
    let controller = assert_ok!(driver.await);
    assert_eq!(controller.state(), SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn background_round_trip_through_handle() {
    let (factory, controller) = controller(Completed::default());
    let (handle, _driver) = SessionDriver::spawn(controller);

    assert_ok!(handle.set_duration(None));
    assert_ok!(handle.select_mode(SessionMode::tone_pair(6.0)));
    assert_ok!(handle.play());
    assert_ok!(handle.set_visibility(Visibility::Hidden));
    assert_ok!(handle.wait_for_state(SessionState::Backgrounded).await);
    assert!(factory
        .registry()
        .open_context(ContextRole::Background)
        .is_some());

    assert_ok!(handle.set_visibility(Visibility::Visible));
    assert_ok!(handle.wait_for_state(SessionState::Playing).await);
    assert!(factory
        .registry()
        .open_context(ContextRole::Background)
        .is_none());
}

#[tokio::test(start_paused = true)]
async fn rejected_intent_is_reported_in_status() {
    let (_, controller) = controller(Completed::default());
    let (handle, _driver) = SessionDriver::spawn(controller);
    let mut status = handle.subscribe();

    assert_ok!(handle.play());
    assert_ok!(status.changed().await);
    let current = status.borrow_and_update().clone();
    assert_eq!(current.snapshot.state, SessionState::Idle);
    assert!(current.last_error.is_some());
}

#[tokio::test(start_paused = true)]
async fn dropping_every_handle_stops_playback() {
    let (factory, controller) = controller(Completed::default());
    let (handle, driver) = SessionDriver::spawn(controller);

    assert_ok!(handle.set_duration(None));
    assert_ok!(handle.select_mode(SessionMode::noise(NoiseVariant::Pink)));
    assert_ok!(handle.play());
    assert_ok!(handle.wait_for_state(SessionState::Playing).await);
    assert_eq!(factory.registry().open_count(), 1);

    drop(handle);
    let controller = assert_ok!(driver.await);
    assert_eq!(controller.state(), SessionState::Idle);
    assert_eq!(factory.registry().open_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn send_after_shutdown_reports_closed_driver() {
    let (_, controller) = controller(Completed::default());
    let (handle, driver) = SessionDriver::spawn(controller);

    driver.abort();
    let _ = driver.await;

    let err = assert_err!(handle.play());
    assert_eq!(err, EngineError::DriverClosed);
}
