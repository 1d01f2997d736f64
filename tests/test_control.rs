use std::thread;
use std::time::{Duration, Instant};

use assert_matches::assert_matches;
use vpilot_drive_lib::config::DriveConfig;
use vpilot_drive_lib::control::DriveControl;
use vpilot_drive_lib::controller::{ConstantController, ControllerError};
use vpilot_drive_lib::drive_loop::ExitReason;
use vpilot_drive_lib::error::DriveError;
use vpilot_drive_lib::frame::Frame;
use vpilot_drive_lib::messages::ControlCommand;
use vpilot_drive_lib::observer::DriveEvent;
use vpilot_drive_lib::sim_client::ConnectionError;

mod common;
use common::ScriptedClient;

fn finite_connector(
    frames: u8,
) -> impl Fn(&str, u16) -> Result<ScriptedClient, ConnectionError> + Send + 'static {
    let trace = common::new_trace();
    move |_: &str, _: u16| -> Result<ScriptedClient, ConnectionError> {
        Ok(ScriptedClient::with_frames(&trace, frames))
    }
}

fn endless_connector() -> impl Fn(&str, u16) -> Result<ScriptedClient, ConnectionError> + Send + 'static {
    let trace = common::new_trace();
    move |_: &str, _: u16| -> Result<ScriptedClient, ConnectionError> {
        Ok(ScriptedClient::endless(&trace))
    }
}

/// Polls like a UI would until the drive is over.
fn poll_until_idle(control: &mut DriveControl) -> Vec<DriveEvent> {
    let give_up = Instant::now() + Duration::from_secs(5);
    let mut events = Vec::new();
    while control.is_running() {
        assert!(Instant::now() < give_up, "drive never finished");
        events.extend(control.poll());
        thread::sleep(Duration::from_millis(5));
    }
    events
}

#[test]
fn only_one_drive_at_a_time() {
    let mut control = DriveControl::new();
    let config = DriveConfig::default();

    assert!(control.can_start());
    assert_eq!(
        control
            .start(&config, endless_connector(), ConstantController::default())
            .unwrap(),
        0
    );
    assert!(!control.can_start());
    assert!(control.can_stop());

    assert_matches!(
        control.start(&config, endless_connector(), ConstantController::default()),
        Err(DriveError::AlreadyRunning(0))
    );

    let summary = control.stop().unwrap();
    assert_matches!(summary.exit, ExitReason::Cancelled);
    assert!(control.can_start());
    assert!(!control.can_stop());

    assert_eq!(
        control
            .start(&config, endless_connector(), ConstantController::default())
            .unwrap(),
        1
    );
    control.stop();
}

#[test]
fn finished_drive_reenables_start() {
    let mut control = DriveControl::new();
    control
        .start(&DriveConfig::default(), finite_connector(2), ConstantController::default())
        .unwrap();

    let events = poll_until_idle(&mut control);

    assert!(control.can_start());
    assert_matches!(events.first(), Some(DriveEvent::Message(_)));
    assert_eq!(events.last(), Some(&DriveEvent::Done { worker_id: 0 }));
    let steps = events
        .iter()
        .filter(|event| matches!(event, DriveEvent::Step { worker_id: 0, .. }))
        .count();
    assert_eq!(steps, 2);
    // The scripted simulator hangs up after its frames.
    assert!(events.iter().any(|event| matches!(event, DriveEvent::Error(_))));

    assert!(control.latest_frame().is_some());
    let summary = control.take_summary().unwrap();
    assert_eq!(summary.iterations, 2);
    assert!(control.take_summary().is_none());
}

#[test]
fn cancel_does_not_wait() {
    let mut control = DriveControl::new();
    control
        .start(&DriveConfig::default(), endless_connector(), ConstantController::default())
        .unwrap();

    control.cancel();
    control.cancel();
    let events = poll_until_idle(&mut control);

    let done = events
        .iter()
        .filter(|event| matches!(event, DriveEvent::Done { .. }))
        .count();
    assert_eq!(done, 1);
    let notices: Vec<&DriveEvent> = events
        .iter()
        .filter(|event| matches!(event, DriveEvent::Message(text) if text.contains("abort")))
        .collect();
    assert_eq!(
        notices,
        [&DriveEvent::Message("Worker #0 notified to abort".to_string())]
    );
    assert_matches!(control.take_summary().unwrap().exit, ExitReason::Cancelled);
}

#[test]
fn stop_without_a_drive_is_harmless() {
    let mut control = DriveControl::new();
    assert!(control.stop().is_none());
    control.cancel();
    assert!(control.poll().is_empty());
}

#[test]
fn panicking_model_does_not_wedge_the_controls() {
    let mut control = DriveControl::new();
    let model = |_: &Frame| -> Result<ControlCommand, ControllerError> { panic!("model crashed") };
    control
        .start(&DriveConfig::default(), finite_connector(3), model)
        .unwrap();

    let events = poll_until_idle(&mut control);

    assert!(control.can_start());
    assert_eq!(events.last(), Some(&DriveEvent::Done { worker_id: 0 }));
    let summary = control.take_summary().unwrap();
    assert_eq!(summary.iterations, 3);
    assert_eq!(summary.controller_faults, 3);
}

#[test]
fn oversized_run_time_does_not_wedge_the_controls() {
    let mut control = DriveControl::new();
    let config = DriveConfig {
        run_time: Duration::MAX,
        ..DriveConfig::default()
    };
    control
        .start(&config, finite_connector(2), ConstantController::default())
        .unwrap();

    let events = poll_until_idle(&mut control);

    assert!(control.can_start());
    assert_eq!(events.last(), Some(&DriveEvent::Done { worker_id: 0 }));
    assert_eq!(control.take_summary().unwrap().iterations, 2);
}
