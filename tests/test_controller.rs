use std::thread;
use std::time::Duration;

use assert_matches::assert_matches;
use proptest::prelude::*;
use vpilot_drive_lib::controller::{ConstantController, Controller, ControllerError, DeadlineController};
use vpilot_drive_lib::frame::{Frame, PixelFormat};
use vpilot_drive_lib::messages::ControlCommand;

mod common;

/// Answers with throttle = first pixel / 10, taking its time over frames
/// whose first pixel is 1.
fn slow_on_ones(frame: &Frame) -> Result<ControlCommand, ControllerError> {
    let fill = frame.pixels()[0];
    if fill == 1 {
        thread::sleep(Duration::from_millis(150));
    }
    Ok(ControlCommand::new(fill as f32 / 10.0, 0.0, 0.0))
}

#[test]
fn stub_gives_full_throttle() {
    let mut controller = ConstantController::default();
    assert_eq!(
        controller.decide(&common::frame(0)),
        Ok(ControlCommand::new(1.0, 0.0, 0.0))
    );
}

#[test]
fn constant_controller_uses_its_command() {
    let mut controller = ConstantController::new(ControlCommand::SAFE_DEFAULT);
    assert_eq!(controller.decide(&common::frame(9)), Ok(ControlCommand::SAFE_DEFAULT));
}

#[test]
fn safe_default_is_full_brake() {
    assert_eq!(ControlCommand::SAFE_DEFAULT, ControlCommand::new(0.0, 1.0, 0.0));
}

#[test]
fn commands_clamp_into_range() {
    assert_eq!(
        ControlCommand::new(1.5, -0.5, -3.0).clamped(),
        ControlCommand::new(1.0, 0.0, -1.0)
    );
    assert_eq!(ControlCommand::from((0.2, 0.3, -0.4)).clamped(), ControlCommand::new(0.2, 0.3, -0.4));
    assert!(!ControlCommand::new(0.0, f32::INFINITY, 0.0).is_finite());
}

#[test]
fn deadline_controller_passes_fast_answers_through() {
    let mut controller = DeadlineController::spawn(slow_on_ones, Duration::from_secs(2)).unwrap();
    assert_eq!(controller.decide(&common::frame(5)), Ok(ControlCommand::new(0.5, 0.0, 0.0)));
    assert_eq!(controller.decide(&common::frame(3)), Ok(ControlCommand::new(0.3, 0.0, 0.0)));
}

#[test]
fn deadline_controller_gives_up_on_slow_answers() {
    let timeout = Duration::from_millis(30);
    let mut controller = DeadlineController::spawn(slow_on_ones, timeout).unwrap();

    assert_eq!(
        controller.decide(&common::frame(1)),
        Err(ControllerError::Timeout(timeout))
    );

    // Let the late answer for frame 1 arrive; it must not be used for
    // frame 2.
    thread::sleep(Duration::from_millis(300));
    assert_eq!(controller.decide(&common::frame(2)), Ok(ControlCommand::new(0.2, 0.0, 0.0)));
}

#[test]
fn deadline_controller_is_busy_while_the_model_is_behind() {
    let model = |frame: &Frame| -> Result<ControlCommand, ControllerError> {
        if frame.pixels()[0] == 1 {
            thread::sleep(Duration::from_millis(500));
        }
        Ok(ControlCommand::SAFE_DEFAULT)
    };
    let timeout = Duration::from_millis(20);
    let mut controller = DeadlineController::spawn(model, timeout).unwrap();

    // The model is stuck on frame 1, frame 2 waits in line behind it,
    // and there is no room left for frame 3.
    assert_eq!(controller.decide(&common::frame(1)), Err(ControllerError::Timeout(timeout)));
    assert_eq!(controller.decide(&common::frame(2)), Err(ControllerError::Timeout(timeout)));
    assert_eq!(controller.decide(&common::frame(3)), Err(ControllerError::Busy));
}

#[test]
fn deadline_controller_reports_a_dead_model() {
    let model = |_: &Frame| -> Result<ControlCommand, ControllerError> { panic!("model crashed") };
    let mut controller = DeadlineController::spawn(model, Duration::from_secs(2)).unwrap();

    assert_eq!(controller.decide(&common::frame(1)), Err(ControllerError::Unavailable));
    assert_matches!(controller.decide(&common::frame(1)), Err(ControllerError::Unavailable));
}

proptest! {
    #[test]
    fn stub_ignores_the_frame(width in 1usize..16, height in 1usize..16, fill: u8) {
        let frame = Frame::new(width, height, PixelFormat::Bgr8, vec![fill; width * height * 3]).unwrap();
        let mut controller = ConstantController::default();
        prop_assert_eq!(controller.decide(&frame), Ok(ControlCommand::new(1.0, 0.0, 0.0)));
    }
}
