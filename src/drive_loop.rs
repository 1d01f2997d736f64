// Copyright 2024 the vpilot-drive contributors
// SPDX-License-Identifier: MPL-2.0

//! The receive, decide, send cycle that actually drives the car.
//!
//! Every iteration is strictly sequential: receive one frame, decode it,
//! ask the controller, send the answer, then tell the observer. Nothing
//! is pipelined, so there is never more than one unanswered frame.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use log::{debug, error, info, max_level, trace, warn, LevelFilter};

use crate::controller::{Controller, ControllerError};
use crate::error::DriveError;
use crate::frame::Frame;
use crate::messages::{ControlCommand, OutgoingMessage};
use crate::observer::Observer;
use crate::sim_client::SimClient;

/// The run flag shared between a drive worker and whoever started it.
///
/// Clearing it is only noticed between iterations; a receive that is
/// already blocked finishes first.
#[derive(Debug, Clone)]
pub struct LoopState {
    running: Arc<AtomicBool>,
}

impl LoopState {
    pub fn new() -> LoopState {
        return LoopState {
            running: Arc::new(AtomicBool::new(true)),
        };
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Asks the loop to stop after its current iteration. Calling it
    /// again, or after the loop ended, does nothing.
    pub fn cancel(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

impl Default for LoopState {
    fn default() -> LoopState {
        LoopState::new()
    }
}

#[derive(Debug)]
pub enum ExitReason {
    Deadline,
    Cancelled,
    Failed(DriveError),
}

#[derive(Debug)]
pub struct RunSummary {
    /// Frames that were received, answered and reported.
    pub iterations: u64,
    /// Frames answered with the safe default because the controller
    /// failed.
    pub controller_faults: u64,
    pub exit: ExitReason,
}

/// Drives until the deadline passes, `state` is cancelled, or the
/// connection fails, then stops the simulator and closes the client.
///
/// The observer always gets exactly one `on_done`, preceded by
/// `on_error` when the run ended on a failure.
pub fn run<S, C, O>(
    worker_id: usize,
    mut client: S,
    controller: &mut C,
    observer: &mut O,
    deadline: Instant,
    state: &LoopState,
) -> RunSummary
where
    S: SimClient,
    C: Controller + ?Sized,
    O: Observer + ?Sized,
{
    let mut iterations: u64 = 0;
    let mut controller_faults: u64 = 0;

    let exit = loop {
        if !state.is_running() {
            info!("worker #{worker_id} cancelled after {iterations} steps");
            break ExitReason::Cancelled;
        }
        if Instant::now() >= deadline {
            info!("worker #{worker_id} reached its deadline after {iterations} steps");
            break ExitReason::Deadline;
        }

        let message = match client.receive() {
            Ok(message) => message,
            Err(err) => break ExitReason::Failed(err.into()),
        };
        if max_level() >= LevelFilter::Trace {
            trace!(
                "received frame {} ({}x{}, {} bytes)",
                message.seq_id,
                message.width,
                message.height,
                message.payload.len()
            );
        }

        let frame = match Frame::decode(message) {
            Ok(frame) => frame,
            Err(err) => break ExitReason::Failed(err.into()),
        };

        let command = match checked_decision(controller, &frame) {
            Ok(command) => command,
            Err(err) => {
                controller_faults += 1;
                warn!("controller failed ({err}), braking instead");
                ControlCommand::SAFE_DEFAULT
            }
        };

        if let Err(err) = client.send(&OutgoingMessage::Commands(command)) {
            break ExitReason::Failed(err.into());
        }

        observer.on_frame(frame);
        let description = step_description();
        debug!("worker #{worker_id}: {description}");
        observer.on_step(worker_id, &description);
        iterations += 1;
    };

    let failure = match &exit {
        ExitReason::Failed(err) => Some(err),
        _ => None,
    };
    finish(worker_id, Some(&mut client), observer, failure);

    return RunSummary {
        iterations: iterations,
        controller_faults: controller_faults,
        exit: exit,
    };
}

/// The shared ending of every drive: report the failure if there was
/// one, try to stop the simulator and close the connection, then signal
/// done. Problems while stopping are only logged.
pub(crate) fn finish<S, O>(
    worker_id: usize,
    client: Option<&mut S>,
    observer: &mut O,
    failure: Option<&DriveError>,
) where
    S: SimClient + ?Sized,
    O: Observer + ?Sized,
{
    if let Some(err) = failure {
        error!("worker #{worker_id} stopped: {err}");
        observer.on_error(&err.to_string());
    }

    if let Some(client) = client {
        if let Err(err) = client.send(&OutgoingMessage::Stop) {
            warn!("worker #{worker_id} could not send stop: {err}");
        }
        if let Err(err) = client.close() {
            warn!("worker #{worker_id} could not close its connection: {err}");
        }
    }

    observer.on_done(worker_id);
}

fn checked_decision<C>(controller: &mut C, frame: &Frame) -> Result<ControlCommand, ControllerError>
where
    C: Controller + ?Sized,
{
    // A model that panics is just another failed decision.
    let command = panic::catch_unwind(AssertUnwindSafe(|| controller.decide(frame)))
        .map_err(|payload| ControllerError::Failed(panic_reason(payload.as_ref())))??;
    if !command.is_finite() {
        return Err(ControllerError::InvalidCommand(command));
    }
    return Ok(command.clamped());
}

/// The message a panic was raised with, when it has one.
pub(crate) fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(reason) = payload.downcast_ref::<&str>() {
        return format!("panicked: {reason}");
    }
    if let Some(reason) = payload.downcast_ref::<String>() {
        return format!("panicked: {reason}");
    }
    return "panicked".to_string();
}

fn step_description() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    return format!("step {:.6}", now.as_secs_f64());
}
