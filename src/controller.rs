// Copyright 2024 the vpilot-drive contributors
// SPDX-License-Identifier: MPL-2.0

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, warn};
use thiserror::Error;

use crate::frame::Frame;
use crate::messages::ControlCommand;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControllerError {
    #[error("no decision within {0:?}")]
    Timeout(Duration),
    #[error("still working on an earlier frame")]
    Busy,
    #[error("controller is no longer running")]
    Unavailable,
    #[error("controller produced an unusable command {0:?}")]
    InvalidCommand(ControlCommand),
    #[error("controller failed: {0}")]
    Failed(String),
}

/// Decides what to do with the car given the latest frame.
///
/// `decide` runs on the drive worker between receiving a frame and
/// answering it, so it must not block indefinitely. Errors are not fatal:
/// the drive loop answers the frame with [`ControlCommand::SAFE_DEFAULT`]
/// instead.
pub trait Controller {
    fn decide(&mut self, frame: &Frame) -> Result<ControlCommand, ControllerError>;
}

impl<F> Controller for F
where
    F: FnMut(&Frame) -> Result<ControlCommand, ControllerError>,
{
    fn decide(&mut self, frame: &Frame) -> Result<ControlCommand, ControllerError> {
        self(frame)
    }
}

/// Placeholder model: ignores the frame and always gives the same
/// answer. The default is full throttle, no brake, straight ahead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantController {
    command: ControlCommand,
}

impl ConstantController {
    pub fn new(command: ControlCommand) -> ConstantController {
        return ConstantController { command: command };
    }
}

impl Default for ConstantController {
    fn default() -> ConstantController {
        ConstantController::new(ControlCommand::new(1.0, 0.0, 0.0))
    }
}

impl Controller for ConstantController {
    fn decide(&mut self, _frame: &Frame) -> Result<ControlCommand, ControllerError> {
        Ok(self.command)
    }
}

type Decision = (u64, Result<ControlCommand, ControllerError>);

/// Runs another controller on its own thread and gives up on it after a
/// fixed timeout.
///
/// Each request carries an id, and answers to requests we already gave
/// up on are thrown away, so a late answer can never be applied to a
/// newer frame. If the inner controller wedges for good, its thread is
/// left detached when this is dropped.
pub struct DeadlineController {
    requests: Option<Sender<(u64, Frame)>>,
    decisions: Receiver<Decision>,
    timeout: Duration,
    next_id: u64,
    _thread: JoinHandle<()>,
}

impl DeadlineController {
    pub fn spawn<C>(mut inner: C, timeout: Duration) -> std::io::Result<DeadlineController>
    where
        C: Controller + Send + 'static,
    {
        // One slot: the frame being decided on. Anything beyond that
        // means the inner controller has fallen behind.
        let (request_tx, request_rx) = bounded::<(u64, Frame)>(1);
        let (decision_tx, decision_rx) = bounded::<Decision>(1);

        let thread = thread::Builder::new()
            .name("controller".into())
            .spawn(move || {
                for (id, frame) in request_rx.iter() {
                    let decision = inner.decide(&frame);
                    if decision_tx.send((id, decision)).is_err() {
                        break;
                    }
                }
                debug!("controller thread exiting");
            })?;

        return Ok(DeadlineController {
            requests: Some(request_tx),
            decisions: decision_rx,
            timeout: timeout,
            next_id: 0,
            _thread: thread,
        });
    }
}

impl Controller for DeadlineController {
    fn decide(&mut self, frame: &Frame) -> Result<ControlCommand, ControllerError> {
        let requests = match &self.requests {
            Some(requests) => requests,
            None => return Err(ControllerError::Unavailable),
        };

        let id = self.next_id;
        self.next_id += 1;
        let deadline = Instant::now() + self.timeout;

        // Drop any answers that showed up after their caller gave up,
        // freeing the inner thread to take our request.
        while let Ok((stale_id, _)) = self.decisions.try_recv() {
            debug!("discarding late decision for request {stale_id}");
        }

        match requests.try_send((id, frame.clone())) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => return Err(ControllerError::Busy),
            Err(TrySendError::Disconnected(_)) => {
                self.requests = None;
                return Err(ControllerError::Unavailable);
            }
        }

        loop {
            match self.decisions.recv_deadline(deadline) {
                Ok((answer_id, decision)) if answer_id == id => return decision,
                Ok((stale_id, _)) => {
                    debug!("discarding late decision for request {stale_id}");
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!("controller missed its {:?} deadline", self.timeout);
                    return Err(ControllerError::Timeout(self.timeout));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.requests = None;
                    return Err(ControllerError::Unavailable);
                }
            }
        }
    }
}
