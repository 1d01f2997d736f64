// Copyright 2024 the vpilot-drive contributors
// SPDX-License-Identifier: MPL-2.0

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use log::trace;

use crate::frame::Frame;

/// How many frames may wait for the presentation side before we start
/// dropping them.
pub const FRAME_QUEUE_DEPTH: usize = 4;

/// Gets told what a drive worker is doing. Called on the worker thread.
pub trait Observer {
    /// Free-form status text meant for the user.
    fn on_message(&mut self, _message: &str) {}

    fn on_step(&mut self, worker_id: usize, description: &str);

    /// The frame that was just answered. Only called after the command
    /// for it went out.
    fn on_frame(&mut self, frame: Frame);

    /// Called exactly once per worker, after the connection is closed.
    fn on_done(&mut self, worker_id: usize);

    fn on_error(&mut self, _reason: &str) {}
}

/// Everything except frames, in the order the worker reported it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriveEvent {
    Message(String),
    Step { worker_id: usize, description: String },
    Done { worker_id: usize },
    Error(String),
}

/// Forwards observer callbacks to another thread over channels.
///
/// Control events use an unbounded channel so a Done is never lost.
/// Frames go over a short bounded one and are dropped when the receiving
/// side falls behind; it only ever wants the newest one anyway.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    events: Sender<DriveEvent>,
    frames: Sender<Frame>,
}

/// The receiving half of a [`ChannelObserver`].
#[derive(Debug)]
pub struct ObserverReceiver {
    pub events: Receiver<DriveEvent>,
    pub frames: Receiver<Frame>,
}

impl ChannelObserver {
    pub fn new() -> (ChannelObserver, ObserverReceiver) {
        let (events_tx, events_rx) = unbounded();
        let (frames_tx, frames_rx) = bounded(FRAME_QUEUE_DEPTH);
        let observer = ChannelObserver {
            events: events_tx,
            frames: frames_tx,
        };
        let receiver = ObserverReceiver {
            events: events_rx,
            frames: frames_rx,
        };
        return (observer, receiver);
    }

    fn emit(&self, event: DriveEvent) {
        // Nobody listening any more is not the worker's problem.
        let _ = self.events.send(event);
    }
}

impl Observer for ChannelObserver {
    fn on_message(&mut self, message: &str) {
        self.emit(DriveEvent::Message(message.to_string()));
    }

    fn on_step(&mut self, worker_id: usize, description: &str) {
        self.emit(DriveEvent::Step {
            worker_id: worker_id,
            description: description.to_string(),
        });
    }

    fn on_frame(&mut self, frame: Frame) {
        if let Err(TrySendError::Full(_)) = self.frames.try_send(frame) {
            trace!("presentation is behind, dropping a frame");
        }
    }

    fn on_done(&mut self, worker_id: usize) {
        self.emit(DriveEvent::Done {
            worker_id: worker_id,
        });
    }

    fn on_error(&mut self, reason: &str) {
        self.emit(DriveEvent::Error(reason.to_string()));
    }
}
