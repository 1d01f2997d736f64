#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use vpilot_drive_lib::frame::{Frame, PixelFormat};
use vpilot_drive_lib::messages::{FrameMessage, OutgoingMessage};
use vpilot_drive_lib::observer::Observer;
use vpilot_drive_lib::sim_client::{ConnectionError, SimClient};

pub const WIDTH: u16 = 4;
pub const HEIGHT: u16 = 2;

/// Everything a scripted client and a recording observer saw, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    /// fill value of the frame handed out
    Receive(u8),
    ReceiveFailed,
    Send(OutgoingMessage),
    Close,
    Message(String),
    /// fill value of the frame reported
    Frame(u8),
    Step(usize, String),
    Done(usize),
    Error(String),
}

pub type Trace = Arc<Mutex<Vec<Call>>>;

pub fn new_trace() -> Trace {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn calls(trace: &Trace) -> Vec<Call> {
    trace.lock().unwrap().clone()
}

/// The trace with step and error text blanked out, after checking that
/// every step description looks like "step <time>".
pub fn calls_without_text(trace: &Trace) -> Vec<Call> {
    calls(trace)
        .into_iter()
        .map(|call| match call {
            Call::Step(id, text) => {
                assert!(text.starts_with("step "), "unexpected step text {text:?}");
                Call::Step(id, String::new())
            }
            Call::Error(_) => Call::Error(String::new()),
            other => other,
        })
        .collect()
}

/// A small BGR frame message with every byte set to `fill`.
pub fn frame_message(seq_id: u16, fill: u8) -> FrameMessage {
    return FrameMessage {
        seq_id: seq_id,
        width: WIDTH,
        height: HEIGHT,
        format: PixelFormat::Bgr8,
        payload: vec![fill; WIDTH as usize * HEIGHT as usize * 3],
    };
}

pub fn frame(fill: u8) -> Frame {
    Frame::decode(frame_message(0, fill)).unwrap()
}

/// A SimClient that plays back a fixed list of receive results and
/// writes everything done to it into a trace. Once the script runs out
/// it reports the simulator as gone, unless it is endless.
pub struct ScriptedClient {
    script: VecDeque<Result<FrameMessage, ConnectionError>>,
    trace: Trace,
    endless: bool,
    served: u16,
    fail_sends: bool,
    entered_receive: Option<Sender<()>>,
    release_receive: Option<Receiver<()>>,
}

impl ScriptedClient {
    pub fn new(trace: &Trace, script: Vec<Result<FrameMessage, ConnectionError>>) -> ScriptedClient {
        return ScriptedClient {
            script: script.into(),
            trace: trace.clone(),
            endless: false,
            served: 0,
            fail_sends: false,
            entered_receive: None,
            release_receive: None,
        };
    }

    /// Frames with fill values 1..=count.
    pub fn with_frames(trace: &Trace, count: u8) -> ScriptedClient {
        let script = (1..=count)
            .map(|fill| Ok(frame_message(fill as u16, fill)))
            .collect();
        ScriptedClient::new(trace, script)
    }

    /// Never runs out of frames.
    pub fn endless(trace: &Trace) -> ScriptedClient {
        let mut client = ScriptedClient::new(trace, Vec::new());
        client.endless = true;
        return client;
    }

    pub fn failing_sends(mut self) -> ScriptedClient {
        self.fail_sends = true;
        return self;
    }

    /// Makes every receive announce itself on `entered` and then wait
    /// for a token on `release` before returning.
    pub fn gated(mut self, entered: Sender<()>, release: Receiver<()>) -> ScriptedClient {
        self.entered_receive = Some(entered);
        self.release_receive = Some(release);
        return self;
    }

    fn record(&self, call: Call) {
        self.trace.lock().unwrap().push(call);
    }
}

impl SimClient for ScriptedClient {
    fn send(&mut self, message: &OutgoingMessage) -> Result<(), ConnectionError> {
        if self.fail_sends {
            return Err(ConnectionError::Disconnected);
        }
        self.record(Call::Send(message.clone()));
        Ok(())
    }

    fn receive(&mut self) -> Result<FrameMessage, ConnectionError> {
        if let Some(entered) = &self.entered_receive {
            let _ = entered.send(());
        }
        if let Some(release) = &self.release_receive {
            let _ = release.recv();
        }

        let next = if self.endless {
            thread::sleep(Duration::from_millis(1));
            self.served = self.served.wrapping_add(1);
            Ok(frame_message(self.served, (self.served % 256) as u8))
        } else {
            self.script
                .pop_front()
                .unwrap_or(Err(ConnectionError::Disconnected))
        };
        match &next {
            Ok(message) => self.record(Call::Receive(message.payload[0])),
            Err(_) => self.record(Call::ReceiveFailed),
        }
        next
    }

    fn close(&mut self) -> Result<(), ConnectionError> {
        self.record(Call::Close);
        Ok(())
    }
}

/// An Observer that writes into the same kind of trace.
#[derive(Clone)]
pub struct RecordingObserver {
    trace: Trace,
}

impl RecordingObserver {
    pub fn new(trace: &Trace) -> RecordingObserver {
        RecordingObserver {
            trace: trace.clone(),
        }
    }

    fn record(&self, call: Call) {
        self.trace.lock().unwrap().push(call);
    }
}

impl Observer for RecordingObserver {
    fn on_message(&mut self, message: &str) {
        self.record(Call::Message(message.to_string()));
    }

    fn on_step(&mut self, worker_id: usize, description: &str) {
        self.record(Call::Step(worker_id, description.to_string()));
    }

    fn on_frame(&mut self, frame: Frame) {
        self.record(Call::Frame(frame.pixels()[0]));
    }

    fn on_done(&mut self, worker_id: usize) {
        self.record(Call::Done(worker_id));
    }

    fn on_error(&mut self, reason: &str) {
        self.record(Call::Error(reason.to_string()));
    }
}
