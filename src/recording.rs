// Copyright 2024 the vpilot-drive contributors
// SPDX-License-Identifier: MPL-2.0

//! Recorded drives, and a simulator stand-in that plays them back.
//!
//! A recording is a plain sequence of records, each a 10 byte big-endian
//! header followed by the raw frame:
//!
//! ```text
//!  0               1               2               3
//!  magic | fmt | seq_id (10)      | width (16)
//!  height (16)                    | payload_size (32) ...
//!  ... payload_size               | payload ...
//! ```

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Write};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use arbitrary_int::{u10, u2, u4};
use bitter::{BigEndianReader, BitReader};
use log::{debug, info, max_level, trace, LevelFilter};
use thiserror::Error;

use crate::frame::{Frame, PixelFormat};
use crate::messages::{FrameMessage, OutgoingMessage};
use crate::sim_client::{ConnectionError, SimClient};

pub const RECORD_HEADER_SIZE: usize = 10;

pub const RECORD_MAGIC: u4 = u4::new(0xD);

/// Nothing we record comes close to this; anything larger is a corrupt
/// header and we'd rather not try to allocate it.
pub const MAX_RECORD_PAYLOAD: u32 = 16 * 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("record header cut short at {0} bytes")]
    Truncated(usize),
    #[error("unknown record magic {0:?}")]
    BadMagic(u4),
    #[error("unknown pixel format {0:?}")]
    BadFormat(u2),
    #[error("record payload of {0} bytes is too large")]
    TooLarge(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub format: PixelFormat,
    pub seq_id: u10,
    pub width: u16,
    pub height: u16,
    pub payload_size: u32,
}

impl RecordHeader {
    pub fn to_bytes(&self) -> [u8; RECORD_HEADER_SIZE] {
        let first: u16 = ((RECORD_MAGIC.value() as u16) << 12)
            | ((format_to_wire(self.format).value() as u16) << 10)
            | self.seq_id.value();

        let mut data = [0u8; RECORD_HEADER_SIZE];
        data[0..2].copy_from_slice(&first.to_be_bytes());
        data[2..4].copy_from_slice(&self.width.to_be_bytes());
        data[4..6].copy_from_slice(&self.height.to_be_bytes());
        data[6..10].copy_from_slice(&self.payload_size.to_be_bytes());
        return data;
    }
}

fn format_to_wire(format: PixelFormat) -> u2 {
    match format {
        PixelFormat::Bgr8 => u2::new(0),
        PixelFormat::Rgb8 => u2::new(1),
        PixelFormat::Gray8 => u2::new(2),
    }
}

fn format_from_wire(raw: u2) -> Option<PixelFormat> {
    match raw.value() {
        0 => Some(PixelFormat::Bgr8),
        1 => Some(PixelFormat::Rgb8),
        2 => Some(PixelFormat::Gray8),
        _ => None,
    }
}

fn take_bits(bits: &mut BigEndianReader, count: u32, len: usize) -> Result<u64, RecordError> {
    bits.read_bits(count).ok_or(RecordError::Truncated(len))
}

pub fn parse_record_header(data: &[u8]) -> Result<RecordHeader, RecordError> {
    if data.len() < RECORD_HEADER_SIZE {
        return Err(RecordError::Truncated(data.len()));
    }
    let len = data.len();
    let mut bits = BigEndianReader::new(&data[..RECORD_HEADER_SIZE]);

    // first 16 bits say what this is and where it fits in order
    let magic = u4::new(take_bits(&mut bits, 4, len)? as u8);
    if magic != RECORD_MAGIC {
        return Err(RecordError::BadMagic(magic));
    }
    let raw_format = u2::new(take_bits(&mut bits, 2, len)? as u8);
    let format = format_from_wire(raw_format).ok_or(RecordError::BadFormat(raw_format))?;
    let seq_id = u10::new(take_bits(&mut bits, 10, len)? as u16);

    let width = take_bits(&mut bits, 16, len)? as u16;
    let height = take_bits(&mut bits, 16, len)? as u16;
    let payload_size = take_bits(&mut bits, 32, len)? as u32;
    if payload_size > MAX_RECORD_PAYLOAD {
        return Err(RecordError::TooLarge(payload_size));
    }

    return Ok(RecordHeader {
        format: format,
        seq_id: seq_id,
        width: width,
        height: height,
        payload_size: payload_size,
    });
}

/// Appends frames to a recording.
pub struct RecordWriter<W: Write> {
    writer: W,
    next_seq_id: u16,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(writer: W) -> RecordWriter<W> {
        return RecordWriter {
            writer: writer,
            next_seq_id: 0,
        };
    }

    pub fn write_frame(&mut self, frame: &Frame) -> std::io::Result<()> {
        let width = u16::try_from(frame.width())
            .map_err(|_| std::io::Error::new(ErrorKind::InvalidInput, "frame too wide to record"))?;
        let height = u16::try_from(frame.height())
            .map_err(|_| std::io::Error::new(ErrorKind::InvalidInput, "frame too tall to record"))?;
        self.write_record(width, height, frame.format(), frame.pixels())
    }

    /// Writes a record without checking that the payload fits the
    /// dimensions. Readers find out when they decode it.
    pub fn write_record(
        &mut self,
        width: u16,
        height: u16,
        format: PixelFormat,
        payload: &[u8],
    ) -> std::io::Result<()> {
        let payload_size = u32::try_from(payload.len())
            .ok()
            .filter(|size| *size <= MAX_RECORD_PAYLOAD)
            .ok_or_else(|| std::io::Error::new(ErrorKind::InvalidInput, "payload too large to record"))?;

        let header = RecordHeader {
            format: format,
            seq_id: u10::new(self.next_seq_id),
            width: width,
            height: height,
            payload_size: payload_size,
        };
        self.writer.write_all(&header.to_bytes())?;
        self.writer.write_all(payload)?;
        // seq_id is only 10 bits on the wire
        self.next_seq_id = (self.next_seq_id + 1) % 1024;
        return Ok(());
    }

    pub fn finish(mut self) -> std::io::Result<W> {
        self.writer.flush()?;
        return Ok(self.writer);
    }
}

/// Plays a recording back as if it were a live simulator.
///
/// Like the real thing, it only serves frames between a Start and a
/// Stop. The end of the recording looks like the simulator hanging up.
pub struct ReplayClient<R: Read> {
    reader: R,
    started: bool,
    closed: bool,
    frame_interval: Option<Duration>,
    last_frame_at: Option<Instant>,
    frames_served: u64,
    commands_received: u64,
}

impl ReplayClient<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<ReplayClient<BufReader<File>>, ConnectionError> {
        let file = File::open(path.as_ref())?;
        info!("replaying {}", path.as_ref().display());
        return Ok(ReplayClient::new(BufReader::new(file)));
    }
}

impl<R: Read> ReplayClient<R> {
    pub fn new(reader: R) -> ReplayClient<R> {
        return ReplayClient {
            reader: reader,
            started: false,
            closed: false,
            frame_interval: None,
            last_frame_at: None,
            frames_served: 0,
            commands_received: 0,
        };
    }

    /// Hands out frames no faster than one per `interval`, roughly
    /// matching a live simulator. Without it frames come as fast as
    /// they can be read.
    pub fn with_frame_interval(mut self, interval: Duration) -> ReplayClient<R> {
        self.frame_interval = Some(interval);
        return self;
    }

    pub fn frames_served(&self) -> u64 {
        self.frames_served
    }

    pub fn commands_received(&self) -> u64 {
        self.commands_received
    }

    fn ensure_open(&self) -> Result<(), ConnectionError> {
        if self.closed {
            return Err(ConnectionError::Closed);
        }
        return Ok(());
    }

    fn pace(&mut self) {
        if let (Some(interval), Some(last)) = (self.frame_interval, self.last_frame_at) {
            let wait = interval.saturating_sub(last.elapsed());
            if !wait.is_zero() {
                thread::sleep(wait);
            }
        }
        self.last_frame_at = Some(Instant::now());
    }

    /// Fills `buf` as far as the reader allows, returning how much was
    /// read. Short only at the end of the recording.
    fn read_up_to(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        return Ok(filled);
    }
}

impl<R: Read> SimClient for ReplayClient<R> {
    fn send(&mut self, message: &OutgoingMessage) -> Result<(), ConnectionError> {
        self.ensure_open()?;
        match message {
            OutgoingMessage::Start(start) => {
                info!(
                    "replay started ({}x{} at {} Hz requested)",
                    start.frame_width, start.frame_height, start.rate_hz
                );
                self.started = true;
            }
            OutgoingMessage::Commands(command) => {
                if !self.started {
                    return Err(ConnectionError::Protocol(
                        "commands sent before start".to_string(),
                    ));
                }
                self.commands_received += 1;
                trace!("command {command:?}");
            }
            OutgoingMessage::Stop => {
                debug!("replay stopped");
                self.started = false;
            }
        }
        return Ok(());
    }

    fn receive(&mut self) -> Result<FrameMessage, ConnectionError> {
        self.ensure_open()?;
        if !self.started {
            return Err(ConnectionError::Protocol(
                "receive before start".to_string(),
            ));
        }
        self.pace();

        let mut header_buf = [0u8; RECORD_HEADER_SIZE];
        let got = self.read_up_to(&mut header_buf)?;
        if got == 0 {
            info!("end of recording after {} frames", self.frames_served);
            return Err(ConnectionError::Disconnected);
        }
        let header = parse_record_header(&header_buf[..got])
            .map_err(|err| ConnectionError::Protocol(err.to_string()))?;

        let mut payload = vec![0u8; header.payload_size as usize];
        let got = self.read_up_to(&mut payload)?;
        if got < payload.len() {
            return Err(ConnectionError::Protocol(format!(
                "recording ends {got} bytes into a {} byte frame",
                payload.len()
            )));
        }

        if max_level() >= LevelFilter::Trace {
            trace!("replaying record {header:?}");
        }
        self.frames_served += 1;
        return Ok(FrameMessage {
            seq_id: header.seq_id.value(),
            width: header.width,
            height: header.height,
            format: header.format,
            payload: payload,
        });
    }

    fn close(&mut self) -> Result<(), ConnectionError> {
        self.ensure_open()?;
        self.closed = true;
        info!(
            "replay closed after {} frames and {} commands",
            self.frames_served, self.commands_received
        );
        return Ok(());
    }
}
