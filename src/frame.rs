// Copyright 2024 the vpilot-drive contributors
// SPDX-License-Identifier: MPL-2.0

use std::sync::Arc;

use thiserror::Error;

use crate::messages::FrameMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// What the simulator sends: blue, green, red, one byte each.
    Bgr8,
    Rgb8,
    Gray8,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Bgr8 | PixelFormat::Rgb8 => 3,
            PixelFormat::Gray8 => 1,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("frame has no pixels ({width}x{height})")]
    EmptyDimensions { width: usize, height: usize },
    #[error("frame payload is {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },
}

/// One decoded camera image, laid out row-major with interleaved
/// channels (height x width x channel).
///
/// The pixel buffer is shared and never written after construction, so
/// cloning a frame to hand it to a renderer is cheap and the renderer can
/// never observe a half-updated image.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    width: usize,
    height: usize,
    format: PixelFormat,
    data: Arc<[u8]>,
}

impl Frame {
    pub fn new(
        width: usize,
        height: usize,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Frame, DecodeError> {
        if width == 0 || height == 0 {
            return Err(DecodeError::EmptyDimensions { width, height });
        }
        let expected = width * height * format.channels();
        if data.len() != expected {
            return Err(DecodeError::SizeMismatch {
                expected: expected,
                actual: data.len(),
            });
        }
        return Ok(Frame {
            width: width,
            height: height,
            format: format,
            data: data.into(),
        });
    }

    /// Turns the raw payload of a simulator message into a frame. The
    /// payload must hold exactly width * height * channels bytes; we
    /// don't pad or truncate.
    pub fn decode(message: FrameMessage) -> Result<Frame, DecodeError> {
        return Frame::new(
            message.width as usize,
            message.height as usize,
            message.format,
            message.payload,
        );
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn channels(&self) -> usize {
        self.format.channels()
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// The channel values of a single pixel, or None when out of bounds.
    pub fn pixel(&self, row: usize, col: usize) -> Option<&[u8]> {
        if row >= self.height || col >= self.width {
            return None;
        }
        let channels = self.channels();
        let start = (row * self.width + col) * channels;
        return Some(&self.data[start..start + channels]);
    }

    /// Mean of all samples, handy as a cheap summary of what the camera
    /// is looking at.
    pub fn mean_intensity(&self) -> f32 {
        let sum: u64 = self.data.iter().map(|&sample| sample as u64).sum();
        return sum as f32 / self.data.len() as f32;
    }

    /// Returns the frame in RGB order. BGR frames get their red and blue
    /// channels swapped, RGB frames are shared as-is and gray frames are
    /// expanded to three equal channels.
    pub fn to_rgb(&self) -> Frame {
        let data: Vec<u8> = match self.format {
            PixelFormat::Rgb8 => return self.clone(),
            PixelFormat::Bgr8 => self
                .data
                .chunks_exact(3)
                .flat_map(|bgr| [bgr[2], bgr[1], bgr[0]])
                .collect(),
            PixelFormat::Gray8 => self.data.iter().flat_map(|&g| [g, g, g]).collect(),
        };
        return Frame {
            width: self.width,
            height: self.height,
            format: PixelFormat::Rgb8,
            data: data.into(),
        };
    }
}
