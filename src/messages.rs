// Copyright 2024 the vpilot-drive contributors
// SPDX-License-Identifier: MPL-2.0

use crate::frame::PixelFormat;
use crate::{FRAME_HEIGHT, FRAME_RATE_HZ, FRAME_WIDTH};

/// What we tell the car to do for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlCommand {
    /// 0.0 (none) to 1.0 (full)
    pub throttle: f32,
    /// 0.0 (none) to 1.0 (full)
    pub brake: f32,
    /// -1.0 (full left) to 1.0 (full right)
    pub steering: f32,
}

impl ControlCommand {
    /// Full brake, no throttle, wheels straight.
    pub const SAFE_DEFAULT: ControlCommand = ControlCommand::new(0.0, 1.0, 0.0);

    pub const fn new(throttle: f32, brake: f32, steering: f32) -> ControlCommand {
        return ControlCommand {
            throttle: throttle,
            brake: brake,
            steering: steering,
        };
    }

    pub fn is_finite(&self) -> bool {
        self.throttle.is_finite() && self.brake.is_finite() && self.steering.is_finite()
    }

    pub fn clamped(&self) -> ControlCommand {
        return ControlCommand {
            throttle: self.throttle.clamp(0.0, 1.0),
            brake: self.brake.clamp(0.0, 1.0),
            steering: self.steering.clamp(-1.0, 1.0),
        };
    }
}

impl From<(f32, f32, f32)> for ControlCommand {
    fn from((throttle, brake, steering): (f32, f32, f32)) -> ControlCommand {
        ControlCommand::new(throttle, brake, steering)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DrivingMode {
    /// The simulator leaves the car to our commands.
    #[default]
    Manual,
    /// The simulator's own AI drives, capped at max_speed (m/s).
    Autopilot { max_speed: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Scenario {
    pub driving_mode: DrivingMode,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StartMessage {
    pub scenario: Scenario,
    pub frame_width: u16,
    pub frame_height: u16,
    pub rate_hz: u32,
}

impl Default for StartMessage {
    fn default() -> StartMessage {
        return StartMessage {
            scenario: Scenario::default(),
            frame_width: FRAME_WIDTH,
            frame_height: FRAME_HEIGHT,
            rate_hz: FRAME_RATE_HZ,
        };
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutgoingMessage {
    Start(StartMessage),
    Commands(ControlCommand),
    Stop,
}

/// One camera frame as it comes off the connection, before we've
/// checked that the payload actually matches its dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameMessage {
    pub seq_id: u16,
    pub width: u16,
    pub height: u16,
    pub format: PixelFormat,
    pub payload: Vec<u8>,
}
