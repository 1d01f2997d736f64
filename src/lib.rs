use std::time::Duration;

pub mod config;
pub mod control;
pub mod controller;
pub mod drive_loop;
pub mod error;
pub mod frame;
pub mod messages;
pub mod observer;
pub mod recording;
pub mod sim_client;
pub mod worker;

/// Width of the frames we ask the simulator for.
pub const FRAME_WIDTH: u16 = 320;

/// Height of the frames we ask the simulator for.
pub const FRAME_HEIGHT: u16 = 160;

/// The simulator only sends frames at this rate when asked for the
/// default dataset.
pub const FRAME_RATE_HZ: u32 = 10;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8000;

/// How long a drive runs when nobody stops it. 80 hours is far longer
/// than any session we actually run, so in practice this only bounds a
/// forgotten worker.
pub const DEFAULT_RUN_TIME: Duration = Duration::from_secs(80 * 3600);

/// The longest drive we accept. Longer run times are refused by the
/// config and cut down to this by the worker.
pub const MAX_RUN_TIME: Duration = Duration::from_secs(365 * 24 * 3600);
