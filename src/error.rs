// Copyright 2024 the vpilot-drive contributors
// SPDX-License-Identifier: MPL-2.0

use thiserror::Error;

use crate::config::ConfigError;
use crate::frame::DecodeError;
use crate::sim_client::ConnectionError;

/// Why a drive stopped early, or why one couldn't be started.
#[derive(Debug, Error)]
pub enum DriveError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error("could not decode frame: {0}")]
    Decode(#[from] DecodeError),
    #[error("worker #{0} is still running")]
    AlreadyRunning(usize),
    #[error("worker #{0} panicked")]
    WorkerPanicked(usize),
    #[error("could not spawn worker thread: {0}")]
    Spawn(std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
