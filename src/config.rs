// Copyright 2024 the vpilot-drive contributors
// SPDX-License-Identifier: MPL-2.0

use std::time::Duration;

use thiserror::Error;

use crate::messages::{Scenario, StartMessage};
use crate::{
    DEFAULT_HOST, DEFAULT_PORT, DEFAULT_RUN_TIME, FRAME_HEIGHT, FRAME_RATE_HZ, FRAME_WIDTH,
    MAX_RUN_TIME,
};

pub const ENV_HOST: &str = "VPILOT_HOST";
pub const ENV_PORT: &str = "VPILOT_PORT";
pub const ENV_RUN_SECS: &str = "VPILOT_RUN_SECS";
pub const ENV_CONTROLLER_TIMEOUT_MS: &str = "VPILOT_CONTROLLER_TIMEOUT_MS";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got {value:?}")]
    Invalid {
        name: &'static str,
        value: String,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DriveConfig {
    /// Where the simulator is running. Passed to the connector as-is.
    pub host: String,
    pub port: u16,
    /// How long a drive may run before it stops by itself.
    pub run_time: Duration,
    pub frame_width: u16,
    pub frame_height: u16,
    pub frame_rate_hz: u32,
    pub scenario: Scenario,
    /// When set, the model gets this long per frame before we brake
    /// instead.
    pub controller_timeout: Option<Duration>,
}

impl Default for DriveConfig {
    fn default() -> DriveConfig {
        return DriveConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            run_time: DEFAULT_RUN_TIME,
            frame_width: FRAME_WIDTH,
            frame_height: FRAME_HEIGHT,
            frame_rate_hz: FRAME_RATE_HZ,
            scenario: Scenario::default(),
            controller_timeout: None,
        };
    }
}

impl DriveConfig {
    pub fn from_env() -> Result<DriveConfig, ConfigError> {
        DriveConfig::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from the defaults, overridden by whatever `lookup`
    /// returns for the `VPILOT_*` variables.
    pub fn from_lookup<F>(lookup: F) -> Result<DriveConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = DriveConfig::default();

        if let Some(host) = lookup(ENV_HOST) {
            if host.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    name: ENV_HOST,
                    value: host,
                    expected: "a host name or address",
                });
            }
            config.host = host.trim().to_string();
        }
        if let Some(port) = lookup(ENV_PORT) {
            config.port = match port.trim().parse::<u16>() {
                Ok(port) if port != 0 => port,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: ENV_PORT,
                        value: port,
                        expected: "a port number between 1 and 65535",
                    })
                }
            };
        }
        if let Some(secs) = lookup(ENV_RUN_SECS) {
            let parsed = parse_positive(ENV_RUN_SECS, secs.clone())?;
            if parsed > MAX_RUN_TIME.as_secs() {
                return Err(ConfigError::Invalid {
                    name: ENV_RUN_SECS,
                    value: secs,
                    expected: "a whole number of seconds up to one year",
                });
            }
            config.run_time = Duration::from_secs(parsed);
        }
        if let Some(millis) = lookup(ENV_CONTROLLER_TIMEOUT_MS) {
            let millis = parse_positive(ENV_CONTROLLER_TIMEOUT_MS, millis)?;
            config.controller_timeout = Some(Duration::from_millis(millis));
        }

        return Ok(config);
    }

    /// The request we open every drive with.
    pub fn start_message(&self) -> StartMessage {
        return StartMessage {
            scenario: self.scenario,
            frame_width: self.frame_width,
            frame_height: self.frame_height,
            rate_hz: self.frame_rate_hz,
        };
    }

    /// Time between frames at the configured rate.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.frame_rate_hz.max(1)
    }
}

fn parse_positive(name: &'static str, value: String) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(ConfigError::Invalid {
            name: name,
            value: value,
            expected: "a positive whole number",
        }),
    }
}
