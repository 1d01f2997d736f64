// Copyright 2024 the vpilot-drive contributors
// SPDX-License-Identifier: MPL-2.0

// Drives the recording in ./recorded_frames as if it were a live
// simulator, logging what a GUI would show. Ctrl-C stops the drive.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};
use vpilot_drive_lib::config::DriveConfig;
use vpilot_drive_lib::control::DriveControl;
use vpilot_drive_lib::controller::{ConstantController, DeadlineController};
use vpilot_drive_lib::drive_loop::ExitReason;
use vpilot_drive_lib::error::DriveError;
use vpilot_drive_lib::frame::Frame;
use vpilot_drive_lib::observer::DriveEvent;
use vpilot_drive_lib::recording::ReplayClient;
use vpilot_drive_lib::sim_client::ConnectionError;

const RECORDING_PATH: &str = "recorded_frames";

// About one screen refresh.
const TICK: Duration = Duration::from_millis(16);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    simple_logger::init_with_env()?;

    let config = DriveConfig::from_env()?;
    let mut control = DriveControl::new();

    let stop_requested = Arc::new(AtomicBool::new(false));
    let stop_for_ctrlc = stop_requested.clone();
    ctrlc::set_handler(move || {
        stop_for_ctrlc.store(true, Ordering::SeqCst);
    })?;

    let frame_interval = config.frame_interval();
    let connector = move |host: &str, port: u16| -> Result<_, ConnectionError> {
        info!("using {RECORDING_PATH} in place of a simulator at {host}:{port}");
        let client = ReplayClient::open(RECORDING_PATH)?;
        Ok(client.with_frame_interval(frame_interval))
    };

    let worker_id = match config.controller_timeout {
        Some(timeout) => {
            let model = DeadlineController::spawn(ConstantController::default(), timeout)
                .map_err(DriveError::Spawn)?;
            control.start(&config, connector, model)?
        }
        None => control.start(&config, connector, ConstantController::default())?,
    };
    info!("worker #{worker_id} started, Ctrl-C to stop");

    while control.is_running() {
        if stop_requested.swap(false, Ordering::SeqCst) {
            control.cancel();
        }

        for event in control.poll() {
            match event {
                DriveEvent::Message(message) => info!("{message}"),
                DriveEvent::Step {
                    worker_id,
                    description,
                } => {
                    if let Some(frame) = control.latest_frame() {
                        debug!("#{worker_id} {description}: {}", describe(frame));
                    }
                }
                DriveEvent::Error(reason) => error!("{reason}"),
                DriveEvent::Done { worker_id } => info!("worker #{worker_id} done"),
            }
        }

        thread::sleep(TICK);
    }

    if let Some(summary) = control.take_summary() {
        match summary.exit {
            ExitReason::Failed(DriveError::Connection(ConnectionError::Disconnected)) => {
                info!("recording finished after {} steps", summary.iterations)
            }
            ExitReason::Failed(err) => warn!("drive failed after {} steps: {err}", summary.iterations),
            exit => info!("drive ended ({exit:?}) after {} steps", summary.iterations),
        }
        if summary.controller_faults > 0 {
            warn!("braked on {} frames the model couldn't answer", summary.controller_faults);
        }
    }
    Ok(())
}

fn describe(frame: &Frame) -> String {
    let rgb = frame.to_rgb();
    let centre = rgb
        .pixel(rgb.height() / 2, rgb.width() / 2)
        .map(|p| format!("{:02x}{:02x}{:02x}", p[0], p[1], p[2]))
        .unwrap_or_default();
    return format!(
        "{}x{} mean {:.1} centre #{centre}",
        rgb.width(),
        rgb.height(),
        rgb.mean_intensity()
    );
}
