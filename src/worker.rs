// Copyright 2024 the vpilot-drive contributors
// SPDX-License-Identifier: MPL-2.0

use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use log::{error, info};

use crate::config::DriveConfig;
use crate::controller::Controller;
use crate::drive_loop::{self, ExitReason, LoopState, RunSummary};
use crate::error::DriveError;
use crate::messages::OutgoingMessage;
use crate::observer::Observer;
use crate::sim_client::{Connector, SimClient};
use crate::MAX_RUN_TIME;

/// A drive loop running on its own thread.
pub struct DriveHandle {
    worker_id: usize,
    state: LoopState,
    thread: Option<JoinHandle<RunSummary>>,
}

impl DriveHandle {
    /// Starts a worker thread that connects to the simulator, asks it to
    /// start, and drives until `config.run_time` has passed or it is
    /// cancelled. Connecting happens on the worker so a slow server never
    /// holds up the caller.
    pub fn spawn<K, C, O>(
        worker_id: usize,
        config: &DriveConfig,
        connector: K,
        mut controller: C,
        mut observer: O,
    ) -> Result<DriveHandle, DriveError>
    where
        K: Connector + Send + 'static,
        C: Controller + Send + 'static,
        O: Observer + Send + 'static,
    {
        let state = LoopState::new();
        let worker_state = state.clone();
        let config = config.clone();
        let thread_name = format!("drive_{worker_id}");

        let thread = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    drive(
                        worker_id,
                        &thread_name,
                        &config,
                        connector,
                        &mut controller,
                        &mut observer,
                        &worker_state,
                    )
                }));
                match outcome {
                    Ok(summary) => summary,
                    Err(payload) => {
                        // The client went down with the panic, so there is
                        // nothing left to stop. Still tell the observer.
                        error!(
                            "worker #{worker_id} {}",
                            drive_loop::panic_reason(payload.as_ref())
                        );
                        let err = DriveError::WorkerPanicked(worker_id);
                        drive_loop::finish::<K::Client, O>(
                            worker_id,
                            None,
                            &mut observer,
                            Some(&err),
                        );
                        failed(err)
                    }
                }
            })
            .map_err(DriveError::Spawn)?;

        return Ok(DriveHandle {
            worker_id: worker_id,
            state: state,
            thread: Some(thread),
        });
    }

    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// Asks the worker to stop after its current iteration. Does not
    /// wait; use [`DriveHandle::join`] for that. Returns whether this
    /// call was the one that asked.
    pub fn cancel(&self) -> bool {
        let was_running = self.state.is_running() && !self.is_finished();
        if was_running {
            info!("worker #{} notified to abort", self.worker_id);
        }
        self.state.cancel();
        return was_running;
    }

    pub fn is_finished(&self) -> bool {
        match &self.thread {
            Some(thread) => thread.is_finished(),
            None => true,
        }
    }

    /// Waits for the worker to finish. Blocks for up to one full
    /// iteration after a cancel.
    pub fn join(mut self) -> Result<RunSummary, DriveError> {
        self.join_thread()
    }

    fn join_thread(&mut self) -> Result<RunSummary, DriveError> {
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| DriveError::WorkerPanicked(self.worker_id)),
            None => Err(DriveError::WorkerPanicked(self.worker_id)),
        }
    }
}

impl Drop for DriveHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.state.cancel();
            let _ = self.join_thread();
        }
    }
}

/// Everything a worker does, from connecting to the final `on_done`.
fn drive<K, C, O>(
    worker_id: usize,
    thread_name: &str,
    config: &DriveConfig,
    connector: K,
    controller: &mut C,
    observer: &mut O,
    state: &LoopState,
) -> RunSummary
where
    K: Connector,
    C: Controller,
    O: Observer,
{
    observer.on_message(&format!(
        "Running worker #{worker_id} from thread \"{thread_name}\""
    ));
    let deadline = Instant::now() + config.run_time.min(MAX_RUN_TIME);

    let mut client = match connector.open(&config.host, config.port) {
        Ok(client) => client,
        Err(err) => {
            let err = DriveError::from(err);
            drive_loop::finish::<K::Client, O>(worker_id, None, observer, Some(&err));
            return failed(err);
        }
    };
    info!(
        "worker #{worker_id} connected to {}:{}",
        config.host, config.port
    );

    let start = OutgoingMessage::Start(config.start_message());
    if let Err(err) = client.send(&start) {
        let err = DriveError::from(err);
        drive_loop::finish(worker_id, Some(&mut client), observer, Some(&err));
        return failed(err);
    }

    drive_loop::run(worker_id, client, controller, observer, deadline, state)
}

fn failed(err: DriveError) -> RunSummary {
    return RunSummary {
        iterations: 0,
        controller_faults: 0,
        exit: ExitReason::Failed(err),
    };
}
