// Copyright 2024 the vpilot-drive contributors
// SPDX-License-Identifier: MPL-2.0

//! The start/stop surface a front end talks to.
//!
//! Everything here runs on the presentation side and never blocks,
//! except [`DriveControl::stop`], which waits for the worker like a
//! stop button that only re-enables start once the drive is really over.

use log::{debug, error, info, warn};

use crate::config::DriveConfig;
use crate::controller::Controller;
use crate::drive_loop::RunSummary;
use crate::error::DriveError;
use crate::frame::Frame;
use crate::observer::{ChannelObserver, DriveEvent, Observer, ObserverReceiver};
use crate::sim_client::Connector;
use crate::worker::DriveHandle;

pub struct DriveControl {
    observer: ChannelObserver,
    receiver: ObserverReceiver,
    active: Option<DriveHandle>,
    next_worker_id: usize,
    latest_frame: Option<Frame>,
    last_summary: Option<RunSummary>,
}

impl DriveControl {
    pub fn new() -> DriveControl {
        let (observer, receiver) = ChannelObserver::new();
        return DriveControl {
            observer: observer,
            receiver: receiver,
            active: None,
            next_worker_id: 0,
            latest_frame: None,
            last_summary: None,
        };
    }

    /// Starts a new drive. Only one may run at a time.
    pub fn start<K, C>(
        &mut self,
        config: &DriveConfig,
        connector: K,
        controller: C,
    ) -> Result<usize, DriveError>
    where
        K: Connector + Send + 'static,
        C: Controller + Send + 'static,
    {
        if let Some(active) = &self.active {
            return Err(DriveError::AlreadyRunning(active.worker_id()));
        }

        let worker_id = self.next_worker_id;
        let handle = DriveHandle::spawn(
            worker_id,
            config,
            connector,
            controller,
            self.observer.clone(),
        )?;
        self.next_worker_id += 1;
        self.active = Some(handle);
        info!("started worker #{worker_id}");
        return Ok(worker_id);
    }

    /// Asks the running drive to stop. Returns right away; the worker
    /// reports Done once it has actually stopped.
    pub fn cancel(&mut self) {
        if let Some(active) = &self.active {
            if active.cancel() {
                let message = format!("Worker #{} notified to abort", active.worker_id());
                self.observer.on_message(&message);
            }
        }
    }

    /// Cancels the running drive and waits for it to wind down.
    pub fn stop(&mut self) -> Option<RunSummary> {
        self.cancel();
        let active = self.active.take()?;
        self.store_summary(active);
        return self.last_summary.take();
    }

    /// Drains whatever the worker reported since the last call, without
    /// waiting. Frames are not returned; only the newest is kept, see
    /// [`DriveControl::latest_frame`].
    pub fn poll(&mut self) -> Vec<DriveEvent> {
        // Events first: any frame sent before a Done we collect here is
        // then already waiting in the frame channel.
        let events: Vec<DriveEvent> = self.receiver.events.try_iter().collect();
        while let Ok(frame) = self.receiver.frames.try_recv() {
            self.latest_frame = Some(frame);
        }

        for event in &events {
            match event {
                DriveEvent::Done { worker_id } => self.reap(*worker_id),
                DriveEvent::Error(reason) => debug!("worker reported: {reason}"),
                _ => {}
            }
        }
        return events;
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    pub fn can_start(&self) -> bool {
        !self.is_running()
    }

    pub fn can_stop(&self) -> bool {
        self.is_running()
    }

    pub fn latest_frame(&self) -> Option<&Frame> {
        self.latest_frame.as_ref()
    }

    /// The summary of the last drive that ended on its own, if it hasn't
    /// been taken yet.
    pub fn take_summary(&mut self) -> Option<RunSummary> {
        self.last_summary.take()
    }

    fn reap(&mut self, worker_id: usize) {
        match self.active.take() {
            Some(active) if active.worker_id() == worker_id => self.store_summary(active),
            other => {
                // A Done from a worker we already stopped and joined.
                self.active = other;
            }
        }
    }

    fn store_summary(&mut self, active: DriveHandle) {
        let worker_id = active.worker_id();
        match active.join() {
            Ok(summary) => {
                info!(
                    "worker #{worker_id} done after {} steps ({:?})",
                    summary.iterations, summary.exit
                );
                self.last_summary = Some(summary);
            }
            Err(err) => error!("{err}"),
        }
    }
}

impl Default for DriveControl {
    fn default() -> DriveControl {
        DriveControl::new()
    }
}

impl Drop for DriveControl {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            warn!("worker #{} still running, stopping it", active.worker_id());
            active.cancel();
            // DriveHandle's own drop joins it.
        }
    }
}
