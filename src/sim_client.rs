// Copyright 2024 the vpilot-drive contributors
// SPDX-License-Identifier: MPL-2.0

use thiserror::Error;

use crate::messages::{FrameMessage, OutgoingMessage};

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("could not connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        source: std::io::Error,
    },
    #[error("connection failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("simulator closed the connection")]
    Disconnected,
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("client is already closed")]
    Closed,
}

/// A connection to the driving simulator.
///
/// `receive` blocks until one whole frame message is available. It must
/// return an error when the connection goes away rather than block
/// forever, because the drive loop has no other way to notice.
pub trait SimClient {
    fn send(&mut self, message: &OutgoingMessage) -> Result<(), ConnectionError>;
    fn receive(&mut self) -> Result<FrameMessage, ConnectionError>;
    fn close(&mut self) -> Result<(), ConnectionError>;
}

impl<T: SimClient + ?Sized> SimClient for Box<T> {
    fn send(&mut self, message: &OutgoingMessage) -> Result<(), ConnectionError> {
        (**self).send(message)
    }

    fn receive(&mut self) -> Result<FrameMessage, ConnectionError> {
        (**self).receive()
    }

    fn close(&mut self) -> Result<(), ConnectionError> {
        (**self).close()
    }
}

/// Opens simulator connections. Host and port come straight from the
/// drive configuration.
pub trait Connector {
    type Client: SimClient;

    fn open(&self, host: &str, port: u16) -> Result<Self::Client, ConnectionError>;
}

impl<F, C> Connector for F
where
    F: Fn(&str, u16) -> Result<C, ConnectionError>,
    C: SimClient,
{
    type Client = C;

    fn open(&self, host: &str, port: u16) -> Result<C, ConnectionError> {
        self(host, port)
    }
}
