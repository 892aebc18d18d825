//! In-memory transport over std mpsc channels.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{Result, SondaError};

use super::{Inbound, Request, Transport};

/// Client half of [`channel_pair`].
///
/// Useful for loopback wiring and tests; production deployments plug a
/// real connection in behind [`Transport`] instead.
pub struct ChannelTransport {
    outbound: Sender<Request>,
    inbound: Mutex<Receiver<Inbound>>,
}

/// Server half of [`channel_pair`]: drives the client side in tests.
pub struct ChannelPeer {
    /// Requests sent by the client side.
    pub requests: Receiver<Request>,
    /// Feeds inbound frames to the client side. Dropping it closes the
    /// transport.
    pub frames: Sender<Inbound>,
}

/// Creates a connected in-memory transport pair.
pub fn channel_pair() -> (ChannelTransport, ChannelPeer) {
    let (outbound, requests) = mpsc::channel();
    let (frames, inbound) = mpsc::channel();
    (
        ChannelTransport {
            outbound,
            inbound: Mutex::new(inbound),
        },
        ChannelPeer { requests, frames },
    )
}

impl Transport for ChannelTransport {
    fn send(&self, frame: Request) -> Result<()> {
        self.outbound
            .send(frame)
            .map_err(|_| SondaError::TransportClosed)
    }

    fn recv_timeout(&self, timeout: Duration) -> Result<Option<Inbound>> {
        match self.inbound.lock().recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(SondaError::TransportClosed),
        }
    }
}
