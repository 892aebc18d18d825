//! Transport seam between the dispatcher and the wire.
//!
//! Concrete transports own framing, reconnects, and authentication; this
//! module only fixes the in-process frame model and the blocking
//! send/receive contract the dispatcher's receiver thread is built on.

mod channel;

pub use channel::{channel_pair, ChannelPeer, ChannelTransport};

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, ServerError};

/// Outbound request frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Request {
    /// Submit (or re-submit) a query under `id`.
    Query {
        /// Client-side identifier the server must echo in responses.
        id: String,
        /// The query text.
        query: String,
        /// Time zone for date interpretation.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        time_zone: Option<String>,
        /// Date range the query applies to.
        date_range: String,
        /// Repository id; empty selects the token's home repository.
        repo_id: String,
        /// Referrer name recorded with the query.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        referrer: Option<String>,
        /// Row cap for responses.
        max_rows: u32,
        /// Request server-side tracing.
        trace: bool,
    },
    /// Stop the subscription addressed by `id`, the last known message
    /// id (the server-assigned one once an ack has arrived).
    Cancel {
        /// Subscription address.
        id: String,
    },
}

/// Inbound frames, resolved to handles by message id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Inbound {
    /// The server accepted `id` and assigned its own message id; frames
    /// that follow are addressed to `msg_id`.
    Ack {
        /// Client-side identifier from the originating request.
        id: String,
        /// Server-assigned message id.
        msg_id: String,
    },
    /// One result for the subscription addressed by `msg_id`.
    Response {
        /// Subscription address.
        msg_id: String,
        /// Result payload.
        payload: Value,
    },
    /// Remote execution failure on the result channel. Not terminal.
    Error {
        /// Subscription address.
        msg_id: String,
        /// The failure.
        error: ServerError,
    },
    /// Terminal frame: no further results for `msg_id`.
    Done {
        /// Subscription address.
        msg_id: String,
    },
}

/// Blocking frame transport.
///
/// `recv_timeout` is polled from a single receiver thread; `send` may be
/// called from any thread.
pub trait Transport: Send + Sync {
    /// Queues one outbound frame.
    fn send(&self, frame: Request) -> Result<()>;

    /// Waits up to `timeout` for the next inbound frame.
    ///
    /// `Ok(None)` means the timeout elapsed with the connection still
    /// healthy; [`SondaError::TransportClosed`] means no more frames will
    /// ever arrive.
    ///
    /// [`SondaError::TransportClosed`]: crate::SondaError::TransportClosed
    fn recv_timeout(&self, timeout: Duration) -> Result<Option<Inbound>>;
}
