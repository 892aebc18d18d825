use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, SondaError>;

/// Local failures raised by the client core.
///
/// Every variant is a synchronous failure of the call that triggered it;
/// remote query execution failures travel through the result channel as
/// [`ServerError`] instead.
#[derive(Debug, Error)]
pub enum SondaError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("transport closed")]
    TransportClosed,
    #[error("dispatcher detached")]
    Detached,
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
}

/// Remote query execution failure, delivered through the result channel.
///
/// Not a local fault: a handle that receives one of these may still see
/// further results, and the subscription only ends with its completion
/// event.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("query failed: {message}")]
pub struct ServerError {
    /// Server-supplied failure message.
    pub message: String,
    /// Server-side error code, when one was reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
}

impl ServerError {
    /// Failure with a message and no code.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Failure with a message and a server-side code.
    pub fn with_code(message: impl Into<String>, code: i64) -> Self {
        Self {
            message: message.into(),
            code: Some(code),
        }
    }
}
