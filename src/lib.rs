//! Sonda: asynchronous query client for event-analytics services.
//!
//! Callers build a [`Statement`] (query text plus a [`QueryCallback`]),
//! submit it through a [`QueryDispatcher`] connected over a [`Transport`],
//! and get back a [`QueryHandle`]: the unit of waiting, counting,
//! cancellation, and identity for that subscription. Results are pushed
//! from the dispatcher's receiver thread into the callback; handle
//! waiters are woken on every delivery and on completion.
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use sonda::{channel_pair, QueryDispatcher, Statement, TraceCallback};
//!
//! let (transport, peer) = channel_pair();
//! let dispatcher = QueryDispatcher::connect(Arc::new(transport));
//!
//! let statement = Statement::builder(
//!     "subscribe to events where severity > 'INFO'",
//!     Arc::new(TraceCallback),
//! )
//! .max_rows(50)
//! .build();
//! let handle = dispatcher.submit(statement)?;
//!
//! // The peer end would normally be a live connection; with nothing
//! // arriving, a bounded wait simply times out.
//! assert!(!handle.wait_result_for(Duration::from_millis(10)));
//! assert_eq!(handle.call_count(), 0);
//! handle.close()?;
//! # drop(peer);
//! # Ok::<(), sonda::SondaError>(())
//! ```

#![warn(missing_docs)]

mod callback;
mod config;
mod dispatch;
mod error;
mod handle;
mod statement;
pub mod transport;

pub use callback::{QueryCallback, TraceCallback};
pub use config::{ClientConfig, DEFAULT_DATE_RANGE, DEFAULT_MAX_ROWS, DEFAULT_REPO};
pub use dispatch::{Dispatch, QueryDispatcher};
pub use error::{Result, ServerError, SondaError};
pub use handle::QueryHandle;
pub use statement::{is_subscribe_text, Statement, StatementBuilder, SUB_ID_PREFIX};
pub use transport::{channel_pair, ChannelPeer, ChannelTransport, Inbound, Request, Transport};
