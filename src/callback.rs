//! Caller-supplied delivery capabilities.

use serde_json::Value;
use tracing::{debug, error, info};

use crate::error::ServerError;
use crate::handle::QueryHandle;

/// Capability supplied by the caller when a statement is built.
///
/// Both operations run while the owning handle's signal lock is held, so
/// invocations for one handle are serialized and observed in dispatch
/// order. Implementations must complete quickly and must not re-enter the
/// same handle's wait path, which would self-deadlock. Push long-running
/// work to another thread through a channel instead. Handle accessors
/// (`call_count`, `last_msg_id`, statement fields) are safe to call from
/// inside either operation.
pub trait QueryCallback: Send + Sync {
    /// One delivered result, or a result-channel error, for `handle`.
    ///
    /// At most one of `result` and `error` is `Some`. An error here does
    /// not terminate the subscription by itself; [`on_done`] is the only
    /// terminal signal.
    ///
    /// [`on_done`]: QueryCallback::on_done
    fn on_result(&self, handle: &QueryHandle, result: Option<&Value>, error: Option<&ServerError>);

    /// Terminal notification: no further results will arrive for `handle`.
    fn on_done(&self, handle: &QueryHandle);
}

/// Callback that reports every delivery through `tracing`.
///
/// Useful as the dispatcher's default callback for orphaned messages, and
/// anywhere results only need to be seen rather than consumed.
#[derive(Debug, Default, Clone, Copy)]
pub struct TraceCallback;

impl QueryCallback for TraceCallback {
    fn on_result(&self, handle: &QueryHandle, result: Option<&Value>, error: Option<&ServerError>) {
        match (result, error) {
            (_, Some(err)) => error!(id = %handle.id(), %err, "query error"),
            (Some(value), None) => {
                info!(id = %handle.id(), count = handle.call_count(), %value, "query result");
            }
            (None, None) => debug!(id = %handle.id(), "empty delivery"),
        }
    }

    fn on_done(&self, handle: &QueryHandle) {
        info!(id = %handle.id(), count = handle.call_count(), "query done");
    }
}
