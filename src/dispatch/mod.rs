//! Query dispatch: registry ownership, frame routing, and the receiver
//! thread.

mod registry;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::callback::QueryCallback;
use crate::error::{Result, SondaError};
use crate::handle::QueryHandle;
use crate::statement::{Statement, SUB_ID_PREFIX};
use crate::transport::{Inbound, Request, Transport};

use registry::HandleRegistry;

/// Dispatcher operations a handle delegates to.
///
/// Handles hold this seam weakly: once the dispatcher is gone, delegation
/// fails with [`SondaError::Detached`] instead of keeping the connection
/// alive.
pub trait Dispatch: Send + Sync {
    /// (Re)submits the handle's query.
    fn call_async(&self, handle: &Arc<QueryHandle>) -> Result<()>;

    /// Submits a cancel for the handle's subscription. Advisory: results
    /// already in flight are still delivered until completion arrives.
    fn cancel_async(&self, handle: &Arc<QueryHandle>) -> Result<()>;

    /// Tears down the handle's registration.
    fn close(&self, handle: &Arc<QueryHandle>) -> Result<()>;
}

// Idle poll interval for the receiver thread; bounds how long shutdown
// and dispatcher drop can lag behind the flag.
const RECV_POLL: Duration = Duration::from_millis(100);

/// Owns the transport and the id → handle registry; routes every inbound
/// frame to the handle it belongs to.
///
/// One receiver thread drains the transport. Deliveries for different
/// handles may interleave freely; deliveries for one handle are
/// serialized by that handle's own lock.
pub struct QueryDispatcher {
    transport: Arc<dyn Transport>,
    registry: HandleRegistry,
    orphan: Option<Arc<QueryHandle>>,
    receiver: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl QueryDispatcher {
    /// Connects over `transport` and starts the receiver thread.
    pub fn connect(transport: Arc<dyn Transport>) -> Arc<Self> {
        Self::connect_with(transport, None)
    }

    /// Like [`connect`], with a default callback that receives frames
    /// whose message id matches no registered handle.
    ///
    /// [`connect`]: QueryDispatcher::connect
    pub fn connect_with(
        transport: Arc<dyn Transport>,
        default_callback: Option<Arc<dyn QueryCallback>>,
    ) -> Arc<Self> {
        let dispatcher = Arc::new_cyclic(|weak: &Weak<QueryDispatcher>| {
            let orphan = default_callback.map(|callback| {
                let statement = Statement::builder("", callback)
                    .id(format!("{SUB_ID_PREFIX}orphan"))
                    .build();
                let dispatch: Weak<dyn Dispatch> = weak.clone();
                QueryHandle::new(statement, dispatch)
            });
            Self {
                transport: Arc::clone(&transport),
                registry: HandleRegistry::default(),
                orphan,
                receiver: Mutex::new(None),
                closed: AtomicBool::new(false),
            }
        });

        let weak = Arc::downgrade(&dispatcher);
        let transport = Arc::clone(&dispatcher.transport);
        let receiver = thread::spawn(move || receiver_loop(weak, transport));
        *dispatcher.receiver.lock() = Some(receiver);
        dispatcher
    }

    /// Submits `statement` and returns its live handle.
    pub fn submit(self: &Arc<Self>, statement: Statement) -> Result<Arc<QueryHandle>> {
        let weak: Weak<QueryDispatcher> = Arc::downgrade(self);
        let dispatch: Weak<dyn Dispatch> = weak;
        let handle = QueryHandle::new(statement, dispatch);
        self.as_ref().call_async(&handle)?;
        Ok(handle)
    }

    /// Stops the receiver thread, drains the registry, and completes
    /// every remaining handle. Idempotent; also runs when the last
    /// reference to the dispatcher is dropped.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.teardown();
        let receiver = self.receiver.lock().take();
        if let Some(receiver) = receiver {
            if receiver.thread().id() != thread::current().id() {
                let _ = receiver.join();
            }
        }
    }

    fn route(&self, frame: Inbound) {
        match frame {
            Inbound::Ack { id, msg_id } => match self.registry.find(&id) {
                Some(handle) => {
                    debug!(%id, %msg_id, "message id assigned");
                    handle.set_last_msg_id(msg_id.clone());
                    self.registry.alias(&msg_id, &handle);
                }
                None => warn!(%id, %msg_id, "ack for unknown handle"),
            },
            Inbound::Response { msg_id, payload } => match self.resolve(&msg_id) {
                Some(handle) => handle.deliver(Some(payload), None),
                None => warn!(%msg_id, "dropping unroutable response"),
            },
            Inbound::Error { msg_id, error } => match self.resolve(&msg_id) {
                Some(handle) => handle.deliver(None, Some(error)),
                None => warn!(%msg_id, "dropping unroutable error"),
            },
            Inbound::Done { msg_id } => match self.registry.find(&msg_id) {
                Some(handle) => {
                    debug!(id = %handle.id(), "subscription finished");
                    self.registry.remove(&handle);
                    handle.complete();
                }
                None => warn!(%msg_id, "done for unknown handle"),
            },
        }
    }

    fn resolve(&self, msg_id: &str) -> Option<Arc<QueryHandle>> {
        self.registry.find(msg_id).or_else(|| self.orphan.clone())
    }

    // Connection teardown counts as completion for every open handle.
    fn teardown(&self) {
        for handle in self.registry.drain() {
            handle.complete();
        }
    }
}

impl Dispatch for QueryDispatcher {
    fn call_async(&self, handle: &Arc<QueryHandle>) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SondaError::TransportClosed);
        }
        if handle.query().trim().is_empty() {
            return Err(SondaError::Invalid("query text must not be empty"));
        }
        self.registry.insert(handle);
        let statement = handle.statement();
        let sent = self.transport.send(Request::Query {
            id: statement.id().to_owned(),
            query: statement.query().to_owned(),
            time_zone: statement.time_zone().map(str::to_owned),
            date_range: statement.date_range().to_owned(),
            repo_id: statement.repo_id().to_owned(),
            referrer: statement.referrer().map(str::to_owned),
            max_rows: statement.max_rows(),
            trace: statement.is_trace(),
        });
        if sent.is_err() {
            // Submission failed; leave no registration behind so a later
            // re-issue starts clean.
            self.registry.remove(handle);
        }
        sent
    }

    fn cancel_async(&self, handle: &Arc<QueryHandle>) -> Result<()> {
        self.transport.send(Request::Cancel {
            id: handle.last_msg_id(),
        })
    }

    fn close(&self, handle: &Arc<QueryHandle>) -> Result<()> {
        // Stop the stream for live subscriptions before dropping the
        // registration; the caller's local completion does not wait on
        // this outcome.
        let cancelled = if handle.is_subscribe_query() && !handle.is_done() {
            self.transport.send(Request::Cancel {
                id: handle.last_msg_id(),
            })
        } else {
            Ok(())
        };
        self.registry.remove(handle);
        cancelled
    }
}

impl Drop for QueryDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn receiver_loop(dispatcher: Weak<QueryDispatcher>, transport: Arc<dyn Transport>) {
    loop {
        match transport.recv_timeout(RECV_POLL) {
            Ok(Some(frame)) => {
                let Some(dispatcher) = dispatcher.upgrade() else {
                    break;
                };
                dispatcher.route(frame);
            }
            Ok(None) => {
                let Some(dispatcher) = dispatcher.upgrade() else {
                    break;
                };
                if dispatcher.closed.load(Ordering::Acquire) {
                    break;
                }
            }
            Err(err) => {
                warn!(%err, "transport receive failed; completing open handles");
                if let Some(dispatcher) = dispatcher.upgrade() {
                    dispatcher.teardown();
                }
                break;
            }
        }
    }
}
