//! Live query handles: the unit of synchronization, identity, and
//! cancellation for one submitted query or subscription.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant, SystemTime};

use parking_lot::{Condvar, Mutex, RwLock};
use serde_json::Value;
use tracing::warn;

use crate::callback::QueryCallback;
use crate::dispatch::Dispatch;
use crate::error::{Result, ServerError, SondaError};
use crate::statement::{is_subscribe_text, Statement, SUB_ID_PREFIX};

/// Live handle for one submitted query or subscription.
///
/// A handle is created by the dispatcher when a statement is submitted and
/// stays valid until it is closed or completed. Results may arrive
/// concurrently on the dispatcher's receiver thread while any number of
/// caller threads read state, wait, or cancel; every operation here is
/// safe under arbitrary interleaving.
///
/// Two condition signals share one lock: "a result was delivered" and
/// "the subscription is finished". Waiters only observe events that occur
/// strictly after they start waiting; check [`call_count`] or
/// [`is_done`] first when "has anything already happened" matters.
///
/// [`call_count`]: QueryHandle::call_count
/// [`is_done`]: QueryHandle::is_done
pub struct QueryHandle {
    statement: Arc<Statement>,
    subscribe: bool,
    time_created: SystemTime,
    dispatch: Weak<dyn Dispatch>,
    call_count: AtomicU64,
    done: AtomicBool,
    last_msg_id: RwLock<Option<String>>,
    // Guards the atomicity of "update state, invoke callback, broadcast"
    // for both condition signals. Accessors stay off this lock so that
    // callbacks running under it can still read handle state.
    signal: Mutex<()>,
    delivered: Condvar,
    finished: Condvar,
}

impl QueryHandle {
    /// Wraps `statement` in a live handle delegating to `dispatch`.
    ///
    /// Whether the handle is subscription-style is derived from the query
    /// text once, here, and cached for the handle's lifetime.
    pub fn new(statement: Statement, dispatch: Weak<dyn Dispatch>) -> Arc<Self> {
        let subscribe = is_subscribe_text(statement.query());
        Arc::new(Self {
            statement: Arc::new(statement),
            subscribe,
            time_created: SystemTime::now(),
            dispatch,
            call_count: AtomicU64::new(0),
            done: AtomicBool::new(false),
            last_msg_id: RwLock::new(None),
            signal: Mutex::new(()),
            delivered: Condvar::new(),
            finished: Condvar::new(),
        })
    }

    /// Handle identifier; always the statement's id.
    pub fn id(&self) -> &str {
        self.statement.id()
    }

    /// The query text.
    pub fn query(&self) -> &str {
        self.statement.query()
    }

    /// The wrapped statement.
    pub fn statement(&self) -> &Arc<Statement> {
        &self.statement
    }

    /// Callback receiving this handle's results and completion.
    pub fn callback(&self) -> &Arc<dyn QueryCallback> {
        self.statement.callback()
    }

    /// Time zone for date interpretation, when set.
    pub fn time_zone(&self) -> Option<&str> {
        self.statement.time_zone()
    }

    /// Date range the query applies to.
    pub fn date_range(&self) -> &str {
        self.statement.date_range()
    }

    /// Repository id the query runs against.
    pub fn repo_id(&self) -> &str {
        self.statement.repo_id()
    }

    /// Name of the query referrer, when set.
    pub fn referrer(&self) -> Option<&str> {
        self.statement.referrer()
    }

    /// Maximum rows per response.
    pub fn max_rows(&self) -> u32 {
        self.statement.max_rows()
    }

    /// Whether server-side tracing was requested.
    pub fn is_trace(&self) -> bool {
        self.statement.is_trace()
    }

    /// Capture time at construction.
    pub fn time_created(&self) -> SystemTime {
        self.time_created
    }

    /// True if the query text was classified as subscription-style.
    pub fn is_subscribe_query(&self) -> bool {
        self.subscribe
    }

    /// True if the statement id carries the reserved subscription prefix.
    ///
    /// Distinct from [`is_subscribe_query`]: one is about the semantics of
    /// the query text, the other about the provenance of the identifier.
    ///
    /// [`is_subscribe_query`]: QueryHandle::is_subscribe_query
    pub fn is_subscribe_id(&self) -> bool {
        self.statement.id().starts_with(SUB_ID_PREFIX)
    }

    /// Number of deliveries since creation or the last reset.
    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Acquire)
    }

    /// Resets the delivery counter to zero.
    ///
    /// Atomic with respect to concurrent deliveries: increments are never
    /// lost, and no intermediate value is observable.
    pub fn reset_call_count(&self) {
        self.call_count.store(0, Ordering::Release);
    }

    /// True once the completion protocol has run.
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Last server-assigned message id, falling back to the handle's own
    /// id until one is assigned.
    pub fn last_msg_id(&self) -> String {
        self.last_msg_id
            .read()
            .clone()
            .unwrap_or_else(|| self.statement.id().to_owned())
    }

    /// Records the server-assigned message id. Dispatcher-facing; the id
    /// is never unset once assigned.
    pub fn set_last_msg_id(&self, msg_id: impl Into<String>) {
        *self.last_msg_id.write() = Some(msg_id.into());
    }

    /// Blocks until the next delivery.
    pub fn wait_result(&self) {
        let mut guard = self.signal.lock();
        self.delivered.wait(&mut guard);
    }

    /// Blocks until the next delivery or until `timeout` elapses.
    /// Returns true iff a delivery arrived first.
    pub fn wait_result_for(&self, timeout: Duration) -> bool {
        let mut guard = self.signal.lock();
        !self.delivered.wait_for(&mut guard, timeout).timed_out()
    }

    /// Blocks until the next delivery or until `deadline`.
    /// Returns true iff a delivery arrived first.
    pub fn wait_result_until(&self, deadline: Instant) -> bool {
        let mut guard = self.signal.lock();
        !self.delivered.wait_until(&mut guard, deadline).timed_out()
    }

    /// Blocks until the subscription finishes.
    pub fn wait_done(&self) {
        let mut guard = self.signal.lock();
        self.finished.wait(&mut guard);
    }

    /// Blocks until the subscription finishes or until `timeout` elapses.
    /// Returns true iff completion arrived first.
    pub fn wait_done_for(&self, timeout: Duration) -> bool {
        let mut guard = self.signal.lock();
        !self.finished.wait_for(&mut guard, timeout).timed_out()
    }

    /// Blocks until the subscription finishes or until `deadline`.
    /// Returns true iff completion arrived first.
    pub fn wait_done_until(&self, deadline: Instant) -> bool {
        let mut guard = self.signal.lock();
        !self.finished.wait_until(&mut guard, deadline).timed_out()
    }

    /// (Re)submits this handle's query through the dispatcher.
    pub fn call_async(self: &Arc<Self>) -> Result<()> {
        self.dispatch()?.call_async(self)
    }

    /// Submits a cancel for this subscription.
    ///
    /// Returns once the cancel request has been submitted, not once the
    /// server confirms. Results already in flight are still delivered
    /// until completion arrives; on failure the handle's local state is
    /// unchanged and the query stays live.
    pub fn cancel_async(self: &Arc<Self>) -> Result<()> {
        self.dispatch()?.cancel_async(self)
    }

    /// Tears down this handle's registration and completes it locally.
    ///
    /// Waiters are released and the callback's completion runs no matter
    /// what the dispatcher's delegate does; a delegation failure is
    /// reported only after that.
    pub fn close(self: &Arc<Self>) -> Result<()> {
        let delegated = match self.dispatch() {
            Ok(dispatch) => dispatch.close(self),
            Err(err) => Err(err),
        };
        self.complete();
        delegated
    }

    /// One inbound delivery for this handle. Dispatcher-facing.
    ///
    /// Atomically: bumps the call counter, invokes the callback, and wakes
    /// every result waiter. The signal lock serializes deliveries for one
    /// handle even if two arrive at once.
    pub fn deliver(&self, result: Option<Value>, error: Option<ServerError>) {
        let _guard = self.signal.lock();
        self.call_count.fetch_add(1, Ordering::AcqRel);
        self.statement
            .callback()
            .on_result(self, result.as_ref(), error.as_ref());
        self.delivered.notify_all();
    }

    /// The terminal event for this handle. Dispatcher-facing.
    ///
    /// Atomically: invokes the callback's completion and wakes every done
    /// waiter. One-shot; a second invocation is a logged no-op.
    pub fn complete(&self) {
        let _guard = self.signal.lock();
        if self.done.swap(true, Ordering::AcqRel) {
            warn!(id = %self.id(), "completion signalled twice");
            return;
        }
        self.statement.callback().on_done(self);
        self.finished.notify_all();
    }

    /// True iff `id` is this handle's statement id.
    pub fn matches_id(&self, id: &str) -> bool {
        self.statement.id() == id
    }

    /// True iff `callback` is this handle's own callback instance.
    pub fn matches_callback(&self, callback: &Arc<dyn QueryCallback>) -> bool {
        Arc::ptr_eq(self.statement.callback(), callback)
    }

    fn dispatch(&self) -> Result<Arc<dyn Dispatch>> {
        self.dispatch.upgrade().ok_or(SondaError::Detached)
    }
}

impl PartialEq for QueryHandle {
    fn eq(&self, other: &Self) -> bool {
        self.statement.id() == other.statement.id()
    }
}

impl Eq for QueryHandle {}

impl Hash for QueryHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.statement.id().hash(state);
    }
}

impl fmt::Display for QueryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "QueryHandle {{id: {:?}, query: {:?}, daterange: {:?}, repo: {:?}, calls: {}}}",
            self.id(),
            self.query(),
            self.date_range(),
            self.repo_id(),
            self.call_count(),
        )
    }
}

impl fmt::Debug for QueryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryHandle")
            .field("id", &self.id())
            .field("subscribe", &self.subscribe)
            .field("call_count", &self.call_count())
            .field("done", &self.is_done())
            .finish_non_exhaustive()
    }
}
