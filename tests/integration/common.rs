//! Shared helpers for the integration suites.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;
use sonda::{QueryCallback, QueryHandle, ServerError};

/// Callback that records everything it sees.
#[derive(Default)]
pub struct RecordingCallback {
    pub results: Mutex<Vec<Value>>,
    pub errors: Mutex<Vec<ServerError>>,
    pub done: AtomicUsize,
}

impl RecordingCallback {
    pub fn result_count(&self) -> usize {
        self.results.lock().len()
    }

    pub fn error_count(&self) -> usize {
        self.errors.lock().len()
    }

    pub fn done_count(&self) -> usize {
        self.done.load(Ordering::SeqCst)
    }
}

impl QueryCallback for RecordingCallback {
    fn on_result(&self, _handle: &QueryHandle, result: Option<&Value>, error: Option<&ServerError>) {
        if let Some(value) = result {
            self.results.lock().push(value.clone());
        }
        if let Some(err) = error {
            self.errors.lock().push(err.clone());
        }
    }

    fn on_done(&self, _handle: &QueryHandle) {
        self.done.fetch_add(1, Ordering::SeqCst);
    }
}

/// Installs a test subscriber once so `RUST_LOG` surfaces dispatch logs.
pub fn init_tracing() {
    use std::sync::Once;

    use tracing_subscriber::EnvFilter;

    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Polls `cond` until it holds or `timeout` elapses.
pub fn eventually(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}
