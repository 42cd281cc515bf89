//! Owned background threads with cooperative shutdown.
//!
//! A [`Worker`] pairs a thread with a [`StopSignal`]. Stopping raises the
//! signal and waits a bounded time for the thread to finish. A thread that
//! does not finish in time is detached and left to exit on its own.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Cancellation flag a worker loop polls and sleeps on.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: Mutex<bool>,
    cond: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        *self.stopped.lock() = true;
        self.cond.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.stopped.lock()
    }

    /// Sleep for `timeout` unless stopped first. Returns true if stopped.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut stopped = self.stopped.lock();
        while !*stopped {
            if self.cond.wait_until(&mut stopped, deadline).timed_out() {
                break;
            }
        }
        *stopped
    }
}

/// A named background thread owned by the component that spawned it.
#[derive(Debug)]
pub struct Worker {
    name: String,
    signal: Arc<StopSignal>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn `body` on a new thread named `name`.
    pub fn spawn<F>(name: impl Into<String>, body: F) -> std::io::Result<Self>
    where
        F: FnOnce(Arc<StopSignal>) + Send + 'static,
    {
        let name = name.into();
        let signal = Arc::new(StopSignal::new());
        let thread_signal = Arc::clone(&signal);
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || body(thread_signal))?;
        debug!("Started worker thread {}", name);
        Ok(Self {
            name,
            signal,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Raise the stop signal and wait up to `timeout` for the thread to exit.
    ///
    /// Returns true if the thread was joined. Called from the worker thread
    /// itself, it only raises the signal.
    pub fn stop(&mut self, timeout: Duration) -> bool {
        self.signal.stop();
        let Some(handle) = self.handle.take() else {
            return true;
        };
        if handle.thread().id() == thread::current().id() {
            return false;
        }

        let deadline = Instant::now() + timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                warn!(
                    "Worker thread {} did not stop within {:?}; detaching",
                    self.name, timeout
                );
                return false;
            }
            thread::sleep(JOIN_POLL_INTERVAL);
        }
        if handle.join().is_err() {
            warn!("Worker thread {} panicked", self.name);
        }
        debug!("Stopped worker thread {}", self.name);
        true
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Dropping without an explicit stop still signals the loop to exit.
        self.signal.stop();
    }
}
