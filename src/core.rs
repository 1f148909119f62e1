//! The scheduler core: one dedicated OS thread running a
//! current-thread tokio runtime, plus the registry of live
//! connections.
//!
//! All connection state is mutated on the scheduler thread; code on
//! other threads posts work through [`Core::call_soon`],
//! [`Core::call_soon_async`] and [`Core::call_later`]. `Core` is a
//! cheap clonable handle, owned wherever it is needed rather than
//! stored in process-wide state.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::defaults;
use crate::error::OefError;

/// Handle to a task posted onto the scheduler.
pub struct TaskHandle {
    handle: tokio::task::JoinHandle<()>,
}

impl TaskHandle {
    /// Request cancellation. The task stops at its next suspension
    /// point; a partially written frame is abandoned with its socket.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

// Decrements the outstanding-task count however the task ends:
// completion, cancellation, or runtime teardown.
struct TaskGuard(Arc<AtomicUsize>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

enum CoreState {
    Idle,
    Running {
        handle: runtime::Handle,
        thread: Option<std::thread::JoinHandle<()>>,
    },
    Stopped,
}

struct CoreInner {
    state: Mutex<CoreState>,
    connections: Mutex<Vec<Connection>>,
    outstanding: Arc<AtomicUsize>,
    shutdown: Arc<Notify>,
}

/// The shared scheduler handle.
#[derive(Clone)]
pub struct Core {
    inner: Arc<CoreInner>,
}

impl Default for Core {
    fn default() -> Self {
        Self::new()
    }
}

impl Core {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CoreInner {
                state: Mutex::new(CoreState::Idle),
                connections: Mutex::new(Vec::new()),
                outstanding: Arc::new(AtomicUsize::new(0)),
                shutdown: Arc::new(Notify::new()),
            }),
        }
    }

    /// Spawn the scheduler thread. Call exactly once; a second call
    /// (or a call after [`Core::stop`]) is an error.
    pub fn run_threaded(&self) -> Result<(), OefError> {
        let mut state = self.inner.state.lock();
        match *state {
            CoreState::Idle => {}
            CoreState::Running { .. } => {
                return Err(OefError::Core("core is already running".to_string()))
            }
            CoreState::Stopped => {
                return Err(OefError::Core("core has been stopped".to_string()))
            }
        }

        let shutdown = self.inner.shutdown.clone();
        let (handle_tx, handle_rx) = std::sync::mpsc::channel();
        let thread = std::thread::Builder::new()
            .name("oef-core".to_string())
            .spawn(move || {
                let rt = match runtime::Builder::new_current_thread().enable_all().build() {
                    Ok(rt) => rt,
                    Err(e) => {
                        warn!("failed to build the scheduler runtime: {}", e);
                        return;
                    }
                };
                if handle_tx.send(rt.handle().clone()).is_err() {
                    return;
                }
                // Park on the shutdown signal; spawned tasks run on
                // this thread in the meantime.
                rt.block_on(shutdown.notified());
                debug!("scheduler thread shutting down");
            })
            .map_err(|e| OefError::Core(format!("failed to spawn scheduler thread: {}", e)))?;

        let handle = handle_rx
            .recv()
            .map_err(|_| OefError::Core("scheduler runtime failed to start".to_string()))?;
        *state = CoreState::Running {
            handle,
            thread: Some(thread),
        };
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.inner.state.lock(), CoreState::Running { .. })
    }

    fn handle(&self) -> Result<runtime::Handle, OefError> {
        match &*self.inner.state.lock() {
            CoreState::Running { handle, .. } => Ok(handle.clone()),
            _ => Err(OefError::Core("start the core first".to_string())),
        }
    }

    /// Post a synchronous function onto the scheduler thread.
    pub fn call_soon<F>(&self, f: F) -> Result<(), OefError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.call_soon_async(async move { f() }).map(|_| ())
    }

    /// Post a future onto the scheduler thread, returning a handle
    /// that supports cancellation.
    pub fn call_soon_async<F>(&self, future: F) -> Result<TaskHandle, OefError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = self.handle()?;
        self.inner.outstanding.fetch_add(1, Ordering::SeqCst);
        let guard = TaskGuard(self.inner.outstanding.clone());
        let join = handle.spawn(async move {
            let _guard = guard;
            future.await;
        });
        Ok(TaskHandle { handle: join })
    }

    /// Post a delayed invocation.
    pub fn call_later<F>(&self, delay: Duration, f: F) -> Result<TaskHandle, OefError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.call_soon_async(async move {
            tokio::time::sleep(delay).await;
            f();
        })
    }

    /// Drive a future to completion from a non-scheduler thread.
    ///
    /// Used by the blocking agent API; must not be called from inside
    /// an async context.
    pub fn block_on<F: Future>(&self, future: F) -> Result<F::Output, OefError> {
        Ok(self.handle()?.block_on(future))
    }

    pub fn register_connection(&self, connection: &Connection) {
        let mut connections = self.inner.connections.lock();
        if !connections.iter().any(|c| c.same_as(connection)) {
            connections.push(connection.clone());
        }
    }

    pub fn deregister_connection(&self, connection: &Connection) {
        self.inner
            .connections
            .lock()
            .retain(|c| !c.same_as(connection));
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.lock().len()
    }

    /// Close every registered connection, wait a bounded interval for
    /// outstanding tasks to drain, halt the scheduler and join its
    /// thread. Succeeds even when the network is unreachable; safe to
    /// call more than once.
    pub fn stop(&self) {
        let connections: Vec<Connection> = {
            let mut guard = self.inner.connections.lock();
            std::mem::take(&mut *guard)
        };
        for connection in connections {
            connection.close();
        }

        for _ in 0..defaults::SHUTDOWN_DRAIN_POLLS {
            if self.inner.outstanding.load(Ordering::SeqCst) == 0 {
                break;
            }
            std::thread::sleep(defaults::SHUTDOWN_DRAIN_INTERVAL);
        }
        let remaining = self.inner.outstanding.load(Ordering::SeqCst);
        if remaining > 0 {
            debug!("halting scheduler with {} tasks still pending", remaining);
        }

        let thread = {
            let mut state = self.inner.state.lock();
            match std::mem::replace(&mut *state, CoreState::Stopped) {
                CoreState::Running { thread, .. } => thread,
                other => {
                    *state = other;
                    None
                }
            }
        };
        self.inner.shutdown.notify_one();
        if let Some(thread) = thread {
            if thread.join().is_err() {
                warn!("scheduler thread panicked during shutdown");
            }
        }
    }
}
