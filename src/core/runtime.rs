// src/core/runtime.rs

//! The scheduler that update tasks run on, and the explicit bridge that lets
//! synchronous callers wait for one-shot asynchronous operations.

use crate::config::RuntimeConfig;
use crate::core::SyncError;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tracing::info;

/// A multi-thread tokio runtime owned by a synchronous host.
#[derive(Debug)]
pub struct SyncRuntime {
    runtime: Runtime,
}

impl SyncRuntime {
    pub fn new(config: &RuntimeConfig) -> Result<Self, SyncError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.worker_threads.max(1))
            .thread_name(config.thread_name.clone())
            .enable_all()
            .build()?;
        info!(
            "Started runtime with {} worker thread(s).",
            config.worker_threads.max(1)
        );
        Ok(Self { runtime })
    }

    /// A handle that connectors and sessions spawn their tasks on.
    pub fn handle(&self) -> Handle {
        self.runtime.handle().clone()
    }

    /// Runs `future` on the runtime and returns a handle the caller can block on.
    pub fn submit<F>(&self, future: F) -> Pending<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let ready = Arc::new(AtomicBool::new(false));
        let done = Arc::clone(&ready);
        self.runtime.spawn(async move {
            let output = future.await;
            let _ = tx.send(output);
            done.store(true, Ordering::Release);
        });
        Pending { rx, ready }
    }

    /// Blocks the current thread on `future`. Must not be called from
    /// within the runtime itself.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Stops the runtime, giving running tasks up to `timeout` to finish.
    pub fn shutdown(self, timeout: Duration) {
        info!("Shutting down runtime.");
        self.runtime.shutdown_timeout(timeout);
    }
}

/// The eventual result of an operation submitted with `SyncRuntime::submit`.
#[derive(Debug)]
pub struct Pending<T> {
    rx: oneshot::Receiver<T>,
    ready: Arc<AtomicBool>,
}

impl<T> Pending<T> {
    /// Blocks until the result is available. Must not be called from async code.
    pub fn wait(self) -> Result<T, SyncError> {
        self.rx.blocking_recv().map_err(|_| abandoned())
    }

    /// Returns the result if it is already available, without blocking.
    pub fn try_wait(&mut self) -> Option<Result<T, SyncError>> {
        match self.rx.try_recv() {
            Ok(value) => Some(Ok(value)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(abandoned())),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}

fn abandoned() -> SyncError {
    SyncError::Internal("operation was dropped before it completed".to_string())
}
