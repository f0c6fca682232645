//! Dispatch contexts for callbacks.
//!
//! Observers and registry listeners are never called on the thread that
//! changed the state. Each registration names an [`Executor`] and the
//! callback is handed to it as a [`Task`].

use crate::errors::CameraError;
use crate::lock::lock;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;
use std::thread::JoinHandle;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

/// A unit of work handed to an executor.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Something that can run a task, now or later.
pub trait Executor: Send + Sync {
    /// Schedule `task`. Returns [`CameraError::ExecutionRejected`] if the
    /// executor no longer accepts work.
    fn execute(&self, task: Task) -> Result<(), CameraError>;
}

/// Runs every task inline on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectExecutor;

impl Executor for DirectExecutor {
    fn execute(&self, task: Task) -> Result<(), CameraError> {
        task();
        Ok(())
    }
}

/// Runs tasks one at a time, in submission order, on a dedicated thread.
pub struct SerialExecutor {
    name: String,
    sender: Mutex<Option<mpsc::UnboundedSender<Task>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SerialExecutor {
    /// Spawn the worker thread.
    pub fn new(name: impl Into<String>) -> Result<Self, CameraError> {
        let name = name.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<Task>();

        let worker_name = name.clone();
        let worker = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                while let Some(task) = rx.blocking_recv() {
                    if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                        log::error!("Task panicked on serial executor '{}'", worker_name);
                    }
                }
            })
            .map_err(|e| {
                CameraError::InitializationError(format!(
                    "Failed to spawn executor thread: {}",
                    e
                ))
            })?;

        log::debug!("Started serial executor '{}'", name);

        Ok(Self {
            name,
            sender: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Stop accepting tasks. Already queued tasks still run.
    pub fn shutdown(&self) {
        if lock(&self.sender).take().is_some() {
            log::debug!("Serial executor '{}' shut down", self.name);
        }
    }

    /// Shut down and wait for the queue to drain.
    pub fn join(&self) {
        self.shutdown();
        let worker = lock(&self.worker).take();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                log::error!("Serial executor '{}' worker panicked", self.name);
            }
        }
    }

    pub fn is_shutdown(&self) -> bool {
        lock(&self.sender).is_none()
    }
}

impl Executor for SerialExecutor {
    fn execute(&self, task: Task) -> Result<(), CameraError> {
        let sender = lock(&self.sender);
        match sender.as_ref() {
            Some(tx) => tx.send(task).map_err(|_| {
                CameraError::ExecutionRejected(format!("executor '{}' worker is gone", self.name))
            }),
            None => Err(CameraError::ExecutionRejected(format!(
                "executor '{}' is shut down",
                self.name
            ))),
        }
    }
}

impl Drop for SerialExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Spawns each task onto a Tokio runtime's blocking pool.
///
/// Tasks may run concurrently, so there is no ordering guarantee between
/// them. Use [`SerialExecutor`] when a listener needs in-order delivery.
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Bind to the runtime of the calling context.
    pub fn current() -> Result<Self, CameraError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| CameraError::InitializationError(format!("No Tokio runtime: {}", e)))
    }
}

impl Executor for TokioExecutor {
    fn execute(&self, task: Task) -> Result<(), CameraError> {
        self.handle.spawn_blocking(task);
        Ok(())
    }
}

/// Drive `future` to completion in the background: on the current Tokio
/// runtime when there is one, otherwise on a named helper thread.
pub(crate) fn spawn_detached<F>(thread_name: &str, future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    match Handle::try_current() {
        Ok(handle) => {
            handle.spawn(future);
        }
        Err(_) => {
            let spawned = std::thread::Builder::new()
                .name(thread_name.to_string())
                .spawn(move || futures::executor::block_on(future));
            if let Err(e) = spawned {
                log::error!("Failed to spawn {} thread: {}", thread_name, e);
            }
        }
    }
}
