//! Single-thread FIFO executor.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(Job),
    Shutdown,
}

/// Errors reported by the executor.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("executor '{0}' is shut down")]
    ShutDown(String),
}

/// A dedicated worker thread draining a FIFO mailbox.
///
/// Jobs run one at a time in submission order. A job that panics is
/// logged and the worker moves on to the next one. Shutting down lets
/// every job queued before the shutdown request run to completion;
/// submissions after it fail with [`ExecutorError::ShutDown`].
pub struct SerialExecutor {
    handle: ExecutorHandle,
    thread: Option<JoinHandle<()>>,
}

/// Cloneable submission side of a [`SerialExecutor`].
#[derive(Clone)]
pub struct ExecutorHandle {
    name: Arc<str>,
    tx: Sender<Message>,
}

impl SerialExecutor {
    /// Spawns the worker thread.
    pub fn spawn(name: &str) -> Result<Self, ExecutorError> {
        let (tx, rx) = channel();
        let name: Arc<str> = Arc::from(name);
        let thread_name = name.to_string();
        let thread = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || run_worker(&thread_name, rx))?;

        tracing::debug!(executor = %name, "Executor started");
        Ok(Self {
            handle: ExecutorHandle { name, tx },
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> ExecutorHandle {
        self.handle.clone()
    }

    pub fn name(&self) -> &str {
        &self.handle.name
    }

    /// Queues a job behind everything already submitted.
    pub fn execute<F>(&self, job: F) -> Result<(), ExecutorError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.handle.execute(job)
    }

    /// Runs every job queued so far, then stops and joins the worker.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        // The worker exits on its own if every sender is gone.
        let _ = self.handle.tx.send(Message::Shutdown);

        if thread.thread().id() == thread::current().id() {
            tracing::warn!(executor = %self.handle.name, "Executor shut down from its own worker");
            return;
        }
        if thread.join().is_err() {
            tracing::error!(executor = %self.handle.name, "Executor worker panicked");
        }
        tracing::debug!(executor = %self.handle.name, "Executor stopped");
    }
}

impl Drop for SerialExecutor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl ExecutorHandle {
    /// Queues a job. Fails once the worker has shut down; the job is
    /// dropped in that case.
    pub fn execute<F>(&self, job: F) -> Result<(), ExecutorError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx
            .send(Message::Run(Box::new(job)))
            .map_err(|_| ExecutorError::ShutDown(self.name.to_string()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

fn run_worker(name: &str, rx: Receiver<Message>) {
    while let Ok(message) = rx.recv() {
        match message {
            Message::Run(job) => {
                if catch_unwind(AssertUnwindSafe(job)).is_err() {
                    tracing::error!(executor = name, "Job panicked");
                }
            }
            Message::Shutdown => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_jobs_run_in_order_on_one_thread() {
        let executor = SerialExecutor::spawn("test-fifo").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..100 {
            let seen = Arc::clone(&seen);
            executor
                .execute(move || {
                    let name = thread::current().name().map(str::to_owned);
                    seen.lock().push((i, name));
                })
                .unwrap();
        }
        executor.shutdown();

        let seen = seen.lock();
        assert_eq!(seen.len(), 100);
        for (expected, (i, name)) in seen.iter().enumerate() {
            assert_eq!(*i, expected);
            assert_eq!(name.as_deref(), Some("test-fifo"));
        }
    }

    #[test]
    fn test_panicking_job_does_not_kill_worker() {
        let executor = SerialExecutor::spawn("test-panic").unwrap();
        let (tx, rx) = mpsc::channel();

        executor.execute(|| panic!("job failure")).unwrap();
        executor.execute(move || tx.send(42).unwrap()).unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
    }

    #[test]
    fn test_shutdown_runs_queued_jobs() {
        let executor = SerialExecutor::spawn("test-drain").unwrap();
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let ran = Arc::new(Mutex::new(0));

        executor
            .execute(move || {
                let _ = gate_rx.recv_timeout(Duration::from_secs(5));
            })
            .unwrap();
        for _ in 0..10 {
            let ran = Arc::clone(&ran);
            executor.execute(move || *ran.lock() += 1).unwrap();
        }

        let shutdown = thread::spawn(move || executor.shutdown());
        gate_tx.send(()).unwrap();
        shutdown.join().unwrap();
        assert_eq!(*ran.lock(), 10);
    }

    #[test]
    fn test_execute_after_shutdown_fails() {
        let executor = SerialExecutor::spawn("test-shutdown").unwrap();
        let handle = executor.handle();
        executor.shutdown();

        assert!(matches!(
            handle.execute(|| {}),
            Err(ExecutorError::ShutDown(_))
        ));
    }
}
