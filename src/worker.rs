//! The worker thread and the caller contexts replies are marshalled onto.
//!
//! Each open lifecycle gets one named worker thread. Hardware callbacks,
//! frame-available notifications and capture completion all run there, one
//! job at a time, in posting order.

use crate::errors::ControllerError;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(Job),
    Quit,
}

pub struct Worker {
    name: String,
    sender: Sender<Message>,
    thread: Option<JoinHandle<()>>,
    thread_id: ThreadId,
}

impl Worker {
    pub fn spawn(name: &str) -> Result<Self, ControllerError> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_loop(receiver))
            .map_err(|e| ControllerError::Worker(format!("spawn failed: {e}")))?;

        log::debug!("worker {} started", name);
        Ok(Self {
            name: name.to_string(),
            sender,
            thread_id: thread.thread().id(),
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> WorkerHandle {
        WorkerHandle {
            sender: self.sender.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_current_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Stop the worker after the jobs already queued, waiting up to `timeout`.
    ///
    /// Called from the worker itself this only requests the stop; the thread
    /// exits once the current job returns.
    pub fn shutdown(mut self, timeout: Duration) -> Result<(), ControllerError> {
        let _ = self.sender.send(Message::Quit);

        let Some(handle) = self.thread.take() else {
            return Ok(());
        };
        if self.is_current_thread() {
            log::debug!("worker {} stopping itself", self.name);
            return Ok(());
        }

        let start = Instant::now();
        loop {
            if handle.is_finished() {
                let _ = handle.join();
                log::debug!("worker {} stopped", self.name);
                return Ok(());
            }
            if start.elapsed() >= timeout {
                log::warn!(
                    "worker {} did not stop within {:?}, detaching",
                    self.name,
                    timeout
                );
                return Err(ControllerError::Worker(format!(
                    "{} did not stop within {:?}",
                    self.name, timeout
                )));
            }
            thread::sleep(Duration::from_millis(5));
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if self.thread.is_some() {
            let _ = self.sender.send(Message::Quit);
        }
    }
}

/// Cloneable posting handle for a [`Worker`].
#[derive(Clone)]
pub struct WorkerHandle {
    sender: Sender<Message>,
}

impl WorkerHandle {
    /// Queue a job. Returns `false` (dropping the job) once the worker has exited.
    pub fn post<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.sender.send(Message::Run(Box::new(job))).is_ok()
    }
}

fn run_loop(receiver: Receiver<Message>) {
    while let Ok(message) = receiver.recv() {
        match message {
            Message::Run(job) => run_job(job),
            Message::Quit => break,
        }
    }

    // Jobs that raced the quit marker still run so their handles get released.
    for message in receiver.try_iter() {
        if let Message::Run(job) = message {
            run_job(job);
        }
    }
}

fn run_job(job: Job) {
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(job)) {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        log::error!("worker job panicked: {}", message);
    }
}

/// The execution context a caller wants its replies delivered on.
pub trait CallerContext: Send + Sync {
    fn dispatch(&self, job: Job);
}

/// Runs replies on whichever thread resolves them.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineCaller;

impl CallerContext for InlineCaller {
    fn dispatch(&self, job: Job) {
        job();
    }
}

/// Create a caller context whose replies are drained by the host through
/// the returned [`CallerQueue`].
pub fn caller_loop() -> (Arc<CallerLoop>, CallerQueue) {
    let (sender, receiver) = crossbeam_channel::unbounded();
    (Arc::new(CallerLoop { sender }), CallerQueue { receiver })
}

pub struct CallerLoop {
    sender: Sender<Job>,
}

impl CallerContext for CallerLoop {
    fn dispatch(&self, job: Job) {
        if let Err(returned) = self.sender.send(job) {
            log::debug!("caller queue closed, running reply inline");
            (returned.0)();
        }
    }
}

pub struct CallerQueue {
    receiver: Receiver<Job>,
}

impl CallerQueue {
    /// Run every reply queued so far. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.receiver.try_recv() {
            job();
            ran += 1;
        }
        ran
    }

    /// Wait up to `timeout` for one reply and run it.
    pub fn run_next(&self, timeout: Duration) -> bool {
        match self.receiver.recv_timeout(timeout) {
            Ok(job) => {
                job();
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[test]
    fn test_jobs_run_in_order() {
        let worker = Worker::spawn("test-worker").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let seen = seen.clone();
            assert!(worker.handle().post(move || seen.lock().unwrap().push(i)));
        }
        worker.shutdown(Duration::from_secs(2)).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_panicking_job_does_not_kill_worker() {
        let worker = Worker::spawn("test-worker-panic").unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        worker.handle().post(|| panic!("boom"));
        let c = count.clone();
        worker.handle().post(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        worker.shutdown(Duration::from_secs(2)).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_post_after_exit_fails() {
        let worker = Worker::spawn("test-worker-exit").unwrap();
        let handle = worker.handle();
        worker.shutdown(Duration::from_secs(2)).unwrap();
        assert!(!handle.post(|| {}));
    }

    #[test]
    fn test_shutdown_from_worker_thread() {
        let worker = Worker::spawn("test-worker-self").unwrap();
        let handle = worker.handle();
        let slot = Arc::new(Mutex::new(Some(worker)));
        let (tx, rx) = crossbeam_channel::bounded(1);
        let inner = slot.clone();
        handle.post(move || {
            let worker = inner.lock().unwrap().take().unwrap();
            let _ = tx.send(worker.shutdown(Duration::from_secs(1)).is_ok());
        });
        assert!(rx.recv_timeout(Duration::from_secs(2)).unwrap());
    }

    #[test]
    fn test_caller_loop_queues_until_drained() {
        let (caller, queue) = caller_loop();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let c = count.clone();
            caller.dispatch(Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(queue.run_pending(), 3);
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(!queue.run_next(Duration::from_millis(10)));
    }

    #[test]
    fn test_closed_caller_loop_runs_inline() {
        let (caller, queue) = caller_loop();
        drop(queue);
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        caller.dispatch(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
