//! Shared worker pool for subscribed calls
//!
//! Jobs are handed to the workers through a rendezvous channel: a submit
//! returns once a worker has taken the job, and blocks while every worker is
//! busy. That blocking is the only back-pressure between input drivers and
//! handlers.

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size pool of named worker threads
pub struct WorkerPool {
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl WorkerPool {
    /// Spawn `size` workers
    pub fn new(size: usize) -> std::io::Result<Self> {
        let (sender, receiver) = bounded::<Job>(0);
        let mut workers = Vec::with_capacity(size);

        for index in 0..size {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("patchbay-worker-{}", index))
                .spawn(move || worker_loop(receiver))?;
            workers.push(handle);
        }

        debug!("Worker pool started with {} threads", size);

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            size,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Hand a job to a worker, blocking until one is free.
    ///
    /// Returns `false` when the pool is shut down and the job was dropped.
    pub fn submit<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = match self.sender.lock().as_ref() {
            Some(sender) => sender.clone(),
            None => {
                warn!("Worker pool is shut down, dropping job");
                return false;
            }
        };

        if sender.send(Box::new(job)).is_err() {
            warn!("Worker pool is shut down, dropping job");
            return false;
        }
        true
    }

    pub fn is_shut_down(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Stop accepting jobs and wait for running jobs to finish
    pub fn shutdown(&self) {
        if self.sender.lock().take().is_none() {
            return;
        }

        let current = thread::current().id();
        let workers: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for handle in workers {
            // A job may shut the pool down from inside a worker
            if handle.thread().id() == current {
                continue;
            }
            let _ = handle.join();
        }

        debug!("Worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(receiver: Receiver<Job>) {
    while let Ok(job) = receiver.recv() {
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!("Worker job panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    #[test]
    fn test_jobs_run() {
        let pool = WorkerPool::new(4).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..20 {
            let counter = counter.clone();
            assert!(pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }

        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn test_submit_after_shutdown_is_dropped() {
        let pool = WorkerPool::new(1).unwrap();
        pool.shutdown();
        assert!(pool.is_shut_down());
        assert!(!pool.submit(|| {}));
    }

    #[test]
    fn test_panicking_job_keeps_worker_alive() {
        let pool = WorkerPool::new(1).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        pool.submit(|| panic!("job failure"));
        let c = counter.clone();
        pool.submit(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_submit_blocks_when_all_workers_busy() {
        let pool = WorkerPool::new(1).unwrap();
        pool.submit(|| std::thread::sleep(Duration::from_millis(200)));

        let start = Instant::now();
        pool.submit(|| {});
        assert!(start.elapsed() >= Duration::from_millis(100));
        pool.shutdown();
    }
}
