//! Fixed-Size Worker Pool
//!
//! N long-lived threads draining a [`BoundedQueue`] of jobs. The pool is
//! generic over the job type; what "executing" a job means is supplied as
//! a handler closure when the pool is started. Workers run each job to
//! completion before taking the next, and never propagate a job's failure
//! back into the pool - a job that needs error handling does it itself.
//!
//! Shutdown closes the queue and joins every worker. Jobs still buffered
//! when the queue closes are dropped, not executed; a worker already
//! holding a job finishes it first.

use super::queue::BoundedQueue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::debug;

/// A pool of worker threads fed through a bounded queue.
///
/// # Example
///
/// ```
/// use tcpkv::server::WorkerPool;
/// use std::sync::mpsc;
///
/// let (tx, rx) = mpsc::channel();
/// let mut pool = WorkerPool::new(2, 16);
/// pool.start(move |n: u32| {
///     tx.send(n * 2).unwrap();
/// });
///
/// pool.submit(21).unwrap();
/// assert_eq!(rx.recv().unwrap(), 42);
/// pool.stop();
/// ```
pub struct WorkerPool<T: Send + 'static> {
    /// Number of worker threads
    threads: usize,

    /// The handoff queue workers drain
    queue: Arc<BoundedQueue<T>>,

    /// Lifecycle flag: false -> true on start, true -> false on stop
    running: Arc<AtomicBool>,

    /// Join handles for the live workers
    workers: Vec<JoinHandle<()>>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Creates a stopped pool with `threads` workers and a queue of
    /// `queue_cap` jobs.
    ///
    /// # Panics
    ///
    /// Panics if `threads` is zero (`queue_cap` is checked by the queue).
    pub fn new(threads: usize, queue_cap: usize) -> Self {
        assert!(threads >= 1, "worker pool needs at least one thread");
        Self {
            threads,
            queue: Arc::new(BoundedQueue::new(queue_cap)),
            running: Arc::new(AtomicBool::new(false)),
            workers: Vec::with_capacity(threads),
        }
    }

    /// Spawns the worker threads. Each worker loops: pop a job, run it to
    /// completion, repeat; it exits when the queue reports closed-and-empty
    /// or the pool has been stopped.
    ///
    /// Call once; `submit` before `start` only buffers jobs.
    pub fn start<F>(&mut self, handler: F)
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.running.store(true, Ordering::SeqCst);
        let handler = Arc::new(handler);

        for id in 0..self.threads {
            let queue = Arc::clone(&self.queue);
            let running = Arc::clone(&self.running);
            let handler = Arc::clone(&handler);

            let worker = thread::Builder::new()
                .name(format!("worker-{id}"))
                .spawn(move || {
                    while running.load(Ordering::SeqCst) {
                        let Some(job) = queue.pop() else { break };
                        handler(job);
                    }
                    debug!(worker = id, "worker exiting");
                })
                .expect("failed to spawn worker thread");

            self.workers.push(worker);
        }
    }

    /// Enqueues a job, blocking while the queue is full.
    ///
    /// Returns `Err(job)` when the pool is stopping and the queue is
    /// closed; the job is handed back untouched. Safe to call from any
    /// thread.
    pub fn submit(&self, job: T) -> Result<(), T> {
        self.queue.push(job)
    }

    /// Stops the pool: closes the queue, joins every worker, clears the
    /// worker set. Idempotent; only the first call does the work.
    ///
    /// Jobs dequeued before the close run to completion; jobs still
    /// buffered are dropped.
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        self.queue.close();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl<T: Send + 'static> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        self.stop();
    }
}
