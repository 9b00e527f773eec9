//! Bounded Blocking Queue
//!
//! A FIFO handoff channel with a fixed capacity and a one-shot close.
//! Producers block while the queue is full; consumers block while it is
//! empty. Closing wakes everyone: producers give up immediately, consumers
//! keep draining whatever is still buffered and only then see the end.
//!
//! This is the backpressure point of the server: the acceptor pushes
//! accepted connections, workers pop them, and a burst of connects beyond
//! what the workers can absorb parks the acceptor instead of growing an
//! unbounded backlog.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

/// A bounded FIFO with blocking push/pop and close-once semantics.
///
/// # Example
///
/// ```
/// use tcpkv::server::BoundedQueue;
///
/// let q = BoundedQueue::new(2);
/// assert!(q.push(1).is_ok());
/// assert!(q.push(2).is_ok());
/// assert_eq!(q.pop(), Some(1));
///
/// q.close();
/// assert_eq!(q.push(3), Err(3));  // closed: rejected, item handed back
/// assert_eq!(q.pop(), Some(2));   // buffered items still drain
/// assert_eq!(q.pop(), None);      // closed and empty
/// ```
pub struct BoundedQueue<T> {
    capacity: usize,
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> BoundedQueue<T> {
    /// Creates a queue holding at most `capacity` items.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "queue capacity must be at least 1");
        Self {
            capacity,
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Appends an item, blocking while the queue is full and not closed.
    ///
    /// Returns `Err(item)` if the queue is closed, handing the item back
    /// so the caller can dispose of it (for connection handoff that means
    /// telling the client the server is going away).
    pub fn push(&self, item: T) -> Result<(), T> {
        let mut inner = self.inner.lock().unwrap();
        while !inner.closed && inner.items.len() >= self.capacity {
            inner = self.not_full.wait(inner).unwrap();
        }
        if inner.closed {
            return Err(item);
        }
        inner.items.push_back(item);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Removes the front item, blocking while the queue is empty and not
    /// closed.
    ///
    /// Returns `None` only when the queue is closed *and* empty; items
    /// buffered before close are still handed out.
    pub fn pop(&self) -> Option<T> {
        let mut inner = self.inner.lock().unwrap();
        while !inner.closed && inner.items.is_empty() {
            inner = self.not_empty.wait(inner).unwrap();
        }
        let item = inner.items.pop_front()?;
        self.not_full.notify_one();
        Some(item)
    }

    /// Closes the queue and wakes all blocked producers and consumers.
    /// Idempotent.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Number of items currently buffered.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    /// Returns `true` if no items are buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    /// The fixed capacity this queue was created with.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
