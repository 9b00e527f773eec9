//! Server Module
//!
//! The admission and servicing pipeline:
//!
//! ```text
//! accept ──> admission check ──> BoundedQueue ──> WorkerPool ──> serve
//!              (strict cap)      (backpressure)    (N threads)
//! ```
//!
//! [`BoundedQueue`] is a blocking FIFO with a one-shot close; a full queue
//! stalls the acceptor, a closed queue refuses new work while letting
//! workers drain what is already buffered. [`WorkerPool`] owns the N
//! long-lived threads that pull from it. [`Server`] ties it together:
//! listening socket, accept loop, strict connection cap, and shutdown
//! ordering.

pub mod acceptor;
pub mod pool;
pub mod queue;

// Re-export commonly used types
pub use acceptor::{Server, ServerConfig, ServerError};
pub use pool::WorkerPool;
pub use queue::BoundedQueue;
