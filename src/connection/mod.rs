//! Connection Handling Module
//!
//! This module serves individual client connections. A worker thread picks
//! an accepted connection off the handoff queue and runs a
//! [`ConnectionHandler`] on it to completion: greet the client, then loop
//! reading one command line at a time, dispatching it, and writing the
//! reply back.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Acceptor admits the connection (counters incremented)
//!        │
//!        ▼
//! 2. Worker dequeues it and runs a ConnectionHandler
//!        │
//!        ▼
//! 3. ┌───────────────────────────────┐
//!    │  write banner                 │
//!    │  loop while server running:   │
//!    │    read line  ──────────────┐ │
//!    │    dispatch command         │ │
//!    │    write reply  ────────────┘ │
//!    └───────────────────────────────┘
//!        │ disconnect / oversize / QUIT / write failure / shutdown
//!        ▼
//! 4. Stream dropped (socket closed), counters decremented by the worker
//! ```
//!
//! [`ConnectionStats`] holds the process-wide counters reported by the
//! STATS command. The handler itself only bumps `total_requests`; the
//! active-connection count is owned by the admission path so that every
//! increment has exactly one matching decrement.

pub mod handler;

// Re-export commonly used types
pub use handler::{ConnectionHandler, ConnectionStats, BANNER};
