//! # tcpkv - A Line-Oriented TCP Key-Value Server
//!
//! tcpkv is a small in-memory key-value server speaking a newline-delimited
//! ASCII protocol. It demonstrates systems programming concepts like bounded
//! producer/consumer queues, fixed-size worker pools, and stream framing.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                               tcpkv                                 │
//! │                                                                     │
//! │  ┌──────────┐    ┌──────────────┐    ┌────────────┐                 │
//! │  │ Acceptor │───>│ BoundedQueue │───>│ WorkerPool │                 │
//! │  │ (accept, │    │ (backpressure│    │ (N threads)│                 │
//! │  │  admit)  │    │   handoff)   │    └──────┬─────┘                 │
//! │  └──────────┘    └──────────────┘           │                       │
//! │                                             ▼                       │
//! │  ┌────────────┐    ┌───────────────────────────────────────────┐    │
//! │  │ LineFramer │    │             ConnectionHandler             │    │
//! │  │ (stream -> │───>│   read line -> dispatch -> write reply    │    │
//! │  │   lines)   │    └─────────────────────┬─────────────────────┘    │
//! │  └────────────┘                          │                          │
//! │                                          ▼                          │
//! │                     ┌──────────────────────────────────────────┐    │
//! │                     │               StorageEngine              │    │
//! │                     │   ┌────────┐ ┌────────┐ ┌────────┐       │    │
//! │                     │   │Shard 0 │ │Shard 1 │ │...N    │       │    │
//! │                     │   │RwLock  │ │RwLock  │ │shards  │       │    │
//! │                     │   └────────┘ └────────┘ └────────┘       │    │
//! │                     └──────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every accepted connection is counted against a strict admission cap,
//! then handed to the worker pool through a bounded queue. A full queue
//! blocks the acceptor until a worker drains it; a closed queue (shutdown)
//! rejects the connection with an error reply.
//!
//! ## Protocol
//!
//! One command per line, replies end with `\n`. Lines may be terminated
//! with `\n` or `\r\n`. The server greets each client with
//! `OK tcp-kv ready` before reading.
//!
//! | Command           | Reply                                  |
//! |-------------------|----------------------------------------|
//! | `PING`            | `PONG`                                 |
//! | `GET key`         | `VALUE <value>` or `NOTFOUND`          |
//! | `SET key value`   | `OK` (value is the rest of the line)   |
//! | `DEL key`         | `OK` or `NOTFOUND`                     |
//! | `STATS`           | five-line counters block               |
//! | `QUIT`            | `OK bye`, then the server disconnects  |
//!
//! ## Quick Start
//!
//! ```ignore
//! use tcpkv::server::{Server, ServerConfig};
//!
//! let server = Server::bind(ServerConfig::default())?;
//! server.run()?; // blocks until stop() is called
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: line framing over stream-oriented reads
//! - [`commands`]: command parsing and dispatch
//! - [`connection`]: per-connection serving loop and shared counters
//! - [`storage`]: thread-safe sharded key-value map
//! - [`server`]: bounded queue, worker pool, and the accept loop

pub mod commands;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use connection::{ConnectionHandler, ConnectionStats};
pub use protocol::{LineFramer, ReadLine};
pub use server::{BoundedQueue, Server, ServerConfig, ServerError, WorkerPool};
pub use storage::StorageEngine;

/// The default port tcpkv listens on
pub const DEFAULT_PORT: u16 = 8080;

/// The default number of worker threads
pub const DEFAULT_THREADS: usize = 8;

/// The default admission cap (simultaneously served connections)
pub const DEFAULT_MAX_CONNS: usize = 2000;

/// The default capacity of the connection handoff queue
pub const DEFAULT_QUEUE_CAP: usize = 4096;

/// Version of tcpkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
