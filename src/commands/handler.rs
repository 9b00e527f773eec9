//! Command Parsing and Dispatch
//!
//! One framed line in, one reply string out. The first whitespace-separated
//! token is the verb, folded to uppercase; what the remaining tokens mean is
//! up to each verb.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ split verb  │───>│  dispatch   │───>│  cmd_*()    │      │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘      │
//! │                                               │             │
//! │                                               ▼             │
//! │                              StorageEngine / ConnectionStats│
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! SET is the one verb with unusual argument handling: the value is the
//! raw remainder of the line after the key, with exactly one leading space
//! stripped. `SET greeting hello  world ` stores `hello  world ` verbatim,
//! and `SET k` stores the empty string.

use crate::connection::ConnectionStats;
use crate::storage::StorageEngine;
use std::fmt::Write;
use std::sync::Arc;

/// Executes commands against the shared storage engine and counters.
#[derive(Clone)]
pub struct CommandHandler {
    /// The storage engine
    storage: Arc<StorageEngine>,
    /// Server counters, for STATS
    stats: Arc<ConnectionStats>,
    /// Worker thread count, reported by STATS
    threads: usize,
}

impl CommandHandler {
    /// Creates a new command handler over the shared server state.
    pub fn new(storage: Arc<StorageEngine>, stats: Arc<ConnectionStats>, threads: usize) -> Self {
        Self {
            storage,
            stats,
            threads,
        }
    }

    /// Executes one command line and returns the reply.
    ///
    /// The reply always ends with `\n`; STATS returns five newline-
    /// terminated lines in one string.
    pub fn execute(&self, line: &str) -> String {
        let (verb, rest) = split_token(line);
        match verb.to_ascii_uppercase().as_str() {
            "PING" => "PONG\n".to_string(),
            "GET" => self.cmd_get(rest),
            "SET" => self.cmd_set(rest),
            "DEL" => self.cmd_del(rest),
            "STATS" => self.cmd_stats(),
            "QUIT" => "OK bye\n".to_string(),
            _ => "ERR unknown command\n".to_string(),
        }
    }

    fn cmd_get(&self, args: &str) -> String {
        let (key, _) = split_token(args);
        if key.is_empty() {
            return "ERR usage: GET key\n".to_string();
        }
        match self.storage.get(key) {
            Some(value) => format!("VALUE {value}\n"),
            None => "NOTFOUND\n".to_string(),
        }
    }

    fn cmd_set(&self, args: &str) -> String {
        let (key, rest) = split_token(args);
        if key.is_empty() {
            return "ERR usage: SET key value\n".to_string();
        }
        // The value is the rest of the line, minus the one separator space.
        let value = rest.strip_prefix(' ').unwrap_or(rest);
        self.storage.set(key.to_string(), value.to_string());
        "OK\n".to_string()
    }

    fn cmd_del(&self, args: &str) -> String {
        let (key, _) = split_token(args);
        if key.is_empty() {
            return "ERR usage: DEL key\n".to_string();
        }
        if self.storage.del(key) {
            "OK\n".to_string()
        } else {
            "NOTFOUND\n".to_string()
        }
    }

    fn cmd_stats(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "UPTIME {}s", self.stats.uptime().as_secs());
        let _ = writeln!(out, "ACTIVE_CONNECTIONS {}", self.stats.active());
        let _ = writeln!(out, "TOTAL_REQUESTS {}", self.stats.total_requests());
        let _ = writeln!(out, "KEYS {}", self.storage.len());
        let _ = writeln!(out, "THREADS {}", self.threads);
        out
    }
}

/// Splits off the first whitespace-delimited token.
///
/// Skips leading whitespace, then returns the token and the remainder of
/// the string starting immediately after the token (separator included).
fn split_token(s: &str) -> (&str, &str) {
    let start = s
        .find(|c: char| !c.is_ascii_whitespace())
        .unwrap_or(s.len());
    let s = &s[start..];
    let end = s
        .find(|c: char| c.is_ascii_whitespace())
        .unwrap_or(s.len());
    (&s[..end], &s[end..])
}
