//! Per-Connection Serving Loop
//!
//! Each accepted connection gets one [`ConnectionHandler`], run to
//! completion on a worker thread. The handler owns the stream; dropping
//! the handler closes the socket exactly once.

use crate::commands::CommandHandler;
use crate::protocol::{LineFramer, ReadLine, MAX_LINE_LEN};
use std::io::{self, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Greeting written to every client before the first read.
pub const BANNER: &str = "OK tcp-kv ready\n";

/// Reply that ends the session after being written (QUIT).
const BYE: &str = "OK bye\n";

/// Process-wide connection counters, reported by the STATS command.
#[derive(Debug)]
pub struct ConnectionStats {
    /// When the server started (STATS uptime is measured from here)
    start: Instant,
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently admitted connections (queued or being served)
    pub active_connections: AtomicU64,
    /// Total command lines processed
    pub total_requests: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            connections_accepted: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            total_requests: AtomicU64::new(0),
        }
    }

    /// Called by the acceptor when a connection is accepted.
    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Called exactly once per accepted connection, on whichever path
    /// releases it (rejection or worker completion).
    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    /// Called once per non-empty command line.
    pub fn request_processed(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn active(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn uptime(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for ConnectionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Serves a single client connection to completion.
pub struct ConnectionHandler {
    /// The TCP stream for this connection; dropped (closed) when the
    /// handler finishes
    stream: TcpStream,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Line framer with its buffered partial input
    framer: LineFramer,

    /// Command dispatcher (shared storage and counters behind it)
    commands: CommandHandler,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,

    /// Server lifecycle flag; the serve loop stops when it goes false
    running: Arc<AtomicBool>,
}

impl ConnectionHandler {
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        commands: CommandHandler,
        stats: Arc<ConnectionStats>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            stream,
            addr,
            framer: LineFramer::new(MAX_LINE_LEN),
            commands,
            stats,
            running,
        }
    }

    /// Runs the serve loop until the client goes away, misbehaves, quits,
    /// or the server shuts down.
    ///
    /// I/O failures are absorbed here: a connection that cannot be read
    /// from or written to is simply abandoned. Counter bookkeeping is the
    /// caller's job (see [`ConnectionStats::connection_closed`]).
    pub fn run(mut self) {
        info!(client = %self.addr, "client connected");

        if self.write_reply(BANNER).is_err() {
            debug!(client = %self.addr, "banner write failed");
            return;
        }

        while self.running.load(Ordering::SeqCst) {
            match self.framer.read_line(&mut self.stream) {
                ReadLine::Disconnected => break,
                ReadLine::Oversize => {
                    debug!(client = %self.addr, "line too long, dropping connection");
                    let _ = self.write_reply("ERR line too long\n");
                    break;
                }
                ReadLine::Line(line) => {
                    if line.is_empty() {
                        continue;
                    }

                    self.stats.request_processed();
                    let reply = self.commands.execute(&line);

                    if self.write_reply(&reply).is_err() {
                        break;
                    }
                    if reply == BYE {
                        break;
                    }
                }
            }
        }

        info!(client = %self.addr, "client disconnected");
    }

    fn write_reply(&mut self, reply: &str) -> io::Result<()> {
        self.stream.write_all(reply.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageEngine;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    fn test_stats() -> Arc<ConnectionStats> {
        Arc::new(ConnectionStats::new())
    }

    #[test]
    fn stats_open_close_pairing() {
        let stats = ConnectionStats::new();
        stats.connection_opened();
        stats.connection_opened();
        assert_eq!(stats.active(), 2);
        stats.connection_closed();
        stats.connection_closed();
        assert_eq!(stats.active(), 0);
        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn stats_requests_are_monotonic() {
        let stats = ConnectionStats::new();
        for _ in 0..5 {
            stats.request_processed();
        }
        assert_eq!(stats.total_requests(), 5);
    }

    /// Runs one handler against a real socket pair and returns the client end.
    fn spawn_handler(running: Arc<AtomicBool>) -> (TcpStream, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (stream, peer) = listener.accept().unwrap();
            let storage = Arc::new(StorageEngine::new());
            let stats = test_stats();
            let commands = CommandHandler::new(storage, Arc::clone(&stats), 1);
            ConnectionHandler::new(stream, peer, commands, stats, running).run();
        });

        let client = TcpStream::connect(addr).unwrap();
        (client, handle)
    }

    #[test]
    fn banner_then_ping() {
        let running = Arc::new(AtomicBool::new(true));
        let (client, handle) = spawn_handler(running);
        let mut reader = BufReader::new(client.try_clone().unwrap());

        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line, BANNER);

        let mut client = client;
        client.write_all(b"PING\n").unwrap();
        line.clear();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line, "PONG\n");

        drop(client);
        drop(reader);
        handle.join().unwrap();
    }

    #[test]
    fn quit_closes_the_connection() {
        let running = Arc::new(AtomicBool::new(true));
        let (mut client, handle) = spawn_handler(running);
        let mut reader = BufReader::new(client.try_clone().unwrap());

        let mut line = String::new();
        reader.read_line(&mut line).unwrap();

        client.write_all(b"QUIT\n").unwrap();
        line.clear();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line, "OK bye\n");

        // Server side hangs up after the farewell.
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).unwrap();
        assert!(rest.is_empty());

        handle.join().unwrap();
    }

    #[test]
    fn empty_lines_are_ignored() {
        let running = Arc::new(AtomicBool::new(true));
        let (mut client, handle) = spawn_handler(running);
        let mut reader = BufReader::new(client.try_clone().unwrap());

        let mut line = String::new();
        reader.read_line(&mut line).unwrap();

        client.write_all(b"\n\r\nPING\n").unwrap();
        line.clear();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line, "PONG\n");

        drop(client);
        drop(reader);
        handle.join().unwrap();
    }
}
