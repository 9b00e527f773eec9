//! Accept Loop and Admission Control
//!
//! The [`Server`] owns the listening socket and the accept loop. Every
//! accepted connection is counted against a strict cap *before* it is
//! handed to the worker pool:
//!
//! ```text
//! Init -> Listening -> Accepting <-> Admitting -> ... -> Draining -> Stopped
//!                                       │
//!                                       ├── cap exceeded ──> "ERR server busy"
//!                                       └── pool closed ───> "ERR server shutting down"
//! ```
//!
//! The cap counter is incremented first and checked after; a connection
//! that observes a value above the cap is rejected and the counter rolled
//! back, so admitted connections never exceed `max_conns`. The matching
//! decrement happens on exactly one path per connection: the rejection
//! branch, or the worker's completion wrapper.
//!
//! Shutdown: [`Server::stop`] flips the running flag and half-shuts the
//! listening socket, which unblocks a pending `accept`. The accept loop
//! then stops the pool (closing the handoff queue and joining workers)
//! and closes the listener if nobody else already has.

use crate::commands::CommandHandler;
use crate::connection::{ConnectionHandler, ConnectionStats};
use crate::server::WorkerPool;
use crate::storage::StorageEngine;
use crate::{DEFAULT_MAX_CONNS, DEFAULT_PORT, DEFAULT_QUEUE_CAP, DEFAULT_THREADS};
use std::collections::HashMap;
use std::io::{self, Write};
use std::mem;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{error, info, warn};

/// Listen backlog for the server socket.
const LISTEN_BACKLOG: libc::c_int = 256;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on (all interfaces)
    pub port: u16,
    /// Number of worker threads
    pub threads: usize,
    /// Strict cap on simultaneously admitted connections
    pub max_conns: usize,
    /// Capacity of the connection handoff queue
    pub queue_cap: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            threads: DEFAULT_THREADS,
            max_conns: DEFAULT_MAX_CONNS,
            queue_cap: DEFAULT_QUEUE_CAP,
        }
    }
}

/// Errors that can occur while bringing the listening socket up.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Creating the socket failed
    #[error("socket: {0}")]
    Socket(#[source] io::Error),

    /// Enabling address reuse failed
    #[error("setsockopt: {0}")]
    SetSockOpt(#[source] io::Error),

    /// Binding to the configured port failed
    #[error("bind: {0}")]
    Bind(#[source] io::Error),

    /// Entering the listening state failed
    #[error("listen: {0}")]
    Listen(#[source] io::Error),
}

/// One admitted connection on its way through the handoff queue.
struct Admitted {
    stream: TcpStream,
    addr: SocketAddr,
    /// Registry ticket, released by the worker when serving finishes
    reg_id: Option<u64>,
}

/// The tcpkv server: listening socket, admission control, worker pool.
///
/// # Example
///
/// ```no_run
/// use tcpkv::server::{Server, ServerConfig};
///
/// # fn main() -> Result<(), tcpkv::server::ServerError> {
/// let server = Server::bind(ServerConfig::default())?;
/// server.run()?; // blocks until stop() is called from another thread
/// # Ok(())
/// # }
/// ```
pub struct Server {
    config: ServerConfig,
    storage: Arc<StorageEngine>,
    stats: Arc<ConnectionStats>,

    /// Lifecycle flag shared with every connection loop
    running: Arc<AtomicBool>,

    /// Strict admission counter, bounded by `max_conns`
    admitted: Arc<AtomicU64>,

    /// The listening socket. Whoever takes it out of this slot closes it;
    /// the exchange guarantees that happens once.
    listener: Mutex<Option<TcpListener>>,

    /// Clones of the admitted streams, so shutdown can unblock workers
    /// parked in blocking reads on idle connections.
    registry: Arc<ConnRegistry>,

    local_addr: SocketAddr,
}

/// Tracks the streams of currently admitted connections.
///
/// Workers block in `read` with no timeout; without a side channel an
/// idle connection would stall the worker join during shutdown. The
/// registry keeps a clone of each admitted stream and half-shuts them
/// all when the server drains, turning those blocked reads into EOF.
struct ConnRegistry {
    next_id: AtomicU64,
    streams: Mutex<HashMap<u64, TcpStream>>,
}

impl ConnRegistry {
    fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            streams: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a clone of `stream`. `None` if the clone fails; the
    /// connection is still served, it just cannot be force-drained.
    fn register(&self, stream: &TcpStream) -> Option<u64> {
        let clone = stream.try_clone().ok()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.streams.lock().unwrap().insert(id, clone);
        Some(id)
    }

    fn unregister(&self, id: u64) {
        self.streams.lock().unwrap().remove(&id);
    }

    /// Half-shuts every registered stream, waking blocked reads.
    fn shutdown_all(&self) {
        for stream in self.streams.lock().unwrap().values() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    fn clear(&self) {
        self.streams.lock().unwrap().clear();
    }
}

impl Server {
    /// Opens the listening socket and prepares the server.
    ///
    /// Performs the socket / setsockopt(SO_REUSEADDR) / bind / listen
    /// sequence explicitly so each stage reports its own failure. The
    /// start time for STATS uptime is recorded here.
    pub fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let listener = open_listener(config.port)?;
        let local_addr = listener.local_addr().map_err(ServerError::Socket)?;

        info!(addr = %local_addr, threads = config.threads, "listening");

        Ok(Self {
            config,
            storage: Arc::new(StorageEngine::new()),
            stats: Arc::new(ConnectionStats::new()),
            running: Arc::new(AtomicBool::new(true)),
            admitted: Arc::new(AtomicU64::new(0)),
            listener: Mutex::new(Some(listener)),
            registry: Arc::new(ConnRegistry::new()),
            local_addr,
        })
    }

    /// The address the listener is bound to. Useful when the configured
    /// port was 0 and the OS picked one.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The shared key-value store (for embedding and tests).
    pub fn storage(&self) -> &Arc<StorageEngine> {
        &self.storage
    }

    /// Runs the accept loop on the calling thread until [`stop`](Self::stop)
    /// is invoked or the pool refuses a connection during shutdown.
    ///
    /// On return the worker pool has been stopped (all dequeued jobs
    /// completed, workers joined) and the listening socket is closed.
    pub fn run(&self) -> Result<(), ServerError> {
        let listener = match &*self.listener.lock().unwrap() {
            Some(l) => l.try_clone().map_err(ServerError::Socket)?,
            // stop() won the race before run() started; nothing to do.
            None => return Ok(()),
        };

        let mut pool: WorkerPool<Admitted> =
            WorkerPool::new(self.config.threads, self.config.queue_cap);
        {
            let commands = CommandHandler::new(
                Arc::clone(&self.storage),
                Arc::clone(&self.stats),
                self.config.threads,
            );
            let stats = Arc::clone(&self.stats);
            let running = Arc::clone(&self.running);
            let admitted = Arc::clone(&self.admitted);
            let registry = Arc::clone(&self.registry);

            pool.start(move |conn: Admitted| {
                ConnectionHandler::new(
                    conn.stream,
                    conn.addr,
                    commands.clone(),
                    Arc::clone(&stats),
                    Arc::clone(&running),
                )
                .run();
                if let Some(id) = conn.reg_id {
                    registry.unregister(id);
                }
                stats.connection_closed();
                admitted.fetch_sub(1, Ordering::SeqCst);
            });
        }

        while self.running.load(Ordering::SeqCst) {
            let (stream, addr) = match listener.accept() {
                Ok(pair) => pair,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    if !self.running.load(Ordering::SeqCst) {
                        break; // stop() shut the listener down under us
                    }
                    error!(error = %e, "accept failed");
                    continue;
                }
            };

            self.stats.connection_opened();

            let now = self.admitted.fetch_add(1, Ordering::SeqCst) + 1;
            if now > self.config.max_conns as u64 {
                warn!(client = %addr, "rejecting connection: server busy");
                reject(stream, "ERR server busy\n");
                self.stats.connection_closed();
                self.admitted.fetch_sub(1, Ordering::SeqCst);
                continue;
            }

            let reg_id = self.registry.register(&stream);
            let conn = Admitted {
                stream,
                addr,
                reg_id,
            };
            if let Err(conn) = pool.submit(conn) {
                warn!(client = %conn.addr, "rejecting connection: shutting down");
                if let Some(id) = conn.reg_id {
                    self.registry.unregister(id);
                }
                reject(conn.stream, "ERR server shutting down\n");
                self.stats.connection_closed();
                self.admitted.fetch_sub(1, Ordering::SeqCst);
                break;
            }
        }

        info!("accept loop finished, draining workers");
        // Wake workers parked in reads on idle connections, then drain.
        self.registry.shutdown_all();
        pool.stop();
        self.registry.clear();

        drop(listener);
        self.close_listener();
        Ok(())
    }

    /// Requests shutdown: flips the running flag and half-shuts the
    /// listening socket so a blocked `accept` returns. Safe to call from
    /// any thread, any number of times.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.close_listener();
    }

    /// Takes the listener out of its slot and closes it. The take is the
    /// double-close guard: only the first caller gets the handle.
    fn close_listener(&self) {
        if let Some(listener) = self.listener.lock().unwrap().take() {
            unsafe {
                libc::shutdown(listener.as_raw_fd(), libc::SHUT_RDWR);
            }
            // dropped here, closing the descriptor
        }
    }
}

/// Writes a one-line refusal and closes the connection.
fn reject(mut stream: TcpStream, reply: &str) {
    let _ = stream.write_all(reply.as_bytes());
}

/// Opens a TCP listener on all interfaces with address reuse and a fixed
/// backlog, reporting each failing stage separately.
fn open_listener(port: u16) -> Result<TcpListener, ServerError> {
    let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_STREAM, 0) };
    if fd < 0 {
        return Err(ServerError::Socket(io::Error::last_os_error()));
    }
    // Owned from here on: error paths below close the descriptor.
    let fd = unsafe { OwnedFd::from_raw_fd(fd) };

    let yes: libc::c_int = 1;
    let rc = unsafe {
        libc::setsockopt(
            fd.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &yes as *const _ as *const libc::c_void,
            mem::size_of_val(&yes) as libc::socklen_t,
        )
    };
    if rc < 0 {
        return Err(ServerError::SetSockOpt(io::Error::last_os_error()));
    }

    let mut addr: libc::sockaddr_in = unsafe { mem::zeroed() };
    addr.sin_family = libc::AF_INET as libc::sa_family_t;
    addr.sin_addr.s_addr = libc::INADDR_ANY.to_be();
    addr.sin_port = port.to_be();

    let rc = unsafe {
        libc::bind(
            fd.as_raw_fd(),
            &addr as *const _ as *const libc::sockaddr,
            mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        return Err(ServerError::Bind(io::Error::last_os_error()));
    }

    let rc = unsafe { libc::listen(fd.as_raw_fd(), LISTEN_BACKLOG) };
    if rc < 0 {
        return Err(ServerError::Listen(io::Error::last_os_error()));
    }

    Ok(TcpListener::from(fd))
}
