//! tcpkv - A Line-Oriented TCP Key-Value Server
//!
//! This is the main entry point for the tcpkv server. It parses the
//! command line, sets up logging and signal handling, and runs the
//! accept loop until shutdown.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tcpkv::server::{Server, ServerConfig};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Set by the signal handler; watched by the shutdown thread.
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_sig: libc::c_int) {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

/// Parse configuration from command-line arguments.
fn config_from_args() -> ServerConfig {
    let mut config = ServerConfig::default();
    let args: Vec<String> = std::env::args().collect();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                let value = flag_value(&args, i, "--port");
                config.port = parse_in_range(value, 1, 65535, config.port);
                i += 2;
            }
            "--threads" => {
                let value = flag_value(&args, i, "--threads");
                config.threads = parse_in_range(value, 1, 256, config.threads);
                i += 2;
            }
            "--max-conns" => {
                let value = flag_value(&args, i, "--max-conns");
                config.max_conns = parse_in_range(value, 1, 2_000_000, config.max_conns);
                i += 2;
            }
            "--queue-cap" => {
                let value = flag_value(&args, i, "--queue-cap");
                config.queue_cap = parse_in_range(value, 1, 2_000_000, config.queue_cap);
                i += 2;
            }
            "--help" => {
                print_help();
                std::process::exit(0);
            }
            "--version" => {
                println!("tcpkv version {}", tcpkv::VERSION);
                std::process::exit(0);
            }
            _ => {
                // Unknown arguments are ignored.
                i += 1;
            }
        }
    }

    config
}

/// Returns the value following a flag, or exits with status 1 if the
/// command line ends right after the flag.
fn flag_value<'a>(args: &'a [String], i: usize, flag: &str) -> &'a str {
    match args.get(i + 1) {
        Some(value) => value,
        None => {
            eprintln!("Error: {flag} requires a value");
            std::process::exit(1);
        }
    }
}

/// Parses a numeric flag value, silently falling back to the default when
/// the value is malformed or out of range.
fn parse_in_range<T: FromStr + PartialOrd>(value: &str, lo: T, hi: T, default: T) -> T {
    match value.parse::<T>() {
        Ok(v) if v >= lo && v <= hi => v,
        _ => default,
    }
}

fn print_help() {
    println!(
        r#"tcpkv - A Line-Oriented TCP Key-Value Server

USAGE:
    tcpkv [OPTIONS]

OPTIONS:
    --port N         Port to listen on, 1-65535 (default: 8080)
    --threads N      Worker threads, 1-256 (default: 8)
    --max-conns N    Max simultaneous connections, 1-2000000 (default: 2000)
    --queue-cap N    Connection handoff queue capacity, 1-2000000 (default: 4096)
    --version        Print version information
    --help           Print this help message

PROTOCOL:
    SET key value | GET key | DEL key | STATS | PING | QUIT

EXAMPLE:
    $ tcpkv --port 8080 --threads 8 &
    $ printf 'SET name tcpkv\nGET name\nQUIT\n' | nc 127.0.0.1 8080
    OK tcp-kv ready
    OK
    VALUE tcpkv
    OK bye
"#
    );
}

fn main() -> anyhow::Result<()> {
    let config = config_from_args();

    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    unsafe {
        libc::signal(libc::SIGINT, on_signal as *const () as libc::sighandler_t);
        libc::signal(libc::SIGTERM, on_signal as *const () as libc::sighandler_t);
    }

    let server = Arc::new(Server::bind(config)?);

    // Turn the async signal into an orderly stop() from a normal thread.
    let _watcher = {
        let server = Arc::clone(&server);
        thread::spawn(move || {
            while !SHUTDOWN.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(100));
            }
            info!("shutdown signal received, stopping server");
            server.stop();
        })
    };

    server.run()?;
    info!("server shutdown complete");
    Ok(())
}
