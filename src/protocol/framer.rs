//! Buffered Line Framer
//!
//! Converts a byte stream into newline-delimited lines.
//!
//! ## How the Framer Works
//!
//! The framer keeps an accumulator of bytes read so far. Each call to
//! [`LineFramer::read_line`] either:
//!
//! 1. Finds a `\n` in the accumulator and returns everything before it
//!    (minus an optional trailing `\r`) as a [`ReadLine::Line`], or
//! 2. Reads another chunk from the stream and tries again.
//!
//! A read of zero bytes or a hard error is [`ReadLine::Disconnected`].
//! A line longer than the configured maximum, or an accumulator that grows
//! past the maximum plus one chunk without ever seeing a newline, is
//! [`ReadLine::Oversize`] - the caller is expected to drop the connection
//! after that, so the framer makes no promise of being usable again.

use bytes::{Buf, BytesMut};
use std::io::{ErrorKind, Read};

/// Maximum accepted line length in bytes (not counting the terminator).
pub const MAX_LINE_LEN: usize = 8192;

/// How many bytes we pull from the stream per read.
const READ_CHUNK: usize = 4096;

/// Outcome of one framing attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadLine {
    /// A complete line, without the `\n` terminator or a trailing `\r`.
    Line(String),
    /// The peer closed the connection or the read failed hard.
    Disconnected,
    /// The line exceeded the maximum length. Terminal for the connection.
    Oversize,
}

/// Assembles lines from a stream-oriented byte source.
///
/// # Example
///
/// ```
/// use tcpkv::protocol::{LineFramer, ReadLine, MAX_LINE_LEN};
/// use std::io::Cursor;
///
/// let mut framer = LineFramer::new(MAX_LINE_LEN);
/// let mut stream = Cursor::new(b"PING\r\nGET key\n".to_vec());
///
/// assert_eq!(framer.read_line(&mut stream), ReadLine::Line("PING".to_string()));
/// assert_eq!(framer.read_line(&mut stream), ReadLine::Line("GET key".to_string()));
/// assert_eq!(framer.read_line(&mut stream), ReadLine::Disconnected);
/// ```
#[derive(Debug)]
pub struct LineFramer {
    /// Bytes read from the stream but not yet returned as lines
    buf: BytesMut,

    /// Maximum accepted line length
    max_line: usize,
}

impl LineFramer {
    /// Creates a framer with the given maximum line length.
    pub fn new(max_line: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(READ_CHUNK),
            max_line,
        }
    }

    /// Reads one line from `reader`, buffering across partial reads.
    ///
    /// Blocks until a full line is available, the peer disconnects, or the
    /// line is determined to be oversize. `ErrorKind::Interrupted` reads
    /// are retried.
    pub fn read_line<R: Read>(&mut self, reader: &mut R) -> ReadLine {
        loop {
            // A full line may already be buffered from an earlier read.
            if let Some(pos) = find_newline(&self.buf) {
                let mut line = self.buf.split_to(pos);
                self.buf.advance(1); // consume the '\n'

                if line.last() == Some(&b'\r') {
                    line.truncate(line.len() - 1);
                }
                if line.len() > self.max_line {
                    return ReadLine::Oversize;
                }
                return ReadLine::Line(String::from_utf8_lossy(&line).into_owned());
            }

            let mut chunk = [0u8; READ_CHUNK];
            let n = match reader.read(&mut chunk) {
                Ok(0) => return ReadLine::Disconnected,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(_) => return ReadLine::Disconnected,
            };
            self.buf.extend_from_slice(&chunk[..n]);

            // A client that never sends '\n' must not grow the buffer forever.
            if self.buf.len() > self.max_line + READ_CHUNK {
                return ReadLine::Oversize;
            }
        }
    }

    /// Number of bytes buffered but not yet framed.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

fn find_newline(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&b| b == b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::{self, Cursor};

    /// A reader that yields a fixed script of results, then EOF.
    struct ScriptedReader {
        script: VecDeque<io::Result<Vec<u8>>>,
    }

    impl ScriptedReader {
        fn new(script: Vec<io::Result<Vec<u8>>>) -> Self {
            Self {
                script: script.into(),
            }
        }
    }

    impl Read for ScriptedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.script.pop_front() {
                None => Ok(0),
                Some(Err(e)) => Err(e),
                Some(Ok(data)) => {
                    assert!(data.len() <= buf.len(), "script chunk larger than read buffer");
                    buf[..data.len()].copy_from_slice(&data);
                    Ok(data.len())
                }
            }
        }
    }

    fn line(s: &str) -> ReadLine {
        ReadLine::Line(s.to_string())
    }

    #[test]
    fn single_line() {
        let mut framer = LineFramer::new(MAX_LINE_LEN);
        let mut stream = Cursor::new(b"GET key\n".to_vec());
        assert_eq!(framer.read_line(&mut stream), line("GET key"));
    }

    #[test]
    fn crlf_and_lf_yield_the_same_line() {
        let mut framer = LineFramer::new(MAX_LINE_LEN);
        let mut stream = Cursor::new(b"PING\r\nPING\n".to_vec());
        assert_eq!(framer.read_line(&mut stream), line("PING"));
        assert_eq!(framer.read_line(&mut stream), line("PING"));
    }

    #[test]
    fn line_split_across_reads() {
        let mut framer = LineFramer::new(MAX_LINE_LEN);
        let mut stream = ScriptedReader::new(vec![
            Ok(b"SET k".to_vec()),
            Ok(b"ey va".to_vec()),
            Ok(b"lue\n".to_vec()),
        ]);
        assert_eq!(framer.read_line(&mut stream), line("SET key value"));
    }

    #[test]
    fn multiple_lines_in_one_read() {
        let mut framer = LineFramer::new(MAX_LINE_LEN);
        let mut stream = Cursor::new(b"a\nb\nc\n".to_vec());
        assert_eq!(framer.read_line(&mut stream), line("a"));
        assert_eq!(framer.read_line(&mut stream), line("b"));
        assert_eq!(framer.read_line(&mut stream), line("c"));
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn empty_lines_are_returned() {
        let mut framer = LineFramer::new(MAX_LINE_LEN);
        let mut stream = Cursor::new(b"\n\r\n".to_vec());
        assert_eq!(framer.read_line(&mut stream), line(""));
        assert_eq!(framer.read_line(&mut stream), line(""));
    }

    #[test]
    fn disconnect_on_eof() {
        let mut framer = LineFramer::new(MAX_LINE_LEN);
        let mut stream = Cursor::new(Vec::new());
        assert_eq!(framer.read_line(&mut stream), ReadLine::Disconnected);
    }

    #[test]
    fn eof_with_partial_line_is_disconnect() {
        let mut framer = LineFramer::new(MAX_LINE_LEN);
        let mut stream = Cursor::new(b"no newline".to_vec());
        assert_eq!(framer.read_line(&mut stream), ReadLine::Disconnected);
    }

    #[test]
    fn interrupted_reads_are_retried() {
        let mut framer = LineFramer::new(MAX_LINE_LEN);
        let mut stream = ScriptedReader::new(vec![
            Err(io::Error::new(ErrorKind::Interrupted, "signal")),
            Ok(b"PING\n".to_vec()),
        ]);
        assert_eq!(framer.read_line(&mut stream), line("PING"));
    }

    #[test]
    fn hard_error_is_disconnect() {
        let mut framer = LineFramer::new(MAX_LINE_LEN);
        let mut stream = ScriptedReader::new(vec![Err(io::Error::new(
            ErrorKind::ConnectionReset,
            "reset",
        ))]);
        assert_eq!(framer.read_line(&mut stream), ReadLine::Disconnected);
    }

    #[test]
    fn max_length_line_is_accepted() {
        let mut framer = LineFramer::new(MAX_LINE_LEN);
        let mut payload = vec![b'a'; MAX_LINE_LEN];
        payload.push(b'\n');
        let mut stream = Cursor::new(payload);
        match framer.read_line(&mut stream) {
            ReadLine::Line(l) => assert_eq!(l.len(), MAX_LINE_LEN),
            other => panic!("expected line, got {other:?}"),
        }
    }

    #[test]
    fn one_byte_over_max_is_oversize() {
        let mut framer = LineFramer::new(MAX_LINE_LEN);
        let mut payload = vec![b'a'; MAX_LINE_LEN + 1];
        payload.push(b'\n');
        let mut stream = Cursor::new(payload);
        assert_eq!(framer.read_line(&mut stream), ReadLine::Oversize);
    }

    #[test]
    fn cr_does_not_count_against_the_limit() {
        let mut framer = LineFramer::new(MAX_LINE_LEN);
        let mut payload = vec![b'a'; MAX_LINE_LEN];
        payload.extend_from_slice(b"\r\n");
        let mut stream = Cursor::new(payload);
        match framer.read_line(&mut stream) {
            ReadLine::Line(l) => assert_eq!(l.len(), MAX_LINE_LEN),
            other => panic!("expected line, got {other:?}"),
        }
    }

    #[test]
    fn unterminated_flood_is_oversize() {
        let mut framer = LineFramer::new(MAX_LINE_LEN);
        // More than max + one chunk, never a newline.
        let mut stream = Cursor::new(vec![b'a'; MAX_LINE_LEN + READ_CHUNK + 1]);
        assert_eq!(framer.read_line(&mut stream), ReadLine::Oversize);
    }

    #[test]
    fn accumulator_stays_bounded() {
        let mut framer = LineFramer::new(MAX_LINE_LEN);
        let mut stream = Cursor::new(vec![b'a'; 64 * 1024]);
        assert_eq!(framer.read_line(&mut stream), ReadLine::Oversize);
        assert!(framer.buffered() <= MAX_LINE_LEN + 2 * READ_CHUNK);
    }

    #[test]
    fn non_utf8_bytes_do_not_panic() {
        let mut framer = LineFramer::new(MAX_LINE_LEN);
        let mut stream = Cursor::new(b"\xff\xfe cmd\n".to_vec());
        match framer.read_line(&mut stream) {
            ReadLine::Line(l) => assert!(l.ends_with(" cmd")),
            other => panic!("expected line, got {other:?}"),
        }
    }
}
