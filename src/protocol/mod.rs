//! Protocol Module
//!
//! This module assembles newline-delimited lines from a stream-oriented
//! byte source. TCP gives no message boundaries: a single read may carry
//! half a command, or three commands and half of a fourth. The
//! [`LineFramer`] buffers whatever arrives and hands back one line at a
//! time, stripping an optional trailing `\r` and flagging lines that
//! exceed the configured maximum length.

pub mod framer;

// Re-export commonly used types
pub use framer::{LineFramer, ReadLine, MAX_LINE_LEN};
