//! Resumable reply-line reader
//!
//! SAM replies are `\n`-terminated text lines, but on a stream session the
//! very same socket carries raw payload bytes right after the reply headers.
//! The reader therefore pulls one byte at a time, never consuming past the
//! terminating newline, and keeps the partial line buffered across
//! would-block and timeout conditions so a stalled read can simply be
//! retried.

use std::io::{self, Read};

use crate::error::{Result, SamError};

/// One poll of the reader: either a complete line, or a recoverable stall.
///
/// `Pending` is not a failure of the sequence. The partial line stays
/// buffered and the next poll resumes where this one stopped. Only the
/// errors returned through `Result` terminate the reader.
#[derive(Debug)]
pub enum LinePoll {
    /// A complete reply line, newline stripped.
    Line(String),
    /// The underlying read would block or timed out; retry later.
    Pending(io::Error),
}

/// Line scanner over a byte stream.
///
/// The sequence of lines is infinite and non-restartable: end-of-file in the
/// middle of a line is a fatal [`SamError::Disconnected`], not a line.
#[derive(Debug)]
pub struct ReplyReader<R> {
    inner: R,
    partial: Vec<u8>,
}

impl<R: Read> ReplyReader<R> {
    pub fn new(inner: R) -> Self {
        ReplyReader {
            inner,
            partial: Vec::new(),
        }
    }

    /// Try to complete the current line.
    ///
    /// Returns `Ok(LinePoll::Line)` when a full line is available and
    /// `Ok(LinePoll::Pending)` when the transport stalled; in the latter case
    /// everything read so far is retained for the next poll. A clean or
    /// mid-line EOF and any other I/O failure are fatal.
    pub fn poll_line(&mut self) -> Result<LinePoll> {
        let mut byte = [0u8; 1];
        loop {
            match self.inner.read(&mut byte) {
                Ok(0) => {
                    let partial = String::from_utf8_lossy(&self.partial).into_owned();
                    return Err(SamError::Disconnected(partial));
                }
                Ok(_) => {
                    if byte[0] == b'\n' {
                        let line = std::mem::take(&mut self.partial);
                        return Ok(LinePoll::Line(
                            String::from_utf8_lossy(&line).into_owned(),
                        ));
                    }
                    self.partial.push(byte[0]);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::TimedOut =>
                {
                    return Ok(LinePoll::Pending(e));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Read one line, treating a stall as an error.
    ///
    /// This is the control-channel discipline: a command issuer that asked
    /// for exactly one reply treats a timeout as a failed exchange.
    pub fn next_line(&mut self) -> Result<String> {
        match self.poll_line()? {
            LinePoll::Line(line) => Ok(line),
            LinePoll::Pending(e) => Err(e.into()),
        }
    }

    /// Discard any buffered partial line.
    pub fn clear(&mut self) {
        self.partial.clear();
    }
}
