//! SAM control-channel wire format
//!
//! Commands are single text lines terminated by `" \n"`, optionally followed
//! by raw payload bytes in the same write. Replies are single lines of the
//! form `VERB SUBVERB KEY=VALUE ...`; `RESULT=OK` signals success and
//! `MESSAGE` carries human-readable detail on failure.

use std::collections::HashMap;
use std::fmt;
use std::io::{Read, Write};

use crate::error::Result;
use crate::reader::ReplyReader;

/// Oldest protocol version offered in the greeting
pub const SAM_MIN_VERSION: &str = "3.0";

/// The `HELLO` line opening every control connection.
pub fn greeting(max_version: &str) -> String {
    format!("HELLO VERSION MIN={SAM_MIN_VERSION} MAX={max_version}")
}

/// One parsed reply line. Ephemeral: built per line, not retained.
#[derive(Debug, Clone)]
pub struct Reply {
    pub verb: String,
    pub subverb: String,
    pub options: HashMap<String, String>,
    /// The line as received, for diagnostics.
    pub raw: String,
}

impl Reply {
    /// Split a reply line on spaces: the first two tokens are verb and
    /// subverb, the rest are `KEY=VALUE` options (tokens without `=` are
    /// ignored).
    pub fn parse(line: &str) -> Self {
        let mut parts = line.split(' ');
        let verb = parts.next().unwrap_or("").to_string();
        let subverb = parts.next().unwrap_or("").to_string();

        let mut options = HashMap::new();
        for part in parts {
            if let Some((key, value)) = part.split_once('=') {
                options.insert(key.to_string(), value.to_string());
            }
        }

        Reply {
            verb,
            subverb,
            options,
            raw: line.to_string(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    pub fn result(&self) -> Option<&str> {
        self.get("RESULT")
    }

    pub fn message(&self) -> Option<&str> {
        self.get("MESSAGE")
    }

    pub fn ok(&self) -> bool {
        self.result() == Some("OK")
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Join `KEY=VALUE` pairs with spaces, in the order given.
pub fn join_options(options: &[(String, String)]) -> String {
    options
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Send one command line, plus optional raw payload, in a single write.
pub fn send<W: Write>(sock: &mut W, line: &str, payload: Option<&[u8]>) -> Result<()> {
    let payload = payload.unwrap_or(&[]);
    let mut frame = Vec::with_capacity(line.len() + 2 + payload.len());
    frame.extend_from_slice(line.as_bytes());
    frame.extend_from_slice(b" \n");
    frame.extend_from_slice(payload);

    sock.write_all(&frame)?;
    sock.flush()?;
    Ok(())
}

/// Send one command and block for exactly one parsed reply line.
///
/// Write-then-read, never interleaved: the request is fully on the wire
/// before the first reply byte is read. A disconnect mid-reply propagates
/// immediately.
pub fn send_and_read<S: Read + Write>(sock: &mut S, line: &str) -> Result<Reply> {
    send(sock, line, None)?;
    let reply_line = ReplyReader::new(&mut *sock).next_line()?;
    log::trace!("SAM reply: {reply_line}");
    Ok(Reply::parse(&reply_line))
}
