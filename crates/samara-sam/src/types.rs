//! Shared session types and input validation
//!
//! Session nicknames, looked-up hosts and datagram forward targets all end up
//! on the SAM control channel as space-delimited text, so everything here is
//! validated against a restricted character set before any socket is touched.

use std::fmt;
use std::str::FromStr;

use rand::Rng;

use crate::dest::Destination;
use crate::error::{Result, SamError};

/// Longest accepted session nickname
pub const MAX_NICKNAME_LEN: usize = 250;

/// Longest accepted domain name for lookups
pub const MAX_DOMAIN_LEN: usize = 1000;

/// Prefix for generated session nicknames
const NICKNAME_PREFIX: &str = "samara-";

/// Number of random letters in a generated nickname
const NICKNAME_RANDOM_LEN: usize = 20;

/// SAM session styles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStyle {
    /// Stream-based connections (TCP-like)
    #[default]
    Stream,
    /// Datagram-based (UDP-like), delivered to a local forward port
    Datagram,
}

impl SessionStyle {
    /// Wire form of the style, as it appears in `SESSION CREATE STYLE=`
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStyle::Stream => "STREAM",
            SessionStyle::Datagram => "DATAGRAM",
        }
    }
}

impl fmt::Display for SessionStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStyle {
    type Err = SamError;

    /// Accepts `stream`, `datagram` and the legacy alias `dgram`.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "stream" => Ok(SessionStyle::Stream),
            "datagram" | "dgram" => Ok(SessionStyle::Datagram),
            other => Err(SamError::Validation(format!(
                "unknown session style {other:?}"
            ))),
        }
    }
}

/// Local target the router forwards incoming datagrams to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Forward {
    /// A bare port on 127.0.0.1
    Port(u16),
    /// An explicit IP and port
    Host(String, u16),
}

impl Forward {
    /// Normalize to a `(host, port)` pair, validating the host.
    pub(crate) fn resolve(self) -> Result<(String, u16)> {
        match self {
            Forward::Port(port) => Ok(("127.0.0.1".to_string(), port)),
            Forward::Host(host, port) => {
                check_forward_host(&host)?;
                Ok((host, port))
            }
        }
    }
}

/// A connectable peer: either a name still to be resolved, or an already
/// resolved [`Destination`].
#[derive(Debug, Clone)]
pub enum Host {
    Name(String),
    Dest(Destination),
}

impl From<&str> for Host {
    fn from(name: &str) -> Self {
        Host::Name(name.to_string())
    }
}

impl From<String> for Host {
    fn from(name: String) -> Self {
        Host::Name(name)
    }
}

impl From<Destination> for Host {
    fn from(dest: Destination) -> Self {
        Host::Dest(dest)
    }
}

impl From<&Destination> for Host {
    fn from(dest: &Destination) -> Self {
        Host::Dest(dest.clone())
    }
}

/// Generate a transient session nickname: a recognizable prefix followed by
/// random ASCII letters.
pub(crate) fn random_nickname() -> String {
    let mut rng = rand::thread_rng();
    let mut name = String::with_capacity(NICKNAME_PREFIX.len() + NICKNAME_RANDOM_LEN);
    name.push_str(NICKNAME_PREFIX);
    for _ in 0..NICKNAME_RANDOM_LEN {
        let n: u8 = rng.gen_range(0..52);
        let ch = if n < 26 { b'a' + n } else { b'A' + (n - 26) };
        name.push(ch as char);
    }
    name
}

/// Validate a caller-supplied session nickname.
///
/// `=` would break `KEY=VALUE` framing and is rejected outright; the rest of
/// the nickname is limited to printable ASCII without spaces.
pub(crate) fn check_nickname(name: &str) -> Result<()> {
    if name.contains('=') {
        return Err(SamError::Validation(
            "invalid character '=' in nickname".to_string(),
        ));
    }
    if name.len() > MAX_NICKNAME_LEN {
        return Err(SamError::Validation(format!(
            "nickname too long: {} > {MAX_NICKNAME_LEN}",
            name.len()
        )));
    }
    for ch in name.chars() {
        if !ch.is_ascii_alphanumeric() && !ch.is_ascii_punctuation() {
            return Err(SamError::Validation(format!(
                "invalid character {ch:?} in nickname"
            )));
        }
    }
    Ok(())
}

/// Lowercase and validate a domain name for `NAMING LOOKUP`.
pub(crate) fn normalize_domain(domain: &str) -> Result<String> {
    let domain = domain.to_lowercase();
    if domain.len() > MAX_DOMAIN_LEN {
        return Err(SamError::Validation(format!(
            "domain too long: {} > {MAX_DOMAIN_LEN}",
            domain.len()
        )));
    }
    for ch in domain.chars() {
        let ok = ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '.' || ch == '-';
        if !ok {
            return Err(SamError::Validation(format!(
                "invalid character {ch:?} in domain"
            )));
        }
    }
    Ok(domain)
}

/// Validate a forward host: an IP literal, digits and dots only.
fn check_forward_host(host: &str) -> Result<()> {
    for ch in host.chars() {
        if !ch.is_ascii_digit() && ch != '.' {
            return Err(SamError::Validation(format!(
                "invalid character {ch:?} in forward address"
            )));
        }
    }
    Ok(())
}
