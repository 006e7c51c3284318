//! SAM session controller
//!
//! The controller owns the handshake policy for one SAM bridge and a cache
//! of resolved names. Stateless operations (API check, lookups, key
//! generation) run over short-lived scoped connections; creating a session
//! retains its control connection, because the session lives exactly as
//! long as that socket stays open.

use std::collections::HashMap;
use std::net::{Shutdown, SocketAddr, TcpStream, UdpSocket};
use std::sync::Mutex;
use std::time::Duration;

use socket2::SockRef;

use crate::dest::{Destination, SigType};
use crate::error::{Result, SamError};
use crate::socket::{DatagramSocket, StreamSocket};
use crate::transaction::{StreamAccept, StreamConnect};
use crate::types::{check_nickname, normalize_domain, random_nickname, Forward, Host, SessionStyle};
use crate::wire;

/// Default SAM control port
pub const DEFAULT_SAM_PORT: u16 = 7656;

/// Default SAM UDP port for forwarded datagrams
pub const DEFAULT_DGRAM_PORT: u16 = 7655;

/// Newest protocol version offered in the greeting
pub const DEFAULT_MAX_VERSION: &str = "3.1";

/// Default control-channel read timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-controller connection settings, immutable once the controller is
/// built.
#[derive(Debug, Clone)]
pub struct SamConfig {
    /// TCP address of the SAM bridge
    pub sam_addr: SocketAddr,
    /// UDP address datagrams are exchanged with
    pub dgram_addr: SocketAddr,
    /// Highest protocol version to negotiate
    pub max_version: String,
    /// Read timeout on control connections
    pub timeout: Duration,
}

impl Default for SamConfig {
    fn default() -> Self {
        SamConfig {
            sam_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_SAM_PORT)),
            dgram_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_DGRAM_PORT)),
            max_version: DEFAULT_MAX_VERSION.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Open a control connection and greet the bridge.
///
/// Keepalive keeps long-lived session sockets from being dropped by
/// middleboxes; the read timeout bounds every control-channel wait. A
/// non-OK greeting reply fails with the reply attached.
pub(crate) fn handshake(config: &SamConfig) -> Result<TcpStream> {
    let mut stream = TcpStream::connect_timeout(&config.sam_addr, config.timeout)?;
    SockRef::from(&stream).set_keepalive(true)?;
    stream.set_read_timeout(Some(config.timeout))?;

    let reply = wire::send_and_read(&mut stream, &wire::greeting(&config.max_version))?;
    if reply.ok() {
        log::debug!("SAM handshake with {} done", config.sam_addr);
        Ok(stream)
    } else {
        Err(SamError::Handshake(reply))
    }
}

/// Run `op` over a throwaway control connection, shutting it down on every
/// exit path. Keeps one-shot operations from ever being confused with the
/// retained socket that owns a session.
pub(crate) fn with_handshake<T>(
    config: &SamConfig,
    op: impl FnOnce(&mut TcpStream) -> Result<T>,
) -> Result<T> {
    let mut sock = handshake(config)?;
    let outcome = op(&mut sock);
    let _ = sock.shutdown(Shutdown::Both);
    outcome
}

/// Options for [`Controller::create_dest`].
#[derive(Debug, Default)]
pub struct SessionOptions {
    /// Session nickname; generated when absent
    pub name: Option<String>,
    /// Transport style of the session
    pub style: SessionStyle,
    /// Local forward target for incoming datagrams
    pub forward: Option<Forward>,
    /// Extra I2CP options passed through to the router
    pub i2cp: Vec<(String, String)>,
}

/// Client-side handle to one SAM bridge.
pub struct Controller {
    config: SamConfig,
    ns_cache: Mutex<HashMap<String, Destination>>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller").finish_non_exhaustive()
    }
}

impl Controller {
    /// Connect to the default bridge address and verify it answers.
    pub fn new() -> Result<Self> {
        Self::with_config(SamConfig::default())
    }

    /// Build a controller and fail fast if the bridge is unreachable.
    pub fn with_config(config: SamConfig) -> Result<Self> {
        let controller = Controller {
            config,
            ns_cache: Mutex::new(HashMap::new()),
        };
        controller.check_api()?;
        Ok(controller)
    }

    pub fn config(&self) -> &SamConfig {
        &self.config
    }

    /// A bare scoped handshake: proves the SAM bridge is there and speaks
    /// our version.
    fn check_api(&self) -> Result<()> {
        with_handshake(&self.config, |_sock| Ok(()))?;
        log::debug!("SAM bridge at {} answers", self.config.sam_addr);
        Ok(())
    }

    /// Resolve a name to a destination.
    ///
    /// An already resolved destination is returned unchanged without any
    /// I/O. Names are normalized, checked against the cache, and otherwise
    /// looked up over a scoped connection. Resolved entries are cached
    /// under their derived `.b32.i2p` address, not under the queried
    /// alias, since several aliases may resolve to one destination.
    pub fn lookup(&self, host: impl Into<Host>) -> Result<Destination> {
        let name = match host.into() {
            Host::Dest(dest) => return Ok(dest),
            Host::Name(name) => name,
        };
        let domain = normalize_domain(&name)?;

        if let Some(dest) = self.cache_get(&domain) {
            return Ok(dest);
        }

        let reply = with_handshake(&self.config, |sock| {
            wire::send_and_read(sock, &format!("NAMING LOOKUP NAME={domain}"))
        })?;

        let value = if reply.ok() { reply.get("VALUE") } else { None };
        let dest = match value {
            Some(value) => Destination::from_base64(value)?,
            None => {
                return Err(SamError::NameResolution {
                    name: domain,
                    reply,
                })
            }
        };

        log::debug!("resolved {} to {}", domain, dest.b32_addr());
        self.cache_put(dest.b32_addr(), dest.clone());
        Ok(dest)
    }

    /// Create a session and its local destination.
    ///
    /// Opens a dedicated control connection that is retained inside the
    /// returned [`LocalDest`]; the session dies when that socket closes.
    /// A forward target is folded into the I2CP options as `HOST`/`PORT`,
    /// overriding caller-supplied values for those keys.
    pub fn create_dest(&self, options: SessionOptions) -> Result<LocalDest<'_>> {
        let name = match options.name {
            Some(name) => {
                check_nickname(&name)?;
                name
            }
            None => random_nickname(),
        };
        let forward = match options.forward {
            Some(forward) => Some(forward.resolve()?),
            None => None,
        };

        let mut i2cp = options.i2cp;
        if let Some((host, port)) = &forward {
            upsert(&mut i2cp, "HOST", host.clone());
            upsert(&mut i2cp, "PORT", port.to_string());
        }

        let sig_type = SigType::default();
        let mut sock = handshake(&self.config)?;

        let mut cmd = format!(
            "SESSION CREATE STYLE={} DESTINATION=TRANSIENT SIGNATURE_TYPE={} ID={} ",
            options.style.as_str(),
            sig_type.code(),
            name
        );
        cmd.push_str(&wire::join_options(&i2cp));

        let reply = wire::send_and_read(&mut sock, &cmd)?;
        if !reply.ok() {
            return Err(SamError::SessionCreate(reply));
        }
        let dest = match reply.get("DESTINATION") {
            Some(keyfile) => Destination::private_from_base64(keyfile, sig_type)?,
            None => return Err(SamError::SessionCreate(reply)),
        };

        log::info!(
            "session {} created (style {}, {})",
            name,
            options.style,
            dest.b32_addr()
        );

        Ok(LocalDest {
            controller: self,
            dest,
            name,
            style: options.style,
            forward,
            sam_sock: Some(sock),
        })
    }

    /// Mint a private destination without binding a session.
    pub fn generate_dest(&self) -> Result<Destination> {
        let sig_type = SigType::default();
        let reply = with_handshake(&self.config, |sock| {
            wire::send_and_read(
                sock,
                &format!("DEST GENERATE SIGNATURE_TYPE={}", sig_type.code()),
            )
        })?;

        match reply.get("PRIV") {
            Some(keyfile) => Destination::private_from_base64(keyfile, sig_type),
            None => Err(SamError::KeyGeneration(reply)),
        }
    }

    fn cache_get(&self, domain: &str) -> Option<Destination> {
        self.ns_cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(domain)
            .cloned()
    }

    fn cache_put(&self, addr: String, dest: Destination) {
        // racing lookups of the same name are harmless; last write wins
        self.ns_cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(addr, dest);
    }
}

/// A session-bound private destination.
///
/// Holds the control connection that keeps the session alive. Dropping the
/// value (or calling [`close`](LocalDest::close)) shuts that connection
/// down and with it the session.
pub struct LocalDest<'a> {
    controller: &'a Controller,
    dest: Destination,
    name: String,
    style: SessionStyle,
    forward: Option<(String, u16)>,
    sam_sock: Option<TcpStream>,
}

impl<'a> std::fmt::Debug for LocalDest<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalDest")
            .field("name", &self.name)
            .field("style", &self.style)
            .field("forward", &self.forward)
            .finish_non_exhaustive()
    }
}

impl<'a> LocalDest<'a> {
    pub fn dest(&self) -> &Destination {
        &self.dest
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn style(&self) -> SessionStyle {
        self.style
    }

    pub fn forward(&self) -> Option<(&str, u16)> {
        self.forward.as_ref().map(|(host, port)| (host.as_str(), *port))
    }

    pub fn base64(&self) -> String {
        self.dest.base64()
    }

    pub fn base32(&self) -> String {
        self.dest.base32()
    }

    pub fn b32_addr(&self) -> String {
        self.dest.b32_addr()
    }

    /// Open a stream to another destination.
    ///
    /// Resolves the peer, opens a fresh control connection and starts the
    /// connect exchange on it; call
    /// [`parse_headers`](StreamSocket::parse_headers) on the result to wait
    /// for the stream to be up.
    pub fn connect(&self, other: impl Into<Host>) -> Result<StreamSocket> {
        if self.style != SessionStyle::Stream {
            return Err(SamError::Validation(format!(
                "cannot STREAM CONNECT on a {} session",
                self.style
            )));
        }
        let dest = self.controller.lookup(other)?;
        let sock = handshake(&self.controller.config)?;
        StreamSocket::start(sock, Box::new(StreamConnect::new(&self.name, &dest)))
    }

    /// Register to accept one incoming stream.
    ///
    /// Returns immediately; `parse_headers` on the result blocks until a
    /// peer connects, for as long as that takes. Each socket accepts one
    /// stream; run several for concurrent accepts.
    pub fn register_accept(&self) -> Result<StreamSocket> {
        if self.style != SessionStyle::Stream {
            return Err(SamError::Validation(format!(
                "cannot STREAM ACCEPT on a {} session",
                self.style
            )));
        }
        let sock = handshake(&self.controller.config)?;
        StreamSocket::start(sock, Box::new(StreamAccept::new(&self.name)))
    }

    /// Bind the local UDP socket the router forwards datagrams to.
    ///
    /// Only forward mode is supported; polling datagrams over the control
    /// channel is refused rather than half-working.
    pub fn bind(&self) -> Result<DatagramSocket<'a>> {
        if self.style != SessionStyle::Datagram {
            return Err(SamError::Validation(format!(
                "cannot bind a datagram socket on a {} session",
                self.style
            )));
        }
        match &self.forward {
            Some((host, port)) => {
                let sock = UdpSocket::bind((host.as_str(), *port))?;
                Ok(DatagramSocket::new(
                    sock,
                    self.controller,
                    self.name.clone(),
                ))
            }
            None => Err(SamError::Unsupported(
                "legacy datagram receive over the control channel",
            )),
        }
    }

    /// Tear the session down by closing its control connection.
    pub fn close(&mut self) -> Result<()> {
        if let Some(sock) = self.sam_sock.take() {
            log::info!("closing session {}", self.name);
            match sock.shutdown(Shutdown::Both) {
                Err(e) if e.kind() == std::io::ErrorKind::NotConnected => {}
                other => other?,
            }
        }
        Ok(())
    }
}

impl Drop for LocalDest<'_> {
    fn drop(&mut self) {
        if let Some(sock) = self.sam_sock.take() {
            let _ = sock.shutdown(Shutdown::Both);
        }
    }
}

fn upsert(options: &mut Vec<(String, String)>, key: &str, value: String) {
    match options.iter_mut().find(|(k, _)| k == key) {
        Some((_, existing)) => *existing = value,
        None => options.push((key.to_string(), value)),
    }
}
