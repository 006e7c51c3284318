//! Data-plane sockets
//!
//! [`StreamSocket`] wraps the TCP connection carrying a stream exchange and
//! afterwards the raw peer data. [`DatagramSocket`] wraps the local UDP
//! socket the router forwards datagrams to. Both deliberately expose a
//! narrow surface: on a SAM-tunneled socket there is nothing to `bind`,
//! `listen`, `accept` or `connect` to, so those operations do not exist on
//! these types at all.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, UdpSocket};
use std::time::Duration;

use crate::controller::Controller;
use crate::dest::Destination;
use crate::error::{Result, SamError};
use crate::reader::{LinePoll, ReplyReader};
use crate::transaction::{parse_dest_token, Headers, Transaction};
use crate::types::Host;
use crate::wire;

/// Room reserved for the source-destination header line when receiving a
/// forwarded datagram.
pub const DGRAM_HEADER_ALLOWANCE: usize = 1024;

/// A stream connection tunneled through SAM.
///
/// Construction sends the pending request of its exchange;
/// [`parse_headers`](StreamSocket::parse_headers) then drives the exchange to
/// its final value. After that the socket is a plain byte stream: use the
/// [`Read`] and [`Write`] impls.
pub struct StreamSocket {
    stream: TcpStream,
    reader: ReplyReader<TcpStream>,
    exchange: Box<dyn Transaction + Send>,
    headers: Option<Headers>,
    closed: bool,
}

impl StreamSocket {
    /// Wrap a freshly handshaken control connection and its exchange. An
    /// outstanding request line is sent immediately, while the handshake
    /// read timeout is still in force; afterwards the socket turns blocking.
    pub(crate) fn start(
        mut stream: TcpStream,
        mut exchange: Box<dyn Transaction + Send>,
    ) -> Result<Self> {
        if let Some(request) = exchange.take_request() {
            wire::send(&mut stream, &request, None)?;
        }
        stream.set_read_timeout(None)?;
        let reader = ReplyReader::new(stream.try_clone()?);

        Ok(StreamSocket {
            stream,
            reader,
            exchange,
            headers: None,
            closed: false,
        })
    }

    /// Drive the exchange until it produces its final value.
    ///
    /// A would-block or timed-out read surfaces as a retryable error with
    /// all buffered state intact; call again to resume. For an accept this
    /// blocks until a peer actually connects, which may be arbitrarily long.
    /// Once resolved, the value is kept and returned on every later call.
    pub fn parse_headers(&mut self) -> Result<Headers> {
        if let Some(headers) = &self.headers {
            return Ok(headers.clone());
        }
        loop {
            match self.reader.poll_line()? {
                LinePoll::Pending(condition) => return Err(condition.into()),
                LinePoll::Line(line) => {
                    if let Some(headers) = self.exchange.advance(&line)? {
                        self.headers = Some(headers.clone());
                        return Ok(headers);
                    }
                }
            }
        }
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        Ok(self.stream.set_read_timeout(timeout)?)
    }

    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        Ok(self.stream.set_write_timeout(timeout)?)
    }

    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        Ok(self.stream.set_nonblocking(nonblocking)?)
    }

    pub fn shutdown(&self, how: Shutdown) -> Result<()> {
        Ok(self.stream.shutdown(how)?)
    }

    /// Release buffered exchange state and shut the connection down.
    /// Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.reader.clear();
        match self.stream.shutdown(Shutdown::Both) {
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => Ok(other?),
        }
    }
}

impl std::fmt::Debug for StreamSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSocket")
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Read for StreamSocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for StreamSocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

/// Local endpoint of a datagram session in forward mode.
///
/// Outgoing datagrams always go to the bridge's UDP port, never to an
/// arbitrary address; incoming ones are only accepted from it.
pub struct DatagramSocket<'a> {
    sock: UdpSocket,
    controller: &'a Controller,
    nickname: String,
}

impl<'a> std::fmt::Debug for DatagramSocket<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatagramSocket")
            .field("nickname", &self.nickname)
            .finish_non_exhaustive()
    }
}

impl<'a> DatagramSocket<'a> {
    pub(crate) fn new(sock: UdpSocket, controller: &'a Controller, nickname: String) -> Self {
        DatagramSocket {
            sock,
            controller,
            nickname,
        }
    }

    /// Send a datagram to a name or destination, resolving it first.
    ///
    /// The payload is prefixed with the plaintext routing header the bridge
    /// expects and the whole frame goes to the configured datagram-forward
    /// address.
    pub fn transmit(&self, payload: &[u8], to: impl Into<Host>) -> Result<usize> {
        let dest = self.controller.lookup(to)?;
        let frame = pack_datagram(
            &self.controller.config().max_version,
            &self.nickname,
            &dest,
            &[],
            payload,
        );
        Ok(self.sock.send_to(&frame, self.controller.config().dgram_addr)?)
    }

    /// Receive one forwarded datagram: `(payload, source destination)`.
    ///
    /// The sender address must be the bridge's datagram port; anything else
    /// is rejected before the payload is looked at, so a local process
    /// cannot spoof delivery.
    pub fn collect(&self, bufsize: usize) -> Result<(Vec<u8>, Destination)> {
        let mut buf = vec![0u8; bufsize + DGRAM_HEADER_ALLOWANCE];
        let (len, from) = self.sock.recv_from(&mut buf)?;
        if from != self.controller.config().dgram_addr {
            return Err(SamError::Source(from));
        }

        let newline = buf[..len]
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| SamError::Validation("datagram missing source header".to_string()))?;
        let header = std::str::from_utf8(&buf[..newline])
            .map_err(|_| SamError::Validation("datagram header is not ASCII".to_string()))?;
        let source = parse_dest_token(header)?;

        Ok((buf[newline + 1..len].to_vec(), source))
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        Ok(self.sock.set_read_timeout(timeout)?)
    }

    /// The local address datagrams are forwarded to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.sock.local_addr()?)
    }
}

/// Outbound datagram framing: `<version> <nickname> <dest> [k=v ...]\n`
/// followed by the raw payload.
pub(crate) fn pack_datagram(
    max_version: &str,
    nickname: &str,
    dest: &Destination,
    options: &[(String, String)],
    payload: &[u8],
) -> Vec<u8> {
    let header = format!(
        "{} {} {} {}",
        max_version,
        nickname,
        dest.base64(),
        wire::join_options(options)
    );
    let mut frame = header.trim_end().to_string().into_bytes();
    frame.push(b'\n');
    frame.extend_from_slice(payload);
    frame
}
