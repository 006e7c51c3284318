//! Resumable stream protocol exchanges
//!
//! `STREAM CONNECT` and `STREAM ACCEPT` are multi-step exchanges over a
//! dedicated control connection: emit one request line, then consume one or
//! two reply lines. Each exchange is a small state machine driven from
//! outside: the socket facade sends the request, pulls reply lines off the
//! wire and feeds them in one at a time. Nothing here touches a socket.

use crate::dest::Destination;
use crate::error::{Result, SamError};
use crate::wire::Reply;

/// Final value of a completed stream exchange.
#[derive(Debug, Clone)]
pub enum Headers {
    /// `STREAM CONNECT` succeeded; the reply that confirmed it.
    Connected(Reply),
    /// `STREAM ACCEPT` resolved; the destination of the connecting peer.
    PeerConnected(Destination),
}

/// A request/reply exchange driven one line at a time.
pub trait Transaction {
    /// The outgoing request line, handed out at most once.
    fn take_request(&mut self) -> Option<String>;

    /// Feed the next reply line. `Ok(None)` suspends for another line,
    /// `Ok(Some(_))` is the terminal value, `Err` a protocol rejection.
    fn advance(&mut self, line: &str) -> Result<Option<Headers>>;
}

/// `STREAM CONNECT`: one request, one status reply.
pub struct StreamConnect {
    request: Option<String>,
    state: ConnectState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectState {
    AwaitingStatus,
    Done,
}

impl StreamConnect {
    pub fn new(nickname: &str, dest: &Destination) -> Self {
        let request = format!(
            "STREAM CONNECT ID={} DESTINATION={} SILENT=false",
            nickname,
            dest.base64()
        );
        StreamConnect {
            request: Some(request),
            state: ConnectState::AwaitingStatus,
        }
    }
}

impl Transaction for StreamConnect {
    fn take_request(&mut self) -> Option<String> {
        self.request.take()
    }

    fn advance(&mut self, line: &str) -> Result<Option<Headers>> {
        match self.state {
            ConnectState::AwaitingStatus => {
                let reply = Reply::parse(line);
                if reply.ok() {
                    self.state = ConnectState::Done;
                    Ok(Some(Headers::Connected(reply)))
                } else {
                    Err(SamError::Unreachable(reply))
                }
            }
            ConnectState::Done => Err(SamError::Unsupported(
                "resuming a completed stream exchange",
            )),
        }
    }
}

/// `STREAM ACCEPT`: one request, a status reply, then an open-ended wait for
/// the line announcing a connecting peer.
pub struct StreamAccept {
    request: Option<String>,
    state: AcceptState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcceptState {
    AwaitingStatus,
    /// Status was OK; waiting for a peer. This state can hold indefinitely,
    /// since nothing arrives until someone actually connects.
    AwaitingPeer,
    Done,
}

impl StreamAccept {
    pub fn new(nickname: &str) -> Self {
        StreamAccept {
            request: Some(format!("STREAM ACCEPT ID={nickname} SILENT=false")),
            state: AcceptState::AwaitingStatus,
        }
    }
}

impl Transaction for StreamAccept {
    fn take_request(&mut self) -> Option<String> {
        self.request.take()
    }

    fn advance(&mut self, line: &str) -> Result<Option<Headers>> {
        match self.state {
            AcceptState::AwaitingStatus => {
                let reply = Reply::parse(line);
                if reply.ok() {
                    self.state = AcceptState::AwaitingPeer;
                    Ok(None)
                } else {
                    Err(SamError::AcceptFailed(reply))
                }
            }
            AcceptState::AwaitingPeer => {
                let peer = parse_dest_token(line)?;
                self.state = AcceptState::Done;
                Ok(Some(Headers::PeerConnected(peer)))
            }
            AcceptState::Done => Err(SamError::Unsupported(
                "resuming a completed stream exchange",
            )),
        }
    }
}

/// Parse the first space-delimited token of a line as a base64 public
/// destination. Used for the peer announcement on accept and for the source
/// header on forwarded datagrams.
pub(crate) fn parse_dest_token(line: &str) -> Result<Destination> {
    let token = match line.find(' ') {
        Some(index) => &line[..index],
        None => line,
    };
    Destination::from_base64(token)
}
