//! Client library for I2P's SAM v3 protocol
//!
//! SAM (Simple Anonymous Messaging) is the line-oriented control protocol an
//! I2P router exposes to applications. This crate speaks the client side of
//! it: destination identities, the control channel, and the stream and
//! datagram data planes tunneled through it.
//!
//! - [`Destination`]: the binary KeysAndCert identity and its base64/base32
//!   text forms
//! - [`ReplyReader`]: a resumable line scanner over the control socket
//! - [`wire`]: command formatting and reply parsing
//! - [`Controller`]: handshake policy, name resolution with caching, and
//!   session creation against one SAM bridge
//! - [`StreamConnect`]/[`StreamAccept`]: the stream exchanges as resumable
//!   state machines
//! - [`StreamSocket`]/[`DatagramSocket`]: restricted sockets for the data
//!   plane
//!
//! A running SAM bridge (an I2P router with SAM enabled, usually at
//! `127.0.0.1:7656`) is required; this crate does not implement the router,
//! nor any cryptography; key material is carried as opaque bytes.
//!
//! ```no_run
//! use samara_sam::{Controller, SessionOptions};
//! use std::io::Write;
//!
//! # fn main() -> samara_sam::Result<()> {
//! let controller = Controller::new()?;
//! let our_dest = controller.create_dest(SessionOptions::default())?;
//! println!("our address: {}", our_dest.b32_addr());
//!
//! let mut sock = our_dest.connect("example.i2p")?;
//! sock.parse_headers()?;
//! sock.write_all(b"hello")?;
//! # Ok(())
//! # }
//! ```

pub mod controller;
pub mod dest;
pub mod error;
pub mod reader;
pub mod socket;
pub mod transaction;
pub mod types;
pub mod wire;

pub use controller::{
    Controller, LocalDest, SamConfig, SessionOptions, DEFAULT_DGRAM_PORT, DEFAULT_MAX_VERSION,
    DEFAULT_SAM_PORT,
};
pub use dest::{Destination, SigType};
pub use error::{Result, SamError};
pub use reader::{LinePoll, ReplyReader};
pub use socket::{DatagramSocket, StreamSocket};
pub use transaction::{Headers, StreamAccept, StreamConnect, Transaction};
pub use types::{Forward, Host, SessionStyle};
pub use wire::Reply;
