//! ## TURN client session engine
//!
//! [RFC5389]: https://tools.ietf.org/html/rfc5389
//! [RFC5766]: https://tools.ietf.org/html/rfc5766
//!
//! A client of the STUN [RFC5389] / TURN [RFC5766] protocol suite talking
//! to a single server over UDP.  A [`session::Session`] owns the socket
//! and drives the client side state of a relayed allocation: binding
//! discovery, allocate/refresh with long-term credentials, permissions
//! with their five minute expiry, send indications out and data
//! indications in, the latter fanned out to local subscribers by peer
//! address.
//!
//! The engine is one event loop per session.  Callers never touch the
//! state directly: operations are posted into the session queue and the
//! caller suspends on a one-shot reply until the matching response
//! arrives or the transaction deadline fires.

pub mod credentials;
pub mod relay;
pub mod session;
pub mod subscriptions;
pub mod timer;
pub mod transactions;

pub use codec;

pub use self::{
    session::{Session, SessionOptions},
    subscriptions::{InboundData, Subscriber},
};

#[derive(Debug)]
pub enum Error {
    IO(std::io::Error),
    Codec(codec::Error),
    /// no response arrived within the per transaction deadline.
    Timeout,
    /// the operation requires an active allocation.
    NoAllocation,
    /// send to a peer without an acked permission.
    NoPermission,
    /// 401 with realm and nonce; the credentials have been promoted and
    /// the caller is expected to retry.
    Unauthorized,
    /// 438; the credentials have been re-promoted with the fresh nonce.
    StaleNonce,
    /// the response decoded but is missing a required attribute.
    BadResponse(&'static str),
    /// any other error code from the server.
    Server { code: u16, reason: String },
    /// the session is gone, the socket closed or the loop stopped.
    Closed,
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::IO(value)
    }
}

impl From<codec::Error> for Error {
    fn from(value: codec::Error) -> Self {
        Self::Codec(value)
    }
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
