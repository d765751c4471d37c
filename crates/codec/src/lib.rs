//! ## Session Traversal Utilities for NAT (STUN)
//!
//! [RFC5389]: https://tools.ietf.org/html/rfc5389
//! [RFC5766]: https://tools.ietf.org/html/rfc5766
//!
//! STUN is a protocol that serves as a tool for other protocols in
//! dealing with Network Address Translator (NAT) traversal.  It can be
//! used by an endpoint to determine the IP address and port allocated to
//! it by a NAT.  TURN [RFC5766] extends STUN with methods that allow a
//! client to obtain a relayed transport address on a server and exchange
//! packets with peers through it.
//!
//! This crate implements the message framing, the attribute set and the
//! integrity rules a client of these protocols needs: requests and
//! indications go out through [`message::MessageEncoder`], datagrams come
//! back in through [`message::Message::decode`].

pub mod crypto;
pub mod message;

use std::{array::TryFromSliceError, ops::Range, str::Utf8Error};

#[derive(Debug)]
pub enum Error {
    InvalidInput,
    BadLength,
    BadPadding,
    NotFoundMagicNumber,
    UnknownMethod,
    /// A comprehension required attribute (type code below 0x8000) that
    /// this implementation does not recognize.
    UnknownAttribute(u16),
    NotFoundIntegrity,
    IntegrityFailed,
    FingerprintFailed,
    FingerprintNotLast,
    Utf8Error(Utf8Error),
    TryFromSliceError(TryFromSliceError),
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::InvalidInput, Self::InvalidInput) => true,
            (Self::BadLength, Self::BadLength) => true,
            (Self::BadPadding, Self::BadPadding) => true,
            (Self::NotFoundMagicNumber, Self::NotFoundMagicNumber) => true,
            (Self::UnknownMethod, Self::UnknownMethod) => true,
            (Self::UnknownAttribute(a), Self::UnknownAttribute(b)) => a == b,
            (Self::NotFoundIntegrity, Self::NotFoundIntegrity) => true,
            (Self::IntegrityFailed, Self::IntegrityFailed) => true,
            (Self::FingerprintFailed, Self::FingerprintFailed) => true,
            (Self::FingerprintNotLast, Self::FingerprintNotLast) => true,
            (Self::Utf8Error(a), Self::Utf8Error(b)) => a == b,
            (Self::TryFromSliceError(_), Self::TryFromSliceError(_)) => true,
            _ => false,
        }
    }
}

impl Eq for Error {}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<Utf8Error> for Error {
    fn from(value: Utf8Error) -> Self {
        Self::Utf8Error(value)
    }
}

impl From<TryFromSliceError> for Error {
    fn from(value: TryFromSliceError) -> Self {
        Self::TryFromSliceError(value)
    }
}

/// A cache of the list of attributes, this is for internal use only.
///
/// Attribute type codes are stored raw so that comprehension optional
/// attributes this implementation does not know about survive a decode
/// round trip.
#[derive(Debug, Clone)]
pub struct Attributes(Vec<(u16, Range<usize>)>);

impl Default for Attributes {
    fn default() -> Self {
        Self(Vec::with_capacity(20))
    }
}

impl Attributes {
    /// Adds an attribute to the list.
    pub fn append(&mut self, code: u16, range: Range<usize>) {
        self.0.push((code, range));
    }

    /// Gets an attribute from the list.
    ///
    /// Note: This function will only look for the first matching attribute
    /// in the list and return it.
    pub fn get(&self, code: u16) -> Option<Range<usize>> {
        self.0
            .iter()
            .find(|(k, _)| *k == code)
            .map(|(_, v)| v.clone())
    }

    /// Gets all the values of an attribute from the list.
    ///
    /// A stun message can have multiple attributes with the same type,
    /// this function returns every occurrence in message order.
    pub fn get_all<'a>(&'a self, code: u16) -> impl Iterator<Item = &'a Range<usize>> {
        self.0.iter().filter(move |(k, _)| *k == code).map(|(_, v)| v)
    }

    /// Iterates over every attribute as a raw (type code, value range) pair.
    pub fn iter(&self) -> impl Iterator<Item = &(u16, Range<usize>)> {
        self.0.iter()
    }

    pub fn clear(&mut self) {
        if !self.0.is_empty() {
            self.0.clear();
        }
    }
}
