use bytes::{BufMut, BytesMut};
use num_enum::TryFromPrimitive;

use crate::Error;

/// The following error codes, along with their recommended reason
/// phrases, are defined:
///
/// 400  Bad Request: The request was malformed.  The client SHOULD NOT
///      retry the request without modification from the previous
///      attempt.
///
/// 401  Unauthorized: The request did not contain the correct
///      credentials to proceed.  The client should retry the request
///      with proper credentials.
///
/// 420  Unknown Attribute: The server received a STUN packet containing
///      a comprehension-required attribute that it did not understand.
///
/// 437  Allocation Mismatch: A request was received by the server that
///      requires an allocation to be in place, but no allocation exists.
///
/// 438  Stale Nonce: The NONCE used by the client was no longer valid.
///      The client should retry, using the NONCE provided in the
///      response.
///
/// 500  Server Error: The server has suffered a temporary error.  The
///      client should try again.
#[repr(u16)]
#[derive(TryFromPrimitive, PartialEq, Eq, Copy, Clone, Debug)]
pub enum ErrorKind {
    TryAlternate = 300,
    BadRequest = 400,
    Unauthorized = 401,
    Forbidden = 403,
    UnknownAttribute = 420,
    AllocationMismatch = 437,
    StaleNonce = 438,
    WrongCredentials = 441,
    UnsupportedTransportProtocol = 442,
    AllocationQuotaReached = 486,
    ServerError = 500,
    InsufficientCapacity = 508,
}

/// The ERROR-CODE attribute value: a numeric error code in the range
/// 300 to 699 plus a textual reason phrase encoded in UTF-8.
///
/// ```text
/// 0                   1                   2                   3
/// 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |           Reserved, should be 0         |Class|     Number    |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |      Reason Phrase (variable)                                ..
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// The Class represents the hundreds digit of the error code and MUST be
/// between 3 and 6.  The Number represents the binary encoding of the
/// error code modulo 100 and MUST be between 0 and 99.
#[derive(Clone, Debug)]
pub struct ErrorCode<'a> {
    pub code: u16,
    pub reason: &'a str,
}

impl ErrorCode<'_> {
    /// create an error from a well known error kind.
    ///
    /// # Test
    ///
    /// ```
    /// use turn_client_codec::message::attributes::error::*;
    ///
    /// let error = ErrorCode::from(ErrorKind::Unauthorized);
    ///
    /// assert_eq!(error.code, 401);
    /// assert_eq!(error.reason, "Unauthorized");
    /// ```
    pub fn from(kind: ErrorKind) -> Self {
        Self {
            code: kind as u16,
            reason: kind.into(),
        }
    }

    /// encode the error code as bytes.
    ///
    /// # Test
    ///
    /// ```
    /// use turn_client_codec::message::attributes::error::*;
    /// use bytes::BytesMut;
    ///
    /// let buffer = [
    ///     0x00u8, 0x00, 0x04, 0x01, 0x55, 0x6e, 0x61, 0x75, 0x74, 0x68, 0x6f,
    ///     0x72, 0x69, 0x7a, 0x65, 0x64,
    /// ];
    ///
    /// let mut buf = BytesMut::with_capacity(1280);
    /// let error = ErrorCode::from(ErrorKind::Unauthorized);
    /// error.encode(&mut buf);
    /// assert_eq!(&buf[..], &buffer);
    /// ```
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(0x0000);
        buf.put_u8((self.code / 100) as u8);
        buf.put_u8((self.code % 100) as u8);
        buf.put(self.reason.as_bytes());
    }

    /// decode the error code from bytes.
    ///
    /// # Test
    ///
    /// ```
    /// use turn_client_codec::message::attributes::error::*;
    ///
    /// let buffer = [
    ///     0x00u8, 0x00, 0x04, 0x26, 0x53, 0x74, 0x61, 0x6c, 0x65, 0x20, 0x4e,
    ///     0x6f, 0x6e, 0x63, 0x65,
    /// ];
    ///
    /// let error = ErrorCode::decode(&buffer[..]).unwrap();
    /// assert_eq!(error.code, ErrorKind::StaleNonce as u16);
    /// assert_eq!(error.reason, "Stale Nonce");
    /// ```
    pub fn decode(packet: &[u8]) -> Result<ErrorCode<'_>, Error> {
        if packet.len() < 4 {
            return Err(Error::InvalidInput);
        }

        if u16::from_be_bytes([packet[0], packet[1]]) != 0x0000 {
            return Err(Error::InvalidInput);
        }

        let class = packet[2] as u16;
        let number = packet[3] as u16;
        if !(3..=6).contains(&class) || number > 99 {
            return Err(Error::InvalidInput);
        }

        Ok(ErrorCode {
            code: class * 100 + number,
            reason: std::str::from_utf8(&packet[4..])?,
        })
    }
}

impl From<ErrorKind> for &'static str {
    /// # Test
    ///
    /// ```
    /// use turn_client_codec::message::attributes::error::ErrorKind;
    ///
    /// let reason: &'static str = ErrorKind::StaleNonce.into();
    /// assert_eq!(reason, "Stale Nonce");
    /// ```
    #[rustfmt::skip]
    fn from(val: ErrorKind) -> Self {
        match val {
            ErrorKind::TryAlternate => "Try Alternate",
            ErrorKind::BadRequest => "Bad Request",
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::UnknownAttribute => "Unknown Attribute",
            ErrorKind::AllocationMismatch => "Allocation Mismatch",
            ErrorKind::StaleNonce => "Stale Nonce",
            ErrorKind::WrongCredentials => "Wrong Credentials",
            ErrorKind::UnsupportedTransportProtocol => "Unsupported Transport Protocol",
            ErrorKind::AllocationQuotaReached => "Allocation Quota Reached",
            ErrorKind::ServerError => "Server Error",
            ErrorKind::InsufficientCapacity => "Insufficient Capacity",
        }
    }
}

impl Eq for ErrorCode<'_> {}
impl PartialEq for ErrorCode<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}
