pub mod address;
pub mod error;

use std::net::SocketAddr;

use bytes::{BufMut, BytesMut};
use num_enum::TryFromPrimitive;

pub use self::{
    address::Addr,
    error::{ErrorCode, ErrorKind},
};

use crate::Error;

/// attribute type.
///
/// Types below 0x8000 are comprehension-required: an agent that does not
/// understand one of them cannot process the message.  Types at or above
/// 0x8000 are comprehension-optional and may be ignored.  The 0xFFxx
/// range carries the vendor extensions this client speaks.
#[repr(u16)]
#[derive(TryFromPrimitive, PartialEq, Eq, Hash, Debug, Clone, Copy)]
pub enum AttributeType {
    UserName = 0x0006,
    MessageIntegrity = 0x0008,
    ErrorCode = 0x0009,
    Lifetime = 0x000D,
    XorPeerAddress = 0x0012,
    Data = 0x0013,
    Realm = 0x0014,
    Nonce = 0x0015,
    XorRelayedAddress = 0x0016,
    RequestedTransport = 0x0019,
    XorMappedAddress = 0x0020,
    Fingerprint = 0x8028,
    StunId = 0xFF03,
    ProtocolVersion = 0xFF04,
    NatBindingInterval = 0xFF05,
    ResponseAddress = 0xFF06,
}

/// whether a receiver is required to understand the attribute type in
/// order to process the message.
pub const fn is_comprehension_required(code: u16) -> bool {
    code < 0x8000
}

/// dyn stun/turn message attribute.
pub trait Attribute<'a> {
    type Error;
    /// current attribute inner type.
    type Item;
    /// current attribute type.
    const TYPE: AttributeType;
    /// write the current attribute to the buffer.
    fn serialize(value: Self::Item, buf: &mut BytesMut, token: &[u8]);
    /// convert buffer to current attribute.
    fn deserialize(buf: &'a [u8], token: &'a [u8]) -> Result<Self::Item, Self::Error>;
}

/// The USERNAME attribute is used for message integrity.  It identifies
/// the username and password combination used in the message-integrity
/// check.
///
/// The value of USERNAME is a variable-length value containing the
/// authentication username.  It MUST contain a UTF-8-encoded [RFC3629]
/// sequence, and a compliant implementation MUST be able to parse a
/// sequence of 513 or fewer octets.
pub struct UserName;

impl<'a> Attribute<'a> for UserName {
    type Error = Error;
    type Item = &'a str;

    const TYPE: AttributeType = AttributeType::UserName;

    fn serialize(value: Self::Item, buf: &mut BytesMut, _: &[u8]) {
        buf.put(value.as_bytes());
    }

    fn deserialize(buf: &'a [u8], _: &'a [u8]) -> Result<Self::Item, Self::Error> {
        if buf.len() > 513 {
            return Err(Error::InvalidInput);
        }

        Ok(std::str::from_utf8(buf)?)
    }
}

/// The REALM attribute may be present in requests and responses.  It
/// contains text that meets the grammar for "realm-value" as described
/// in [RFC3261] but without the double quotes and their surrounding
/// whitespace.  It MUST be a UTF-8-encoded [RFC3629] sequence of fewer
/// than 128 characters.
///
/// Presence of the REALM attribute in a request indicates that long-term
/// credentials are being used for authentication.  Presence in certain
/// error responses indicates that the server wishes the client to use a
/// long-term credential in that realm for authentication.
pub struct Realm;

impl<'a> Attribute<'a> for Realm {
    type Error = Error;
    type Item = &'a str;

    const TYPE: AttributeType = AttributeType::Realm;

    fn serialize(value: Self::Item, buf: &mut BytesMut, _: &[u8]) {
        buf.put(value.as_bytes());
    }

    fn deserialize(buf: &'a [u8], _: &'a [u8]) -> Result<Self::Item, Self::Error> {
        let value = std::str::from_utf8(buf)?;
        if value.chars().count() > 128 {
            return Err(Error::InvalidInput);
        }

        Ok(value)
    }
}

/// The NONCE attribute may be present in requests and responses.  It
/// contains a sequence of qdtext or quoted-pair, which are defined in
/// [RFC3261].  A compliant implementation MUST be able to parse a
/// UTF-8-encoded sequence of 763 or fewer octets.
pub struct Nonce;

impl<'a> Attribute<'a> for Nonce {
    type Error = Error;
    type Item = &'a str;

    const TYPE: AttributeType = AttributeType::Nonce;

    fn serialize(value: Self::Item, buf: &mut BytesMut, _: &[u8]) {
        buf.put(value.as_bytes());
    }

    fn deserialize(buf: &'a [u8], _: &'a [u8]) -> Result<Self::Item, Self::Error> {
        if buf.len() > 763 {
            return Err(Error::InvalidInput);
        }

        Ok(std::str::from_utf8(buf)?)
    }
}

/// The DATA attribute is present in all Send and Data indications.  The
/// value portion of this attribute is variable length and consists of
/// the application data (that is, the data that would immediately follow
/// the UDP header if the data was been sent directly between the client
/// and the peer).
pub struct Data;

impl<'a> Attribute<'a> for Data {
    type Error = Error;
    type Item = &'a [u8];

    const TYPE: AttributeType = AttributeType::Data;

    fn serialize(value: Self::Item, buf: &mut BytesMut, _: &[u8]) {
        buf.put(value);
    }

    fn deserialize(buf: &'a [u8], _: &'a [u8]) -> Result<Self::Item, Self::Error> {
        Ok(buf)
    }
}

/// The MESSAGE-INTEGRITY attribute contains an HMAC digest of the STUN
/// message and can be present in any STUN message type.
///
/// The text used as input to the HMAC is the STUN message, up to and
/// including the attribute preceding the MESSAGE-INTEGRITY attribute,
/// with the Length field of the header adjusted to point to the end of
/// the MESSAGE-INTEGRITY attribute itself.
pub struct MessageIntegrity;

impl<'a> Attribute<'a> for MessageIntegrity {
    type Error = Error;
    type Item = &'a [u8];

    const TYPE: AttributeType = AttributeType::MessageIntegrity;

    fn serialize(value: Self::Item, buf: &mut BytesMut, _: &[u8]) {
        buf.put(value);
    }

    fn deserialize(buf: &'a [u8], _: &'a [u8]) -> Result<Self::Item, Self::Error> {
        if buf.len() != 32 {
            return Err(Error::InvalidInput);
        }

        Ok(buf)
    }
}

/// The FINGERPRINT attribute may be present in all STUN messages.  The
/// value of the attribute is computed as the CRC-32 of the STUN message
/// up to (but excluding) the FINGERPRINT attribute itself, XOR'ed with
/// the 32-bit value 0x5354554e.  When present, it MUST be the last
/// attribute in the message.
pub struct Fingerprint;

impl<'a> Attribute<'a> for Fingerprint {
    type Error = Error;
    type Item = u32;

    const TYPE: AttributeType = AttributeType::Fingerprint;

    fn serialize(value: Self::Item, buf: &mut BytesMut, _: &[u8]) {
        buf.put_u32(value);
    }

    fn deserialize(buf: &'a [u8], _: &'a [u8]) -> Result<Self::Item, Self::Error> {
        Ok(u32::from_be_bytes(buf.try_into()?))
    }
}

/// The ERROR-CODE attribute is used in error response messages.
pub struct ErrorCodeAttr;

impl<'a> Attribute<'a> for ErrorCodeAttr {
    type Error = Error;
    type Item = ErrorCode<'a>;

    const TYPE: AttributeType = AttributeType::ErrorCode;

    fn serialize(value: Self::Item, buf: &mut BytesMut, _: &[u8]) {
        value.encode(buf);
    }

    fn deserialize(buf: &'a [u8], _: &'a [u8]) -> Result<Self::Item, Self::Error> {
        ErrorCode::decode(buf)
    }
}

/// The LIFETIME attribute represents the duration for which the server
/// will maintain an allocation in the absence of a refresh, as an
/// unsigned 32-bit number of seconds.
pub struct Lifetime;

impl<'a> Attribute<'a> for Lifetime {
    type Error = Error;
    type Item = u32;

    const TYPE: AttributeType = AttributeType::Lifetime;

    fn serialize(value: Self::Item, buf: &mut BytesMut, _: &[u8]) {
        buf.put_u32(value);
    }

    fn deserialize(buf: &'a [u8], _: &'a [u8]) -> Result<Self::Item, Self::Error> {
        Ok(u32::from_be_bytes(buf.try_into()?))
    }
}

/// transport protocol requested for an allocation.
#[repr(u8)]
#[derive(TryFromPrimitive, PartialEq, Eq, Hash, Debug, Clone, Copy)]
pub enum Transport {
    Udp = 17,
}

/// The REQUESTED-TRANSPORT attribute is used by the client to request a
/// specific transport protocol for the allocated transport address.  The
/// Protocol field specifies the transport protocol as in the IPv4 header;
/// the remaining three bytes are reserved.
pub struct RequestedTransport;

impl<'a> Attribute<'a> for RequestedTransport {
    type Error = Error;
    type Item = Transport;

    const TYPE: AttributeType = AttributeType::RequestedTransport;

    fn serialize(value: Self::Item, buf: &mut BytesMut, _: &[u8]) {
        buf.put_u8(value as u8);
        buf.put(&[0u8; 3][..]);
    }

    fn deserialize(buf: &'a [u8], _: &'a [u8]) -> Result<Self::Item, Self::Error> {
        if buf.len() != 4 {
            return Err(Error::InvalidInput);
        }

        Transport::try_from(buf[0]).map_err(|_| Error::InvalidInput)
    }
}

/// The XOR-MAPPED-ADDRESS attribute carries the reflexive transport
/// address of the client, obfuscated through the XOR function.
pub struct XorMappedAddress;

impl<'a> Attribute<'a> for XorMappedAddress {
    type Error = Error;
    type Item = SocketAddr;

    const TYPE: AttributeType = AttributeType::XorMappedAddress;

    fn serialize(value: Self::Item, buf: &mut BytesMut, token: &[u8]) {
        Addr::encode(&value, token, buf, true)
    }

    fn deserialize(buf: &'a [u8], token: &'a [u8]) -> Result<Self::Item, Self::Error> {
        Addr::decode(buf, token, true)
    }
}

/// The XOR-RELAYED-ADDRESS attribute is present in Allocate responses
/// and carries the relayed transport address, obfuscated through the
/// XOR function.
pub struct XorRelayedAddress;

impl<'a> Attribute<'a> for XorRelayedAddress {
    type Error = Error;
    type Item = SocketAddr;

    const TYPE: AttributeType = AttributeType::XorRelayedAddress;

    fn serialize(value: Self::Item, buf: &mut BytesMut, token: &[u8]) {
        Addr::encode(&value, token, buf, true)
    }

    fn deserialize(buf: &'a [u8], token: &'a [u8]) -> Result<Self::Item, Self::Error> {
        Addr::decode(buf, token, true)
    }
}

/// The XOR-PEER-ADDRESS attribute specifies the address and port of the
/// peer as seen from the TURN server, obfuscated through the XOR
/// function.
pub struct XorPeerAddress;

impl<'a> Attribute<'a> for XorPeerAddress {
    type Error = Error;
    type Item = SocketAddr;

    const TYPE: AttributeType = AttributeType::XorPeerAddress;

    fn serialize(value: Self::Item, buf: &mut BytesMut, token: &[u8]) {
        Addr::encode(&value, token, buf, true)
    }

    fn deserialize(buf: &'a [u8], token: &'a [u8]) -> Result<Self::Item, Self::Error> {
        Addr::decode(buf, token, true)
    }
}

/// vendor extension: opaque client identifier.
pub struct StunId;

impl<'a> Attribute<'a> for StunId {
    type Error = Error;
    type Item = &'a [u8];

    const TYPE: AttributeType = AttributeType::StunId;

    fn serialize(value: Self::Item, buf: &mut BytesMut, _: &[u8]) {
        buf.put(value);
    }

    fn deserialize(buf: &'a [u8], _: &'a [u8]) -> Result<Self::Item, Self::Error> {
        if buf.len() > 16 {
            return Err(Error::InvalidInput);
        }

        Ok(buf)
    }
}

/// vendor extension: protocol revision spoken by the sender.
pub struct ProtocolVersion;

impl<'a> Attribute<'a> for ProtocolVersion {
    type Error = Error;
    type Item = u16;

    const TYPE: AttributeType = AttributeType::ProtocolVersion;

    fn serialize(value: Self::Item, buf: &mut BytesMut, _: &[u8]) {
        buf.put_u16(value);
    }

    fn deserialize(buf: &'a [u8], _: &'a [u8]) -> Result<Self::Item, Self::Error> {
        Ok(u16::from_be_bytes(buf.try_into()?))
    }
}

/// vendor extension: seconds between keep-alive indications the server
/// would like to see from the client.
pub struct NatBindingInterval;

impl<'a> Attribute<'a> for NatBindingInterval {
    type Error = Error;
    type Item = u32;

    const TYPE: AttributeType = AttributeType::NatBindingInterval;

    fn serialize(value: Self::Item, buf: &mut BytesMut, _: &[u8]) {
        buf.put_u32(value);
    }

    fn deserialize(buf: &'a [u8], _: &'a [u8]) -> Result<Self::Item, Self::Error> {
        Ok(u32::from_be_bytes(buf.try_into()?))
    }
}

/// vendor extension: address the sender wants responses delivered to,
/// in the plain (non XOR) address layout.
pub struct ResponseAddress;

impl<'a> Attribute<'a> for ResponseAddress {
    type Error = Error;
    type Item = SocketAddr;

    const TYPE: AttributeType = AttributeType::ResponseAddress;

    fn serialize(value: Self::Item, buf: &mut BytesMut, token: &[u8]) {
        Addr::encode(&value, token, buf, false)
    }

    fn deserialize(buf: &'a [u8], token: &'a [u8]) -> Result<Self::Item, Self::Error> {
        Addr::decode(buf, token, false)
    }
}
