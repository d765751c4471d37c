pub mod attributes;
pub mod methods;

use bytes::{BufMut, BytesMut};

use crate::{
    Attributes, Error,
    crypto::{Key, fingerprint, hmac_sha256},
    message::{
        attributes::{Attribute, AttributeType, MessageIntegrity, is_comprehension_required},
        methods::Method,
    },
};

const MAGIC_NUMBER: u32 = 0x2112A442;

// attribute header (4) + HMAC-SHA256 output (32).
const INTEGRITY_SIZE: usize = 36;
// attribute header (4) + CRC32 value (4).
const FINGERPRINT_SIZE: usize = 8;

pub struct MessageEncoder<'a> {
    token: &'a [u8],
    bytes: &'a mut BytesMut,
}

impl<'a> MessageEncoder<'a> {
    /// start a new message with the given method and transaction id.
    ///
    /// # Test
    ///
    /// ```
    /// use bytes::BytesMut;
    /// use turn_client_codec::message::methods::*;
    /// use turn_client_codec::message::*;
    ///
    /// let buffer = [
    ///     0x00u8, 0x01, 0x00, 0x00, 0x21, 0x12, 0xa4, 0x42, 0x72, 0x6d, 0x49,
    ///     0x42, 0x72, 0x52, 0x64, 0x48, 0x57, 0x62, 0x4b, 0x2b,
    /// ];
    ///
    /// let token: [u8; 12] = [
    ///     0x72, 0x6d, 0x49, 0x42, 0x72, 0x52, 0x64, 0x48, 0x57, 0x62, 0x4b, 0x2b,
    /// ];
    ///
    /// let mut buf = BytesMut::new();
    /// MessageEncoder::new(BINDING_REQUEST, &token, &mut buf)
    ///     .flush(None)
    ///     .unwrap();
    ///
    /// assert_eq!(&buf[..], &buffer[..]);
    /// ```
    pub fn new(method: Method, token: &'a [u8; 12], bytes: &'a mut BytesMut) -> Self {
        bytes.clear();
        bytes.put_u16(method.into());
        bytes.put_u16(0);
        bytes.put_u32(MAGIC_NUMBER);
        bytes.put(token.as_slice());

        Self { bytes, token }
    }

    /// append attribute.
    ///
    /// append attribute to message attribute list.
    ///
    /// # Test
    ///
    /// ```
    /// use bytes::BytesMut;
    /// use turn_client_codec::message::attributes::*;
    /// use turn_client_codec::message::methods::*;
    /// use turn_client_codec::message::*;
    ///
    /// let buffer = [
    ///     0x00u8, 0x01, 0x00, 0x0c, 0x21, 0x12, 0xa4, 0x42, 0x72, 0x6d, 0x49,
    ///     0x42, 0x72, 0x52, 0x64, 0x48, 0x57, 0x62, 0x4b, 0x2b, 0x00, 0x06, 0x00,
    ///     0x05, 0x70, 0x61, 0x6e, 0x64, 0x61, 0x00, 0x00, 0x00,
    /// ];
    ///
    /// let token: [u8; 12] = [
    ///     0x72, 0x6d, 0x49, 0x42, 0x72, 0x52, 0x64, 0x48, 0x57, 0x62, 0x4b, 0x2b,
    /// ];
    ///
    /// let mut buf = BytesMut::new();
    /// let mut message = MessageEncoder::new(BINDING_REQUEST, &token, &mut buf);
    /// message.append::<UserName>("panda");
    /// message.flush(None).unwrap();
    ///
    /// assert_eq!(&buf[..], &buffer[..]);
    /// ```
    pub fn append<'c, T: Attribute<'c>>(&'c mut self, value: T::Item) {
        self.bytes.put_u16(T::TYPE as u16);

        // reserve the length slot, the real value size is only known once
        // it has been written.
        let os = self.bytes.len();
        self.bytes.put_u16(0);
        T::serialize(value, self.bytes, self.token);

        let size = self.bytes.len() - os - 2;
        let size_buf = (size as u16).to_be_bytes();
        self.bytes[os] = size_buf[0];
        self.bytes[os + 1] = size_buf[1];

        // padding is zero bytes up to the next 4 byte boundary and is not
        // counted in the attribute length.
        let psize = alignment_32(size);
        if psize > 0 {
            self.bytes.put(&[0u8; 3][0..psize]);
        }
    }

    /// finalize the message.
    ///
    /// writes the header length and, when a key is given, appends the
    /// MessageIntegrity and Fingerprint attributes.
    pub fn flush(&mut self, key: Option<&Key>) -> Result<(), Error> {
        // write attribute list size.
        self.set_len(self.bytes.len() - 20);

        // if need message integrity?
        if let Some(key) = key {
            self.checksum(key)?;
        }

        Ok(())
    }

    // append MessageIntegrity and Fingerprint attributes.
    //
    // the integrity digest covers the header with the length field already
    // adjusted to include the MessageIntegrity attribute itself, then the
    // fingerprint covers everything before it.
    fn checksum(&mut self, key: &Key) -> Result<(), Error> {
        let len = self.bytes.len();

        self.set_len(len - 20 + INTEGRITY_SIZE);

        {
            let hmac = hmac_sha256(key, &[&self.bytes[..]])?;
            self.bytes.put_u16(AttributeType::MessageIntegrity as u16);
            self.bytes.put_u16(32);
            self.bytes.put(hmac.as_slice());
        }

        self.set_len(len - 20 + INTEGRITY_SIZE + FINGERPRINT_SIZE);

        let fingerprint = fingerprint(&self.bytes[..]);
        self.bytes.put_u16(AttributeType::Fingerprint as u16);
        self.bytes.put_u16(4);
        self.bytes.put_u32(fingerprint);

        Ok(())
    }

    // set stun message header size.
    fn set_len(&mut self, len: usize) {
        self.bytes[2..4].copy_from_slice((len as u16).to_be_bytes().as_slice());
    }
}

pub struct Message<'a> {
    /// message method.
    method: Method,
    /// message source bytes.
    bytes: &'a [u8],
    /// byte offset where the MessageIntegrity attribute starts, when the
    /// message carries one.
    integrity: Option<u16>,
    // message attribute list.
    attributes: &'a Attributes,
}

impl<'a> Message<'a> {
    /// message method.
    #[inline]
    pub fn method(&self) -> Method {
        self.method
    }

    /// message transaction id.
    #[inline]
    pub fn token(&self) -> &'a [u8] {
        &self.bytes[8..20]
    }

    /// get attribute.
    ///
    /// get attribute from message attribute list.
    pub fn get<T: Attribute<'a>>(&self) -> Option<T::Item> {
        let range = self.attributes.get(T::TYPE as u16)?;
        T::deserialize(&self.bytes[range], self.token()).ok()
    }

    /// Gets all the values of an attribute from the message.
    ///
    /// A stun message can have multiple attributes with the same type,
    /// this function returns every occurrence in message order.
    pub fn get_all<T: Attribute<'a>>(&self) -> impl Iterator<Item = T::Item> {
        self.attributes
            .get_all(T::TYPE as u16)
            .filter_map(|it| T::deserialize(&self.bytes[it.clone()], self.token()).ok())
    }

    /// comprehension optional attributes this implementation does not
    /// recognize, preserved as raw (type code, value) pairs.
    pub fn unknown(&self) -> impl Iterator<Item = (u16, &'a [u8])> {
        self.attributes
            .iter()
            .filter(|(code, _)| AttributeType::try_from(*code).is_err())
            .map(|(code, range)| (*code, &self.bytes[range.clone()]))
    }

    /// check the MessageIntegrity attribute.
    ///
    /// recomputes the digest over the header rewritten so that its length
    /// covers everything up to and including the integrity attribute, and
    /// the body truncated at the attribute start.
    ///
    /// # Test
    ///
    /// ```
    /// use bytes::BytesMut;
    /// use turn_client_codec::crypto::Key;
    /// use turn_client_codec::message::methods::*;
    /// use turn_client_codec::message::*;
    /// use turn_client_codec::Attributes;
    ///
    /// let token = [0u8; 12];
    /// let key = Key::long_term("panda", "raspberry", "panda");
    ///
    /// let mut buf = BytesMut::new();
    /// let mut message = MessageEncoder::new(ALLOCATE_REQUEST, &token, &mut buf);
    /// message.append::<attributes::UserName>("panda");
    /// message.flush(Some(&key)).unwrap();
    ///
    /// let mut attributes = Attributes::default();
    /// let message = Message::decode(&buf[..], &mut attributes).unwrap();
    ///
    /// assert!(message.verify(&key).is_ok());
    /// assert!(message.verify(&Key::raw(b"wrong")).is_err());
    /// ```
    pub fn verify(&self, key: &Key) -> Result<(), Error> {
        let offset = self.integrity.ok_or(Error::NotFoundIntegrity)? as usize;
        let integrity = self
            .get::<MessageIntegrity>()
            .ok_or(Error::NotFoundIntegrity)?;

        let size_buf = ((offset - 20 + INTEGRITY_SIZE) as u16).to_be_bytes();
        let body = [&self.bytes[0..2], &size_buf[..], &self.bytes[4..offset]];

        if integrity != hmac_sha256(key, &body)? {
            return Err(Error::IntegrityFailed);
        }

        Ok(())
    }

    /// try decoding bytes as a message.
    ///
    /// # Test
    ///
    /// ```
    /// use turn_client_codec::message::methods::*;
    /// use turn_client_codec::message::*;
    /// use turn_client_codec::Attributes;
    ///
    /// let buffer: [u8; 20] = [
    ///     0x00, 0x01, 0x00, 0x00, 0x21, 0x12, 0xa4, 0x42, 0x72, 0x6d, 0x49, 0x42,
    ///     0x72, 0x52, 0x64, 0x48, 0x57, 0x62, 0x4b, 0x2b,
    /// ];
    ///
    /// let mut attributes = Attributes::default();
    /// let message = Message::decode(&buffer[..], &mut attributes).unwrap();
    ///
    /// assert_eq!(message.method(), BINDING_REQUEST);
    /// assert!(message.get::<attributes::UserName>().is_none());
    /// ```
    pub fn decode(bytes: &'a [u8], attributes: &'a mut Attributes) -> Result<Self, Error> {
        let len = bytes.len();

        // There must be at least a complete header.
        if len < 20 {
            return Err(Error::InvalidInput);
        }

        // The most significant 2 bits of every STUN message are zero.
        if bytes[0] >> 6 != 0 {
            return Err(Error::InvalidInput);
        }

        let method = Method::try_from(u16::from_be_bytes(bytes[..2].try_into()?))?;

        // The length field does not include the 20 byte header and is
        // always a multiple of 4, and a datagram carries exactly one
        // message.
        {
            let size = u16::from_be_bytes(bytes[2..4].try_into()?) as usize;
            if size % 4 != 0 {
                return Err(Error::BadLength);
            }

            if len < size + 20 {
                return Err(Error::InvalidInput);
            }

            if len > size + 20 {
                return Err(Error::BadLength);
            }
        }

        // Check whether the magic number is the same.
        if bytes[4..8] != MAGIC_NUMBER.to_be_bytes() {
            return Err(Error::NotFoundMagicNumber);
        }

        attributes.clear();

        let mut integrity = None;
        let mut fingerprint_seen = false;
        let mut offset = 20;

        while offset < len {
            if fingerprint_seen {
                return Err(Error::FingerprintNotLast);
            }

            if len - offset < 4 {
                return Err(Error::InvalidInput);
            }

            let begin = offset;
            let code = u16::from_be_bytes([bytes[offset], bytes[offset + 1]]);
            let size = u16::from_be_bytes([bytes[offset + 2], bytes[offset + 3]]) as usize;

            offset += 4;
            if len - offset < size {
                return Err(Error::InvalidInput);
            }

            let range = offset..(offset + size);

            let psize = alignment_32(size);
            if len - offset < size + psize {
                return Err(Error::BadPadding);
            }

            offset += size + psize;

            match AttributeType::try_from(code) {
                Ok(AttributeType::MessageIntegrity) => {
                    // only the first one counts, anything after it is not
                    // covered by the digest anyway.
                    if integrity.is_none() {
                        integrity = Some(begin as u16);
                    }
                }
                Ok(AttributeType::Fingerprint) => {
                    let value = u32::from_be_bytes(bytes[range.clone()].try_into()?);
                    if value != fingerprint(&bytes[..begin]) {
                        return Err(Error::FingerprintFailed);
                    }

                    fingerprint_seen = true;
                }
                Ok(_) => {}
                Err(_) => {
                    if is_comprehension_required(code) {
                        return Err(Error::UnknownAttribute(code));
                    }
                }
            }

            attributes.append(code, range);
        }

        Ok(Self {
            method,
            bytes,
            integrity,
            attributes,
        })
    }
}

/// compute padding size.
///
/// RFC5766 stipulates that the attribute content is a multiple of 4.
///
/// # Test
///
/// ```
/// use turn_client_codec::message::alignment_32;
///
/// assert_eq!(alignment_32(4), 0);
/// assert_eq!(alignment_32(0), 0);
/// assert_eq!(alignment_32(5), 3);
/// ```
#[inline(always)]
pub fn alignment_32(size: usize) -> usize {
    let range = size % 4;
    if size == 0 || range == 0 {
        return 0;
    }

    4 - range
}
