use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use sha2::Sha256;

use crate::Error;

/// Message integrity key.
///
/// Long term credentials compress the username, realm and secret into a
/// 16 byte MD5 digest; when no realm is known yet the raw secret bytes are
/// used directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key(Vec<u8>);

impl Key {
    /// create long term credential key.
    ///
    /// > key = MD5(username ":" OpaqueString(realm) ":" OpaqueString(password))
    ///
    /// # Test
    ///
    /// ```
    /// use turn_client_codec::crypto::Key;
    ///
    /// let digest = [
    ///     0x3eu8, 0x2f, 0x79, 0x1e, 0x1f, 0x14, 0xd1, 0x73, 0xfc, 0x91, 0xff,
    ///     0x2f, 0x59, 0xb5, 0x0f, 0xd1,
    /// ];
    ///
    /// let key = Key::long_term("panda", "raspberry", "panda");
    ///
    /// assert_eq!(key.as_slice(), &digest);
    /// ```
    pub fn long_term(username: &str, realm: &str, secret: &str) -> Self {
        let mut hasher = Md5::new();
        hasher.update([username, realm, secret].join(":"));
        Self(hasher.finalize().to_vec())
    }

    /// create a key from the raw secret bytes.
    pub fn raw(secret: &[u8]) -> Self {
        Self(secret.to_vec())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

/// HMAC SHA256 digest.
///
/// # Test
///
/// ```
/// use turn_client_codec::crypto::{hmac_sha256, Key};
///
/// let sign = [
///     0x5bu8, 0xdc, 0xc1, 0x46, 0xbf, 0x60, 0x75, 0x4e, 0x6a, 0x04, 0x24,
///     0x26, 0x08, 0x95, 0x75, 0xc7, 0x5a, 0x00, 0x3f, 0x08, 0x9d, 0x27,
///     0x39, 0x83, 0x9d, 0xec, 0x58, 0xb9, 0x64, 0xec, 0x38, 0x43,
/// ];
///
/// let key = Key::raw(b"Jefe");
/// let hmac_output = hmac_sha256(&key, &[b"what do ya want ", b"for nothing?"]).unwrap();
///
/// assert_eq!(&hmac_output, &sign);
/// ```
pub fn hmac_sha256(key: &Key, source: &[&[u8]]) -> Result<[u8; 32], Error> {
    match Hmac::<Sha256>::new_from_slice(key.as_slice()) {
        Err(_) => Err(Error::InvalidInput),
        Ok(mut mac) => {
            for buf in source {
                mac.update(buf);
            }

            Ok(mac.finalize().into_bytes().into())
        }
    }
}

/// CRC32 Fingerprint.
///
/// # Test
///
/// ```
/// use turn_client_codec::crypto::fingerprint;
///
/// assert_eq!(fingerprint(b"1"), 3498621689);
/// ```
pub fn fingerprint(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes) ^ 0x5354_554e
}
