use codec::crypto::Key;

/// Authentication state of the session.
///
/// Credentials evolve in one direction only: `LongTerm` becomes `Final`
/// when a 401 challenge supplies the realm and nonce, and a `Final` is
/// replaced wholesale when a 438 supplies a fresh nonce.  Only `Final`
/// can sign messages.
///
/// # Test
///
/// ```
/// use turn_client::credentials::Credentials;
///
/// let credentials = Credentials::initial(
///     Some("alice".to_string()),
///     Some("s3cr3t".to_string()),
/// );
///
/// assert!(credentials.key().is_none());
///
/// let credentials = credentials.promote("example.org", "N1").unwrap();
/// assert!(credentials.key().is_some());
///
/// match &credentials {
///     Credentials::Final { realm, nonce, .. } => {
///         assert_eq!(realm, "example.org");
///         assert_eq!(nonce, "N1");
///     }
///     _ => panic!("expected final credentials"),
/// }
///
/// // a re-challenge replaces the nonce.
/// let credentials = credentials.promote("example.org", "N2").unwrap();
/// match &credentials {
///     Credentials::Final { nonce, .. } => assert_eq!(nonce, "N2"),
///     _ => panic!("expected final credentials"),
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    None,
    LongTerm {
        username: String,
        secret: String,
    },
    Final {
        username: String,
        secret: String,
        realm: String,
        nonce: String,
    },
}

impl Credentials {
    /// create the initial credentials from the session options.
    ///
    /// a session without both a username and a secret can only perform
    /// unauthenticated operations.
    pub fn initial(username: Option<String>, secret: Option<String>) -> Self {
        match (username, secret) {
            (Some(username), Some(secret)) => Self::LongTerm { username, secret },
            _ => Self::None,
        }
    }

    /// consume a challenge, yielding final credentials.
    ///
    /// returns `None` when there is nothing to promote, that is when no
    /// long term credentials were configured.
    pub fn promote(&self, realm: &str, nonce: &str) -> Option<Self> {
        match self {
            Self::None => None,
            Self::LongTerm { username, secret } | Self::Final { username, secret, .. } => {
                Some(Self::Final {
                    username: username.clone(),
                    secret: secret.clone(),
                    realm: realm.to_string(),
                    nonce: nonce.to_string(),
                })
            }
        }
    }

    /// derive the message integrity key.
    ///
    /// the long term key is the MD5 of `username:realm:secret`; only
    /// final credentials have a realm, so only they can sign.
    pub fn key(&self) -> Option<Key> {
        match self {
            Self::Final {
                username,
                secret,
                realm,
                ..
            } => Some(Key::long_term(username, realm, secret)),
            _ => None,
        }
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            Self::None => None,
            Self::LongTerm { username, .. } | Self::Final { username, .. } => Some(username),
        }
    }
}
