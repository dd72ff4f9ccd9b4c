/*!

Negotiated sessions and the secrets that travel under them.

 */

use std::fmt;
use std::str::FromStr;

use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

#[cfg(feature = "crypto-rust")]
use crate::crypto::{self, AesKey};
use crate::errors::{Error, Result};
use crate::ss::{ALGORITHM_DH, ALGORITHM_PLAIN, CONTENT_TYPE};
use crate::value::{ObjectPath, Reply, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthenticationMode {
    #[default]
    Plain,
    DhIetf1024Sha256Aes128CbcPkcs7,
}

impl AuthenticationMode {
    /// The algorithm name passed to `OpenSession`.
    pub fn algorithm(&self) -> &'static str {
        match self {
            AuthenticationMode::Plain => ALGORITHM_PLAIN,
            AuthenticationMode::DhIetf1024Sha256Aes128CbcPkcs7 => ALGORITHM_DH,
        }
    }
}

impl fmt::Display for AuthenticationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.algorithm())
    }
}

impl FromStr for AuthenticationMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            ALGORITHM_PLAIN => Ok(AuthenticationMode::Plain),
            ALGORITHM_DH => Ok(AuthenticationMode::DhIetf1024Sha256Aes128CbcPkcs7),
            other => Err(Error::UnsupportedMode(other.to_string())),
        }
    }
}

/// One negotiated conversation with the daemon.
///
/// Only the derived AES key is kept; the DH keypair is dropped as soon
/// as the key exists. Don't reuse a session once its connection is gone.
pub struct Session {
    mode: AuthenticationMode,
    path: ObjectPath,
    #[cfg(feature = "crypto-rust")]
    key: Option<AesKey>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("mode", &self.mode)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub(crate) fn plain(path: ObjectPath) -> Self {
        Self {
            mode: AuthenticationMode::Plain,
            path,
            #[cfg(feature = "crypto-rust")]
            key: None,
        }
    }

    #[cfg(feature = "crypto-rust")]
    pub(crate) fn encrypted(path: ObjectPath, key: AesKey) -> Self {
        Self {
            mode: AuthenticationMode::DhIetf1024Sha256Aes128CbcPkcs7,
            path,
            key: Some(key),
        }
    }

    pub fn mode(&self) -> AuthenticationMode {
        self.mode
    }

    pub fn path(&self) -> &ObjectPath {
        &self.path
    }

    #[cfg(feature = "crypto-rust")]
    fn key(&self) -> Result<&AesKey> {
        self.key
            .as_ref()
            .ok_or_else(|| Error::Crypto("session has no negotiated key".to_string()))
    }

    /// Package `plaintext` for sending under this session.
    pub fn new_secret(&self, plaintext: &[u8]) -> Result<Secret> {
        match self.mode {
            AuthenticationMode::Plain => Ok(Secret::new(self.path.clone(), Vec::new(), plaintext.to_vec())),
            #[cfg(feature = "crypto-rust")]
            AuthenticationMode::DhIetf1024Sha256Aes128CbcPkcs7 => {
                let (iv, ciphertext) = crypto::encrypt(plaintext, self.key()?);
                Ok(Secret::new(self.path.clone(), iv, ciphertext))
            }
            #[cfg(not(feature = "crypto-rust"))]
            other => Err(Error::UnsupportedMode(other.to_string())),
        }
    }

    /// Recover the plaintext of a secret received under this session.
    pub fn open_secret(&self, secret: &Secret) -> Result<Zeroizing<Vec<u8>>> {
        match self.mode {
            AuthenticationMode::Plain => Ok(Zeroizing::new(secret.value.clone())),
            #[cfg(feature = "crypto-rust")]
            AuthenticationMode::DhIetf1024Sha256Aes128CbcPkcs7 => Ok(Zeroizing::new(crypto::decrypt(
                &secret.parameters,
                &secret.value,
                self.key()?,
            )?)),
            #[cfg(not(feature = "crypto-rust"))]
            other => Err(Error::UnsupportedMode(other.to_string())),
        }
    }
}

/// The `(oayays)` secret struct, in wire field order.
#[derive(Clone, PartialEq, Zeroize, ZeroizeOnDrop)]
pub struct Secret {
    #[zeroize(skip)]
    pub session: ObjectPath,
    /// The IV for encrypted sessions; empty otherwise.
    pub parameters: Vec<u8>,
    pub value: Vec<u8>,
    #[zeroize(skip)]
    pub content_type: String,
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("session", &self.session)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

impl Secret {
    pub fn new(session: ObjectPath, parameters: Vec<u8>, value: Vec<u8>) -> Self {
        Self {
            session,
            parameters,
            value,
            content_type: CONTENT_TYPE.to_string(),
        }
    }

    pub fn to_value(&self) -> Value {
        Value::Struct(vec![
            Value::Path(self.session.clone()),
            Value::Bytes(self.parameters.clone()),
            Value::Bytes(self.value.clone()),
            Value::Str(self.content_type.clone()),
        ])
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let mut fields = Reply::new("GetSecret", value.into_struct()?);
        Ok(Self {
            session: fields.next()?.into_path()?,
            parameters: fields.next()?.into_bytes()?,
            value: fields.next()?.into_bytes()?,
            content_type: fields.next()?.into_string()?,
        })
    }
}
