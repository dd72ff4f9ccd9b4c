/*!

The secret value the store keeps for each user.

 */

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::errors::{Error, Result};

pub const FULL_SECRET_LEN: usize = 32;

/// A user's full secret: exactly 32 bytes, wiped when dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct FullSecret([u8; FULL_SECRET_LEN]);

impl FullSecret {
    pub fn new(bytes: [u8; FULL_SECRET_LEN]) -> Self {
        Self(bytes)
    }

    /// Rebuild a secret from the bytes the daemon handed back.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; FULL_SECRET_LEN] = bytes
            .try_into()
            .map_err(|_| Error::InvalidSecret(bytes.len()))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for FullSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FullSecret(..)")
    }
}
