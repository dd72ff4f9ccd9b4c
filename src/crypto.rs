/*!

Session crypto for the `dh-ietf1024-sha256-aes128-cbc-pkcs7` algorithm.

A Diffie-Hellman exchange over the RFC 2409 Second Oakley Group yields a
shared secret; HKDF-SHA256 (no salt, empty info) over that secret,
left-padded to the width of the prime, gives the 128-bit AES key. Secrets
then travel as AES-128-CBC with PKCS#7 padding, the IV carried in the
secret's parameters.

 */

use aes::Aes128;
use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hkdf::Hkdf;
use num_bigint::BigUint;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::errors::{Error, Result};

pub const AES_KEY_LEN: usize = 16;
pub const IV_LEN: usize = 16;

/// 128-bit AES key; wiped when dropped.
pub type AesKey = Zeroizing<[u8; AES_KEY_LEN]>;

// RFC 2409, section 6.2
const OAKLEY_GROUP_2_PRIME: [u8; 128] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xC9, 0x0F, 0xDA, 0xA2, 0x21, 0x68, 0xC2, 0x34,
    0xC4, 0xC6, 0x62, 0x8B, 0x80, 0xDC, 0x1C, 0xD1, 0x29, 0x02, 0x4E, 0x08, 0x8A, 0x67, 0xCC, 0x74,
    0x02, 0x0B, 0xBE, 0xA6, 0x3B, 0x13, 0x9B, 0x22, 0x51, 0x4A, 0x08, 0x79, 0x8E, 0x34, 0x04, 0xDD,
    0xEF, 0x95, 0x19, 0xB3, 0xCD, 0x3A, 0x43, 0x1B, 0x30, 0x2B, 0x0A, 0x6D, 0xF2, 0x5F, 0x14, 0x37,
    0x4F, 0xE1, 0x35, 0x6D, 0x6D, 0x51, 0xC2, 0x45, 0xE4, 0x85, 0xB5, 0x76, 0x62, 0x5E, 0x7E, 0xC6,
    0xF4, 0x4C, 0x42, 0xE9, 0xA6, 0x37, 0xED, 0x6B, 0x0B, 0xFF, 0x5C, 0xB6, 0xF4, 0x06, 0xB7, 0xED,
    0xEE, 0x38, 0x6B, 0xFB, 0x5A, 0x89, 0x9F, 0xA5, 0xAE, 0x9F, 0x24, 0x11, 0x7C, 0x4B, 0x1F, 0xE6,
    0x49, 0x28, 0x66, 0x51, 0xEC, 0xE6, 0x53, 0x81, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
];

/// A modular Diffie-Hellman group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhGroup {
    prime: BigUint,
    generator: BigUint,
}

/// One side's exchange values. The private scalar never leaves the process.
pub struct Keypair {
    private: BigUint,
    public: BigUint,
}

impl Keypair {
    /// The public value as minimal big-endian bytes, as sent on the wire.
    pub fn public_bytes(&self) -> Vec<u8> {
        self.public.to_bytes_be()
    }
}

impl DhGroup {
    pub fn new(prime: BigUint, generator: BigUint) -> Self {
        Self { prime, generator }
    }

    /// The RFC 2409 Second Oakley Group (1024-bit MODP, generator 2).
    pub fn oakley_group_2() -> Self {
        Self::new(BigUint::from_bytes_be(&OAKLEY_GROUP_2_PRIME), BigUint::from(2u32))
    }

    fn width(&self) -> usize {
        self.prime.bits().div_ceil(8) as usize
    }

    /// A fresh keypair with a private scalar as wide as the prime.
    pub fn new_keypair(&self) -> Keypair {
        let mut bytes = Zeroizing::new(vec![0u8; self.width()]);
        rand::thread_rng().fill_bytes(&mut bytes);
        self.keypair_from_private(BigUint::from_bytes_be(&bytes))
    }

    pub fn keypair_from_private(&self, private: BigUint) -> Keypair {
        let public = self.generator.modpow(&private, &self.prime);
        Keypair { private, public }
    }

    /// Parse the other side's big-endian public value, rejecting values
    /// that are empty or outside `2..=p-2`.
    pub fn parse_public(&self, bytes: &[u8]) -> Result<BigUint> {
        if bytes.is_empty() {
            return Err(Error::BadResponse("empty DH public value".to_string()));
        }
        let public = BigUint::from_bytes_be(bytes);
        let upper = &self.prime - 1u32;
        if public <= BigUint::from(1u32) || public >= upper {
            return Err(Error::BadResponse("DH public value out of range".to_string()));
        }
        Ok(public)
    }

    /// HKDF-SHA256 over the shared secret, expanded to an AES-128 key.
    pub fn derive_key(&self, their_public: &BigUint, ours: &Keypair) -> Result<AesKey> {
        let shared = their_public.modpow(&ours.private, &self.prime);
        let shared_bytes = Zeroizing::new(shared.to_bytes_be());
        let mut padded = Zeroizing::new(vec![0u8; self.width() - shared_bytes.len()]);
        padded.extend_from_slice(&shared_bytes);

        let hk = Hkdf::<Sha256>::new(None, &padded);
        let mut key = Zeroizing::new([0u8; AES_KEY_LEN]);
        hk.expand(&[], &mut key[..])
            .map_err(|e| Error::Crypto(e.to_string()))?;
        Ok(key)
    }
}

/// Encrypt under a fresh random IV; returns `(iv, ciphertext)`.
pub fn encrypt(plaintext: &[u8], key: &[u8; AES_KEY_LEN]) -> (Vec<u8>, Vec<u8>) {
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);
    let ciphertext = encrypt_with_iv(plaintext, key, &iv);
    (iv.to_vec(), ciphertext)
}

fn encrypt_with_iv(plaintext: &[u8], key: &[u8; AES_KEY_LEN], iv: &[u8; IV_LEN]) -> Vec<u8> {
    cbc::Encryptor::<Aes128>::new(key.into(), iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

pub fn decrypt(iv: &[u8], ciphertext: &[u8], key: &[u8; AES_KEY_LEN]) -> Result<Vec<u8>> {
    let decryptor = cbc::Decryptor::<Aes128>::new_from_slices(key, iv)
        .map_err(|_| Error::Crypto(format!("IV must be {IV_LEN} bytes, got {}", iv.len())))?;
    decryptor
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| Error::Crypto("bad padding in decrypted secret".to_string()))
}
