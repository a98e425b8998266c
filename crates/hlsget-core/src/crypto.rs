//! AES-128-CBC segment decryption with PKCS#7 unpadding.
//!
//! The key is fetched once per run and shared read-only by every worker.
//! When the playlist carries no IV attribute, the key bytes double as the
//! IV, matching common encryptor behavior for such streams.

use aes::Aes128;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
use thiserror::Error;

type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// AES-128 block size in bytes.
pub const BLOCK_SIZE: usize = 16;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("expected a {BLOCK_SIZE}-byte key, got {0} bytes")]
    KeyLength(usize),
    #[error("expected a {BLOCK_SIZE}-byte IV, got {0} bytes")]
    IvLength(usize),
    #[error("IV is not valid hex: {0}")]
    IvFormat(#[from] hex::FromHexError),
    #[error("ciphertext length {0} is not a multiple of the block size")]
    NotBlockAligned(usize),
    #[error("bad PKCS#7 padding")]
    Padding,
}

/// Immutable key material for one run.
#[derive(Debug, Clone)]
pub struct SegmentKey {
    key: [u8; BLOCK_SIZE],
    iv: [u8; BLOCK_SIZE],
}

impl SegmentKey {
    /// Builds key material, falling back to the key bytes when `iv` is absent.
    pub fn new(key: &[u8], iv: Option<&[u8]>) -> Result<Self, CryptoError> {
        let key: [u8; BLOCK_SIZE] = key
            .try_into()
            .map_err(|_| CryptoError::KeyLength(key.len()))?;
        let iv = match iv {
            Some(iv) => iv.try_into().map_err(|_| CryptoError::IvLength(iv.len()))?,
            None => key,
        };
        Ok(Self { key, iv })
    }

    /// Decrypts one whole segment and strips PKCS#7 padding.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(CryptoError::NotBlockAligned(ciphertext.len()));
        }
        let mut buf = ciphertext.to_vec();
        let plain = Aes128CbcDec::new((&self.key).into(), (&self.iv).into())
            .decrypt_padded_mut::<Pkcs7>(&mut buf)
            .map_err(|_| CryptoError::Padding)?;
        Ok(plain.to_vec())
    }
}

/// Decodes the playlist's IV attribute (`0x…` or bare hex) into 16 bytes.
pub fn parse_iv(s: &str) -> Result<[u8; BLOCK_SIZE], CryptoError> {
    let hex_str = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    let bytes = hex::decode(hex_str)?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::IvLength(bytes.len()))
}
