//! AES-128-CBC encryption of opaque byte blobs.
//!
//! Two layouts are produced depending on the [`IvMode`]:
//!
//! - `Random`: `IV(16) || ciphertext || HMAC-SHA256(IV || ciphertext)(32)`.
//!   A fresh IV is drawn for every call. The trailing tag makes any modified
//!   byte fail decryption instead of yielding altered plaintext.
//! - `Fixed`: bare ciphertext. Used for payloads exchanged with the remote
//!   service, which expects its own fixed IV and no tag.

use aes::Aes128;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type HmacSha256 = Hmac<Sha256>;

// ============================================================================
// Constants
// ============================================================================

/// Required key length in bytes (AES-128).
pub const KEY_LEN: usize = 16;

/// AES block length, also the IV length.
pub const BLOCK_LEN: usize = 16;

/// Length of the integrity tag appended in random-IV mode.
pub const TAG_LEN: usize = 32;

/// Domain separation label for the tag key derived from the cache key.
const MAC_KEY_LABEL: &[u8] = b"stepsync/token-cache/mac";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CipherError {
    #[error("key must be 16 bytes, got {0}")]
    InvalidKey(usize),

    #[error("IV must be 16 bytes, got {0}")]
    InvalidIv(usize),

    #[error("decryption failed: {0}")]
    Decrypt(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IvMode {
    Random,
    Fixed([u8; BLOCK_LEN]),
}

/// AES-128-CBC cipher bound to a key and an IV mode.
#[derive(Clone)]
pub struct Cipher {
    key: [u8; KEY_LEN],
    iv_mode: IvMode,
}

impl std::fmt::Debug for Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cipher")
            .field("key", &"<redacted>")
            .field("iv_mode", &self.iv_mode)
            .finish()
    }
}

impl Cipher {
    /// Create a cipher that draws a random IV per encryption
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        let key: [u8; KEY_LEN] = key
            .try_into()
            .map_err(|_| CipherError::InvalidKey(key.len()))?;
        Ok(Self {
            key,
            iv_mode: IvMode::Random,
        })
    }

    /// Create a cipher that always uses `iv` and does not embed it
    pub fn with_fixed_iv(key: &[u8], iv: &[u8]) -> Result<Self, CipherError> {
        let mut cipher = Self::new(key)?;
        let iv: [u8; BLOCK_LEN] = iv
            .try_into()
            .map_err(|_| CipherError::InvalidIv(iv.len()))?;
        cipher.iv_mode = IvMode::Fixed(iv);
        Ok(cipher)
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        match self.iv_mode {
            IvMode::Fixed(iv) => Ok(self.cbc_encrypt(&iv, plaintext)),
            IvMode::Random => {
                let mut iv = [0u8; BLOCK_LEN];
                rand::thread_rng().fill_bytes(&mut iv);

                let ciphertext = self.cbc_encrypt(&iv, plaintext);
                let mut out = Vec::with_capacity(BLOCK_LEN + ciphertext.len() + TAG_LEN);
                out.extend_from_slice(&iv);
                out.extend_from_slice(&ciphertext);

                let mut mac = self.mac()?;
                mac.update(&out);
                out.extend_from_slice(&mac.finalize().into_bytes());
                Ok(out)
            }
        }
    }

    pub fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>, CipherError> {
        match self.iv_mode {
            IvMode::Fixed(iv) => self.cbc_decrypt(&iv, blob),
            IvMode::Random => {
                if blob.len() < BLOCK_LEN + TAG_LEN {
                    return Err(CipherError::Decrypt("data too short"));
                }
                let (body, tag) = blob.split_at(blob.len() - TAG_LEN);
                let (iv_bytes, ciphertext) = body.split_at(BLOCK_LEN);
                check_ciphertext_len(ciphertext)?;

                let mut mac = self.mac()?;
                mac.update(body);
                mac.verify_slice(tag)
                    .map_err(|_| CipherError::Decrypt("integrity tag mismatch"))?;

                let mut iv = [0u8; BLOCK_LEN];
                iv.copy_from_slice(iv_bytes);
                self.cbc_decrypt(&iv, ciphertext)
            }
        }
    }

    fn cbc_encrypt(&self, iv: &[u8; BLOCK_LEN], plaintext: &[u8]) -> Vec<u8> {
        Aes128CbcEnc::new(&self.key.into(), &(*iv).into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
    }

    fn cbc_decrypt(&self, iv: &[u8; BLOCK_LEN], ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        check_ciphertext_len(ciphertext)?;
        // Pkcs7 rejects a pad length outside 1..=16 and non-uniform pad bytes
        Aes128CbcDec::new(&self.key.into(), &(*iv).into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| CipherError::Decrypt("invalid PKCS#7 padding"))
    }

    fn mac(&self) -> Result<HmacSha256, CipherError> {
        let mac_key = Sha256::new()
            .chain_update(MAC_KEY_LABEL)
            .chain_update(self.key)
            .finalize();
        HmacSha256::new_from_slice(&mac_key).map_err(|_| CipherError::InvalidKey(mac_key.len()))
    }
}

fn check_ciphertext_len(ciphertext: &[u8]) -> Result<(), CipherError> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
        return Err(CipherError::Decrypt("invalid ciphertext length"));
    }
    Ok(())
}

/// Encrypt `plaintext` under `key`. Without an `iv` a random one is drawn and
/// embedded in the output.
pub fn encrypt(plaintext: &[u8], key: &[u8], iv: Option<&[u8]>) -> Result<Vec<u8>, CipherError> {
    match iv {
        Some(iv) => Cipher::with_fixed_iv(key, iv)?.encrypt(plaintext),
        None => Cipher::new(key)?.encrypt(plaintext),
    }
}

/// Decrypt a blob produced by [`encrypt`] with the same `key` and `iv`.
pub fn decrypt(blob: &[u8], key: &[u8], iv: Option<&[u8]>) -> Result<Vec<u8>, CipherError> {
    match iv {
        Some(iv) => Cipher::with_fixed_iv(key, iv)?.decrypt(blob),
        None => Cipher::new(key)?.decrypt(blob),
    }
}

// ============================================================================
// Tests
// ============================================================================
