//! Symmetric encryption for the persisted token cache.
//!
//! This module provides:
//! - `Cipher`: AES-128-CBC with PKCS#7 padding under a 16-byte key
//! - `IvMode`: random per-call IV (embedded, tagged) or a fixed IV (bare)

pub mod cipher;

pub use cipher::{decrypt, encrypt, Cipher, CipherError, IvMode, BLOCK_LEN, KEY_LEN, TAG_LEN};
