//! # AES-256-GCM Sealing
//!
//! Authenticated encryption for values at rest in the vault store.
//!
//! Every sealed value carries associated data (AAD): the slot it was written
//! to. A ciphertext lifted from one wallet's slot and pasted into another
//! fails authentication instead of quietly decrypting into the wrong account.
//!
//! ## Nonce management
//!
//! Random 96-bit nonces from the OS CSPRNG. GCM is unforgiving about nonce
//! reuse, and a vault store sees a handful of writes per minute, nowhere
//! near the ~2^48 birthday bound.
//!
//! ## Wire format
//!
//! [`seal`] returns `nonce || ciphertext` as a single `Vec<u8>`. The first
//! 12 bytes are the nonce, the rest is the ciphertext plus the 16-byte tag.
//! [`open`] expects the same layout.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use thiserror::Error;

use crate::config::{AES_KEY_LENGTH, AES_NONCE_LENGTH};

/// Errors that can occur during sealing/opening.
///
/// Kept vague. "Wrong key" and "tampered ciphertext" look the same from
/// the outside.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed")]
    EncryptFailed,

    #[error("decryption failed -- wrong key, wrong slot, or corrupted ciphertext")]
    DecryptFailed,

    #[error("sealed value too short: must be at least {AES_NONCE_LENGTH} bytes")]
    CiphertextTooShort,
}

/// Seal `plaintext` under `key`, binding `aad` to the result.
///
/// Returns `nonce || ciphertext`.
///
/// # Example
///
/// ```
/// use lstvault_core::crypto::encryption::{open, seal};
///
/// let key = [0x42u8; 32];
/// let sealed = seal(&key, b"{\"wbtc\":1.0}", b"slot").unwrap();
/// assert_eq!(open(&key, &sealed, b"slot").unwrap(), b"{\"wbtc\":1.0}");
/// assert!(open(&key, &sealed, b"other-slot").is_err());
/// ```
pub fn seal(
    key: &[u8; AES_KEY_LENGTH],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::EncryptFailed)?;

    let mut nonce_bytes = [0u8; AES_NONCE_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CryptoError::EncryptFailed)?;

    let mut out = Vec::with_capacity(AES_NONCE_LENGTH + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open a value produced by [`seal`].
///
/// `aad` must be byte-identical to what was passed at seal time.
pub fn open(key: &[u8; AES_KEY_LENGTH], sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < AES_NONCE_LENGTH {
        return Err(CryptoError::CiphertextTooShort);
    }

    let (nonce_bytes, ciphertext) = sealed.split_at(AES_NONCE_LENGTH);
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::DecryptFailed)?;
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| CryptoError::DecryptFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [7u8; 32];

    #[test]
    fn seal_then_open() {
        let sealed = seal(&KEY, b"positions", b"slot-a").unwrap();
        assert_eq!(open(&KEY, &sealed, b"slot-a").unwrap(), b"positions");
    }

    #[test]
    fn nonces_are_fresh_per_seal() {
        let a = seal(&KEY, b"same", b"slot").unwrap();
        let b = seal(&KEY, b"same", b"slot").unwrap();
        assert_ne!(a[..AES_NONCE_LENGTH], b[..AES_NONCE_LENGTH]);
    }

    #[test]
    fn wrong_key_rejected() {
        let sealed = seal(&KEY, b"positions", b"slot").unwrap();
        let other = [8u8; 32];
        assert!(matches!(
            open(&other, &sealed, b"slot"),
            Err(CryptoError::DecryptFailed)
        ));
    }

    #[test]
    fn wrong_slot_rejected() {
        let sealed = seal(&KEY, b"positions", b"slot-a").unwrap();
        assert!(open(&KEY, &sealed, b"slot-b").is_err());
    }

    #[test]
    fn tampered_ciphertext_rejected() {
        let mut sealed = seal(&KEY, b"positions", b"slot").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(open(&KEY, &sealed, b"slot").is_err());
    }

    #[test]
    fn short_input_rejected() {
        assert!(matches!(
            open(&KEY, &[0u8; 5], b"slot"),
            Err(CryptoError::CiphertextTooShort)
        ));
    }
}
