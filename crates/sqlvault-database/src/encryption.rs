//! ChaCha20-Poly1305 encryption for stored values.
//!
//! Value encryption is deterministic: every value is sealed with the fixed
//! nonce from the key material, so equal plaintexts produce equal ciphertexts
//! and `WHERE column = ?` keeps working over encrypted columns.

use crate::{DatabaseError, DatabaseResult};
use base64::{engine::general_purpose::STANDARD, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use sqlvault_config_and_utils::{CipherKey, KEY_SIZE, NONCE_SIZE};

/// Encrypt content using ChaCha20-Poly1305.
///
/// Returns the ciphertext with the authentication tag appended.
pub fn encrypt_content(key: &[u8], nonce: &[u8], plaintext: &[u8]) -> DatabaseResult<Vec<u8>> {
    let cipher = cipher_for(key, nonce)?;
    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|e| DatabaseError::Codec(format!("encryption failed: {}", e)))
}

/// Decrypt content using ChaCha20-Poly1305.
pub fn decrypt_content(key: &[u8], nonce: &[u8], ciphertext: &[u8]) -> DatabaseResult<Vec<u8>> {
    let cipher = cipher_for(key, nonce)?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|e| DatabaseError::Codec(format!("decryption failed: {}", e)))
}

fn cipher_for(key: &[u8], nonce: &[u8]) -> DatabaseResult<ChaCha20Poly1305> {
    if key.len() != KEY_SIZE {
        return Err(DatabaseError::Codec(format!(
            "Invalid key size: expected {}, got {}",
            KEY_SIZE,
            key.len()
        )));
    }

    if nonce.len() != NONCE_SIZE {
        return Err(DatabaseError::Codec(format!(
            "Invalid nonce size: expected {}, got {}",
            NONCE_SIZE,
            nonce.len()
        )));
    }

    ChaCha20Poly1305::new_from_slice(key).map_err(|e| DatabaseError::Codec(e.to_string()))
}

/// Encrypt `plaintext` under the process key and return base64 ciphertext.
pub fn seal(key: &CipherKey, plaintext: &str) -> DatabaseResult<String> {
    let ciphertext = encrypt_content(key.key(), key.nonce(), plaintext.as_bytes())?;
    Ok(STANDARD.encode(ciphertext))
}

/// Reverse of [`seal`].
pub fn open(key: &CipherKey, encoded: &str) -> DatabaseResult<String> {
    let ciphertext = STANDARD
        .decode(encoded)
        .map_err(|e| DatabaseError::Codec(format!("ciphertext is not base64: {}", e)))?;
    let plaintext = decrypt_content(key.key(), key.nonce(), &ciphertext)?;
    String::from_utf8(plaintext)
        .map_err(|e| DatabaseError::Codec(format!("plaintext is not UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_roundtrip() {
        let key = CipherKey::generate();
        let sealed = seal(&key, "Hello, World!").unwrap();
        assert_ne!(sealed, "Hello, World!");
        assert_eq!(open(&key, &sealed).unwrap(), "Hello, World!");
    }

    #[test]
    fn test_seal_is_deterministic() {
        let key = CipherKey::generate();
        assert_eq!(seal(&key, "red").unwrap(), seal(&key, "red").unwrap());
        assert_ne!(seal(&key, "red").unwrap(), seal(&key, "blue").unwrap());
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = seal(&CipherKey::generate(), "secret").unwrap();
        assert!(matches!(
            open(&CipherKey::generate(), &sealed),
            Err(DatabaseError::Codec(_))
        ));
    }

    #[test]
    fn test_invalid_sizes() {
        assert!(encrypt_content(&[0u8; 16], &[0u8; NONCE_SIZE], b"x").is_err());
        assert!(encrypt_content(&[0u8; KEY_SIZE], &[0u8; 8], b"x").is_err());
        assert!(decrypt_content(&[0u8; KEY_SIZE], &[0u8; 8], b"x").is_err());
    }

    #[test]
    fn test_open_rejects_non_base64() {
        let key = CipherKey::generate();
        assert!(open(&key, "not base64 at all!").is_err());
    }
}
