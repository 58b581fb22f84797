//! Cipher key material for at-rest value encryption.
//!
//! A key is a 32-byte ChaCha20-Poly1305 key plus the fixed 12-byte nonce used
//! for deterministic value encryption, written as `base64(key):base64(nonce)`.
//!
//! Resolution order:
//! 1. `SQLVAULT_ENCRYPTION_KEY`
//! 2. `storage.encryption.key` in the configuration
//! 3. the key file `<storage.encryption.path>/key`, sealed under a key
//!    derived from the process UID and generated on first start

use crate::{Config, CoreError, CoreResult, Paths};
use base64::{engine::general_purpose::STANDARD, Engine};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use std::fmt;
use std::path::Path;

/// Key size for ChaCha20-Poly1305 (256 bits).
pub const KEY_SIZE: usize = 32;
/// Nonce size for ChaCha20-Poly1305 (96 bits).
pub const NONCE_SIZE: usize = 12;

const KEY_ENV_VAR: &str = "SQLVAULT_ENCRYPTION_KEY";
const TAMPER_KEY_INFO: &[u8] = b"sqlvault-key-file-v1";

/// Key and fixed nonce used by the value codec.
#[derive(Clone, PartialEq, Eq)]
pub struct CipherKey {
    key: [u8; KEY_SIZE],
    nonce: [u8; NONCE_SIZE],
}

impl fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherKey").finish_non_exhaustive()
    }
}

impl CipherKey {
    pub fn new(key: [u8; KEY_SIZE], nonce: [u8; NONCE_SIZE]) -> Self {
        Self { key, nonce }
    }

    /// Generate a random key and nonce.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        let mut nonce = [0u8; NONCE_SIZE];
        let mut rng = rand::thread_rng();
        rng.fill_bytes(&mut key);
        rng.fill_bytes(&mut nonce);
        Self { key, nonce }
    }

    pub fn key(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }

    pub fn nonce(&self) -> &[u8; NONCE_SIZE] {
        &self.nonce
    }

    /// Parse `base64(key):base64(nonce)`.
    pub fn parse(encoded: &str) -> CoreResult<Self> {
        let (key_b64, nonce_b64) = encoded.trim().split_once(':').ok_or_else(|| {
            CoreError::KeyMaterial("expected '<key>:<nonce>' key material".to_string())
        })?;

        let key = decode_fixed::<KEY_SIZE>(key_b64, "key")?;
        let nonce = decode_fixed::<NONCE_SIZE>(nonce_b64, "nonce")?;
        Ok(Self { key, nonce })
    }

    /// Render as `base64(key):base64(nonce)`.
    pub fn encode(&self) -> String {
        format!("{}:{}", STANDARD.encode(self.key), STANDARD.encode(self.nonce))
    }

    /// Derive a 32-byte subkey bound to `info` (HKDF-SHA256 over key and nonce).
    pub fn derive(&self, info: &[u8]) -> CoreResult<[u8; 32]> {
        let mut ikm = [0u8; KEY_SIZE + NONCE_SIZE];
        ikm[..KEY_SIZE].copy_from_slice(&self.key);
        ikm[KEY_SIZE..].copy_from_slice(&self.nonce);
        hkdf_expand(&ikm, info)
    }
}

fn decode_fixed<const N: usize>(encoded: &str, what: &str) -> CoreResult<[u8; N]> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| CoreError::KeyMaterial(format!("invalid base64 {}: {}", what, e)))?;
    bytes.try_into().map_err(|bytes: Vec<u8>| {
        CoreError::KeyMaterial(format!(
            "{} must be {} bytes, got {}",
            what,
            N,
            bytes.len()
        ))
    })
}

fn hkdf_expand(ikm: &[u8], info: &[u8]) -> CoreResult<[u8; 32]> {
    let hk = Hkdf::<Sha256>::new(None, ikm);
    let mut okm = [0u8; 32];
    hk.expand(info, &mut okm)
        .map_err(|e| CoreError::KeyMaterial(format!("HKDF expand failed: {}", e)))?;
    Ok(okm)
}

/// Identity the key file is sealed to.
#[cfg(unix)]
pub fn process_uid() -> String {
    // SAFETY: getuid has no preconditions and cannot fail.
    let uid = unsafe { libc::getuid() };
    uid.to_string()
}

/// Identity the key file is sealed to.
#[cfg(not(unix))]
pub fn process_uid() -> String {
    std::env::var("USERNAME").unwrap_or_default()
}

/// Resolve the cipher key for this process, or `None` when encryption is disabled.
pub fn resolve_cipher_key(config: &Config, paths: &Paths) -> CoreResult<Option<CipherKey>> {
    let env_key = std::env::var(KEY_ENV_VAR).ok().filter(|k| !k.trim().is_empty());
    resolve_cipher_key_with(config, paths, env_key.as_deref(), &process_uid())
}

/// [`resolve_cipher_key`] with the environment value and sealing identity supplied.
pub fn resolve_cipher_key_with(
    config: &Config,
    paths: &Paths,
    env_key: Option<&str>,
    uid: &str,
) -> CoreResult<Option<CipherKey>> {
    paths.ensure_storage_dir()?;

    if !config.storage.encryption.enabled {
        tracing::info!("Encryption disabled, values are stored as plain typed data");
        return Ok(None);
    }

    if let Some(encoded) = env_key {
        tracing::debug!(source = KEY_ENV_VAR, "Using encryption key from environment");
        return CipherKey::parse(encoded).map(Some);
    }

    if let Some(encoded) = config
        .storage
        .encryption
        .key
        .as_deref()
        .filter(|k| !k.trim().is_empty())
    {
        tracing::debug!(source = "config", "Using encryption key from configuration");
        return CipherKey::parse(encoded).map(Some);
    }

    let key_file = paths.key_file();
    if key_file.exists() {
        tracing::debug!(path = %key_file.display(), "Opening sealed key file");
        return open_key_file(&key_file, uid).map(Some);
    }

    let existing = paths.existing_database_files()?;
    if !existing.is_empty() {
        tracing::error!(
            path = %key_file.display(),
            databases = existing.len(),
            "Key file missing while databases exist"
        );
        return Err(CoreError::KeyFileMissing(key_file.display().to_string()));
    }

    let key = CipherKey::generate();
    seal_key_file(&key_file, &key, uid)?;
    tracing::info!(path = %key_file.display(), "Generated new encryption key file");
    Ok(Some(key))
}

fn tamper_cipher(uid: &str) -> CoreResult<ChaCha20Poly1305> {
    let tamper_key = hkdf_expand(uid.as_bytes(), TAMPER_KEY_INFO)?;
    ChaCha20Poly1305::new_from_slice(&tamper_key)
        .map_err(|e| CoreError::KeyMaterial(format!("Failed to create cipher: {}", e)))
}

/// Seal `key` under the tamper key for `uid` and write it to `path`.
///
/// File content is `base64(nonce || ciphertext)`.
pub fn seal_key_file(path: &Path, key: &CipherKey, uid: &str) -> CoreResult<()> {
    let cipher = tamper_cipher(uid)?;

    let mut nonce = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), key.encode().as_bytes())
        .map_err(|e| CoreError::KeyMaterial(format!("Failed to seal key file: {}", e)))?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, STANDARD.encode(sealed))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}

/// Read and unseal a key file written by [`seal_key_file`].
pub fn open_key_file(path: &Path, uid: &str) -> CoreResult<CipherKey> {
    let content = std::fs::read_to_string(path)?;
    let sealed = STANDARD
        .decode(content.trim())
        .map_err(|e| CoreError::KeyMaterial(format!("Key file is not base64: {}", e)))?;

    if sealed.len() <= NONCE_SIZE {
        return Err(CoreError::KeyMaterial("Key file is truncated".to_string()));
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);

    let plaintext = tamper_cipher(uid)?
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| {
            CoreError::KeyMaterial(
                "Key file could not be opened (tampered, or sealed by another user)".to_string(),
            )
        })?;

    let encoded = String::from_utf8(plaintext)
        .map_err(|e| CoreError::KeyMaterial(format!("Key file is not UTF-8: {}", e)))?;
    CipherKey::parse(&encoded)
}
