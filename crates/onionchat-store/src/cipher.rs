//! Passphrase-based encryption of the storage file.
//!
//! File layout: `MAGIC (4) || salt (16) || nonce (24) || ciphertext`.
//! The key is derived with Argon2id from the passphrase and salt, then run
//! through a BLAKE3 KDF with a storage-specific context.

use argon2::Argon2;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;

use onionchat_shared::constants::KDF_CONTEXT_STORAGE_KEY;

use crate::error::{Result, StoreError};

pub type SymmetricKey = [u8; 32];

/// File magic and format version
pub const MAGIC: [u8; 4] = *b"OCS1";

/// Argon2 salt size in bytes
pub const SALT_SIZE: usize = 16;

/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

const HEADER_SIZE: usize = MAGIC.len() + SALT_SIZE;

pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Argon2id + BLAKE3 domain separation.  CPU heavy; call off the runtime.
pub fn derive_key(passphrase: &[u8], salt: &[u8]) -> Result<SymmetricKey> {
    let mut master = [0u8; 32];
    Argon2::default()
        .hash_password_into(passphrase, salt, &mut master)
        .map_err(|e| StoreError::KeyDerivation(e.to_string()))?;
    Ok(blake3::derive_key(KDF_CONTEXT_STORAGE_KEY, &master))
}

// Returns nonce || ciphertext
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce_bytes = generate_nonce();
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| StoreError::EncryptionFailed)?;

    let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

/// Authentication failure means the key is wrong (or the file was tampered
/// with); both are reported as a wrong passphrase.
pub fn decrypt(key: &SymmetricKey, data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < NONCE_SIZE {
        return Err(StoreError::Corrupted("ciphertext too short".into()));
    }

    let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce = XNonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| StoreError::WrongPassphrase)
}

/// Build the full file contents.
pub fn seal(key: &SymmetricKey, salt: &[u8; SALT_SIZE], plaintext: &[u8]) -> Result<Vec<u8>> {
    let sealed = encrypt(key, plaintext)?;
    let mut out = Vec::with_capacity(HEADER_SIZE + sealed.len());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(salt);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Split file contents into salt and `nonce || ciphertext`.
pub fn split_header(raw: &[u8]) -> Result<([u8; SALT_SIZE], &[u8])> {
    if raw.len() < HEADER_SIZE {
        return Err(StoreError::Corrupted("file too short".into()));
    }
    if raw[..MAGIC.len()] != MAGIC {
        return Err(StoreError::Corrupted("bad magic".into()));
    }

    let mut salt = [0u8; SALT_SIZE];
    salt.copy_from_slice(&raw[MAGIC.len()..HEADER_SIZE]);
    Ok((salt, &raw[HEADER_SIZE..]))
}
