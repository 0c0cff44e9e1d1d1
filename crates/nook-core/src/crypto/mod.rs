//! Vault encryption.
//!
//! A vault record is a flat string map serialized as JSON and sealed with
//! ChaCha20-Poly1305 under a key derived from a passphrase with Argon2id.
//! Every blob carries its own salt and KDF parameters:
//!
//! ```text
//! base64( version=1 | m_cost u32 LE | t_cost u32 LE | p_cost u32 LE | salt[16] | nonce[12] | ciphertext+tag )
//! ```
//!
//! Decryption never fails loudly: a wrong passphrase, a truncated blob or a
//! tag mismatch all yield `None`, so callers can render an error state.

use std::collections::BTreeMap;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroizing;

/// Decrypted vault record
pub type VaultRecord = BTreeMap<String, String>;

const BLOB_VERSION: u8 = 1;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
const HEADER_LEN: usize = 1 + 4 * 3 + SALT_LEN + NONCE_LEN;

// Upper bounds accepted when reading a blob header
const MAX_M_COST: u32 = 1 << 20;
const MAX_T_COST: u32 = 16;
const MAX_P_COST: u32 = 16;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Failed to serialize vault record: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Key derivation failed: {0}")]
    Kdf(String),
    #[error("Encryption failed: {0}")]
    Encryption(String),
}

pub type CryptoResult<T> = Result<T, CryptoError>;

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub m_cost: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl KdfParams {
    pub const fn new(m_cost: u32, t_cost: u32, p_cost: u32) -> Self {
        Self {
            m_cost,
            t_cost,
            p_cost,
        }
    }

    fn argon2(self) -> CryptoResult<Argon2<'static>> {
        let params = Params::new(self.m_cost, self.t_cost, self.p_cost, Some(KEY_LEN))
            .map_err(|e| CryptoError::Kdf(e.to_string()))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    const fn is_plausible(self) -> bool {
        self.p_cost >= 1
            && self.p_cost <= MAX_P_COST
            && self.t_cost >= 1
            && self.t_cost <= MAX_T_COST
            && self.m_cost >= 8 * self.p_cost
            && self.m_cost <= MAX_M_COST
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::new(
            Params::DEFAULT_M_COST,
            Params::DEFAULT_T_COST,
            Params::DEFAULT_P_COST,
        )
    }
}

/// Passphrase-based sealing of vault records and small secrets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VaultCrypto {
    params: KdfParams,
}

impl VaultCrypto {
    pub const fn new(params: KdfParams) -> Self {
        Self { params }
    }

    pub const fn params(&self) -> KdfParams {
        self.params
    }

    /// Serialize and encrypt a record under `passphrase`
    pub fn encrypt(&self, record: &VaultRecord, passphrase: &str) -> CryptoResult<String> {
        let plaintext = Zeroizing::new(serde_json::to_vec(record)?);
        self.seal(&plaintext, passphrase)
    }

    /// Decrypt a record; `None` on any format or authentication failure
    pub fn decrypt(&self, blob: &str, passphrase: &str) -> Option<VaultRecord> {
        let plaintext = self.open(blob, passphrase)?;
        serde_json::from_slice(&plaintext).ok()
    }

    /// Encrypt raw bytes under `passphrase`
    pub fn seal(&self, plaintext: &[u8], passphrase: &str) -> CryptoResult<String> {
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut salt);
        OsRng.fill_bytes(&mut nonce);

        let key = derive_key(self.params, passphrase, &salt)?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key[..]));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        let mut blob = Vec::with_capacity(HEADER_LEN + ciphertext.len());
        blob.push(BLOB_VERSION);
        blob.extend_from_slice(&self.params.m_cost.to_le_bytes());
        blob.extend_from_slice(&self.params.t_cost.to_le_bytes());
        blob.extend_from_slice(&self.params.p_cost.to_le_bytes());
        blob.extend_from_slice(&salt);
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(blob))
    }

    /// Decrypt raw bytes; the parameters recorded in the blob are used
    pub fn open(&self, blob: &str, passphrase: &str) -> Option<Zeroizing<Vec<u8>>> {
        let data = STANDARD.decode(blob.trim()).ok()?;
        if data.len() < HEADER_LEN || data[0] != BLOB_VERSION {
            return None;
        }

        let params = KdfParams::new(
            read_u32(&data[1..5])?,
            read_u32(&data[5..9])?,
            read_u32(&data[9..13])?,
        );
        if !params.is_plausible() {
            return None;
        }

        let salt = &data[13..13 + SALT_LEN];
        let nonce = &data[13 + SALT_LEN..HEADER_LEN];
        let ciphertext = &data[HEADER_LEN..];

        let key = derive_key(params, passphrase, salt).ok()?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key[..]));
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .ok()
            .map(Zeroizing::new)
    }

    /// Argon2id PHC hash of a PIN
    pub fn hash_pin(&self, pin: &str) -> CryptoResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .params
            .argon2()?
            .hash_password(pin.as_bytes(), &salt)
            .map_err(|e| CryptoError::Kdf(e.to_string()))?;
        Ok(hash.to_string())
    }
}

/// Check a PIN against a stored PHC hash; malformed hashes never match
pub fn compare_pin(pin: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        tracing::warn!("Stored PIN hash is malformed");
        return false;
    };
    Argon2::default()
        .verify_password(pin.as_bytes(), &parsed)
        .is_ok()
}

fn derive_key(
    params: KdfParams,
    passphrase: &str,
    salt: &[u8],
) -> CryptoResult<Zeroizing<[u8; KEY_LEN]>> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    params
        .argon2()?
        .hash_password_into(passphrase.as_bytes(), salt, &mut *key)
        .map_err(|e| CryptoError::Kdf(e.to_string()))?;
    Ok(key)
}

fn read_u32(bytes: &[u8]) -> Option<u32> {
    Some(u32::from_le_bytes(bytes.try_into().ok()?))
}
