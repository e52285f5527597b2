//! Content-level encryption for secret material.
//!
//! Every secret series is encrypted under its own AES-256-GCM key, derived
//! from a long-lived root key with HKDF-SHA256 using the series name as the
//! salt. The series name is also bound in as AEAD associated data, so a
//! ciphertext copied onto another series fails authentication instead of
//! decrypting under the wrong name.
//!
//! The stored form is an envelope string: `base64(nonce || ct || tag) "." kid`,
//! where `kid` identifies the root key the content key was derived from.
//! Retired root keys stay registered so old envelopes remain readable after
//! a rotation.

use aes_gcm::aead::{Aead, KeyInit, OsRng, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hkdf::Hkdf;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// AES-256 key size in bytes.
pub const KEY_SIZE: usize = 32;

/// AES-GCM nonce size in bytes.
pub const NONCE_SIZE: usize = 12;

/// AES-GCM authentication tag size in bytes.
pub const TAG_SIZE: usize = 16;

/// Maximum length of a key id, in printable ASCII characters.
pub const MAX_KEY_ID_LEN: usize = 16;

/// HKDF info label for content keys.
const CONTENT_INFO: &[u8] = b"content";

#[derive(Debug, Error)]
pub enum CryptoError {
    /// AEAD tag or AAD mismatch. Indicates corruption or cross-series
    /// ciphertext reuse; must never be swallowed.
    #[error("ciphertext failed integrity check")]
    Integrity,
    #[error("malformed envelope: {0}")]
    Envelope(String),
    #[error("unknown key id '{0}'")]
    UnknownKeyId(String),
    #[error("invalid key id '{0}'")]
    InvalidKeyId(String),
    #[error("AEAD encryption failed")]
    Encrypt,
}

/// A 32-byte root key, provisioned out of band. Zeroized on drop, never
/// logged, never serialized.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct RootKey([u8; KEY_SIZE]);

impl RootKey {
    pub fn new(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

/// Derives per-series content keys and seals/opens content envelopes.
///
/// Holds every root key ever installed, keyed by key id; new envelopes are
/// written under the active key.
pub struct ContentCryptographer {
    active_kid: String,
    active_key: RootKey,
    retired: HashMap<String, RootKey>,
}

impl ContentCryptographer {
    pub fn new(key_id: impl Into<String>, root: RootKey) -> Result<Self, CryptoError> {
        let key_id = key_id.into();
        validate_key_id(&key_id)?;
        Ok(Self {
            active_kid: key_id,
            active_key: root,
            retired: HashMap::new(),
        })
    }

    /// Register a retired root key so envelopes written under it stay
    /// decryptable. New envelopes still use the active key.
    pub fn with_retired_key(
        mut self,
        key_id: impl Into<String>,
        root: RootKey,
    ) -> Result<Self, CryptoError> {
        let key_id = key_id.into();
        validate_key_id(&key_id)?;
        self.retired.insert(key_id, root);
        Ok(self)
    }

    pub fn active_key_id(&self) -> &str {
        &self.active_kid
    }

    fn key_for(&self, kid: &str) -> Option<&RootKey> {
        if kid == self.active_kid {
            Some(&self.active_key)
        } else {
            self.retired.get(kid)
        }
    }

    /// contentKey = HKDF-SHA256(rootKey, salt = seriesName, info = "content").
    ///
    /// Using the name as salt means a renamed series would need every
    /// revision re-encrypted; rename is therefore not offered.
    fn content_key(&self, root: &RootKey, series_name: &str) -> Zeroizing<[u8; KEY_SIZE]> {
        let hk = Hkdf::<Sha256>::new(Some(series_name.as_bytes()), root.as_bytes());
        let mut okm = Zeroizing::new([0u8; KEY_SIZE]);
        hk.expand(CONTENT_INFO, okm.as_mut())
            .expect("HKDF expand cannot fail for 32-byte output");
        okm
    }

    /// Seal plaintext for the named series under the active root key.
    pub fn encrypt(&self, plaintext: &[u8], series_name: &str) -> Result<String, CryptoError> {
        let content_key = self.content_key(&self.active_key, series_name);

        let key = Key::<Aes256Gcm>::from_slice(content_key.as_ref());
        let cipher = Aes256Gcm::new(key);

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ct = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad: series_name.as_bytes(),
                },
            )
            .map_err(|_| CryptoError::Encrypt)?;

        let mut packed = Vec::with_capacity(NONCE_SIZE + ct.len());
        packed.extend_from_slice(&nonce_bytes);
        packed.extend_from_slice(&ct);

        Ok(format!("{}.{}", BASE64.encode(&packed), self.active_kid))
    }

    /// Open an envelope written for the named series. Any failure means the
    /// row is corrupt or carries another series' ciphertext.
    pub fn decrypt(
        &self,
        envelope: &str,
        series_name: &str,
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        let (payload, kid) = split_envelope(envelope)?;
        let root = self
            .key_for(kid)
            .ok_or_else(|| CryptoError::UnknownKeyId(kid.to_string()))?;

        let packed = BASE64
            .decode(payload)
            .map_err(|e| CryptoError::Envelope(e.to_string()))?;
        if packed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::Envelope("payload too short".to_string()));
        }
        let (nonce_bytes, ct) = packed.split_at(NONCE_SIZE);

        let content_key = self.content_key(root, series_name);
        let key = Key::<Aes256Gcm>::from_slice(content_key.as_ref());
        let cipher = Aes256Gcm::new(key);
        let nonce = Nonce::from_slice(nonce_bytes);

        let pt = cipher
            .decrypt(
                nonce,
                Payload {
                    msg: ct,
                    aad: series_name.as_bytes(),
                },
            )
            .map_err(|_| {
                tracing::error!(series = series_name, key_id = kid, "content integrity failure");
                CryptoError::Integrity
            })?;

        Ok(Zeroizing::new(pt))
    }
}

fn validate_key_id(kid: &str) -> Result<(), CryptoError> {
    let ok = !kid.is_empty()
        && kid.len() <= MAX_KEY_ID_LEN
        && kid.chars().all(|c| c.is_ascii_graphic() && c != '.');
    if ok {
        Ok(())
    } else {
        Err(CryptoError::InvalidKeyId(kid.to_string()))
    }
}

fn split_envelope(envelope: &str) -> Result<(&str, &str), CryptoError> {
    match envelope.rsplit_once('.') {
        Some((payload, kid)) if !payload.is_empty() && !kid.is_empty() => Ok((payload, kid)),
        _ => Err(CryptoError::Envelope("missing key id separator".to_string())),
    }
}

/// Plaintext length of an envelope, computed from the known nonce and tag
/// overhead without touching any key.
pub fn decoded_len(envelope: &str) -> Result<usize, CryptoError> {
    let (payload, _) = split_envelope(envelope)?;
    let packed = BASE64
        .decode(payload)
        .map_err(|e| CryptoError::Envelope(e.to_string()))?;
    packed
        .len()
        .checked_sub(NONCE_SIZE + TAG_SIZE)
        .ok_or_else(|| CryptoError::Envelope("payload too short".to_string()))
}

/// Lowercase-hex SHA-256 of the stored envelope string. Stable per revision
/// and derivable without decryption.
pub fn checksum(envelope: &str) -> String {
    let digest = Sha256::digest(envelope.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        out.push_str(&format!("{b:02x}"));
    }
    out
}
