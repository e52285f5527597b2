//! The secret read-model: one series joined with one content revision.
//!
//! A `Secret` carries the stored envelope, not plaintext; decryption happens
//! only when an accessor asks for it, one AEAD call per access, and the
//! result is zeroized on drop.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use sealbox_crypto::{checksum, decoded_len, ContentCryptographer, CryptoError};
use sealbox_storage::{SecretContent, SecretSeries, SeriesId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use zeroize::Zeroizing;

/// Delimiter between name and version in user-visible composite names.
pub const VERSION_DELIMITER: &str = "..";

/// One revision of a named secret.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Secret {
    pub series: SecretSeries,
    pub content: SecretContent,
}

impl Secret {
    pub fn new(series: SecretSeries, content: SecretContent) -> Self {
        Self { series, content }
    }

    pub fn id(&self) -> SeriesId {
        self.series.id
    }

    pub fn name(&self) -> &str {
        &self.series.name
    }

    pub fn version(&self) -> &str {
        &self.content.version
    }

    /// `name..version` for versioned revisions, the bare name otherwise.
    pub fn display_name(&self) -> String {
        display_name(&self.series.name, &self.content.version)
    }

    /// Decrypt the envelope under the owning series' name. Invokes the
    /// cryptographer once per call; nothing is cached.
    pub fn plaintext(
        &self,
        crypto: &ContentCryptographer,
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        crypto.decrypt(&self.content.encrypted_content, &self.series.name)
    }

    /// Plaintext length derived from the envelope overhead, no key needed.
    pub fn length(&self) -> Result<usize, CryptoError> {
        decoded_len(&self.content.encrypted_content)
    }

    pub fn checksum(&self) -> String {
        checksum(&self.content.encrypted_content)
    }

    /// Fully-resolved projection for delivery surfaces. The plaintext copy
    /// inside lives only as long as the response being encoded.
    pub fn resolve(&self, crypto: &ContentCryptographer) -> Result<ResolvedSecret, CryptoError> {
        let plaintext = self.plaintext(crypto)?;
        Ok(ResolvedSecret {
            id: self.series.id.0,
            name: self.display_name(),
            description: self.series.description.clone(),
            version: self.content.version.clone(),
            checksum: self.checksum(),
            secret: BASE64.encode(plaintext.as_slice()),
            secret_length: plaintext.len() as u64,
            created_at: self.content.created_at,
            created_by: self.content.created_by.clone(),
            updated_at: self.content.updated_at,
            updated_by: self.content.updated_by.clone(),
            metadata: self.series.metadata.clone(),
            secret_type: self.series.secret_type.clone(),
            generation_options: self.series.generation_options.clone(),
        })
    }
}

/// JSON projection carrying base64 plaintext, for adapters that deliver
/// resolved secrets.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedSecret {
    pub id: i64,
    /// Versioned display name (`name..version`) when a version is set.
    pub name: String,
    pub description: String,
    pub version: String,
    pub checksum: String,
    /// Base64 of the decrypted content.
    pub secret: String,
    pub secret_length: u64,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
    pub metadata: BTreeMap<String, String>,
    #[serde(rename = "type")]
    pub secret_type: Option<String>,
    pub generation_options: BTreeMap<String, String>,
}

/// Compose the user-visible name of a revision.
pub fn display_name(name: &str, version: &str) -> String {
    if version.is_empty() {
        name.to_string()
    } else {
        format!("{name}{VERSION_DELIMITER}{version}")
    }
}

/// Split a display name back into `(name, version)` on the last `..`.
/// A composite without the delimiter is an unversioned name.
pub fn parse_display_name(display: &str) -> (String, String) {
    match display.rsplit_once(VERSION_DELIMITER) {
        Some((name, version)) => (name.to_string(), version.to_string()),
        None => (display.to_string(), String::new()),
    }
}
