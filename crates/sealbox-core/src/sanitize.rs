//! Redacted secret projections for listing surfaces.
//!
//! A sanitized secret carries no ciphertext and no plaintext; the content
//! length is recovered from the envelope's fixed nonce/tag overhead without
//! touching a key.

use crate::secret::{display_name, Secret};
use chrono::{DateTime, Utc};
use sealbox_crypto::CryptoError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A projection of a secret that is safe to put in any listing response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitizedSecret {
    /// Series id; pair with `version` to resolve the revision.
    pub id: i64,
    pub name: String,
    pub description: String,
    pub version: String,
    pub checksum: String,
    /// Decoded content length in bytes.
    pub length: u64,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
    pub metadata: BTreeMap<String, String>,
    #[serde(rename = "type")]
    pub secret_type: Option<String>,
    pub generation_options: BTreeMap<String, String>,
}

impl SanitizedSecret {
    pub fn from_secret(secret: &Secret) -> Result<Self, CryptoError> {
        Ok(Self {
            id: secret.series.id.0,
            name: secret.series.name.clone(),
            description: secret.series.description.clone(),
            version: secret.content.version.clone(),
            checksum: secret.checksum(),
            length: secret.length()? as u64,
            created_at: secret.content.created_at,
            created_by: secret.content.created_by.clone(),
            updated_at: secret.content.updated_at,
            updated_by: secret.content.updated_by.clone(),
            metadata: secret.series.metadata.clone(),
            secret_type: secret.series.secret_type.clone(),
            generation_options: secret.series.generation_options.clone(),
        })
    }

    pub fn display_name(&self) -> String {
        display_name(&self.name, &self.version)
    }
}

/// Convenience alias matching the verb used at call sites.
pub fn sanitize(secret: &Secret) -> Result<SanitizedSecret, CryptoError> {
    SanitizedSecret::from_secret(secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealbox_crypto::{ContentCryptographer, RootKey};
    use sealbox_storage::{ContentId, SecretContent, SecretSeries, SeriesId};

    fn secret() -> Secret {
        let crypto = ContentCryptographer::new("kid1", RootKey::new([5u8; 32])).unwrap();
        let envelope = crypto.encrypt(b"hunter2", "DB_Pass").unwrap();
        let now = Utc::now();
        Secret::new(
            SecretSeries {
                id: SeriesId(7),
                name: "DB_Pass".to_string(),
                description: String::new(),
                created_at: now,
                created_by: "admin".to_string(),
                updated_at: now,
                updated_by: "admin".to_string(),
                secret_type: None,
                generation_options: BTreeMap::new(),
                metadata: BTreeMap::new(),
            },
            SecretContent {
                id: ContentId(70),
                series_id: SeriesId(7),
                encrypted_content: envelope,
                version: "0be68f903f8b7d86".to_string(),
                created_at: now,
                created_by: "admin".to_string(),
                updated_at: now,
                updated_by: "admin".to_string(),
            },
        )
    }

    #[test]
    fn sanitized_has_no_cryptographic_material() {
        let secret = secret();
        let sanitized = sanitize(&secret).unwrap();
        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains(&secret.content.encrypted_content));
        assert!(!json.contains("hunter2"));
        assert_eq!(sanitized.length, 7);
        assert_eq!(sanitized.checksum, secret.checksum());
    }

    #[test]
    fn display_name_is_versioned() {
        let sanitized = sanitize(&secret()).unwrap();
        assert_eq!(sanitized.display_name(), "DB_Pass..0be68f903f8b7d86");
    }

    #[test]
    fn json_field_names_are_camel_case() {
        let value = serde_json::to_value(sanitize(&secret()).unwrap()).unwrap();
        for field in ["createdAt", "createdBy", "updatedAt", "updatedBy", "generationOptions"] {
            assert!(value.get(field).is_some(), "missing field {field}");
        }
    }
}
