//! The secret abstraction over the stores and the cryptographer.
//!
//! Creation goes through a builder so the recognized options stay in one
//! place; the series-upsert + content-insert pair is handed to the store as
//! one atomic operation. Operations that mutate or expose ciphertext are
//! gated on the automation variant of the calling principal.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;
use zeroize::Zeroizing;

use crate::error::CoreError;
use crate::principal::AuthPrincipal;
use crate::secret::{Secret, VERSION_DELIMITER};
use crate::version::VersionStamp;
use sealbox_crypto::ContentCryptographer;
use sealbox_storage::{ContentStore, CreateSecretParams, SeriesId, SeriesStore, Store};

pub struct SecretController {
    store: Arc<dyn Store>,
    crypto: Arc<ContentCryptographer>,
}

impl SecretController {
    pub fn new(store: Arc<dyn Store>, crypto: Arc<ContentCryptographer>) -> Self {
        Self { store, crypto }
    }

    pub fn cryptographer(&self) -> &ContentCryptographer {
        &self.crypto
    }

    /// Start building a new secret revision.
    pub fn build(
        &self,
        name: impl Into<String>,
        plaintext: Vec<u8>,
        creator: impl Into<String>,
    ) -> SecretBuilder {
        SecretBuilder {
            store: Arc::clone(&self.store),
            crypto: Arc::clone(&self.crypto),
            name: name.into(),
            plaintext: Zeroizing::new(plaintext),
            creator: creator.into(),
            description: String::new(),
            version: None,
            auto_version: false,
            secret_type: None,
            generation_options: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Exact `(name, version)` lookup. The empty version selects the
    /// unversioned revision, never "any version"; callers wanting an
    /// arbitrary revision enumerate with [`list_versions`].
    ///
    /// [`list_versions`]: SecretController::list_versions
    pub async fn secret_by_name_and_version(
        &self,
        principal: &AuthPrincipal,
        name: &str,
        version: &str,
    ) -> Result<Option<Secret>, CoreError> {
        principal.require_automation()?;
        let joined = self.store.secret_by_name_and_version(name, version).await?;
        Ok(joined.map(|(series, content)| Secret::new(series, content)))
    }

    pub async fn secret_by_id_and_version(
        &self,
        principal: &AuthPrincipal,
        id: SeriesId,
        version: &str,
    ) -> Result<Option<Secret>, CoreError> {
        principal.require_automation()?;
        let joined = self.store.secret_by_id_and_version(id, version).await?;
        Ok(joined.map(|(series, content)| Secret::new(series, content)))
    }

    /// Every revision of a series, one `Secret` per content row.
    pub async fn secrets_by_id(
        &self,
        principal: &AuthPrincipal,
        id: SeriesId,
    ) -> Result<Vec<Secret>, CoreError> {
        principal.require_automation()?;
        let joined = self.store.secrets_by_id(id).await?;
        Ok(joined
            .into_iter()
            .map(|(series, content)| Secret::new(series, content))
            .collect())
    }

    /// Cartesian of series × their contents, ordered by series id then
    /// content id.
    pub async fn list_all(&self, principal: &AuthPrincipal) -> Result<Vec<Secret>, CoreError> {
        principal.require_automation()?;
        let joined = self.store.list_secrets().await?;
        Ok(joined
            .into_iter()
            .map(|(series, content)| Secret::new(series, content))
            .collect())
    }

    /// Each distinct version of the named series, the empty string included.
    pub async fn list_versions(&self, name: &str) -> Result<Vec<String>, CoreError> {
        let series = self
            .store
            .series_by_name(name)
            .await?
            .ok_or(CoreError::NotFound)?;
        Ok(self.store.versions_of_series(series.id).await?)
    }

    /// Delete a series and all its revisions. Succeeds when absent.
    pub async fn delete_series(
        &self,
        principal: &AuthPrincipal,
        name: &str,
    ) -> Result<(), CoreError> {
        principal.require_automation()?;
        self.store.delete_series_by_name(name).await?;
        info!(name, actor = principal.actor_name(), "deleted secret series");
        Ok(())
    }

    /// Delete one revision. The series row remains, keeping the name
    /// reserved, even when this removes the last revision.
    pub async fn delete_version(
        &self,
        principal: &AuthPrincipal,
        name: &str,
        version: &str,
    ) -> Result<(), CoreError> {
        principal.require_automation()?;
        let series = self
            .store
            .series_by_name(name)
            .await?
            .ok_or(CoreError::NotFound)?;
        self.store
            .delete_content_by_series_and_version(series.id, version)
            .await?;
        info!(
            name,
            version,
            actor = principal.actor_name(),
            "deleted secret version"
        );
        Ok(())
    }
}

/// Configuration for one create. The recognized options are exhaustive:
/// description, version (explicit or generated), metadata, type, and
/// generation options.
pub struct SecretBuilder {
    store: Arc<dyn Store>,
    crypto: Arc<ContentCryptographer>,
    name: String,
    plaintext: Zeroizing<Vec<u8>>,
    creator: String,
    description: String,
    version: Option<String>,
    auto_version: bool,
    secret_type: Option<String>,
    generation_options: BTreeMap<String, String>,
    metadata: BTreeMap<String, String>,
}

impl SecretBuilder {
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Request versioning without choosing the token; a fresh stamp is
    /// generated at create time.
    pub fn with_auto_version(mut self) -> Self {
        self.auto_version = true;
        self
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_type(mut self, secret_type: impl Into<String>) -> Self {
        self.secret_type = Some(secret_type.into());
        self
    }

    pub fn with_generation_options(mut self, options: BTreeMap<String, String>) -> Self {
        self.generation_options = options;
        self
    }

    /// Validate, encrypt, and insert atomically. Fails with `Conflict` if
    /// the `(series, version)` pair exists; a series freshly created by
    /// this call is rolled back when the content insert fails.
    pub async fn create(self, principal: &AuthPrincipal) -> Result<Secret, CoreError> {
        principal.require_automation()?;
        validate_name(&self.name)?;
        validate_metadata(&self.metadata)?;

        let version = match self.version {
            Some(version) => {
                validate_version(&version)?;
                version
            }
            None if self.auto_version => VersionStamp::now().to_hex(),
            None => String::new(),
        };

        let encrypted_content = self.crypto.encrypt(&self.plaintext, &self.name)?;

        let (series, content) = self
            .store
            .create_secret(&CreateSecretParams {
                name: self.name,
                encrypted_content,
                version,
                creator: self.creator,
                description: self.description,
                secret_type: self.secret_type,
                generation_options: self.generation_options,
                metadata: self.metadata,
            })
            .await?;

        info!(
            name = %series.name,
            version = %content.version,
            actor = principal.actor_name(),
            "created secret revision"
        );
        Ok(Secret::new(series, content))
    }
}

fn validate_name(name: &str) -> Result<(), CoreError> {
    if name.is_empty() {
        return Err(CoreError::InvalidInput("name must not be empty".to_string()));
    }
    if name.contains(VERSION_DELIMITER) {
        return Err(CoreError::InvalidInput(format!(
            "name must not contain '{VERSION_DELIMITER}'"
        )));
    }
    Ok(())
}

fn validate_version(version: &str) -> Result<(), CoreError> {
    if version.contains(VERSION_DELIMITER) {
        return Err(CoreError::InvalidInput(format!(
            "version must not contain '{VERSION_DELIMITER}'"
        )));
    }
    Ok(())
}

fn validate_metadata(metadata: &BTreeMap<String, String>) -> Result<(), CoreError> {
    for key in metadata.keys() {
        if key.is_empty() || key.chars().any(char::is_control) {
            return Err(CoreError::InvalidInput(format!(
                "metadata key {key:?} must be printable and non-empty"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_validation() {
        assert!(validate_name("DB_Pass").is_ok());
        assert!(matches!(validate_name(""), Err(CoreError::InvalidInput(_))));
        assert!(matches!(
            validate_name("bad..name"),
            Err(CoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn version_validation() {
        assert!(validate_version("").is_ok());
        assert!(validate_version("0be68f903f8b7d86").is_ok());
        assert!(matches!(
            validate_version("a..b"),
            Err(CoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn metadata_key_validation() {
        let ok = BTreeMap::from([("owner".to_string(), "nobody".to_string())]);
        assert!(validate_metadata(&ok).is_ok());

        let empty_key = BTreeMap::from([(String::new(), "x".to_string())]);
        assert!(matches!(
            validate_metadata(&empty_key),
            Err(CoreError::InvalidInput(_))
        ));

        let control_key = BTreeMap::from([("a\nb".to_string(), "x".to_string())]);
        assert!(matches!(
            validate_metadata(&control_key),
            Err(CoreError::InvalidInput(_))
        ));
    }
}
