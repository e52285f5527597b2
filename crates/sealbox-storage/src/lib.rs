//! Storage abstraction for sealbox.
//!
//! Backend crates (e.g., sealbox-store-sqlite, sealbox-store-memory)
//! implement these traits so the core doesn't depend on any specific
//! database engine or schema details.

use thiserror::Error;

pub mod store;
pub mod types;

pub use store::{
    AclStore, ClientStore, ContentStore, CreateSecretParams, GroupStore, MembershipStore,
    SeriesStore, Store,
};
pub use types::*;

/// Uniform error type for all storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A referenced entity is absent.
    #[error("not found")]
    NotFound,
    /// Unique-key violation on a name or on `(series, version)`.
    #[error("conflict")]
    Conflict,
    /// Transport or constraint failure not covered above.
    #[error("backend error: {0}")]
    Backend(String),
}

#[cfg(feature = "test-support")]
pub use store::{
    MockAclStore, MockClientStore, MockContentStore, MockGroupStore, MockMembershipStore,
    MockSeriesStore,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    // Tiny compile-time smoke test for trait object usage.
    struct NoopSeriesStore;

    #[async_trait::async_trait]
    impl SeriesStore for NoopSeriesStore {
        async fn create_series(&self, _params: &CreateSeriesParams) -> Result<SeriesId, StoreError> {
            Ok(SeriesId(1))
        }

        async fn series_by_id(&self, _id: SeriesId) -> Result<Option<SecretSeries>, StoreError> {
            Ok(None)
        }

        async fn series_by_name(&self, _name: &str) -> Result<Option<SecretSeries>, StoreError> {
            Ok(None)
        }

        async fn list_series(&self) -> Result<Vec<SecretSeries>, StoreError> {
            Ok(vec![])
        }

        async fn delete_series_by_name(&self, _name: &str) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn noop_store_compiles_and_runs() {
        let store: &dyn SeriesStore = &NoopSeriesStore;
        assert!(store.series_by_name("nope").await.unwrap().is_none());

        let id = store
            .create_series(&CreateSeriesParams {
                name: "db-password".to_string(),
                description: String::new(),
                creator: "admin".to_string(),
                secret_type: None,
                generation_options: BTreeMap::new(),
                metadata: BTreeMap::new(),
            })
            .await
            .unwrap();
        assert_eq!(id, SeriesId(1));
    }

    #[test]
    fn store_error_display() {
        assert_eq!(StoreError::NotFound.to_string(), "not found");
        assert_eq!(StoreError::Conflict.to_string(), "conflict");
        assert!(StoreError::Backend("boom".into()).to_string().contains("boom"));
    }
}
