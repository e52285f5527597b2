//! Authorization over the client–group–series bipartite graph.
//!
//! A client may access a series iff some group contains both. Every query
//! here is answered from a single store snapshot, and a denied lookup is
//! indistinguishable from an absent one.

use std::sync::Arc;

use crate::error::CoreError;
use crate::sanitize::SanitizedSecret;
use crate::secret::Secret;
use sealbox_storage::{AclStore, Client, ClientId, Group, SeriesId, Store};

pub struct AclEngine {
    store: Arc<dyn Store>,
}

impl AclEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// mayAccess(client, series) ⇔ ∃ g : ClientInGroup(client, g) ∧
    /// SeriesInGroup(series, g).
    pub async fn may_access(
        &self,
        client: ClientId,
        series: SeriesId,
    ) -> Result<bool, CoreError> {
        Ok(self.store.may_access(client, series).await?)
    }

    /// Sanitized latest revision of every series the client may access; a
    /// series appears once regardless of its version count.
    pub async fn secrets_for(&self, client: ClientId) -> Result<Vec<SanitizedSecret>, CoreError> {
        let joined = self.store.accessible_secrets(client).await?;
        joined
            .into_iter()
            .map(|(series, content)| {
                SanitizedSecret::from_secret(&Secret::new(series, content)).map_err(CoreError::from)
            })
            .collect()
    }

    /// Groups linked to the secret's series.
    pub async fn groups_for(&self, secret: &Secret) -> Result<Vec<Group>, CoreError> {
        Ok(self.store.groups_for_series(secret.id()).await?)
    }

    /// Distinct clients reachable via any group linked to the secret's
    /// series.
    pub async fn clients_for(&self, secret: &Secret) -> Result<Vec<Client>, CoreError> {
        Ok(self.store.clients_for_series(secret.id()).await?)
    }

    /// The named secret at its latest revision, only when the predicate
    /// holds. Deny and absence both return `None` so names cannot be
    /// enumerated.
    pub async fn secret_for_client(
        &self,
        client: ClientId,
        name: &str,
    ) -> Result<Option<Secret>, CoreError> {
        let joined = self.store.client_secret_by_name(client, name).await?;
        Ok(joined.map(|(series, content)| Secret::new(series, content)))
    }
}
