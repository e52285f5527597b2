//! In-memory implementation of the sealbox store traits.
//!
//! Suitable for tests and single-process embedding. Semantics match the
//! relational backend: name and `(series, version)` uniqueness map to
//! `Conflict`, endpoint deletion removes incident edges, ids are assigned
//! in insertion order.

use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use sealbox_storage::{
    AclStore, Client, ClientId, ClientStore, ContentId, ContentStore, CreateClientParams,
    CreateContentParams, CreateGroupParams, CreateSecretParams, CreateSeriesParams, Group, GroupId,
    GroupStore, MembershipStore, SecretContent, SecretSeries, SeriesId, SeriesStore, Store,
    StoreError,
};

#[derive(Default)]
struct Inner {
    next_id: i64,
    series: BTreeMap<i64, SecretSeries>,
    contents: BTreeMap<i64, SecretContent>,
    clients: BTreeMap<i64, Client>,
    groups: BTreeMap<i64, Group>,
    /// (client id, group id)
    memberships: BTreeSet<(i64, i64)>,
    /// (group id, series id)
    grants: BTreeSet<(i64, i64)>,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn series_by_name(&self, name: &str) -> Option<&SecretSeries> {
        self.series.values().find(|s| s.name == name)
    }

    fn latest_content(&self, series: SeriesId) -> Option<&SecretContent> {
        self.contents
            .values()
            .filter(|c| c.series_id == series)
            .max_by_key(|c| c.id)
    }

    fn accessible_series_ids(&self, client: ClientId) -> BTreeSet<i64> {
        self.memberships
            .iter()
            .filter(|(c, _)| *c == client.0)
            .flat_map(|(_, g)| {
                self.grants
                    .iter()
                    .filter(move |(gg, _)| gg == g)
                    .map(|(_, s)| *s)
            })
            .collect()
    }

    fn insert_series(&mut self, params: &CreateSeriesParams) -> Result<SeriesId, StoreError> {
        if self.series_by_name(&params.name).is_some() {
            return Err(StoreError::Conflict);
        }
        let id = self.next_id();
        let now = Utc::now();
        self.series.insert(
            id,
            SecretSeries {
                id: SeriesId(id),
                name: params.name.clone(),
                description: params.description.clone(),
                created_at: now,
                created_by: params.creator.clone(),
                updated_at: now,
                updated_by: params.creator.clone(),
                secret_type: params.secret_type.clone(),
                generation_options: params.generation_options.clone(),
                metadata: params.metadata.clone(),
            },
        );
        Ok(SeriesId(id))
    }

    fn insert_content(&mut self, params: &CreateContentParams) -> Result<ContentId, StoreError> {
        if !self.series.contains_key(&params.series_id.0) {
            return Err(StoreError::NotFound);
        }
        let duplicate = self
            .contents
            .values()
            .any(|c| c.series_id == params.series_id && c.version == params.version);
        if duplicate {
            return Err(StoreError::Conflict);
        }
        let id = self.next_id();
        let now = Utc::now();
        self.contents.insert(
            id,
            SecretContent {
                id: ContentId(id),
                series_id: params.series_id,
                encrypted_content: params.encrypted_content.clone(),
                version: params.version.clone(),
                created_at: now,
                created_by: params.creator.clone(),
                updated_at: now,
                updated_by: params.creator.clone(),
            },
        );
        Ok(ContentId(id))
    }

    fn remove_series(&mut self, id: SeriesId) {
        self.series.remove(&id.0);
        self.contents.retain(|_, c| c.series_id != id);
        self.grants.retain(|(_, s)| *s != id.0);
    }
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

// ───────────────────────────────── Series ─────────────────────────────────

#[async_trait::async_trait]
impl SeriesStore for MemoryStore {
    async fn create_series(&self, params: &CreateSeriesParams) -> Result<SeriesId, StoreError> {
        self.lock().insert_series(params)
    }

    async fn series_by_id(&self, id: SeriesId) -> Result<Option<SecretSeries>, StoreError> {
        Ok(self.lock().series.get(&id.0).cloned())
    }

    async fn series_by_name(&self, name: &str) -> Result<Option<SecretSeries>, StoreError> {
        Ok(self.lock().series_by_name(name).cloned())
    }

    async fn list_series(&self) -> Result<Vec<SecretSeries>, StoreError> {
        Ok(self.lock().series.values().cloned().collect())
    }

    async fn delete_series_by_name(&self, name: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(id) = inner.series_by_name(name).map(|s| s.id) {
            inner.remove_series(id);
        }
        Ok(())
    }
}

// ───────────────────────────────── Contents ───────────────────────────────

#[async_trait::async_trait]
impl ContentStore for MemoryStore {
    async fn create_content(&self, params: &CreateContentParams) -> Result<ContentId, StoreError> {
        self.lock().insert_content(params)
    }

    async fn content_by_id(&self, id: ContentId) -> Result<Option<SecretContent>, StoreError> {
        Ok(self.lock().contents.get(&id.0).cloned())
    }

    async fn contents_by_series(
        &self,
        series: SeriesId,
    ) -> Result<Vec<SecretContent>, StoreError> {
        Ok(self
            .lock()
            .contents
            .values()
            .filter(|c| c.series_id == series)
            .cloned()
            .collect())
    }

    async fn versions_of_series(&self, series: SeriesId) -> Result<Vec<String>, StoreError> {
        Ok(self
            .lock()
            .contents
            .values()
            .filter(|c| c.series_id == series)
            .map(|c| c.version.clone())
            .collect())
    }

    async fn delete_contents_by_series(&self, series: SeriesId) -> Result<(), StoreError> {
        self.lock().contents.retain(|_, c| c.series_id != series);
        Ok(())
    }

    async fn delete_content_by_series_and_version(
        &self,
        series: SeriesId,
        version: &str,
    ) -> Result<(), StoreError> {
        self.lock()
            .contents
            .retain(|_, c| !(c.series_id == series && c.version == version));
        Ok(())
    }
}

// ───────────────────────────────── Clients ────────────────────────────────

#[async_trait::async_trait]
impl ClientStore for MemoryStore {
    async fn create_client(&self, params: &CreateClientParams) -> Result<ClientId, StoreError> {
        let mut inner = self.lock();
        if inner.clients.values().any(|c| c.name == params.name) {
            return Err(StoreError::Conflict);
        }
        let id = inner.next_id();
        let now = Utc::now();
        inner.clients.insert(
            id,
            Client {
                id: ClientId(id),
                name: params.name.clone(),
                description: params.description.clone(),
                created_at: now,
                created_by: params.creator.clone(),
                updated_at: now,
                updated_by: params.creator.clone(),
                automation: params.automation,
            },
        );
        Ok(ClientId(id))
    }

    async fn client_by_id(&self, id: ClientId) -> Result<Option<Client>, StoreError> {
        Ok(self.lock().clients.get(&id.0).cloned())
    }

    async fn client_by_name(&self, name: &str) -> Result<Option<Client>, StoreError> {
        Ok(self
            .lock()
            .clients
            .values()
            .find(|c| c.name == name)
            .cloned())
    }

    async fn list_clients(&self) -> Result<Vec<Client>, StoreError> {
        Ok(self.lock().clients.values().cloned().collect())
    }

    async fn delete_client(&self, id: ClientId) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.clients.remove(&id.0);
        inner.memberships.retain(|(c, _)| *c != id.0);
        Ok(())
    }
}

// ───────────────────────────────── Groups ─────────────────────────────────

#[async_trait::async_trait]
impl GroupStore for MemoryStore {
    async fn create_group(&self, params: &CreateGroupParams) -> Result<GroupId, StoreError> {
        let mut inner = self.lock();
        if inner.groups.values().any(|g| g.name == params.name) {
            return Err(StoreError::Conflict);
        }
        let id = inner.next_id();
        let now = Utc::now();
        inner.groups.insert(
            id,
            Group {
                id: GroupId(id),
                name: params.name.clone(),
                description: params.description.clone(),
                created_at: now,
                created_by: params.creator.clone(),
                updated_at: now,
                updated_by: params.creator.clone(),
            },
        );
        Ok(GroupId(id))
    }

    async fn group_by_id(&self, id: GroupId) -> Result<Option<Group>, StoreError> {
        Ok(self.lock().groups.get(&id.0).cloned())
    }

    async fn group_by_name(&self, name: &str) -> Result<Option<Group>, StoreError> {
        Ok(self
            .lock()
            .groups
            .values()
            .find(|g| g.name == name)
            .cloned())
    }

    async fn list_groups(&self) -> Result<Vec<Group>, StoreError> {
        Ok(self.lock().groups.values().cloned().collect())
    }

    async fn delete_group(&self, id: GroupId) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.groups.remove(&id.0);
        inner.memberships.retain(|(_, g)| *g != id.0);
        inner.grants.retain(|(g, _)| *g != id.0);
        Ok(())
    }
}

// ─────────────────────────────── Memberships ──────────────────────────────

#[async_trait::async_trait]
impl MembershipStore for MemoryStore {
    async fn enroll(&self, client: ClientId, group: GroupId) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if !inner.clients.contains_key(&client.0) || !inner.groups.contains_key(&group.0) {
            return Err(StoreError::NotFound);
        }
        inner.memberships.insert((client.0, group.0));
        Ok(())
    }

    async fn evict(&self, client: ClientId, group: GroupId) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if !inner.clients.contains_key(&client.0) || !inner.groups.contains_key(&group.0) {
            return Err(StoreError::NotFound);
        }
        inner.memberships.remove(&(client.0, group.0));
        Ok(())
    }

    async fn allow(&self, series: SeriesId, group: GroupId) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if !inner.series.contains_key(&series.0) || !inner.groups.contains_key(&group.0) {
            return Err(StoreError::NotFound);
        }
        inner.grants.insert((group.0, series.0));
        Ok(())
    }

    async fn disallow(&self, series: SeriesId, group: GroupId) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if !inner.series.contains_key(&series.0) || !inner.groups.contains_key(&group.0) {
            return Err(StoreError::NotFound);
        }
        inner.grants.remove(&(group.0, series.0));
        Ok(())
    }

    async fn clients_of_group(&self, group: GroupId) -> Result<Vec<Client>, StoreError> {
        let inner = self.lock();
        if !inner.groups.contains_key(&group.0) {
            return Err(StoreError::NotFound);
        }
        Ok(inner
            .memberships
            .iter()
            .filter(|(_, g)| *g == group.0)
            .filter_map(|(c, _)| inner.clients.get(c).cloned())
            .collect())
    }

    async fn groups_of_client(&self, client: ClientId) -> Result<Vec<Group>, StoreError> {
        let inner = self.lock();
        if !inner.clients.contains_key(&client.0) {
            return Err(StoreError::NotFound);
        }
        Ok(inner
            .memberships
            .iter()
            .filter(|(c, _)| *c == client.0)
            .filter_map(|(_, g)| inner.groups.get(g).cloned())
            .collect())
    }

    async fn series_of_group(&self, group: GroupId) -> Result<Vec<SecretSeries>, StoreError> {
        let inner = self.lock();
        if !inner.groups.contains_key(&group.0) {
            return Err(StoreError::NotFound);
        }
        Ok(inner
            .grants
            .iter()
            .filter(|(g, _)| *g == group.0)
            .filter_map(|(_, s)| inner.series.get(s).cloned())
            .collect())
    }

    async fn groups_of_series(&self, series: SeriesId) -> Result<Vec<Group>, StoreError> {
        let inner = self.lock();
        if !inner.series.contains_key(&series.0) {
            return Err(StoreError::NotFound);
        }
        let mut group_ids: Vec<i64> = inner
            .grants
            .iter()
            .filter(|(_, s)| *s == series.0)
            .map(|(g, _)| *g)
            .collect();
        group_ids.sort_unstable();
        Ok(group_ids
            .into_iter()
            .filter_map(|g| inner.groups.get(&g).cloned())
            .collect())
    }
}

// ─────────────────────────────── ACL queries ──────────────────────────────

#[async_trait::async_trait]
impl AclStore for MemoryStore {
    async fn may_access(&self, client: ClientId, series: SeriesId) -> Result<bool, StoreError> {
        Ok(self.lock().accessible_series_ids(client).contains(&series.0))
    }

    async fn accessible_secrets(
        &self,
        client: ClientId,
    ) -> Result<Vec<(SecretSeries, SecretContent)>, StoreError> {
        let inner = self.lock();
        let mut out = Vec::new();
        for series_id in inner.accessible_series_ids(client) {
            let Some(series) = inner.series.get(&series_id) else {
                continue;
            };
            if let Some(content) = inner.latest_content(series.id) {
                out.push((series.clone(), content.clone()));
            }
        }
        Ok(out)
    }

    async fn groups_for_series(&self, series: SeriesId) -> Result<Vec<Group>, StoreError> {
        self.groups_of_series(series).await
    }

    async fn clients_for_series(&self, series: SeriesId) -> Result<Vec<Client>, StoreError> {
        let inner = self.lock();
        if !inner.series.contains_key(&series.0) {
            return Err(StoreError::NotFound);
        }
        let groups: BTreeSet<i64> = inner
            .grants
            .iter()
            .filter(|(_, s)| *s == series.0)
            .map(|(g, _)| *g)
            .collect();
        let client_ids: BTreeSet<i64> = inner
            .memberships
            .iter()
            .filter(|(_, g)| groups.contains(g))
            .map(|(c, _)| *c)
            .collect();
        Ok(client_ids
            .into_iter()
            .filter_map(|c| inner.clients.get(&c).cloned())
            .collect())
    }

    async fn client_secret_by_name(
        &self,
        client: ClientId,
        name: &str,
    ) -> Result<Option<(SecretSeries, SecretContent)>, StoreError> {
        let inner = self.lock();
        let Some(series) = inner.series_by_name(name) else {
            return Ok(None);
        };
        if !inner.accessible_series_ids(client).contains(&series.id.0) {
            return Ok(None);
        }
        Ok(inner
            .latest_content(series.id)
            .map(|content| (series.clone(), content.clone())))
    }
}

// ───────────────────────────────── Composite ──────────────────────────────

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn create_secret(
        &self,
        params: &CreateSecretParams,
    ) -> Result<(SecretSeries, SecretContent), StoreError> {
        let mut inner = self.lock();

        let (series_id, fresh) = match inner.series_by_name(&params.name) {
            Some(series) => (series.id, false),
            None => {
                let id = inner.insert_series(&CreateSeriesParams {
                    name: params.name.clone(),
                    description: params.description.clone(),
                    creator: params.creator.clone(),
                    secret_type: params.secret_type.clone(),
                    generation_options: params.generation_options.clone(),
                    metadata: params.metadata.clone(),
                })?;
                (id, true)
            }
        };

        let content_id = match inner.insert_content(&CreateContentParams {
            series_id,
            encrypted_content: params.encrypted_content.clone(),
            version: params.version.clone(),
            creator: params.creator.clone(),
        }) {
            Ok(id) => id,
            Err(e) => {
                if fresh {
                    inner.remove_series(series_id);
                }
                return Err(e);
            }
        };

        let series = inner
            .series
            .get(&series_id.0)
            .cloned()
            .ok_or_else(|| StoreError::Backend("series row vanished".to_string()))?;
        let content = inner
            .contents
            .get(&content_id.0)
            .cloned()
            .ok_or_else(|| StoreError::Backend("content row vanished".to_string()))?;
        Ok((series, content))
    }

    async fn secret_by_name_and_version(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Option<(SecretSeries, SecretContent)>, StoreError> {
        let inner = self.lock();
        let Some(series) = inner.series_by_name(name) else {
            return Ok(None);
        };
        Ok(inner
            .contents
            .values()
            .find(|c| c.series_id == series.id && c.version == version)
            .map(|c| (series.clone(), c.clone())))
    }

    async fn secret_by_id_and_version(
        &self,
        id: SeriesId,
        version: &str,
    ) -> Result<Option<(SecretSeries, SecretContent)>, StoreError> {
        let inner = self.lock();
        let Some(series) = inner.series.get(&id.0) else {
            return Ok(None);
        };
        Ok(inner
            .contents
            .values()
            .find(|c| c.series_id == series.id && c.version == version)
            .map(|c| (series.clone(), c.clone())))
    }

    async fn secrets_by_id(
        &self,
        id: SeriesId,
    ) -> Result<Vec<(SecretSeries, SecretContent)>, StoreError> {
        let inner = self.lock();
        let Some(series) = inner.series.get(&id.0) else {
            return Ok(vec![]);
        };
        Ok(inner
            .contents
            .values()
            .filter(|c| c.series_id == series.id)
            .map(|c| (series.clone(), c.clone()))
            .collect())
    }

    async fn list_secrets(&self) -> Result<Vec<(SecretSeries, SecretContent)>, StoreError> {
        let inner = self.lock();
        let mut out = Vec::new();
        for series in inner.series.values() {
            for content in inner.contents.values().filter(|c| c.series_id == series.id) {
                out.push((series.clone(), content.clone()));
            }
        }
        Ok(out)
    }
}
