//! The store traits that backends implement.
//!
//! Each trait covers one slice of the persistent model; `Store` bundles them
//! and adds the composite operations that must execute inside a single
//! backend transaction. The core depends on these traits only, so the
//! relational backend and the in-memory backend are interchangeable.

use crate::types::*;
use crate::StoreError;

/// Parameters for the atomic series-upsert + content-insert composite.
#[derive(Clone, Debug, Default)]
pub struct CreateSecretParams {
    pub name: String,
    pub encrypted_content: String,
    /// Empty string denotes the unversioned revision.
    pub version: String,
    pub creator: String,
    pub description: String,
    pub secret_type: Option<String>,
    pub generation_options: std::collections::BTreeMap<String, String>,
    pub metadata: std::collections::BTreeMap<String, String>,
}

// ───────────────────────────────── Series ─────────────────────────────────

#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait::async_trait]
pub trait SeriesStore: Send + Sync {
    /// Create a new series. Fails with `Conflict` if the name exists.
    async fn create_series(&self, params: &CreateSeriesParams) -> Result<SeriesId, StoreError>;

    async fn series_by_id(&self, id: SeriesId) -> Result<Option<SecretSeries>, StoreError>;

    async fn series_by_name(&self, name: &str) -> Result<Option<SecretSeries>, StoreError>;

    /// All series, ordered by id.
    async fn list_series(&self) -> Result<Vec<SecretSeries>, StoreError>;

    /// Delete a series and, atomically, every content row and access grant
    /// that references it. Succeeds when the name is absent.
    async fn delete_series_by_name(&self, name: &str) -> Result<(), StoreError>;
}

// ───────────────────────────────── Contents ───────────────────────────────

#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait::async_trait]
pub trait ContentStore: Send + Sync {
    /// Insert a content revision. Fails with `Conflict` if
    /// `(series_id, version)` already exists, the empty version included.
    async fn create_content(&self, params: &CreateContentParams) -> Result<ContentId, StoreError>;

    async fn content_by_id(&self, id: ContentId) -> Result<Option<SecretContent>, StoreError>;

    /// All revisions of a series, ordered by id ascending.
    async fn contents_by_series(&self, series: SeriesId)
        -> Result<Vec<SecretContent>, StoreError>;

    /// Each distinct version of a series, the empty string included.
    async fn versions_of_series(&self, series: SeriesId) -> Result<Vec<String>, StoreError>;

    async fn delete_contents_by_series(&self, series: SeriesId) -> Result<(), StoreError>;

    /// Delete one revision. The series row is left in place even when this
    /// removes the last revision.
    async fn delete_content_by_series_and_version(
        &self,
        series: SeriesId,
        version: &str,
    ) -> Result<(), StoreError>;
}

// ───────────────────────────────── Clients ────────────────────────────────

#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait::async_trait]
pub trait ClientStore: Send + Sync {
    /// Create a client. Fails with `Conflict` if the name exists.
    async fn create_client(&self, params: &CreateClientParams) -> Result<ClientId, StoreError>;

    async fn client_by_id(&self, id: ClientId) -> Result<Option<Client>, StoreError>;

    async fn client_by_name(&self, name: &str) -> Result<Option<Client>, StoreError>;

    /// All clients, ordered by id.
    async fn list_clients(&self) -> Result<Vec<Client>, StoreError>;

    /// Delete a client and its membership edges atomically.
    async fn delete_client(&self, id: ClientId) -> Result<(), StoreError>;
}

// ───────────────────────────────── Groups ─────────────────────────────────

#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait::async_trait]
pub trait GroupStore: Send + Sync {
    /// Create a group. Fails with `Conflict` if the name exists.
    async fn create_group(&self, params: &CreateGroupParams) -> Result<GroupId, StoreError>;

    async fn group_by_id(&self, id: GroupId) -> Result<Option<Group>, StoreError>;

    async fn group_by_name(&self, name: &str) -> Result<Option<Group>, StoreError>;

    /// All groups, ordered by id.
    async fn list_groups(&self) -> Result<Vec<Group>, StoreError>;

    /// Delete a group and its incident edges atomically.
    async fn delete_group(&self, id: GroupId) -> Result<(), StoreError>;
}

// ─────────────────────────────── Memberships ──────────────────────────────

/// Client↔group and series↔group edges. All mutations are idempotent and
/// require both endpoints to exist.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait::async_trait]
pub trait MembershipStore: Send + Sync {
    async fn enroll(&self, client: ClientId, group: GroupId) -> Result<(), StoreError>;

    async fn evict(&self, client: ClientId, group: GroupId) -> Result<(), StoreError>;

    async fn allow(&self, series: SeriesId, group: GroupId) -> Result<(), StoreError>;

    async fn disallow(&self, series: SeriesId, group: GroupId) -> Result<(), StoreError>;

    async fn clients_of_group(&self, group: GroupId) -> Result<Vec<Client>, StoreError>;

    async fn groups_of_client(&self, client: ClientId) -> Result<Vec<Group>, StoreError>;

    async fn series_of_group(&self, group: GroupId) -> Result<Vec<SecretSeries>, StoreError>;

    async fn groups_of_series(&self, series: SeriesId) -> Result<Vec<Group>, StoreError>;
}

// ─────────────────────────────── ACL queries ──────────────────────────────

/// Read-side authorization queries. Each call is a single snapshot read so
/// the series/content join never observes a torn state.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait::async_trait]
pub trait AclStore: Send + Sync {
    /// True iff some group contains both the client and the series.
    async fn may_access(&self, client: ClientId, series: SeriesId) -> Result<bool, StoreError>;

    /// Every series the client may access, each joined with its latest
    /// revision (highest content id); one row per series.
    async fn accessible_secrets(
        &self,
        client: ClientId,
    ) -> Result<Vec<(SecretSeries, SecretContent)>, StoreError>;

    async fn groups_for_series(&self, series: SeriesId) -> Result<Vec<Group>, StoreError>;

    /// Distinct clients reachable through any group linked to the series.
    async fn clients_for_series(&self, series: SeriesId) -> Result<Vec<Client>, StoreError>;

    /// The named secret joined with its latest revision, only if the client
    /// may access it. Deny and absence are both `None`.
    async fn client_secret_by_name(
        &self,
        client: ClientId,
        name: &str,
    ) -> Result<Option<(SecretSeries, SecretContent)>, StoreError>;
}

// ───────────────────────────────── Umbrella ───────────────────────────────

/// Everything a backend provides, plus the composite operations that span
/// series and content rows in one transaction.
#[async_trait::async_trait]
pub trait Store:
    SeriesStore + ContentStore + ClientStore + GroupStore + MembershipStore + AclStore
{
    /// Series upsert + content insert in one transaction. Fails with
    /// `Conflict` when `(series, version)` exists; a series created by this
    /// call is rolled back if the content insert fails.
    async fn create_secret(
        &self,
        params: &CreateSecretParams,
    ) -> Result<(SecretSeries, SecretContent), StoreError>;

    /// Exact `(name, version)` lookup; the empty version selects the
    /// unversioned revision, never "any version".
    async fn secret_by_name_and_version(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Option<(SecretSeries, SecretContent)>, StoreError>;

    async fn secret_by_id_and_version(
        &self,
        id: SeriesId,
        version: &str,
    ) -> Result<Option<(SecretSeries, SecretContent)>, StoreError>;

    /// Every revision of a series, ordered by content id.
    async fn secrets_by_id(
        &self,
        id: SeriesId,
    ) -> Result<Vec<(SecretSeries, SecretContent)>, StoreError>;

    /// Cartesian of series × their contents, ordered by series id then
    /// content id.
    async fn list_secrets(&self) -> Result<Vec<(SecretSeries, SecretContent)>, StoreError>;
}
