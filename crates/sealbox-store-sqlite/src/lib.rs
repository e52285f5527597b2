//! SQLite implementation of the sealbox store traits.
//!
//! Uniqueness and referential integrity live in the schema: `secrets.name`
//! and `(secretId, version)` are UNIQUE, and content rows and membership
//! edges are dropped by `ON DELETE CASCADE` when their parent goes away.
//! Composite operations run inside a single transaction.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::str::FromStr;

use sealbox_storage::{
    AclStore, Client, ClientId, ClientStore, ContentId, ContentStore, CreateClientParams,
    CreateContentParams, CreateGroupParams, CreateSecretParams, CreateSeriesParams, Group, GroupId,
    GroupStore, MembershipStore, SecretContent, SecretSeries, SeriesId, SeriesStore, Store,
    StoreError,
};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

const SERIES_COLS: &str =
    "id, name, description, createdAt, createdBy, updatedAt, updatedBy, type, options, metadata";
const CONTENT_COLS: &str =
    "id, secretId, encrypted_content, version, createdAt, createdBy, updatedAt, updatedBy";
const CLIENT_COLS: &str =
    "id, name, description, createdAt, createdBy, updatedAt, updatedBy, automation";
const GROUP_COLS: &str = "id, name, description, createdAt, createdBy, updatedAt, updatedBy";

/// Aliased series + content column list for joined snapshot reads.
const JOINED_COLS: &str = "s.id AS s_id, s.name AS s_name, s.description AS s_description, \
     s.createdAt AS s_createdAt, s.createdBy AS s_createdBy, s.updatedAt AS s_updatedAt, \
     s.updatedBy AS s_updatedBy, s.type AS s_type, s.options AS s_options, \
     s.metadata AS s_metadata, \
     c.id AS c_id, c.secretId AS c_secretId, c.encrypted_content AS c_encrypted_content, \
     c.version AS c_version, c.createdAt AS c_createdAt, c.createdBy AS c_createdBy, \
     c.updatedAt AS c_updatedAt, c.updatedBy AS c_updatedBy";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn open(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(backend)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(backend)?;

        MIGRATOR.run(&pool).await.map_err(backend)?;

        Ok(Self { pool })
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        Self::open("sqlite::memory:").await
    }
}

fn backend<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn map_insert_err(e: sqlx::Error) -> StoreError {
    let s = e.to_string();
    if s.contains("UNIQUE") {
        StoreError::Conflict
    } else {
        StoreError::Backend(s)
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn timestamp(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Backend(format!("timestamp out of range: {ms}")))
}

fn json_map(raw: &str) -> Result<BTreeMap<String, String>, StoreError> {
    serde_json::from_str(raw).map_err(backend)
}

fn to_json(map: &BTreeMap<String, String>) -> Result<String, StoreError> {
    serde_json::to_string(map).map_err(backend)
}

fn series_from_row(row: &SqliteRow, prefix: &str) -> Result<SecretSeries, StoreError> {
    let col = |name: &str| format!("{prefix}{name}");
    Ok(SecretSeries {
        id: SeriesId(row.try_get(col("id").as_str()).map_err(backend)?),
        name: row.try_get(col("name").as_str()).map_err(backend)?,
        description: row.try_get(col("description").as_str()).map_err(backend)?,
        created_at: timestamp(row.try_get(col("createdAt").as_str()).map_err(backend)?)?,
        created_by: row.try_get(col("createdBy").as_str()).map_err(backend)?,
        updated_at: timestamp(row.try_get(col("updatedAt").as_str()).map_err(backend)?)?,
        updated_by: row.try_get(col("updatedBy").as_str()).map_err(backend)?,
        secret_type: row.try_get(col("type").as_str()).map_err(backend)?,
        generation_options: json_map(
            &row.try_get::<String, _>(col("options").as_str())
                .map_err(backend)?,
        )?,
        metadata: json_map(
            &row.try_get::<String, _>(col("metadata").as_str())
                .map_err(backend)?,
        )?,
    })
}

fn content_from_row(row: &SqliteRow, prefix: &str) -> Result<SecretContent, StoreError> {
    let col = |name: &str| format!("{prefix}{name}");
    Ok(SecretContent {
        id: ContentId(row.try_get(col("id").as_str()).map_err(backend)?),
        series_id: SeriesId(row.try_get(col("secretId").as_str()).map_err(backend)?),
        encrypted_content: row
            .try_get(col("encrypted_content").as_str())
            .map_err(backend)?,
        version: row.try_get(col("version").as_str()).map_err(backend)?,
        created_at: timestamp(row.try_get(col("createdAt").as_str()).map_err(backend)?)?,
        created_by: row.try_get(col("createdBy").as_str()).map_err(backend)?,
        updated_at: timestamp(row.try_get(col("updatedAt").as_str()).map_err(backend)?)?,
        updated_by: row.try_get(col("updatedBy").as_str()).map_err(backend)?,
    })
}

fn client_from_row(row: &SqliteRow) -> Result<Client, StoreError> {
    Ok(Client {
        id: ClientId(row.try_get("id").map_err(backend)?),
        name: row.try_get("name").map_err(backend)?,
        description: row.try_get("description").map_err(backend)?,
        created_at: timestamp(row.try_get("createdAt").map_err(backend)?)?,
        created_by: row.try_get("createdBy").map_err(backend)?,
        updated_at: timestamp(row.try_get("updatedAt").map_err(backend)?)?,
        updated_by: row.try_get("updatedBy").map_err(backend)?,
        automation: row.try_get("automation").map_err(backend)?,
    })
}

fn group_from_row(row: &SqliteRow) -> Result<Group, StoreError> {
    Ok(Group {
        id: GroupId(row.try_get("id").map_err(backend)?),
        name: row.try_get("name").map_err(backend)?,
        description: row.try_get("description").map_err(backend)?,
        created_at: timestamp(row.try_get("createdAt").map_err(backend)?)?,
        created_by: row.try_get("createdBy").map_err(backend)?,
        updated_at: timestamp(row.try_get("updatedAt").map_err(backend)?)?,
        updated_by: row.try_get("updatedBy").map_err(backend)?,
    })
}

fn joined_from_row(row: &SqliteRow) -> Result<(SecretSeries, SecretContent), StoreError> {
    Ok((series_from_row(row, "s_")?, content_from_row(row, "c_")?))
}

impl SqliteStore {
    async fn require_client(&self, id: ClientId) -> Result<(), StoreError> {
        sqlx::query("SELECT 1 FROM clients WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn require_group(&self, id: GroupId) -> Result<(), StoreError> {
        sqlx::query("SELECT 1 FROM groups WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn require_series(&self, id: SeriesId) -> Result<(), StoreError> {
        sqlx::query("SELECT 1 FROM secrets WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}

// ───────────────────────────────── Series ─────────────────────────────────

#[async_trait::async_trait]
impl SeriesStore for SqliteStore {
    async fn create_series(&self, params: &CreateSeriesParams) -> Result<SeriesId, StoreError> {
        let now = now_millis();
        let result = sqlx::query(
            "INSERT INTO secrets(name, description, createdAt, createdBy, updatedAt, updatedBy, \
                                 type, options, metadata)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&params.name)
        .bind(&params.description)
        .bind(now)
        .bind(&params.creator)
        .bind(now)
        .bind(&params.creator)
        .bind(&params.secret_type)
        .bind(to_json(&params.generation_options)?)
        .bind(to_json(&params.metadata)?)
        .execute(&self.pool)
        .await
        .map_err(map_insert_err)?;

        Ok(SeriesId(result.last_insert_rowid()))
    }

    async fn series_by_id(&self, id: SeriesId) -> Result<Option<SecretSeries>, StoreError> {
        let row = sqlx::query(&format!("SELECT {SERIES_COLS} FROM secrets WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(|r| series_from_row(&r, "")).transpose()
    }

    async fn series_by_name(&self, name: &str) -> Result<Option<SecretSeries>, StoreError> {
        let row = sqlx::query(&format!("SELECT {SERIES_COLS} FROM secrets WHERE name = ?"))
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(|r| series_from_row(&r, "")).transpose()
    }

    async fn list_series(&self) -> Result<Vec<SecretSeries>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {SERIES_COLS} FROM secrets ORDER BY id"))
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(|r| series_from_row(r, "")).collect()
    }

    async fn delete_series_by_name(&self, name: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM secrets WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}

// ───────────────────────────────── Contents ───────────────────────────────

#[async_trait::async_trait]
impl ContentStore for SqliteStore {
    async fn create_content(&self, params: &CreateContentParams) -> Result<ContentId, StoreError> {
        self.require_series(params.series_id).await?;

        let now = now_millis();
        let result = sqlx::query(
            "INSERT INTO secrets_content(secretId, encrypted_content, version, createdAt, \
                                         createdBy, updatedAt, updatedBy)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(params.series_id.0)
        .bind(&params.encrypted_content)
        .bind(&params.version)
        .bind(now)
        .bind(&params.creator)
        .bind(now)
        .bind(&params.creator)
        .execute(&self.pool)
        .await
        .map_err(map_insert_err)?;

        Ok(ContentId(result.last_insert_rowid()))
    }

    async fn content_by_id(&self, id: ContentId) -> Result<Option<SecretContent>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {CONTENT_COLS} FROM secrets_content WHERE id = ?"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(|r| content_from_row(&r, "")).transpose()
    }

    async fn contents_by_series(
        &self,
        series: SeriesId,
    ) -> Result<Vec<SecretContent>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {CONTENT_COLS} FROM secrets_content WHERE secretId = ? ORDER BY id"
        ))
        .bind(series.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(|r| content_from_row(r, "")).collect()
    }

    async fn versions_of_series(&self, series: SeriesId) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query_as::<_, (String,)>(
            "SELECT version FROM secrets_content WHERE secretId = ? ORDER BY id",
        )
        .bind(series.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        Ok(rows.into_iter().map(|(v,)| v).collect())
    }

    async fn delete_contents_by_series(&self, series: SeriesId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM secrets_content WHERE secretId = ?")
            .bind(series.0)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn delete_content_by_series_and_version(
        &self,
        series: SeriesId,
        version: &str,
    ) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM secrets_content WHERE secretId = ? AND version = ?")
            .bind(series.0)
            .bind(version)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}

// ───────────────────────────────── Clients ────────────────────────────────

#[async_trait::async_trait]
impl ClientStore for SqliteStore {
    async fn create_client(&self, params: &CreateClientParams) -> Result<ClientId, StoreError> {
        let now = now_millis();
        let result = sqlx::query(
            "INSERT INTO clients(name, description, createdAt, createdBy, updatedAt, updatedBy, \
                                 automation)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&params.name)
        .bind(&params.description)
        .bind(now)
        .bind(&params.creator)
        .bind(now)
        .bind(&params.creator)
        .bind(params.automation)
        .execute(&self.pool)
        .await
        .map_err(map_insert_err)?;

        Ok(ClientId(result.last_insert_rowid()))
    }

    async fn client_by_id(&self, id: ClientId) -> Result<Option<Client>, StoreError> {
        let row = sqlx::query(&format!("SELECT {CLIENT_COLS} FROM clients WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(|r| client_from_row(&r)).transpose()
    }

    async fn client_by_name(&self, name: &str) -> Result<Option<Client>, StoreError> {
        let row = sqlx::query(&format!("SELECT {CLIENT_COLS} FROM clients WHERE name = ?"))
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(|r| client_from_row(&r)).transpose()
    }

    async fn list_clients(&self) -> Result<Vec<Client>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {CLIENT_COLS} FROM clients ORDER BY id"))
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(client_from_row).collect()
    }

    async fn delete_client(&self, id: ClientId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM clients WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}

// ───────────────────────────────── Groups ─────────────────────────────────

#[async_trait::async_trait]
impl GroupStore for SqliteStore {
    async fn create_group(&self, params: &CreateGroupParams) -> Result<GroupId, StoreError> {
        let now = now_millis();
        let result = sqlx::query(
            "INSERT INTO groups(name, description, createdAt, createdBy, updatedAt, updatedBy)
             VALUES(?, ?, ?, ?, ?, ?)",
        )
        .bind(&params.name)
        .bind(&params.description)
        .bind(now)
        .bind(&params.creator)
        .bind(now)
        .bind(&params.creator)
        .execute(&self.pool)
        .await
        .map_err(map_insert_err)?;

        Ok(GroupId(result.last_insert_rowid()))
    }

    async fn group_by_id(&self, id: GroupId) -> Result<Option<Group>, StoreError> {
        let row = sqlx::query(&format!("SELECT {GROUP_COLS} FROM groups WHERE id = ?"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(|r| group_from_row(&r)).transpose()
    }

    async fn group_by_name(&self, name: &str) -> Result<Option<Group>, StoreError> {
        let row = sqlx::query(&format!("SELECT {GROUP_COLS} FROM groups WHERE name = ?"))
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(|r| group_from_row(&r)).transpose()
    }

    async fn list_groups(&self) -> Result<Vec<Group>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {GROUP_COLS} FROM groups ORDER BY id"))
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(group_from_row).collect()
    }

    async fn delete_group(&self, id: GroupId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM groups WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}

// ─────────────────────────────── Memberships ──────────────────────────────

#[async_trait::async_trait]
impl MembershipStore for SqliteStore {
    async fn enroll(&self, client: ClientId, group: GroupId) -> Result<(), StoreError> {
        self.require_client(client).await?;
        self.require_group(group).await?;
        sqlx::query(
            "INSERT INTO memberships(clientId, groupId) VALUES(?, ?) ON CONFLICT DO NOTHING",
        )
        .bind(client.0)
        .bind(group.0)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn evict(&self, client: ClientId, group: GroupId) -> Result<(), StoreError> {
        self.require_client(client).await?;
        self.require_group(group).await?;
        sqlx::query("DELETE FROM memberships WHERE clientId = ? AND groupId = ?")
            .bind(client.0)
            .bind(group.0)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn allow(&self, series: SeriesId, group: GroupId) -> Result<(), StoreError> {
        self.require_series(series).await?;
        self.require_group(group).await?;
        sqlx::query(
            "INSERT INTO accessgrants(groupId, secretId) VALUES(?, ?) ON CONFLICT DO NOTHING",
        )
        .bind(group.0)
        .bind(series.0)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn disallow(&self, series: SeriesId, group: GroupId) -> Result<(), StoreError> {
        self.require_series(series).await?;
        self.require_group(group).await?;
        sqlx::query("DELETE FROM accessgrants WHERE groupId = ? AND secretId = ?")
            .bind(group.0)
            .bind(series.0)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn clients_of_group(&self, group: GroupId) -> Result<Vec<Client>, StoreError> {
        self.require_group(group).await?;
        let rows = sqlx::query(
            "SELECT cl.id AS id, cl.name AS name, cl.description AS description, \
                    cl.createdAt AS createdAt, cl.createdBy AS createdBy, \
                    cl.updatedAt AS updatedAt, cl.updatedBy AS updatedBy, \
                    cl.automation AS automation
             FROM clients cl
             JOIN memberships m ON m.clientId = cl.id
             WHERE m.groupId = ?
             ORDER BY cl.id",
        )
        .bind(group.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(client_from_row).collect()
    }

    async fn groups_of_client(&self, client: ClientId) -> Result<Vec<Group>, StoreError> {
        self.require_client(client).await?;
        let rows = sqlx::query(
            "SELECT g.id AS id, g.name AS name, g.description AS description, \
                    g.createdAt AS createdAt, g.createdBy AS createdBy, \
                    g.updatedAt AS updatedAt, g.updatedBy AS updatedBy
             FROM groups g
             JOIN memberships m ON m.groupId = g.id
             WHERE m.clientId = ?
             ORDER BY g.id",
        )
        .bind(client.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(group_from_row).collect()
    }

    async fn series_of_group(&self, group: GroupId) -> Result<Vec<SecretSeries>, StoreError> {
        self.require_group(group).await?;
        let rows = sqlx::query(
            "SELECT s.id AS id, s.name AS name, s.description AS description, \
                    s.createdAt AS createdAt, s.createdBy AS createdBy, \
                    s.updatedAt AS updatedAt, s.updatedBy AS updatedBy, \
                    s.type AS type, s.options AS options, s.metadata AS metadata
             FROM secrets s
             JOIN accessgrants a ON a.secretId = s.id
             WHERE a.groupId = ?
             ORDER BY s.id",
        )
        .bind(group.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(|r| series_from_row(r, "")).collect()
    }

    async fn groups_of_series(&self, series: SeriesId) -> Result<Vec<Group>, StoreError> {
        self.require_series(series).await?;
        let rows = sqlx::query(
            "SELECT g.id AS id, g.name AS name, g.description AS description, \
                    g.createdAt AS createdAt, g.createdBy AS createdBy, \
                    g.updatedAt AS updatedAt, g.updatedBy AS updatedBy
             FROM groups g
             JOIN accessgrants a ON a.groupId = g.id
             WHERE a.secretId = ?
             ORDER BY g.id",
        )
        .bind(series.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(group_from_row).collect()
    }
}

// ─────────────────────────────── ACL queries ──────────────────────────────

#[async_trait::async_trait]
impl AclStore for SqliteStore {
    async fn may_access(&self, client: ClientId, series: SeriesId) -> Result<bool, StoreError> {
        let row = sqlx::query(
            "SELECT 1
             FROM memberships m
             JOIN accessgrants a ON a.groupId = m.groupId
             WHERE m.clientId = ? AND a.secretId = ?
             LIMIT 1",
        )
        .bind(client.0)
        .bind(series.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        Ok(row.is_some())
    }

    async fn accessible_secrets(
        &self,
        client: ClientId,
    ) -> Result<Vec<(SecretSeries, SecretContent)>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT DISTINCT {JOINED_COLS}
             FROM secrets s
             JOIN accessgrants a ON a.secretId = s.id
             JOIN memberships m ON m.groupId = a.groupId
             JOIN secrets_content c ON c.secretId = s.id
             WHERE m.clientId = ?
               AND c.id = (SELECT MAX(c2.id) FROM secrets_content c2 WHERE c2.secretId = s.id)
             ORDER BY s_id"
        ))
        .bind(client.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(joined_from_row).collect()
    }

    async fn groups_for_series(&self, series: SeriesId) -> Result<Vec<Group>, StoreError> {
        self.groups_of_series(series).await
    }

    async fn clients_for_series(&self, series: SeriesId) -> Result<Vec<Client>, StoreError> {
        self.require_series(series).await?;
        let rows = sqlx::query(
            "SELECT DISTINCT cl.id AS id, cl.name AS name, cl.description AS description, \
                    cl.createdAt AS createdAt, cl.createdBy AS createdBy, \
                    cl.updatedAt AS updatedAt, cl.updatedBy AS updatedBy, \
                    cl.automation AS automation
             FROM clients cl
             JOIN memberships m ON m.clientId = cl.id
             JOIN accessgrants a ON a.groupId = m.groupId
             WHERE a.secretId = ?
             ORDER BY id",
        )
        .bind(series.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(client_from_row).collect()
    }

    async fn client_secret_by_name(
        &self,
        client: ClientId,
        name: &str,
    ) -> Result<Option<(SecretSeries, SecretContent)>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {JOINED_COLS}
             FROM secrets s
             JOIN secrets_content c ON c.secretId = s.id
             WHERE s.name = ?
               AND c.id = (SELECT MAX(c2.id) FROM secrets_content c2 WHERE c2.secretId = s.id)
               AND EXISTS (SELECT 1
                           FROM memberships m
                           JOIN accessgrants a ON a.groupId = m.groupId
                           WHERE m.clientId = ? AND a.secretId = s.id)"
        ))
        .bind(name)
        .bind(client.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(|r| joined_from_row(&r)).transpose()
    }
}

// ───────────────────────────────── Composite ──────────────────────────────

#[async_trait::async_trait]
impl Store for SqliteStore {
    async fn create_secret(
        &self,
        params: &CreateSecretParams,
    ) -> Result<(SecretSeries, SecretContent), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let now = now_millis();

        let existing = sqlx::query(&format!("SELECT {SERIES_COLS} FROM secrets WHERE name = ?"))
            .bind(&params.name)
            .fetch_optional(&mut *tx)
            .await
            .map_err(backend)?;

        let series = match existing {
            Some(row) => series_from_row(&row, "")?,
            None => {
                let result = sqlx::query(
                    "INSERT INTO secrets(name, description, createdAt, createdBy, updatedAt, \
                                         updatedBy, type, options, metadata)
                     VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(&params.name)
                .bind(&params.description)
                .bind(now)
                .bind(&params.creator)
                .bind(now)
                .bind(&params.creator)
                .bind(&params.secret_type)
                .bind(to_json(&params.generation_options)?)
                .bind(to_json(&params.metadata)?)
                .execute(&mut *tx)
                .await
                .map_err(map_insert_err)?;

                SecretSeries {
                    id: SeriesId(result.last_insert_rowid()),
                    name: params.name.clone(),
                    description: params.description.clone(),
                    created_at: timestamp(now)?,
                    created_by: params.creator.clone(),
                    updated_at: timestamp(now)?,
                    updated_by: params.creator.clone(),
                    secret_type: params.secret_type.clone(),
                    generation_options: params.generation_options.clone(),
                    metadata: params.metadata.clone(),
                }
            }
        };

        // A UNIQUE violation here drops the transaction, rolling back a
        // series row inserted above.
        let result = sqlx::query(
            "INSERT INTO secrets_content(secretId, encrypted_content, version, createdAt, \
                                         createdBy, updatedAt, updatedBy)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(series.id.0)
        .bind(&params.encrypted_content)
        .bind(&params.version)
        .bind(now)
        .bind(&params.creator)
        .bind(now)
        .bind(&params.creator)
        .execute(&mut *tx)
        .await
        .map_err(map_insert_err)?;

        let content = SecretContent {
            id: ContentId(result.last_insert_rowid()),
            series_id: series.id,
            encrypted_content: params.encrypted_content.clone(),
            version: params.version.clone(),
            created_at: timestamp(now)?,
            created_by: params.creator.clone(),
            updated_at: timestamp(now)?,
            updated_by: params.creator.clone(),
        };

        tx.commit().await.map_err(backend)?;
        Ok((series, content))
    }

    async fn secret_by_name_and_version(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Option<(SecretSeries, SecretContent)>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {JOINED_COLS}
             FROM secrets s
             JOIN secrets_content c ON c.secretId = s.id
             WHERE s.name = ? AND c.version = ?"
        ))
        .bind(name)
        .bind(version)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(|r| joined_from_row(&r)).transpose()
    }

    async fn secret_by_id_and_version(
        &self,
        id: SeriesId,
        version: &str,
    ) -> Result<Option<(SecretSeries, SecretContent)>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {JOINED_COLS}
             FROM secrets s
             JOIN secrets_content c ON c.secretId = s.id
             WHERE s.id = ? AND c.version = ?"
        ))
        .bind(id.0)
        .bind(version)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(|r| joined_from_row(&r)).transpose()
    }

    async fn secrets_by_id(
        &self,
        id: SeriesId,
    ) -> Result<Vec<(SecretSeries, SecretContent)>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {JOINED_COLS}
             FROM secrets s
             JOIN secrets_content c ON c.secretId = s.id
             WHERE s.id = ?
             ORDER BY c_id"
        ))
        .bind(id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(joined_from_row).collect()
    }

    async fn list_secrets(&self) -> Result<Vec<(SecretSeries, SecretContent)>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {JOINED_COLS}
             FROM secrets s
             JOIN secrets_content c ON c.secretId = s.id
             ORDER BY s_id, c_id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(joined_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series_params(name: &str) -> CreateSeriesParams {
        CreateSeriesParams {
            name: name.to_string(),
            description: "desc".to_string(),
            creator: "tester".to_string(),
            ..Default::default()
        }
    }

    fn secret_params(name: &str, version: &str) -> CreateSecretParams {
        CreateSecretParams {
            name: name.to_string(),
            encrypted_content: format!("payload-{name}-{version}.kid1"),
            version: version.to_string(),
            creator: "tester".to_string(),
            ..Default::default()
        }
    }

    async fn table_size(store: &SqliteStore, table: &str) -> i64 {
        sqlx::query_as::<_, (i64,)>(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&store.pool)
            .await
            .unwrap()
            .0
    }

    #[tokio::test]
    async fn duplicate_series_name_maps_to_conflict() {
        let s = SqliteStore::open_in_memory().await.unwrap();
        s.create_series(&series_params("db-pass")).await.unwrap();
        let err = s.create_series(&series_params("db-pass")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
    }

    #[tokio::test]
    async fn duplicate_series_version_maps_to_conflict() {
        let s = SqliteStore::open_in_memory().await.unwrap();
        let id = s.create_series(&series_params("x")).await.unwrap();

        let content = CreateContentParams {
            series_id: id,
            encrypted_content: "e.kid1".to_string(),
            version: String::new(),
            creator: "tester".to_string(),
        };
        s.create_content(&content).await.unwrap();
        let err = s.create_content(&content).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
    }

    #[tokio::test]
    async fn content_requires_existing_series() {
        let s = SqliteStore::open_in_memory().await.unwrap();
        let err = s
            .create_content(&CreateContentParams {
                series_id: SeriesId(999),
                encrypted_content: "e.kid1".to_string(),
                version: "v1".to_string(),
                creator: "tester".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn series_delete_cascades_to_contents_and_grants() {
        let s = SqliteStore::open_in_memory().await.unwrap();
        let (series, _) = s.create_secret(&secret_params("doomed", "v1")).await.unwrap();
        s.create_secret(&secret_params("doomed", "v2")).await.unwrap();

        let group = s
            .create_group(&CreateGroupParams {
                name: "ops".to_string(),
                description: String::new(),
                creator: "tester".to_string(),
            })
            .await
            .unwrap();
        s.allow(series.id, group).await.unwrap();

        s.delete_series_by_name("doomed").await.unwrap();

        assert_eq!(table_size(&s, "secrets_content").await, 0);
        assert_eq!(table_size(&s, "accessgrants").await, 0);
        assert!(s.series_by_name("doomed").await.unwrap().is_none());

        // Idempotent when absent.
        s.delete_series_by_name("doomed").await.unwrap();
    }

    #[tokio::test]
    async fn version_delete_keeps_series_row() {
        let s = SqliteStore::open_in_memory().await.unwrap();
        let (series, _) = s.create_secret(&secret_params("kept", "only")).await.unwrap();

        s.delete_content_by_series_and_version(series.id, "only")
            .await
            .unwrap();

        assert!(s.series_by_name("kept").await.unwrap().is_some());
        assert!(s.contents_by_series(series.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_secret_reuses_series_and_rejects_duplicates() {
        let s = SqliteStore::open_in_memory().await.unwrap();
        s.create_secret(&secret_params("api-key", "v1")).await.unwrap();
        s.create_secret(&secret_params("api-key", "v2")).await.unwrap();
        assert_eq!(table_size(&s, "secrets").await, 1);
        assert_eq!(table_size(&s, "secrets_content").await, 2);

        let err = s
            .create_secret(&secret_params("api-key", "v1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
        assert_eq!(table_size(&s, "secrets").await, 1);
        assert_eq!(table_size(&s, "secrets_content").await, 2);
    }

    #[tokio::test]
    async fn empty_version_is_a_distinct_value() {
        let s = SqliteStore::open_in_memory().await.unwrap();
        s.create_secret(&secret_params("mixed", "")).await.unwrap();
        let (series, _) = s.create_secret(&secret_params("mixed", "v1")).await.unwrap();

        let versions = s.versions_of_series(series.id).await.unwrap();
        assert_eq!(versions, vec!["".to_string(), "v1".to_string()]);

        let unversioned = s
            .secret_by_name_and_version("mixed", "")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unversioned.1.version, "");
    }

    #[tokio::test]
    async fn acl_queries_follow_the_two_edge_path() {
        let s = SqliteStore::open_in_memory().await.unwrap();
        let (series, _) = s.create_secret(&secret_params("db-pass", "")).await.unwrap();

        let client = s
            .create_client(&CreateClientParams {
                name: "shuttle".to_string(),
                description: String::new(),
                creator: "tester".to_string(),
                automation: false,
            })
            .await
            .unwrap();
        let group = s
            .create_group(&CreateGroupParams {
                name: "ops".to_string(),
                description: String::new(),
                creator: "tester".to_string(),
            })
            .await
            .unwrap();

        assert!(!s.may_access(client, series.id).await.unwrap());

        s.enroll(client, group).await.unwrap();
        assert!(!s.may_access(client, series.id).await.unwrap());

        s.allow(series.id, group).await.unwrap();
        assert!(s.may_access(client, series.id).await.unwrap());

        let accessible = s.accessible_secrets(client).await.unwrap();
        assert_eq!(accessible.len(), 1);
        assert_eq!(accessible[0].0.name, "db-pass");

        let found = s.client_secret_by_name(client, "db-pass").await.unwrap();
        assert!(found.is_some());
        assert!(s
            .client_secret_by_name(client, "nonexistent")
            .await
            .unwrap()
            .is_none());

        s.disallow(series.id, group).await.unwrap();
        assert!(!s.may_access(client, series.id).await.unwrap());
        assert!(s
            .client_secret_by_name(client, "db-pass")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn accessible_secrets_picks_latest_and_dedupes_groups() {
        let s = SqliteStore::open_in_memory().await.unwrap();
        let (series, _) = s.create_secret(&secret_params("multi", "v1")).await.unwrap();
        let (_, latest) = s.create_secret(&secret_params("multi", "v2")).await.unwrap();

        let client = s
            .create_client(&CreateClientParams {
                name: "c".to_string(),
                description: String::new(),
                creator: "tester".to_string(),
                automation: false,
            })
            .await
            .unwrap();
        for group_name in ["g1", "g2"] {
            let group = s
                .create_group(&CreateGroupParams {
                    name: group_name.to_string(),
                    description: String::new(),
                    creator: "tester".to_string(),
                })
                .await
                .unwrap();
            s.enroll(client, group).await.unwrap();
            s.allow(series.id, group).await.unwrap();
        }

        let accessible = s.accessible_secrets(client).await.unwrap();
        assert_eq!(accessible.len(), 1);
        assert_eq!(accessible[0].1.id, latest.id);
        assert_eq!(accessible[0].1.version, "v2");
    }

    #[tokio::test]
    async fn membership_mutations_are_idempotent_and_checked() {
        let s = SqliteStore::open_in_memory().await.unwrap();
        let client = s
            .create_client(&CreateClientParams {
                name: "c".to_string(),
                description: String::new(),
                creator: "tester".to_string(),
                automation: true,
            })
            .await
            .unwrap();
        let group = s
            .create_group(&CreateGroupParams {
                name: "g".to_string(),
                description: String::new(),
                creator: "tester".to_string(),
            })
            .await
            .unwrap();

        s.enroll(client, group).await.unwrap();
        s.enroll(client, group).await.unwrap();
        assert_eq!(table_size(&s, "memberships").await, 1);

        s.evict(client, group).await.unwrap();
        s.evict(client, group).await.unwrap();
        assert_eq!(table_size(&s, "memberships").await, 0);

        let err = s.enroll(ClientId(404), group).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn deleting_endpoints_removes_incident_edges() {
        let s = SqliteStore::open_in_memory().await.unwrap();
        let (series, _) = s.create_secret(&secret_params("s", "")).await.unwrap();
        let client = s
            .create_client(&CreateClientParams {
                name: "c".to_string(),
                description: String::new(),
                creator: "tester".to_string(),
                automation: false,
            })
            .await
            .unwrap();
        let group = s
            .create_group(&CreateGroupParams {
                name: "g".to_string(),
                description: String::new(),
                creator: "tester".to_string(),
            })
            .await
            .unwrap();
        s.enroll(client, group).await.unwrap();
        s.allow(series.id, group).await.unwrap();

        s.delete_client(client).await.unwrap();
        assert_eq!(table_size(&s, "memberships").await, 0);
        assert_eq!(table_size(&s, "accessgrants").await, 1);

        s.delete_group(group).await.unwrap();
        assert_eq!(table_size(&s, "accessgrants").await, 0);
    }

    #[tokio::test]
    async fn list_secrets_orders_by_series_then_content() {
        let s = SqliteStore::open_in_memory().await.unwrap();
        s.create_secret(&secret_params("a", "v1")).await.unwrap();
        s.create_secret(&secret_params("b", "")).await.unwrap();
        s.create_secret(&secret_params("a", "v2")).await.unwrap();

        let all = s.list_secrets().await.unwrap();
        let names: Vec<(String, String)> = all
            .iter()
            .map(|(series, content)| (series.name.clone(), content.version.clone()))
            .collect();
        assert_eq!(
            names,
            vec![
                ("a".to_string(), "v1".to_string()),
                ("a".to_string(), "v2".to_string()),
                ("b".to_string(), "".to_string()),
            ]
        );
    }
}
