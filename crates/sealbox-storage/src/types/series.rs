//! Secret series types.
//!
//! A series is the identity of a named secret over time; its revisions live
//! in `secrets_content` rows that reference it.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use super::SeriesId;

/// Secret series record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecretSeries {
    pub id: SeriesId,
    /// Unique, non-empty, never contains `..`.
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
    pub secret_type: Option<String>,
    /// Opaque to the store; consumed by provisioning tooling.
    pub generation_options: BTreeMap<String, String>,
    pub metadata: BTreeMap<String, String>,
}

/// Parameters for creating a series.
#[derive(Clone, Debug, Default)]
pub struct CreateSeriesParams {
    pub name: String,
    pub description: String,
    pub creator: String,
    pub secret_type: Option<String>,
    pub generation_options: BTreeMap<String, String>,
    pub metadata: BTreeMap<String, String>,
}
