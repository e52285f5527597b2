//! Secret content (revision) types.

use chrono::{DateTime, Utc};

use super::{ContentId, SeriesId};

/// One immutable revision of a series. Never mutated after insert; removed
/// only by series delete or targeted version delete.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecretContent {
    pub id: ContentId,
    pub series_id: SeriesId,
    /// Envelope string produced by the cryptographer; opaque to the store.
    pub encrypted_content: String,
    /// Empty string denotes the legacy unversioned revision; `(series_id,
    /// version)` is unique either way.
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

/// Parameters for inserting a content revision.
#[derive(Clone, Debug)]
pub struct CreateContentParams {
    pub series_id: SeriesId,
    pub encrypted_content: String,
    pub version: String,
    pub creator: String,
}
