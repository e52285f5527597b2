//! Group types.
//!
//! A group is simultaneously a set of clients and a set of secret series;
//! access is their cross-product.

use chrono::{DateTime, Utc};

use super::GroupId;

/// Group record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

/// Parameters for creating a group.
#[derive(Clone, Debug, Default)]
pub struct CreateGroupParams {
    pub name: String,
    pub description: String,
    pub creator: String,
}
