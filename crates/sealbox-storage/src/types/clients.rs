//! Client types.

use chrono::{DateTime, Utc};

use super::ClientId;

/// A principal identified by an X.509 CN.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Client {
    pub id: ClientId,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
    /// True when the client may call the automation surface.
    pub automation: bool,
}

/// Parameters for creating a client.
#[derive(Clone, Debug, Default)]
pub struct CreateClientParams {
    pub name: String,
    pub description: String,
    pub creator: String,
    pub automation: bool,
}
