//! Secret storage and access-control core.
//!
//! Composes the stores and the cryptographer into the secret abstraction:
//! versioned create/fetch/delete through [`SecretController`], the
//! client–group–series authorization algebra through [`AclEngine`], and
//! redacted projections for listing surfaces. The hosting server supplies
//! an [`AuthPrincipal`] and a store implementation; the core holds no
//! mutable state of its own.

pub mod acl;
pub mod config;
pub mod controller;
pub mod error;
pub mod principal;
pub mod sanitize;
pub mod secret;
pub mod version;

pub use acl::AclEngine;
pub use config::{Config, ConfigError};
pub use controller::{SecretBuilder, SecretController};
pub use error::CoreError;
pub use principal::AuthPrincipal;
pub use sanitize::{sanitize, SanitizedSecret};
pub use secret::{display_name, parse_display_name, ResolvedSecret, Secret, VERSION_DELIMITER};
pub use version::VersionStamp;
