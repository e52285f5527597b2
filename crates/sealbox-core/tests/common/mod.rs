//! Shared harness: the core wired to each store backend.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::sync::Arc;

use sealbox_core::{AclEngine, AuthPrincipal, SecretController};
use sealbox_crypto::{ContentCryptographer, RootKey};
use sealbox_storage::{
    ClientId, ClientStore, CreateClientParams, CreateGroupParams, GroupId, GroupStore, Store,
};
use sealbox_store_memory::MemoryStore;
use sealbox_store_sqlite::SqliteStore;

pub struct TestCore {
    pub backend: &'static str,
    pub store: Arc<dyn Store>,
    pub controller: SecretController,
    pub acl: AclEngine,
    pub crypto: Arc<ContentCryptographer>,
}

pub fn core_with(backend: &'static str, store: Arc<dyn Store>) -> TestCore {
    let crypto = Arc::new(ContentCryptographer::new("kid1", RootKey::new([7u8; 32])).unwrap());
    TestCore {
        backend,
        controller: SecretController::new(Arc::clone(&store), Arc::clone(&crypto)),
        acl: AclEngine::new(Arc::clone(&store)),
        store,
        crypto,
    }
}

/// Both backends; every scenario runs against each.
pub async fn all_cores() -> Vec<TestCore> {
    vec![
        core_with("memory", Arc::new(MemoryStore::new())),
        core_with(
            "sqlite",
            Arc::new(SqliteStore::open_in_memory().await.unwrap()),
        ),
    ]
}

pub fn automation(name: &str) -> AuthPrincipal {
    AuthPrincipal::Automation {
        id: ClientId(0),
        name: name.to_string(),
    }
}

pub fn operator(name: &str) -> AuthPrincipal {
    AuthPrincipal::Operator {
        name: name.to_string(),
    }
}

pub async fn add_client(core: &TestCore, name: &str) -> ClientId {
    core.store
        .create_client(&CreateClientParams {
            name: name.to_string(),
            description: String::new(),
            creator: "admin".to_string(),
            automation: false,
        })
        .await
        .unwrap()
}

pub async fn add_group(core: &TestCore, name: &str) -> GroupId {
    core.store
        .create_group(&CreateGroupParams {
            name: name.to_string(),
            description: String::new(),
            creator: "admin".to_string(),
        })
        .await
        .unwrap()
}
