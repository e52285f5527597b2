//! Secret lifecycle: create, version, fetch, delete, and failure modes.

mod common;

use common::{all_cores, automation, operator};
use sealbox_core::CoreError;
use sealbox_crypto::CryptoError;
use sealbox_storage::{ContentStore, CreateSecretParams, SeriesStore, Store};

#[tokio::test]
async fn create_and_read_back() {
    for core in all_cores().await {
        let admin = automation("admin");
        let secret = core
            .controller
            .build("DB_Pass", b"hunter2".to_vec(), "admin")
            .with_description("prod database password")
            .create(&admin)
            .await
            .unwrap();

        assert_eq!(secret.name(), "DB_Pass");
        assert_eq!(secret.version(), "");
        assert_eq!(&secret.plaintext(&core.crypto).unwrap()[..], b"hunter2");

        let fetched = core
            .controller
            .secret_by_name_and_version(&admin, "DB_Pass", "")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.content.id, secret.content.id);
        assert_eq!(fetched.series.description, "prod database password");

        let resolved = fetched.resolve(&core.crypto).unwrap();
        assert_eq!(resolved.secret_length, 7, "backend {}", core.backend);
    }
}

#[tokio::test]
async fn versioned_revisions_coexist() {
    for core in all_cores().await {
        let admin = automation("a");
        let v1 = core
            .controller
            .build("API_KEY", b"v1data".to_vec(), "a")
            .with_auto_version()
            .create(&admin)
            .await
            .unwrap();
        let v2 = core
            .controller
            .build("API_KEY", b"v2data".to_vec(), "a")
            .with_auto_version()
            .create(&admin)
            .await
            .unwrap();

        assert_ne!(v1.version(), v2.version());
        assert_eq!(v1.id(), v2.id(), "one series for both revisions");

        let versions = core.controller.list_versions("API_KEY").await.unwrap();
        assert_eq!(versions.len(), 2);
        assert!(versions.contains(&v1.version().to_string()));
        assert!(versions.contains(&v2.version().to_string()));

        // Latest by content id.
        let all = core.controller.secrets_by_id(&admin, v1.id()).await.unwrap();
        let latest = all.last().unwrap();
        assert_eq!(&latest.plaintext(&core.crypto).unwrap()[..], b"v2data");

        core.controller
            .delete_version(&admin, "API_KEY", v1.version())
            .await
            .unwrap();

        let versions = core.controller.list_versions("API_KEY").await.unwrap();
        assert_eq!(versions, vec![v2.version().to_string()]);
        assert!(core
            .store
            .series_by_name("API_KEY")
            .await
            .unwrap()
            .is_some());
    }
}

#[tokio::test]
async fn version_delete_keeps_the_name_reserved() {
    for core in all_cores().await {
        let admin = automation("a");
        let secret = core
            .controller
            .build("LONE", b"x".to_vec(), "a")
            .with_version("v1")
            .create(&admin)
            .await
            .unwrap();

        core.controller
            .delete_version(&admin, "LONE", "v1")
            .await
            .unwrap();

        // Series row remains; recreating the unversioned revision works and
        // the old version is gone.
        assert!(core.store.series_by_name("LONE").await.unwrap().is_some());
        assert!(core
            .controller
            .secret_by_name_and_version(&admin, "LONE", "v1")
            .await
            .unwrap()
            .is_none());

        core.controller
            .delete_series(&admin, "LONE")
            .await
            .unwrap();
        assert!(core.store.series_by_name("LONE").await.unwrap().is_none());
        assert!(core
            .store
            .contents_by_series(secret.id())
            .await
            .unwrap()
            .is_empty());

        // Idempotent when already gone.
        core.controller
            .delete_series(&admin, "LONE")
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn duplicate_create_conflicts_and_changes_nothing() {
    for core in all_cores().await {
        let admin = automation("a");
        core.controller
            .build("X", b"p".to_vec(), "a")
            .create(&admin)
            .await
            .unwrap();

        let series_before = core.store.list_series().await.unwrap().len();
        let secrets_before = core.controller.list_all(&admin).await.unwrap().len();

        let err = core
            .controller
            .build("X", b"p".to_vec(), "a")
            .create(&admin)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict), "backend {}", core.backend);

        assert_eq!(core.store.list_series().await.unwrap().len(), series_before);
        assert_eq!(
            core.controller.list_all(&admin).await.unwrap().len(),
            secrets_before
        );
    }
}

#[tokio::test]
async fn empty_version_is_not_a_wildcard() {
    for core in all_cores().await {
        let admin = automation("a");
        core.controller
            .build("ONLY_VERSIONED", b"data".to_vec(), "a")
            .with_version("0000000000000001")
            .create(&admin)
            .await
            .unwrap();

        // No unversioned row exists, so the empty version finds nothing.
        assert!(core
            .controller
            .secret_by_name_and_version(&admin, "ONLY_VERSIONED", "")
            .await
            .unwrap()
            .is_none());
    }
}

#[tokio::test]
async fn cross_series_ciphertext_fails_loudly() {
    for core in all_cores().await {
        let admin = automation("a");
        let donor = core
            .controller
            .build("SERIES_A", b"donor".to_vec(), "a")
            .create(&admin)
            .await
            .unwrap();

        // Plant A's envelope in a row of series B, as a cross-series
        // copy-paste attack would.
        core.store
            .create_secret(&CreateSecretParams {
                name: "SERIES_B".to_string(),
                encrypted_content: donor.content.encrypted_content.clone(),
                version: String::new(),
                creator: "a".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let stolen = core
            .controller
            .secret_by_name_and_version(&admin, "SERIES_B", "")
            .await
            .unwrap()
            .unwrap();
        let err = stolen.plaintext(&core.crypto).unwrap_err();
        assert!(matches!(err, CryptoError::Integrity), "backend {}", core.backend);
    }
}

#[tokio::test]
async fn operators_cannot_mutate_or_read_ciphertext() {
    for core in all_cores().await {
        let admin = automation("a");
        let alice = operator("alice");

        let err = core
            .controller
            .build("S", b"x".to_vec(), "alice")
            .create(&alice)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden));

        core.controller
            .build("S", b"x".to_vec(), "a")
            .create(&admin)
            .await
            .unwrap();

        assert!(matches!(
            core.controller
                .secret_by_name_and_version(&alice, "S", "")
                .await
                .unwrap_err(),
            CoreError::Forbidden
        ));
        assert!(matches!(
            core.controller.delete_series(&alice, "S").await.unwrap_err(),
            CoreError::Forbidden
        ));
    }
}

#[tokio::test]
async fn invalid_inputs_are_rejected() {
    for core in all_cores().await {
        let admin = automation("a");

        let err = core
            .controller
            .build("", b"x".to_vec(), "a")
            .create(&admin)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));

        let err = core
            .controller
            .build("bad..name", b"x".to_vec(), "a")
            .create(&admin)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));

        let err = core
            .controller
            .build("ok", b"x".to_vec(), "a")
            .with_metadata([(String::new(), "v".to_string())].into())
            .create(&admin)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }
}

#[tokio::test]
async fn list_all_is_ordered_by_series_then_content() {
    for core in all_cores().await {
        let admin = automation("a");
        core.controller
            .build("alpha", b"1".to_vec(), "a")
            .with_version("v1")
            .create(&admin)
            .await
            .unwrap();
        core.controller
            .build("beta", b"2".to_vec(), "a")
            .create(&admin)
            .await
            .unwrap();
        core.controller
            .build("alpha", b"3".to_vec(), "a")
            .with_version("v2")
            .create(&admin)
            .await
            .unwrap();

        let all = core.controller.list_all(&admin).await.unwrap();
        let listed: Vec<(String, String)> = all
            .iter()
            .map(|s| (s.name().to_string(), s.version().to_string()))
            .collect();
        assert_eq!(
            listed,
            vec![
                ("alpha".to_string(), "v1".to_string()),
                ("alpha".to_string(), "v2".to_string()),
                ("beta".to_string(), "".to_string()),
            ],
            "backend {}",
            core.backend
        );
    }
}
