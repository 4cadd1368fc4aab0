use std::sync::Arc;
use yomi_db::{create_pool, run_migrations, DbRuntimeSettings};
use yomi_preset::{PresetIdStore, PresetRegistry, PresetResolver, SqlitePresetIdStore, StoreError};
use yomi_types::{GuildId, Preset, PresetId, Scope, UserId};

fn store(dir: &tempfile::TempDir) -> SqlitePresetIdStore {
    let path = dir.path().join("presets.db");
    let pool = create_pool(path.to_str().unwrap(), DbRuntimeSettings::default()).unwrap();
    run_migrations(&pool.get().unwrap()).unwrap();
    SqlitePresetIdStore::new(pool)
}

#[tokio::test]
async fn save_overwrites_and_delete_removes() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);

    assert!(matches!(
        store.find(Scope::User, 42).await,
        Err(StoreError::NotFound)
    ));

    store
        .save(Scope::User, 42, &PresetId::new("first"))
        .await
        .unwrap();
    store
        .save(Scope::User, 42, &PresetId::new("second"))
        .await
        .unwrap();
    assert_eq!(
        store.find(Scope::User, 42).await.unwrap(),
        PresetId::new("second")
    );

    // Same owner id in another scope is a separate row.
    assert!(matches!(
        store.find(Scope::Guild, 42).await,
        Err(StoreError::NotFound)
    ));

    store.delete(Scope::User, 42).await.unwrap();
    assert!(matches!(
        store.find(Scope::User, 42).await,
        Err(StoreError::NotFound)
    ));
}

#[tokio::test]
async fn large_snowflakes_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);
    let owner = u64::MAX - 5;

    store
        .save(Scope::Guild, owner, &PresetId::new("p"))
        .await
        .unwrap();
    assert_eq!(
        store.find(Scope::Guild, owner).await.unwrap(),
        PresetId::new("p")
    );
}

#[tokio::test]
async fn resolver_reads_through_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(store(&dir));
    let registry = Arc::new(
        PresetRegistry::from_presets(["fallback", "calm"].map(|id| Preset {
            id: PresetId::new(id),
            engine: "espeak".to_string(),
            language: "en-US".to_string(),
            voice_name: String::new(),
            speaking_rate: 1.0,
        }))
        .unwrap(),
    );
    store
        .save(Scope::Guild, 10, &PresetId::new("calm"))
        .await
        .unwrap();

    let resolver = PresetResolver::new(registry, store, PresetId::new("fallback")).unwrap();
    assert_eq!(
        resolver.resolve(GuildId(10), UserId(99)).await.id.as_str(),
        "calm"
    );
    assert_eq!(
        resolver.resolve(GuildId(11), UserId(99)).await.id.as_str(),
        "fallback"
    );
}
