//! Builds the runtime graph from configuration.

use crate::config::{CacheConfig, Config, EnginesConfig};
use crate::transport::FileSinkFactory;
use crate::AppState;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use yomi_db::{DbRuntimeSettings, KvStore, MigrationError, PoolError, SqliteKvStore};
use yomi_preset::{PresetError, PresetRegistry, PresetResolver, SqlitePresetIdStore};
use yomi_session::{
    PersistenceError, SessionContext, SessionPersistence, SessionRouter, VoiceStates,
};
use yomi_tts::{CachedEngine, Engine, EngineError, EngineRegistry, EspeakEngine, GoogleEngine};
use yomi_types::{Preset, PresetId};

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("invalid configuration: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("failed to get database connection: {0}")]
    Connection(#[from] r2d2::Error),

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error(transparent)]
    Preset(#[from] PresetError),

    #[error("engine setup failed: {0}")]
    Engine(#[from] EngineError),

    #[error("preset {preset} uses engine {engine:?}, which is not configured")]
    UnknownEngine { preset: PresetId, engine: String },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Everything `main` needs besides the HTTP state.
pub struct Services {
    pub state: AppState,
    pub kv: Arc<dyn KvStore>,
    pub persistence: Option<Arc<SessionPersistence>>,
}

/// Registers every configured engine under its name.
pub fn build_engines(config: &EnginesConfig) -> Result<EngineRegistry, BootstrapError> {
    let mut engines = EngineRegistry::new();
    if let Some(espeak) = &config.espeak {
        engines.register(Arc::new(EspeakEngine::new(&espeak.binary)))?;
    }
    if let Some(google) = &config.google {
        engines.register(Arc::new(GoogleEngine::new(
            google.api_key.clone(),
            google.endpoint.clone(),
        )?))?;
    }
    Ok(engines)
}

/// Builds the preset registry and checks each preset's engine exists.
pub fn build_presets(
    config: &Config,
    engines: &EngineRegistry,
) -> Result<PresetRegistry, BootstrapError> {
    let presets = config.presets.iter().map(|(id, p)| Preset {
        id: PresetId::new(id.as_str()),
        engine: p.engine.clone(),
        language: p.language.clone(),
        voice_name: p.voice_name.clone(),
        speaking_rate: p.speaking_rate,
    });
    let registry = PresetRegistry::from_presets(presets)?;
    for preset in registry.list() {
        if !engines.contains(&preset.engine) {
            return Err(BootstrapError::UnknownEngine {
                preset: preset.id.clone(),
                engine: preset.engine.clone(),
            });
        }
    }
    Ok(registry)
}

/// Wraps every engine in a cache over `kv` when caching is enabled.
pub fn with_cache(engines: EngineRegistry, kv: &Arc<dyn KvStore>, config: &CacheConfig) -> EngineRegistry {
    if !config.enabled {
        return engines;
    }
    let ttl = Duration::from_secs(config.ttl_seconds);
    let read_timeout = Duration::from_millis(config.read_timeout_ms);
    let write_timeout = Duration::from_millis(config.write_timeout_ms);
    engines.map_engines(|inner| {
        Arc::new(
            CachedEngine::new(inner, Arc::clone(kv), ttl)
                .with_read_timeout(read_timeout)
                .with_write_timeout(write_timeout),
        ) as Arc<dyn Engine>
    })
}

/// Opens the database and wires registries, router and persistence.
///
/// Must run inside a tokio runtime.
pub fn build(config: &Config) -> Result<Services, BootstrapError> {
    config.validate()?;

    let pool = yomi_db::create_pool(
        &config.database.path,
        DbRuntimeSettings {
            busy_timeout_ms: config.database.busy_timeout_ms,
            pool_max_size: config.database.pool_max_size,
        },
    )?;
    {
        let conn = pool.get()?;
        let applied = yomi_db::run_migrations(&conn)?;
        if applied > 0 {
            tracing::info!(count = applied, "applied database migrations");
        }
    }
    let kv: Arc<dyn KvStore> = Arc::new(SqliteKvStore::new(pool.clone()));

    let engines = build_engines(&config.engines)?;
    let presets = Arc::new(build_presets(config, &engines)?);
    let engines = with_cache(engines, &kv, &config.cache);
    tracing::info!(
        engines = ?engines.names().collect::<Vec<_>>(),
        presets = presets.len(),
        cache = config.cache.enabled,
        "registries ready"
    );

    let preset_store = Arc::new(SqlitePresetIdStore::new(pool.clone()));
    let resolver = Arc::new(PresetResolver::new(
        presets,
        preset_store.clone(),
        PresetId::new(config.bot.fallback_preset.as_str()),
    )?);

    let router = Arc::new(SessionRouter::new(Arc::new(VoiceStates::new())));
    let persistence = if config.persistence.enabled {
        let persistence = Arc::new(SessionPersistence::new(
            Arc::clone(&kv),
            config.persistence_config(),
        )?);
        router.add_observer(persistence.clone());
        Some(persistence)
    } else {
        None
    };

    let sessions = Arc::new(SessionContext {
        engines: Arc::new(engines),
        resolver: Arc::clone(&resolver),
        rules: config.bot.message_rules(),
        announcements: config.announcements.resolve(),
        config: config.bot.session_config(),
    });

    let state = AppState {
        resolver,
        preset_store,
        router,
        sessions,
        transports: Arc::new(FileSinkFactory::new(&config.transport.output_dir)),
        open_timeout: config.bot.open_timeout(),
    };

    Ok(Services {
        state,
        kv,
        persistence,
    })
}

/// Rejoins every session whose lease survived the previous process.
pub async fn restore_sessions(state: &AppState, persistence: &SessionPersistence) {
    let opener = state.clone();
    let summary = persistence
        .restore(&state.router, move |session_state| {
            let opener = opener.clone();
            async move { opener.open_session(session_state).await }
        })
        .await;
    if summary.failed > 0 {
        tracing::warn!(failed = summary.failed, "some sessions could not be restored");
    }
}
