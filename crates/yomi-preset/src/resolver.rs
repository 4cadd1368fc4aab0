//! Hierarchical preset resolution.

use crate::error::{PresetError, StoreError};
use crate::registry::PresetRegistry;
use crate::store::PresetIdStore;
use std::sync::Arc;
use std::time::Duration;
use yomi_types::{GuildId, Preset, PresetId, Scope, UserId};

/// Default deadline for a single store lookup.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(3);

/// Picks the preset for a speaker by walking an ordered chain of scoped
/// lookups: the user's own choice, then the guild's, then the fallback.
///
/// A lookup that misses, fails, times out, or names a preset missing from
/// the registry moves on to the next link. Resolution therefore always
/// yields a preset.
pub struct PresetResolver {
    registry: Arc<PresetRegistry>,
    store: Arc<dyn PresetIdStore>,
    fallback: Preset,
    lookup_timeout: Duration,
}

impl PresetResolver {
    /// # Errors
    ///
    /// Returns `PresetError::FallbackNotRegistered` if `fallback` is not in
    /// `registry`.
    pub fn new(
        registry: Arc<PresetRegistry>,
        store: Arc<dyn PresetIdStore>,
        fallback: PresetId,
    ) -> Result<Self, PresetError> {
        let fallback = registry
            .get(&fallback)
            .cloned()
            .ok_or(PresetError::FallbackNotRegistered(fallback))?;
        Ok(Self {
            registry,
            store,
            fallback,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
        })
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<PresetRegistry> {
        &self.registry
    }

    pub fn fallback(&self) -> &Preset {
        &self.fallback
    }

    /// Resolves the preset that `user` speaks with in `guild`.
    pub async fn resolve(&self, guild: GuildId, user: UserId) -> Preset {
        self.resolve_chain(&[(Scope::User, user.get()), (Scope::Guild, guild.get())])
            .await
    }

    /// Resolves the guild-wide preset, used for announcements.
    pub async fn resolve_guild_preset(&self, guild: GuildId) -> Preset {
        self.resolve_chain(&[(Scope::Guild, guild.get())]).await
    }

    async fn resolve_chain(&self, chain: &[(Scope, u64)]) -> Preset {
        for &(scope, owner) in chain {
            if let Some(preset) = self.lookup(scope, owner).await {
                return preset;
            }
        }
        tracing::info!(
            chain = ?chain,
            fallback = %self.fallback.id,
            "no scoped preset matched, using fallback"
        );
        self.fallback.clone()
    }

    async fn lookup(&self, scope: Scope, owner: u64) -> Option<Preset> {
        let found = tokio::time::timeout(self.lookup_timeout, self.store.find(scope, owner)).await;
        let preset_id = match found {
            Ok(Ok(id)) => id,
            Ok(Err(StoreError::NotFound)) => return None,
            Ok(Err(e)) => {
                tracing::warn!(%scope, owner, error = %e, "preset lookup failed");
                return None;
            }
            Err(_) => {
                tracing::warn!(%scope, owner, "preset lookup timed out");
                return None;
            }
        };

        match self.registry.get(&preset_id) {
            Some(preset) => Some(preset.clone()),
            None => {
                tracing::warn!(
                    %scope,
                    owner,
                    preset_id = %preset_id,
                    "stored preset is not registered"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryPresetIdStore;
    use async_trait::async_trait;

    fn preset(id: &str) -> Preset {
        Preset {
            id: PresetId::new(id),
            engine: "test_engine".to_string(),
            language: "ja-JP".to_string(),
            voice_name: String::new(),
            speaking_rate: 1.0,
        }
    }

    fn registry() -> Arc<PresetRegistry> {
        Arc::new(
            PresetRegistry::from_presets([preset("fallback"), preset("guild"), preset("user")])
                .unwrap(),
        )
    }

    #[test]
    fn construction_requires_registered_fallback() {
        let store = Arc::new(MemoryPresetIdStore::new());
        let result = PresetResolver::new(registry(), store, PresetId::new("missing"));
        assert!(matches!(
            result,
            Err(PresetError::FallbackNotRegistered(id)) if id.as_str() == "missing"
        ));
    }

    #[tokio::test]
    async fn user_beats_guild_beats_fallback() {
        let store = Arc::new(MemoryPresetIdStore::new());
        let resolver =
            PresetResolver::new(registry(), store.clone(), PresetId::new("fallback")).unwrap();
        let (guild, user) = (GuildId(1), UserId(2));

        assert_eq!(resolver.resolve(guild, user).await.id.as_str(), "fallback");

        store
            .save(Scope::Guild, guild.get(), &PresetId::new("guild"))
            .await
            .unwrap();
        assert_eq!(resolver.resolve(guild, user).await.id.as_str(), "guild");

        store
            .save(Scope::User, user.get(), &PresetId::new("user"))
            .await
            .unwrap();
        assert_eq!(resolver.resolve(guild, user).await.id.as_str(), "user");
        assert_eq!(
            resolver.resolve_guild_preset(guild).await.id.as_str(),
            "guild"
        );
    }

    #[tokio::test]
    async fn stale_user_preset_falls_through_to_guild() {
        let store = Arc::new(MemoryPresetIdStore::new());
        store
            .save(Scope::User, 2, &PresetId::new("deleted_preset"))
            .await
            .unwrap();
        store
            .save(Scope::Guild, 1, &PresetId::new("guild"))
            .await
            .unwrap();
        let resolver = PresetResolver::new(registry(), store, PresetId::new("fallback")).unwrap();

        assert_eq!(
            resolver.resolve(GuildId(1), UserId(2)).await.id.as_str(),
            "guild"
        );
    }

    struct BrokenStore;

    #[async_trait]
    impl PresetIdStore for BrokenStore {
        async fn find(&self, _: Scope, _: u64) -> Result<PresetId, StoreError> {
            Err(StoreError::Poisoned)
        }
        async fn save(&self, _: Scope, _: u64, _: &PresetId) -> Result<(), StoreError> {
            Err(StoreError::Poisoned)
        }
        async fn delete(&self, _: Scope, _: u64) -> Result<(), StoreError> {
            Err(StoreError::Poisoned)
        }
    }

    #[tokio::test]
    async fn store_failure_yields_fallback() {
        let resolver =
            PresetResolver::new(registry(), Arc::new(BrokenStore), PresetId::new("fallback"))
                .unwrap();
        assert_eq!(
            resolver.resolve(GuildId(1), UserId(2)).await.id.as_str(),
            "fallback"
        );
    }

    struct SlowStore;

    #[async_trait]
    impl PresetIdStore for SlowStore {
        async fn find(&self, _: Scope, _: u64) -> Result<PresetId, StoreError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(PresetId::new("user"))
        }
        async fn save(&self, _: Scope, _: u64, _: &PresetId) -> Result<(), StoreError> {
            Ok(())
        }
        async fn delete(&self, _: Scope, _: u64) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_lookups_time_out_to_fallback() {
        let resolver =
            PresetResolver::new(registry(), Arc::new(SlowStore), PresetId::new("fallback"))
                .unwrap()
                .with_lookup_timeout(Duration::from_millis(100));
        assert_eq!(
            resolver.resolve(GuildId(1), UserId(2)).await.id.as_str(),
            "fallback"
        );
    }
}
