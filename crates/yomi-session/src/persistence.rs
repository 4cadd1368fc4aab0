//! Session leases.
//!
//! Every live session is mirrored into the key-value store under
//! `session:{namespace}:{voice_channel_id}` with a TTL of three heartbeat
//! intervals. A heartbeat rewrites the tracked leases, so a lease outlives
//! its process by at most one TTL. On boot [`SessionPersistence::restore`]
//! rebuilds the sessions whose leases are still present.

use crate::error::PersistenceError;
use crate::router::{SessionObserver, SessionRouter};
use crate::session::Session;
use crate::state::SessionState;
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use yomi_db::KvStore;
use yomi_types::ChannelId;

pub fn session_key(namespace: &str, voice_channel: ChannelId) -> String {
    format!("session:{namespace}:{voice_channel}")
}

fn namespace_prefix(namespace: &str) -> String {
    format!("session:{namespace}:")
}

#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    pub namespace: String,
    pub heartbeat_interval: Duration,
    pub write_timeout: Duration,
    pub restore_timeout: Duration,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            heartbeat_interval: Duration::from_secs(30),
            write_timeout: Duration::from_secs(5),
            restore_timeout: Duration::from_secs(30),
        }
    }
}

/// Outcome counts of a restore pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub restored: usize,
    pub failed: usize,
    /// Undecodable records, left to expire.
    pub skipped: usize,
}

// A lease as last announced by the router. The generation changes every
// time the voice channel is added again.
#[derive(Debug, Clone, Copy)]
struct Tracked {
    generation: u64,
    state: SessionState,
}

pub struct SessionPersistence {
    store: Arc<dyn KvStore>,
    config: PersistenceConfig,
    tracked: Mutex<HashMap<ChannelId, Tracked>>,
    generation: AtomicU64,
    runtime: Handle,
}

impl SessionPersistence {
    /// Must be called from within a tokio runtime; observer callbacks spawn
    /// their writes onto it.
    pub fn new(store: Arc<dyn KvStore>, config: PersistenceConfig) -> Result<Self, PersistenceError> {
        let runtime = Handle::try_current().map_err(|_| PersistenceError::NoRuntime)?;
        Ok(Self {
            store,
            config,
            tracked: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            runtime,
        })
    }

    pub fn ttl(&self) -> Duration {
        self.config.heartbeat_interval * 3
    }

    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    /// Leases currently kept alive by the heartbeat.
    pub fn tracked(&self) -> Vec<SessionState> {
        let mut states: Vec<_> = self
            .tracked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|t| t.state)
            .collect();
        states.sort_by_key(|s| s.voice_channel_id);
        states
    }

    fn current(&self, voice_channel: ChannelId) -> Option<Tracked> {
        self.tracked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&voice_channel)
            .copied()
    }

    fn key(&self, voice_channel: ChannelId) -> String {
        session_key(&self.config.namespace, voice_channel)
    }

    /// Writes one lease under the write timeout.
    pub async fn persist(&self, state: &SessionState) -> Result<(), PersistenceError> {
        write_lease(
            Arc::clone(&self.store),
            self.key(state.voice_channel_id),
            *state,
            self.ttl(),
            self.config.write_timeout,
        )
        .await
    }

    /// Rewrites every tracked lease. Returns how many writes succeeded.
    ///
    /// A session deleted while its renewal is in flight has its lease
    /// removed again once the write lands, and one re-added meanwhile gets
    /// its newer state written back.
    pub async fn renew_all(&self) -> usize {
        let snapshot: Vec<Tracked> = self
            .tracked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .copied()
            .collect();

        let mut renewed = 0;
        for lease in snapshot {
            let voice = lease.state.voice_channel_id;
            if self.current(voice).map(|t| t.generation) != Some(lease.generation) {
                continue;
            }
            let result = self.persist(&lease.state).await;

            match self.current(voice) {
                Some(now) if now.generation == lease.generation => match result {
                    Ok(()) => renewed += 1,
                    Err(e) => tracing::warn!(
                        voice_channel_id = %voice,
                        error = %e,
                        "failed to renew session lease"
                    ),
                },
                Some(now) => {
                    if let Err(e) = self.persist(&now.state).await {
                        tracing::warn!(
                            voice_channel_id = %voice,
                            error = %e,
                            "failed to rewrite replaced session lease"
                        );
                    }
                }
                None => {
                    tracing::debug!(voice_channel_id = %voice, "session deleted during renewal");
                    delete_lease(Arc::clone(&self.store), self.key(voice), self.config.write_timeout)
                        .await;
                }
            }
        }
        renewed
    }

    /// Renews leases every heartbeat interval until `shutdown` fires.
    pub fn start_heartbeat(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let interval = this.config.heartbeat_interval;
            tracing::info!(
                interval_seconds = interval.as_secs(),
                namespace = %this.config.namespace,
                "starting session lease heartbeat"
            );
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.wait_for(|stop| *stop) => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                let renewed = this.renew_all().await;
                tracing::debug!(renewed, "session leases renewed");
            }
        })
    }

    /// Rebuilds every session with a live lease in this namespace.
    ///
    /// Each lease is restored on its own task under the restore timeout, so
    /// one slow or failing session does not hold back the rest. Restored
    /// sessions are added to `router`, which re-announces them to every
    /// observer.
    pub async fn restore<F, Fut, E>(&self, router: &SessionRouter, restore_fn: F) -> RestoreSummary
    where
        F: Fn(SessionState) -> Fut,
        Fut: Future<Output = Result<Arc<Session>, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let mut summary = RestoreSummary::default();
        let prefix = namespace_prefix(&self.config.namespace);
        let entries = match tokio::time::timeout(
            self.config.restore_timeout,
            self.store.scan_prefix(&prefix),
        )
        .await
        {
            Ok(Ok(entries)) => entries,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "failed to scan session leases");
                return summary;
            }
            Err(_) => {
                tracing::error!("timed out scanning session leases");
                return summary;
            }
        };

        let mut tasks = JoinSet::new();
        for (key, value) in entries {
            let state = match SessionState::decode(&value) {
                Ok(state) => state,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "skipping invalid session lease");
                    summary.skipped += 1;
                    continue;
                }
            };
            let restore_timeout = self.config.restore_timeout;
            let fut = restore_fn(state);
            tasks.spawn(async move { (state, tokio::time::timeout(restore_timeout, fut).await) });
        }

        while let Some(joined) = tasks.join_next().await {
            let (state, outcome) = match joined {
                Ok(done) => done,
                Err(e) => {
                    tracing::error!(error = %e, "session restore task panicked");
                    summary.failed += 1;
                    continue;
                }
            };
            match outcome {
                Ok(Ok(session)) => match router.add(Arc::clone(&session)) {
                    Ok(()) => {
                        tracing::info!(
                            guild_id = %state.guild_id,
                            voice_channel_id = %state.voice_channel_id,
                            reading_channel_id = %state.reading_channel_id,
                            "session restored"
                        );
                        summary.restored += 1;
                    }
                    Err(e) => {
                        tracing::error!(
                            voice_channel_id = %state.voice_channel_id,
                            error = %e,
                            "restored session conflicts with a live one"
                        );
                        let _ = session.close().await;
                        summary.failed += 1;
                    }
                },
                Ok(Err(e)) => {
                    tracing::error!(
                        guild_id = %state.guild_id,
                        voice_channel_id = %state.voice_channel_id,
                        error = %e,
                        "failed to restore session"
                    );
                    summary.failed += 1;
                }
                Err(_) => {
                    tracing::error!(
                        guild_id = %state.guild_id,
                        voice_channel_id = %state.voice_channel_id,
                        "timed out restoring session"
                    );
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            restored = summary.restored,
            failed = summary.failed,
            skipped = summary.skipped,
            "session restore complete"
        );
        summary
    }
}

async fn write_lease(
    store: Arc<dyn KvStore>,
    key: String,
    state: SessionState,
    ttl: Duration,
    timeout: Duration,
) -> Result<(), PersistenceError> {
    match tokio::time::timeout(timeout, store.set(&key, &state.encode(), Some(ttl))).await {
        Ok(result) => result.map_err(PersistenceError::from),
        Err(_) => Err(PersistenceError::Timeout),
    }
}

async fn delete_lease(store: Arc<dyn KvStore>, key: String, timeout: Duration) {
    match tokio::time::timeout(timeout, store.delete(&key)).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => tracing::warn!(key = %key, error = %e, "failed to delete session lease"),
        Err(_) => tracing::warn!(key = %key, "timed out deleting session lease"),
    }
}

impl SessionObserver for SessionPersistence {
    fn on_created(&self, state: &SessionState) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        self.tracked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                state.voice_channel_id,
                Tracked {
                    generation,
                    state: *state,
                },
            );

        let store = Arc::clone(&self.store);
        let key = self.key(state.voice_channel_id);
        let (state, ttl, timeout) = (*state, self.ttl(), self.config.write_timeout);
        self.runtime.spawn(async move {
            if let Err(e) = write_lease(store, key, state, ttl, timeout).await {
                tracing::warn!(
                    voice_channel_id = %state.voice_channel_id,
                    error = %e,
                    "failed to persist session lease"
                );
            }
        });
    }

    fn on_deleted(&self, state: &SessionState) {
        self.tracked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&state.voice_channel_id);

        self.runtime.spawn(delete_lease(
            Arc::clone(&self.store),
            self.key(state.voice_channel_id),
            self.config.write_timeout,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        assert_eq!(session_key("prod", ChannelId(42)), "session:prod:42");
        assert_eq!(namespace_prefix("prod"), "session:prod:");
    }

    #[test]
    fn ttl_is_three_heartbeats() {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let _guard = rt.enter();
        let persistence = SessionPersistence::new(
            Arc::new(yomi_db::MemoryKvStore::new()),
            PersistenceConfig {
                heartbeat_interval: Duration::from_secs(10),
                ..PersistenceConfig::default()
            },
        )
        .unwrap();
        assert_eq!(persistence.ttl(), Duration::from_secs(30));
    }

    #[test]
    fn requires_a_runtime() {
        let result = SessionPersistence::new(
            Arc::new(yomi_db::MemoryKvStore::new()),
            PersistenceConfig::default(),
        );
        assert!(matches!(result, Err(PersistenceError::NoRuntime)));
    }
}
