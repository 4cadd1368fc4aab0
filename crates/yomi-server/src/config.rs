//! Bot configuration loading from file and environment variables.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use thiserror::Error;
use yomi_session::{Announcements, MessageRules, PersistenceConfig, SessionConfig};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub bot: BotConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub persistence: PersistenceSettings,

    #[serde(default)]
    pub engines: EnginesConfig,

    /// Presets by identifier, in identifier order.
    #[serde(default)]
    pub presets: BTreeMap<String, PresetConfig>,

    #[serde(default)]
    pub announcements: AnnouncementsConfig,

    #[serde(default)]
    pub transport: TransportConfig,
}

/// Network configuration for the HTTP control surface.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,

    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "yomi_session=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Session behavior.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Lease namespace. Processes sharing a database must use distinct ones.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    #[serde(default = "default_fallback_preset")]
    pub fallback_preset: String,

    #[serde(default = "default_task_queue_capacity")]
    pub task_queue_capacity: usize,

    #[serde(default = "default_audio_queue_multiplier")]
    pub audio_queue_multiplier: usize,

    #[serde(default = "default_synthesis_timeout_ms")]
    pub synthesis_timeout_ms: u64,

    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,

    #[serde(default = "default_open_timeout_ms")]
    pub open_timeout_ms: u64,

    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,
}

/// Synthesis cache.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_cache_ttl_seconds")]
    pub ttl_seconds: u64,

    #[serde(default = "default_cache_read_timeout_ms")]
    pub read_timeout_ms: u64,

    #[serde(default = "default_cache_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

/// Session lease persistence.
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_heartbeat_interval_seconds")]
    pub heartbeat_interval_seconds: u64,

    #[serde(default = "default_restore_timeout_seconds")]
    pub restore_timeout_seconds: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnginesConfig {
    pub espeak: Option<EspeakConfig>,
    pub google: Option<GoogleConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EspeakConfig {
    #[serde(default = "default_espeak_binary")]
    pub binary: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleConfig {
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_google_endpoint")]
    pub endpoint: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PresetConfig {
    pub engine: String,

    pub language: String,

    #[serde(default)]
    pub voice_name: String,

    #[serde(default = "default_speaking_rate")]
    pub speaking_rate: f64,
}

/// Spoken templates. Missing entries keep their defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnnouncementsConfig {
    pub launch: Option<String>,
    pub user_join: Option<String>,
    pub user_leave: Option<String>,
    pub attachments: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// Directory receiving one raw PCM file per voice channel.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3000
}

fn default_db_path() -> String {
    "yomi.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_fallback_preset() -> String {
    "default".to_string()
}

fn default_task_queue_capacity() -> usize {
    32
}

fn default_audio_queue_multiplier() -> usize {
    3
}

fn default_synthesis_timeout_ms() -> u64 {
    10_000
}

fn default_max_message_chars() -> usize {
    yomi_session::message::DEFAULT_MAX_MESSAGE_CHARS
}

fn default_open_timeout_ms() -> u64 {
    10_000
}

fn default_close_timeout_ms() -> u64 {
    5_000
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl_seconds() -> u64 {
    24 * 60 * 60
}

fn default_cache_read_timeout_ms() -> u64 {
    1_000
}

fn default_cache_write_timeout_ms() -> u64 {
    3_000
}

fn default_heartbeat_interval_seconds() -> u64 {
    30
}

fn default_restore_timeout_seconds() -> u64 {
    30
}

fn default_espeak_binary() -> String {
    "espeak-ng".to_string()
}

fn default_google_endpoint() -> String {
    yomi_tts::google::DEFAULT_ENDPOINT.to_string()
}

fn default_speaking_rate() -> f64 {
    1.0
}

fn default_output_dir() -> String {
    "voice-out".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            fallback_preset: default_fallback_preset(),
            task_queue_capacity: default_task_queue_capacity(),
            audio_queue_multiplier: default_audio_queue_multiplier(),
            synthesis_timeout_ms: default_synthesis_timeout_ms(),
            max_message_chars: default_max_message_chars(),
            open_timeout_ms: default_open_timeout_ms(),
            close_timeout_ms: default_close_timeout_ms(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: default_cache_ttl_seconds(),
            read_timeout_ms: default_cache_read_timeout_ms(),
            write_timeout_ms: default_cache_write_timeout_ms(),
        }
    }
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            heartbeat_interval_seconds: default_heartbeat_interval_seconds(),
            restore_timeout_seconds: default_restore_timeout_seconds(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

impl BotConfig {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            task_queue_capacity: self.task_queue_capacity,
            audio_queue_multiplier: self.audio_queue_multiplier,
            synthesis_timeout: Duration::from_millis(self.synthesis_timeout_ms),
            close_timeout: Duration::from_millis(self.close_timeout_ms),
        }
    }

    pub fn message_rules(&self) -> MessageRules {
        MessageRules {
            max_chars: self.max_message_chars,
            ..MessageRules::default()
        }
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }
}

impl AnnouncementsConfig {
    pub fn resolve(&self) -> Announcements {
        let defaults = Announcements::default();
        Announcements {
            launch: self.launch.clone().unwrap_or(defaults.launch),
            user_join: self.user_join.clone().unwrap_or(defaults.user_join),
            user_leave: self.user_leave.clone().unwrap_or(defaults.user_leave),
            attachments: self.attachments.clone().unwrap_or(defaults.attachments),
        }
    }
}

impl Config {
    pub fn persistence_config(&self) -> PersistenceConfig {
        PersistenceConfig {
            namespace: self.bot.namespace.clone(),
            heartbeat_interval: Duration::from_secs(self.persistence.heartbeat_interval_seconds),
            restore_timeout: Duration::from_secs(self.persistence.restore_timeout_seconds),
            ..PersistenceConfig::default()
        }
    }

    /// Checks the settings that cannot be fixed up with a default.
    ///
    /// Preset and engine cross-references are checked when the registries
    /// are built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot.task_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "bot.task_queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.bot.audio_queue_multiplier == 0 {
            return Err(ConfigError::Invalid(
                "bot.audio_queue_multiplier must be at least 1".to_string(),
            ));
        }
        if self.bot.namespace.is_empty() || self.bot.namespace.contains(':') {
            return Err(ConfigError::Invalid(
                "bot.namespace must be non-empty and must not contain ':'".to_string(),
            ));
        }
        if self.persistence.enabled && self.persistence.heartbeat_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "persistence.heartbeat_interval_seconds must be at least 1".to_string(),
            ));
        }
        if let Some(google) = &self.engines.google {
            if google.endpoint.contains("/v1/") {
                return Err(ConfigError::Invalid(format!(
                    "engines.google.endpoint {:?} must be the base URL without the /v1 path",
                    google.endpoint
                )));
            }
        }
        if !self.presets.contains_key(&self.bot.fallback_preset) {
            return Err(ConfigError::Invalid(format!(
                "bot.fallback_preset {:?} is not defined under [presets]",
                self.bot.fallback_preset
            )));
        }
        Ok(())
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `YOMI_HOST` overrides `server.host`
/// - `YOMI_PORT` overrides `server.port`
/// - `YOMI_DB_PATH` overrides `database.path`
/// - `YOMI_LOG_LEVEL` overrides `logging.level`
/// - `YOMI_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `YOMI_NAMESPACE` overrides `bot.namespace`
/// - `YOMI_GOOGLE_API_KEY` overrides `engines.google.api_key`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(host) = var("YOMI_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = var("YOMI_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(db_path) = var("YOMI_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(level) = var("YOMI_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("YOMI_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(namespace) = var("YOMI_NAMESPACE") {
        config.bot.namespace = namespace;
    }
    if let Some(api_key) = var("YOMI_GOOGLE_API_KEY") {
        config
            .engines
            .google
            .get_or_insert_with(|| GoogleConfig {
                api_key: String::new(),
                endpoint: default_google_endpoint(),
            })
            .api_key = api_key;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
[bot]
fallback_preset = "ja"
task_queue_capacity = 8

[engines.espeak]
binary = "/usr/bin/espeak-ng"

[presets.ja]
engine = "espeak"
language = "ja"

[presets.en]
engine = "google"
language = "en-US"
voice_name = "en-US-Standard-A"
speaking_rate = 1.25

[announcements]
user_join = "{name} is here"
"#;

    #[test]
    fn parses_sections_and_keeps_defaults() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        assert_eq!(config.bot.fallback_preset, "ja");
        assert_eq!(config.bot.task_queue_capacity, 8);
        assert_eq!(config.bot.audio_queue_multiplier, 3);
        assert_eq!(config.server.port, 3000);
        assert_eq!(
            config.engines.espeak.as_ref().unwrap().binary,
            "/usr/bin/espeak-ng"
        );
        assert!(config.engines.google.is_none());
        assert_eq!(config.presets.len(), 2);
        assert_eq!(config.presets["en"].speaking_rate, 1.25);
        assert_eq!(config.presets["ja"].speaking_rate, 1.0);

        let announcements = config.announcements.resolve();
        assert_eq!(announcements.user_join, "{name} is here");
        assert_eq!(announcements.user_leave, Announcements::default().user_leave);
        config.validate().unwrap();
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = load_config(path.to_str()).unwrap();
        assert_eq!(config.bot.namespace, "default");
        assert!(config.cache.enabled);
    }

    #[test]
    fn environment_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            ("YOMI_PORT", "9000"),
            ("YOMI_LOG_JSON", "1"),
            ("YOMI_NAMESPACE", "staging"),
            ("YOMI_GOOGLE_API_KEY", "secret"),
            ("YOMI_HOST", "not an ip"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        apply_env_overrides(&mut config, |k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.server.port, 9000);
        assert!(config.logging.json);
        assert_eq!(config.bot.namespace, "staging");
        assert_eq!(config.engines.google.unwrap().api_key, "secret");
        assert_eq!(config.server.host, default_host());
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config: Config = toml::from_str(SAMPLE).unwrap();
        config.bot.audio_queue_multiplier = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config: Config = toml::from_str(SAMPLE).unwrap();
        config.bot.fallback_preset = "missing".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config: Config = toml::from_str(SAMPLE).unwrap();
        config.bot.namespace = "a:b".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config: Config = toml::from_str(SAMPLE).unwrap();
        config.engines.google = Some(GoogleConfig {
            api_key: "secret".to_string(),
            endpoint: "https://texttospeech.googleapis.com/v1/text:synthesize".to_string(),
        });
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn shipped_config_with_google_enabled_is_valid() {
        let shipped = include_str!("../../../config.toml");
        let enabled = shipped
            .replace("# [engines.google]", "[engines.google]")
            .replace("# endpoint = ", "endpoint = ");
        assert_ne!(enabled, shipped);

        let config: Config = toml::from_str(&enabled).unwrap();
        let google = config.engines.google.as_ref().unwrap();
        assert_eq!(google.endpoint, default_google_endpoint());
        assert_eq!(config.cache.read_timeout_ms, 1_000);
        config.validate().unwrap();
    }
}
