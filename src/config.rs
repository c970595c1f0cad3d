//! Configuration management for chatroute
//!
//! Parses TOML configuration files and provides typed access to settings.
//! All sections carry serde defaults, so a minimal config only needs the
//! collaborator URLs.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
    #[serde(default)]
    pub implicit: ImplicitConfig,
    pub agents: AgentsConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&raw)
            .map_err(|e| AppError::Config(format!("failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// A complete configuration with placeholder collaborator URLs
    ///
    /// Printed by `chatroute config-template` as a starting point; the URLs
    /// must be replaced before the result validates against live services.
    pub fn template() -> Self {
        Self {
            server: ServerConfig::default(),
            cache: CacheConfig::default(),
            classifier: ClassifierConfig::default(),
            feedback: FeedbackConfig::default(),
            implicit: ImplicitConfig::default(),
            agents: AgentsConfig {
                arbiter_url: "http://localhost:4000/arbiter".to_string(),
                conversation_url: "http://localhost:4000/conversation".to_string(),
                knowledge_url: "http://localhost:4000/knowledge".to_string(),
                market_data_url: "http://localhost:4000/market-data".to_string(),
            },
            observability: ObservabilityConfig::default(),
        }
    }

    /// Validate cross-field invariants that serde defaults cannot enforce
    pub fn validate(&self) -> AppResult<()> {
        if self.cache.ttl_seconds == 0 {
            return Err(AppError::Config(
                "cache.ttl_seconds must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.classifier.learning_rate)
            || self.classifier.learning_rate == 0.0
        {
            return Err(AppError::Config(format!(
                "classifier.learning_rate must be in (0.0, 1.0], got {}",
                self.classifier.learning_rate
            )));
        }
        if self.feedback.history_capacity == 0 {
            return Err(AppError::Config(
                "feedback.history_capacity must be greater than 0".to_string(),
            ));
        }
        for (name, url) in [
            ("agents.arbiter_url", &self.agents.arbiter_url),
            ("agents.conversation_url", &self.agents.conversation_url),
            ("agents.knowledge_url", &self.agents.knowledge_url),
            ("agents.market_data_url", &self.agents.market_data_url),
        ] {
            if url.trim().is_empty() {
                return Err(AppError::Config(format!("{} must not be empty", name)));
            }
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bound on a single generator dispatch; expiry is a caught per-item
    /// failure, not a stalled queue
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3008
}

fn default_request_timeout() -> u64 {
    30
}

/// Cache backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    File,
}

/// Response cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,
    /// Directory for the file backend
    #[serde(default = "default_cache_dir")]
    pub dir: String,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            ttl_seconds: default_cache_ttl(),
            dir: default_cache_dir(),
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_cache_dir() -> String {
    "./cache".to_string()
}

fn default_sweep_interval() -> u64 {
    60
}

/// Classifier tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClassifierConfig {
    /// Weight delta applied per learning event
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Messages shorter than this (normalized) classify as conversation
    /// without scoring
    #[serde(default = "default_trivial_max_chars")]
    pub trivial_max_chars: usize,
    /// Messages shorter than this never escalate to arbitration
    #[serde(default = "default_no_escalation_under_chars")]
    pub no_escalation_under_chars: usize,
    /// Low-confidence messages longer than this escalate
    #[serde(default = "default_escalate_low_over_chars")]
    pub escalate_low_over_chars: usize,
    /// Medium-confidence messages longer than this escalate
    #[serde(default = "default_escalate_medium_over_chars")]
    pub escalate_medium_over_chars: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            learning_rate: default_learning_rate(),
            trivial_max_chars: default_trivial_max_chars(),
            no_escalation_under_chars: default_no_escalation_under_chars(),
            escalate_low_over_chars: default_escalate_low_over_chars(),
            escalate_medium_over_chars: default_escalate_medium_over_chars(),
        }
    }
}

fn default_learning_rate() -> f64 {
    0.1
}

fn default_trivial_max_chars() -> usize {
    5
}

fn default_no_escalation_under_chars() -> usize {
    20
}

fn default_escalate_low_over_chars() -> usize {
    100
}

fn default_escalate_medium_over_chars() -> usize {
    50
}

/// Explicit-feedback configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedbackConfig {
    /// How long a served response stays eligible for an explicit rating
    #[serde(default = "default_pending_ttl")]
    pub pending_ttl_seconds: u64,
    /// Bounded history size; oldest records evicted past this
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

impl FeedbackConfig {
    pub fn pending_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_ttl_seconds)
    }
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            pending_ttl_seconds: default_pending_ttl(),
            history_capacity: default_history_capacity(),
        }
    }
}

fn default_pending_ttl() -> u64 {
    300
}

fn default_history_capacity() -> usize {
    1000
}

/// Implicit-feedback configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImplicitConfig {
    /// Contexts older than this are never attributed to a new message
    #[serde(default = "default_staleness")]
    pub staleness_seconds: u64,
    /// Contexts idle beyond this are removed by the periodic sweep
    #[serde(default = "default_idle_cleanup")]
    pub idle_cleanup_seconds: u64,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
}

impl ImplicitConfig {
    pub fn staleness(&self) -> Duration {
        Duration::from_secs(self.staleness_seconds)
    }

    pub fn idle_cleanup(&self) -> Duration {
        Duration::from_secs(self.idle_cleanup_seconds)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds)
    }
}

impl Default for ImplicitConfig {
    fn default() -> Self {
        Self {
            staleness_seconds: default_staleness(),
            idle_cleanup_seconds: default_idle_cleanup(),
            cleanup_interval_seconds: default_cleanup_interval(),
        }
    }
}

fn default_staleness() -> u64 {
    300
}

fn default_idle_cleanup() -> u64 {
    600
}

fn default_cleanup_interval() -> u64 {
    60
}

/// External collaborator endpoints
///
/// One arbiter plus one generator per route. These are plain request/response
/// HTTP services; the pipeline only needs "free text in, free text out".
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentsConfig {
    pub arbiter_url: String,
    pub conversation_url: String,
    pub knowledge_url: String,
    pub market_data_url: String,
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
