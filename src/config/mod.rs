//! Engine configuration: worker pool sizing, per-source rate limits and
//! circuit breaker thresholds, cache location, and adapter options.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::utils::{CircuitBreakerConfig, RateLimitConfig};

const TEST_MODE_ENV_VAR: &str = "LITREVIEW_TEST_MODE";
const ENV_PREFIX: &str = "LITREVIEW";

/// The recognized adapter options named by the external interface: page
/// size, per-request timeout, credential, polite-pool contact, and a
/// per-source override of the project-wide retry cap. Deliberately strict
/// about unknown keys so a typo in a config file fails loudly instead of
/// being silently ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdapterConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub polite_email: Option<String>,

    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            timeout_seconds: default_timeout_seconds(),
            api_key: None,
            polite_email: None,
            max_retries: None,
        }
    }
}

impl AdapterConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

fn default_page_size() -> usize {
    50
}

fn default_timeout_seconds() -> u64 {
    30
}

/// Cache configuration: location of the resumable SQLite store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

impl CacheConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(default_cache_path)
    }
}

/// Default cache database location, following the teacher's platform-dir
/// resolution for its on-disk cache.
pub fn default_cache_path() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Caches")
                .join("litreview-engine")
                .join("cache.sqlite3");
        }
    }

    #[cfg(target_os = "linux")]
    {
        if let Ok(xdg_cache) = std::env::var("XDG_CACHE_HOME") {
            return PathBuf::from(xdg_cache).join("litreview-engine").join("cache.sqlite3");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join(".cache")
                .join("litreview-engine")
                .join("cache.sqlite3");
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("LOCALAPPDATA") {
            return PathBuf::from(appdata).join("litreview-engine").join("cache.sqlite3");
        }
    }

    PathBuf::from(".litreview-cache.sqlite3")
}

/// Worker pool sizing and the project-wide retry cap, overridable per
/// adapter via `AdapterConfig::max_retries`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_worker_count() -> usize {
    3
}

fn default_max_retries() -> u32 {
    5
}

/// Top-level engine configuration: worker pool, cache, and the three
/// per-source maps (adapter options, rate limits, circuit breaker
/// thresholds), all keyed by source id ("arxiv", "openalex", ...).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub workers: WorkerConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub adapters: HashMap<String, AdapterConfig>,

    #[serde(default)]
    pub rate_limits: HashMap<String, RateLimitConfig>,

    #[serde(default)]
    pub breakers: HashMap<String, CircuitBreakerConfig>,
}

impl EngineConfig {
    fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(count) = std::env::var(format!("{ENV_PREFIX}_WORKER_COUNT")) {
            if let Ok(n) = count.parse() {
                config.workers.worker_count = n;
            }
        }
        if let Ok(key) = std::env::var("SEMANTIC_SCHOLAR_API_KEY") {
            config.adapters.entry("semantic".to_string()).or_default().api_key = Some(key);
        }
        config
    }

    /// Effective adapter options for a source, falling back to defaults.
    pub fn adapter(&self, source_id: &str) -> AdapterConfig {
        self.adapters.get(source_id).cloned().unwrap_or_default()
    }

    /// Effective per-page retry cap for a source: its own override if set,
    /// else the project-wide worker default.
    pub fn max_retries_for(&self, source_id: &str) -> u32 {
        self.adapter(source_id).max_retries.unwrap_or(self.workers.max_retries)
    }

    /// Effective rate limit settings for a source: an explicit override if
    /// set, else the well-known per-source default (each upstream API
    /// publishes its own rate limit, so "1 req/s" is the wrong fallback for
    /// all but the most conservative source).
    pub fn rate_limit_for(&self, source_id: &str) -> RateLimitConfig {
        self.rate_limits.get(source_id).copied().unwrap_or_else(|| default_rate_limit_for(source_id))
    }

    /// Effective circuit breaker settings for a source, falling back to defaults.
    pub fn breaker_for(&self, source_id: &str) -> CircuitBreakerConfig {
        self.breakers.get(source_id).cloned().unwrap_or_default()
    }
}

/// Published rate limits for the four contractual sources, per the external
/// interface table: OpenAlex's polite pool, Semantic Scholar's unauthenticated
/// tier, arXiv's requested 1-per-3s pace, and CrossRef's polite pool.
fn default_rate_limit_for(source_id: &str) -> RateLimitConfig {
    match source_id {
        "openalex" => RateLimitConfig { refill_per_sec: 10.0, burst: 15.0 },
        "semantic" => RateLimitConfig { refill_per_sec: 1.0, burst: 3.0 },
        "arxiv" => RateLimitConfig { refill_per_sec: 0.33, burst: 1.0 },
        "crossref" => RateLimitConfig { refill_per_sec: 50.0, burst: 100.0 },
        _ => RateLimitConfig::default(),
    }
}

/// Load configuration from a TOML file, layered with `LITREVIEW_*` environment variables.
pub fn load_config(path: &std::path::Path) -> Result<EngineConfig, config::ConfigError> {
    if std::env::var(TEST_MODE_ENV_VAR).map(|v| v.eq_ignore_ascii_case("true")).unwrap_or(false) {
        return Ok(EngineConfig::default());
    }

    let settings = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;

    settings.try_deserialize()
}

/// Get the configuration from environment variables and defaults, without
/// requiring a config file.
pub fn get_config() -> EngineConfig {
    if std::env::var(TEST_MODE_ENV_VAR).map(|v| v.eq_ignore_ascii_case("true")).unwrap_or(false) {
        EngineConfig::default()
    } else {
        EngineConfig::from_env()
    }
}

/// Search default locations for a config file, teacher-style.
pub fn find_config_file() -> Option<PathBuf> {
    let path = PathBuf::from("litreview-engine.toml");
    if path.exists() {
        return Some(path);
    }

    let path = PathBuf::from(".litreview-engine.toml");
    if path.exists() {
        return Some(path);
    }

    if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_home).join("litreview-engine").join("config.toml");
        if path.exists() {
            return Some(path);
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        let path = PathBuf::from(home).join(".config").join("litreview-engine").join("config.toml");
        if path.exists() {
            return Some(path);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_engine_config() {
        let config = EngineConfig::default();
        assert_eq!(config.workers.worker_count, 3);
        assert_eq!(config.workers.max_retries, 5);
        assert!(config.cache.enabled);
    }

    #[test]
    fn test_adapter_falls_back_to_default_when_unconfigured() {
        let config = EngineConfig::default();
        let adapter = config.adapter("arxiv");
        assert_eq!(adapter.page_size, 50);
        assert_eq!(adapter.timeout_seconds, 30);
        assert_eq!(config.max_retries_for("arxiv"), 5);
    }

    #[test]
    fn test_adapter_returns_configured_values() {
        let mut config = EngineConfig::default();
        config.adapters.insert(
            "semantic".to_string(),
            AdapterConfig {
                page_size: 20,
                timeout_seconds: 15,
                api_key: Some("secret".to_string()),
                polite_email: Some("reviewer@example.org".to_string()),
                max_retries: Some(2),
            },
        );
        let adapter = config.adapter("semantic");
        assert_eq!(adapter.api_key.as_deref(), Some("secret"));
        assert_eq!(adapter.page_size, 20);
        assert_eq!(config.max_retries_for("semantic"), 2);
    }

    #[test]
    fn test_rate_limit_falls_back_to_per_source_default() {
        let config = EngineConfig::default();
        let arxiv = config.rate_limit_for("arxiv");
        assert_eq!(arxiv.refill_per_sec, 0.33);
        assert_eq!(arxiv.burst, 1.0);

        let openalex = config.rate_limit_for("openalex");
        assert_eq!(openalex.refill_per_sec, 10.0);
        assert_eq!(openalex.burst, 15.0);

        let unknown = config.rate_limit_for("unknown-source");
        assert_eq!(unknown.refill_per_sec, 1.0);
    }

    #[test]
    fn test_breaker_falls_back_to_default() {
        let config = EngineConfig::default();
        let breaker = config.breaker_for("arxiv");
        assert_eq!(breaker.failure_threshold, 5);
    }
}
