//! Engine configuration.
//!
//! Every numeric policy of the engine (timeouts, retry counts, budgets,
//! worker counts) lives here rather than in the algorithms. Values come from
//! serde (any format the host application prefers) with `DRAFTFLOW_*`
//! environment overrides on top.

use crate::budget::BudgetConfig;
use crate::errors::ConfigError;
use crate::llm::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default model name.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Settings for the generation client and the call deduplicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Model name.
    pub model: String,
    /// Per-attempt provider timeout in seconds.
    pub timeout_s: u64,
    /// Total attempts per call (including the first).
    pub max_retries: u32,
    /// Whether call records are written and deduplication runs.
    pub cache_enabled: bool,
    /// Maximum combined prompt characters.
    pub max_chars_total: usize,
    /// First backoff delay.
    pub backoff_base_ms: u64,
    /// Backoff cap.
    pub backoff_cap_ms: u64,
    /// Lower jitter factor.
    pub jitter_min: f64,
    /// Upper jitter factor.
    pub jitter_max: f64,
    /// Poll interval while another caller holds the lock.
    pub poll_interval_ms: u64,
    /// Slack added to the lock timeout.
    pub lock_grace_s: u64,
    /// API key for the HTTP provider.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Base URL for the HTTP provider.
    pub base_url: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            timeout_s: 60,
            max_retries: 3,
            cache_enabled: true,
            max_chars_total: 100_000,
            backoff_base_ms: 500,
            backoff_cap_ms: 8_000,
            jitter_min: 0.8,
            jitter_max: 1.2,
            poll_interval_ms: 500,
            lock_grace_s: 30,
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }
}

impl LlmConfig {
    /// How long an `InProgress` record may go untouched before it is stale:
    /// long enough for every attempt to time out, plus grace.
    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(
            self.timeout_s
                .saturating_mul(u64::from(self.max_retries))
                .saturating_add(self.lock_grace_s),
        )
    }

    /// Poll interval as a duration.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Per-attempt timeout as a duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_s)
    }

    /// Retry policy derived from these settings.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new()
            .with_max_attempts(self.max_retries)
            .with_base_delay_ms(self.backoff_base_ms)
            .with_max_delay_ms(self.backoff_cap_ms)
            .with_jitter(self.jitter_min, self.jitter_max)
    }
}

/// Pipeline-level settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Profile used when a job does not name one.
    pub default_profile: String,
    /// Age after which a `Running` artifact is considered abandoned.
    pub artifact_stale_after_s: u64,
    /// TTL of per-document run locks.
    pub document_lock_ttl_s: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_profile: "default".to_string(),
            artifact_stale_after_s: 3600,
            document_lock_ttl_s: 600,
        }
    }
}

/// Worker pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Number of concurrent workers.
    pub workers: usize,
    /// Bounded queue capacity.
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            capacity: 64,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `draftflow=debug`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Generation client settings.
    pub llm: LlmConfig,
    /// Default request budget.
    pub budget: BudgetConfig,
    /// Pipeline settings.
    pub pipeline: PipelineConfig,
    /// Worker pool settings.
    pub queue: QueueConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Defaults overlaid with `DRAFTFLOW_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides from a variable lookup. Split out from
    /// [`from_env`](Self::from_env) so tests need not touch the process
    /// environment.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("DRAFTFLOW_MODEL") {
            self.llm.model = model;
        }
        if let Some(v) = lookup("DRAFTFLOW_TIMEOUT_S") {
            self.llm.timeout_s = parse_var("DRAFTFLOW_TIMEOUT_S", &v)?;
        }
        if let Some(v) = lookup("DRAFTFLOW_MAX_RETRIES") {
            self.llm.max_retries = parse_var("DRAFTFLOW_MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("DRAFTFLOW_CACHE_ENABLED") {
            self.llm.cache_enabled = parse_bool("DRAFTFLOW_CACHE_ENABLED", &v)?;
        }
        if let Some(key) = lookup("DRAFTFLOW_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(url) = lookup("DRAFTFLOW_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(level) = lookup("DRAFTFLOW_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(v) = lookup("DRAFTFLOW_LOG_JSON") {
            self.logging.json = parse_bool("DRAFTFLOW_LOG_JSON", &v)?;
        }
        if let Some(v) = lookup("DRAFTFLOW_WORKERS") {
            self.queue.workers = parse_var("DRAFTFLOW_WORKERS", &v)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::new("llm.model", "must not be empty"));
        }
        if self.llm.max_retries == 0 {
            return Err(ConfigError::new("llm.max_retries", "must be at least 1"));
        }
        if self.llm.timeout_s == 0 {
            return Err(ConfigError::new("llm.timeout_s", "must be positive"));
        }
        if !(self.llm.jitter_min > 0.0 && self.llm.jitter_min <= self.llm.jitter_max) {
            return Err(ConfigError::new(
                "llm.jitter_min",
                "must be positive and not exceed jitter_max",
            ));
        }
        if self.llm.backoff_base_ms > self.llm.backoff_cap_ms {
            return Err(ConfigError::new("llm.backoff_base_ms", "must not exceed backoff_cap_ms"));
        }
        if self.queue.workers == 0 {
            return Err(ConfigError::new("queue.workers", "must be at least 1"));
        }
        if self.queue.capacity == 0 {
            return Err(ConfigError::new("queue.capacity", "must be at least 1"));
        }
        self.budget.validate()
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::new(name, format!("cannot parse '{value}'")))
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::new(name, format!("expected a boolean, got '{value}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.max_retries, 3);
        assert_eq!(config.llm.lock_timeout(), Duration::from_secs(60 * 3 + 30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = EngineConfig::default()
            .with_overrides(lookup(&[
                ("DRAFTFLOW_MODEL", "gpt-4o"),
                ("DRAFTFLOW_MAX_RETRIES", "5"),
                ("DRAFTFLOW_CACHE_ENABLED", "off"),
                ("DRAFTFLOW_WORKERS", "2"),
            ]))
            .unwrap();

        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.llm.max_retries, 5);
        assert!(!config.llm.cache_enabled);
        assert_eq!(config.queue.workers, 2);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let err = EngineConfig::default()
            .with_overrides(lookup(&[("DRAFTFLOW_TIMEOUT_S", "soon")]))
            .unwrap_err();
        assert_eq!(err.field, "DRAFTFLOW_TIMEOUT_S");

        let err = EngineConfig::default()
            .with_overrides(lookup(&[("DRAFTFLOW_MAX_RETRIES", "0")]))
            .unwrap_err();
        assert_eq!(err.field, "llm.max_retries");
    }

    #[test]
    fn test_deserialize_partial() {
        let config: EngineConfig =
            serde_json::from_value(serde_json::json!({"llm": {"model": "gpt-4"}, "queue": {"workers": 8}}))
                .unwrap();
        assert_eq!(config.llm.model, "gpt-4");
        assert_eq!(config.llm.timeout_s, 60);
        assert_eq!(config.queue.workers, 8);
    }

    #[test]
    fn test_api_key_not_serialized() {
        let mut config = EngineConfig::default();
        config.llm.api_key = Some("secret".to_string());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
