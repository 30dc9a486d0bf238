//! Configuration for the router.
//!
//! Loaded from a TOML file; every key has a default so an empty file (or no
//! file at all) gives a working router.
//!
//! ```toml
//! max_concurrent_steps = 4
//! step_timeout_ms = 30000
//! load_timeout_ms = 60000
//! session_idle_ms = 1800000
//! disabled_agents = ["imaging"]
//!
//! [routing]
//! diagnose_fanout = "on_entity"
//! default_synthetic_count = 1
//! ```

use medorch_common::{Result, RouterError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable with comma-separated agent ids to disable.
pub const DISABLED_AGENTS_ENV: &str = "MEDORCH_DISABLED_AGENTS";

/// Main router configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Upper bound on steps running at once inside one tier
    #[serde(default = "default_max_concurrent_steps")]
    pub max_concurrent_steps: usize,

    /// Per-step invocation timeout in milliseconds
    #[serde(default = "default_step_timeout_ms")]
    pub step_timeout_ms: u64,

    /// Upper bound on a single agent load in milliseconds
    #[serde(default = "default_load_timeout_ms")]
    pub load_timeout_ms: u64,

    /// Sessions untouched for this long are dropped, in milliseconds
    #[serde(default = "default_session_idle_ms")]
    pub session_idle_ms: u64,

    /// Agents that always resolve as unavailable without being loaded
    #[serde(default)]
    pub disabled_agents: Vec<String>,

    /// Routing table knobs
    #[serde(default)]
    pub routing: RoutingConfig,
}

/// When `diagnose` fans out to imaging and genomics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanoutPolicy {
    /// Only when the matching entity is present in the request
    #[default]
    OnEntity,
    /// Always; a missing entity then shows up as a missing-input step
    Always,
    /// Never
    Never,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default)]
    pub diagnose_fanout: FanoutPolicy,

    /// Patients generated when a synthesize request names no count
    #[serde(default = "default_synthetic_count")]
    pub default_synthetic_count: u64,
}

fn default_max_concurrent_steps() -> usize {
    4
}

fn default_step_timeout_ms() -> u64 {
    30_000
}

fn default_load_timeout_ms() -> u64 {
    60_000
}

fn default_session_idle_ms() -> u64 {
    30 * 60 * 1000
}

fn default_synthetic_count() -> u64 {
    1
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            diagnose_fanout: FanoutPolicy::default(),
            default_synthetic_count: default_synthetic_count(),
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_concurrent_steps: default_max_concurrent_steps(),
            step_timeout_ms: default_step_timeout_ms(),
            load_timeout_ms: default_load_timeout_ms(),
            session_idle_ms: default_session_idle_ms(),
            disabled_agents: Vec::new(),
            routing: RoutingConfig::default(),
        }
    }
}

impl RouterConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content).map_err(|e| match e {
            RouterError::Config(msg) => {
                RouterError::Config(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })?;
        info!(path = %path.display(), "Loaded router configuration");
        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| RouterError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the executor cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_steps == 0 {
            return Err(RouterError::Config(
                "max_concurrent_steps must be at least 1".into(),
            ));
        }
        if self.step_timeout_ms == 0 {
            return Err(RouterError::Config(
                "step_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.load_timeout_ms == 0 {
            return Err(RouterError::Config(
                "load_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.session_idle_ms == 0 {
            return Err(RouterError::Config(
                "session_idle_ms must be greater than 0".into(),
            ));
        }
        if self.routing.default_synthetic_count == 0 {
            return Err(RouterError::Config(
                "routing.default_synthetic_count must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Merge agent ids from [`DISABLED_AGENTS_ENV`] into `disabled_agents`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(value) = std::env::var(DISABLED_AGENTS_ENV) {
            self.merge_disabled(&value);
        }
        self
    }

    fn merge_disabled(&mut self, list: &str) {
        for id in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if !self.disabled_agents.iter().any(|d| d == id) {
                warn!(agent = %id, "Agent disabled by environment");
                self.disabled_agents.push(id.to_string());
            }
        }
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    pub fn session_idle(&self) -> Duration {
        Duration::from_millis(self.session_idle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = RouterConfig::from_toml("").unwrap();
        assert_eq!(config, RouterConfig::default());
        assert_eq!(config.step_timeout(), Duration::from_secs(30));
        assert_eq!(config.load_timeout(), Duration::from_secs(60));
        assert_eq!(config.session_idle(), Duration::from_secs(1800));
    }

    #[test]
    fn test_full_document() {
        let config = RouterConfig::from_toml(
            r#"
            max_concurrent_steps = 2
            step_timeout_ms = 500
            disabled_agents = ["imaging"]

            [routing]
            diagnose_fanout = "always"
            default_synthetic_count = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.max_concurrent_steps, 2);
        assert_eq!(config.step_timeout_ms, 500);
        assert_eq!(config.disabled_agents, vec!["imaging".to_string()]);
        assert_eq!(config.routing.diagnose_fanout, FanoutPolicy::Always);
        assert_eq!(config.routing.default_synthetic_count, 3);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let err = RouterConfig::from_toml("max_concurrent_steps = 0").unwrap_err();
        assert!(matches!(err, RouterError::Config(_)));
    }

    #[test]
    fn test_zero_durations_rejected() {
        let err = RouterConfig::from_toml("load_timeout_ms = 0").unwrap_err();
        assert!(matches!(err, RouterError::Config(ref msg) if msg.contains("load_timeout_ms")));

        let err = RouterConfig::from_toml("session_idle_ms = 0").unwrap_err();
        assert!(matches!(err, RouterError::Config(ref msg) if msg.contains("session_idle_ms")));
    }

    #[test]
    fn test_unknown_fanout_policy_rejected() {
        let err = RouterConfig::from_toml("[routing]\ndiagnose_fanout = \"sometimes\"").unwrap_err();
        assert!(matches!(err, RouterError::Config(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "step_timeout_ms = 1234").unwrap();
        let config = RouterConfig::from_file(file.path()).unwrap();
        assert_eq!(config.step_timeout_ms, 1234);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = RouterConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, RouterError::Io(_)));
    }

    #[test]
    fn test_merge_disabled_dedupes() {
        let mut config = RouterConfig {
            disabled_agents: vec!["imaging".into()],
            ..Default::default()
        };
        config.merge_disabled("imaging, genomics ,,");
        assert_eq!(config.disabled_agents, vec!["imaging".to_string(), "genomics".to_string()]);
    }
}
