//! Configuration management for changeflow.
//!
//! Handles loading and saving configuration from TOML files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::workflow::{Role, SumPolicy};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Remote request store settings
    pub store: StoreConfig,

    /// Text generation settings
    pub ai: AiConfig,

    /// Impact scoring settings
    pub impact: ImpactConfig,

    /// Intake routing settings
    pub intake: IntakeConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Name recorded in activity entries
    pub actor: String,

    /// Role used when none is given on the command line
    pub role: Role,
}

/// Remote request store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base URL of the request API (e.g. `http://localhost:8080/api`)
    pub base_url: String,

    /// Timeout for each remote call, in seconds
    pub timeout_secs: u64,

    /// Retries for idempotent reads
    pub retry_attempts: u32,
}

/// Text generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Whether generation features are enabled
    pub enabled: bool,

    /// Provider name (only `claude` is built in)
    pub provider: String,

    /// Model override
    pub model: Option<String>,

    /// Token budget per generation call
    pub max_tokens: u32,

    /// Overall timeout for one generation call, in seconds
    pub timeout_secs: u64,

    /// Streams shorter than this are treated as empty
    pub min_content_len: usize,
}

/// Impact scoring settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpactConfig {
    /// Reject assessments whose breakdown does not add up to the total
    /// instead of logging a warning
    pub strict_sum: bool,
}

/// Intake routing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    /// Owner assigned when routing fails
    pub default_owner: String,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Looks for config in:
    /// 1. `.changeflow.toml` in current directory
    /// 2. `~/.config/changeflow/config.toml`
    /// 3. Falls back to defaults
    pub fn load() -> anyhow::Result<Self> {
        let local_config = PathBuf::from(".changeflow.toml");
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Some(config_dir) = Self::config_dir() {
            let global_config = config_dir.join("config.toml");
            if global_config.exists() {
                return Self::load_from_file(&global_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Save configuration to the global config file.
    pub fn save(&self) -> anyhow::Result<()> {
        let dir = Self::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        self.save_to(&dir.join("config.toml"))
    }

    /// Save configuration to a specific file.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("changeflow"))
    }

    /// Sum policy for impact validation.
    pub fn sum_policy(&self) -> SumPolicy {
        SumPolicy::from_strict(self.impact.strict_sum)
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        let actor = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
        Self { actor, role: Role::Requester }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            timeout_secs: 15,
            retry_attempts: 2,
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: "claude".to_string(),
            model: None,
            max_tokens: 4096,
            timeout_secs: 120,
            min_content_len: 5,
        }
    }
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self { default_owner: "product-team".to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.store.timeout_secs, 15);
        assert!(!config.impact.strict_sum);
        assert_eq!(config.sum_policy(), SumPolicy::Warn);
        assert_eq!(config.ai.min_content_len, 5);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[store]"));
        assert!(toml_str.contains("[impact]"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [general]
            actor = "morgan"
            role = "product-owner"

            [store]
            base_url = "https://requests.internal/api"

            [impact]
            strict_sum = true
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.actor, "morgan");
        assert_eq!(config.general.role, Role::ProductOwner);
        assert_eq!(config.store.base_url, "https://requests.internal/api");
        assert_eq!(config.store.timeout_secs, 15);
        assert_eq!(config.sum_policy(), SumPolicy::Reject);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.intake.default_owner = "triage".to_string();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded.intake.default_owner, "triage");
    }
}
