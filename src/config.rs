use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Campaigns API connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the REST API, including the version prefix
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Bearer token; usually supplied through CAMPAIGNCTL__API__TOKEN
    #[serde(default)]
    pub token: Option<String>,
}

fn default_base_url() -> String {
    "http://localhost:8000/api/v1/".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            token: None,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Polling cadences
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Seconds between re-fetches of list views such as the approval queue (default: 15)
    #[serde(default = "default_list_interval")]
    pub list_interval_secs: u64,
    /// Seconds between re-fetches of a campaign detail view (default: 10)
    #[serde(default = "default_detail_interval")]
    pub detail_interval_secs: u64,
}

fn default_list_interval() -> u64 {
    15
}

fn default_detail_interval() -> u64 {
    10
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            list_interval_secs: default_list_interval(),
            detail_interval_secs: default_detail_interval(),
        }
    }
}

impl SyncConfig {
    pub fn list_interval(&self) -> Duration {
        Duration::from_secs(self.list_interval_secs.max(1))
    }

    pub fn detail_interval(&self) -> Duration {
        Duration::from_secs(self.detail_interval_secs.max(1))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether watch modes log to a file (false = stderr)
    #[serde(default = "default_log_to_file")]
    pub to_file: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_to_file() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            to_file: default_log_to_file(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Local state directory (logs live under it)
    #[serde(default = "default_state_path")]
    pub state: String,
}

fn default_state_path() -> String {
    ".campaignctl".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state: default_state_path(),
        }
    }
}

impl Config {
    /// Project config file, relative to the working directory
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".campaignctl/config.toml")
    }

    pub fn load(config_path: Option<&str>) -> Result<Self> {
        // Start with embedded defaults so campaignctl works without config files
        let defaults = Config::default();
        let defaults_json =
            serde_json::to_string(&defaults).context("Failed to serialize default config")?;

        let mut builder = config::Config::builder().add_source(config::File::from_str(
            &defaults_json,
            config::FileFormat::Json,
        ));

        let project_config = Self::project_config_path();
        if project_config.exists() {
            builder = builder.add_source(config::File::from(project_config));
        }

        // User config in ~/.config/campaignctl/ (optional global overrides)
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("campaignctl").join("config.toml");
            if user_config.exists() {
                builder = builder.add_source(config::File::from(user_config));
            }
        }

        // Explicit config file (CLI override)
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment variables, e.g. CAMPAIGNCTL__SYNC__DETAIL_INTERVAL_SECS=5
        builder = builder.add_source(
            config::Environment::with_prefix("CAMPAIGNCTL")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to load configuration")?;
        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Save config to .campaignctl/config.toml
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::project_config_path())
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        // The token stays in the environment, never on disk
        let mut persisted = self.clone();
        persisted.api.token = None;
        let toml_str =
            toml::to_string_pretty(&persisted).context("Failed to serialize config to TOML")?;

        std::fs::write(config_path, toml_str).context("Failed to write config file")?;

        Ok(())
    }

    /// Get absolute path to state directory
    pub fn state_path(&self) -> PathBuf {
        let path = PathBuf::from(&self.paths.state);
        if path.is_absolute() {
            path
        } else {
            std::env::current_dir().unwrap_or_default().join(path)
        }
    }

    /// Get absolute path to logs directory
    pub fn logs_path(&self) -> PathBuf {
        self.state_path().join("logs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api.base_url, "http://localhost:8000/api/v1/");
        assert_eq!(config.sync.list_interval(), Duration::from_secs(15));
        assert_eq!(config.sync.detail_interval(), Duration::from_secs(10));
        assert_eq!(config.api.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_explicit_file_overrides_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[sync]\ndetail_interval_secs = 5\n\n[api]\nbase_url = \"https://campaigns.example.com/api/v1/\"\n",
        )
        .unwrap();

        let config = Config::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.sync.detail_interval_secs, 5);
        assert_eq!(config.sync.list_interval_secs, 15);
        assert_eq!(config.api.base_url, "https://campaigns.example.com/api/v1/");
    }

    #[test]
    fn test_save_omits_token() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.api.token = Some("secret".to_string());
        config.save_to(&path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("detail_interval_secs = 10"));
        assert!(!written.contains("secret"));
    }

    #[test]
    fn test_zero_interval_clamped() {
        let sync = SyncConfig {
            list_interval_secs: 0,
            detail_interval_secs: 0,
        };
        assert_eq!(sync.list_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_absolute_state_path() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.state = temp_dir.path().to_string_lossy().to_string();
        assert_eq!(config.logs_path(), temp_dir.path().join("logs"));
    }
}
