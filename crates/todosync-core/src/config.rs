//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/todosync/config.toml)
//! 3. Environment variables (TODOSYNC_* prefix)
//!
//! Environment variables take precedence over config file values.
//! The resulting `Config` is passed explicitly to every component.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable prefix
const ENV_PREFIX: &str = "TODOSYNC";

/// Default remote endpoint
pub const DEFAULT_API_URL: &str = "https://api.todoist.com/sync/v9";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for data storage (SQLite cache)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Base URL of the remote sync API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// API token for the remote service
    #[serde(default)]
    pub api_token: Option<String>,

    /// Serve reads from the local cache
    #[serde(default = "default_true")]
    pub cache_enabled: bool,

    /// Run periodic incremental syncs in the background
    #[serde(default)]
    pub background_sync: bool,

    /// Interval between background syncs
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,

    /// Deadline for a single remote call
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            api_url: default_api_url(),
            api_token: None,
            cache_enabled: true,
            background_sync: false,
            sync_interval_secs: default_sync_interval(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (TODOSYNC_DATA_DIR, TODOSYNC_API_TOKEN, ...)
    /// 2. Config file (~/.config/todosync/config.toml or TODOSYNC_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var(format!("{}_API_URL", ENV_PREFIX)) {
            if !val.is_empty() {
                self.api_url = val;
            }
        }

        // Empty string clears the token
        if let Ok(val) = std::env::var(format!("{}_API_TOKEN", ENV_PREFIX)) {
            self.api_token = if val.is_empty() { None } else { Some(val) };
        }

        if let Ok(val) = std::env::var(format!("{}_CACHE_ENABLED", ENV_PREFIX)) {
            self.cache_enabled = parse_bool(&val);
        }

        if let Ok(val) = std::env::var(format!("{}_BACKGROUND_SYNC", ENV_PREFIX)) {
            self.background_sync = parse_bool(&val);
        }

        if let Ok(val) = std::env::var(format!("{}_SYNC_INTERVAL", ENV_PREFIX)) {
            if let Ok(secs) = val.parse() {
                self.sync_interval_secs = secs;
            }
        }

        if let Ok(val) = std::env::var(format!("{}_REQUEST_TIMEOUT", ENV_PREFIX)) {
            if let Ok(secs) = val.parse() {
                self.request_timeout_secs = secs;
            }
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_file_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Set a configuration value by key, as typed on the command line
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "data_dir" => self.data_dir = PathBuf::from(value),
            "api_url" => self.api_url = value.to_string(),
            "api_token" => {
                self.api_token = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                }
            }
            "cache_enabled" => self.cache_enabled = parse_bool(value),
            "background_sync" => self.background_sync = parse_bool(value),
            "sync_interval_secs" => {
                self.sync_interval_secs = value
                    .parse()
                    .with_context(|| format!("Invalid number of seconds: {}", value))?
            }
            "request_timeout_secs" => {
                self.request_timeout_secs = value
                    .parse()
                    .with_context(|| format!("Invalid number of seconds: {}", value))?
            }
            _ => anyhow::bail!(
                "Unknown config key '{}'. Valid keys: data_dir, api_url, api_token, \
                 cache_enabled, background_sync, sync_interval_secs, request_timeout_secs",
                key
            ),
        }
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with TODOSYNC_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("todosync")
            .join("config.toml")
    }

    /// Get the path to the SQLite cache
    pub fn cache_path(&self) -> PathBuf {
        self.data_dir.join("cache.db")
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

fn parse_bool(val: &str) -> bool {
    val.eq_ignore_ascii_case("true") || val == "1"
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("todosync")
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_true() -> bool {
    true
}

fn default_sync_interval() -> u64 {
    300
}

fn default_request_timeout() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "TODOSYNC_DATA_DIR",
        "TODOSYNC_API_URL",
        "TODOSYNC_API_TOKEN",
        "TODOSYNC_CACHE_ENABLED",
        "TODOSYNC_BACKGROUND_SYNC",
        "TODOSYNC_SYNC_INTERVAL",
        "TODOSYNC_REQUEST_TIMEOUT",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.cache_enabled);
        assert!(!config.background_sync);
        assert!(config.api_token.is_none());
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert!(config.data_dir.ends_with("todosync"));
    }

    #[test]
    fn test_cache_path() {
        let config = Config::default();
        assert!(config.cache_path().ends_with("cache.db"));
    }

    #[test]
    fn test_env_override_data_dir() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("TODOSYNC_DATA_DIR", "/tmp/todosync-test");
        config.apply_env_overrides();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/todosync-test"));
    }

    #[test]
    fn test_env_override_flags() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("TODOSYNC_CACHE_ENABLED", "false");
        env::set_var("TODOSYNC_BACKGROUND_SYNC", "1");
        env::set_var("TODOSYNC_SYNC_INTERVAL", "60");
        config.apply_env_overrides();

        assert!(!config.cache_enabled);
        assert!(config.background_sync);
        assert_eq!(config.sync_interval_secs, 60);
    }

    #[test]
    fn test_env_override_request_timeout() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("TODOSYNC_REQUEST_TIMEOUT", "5");
        config.apply_env_overrides();
        assert_eq!(config.request_timeout(), Duration::from_secs(5));

        // Unparseable values keep the previous setting
        env::set_var("TODOSYNC_REQUEST_TIMEOUT", "soon");
        config.apply_env_overrides();
        assert_eq!(config.request_timeout_secs, 5);
    }

    #[test]
    fn test_env_override_api_token() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("TODOSYNC_API_TOKEN", "secret");
        config.apply_env_overrides();
        assert_eq!(config.api_token, Some("secret".to_string()));

        // Empty string clears it
        env::set_var("TODOSYNC_API_TOKEN", "");
        config.apply_env_overrides();
        assert!(config.api_token.is_none());
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            data_dir = "/custom/data"
            api_token = "abc"
            background_sync = true
            sync_interval_secs = 120
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.api_token, Some("abc".to_string()));
        assert!(config.background_sync);
        assert!(config.cache_enabled);
        assert_eq!(config.sync_interval(), Duration::from_secs(120));
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);

        let path = PathBuf::from("/nonexistent/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        assert!(config.cache_enabled);
        assert!(config.api_token.is_none());
    }

    #[test]
    fn test_set_value() {
        let mut config = Config::default();
        config.set_value("background_sync", "true").unwrap();
        config.set_value("sync_interval_secs", "45").unwrap();
        assert!(config.background_sync);
        assert_eq!(config.sync_interval_secs, 45);

        assert!(config.set_value("sync_interval_secs", "soon").is_err());
        assert!(config.set_value("nope", "1").is_err());
    }
}
