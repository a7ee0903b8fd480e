
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Environment variable that overrides the configuration directory
pub const CONFIG_DIR_ENV: &str = "GENERAL_TOOLS_MCP_HOME";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub geolocation: GeolocationConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "general-tools".to_string(),
        }
    }
}

/// National Weather Service client settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WeatherConfig {
    pub base_url: String,
    /// api.weather.gov rejects requests without an identifying User-Agent
    pub user_agent: String,
    pub timeout_seconds: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.weather.gov".to_string(),
            user_agent: format!("general-tools-mcp/{}", env!("CARGO_PKG_VERSION")),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeolocationConfig {
    pub ip_api_url: String,
    pub ipinfo_url: String,
    pub timeout_seconds: u64,
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            ip_api_url: "http://ip-api.com".to_string(),
            ipinfo_url: "https://ipinfo.io".to_string(),
            timeout_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub alerts_max_age_minutes: u64,
    pub forecast_max_age_minutes: u64,
    /// Oldest log records are dropped past this many entries
    pub log_capacity: usize,
    pub preview_length: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            alerts_max_age_minutes: 30,
            forecast_max_age_minutes: 60,
            log_capacity: 1000,
            preview_length: 200,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL: {0} (must be an absolute http or https URL)")]
    InvalidUrl(String),
    #[error("Invalid server name: {0:?} (cannot be empty)")]
    InvalidServerName(String),
    #[error("Invalid user agent: {0:?} (cannot be empty)")]
    InvalidUserAgent(String),
    #[error("Invalid timeout: {0} (must be between 1 and 300 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid cache max age: {0} (must be between 1 and 1440 minutes)")]
    InvalidMaxAge(u64),
    #[error("Invalid log capacity: {0} (must be between 1 and 100000)")]
    InvalidLogCapacity(usize),
    #[error("Invalid preview length: {0} (must be between 16 and 10000)")]
    InvalidPreviewLength(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Resolve the configuration directory, honoring `GENERAL_TOOLS_MCP_HOME`
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|v| !v.is_empty()) {
            return Ok(PathBuf::from(dir));
        }

        dirs::home_dir()
            .map(|home| home.join(".general-tools-mcp"))
            .or_else(|| dirs::config_dir().map(|dir| dir.join("general-tools-mcp")))
            .ok_or(ConfigError::DirectoryError)
    }

    /// Load from the default configuration directory
    #[inline]
    pub fn load_default() -> Result<Self> {
        let config_dir = Self::config_dir().context("Failed to determine config directory")?;
        Self::load(config_dir)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.name.trim().is_empty() {
            return Err(ConfigError::InvalidServerName(self.server.name.clone()));
        }
        self.weather.validate()?;
        self.geolocation.validate()?;
        self.cache.validate()?;
        Ok(())
    }
}

impl WeatherConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_http_url(&self.base_url)?;

        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::InvalidUserAgent(self.user_agent.clone()));
        }

        validate_timeout(self.timeout_seconds)
    }

    pub fn base_url(&self) -> Result<Url, ConfigError> {
        parse_http_url(&self.base_url)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn set_base_url(&mut self, base_url: String) -> Result<(), ConfigError> {
        parse_http_url(&base_url)?;
        self.base_url = base_url;
        Ok(())
    }

    pub fn set_user_agent(&mut self, user_agent: String) -> Result<(), ConfigError> {
        if user_agent.trim().is_empty() {
            return Err(ConfigError::InvalidUserAgent(user_agent));
        }
        self.user_agent = user_agent;
        Ok(())
    }

    pub fn set_timeout_seconds(&mut self, timeout_seconds: u64) -> Result<(), ConfigError> {
        validate_timeout(timeout_seconds)?;
        self.timeout_seconds = timeout_seconds;
        Ok(())
    }
}

impl GeolocationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_http_url(&self.ip_api_url)?;
        parse_http_url(&self.ipinfo_url)?;
        validate_timeout(self.timeout_seconds)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn set_timeout_seconds(&mut self, timeout_seconds: u64) -> Result<(), ConfigError> {
        validate_timeout(timeout_seconds)?;
        self.timeout_seconds = timeout_seconds;
        Ok(())
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_max_age(self.alerts_max_age_minutes)?;
        validate_max_age(self.forecast_max_age_minutes)?;

        if !(1..=100_000).contains(&self.log_capacity) {
            return Err(ConfigError::InvalidLogCapacity(self.log_capacity));
        }

        if !(16..=10_000).contains(&self.preview_length) {
            return Err(ConfigError::InvalidPreviewLength(self.preview_length));
        }

        Ok(())
    }

    pub fn set_alerts_max_age_minutes(&mut self, minutes: u64) -> Result<(), ConfigError> {
        validate_max_age(minutes)?;
        self.alerts_max_age_minutes = minutes;
        Ok(())
    }

    pub fn set_forecast_max_age_minutes(&mut self, minutes: u64) -> Result<(), ConfigError> {
        validate_max_age(minutes)?;
        self.forecast_max_age_minutes = minutes;
        Ok(())
    }

    pub fn set_log_capacity(&mut self, capacity: usize) -> Result<(), ConfigError> {
        if !(1..=100_000).contains(&capacity) {
            return Err(ConfigError::InvalidLogCapacity(capacity));
        }
        self.log_capacity = capacity;
        Ok(())
    }
}

fn parse_http_url(value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|_| ConfigError::InvalidUrl(value.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(value.to_string()));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(ConfigError::InvalidUrl(value.to_string()));
    }
    Ok(url)
}

fn validate_timeout(seconds: u64) -> Result<(), ConfigError> {
    if !(1..=300).contains(&seconds) {
        return Err(ConfigError::InvalidTimeout(seconds));
    }
    Ok(())
}

fn validate_max_age(minutes: u64) -> Result<(), ConfigError> {
    if !(1..=1440).contains(&minutes) {
        return Err(ConfigError::InvalidMaxAge(minutes));
    }
    Ok(())
}
