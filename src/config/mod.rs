// Configuration management module
// TOML-backed settings plus the interactive editor

pub mod interactive;
pub mod settings;

pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    CONFIG_DIR_ENV, CacheConfig, Config, ConfigError, GeolocationConfig, ServerConfig,
    WeatherConfig,
};
