
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input};

use super::{CacheConfig, Config, GeolocationConfig, WeatherConfig};

#[inline]
pub fn run_interactive_config() -> Result<()> {
    eprintln!("{}", style("🔧 General Tools MCP Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config()?;

    eprintln!("{}", style("Weather Service").bold().yellow());
    eprintln!("api.weather.gov requires a User-Agent that identifies you, ideally with contact info.");
    eprintln!();
    configure_weather(&mut config.weather)?;

    eprintln!();
    eprintln!("{}", style("Geolocation").bold().yellow());
    configure_geolocation(&mut config.geolocation)?;

    eprintln!();
    eprintln!("{}", style("Cache & Conversation Log").bold().yellow());
    configure_cache(&mut config.cache)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if test_weather_connection(&config.weather) {
        eprintln!("{}", style("✓ Weather service reachable!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not reach the weather service").yellow()
        );
        eprintln!("You can continue, but weather tools will report data as unavailable.");
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config() -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Server:").bold().yellow());
    eprintln!("  Name: {}", style(&config.server.name).cyan());

    eprintln!();
    eprintln!("{}", style("Weather Service:").bold().yellow());
    eprintln!("  Base URL: {}", style(&config.weather.base_url).cyan());
    eprintln!("  User-Agent: {}", style(&config.weather.user_agent).cyan());
    eprintln!("  Timeout: {}s", style(config.weather.timeout_seconds).cyan());

    eprintln!();
    eprintln!("{}", style("Geolocation:").bold().yellow());
    eprintln!("  Primary: {}", style(&config.geolocation.ip_api_url).cyan());
    eprintln!("  Fallback: {}", style(&config.geolocation.ipinfo_url).cyan());
    eprintln!(
        "  Timeout: {}s",
        style(config.geolocation.timeout_seconds).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Cache:").bold().yellow());
    eprintln!(
        "  Alerts max age: {} min",
        style(config.cache.alerts_max_age_minutes).cyan()
    );
    eprintln!(
        "  Forecast max age: {} min",
        style(config.cache.forecast_max_age_minutes).cyan()
    );
    eprintln!(
        "  Log capacity: {} records",
        style(config.cache.log_capacity).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config() -> Result<Config> {
    match Config::load_default() {
        Ok(config) => {
            eprintln!("{}", style("Found existing configuration.").green());
            Ok(config)
        }
        Err(_) => {
            eprintln!(
                "{}",
                style("No usable configuration found. Using defaults.").yellow()
            );
            let base_dir = Config::config_dir().context("Failed to determine config directory")?;
            Ok(Config {
                base_dir,
                ..Config::default()
            })
        }
    }
}

fn configure_weather(weather: &mut WeatherConfig) -> Result<()> {
    let user_agent: String = Input::new()
        .with_prompt("User-Agent for api.weather.gov")
        .default(weather.user_agent.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("User-Agent cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let timeout: u64 = Input::new()
        .with_prompt("Weather request timeout (seconds)")
        .default(weather.timeout_seconds)
        .validate_with(|input: &u64| -> Result<(), &str> {
            if (1..=300).contains(input) {
                Ok(())
            } else {
                Err("Timeout must be between 1 and 300 seconds")
            }
        })
        .interact_text()?;

    weather.set_user_agent(user_agent)?;
    weather.set_timeout_seconds(timeout)?;

    Ok(())
}

fn configure_geolocation(geolocation: &mut GeolocationConfig) -> Result<()> {
    let timeout: u64 = Input::new()
        .with_prompt("Geolocation request timeout (seconds)")
        .default(geolocation.timeout_seconds)
        .validate_with(|input: &u64| -> Result<(), &str> {
            if (1..=300).contains(input) {
                Ok(())
            } else {
                Err("Timeout must be between 1 and 300 seconds")
            }
        })
        .interact_text()?;

    geolocation.set_timeout_seconds(timeout)?;
    Ok(())
}

fn configure_cache(cache: &mut CacheConfig) -> Result<()> {
    let max_age_prompt = |prompt: &str, default: u64| -> Result<u64> {
        Ok(Input::<u64>::new()
            .with_prompt(prompt)
            .default(default)
            .validate_with(|input: &u64| -> Result<(), &str> {
                if (1..=1440).contains(input) {
                    Ok(())
                } else {
                    Err("Max age must be between 1 and 1440 minutes")
                }
            })
            .interact_text()?)
    };

    let alerts = max_age_prompt("Alerts cache max age (minutes)", cache.alerts_max_age_minutes)?;
    let forecast = max_age_prompt(
        "Forecast cache max age (minutes)",
        cache.forecast_max_age_minutes,
    )?;

    let log_capacity: usize = Input::new()
        .with_prompt("Conversation log capacity (records)")
        .default(cache.log_capacity)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if (1..=100_000).contains(input) {
                Ok(())
            } else {
                Err("Capacity must be between 1 and 100000")
            }
        })
        .interact_text()?;

    cache.set_alerts_max_age_minutes(alerts)?;
    cache.set_forecast_max_age_minutes(forecast)?;
    cache.set_log_capacity(log_capacity)?;

    Ok(())
}

fn test_weather_connection(weather: &WeatherConfig) -> bool {
    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(std::time::Duration::from_secs(5)))
        .build()
        .into();

    match agent
        .get(&weather.base_url)
        .header("User-Agent", &weather.user_agent)
        .call()
    {
        Ok(_) => true,
        Err(ureq::Error::StatusCode(code)) if (400..500).contains(&code) => true,
        Err(_) => false,
    }
}
