
use anyhow::{Context, Result, anyhow};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::WeatherConfig;
use crate::weather::models::{AlertCollection, Forecast, PointsResponse};

const ACCEPT_GEO_JSON: &str = "application/geo+json";

/// Anything that can produce weather data for the tools.
///
/// Every failure collapses to `None`; callers only ever report "unavailable".
pub trait WeatherSource: Send + Sync {
    fn fetch_alerts(&self, state: &str) -> Option<AlertCollection>;
    fn fetch_forecast(&self, latitude: f64, longitude: f64) -> Option<Forecast>;
}

/// Client for the National Weather Service API
#[derive(Debug, Clone)]
pub struct NwsClient {
    base_url: String,
    user_agent: String,
    agent: ureq::Agent,
}

impl NwsClient {
    #[inline]
    pub fn new(config: &WeatherConfig) -> Result<Self> {
        let base_url = config
            .base_url()
            .context("Invalid weather service base URL")?;

        Ok(Self {
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            user_agent: config.user_agent.clone(),
            agent: build_agent(config.timeout()),
        })
    }

    #[inline]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn alerts_url(&self, state: &str) -> String {
        format!(
            "{}/alerts/active/area/{}",
            self.base_url,
            state.trim().to_uppercase()
        )
    }

    fn points_url(&self, latitude: f64, longitude: f64) -> String {
        // the points endpoint redirects anything past four decimal places
        format!("{}/points/{:.4},{:.4}", self.base_url, latitude, longitude)
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str) -> Option<T> {
        let body = match self.try_get(url) {
            Ok(body) => body,
            Err(e) => {
                warn!("Weather request failed for {}: {:#}", url, e);
                return None;
            }
        };

        match serde_json::from_str(&body) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!("Malformed weather response from {}: {}", url, e);
                None
            }
        }
    }

    /// Attempt a single HTTP GET request
    fn try_get(&self, url: &str) -> Result<String> {
        debug!("Making HTTP GET request to: {}", url);

        match self
            .agent
            .get(url)
            .header("User-Agent", &self.user_agent)
            .header("Accept", ACCEPT_GEO_JSON)
            .call()
        {
            Ok(mut response) => {
                let text = response
                    .body_mut()
                    .read_to_string()
                    .with_context(|| format!("Failed to read response body from {}", url))?;
                debug!("Read {} bytes from {}", text.len(), url);
                Ok(text)
            }
            Err(ureq::Error::StatusCode(code)) => Err(anyhow!("HTTP error {}", code)),
            Err(e) => Err(anyhow::Error::from(e))
                .with_context(|| format!("Failed to make HTTP request to {}", url)),
        }
    }
}

impl WeatherSource for NwsClient {
    #[inline]
    fn fetch_alerts(&self, state: &str) -> Option<AlertCollection> {
        self.get_json(&self.alerts_url(state))
    }

    /// Resolve the gridpoint for the coordinates, then fetch its forecast
    #[inline]
    fn fetch_forecast(&self, latitude: f64, longitude: f64) -> Option<Forecast> {
        let points: PointsResponse = self.get_json(&self.points_url(latitude, longitude))?;

        let Some(forecast_url) = points.properties.forecast else {
            warn!(
                "Points response for {},{} has no forecast link",
                latitude, longitude
            );
            return None;
        };

        self.get_json(&forecast_url)
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}
