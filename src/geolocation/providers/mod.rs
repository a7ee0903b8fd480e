
use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use super::{LocationInfo, LocationQuery};

/// One IP geolocation service
pub trait LocationProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// `None` when the service is unreachable, errors, or has no coordinates
    fn resolve(&self, query: &LocationQuery) -> Option<LocationInfo>;
}

/// ip-api.com JSON endpoint (free tier, no key)
#[derive(Debug, Clone)]
pub struct IpApiProvider {
    base_url: String,
    agent: ureq::Agent,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpApiResponse {
    status: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    timezone: Option<String>,
    city: Option<String>,
    region_name: Option<String>,
    country: Option<String>,
}

impl IpApiProvider {
    #[inline]
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent: build_agent(timeout),
        }
    }

    #[inline]
    pub fn lookup_url(&self, query: &LocationQuery) -> String {
        match query {
            LocationQuery::Caller => format!("{}/json", self.base_url),
            LocationQuery::Address(ip) => format!("{}/json/{}", self.base_url, ip),
        }
    }
}

impl LocationProvider for IpApiProvider {
    #[inline]
    fn name(&self) -> &'static str {
        "ip-api.com"
    }

    #[inline]
    fn resolve(&self, query: &LocationQuery) -> Option<LocationInfo> {
        let url = self.lookup_url(query);
        let response: IpApiResponse = get_json(&self.agent, &url)
            .map_err(|e| debug!("ip-api.com lookup failed: {:#}", e))
            .ok()?;

        if response.status.as_deref() != Some("success") {
            debug!("ip-api.com reported status {:?}", response.status);
            return None;
        }

        let (latitude, longitude) = response.lat.zip(response.lon)?;
        Some(location(
            response.timezone,
            (latitude, longitude),
            response.city,
            response.region_name,
            response.country,
        ))
    }
}

/// ipinfo.io JSON endpoint, coordinates come back as `"lat,lon"`
#[derive(Debug, Clone)]
pub struct IpInfoProvider {
    base_url: String,
    agent: ureq::Agent,
}

#[derive(Debug, Deserialize)]
struct IpInfoResponse {
    loc: Option<String>,
    timezone: Option<String>,
    city: Option<String>,
    region: Option<String>,
    country: Option<String>,
}

impl IpInfoProvider {
    #[inline]
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent: build_agent(timeout),
        }
    }

    #[inline]
    pub fn lookup_url(&self, query: &LocationQuery) -> String {
        match query {
            LocationQuery::Caller => format!("{}/json", self.base_url),
            LocationQuery::Address(ip) => format!("{}/{}/json", self.base_url, ip),
        }
    }
}

impl LocationProvider for IpInfoProvider {
    #[inline]
    fn name(&self) -> &'static str {
        "ipinfo.io"
    }

    #[inline]
    fn resolve(&self, query: &LocationQuery) -> Option<LocationInfo> {
        let url = self.lookup_url(query);
        let response: IpInfoResponse = get_json(&self.agent, &url)
            .map_err(|e| debug!("ipinfo.io lookup failed: {:#}", e))
            .ok()?;

        let coordinates = response.loc.as_deref().and_then(parse_loc)?;
        Some(location(
            response.timezone,
            coordinates,
            response.city,
            response.region,
            response.country,
        ))
    }
}

/// Parse ipinfo's `"37.3860,-122.0838"`
#[inline]
pub fn parse_loc(loc: &str) -> Option<(f64, f64)> {
    let (lat, lon) = loc.split_once(',')?;
    Some((lat.trim().parse().ok()?, lon.trim().parse().ok()?))
}

fn location(
    timezone: Option<String>,
    (latitude, longitude): (f64, f64),
    city: Option<String>,
    region: Option<String>,
    country: Option<String>,
) -> LocationInfo {
    let unknown = LocationInfo::unknown();
    LocationInfo {
        timezone: timezone
            .filter(|tz| !tz.is_empty())
            .unwrap_or(unknown.timezone),
        latitude: Some(latitude),
        longitude: Some(longitude),
        city: city.unwrap_or(unknown.city),
        region: region.unwrap_or(unknown.region),
        country: country.unwrap_or(unknown.country),
    }
}

fn get_json<T: DeserializeOwned>(agent: &ureq::Agent, url: &str) -> Result<T> {
    debug!("Making HTTP GET request to: {}", url);

    match agent.get(url).call() {
        Ok(mut response) => {
            let body = response
                .body_mut()
                .read_to_string()
                .with_context(|| format!("Failed to read response body from {}", url))?;
            serde_json::from_str(&body).with_context(|| format!("Malformed response from {}", url))
        }
        Err(ureq::Error::StatusCode(code)) => Err(anyhow!("HTTP error {}", code)),
        Err(e) => Err(anyhow::Error::from(e))
            .with_context(|| format!("Failed to make HTTP request to {}", url)),
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}
