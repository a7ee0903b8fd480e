// Geolocation module
// Resolves an IP address (or the caller's public address) to a timezone and coordinates

pub mod providers;


use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::{debug, info, warn};

use crate::config::GeolocationConfig;

pub use providers::{IpApiProvider, IpInfoProvider, LocationProvider};

const UNKNOWN: &str = "Unknown";
const DEFAULT_TIMEZONE: &str = "UTC";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationInfo {
    /// IANA timezone name, e.g. `America/Los_Angeles`
    pub timezone: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub city: String,
    pub region: String,
    pub country: String,
}

impl LocationInfo {
    /// Placeholder used when no provider could place the caller
    #[inline]
    pub fn unknown() -> Self {
        Self {
            timezone: DEFAULT_TIMEZONE.to_string(),
            latitude: None,
            longitude: None,
            city: UNKNOWN.to_string(),
            region: UNKNOWN.to_string(),
            country: UNKNOWN.to_string(),
        }
    }

    #[inline]
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }

    #[inline]
    pub fn is_located(&self) -> bool {
        self.coordinates().is_some()
    }
}

impl Default for LocationInfo {
    #[inline]
    fn default() -> Self {
        Self::unknown()
    }
}

/// What to ask the providers about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationQuery {
    /// Let the provider infer the public address of the request
    Caller,
    Address(IpAddr),
}

impl LocationQuery {
    /// Addresses no provider can place are downgraded to [`LocationQuery::Caller`]
    #[inline]
    pub fn from_input(input: Option<&str>) -> Self {
        let Some(raw) = input.map(str::trim).filter(|s| !s.is_empty()) else {
            return Self::Caller;
        };

        match raw.parse::<IpAddr>() {
            Ok(ip) if is_publicly_routable(ip) => Self::Address(ip),
            Ok(ip) => {
                debug!("{} is not publicly routable, querying the caller instead", ip);
                Self::Caller
            }
            Err(_) => {
                debug!("Ignoring unparseable IP address '{}'", raw);
                Self::Caller
            }
        }
    }

    #[inline]
    pub fn address(&self) -> Option<IpAddr> {
        match self {
            Self::Caller => None,
            Self::Address(ip) => Some(*ip),
        }
    }
}

/// Ordered provider chain; the first provider with coordinates wins
pub struct LocationResolver {
    providers: Vec<Box<dyn LocationProvider>>,
}

impl LocationResolver {
    #[inline]
    pub fn new(providers: Vec<Box<dyn LocationProvider>>) -> Self {
        Self { providers }
    }

    /// ip-api.com first, ipinfo.io as fallback
    #[inline]
    pub fn from_config(config: &GeolocationConfig) -> Self {
        Self::new(vec![
            Box::new(IpApiProvider::new(&config.ip_api_url, config.timeout())),
            Box::new(IpInfoProvider::new(&config.ipinfo_url, config.timeout())),
        ])
    }

    #[inline]
    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    #[inline]
    pub fn resolve(&self, query: &LocationQuery) -> Option<LocationInfo> {
        for provider in &self.providers {
            match provider.resolve(query) {
                Some(location) => {
                    info!(
                        "Located {:?} via {}: {}, {}",
                        query,
                        provider.name(),
                        location.city,
                        location.country
                    );
                    return Some(location);
                }
                None => debug!("Provider {} could not locate {:?}", provider.name(), query),
            }
        }
        None
    }

    /// Never fails: falls back to [`LocationInfo::unknown`]
    #[inline]
    pub fn locate(&self, ip_address: Option<&str>) -> LocationInfo {
        let query = LocationQuery::from_input(ip_address);
        self.resolve(&query).unwrap_or_else(|| {
            warn!("All geolocation providers failed for {:?}", query);
            LocationInfo::unknown()
        })
    }
}

impl std::fmt::Debug for LocationResolver {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationResolver")
            .field("providers", &self.provider_names())
            .finish()
    }
}

fn is_publicly_routable(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_public_v4(v4),
            None => is_public_v6(v6),
        },
    }
}

fn is_public_v4(ip: Ipv4Addr) -> bool {
    !(ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast())
}

fn is_public_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    let unique_local = first & 0xfe00 == 0xfc00;
    let link_local = first & 0xffc0 == 0xfe80;
    !(ip.is_loopback() || ip.is_unspecified() || unique_local || link_local)
}
