//! Response shapes for the api.weather.gov endpoints we read.
//!
//! Only the fields the formatters use are modeled; everything else in the
//! GeoJSON payloads is ignored.

use serde::Deserialize;

/// `GET /alerts/active/area/{state}`
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct AlertCollection {
    pub features: Vec<AlertFeature>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct AlertFeature {
    #[serde(default)]
    pub properties: AlertProperties,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct AlertProperties {
    pub event: Option<String>,
    pub headline: Option<String>,
    pub area_desc: Option<String>,
    pub severity: Option<String>,
    pub description: Option<String>,
    pub instruction: Option<String>,
}

/// `GET /points/{lat},{lon}`
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PointsResponse {
    pub properties: PointsProperties,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct PointsProperties {
    /// Absolute URL of the gridpoint forecast
    pub forecast: Option<String>,
}

/// `GET {points.properties.forecast}`
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Forecast {
    pub properties: ForecastProperties,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ForecastProperties {
    pub periods: Vec<ForecastPeriod>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ForecastPeriod {
    pub name: String,
    pub temperature: Option<Temperature>,
    pub temperature_unit: Option<String>,
    pub wind_speed: Option<String>,
    pub wind_direction: Option<String>,
    pub short_forecast: Option<String>,
    pub detailed_forecast: Option<String>,
}

/// Plain number in the default format, a quantity object under the
/// `forecast_temperature_qv` feature flag
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Temperature {
    Value(f64),
    Quantity { value: Option<f64> },
}

impl Temperature {
    #[inline]
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Value(value) => Some(*value),
            Self::Quantity { value } => *value,
        }
    }
}
