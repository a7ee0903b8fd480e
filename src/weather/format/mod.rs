//! Plain-text rendering of weather data for tool results


use crate::weather::models::{AlertCollection, AlertProperties, Forecast, ForecastPeriod};

pub const ALERTS_UNAVAILABLE: &str = "Unable to fetch alerts or no alerts found.";
pub const NO_ACTIVE_ALERTS: &str = "No active alerts for this state.";
pub const FORECAST_UNAVAILABLE: &str = "Unable to fetch forecast data for this location.";
pub const NO_FORECAST_PERIODS: &str = "No forecast periods available for this location.";

/// Number of forecast periods included in a report
pub const FORECAST_PERIOD_LIMIT: usize = 5;

const BLOCK_SEPARATOR: &str = "\n---\n";

#[inline]
pub fn format_alert(alert: &AlertProperties) -> String {
    format!(
        "\nEvent: {}\nArea: {}\nSeverity: {}\nDescription: {}\nInstructions: {}\n",
        alert.event.as_deref().unwrap_or("Unknown"),
        alert.area_desc.as_deref().unwrap_or("Unknown"),
        alert.severity.as_deref().unwrap_or("Unknown"),
        alert
            .description
            .as_deref()
            .unwrap_or("No description available"),
        alert
            .instruction
            .as_deref()
            .unwrap_or("No specific instructions provided"),
    )
}

#[inline]
pub fn format_alerts(alerts: Option<&AlertCollection>) -> String {
    let Some(alerts) = alerts else {
        return ALERTS_UNAVAILABLE.to_string();
    };

    if alerts.features.is_empty() {
        return NO_ACTIVE_ALERTS.to_string();
    }

    alerts
        .features
        .iter()
        .map(|feature| format_alert(&feature.properties))
        .collect::<Vec<_>>()
        .join(BLOCK_SEPARATOR)
}

#[inline]
pub fn format_period(period: &ForecastPeriod) -> String {
    let temperature = match period.temperature.as_ref().and_then(|t| t.value()) {
        Some(value) => format!(
            "{}°{}",
            value,
            period.temperature_unit.as_deref().unwrap_or("F")
        ),
        None => "Unknown".to_string(),
    };

    let wind = match (
        period.wind_speed.as_deref(),
        period.wind_direction.as_deref(),
    ) {
        (Some(speed), Some(direction)) => format!("{speed} {direction}"),
        (Some(speed), None) => speed.to_string(),
        (None, Some(direction)) => direction.to_string(),
        (None, None) => "Unknown".to_string(),
    };

    let name = if period.name.is_empty() {
        "Upcoming"
    } else {
        period.name.as_str()
    };

    format!(
        "\n{}:\nTemperature: {}\nWind: {}\nConditions: {}\nForecast: {}\n",
        name,
        temperature,
        wind,
        period.short_forecast.as_deref().unwrap_or("Unknown"),
        period
            .detailed_forecast
            .as_deref()
            .or(period.short_forecast.as_deref())
            .unwrap_or("No detailed forecast available"),
    )
}

/// Render the next [`FORECAST_PERIOD_LIMIT`] periods
#[inline]
pub fn format_forecast(forecast: Option<&Forecast>) -> String {
    let Some(forecast) = forecast else {
        return FORECAST_UNAVAILABLE.to_string();
    };

    if forecast.properties.periods.is_empty() {
        return NO_FORECAST_PERIODS.to_string();
    }

    forecast
        .properties
        .periods
        .iter()
        .take(FORECAST_PERIOD_LIMIT)
        .map(format_period)
        .collect::<Vec<_>>()
        .join(BLOCK_SEPARATOR)
}
