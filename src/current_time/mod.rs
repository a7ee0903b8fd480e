//! Renders the current time for a geolocated caller.


use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use chrono_tz::Tz;
use std::fmt::Write as _;

use crate::geolocation::LocationInfo;

const READABLE_FORMAT: &str = "%A, %B %d, %Y at %I:%M:%S %p";

/// Local time report for `location`.
///
/// `ip_address` is echoed back verbatim when the caller supplied one. An
/// unrecognised timezone name degrades to a UTC report carrying the parse error.
#[inline]
pub fn format_current_time(
    location: &LocationInfo,
    now: DateTime<Utc>,
    ip_address: Option<&str>,
) -> String {
    let tz: Tz = match location.timezone.parse() {
        Ok(tz) => tz,
        Err(e) => return format_utc_fallback(now, &e.to_string()),
    };

    let local = tz.from_utc_datetime(&now.naive_utc());

    let mut report = format!(
        "Current Time Information:\n\
         Time: {}\n\
         Timezone: {}\n\
         UTC Offset: {}\n\
         ISO Format: {}\n\
         Day of Week: {}\n\
         Date: {}\n\n\
         Location (estimated from IP):\n\
         City: {}, {}, {}",
        local.format(READABLE_FORMAT),
        location.timezone,
        local.format("%z"),
        local.to_rfc3339_opts(SecondsFormat::Micros, false),
        local.format("%A"),
        local.format("%B %d, %Y"),
        location.city,
        location.region,
        location.country,
    );

    match location.coordinates() {
        Some((latitude, longitude)) => {
            let _ = write!(
                report,
                "\nCoordinates: {}, {}\n\n\u{2713} Location detected successfully! \
                 Use these coordinates for weather lookups.",
                latitude, longitude
            );
        }
        None => {
            report.push_str(
                "\n\n\u{26a0}\u{fe0f} Could not determine precise location from IP address.\
                 \nFor weather forecasts, please provide your city/state or coordinates manually.",
            );
        }
    }

    if let Some(ip) = ip_address.filter(|ip| !ip.trim().is_empty()) {
        let _ = write!(report, "\n(IP: {})", ip);
    }

    report
}

fn format_utc_fallback(now: DateTime<Utc>, error: &str) -> String {
    format!(
        "Current Time (UTC):\n\
         Time: {} UTC\n\
         ISO Format: {}\n\
         Note: Could not determine timezone from IP, showing UTC time.\n\
         Error: {}",
        now.format(READABLE_FORMAT),
        now.to_rfc3339_opts(SecondsFormat::Micros, false),
        error
    )
}
