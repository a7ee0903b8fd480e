// Weather module
// National Weather Service client and plain-text formatting

pub mod client;
pub mod format;
pub mod models;

pub use client::{NwsClient, WeatherSource};
pub use format::{format_alerts, format_forecast};
pub use models::{AlertCollection, Forecast};
