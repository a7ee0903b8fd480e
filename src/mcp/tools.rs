//! MCP Tools Implementation
//!
//! Tool definitions and handlers. Weather tools read through the shared
//! cache; every upstream fetch runs on the blocking pool and the store lock
//! is never held across it.

use crate::config::CacheConfig;
use crate::conversation::{SharedStore, alerts_cache_key, forecast_cache_key};
use crate::current_time::format_current_time;
use crate::geolocation::LocationResolver;
use crate::mcp::errors::{McpError, McpResult};
use crate::mcp::protocol::{CallToolParams, CallToolResult, Tool};
use crate::mcp::server::{McpServer, ToolHandler};
use crate::weather::{WeatherSource, format_alerts, format_forecast};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::debug;

const SYSTEM_ROLE: &str = "system";

/// Everything the tool handlers share
#[derive(Clone)]
pub struct ToolContext {
    pub weather: Arc<dyn WeatherSource>,
    pub locator: Arc<LocationResolver>,
    pub store: SharedStore,
    pub cache: CacheConfig,
}

/// Register every tool on `server`
#[inline]
pub async fn register_tools(server: &McpServer, context: &ToolContext) {
    server
        .register_tool(
            GetAlertsHandler::tool_definition(),
            GetAlertsHandler::new(context),
        )
        .await;
    server
        .register_tool(
            GetForecastHandler::tool_definition(),
            GetForecastHandler::new(context),
        )
        .await;
    server
        .register_tool(
            GetCurrentTimeHandler::tool_definition(),
            GetCurrentTimeHandler::new(context),
        )
        .await;
    server
        .register_tool(
            LogMessageHandler::tool_definition(),
            LogMessageHandler::new(context),
        )
        .await;
    server
        .register_tool(
            GetConversationLogHandler::tool_definition(),
            GetConversationLogHandler::new(context),
        )
        .await;
    server
        .register_tool(
            GetCachedWeatherHandler::tool_definition(),
            GetCachedWeatherHandler::new(context),
        )
        .await;
    server
        .register_tool(
            ClearExpiredCacheHandler::tool_definition(),
            ClearExpiredCacheHandler::new(context),
        )
        .await;
}

/// Deserialize tool arguments, treating absent arguments as an empty object
fn parse_arguments<T: DeserializeOwned>(
    tool: &str,
    arguments: Option<Map<String, Value>>,
) -> McpResult<T> {
    serde_json::from_value(Value::Object(arguments.unwrap_or_default())).map_err(|e| {
        McpError::InvalidToolParameters {
            tool: tool.to_string(),
            message: e.to_string(),
        }
    })
}

fn invalid(tool: &str, message: impl Into<String>) -> McpError {
    McpError::InvalidToolParameters {
        tool: tool.to_string(),
        message: message.into(),
    }
}

/// Weather alerts for a US state
pub struct GetAlertsHandler {
    weather: Arc<dyn WeatherSource>,
    store: SharedStore,
    max_age_minutes: u64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AlertsArgs {
    state: String,
}

impl GetAlertsHandler {
    pub const NAME: &'static str = "get_alerts";

    #[inline]
    pub fn new(context: &ToolContext) -> Self {
        Self {
            weather: Arc::clone(&context.weather),
            store: Arc::clone(&context.store),
            max_age_minutes: context.cache.alerts_max_age_minutes,
        }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: Self::NAME.to_string(),
            description: Some("Get weather alerts for a US state".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "state": {
                        "type": "string",
                        "description": "Two-letter US state code (e.g. CA, NY)"
                    }
                },
                "required": ["state"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for GetAlertsHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let args: AlertsArgs = parse_arguments(Self::NAME, params.arguments)?;
        let state = args.state.trim().to_uppercase();
        if state.is_empty() {
            return Err(invalid(Self::NAME, "state must not be empty").into());
        }

        let key = alerts_cache_key(&state);
        {
            let mut store = self.store.lock().await;
            if let Some(cached) = store.get_cached(&key, self.max_age_minutes) {
                store.log(SYSTEM_ROLE, format!("Served cached alerts for {}", state));
                return Ok(CallToolResult::text(cached));
            }
        }

        debug!("Cache miss for {}, fetching alerts", key);
        let weather = Arc::clone(&self.weather);
        let area = state.clone();
        let alerts = tokio::task::spawn_blocking(move || weather.fetch_alerts(&area))
            .await
            .context("Alerts fetch task failed")?;

        let text = format_alerts(alerts.as_ref());
        let mut store = self.store.lock().await;
        if alerts.is_some() {
            store.put_cached(key, text.clone(), "alerts");
            store.log(SYSTEM_ROLE, format!("Fetched fresh alerts for {}", state));
        } else {
            store.log(SYSTEM_ROLE, format!("Alerts unavailable for {}", state));
        }

        Ok(CallToolResult::text(text))
    }
}

/// Weather forecast for a coordinate pair
pub struct GetForecastHandler {
    weather: Arc<dyn WeatherSource>,
    store: SharedStore,
    max_age_minutes: u64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ForecastArgs {
    latitude: f64,
    longitude: f64,
}

impl GetForecastHandler {
    pub const NAME: &'static str = "get_forecast";

    #[inline]
    pub fn new(context: &ToolContext) -> Self {
        Self {
            weather: Arc::clone(&context.weather),
            store: Arc::clone(&context.store),
            max_age_minutes: context.cache.forecast_max_age_minutes,
        }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: Self::NAME.to_string(),
            description: Some("Get weather forecast for a location".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "latitude": {
                        "type": "number",
                        "description": "Latitude of the location"
                    },
                    "longitude": {
                        "type": "number",
                        "description": "Longitude of the location"
                    }
                },
                "required": ["latitude", "longitude"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for GetForecastHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let ForecastArgs {
            latitude,
            longitude,
        } = parse_arguments(Self::NAME, params.arguments)?;

        if !(-90.0..=90.0).contains(&latitude) {
            return Err(invalid(Self::NAME, "latitude must be between -90 and 90").into());
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(invalid(Self::NAME, "longitude must be between -180 and 180").into());
        }

        let key = forecast_cache_key(latitude, longitude);
        {
            let mut store = self.store.lock().await;
            if let Some(cached) = store.get_cached(&key, self.max_age_minutes) {
                store.log(
                    SYSTEM_ROLE,
                    format!("Served cached forecast for {}, {}", latitude, longitude),
                );
                return Ok(CallToolResult::text(cached));
            }
        }

        debug!("Cache miss for {}, fetching forecast", key);
        let weather = Arc::clone(&self.weather);
        let forecast =
            tokio::task::spawn_blocking(move || weather.fetch_forecast(latitude, longitude))
                .await
                .context("Forecast fetch task failed")?;

        let text = format_forecast(forecast.as_ref());
        let mut store = self.store.lock().await;
        if forecast.is_some() {
            store.put_cached(key, text.clone(), "forecast");
            store.log(
                SYSTEM_ROLE,
                format!("Fetched fresh forecast for {}, {}", latitude, longitude),
            );
        } else {
            store.log(
                SYSTEM_ROLE,
                format!("Forecast unavailable for {}, {}", latitude, longitude),
            );
        }

        Ok(CallToolResult::text(text))
    }
}

/// Local time for the caller, located by IP
pub struct GetCurrentTimeHandler {
    locator: Arc<LocationResolver>,
    store: SharedStore,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct CurrentTimeArgs {
    #[serde(default)]
    ip_address: Option<String>,
}

impl GetCurrentTimeHandler {
    pub const NAME: &'static str = "get_current_time";

    #[inline]
    pub fn new(context: &ToolContext) -> Self {
        Self {
            locator: Arc::clone(&context.locator),
            store: Arc::clone(&context.store),
        }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: Self::NAME.to_string(),
            description: Some(
                "Get the current time based on the user's IP address. Determines the \
                 timezone by IP geolocation and returns the local time there."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "ip_address": {
                        "type": "string",
                        "description": "Optional IP address to determine timezone. If empty, the caller's public address is used"
                    }
                },
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for GetCurrentTimeHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let args: CurrentTimeArgs = parse_arguments(Self::NAME, params.arguments)?;
        let ip_address = args.ip_address.filter(|ip| !ip.trim().is_empty());

        let locator = Arc::clone(&self.locator);
        let lookup = ip_address.clone();
        let location = tokio::task::spawn_blocking(move || locator.locate(lookup.as_deref()))
            .await
            .context("Geolocation task failed")?;

        let mut store = self.store.lock().await;
        let report = format_current_time(&location, store.now(), ip_address.as_deref());
        store.log(
            SYSTEM_ROLE,
            format!(
                "Reported current time in {} for {}",
                location.timezone,
                ip_address.as_deref().unwrap_or("caller")
            ),
        );

        Ok(CallToolResult::text(report))
    }
}

/// Append a message to the conversation log
pub struct LogMessageHandler {
    store: SharedStore,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LogMessageArgs {
    role: String,
    content: String,
}

impl LogMessageHandler {
    pub const NAME: &'static str = "log_message";

    #[inline]
    pub fn new(context: &ToolContext) -> Self {
        Self {
            store: Arc::clone(&context.store),
        }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: Self::NAME.to_string(),
            description: Some("Record a message in the conversation log".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "role": {
                        "type": "string",
                        "description": "Message origin (user, assistant, system)"
                    },
                    "content": {
                        "type": "string",
                        "description": "Message content"
                    }
                },
                "required": ["role", "content"],
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for LogMessageHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let LogMessageArgs { role, content } = parse_arguments(Self::NAME, params.arguments)?;

        let text = format!("Logged {} message", role);
        self.store.lock().await.log(role, content);
        Ok(CallToolResult::text(text))
    }
}

/// Read back the conversation log
pub struct GetConversationLogHandler {
    store: SharedStore,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConversationLogArgs {
    #[serde(default)]
    limit: Option<usize>,
}

impl GetConversationLogHandler {
    pub const NAME: &'static str = "get_conversation_log";

    #[inline]
    pub fn new(context: &ToolContext) -> Self {
        Self {
            store: Arc::clone(&context.store),
        }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: Self::NAME.to_string(),
            description: Some("Get the conversation log as JSON".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "limit": {
                        "type": "integer",
                        "minimum": 0,
                        "description": "Only return the most recent N messages"
                    }
                },
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for GetConversationLogHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let args: ConversationLogArgs = parse_arguments(Self::NAME, params.arguments)?;
        let rendered = self.store.lock().await.render_log(args.limit);
        Ok(CallToolResult::text(rendered))
    }
}

/// List every cached weather result with its age
pub struct GetCachedWeatherHandler {
    store: SharedStore,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoArgs {}

impl GetCachedWeatherHandler {
    pub const NAME: &'static str = "get_cached_weather";

    #[inline]
    pub fn new(context: &ToolContext) -> Self {
        Self {
            store: Arc::clone(&context.store),
        }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: Self::NAME.to_string(),
            description: Some("List all cached weather data with timestamps".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for GetCachedWeatherHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let NoArgs {} = parse_arguments(Self::NAME, params.arguments)?;
        let rendered = self.store.lock().await.render_cache();
        Ok(CallToolResult::text(rendered))
    }
}

/// Sweep cache entries past a max age
pub struct ClearExpiredCacheHandler {
    store: SharedStore,
    default_max_age_minutes: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClearCacheArgs {
    #[serde(default)]
    max_age_minutes: Option<u64>,
}

impl ClearExpiredCacheHandler {
    pub const NAME: &'static str = "clear_expired_cache";

    #[inline]
    pub fn new(context: &ToolContext) -> Self {
        Self {
            store: Arc::clone(&context.store),
            default_max_age_minutes: context.cache.forecast_max_age_minutes,
        }
    }

    #[inline]
    pub fn tool_definition() -> Tool {
        Tool {
            name: Self::NAME.to_string(),
            description: Some("Remove cached weather data older than a max age".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "max_age_minutes": {
                        "type": "integer",
                        "minimum": 0,
                        "description": "Entries older than this many minutes are removed (default: forecast cache age)"
                    }
                },
                "additionalProperties": false
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for ClearExpiredCacheHandler {
    #[inline]
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult> {
        let args: ClearCacheArgs = parse_arguments(Self::NAME, params.arguments)?;
        let max_age = args.max_age_minutes.unwrap_or(self.default_max_age_minutes);

        let removed = self.store.lock().await.sweep_expired(max_age);
        Ok(CallToolResult::text(format!(
            "Cleared {} expired cache entries older than {} minutes",
            removed, max_age
        )))
    }
}
