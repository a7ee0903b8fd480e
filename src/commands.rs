use anyhow::{Context, Result, anyhow};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::conversation::ConversationStore;
use crate::current_time::format_current_time;
use crate::geolocation::LocationResolver;
use crate::mcp::prompts::register_prompts;
use crate::mcp::resources::register_resources;
use crate::mcp::tools::register_tools;
use crate::mcp::{McpClient, McpServer, ToolContext, ToolRelay, ToolUse};
use crate::weather::{NwsClient, WeatherSource, format_alerts, format_forecast};

const SERVER_INSTRUCTIONS: &str = "General purpose tools: US weather alerts and forecasts, \
IP-based current time, and a conversation log with a weather cache.";

/// Wire the clients and the shared store from configuration
#[inline]
pub fn build_context(config: &Config) -> Result<ToolContext> {
    let weather = NwsClient::new(&config.weather).context("Failed to create weather client")?;
    let store = ConversationStore::new(&config.cache).into_shared();

    Ok(ToolContext {
        weather: Arc::new(weather),
        locator: Arc::new(LocationResolver::from_config(&config.geolocation)),
        store,
        cache: config.cache.clone(),
    })
}

/// Register every tool, resource and prompt on a fresh server
#[inline]
pub async fn assemble_server(server_name: &str, context: &ToolContext) -> Arc<McpServer> {
    let server = McpServer::new(server_name, env!("CARGO_PKG_VERSION"))
        .with_instructions(SERVER_INSTRUCTIONS);

    register_tools(&server, context).await;
    register_resources(&server, &context.store).await;
    register_prompts(&server).await;

    Arc::new(server)
}

#[inline]
pub async fn build_server(config: &Config) -> Result<Arc<McpServer>> {
    let context = build_context(config)?;
    Ok(assemble_server(&config.server.name, &context).await)
}

/// Run the MCP server on stdio until the client disconnects
#[inline]
pub async fn serve_mcp() -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;
    info!(
        "Starting MCP server '{}' (weather API {})",
        config.server.name, config.weather.base_url
    );

    let server = build_server(&config).await?;
    server.serve_stdio().await
}

/// Print the active alerts for a state
#[inline]
pub async fn show_alerts(state: String) -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;
    let client = NwsClient::new(&config.weather).context("Failed to create weather client")?;

    let alerts = tokio::task::spawn_blocking(move || client.fetch_alerts(&state))
        .await
        .context("Alerts fetch task failed")?;

    println!("{}", format_alerts(alerts.as_ref()));
    Ok(())
}

/// Print the forecast for a coordinate pair
#[inline]
pub async fn show_forecast(latitude: f64, longitude: f64) -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;
    let client = NwsClient::new(&config.weather).context("Failed to create weather client")?;

    let forecast = tokio::task::spawn_blocking(move || client.fetch_forecast(latitude, longitude))
        .await
        .context("Forecast fetch task failed")?;

    println!("{}", format_forecast(forecast.as_ref()));
    Ok(())
}

/// Print the current time for an IP address, or for this machine's public address
#[inline]
pub async fn show_time(ip_address: Option<String>) -> Result<()> {
    let config = Config::load_default().context("Failed to load configuration")?;
    let locator = LocationResolver::from_config(&config.geolocation);

    let lookup = ip_address.clone();
    let location = tokio::task::spawn_blocking(move || locator.locate(lookup.as_deref()))
        .await
        .context("Geolocation task failed")?;

    println!(
        "{}",
        format_current_time(&location, chrono::Utc::now(), ip_address.as_deref())
    );
    Ok(())
}

/// How `call_tool` reaches a server
#[derive(Debug, Clone, Default)]
pub struct RelayTarget {
    /// Defaults to this executable
    pub command: Option<String>,
    /// Defaults to `serve` when `command` is not set
    pub args: Vec<String>,
    pub client_ip: Option<String>,
}

impl RelayTarget {
    fn resolve_command(&self) -> Result<(String, Vec<String>)> {
        match &self.command {
            Some(command) => Ok((command.clone(), self.args.clone())),
            None => {
                let exe = std::env::current_exe().context("Failed to locate current executable")?;
                let args = if self.args.is_empty() {
                    vec!["serve".to_string()]
                } else {
                    self.args.clone()
                };
                Ok((exe.to_string_lossy().into_owned(), args))
            }
        }
    }
}

/// Spawn a server, relay a single tool call to it and print the result
#[inline]
pub async fn call_tool(tool: String, arguments: Option<String>, target: RelayTarget) -> Result<()> {
    let input = parse_tool_arguments(arguments.as_deref())?;
    let (command, args) = target.resolve_command()?;

    let client = McpClient::spawn(&command, &args).await?;
    let mut relay = ToolRelay::new(client).with_client_ip(target.client_ip);

    let tool_use = ToolUse {
        id: "cli-1".to_string(),
        name: tool,
        input,
    };
    let block = relay.dispatch(&tool_use).await;
    relay.shutdown().await?;

    println!("{}", block.content);
    if block.is_error {
        return Err(anyhow!("Tool call {} failed", tool_use.name));
    }
    Ok(())
}

/// Parse `--args` as a JSON object; absent means no arguments
#[inline]
pub fn parse_tool_arguments(arguments: Option<&str>) -> Result<Map<String, Value>> {
    let Some(raw) = arguments.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(Map::new());
    };

    match serde_json::from_str(raw).context("Tool arguments must be valid JSON")? {
        Value::Object(map) => Ok(map),
        other => Err(anyhow!(
            "Tool arguments must be a JSON object, got {}",
            other
        )),
    }
}
