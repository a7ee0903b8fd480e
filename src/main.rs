use clap::{Parser, Subcommand};
use general_tools_mcp::Result;
use general_tools_mcp::commands::{
    RelayTarget, call_tool, serve_mcp, show_alerts, show_forecast, show_time,
};
use general_tools_mcp::config::{run_interactive_config, show_config};

#[derive(Parser)]
#[command(name = "general-tools-mcp")]
#[command(about = "MCP server exposing weather, time and conversation-cache tools")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure weather, geolocation and cache settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Start MCP server on stdio
    Serve,
    /// Print active weather alerts for a US state
    Alerts {
        /// Two-letter state code, e.g. CA
        state: String,
    },
    /// Print the forecast for a location
    Forecast {
        #[arg(allow_negative_numbers = true)]
        latitude: f64,
        #[arg(allow_negative_numbers = true)]
        longitude: f64,
    },
    /// Print the current time, located by IP address
    Time {
        /// IP address to locate; defaults to this machine's public address
        #[arg(long)]
        ip: Option<String>,
    },
    /// Relay one tool call to a spawned MCP server and print the result
    Call {
        /// Tool name, or read_resource
        tool: String,
        /// Tool arguments as a JSON object
        #[arg(long)]
        args: Option<String>,
        /// End-user IP injected into get_current_time
        #[arg(long)]
        client_ip: Option<String>,
        /// Server command to spawn (defaults to this binary)
        #[arg(long)]
        server_command: Option<String>,
        /// Argument for the server command; repeatable
        #[arg(long = "server-arg", allow_hyphen_values = true)]
        server_args: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the protocol when serving
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Serve => {
            serve_mcp().await?;
        }
        Commands::Alerts { state } => {
            show_alerts(state).await?;
        }
        Commands::Forecast {
            latitude,
            longitude,
        } => {
            show_forecast(latitude, longitude).await?;
        }
        Commands::Time { ip } => {
            show_time(ip).await?;
        }
        Commands::Call {
            tool,
            args,
            client_ip,
            server_command,
            server_args,
        } => {
            let target = RelayTarget {
                command: server_command,
                args: server_args,
                client_ip,
            };
            call_tool(tool, args, target).await?;
        }
    }

    Ok(())
}
