//! Particle CLI - Command-line tool for the Particle device cloud
//!
//! Lists devices, reads variables, calls functions and follows event streams.

mod commands;
mod config;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use particle_client::{Client, ClientConfig, EventScope};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Config;
use crate::output::{OutputContext, OutputFormat};

#[derive(Parser)]
#[command(name = "particle")]
#[command(author, version, about = "Particle device cloud CLI")]
#[command(propagate_version = true)]
struct Cli {
    /// API base URL (defaults to the Particle cloud)
    #[arg(short, long, env = "PARTICLE_API")]
    server: Option<String>,

    /// Access token
    #[arg(short, long, env = "PARTICLE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Configuration file path
    #[arg(short, long, env = "PARTICLE_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum)]
    output: Option<OutputFormat>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// Minimal output (for scripting)
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List devices on the account
    Devices,

    /// Show device details
    Device {
        /// Device ID
        id: String,
    },

    /// Read a cloud variable
    Get {
        /// Device ID
        device: String,

        /// Variable name
        variable: String,
    },

    /// Call a cloud function
    Call {
        /// Device ID
        device: String,

        /// Function name
        function: String,

        /// Argument passed to the function
        arg: Option<String>,
    },

    /// Follow an event stream (SSE)
    Events {
        /// Only events from this device
        #[arg(long, conflicts_with = "mine")]
        device: Option<String>,

        /// Only events from the account's own devices
        #[arg(long)]
        mine: bool,

        /// Event name prefix to filter on
        #[arg(long)]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Load config file
    let config = if let Some(config_path) = &cli.config {
        Config::load_from(config_path)?
    } else {
        Config::load().unwrap_or_default()
    };

    // Merge CLI args with config
    let merged = config.merge_with_args(
        cli.server.as_deref(),
        cli.token.as_deref(),
        cli.output.map(|f| f.as_str()),
        cli.no_color,
    );

    let format = OutputFormat::from_str(&merged.output, true)
        .map_err(|e| anyhow::anyhow!("Invalid output format '{}': {}", merged.output, e))?;

    // Create output context
    let ctx = OutputContext::new(format, merged.no_color, cli.quiet);

    let client = create_client(&merged.server, merged.token.as_deref())?;

    // Execute command
    match &cli.command {
        Commands::Devices => {
            commands::devices(&client, &ctx).await?;
        }

        Commands::Device { id } => {
            commands::device(&client, id, &ctx).await?;
        }

        Commands::Get { device, variable } => {
            commands::get(&client, device, variable, &ctx).await?;
        }

        Commands::Call {
            device,
            function,
            arg,
        } => {
            commands::call(&client, device, function, arg.as_deref(), &ctx).await?;
        }

        Commands::Events { device, mine, name } => {
            let scope = match device {
                Some(id) => EventScope::Device(id.clone()),
                None if *mine => EventScope::Mine,
                None => EventScope::Public,
            };
            commands::events(&client, scope, name.as_deref(), &ctx).await?;
        }
    }

    Ok(())
}

/// Create a cloud client for the given server URL and token
fn create_client(server: &str, token: Option<&str>) -> Result<Client> {
    let token = token.context(
        "No access token: pass --token, set PARTICLE_TOKEN, or add `token` to the config file",
    )?;
    Client::with_config(server, token, ClientConfig::default())
        .context("Failed to create Particle client")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_events() {
        let cli = Cli::try_parse_from([
            "particle", "-t", "abc", "events", "--device", "dev1", "--name", "temp",
        ])
        .unwrap();

        assert_eq!(cli.token.as_deref(), Some("abc"));
        match cli.command {
            Commands::Events { device, mine, name } => {
                assert_eq!(device.as_deref(), Some("dev1"));
                assert!(!mine);
                assert_eq!(name.as_deref(), Some("temp"));
            }
            _ => panic!("expected events command"),
        }
    }

    #[test]
    fn test_cli_rejects_device_with_mine() {
        assert!(
            Cli::try_parse_from(["particle", "events", "--device", "dev1", "--mine"]).is_err()
        );
    }

    #[test]
    fn test_missing_token() {
        let err = create_client("http://localhost:1", None).unwrap_err();
        assert!(err.to_string().contains("No access token"));
    }
}
