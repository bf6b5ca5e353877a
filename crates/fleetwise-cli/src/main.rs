//! fleetwise CLI - run delivery orchestrations from the terminal
//!
//! Responses are printed to stdout as JSON; logs go to stderr.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fleetwise_runtime::{ConfigError, Orchestrator, OrchestratorError, RuntimeConfig};

/// Exit code for bad input or bad configuration.
const EXIT_USAGE: u8 = 2;

/// fleetwise CLI application
#[derive(Parser)]
#[command(name = "fleetwise")]
#[command(about = "Delivery feasibility from weather, traffic and fleet services", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide whether a delivery should go ahead
    Optimize {
        /// Service registry (YAML, or JSON with a .json extension)
        #[arg(short, long, env = "FLEETWISE_CONFIG")]
        config: PathBuf,

        /// Destination city
        #[arg(long)]
        city: Option<String>,

        /// Required capacity in kilograms
        #[arg(long)]
        capacity: Option<String>,

        /// Run the same request this many times
        #[arg(long, default_value_t = 1)]
        repeat: u32,

        /// Print single-line JSON
        #[arg(long)]
        compact: bool,

        /// Also print metrics and circuit breaker states
        #[arg(long)]
        stats: bool,
    },

    /// Load and validate a config, then print it fully resolved
    CheckConfig {
        #[arg(short, long, env = "FLEETWISE_CONFIG")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            if is_usage_error(&e) {
                ExitCode::from(EXIT_USAGE)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

async fn run(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Optimize {
            config,
            city,
            capacity,
            repeat,
            compact,
            stats,
        } => {
            let config = load_config(&config)?;
            let orchestrator = Orchestrator::from_config(config)?;

            for _ in 0..repeat.max(1) {
                let response = orchestrator
                    .optimize_delivery(city.as_deref(), capacity.as_deref())
                    .await?;
                print_json(&*response, compact)?;
            }

            if stats {
                print_json(&orchestrator.health(Instant::now()).await, compact)?;
            }
            Ok(())
        }
        Commands::CheckConfig { config } => {
            let config = load_config(&config)?;
            tracing::info!("Configuration is valid");
            print_json(&config, false)
        }
    }
}

fn load_config(path: &Path) -> anyhow::Result<RuntimeConfig> {
    RuntimeConfig::from_file(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}

fn print_json<T: Serialize>(value: &T, compact: bool) -> anyhow::Result<()> {
    let json = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{}", json);
    Ok(())
}

fn is_usage_error(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        cause.downcast_ref::<ConfigError>().is_some()
            || matches!(
                cause.downcast_ref::<OrchestratorError>(),
                Some(OrchestratorError::Validation(_) | OrchestratorError::Config(_))
            )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use fleetwise_core::ValidationError;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_optimize() {
        let cli = Cli::try_parse_from([
            "fleetwise", "optimize", "--config", "registry.yaml", "--city", "Colombo",
            "--capacity", "500", "--repeat", "3", "--stats",
        ])
        .unwrap();

        match cli.command {
            Commands::Optimize {
                city,
                capacity,
                repeat,
                stats,
                compact,
                ..
            } => {
                assert_eq!(city.as_deref(), Some("Colombo"));
                assert_eq!(capacity.as_deref(), Some("500"));
                assert_eq!(repeat, 3);
                assert!(stats);
                assert!(!compact);
            }
            Commands::CheckConfig { .. } => panic!("expected optimize"),
        }
    }

    #[test]
    fn test_usage_errors() {
        let validation = anyhow::Error::from(OrchestratorError::from(
            ValidationError::MissingField("city"),
        ));
        assert!(is_usage_error(&validation));

        let config = anyhow::Error::from(ConfigError::Invalid("bad".to_string()))
            .context("Failed to load config");
        assert!(is_usage_error(&config));

        assert!(!is_usage_error(&anyhow::anyhow!("stdout closed")));
    }
}
