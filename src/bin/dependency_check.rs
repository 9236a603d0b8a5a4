//! # Dependency Check
//!
//! Command-line tool that loads the service configuration, bootstraps the
//! selected dependencies with the configured retry policy and reports their
//! breaker state. Exits non-zero when the configuration is invalid or a
//! dependency cannot be reached, so it can gate deployments and container
//! start-up.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use resilience_core::config::ServiceConfig;
use resilience_core::resilience::TracingObserver;
use resilience_core::{ConfigurationError, Dependencies, DependencySet, ResilienceError};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const EXIT_UNAVAILABLE: u8 = 1;
const EXIT_MISCONFIGURED: u8 = 2;
const EXIT_CANCELED: u8 = 130;

#[derive(Parser)]
#[command(name = "dependency-check")]
#[command(about = "Bootstrap service dependencies and report their health")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration file (YAML, TOML or JSON); RESILIENCE__* variables apply on top
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Dependencies to check: store, cache, producer, consumer, broker or all
    #[arg(long, default_value = "all")]
    only: DependencySet,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Bootstrap the selected dependencies (default)
    Connect,

    /// Load and validate configuration without connecting
    Validate,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    resilience_core::logging::init_structured_logging();
    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, canceling dependency check");
            on_signal.cancel();
        }
    });

    let result = match cli.command {
        Some(Commands::Validate) => validate(&cli),
        Some(Commands::Connect) | None => connect(&cli, &cancel).await,
    };

    match result {
        Ok(()) => {
            info!("Dependency check completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Dependency check failed: {:#}", e);
            eprintln!("dependency check failed: {:#}", e);
            ExitCode::from(exit_code_for(&e))
        }
    }
}

fn exit_code_for(error: &anyhow::Error) -> u8 {
    if error.downcast_ref::<ConfigurationError>().is_some() {
        return EXIT_MISCONFIGURED;
    }
    match error.downcast_ref::<ResilienceError>() {
        Some(ResilienceError::Configuration(_)) => EXIT_MISCONFIGURED,
        Some(ResilienceError::Canceled { .. }) => EXIT_CANCELED,
        _ => EXIT_UNAVAILABLE,
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<ServiceConfig> {
    let config = ServiceConfig::load(cli.config.as_ref())?;
    Ok(config)
}

fn validate(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    match cli.format {
        OutputFormat::Table => println!("Configuration is valid"),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&config).context("serializing configuration")?
        ),
    }
    Ok(())
}

async fn connect(cli: &Cli, cancel: &CancellationToken) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    let mut deps =
        Dependencies::connect_selected(&config, cli.only, cancel, Arc::new(TracingObserver)).await?;

    let health = deps.health();
    match cli.format {
        OutputFormat::Table => {
            println!("{:<18} {:<10} SUMMARY", "DEPENDENCY", "STATE");
            for (name, metrics) in &health {
                println!(
                    "{:<18} {:<10} {}",
                    name,
                    metrics.current_state.to_string(),
                    metrics.format_summary()
                );
            }
        }
        OutputFormat::Json => {
            let report: serde_json::Map<String, serde_json::Value> = health
                .iter()
                .map(|(name, metrics)| serde_json::to_value(metrics).map(|value| (name.clone(), value)))
                .collect::<Result<_, serde_json::Error>>()
                .context("serializing breaker metrics")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    deps.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_exit_codes() {
        let canceled = anyhow::Error::new(ResilienceError::Canceled {
            dependency: "store".to_string(),
            phase: "bootstrap",
        });
        assert_eq!(exit_code_for(&canceled), EXIT_CANCELED);

        let missing = anyhow::Error::new(ConfigurationError::missing_required_field(
            "database.url",
            "database configuration",
        ));
        assert_eq!(exit_code_for(&missing), EXIT_MISCONFIGURED);

        let exhausted = anyhow::Error::new(ResilienceError::BootstrapExhausted {
            dependency: "cache".to_string(),
            attempts: 5,
            source: "connection refused".into(),
        });
        assert_eq!(exit_code_for(&exhausted), EXIT_UNAVAILABLE);
    }
}
