use clap::{Args, Parser};
use std::path::PathBuf;
use std::process::ExitCode;

mod config;
mod observability;

use config::{Config, ConfigError};
use observability::ObservabilityError;

#[derive(Parser)]
#[command(name = "buildstop", about = "Lists and cancels running Jenkins builds")]
enum CliCommand {
    /// Run the gateway
    Serve(ConfigArgs),
    /// Load and validate the config file, then exit
    CheckConfig(ConfigArgs),
}

#[derive(Args)]
struct ConfigArgs {
    #[arg(long, env = "BUILDSTOP_CONFIG", default_value = "buildstop.yaml")]
    config_file: PathBuf,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid configuration: {0}")]
    Validation(#[from] gateway::config::ValidationError),
    #[error(transparent)]
    Observability(#[from] ObservabilityError),
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error(transparent)]
    Gateway(#[from] gateway::GatewayError),
}

fn load(args: &ConfigArgs) -> Result<Config, CliError> {
    let mut config = Config::from_file(&args.config_file)?;
    config.apply_env(|name| std::env::var(name).ok())?;
    config.gateway.validate()?;
    Ok(config)
}

fn run(cli: CliCommand) -> Result<(), CliError> {
    match cli {
        CliCommand::Serve(args) => {
            let config = load(&args)?;
            let _guard = observability::init(&config.common)?;
            tracing::info!(config_file = %args.config_file.display(), "Starting buildstop");

            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            rt.block_on(gateway::serve(config.gateway))?;
        }
        CliCommand::CheckConfig(args) => {
            let config = load(&args)?;
            println!(
                "{} is valid: jenkins at {}, auth mode {:?}, cancel policy {:?}",
                args.config_file.display(),
                config.gateway.jenkins.url,
                config.gateway.auth.mode,
                config.gateway.cancel_policy,
            );
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    match run(CliCommand::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "buildstop failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
