//! Taskloop CLI entry point.

use clap::Parser;

use taskloop::cli::{handle_error, Cli, Commands};
use taskloop::infrastructure::config::ConfigLoader;
use taskloop::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Config errors surface again from the command itself; logging falls
    // back to defaults until then.
    let logging = match cli.config.as_deref() {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
    .map(|config| LogConfig::from(&config.logging))
    .unwrap_or_default();

    let _logger = match LoggerImpl::init(&logging) {
        Ok(logger) => logger,
        Err(err) => handle_error(err, cli.json),
    };

    let config_path = cli.config.as_deref();
    let result = match cli.command {
        Commands::Run(args) => {
            taskloop::cli::commands::run::execute(args, cli.json, config_path).await
        }
        Commands::View(args) => {
            taskloop::cli::commands::view::execute(args, cli.json, config_path).await
        }
    };

    if let Err(err) = result {
        handle_error(err, cli.json);
    }
}
