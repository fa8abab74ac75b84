mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use log::error;
use rfs::lifecycle;
use rfs::protocol::config::load_config;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Start { config, extra } => {
            // startup validation runs before anything is bound
            if !extra.is_empty() {
                error!("too many arguments: {extra:?}");
                return ExitCode::FAILURE;
            }
            let cfg = match load_config(config) {
                Ok(cfg) => cfg,
                Err(e) => {
                    error!("{e:#}");
                    return ExitCode::FAILURE;
                }
            };
            if let Err(e) = lifecycle::run(&cfg).await {
                error!("{e:#}");
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}
