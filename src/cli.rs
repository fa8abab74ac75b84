use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rfs", version, about = "RFS daemon CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the RFS daemon with config file
    Start {
        #[arg(short, long)]
        config: PathBuf,

        // captured so stray positionals exit with status 1 instead of
        // clap's usage error
        #[arg(hide = true)]
        extra: Vec<String>,
    },
}
