use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

const DEFAULT_NOTIFY_INTERVAL_SECS: u64 = 2;

#[derive(Debug, Deserialize)]
pub struct Config {
    // ip:port the daemon listens on
    pub addr: String,
    // cadence of the callback sender loop, in seconds
    pub notify_interval_secs: Option<u64>,
}

impl Config {
    pub fn notify_interval(&self) -> Duration {
        Duration::from_secs(
            self.notify_interval_secs
                .unwrap_or(DEFAULT_NOTIFY_INTERVAL_SECS),
        )
    }
}

pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let cfg: Config = serde_yaml::from_str(&content).context("Failed to parse YAML config")?;
    Ok(cfg)
}
