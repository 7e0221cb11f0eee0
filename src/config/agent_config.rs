use crate::config::{
    ConfigFile, DEFAULT_ADDRESS, DEFAULT_POLL_INTERVAL, DEFAULT_REPORT_INTERVAL,
    load_config_file, non_empty, non_empty_path, parse_duration,
};
use anyhow::{Result, ensure};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SEND_RETRIES: u32 = 2;

/// Metrics agent
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "agent", version, about)]
pub struct AgentArgs {
    /// Collector address (host:port or URL)
    #[arg(short = 'a', long, env = "ADDRESS")]
    pub address: Option<String>,

    /// Shared HMAC key; empty disables signing
    #[arg(short = 'k', long, env = "KEY")]
    pub key: Option<String>,

    /// Collector public key (PEM or ssh-rsa authorized_keys line); enables body encryption
    #[arg(long = "crypto-key", env = "CRYPTO_KEY")]
    pub crypto_key: Option<PathBuf>,

    /// Sampling period
    #[arg(short = 'p', long = "poll-interval", env = "POLL_INTERVAL", value_parser = parse_duration)]
    pub poll_interval: Option<Duration>,

    /// Reporting period
    #[arg(short = 'r', long = "report-interval", env = "REPORT_INTERVAL", value_parser = parse_duration)]
    pub report_interval: Option<Duration>,

    /// Transient-failure retries within one report
    #[arg(long = "send-retries", env = "SEND_RETRIES")]
    pub send_retries: Option<u32>,

    /// JSON or TOML config file
    #[arg(short = 'c', long, env = "CONFIG")]
    pub config: Option<PathBuf>,
}

/// Resolved agent settings
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub address: String,
    pub key: Option<String>,
    pub crypto_key: Option<PathBuf>,
    pub poll_interval: Duration,
    pub report_interval: Duration,
    pub send_retries: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            key: None,
            crypto_key: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            report_interval: DEFAULT_REPORT_INTERVAL,
            send_retries: DEFAULT_SEND_RETRIES,
        }
    }
}

impl AgentConfig {
    pub fn load() -> Result<Self> {
        Self::from_args(AgentArgs::parse())
    }

    pub fn from_args(args: AgentArgs) -> Result<Self> {
        let file = match &args.config {
            Some(path) => load_config_file(path)?,
            None => ConfigFile::default(),
        };
        Self::resolve(args, file)
    }

    pub fn resolve(args: AgentArgs, file: ConfigFile) -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            address: args.address.or(file.address).unwrap_or(defaults.address),
            key: non_empty(args.key.or(file.key)),
            crypto_key: non_empty_path(args.crypto_key.or(file.crypto_key)),
            poll_interval: args
                .poll_interval
                .or(file.poll_interval)
                .unwrap_or(defaults.poll_interval),
            report_interval: args
                .report_interval
                .or(file.report_interval)
                .unwrap_or(defaults.report_interval),
            send_retries: args.send_retries.unwrap_or(defaults.send_retries),
        };
        ensure!(!config.poll_interval.is_zero(), "poll interval must be positive");
        ensure!(!config.report_interval.is_zero(), "report interval must be positive");
        Ok(config)
    }
}
