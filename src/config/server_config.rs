use crate::config::{
    ConfigFile, DEFAULT_ADDRESS, DEFAULT_STORE_FILE, DEFAULT_STORE_INTERVAL,
    DEFAULT_TELEMETRY_INTERVAL, load_config_file, non_empty, non_empty_path, parse_duration,
};
use crate::infrastructure::security::TrustedSubnet;
use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::time::Duration;

/// Metrics collector
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "server", version, about)]
pub struct ServerArgs {
    /// Listen address (host:port)
    #[arg(short = 'a', long, env = "ADDRESS")]
    pub address: Option<String>,

    /// Shared HMAC key; empty disables hash verification
    #[arg(short = 'k', long, env = "KEY")]
    pub key: Option<String>,

    /// PEM private key used to decrypt request bodies
    #[arg(long = "crypto-key", env = "CRYPTO_KEY")]
    pub crypto_key: Option<PathBuf>,

    /// Snapshot file; empty disables it, and without a value it is only on when no database is set
    #[arg(short = 'f', long = "store-file", env = "STORE_FILE")]
    pub store_file: Option<PathBuf>,

    /// Snapshot period; 0 writes after every update
    #[arg(short = 'i', long = "store-interval", env = "STORE_INTERVAL", value_parser = parse_duration)]
    pub store_interval: Option<Duration>,

    /// Restore the store from a backend on boot
    #[arg(
        short = 'r',
        long,
        env = "RESTORE",
        action = ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub restore: Option<bool>,

    /// SQLite DSN, e.g. sqlite://metrics.db
    #[arg(short = 'd', long = "database-dsn", env = "DATABASE_DSN")]
    pub database_dsn: Option<String>,

    /// Only accept requests whose X-Real-IP is in this CIDR
    #[arg(short = 't', long = "trusted-subnet", env = "TRUSTED_SUBNET")]
    pub trusted_subnet: Option<String>,

    /// Self-telemetry log period
    #[arg(long = "telemetry-interval", env = "TELEMETRY_INTERVAL", value_parser = parse_duration)]
    pub telemetry_interval: Option<Duration>,

    /// JSON or TOML config file
    #[arg(short = 'c', long, env = "CONFIG")]
    pub config: Option<PathBuf>,
}

/// Resolved collector settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: String,
    pub key: Option<String>,
    pub crypto_key: Option<PathBuf>,
    pub store_file: Option<PathBuf>,
    pub store_interval: Duration,
    pub restore: bool,
    pub database_dsn: Option<String>,
    pub trusted_subnet: Option<TrustedSubnet>,
    pub telemetry_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            key: None,
            crypto_key: None,
            store_file: Some(PathBuf::from(DEFAULT_STORE_FILE)),
            store_interval: DEFAULT_STORE_INTERVAL,
            restore: true,
            database_dsn: None,
            trusted_subnet: None,
            telemetry_interval: DEFAULT_TELEMETRY_INTERVAL,
        }
    }
}

impl ServerConfig {
    /// Parse the process arguments and environment.
    pub fn load() -> Result<Self> {
        Self::from_args(ServerArgs::parse())
    }

    pub fn from_args(args: ServerArgs) -> Result<Self> {
        let file = match &args.config {
            Some(path) => load_config_file(path)?,
            None => ConfigFile::default(),
        };
        Self::resolve(args, file)
    }

    /// Merge flag/env values over file values over defaults.
    pub fn resolve(args: ServerArgs, file: ConfigFile) -> Result<Self> {
        let defaults = Self::default();

        let trusted_subnet = non_empty(args.trusted_subnet.or(file.trusted_subnet))
            .map(|cidr| {
                cidr.parse::<TrustedSubnet>()
                    .map_err(anyhow::Error::msg)
                    .with_context(|| format!("Invalid trusted subnet '{}'", cidr))
            })
            .transpose()?;

        let database_dsn = non_empty(args.database_dsn.or(file.database_dsn));

        Ok(Self {
            address: args.address.or(file.address).unwrap_or(defaults.address),
            key: non_empty(args.key.or(file.key)),
            crypto_key: non_empty_path(args.crypto_key.or(file.crypto_key)),
            // An explicitly empty path disables the file backend. With a
            // database configured the file is only used when asked for.
            store_file: match args.store_file.or(file.store_file) {
                Some(path) => non_empty_path(Some(path)),
                None if database_dsn.is_some() => None,
                None => defaults.store_file,
            },
            store_interval: args
                .store_interval
                .or(file.store_interval)
                .unwrap_or(defaults.store_interval),
            restore: args.restore.or(file.restore).unwrap_or(defaults.restore),
            database_dsn,
            trusted_subnet,
            telemetry_interval: args
                .telemetry_interval
                .or(file.telemetry_interval)
                .unwrap_or(defaults.telemetry_interval),
        })
    }

    /// Snapshot writes happen inline with each update.
    pub fn synchronous_snapshots(&self) -> bool {
        self.store_interval.is_zero()
    }
}
