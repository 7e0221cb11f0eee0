//! Configuration for the collector and the agent.
//!
//! Each field resolves independently: command-line flag, then environment
//! variable, then config file, then the built-in default.

mod agent_config;
mod server_config;

pub use agent_config::{AgentArgs, AgentConfig};
pub use server_config::{ServerArgs, ServerConfig};

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_ADDRESS: &str = "127.0.0.1:8080";
pub const DEFAULT_STORE_FILE: &str = "/tmp/devops-metrics-db.json";
pub const DEFAULT_STORE_INTERVAL: Duration = Duration::from_secs(300);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_TELEMETRY_INTERVAL: Duration = Duration::from_secs(60);

/// Parse `500ms`, `10s`, `5m`, `1h` or a bare number of seconds.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (number, unit) = raw.split_at(split);
    let value: u64 = number
        .parse()
        .map_err(|_| format!("invalid duration '{}'", raw))?;
    match unit {
        "" | "s" => Ok(Duration::from_secs(value)),
        "ms" => Ok(Duration::from_millis(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 3600)),
        other => Err(format!("unknown duration unit '{}' in '{}'", other, raw)),
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Seconds(secs)) => Ok(Some(Duration::from_secs(secs))),
        Some(Raw::Text(text)) => parse_duration(&text)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// Optional settings file shared by both binaries. Unknown keys are ignored
/// so one file can configure the collector and the agent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    pub address: Option<String>,
    pub key: Option<String>,
    pub crypto_key: Option<PathBuf>,
    pub store_file: Option<PathBuf>,
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub store_interval: Option<Duration>,
    pub restore: Option<bool>,
    pub database_dsn: Option<String>,
    pub trusted_subnet: Option<String>,
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub poll_interval: Option<Duration>,
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub report_interval: Option<Duration>,
    #[serde(default, deserialize_with = "deserialize_duration")]
    pub telemetry_interval: Option<Duration>,
}

/// Read a JSON or TOML (by `.toml` extension) config file.
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {:?}", path))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    if is_toml {
        toml::from_str(&content).with_context(|| format!("Failed to parse TOML config {:?}", path))
    } else {
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON config {:?}", path))
    }
}

/// Empty strings disable optional settings.
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub(crate) fn non_empty_path(value: Option<PathBuf>) -> Option<PathBuf> {
    value.filter(|p| !p.as_os_str().is_empty())
}
