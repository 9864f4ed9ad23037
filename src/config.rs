use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid port in allow-list: {0:?}")]
    InvalidPort(String),
    #[error("poll frequency must be at least one second")]
    ZeroFrequency,
}

/// Allow-listed ports as written by the operator.
///
/// Environment variables and flags carry a comma separated string, while
/// TOML and JSON files may also use a number or a list of numbers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PortList {
    List(Vec<u16>),
    Single(u16),
    Text(String),
}

impl PortList {
    pub fn parse(&self) -> Result<BTreeSet<u16>, ConfigError> {
        match self {
            PortList::List(ports) => Ok(ports.iter().copied().collect()),
            PortList::Single(port) => Ok(BTreeSet::from([*port])),
            PortList::Text(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(|item| {
                    item.parse::<u16>()
                        .map_err(|_| ConfigError::InvalidPort(item.to_string()))
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// The remote Marco backend.
    pub marco: String,
    /// The Docker endpoint.
    pub endpoint: String,
    /// Seconds between pushes.
    pub frequency: u64,
    pub ports: PortList,
    /// Base domain appended to every compose record.
    pub domain: String,
    pub project_label: String,
    pub service_label: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            marco: "http://localhost:81".into(),
            endpoint: "unix:///var/run/docker.sock".into(),
            frequency: 15,
            ports: PortList::Text("80,8080,2368,8983".into()),
            domain: String::new(),
            project_label: "io.docker.compose.project".into(),
            service_label: "io.docker.compose.service".into(),
        }
    }
}

/// Command line overrides.  Anything left unset falls through to the
/// environment, the config files and finally the defaults.
#[derive(Debug, Default, Parser, Serialize)]
#[command(name = "marco-compose", about = "Push docker compose backends to Marco")]
pub struct Cli {
    /// Path to a TOML config file.
    #[arg(long, default_value = "marco-compose.toml")]
    #[serde(skip)]
    pub config: PathBuf,
    /// The remote Marco backend.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marco: Option<String>,
    /// The Docker endpoint.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// How often to push to Marco, in seconds.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<u64>,
    /// The ports you wish to proxy, comma separated.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ports: Option<String>,
    /// The base domain for all compose records.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

/// Immutable settings handed to the backend aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    pub allowed_ports: BTreeSet<u16>,
    pub base_domain: Option<String>,
    pub project_label: String,
    pub service_label: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        let config = Config::default();
        Self {
            allowed_ports: BTreeSet::new(),
            base_domain: None,
            project_label: config.project_label,
            service_label: config.service_label,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(Cli::parse())
    }

    pub fn load_from(cli: Cli) -> anyhow::Result<Self> {
        Self::figment(&cli)
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
    }

    fn figment(cli: &Cli) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(&cli.config))
            .merge(Json::file("marco-compose.json"))
            .merge(Env::prefixed("MARCO_COMPOSE_").map(|key| {
                if key.as_str().eq_ignore_ascii_case("url") {
                    "marco".into()
                } else {
                    key.into()
                }
            }))
            .merge(Env::raw().only(&["DOCKER_HOST"]).map(|_| "endpoint".into()))
            .merge(Serialized::defaults(cli))
    }

    pub fn interval(&self) -> Result<Duration, ConfigError> {
        if self.frequency == 0 {
            return Err(ConfigError::ZeroFrequency);
        }
        Ok(Duration::from_secs(self.frequency))
    }

    pub fn discovery(&self) -> Result<DiscoveryConfig, ConfigError> {
        let base_domain = match self.domain.trim() {
            "" => None,
            domain => Some(domain.to_string()),
        };
        Ok(DiscoveryConfig {
            allowed_ports: self.ports.parse()?,
            base_domain,
            project_label: self.project_label.clone(),
            service_label: self.service_label.clone(),
        })
    }
}
