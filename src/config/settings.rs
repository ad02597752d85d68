//! Settings types and loading from the environment and datasource JSON files.

use crate::config::validate;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
pub const DEFAULT_DATASOURCE_NAME: &str = "local";

fn default_schema() -> String {
    "public".to_string()
}

fn default_max_connections() -> u32 {
    5
}

/// Where Pokemon records are persisted. Matches the datasource JSON file, tagged by `connector`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "connector", rename_all = "lowercase")]
pub enum DataSourceConfig {
    Memory {
        name: String,
        #[serde(default)]
        file: Option<PathBuf>,
    },
    Postgresql {
        name: String,
        url: String,
        #[serde(default = "default_schema")]
        schema: String,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
}

impl DataSourceConfig {
    pub fn name(&self) -> &str {
        match self {
            DataSourceConfig::Memory { name, .. } | DataSourceConfig::Postgresql { name, .. } => name,
        }
    }

    pub fn connector(&self) -> &'static str {
        match self {
            DataSourceConfig::Memory { .. } => "memory",
            DataSourceConfig::Postgresql { .. } => "postgresql",
        }
    }

    /// Parse a datasource JSON document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Load(format!("datasource file: {}", e)))
    }
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        DataSourceConfig::Memory {
            name: DEFAULT_DATASOURCE_NAME.to_string(),
            file: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub host: IpAddr,
    pub port: u16,
    pub max_body_bytes: usize,
    pub data_source: DataSourceConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            host: DEFAULT_HOST,
            port: DEFAULT_PORT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            data_source: DataSourceConfig::default(),
        }
    }
}

impl Settings {
    /// Read settings from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup` (env var name to value). Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let host = match get("POKEDEX_HOST") {
            Some(v) => v.parse::<IpAddr>().map_err(|e| ConfigError::Invalid {
                key: "POKEDEX_HOST",
                reason: e.to_string(),
            })?,
            None => DEFAULT_HOST,
        };
        let port = match get("POKEDEX_PORT") {
            Some(v) => v.parse::<u16>().map_err(|e| ConfigError::Invalid {
                key: "POKEDEX_PORT",
                reason: e.to_string(),
            })?,
            None => DEFAULT_PORT,
        };
        let max_body_bytes = match get("POKEDEX_MAX_BODY_BYTES") {
            Some(v) => v.parse::<usize>().map_err(|e| ConfigError::Invalid {
                key: "POKEDEX_MAX_BODY_BYTES",
                reason: e.to_string(),
            })?,
            None => DEFAULT_MAX_BODY_BYTES,
        };

        let data_source = if let Some(path) = get("POKEDEX_DATASOURCE") {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::Load(format!("{}: {}", path, e)))?;
            DataSourceConfig::from_json(&text)?
        } else if let Some(url) = get("DATABASE_URL") {
            DataSourceConfig::Postgresql {
                name: "db".to_string(),
                url,
                schema: get("POKEDEX_SCHEMA").unwrap_or_else(default_schema),
                max_connections: default_max_connections(),
            }
        } else {
            DataSourceConfig::default()
        };

        let settings = Settings {
            host,
            port,
            max_body_bytes,
            data_source,
        };
        validate(&settings)?;
        Ok(settings)
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
