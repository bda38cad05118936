use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::app::MAX_WORKERS;
use crate::error::PolymixError;
use crate::error_log::DEFAULT_ERROR_LOG;
use crate::prompt::Prompt;
use crate::resolver::{PolymerKeyPolicy, SessionSettings};

pub const CONFIG_FILE: &str = "polymix.json";
pub const DEFAULT_SOLVENT_GROUP: &str = "CRIPT";

/// One layer of settings. Layers are merged field by field, the first layer
/// that sets a field wins.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub inventory: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub solvent_group: Option<String>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub polymer_key: Option<PolymerKeyPolicy>,
    #[serde(default)]
    pub error_log: Option<String>,
    #[serde(default)]
    pub tls: Option<bool>,
}

impl Config {
    pub fn or(self, fallback: Config) -> Config {
        Config {
            host: self.host.or(fallback.host),
            token: self.token.or(fallback.token),
            group: self.group.or(fallback.group),
            collection: self.collection.or(fallback.collection),
            inventory: self.inventory.or(fallback.inventory),
            path: self.path.or(fallback.path),
            solvent_group: self.solvent_group.or(fallback.solvent_group),
            workers: self.workers.or(fallback.workers),
            polymer_key: self.polymer_key.or(fallback.polymer_key),
            error_log: self.error_log.or(fallback.error_log),
            tls: self.tls.or(fallback.tls),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub host: String,
    pub token: String,
    pub group: String,
    pub collection: String,
    pub inventory: String,
    pub path: Utf8PathBuf,
    pub solvent_group: String,
    pub workers: usize,
    pub polymer_key: PolymerKeyPolicy,
    pub error_log: Utf8PathBuf,
    pub tls: bool,
}

impl ResolvedConfig {
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            group: self.group.clone(),
            collection: self.collection.clone(),
            solvent_group: self.solvent_group.clone(),
            polymer_key: self.polymer_key,
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads the config file. An explicit `path` must exist; otherwise
    /// `polymix.json` in the working directory and then the user config
    /// directory are tried, and no file at all yields an empty layer.
    pub fn load(path: Option<&str>) -> Result<Config, PolymixError> {
        if let Some(path) = path {
            return Self::read(PathBuf::from(path));
        }
        for candidate in Self::default_locations() {
            if candidate.exists() {
                return Self::read(candidate);
            }
        }
        Ok(Config::default())
    }

    pub fn default_locations() -> Vec<PathBuf> {
        let mut locations = vec![PathBuf::from(CONFIG_FILE)];
        if let Some(dirs) = ProjectDirs::from("org", "polymix", "polymix") {
            locations.push(dirs.config_dir().join(CONFIG_FILE));
        }
        locations
    }

    pub fn parse(content: &str) -> Result<Config, PolymixError> {
        serde_json::from_str(content).map_err(|err| PolymixError::ConfigParse(err.to_string()))
    }

    /// Settings taken from `POLYMIX_HOST` and `POLYMIX_TOKEN`.
    pub fn from_env() -> Config {
        let var = |name: &str| {
            std::env::var(name)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        Config {
            host: var("POLYMIX_HOST"),
            token: var("POLYMIX_TOKEN"),
            ..Config::default()
        }
    }

    /// Merges the layers (first wins) and asks for whatever required value
    /// is still missing. Without a prompt a missing value is an error.
    pub fn resolve(
        layers: Vec<Config>,
        mut prompt: Option<&mut dyn Prompt>,
    ) -> Result<ResolvedConfig, PolymixError> {
        let merged = layers
            .into_iter()
            .fold(Config::default(), |merged, layer| merged.or(layer));

        let mut require = |value: Option<String>,
                           field: &'static str,
                           label: &str,
                           secret: bool|
         -> Result<String, PolymixError> {
            let value = match value.filter(|value| !value.trim().is_empty()) {
                Some(value) => value,
                None => match prompt.as_deref_mut() {
                    Some(prompt) if secret => prompt.ask_secret(label)?,
                    Some(prompt) => prompt.ask(label)?,
                    None => return Err(PolymixError::MissingConfigField(field)),
                },
            };
            let value = value.trim().to_string();
            if value.is_empty() {
                return Err(PolymixError::InvalidConfig {
                    field,
                    message: "must not be empty".to_string(),
                });
            }
            Ok(value)
        };

        let host = require(merged.host, "host", "Host (e.g., criptapp.org)", false)?;
        let token = require(merged.token, "token", "API Token", true)?;
        let group = require(merged.group, "group", "Group name", false)?;
        let collection = require(merged.collection, "collection", "Collection name", false)?;
        let inventory = require(merged.inventory, "inventory", "Inventory name", false)?;
        let path = require(merged.path, "path", "Path to CSV file", false)?;
        let path = path.trim_matches(['"', '\'']).to_string();

        let workers = merged.workers.unwrap_or(1);
        if !(1..=MAX_WORKERS).contains(&workers) {
            return Err(PolymixError::InvalidConfig {
                field: "workers",
                message: format!("must be between 1 and {MAX_WORKERS}, got {workers}"),
            });
        }

        Ok(ResolvedConfig {
            host,
            token,
            group,
            collection,
            inventory,
            path: Utf8PathBuf::from(path),
            solvent_group: merged
                .solvent_group
                .unwrap_or_else(|| DEFAULT_SOLVENT_GROUP.to_string()),
            workers,
            polymer_key: merged.polymer_key.unwrap_or_default(),
            error_log: Utf8PathBuf::from(
                merged
                    .error_log
                    .unwrap_or_else(|| DEFAULT_ERROR_LOG.to_string()),
            ),
            tls: merged.tls.unwrap_or(true),
        })
    }

    fn read(path: PathBuf) -> Result<Config, PolymixError> {
        let content = fs::read_to_string(&path)
            .map_err(|_| PolymixError::ConfigRead(path.display().to_string()))?;
        Self::parse(&content)
    }
}
