//! Configuration for a registration session.

use std::{env, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    context::Context,
    map::MapType,
    request::{RegistrationRequest, DEFAULT_SEPARATOR},
};

/// Where and as whom maps are registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TgisConfig {
    /// The current mapset. Datasets are created here.
    pub mapset: String,

    /// Other mapsets that names are resolved against, in order.
    pub search_path: Vec<String>,

    /// Recorded as creator of maps that have no creation history.
    pub user: String,

    /// Separates map names from times in map list files.
    pub separator: char,

    /// Directory holding the temporal database, for file backed registries.
    pub database: Option<PathBuf>,
}

impl Default for TgisConfig {
    fn default() -> Self {
        Self {
            mapset: String::from("PERMANENT"),
            search_path: vec![],
            user: env::var("USER").unwrap_or_else(|_| String::from("unknown")),
            separator: DEFAULT_SEPARATOR,
            database: None,
        }
    }
}

impl TgisConfig {
    /// Load config from a TOML string, falling back to defaults for missing fields.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    pub fn context(&self) -> Context {
        Context::new(&self.mapset, &self.user).with_search_path(self.search_path.iter().cloned())
    }

    /// Start a registration request that reads map lists with the configured separator.
    pub fn request(&self, map_type: MapType) -> RegistrationRequest {
        RegistrationRequest::new(map_type).separator(self.separator)
    }
}
