//! Layered settings: defaults, then an optional TOML file, then
//! `PROPERTY_TILES_*` environment variables. CLI flags are applied last by
//! the caller.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::pipeline::audit::AuditSettings;
use crate::pipeline::validate::ValidationRules;
use crate::tiles::TilingOptions;

pub const ENV_PREFIX: &str = "PROPERTY_TILES";
const DEFAULT_CONFIG_NAME: &str = "property_tiles";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Source table (CSV).
    pub input: PathBuf,
    /// GeoJSON document.
    pub output: PathBuf,
    pub rules: ValidationRules,
    pub audit: AuditSettings,
    pub tiling: TilingOptions,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            input: PathBuf::from("property_sales.parquet"),
            output: PathBuf::from("property_sales.geojson"),
            rules: ValidationRules::default(),
            audit: AuditSettings::default(),
            tiling: TilingOptions::default(),
        }
    }
}

impl Settings {
    /// `path` must exist when given; otherwise `property_tiles.{toml,json,...}`
    /// in the working directory is picked up if present.
    pub fn load(path: Option<&Path>) -> Result<Settings, ConfigError> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };
        Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn tile_timeout(&self) -> Option<Duration> {
        self.tiling.timeout_secs.map(Duration::from_secs)
    }
}
