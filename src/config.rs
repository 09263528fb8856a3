//! Runtime settings, layered from built-in defaults, an optional
//! `datatable.{toml,json,yaml}` file and `DATATABLE_*` environment variables.

use std::path::Path;

use ::config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::table::DEFAULT_MAX_EXTENT;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Placeholder reported for absent cells in new tables.
    pub empty_value: String,
    /// Prefix of generated table names.
    pub table_prefix: String,
    /// `tracing` filter directive used when `RUST_LOG` is not set.
    pub log_filter: String,
    /// Address the HTTP endpoint binds to.
    pub listen: String,
    /// Most rows or columns a script may grow a table to.
    pub max_extent: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            empty_value: String::new(),
            table_prefix: "datatable".to_string(),
            log_filter: "info".to_string(),
            listen: "127.0.0.1:8080".to_string(),
            max_extent: DEFAULT_MAX_EXTENT,
        }
    }
}

impl Settings {
    /// Loads settings. An explicit `path` must exist; otherwise a
    /// `datatable.*` file in the working directory is used when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = Settings::default();
        let builder = Config::builder()
            .set_default("empty_value", defaults.empty_value)?
            .set_default("table_prefix", defaults.table_prefix)?
            .set_default("log_filter", defaults.log_filter)?
            .set_default("listen", defaults.listen)?
            .set_default("max_extent", defaults.max_extent as i64)?;
        let builder = match path {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name("datatable").required(false)),
        };
        let settings = builder
            .add_source(Environment::with_prefix("DATATABLE"))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}
