//! Configuration loader
//!
//! Layers, lowest priority first: serde defaults, JSON file, environment.
//! Command line overrides are applied by the binary on top.

use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use log::debug;

use super::defaults::ENV_PREFIX;
use super::error::{ConfigError, Result};
use super::types::ProxyConfig;

impl ProxyConfig {
    /// Load configuration from an optional file plus the environment
    ///
    /// A path that is given must exist; without one only defaults and
    /// `GRPC_PROXY_*` variables apply.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            if !path.is_file() {
                return Err(ConfigError::FileNotFound(path.to_path_buf()));
            }
            debug!("Loading configuration from {}", path.display());
            builder = builder.add_source(File::from(path).format(FileFormat::Json).required(true));
        }

        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        let config = builder.build()?.try_deserialize::<Self>()?;
        Ok(config)
    }
}
