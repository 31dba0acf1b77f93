//! Configuration module
//!
//! Loads [`ProxyConfig`] from defaults, an optional JSON file and
//! `GRPC_PROXY_*` environment variables, and validates it before a proxy
//! instance is started.

mod defaults;
mod error;
mod loader;
mod types;
mod validator;

pub use self::defaults::{DEFAULT_CONFIG_FILE, ENV_PREFIX};
pub use self::error::ConfigError;
pub use self::types::ProxyConfig;
pub use self::validator::validate_config;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Client certificate verification mode for the inbound leg
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClientCertMode {
    /// Require client certificate, connection fails if not provided
    Required,
    /// Verify the client certificate if provided but don't require it
    Optional,
    /// Don't verify client certificates
    None,
}

// Case-insensitive, so environment values like `REQUIRED` work
impl<'de> Deserialize<'de> for ClientCertMode {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ClientCertMode::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl Default for ClientCertMode {
    fn default() -> Self {
        defaults::client_cert_mode()
    }
}

impl fmt::Display for ClientCertMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required => write!(f, "required"),
            Self::Optional => write!(f, "optional"),
            Self::None => write!(f, "none"),
        }
    }
}

impl FromStr for ClientCertMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "required" => Ok(Self::Required),
            "optional" => Ok(Self::Optional),
            "none" => Ok(Self::None),
            _ => Err(ConfigError::InvalidValue(
                "client_cert_mode".to_string(),
                format!("{}. Valid values are: required, optional, none", s),
            )),
        }
    }
}
