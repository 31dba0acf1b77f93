//! Proxy configuration type

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{defaults, ClientCertMode};
use crate::common::{Endpoint, Result};

/// Proxy configuration
///
/// Everything one proxy instance needs: the node it forwards to, the port it
/// listens on, the identity files for both TLS legs and the runtime limits.
/// Every field has a default, so partial JSON files and environment overrides
/// deserialize cleanly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProxyConfig {
    // --- Network settings ---

    /// Host of the real node
    pub node_host: String,

    /// gRPC port of the real node
    pub node_port: u16,

    /// Interface the proxy listens on
    pub listen_host: String,

    /// Port the proxy listens on (0 picks an ephemeral port)
    pub proxy_port: u16,

    // --- Identity settings ---

    /// Certificate presented to inbound clients (PEM, leaf first)
    pub cert_path: PathBuf,

    /// Private key for `cert_path` (PEM)
    pub key_path: PathBuf,

    /// Root trust for the outbound leg; falls back to `cert_path`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_cert_path: Option<PathBuf>,

    /// Client certificate chain presented to the node
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_chain_path: Option<PathBuf>,

    /// Expected node identity, used for name verification and as the
    /// `:authority`. Derived from the certificate common name when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,

    /// Client certificate verification mode for inbound connections
    pub client_cert_mode: ClientCertMode,

    // --- Runtime settings ---

    /// Worker threads of the proxy's dedicated runtime
    pub worker_threads: usize,

    /// Calls served at the same time
    pub max_concurrent_calls: usize,

    /// Dial timeout towards the node, in seconds
    pub connection_timeout: u64,

    /// Per-call deadline towards the node, in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_timeout: Option<u64>,

    /// How long `stop()` lets in-flight calls finish, in seconds
    pub shutdown_grace: u64,

    /// Largest encoded message accepted or produced, in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_message_size: Option<usize>,

    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            node_host: defaults::node_host(),
            node_port: defaults::node_port(),
            listen_host: defaults::listen_host(),
            proxy_port: defaults::proxy_port(),
            cert_path: defaults::cert_path(),
            key_path: defaults::key_path(),
            ca_cert_path: None,
            client_chain_path: None,
            node_id: None,
            client_cert_mode: defaults::client_cert_mode(),
            worker_threads: defaults::worker_threads(),
            max_concurrent_calls: defaults::max_concurrent_calls(),
            connection_timeout: defaults::connection_timeout(),
            call_timeout: None,
            shutdown_grace: defaults::shutdown_grace(),
            max_message_size: None,
            log_level: defaults::log_level(),
        }
    }
}

impl ProxyConfig {
    /// Configuration for proxying `node_host:node_port` on `proxy_port`
    pub fn new(
        node_host: impl Into<String>,
        node_port: u16,
        proxy_port: u16,
        cert_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            node_host: node_host.into(),
            node_port,
            proxy_port,
            cert_path: cert_path.into(),
            key_path: key_path.into(),
            ..Self::default()
        }
    }

    /// The real node
    pub fn node_endpoint(&self) -> Result<Endpoint> {
        Endpoint::new(&self.node_host, self.node_port)
    }

    /// The proxy listener
    pub fn listen_endpoint(&self) -> Result<Endpoint> {
        Endpoint::new(&self.listen_host, self.proxy_port)
    }

    /// Root trust file for the outbound leg
    pub fn root_trust_path(&self) -> &Path {
        self.ca_cert_path.as_deref().unwrap_or(&self.cert_path)
    }

    /// Dial timeout as a `Duration`
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout)
    }

    /// Per-call deadline, if any
    pub fn call_deadline(&self) -> Option<Duration> {
        self.call_timeout.map(Duration::from_secs)
    }

    /// Log level to initialize logging with; unknown levels fall back to the default
    pub fn effective_log_level(&self) -> &str {
        let level = self.log_level.as_str();
        if defaults::LOG_LEVELS.contains(&level) {
            level
        } else {
            defaults::LOG_LEVEL_STR
        }
    }

    /// Grace period granted to in-flight calls on stop
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProxyConfig::default();
        assert_eq!(config.node_endpoint().unwrap().to_string(), "127.0.0.1:50400");
        assert_eq!(config.listen_endpoint().unwrap().to_string(), "0.0.0.0:40400");
        assert_eq!(config.worker_threads, 1);
        assert_eq!(config.max_concurrent_calls, 1);
        assert_eq!(config.grace_period(), Duration::ZERO);
        assert!(config.call_deadline().is_none());
        assert_eq!(config.root_trust_path(), config.cert_path.as_path());
    }

    #[test]
    fn test_partial_json() {
        let config: ProxyConfig =
            serde_json::from_str(r#"{"node_port": 50404, "proxy_port": 40404, "node_id": "abc"}"#).unwrap();
        assert_eq!(config.node_port, 50404);
        assert_eq!(config.proxy_port, 40404);
        assert_eq!(config.node_id.as_deref(), Some("abc"));
        assert_eq!(config.node_host, "127.0.0.1");
    }

    #[test]
    fn test_ca_cert_overrides_root_trust() {
        let config = ProxyConfig {
            ca_cert_path: Some(PathBuf::from("certs/ca.pem")),
            ..ProxyConfig::default()
        };
        assert_eq!(config.root_trust_path(), Path::new("certs/ca.pem"));
    }

    #[test]
    fn test_unknown_log_level_falls_back() {
        let mut config = ProxyConfig::default();
        config.log_level = "debug".to_string();
        assert_eq!(config.effective_log_level(), "debug");

        config.log_level = "verbose".to_string();
        assert_eq!(config.effective_log_level(), "info");
    }
}
