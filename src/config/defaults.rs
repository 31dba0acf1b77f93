//! Default configuration values
//!
//! Single source of truth for defaults, shared by serde, the CLI and tests.

use std::path::PathBuf;

use super::ClientCertMode;

/// Environment variable prefix (`GRPC_PROXY_NODE_PORT`, `GRPC_PROXY_CERT_PATH`, ...)
pub const ENV_PREFIX: &str = "GRPC_PROXY";

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Default node host as string
pub const NODE_HOST_STR: &str = "127.0.0.1";

/// Default node gRPC port
pub const NODE_PORT: u16 = 50400;

/// Default listen host as string
pub const LISTEN_HOST_STR: &str = "0.0.0.0";

/// Default proxy (listen) port
pub const PROXY_PORT: u16 = 40400;

/// Default certificate path as string
pub const CERT_PATH_STR: &str = "certs/node.certificate.pem";

/// Default private key path as string
pub const KEY_PATH_STR: &str = "certs/node.key.pem";

/// Default log level as string
pub const LOG_LEVEL_STR: &str = "info";

/// Log levels accepted in `log_level`
pub const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

/// Default node host
pub fn node_host() -> String {
    NODE_HOST_STR.to_string()
}

/// Default node port
pub fn node_port() -> u16 {
    NODE_PORT
}

/// Default listen host
pub fn listen_host() -> String {
    LISTEN_HOST_STR.to_string()
}

/// Default proxy port
pub fn proxy_port() -> u16 {
    PROXY_PORT
}

/// Default certificate path
pub fn cert_path() -> PathBuf {
    PathBuf::from(CERT_PATH_STR)
}

/// Default private key path
pub fn key_path() -> PathBuf {
    PathBuf::from(KEY_PATH_STR)
}

/// Default log level
pub fn log_level() -> String {
    LOG_LEVEL_STR.to_string()
}

/// Inbound clients are not asked for a certificate by default
pub fn client_cert_mode() -> ClientCertMode {
    ClientCertMode::None
}

/// One runtime worker
pub fn worker_threads() -> usize {
    1
}

/// One call in flight at a time
pub fn max_concurrent_calls() -> usize {
    1
}

/// Default dial timeout in seconds
pub fn connection_timeout() -> u64 {
    10
}

/// Zero-grace stop
pub fn shutdown_grace() -> u64 {
    0
}
