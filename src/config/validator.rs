//! Configuration validator

use std::path::Path;

use log::warn;

use super::defaults::LOG_LEVEL_STR;
use super::error::{ConfigError, Result};
use super::types::ProxyConfig;

/// Validate the configuration
///
/// Runs before a proxy instance starts; an invalid configuration keeps the
/// instance in its initial state.
pub fn validate_config(config: &ProxyConfig) -> Result<()> {
    validate_network_settings(config)?;
    validate_certificate_settings(config)?;
    validate_general_settings(config)?;
    Ok(())
}

impl ProxyConfig {
    /// Validate this configuration
    pub fn validate(&self) -> Result<()> {
        validate_config(self)
    }
}

fn validate_network_settings(config: &ProxyConfig) -> Result<()> {
    if config.node_host.trim().is_empty() {
        return Err(ConfigError::InvalidValue(
            "node_host".to_string(),
            "Node host must not be empty".to_string(),
        ));
    }

    if config.node_port == 0 {
        return Err(ConfigError::InvalidValue(
            "node_port".to_string(),
            "Node port must be greater than 0".to_string(),
        ));
    }

    if config.listen_host.trim().is_empty() {
        return Err(ConfigError::InvalidValue(
            "listen_host".to_string(),
            "Listen host must not be empty".to_string(),
        ));
    }

    if config.listen_host == config.node_host && config.proxy_port == config.node_port {
        return Err(ConfigError::InvalidCombination(
            "Listen and node addresses must be different".to_string(),
        ));
    }

    Ok(())
}

fn validate_certificate_settings(config: &ProxyConfig) -> Result<()> {
    validate_file_exists(&config.cert_path)?;
    validate_file_exists(&config.key_path)?;

    if let Some(ca) = &config.ca_cert_path {
        validate_file_exists(ca)?;
    }
    if let Some(chain) = &config.client_chain_path {
        validate_file_exists(chain)?;
    }

    if let Some(node_id) = &config.node_id {
        if node_id.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "node_id".to_string(),
                "Node identity override must not be empty".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_general_settings(config: &ProxyConfig) -> Result<()> {
    if config.effective_log_level() != config.log_level {
        warn!("Invalid log level: {}. Using default: {}", config.log_level, LOG_LEVEL_STR);
    }

    if config.worker_threads == 0 {
        return Err(ConfigError::InvalidValue(
            "worker_threads".to_string(),
            "Worker threads must be greater than 0".to_string(),
        ));
    }

    if config.max_concurrent_calls == 0 {
        return Err(ConfigError::InvalidValue(
            "max_concurrent_calls".to_string(),
            "Concurrent calls must be greater than 0".to_string(),
        ));
    }

    if config.connection_timeout == 0 {
        return Err(ConfigError::InvalidValue(
            "connection_timeout".to_string(),
            "Connection timeout must be greater than 0".to_string(),
        ));
    }

    if config.call_timeout == Some(0) {
        return Err(ConfigError::InvalidValue(
            "call_timeout".to_string(),
            "Call timeout must be greater than 0 when set".to_string(),
        ));
    }

    if config.max_message_size == Some(0) {
        return Err(ConfigError::InvalidValue(
            "max_message_size".to_string(),
            "Message size limit must be greater than 0 when set".to_string(),
        ));
    }

    Ok(())
}

fn validate_file_exists(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn valid_config(dir: &tempfile::TempDir) -> ProxyConfig {
        let cert = dir.path().join("node.certificate.pem");
        let key = dir.path().join("node.key.pem");
        std::fs::write(&cert, "cert").unwrap();
        std::fs::write(&key, "key").unwrap();
        ProxyConfig::new("127.0.0.1", 50400, 40400, cert, key)
    }

    #[test]
    fn test_valid_config() {
        let dir = tempfile::tempdir().unwrap();
        assert!(validate_config(&valid_config(&dir)).is_ok());
    }

    #[test]
    fn test_missing_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProxyConfig {
            key_path: PathBuf::from("does/not/exist.pem"),
            ..valid_config(&dir)
        };
        assert!(matches!(config.validate(), Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_listen_equals_node() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProxyConfig {
            listen_host: "127.0.0.1".to_string(),
            proxy_port: 50400,
            ..valid_config(&dir)
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidCombination(_))));
    }

    #[test]
    fn test_zero_limits_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let base = valid_config(&dir);

        let config = ProxyConfig { worker_threads: 0, ..base.clone() };
        assert!(config.validate().is_err());

        let config = ProxyConfig { max_concurrent_calls: 0, ..base.clone() };
        assert!(config.validate().is_err());

        let config = ProxyConfig { node_port: 0, ..base.clone() };
        assert!(config.validate().is_err());

        let config = ProxyConfig { call_timeout: Some(0), ..base };
        assert!(config.validate().is_err());
    }
}
