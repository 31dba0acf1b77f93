//! Identity material for both TLS legs

use std::fmt;

use log::debug;

use super::cert::certificate_common_name;
use crate::common::{read_file, ProxyError, Result};
use crate::config::ProxyConfig;

/// Trust and identity for the outbound leg
///
/// Read once when a proxy starts and shared read-only by every call.
#[derive(Clone, PartialEq, Eq)]
pub struct IdentityMaterial {
    /// PEM certificates trusted as roots when verifying the node
    pub root_trust: Vec<u8>,
    /// PEM private key
    pub private_key: Vec<u8>,
    /// PEM client certificate chain presented to the node
    pub cert_chain: Option<Vec<u8>>,
    /// Name the node certificate must carry; also sent as the `:authority`
    pub peer_identity: Option<String>,
}

impl IdentityMaterial {
    /// Root trust and key only; no client certificate is presented
    pub fn new(root_trust: impl Into<Vec<u8>>, private_key: impl Into<Vec<u8>>) -> Self {
        Self {
            root_trust: root_trust.into(),
            private_key: private_key.into(),
            cert_chain: None,
            peer_identity: None,
        }
    }

    /// Present `chain` as the client certificate
    pub fn with_cert_chain(mut self, chain: impl Into<Vec<u8>>) -> Self {
        self.cert_chain = Some(chain.into());
        self
    }

    /// Verify the node against `identity` instead of its host name
    pub fn with_peer_identity(mut self, identity: impl Into<String>) -> Self {
        self.peer_identity = Some(identity.into());
        self
    }

    /// Check the required parts are present
    pub fn validate(&self) -> Result<()> {
        if self.root_trust.is_empty() {
            return Err(ProxyError::Certificate("Root trust material is empty".to_string()));
        }
        if self.private_key.is_empty() {
            return Err(ProxyError::Certificate("Private key material is empty".to_string()));
        }
        Ok(())
    }
}

// Keys stay out of logs
impl fmt::Debug for IdentityMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityMaterial")
            .field("root_trust", &format_args!("{} bytes", self.root_trust.len()))
            .field("private_key", &"<redacted>")
            .field("cert_chain", &self.cert_chain.as_ref().map(|c| c.len()))
            .field("peer_identity", &self.peer_identity)
            .finish()
    }
}

/// Certificate and key presented to inbound clients
#[derive(Clone, PartialEq, Eq)]
pub struct ServerIdentity {
    /// PEM certificate chain, leaf first
    pub certificate: Vec<u8>,
    /// PEM private key
    pub private_key: Vec<u8>,
}

impl fmt::Debug for ServerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerIdentity")
            .field("certificate", &format_args!("{} bytes", self.certificate.len()))
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Read the identity files named by `config`
///
/// # Returns
///
/// The inbound server identity and the outbound identity material. The peer
/// identity is `config.node_id`, or the certificate's common name.
///
/// # Errors
///
/// Configuration errors for missing files, certificate errors for material
/// that does not parse.
pub fn load_identities(config: &ProxyConfig) -> Result<(ServerIdentity, IdentityMaterial)> {
    let certificate = read_file(&config.cert_path)?;
    let private_key = read_file(&config.key_path)?;
    let root_trust = read_file(config.root_trust_path())?;

    let peer_identity = match &config.node_id {
        Some(id) => id.clone(),
        None => {
            let cn = certificate_common_name(&certificate)?;
            debug!("Using certificate common name {} as node identity", cn);
            cn
        }
    };

    let mut material = IdentityMaterial::new(root_trust, private_key.clone()).with_peer_identity(peer_identity);
    if let Some(chain_path) = &config.client_chain_path {
        material = material.with_cert_chain(read_file(chain_path)?);
    }
    material.validate()?;

    Ok((ServerIdentity { certificate, private_key }, material))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::generate_self_signed;

    #[test]
    fn test_load_identities_derives_node_id() {
        let dir = tempfile::tempdir().unwrap();
        let (cert, key) = generate_self_signed("a1b2c3").unwrap();
        let cert_path = dir.path().join("node.certificate.pem");
        let key_path = dir.path().join("node.key.pem");
        std::fs::write(&cert_path, &cert).unwrap();
        std::fs::write(&key_path, &key).unwrap();

        let config = ProxyConfig::new("127.0.0.1", 50400, 40400, &cert_path, &key_path);
        let (server, outbound) = load_identities(&config).unwrap();

        assert_eq!(server.certificate, cert);
        assert_eq!(outbound.root_trust, cert);
        assert_eq!(outbound.peer_identity.as_deref(), Some("a1b2c3"));
        assert!(outbound.cert_chain.is_none());

        let config = ProxyConfig { node_id: Some("override".to_string()), ..config };
        let (_, outbound) = load_identities(&config).unwrap();
        assert_eq!(outbound.peer_identity.as_deref(), Some("override"));
    }

    #[test]
    fn test_missing_files_are_config_errors() {
        let config = ProxyConfig::new("127.0.0.1", 50400, 40400, "missing.pem", "missing.key");
        assert!(matches!(load_identities(&config), Err(ProxyError::Config(_))));
    }

    #[test]
    fn test_validate_and_debug() {
        assert!(IdentityMaterial::new(Vec::new(), b"key".to_vec()).validate().is_err());
        assert!(IdentityMaterial::new(b"root".to_vec(), Vec::new()).validate().is_err());

        let material = IdentityMaterial::new(b"root".to_vec(), b"secret".to_vec());
        assert!(material.validate().is_ok());
        assert!(!format!("{:?}", material).contains("secret"));
    }
}
