//! TLS connector for the outbound leg

use log::debug;
use openssl::pkey::PKey;
use openssl::ssl::{SslConnector, SslMethod};
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::X509;

use super::identity::IdentityMaterial;
use super::H2_ALPN;
use crate::common::{ProxyError, Result};

/// Create the outbound TLS connector
///
/// Only certificates from `identity.root_trust` are trusted; the system store
/// is not consulted. The private key is always parsed, but installed only
/// together with a client certificate chain.
pub fn create_tls_connector(identity: &IdentityMaterial) -> Result<SslConnector> {
    identity.validate()?;

    let mut builder = SslConnector::builder(SslMethod::tls_client())?;

    let roots = X509::stack_from_pem(&identity.root_trust)?;
    if roots.is_empty() {
        return Err(ProxyError::Certificate("No certificate found in root trust material".to_string()));
    }
    let mut store = X509StoreBuilder::new()?;
    for root in roots {
        store.add_cert(root)?;
    }
    builder.set_cert_store(store.build());

    let key = PKey::private_key_from_pem(&identity.private_key)?;
    if let Some(chain) = &identity.cert_chain {
        let mut certs = X509::stack_from_pem(chain)?.into_iter();
        let leaf = certs
            .next()
            .ok_or_else(|| ProxyError::Certificate("No certificate found in client chain".to_string()))?;
        builder.set_certificate(&leaf)?;
        for cert in certs {
            builder.add_extra_chain_cert(cert)?;
        }
        builder.set_private_key(&key)?;
        builder.check_private_key()?;
        debug!("Client certificate chain configured for the outbound leg");
    }

    builder.set_alpn_protos(H2_ALPN)?;

    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::generate_self_signed;

    #[test]
    fn test_connector_without_chain() {
        let (cert, key) = generate_self_signed("node-0").unwrap();
        assert!(create_tls_connector(&IdentityMaterial::new(cert, key)).is_ok());
    }

    #[test]
    fn test_connector_with_chain() {
        let (cert, key) = generate_self_signed("node-0").unwrap();
        let material = IdentityMaterial::new(cert.clone(), key).with_cert_chain(cert);
        assert!(create_tls_connector(&material).is_ok());
    }

    #[test]
    fn test_malformed_trust() {
        let (_, key) = generate_self_signed("node-0").unwrap();
        let result = create_tls_connector(&IdentityMaterial::new(b"garbage".to_vec(), key));
        assert!(matches!(result, Err(ProxyError::Certificate(_))));
    }

    #[test]
    fn test_malformed_key() {
        let (cert, _) = generate_self_signed("node-0").unwrap();
        let result = create_tls_connector(&IdentityMaterial::new(cert, b"garbage".to_vec()));
        assert!(matches!(result, Err(ProxyError::Ssl(_))));
    }
}
