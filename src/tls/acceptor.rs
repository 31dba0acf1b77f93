//! TLS acceptor for the inbound leg

use log::{debug, info};
use openssl::pkey::PKey;
use openssl::ssl::{select_next_proto, AlpnError, SslAcceptor, SslMethod, SslVerifyMode};
use openssl::x509::X509;

use super::identity::ServerIdentity;
use super::H2_ALPN;
use crate::common::{ProxyError, Result};
use crate::config::ClientCertMode;

/// Create the inbound TLS acceptor
///
/// # Parameters
///
/// * `identity` - Certificate chain (leaf first) and key presented to clients
/// * `client_ca` - PEM roots used to verify client certificates
/// * `client_cert_mode` - Whether clients must present a certificate
///
/// # Example
///
/// ```no_run
/// # use grpc_intercept_proxy::tls::{create_tls_acceptor, ServerIdentity};
/// # use grpc_intercept_proxy::config::ClientCertMode;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let identity = ServerIdentity {
///     certificate: std::fs::read("certs/node.certificate.pem")?,
///     private_key: std::fs::read("certs/node.key.pem")?,
/// };
/// let acceptor = create_tls_acceptor(&identity, &identity.certificate, ClientCertMode::None)?;
/// # Ok(())
/// # }
/// ```
pub fn create_tls_acceptor(
    identity: &ServerIdentity,
    client_ca: &[u8],
    client_cert_mode: ClientCertMode,
) -> Result<SslAcceptor> {
    let mut acceptor = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls())?;

    let mut chain = X509::stack_from_pem(&identity.certificate)?.into_iter();
    let leaf = chain
        .next()
        .ok_or_else(|| ProxyError::Certificate("No certificate found in server identity".to_string()))?;
    acceptor.set_certificate(&leaf)?;
    for cert in chain {
        acceptor.add_extra_chain_cert(cert)?;
    }

    let key = PKey::private_key_from_pem(&identity.private_key)?;
    acceptor.set_private_key(&key)?;
    acceptor.check_private_key()?;

    // gRPC clients refuse connections that do not negotiate h2
    acceptor.set_alpn_select_callback(|_, client| {
        select_next_proto(H2_ALPN, client).ok_or(AlpnError::NOACK)
    });

    match client_cert_mode {
        ClientCertMode::Required | ClientCertMode::Optional => {
            for ca in X509::stack_from_pem(client_ca)? {
                acceptor.cert_store_mut().add_cert(ca)?;
            }
        }
        ClientCertMode::None => {}
    }

    match client_cert_mode {
        ClientCertMode::Required => {
            info!("Client certificates required (will be verified)");
            acceptor.set_verify(SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT);
        }
        ClientCertMode::Optional => {
            info!("Client certificates optional (will be verified if provided)");
            acceptor.set_verify(SslVerifyMode::PEER);
        }
        ClientCertMode::None => {
            debug!("Client certificates not requested");
            acceptor.set_verify(SslVerifyMode::NONE);
        }
    }

    Ok(acceptor.build())
}
