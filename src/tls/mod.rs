//! TLS handling module
//!
//! Builds the openssl contexts for both legs of the proxy and the identity
//! material they are made from.

mod acceptor;
mod cert;
mod connector;
mod identity;

pub use acceptor::create_tls_acceptor;
pub use cert::{
    certificate_common_name, certificate_fingerprint, certificate_subject, generate_self_signed, load_cert,
};
pub use connector::create_tls_connector;
pub use identity::{load_identities, IdentityMaterial, ServerIdentity};

/// ALPN protocol list advertising HTTP/2 only
pub(crate) const H2_ALPN: &[u8] = b"\x02h2";
