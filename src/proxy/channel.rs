//! Secure channel factory
//!
//! Opens a fresh TLS-protected HTTP/2 channel to the node for every forwarded
//! call. Channels are never pooled; dropping a [`SecureChannel`] closes the
//! connection.

use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use http::Uri;
use hyper_util::rt::TokioIo;
use log::debug;
use openssl::ssl::SslConnector;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_openssl::SslStream;
use tonic::client::Grpc;
use tonic::transport::Channel;
use tower::service_fn;

use crate::common::{Endpoint, ProxyError, Result};
use crate::tls::{create_tls_connector, IdentityMaterial};

/// Builds outbound channels to one node
///
/// The TLS connector is built once from the identity material; each
/// [`open`](Self::open) dials a new connection with it.
pub struct SecureChannelFactory {
    target: Endpoint,
    connector: SslConnector,
    peer_identity: Option<String>,
    connect_timeout: Duration,
}

impl SecureChannelFactory {
    /// Create a factory for `target`
    ///
    /// # Errors
    ///
    /// `ConnectionSetup` if the endpoint cannot be dialed or the identity
    /// material does not yield a TLS client context.
    pub fn new(target: Endpoint, identity: &IdentityMaterial, connect_timeout: Duration) -> Result<Self> {
        target
            .ensure_dialable()
            .map_err(|e| ProxyError::ConnectionSetup(e.to_string()))?;
        let connector = create_tls_connector(identity)
            .map_err(|e| ProxyError::ConnectionSetup(format!("Invalid identity material: {}", e)))?;

        Ok(Self {
            target,
            connector,
            peer_identity: identity.peer_identity.clone(),
            connect_timeout,
        })
    }

    /// The node this factory dials
    pub fn target(&self) -> &Endpoint {
        &self.target
    }

    /// Name the node certificate is verified against
    pub fn server_name(&self) -> &str {
        self.peer_identity.as_deref().unwrap_or(&self.target.host)
    }

    /// `:authority` sent with every request
    pub fn authority(&self) -> String {
        match &self.peer_identity {
            Some(identity) => identity.clone(),
            None => self.target.to_string(),
        }
    }

    /// Open a new channel
    ///
    /// The dial (TCP connect plus TLS handshake) is bounded by the connect
    /// timeout. Nothing is retried.
    pub async fn open(&self) -> Result<SecureChannel> {
        let address = self.target.to_string();
        let authority = self.authority();
        let origin: Uri = format!("https://{}", authority)
            .parse()
            .map_err(|e| ProxyError::ConnectionSetup(format!("Invalid authority {}: {}", authority, e)))?;

        let connector = self.connector.clone();
        let server_name = self.server_name().to_string();
        let dial_timeout = self.connect_timeout;
        let dial_address = address.clone();

        debug!("Opening secure channel to {} as {}", address, server_name);

        let channel = tonic::transport::Endpoint::from_shared(format!("http://{}", address))
            .map_err(|e| ProxyError::ConnectionSetup(format!("Invalid node address {}: {}", address, e)))?
            .origin(origin)
            .connect_with_connector(service_fn(move |_: Uri| {
                let connector = connector.clone();
                let address = dial_address.clone();
                let server_name = server_name.clone();
                async move {
                    let stream = timeout(dial_timeout, connect_tls(&connector, &address, &server_name))
                        .await
                        .map_err(|_| {
                            ProxyError::ConnectionSetup(format!(
                                "Timed out connecting to {} after {:?}",
                                address, dial_timeout
                            ))
                        })??;
                    Ok::<_, ProxyError>(TokioIo::new(stream))
                }
            }))
            .await
            .map_err(|e| ProxyError::ConnectionSetup(error_chain(&e)))?;

        Ok(SecureChannel { channel, target: address })
    }
}

impl fmt::Debug for SecureChannelFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureChannelFactory")
            .field("target", &self.target)
            .field("peer_identity", &self.peer_identity)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// An open channel to the node, used by exactly one call
pub struct SecureChannel {
    channel: Channel,
    target: String,
}

impl SecureChannel {
    /// gRPC client over this channel
    pub fn client(&self) -> Grpc<Channel> {
        Grpc::new(self.channel.clone())
    }

    /// Address of the node
    pub fn target(&self) -> &str {
        &self.target
    }
}

impl Drop for SecureChannel {
    fn drop(&mut self) {
        debug!("Closing secure channel to {}", self.target);
    }
}

impl fmt::Debug for SecureChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureChannel").field("target", &self.target).finish()
    }
}

/// Open a single outbound channel
///
/// Convenience over [`SecureChannelFactory`] for one-off connections.
pub async fn open_outbound_channel(
    endpoint: &Endpoint,
    identity: &IdentityMaterial,
    connect_timeout: Duration,
) -> Result<SecureChannel> {
    SecureChannelFactory::new(endpoint.clone(), identity, connect_timeout)?
        .open()
        .await
}

async fn connect_tls(connector: &SslConnector, address: &str, server_name: &str) -> Result<SslStream<TcpStream>> {
    let tcp = TcpStream::connect(address)
        .await
        .map_err(|e| ProxyError::ConnectionSetup(format!("Cannot reach {}: {}", address, e)))?;
    tcp.set_nodelay(true)?;

    let ssl = connector.configure()?.into_ssl(server_name)?;
    let mut stream = SslStream::new(ssl, tcp)?;
    Pin::new(&mut stream)
        .connect()
        .await
        .map_err(|e| ProxyError::TlsHandshake(format!("{} as {}: {}", address, server_name, e)))?;

    debug!(
        "TLS established with {} ({})",
        address,
        stream.ssl().version_str()
    );
    Ok(stream)
}

// tonic's transport error hides the cause behind `source()`
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
