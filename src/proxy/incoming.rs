//! Inbound TLS accept loop
//!
//! Accepts TCP connections, runs the TLS handshakes concurrently and hands
//! established connections to the gRPC server as a stream.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use log::{debug, error, warn};
use openssl::ssl::{Ssl, SslAcceptor};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_openssl::SslStream;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::server::{Connected, TcpConnectInfo};

use crate::common::{ProxyError, Result};

/// Established connections waiting for the server
const ACCEPT_QUEUE: usize = 64;

/// Pause after a failed `accept()` (e.g. out of file descriptors)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// An inbound connection after a successful TLS handshake
pub struct TlsConnection {
    inner: SslStream<TcpStream>,
    connect_info: TcpConnectInfo,
}

impl Connected for TlsConnection {
    type ConnectInfo = TcpConnectInfo;

    fn connect_info(&self) -> Self::ConnectInfo {
        self.connect_info.clone()
    }
}

impl AsyncRead for TlsConnection {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for TlsConnection {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

/// Stream of TLS connections accepted on `listener`
///
/// The accept loop runs as a task on the current runtime and ends when the
/// returned stream is dropped. Failed handshakes, and handshakes not done
/// within `handshake_timeout`, are logged and skipped.
pub fn tls_incoming(
    listener: TcpListener,
    acceptor: Arc<SslAcceptor>,
    handshake_timeout: Duration,
) -> ReceiverStream<io::Result<TlsConnection>> {
    let (tx, rx) = mpsc::channel(ACCEPT_QUEUE);
    tokio::spawn(accept_loop(listener, acceptor, handshake_timeout, tx));
    ReceiverStream::new(rx)
}

async fn accept_loop(
    listener: TcpListener,
    acceptor: Arc<SslAcceptor>,
    handshake_timeout: Duration,
    tx: mpsc::Sender<io::Result<TlsConnection>>,
) {
    let mut handshakes = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("Accepted connection from {}", peer);
                    let acceptor = Arc::clone(&acceptor);
                    let tx = tx.clone();
                    handshakes.spawn(async move {
                        match handshake(stream, &acceptor, handshake_timeout).await {
                            Ok(connection) => {
                                let _ = tx.send(Ok(connection)).await;
                            }
                            Err(e) => warn!("TLS handshake with {} failed: {}", peer, e),
                        }
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            Some(result) = handshakes.join_next(), if !handshakes.is_empty() => {
                if let Err(e) = result {
                    error!("Handshake task error: {}", e);
                }
            }
            _ = tx.closed() => break,
        }
    }

    debug!("Accept loop on {:?} finished", listener.local_addr().ok());
}

async fn handshake(stream: TcpStream, acceptor: &SslAcceptor, limit: Duration) -> Result<TlsConnection> {
    let connect_info = stream.connect_info();
    stream.set_nodelay(true)?;

    let ssl = Ssl::new(acceptor.context())?;
    let mut stream = SslStream::new(ssl, stream)?;
    tokio::time::timeout(limit, Pin::new(&mut stream).accept())
        .await
        .map_err(|_| ProxyError::TlsHandshake(format!("timed out after {:?}", limit)))?
        .map_err(|e| ProxyError::TlsHandshake(e.to_string()))?;

    if let Some(cert) = stream.ssl().peer_certificate() {
        debug!("Client certificate subject: {:?}", cert.subject_name());
    }

    Ok(TlsConnection { inner: stream, connect_info })
}
