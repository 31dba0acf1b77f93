//! Proxy server runtime
//!
//! Owns the inbound TLS listener of one proxy instance and the execution
//! context serving it. `start()` runs everything on a dedicated OS thread
//! with its own tokio runtime, so the caller's thread is never blocked and
//! the caller may or may not be async itself. `stop()` tears that runtime
//! down, which cancels in-flight calls and releases the port.

use std::fmt;
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, error, info, warn};
use openssl::ssl::SslAcceptor;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tonic::transport::Server;

use super::channel::SecureChannelFactory;
use super::dispatcher::CallDispatcher;
use super::incoming::tls_incoming;
use super::method::ServiceDefinition;
use super::service::ProxyService;
use crate::common::{bind_listener, Endpoint, ProxyError, Result};
use crate::config::ProxyConfig;
use crate::hooks::Hooks;
use crate::tls::{create_tls_acceptor, load_identities};

/// Lifecycle of a proxy instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyState {
    /// Constructed, not yet listening
    Created,
    /// Listening and serving calls
    Running,
    /// Stopped; the instance cannot be restarted
    Stopped,
}

impl fmt::Display for ProxyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyState::Created => write!(f, "created"),
            ProxyState::Running => write!(f, "running"),
            ProxyState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Handles to a running instance
struct Running {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    thread: JoinHandle<()>,
}

/// One proxy instance fronting service `S`
///
/// # Example
///
/// ```no_run
/// use grpc_intercept_proxy::config::ProxyConfig;
/// use grpc_intercept_proxy::discovery::KademliaService;
/// use grpc_intercept_proxy::hooks::Hooks;
/// use grpc_intercept_proxy::proxy::ProxyServer;
///
/// # fn main() -> grpc_intercept_proxy::Result<()> {
/// let config = ProxyConfig::new(
///     "127.0.0.1", 50404, 40404,
///     "certs/node.certificate.pem", "certs/node.key.pem",
/// );
/// let mut proxy = ProxyServer::<KademliaService>::new(config, Hooks::default());
/// let addr = proxy.start()?;
/// println!("proxy listening on {}", addr);
/// proxy.stop()?;
/// # Ok(())
/// # }
/// ```
pub struct ProxyServer<S: ServiceDefinition> {
    config: Arc<ProxyConfig>,
    hooks: Hooks,
    state: ProxyState,
    running: Option<Running>,
    _service: PhantomData<fn() -> S>,
}

impl<S: ServiceDefinition> ProxyServer<S> {
    /// Create an instance; nothing is read or bound until `start()`
    pub fn new(config: ProxyConfig, hooks: Hooks) -> Self {
        Self {
            config: Arc::new(config),
            hooks,
            state: ProxyState::Created,
            running: None,
            _service: PhantomData,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ProxyState {
        self.state
    }

    /// Bound listen address while running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }

    /// The instance configuration
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Start serving
    ///
    /// Validates the configuration, loads identity material, binds the
    /// listener and spawns the serving runtime. Returns once the listener is
    /// bound.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless the instance is `Created`. Configuration,
    /// certificate and bind errors leave it `Created`.
    pub fn start(&mut self) -> Result<SocketAddr> {
        if self.state != ProxyState::Created {
            return Err(ProxyError::InvalidState(format!(
                "start() called on a {} proxy for {}",
                self.state,
                S::NAME
            )));
        }

        let config = Arc::clone(&self.config);
        config.validate()?;

        let node = config.node_endpoint()?;
        let listen = config.listen_endpoint()?;
        let (server_identity, outbound_identity) = load_identities(&config)?;
        let acceptor = create_tls_acceptor(&server_identity, &outbound_identity.root_trust, config.client_cert_mode)?;
        let channels = SecureChannelFactory::new(node.clone(), &outbound_identity, config.connect_timeout())?;

        let listener = bind_listener(listen.socket_addr()?)?;
        let local_addr = listener.local_addr()?;
        let listen_label = Endpoint::new(&listen.host, local_addr.port())?.to_string();

        info!(
            "STARTING PROXY {} for {} on {} (hooks: {:?})",
            node,
            S::NAME,
            listen_label,
            self.hooks.names()
        );

        let dispatcher = CallDispatcher::new::<S>(channels, self.hooks.clone(), listen_label, config.max_concurrent_calls)
            .with_call_timeout(config.call_deadline())
            .with_max_message_size(config.max_message_size);
        let service = ProxyService::<S>::new(Arc::new(dispatcher)).with_max_message_size(config.max_message_size);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let grace = config.grace_period();
        let handshake_timeout = config.connect_timeout();
        let workers = config.worker_threads;
        let acceptor = Arc::new(acceptor);
        let thread_name = format!("grpc-proxy-{}", local_addr.port());

        let thread = std::thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(workers)
                    .thread_name(thread_name)
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.into()));
                        return;
                    }
                };
                runtime.block_on(serve(
                    listener,
                    acceptor,
                    handshake_timeout,
                    service,
                    shutdown_rx,
                    grace,
                    ready_tx,
                ));
                // Dropping the runtime cancels whatever is still in flight
                drop(runtime);
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(ProxyError::Other("Proxy runtime exited during startup".to_string()));
            }
        }

        self.running = Some(Running {
            local_addr,
            shutdown: shutdown_tx,
            thread,
        });
        self.state = ProxyState::Running;
        Ok(local_addr)
    }

    /// Stop serving
    ///
    /// In-flight calls get the configured grace period (zero by default) and
    /// are then cancelled. Returns once the port is released.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless the instance is `Running`.
    pub fn stop(&mut self) -> Result<()> {
        let running = match (self.state, self.running.take()) {
            (ProxyState::Running, Some(running)) => running,
            (state, _) => {
                return Err(ProxyError::InvalidState(format!(
                    "stop() called on a {} proxy for {}",
                    state,
                    S::NAME
                )))
            }
        };

        info!(
            "STOPPING PROXY {}:{} for {} on {}",
            self.config.node_host,
            self.config.node_port,
            S::NAME,
            running.local_addr
        );

        let _ = running.shutdown.send(());
        self.state = ProxyState::Stopped;
        running
            .thread
            .join()
            .map_err(|_| ProxyError::Other("Proxy runtime thread panicked".to_string()))
    }
}

impl<S: ServiceDefinition> Drop for ProxyServer<S> {
    fn drop(&mut self) {
        if self.state == ProxyState::Running {
            if let Err(e) = self.stop() {
                error!("Failed to stop proxy for {}: {}", S::NAME, e);
            }
        }
    }
}

impl<S: ServiceDefinition> fmt::Debug for ProxyServer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyServer")
            .field("service", &S::NAME)
            .field("state", &self.state)
            .field("local_addr", &self.local_addr())
            .field("hooks", &self.hooks)
            .finish()
    }
}

/// Construct and start a proxy in one step
pub fn run_proxy<S: ServiceDefinition>(config: ProxyConfig, hooks: Hooks) -> Result<ProxyServer<S>> {
    let mut server = ProxyServer::new(config, hooks);
    server.start()?;
    Ok(server)
}

async fn serve<S: ServiceDefinition>(
    listener: std::net::TcpListener,
    acceptor: Arc<SslAcceptor>,
    handshake_timeout: Duration,
    service: ProxyService<S>,
    shutdown: oneshot::Receiver<()>,
    grace: Duration,
    ready: std_mpsc::Sender<Result<()>>,
) {
    let listener = match TcpListener::from_std(listener) {
        Ok(listener) => listener,
        Err(e) => {
            let _ = ready.send(Err(e.into()));
            return;
        }
    };
    let _ = ready.send(Ok(()));

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let incoming = tls_incoming(listener, acceptor, handshake_timeout);
    let server = tokio::spawn(
        Server::builder()
            .add_service(service)
            .serve_with_incoming_shutdown(incoming, async {
                let _ = stop_rx.await;
            }),
    );

    // Resolves on stop() and when the handle is dropped
    let _ = shutdown.await;
    let _ = stop_tx.send(());

    if grace.is_zero() {
        return;
    }
    match tokio::time::timeout(grace, server).await {
        Ok(Ok(Ok(()))) => debug!("Proxy for {} drained", S::NAME),
        Ok(Ok(Err(e))) => error!("Proxy for {} failed: {}", S::NAME, e),
        Ok(Err(e)) => error!("Proxy task for {} failed: {}", S::NAME, e),
        Err(_) => warn!("Proxy for {} still busy after {:?}, cancelling", S::NAME, grace),
    }
}
