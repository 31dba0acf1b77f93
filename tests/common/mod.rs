//! Shared fixtures for the integration tests: a self-signed identity on disk,
//! a TLS node serving any service definition from a closure, and a client
//! that talks to the proxy.

#![allow(dead_code)]

use std::convert::Infallible;
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::StreamExt;
use http::uri::PathAndQuery;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tonic::body::BoxBody;
use tonic::codegen::{Body, BoxFuture, Service, StdError};
use tonic::server::{Grpc, NamedService, ServerStreamingService, UnaryService};
use tonic::transport::Server;
use tonic::codec::Streaming;
use tonic::{Request, Response, Status};

use grpc_intercept_proxy::common::Endpoint;
use grpc_intercept_proxy::config::{ClientCertMode, ProxyConfig};
use grpc_intercept_proxy::hooks::PayloadStream;
use grpc_intercept_proxy::proxy::{
    tls_incoming, MethodShape, Payload, PayloadCodec, SecureChannel, SecureChannelFactory, ServiceDefinition,
};
use grpc_intercept_proxy::service_definition;
use grpc_intercept_proxy::tls::{create_tls_acceptor, generate_self_signed, IdentityMaterial, ServerIdentity};

/// Common name of the test identity
pub const NODE_ID: &str = "node-0";

service_definition! {
    pub EchoService => "test.EchoService" { "Echo", "StreamEcho", "Fail" }
}

/// Message used by the echo node
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct EchoMessage {
    #[prost(string, tag = "1")]
    pub value: String,
    #[prost(uint32, tag = "2")]
    pub count: u32,
}

impl EchoMessage {
    pub fn new(value: &str, count: u32) -> Self {
        Self {
            value: value.to_string(),
            count,
        }
    }
}

/// Self-signed certificate and key written to a temporary directory
pub struct TestIdentity {
    pub dir: TempDir,
    pub cert: Vec<u8>,
    pub key: Vec<u8>,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

impl TestIdentity {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let (cert, key) = generate_self_signed(NODE_ID).unwrap();
        let cert_path = dir.path().join("node.certificate.pem");
        let key_path = dir.path().join("node.key.pem");
        std::fs::write(&cert_path, &cert).unwrap();
        std::fs::write(&key_path, &key).unwrap();
        Self {
            dir,
            cert,
            key,
            cert_path,
            key_path,
        }
    }

    /// Proxy configuration for `node_port` on an ephemeral local port
    pub fn proxy_config(&self, node_port: u16) -> ProxyConfig {
        let mut config = ProxyConfig::new("127.0.0.1", node_port, 0, &self.cert_path, &self.key_path);
        config.listen_host = "127.0.0.1".to_string();
        config.worker_threads = 2;
        config.max_concurrent_calls = 4;
        config.connection_timeout = 5;
        config
    }

    fn server_identity(&self) -> ServerIdentity {
        ServerIdentity {
            certificate: self.cert.clone(),
            private_key: self.key.clone(),
        }
    }

    fn client_material(&self) -> IdentityMaterial {
        IdentityMaterial::new(self.cert.clone(), self.key.clone()).with_peer_identity(NODE_ID)
    }
}

/// Produces the responses of a node for one request, lazily
pub type Responder = Arc<dyn Fn(&str, Payload) -> Result<PayloadStream, Status> + Send + Sync>;

/// A TLS gRPC node running on the test runtime
pub struct TestNode {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<(String, Payload)>>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestNode {
    /// Serve `S` on an ephemeral port; `handler` returns all responses at once
    pub async fn spawn<S, F>(identity: &TestIdentity, handler: F) -> Self
    where
        S: ServiceDefinition,
        F: Fn(&str, Payload) -> Result<Vec<Payload>, Status> + Send + Sync + 'static,
    {
        Self::spawn_streaming::<S, _>(identity, move |method: &str, request: Payload| {
            let items = handler(method, request)?;
            Ok(Box::pin(futures::stream::iter(items.into_iter().map(Ok))) as PayloadStream)
        })
        .await
    }

    /// Serve `S` on an ephemeral port; `responder` returns a response stream
    /// the node polls as the caller consumes it
    pub async fn spawn_streaming<S, F>(identity: &TestIdentity, responder: F) -> Self
    where
        S: ServiceDefinition,
        F: Fn(&str, Payload) -> Result<PayloadStream, Status> + Send + Sync + 'static,
    {
        let acceptor = create_tls_acceptor(&identity.server_identity(), &identity.cert, ClientCertMode::None).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let service = NodeService::<S> {
            responder: Arc::new(responder),
            requests: Arc::clone(&requests),
            _service: PhantomData,
        };
        let (tx, rx) = oneshot::channel::<()>();
        let incoming = tls_incoming(listener, Arc::new(acceptor), Duration::from_secs(5));
        tokio::spawn(
            Server::builder()
                .add_service(service)
                .serve_with_incoming_shutdown(incoming, async {
                    let _ = rx.await;
                }),
        );

        Self {
            addr,
            requests,
            shutdown: Some(tx),
        }
    }

    /// Echo node: `Echo` returns the request, `StreamEcho` returns `count`
    /// numbered messages, `Fail` returns `NOT_FOUND`
    pub async fn echo(identity: &TestIdentity) -> Self {
        Self::spawn::<EchoService, _>(identity, |method: &str, request: Payload| {
            let message: EchoMessage = request.decode_status()?;
            match method {
                "Echo" => Ok(vec![request]),
                "StreamEcho" => Ok((0..message.count)
                    .map(|i| Payload::from_message(&EchoMessage::new(&format!("{}-{}", message.value, i), i)))
                    .collect()),
                _ => Err(Status::not_found(format!("no such thing: {}", message.value))),
            }
        })
        .await
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Requests received so far, with their method names
    pub fn requests(&self) -> Vec<(String, Payload)> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

struct NodeService<S> {
    responder: Responder,
    requests: Arc<Mutex<Vec<(String, Payload)>>>,
    _service: PhantomData<fn() -> S>,
}

impl<S> Clone for NodeService<S> {
    fn clone(&self) -> Self {
        Self {
            responder: Arc::clone(&self.responder),
            requests: Arc::clone(&self.requests),
            _service: PhantomData,
        }
    }
}

impl<S: ServiceDefinition> NamedService for NodeService<S> {
    const NAME: &'static str = S::NAME;
}

impl<S, B> Service<http::Request<B>> for NodeService<S>
where
    S: ServiceDefinition,
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<BoxBody>;
    type Error = Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        let method = req.uri().path().rsplit('/').next().unwrap_or_default().to_string();
        let handle = Handle {
            responder: Arc::clone(&self.responder),
            requests: Arc::clone(&self.requests),
            method: method.clone(),
        };
        Box::pin(async move {
            let mut grpc = Grpc::new(PayloadCodec);
            match S::shape(&method) {
                MethodShape::Unary => Ok(grpc.unary(handle, req).await),
                MethodShape::ServerStream => Ok(grpc.server_streaming(StreamHandle(handle), req).await),
            }
        })
    }
}

struct Handle {
    responder: Responder,
    requests: Arc<Mutex<Vec<(String, Payload)>>>,
    method: String,
}

impl Handle {
    fn handle(&self, request: Request<Payload>) -> Result<PayloadStream, Status> {
        let request = request.into_inner();
        self.requests.lock().unwrap().push((self.method.clone(), request.clone()));
        (self.responder)(&self.method, request)
    }
}

impl UnaryService<Payload> for Handle {
    type Response = Payload;
    type Future = BoxFuture<Response<Payload>, Status>;

    fn call(&mut self, request: Request<Payload>) -> Self::Future {
        let result = self.handle(request);
        Box::pin(async move {
            result?
                .next()
                .await
                .unwrap_or_else(|| Err(Status::internal("handler produced no response")))
                .map(Response::new)
        })
    }
}

struct StreamHandle(Handle);

impl ServerStreamingService<Payload> for StreamHandle {
    type Response = Payload;
    type ResponseStream = PayloadStream;
    type Future = BoxFuture<Response<PayloadStream>, Status>;

    fn call(&mut self, request: Request<Payload>) -> Self::Future {
        let result = self.0.handle(request);
        Box::pin(async move { result.map(Response::new) })
    }
}

/// gRPC client dialing the proxy over TLS
pub struct TestClient {
    factory: SecureChannelFactory,
    service: &'static str,
}

impl TestClient {
    pub fn new<S: ServiceDefinition>(identity: &TestIdentity, addr: SocketAddr) -> Self {
        let endpoint = Endpoint::new("127.0.0.1", addr.port()).unwrap();
        let factory = SecureChannelFactory::new(endpoint, &identity.client_material(), Duration::from_secs(5)).unwrap();
        Self {
            factory,
            service: S::NAME,
        }
    }

    fn path(&self, method: &str) -> PathAndQuery {
        format!("/{}/{}", self.service, method).parse().unwrap()
    }

    pub async fn unary<M: prost::Message>(&self, method: &str, request: &M) -> Result<Payload, Status> {
        let channel = self.factory.open().await.unwrap();
        let mut client = channel.client();
        client.ready().await.unwrap();
        client
            .unary(Request::new(Payload::from_message(request)), self.path(method), PayloadCodec)
            .await
            .map(Response::into_inner)
    }

    /// Start a streaming call and hand back the open response stream
    pub async fn open_stream<M: prost::Message>(&self, method: &str, request: &M) -> Result<OpenStream, Status> {
        let channel = self.factory.open().await.unwrap();
        let mut client = channel.client();
        client.ready().await.unwrap();
        let responses = client
            .server_streaming(Request::new(Payload::from_message(request)), self.path(method), PayloadCodec)
            .await?
            .into_inner();
        Ok(OpenStream {
            responses,
            _channel: channel,
        })
    }

    /// Collect a whole response stream
    pub async fn stream<M: prost::Message>(&self, method: &str, request: &M) -> Result<Vec<Payload>, Status> {
        let channel = self.factory.open().await.unwrap();
        let mut client = channel.client();
        client.ready().await.unwrap();
        let mut responses = client
            .server_streaming(Request::new(Payload::from_message(request)), self.path(method), PayloadCodec)
            .await?
            .into_inner();

        let mut items = Vec::new();
        while let Some(item) = responses.message().await? {
            items.push(item);
        }
        Ok(items)
    }
}

/// A streaming call in progress; dropping it cancels the call
pub struct OpenStream {
    responses: Streaming<Payload>,
    _channel: SecureChannel,
}

impl OpenStream {
    /// Next response, waiting at most five seconds
    pub async fn next(&mut self) -> Result<Option<Payload>, Status> {
        tokio::time::timeout(Duration::from_secs(5), self.responses.message())
            .await
            .map_err(|_| Status::deadline_exceeded("no response within 5s"))?
    }
}

/// A port nothing is listening on
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}
