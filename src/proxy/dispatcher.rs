//! Call dispatcher
//!
//! Runs the intercept-forward-intercept sequence for one inbound call:
//! pre-hook, fresh secure channel, forwarded call, post-hook. Every failure
//! reaches the caller as a [`Status`] of the same category, with the proxy
//! context prepended to its message.

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{Stream, TryStreamExt};
use http::uri::PathAndQuery;
use log::{debug, error, info};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tonic::{Request, Status};

use super::channel::{SecureChannel, SecureChannelFactory};
use super::codec::{Payload, PayloadCodec};
use super::method::{MethodShape, MethodTable, ServiceDefinition};
use crate::hooks::{Hooks, PayloadStream};

/// Who and what a call is about, for logs and error messages
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Fully-qualified service name
    pub service: &'static str,
    /// Method name
    pub method: String,
    /// Address of the original caller, if the transport reports one
    pub peer: Option<SocketAddr>,
    /// Node endpoint the call is forwarded to
    pub node: String,
    /// Endpoint the proxy listens on
    pub listen: String,
}

impl fmt::Display for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PROXY {} on {} {}/{} from ",
            self.node, self.listen, self.service, self.method
        )?;
        match self.peer {
            Some(peer) => write!(f, "{}", peer),
            None => write!(f, "unknown peer"),
        }
    }
}

/// Result of a dispatched call
pub enum Dispatched {
    /// Response of a unary call
    Unary(Payload),
    /// Responses of a server-streaming call
    Stream(PayloadStream),
}

impl fmt::Debug for Dispatched {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dispatched::Unary(payload) => f.debug_tuple("Unary").field(payload).finish(),
            Dispatched::Stream(_) => f.debug_tuple("Stream").field(&"..").finish(),
        }
    }
}

/// Forwards calls of one service to one node
pub struct CallDispatcher {
    service: &'static str,
    methods: MethodTable,
    channels: SecureChannelFactory,
    hooks: Hooks,
    slots: Arc<Semaphore>,
    call_timeout: Option<Duration>,
    max_message_size: Option<usize>,
    listen: String,
}

impl CallDispatcher {
    /// Bind `S` to the node reached through `channels`
    ///
    /// `max_concurrent_calls` bounds the calls in flight; extra calls wait
    /// for a free slot.
    pub fn new<S: ServiceDefinition>(
        channels: SecureChannelFactory,
        hooks: Hooks,
        listen: impl Into<String>,
        max_concurrent_calls: usize,
    ) -> Self {
        Self {
            service: S::NAME,
            methods: MethodTable::for_service::<S>(),
            channels,
            hooks,
            slots: Arc::new(Semaphore::new(max_concurrent_calls.max(1))),
            call_timeout: None,
            max_message_size: None,
            listen: listen.into(),
        }
    }

    /// Fail forwarded calls that take longer than `timeout`
    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Limit decoded response size on the outbound leg
    pub fn with_max_message_size(mut self, limit: Option<usize>) -> Self {
        self.max_message_size = limit;
        self
    }

    /// Fully-qualified name of the bound service
    pub fn service(&self) -> &'static str {
        self.service
    }

    /// Method table of the bound service
    pub fn methods(&self) -> &MethodTable {
        &self.methods
    }

    /// Shape of `method`, if the service exposes it
    pub fn resolve(&self, method: &str) -> Option<MethodShape> {
        self.methods.resolve(method)
    }

    /// Context for a call of `method` from `peer`
    pub fn context(&self, method: &str, peer: Option<SocketAddr>) -> CallContext {
        CallContext {
            service: self.service,
            method: method.to_string(),
            peer,
            node: self.channels.target().to_string(),
            listen: self.listen.clone(),
        }
    }

    /// Dispatch by method shape
    ///
    /// Methods the service does not expose fail with `UNIMPLEMENTED`.
    pub async fn dispatch(&self, ctx: &CallContext, request: Payload) -> Result<Dispatched, Status> {
        match self.resolve(&ctx.method) {
            Some(MethodShape::Unary) => self.unary(ctx, request).await.map(Dispatched::Unary),
            Some(MethodShape::ServerStream) => self.server_stream(ctx, request).await.map(Dispatched::Stream),
            None => Err(annotate(
                ctx,
                Status::unimplemented(format!("{} has no method {}", self.service, ctx.method)),
            )),
        }
    }

    /// Forward a unary call
    pub async fn unary(&self, ctx: &CallContext, request: Payload) -> Result<Payload, Status> {
        let _slot = self.acquire(ctx).await?;
        info!("{}: request ({} bytes)", ctx, request.len());

        let request = self.hooks.pre(&ctx.method, request).map_err(|s| annotate(ctx, s))?;
        let channel = self.open(ctx).await?;
        let mut client = self.client(ctx, &channel).await?;
        let path = self.path(ctx)?;

        let response = self
            .bounded(client.unary(Request::new(request.clone()), path, PayloadCodec))
            .await
            .map_err(|s| annotate(ctx, s))?
            .into_inner();

        let response = self
            .hooks
            .post_unary(&ctx.method, &request, response)
            .map_err(|s| annotate(ctx, s))?;
        debug!("{}: response ({} bytes)", ctx, response.len());
        Ok(response)
    }

    /// Forward a server-streaming call
    ///
    /// The returned stream owns the outbound channel and the concurrency
    /// slot; both are released when it ends, fails or is dropped.
    pub async fn server_stream(&self, ctx: &CallContext, request: Payload) -> Result<PayloadStream, Status> {
        let slot = self.acquire(ctx).await?;
        info!("{}: request ({} bytes)", ctx, request.len());

        let request = self.hooks.pre(&ctx.method, request).map_err(|s| annotate(ctx, s))?;
        let channel = self.open(ctx).await?;
        let mut client = self.client(ctx, &channel).await?;
        let path = self.path(ctx)?;

        let responses = self
            .bounded(client.server_streaming(Request::new(request.clone()), path, PayloadCodec))
            .await
            .map_err(|s| annotate(ctx, s))?
            .into_inner();

        let hooked = self.hooks.post_stream(&ctx.method, &request, Box::pin(responses));
        let stream_ctx = ctx.clone();
        let annotated = hooked.map_err(move |s| annotate(&stream_ctx, s));

        Ok(Box::pin(ScopedStream {
            inner: Box::pin(annotated),
            channel: Some(channel),
            slot: Some(slot),
        }))
    }

    async fn acquire(&self, ctx: &CallContext) -> Result<OwnedSemaphorePermit, Status> {
        self.slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| annotate(ctx, Status::unavailable("proxy is shutting down")))
    }

    async fn open(&self, ctx: &CallContext) -> Result<SecureChannel, Status> {
        self.channels.open().await.map_err(|e| annotate(ctx, e.into()))
    }

    async fn client(
        &self,
        ctx: &CallContext,
        channel: &SecureChannel,
    ) -> Result<tonic::client::Grpc<tonic::transport::Channel>, Status> {
        let mut client = channel.client();
        if let Some(limit) = self.max_message_size {
            client = client.max_decoding_message_size(limit).max_encoding_message_size(limit);
        }
        client
            .ready()
            .await
            .map_err(|e| annotate(ctx, Status::unavailable(format!("node not ready: {}", e))))?;
        Ok(client)
    }

    fn path(&self, ctx: &CallContext) -> Result<PathAndQuery, Status> {
        PathAndQuery::try_from(format!("/{}/{}", self.service, ctx.method))
            .map_err(|e| annotate(ctx, Status::invalid_argument(format!("invalid method path: {}", e))))
    }

    async fn bounded<T>(&self, call: impl Future<Output = Result<T, Status>>) -> Result<T, Status> {
        match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| Status::deadline_exceeded(format!("node did not answer within {:?}", limit)))?,
            None => call.await,
        }
    }
}

impl fmt::Debug for CallDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallDispatcher")
            .field("service", &self.service)
            .field("methods", &self.methods.len())
            .field("channels", &self.channels)
            .field("hooks", &self.hooks)
            .finish()
    }
}

/// Prefix the proxy context to a status message, keeping code, details and metadata
pub fn annotate(ctx: &CallContext, status: Status) -> Status {
    error!("{}: {}", ctx, status);
    Status::with_details_and_metadata(
        status.code(),
        format!("{}: {}", ctx, status.message()),
        status.details().to_vec().into(),
        status.metadata().clone(),
    )
}

/// Response stream that owns its channel and concurrency slot
struct ScopedStream {
    inner: PayloadStream,
    channel: Option<SecureChannel>,
    slot: Option<OwnedSemaphorePermit>,
}

impl ScopedStream {
    fn release(&mut self) {
        self.channel.take();
        self.slot.take();
    }
}

// No field is structurally pinned
impl Unpin for ScopedStream {}

impl Stream for ScopedStream {
    type Item = Result<Payload, Status>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let next = this.inner.as_mut().poll_next(cx);
        if let Poll::Ready(None) = next {
            this.release();
        }
        next
    }
}
