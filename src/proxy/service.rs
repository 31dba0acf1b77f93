//! Generic gRPC service backed by the call dispatcher
//!
//! [`ProxyService`] plays the role of generated server code for any
//! [`ServiceDefinition`]: it routes by the method segment of the request path
//! and hands the call to tonic's server machinery with [`PayloadCodec`], so
//! requests reach the dispatcher as opaque payloads.

use std::convert::Infallible;
use std::marker::PhantomData;
use std::sync::Arc;
use std::task::{Context, Poll};

use tonic::body::BoxBody;
use tonic::codegen::{empty_body, http, Body, BoxFuture, Service, StdError};
use tonic::server::{Grpc, NamedService, ServerStreamingService, UnaryService};
use tonic::{Code, Request, Response, Status};

use super::codec::{Payload, PayloadCodec};
use super::dispatcher::CallDispatcher;
use super::method::{MethodShape, ServiceDefinition};
use crate::hooks::PayloadStream;

/// Server side of the proxy for service `S`
pub struct ProxyService<S> {
    dispatcher: Arc<CallDispatcher>,
    max_message_size: Option<usize>,
    _service: PhantomData<fn() -> S>,
}

impl<S: ServiceDefinition> ProxyService<S> {
    /// Serve `S` through `dispatcher`
    pub fn new(dispatcher: Arc<CallDispatcher>) -> Self {
        Self {
            dispatcher,
            max_message_size: None,
            _service: PhantomData,
        }
    }

    /// Limit inbound request and outbound response sizes
    pub fn with_max_message_size(mut self, limit: Option<usize>) -> Self {
        self.max_message_size = limit;
        self
    }
}

impl<S> Clone for ProxyService<S> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
            max_message_size: self.max_message_size,
            _service: PhantomData,
        }
    }
}

impl<S: ServiceDefinition> NamedService for ProxyService<S> {
    const NAME: &'static str = S::NAME;
}

impl<S, B> Service<http::Request<B>> for ProxyService<S>
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
        let method = match method_name(req.uri().path(), S::NAME) {
            Some(method) => method.to_string(),
            None => return Box::pin(async { Ok(unimplemented_response()) }),
        };
        let limit = self.max_message_size;
        let dispatcher = self.dispatcher.clone();

        match dispatcher.resolve(&method) {
            Some(MethodShape::Unary) => {
                let call = UnaryCall { dispatcher, method };
                Box::pin(async move {
                    let mut grpc = Grpc::new(PayloadCodec).apply_max_message_size_config(limit, limit);
                    Ok(grpc.unary(call, req).await)
                })
            }
            Some(MethodShape::ServerStream) => {
                let call = StreamCall { dispatcher, method };
                Box::pin(async move {
                    let mut grpc = Grpc::new(PayloadCodec).apply_max_message_size_config(limit, limit);
                    Ok(grpc.server_streaming(call, req).await)
                })
            }
            None => Box::pin(async { Ok(unimplemented_response()) }),
        }
    }
}

/// Method segment of `/package.Service/Method` when the service matches
fn method_name<'a>(path: &'a str, service: &str) -> Option<&'a str> {
    let (svc, method) = path.strip_prefix('/')?.split_once('/')?;
    if svc == service && !method.is_empty() && !method.contains('/') {
        Some(method)
    } else {
        None
    }
}

// Same shape as the fallback arm of generated servers
fn unimplemented_response() -> http::Response<BoxBody> {
    let mut response = http::Response::new(empty_body());
    let headers = response.headers_mut();
    headers.insert(
        Status::GRPC_STATUS,
        http::HeaderValue::from(Code::Unimplemented as i32),
    );
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/grpc"),
    );
    response
}

struct UnaryCall {
    dispatcher: Arc<CallDispatcher>,
    method: String,
}

impl UnaryService<Payload> for UnaryCall {
    type Response = Payload;
    type Future = BoxFuture<Response<Payload>, Status>;

    fn call(&mut self, request: Request<Payload>) -> Self::Future {
        let dispatcher = self.dispatcher.clone();
        let method = self.method.clone();
        Box::pin(async move {
            let ctx = dispatcher.context(&method, request.remote_addr());
            dispatcher.unary(&ctx, request.into_inner()).await.map(Response::new)
        })
    }
}

struct StreamCall {
    dispatcher: Arc<CallDispatcher>,
    method: String,
}

impl ServerStreamingService<Payload> for StreamCall {
    type Response = Payload;
    type ResponseStream = PayloadStream;
    type Future = BoxFuture<Response<PayloadStream>, Status>;

    fn call(&mut self, request: Request<Payload>) -> Self::Future {
        let dispatcher = self.dispatcher.clone();
        let method = self.method.clone();
        Box::pin(async move {
            let ctx = dispatcher.context(&method, request.remote_addr());
            dispatcher.server_stream(&ctx, request.into_inner()).await.map(Response::new)
        })
    }
}
