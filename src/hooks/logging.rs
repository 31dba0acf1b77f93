//! Logging decorator for hooks

use std::sync::Arc;

use futures::StreamExt;
use log::{debug, info};
use tonic::Status;

use super::{Payload, PayloadStream, PostStreamHook, PostUnaryHook, PreHook};

/// Logs method and payload, then delegates to the wrapped hook
///
/// Adds no behaviour beyond the log records, so `Logged<Identity>` is still
/// a passthrough.
pub struct Logged<H: ?Sized> {
    inner: Arc<H>,
}

impl<H: ?Sized> Logged<H> {
    /// Wrap a shared hook
    pub fn from_arc(inner: Arc<H>) -> Self {
        Self { inner }
    }
}

impl<H: PreHook + ?Sized> PreHook for Logged<H> {
    fn pre(&self, method: &str, request: Payload) -> Result<Payload, Status> {
        info!("PROXY PRE {}: {:?}", method, request.as_bytes());
        self.inner.pre(method, request)
    }
}

impl<H: PostUnaryHook + ?Sized> PostUnaryHook for Logged<H> {
    fn post_unary(&self, method: &str, request: &Payload, response: Payload) -> Result<Payload, Status> {
        info!("PROXY POST {}: {:?} -> {:?}", method, request.as_bytes(), response.as_bytes());
        self.inner.post_unary(method, request, response)
    }
}

impl<H: PostStreamHook + ?Sized> PostStreamHook for Logged<H> {
    fn post_stream(&self, method: &str, request: &Payload, responses: PayloadStream) -> PayloadStream {
        info!("PROXY POST STREAM {}: {:?}", method, request.as_bytes());
        let label = method.to_string();
        let logged = responses.inspect(move |item| match item {
            Ok(response) => debug!("PROXY STREAM ITEM {}: {:?}", label, response.as_bytes()),
            Err(status) => debug!("PROXY STREAM ERROR {}: {}", label, status),
        });
        self.inner.post_stream(method, request, Box::pin(logged))
    }
}
