//! Interception hooks
//!
//! Three extension points run around every forwarded call:
//!
//! - [`PreHook`] sees the request before it is sent to the node;
//! - [`PostUnaryHook`] sees the single response of a unary call;
//! - [`PostStreamHook`] wraps the response sequence of a streaming call.
//!
//! Hooks work on encoded [`Payload`]s and must return a payload of the same
//! message type they received. Returning an error fails the call with that
//! status. Closures with the matching signature implement the hook traits:
//!
//! ```
//! use grpc_intercept_proxy::hooks::{Hooks, Payload};
//! use tonic::Status;
//!
//! let hooks = Hooks::default().with_pre(|method: &str, request: Payload| -> Result<Payload, Status> {
//!     log::info!("forwarding {} ({} bytes)", method, request.len());
//!     Ok(request)
//! });
//! ```

mod logging;

pub use logging::Logged;

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use tonic::Status;

pub use crate::proxy::codec::Payload;

/// Lazily produced responses of a streaming call
pub type PayloadStream = Pin<Box<dyn Stream<Item = Result<Payload, Status>> + Send + 'static>>;

/// Runs before a request is forwarded
pub trait PreHook: Send + Sync + 'static {
    /// Return the request to forward
    fn pre(&self, method: &str, request: Payload) -> Result<Payload, Status>;
}

/// Runs after a unary response arrives
pub trait PostUnaryHook: Send + Sync + 'static {
    /// Return the response to deliver; `request` is what was forwarded
    fn post_unary(&self, method: &str, request: &Payload, response: Payload) -> Result<Payload, Status>;
}

/// Wraps the responses of a streaming call
///
/// Must stay lazy: the returned stream is polled element by element as the
/// caller consumes it, and must never collect `responses` up front.
pub trait PostStreamHook: Send + Sync + 'static {
    /// Return the stream to deliver; `request` is what was forwarded
    fn post_stream(&self, method: &str, request: &Payload, responses: PayloadStream) -> PayloadStream;
}

impl<F> PreHook for F
where
    F: Fn(&str, Payload) -> Result<Payload, Status> + Send + Sync + 'static,
{
    fn pre(&self, method: &str, request: Payload) -> Result<Payload, Status> {
        self(method, request)
    }
}

impl<F> PostUnaryHook for F
where
    F: Fn(&str, &Payload, Payload) -> Result<Payload, Status> + Send + Sync + 'static,
{
    fn post_unary(&self, method: &str, request: &Payload, response: Payload) -> Result<Payload, Status> {
        self(method, request, response)
    }
}

impl<F> PostStreamHook for F
where
    F: Fn(&str, &Payload, PayloadStream) -> PayloadStream + Send + Sync + 'static,
{
    fn post_stream(&self, method: &str, request: &Payload, responses: PayloadStream) -> PayloadStream {
        self(method, request, responses)
    }
}

/// Pure passthrough for all three hook points
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl PreHook for Identity {
    fn pre(&self, _method: &str, request: Payload) -> Result<Payload, Status> {
        Ok(request)
    }
}

impl PostUnaryHook for Identity {
    fn post_unary(&self, _method: &str, _request: &Payload, response: Payload) -> Result<Payload, Status> {
        Ok(response)
    }
}

impl PostStreamHook for Identity {
    fn post_stream(&self, _method: &str, _request: &Payload, responses: PayloadStream) -> PayloadStream {
        responses
    }
}

/// The hook triple of one proxy instance
#[derive(Clone)]
pub struct Hooks {
    pre: Arc<dyn PreHook>,
    post_unary: Arc<dyn PostUnaryHook>,
    post_stream: Arc<dyn PostStreamHook>,
    names: [&'static str; 3],
}

impl Hooks {
    /// Passthrough hooks that do not log
    pub fn identity() -> Self {
        let name = std::any::type_name::<Identity>();
        Self {
            pre: Arc::new(Identity),
            post_unary: Arc::new(Identity),
            post_stream: Arc::new(Identity),
            names: [name; 3],
        }
    }

    /// Passthrough hooks that log every message
    pub fn logging() -> Self {
        Self::identity().logged()
    }

    /// Replace the pre-request hook
    pub fn with_pre<H: PreHook>(mut self, hook: H) -> Self {
        self.pre = Arc::new(hook);
        self.names[0] = std::any::type_name::<H>();
        self
    }

    /// Replace the unary post-response hook
    pub fn with_post_unary<H: PostUnaryHook>(mut self, hook: H) -> Self {
        self.post_unary = Arc::new(hook);
        self.names[1] = std::any::type_name::<H>();
        self
    }

    /// Replace the streaming post-response hook
    pub fn with_post_stream<H: PostStreamHook>(mut self, hook: H) -> Self {
        self.post_stream = Arc::new(hook);
        self.names[2] = std::any::type_name::<H>();
        self
    }

    /// Wrap all three hooks in [`Logged`]
    pub fn logged(self) -> Self {
        Self {
            pre: Arc::new(Logged::from_arc(self.pre)),
            post_unary: Arc::new(Logged::from_arc(self.post_unary)),
            post_stream: Arc::new(Logged::from_arc(self.post_stream)),
            names: self.names,
        }
    }

    /// Type names of the pre, post-unary and post-stream hooks
    pub fn names(&self) -> [&'static str; 3] {
        self.names
    }

    pub(crate) fn pre(&self, method: &str, request: Payload) -> Result<Payload, Status> {
        self.pre.pre(method, request)
    }

    pub(crate) fn post_unary(&self, method: &str, request: &Payload, response: Payload) -> Result<Payload, Status> {
        self.post_unary.post_unary(method, request, response)
    }

    pub(crate) fn post_stream(&self, method: &str, request: &Payload, responses: PayloadStream) -> PayloadStream {
        self.post_stream.post_stream(method, request, responses)
    }
}

/// Identity wrapped in logging
impl Default for Hooks {
    fn default() -> Self {
        Self::logging()
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("pre", &self.names[0])
            .field("post_unary", &self.names[1])
            .field("post_stream", &self.names[2])
            .finish()
    }
}
