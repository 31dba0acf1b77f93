//! gRPC interception proxy
//!
//! Data flow for one call: the inbound listener ([`incoming`]) hands the
//! connection to tonic, [`ProxyService`] resolves the method shape,
//! [`CallDispatcher`] runs the pre-hook, opens a fresh [`SecureChannel`] to
//! the node, forwards the call and runs the post-hook on the way back.

pub mod channel;
pub mod codec;
pub mod dispatcher;
pub mod incoming;
pub mod method;
pub mod server;
pub mod service;

pub use channel::{open_outbound_channel, SecureChannel, SecureChannelFactory};
pub use codec::{Payload, PayloadCodec};
pub use dispatcher::{CallContext, CallDispatcher, Dispatched};
pub use incoming::{tls_incoming, TlsConnection};
pub use method::{MethodDescriptor, MethodShape, MethodTable, ServiceDefinition, STREAM_PREFIX};
pub use server::{run_proxy, ProxyServer, ProxyState};
pub use service::ProxyService;
