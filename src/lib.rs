//! gRPC interception proxy
//!
//! Sits between a gRPC client and a real node: terminates TLS from the
//! client, opens a fresh TLS channel to the node for every call, and forwards
//! unary and server-streaming calls of any service while hooks inspect or
//! rewrite the requests and responses.
//!
//! A service is bound by name only. Message types are never needed by the
//! proxy itself; hooks that want typed access decode the [`Payload`] with a
//! `prost::Message`.
//!
//! # Main Features
//!
//! - Generic forwarding for any [`ServiceDefinition`] (unary and server-streaming)
//! - Pre-request, post-response and post-stream hooks, logging by default
//! - Node identity override for nodes whose certificates carry a logical id
//! - Start/stop lifecycle on a dedicated runtime, with an explicit state guard
//! - Reference discovery proxy rewriting advertised peer addresses
//! - Ready-made fronts for the node's gossip and client APIs
//!
//! # Example
//!
//! ```no_run
//! use grpc_intercept_proxy::config::ProxyConfig;
//! use grpc_intercept_proxy::hooks::{Hooks, Payload};
//! use grpc_intercept_proxy::{run_proxy, service_definition, Result};
//! use tonic::Status;
//!
//! service_definition! {
//!     ControlService => "io.casperlabs.node.api.control.ControlService" { "Propose" }
//! }
//!
//! fn main() -> Result<()> {
//!     let config = ProxyConfig::new(
//!         "127.0.0.1", 50400, 40400,
//!         "certs/node.certificate.pem", "certs/node.key.pem",
//!     );
//!     let hooks = Hooks::default().with_pre(|method: &str, request: Payload| -> std::result::Result<Payload, Status> {
//!         if method == "Propose" {
//!             return Err(Status::unavailable("proposals blocked by test"));
//!         }
//!         Ok(request)
//!     });
//!
//!     let mut proxy = run_proxy::<ControlService>(config, hooks)?;
//!     // ... drive the node through the proxy ...
//!     proxy.stop()?;
//!     Ok(())
//! }
//! ```

pub mod casper;
pub mod common;
pub mod config;
pub mod discovery;
pub mod hooks;
pub mod proxy;
pub mod tls;

pub use common::{Endpoint, ProxyError, Result};
pub use config::ProxyConfig;
pub use hooks::{Hooks, Payload};
pub use proxy::{run_proxy, MethodShape, ProxyServer, ProxyState, ServiceDefinition};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
