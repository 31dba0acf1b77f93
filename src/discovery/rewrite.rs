//! Address rewriting for discovery traffic
//!
//! A node behind the proxy advertises its own ports in every discovery
//! message. Rewriting them to the proxy's ports makes peers come back through
//! the proxy instead of reaching the node directly.

use bytes::Bytes;
use log::info;
use tonic::Status;

use super::wire::{self, Value};
use crate::hooks::{Hooks, Payload, PostUnaryHook, PreHook};

// Field numbers in the discovery messages
const NODE_HOST: u32 = 2;
const NODE_PROTOCOL_PORT: u32 = 3;
const NODE_DISCOVERY_PORT: u32 = 4;
const PING_REQUEST_SENDER: u32 = 1;
const LOOKUP_REQUEST_SENDER: u32 = 2;
const LOOKUP_RESPONSE_NODES: u32 = 1;

/// Rewrites advertised ports (and optionally the host) to the proxy's
///
/// Values are replaced, never adjusted, so applying the rewrite twice is the
/// same as applying it once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRewrite {
    protocol_port: u32,
    discovery_port: u32,
    host: Option<String>,
}

impl AddressRewrite {
    /// Advertise `protocol_port` for gossip and `discovery_port` for discovery
    pub fn new(protocol_port: u16, discovery_port: u16) -> Self {
        Self {
            protocol_port: u32::from(protocol_port),
            discovery_port: u32::from(discovery_port),
            host: None,
        }
    }

    /// Also advertise `host`
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Rewrite one encoded `Node`
    ///
    /// Only the advertised ports (and host, if configured) change; every
    /// other field is kept as encoded, including fields unknown to [`Node`].
    ///
    /// [`Node`]: super::Node
    pub fn rewrite_node(&self, node: &Bytes) -> Result<Bytes, Status> {
        let mut replacements = vec![
            (NODE_PROTOCOL_PORT, Value::Varint(u64::from(self.protocol_port))),
            (NODE_DISCOVERY_PORT, Value::Varint(u64::from(self.discovery_port))),
        ];
        if let Some(host) = &self.host {
            replacements.push((NODE_HOST, Value::Bytes(Bytes::from(host.clone()))));
        }
        wire::replace_fields(node, &replacements)
    }

    /// Rewrite the sender of an outgoing discovery request
    ///
    /// Requests of other methods, and requests without a sender, pass through
    /// untouched.
    pub fn rewrite_request(&self, method: &str, request: Payload) -> Result<Payload, Status> {
        match method {
            "Ping" => self.rewrite(method, request, PING_REQUEST_SENDER),
            "Lookup" => self.rewrite(method, request, LOOKUP_REQUEST_SENDER),
            _ => Ok(request),
        }
    }

    /// Rewrite every peer of a discovery response
    pub fn rewrite_response(&self, method: &str, response: Payload) -> Result<Payload, Status> {
        match method {
            "Lookup" => self.rewrite(method, response, LOOKUP_RESPONSE_NODES),
            _ => Ok(response),
        }
    }

    /// Hooks applying this rewrite, wrapped in logging
    pub fn hooks(self) -> Hooks {
        Hooks::identity()
            .with_pre(self.clone())
            .with_post_unary(self)
            .logged()
    }

    fn rewrite(&self, method: &str, payload: Payload, node_tag: u32) -> Result<Payload, Status> {
        let (rewritten, nodes) = wire::map_embedded(payload.as_bytes(), node_tag, |node| self.rewrite_node(node))?;
        if nodes == 0 {
            info!("ADDRESS REWRITE {}: NO PATCHING", method);
            return Ok(payload);
        }
        info!(
            "ADDRESS REWRITE {}: {} node(s) -> ports {}/{}",
            method, nodes, self.protocol_port, self.discovery_port
        );
        Ok(Payload::new(rewritten))
    }
}

impl PreHook for AddressRewrite {
    fn pre(&self, method: &str, request: Payload) -> Result<Payload, Status> {
        self.rewrite_request(method, request)
    }
}

impl PostUnaryHook for AddressRewrite {
    fn post_unary(&self, method: &str, _request: &Payload, response: Payload) -> Result<Payload, Status> {
        self.rewrite_response(method, response)
    }
}
