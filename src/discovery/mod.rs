//! Peer discovery proxying
//!
//! Reference consumer of the hook contract: a proxy in front of a node's
//! Kademlia service that rewrites advertised addresses so peers learn the
//! proxy's ports instead of the node's.

mod messages;
mod rewrite;
mod wire;

pub use messages::{KademliaService, LookupRequest, LookupResponse, Node, PingRequest, PingResponse};
pub use rewrite::AddressRewrite;

use crate::common::Result;
use crate::config::ProxyConfig;
use crate::proxy::{run_proxy, ProxyServer};

/// Start a discovery proxy applying `rewrite` in both directions
pub fn proxy_kademlia(config: ProxyConfig, rewrite: AddressRewrite) -> Result<ProxyServer<KademliaService>> {
    run_proxy::<KademliaService>(config, rewrite.hooks())
}
