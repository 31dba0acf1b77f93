//! Kademlia discovery messages
//!
//! Hand-written prost types matching the node's `io.casperlabs.comm.discovery`
//! package, for typed access from hooks and tests. The address rewrite edits
//! the encoded messages directly and never re-encodes through these types.

/// A peer's self-description
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct Node {
    /// Node identifier (public key hash)
    #[prost(bytes = "vec", tag = "1")]
    pub id: Vec<u8>,
    /// Advertised host
    #[prost(string, tag = "2")]
    pub host: String,
    /// Advertised gossip port
    #[prost(uint32, tag = "3")]
    pub protocol_port: u32,
    /// Advertised discovery port
    #[prost(uint32, tag = "4")]
    pub discovery_port: u32,
}

#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct PingRequest {
    #[prost(message, optional, tag = "1")]
    pub sender: Option<Node>,
}

#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct PingResponse {}

#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct LookupRequest {
    /// Identifier being looked up
    #[prost(bytes = "vec", tag = "1")]
    pub id: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub sender: Option<Node>,
}

#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct LookupResponse {
    /// Peers closest to the looked-up identifier
    #[prost(message, repeated, tag = "1")]
    pub nodes: Vec<Node>,
}

crate::service_definition! {
    /// The node's peer discovery service
    pub KademliaService => "io.casperlabs.comm.discovery.KademliaService" { "Ping", "Lookup" }
}
