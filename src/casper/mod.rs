//! Ready-made fronts for a node's gossip and client APIs
//!
//! Next to the discovery proxy, a test harness usually puts one proxy in front
//! of the node's gossip port (peers talking to the node) and one in front of
//! its client API (deploys and queries). Both run with the logging
//! passthrough hooks unless told otherwise.

use std::path::PathBuf;

use crate::common::Result;
use crate::config::ProxyConfig;
use crate::hooks::Hooks;
use crate::proxy::{run_proxy, MethodShape, ProxyServer, ServiceDefinition};

/// Node port of the gossip API
pub const GOSSIP_NODE_PORT: u16 = 50400;
/// Proxy port in front of the gossip API
pub const GOSSIP_PROXY_PORT: u16 = 40400;
/// Node port of the client API
pub const CLIENT_NODE_PORT: u16 = 40401;
/// Proxy port in front of the client API
pub const CLIENT_PROXY_PORT: u16 = 50401;

/// Node-to-node block and deploy exchange
#[derive(Debug, Clone, Copy, Default)]
pub struct GossipService;

impl ServiceDefinition for GossipService {
    const NAME: &'static str = "io.casperlabs.comm.gossiping.GossipService";
    const METHODS: &'static [&'static str] = &[
        "NewBlocks",
        "NewDeploys",
        "StreamAncestorBlockSummaries",
        "StreamLatestMessages",
        "StreamBlockSummaries",
        "StreamDagSliceBlockSummaries",
        "StreamDeploySummaries",
        "GetBlockChunked",
        "StreamDeploysChunked",
        "GetGenesisCandidate",
        "AddApproval",
    ];

    fn shape(method: &str) -> MethodShape {
        match method {
            // Sends the block in chunks without the usual prefix
            "GetBlockChunked" => MethodShape::ServerStream,
            other => MethodShape::from_name(other),
        }
    }
}

crate::service_definition! {
    /// The node's client API
    pub CasperService => "io.casperlabs.node.api.casper.CasperService" {
        "Deploy",
        "GetBlockInfo",
        "StreamBlockInfos",
        "GetDeployInfo",
        "StreamBlockDeploys",
        "ListDeployInfos",
        "GetLastFinalizedBlockInfo",
        "GetBlockState",
        "BatchGetBlockState",
        "StreamEvents",
    }
}

/// Configuration of a gossip front for `node_host`
pub fn server_config(node_host: impl Into<String>, cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> ProxyConfig {
    ProxyConfig::new(node_host, GOSSIP_NODE_PORT, GOSSIP_PROXY_PORT, cert, key)
}

/// Configuration of a client API front for `node_host`
pub fn client_config(node_host: impl Into<String>, cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> ProxyConfig {
    ProxyConfig::new(node_host, CLIENT_NODE_PORT, CLIENT_PROXY_PORT, cert, key)
}

/// Start a proxy in front of the node's gossip API with logging hooks
pub fn proxy_server(config: ProxyConfig) -> Result<ProxyServer<GossipService>> {
    run_proxy::<GossipService>(config, Hooks::default())
}

/// Start a proxy in front of the node's client API with logging hooks
pub fn proxy_client(config: ProxyConfig) -> Result<ProxyServer<CasperService>> {
    run_proxy::<CasperService>(config, Hooks::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::MethodTable;

    #[test]
    fn test_gossip_shapes() {
        let table = MethodTable::for_service::<GossipService>();
        assert_eq!(table.len(), GossipService::METHODS.len());
        assert_eq!(table.resolve("GetBlockChunked"), Some(MethodShape::ServerStream));
        assert_eq!(table.resolve("StreamAncestorBlockSummaries"), Some(MethodShape::ServerStream));
        assert_eq!(table.resolve("NewBlocks"), Some(MethodShape::Unary));
        assert_eq!(table.resolve("Lookup"), None);
    }

    #[test]
    fn test_client_shapes() {
        let table = MethodTable::for_service::<CasperService>();
        assert_eq!(table.resolve("Deploy"), Some(MethodShape::Unary));
        assert_eq!(table.resolve("StreamEvents"), Some(MethodShape::ServerStream));
        assert_eq!(table.resolve("GetBlockInfo"), Some(MethodShape::Unary));
    }

    #[test]
    fn test_default_ports() {
        let gossip = server_config("casperlabs", "node.pem", "node.key");
        assert_eq!((gossip.node_port, gossip.proxy_port), (50400, 40400));

        let client = client_config("casperlabs", "node.pem", "node.key");
        assert_eq!((client.node_port, client.proxy_port), (40401, 50401));
        assert_eq!(client.node_host, "casperlabs");
    }
}
