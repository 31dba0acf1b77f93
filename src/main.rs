//! gRPC Interception Proxy Command Line Tool
//!
//! Runs a proxy in front of one of a node's gRPC services until Ctrl+C.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use log::{info, warn};

use grpc_intercept_proxy::common::{init_logger, read_file, ProxyError, Result};
use grpc_intercept_proxy::casper::{CasperService, GossipService};
use grpc_intercept_proxy::config::{ClientCertMode, ProxyConfig, DEFAULT_CONFIG_FILE};
use grpc_intercept_proxy::discovery::{AddressRewrite, KademliaService};
use grpc_intercept_proxy::hooks::Hooks;
use grpc_intercept_proxy::proxy::{run_proxy, ProxyServer, ServiceDefinition};
use grpc_intercept_proxy::tls::{certificate_fingerprint, certificate_subject};
use grpc_intercept_proxy::{APP_NAME, VERSION};

/// Node service to put the proxy in front of
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Front {
    /// Peer discovery (KademliaService)
    Kademlia,
    /// Node-to-node gossip (GossipService)
    Gossip,
    /// Client API (CasperService)
    Client,
}

/// gRPC interception proxy for a node's services
#[derive(Parser, Debug)]
#[clap(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Configuration file (JSON); GRPC_PROXY_* environment variables apply on top
    #[clap(long)]
    config_file: Option<PathBuf>,

    /// Service to proxy
    #[clap(long, value_enum, default_value = "kademlia")]
    service: Front,

    /// Host of the real node
    #[clap(long)]
    node_host: Option<String>,

    /// gRPC port of the real node
    #[clap(long)]
    node_port: Option<u16>,

    /// Interface to listen on
    #[clap(long)]
    listen_host: Option<String>,

    /// Port to listen on
    #[clap(long)]
    proxy_port: Option<u16>,

    /// Certificate presented to clients (PEM)
    #[clap(long)]
    cert: Option<PathBuf>,

    /// Private key for the certificate (PEM)
    #[clap(long)]
    key: Option<PathBuf>,

    /// Root certificates trusted for the node (defaults to --cert)
    #[clap(long)]
    ca_cert: Option<PathBuf>,

    /// Client certificate chain presented to the node
    #[clap(long)]
    client_chain: Option<PathBuf>,

    /// Expected node identity (defaults to the certificate common name)
    #[clap(long)]
    node_id: Option<String>,

    /// Client certificate verification mode (required, optional, none)
    #[clap(long)]
    client_cert_mode: Option<ClientCertMode>,

    /// Worker threads of the proxy runtime
    #[clap(long)]
    worker_threads: Option<usize>,

    /// Calls served at the same time
    #[clap(long)]
    max_concurrent_calls: Option<usize>,

    /// Dial timeout towards the node, in seconds
    #[clap(long)]
    connection_timeout: Option<u64>,

    /// Per-call deadline towards the node, in seconds
    #[clap(long)]
    call_timeout: Option<u64>,

    /// Grace period for in-flight calls on shutdown, in seconds
    #[clap(long)]
    shutdown_grace: Option<u64>,

    /// Largest message accepted or forwarded, in bytes
    #[clap(long)]
    max_message_size: Option<usize>,

    /// Log level
    #[clap(long)]
    log_level: Option<String>,

    /// Rewrite advertised protocol ports to this port
    #[clap(long)]
    rewrite_protocol_port: Option<u16>,

    /// Rewrite advertised discovery ports to this port (defaults to the proxy port)
    #[clap(long)]
    rewrite_discovery_port: Option<u16>,

    /// Rewrite advertised hosts to this host
    #[clap(long)]
    rewrite_host: Option<String>,
}

impl Args {
    /// Explicit `--config-file`, else the default file when present
    fn config_path(&self) -> Option<PathBuf> {
        self.config_file.clone().or_else(|| {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            default.is_file().then_some(default)
        })
    }

    /// Command line values beat file and environment
    fn apply(&self, config: &mut ProxyConfig) {
        if let Some(v) = &self.node_host {
            config.node_host = v.clone();
        }
        if let Some(v) = self.node_port {
            config.node_port = v;
        }
        if let Some(v) = &self.listen_host {
            config.listen_host = v.clone();
        }
        if let Some(v) = self.proxy_port {
            config.proxy_port = v;
        }
        if let Some(v) = &self.cert {
            config.cert_path = v.clone();
        }
        if let Some(v) = &self.key {
            config.key_path = v.clone();
        }
        if let Some(v) = &self.ca_cert {
            config.ca_cert_path = Some(v.clone());
        }
        if let Some(v) = &self.client_chain {
            config.client_chain_path = Some(v.clone());
        }
        if let Some(v) = &self.node_id {
            config.node_id = Some(v.clone());
        }
        if let Some(v) = self.client_cert_mode {
            config.client_cert_mode = v;
        }
        if let Some(v) = self.worker_threads {
            config.worker_threads = v;
        }
        if let Some(v) = self.max_concurrent_calls {
            config.max_concurrent_calls = v;
        }
        if let Some(v) = self.connection_timeout {
            config.connection_timeout = v;
        }
        if let Some(v) = self.call_timeout {
            config.call_timeout = Some(v);
        }
        if let Some(v) = self.shutdown_grace {
            config.shutdown_grace = v;
        }
        if let Some(v) = self.max_message_size {
            config.max_message_size = Some(v);
        }
        if let Some(v) = &self.log_level {
            config.log_level = v.clone();
        }
    }

    fn hooks(&self, config: &ProxyConfig) -> Hooks {
        let Some(protocol_port) = self.rewrite_protocol_port else {
            return Hooks::default();
        };
        let discovery_port = self.rewrite_discovery_port.unwrap_or(config.proxy_port);
        let mut rewrite = AddressRewrite::new(protocol_port, discovery_port);
        if let Some(host) = &self.rewrite_host {
            rewrite = rewrite.with_host(host.clone());
        }
        info!("Rewriting advertised addresses: {:?}", rewrite);
        rewrite.hooks()
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config_path();
    let mut config = ProxyConfig::load(config_path.as_deref())?;
    args.apply(&mut config);

    init_logger(config.effective_log_level());
    info!("Starting {} v{}", APP_NAME, VERSION);

    config.validate()?;

    match read_file(&config.cert_path) {
        Ok(pem) => {
            match certificate_subject(&pem) {
                Ok(subject) => info!("Certificate subject: {}", subject),
                Err(e) => warn!("Unable to get certificate subject: {}", e),
            }
            match certificate_fingerprint(&pem) {
                Ok(fingerprint) => info!("Certificate fingerprint: {}", fingerprint),
                Err(e) => warn!("Unable to get certificate fingerprint: {}", e),
            }
        }
        Err(e) => warn!("Unable to read certificate: {}", e),
    }
    info!("Client certificate mode: {}", config.client_cert_mode);

    let hooks = args.hooks(&config);
    match args.service {
        Front::Kademlia => serve_until_ctrl_c(run_proxy::<KademliaService>(config, hooks)?),
        Front::Gossip => serve_until_ctrl_c(run_proxy::<GossipService>(config, hooks)?),
        Front::Client => serve_until_ctrl_c(run_proxy::<CasperService>(config, hooks)?),
    }
}

fn serve_until_ctrl_c<S: ServiceDefinition>(mut proxy: ProxyServer<S>) -> Result<()> {
    info!("Proxy for {} ready, press Ctrl+C to stop", S::NAME);

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(tokio::signal::ctrl_c())
        .map_err(|e| ProxyError::Other(format!("Failed to wait for Ctrl+C: {}", e)))?;

    proxy.stop()
}
