//! Network utility functions
//!
//! This module provides the [`Endpoint`] type shared by the inbound listener
//! and the outbound node target, plus socket helpers.

use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use socket2::{Domain, Protocol, Socket, Type};

use super::error::{ProxyError, Result};

/// Listen backlog for the inbound socket
const LISTEN_BACKLOG: i32 = 1024;

/// A host/port pair
///
/// Identifies either the inbound proxy listener or the outbound node target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// Host name or IP address
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl Endpoint {
    /// Create an endpoint, rejecting an empty host
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self> {
        let host = host.into();
        if host.trim().is_empty() {
            return Err(ProxyError::Config("Endpoint host must not be empty".to_string()));
        }
        Ok(Self { host, port })
    }

    /// Check that the endpoint can be dialed (port 0 is only meaningful for listeners)
    pub fn ensure_dialable(&self) -> Result<()> {
        if self.port == 0 {
            return Err(ProxyError::Config(format!("Endpoint {} has no port", self)));
        }
        Ok(())
    }

    /// Resolve to a socket address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        parse_socket_addr(&self.to_string())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') && !self.host.starts_with('[') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Endpoint {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| ProxyError::Config(format!("Expected host:port, got {}", s)))?;
        let port = port
            .parse::<u16>()
            .map_err(|e| ProxyError::Config(format!("Invalid port in {}: {}", s, e)))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        Endpoint::new(host, port)
    }
}

/// Parse a socket address
///
/// # Arguments
///
/// * `addr` - The address string to parse
///
/// # Returns
///
/// The parsed `SocketAddr`
pub fn parse_socket_addr(addr: &str) -> Result<SocketAddr> {
    // Try direct parsing first
    if let Ok(socket_addr) = SocketAddr::from_str(addr) {
        return Ok(socket_addr);
    }

    match addr.to_socket_addrs() {
        Ok(mut addrs) => addrs
            .next()
            .ok_or_else(|| ProxyError::Config(format!("Failed to parse address: {}", addr))),
        Err(e) => Err(ProxyError::Config(format!("Failed to parse address {}: {}", addr, e))),
    }
}

/// Bind a non-blocking TCP listener
///
/// The socket is created with `SO_REUSEADDR` so a port released by a stopped
/// proxy can be bound again at once.
pub fn bind_listener(addr: SocketAddr) -> Result<std::net::TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    #[cfg(unix)]
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_socket_addr() {
        let addr = parse_socket_addr("127.0.0.1:8080").unwrap();
        assert_eq!(addr.port(), 8080);

        assert!(parse_socket_addr("invalid-address").is_err());
    }

    #[test]
    fn test_endpoint_display_and_parse() {
        let endpoint: Endpoint = "127.0.0.1:50400".parse().unwrap();
        assert_eq!(endpoint, Endpoint::new("127.0.0.1", 50400).unwrap());
        assert_eq!(endpoint.to_string(), "127.0.0.1:50400");

        let v6 = Endpoint::new("::1", 40400).unwrap();
        assert_eq!(v6.to_string(), "[::1]:40400");
        assert_eq!("[::1]:40400".parse::<Endpoint>().unwrap(), v6);

        assert!("no-port".parse::<Endpoint>().is_err());
        assert!(":40400".parse::<Endpoint>().is_err());
    }

    #[test]
    fn test_endpoint_dialable() {
        assert!(Endpoint::new("localhost", 0).unwrap().ensure_dialable().is_err());
        assert!(Endpoint::new("localhost", 1).unwrap().ensure_dialable().is_ok());
        assert!(Endpoint::new("  ", 1).is_err());
    }

    #[test]
    fn test_bind_listener_rebind() {
        let listener = bind_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let again = bind_listener(addr).unwrap();
        assert_eq!(again.local_addr().unwrap(), addr);
    }
}
