//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::registry::RegistryConfig;
use crate::server::accept::IdNegotiation;
use crate::transport::{RelayCrypto, TransportConfig};

/// Default relay port
pub const DEFAULT_PORT: u16 = 5000;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// ICE servers handed to WebRTC peers
    pub ice_servers: Vec<String>,

    /// Relay encryption, used only when both key and salt are set
    pub crypto: Option<RelayCrypto>,

    /// Delay between session id checks on a new connection
    pub id_poll_interval: Duration,

    /// Session id checks before a new connection is dropped
    pub id_poll_attempts: u32,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Per-connection queue and frame limits
    pub transport: TransportConfig,

    /// Router registry settings
    pub registry: RegistryConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            ice_servers: Vec::new(),
            crypto: None,
            id_poll_interval: Duration::from_millis(1),
            id_poll_attempts: 100,
            tcp_nodelay: true, // Important for low latency
            transport: TransportConfig::default(),
            registry: RegistryConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new config listening on all interfaces at `port`
    pub fn with_port(port: u16) -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], port)),
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the ICE server list
    pub fn ice_servers<I, S>(mut self, servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ice_servers = servers.into_iter().map(Into::into).collect();
        self
    }

    /// Set the relay key and salt
    ///
    /// Empty values leave the relay unencrypted.
    pub fn crypto(mut self, key: impl Into<String>, salt: impl Into<String>) -> Self {
        self.crypto = Some(RelayCrypto::new(key, salt));
        self
    }

    /// Set the session id polling schedule
    pub fn id_poll(mut self, interval: Duration, attempts: u32) -> Self {
        self.id_poll_interval = interval;
        self.id_poll_attempts = attempts.max(1);
        self
    }

    /// Enable or disable TCP_NODELAY
    pub fn tcp_nodelay(mut self, nodelay: bool) -> Self {
        self.tcp_nodelay = nodelay;
        self
    }

    /// Set transport limits
    pub fn transport(mut self, config: TransportConfig) -> Self {
        self.transport = config;
        self
    }

    /// Set registry configuration
    pub fn registry(mut self, config: RegistryConfig) -> Self {
        self.registry = config;
        self
    }

    /// Whether the relay listener will be encrypted
    pub fn is_encrypted(&self) -> bool {
        self.crypto.as_ref().is_some_and(RelayCrypto::is_enabled)
    }

    /// Id negotiation schedule for accepted connections
    pub fn negotiation(&self) -> IdNegotiation {
        IdNegotiation {
            interval: self.id_poll_interval,
            attempts: self.id_poll_attempts,
        }
    }
}
