//! Relay server
//!
//! Binds the relay listener, runs the accept loop and the liveness monitor,
//! and exposes the router management surface.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::registry::{Router, RouterRegistry};
use crate::server::accept::{bind_transport, IdNegotiation};
use crate::server::config::ServerConfig;
use crate::stats::MonitorStats;
use crate::transport::{RelayCipher, RelayListener, Transport};

/// Media relay server
///
/// Created with [`RelayServer::init`]. Background tasks run until
/// [`RelayServer::close`] is called.
pub struct RelayServer {
    config: ServerConfig,
    registry: Arc<RouterRegistry>,
    local_addr: SocketAddr,
    encrypted: bool,
    clean_rx: Mutex<Option<mpsc::Receiver<String>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl RelayServer {
    /// Bind the relay listener and start the background tasks
    ///
    /// Nothing is spawned if the bind fails.
    pub async fn init(config: ServerConfig) -> Result<Self> {
        let cipher = match config.crypto {
            Some(ref crypto) => RelayCipher::from_config(crypto)?,
            None => None,
        };
        let encrypted = cipher.is_some();

        let mut listener =
            RelayListener::bind(config.bind_addr, cipher, config.transport.clone()).await?;
        listener.set_nodelay(config.tcp_nodelay);
        let local_addr = listener.local_addr()?;

        tracing::info!(
            addr = %local_addr,
            encrypted,
            "Relay server listening"
        );
        for server in &config.ice_servers {
            tracing::info!(ice_server = %server, "ICE server configured");
        }

        let registry = Arc::new(RouterRegistry::with_config(config.registry.clone()));
        let (clean_tx, clean_rx) = mpsc::channel(registry.config().clean_capacity);

        let monitor = registry.spawn_monitor_task(clean_tx);
        let acceptor = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&registry),
            config.negotiation(),
        ));

        Ok(Self {
            config,
            registry,
            local_addr,
            encrypted,
            clean_rx: Mutex::new(Some(clean_rx)),
            tasks: Mutex::new(vec![monitor, acceptor]),
        })
    }

    /// Get a reference to the router registry
    pub fn registry(&self) -> &Arc<RouterRegistry> {
        &self.registry
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Address the relay listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether relay links are encrypted
    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// Configured ICE servers
    pub fn ice_servers(&self) -> &[String] {
        &self.config.ice_servers
    }

    /// Liveness monitor counters
    pub fn monitor_stats(&self) -> MonitorStats {
        self.registry.monitor_stats()
    }

    /// Look up a router
    pub async fn get_router(&self, id: &str) -> Option<Arc<Router>> {
        self.registry.get(id).await
    }

    /// Get the router for `id`, creating it if absent
    pub async fn get_or_new_router(&self, id: &str) -> Arc<Router> {
        self.registry.get_or_create(id).await
    }

    /// Create a fresh router for `id`, closing any previous one
    pub async fn add_router(&self, id: &str) -> Arc<Router> {
        self.registry.create(id).await
    }

    /// Close and remove a router
    pub async fn del_router(&self, id: &str) {
        self.registry.delete(id).await;
    }

    /// Take the receiver of reaped session ids
    ///
    /// Available once. The queue is bounded and ids that do not fit are
    /// dropped, so a slow consumer misses notifications instead of
    /// stalling the monitor.
    pub fn take_clean_channel(&self) -> Option<mpsc::Receiver<String>> {
        self.clean_rx.lock().take()
    }

    /// Stop accepting, stop monitoring and close every router
    ///
    /// Safe to call more than once.
    pub async fn close(&self) {
        self.registry.close_all().await;

        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Background task failed");
            }
        }
    }
}

async fn accept_loop(
    listener: RelayListener,
    registry: Arc<RouterRegistry>,
    negotiation: IdNegotiation,
) {
    let shutdown = registry.shutdown_token();

    loop {
        let conn = tokio::select! {
            _ = shutdown.cancelled() => break,
            conn = listener.accept() => conn,
        };

        let conn = match conn {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!(error = %e, "Failed to accept relay connection");
                continue;
            }
        };

        // Negotiation waits on the peer, so it must not hold up the next accept
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            let peer = conn.remote_addr();
            match bind_transport(&registry, conn, &negotiation).await {
                Ok(router) => {
                    tracing::debug!(
                        session = %router.id(),
                        peer = %peer,
                        "Connection bound to router"
                    );
                }
                Err(Error::Stopped) => {
                    tracing::debug!(peer = %peer, "Connection dropped, server stopped");
                }
                Err(e) => {
                    tracing::debug!(peer = %peer, error = %e, "Connection rejected");
                }
            }
        });
    }

    tracing::debug!("Accept loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local() -> ServerConfig {
        ServerConfig::default().bind("127.0.0.1:0".parse().unwrap())
    }

    #[tokio::test]
    async fn test_init_binds_ephemeral_port() {
        let server = RelayServer::init(local()).await.unwrap();

        assert_ne!(server.local_addr().port(), 0);
        assert!(!server.is_encrypted());
        server.close().await;
    }

    #[tokio::test]
    async fn test_init_encrypted() {
        let server = RelayServer::init(local().crypto("key", "salt")).await.unwrap();
        assert!(server.is_encrypted());
        server.close().await;

        let server = RelayServer::init(local().crypto("key", "")).await.unwrap();
        assert!(!server.is_encrypted());
        server.close().await;
    }

    #[tokio::test]
    async fn test_init_bind_failure() {
        let first = RelayServer::init(local()).await.unwrap();
        let taken = ServerConfig::default().bind(first.local_addr());

        assert!(matches!(RelayServer::init(taken).await, Err(Error::Io(_))));
        first.close().await;
    }

    #[tokio::test]
    async fn test_clean_channel_taken_once() {
        let server = RelayServer::init(local()).await.unwrap();

        assert!(server.take_clean_channel().is_some());
        assert!(server.take_clean_channel().is_none());
        server.close().await;
    }

    #[tokio::test]
    async fn test_router_management() {
        let server = RelayServer::init(local()).await.unwrap();

        assert!(server.get_router("s1").await.is_none());

        let created = server.get_or_new_router("s1").await;
        assert!(Arc::ptr_eq(&created, &server.get_or_new_router("s1").await));

        let replaced = server.add_router("s1").await;
        assert!(!Arc::ptr_eq(&created, &replaced));
        assert!(created.is_closed());

        server.del_router("s1").await;
        assert!(server.get_router("s1").await.is_none());
        assert!(replaced.is_closed());

        server.close().await;
    }

    #[tokio::test]
    async fn test_close_twice() {
        let server = RelayServer::init(local()).await.unwrap();
        server.add_router("s1").await;

        server.close().await;
        server.close().await;

        assert!(server.registry().is_empty().await);
        assert!(server.registry().is_stopped());
    }
}
