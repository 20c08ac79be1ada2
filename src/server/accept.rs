//! Connection acceptance
//!
//! A new connection only becomes routable once its peer has announced a
//! session id. The id is polled on a fixed schedule: this is a deadline for
//! attaching resources to the connection, not a retry of a failed operation.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result, TransportError};
use crate::registry::{Router, RouterRegistry};
use crate::transport::Transport;

/// Id polling schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdNegotiation {
    /// Delay between checks
    pub interval: Duration,
    /// Number of checks before giving up
    pub attempts: u32,
}

impl Default for IdNegotiation {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1),
            attempts: 100,
        }
    }
}

/// Wait for a connection to expose its session id
///
/// Returns `None` when the attempts are spent, the connection dies, or
/// `shutdown` is cancelled.
pub async fn negotiate_id(
    conn: &dyn Transport,
    negotiation: &IdNegotiation,
    shutdown: &CancellationToken,
) -> Option<String> {
    for attempt in 0..negotiation.attempts {
        if let Some(id) = conn.id().filter(|id| !id.is_empty()) {
            tracing::trace!(peer = %conn.remote_addr(), attempt, "Session id negotiated");
            return Some(id);
        }

        if !conn.is_alive() {
            return None;
        }

        tokio::select! {
            _ = shutdown.cancelled() => return None,
            _ = tokio::time::sleep(negotiation.interval) => {}
        }
    }

    // The last sleep may have been the one that let the id through
    conn.id().filter(|id| !id.is_empty())
}

/// Negotiate the session id and attach `conn` as publisher of a fresh router
///
/// On any failure the connection is closed and the accept loop moves on.
pub async fn bind_transport(
    registry: &RouterRegistry,
    conn: Arc<dyn Transport>,
    negotiation: &IdNegotiation,
) -> Result<Arc<Router>> {
    let shutdown = registry.shutdown_token();
    let peer = conn.remote_addr();

    let id = match negotiate_id(conn.as_ref(), negotiation, &shutdown).await {
        Some(id) => id,
        None => {
            conn.close();
            if registry.is_stopped() {
                return Err(Error::Stopped);
            }
            tracing::error!(
                peer = %peer,
                attempts = negotiation.attempts,
                "Session id not announced, dropping connection"
            );
            return Err(TransportError::IdNegotiation(negotiation.attempts).into());
        }
    };

    if registry.is_stopped() {
        conn.close();
        return Err(Error::Stopped);
    }

    let router = registry.create(&id).await;

    // Shutdown may have drained the registry between the check and the insert
    if registry.is_stopped() {
        registry.delete(&id).await;
        conn.close();
        return Err(Error::Stopped);
    }

    if let Err(e) = router.attach_publisher(Arc::clone(&conn)) {
        tracing::warn!(session = %id, peer = %peer, error = %e, "Failed to attach publisher");
        conn.close();
        return Err(e.into());
    }

    Ok(router)
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use tokio_test::assert_ok;

    use super::*;
    use crate::transport::{RtpTransport, TransportConfig};

    fn transport() -> Arc<RtpTransport> {
        let addr: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        let (transport, io) = RtpTransport::detached(addr, &TransportConfig::default());
        drop(io);
        transport
    }

    fn quick() -> IdNegotiation {
        IdNegotiation {
            interval: Duration::from_millis(1),
            attempts: 20,
        }
    }

    #[tokio::test]
    async fn test_negotiate_immediate() {
        let conn = transport();
        conn.set_id("s1");

        let id = negotiate_id(conn.as_ref(), &quick(), &CancellationToken::new()).await;
        assert_eq!(id.as_deref(), Some("s1"));
    }

    #[tokio::test]
    async fn test_negotiate_late_announcement() {
        let conn = transport();
        let negotiation = IdNegotiation {
            interval: Duration::from_millis(5),
            attempts: 200,
        };

        let announcer = Arc::clone(&conn);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            announcer.set_id("late");
        });

        let id = negotiate_id(conn.as_ref(), &negotiation, &CancellationToken::new()).await;
        assert_eq!(id.as_deref(), Some("late"));
    }

    #[tokio::test]
    async fn test_negotiate_gives_up() {
        let conn = transport();

        let id = negotiate_id(conn.as_ref(), &quick(), &CancellationToken::new()).await;
        assert!(id.is_none());
    }

    #[tokio::test]
    async fn test_negotiate_dead_connection() {
        let conn = transport();
        conn.close();

        let negotiation = IdNegotiation {
            interval: Duration::from_secs(10),
            attempts: 100,
        };
        let id = tokio::time::timeout(
            Duration::from_secs(1),
            negotiate_id(conn.as_ref(), &negotiation, &CancellationToken::new()),
        )
        .await
        .unwrap();
        assert!(id.is_none());
    }

    #[tokio::test]
    async fn test_bind_attaches_publisher() {
        let registry = RouterRegistry::new();
        let conn = transport();
        conn.set_id("s1");

        let router = assert_ok!(bind_transport(&registry, conn.clone(), &quick()).await);

        assert_eq!(router.id(), "s1");
        assert!(router.publisher().is_some());
        assert!(Arc::ptr_eq(&registry.get("s1").await.unwrap(), &router));
    }

    #[tokio::test]
    async fn test_bind_without_id_closes_connection() {
        let registry = RouterRegistry::new();
        let conn = transport();

        let result = bind_transport(&registry, conn.clone(), &quick()).await;

        assert!(matches!(
            result,
            Err(Error::Transport(TransportError::IdNegotiation(20)))
        ));
        assert!(!conn.is_alive());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_bind_after_shutdown() {
        let registry = RouterRegistry::new();
        registry.close_all().await;

        let conn = transport();
        conn.set_id("s1");

        let result = bind_transport(&registry, conn.clone(), &quick()).await;

        assert!(matches!(result, Err(Error::Stopped)));
        assert!(!conn.is_alive());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_bind_replaces_previous_session() {
        let registry = RouterRegistry::new();

        let first = transport();
        first.set_id("s1");
        let old = assert_ok!(bind_transport(&registry, first.clone(), &quick()).await);

        let second = transport();
        second.set_id("s1");
        let new = assert_ok!(bind_transport(&registry, second.clone(), &quick()).await);

        assert!(old.is_closed());
        assert!(!first.is_alive());
        assert!(!new.is_closed());
        assert!(second.is_alive());
    }
}
