//! Router registry implementation
//!
//! The single source of truth for which sessions are active. Shared by the
//! relay accept loop, the liveness monitor and external management calls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::stats::MonitorStats;

use super::config::RegistryConfig;
use super::router::Router;

/// Central registry for all active routers
///
/// Thread-safe via `RwLock`. Lookups share the read lock; insertions and
/// removals take the write lock, so check-then-insert sequences are atomic.
pub struct RouterRegistry {
    /// Map of session id to router
    pub(super) routers: RwLock<HashMap<String, Arc<Router>>>,

    /// Configuration
    config: RegistryConfig,

    /// Set once by `close_all`
    stopped: AtomicBool,

    /// Cancelled on shutdown; parent of every router token
    shutdown: CancellationToken,

    /// Liveness monitor counters
    pub(super) monitor_stats: parking_lot::Mutex<MonitorStats>,
}

impl RouterRegistry {
    /// Create a new registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            routers: RwLock::new(HashMap::new()),
            config,
            stopped: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            monitor_stats: parking_lot::Mutex::new(MonitorStats::default()),
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Token cancelled by [`close_all`](Self::close_all)
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Check if the registry has been shut down
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn new_router(&self, id: &str) -> Arc<Router> {
        Arc::new(Router::new(id, &self.config, self.shutdown.child_token()))
    }

    /// Look up a router. Never creates.
    pub async fn get(&self, id: &str) -> Option<Arc<Router>> {
        self.routers.read().await.get(id).cloned()
    }

    /// Return the router for `id`, creating it if absent
    ///
    /// Concurrent first-time callers all receive the same instance.
    pub async fn get_or_create(&self, id: &str) -> Arc<Router> {
        if let Some(router) = self.get(id).await {
            return router;
        }

        let mut routers = self.routers.write().await;
        if let Some(router) = routers.get(id) {
            return Arc::clone(router);
        }

        let router = self.new_router(id);
        routers.insert(id.to_string(), Arc::clone(&router));
        tracing::info!(session = %id, "Router created");
        router
    }

    /// Create a fresh router for `id`
    ///
    /// A router already registered under the same id is closed and
    /// replaced in the same critical section.
    pub async fn create(&self, id: &str) -> Arc<Router> {
        let router = self.new_router(id);

        let previous = {
            let mut routers = self.routers.write().await;
            let previous = routers.insert(id.to_string(), Arc::clone(&router));
            if let Some(ref previous) = previous {
                previous.close();
            }
            previous
        };

        if previous.is_some() {
            tracing::info!(session = %id, "Router superseded by new session");
        } else {
            tracing::info!(session = %id, "Router created");
        }

        router
    }

    /// Close and remove a router. No-op if absent.
    ///
    /// Returns true if this call removed the router.
    pub async fn delete(&self, id: &str) -> bool {
        let removed = self.routers.write().await.remove(id);

        match removed {
            Some(router) => {
                router.close();
                tracing::info!(session = %id, "Router deleted");
                true
            }
            None => false,
        }
    }

    /// Point-in-time copy of every entry
    pub async fn snapshot(&self) -> Vec<(String, Arc<Router>)> {
        self.routers
            .read()
            .await
            .iter()
            .map(|(id, router)| (id.clone(), Arc::clone(router)))
            .collect()
    }

    /// Registered session ids, sorted
    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.routers.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Get total number of routers
    pub async fn len(&self) -> usize {
        self.routers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.routers.read().await.is_empty()
    }

    /// Stop everything
    ///
    /// The first call cancels the shutdown token (stopping the accept loop,
    /// the monitor and every router pump) and closes every router. Later
    /// calls do nothing.
    pub async fn close_all(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }

        self.shutdown.cancel();

        let mut routers = self.routers.write().await;
        let count = routers.len();
        for (_, router) in routers.drain() {
            router.close();
        }

        tracing::info!(routers = count, "Registry shut down");
    }
}

impl Default for RouterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
