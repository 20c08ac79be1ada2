//! Liveness monitor
//!
//! Periodically scans the registry, reaps routers whose publisher or
//! pipeline has died, reports their ids on the cleanup queue and logs a
//! summary of the surviving sessions.
//!
//! The scan and the removals happen under one write lock so a router seen
//! as dead cannot be replaced or deleted by another caller halfway through.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::stats::MonitorStats;

use super::config::RegistryConfig;
use super::router::Router;
use super::store::RouterRegistry;

/// Outcome of one monitor cycle
#[derive(Debug, Clone, Default)]
pub struct CheckReport {
    /// Ids of routers reaped in this cycle, in reap order
    pub reaped: Vec<String>,
    /// Reaped ids that did not fit in the cleanup queue
    pub dropped: Vec<String>,
    /// Diagnostic summary, present when the registry was not empty
    pub summary: Option<String>,
}

impl RouterRegistry {
    /// Run one monitor cycle
    ///
    /// Never waits on the cleanup queue: ids that do not fit are dropped.
    pub async fn check(&self, clean_tx: &mpsc::Sender<String>) -> CheckReport {
        let mut report = CheckReport::default();
        let mut routers = self.routers.write().await;
        let had_routers = !routers.is_empty();

        let mut dead: Vec<String> = routers
            .iter()
            .filter(|(_, router)| !router.is_alive())
            .map(|(id, _)| id.clone())
            .collect();
        dead.sort();

        for id in dead {
            if let Some(router) = routers.remove(&id) {
                router.close();
            }

            match clean_tx.try_send(id.clone()) {
                Ok(()) => {
                    tracing::info!(session = %id, "Reaped dead router");
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(session = %id, "Reaped dead router, cleanup queue full");
                    report.dropped.push(id.clone());
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!(session = %id, "Reaped dead router, cleanup queue closed");
                    report.dropped.push(id.clone());
                }
            }
            report.reaped.push(id);
        }

        if had_routers {
            report.summary = Some(summarize(&routers, self.config()));
        }

        let live = routers.len();
        drop(routers);

        let mut stats = self.monitor_stats.lock();
        stats.cycles += 1;
        stats.reaped += report.reaped.len() as u64;
        stats.dropped_notifications += report.dropped.len() as u64;
        stats.live_sessions = live;

        report
    }

    /// Spawn the background monitor
    ///
    /// Runs one cycle every `check_interval` until the registry shuts down.
    pub fn spawn_monitor_task(
        self: &Arc<Self>,
        clean_tx: mpsc::Sender<String>,
    ) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        let interval = registry.config().check_interval;
        let shutdown = registry.shutdown_token();

        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let report = registry.check(&clean_tx).await;
                if let Some(summary) = report.summary {
                    tracing::info!("{}", summary);
                }
            }

            tracing::debug!("Liveness monitor stopped");
        })
    }

    /// Monitor counters
    pub fn monitor_stats(&self) -> MonitorStats {
        self.monitor_stats.lock().clone()
    }
}

/// Operator summary of the live sessions
fn summarize(routers: &HashMap<String, Arc<Router>>, config: &RegistryConfig) -> String {
    let mut ids: Vec<&String> = routers.keys().collect();
    ids.sort();

    let mut info = format!("\n---------------- routers: {} ----------------\n", routers.len());
    for id in ids {
        let router = &routers[id];
        let _ = writeln!(info, "pub: {}", id);

        if let Some(stat) = router.plugin_stat(config.diagnostic_plugin) {
            info.push_str(&stat);
        }

        let subscribers = router.subscriber_ids();
        if subscribers.len() < config.subscriber_display_limit {
            for sub in &subscribers {
                let _ = writeln!(info, "sub: {}", sub);
            }
        } else {
            let _ = writeln!(info, "subs: {}", subscribers.len());
        }
        info.push('\n');
    }
    info
}
