//! Per-session router
//!
//! A router owns one publisher connection, the plugin chain that processes
//! its packets, and the set of subscribers the processed stream fans out to.
//!
//! ```text
//!  publisher.take_receiver() ──► pump task ──► PluginChain::process()
//!                      poll tick ──────────────► PluginChain::poll()
//!                                                   │
//!                                   ┌───────────────┼───────────────┐
//!                                   ▼               ▼               ▼
//!                             sub.write_rtp()  sub.write_rtp()  sub.write_rtp()
//! ```
//!
//! A single pump task per router delivers packets, so every subscriber sees
//! the pipeline output in the same order. Writes never wait: a full or
//! closed subscriber only loses its own copy.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::plugin::{BitrateMeter, JitterBuffer, Plugin, PluginChain};
use crate::rtp::RtpPacket;
use crate::transport::Transport;

use super::config::RegistryConfig;
use super::error::RouterError;

/// Routing entity for one publishing session
pub struct Router {
    id: String,
    publisher: Mutex<Option<Arc<dyn Transport>>>,
    plugins: RwLock<PluginChain>,
    subscribers: RwLock<HashMap<String, Arc<dyn Transport>>>,
    closed: AtomicBool,
    shutdown: CancellationToken,
    poll_interval: Duration,
}

impl Router {
    /// Create a router with the plugins enabled in `config`
    ///
    /// `shutdown` is cancelled when the router closes; pass a child of the
    /// registry token so a global stop reaches every pump task.
    pub fn new(
        id: impl Into<String>,
        config: &RegistryConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let mut plugins = PluginChain::new();
        if let Some(jitter) = &config.jitter_buffer {
            // Fresh chain, names cannot collide
            let _ = plugins.install(Arc::new(JitterBuffer::new(jitter.clone())));
        }
        if config.bitrate_meter {
            let _ = plugins.install(Arc::new(BitrateMeter::new()));
        }

        Self {
            id: id.into(),
            publisher: Mutex::new(None),
            plugins: RwLock::new(plugins),
            subscribers: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
            shutdown,
            poll_interval: config.plugin_poll_interval,
        }
    }

    /// Session identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Append a plugin to the processing chain
    pub fn install_plugin(&self, plugin: Arc<dyn Plugin>) -> Result<(), RouterError> {
        if self.is_closed() {
            return Err(RouterError::Closed(self.id.clone()));
        }
        self.plugins.write().install(plugin)
    }

    /// Look up an installed plugin by name
    pub fn plugin(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.read().get(name)
    }

    /// Installed plugin names in processing order
    pub fn plugin_names(&self) -> Vec<&'static str> {
        self.plugins.read().names()
    }

    /// Stat line of a plugin, if installed
    pub fn plugin_stat(&self, name: &str) -> Option<String> {
        self.plugin(name).map(|p| p.stat())
    }

    /// Bind the publisher and start pumping its packets
    ///
    /// Must be called from within a Tokio runtime. A router accepts exactly
    /// one publisher; later attempts fail with
    /// [`RouterError::AlreadyPublishing`] and leave the original in place.
    pub fn attach_publisher(
        self: &Arc<Self>,
        publisher: Arc<dyn Transport>,
    ) -> Result<(), RouterError> {
        let mut slot = self.publisher.lock();

        if self.is_closed() {
            return Err(RouterError::Closed(self.id.clone()));
        }
        if slot.is_some() {
            tracing::warn!(
                session = %self.id,
                peer = %publisher.remote_addr(),
                "Publisher already attached, rejecting"
            );
            return Err(RouterError::AlreadyPublishing(self.id.clone()));
        }

        let rx = publisher
            .take_receiver()
            .ok_or_else(|| RouterError::ReceiverTaken(self.id.clone()))?;

        tracing::info!(
            session = %self.id,
            peer = %publisher.remote_addr(),
            "Publisher attached"
        );

        *slot = Some(publisher);
        tokio::spawn(Arc::clone(self).pump(rx));

        Ok(())
    }

    /// Current publisher, if attached
    pub fn publisher(&self) -> Option<Arc<dyn Transport>> {
        self.publisher.lock().clone()
    }

    /// Add a subscriber
    ///
    /// The subscriber receives packets processed after this call. An
    /// existing subscriber with the same id is replaced and closed.
    pub fn add_subscriber(
        &self,
        id: impl Into<String>,
        subscriber: Arc<dyn Transport>,
    ) -> Result<(), RouterError> {
        let id = id.into();
        let replaced = {
            let mut subscribers = self.subscribers.write();
            if self.is_closed() {
                return Err(RouterError::Closed(self.id.clone()));
            }
            subscribers.insert(id.clone(), subscriber)
        };

        if let Some(old) = replaced {
            old.close();
        }

        tracing::debug!(session = %self.id, subscriber = %id, "Subscriber added");
        Ok(())
    }

    /// Remove and close a subscriber. Returns false if it was not present.
    pub fn remove_subscriber(&self, id: &str) -> bool {
        let removed = self.subscribers.write().remove(id);

        match removed {
            Some(subscriber) => {
                subscriber.close();
                tracing::debug!(session = %self.id, subscriber = %id, "Subscriber removed");
                true
            }
            None => false,
        }
    }

    /// Snapshot of the subscriber set
    pub fn subscribers(&self) -> Vec<(String, Arc<dyn Transport>)> {
        self.subscribers
            .read()
            .iter()
            .map(|(id, sub)| (id.clone(), Arc::clone(sub)))
            .collect()
    }

    /// Subscriber ids, sorted
    pub fn subscriber_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.subscribers.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Publisher alive and every plugin alive
    pub fn is_alive(&self) -> bool {
        let publisher_alive = self
            .publisher
            .lock()
            .as_ref()
            .map(|p| p.is_alive())
            .unwrap_or(false);

        publisher_alive && self.plugins.read().is_alive()
    }

    /// Check if the router has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Tear down the router
    ///
    /// Closes the publisher and every subscriber, stops every plugin and
    /// clears the subscriber set. Only the first call has any effect.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.shutdown.cancel();

        let publisher = self.publisher.lock().take();
        if let Some(publisher) = publisher {
            publisher.close();
        }

        let subscribers: Vec<_> = self.subscribers.write().drain().collect();
        let subscriber_count = subscribers.len();
        for (_, subscriber) in subscribers {
            subscriber.close();
        }

        self.plugins.read().stop();

        tracing::info!(
            session = %self.id,
            subscribers = subscriber_count,
            "Router closed"
        );
    }

    async fn pump(self: Arc<Self>, mut rx: mpsc::Receiver<RtpPacket>) {
        let start = tokio::time::Instant::now() + self.poll_interval;
        let mut ticker = tokio::time::interval_at(start, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let processed = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                packet = rx.recv() => match packet {
                    Some(packet) => self.plugins.read().process(packet),
                    None => break,
                },
                _ = ticker.tick() => self.plugins.read().poll(),
            };

            if !processed.is_empty() {
                self.fan_out(&processed);
            }
        }

        tracing::debug!(session = %self.id, "Publisher pump stopped");
    }

    fn fan_out(&self, packets: &[RtpPacket]) {
        let subscribers = self.subscribers.read();

        for packet in packets {
            for (id, subscriber) in subscribers.iter() {
                match subscriber.write_rtp(packet) {
                    Ok(()) => {}
                    Err(TransportError::Backpressure) => {
                        tracing::trace!(
                            session = %self.id,
                            subscriber = %id,
                            seq = packet.sequence_number,
                            "Subscriber queue full, packet dropped"
                        );
                    }
                    Err(e) => {
                        tracing::trace!(
                            session = %self.id,
                            subscriber = %id,
                            error = %e,
                            "Subscriber write failed"
                        );
                    }
                }
            }
        }
    }
}
