//! Router plugins
//!
//! Every inbound packet of a router passes through its [`PluginChain`]
//! before fan-out. Each plugin may pass a packet through, hold it back,
//! release several buffered packets at once, or drop it.
//!
//! ```text
//! publisher ──► [jitter-buffer] ──► [bitrate-meter] ──► subscribers
//! ```

pub mod bitrate;
pub mod jitter;

use std::any::Any;
use std::sync::Arc;

use crate::registry::error::RouterError;
use crate::rtp::RtpPacket;

pub use bitrate::{BitrateMeter, BITRATE_METER};
pub use jitter::{JitterBuffer, JitterBufferConfig, JITTER_BUFFER};

/// Stream processor attached to a router
///
/// Methods take `&self`; implementations synchronize internally so the
/// monitor can read stats while the packet pump is processing.
pub trait Plugin: Send + Sync {
    /// Unique name within a chain
    fn name(&self) -> &'static str;

    /// Process one packet, returning the packets to hand to the next stage
    fn process(&self, packet: RtpPacket) -> Vec<RtpPacket>;

    /// Release held packets whose deadline has passed
    ///
    /// Called periodically by the router pump so a stream tail is not held
    /// forever. Stages that never hold packets keep the default.
    fn poll(&self) -> Vec<RtpPacket> {
        Vec::new()
    }

    /// Whether the plugin can still process packets
    fn is_alive(&self) -> bool;

    /// Human-readable status line for operator logs
    fn stat(&self) -> String;

    /// Release resources. Idempotent.
    fn stop(&self);

    /// Access to the concrete type for typed diagnostics
    fn as_any(&self) -> &dyn Any;
}

/// Ordered set of plugins
#[derive(Default)]
pub struct PluginChain {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl PluginChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a plugin to the end of the chain
    pub fn install(&mut self, plugin: Arc<dyn Plugin>) -> Result<(), RouterError> {
        if self.get(plugin.name()).is_some() {
            return Err(RouterError::PluginExists(plugin.name().to_string()));
        }
        self.plugins.push(plugin);
        Ok(())
    }

    /// Look up a plugin by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.iter().find(|p| p.name() == name).cloned()
    }

    /// Names in processing order
    pub fn names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Run a packet through every stage in order
    pub fn process(&self, packet: RtpPacket) -> Vec<RtpPacket> {
        self.process_from(0, vec![packet])
    }

    /// Poll every stage, passing released packets through the later stages
    pub fn poll(&self) -> Vec<RtpPacket> {
        let mut out = Vec::new();
        for (i, plugin) in self.plugins.iter().enumerate() {
            let released = plugin.poll();
            if !released.is_empty() {
                out.extend(self.process_from(i + 1, released));
            }
        }
        out
    }

    fn process_from(&self, start: usize, mut packets: Vec<RtpPacket>) -> Vec<RtpPacket> {
        for plugin in self.plugins.iter().skip(start) {
            if packets.is_empty() {
                break;
            }
            packets = packets.into_iter().flat_map(|p| plugin.process(p)).collect();
        }
        packets
    }

    /// True if every plugin is alive (vacuously true for an empty chain)
    pub fn is_alive(&self) -> bool {
        self.plugins.iter().all(|p| p.is_alive())
    }

    /// Stop every plugin
    pub fn stop(&self) {
        for plugin in &self.plugins {
            plugin.stop();
        }
    }
}
