//! Bitrate meter plugin
//!
//! Pass-through stage that accumulates traffic statistics for the stream.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::rtp::RtpPacket;
use crate::stats::StreamStats;

use super::Plugin;

/// Plugin name
pub const BITRATE_METER: &str = "bitrate-meter";

/// Traffic statistics collector
pub struct BitrateMeter {
    stats: Mutex<StreamStats>,
    stopped: AtomicBool,
}

impl BitrateMeter {
    pub fn new() -> Self {
        Self {
            stats: Mutex::new(StreamStats::new()),
            stopped: AtomicBool::new(false),
        }
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> StreamStats {
        self.stats.lock().clone()
    }
}

impl Default for BitrateMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for BitrateMeter {
    fn name(&self) -> &'static str {
        BITRATE_METER
    }

    fn process(&self, packet: RtpPacket) -> Vec<RtpPacket> {
        if self.stopped.load(Ordering::Acquire) {
            return Vec::new();
        }
        self.stats
            .lock()
            .record(packet.size(), packet.timestamp, packet.ssrc, packet.marker);
        vec![packet]
    }

    fn is_alive(&self) -> bool {
        !self.stopped.load(Ordering::Acquire)
    }

    fn stat(&self) -> String {
        let stats = self.stats();
        format!(
            "{}: packets={} bytes={} bitrate={}bps rate={:.1}pps\n",
            BITRATE_METER,
            stats.packets,
            stats.bytes_received,
            stats.bitrate(),
            stats.packet_rate(),
        )
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
