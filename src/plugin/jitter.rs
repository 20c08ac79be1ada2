//! Jitter buffer plugin
//!
//! Restores sequence-number order on the inbound stream. Packets that arrive
//! ahead of the playout point are held until the gap fills. A gap is given
//! up on, and its sequence numbers counted as lost, when either:
//!
//! - the oldest held packet has waited `max_delay`, or
//! - more than `max_depth` packets pile up behind it.
//!
//! Sequence numbers are compared with 16-bit wraparound: a packet is "ahead"
//! when it is less than half the sequence space past the playout point.
//! A new SSRC, or `resync_after` late packets in a row, means the sender
//! restarted its numbering; the buffer flushes and restarts from the new
//! sequence number.

use std::any::Any;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::rtp::RtpPacket;

use super::Plugin;

/// Plugin name
pub const JITTER_BUFFER: &str = "jitter-buffer";

const HALF_SEQ_SPACE: u16 = 0x8000;

/// Jitter buffer configuration
#[derive(Debug, Clone)]
pub struct JitterBufferConfig {
    /// Maximum packets held while waiting for a missing sequence number
    pub max_depth: usize,

    /// Longest time a packet is held waiting for a gap to fill
    pub max_delay: Duration,

    /// Consecutive late packets that trigger a resync
    pub resync_after: u32,
}

impl Default for JitterBufferConfig {
    fn default() -> Self {
        Self {
            max_depth: 100,
            max_delay: Duration::from_millis(200),
            resync_after: 16,
        }
    }
}

impl JitterBufferConfig {
    /// Set maximum buffer depth
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth.max(1);
        self
    }

    /// Set the playout deadline
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the late-packet streak that restarts the sequence
    pub fn resync_after(mut self, packets: u32) -> Self {
        self.resync_after = packets.max(1);
        self
    }
}

/// Jitter buffer counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JitterStats {
    /// Packets handed to the buffer
    pub received: u64,
    /// Packets released in order
    pub emitted: u64,
    /// Packets that arrived ahead of the playout point
    pub out_of_order: u64,
    /// Packets already buffered
    pub duplicates: u64,
    /// Packets behind the playout point
    pub late: u64,
    /// Sequence numbers given up on
    pub lost: u64,
    /// Sequence restarts (SSRC change or late streak)
    pub resyncs: u64,
    /// Packets currently held
    pub buffered: usize,
}

impl JitterStats {
    /// Fraction of expected packets that were lost
    pub fn loss_rate(&self) -> f64 {
        let expected = self.emitted + self.lost;
        if expected == 0 {
            0.0
        } else {
            self.lost as f64 / expected as f64
        }
    }
}

struct Held {
    packet: RtpPacket,
    arrived: Instant,
}

#[derive(Default)]
struct JitterState {
    next_seq: Option<u16>,
    ssrc: Option<u32>,
    pending: HashMap<u16, Held>,
    late_streak: u32,
    stats: JitterStats,
    stopped: bool,
}

impl JitterState {
    fn drain_ready(&mut self, out: &mut Vec<RtpPacket>) {
        let Some(mut next) = self.next_seq else {
            return;
        };
        while let Some(held) = self.pending.remove(&next) {
            out.push(held.packet);
            self.stats.emitted += 1;
            next = next.wrapping_add(1);
        }
        self.next_seq = Some(next);
    }

    /// Skip the playout point to the closest buffered packet
    fn skip_gap(&mut self) {
        let Some(next) = self.next_seq else {
            return;
        };
        let closest = self.pending.keys().map(|&seq| seq.wrapping_sub(next)).min();
        if let Some(distance) = closest {
            self.stats.lost += distance as u64;
            self.next_seq = Some(next.wrapping_add(distance));
        }
    }

    /// Give up on gaps until the oldest held packet is within the deadline
    fn expire(&mut self, now: Instant, max_delay: Duration, out: &mut Vec<RtpPacket>) {
        loop {
            let oldest = self.pending.values().map(|held| held.arrived).min();
            match oldest {
                Some(arrived) if now.saturating_duration_since(arrived) >= max_delay => {
                    self.skip_gap();
                    self.drain_ready(out);
                }
                _ => break,
            }
        }
    }

    /// Release everything held, then restart the playout point at `seq`
    fn resync(&mut self, seq: u16, out: &mut Vec<RtpPacket>) {
        while !self.pending.is_empty() {
            self.skip_gap();
            self.drain_ready(out);
        }
        self.next_seq = Some(seq);
        self.late_streak = 0;
        self.stats.resyncs += 1;
    }
}

/// Sequence-reordering jitter buffer
pub struct JitterBuffer {
    config: JitterBufferConfig,
    state: Mutex<JitterState>,
}

impl JitterBuffer {
    pub fn new(config: JitterBufferConfig) -> Self {
        Self {
            config,
            state: Mutex::new(JitterState::default()),
        }
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> JitterStats {
        let state = self.state.lock();
        let mut stats = state.stats.clone();
        stats.buffered = state.pending.len();
        stats
    }

    fn process_at(&self, packet: RtpPacket, now: Instant) -> Vec<RtpPacket> {
        let mut state = self.state.lock();
        if state.stopped {
            return Vec::new();
        }

        state.stats.received += 1;
        let seq = packet.sequence_number;
        let mut out = Vec::new();

        if let Some(previous) = state.ssrc.replace(packet.ssrc) {
            if previous != packet.ssrc {
                tracing::debug!(
                    old_ssrc = previous,
                    new_ssrc = packet.ssrc,
                    "Jitter buffer resync on SSRC change"
                );
                state.resync(seq, &mut out);
            }
        }

        let mut next = *state.next_seq.get_or_insert(seq);
        if seq.wrapping_sub(next) >= HALF_SEQ_SPACE {
            state.late_streak += 1;
            if state.late_streak < self.config.resync_after {
                state.stats.late += 1;
                tracing::trace!(seq, expected = next, "Jitter buffer dropping late packet");
                state.expire(now, self.config.max_delay, &mut out);
                return out;
            }

            tracing::debug!(seq, expected = next, "Jitter buffer resync after late streak");
            state.resync(seq, &mut out);
            next = seq;
        } else {
            state.late_streak = 0;
        }

        if state.pending.contains_key(&seq) {
            state.stats.duplicates += 1;
            return out;
        }
        if seq != next {
            state.stats.out_of_order += 1;
        }

        state.pending.insert(seq, Held { packet, arrived: now });

        state.drain_ready(&mut out);
        while state.pending.len() > self.config.max_depth {
            state.skip_gap();
            state.drain_ready(&mut out);
        }
        state.expire(now, self.config.max_delay, &mut out);
        out
    }

    fn poll_at(&self, now: Instant) -> Vec<RtpPacket> {
        let mut state = self.state.lock();
        let mut out = Vec::new();
        if !state.stopped {
            state.expire(now, self.config.max_delay, &mut out);
        }
        out
    }
}

impl Default for JitterBuffer {
    fn default() -> Self {
        Self::new(JitterBufferConfig::default())
    }
}

impl Plugin for JitterBuffer {
    fn name(&self) -> &'static str {
        JITTER_BUFFER
    }

    fn process(&self, packet: RtpPacket) -> Vec<RtpPacket> {
        self.process_at(packet, Instant::now())
    }

    fn poll(&self) -> Vec<RtpPacket> {
        self.poll_at(Instant::now())
    }

    fn is_alive(&self) -> bool {
        !self.state.lock().stopped
    }

    fn stat(&self) -> String {
        let stats = self.stats();
        format!(
            "{}: received={} emitted={} buffered={} lost={} late={} duplicates={} \
             out_of_order={} resyncs={} loss={:.2}%\n",
            JITTER_BUFFER,
            stats.received,
            stats.emitted,
            stats.buffered,
            stats.lost,
            stats.late,
            stats.duplicates,
            stats.out_of_order,
            stats.resyncs,
            stats.loss_rate() * 100.0,
        )
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        state.stopped = true;
        state.pending.clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
