//! Statistics and metrics for relayed streams

use std::time::{Duration, Instant};

/// Per-stream traffic statistics
#[derive(Debug, Clone)]
pub struct StreamStats {
    /// When the first packet was counted
    pub started_at: Instant,
    /// Total bytes received
    pub bytes_received: u64,
    /// Total packets received
    pub packets: u64,
    /// Packets with the marker bit set (frame boundaries for video)
    pub markers: u64,
    /// Last RTP timestamp seen
    pub last_timestamp: u32,
    /// Last SSRC seen
    pub last_ssrc: Option<u32>,
}

impl StreamStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            bytes_received: 0,
            packets: 0,
            markers: 0,
            last_timestamp: 0,
            last_ssrc: None,
        }
    }

    /// Account for one packet
    pub fn record(&mut self, size: usize, timestamp: u32, ssrc: u32, marker: bool) {
        self.bytes_received += size as u64;
        self.packets += 1;
        if marker {
            self.markers += 1;
        }
        self.last_timestamp = timestamp;
        self.last_ssrc = Some(ssrc);
    }

    /// Get duration since stream started
    pub fn duration(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Calculate bitrate in bits per second
    pub fn bitrate(&self) -> u64 {
        Self::bitrate_over(self.bytes_received, self.duration())
    }

    /// Calculate packet rate
    pub fn packet_rate(&self) -> f64 {
        let secs = self.duration().as_secs_f64();
        if secs > 0.0 {
            self.packets as f64 / secs
        } else {
            0.0
        }
    }

    fn bitrate_over(bytes: u64, duration: Duration) -> u64 {
        let secs = duration.as_secs();
        if secs > 0 {
            (bytes * 8) / secs
        } else {
            0
        }
    }
}

impl Default for StreamStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Liveness monitor counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorStats {
    /// Completed check cycles
    pub cycles: u64,
    /// Routers reaped since start
    pub reaped: u64,
    /// Reaped ids dropped because the cleanup queue was full
    pub dropped_notifications: u64,
    /// Live sessions after the last cycle
    pub live_sessions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_stats_new() {
        let stats = StreamStats::new();
        assert_eq!(stats.bytes_received, 0);
        assert_eq!(stats.packets, 0);
        assert_eq!(stats.markers, 0);
        assert!(stats.last_ssrc.is_none());
    }

    #[test]
    fn test_record() {
        let mut stats = StreamStats::new();
        stats.record(1200, 3000, 0xABCD, false);
        stats.record(800, 6000, 0xABCD, true);

        assert_eq!(stats.bytes_received, 2000);
        assert_eq!(stats.packets, 2);
        assert_eq!(stats.markers, 1);
        assert_eq!(stats.last_timestamp, 6000);
        assert_eq!(stats.last_ssrc, Some(0xABCD));
    }

    #[test]
    fn test_bitrate_over() {
        // 1,000,000 bytes * 8 bits / 10 seconds = 800,000 bps
        assert_eq!(StreamStats::bitrate_over(1_000_000, Duration::from_secs(10)), 800_000);
    }

    #[test]
    fn test_bitrate_zero_duration() {
        assert_eq!(StreamStats::bitrate_over(1_000_000, Duration::ZERO), 0);
    }

    #[test]
    fn test_packet_rate_non_negative() {
        let stats = StreamStats::new();
        assert!(stats.packet_rate() >= 0.0);
    }

    #[test]
    fn test_monitor_stats_default() {
        let stats = MonitorStats::default();
        assert_eq!(stats.cycles, 0);
        assert_eq!(stats.reaped, 0);
        assert_eq!(stats.dropped_notifications, 0);
    }
}
