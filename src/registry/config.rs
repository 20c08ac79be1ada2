//! Registry configuration

use std::time::Duration;

use crate::plugin::{JitterBufferConfig, JITTER_BUFFER};

/// Configuration for the router registry and its liveness monitor
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Period of the liveness check
    pub check_interval: Duration,

    /// Capacity of the cleanup notification queue
    pub clean_capacity: usize,

    /// Subscriber count from which the summary shows a bare count
    pub subscriber_display_limit: usize,

    /// Plugin whose stat line is included in the summary
    pub diagnostic_plugin: &'static str,

    /// Jitter buffer installed on every new router (None = disabled)
    pub jitter_buffer: Option<JitterBufferConfig>,

    /// Install a bitrate meter on every new router
    pub bitrate_meter: bool,

    /// Period at which router pumps poll their plugins for held packets
    pub plugin_poll_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(3),
            clean_capacity: 100,
            subscriber_display_limit: 6,
            diagnostic_plugin: JITTER_BUFFER,
            jitter_buffer: Some(JitterBufferConfig::default()),
            bitrate_meter: false,
            plugin_poll_interval: Duration::from_millis(20),
        }
    }
}

impl RegistryConfig {
    /// Set the liveness check period
    pub fn check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Set the cleanup queue capacity
    pub fn clean_capacity(mut self, capacity: usize) -> Self {
        self.clean_capacity = capacity.max(1);
        self
    }

    /// Set the subscriber display threshold
    pub fn subscriber_display_limit(mut self, limit: usize) -> Self {
        self.subscriber_display_limit = limit;
        self
    }

    /// Set the diagnostic plugin name
    pub fn diagnostic_plugin(mut self, name: &'static str) -> Self {
        self.diagnostic_plugin = name;
        self
    }

    /// Configure the jitter buffer
    pub fn jitter_buffer(mut self, config: JitterBufferConfig) -> Self {
        self.jitter_buffer = Some(config);
        self
    }

    /// Do not install a jitter buffer on new routers
    pub fn disable_jitter_buffer(mut self) -> Self {
        self.jitter_buffer = None;
        self
    }

    /// Install a bitrate meter on new routers
    pub fn enable_bitrate_meter(mut self) -> Self {
        self.bitrate_meter = true;
        self
    }

    /// Set the plugin poll period
    pub fn plugin_poll_interval(mut self, interval: Duration) -> Self {
        self.plugin_poll_interval = interval.max(Duration::from_millis(1));
        self
    }
}
