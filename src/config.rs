// THEORY:
// Two plain config structs, cloned into whatever needs them. `FilterConfig`
// holds the classification and mask constants and travels with every worker
// pool. `ChannelConfig` sizes the pool and decides how installation behaves.
// Defaults reproduce the stock mask: green above 10, a 4-pixel dilation
// radius, opaque 255 and background 100.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Classification and mask parameters for `GreenFilter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Green must be strictly above this value to count as green.
    pub green_floor: u8,
    /// Distance from a detection to the anchor of its dilation block. The block
    /// spans `2 * dilation_radius + 1` pixels per axis.
    pub dilation_radius: u32,
    /// Alpha written to green pixels and their neighborhoods.
    pub opaque_alpha: u8,
    /// Alpha written everywhere else.
    pub background_alpha: u8,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            green_floor: 10,
            dilation_radius: 4,
            opaque_alpha: 255,
            background_alpha: 100,
        }
    }
}

/// Configuration for a `FilterChannel`.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Number of worker tasks per installed generation.
    pub worker_count: usize,
    /// Activate a freshly installed generation without an explicit `activate` call.
    pub skip_waiting: bool,
    /// How long `Producer::filter` waits before giving up. `None` waits forever.
    pub response_timeout: Option<Duration>,
    pub filter: FilterConfig,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get().max(1),
            skip_waiting: true,
            response_timeout: Some(Duration::from_secs(30)),
            filter: FilterConfig::default(),
        }
    }
}

impl ChannelConfig {
    pub fn with_workers(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count.max(1);
        self
    }

    pub fn with_filter(mut self, filter: FilterConfig) -> Self {
        self.filter = filter;
        self
    }
}
