use std::time::Duration;

use crate::config::ReconnectConfig;

/// Exponential reconnect delay: `d(n+1) = min(d(n) * multiplier, ceiling)`.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    current: Duration,
    floor: Duration,
    ceiling: Duration,
    multiplier: f64,
}

impl ReconnectBackoff {
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            current: config.floor,
            floor: config.floor,
            ceiling: config.ceiling,
            multiplier: config.multiplier,
        }
    }

    /// Back to the floor, after a successful open.
    pub fn reset(&mut self) {
        self.current = self.floor;
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    /// The delay to wait now; the next call returns the grown value.
    ///
    /// Growth that leaves the representable range lands on the ceiling.
    pub fn advance(&mut self) -> Duration {
        let delay = self.current;
        self.current = Duration::try_from_secs_f64(delay.as_secs_f64() * self.multiplier)
            .map_or(self.ceiling, |grown| grown.min(self.ceiling));
        delay
    }
}
