use std::time::Duration;

use rand::Rng;

/// Exponential reconnect backoff.
///
/// After `n` consecutive failed connection cycles the channel waits
/// `min(base * factor^n, cap)`, scaled by a uniform random weight in
/// `[jitter_floor, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect attempt. Default: 1s.
    pub base: Duration,
    /// Growth factor per consecutive failure. Default: 2.0.
    pub factor: f64,
    /// Upper bound on the un-jittered delay. Default: 30s.
    pub cap: Duration,
    /// Lower bound of the jitter weight. Default: 0.7.
    pub jitter_floor: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            factor: 2.0,
            cap: Duration::from_secs(30),
            jitter_floor: 0.7,
        }
    }
}

impl ReconnectPolicy {
    /// Un-jittered delay after `failures` consecutive failures.
    pub fn delay(&self, failures: u32) -> Duration {
        let cap = self.cap.as_secs_f64();
        let exponent = failures.min(i32::MAX as u32) as i32;
        let raw = self.base.as_secs_f64() * self.factor.powi(exponent);
        let secs = if raw.is_finite() && raw >= 0.0 {
            raw.min(cap)
        } else {
            cap
        };
        Duration::from_secs_f64(secs)
    }

    /// Delay after `failures` consecutive failures, with jitter applied.
    pub fn jittered<R: Rng + ?Sized>(&self, failures: u32, rng: &mut R) -> Duration {
        let delay = self.delay(failures);
        let floor = if self.jitter_floor.is_finite() {
            self.jitter_floor.clamp(0.0, 1.0)
        } else {
            1.0
        };
        if floor >= 1.0 {
            return delay;
        }
        delay.mul_f64(rng.gen_range(floor..=1.0))
    }
}

/// Channel configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelConfig {
    pub reconnect: ReconnectPolicy,
    /// Fail requests that get no response within this long. Default: none.
    pub request_timeout: Option<Duration>,
    /// Maximum requests held while the channel is not open. Default: 1024.
    pub max_buffered: usize,
    /// Seed for the jitter generator; entropy-seeded when unset.
    pub jitter_seed: Option<u64>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            request_timeout: None,
            max_buffered: 1024,
            jitter_seed: None,
        }
    }
}
