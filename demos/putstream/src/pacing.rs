//! Send pacing and jitter statistics.

use std::time::Duration;

/// Lowest accepted rate in Mbps.
pub const MIN_RATE_MBPS: u32 = 1;
/// Highest accepted rate in Mbps.
pub const MAX_RATE_MBPS: u32 = 32;
/// Smallest block size in bytes.
pub const MIN_BLOCK_SIZE: usize = 60;
/// Largest block size in bytes.
pub const MAX_BLOCK_SIZE: usize = 1460;

/// Rate in Mbps; out-of-range values fall back to the minimum.
pub fn clamp_rate(rate: u32) -> u32 {
    if (MIN_RATE_MBPS..=MAX_RATE_MBPS).contains(&rate) {
        rate
    } else {
        MIN_RATE_MBPS
    }
}

/// Block size clamped to the accepted range.
pub fn clamp_block_size(size: usize) -> usize {
    size.clamp(MIN_BLOCK_SIZE, MAX_BLOCK_SIZE)
}

/// Gap between two blocks so that `block_size` bytes per gap equal `rate`.
///
/// One Mbps is one bit per microsecond.
pub fn send_interval(rate_mbps: u32, block_size: usize) -> Duration {
    let bits = block_size as u64 * 8;
    Duration::from_micros(bits / u64::from(rate_mbps.max(1)))
}

/// Running statistics of the gaps between sends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JitterStats {
    samples: u64,
    sum_us: u64,
    sq_sum_us: u64,
    max_us: u64,
}

impl JitterStats {
    /// Record one gap.
    pub fn record(&mut self, gap: Duration) {
        let us = u64::try_from(gap.as_micros()).unwrap_or(u64::MAX);
        self.samples += 1;
        self.sum_us = self.sum_us.saturating_add(us);
        self.sq_sum_us = self.sq_sum_us.saturating_add(us.saturating_mul(us));
        self.max_us = self.max_us.max(us);
    }

    /// Average gap over `frames`, in microseconds.
    pub fn average_us(&self, frames: u64) -> u64 {
        if frames == 0 { 0 } else { self.sum_us / frames }
    }

    /// Largest gap in microseconds.
    pub fn max_us(&self) -> u64 {
        self.max_us
    }

    /// Gap variance over `frames`, in microseconds squared.
    pub fn variance_us(&self, frames: u64) -> u64 {
        if frames == 0 {
            return 0;
        }
        let avg = self.average_us(frames);
        (self.sq_sum_us / frames).saturating_sub(avg * avg)
    }
}
