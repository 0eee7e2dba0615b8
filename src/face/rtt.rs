//! Neighbor RTT tracking.
//!
//! Round-trip samples are recorded per face for the congestion and
//! retransmission logic above this layer. Samples above [`MAX_RTT_US`] are
//! clamped, never rejected.

use std::time::Duration;

use super::manager::FaceManager;
use crate::core::constants::{MAX_RTT_US, SRTT_ALPHA};
use crate::core::{FaceId, FaceResult};

/// Latest RTT of one neighbor face.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborRtt {
    /// Face the samples were taken on.
    pub face: FaceId,
    /// Latest clamped sample in microseconds.
    pub rtt_us: u64,
}

/// Clamp a sample to the RTT ceiling.
pub fn clamp_rtt_us(sample_us: u64) -> u64 {
    sample_us.min(MAX_RTT_US)
}

/// Per-face RTT state.
#[derive(Debug, Clone, Default)]
pub struct RttTracker {
    /// Latest clamped sample in microseconds.
    latest_us: u64,
    /// Smoothed RTT in microseconds.
    srtt_us: f64,
    /// Number of samples recorded.
    samples: u64,
}

impl RttTracker {
    /// Create a tracker with no samples.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sample and return it after clamping.
    ///
    /// First sample: SRTT = sample. Subsequent: SRTT = 7/8 SRTT + 1/8 sample.
    pub fn update(&mut self, sample: Duration) -> u64 {
        let sample_us = u64::try_from(sample.as_micros()).unwrap_or(u64::MAX);
        let clamped = clamp_rtt_us(sample_us);

        if self.samples == 0 {
            self.srtt_us = clamped as f64;
        } else {
            self.srtt_us = (1.0 - SRTT_ALPHA) * self.srtt_us + SRTT_ALPHA * clamped as f64;
        }
        self.latest_us = clamped;
        self.samples += 1;
        clamped
    }

    /// Latest clamped sample in microseconds.
    pub fn latest_us(&self) -> u64 {
        self.latest_us
    }

    /// Smoothed RTT.
    pub fn srtt(&self) -> Duration {
        Duration::from_micros(self.srtt_us as u64)
    }

    /// Number of samples recorded.
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Check if at least one sample was recorded.
    pub fn is_initialized(&self) -> bool {
        self.samples > 0
    }
}

impl FaceManager {
    /// Record an RTT sample for traffic sent out of `id`.
    pub fn record_rtt(&mut self, id: FaceId, sample: Duration) -> FaceResult<NeighborRtt> {
        let face = self.table.face_checked(id)?;
        let rtt_us = face.rtt_mut().update(sample);
        tracing::trace!(face = %id, rtt_us, "rtt sample");
        Ok(NeighborRtt { face: id, rtt_us })
    }

    /// RTT record of one face, if any sample was taken.
    pub fn rtt_of(&self, id: FaceId) -> Option<NeighborRtt> {
        let face = self.table.face(id)?;
        face.rtt().is_initialized().then(|| NeighborRtt {
            face: id,
            rtt_us: face.rtt().latest_us(),
        })
    }

    /// RTT records of every face with at least one sample, in id order.
    pub fn neighbor_rtts(&self) -> Vec<NeighborRtt> {
        self.table
            .faces()
            .filter(|face| face.rtt().is_initialized())
            .map(|face| NeighborRtt {
                face: face.id(),
                rtt_us: face.rtt().latest_us(),
            })
            .collect()
    }
}
