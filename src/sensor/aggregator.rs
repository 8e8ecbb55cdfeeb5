//! Sample Aggregator
//!
//! Runs on every "conversion batch complete" event: gives the buffer back
//! to the SAADC first, then reduces the batch to one scalar reading.

use crate::core::config::SAMPLES_IN_BUFFER;
use crate::core::error::HalError;
use crate::core::hal::{BatchSampler, RawSample};

/// One full conversion batch.
pub type SampleBuffer = [RawSample; SAMPLES_IN_BUFFER];

/// Unweighted integer mean of a batch, truncating.
///
/// Samples are 8-bit conversions; the small negative values single-ended
/// mode can report around ground count as zero.
pub fn mean(samples: &[RawSample]) -> u16 {
    if samples.is_empty() {
        return 0;
    }
    let sum: u32 = samples.iter().map(|&s| s.clamp(0, u8::MAX as i16) as u32).sum();
    (sum / samples.len() as u32) as u16
}

#[derive(Debug, Default)]
pub struct SampleAggregator {
    batches: u32,
}

impl SampleAggregator {
    pub const fn new() -> Self {
        Self { batches: 0 }
    }

    /// Re-arm the sampler, then average the completed batch.
    pub fn on_batch_complete<S: BatchSampler>(
        &mut self,
        sampler: &mut S,
        batch: &[RawSample],
    ) -> Result<u16, HalError> {
        sampler.rearm()?;
        self.batches = self.batches.wrapping_add(1);
        Ok(mean(batch))
    }

    /// Batches processed since boot.
    pub fn batches(&self) -> u32 {
        self.batches
    }
}
