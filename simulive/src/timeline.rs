use crate::errors::StreamerError;
use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

const NANOS_PER_SEC: i128 = 1_000_000_000;

/// Maps wall-clock time onto the endless virtual sequence of segments.
///
/// All sequence arithmetic is done on integer nanoseconds and timescale units,
/// floating point only shows up in [`Timeline::segment_seconds`] which is meant
/// for display.
#[derive(Debug, Clone)]
pub struct Timeline {
    epoch: DateTime<Utc>,
    time_scale: u32,
    segment_duration: u64,
    pool_size: usize,
}

impl Timeline {
    pub fn new(
        epoch: DateTime<Utc>,
        time_scale: u32,
        segment_duration: u64,
        pool_size: usize,
    ) -> Result<Self, StreamerError> {
        if time_scale == 0 {
            return Err(StreamerError::ConfigError(
                "time scale must be positive".to_string(),
            ));
        }
        if segment_duration == 0 {
            return Err(StreamerError::ConfigError(
                "segment duration must be positive".to_string(),
            ));
        }
        if segment_duration as u128 * NANOS_PER_SEC as u128 / (time_scale as u128) == 0 {
            return Err(StreamerError::ConfigError(
                "segment duration is shorter than a nanosecond".to_string(),
            ));
        }
        if pool_size == 0 {
            return Err(StreamerError::ConfigError(
                "segment pool is empty".to_string(),
            ));
        }

        Ok(Timeline {
            epoch,
            time_scale,
            segment_duration,
            pool_size,
        })
    }

    pub fn epoch(&self) -> DateTime<Utc> {
        self.epoch
    }

    pub fn time_scale(&self) -> u32 {
        self.time_scale
    }

    /// Segment duration in timescale units.
    pub fn segment_units(&self) -> u64 {
        self.segment_duration
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Sequence number playing at `time`. Negative before the epoch, which
    /// callers treat as "not live yet".
    pub fn sequence_at(&self, time: DateTime<Utc>) -> i64 {
        let elapsed = time.signed_duration_since(self.epoch);
        let nanos =
            elapsed.num_seconds() as i128 * NANOS_PER_SEC + elapsed.subsec_nanos() as i128;
        let per_segment = self.segment_duration as i128 * NANOS_PER_SEC;
        let sequence = (nanos * self.time_scale as i128).div_euclid(per_segment);

        sequence.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    /// Physical segment realizing the given virtual sequence.
    pub fn segment_index_for(&self, sequence: u64) -> usize {
        (sequence % self.pool_size as u64) as usize
    }

    pub fn segment_duration(&self) -> Duration {
        let nanos = self.segment_duration as u128 * NANOS_PER_SEC as u128 / self.time_scale as u128;
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    pub fn segment_seconds(&self) -> f64 {
        self.segment_duration as f64 / self.time_scale as f64
    }

    /// Smallest whole number of seconds not shorter than a segment.
    pub fn target_duration(&self) -> u64 {
        self.segment_duration.div_ceil(self.time_scale as u64)
    }

    /// Wall-clock instant at which `sequence` starts. `None` when it falls
    /// outside the representable calendar range.
    pub fn sequence_start(&self, sequence: u64) -> Option<DateTime<Utc>> {
        let nanos = sequence as i128 * self.segment_duration as i128 * NANOS_PER_SEC
            / self.time_scale as i128;
        let nanos = i64::try_from(nanos).ok()?;

        self.epoch.checked_add_signed(TimeDelta::nanoseconds(nanos))
    }
}
