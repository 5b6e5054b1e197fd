// Numan Thabit 2025
//! Log-bucketed latency histogram with percentile interpolation.
//!
//! Bucket `i` covers `[(1 + resolution)^i, (1 + resolution)^(i + 1))`, so the
//! relative error of any reported value is bounded by `resolution`. Samples in
//! `[0, 1)` share bucket 0. The structure is append-only and single-writer.

use thiserror::Error;

/// Guard against absurd bucket vectors from tiny resolutions.
const MAX_BUCKETS: usize = 100_000_000;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum HistogramError {
    #[error("resolution must be finite and > 0 (got {0})")]
    InvalidResolution(f64),
    #[error("max value must be finite and at least 1 + resolution (got {0})")]
    InvalidMax(f64),
    #[error("resolution {resolution} with max {max} needs {buckets} buckets")]
    TooManyBuckets {
        resolution: f64,
        max: f64,
        buckets: usize,
    },
    #[error("sample {value} outside [0, {max}]")]
    OutOfRange { value: f64, max: f64 },
    #[error("percentile {0} outside [0, 100]")]
    InvalidPercentile(f64),
    #[error("cannot merge histograms with different shapes")]
    ShapeMismatch,
}

#[derive(Debug, Clone)]
pub struct Histogram {
    resolution: f64,
    multiplier: f64,
    one_on_log_multiplier: f64,
    max_possible: f64,
    buckets: Vec<u32>,
    count: u64,
    sum: f64,
    sum_of_squares: f64,
    min_seen: f64,
    max_seen: f64,
}

impl Histogram {
    pub fn new(resolution: f64, max_value: f64) -> Result<Self, HistogramError> {
        if !resolution.is_finite() || resolution <= 0.0 {
            return Err(HistogramError::InvalidResolution(resolution));
        }
        if !max_value.is_finite() || max_value <= resolution {
            return Err(HistogramError::InvalidMax(max_value));
        }
        let multiplier = 1.0 + resolution;
        let one_on_log_multiplier = 1.0 / multiplier.ln();
        let num_buckets = (max_value.ln() * one_on_log_multiplier) as usize + 1;
        if num_buckets < 2 {
            // max below the start of the second bucket
            return Err(HistogramError::InvalidMax(max_value));
        }
        if num_buckets > MAX_BUCKETS {
            return Err(HistogramError::TooManyBuckets {
                resolution,
                max: max_value,
                buckets: num_buckets,
            });
        }
        Ok(Self {
            resolution,
            multiplier,
            one_on_log_multiplier,
            max_possible: max_value,
            buckets: vec![0; num_buckets],
            count: 0,
            sum: 0.0,
            sum_of_squares: 0.0,
            min_seen: max_value,
            max_seen: 0.0,
        })
    }

    /// Record one sample. Negative, non-finite and over-max samples are
    /// rejected and leave the histogram untouched.
    #[inline]
    pub fn insert(&mut self, value: f64) -> Result<(), HistogramError> {
        if !value.is_finite() || value < 0.0 || value > self.max_possible {
            return Err(HistogramError::OutOfRange {
                value,
                max: self.max_possible,
            });
        }
        let bucket = self.bucket_for(value);
        self.buckets[bucket] += 1;
        self.count += 1;
        self.sum += value;
        self.sum_of_squares += value * value;
        if value < self.min_seen {
            self.min_seen = value;
        }
        if value > self.max_seen {
            self.max_seen = value;
        }
        Ok(())
    }

    /// Value below which `p` percent of the samples fall. `p` is clamped to
    /// `[0, 100]` and NaN reads as 0; [`Histogram::try_percentile`] rejects
    /// both instead.
    pub fn percentile(&self, p: f64) -> f64 {
        if p.is_nan() {
            return self.threshold_for_count_below(0.0);
        }
        self.threshold_for_count_below(self.count as f64 * p.clamp(0.0, 100.0) / 100.0)
    }

    pub fn try_percentile(&self, p: f64) -> Result<f64, HistogramError> {
        if !(0.0..=100.0).contains(&p) {
            return Err(HistogramError::InvalidPercentile(p));
        }
        Ok(self.percentile(p))
    }

    /// Fold `other` into `self`. Both must share resolution and maximum.
    pub fn merge(&mut self, other: &Histogram) -> Result<(), HistogramError> {
        if self.buckets.len() != other.buckets.len()
            || self.resolution != other.resolution
            || self.max_possible != other.max_possible
        {
            return Err(HistogramError::ShapeMismatch);
        }
        if other.count == 0 {
            return Ok(());
        }
        for (dst, src) in self.buckets.iter_mut().zip(&other.buckets) {
            *dst += *src;
        }
        self.count += other.count;
        self.sum += other.sum;
        self.sum_of_squares += other.sum_of_squares;
        self.min_seen = self.min_seen.min(other.min_seen);
        self.max_seen = self.max_seen.max(other.max_seen);
        Ok(())
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn sum_of_squares(&self) -> f64 {
        self.sum_of_squares
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum / self.count as f64
    }

    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let n = self.count as f64;
        ((self.sum_of_squares * n - self.sum * self.sum) / (n * n)).max(0.0)
    }

    pub fn stddev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Smallest sample seen, or the configured maximum when empty.
    pub fn minimum(&self) -> f64 {
        self.min_seen
    }

    pub fn maximum(&self) -> f64 {
        self.max_seen
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn max_value(&self) -> f64 {
        self.max_possible
    }

    pub fn bucket_counts(&self) -> &[u32] {
        &self.buckets
    }

    #[inline]
    fn bucket_for(&self, value: f64) -> usize {
        let clamped = value.clamp(1.0, self.max_possible);
        let bucket = (clamped.ln() * self.one_on_log_multiplier) as usize;
        bucket.min(self.buckets.len() - 1)
    }

    #[inline]
    fn bucket_start(&self, idx: usize) -> f64 {
        self.multiplier.powf(idx as f64)
    }

    fn threshold_for_count_below(&self, count_below: f64) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        if count_below <= 0.0 {
            return self.min_seen;
        }
        if count_below >= self.count as f64 {
            return self.max_seen;
        }

        // lowest bucket whose cumulative count reaches the rank
        let mut count_so_far = 0.0;
        let mut lower_idx = 0;
        while lower_idx < self.buckets.len() {
            count_so_far += f64::from(self.buckets[lower_idx]);
            if count_so_far >= count_below {
                break;
            }
            lower_idx += 1;
        }

        if count_so_far == count_below {
            // Exactly on a boundary: land midway through the run of empty
            // buckets that follows.
            let mut upper_idx = lower_idx + 1;
            while upper_idx < self.buckets.len() && self.buckets[upper_idx] == 0 {
                upper_idx += 1;
            }
            let mid = (self.bucket_start(lower_idx) + self.bucket_start(upper_idx)) / 2.0;
            mid.clamp(self.min_seen, self.max_seen)
        } else {
            let lower_bound = self.bucket_start(lower_idx);
            let upper_bound = self.bucket_start(lower_idx + 1);
            let in_bucket = f64::from(self.buckets[lower_idx]);
            let value =
                upper_bound - (upper_bound - lower_bound) * (count_so_far - count_below) / in_bucket;
            value.clamp(self.min_seen, self.max_seen)
        }
    }
}
