//! Sample series and their summary statistics.

use serde::{Deserialize, Serialize};

/// Fraction used for the reported high percentile.
pub const P95: f64 = 0.95;

/// One sample of a measurement. `value` is `None` when the individual
/// probe failed (timeout, unreachable, unparsable interval).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Seconds since the start of the probe, or the sequence number when
    /// the tool reports no timing.
    pub offset: f64,
    pub value: Option<f64>,
}

impl Sample {
    pub fn present(offset: f64, value: f64) -> Self {
        Self { offset, value: Some(value) }
    }

    pub fn missing(offset: f64) -> Self {
        Self { offset, value: None }
    }
}

/// Ordered samples captured for one probe of one run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SampleSeries {
    samples: Vec<Sample>,
    requested: usize,
}

impl SampleSeries {
    /// Series whose requested count equals the number of samples given.
    pub fn new(samples: Vec<Sample>) -> Self {
        let requested = samples.len();
        Self { samples, requested }
    }

    /// Series with an explicit requested count. Samples that were asked
    /// for but never reported count as missing. The requested count never
    /// drops below the number of samples actually present in the series.
    pub fn with_requested(samples: Vec<Sample>, requested: usize) -> Self {
        let requested = requested.max(samples.len());
        Self { samples, requested }
    }

    /// Convenience constructor from plain values in time order.
    pub fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = Option<f64>>,
    {
        let samples = values
            .into_iter()
            .enumerate()
            .map(|(i, value)| Sample { offset: i as f64, value })
            .collect();
        Self::new(samples)
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn requested(&self) -> usize {
        self.requested
    }

    /// Present values in original time order.
    pub fn present_values(&self) -> Vec<f64> {
        self.samples.iter().filter_map(|s| s.value).collect()
    }

    pub fn present_count(&self) -> usize {
        self.samples.iter().filter(|s| s.value.is_some()).count()
    }

    pub fn missing_count(&self) -> usize {
        self.requested - self.present_count()
    }
}

/// Statistics derived from a [`SampleSeries`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatSummary {
    /// Number of present values.
    pub count: usize,
    /// Total number of samples requested (present + missing).
    pub requested: usize,
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Sample standard deviation (n - 1), defined for `count >= 2`.
    pub std_dev: Option<f64>,
    /// Nearest-rank 95th percentile, defined for `count >= 2`.
    pub p95: Option<f64>,
    /// Mean absolute successive difference, defined for `count >= 2`.
    pub jitter: Option<f64>,
    pub loss_percent: f64,
}

impl StatSummary {
    /// Fraction of requested samples that came back, in `[0, 1]`.
    pub fn present_fraction(&self) -> f64 {
        if self.requested == 0 {
            0.0
        } else {
            self.count as f64 / self.requested as f64
        }
    }

    pub fn has_data(&self) -> bool {
        self.count > 0
    }
}

/// Nearest-rank percentile over values sorted ascending:
/// `index = floor(fraction * (n - 1))`.
pub fn percentile_nearest_rank(sorted: &[f64], fraction: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let idx = (fraction * (sorted.len() - 1) as f64).floor() as usize;
    sorted.get(idx.min(sorted.len() - 1)).copied()
}

/// Summarize a series.
///
/// Loss is measured against the requested count, so gaps from failed
/// individual probes are included. Percentile and standard deviation
/// depend only on the multiset of present values; jitter walks the
/// present values in their original order.
pub fn summarize(series: &SampleSeries) -> StatSummary {
    let values = series.present_values();
    let count = values.len();
    let requested = series.requested();

    let loss_percent = if requested == 0 {
        100.0
    } else {
        100.0 * (requested - count) as f64 / requested as f64
    };

    if count == 0 {
        return StatSummary {
            count,
            requested,
            mean: None,
            min: None,
            max: None,
            std_dev: None,
            p95: None,
            jitter: None,
            loss_percent,
        };
    }

    let mean = values.iter().sum::<f64>() / count as f64;

    let mut sorted = values.clone();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let min = sorted.first().copied();
    let max = sorted.last().copied();

    let (p95, jitter, std_dev) = if count >= 2 {
        let p95 = percentile_nearest_rank(&sorted, P95);

        let diffs: f64 = values.windows(2).map(|w| (w[1] - w[0]).abs()).sum();
        let jitter = diffs / (count - 1) as f64;

        let squares: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
        let variance = squares / (count - 1) as f64;

        (p95, Some(jitter), Some(variance.sqrt()))
    } else {
        (None, None, None)
    };

    StatSummary {
        count,
        requested,
        mean: Some(mean),
        min,
        max,
        std_dev,
        p95,
        jitter,
        loss_percent,
    }
}
