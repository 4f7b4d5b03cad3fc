use serde::Serialize;

/// Sample collector for latency measurements.
#[derive(Debug, Default, Clone)]
pub struct DescriptiveStats {
    values: Vec<f64>,
}

/// Summary of one measurement run, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencySummary {
    pub min: f64,
    pub mean: f64,
    pub max: f64,
    pub median: f64,
}

impl DescriptiveStats {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
        }
    }

    pub fn add(&mut self, value: f64) {
        self.values.push(value);
    }

    pub fn min(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::min)
    }

    pub fn max(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::max)
    }

    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
    }

    /// Estimates the `p`th percentile, `0 < p <= 100`.
    ///
    /// Uses the `p(n+1)/100` position with linear interpolation between the
    /// neighbouring order statistics, clamped to the sample extremes.
    pub fn percentile(&self, p: f64) -> Option<f64> {
        if self.values.is_empty() || !(p > 0.0 && p <= 100.0) {
            return None;
        }
        let mut sorted = self.values.clone();
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len();
        if n == 1 {
            return Some(sorted[0]);
        }
        let position = p * (n as f64 + 1.0) / 100.0;
        if position < 1.0 {
            return Some(sorted[0]);
        }
        if position >= n as f64 {
            return Some(sorted[n - 1]);
        }
        let floor = position.floor();
        let lower = sorted[floor as usize - 1];
        let upper = sorted[floor as usize];
        Some(lower + (position - floor) * (upper - lower))
    }

    pub fn median(&self) -> Option<f64> {
        self.percentile(50.0)
    }

    /// Summarizes nanosecond samples as milliseconds.
    pub fn summary_millis(&self) -> Option<LatencySummary> {
        const NANOS_PER_MILLI: f64 = 1e6;
        Some(LatencySummary {
            min: self.min()? / NANOS_PER_MILLI,
            mean: self.mean()? / NANOS_PER_MILLI,
            max: self.max()? / NANOS_PER_MILLI,
            median: self.median()? / NANOS_PER_MILLI,
        })
    }
}
