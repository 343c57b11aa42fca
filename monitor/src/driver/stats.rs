//! Latency aggregation for load-test waves.

/// Response-time samples for one endpoint, in milliseconds.
#[derive(Debug, Default, Clone)]
pub struct LatencyStats {
    samples: Vec<f64>,
}

impl LatencyStats {
    pub fn new() -> Self {
        Self {
            samples: Vec::new(),
        }
    }

    pub fn record(&mut self, millis: f64) {
        self.samples.push(millis);
    }

    pub fn merge(&mut self, other: &LatencyStats) {
        self.samples.extend_from_slice(&other.samples);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }

    pub fn min(&self) -> Option<f64> {
        self.samples.iter().copied().reduce(f64::min)
    }

    pub fn max(&self) -> Option<f64> {
        self.samples.iter().copied().reduce(f64::max)
    }

    /// Calculate percentile (0-100) by nearest-rank on the sorted samples.
    pub fn percentile(&self, p: f64) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }

        let mut sorted = self.samples.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let idx = ((p / 100.0) * (sorted.len() - 1) as f64).round() as usize;
        Some(sorted[idx.min(sorted.len() - 1)])
    }

    pub fn p99(&self) -> Option<f64> {
        self.percentile(99.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_stats_have_no_aggregates() {
        let stats = LatencyStats::new();
        assert!(stats.is_empty());
        assert_eq!(stats.mean(), None);
        assert_eq!(stats.min(), None);
        assert_eq!(stats.max(), None);
        assert_eq!(stats.p99(), None);
    }

    #[test]
    fn test_mean_min_max() {
        let mut stats = LatencyStats::new();
        for ms in [10.0, 20.0, 30.0] {
            stats.record(ms);
        }
        assert_eq!(stats.len(), 3);
        assert_eq!(stats.mean(), Some(20.0));
        assert_eq!(stats.min(), Some(10.0));
        assert_eq!(stats.max(), Some(30.0));
    }

    #[test]
    fn test_percentile_nearest_rank() {
        let mut stats = LatencyStats::new();
        for ms in 1..=100 {
            stats.record(ms as f64);
        }
        assert_eq!(stats.percentile(50.0), Some(51.0));
        assert_eq!(stats.p99(), Some(99.0));
        assert_eq!(stats.percentile(100.0), Some(100.0));
    }

    #[test]
    fn test_merge() {
        let mut a = LatencyStats::new();
        a.record(5.0);
        let mut b = LatencyStats::new();
        b.record(15.0);
        a.merge(&b);
        assert_eq!(a.len(), 2);
        assert_eq!(a.mean(), Some(10.0));
    }
}
