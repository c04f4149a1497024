//! Criteria used for clustering `Fiber`s.

use serde::{Deserialize, Serialize};

use crate::core::distances::FiberMetric;

/// The thresholds of a single-linkage clustering run.
///
/// `Default` gives a proximity threshold of 0, a maximum cluster distance of
/// 6.5 and a minimum cluster size of 10 under the `Dlt` metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusteringCriteria {
    /// Point pairs closer than this do not add to fiber distances.
    proximity: f64,
    /// Clusters closer than this are merged.
    max_distance: f64,
    /// Clusters with fewer members are discarded after the scan.
    min_cluster_size: usize,
    /// The fiber metric.
    metric: FiberMetric,
    /// Whether to fill the whole distance table in parallel before the scan.
    parallel: bool,
}

impl Default for ClusteringCriteria {
    fn default() -> Self {
        Self {
            proximity: 0.,
            max_distance: 6.5,
            min_cluster_size: 10,
            metric: FiberMetric::Dlt,
            parallel: false,
        }
    }
}

impl ClusteringCriteria {
    /// Criteria with default thresholds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the proximity threshold.
    pub const fn with_proximity(mut self, threshold: f64) -> Self {
        self.proximity = threshold;
        self
    }

    /// Sets the maximum distance below which clusters merge.
    pub const fn with_max_distance(mut self, threshold: f64) -> Self {
        self.max_distance = threshold;
        self
    }

    /// Sets the minimum number of members of a surviving cluster.
    pub const fn with_min_cluster_size(mut self, threshold: usize) -> Self {
        self.min_cluster_size = threshold;
        self
    }

    /// Sets the fiber metric.
    pub const fn with_metric(mut self, metric: FiberMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Whether to precompute all pair distances in parallel before merging.
    pub const fn with_parallel_precompute(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// The proximity threshold.
    pub const fn proximity(&self) -> f64 {
        self.proximity
    }

    /// The square of the proximity threshold, as the metrics take it.
    pub fn proximity_sq(&self) -> f64 {
        self.proximity * self.proximity
    }

    /// The maximum merge distance.
    pub const fn max_distance(&self) -> f64 {
        self.max_distance
    }

    /// The minimum cluster size.
    pub const fn min_cluster_size(&self) -> usize {
        self.min_cluster_size
    }

    /// The fiber metric.
    pub const fn metric(&self) -> FiberMetric {
        self.metric
    }

    /// Whether the distance table is filled in parallel before the scan.
    pub const fn parallel_precompute(&self) -> bool {
        self.parallel
    }
}

#[cfg(test)]
mod tests {
    use super::ClusteringCriteria;
    use crate::FiberMetric;

    #[test]
    fn builder() {
        let default = ClusteringCriteria::default();
        assert_eq!(default.min_cluster_size(), 10);
        assert_eq!(default.metric(), FiberMetric::Dlt);
        assert!(!default.parallel_precompute());

        let criteria = ClusteringCriteria::new()
            .with_proximity(0.5)
            .with_max_distance(2.)
            .with_min_cluster_size(1)
            .with_metric(FiberMetric::Dst)
            .with_parallel_precompute(true);
        assert_eq!(criteria.min_cluster_size(), 1);
        assert_eq!(criteria.metric(), FiberMetric::Dst);
        assert!(criteria.parallel_precompute());
        assert!((criteria.proximity_sq() - 0.25).abs() < f64::EPSILON);
        assert!((criteria.max_distance() - 2.).abs() < f64::EPSILON);
    }
}
