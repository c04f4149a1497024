//! The outcome of a clustering run.

use log::warn;
use serde::{Deserialize, Serialize};

use super::criteria::ClusteringCriteria;
use crate::core::{color::Color, fiber_cluster::FiberCluster};

/// One merge of the pairwise scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Merge {
    /// The id of the cluster that absorbed the other; always the smaller id.
    pub survivor: usize,
    /// The id of the cluster that was emptied.
    pub absorbed: usize,
    /// The fiber distance that triggered the merge.
    pub distance: f64,
}

/// The clusters found by a `DetTractClustering` run.
#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    /// The surviving clusters, each sorted, none empty.
    clusters: Vec<FiberCluster>,
    /// For every fiber, the id of its cluster at the end of the scan, before
    /// empty and small clusters were removed.
    cluster_ids: Vec<usize>,
    /// The merges in the order they happened.
    merges: Vec<Merge>,
    /// The number of clusters discarded for having too few members.
    num_small_clusters: usize,
    /// The number of input fibers.
    num_tracts: usize,
    /// The criteria of the run.
    criteria: ClusteringCriteria,
}

/// Summary statistics of a `Clustering`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringReport {
    /// The criteria of the run.
    pub criteria: ClusteringCriteria,
    /// The number of input fibers.
    pub num_tracts: usize,
    /// The number of fibers in a surviving cluster.
    pub num_used_tracts: usize,
    /// The number of surviving clusters.
    pub num_clusters: usize,
    /// The number of clusters discarded for being too small.
    pub num_small_clusters: usize,
    /// The number of merges during the scan.
    pub num_merges: usize,
    /// The size of every surviving cluster.
    pub cluster_sizes: Vec<usize>,
    /// The mean surviving cluster size, 0 without clusters.
    pub mean_cluster_size: f64,
    /// The sample standard deviation of the surviving cluster sizes, 0 with
    /// fewer than two clusters.
    pub std_dev_cluster_size: f64,
}

impl Clustering {
    /// Assembles a clustering from the state at the end of a run.
    pub(crate) fn new(
        clusters: Vec<FiberCluster>,
        cluster_ids: Vec<usize>,
        merges: Vec<Merge>,
        num_small_clusters: usize,
        criteria: ClusteringCriteria,
    ) -> Self {
        let num_tracts = cluster_ids.len();
        Self {
            clusters,
            cluster_ids,
            merges,
            num_small_clusters,
            num_tracts,
            criteria,
        }
    }

    /// The clustering of no fibers.
    pub(crate) fn empty(criteria: ClusteringCriteria) -> Self {
        Self::new(Vec::new(), Vec::new(), Vec::new(), 0, criteria)
    }

    /// The surviving clusters.
    pub fn clusters(&self) -> &[FiberCluster] {
        &self.clusters
    }

    /// The surviving clusters, mutably, e.g. to annotate them.
    pub fn clusters_mut(&mut self) -> &mut [FiberCluster] {
        &mut self.clusters
    }

    /// The number of surviving clusters.
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    /// Whether no cluster survived.
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// The cluster id of every fiber at the end of the scan.
    pub fn cluster_ids(&self) -> &[usize] {
        &self.cluster_ids
    }

    /// The merges in scan order.
    pub fn merges(&self) -> &[Merge] {
        &self.merges
    }

    /// The number of clusters discarded for being too small.
    pub const fn num_small_clusters(&self) -> usize {
        self.num_small_clusters
    }

    /// The number of input fibers.
    pub const fn num_tracts(&self) -> usize {
        self.num_tracts
    }

    /// The criteria of the run.
    pub const fn criteria(&self) -> &ClusteringCriteria {
        &self.criteria
    }

    /// For every fiber, the position in `clusters()` of the cluster holding
    /// it, or `None` if it was filtered out with a small cluster.
    pub fn assignments(&self) -> Vec<Option<usize>> {
        let mut assignments = vec![None; self.num_tracts];
        for (c, cluster) in self.clusters.iter().enumerate() {
            for &i in cluster.indices() {
                assignments[i] = Some(c);
            }
        }
        assignments
    }

    /// The fibers that belong to no surviving cluster, in ascending order.
    pub fn unclustered(&self) -> Vec<usize> {
        self.assignments()
            .into_iter()
            .enumerate()
            .filter_map(|(i, a)| a.is_none().then_some(i))
            .collect()
    }

    /// One flag per fiber, set for fibers that belong to no surviving
    /// cluster. Suitable for `FiberDataset::without_unused`.
    pub fn unused_flags(&self) -> Vec<bool> {
        self.assignments().into_iter().map(|a| a.is_none()).collect()
    }

    /// Colors the clusters with evenly spaced hues.
    pub fn paint(&mut self) {
        let colors = Color::hue_ramp(self.clusters.len());
        for (cluster, color) in self.clusters.iter_mut().zip(colors) {
            cluster.set_color(color);
        }
    }

    /// The cluster to hand on for output. Ids past the last cluster fall back
    /// to the first one. Returns `None` if no cluster survived.
    pub fn select_output(&self, id: usize) -> Option<&FiberCluster> {
        if id < self.clusters.len() {
            Some(&self.clusters[id])
        } else {
            let first = self.clusters.first()?;
            warn!(
                "Cluster {id} does not exist, there are only {} clusters. Falling back to cluster 0.",
                self.clusters.len()
            );
            Some(first)
        }
    }

    /// Summary statistics of the run.
    pub fn report(&self) -> ClusteringReport {
        let cluster_sizes = self.clusters.iter().map(FiberCluster::len).collect::<Vec<_>>();
        let sizes = cluster_sizes.iter().map(|&s| s as f64).collect::<Vec<_>>();

        let mean_cluster_size = if sizes.is_empty() { 0. } else { statistical::mean(&sizes) };
        let std_dev_cluster_size = if sizes.len() < 2 {
            0.
        } else {
            statistical::standard_deviation(&sizes, Some(mean_cluster_size))
        };

        ClusteringReport {
            criteria: self.criteria,
            num_tracts: self.num_tracts,
            num_used_tracts: cluster_sizes.iter().sum(),
            num_clusters: self.clusters.len(),
            num_small_clusters: self.num_small_clusters,
            num_merges: self.merges.len(),
            cluster_sizes,
            mean_cluster_size,
            std_dev_cluster_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::approx_eq;

    use super::Clustering;
    use crate::{Color, ClusteringCriteria, FiberCluster};

    fn clustering() -> Clustering {
        let clusters = vec![
            FiberCluster::from_indices(vec![0, 1, 3], Color::default(), ""),
            FiberCluster::from_indices(vec![4, 5], Color::default(), ""),
        ];
        Clustering::new(clusters, vec![0, 0, 2, 0, 4, 4], Vec::new(), 1, ClusteringCriteria::default())
    }

    #[test]
    fn assignments() {
        let c = clustering();
        assert_eq!(c.assignments(), vec![Some(0), Some(0), None, Some(0), Some(1), Some(1)]);
        assert_eq!(c.unclustered(), vec![2]);
        assert_eq!(c.unused_flags(), vec![false, false, true, false, false, false]);
    }

    #[test]
    fn output_selection_falls_back_to_first() {
        let c = clustering();
        assert_eq!(c.select_output(1).map(FiberCluster::len), Some(2));
        assert_eq!(c.select_output(7).map(FiberCluster::len), Some(3));
        assert!(Clustering::empty(ClusteringCriteria::default()).select_output(0).is_none());
    }

    #[test]
    fn paint() {
        let mut c = clustering();
        c.paint();
        assert_eq!(c.clusters()[0].color(), Color::from_hsv(0., 1., 0.75));
        assert_eq!(c.clusters()[1].color(), Color::from_hsv(0.5, 1., 0.75));
    }

    #[test]
    fn report() {
        let report = clustering().report();
        assert_eq!(report.num_tracts, 6);
        assert_eq!(report.num_used_tracts, 5);
        assert_eq!(report.num_clusters, 2);
        assert_eq!(report.num_small_clusters, 1);
        assert_eq!(report.cluster_sizes, vec![3, 2]);
        assert!(approx_eq!(f64, report.mean_cluster_size, 2.5));
        assert!(approx_eq!(f64, report.std_dev_cluster_size, 0.5_f64.sqrt(), epsilon = 1e-12));

        let empty = Clustering::empty(ClusteringCriteria::default()).report();
        assert_eq!(empty.num_clusters, 0);
        assert!(approx_eq!(f64, empty.mean_cluster_size, 0.));
    }
}
