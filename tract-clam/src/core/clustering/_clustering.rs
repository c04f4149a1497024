//! The single-linkage clustering engine.

use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
};

use log::{debug, info, warn};

use super::{
    criteria::ClusteringCriteria,
    result::{Clustering, Merge},
};
use crate::core::{fiber::FiberDataset, fiber_cluster::FiberCluster, lookup::DistanceTable};

/// Errors of a clustering run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusteringError {
    /// The run was cancelled before the pairwise scan finished.
    Cancelled,
}

impl std::fmt::Display for ClusteringError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "Clustering was cancelled."),
        }
    }
}

impl std::error::Error for ClusteringError {}

/// Groups the fibers of a `FiberDataset` into bundles by single-linkage
/// agglomeration.
///
/// Every pair of fibers is visited once, in ascending order of the first and
/// then the second index. A pair closer than the maximum distance merges the
/// two clusters holding the fibers into the one with the smaller id. Clusters
/// with too few members are dropped at the end.
///
/// The pairwise distances are kept in a `DistanceTable` that survives between
/// runs on the same dataset, and can be stored next to the fiber file.
#[derive(Debug, Clone, Default)]
pub struct DetTractClustering {
    /// The thresholds of the next run.
    criteria: ClusteringCriteria,
    /// Distances cached by earlier runs.
    table: Option<DistanceTable>,
    /// Where to look for, and store, the distance table.
    lookup_file: Option<PathBuf>,
    /// The result of the last complete run.
    last: Option<Clustering>,
}

impl DetTractClustering {
    /// A clustering engine with the given criteria and an empty cache.
    pub const fn new(criteria: ClusteringCriteria) -> Self {
        Self {
            criteria,
            table: None,
            lookup_file: None,
            last: None,
        }
    }

    /// Reads the distance table from `path` before a run if it matches the
    /// dataset, and writes it there after a run if the file did not exist.
    pub fn with_lookup_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.lookup_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// The criteria of the next run.
    pub const fn criteria(&self) -> &ClusteringCriteria {
        &self.criteria
    }

    /// Replaces the criteria. A changed metric or proximity threshold
    /// invalidates the cached distances on the next run.
    pub fn set_criteria(&mut self, criteria: ClusteringCriteria) {
        self.criteria = criteria;
    }

    /// The cached distance table, if any run built one.
    pub const fn table(&self) -> Option<&DistanceTable> {
        self.table.as_ref()
    }

    /// The result of the last complete run.
    pub const fn last_clustering(&self) -> Option<&Clustering> {
        self.last.as_ref()
    }

    /// Clusters `fibers`.
    pub fn cluster(&mut self, fibers: &FiberDataset) -> Clustering {
        let never = AtomicBool::new(false);
        self.cluster_with_cancel(fibers, &never)
            .unwrap_or_else(|_| unreachable!("The run cannot be cancelled."))
    }

    /// Clusters `fibers`, checking `cancel` before every row of the pairwise
    /// scan.
    ///
    /// Distances computed before the cancellation stay cached.
    ///
    /// # Errors
    ///
    /// * `ClusteringError::Cancelled` if `cancel` was set during the run.
    ///
    /// # Panics
    ///
    /// * If a merge would involve an empty cluster. This cannot happen while
    ///   the id map and the clusters agree.
    pub fn cluster_with_cancel(&mut self, fibers: &FiberDataset, cancel: &AtomicBool) -> Result<Clustering, ClusteringError> {
        let criteria = self.criteria;
        let n = fibers.len();
        if n == 0 {
            info!("No fibers to cluster.");
            let clustering = Clustering::empty(criteria);
            self.last = Some(clustering.clone());
            return Ok(clustering);
        }

        info!(
            "Clustering {n} fibers with {} at proximity {}, max distance {} and min cluster size {}.",
            criteria.metric(),
            criteria.proximity(),
            criteria.max_distance(),
            criteria.min_cluster_size()
        );

        let lookup_file_existed = self.lookup_file.as_ref().map_or(true, |path| path.exists());
        let table = self.prepare_table(n);
        if criteria.parallel_precompute() && table.num_computed() < table.len() {
            debug!("Precomputing {} pairwise distances in parallel.", table.len() - table.num_computed());
            table.populate(fibers);
        }

        let metric = criteria.metric();
        let proximity_sq = criteria.proximity_sq();
        let max_distance = criteria.max_distance();

        let mut clusters = (0..n).map(FiberCluster::new).collect::<Vec<_>>();
        let mut cluster_ids = (0..n).collect::<Vec<_>>();
        let mut merges = Vec::new();

        for i in 0..n {
            if cancel.load(Ordering::Relaxed) {
                warn!("Clustering cancelled after {i} of {n} rows.");
                return Err(ClusteringError::Cancelled);
            }

            for j in (i + 1)..n {
                let (q, r) = (cluster_ids[i], cluster_ids[j]);
                if q == r {
                    continue;
                }

                let distance = table.get_or_insert_with(i, j, || metric.distance(&fibers[i], &fibers[j], proximity_sq));
                if distance < max_distance {
                    let (survivor, absorbed) = if q < r { (q, r) } else { (r, q) };
                    assert!(
                        !clusters[survivor].is_empty() && !clusters[absorbed].is_empty(),
                        "Cannot merge cluster {absorbed} into {survivor}, one of them is empty."
                    );

                    for &k in clusters[absorbed].indices() {
                        cluster_ids[k] = survivor;
                    }
                    let (head, tail) = clusters.split_at_mut(absorbed);
                    head[survivor].merge(&mut tail[0]);

                    merges.push(Merge {
                        survivor,
                        absorbed,
                        distance,
                    });
                }
            }
        }

        clusters.retain(|c| !c.is_empty());
        clusters.iter_mut().for_each(FiberCluster::sort);
        debug!("{} clusters after the scan, {} merges.", clusters.len(), merges.len());

        let min_size = criteria.min_cluster_size();
        let mut num_small_clusters = 0;
        for cluster in clusters.iter_mut().filter(|c| c.len() < min_size) {
            cluster.clear();
            num_small_clusters += 1;
        }
        clusters.retain(|c| !c.is_empty());

        info!(
            "Found {} clusters, discarded {num_small_clusters} with fewer than {min_size} fibers.",
            clusters.len()
        );

        if !lookup_file_existed {
            self.store_table();
        }

        let clustering = Clustering::new(clusters, cluster_ids, merges, num_small_clusters, criteria);
        self.last = Some(clustering.clone());
        Ok(clustering)
    }

    /// Makes sure the cached table fits `n` fibers under the current metric
    /// and proximity, loading it from the lookup file or starting a fresh one
    /// otherwise.
    fn prepare_table(&mut self, n: usize) -> &mut DistanceTable {
        let metric = self.criteria.metric();
        let proximity = self.criteria.proximity();

        if self.table.as_ref().map_or(false, |t| t.matches(n, metric, proximity)) {
            debug!("Reusing the cached distance table.");
        } else {
            let loaded = self.lookup_file.as_ref().filter(|path| path.exists()).and_then(|path| {
                match DistanceTable::load(path) {
                    Ok(table) if table.matches(n, metric, proximity) => {
                        info!("Loaded distances from {}.", path.display());
                        Some(table)
                    }
                    Ok(_) => {
                        warn!("Ignoring {}, it was built for other fibers or thresholds.", path.display());
                        None
                    }
                    Err(e) => {
                        warn!("Could not read {}: {e}", path.display());
                        None
                    }
                }
            });

            if loaded.is_none() {
                debug!("Starting a new distance table for {n} fibers.");
            }
            self.table = Some(loaded.unwrap_or_else(|| DistanceTable::for_metric(n, metric, proximity)));
        }

        self.table
            .get_or_insert_with(|| DistanceTable::for_metric(n, metric, proximity))
    }

    /// Writes the cached table to the lookup file. Failures are logged.
    fn store_table(&self) {
        if let (Some(path), Some(table)) = (&self.lookup_file, &self.table) {
            match table.save(path) {
                Ok(()) => info!("Stored distances in {}.", path.display()),
                Err(e) => warn!("Could not write {}: {e}", path.display()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DetTractClustering;
    use crate::{ClusteringCriteria, Fiber, FiberDataset, FiberMetric};

    fn fibers() -> FiberDataset {
        [0., 0.1, 5., 5.1]
            .into_iter()
            .map(|y| Fiber::new((0..4).map(|x| [f64::from(x), y, 0.]).collect()))
            .collect()
    }

    #[test]
    fn table_is_reused_until_criteria_change() {
        let fibers = fibers();
        let mut engine = DetTractClustering::new(ClusteringCriteria::new().with_max_distance(1.).with_min_cluster_size(1));

        let first = engine.cluster(&fibers);
        let computed = engine.table().map(crate::DistanceTable::num_computed);
        assert_eq!(computed, Some(6));

        let second = engine.cluster(&fibers);
        assert_eq!(first, second);
        assert_eq!(engine.table().map(crate::DistanceTable::num_computed), computed);
        assert_eq!(engine.last_clustering(), Some(&second));

        engine.set_criteria(engine.criteria().with_metric(FiberMetric::Dst));
        let _ = engine.cluster(&fibers);
        assert_eq!(engine.table().map(crate::DistanceTable::metric), Some(FiberMetric::Dst));
    }

    #[test]
    fn table_is_rebuilt_when_the_fiber_count_changes() {
        let criteria = ClusteringCriteria::new().with_max_distance(1.).with_min_cluster_size(1);
        let mut engine = DetTractClustering::new(criteria);
        let _ = engine.cluster(&fibers());
        assert_eq!(engine.table().map(crate::DistanceTable::dimension), Some(4));

        let more = [0., 0.1, 5., 5.1, 10., 10.1]
            .into_iter()
            .map(|y| Fiber::new((0..4).map(|x| [f64::from(x), y, 0.]).collect()))
            .collect::<FiberDataset>();
        let second = engine.cluster(&more);
        assert_eq!(second.len(), 3);
        assert_eq!(engine.table().map(crate::DistanceTable::dimension), Some(6));

        let mut fresh = DetTractClustering::new(criteria);
        assert_eq!(fresh.cluster(&more), second);
        assert_eq!(
            engine.table().map(crate::DistanceTable::num_computed),
            fresh.table().map(crate::DistanceTable::num_computed)
        );
        assert_eq!(engine.table().map(crate::DistanceTable::num_computed), Some(15));
    }

    #[test]
    fn empty_dataset() {
        let mut engine = DetTractClustering::default();
        let clustering = engine.cluster(&FiberDataset::default());
        assert!(clustering.is_empty());
        assert_eq!(clustering.num_tracts(), 0);
        assert!(engine.table().is_none());
    }
}
