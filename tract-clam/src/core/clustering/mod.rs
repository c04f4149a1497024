//! Provides the `DetTractClustering` engine, its `ClusteringCriteria` and the
//! resulting `Clustering`.

mod _clustering;
mod criteria;
mod result;

pub use _clustering::{ClusteringError, DetTractClustering};
pub use criteria::ClusteringCriteria;
pub use result::{Clustering, ClusteringReport, Merge};
