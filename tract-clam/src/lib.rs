#![deny(clippy::correctness)]
#![warn(
    missing_docs,
    clippy::all,
    clippy::suspicious,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::pedantic,
    clippy::nursery,
    clippy::missing_docs_in_private_items,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
#![allow(clippy::module_name_repetitions, clippy::cast_precision_loss)]

//! Clustering of deterministic tractography fibers.
//!
//! The crate groups fibers (3D polylines) into bundles with single-linkage
//! agglomeration over a cached pairwise distance table, and provides a
//! `HierarchicalTree` for navigating dendrograms of such merges after the
//! fact.

mod core;
pub mod utils;

pub use crate::core::{
    clustering::{Clustering, ClusteringCriteria, ClusteringError, ClusteringReport, DetTractClustering, Merge},
    color::Color,
    distances::{dlt, dst, dxt, FiberMetric, METRICS},
    fiber::{BoundingBox, DatasetError, Fiber, FiberDataset, FlatFibers, Point},
    fiber_cluster::FiberCluster,
    lookup::{DistanceTable, LookupError},
    tree::{HierarchicalTree, TreeError},
};
