//! Provides the `HierarchicalTree`, a dendrogram of fiber merges, with ways to
//! select, color and store its nodes.

mod _tree;
mod io;
mod selection;

pub use _tree::{HierarchicalTree, TreeError};
