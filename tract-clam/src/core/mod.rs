//! The core data structures and algorithms of the crate.

pub mod clustering;
pub mod color;
pub mod distances;
pub mod fiber;
pub mod fiber_cluster;
pub mod lookup;
pub mod tree;
