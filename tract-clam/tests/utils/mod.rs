#![allow(dead_code)]

//! Utility functions for tests.

use tract_clam::{Fiber, FiberDataset};

/// Routes library logs to the test output. Safe to call from every test.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A straight fiber of `len` points along the x axis at height `y`.
pub fn line(y: f64, len: usize) -> Fiber {
    Fiber::new((0..len).map(|x| [x as f64, y, 0.]).collect())
}

/// One straight fiber of `len` points per height in `ys`.
pub fn lines(ys: &[f64], len: usize) -> FiberDataset {
    ys.iter().map(|&y| line(y, len)).collect()
}
