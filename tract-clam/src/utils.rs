//! Synthetic fibers for tests, benchmarks and demos.

use rand::prelude::*;

use crate::core::fiber::{Fiber, FiberDataset};

/// Distance between the axes of neighboring bundles.
pub const BUNDLE_SEPARATION: f64 = 100.;

/// Generates `num_bundles` bundles of `fibers_per_bundle` roughly parallel
/// fibers with `points_per_fiber` points each.
///
/// Bundle `b` runs along the x axis at `y = b * BUNDLE_SEPARATION`. Each fiber
/// is shifted by up to `spread` in y and z, and each point by up to a tenth of
/// that. Fibers of a bundle are stored next to each other.
///
/// Returns the fibers and the bundle of every fiber.
pub fn bundles(
    num_bundles: usize,
    fibers_per_bundle: usize,
    points_per_fiber: usize,
    spread: f64,
    seed: u64,
) -> (FiberDataset, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let jitter = spread / 10.;

    let mut fibers = Vec::with_capacity(num_bundles * fibers_per_bundle);
    let mut labels = Vec::with_capacity(num_bundles * fibers_per_bundle);
    for b in 0..num_bundles {
        let axis = b as f64 * BUNDLE_SEPARATION;
        for _ in 0..fibers_per_bundle {
            let (dy, dz) = if spread > 0. {
                (rng.gen_range(-spread..=spread), rng.gen_range(-spread..=spread))
            } else {
                (0., 0.)
            };

            let points = (0..points_per_fiber)
                .map(|x| {
                    let (jy, jz) = if jitter > 0. {
                        (rng.gen_range(-jitter..=jitter), rng.gen_range(-jitter..=jitter))
                    } else {
                        (0., 0.)
                    };
                    [x as f64, axis + dy + jy, dz + jz]
                })
                .collect();
            fibers.push(Fiber::new(points));
            labels.push(b);
        }
    }

    (FiberDataset::new(fibers), labels)
}
