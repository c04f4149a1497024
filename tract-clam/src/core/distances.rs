//! Dissimilarity measures between two `Fiber`s.
//!
//! Both measures are built on the mean closest-point distance of Zhang et
//! al.: for every point of one fiber take the distance to the closest point of
//! the other fiber, ignore those closer than a proximity threshold and average
//! the rest.

use serde::{Deserialize, Serialize};

use super::fiber::{distance_sq, Fiber};

/// Named fiber metrics, all taking the squared proximity threshold.
#[allow(clippy::type_complexity)]
pub const METRICS: &[(&str, fn(&Fiber, &Fiber, f64) -> f64)] = &[("dlt", dlt), ("dst", dst)];

/// The metric used to compare two fibers during clustering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FiberMetric {
    /// The larger of the two directed mean closest-point distances. Two
    /// fibers are only close if each is close to the other.
    #[default]
    Dlt,

    /// The smaller of the two directed mean closest-point distances. A short
    /// fiber running along a long one is close to it.
    Dst,
}

impl FiberMetric {
    /// The name of the metric.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Dlt => "dlt",
            Self::Dst => "dst",
        }
    }

    /// Looks up a metric by its name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "dlt" => Some(Self::Dlt),
            "dst" => Some(Self::Dst),
            _ => None,
        }
    }

    /// Computes the distance between `q` and `r` with this metric.
    pub fn distance(&self, q: &Fiber, r: &Fiber, proximity_sq: f64) -> f64 {
        match self {
            Self::Dlt => dlt(q, r, proximity_sq),
            Self::Dst => dst(q, r, proximity_sq),
        }
    }
}

impl std::fmt::Display for FiberMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The two directed mean closest-point distances `(d(q, r), d(r, q))`.
///
/// Point pairs whose squared closest distance does not exceed
/// `proximity_sq` contribute zero to the sums. Sums are divided by the number
/// of points of the fiber they were taken over.
///
/// Returns `(f64::MAX, f64::MAX)` if either fiber has fewer than two points.
pub fn dxt(q: &Fiber, r: &Fiber, proximity_sq: f64) -> (f64, f64) {
    if q.len() < 2 || r.len() < 2 {
        return (f64::MAX, f64::MAX);
    }

    // Column minima give d(r, q) in the same pass as the row minima.
    let mut column_min = vec![f64::MAX; r.len()];
    let mut qr = 0.;
    for p in q.points() {
        let mut row_min = f64::MAX;
        for (j, s) in r.points().iter().enumerate() {
            let d = distance_sq(p, s);
            row_min = row_min.min(d);
            column_min[j] = column_min[j].min(d);
        }
        if row_min > proximity_sq {
            qr += row_min.sqrt();
        }
    }

    let rq = column_min
        .into_iter()
        .filter(|&d| d > proximity_sq)
        .map(f64::sqrt)
        .sum::<f64>();

    (qr / q.len() as f64, rq / r.len() as f64)
}

/// The long-tract distance: the larger of the two directed distances.
#[inline(always)]
pub fn dlt(q: &Fiber, r: &Fiber, proximity_sq: f64) -> f64 {
    let (qr, rq) = dxt(q, r, proximity_sq);
    qr.max(rq)
}

/// The short-tract distance: the smaller of the two directed distances.
#[inline(always)]
pub fn dst(q: &Fiber, r: &Fiber, proximity_sq: f64) -> f64 {
    let (qr, rq) = dxt(q, r, proximity_sq);
    qr.min(rq)
}
