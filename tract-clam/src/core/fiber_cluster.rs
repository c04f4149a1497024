//! Provides the `FiberCluster` struct: a set of fiber indices forming one
//! bundle.

use serde::{Deserialize, Serialize};

use super::{
    color::Color,
    distances::FiberMetric,
    fiber::{distance, distance_sq, BoundingBox, Fiber, FiberDataset, Point},
    lookup::DistanceTable,
};

/// Cut points further than this from the plane anchor do not count when
/// elongating a center line.
pub const ELONGATION_MAX_DISTANCE: f64 = 20.;

/// A center line end is only elongated while more than this many member
/// fibers cross the plane in front of it.
pub const ELONGATION_MIN_FIBERS: usize = 10;

/// A `FiberCluster` holds the indices of fibers in a `FiberDataset` that
/// belong together.
///
/// The cluster does not keep a reference to the fibers. Geometric queries
/// borrow the dataset the indices refer to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FiberCluster {
    /// The indices of the member fibers.
    indices: Vec<usize>,
    /// The color used to paint all members.
    color: Color,
    /// A free text label, usually the name of the bundle.
    annotation: String,
}

/// Two clusters are equal if they hold the same indices in the same order.
impl PartialEq for FiberCluster {
    fn eq(&self, other: &Self) -> bool {
        self.indices == other.indices
    }
}

impl Eq for FiberCluster {}

impl std::fmt::Display for FiberCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self.indices)
    }
}

impl FiberCluster {
    /// Creates a cluster holding the single fiber `index`.
    pub fn new(index: usize) -> Self {
        Self {
            indices: vec![index],
            ..Self::default()
        }
    }

    /// Creates a cluster from a predefined set of indices.
    pub fn from_indices(indices: Vec<usize>, color: Color, annotation: &str) -> Self {
        Self {
            indices,
            color,
            annotation: annotation.to_string(),
        }
    }

    /// Moves all indices of `other` to the end of this cluster. `other` is
    /// empty afterwards.
    pub fn merge(&mut self, other: &mut Self) {
        self.indices.append(&mut other.indices);
    }

    /// Copies the given indices to the end of this cluster.
    pub fn merge_indices<I: IntoIterator<Item = usize>>(&mut self, indices: I) {
        self.indices.extend(indices);
    }

    /// The member indices in their current order.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Replaces the member indices.
    pub fn set_indices(&mut self, indices: Vec<usize>) {
        self.indices = indices;
    }

    /// Sorts the member indices in ascending order.
    pub fn sort(&mut self) {
        self.indices.sort_unstable();
    }

    /// The number of member fibers.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Whether the cluster has no members.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Removes all members. The fibers themselves are untouched.
    pub fn clear(&mut self) {
        self.indices.clear();
    }

    /// Whether fiber `index` is a member.
    pub fn contains(&self, index: usize) -> bool {
        self.indices.contains(&index)
    }

    /// The color of the members.
    pub const fn color(&self) -> Color {
        self.color
    }

    /// Sets the color of the members.
    pub fn set_color(&mut self, color: Color) {
        self.color = color;
    }

    /// The annotation of the cluster.
    pub fn annotation(&self) -> &str {
        &self.annotation
    }

    /// Sets the annotation of the cluster.
    pub fn set_annotation(&mut self, annotation: &str) {
        self.annotation = annotation.to_string();
    }

    /// The single-linkage distance: the smallest distance between any member
    /// of this cluster and any member of `other`.
    ///
    /// Returns `f64::MAX` if either cluster is empty.
    pub fn min_distance(&self, other: &Self, fibers: &FiberDataset, proximity_sq: f64, metric: FiberMetric) -> f64 {
        self.indices
            .iter()
            .flat_map(|&q| other.indices.iter().map(move |&r| (q, r)))
            .map(|(q, r)| metric.distance(&fibers[q], &fibers[r], proximity_sq))
            .fold(f64::MAX, f64::min)
    }

    /// Like `min_distance`, but reads pair distances from `table`, computing
    /// and storing missing ones with the table's metric and proximity.
    ///
    /// # Panics
    ///
    /// * If the clusters share a fiber, or an index is out of the table's
    ///   bounds.
    pub fn min_distance_cached(&self, other: &Self, fibers: &FiberDataset, table: &mut DistanceTable) -> f64 {
        let metric = table.metric();
        let proximity_sq = table.proximity() * table.proximity();

        let mut min = f64::MAX;
        for &q in &self.indices {
            for &r in &other.indices {
                let d = table.get_or_insert_with(q, r, || metric.distance(&fibers[q], &fibers[r], proximity_sq));
                min = min.min(d);
            }
        }
        min
    }

    /// The union of the bounding boxes of all members, `None` if no member has
    /// any points.
    pub fn bounding_box(&self, fibers: &FiberDataset) -> Option<BoundingBox> {
        self.indices
            .iter()
            .filter_map(|&i| fibers[i].bounding_box())
            .reduce(|mut acc, bb| {
                acc.expand_by(&bb);
                acc
            })
    }

    /// The member with the most points; the first such member on ties.
    pub fn longest_line(&self, fibers: &FiberDataset) -> Option<Fiber> {
        self.indices
            .iter()
            .map(|&i| &fibers[i])
            .reduce(|best, f| if f.len() > best.len() { f } else { best })
            .cloned()
    }

    /// The average fiber of the cluster, representing its main course.
    ///
    /// All members are first oriented like the first member, then resampled
    /// to the average number of points and averaged point by point. Finally
    /// both ends are elongated in steps for as long as more than
    /// `ELONGATION_MIN_FIBERS` members cross the plane just beyond the end.
    ///
    /// Members with fewer than two points are ignored. Returns `None` if no
    /// member remains.
    pub fn center_line(&self, fibers: &FiberDataset) -> Option<Fiber> {
        let mut members = self
            .indices
            .iter()
            .map(|&i| fibers[i].clone())
            .filter(|f| f.len() > 1)
            .collect::<Vec<_>>();
        if members.is_empty() {
            return None;
        }

        let avg_len = (members.iter().map(Fiber::len).sum::<usize>() / members.len()).max(2);
        unify_direction(&mut members);
        members.iter_mut().for_each(|f| f.resample_by_number_of_points(avg_len));

        let count = members.len() as f64;
        let mut line = (0..avg_len)
            .map(|i| {
                let sum = members.iter().fold([0.; 3], |acc, f| {
                    let p = f[i];
                    [acc[0] + p[0], acc[1] + p[1], acc[2] + p[2]]
                });
                [sum[0] / count, sum[1] / count, sum[2] / count]
            })
            .collect::<Vec<_>>();

        let originals = self
            .indices
            .iter()
            .map(|&i| &fibers[i])
            .filter(|f| f.len() > 1)
            .collect::<Vec<_>>();
        elongate_front(&mut line, &originals);
        line.reverse();
        elongate_front(&mut line, &originals);
        line.reverse();

        Some(Fiber::new(line))
    }
}

/// Flips every fiber that runs the other way than the first one.
///
/// Directions are compared on four samples: both ends and the points at one
/// and two thirds of the point sequence.
pub fn unify_direction(fibers: &mut [Fiber]) {
    /// The four sample points of a fiber, in order.
    fn samples(f: &Fiber) -> [Point; 4] {
        let n = f.len();
        [f[0], f[n / 3], f[2 * n / 3], f[n - 1]]
    }

    let Some((first, rest)) = fibers.split_first_mut() else {
        return;
    };
    if first.is_empty() {
        return;
    }
    let reference = samples(first);

    for other in rest.iter_mut().filter(|f| !f.is_empty()) {
        let s = samples(other);
        let same = (0..4).map(|k| distance_sq(&reference[k], &s[k])).sum::<f64>() / 4.;
        let inverse = (0..4).map(|k| distance_sq(&reference[k], &s[3 - k])).sum::<f64>() / 4.;
        if inverse < same {
            other.reverse();
        }
    }
}

/// The point where the polyline crosses the plane through `anchor` with
/// normal `normal` that lies closest to `anchor`, if the polyline crosses the
/// plane at all.
fn nearest_cut_point(normal: &Point, anchor: &Point, fiber: &Fiber) -> Option<Point> {
    let side = |p: &Point| (0..3).map(|d| normal[d] * (p[d] - anchor[d])).sum::<f64>();

    fiber
        .points()
        .windows(2)
        .filter_map(|w| {
            let (a, b) = (w[0], w[1]);
            let (da, db) = (side(&a), side(&b));
            if da * db > 0. {
                None
            } else if da == db {
                // The segment lies within the plane.
                Some(a)
            } else {
                let t = da / (da - db);
                Some([a[0] + t * (b[0] - a[0]), a[1] + t * (b[1] - a[1]), a[2] + t * (b[2] - a[2])])
            }
        })
        .min_by(|x, y| distance_sq(x, anchor).total_cmp(&distance_sq(y, anchor)))
}

/// Prepends points to `line`, continuing its first segment, while more than
/// `ELONGATION_MIN_FIBERS` of `members` cross the plane one step ahead within
/// `ELONGATION_MAX_DISTANCE` of it.
fn elongate_front(line: &mut Vec<Point>, members: &[&Fiber]) {
    if line.len() < 2 {
        return;
    }

    let mut candidates = members.to_vec();
    // New points, outermost last.
    let mut extension = Vec::new();
    let (mut a, mut b) = (line[0], line[1]);
    loop {
        let step = [a[0] - b[0], a[1] - b[1], a[2] - b[2]];
        if step.iter().all(|&c| c == 0.) {
            break;
        }
        let anchor = [a[0] + step[0], a[1] + step[1], a[2] + step[2]];

        candidates.retain(|f| {
            nearest_cut_point(&step, &anchor, f).map_or(false, |cut| distance(&cut, &anchor) < ELONGATION_MAX_DISTANCE)
        });

        if candidates.len() > ELONGATION_MIN_FIBERS {
            extension.push(anchor);
            (a, b) = (anchor, a);
        } else {
            break;
        }
    }

    extension.reverse();
    line.splice(0..0, extension);
}
