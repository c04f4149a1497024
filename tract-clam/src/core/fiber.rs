//! Provides the `Fiber` and `FiberDataset` structs.

use std::ops::Index;

use serde::{Deserialize, Serialize};

/// A position in 3D space.
pub type Point = [f64; 3];

/// The flat vertex layout used by fiber files: `(vertices, start_indices,
/// lengths, point_fiber_mapping)`.
///
/// `vertices` holds three floats per vertex, `start_indices` counts vertices,
/// not floats.
pub type FlatFibers = (Vec<f32>, Vec<usize>, Vec<usize>, Vec<usize>);

/// Errors for building a `FiberDataset` from external data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetError {
    /// The start index and length arrays disagree in size.
    ///
    /// The first value is the number of start indices, the second the number
    /// of lengths.
    MismatchedLineArrays(usize, usize),

    /// The vertex array is not made of whole 3D points.
    RaggedVertices(usize),

    /// A fiber refers to vertices past the end of the vertex array.
    ///
    /// The first value is the fiber, the second the number of vertices.
    LineOutOfRange(usize, usize),
}

impl std::fmt::Display for DatasetError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::MismatchedLineArrays(starts, lengths) => {
                write!(f, "{starts} fiber start indices but {lengths} fiber lengths")
            }
            Self::RaggedVertices(len) => write!(f, "vertex array of length {len} is not a multiple of 3"),
            Self::LineOutOfRange(fiber, num_vertices) => {
                write!(f, "fiber {fiber} reaches past the last of {num_vertices} vertices")
            }
        }
    }
}

impl std::error::Error for DatasetError {}

/// Squared euclidean distance between two points.
#[inline(always)]
pub(crate) fn distance_sq(p: &Point, q: &Point) -> f64 {
    distances::vectors::euclidean_sq(&p[..], &q[..])
}

/// Euclidean distance between two points.
#[inline(always)]
pub(crate) fn distance(p: &Point, q: &Point) -> f64 {
    distance_sq(p, q).sqrt()
}

/// An axis aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// The corner with the smallest coordinates.
    pub min: Point,
    /// The corner with the largest coordinates.
    pub max: Point,
}

impl BoundingBox {
    /// A degenerate box holding a single point.
    pub const fn from_point(p: Point) -> Self {
        Self { min: p, max: p }
    }

    /// Grows the box so that it contains `p`.
    pub fn expand_by_point(&mut self, p: &Point) {
        for d in 0..3 {
            self.min[d] = self.min[d].min(p[d]);
            self.max[d] = self.max[d].max(p[d]);
        }
    }

    /// Grows the box so that it contains `other`.
    pub fn expand_by(&mut self, other: &Self) {
        self.expand_by_point(&other.min);
        self.expand_by_point(&other.max);
    }

    /// Whether `p` lies inside the box or on its border.
    pub fn contains(&self, p: &Point) -> bool {
        (0..3).all(|d| self.min[d] <= p[d] && p[d] <= self.max[d])
    }
}

/// A `Fiber` is a polyline: an ordered sequence of 3D points, e.g. one tract
/// reconstructed by deterministic tractography.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fiber {
    /// The points of the polyline in order.
    points: Vec<Point>,
}

impl From<Vec<Point>> for Fiber {
    fn from(points: Vec<Point>) -> Self {
        Self { points }
    }
}

impl Index<usize> for Fiber {
    type Output = Point;

    fn index(&self, index: usize) -> &Self::Output {
        &self.points[index]
    }
}

impl Fiber {
    /// Creates a new `Fiber` from its points.
    pub const fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// The number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the fiber has no points at all.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The points of the fiber.
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// The first point, if any.
    pub fn front(&self) -> Option<&Point> {
        self.points.first()
    }

    /// The last point, if any.
    pub fn back(&self) -> Option<&Point> {
        self.points.last()
    }

    /// Reverses the order of the points in place.
    pub fn reverse(&mut self) {
        self.points.reverse();
    }

    /// Returns a copy with the points in reverse order.
    #[must_use]
    pub fn reversed(&self) -> Self {
        let mut f = self.clone();
        f.reverse();
        f
    }

    /// The arc length of the polyline.
    pub fn length(&self) -> f64 {
        self.points.windows(2).map(|w| distance(&w[0], &w[1])).sum()
    }

    /// The axis aligned bounding box of all points, `None` for an empty fiber.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        let (first, rest) = self.points.split_first()?;
        let mut bb = BoundingBox::from_point(*first);
        rest.iter().for_each(|p| bb.expand_by_point(p));
        Some(bb)
    }

    /// Resamples the fiber to exactly `n` points, equally spaced along its
    /// arc length. Both end points are kept.
    ///
    /// Fibers with fewer than two points, and requests for fewer than two
    /// points, leave the fiber unchanged.
    pub fn resample_by_number_of_points(&mut self, n: usize) {
        if self.points.len() < 2 || n < 2 {
            return;
        }

        let total = self.length();
        let step = total / (n - 1) as f64;
        let mut resampled = Vec::with_capacity(n);
        resampled.push(self.points[0]);

        // Walk the segments once, emitting a point every `step` units.
        let mut segment = 0;
        let mut walked = 0.0;
        for k in 1..(n - 1) {
            let target = step * k as f64;
            loop {
                let seg_len = distance(&self.points[segment], &self.points[segment + 1]);
                if walked + seg_len >= target || segment + 2 == self.points.len() {
                    let t = if seg_len > 0.0 { (target - walked) / seg_len } else { 0.0 };
                    let (a, b) = (self.points[segment], self.points[segment + 1]);
                    resampled.push([
                        a[0] + t * (b[0] - a[0]),
                        a[1] + t * (b[1] - a[1]),
                        a[2] + t * (b[2] - a[2]),
                    ]);
                    break;
                }
                walked += seg_len;
                segment += 1;
            }
        }

        resampled.push(self.points[self.points.len() - 1]);
        self.points = resampled;
    }
}

/// An owned collection of `Fiber`s, identified by their index.
///
/// The clustering code only ever borrows a `FiberDataset`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FiberDataset {
    /// The fibers in this dataset.
    fibers: Vec<Fiber>,
    /// The file the fibers were read from, if any.
    file_name: Option<String>,
}

impl Index<usize> for FiberDataset {
    type Output = Fiber;

    fn index(&self, index: usize) -> &Self::Output {
        &self.fibers[index]
    }
}

impl FromIterator<Fiber> for FiberDataset {
    fn from_iter<I: IntoIterator<Item = Fiber>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl FiberDataset {
    /// Creates a new dataset from the given fibers.
    pub const fn new(fibers: Vec<Fiber>) -> Self {
        Self { fibers, file_name: None }
    }

    /// Records the file the fibers came from. It is used to name the lookup
    /// table file that belongs to the dataset.
    #[must_use]
    pub fn with_file_name(mut self, file_name: &str) -> Self {
        self.file_name = Some(file_name.to_string());
        self
    }

    /// The file the fibers came from, if known.
    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    /// Builds a dataset from the flat vertex layout of fiber files.
    ///
    /// # Errors
    ///
    /// * If `start_indices` and `lengths` differ in size.
    /// * If `vertices` does not hold whole 3D points.
    /// * If a fiber reaches past the end of `vertices`.
    pub fn from_flat(vertices: &[f32], start_indices: &[usize], lengths: &[usize]) -> Result<Self, DatasetError> {
        if start_indices.len() != lengths.len() {
            return Err(DatasetError::MismatchedLineArrays(start_indices.len(), lengths.len()));
        }
        if vertices.len() % 3 != 0 {
            return Err(DatasetError::RaggedVertices(vertices.len()));
        }

        let num_vertices = vertices.len() / 3;
        start_indices
            .iter()
            .zip(lengths)
            .enumerate()
            .map(|(fiber, (&start, &len))| {
                if start + len > num_vertices {
                    return Err(DatasetError::LineOutOfRange(fiber, num_vertices));
                }
                let points = vertices[(3 * start)..(3 * (start + len))]
                    .chunks_exact(3)
                    .map(|v| [f64::from(v[0]), f64::from(v[1]), f64::from(v[2])])
                    .collect();
                Ok(Fiber::new(points))
            })
            .collect()
    }

    /// The inverse of `from_flat`, additionally returning the fiber index of
    /// every vertex.
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_flat(&self) -> FlatFibers {
        let num_points = self.fibers.iter().map(Fiber::len).sum();
        let mut vertices = Vec::with_capacity(3 * num_points);
        let mut start_indices = Vec::with_capacity(self.len());
        let mut lengths = Vec::with_capacity(self.len());
        let mut point_fiber_mapping = Vec::with_capacity(num_points);

        for (i, fiber) in self.fibers.iter().enumerate() {
            start_indices.push(vertices.len() / 3);
            lengths.push(fiber.len());
            for p in fiber.points() {
                vertices.extend(p.iter().map(|&c| c as f32));
                point_fiber_mapping.push(i);
            }
        }

        (vertices, start_indices, lengths, point_fiber_mapping)
    }

    /// The number of fibers.
    pub fn len(&self) -> usize {
        self.fibers.len()
    }

    /// Whether there are no fibers.
    pub fn is_empty(&self) -> bool {
        self.fibers.is_empty()
    }

    /// The fiber at `index`, if there is one.
    pub fn get(&self, index: usize) -> Option<&Fiber> {
        self.fibers.get(index)
    }

    /// An iterator over the fibers in index order.
    pub fn iter(&self) -> std::slice::Iter<Fiber> {
        self.fibers.iter()
    }

    /// The fibers as a slice.
    pub fn fibers(&self) -> &[Fiber] {
        &self.fibers
    }

    /// Sorts the fibers by descending number of points. Fibers of equal size
    /// keep their relative order.
    pub fn sort_desc_length(&mut self) {
        self.fibers.sort_by(|a, b| b.len().cmp(&a.len()));
    }

    /// A new dataset holding only the fibers whose flag in `unused` is
    /// `false`.
    ///
    /// # Panics
    ///
    /// * If `unused` does not have one flag per fiber.
    #[must_use]
    pub fn without_unused(&self, unused: &[bool]) -> Self {
        assert_eq!(
            unused.len(),
            self.len(),
            "Expected one flag per fiber but got {} flags for {} fibers.",
            unused.len(),
            self.len()
        );
        let fibers = self
            .fibers
            .iter()
            .zip(unused)
            .filter(|(_, &u)| !u)
            .map(|(f, _)| f.clone())
            .collect();
        Self {
            fibers,
            file_name: self.file_name.clone(),
        }
    }
}
