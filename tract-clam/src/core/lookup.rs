//! Provides the `DistanceTable`, a lookup table for the distances between all
//! unordered pairs of fibers.

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{distances::FiberMetric, fiber::FiberDataset};

/// Errors for reading and writing `DistanceTable`s.
#[derive(Debug)]
pub enum LookupError {
    /// The file could not be opened or created.
    Io(std::io::Error),

    /// The file contents could not be (de)serialized.
    Encoding(bincode::Error),

    /// The raw values do not fit the dimension of the table.
    ///
    /// The first value is the expected number of values, the second the
    /// number that was given.
    SizeMismatch(usize, usize),
}

impl std::fmt::Display for LookupError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "lookup table I/O failed: {e}"),
            Self::Encoding(e) => write!(f, "lookup table encoding failed: {e}"),
            Self::SizeMismatch(expected, given) => {
                write!(f, "lookup table needs {expected} values but {given} were given")
            }
        }
    }
}

impl std::error::Error for LookupError {}

impl From<std::io::Error> for LookupError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<bincode::Error> for LookupError {
    fn from(e: bincode::Error) -> Self {
        Self::Encoding(e)
    }
}

/// A symmetric matrix of distances between `n` fibers without its diagonal,
/// stored as the `n * (n - 1) / 2` entries of its upper triangle.
///
/// Entries start out as zero and uncomputed. The table remembers the metric
/// and proximity threshold its values were computed with, so that a table
/// built for one setting is never reused for another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceTable {
    /// The number of fibers.
    dimension: usize,
    /// The metric the values were computed with.
    metric: FiberMetric,
    /// The (non-squared) proximity threshold the values were computed with.
    proximity: f64,
    /// The distances in row-major upper triangle order.
    data: Vec<f64>,
    /// Whether each entry of `data` holds a computed value.
    computed: Vec<bool>,
}

impl DistanceTable {
    /// Creates a zeroed table for `dimension` fibers, tagged with the default
    /// metric and a proximity threshold of zero.
    pub fn new(dimension: usize) -> Self {
        Self::for_metric(dimension, FiberMetric::default(), 0.)
    }

    /// Creates a zeroed table for `dimension` fibers whose values will be
    /// computed with `metric` and the (non-squared) `proximity` threshold.
    pub fn for_metric(dimension: usize, metric: FiberMetric, proximity: f64) -> Self {
        let len = dimension * dimension.saturating_sub(1) / 2;
        Self {
            dimension,
            metric,
            proximity,
            data: vec![0.; len],
            computed: vec![false; len],
        }
    }

    /// The number of fibers the table was built for.
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    /// The number of stored distances, `n * (n - 1) / 2`.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the table stores no distances at all, i.e. has fewer than two
    /// fibers.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The metric the values were computed with.
    pub const fn metric(&self) -> FiberMetric {
        self.metric
    }

    /// The proximity threshold the values were computed with.
    pub const fn proximity(&self) -> f64 {
        self.proximity
    }

    /// Whether this table holds values for `dimension` fibers compared with
    /// `metric` under the given `proximity` threshold.
    pub fn matches(&self, dimension: usize, metric: FiberMetric, proximity: f64) -> bool {
        self.dimension == dimension && self.metric == metric && (self.proximity - proximity).abs() <= f64::EPSILON
    }

    /// Maps a pair of distinct fiber indices to the position of its entry.
    ///
    /// # Panics
    ///
    /// * If `i == j`; the table has no diagonal.
    /// * If either index is not smaller than the dimension.
    fn offset(&self, i: usize, j: usize) -> usize {
        assert_ne!(i, j, "The distance table has no diagonal entries, got ({i}, {j}).");
        let (i, j) = if i < j { (i, j) } else { (j, i) };
        assert!(
            j < self.dimension,
            "Index {j} is out of bounds for a distance table of dimension {}.",
            self.dimension
        );
        // Row i starts after the i previous rows of lengths n-1, n-2, ..., n-i.
        i * self.dimension + j - (i + 1) * (i + 2) / 2
    }

    /// The stored distance between fibers `i` and `j`; zero if it was never
    /// set.
    ///
    /// # Panics
    ///
    /// * If `i == j` or either index is out of bounds.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[self.offset(i, j)]
    }

    /// A mutable reference to the distance between fibers `i` and `j`. The
    /// entry counts as computed afterwards.
    ///
    /// # Panics
    ///
    /// * If `i == j` or either index is out of bounds.
    pub fn get_mut(&mut self, i: usize, j: usize) -> &mut f64 {
        let k = self.offset(i, j);
        self.computed[k] = true;
        &mut self.data[k]
    }

    /// Stores the distance between fibers `i` and `j`.
    ///
    /// # Panics
    ///
    /// * If `i == j` or either index is out of bounds.
    pub fn set(&mut self, i: usize, j: usize, distance: f64) {
        *self.get_mut(i, j) = distance;
    }

    /// Whether the distance between fibers `i` and `j` has been stored.
    ///
    /// # Panics
    ///
    /// * If `i == j` or either index is out of bounds.
    pub fn is_computed(&self, i: usize, j: usize) -> bool {
        self.computed[self.offset(i, j)]
    }

    /// Returns the distance between fibers `i` and `j`, computing it with `f`
    /// and storing it on first access.
    ///
    /// # Panics
    ///
    /// * If `i == j` or either index is out of bounds.
    pub fn get_or_insert_with<F: FnOnce() -> f64>(&mut self, i: usize, j: usize, f: F) -> f64 {
        let k = self.offset(i, j);
        if !self.computed[k] {
            self.data[k] = f();
            self.computed[k] = true;
        }
        self.data[k]
    }

    /// The number of entries that hold a computed value.
    pub fn num_computed(&self) -> usize {
        self.computed.iter().filter(|&&c| c).count()
    }

    /// The raw values in row-major upper triangle order.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Replaces all values at once and marks them computed.
    ///
    /// # Errors
    ///
    /// * If `data` does not hold exactly `n * (n - 1) / 2` values.
    pub fn set_data(&mut self, data: Vec<f64>) -> Result<(), LookupError> {
        if data.len() != self.data.len() {
            return Err(LookupError::SizeMismatch(self.data.len(), data.len()));
        }
        self.data = data;
        self.computed.iter_mut().for_each(|c| *c = true);
        Ok(())
    }

    /// Computes every entry that has not been computed yet, in parallel.
    ///
    /// Rows of the upper triangle are contiguous, so each row is filled by an
    /// independent task.
    ///
    /// # Panics
    ///
    /// * If `fibers` does not have as many fibers as the table's dimension.
    pub fn populate(&mut self, fibers: &FiberDataset) {
        assert_eq!(
            fibers.len(),
            self.dimension,
            "Cannot populate a distance table of dimension {} from {} fibers.",
            self.dimension,
            fibers.len()
        );

        let metric = self.metric;
        let proximity_sq = self.proximity * self.proximity;

        let mut rows = Vec::with_capacity(self.dimension);
        let (mut data, mut computed) = (self.data.as_mut_slice(), self.computed.as_mut_slice());
        for i in 0..self.dimension.saturating_sub(1) {
            let row_len = self.dimension - i - 1;
            let (row_data, rest_data) = std::mem::take(&mut data).split_at_mut(row_len);
            let (row_computed, rest_computed) = std::mem::take(&mut computed).split_at_mut(row_len);
            rows.push((i, row_data, row_computed));
            data = rest_data;
            computed = rest_computed;
        }

        rows.into_par_iter().for_each(|(i, row_data, row_computed)| {
            let q = &fibers[i];
            for (k, (value, done)) in row_data.iter_mut().zip(row_computed.iter_mut()).enumerate() {
                if !*done {
                    *value = metric.distance(q, &fibers[i + 1 + k], proximity_sq);
                    *done = true;
                }
            }
        });
    }

    /// The name of the lookup table file belonging to a fiber file: same
    /// directory and stem, with the proximity threshold encoded in the
    /// extension, e.g. `tracts.pt-0.50.dlt` for `tracts.fib`.
    pub fn lookup_file_name<P: AsRef<Path>>(fiber_file: P, proximity: f64) -> PathBuf {
        fiber_file.as_ref().with_extension(format!("pt-{proximity:.2}.dlt"))
    }

    /// Writes the table to `path`.
    ///
    /// # Errors
    ///
    /// * If the file cannot be created or the table cannot be encoded.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), LookupError> {
        let mut writer = std::io::BufWriter::new(std::fs::File::create(path)?);
        bincode::serialize_into(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// Reads a table previously written with `save`.
    ///
    /// # Errors
    ///
    /// * If the file cannot be opened or decoded.
    /// * If the decoded table is internally inconsistent.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LookupError> {
        let reader = std::io::BufReader::new(std::fs::File::open(path)?);
        let table: Self = bincode::deserialize_from(reader)?;

        let expected = table.dimension * table.dimension.saturating_sub(1) / 2;
        if table.data.len() != expected {
            return Err(LookupError::SizeMismatch(expected, table.data.len()));
        }
        if table.computed.len() != expected {
            return Err(LookupError::SizeMismatch(expected, table.computed.len()));
        }
        Ok(table)
    }
}
