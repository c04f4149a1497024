//! The `HierarchicalTree`: a dendrogram of fiber merges.

use serde::{Deserialize, Serialize};

use crate::core::color::Color;

/// Errors of `HierarchicalTree` queries and construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// The id names no node of the tree.
    InvalidCluster(usize),
    /// The two ids cannot be merged, e.g. because they are equal.
    InvalidMerge(usize, usize),
    /// A ROI query was made before `set_roi_bitfield`.
    RoiNotSet,
    /// The ROI bit-field has the wrong number of entries.
    RoiLength(usize, usize),
    /// A line of a dendrogram file could not be read.
    Parse {
        /// The one-based line number.
        line: usize,
        /// What went wrong.
        message: String,
    },
}

impl std::fmt::Display for TreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::InvalidCluster(id) => write!(f, "Node {id} does not exist in the tree."),
            Self::InvalidMerge(a, b) => write!(f, "Cannot merge nodes {a} and {b}."),
            Self::RoiNotSet => write!(f, "No ROI bit-field has been set."),
            Self::RoiLength(expected, found) => {
                write!(f, "Expected an ROI bit-field of {expected} entries, got {found}.")
            }
            Self::Parse { line, message } => write!(f, "Line {line}: {message}"),
        }
    }
}

impl std::error::Error for TreeError {}

/// One node of a `HierarchicalTree`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Node {
    /// 0 for leaves, one more than the higher child for merged nodes.
    pub(crate) level: usize,
    /// The merged node this one belongs to; itself until it is merged.
    pub(crate) parent: usize,
    /// The two merged nodes, `None` for leaves.
    pub(crate) children: Option<(usize, usize)>,
    /// The leaves below this node, in merge order.
    pub(crate) leaves: Vec<usize>,
    /// A value attached to the merge, usually its distance.
    pub(crate) custom_data: f32,
    /// The display color.
    pub(crate) color: Color,
}

/// A binary dendrogram over fibers.
///
/// Leaves come first and carry the id of their fiber. Every merged node gets
/// the next id in the order it was added, so all leaf ids are smaller than
/// all merged node ids. Once the first merged node exists no leaves can be
/// added. Nodes are never removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HierarchicalTree {
    /// All nodes, leaves first.
    pub(crate) nodes: Vec<Node>,
    /// The number of leaves.
    pub(crate) leaf_count: usize,
    /// The highest level of any node.
    pub(crate) max_level: usize,
    /// Whether merged nodes exist, preventing more leaves.
    pub(crate) leaves_locked: bool,
    /// One flag per leaf marking fibers inside the region of interest.
    pub(crate) roi: Option<Vec<bool>>,
}

impl HierarchicalTree {
    /// An empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a leaf and returns its id, or `None` once merged nodes exist.
    pub fn add_leaf(&mut self) -> Option<usize> {
        if self.leaves_locked {
            return None;
        }
        let id = self.nodes.len();
        self.nodes.push(Node {
            level: 0,
            parent: id,
            children: None,
            leaves: vec![id],
            custom_data: 0.,
            color: Color::GREY,
        });
        self.leaf_count += 1;
        Some(id)
    }

    /// Adds a node merging `c1` and `c2`, carrying `custom_data`, and returns
    /// its id. No leaves can be added afterwards.
    ///
    /// # Errors
    ///
    /// * `TreeError::InvalidCluster` if either id is not a node.
    /// * `TreeError::InvalidMerge` if `c1 == c2`.
    pub fn add_cluster(&mut self, c1: usize, c2: usize, custom_data: f32) -> Result<usize, TreeError> {
        self.assert_contains(c1)?;
        self.assert_contains(c2)?;
        if c1 == c2 {
            return Err(TreeError::InvalidMerge(c1, c2));
        }

        self.leaves_locked = true;
        let id = self.nodes.len();

        let level = self.nodes[c1].level.max(self.nodes[c2].level) + 1;
        let mut leaves = self.nodes[c1].leaves.clone();
        leaves.extend_from_slice(&self.nodes[c2].leaves);

        self.nodes[c1].parent = id;
        self.nodes[c2].parent = id;
        self.nodes.push(Node {
            level,
            parent: id,
            children: Some((c1, c2)),
            leaves,
            custom_data,
            color: Color::default(),
        });
        self.max_level = self.max_level.max(level);

        Ok(id)
    }

    /// Builds a tree over `leaf_count` leaves from the merges of a clustering
    /// run, attaching each merge distance as custom data.
    ///
    /// A run with a distance threshold leaves several unmerged clusters. Their
    /// top nodes are joined in id order under extra nodes carrying
    /// `f32::MAX`, so the last node covers every leaf.
    ///
    /// # Errors
    ///
    /// * If a merge names a cluster id of `leaf_count` or more, or merges a
    ///   cluster with itself.
    pub fn from_merges(leaf_count: usize, merges: &[crate::core::clustering::Merge]) -> Result<Self, TreeError> {
        let mut tree = Self::new();
        for _ in 0..leaf_count {
            tree.add_leaf();
        }

        // The node currently representing each cluster id.
        let mut node_of = (0..leaf_count).collect::<Vec<_>>();
        for merge in merges {
            let survivor = *node_of.get(merge.survivor).ok_or(TreeError::InvalidCluster(merge.survivor))?;
            let absorbed = *node_of.get(merge.absorbed).ok_or(TreeError::InvalidCluster(merge.absorbed))?;
            #[allow(clippy::cast_possible_truncation)]
            let node = tree.add_cluster(survivor, absorbed, merge.distance as f32)?;
            node_of[merge.survivor] = node;
        }

        let mut tops = tree.tops().into_iter();
        if let Some(first) = tops.next() {
            tops.try_fold(first, |joined, top| tree.add_cluster(joined, top, f32::MAX))?;
        }

        Ok(tree)
    }

    /// Returns an error if `id` is not a node of the tree.
    pub(crate) fn assert_contains(&self, id: usize) -> Result<(), TreeError> {
        if id < self.nodes.len() {
            Ok(())
        } else {
            Err(TreeError::InvalidCluster(id))
        }
    }

    /// The node with id `id`.
    pub(crate) fn node(&self, id: usize) -> Result<&Node, TreeError> {
        self.nodes.get(id).ok_or(TreeError::InvalidCluster(id))
    }

    /// The number of leaves.
    pub const fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// The number of nodes, leaves included.
    pub fn cluster_count(&self) -> usize {
        self.nodes.len()
    }

    /// The highest level of any node.
    pub const fn max_level(&self) -> usize {
        self.max_level
    }

    /// Whether the tree has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The id of the last added node. It covers every leaf when the tree is
    /// connected, as trees built by `from_merges` are. `None` for an empty
    /// tree.
    pub fn root(&self) -> Option<usize> {
        self.nodes.len().checked_sub(1)
    }

    /// The nodes without a parent, in id order. A connected tree has only its
    /// root here.
    pub fn tops(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|&(id, n)| n.parent == id)
            .map(|(id, _)| id)
            .collect()
    }

    /// The level of a node.
    ///
    /// # Errors
    ///
    /// * If `id` is not a node.
    pub fn level(&self, id: usize) -> Result<usize, TreeError> {
        self.node(id).map(|n| n.level)
    }

    /// The parent of a node; the node itself if it has not been merged.
    ///
    /// # Errors
    ///
    /// * If `id` is not a node.
    pub fn parent(&self, id: usize) -> Result<usize, TreeError> {
        self.node(id).map(|n| n.parent)
    }

    /// The two children of a merged node, `None` for a leaf.
    ///
    /// # Errors
    ///
    /// * If `id` is not a node.
    pub fn children(&self, id: usize) -> Result<Option<(usize, usize)>, TreeError> {
        self.node(id).map(|n| n.children)
    }

    /// Whether the node is a leaf.
    ///
    /// # Errors
    ///
    /// * If `id` is not a node.
    pub fn is_leaf(&self, id: usize) -> Result<bool, TreeError> {
        self.node(id).map(|n| n.children.is_none())
    }

    /// The value attached to a node.
    ///
    /// # Errors
    ///
    /// * If `id` is not a node.
    pub fn custom_data(&self, id: usize) -> Result<f32, TreeError> {
        self.node(id).map(|n| n.custom_data)
    }

    /// The leaves below a node, the first child's before the second's.
    ///
    /// # Errors
    ///
    /// * If `id` is not a node.
    pub fn leaves_for_cluster(&self, id: usize) -> Result<&[usize], TreeError> {
        self.node(id).map(|n| n.leaves.as_slice())
    }

    /// The number of leaves below a node.
    ///
    /// # Errors
    ///
    /// * If `id` is not a node.
    pub fn size(&self, id: usize) -> Result<usize, TreeError> {
        self.node(id).map(|n| n.leaves.len())
    }

    /// The color of a node.
    ///
    /// # Errors
    ///
    /// * If `id` is not a node.
    pub fn color(&self, id: usize) -> Result<Color, TreeError> {
        self.node(id).map(|n| n.color)
    }

    /// Sets the color of a single node.
    ///
    /// # Errors
    ///
    /// * If `id` is not a node.
    pub fn set_color(&mut self, id: usize, color: Color) -> Result<(), TreeError> {
        self.assert_contains(id)?;
        self.nodes[id].color = color;
        Ok(())
    }

    /// Sets the color of a node and everything below it.
    ///
    /// # Errors
    ///
    /// * If `id` is not a node.
    pub fn color_cluster(&mut self, id: usize, color: Color) -> Result<(), TreeError> {
        self.assert_contains(id)?;
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            self.nodes[n].color = color;
            if let Some((c1, c2)) = self.nodes[n].children {
                stack.push(c1);
                stack.push(c2);
            }
        }
        Ok(())
    }

    /// One flag per leaf, set for the leaves below `id`.
    ///
    /// # Errors
    ///
    /// * If `id` is not a node.
    pub fn output_bitfield(&self, id: usize) -> Result<Vec<bool>, TreeError> {
        self.output_bitfield_for(&[id])
    }

    /// One flag per leaf, set for the leaves below any of `ids`.
    ///
    /// # Errors
    ///
    /// * If any id is not a node.
    pub fn output_bitfield_for(&self, ids: &[usize]) -> Result<Vec<bool>, TreeError> {
        let mut bits = vec![false; self.leaf_count];
        for &id in ids {
            for &leaf in self.leaves_for_cluster(id)? {
                bits[leaf] = true;
            }
        }
        Ok(bits)
    }
}

#[cfg(test)]
mod tests {
    use super::{HierarchicalTree, TreeError};
    use crate::{Color, Merge};

    #[test]
    fn add_cluster_rejects_bad_ids() {
        let mut tree = HierarchicalTree::new();
        tree.add_leaf();
        tree.add_leaf();
        assert_eq!(tree.add_cluster(0, 2, 0.), Err(TreeError::InvalidCluster(2)));
        assert_eq!(tree.add_cluster(1, 1, 0.), Err(TreeError::InvalidMerge(1, 1)));
        assert_eq!(tree.add_cluster(1, 0, 0.), Ok(2));
        assert_eq!(tree.leaves_for_cluster(2), Ok([1, 0].as_slice()));
    }

    #[test]
    fn queries() {
        let mut tree = HierarchicalTree::new();
        assert_eq!(tree.root(), None);
        for _ in 0..3 {
            tree.add_leaf();
        }
        assert_eq!(tree.parent(1), Ok(1));
        assert_eq!(tree.color(0), Ok(Color::GREY));

        let a = tree.add_cluster(0, 1, 0.5).unwrap_or_else(|e| unreachable!("{e}"));
        assert_eq!(tree.children(a), Ok(Some((0, 1))));
        assert_eq!(tree.children(2), Ok(None));
        assert_eq!(tree.is_leaf(2), Ok(true));
        assert_eq!(tree.is_leaf(a), Ok(false));
        assert_eq!(tree.custom_data(a), Ok(0.5));
        assert_eq!(tree.size(a), Ok(2));
        assert_eq!(tree.level(7), Err(TreeError::InvalidCluster(7)));

        let red = Color::new(1., 0., 0., 1.);
        tree.color_cluster(a, red).unwrap_or_else(|e| unreachable!("{e}"));
        assert_eq!(tree.color(0), Ok(red));
        assert_eq!(tree.color(2), Ok(Color::GREY));

        assert_eq!(tree.output_bitfield(a), Ok(vec![true, true, false]));
        assert_eq!(tree.output_bitfield_for(&[1, 2]), Ok(vec![false, true, true]));
    }

    #[test]
    fn from_merges() {
        let merges = [
            Merge {
                survivor: 0,
                absorbed: 1,
                distance: 0.5,
            },
            Merge {
                survivor: 2,
                absorbed: 3,
                distance: 0.25,
            },
            Merge {
                survivor: 0,
                absorbed: 2,
                distance: 1.,
            },
        ];
        let tree = HierarchicalTree::from_merges(4, &merges).unwrap_or_else(|e| unreachable!("{e}"));
        assert_eq!(tree.cluster_count(), 7);
        assert_eq!(tree.children(6), Ok(Some((4, 5))));
        assert_eq!(tree.leaves_for_cluster(6), Ok([0, 1, 2, 3].as_slice()));
        assert_eq!(tree.max_level(), 2);
        assert_eq!(tree.tops(), vec![6]);

        // Leaf 2 and the pair 0, 1 are never merged by the run.
        let forest = [Merge {
            survivor: 0,
            absorbed: 1,
            distance: 0.5,
        }];
        let tree = HierarchicalTree::from_merges(3, &forest).unwrap_or_else(|e| unreachable!("{e}"));
        assert_eq!(tree.cluster_count(), 5);
        assert_eq!(tree.children(4), Ok(Some((2, 3))));
        assert_eq!(tree.custom_data(4), Ok(f32::MAX));
        assert_eq!(tree.root(), Some(4));
        assert_eq!(tree.size(4), Ok(3));
        assert_eq!(tree.tops(), vec![4]);

        let bad = [Merge {
            survivor: 0,
            absorbed: 9,
            distance: 0.,
        }];
        assert_eq!(HierarchicalTree::from_merges(4, &bad), Err(TreeError::InvalidCluster(9)));
    }
}
