//! Ways of picking a set of nodes out of a `HierarchicalTree`.

use std::{cmp::Reverse, collections::VecDeque};

use priority_queue::DoublePriorityQueue;

use super::{HierarchicalTree, TreeError};
use crate::core::color::Color;

/// Bigger nodes first, smaller ids first among equal sizes.
type SizePriority = (usize, Reverse<usize>);

impl HierarchicalTree {
    /// The queue priority of a node.
    fn priority(&self, id: usize) -> SizePriority {
        (self.nodes[id].leaves.len(), Reverse(id))
    }

    /// The `k` biggest nodes that split up the tree below `node`, biggest
    /// first.
    ///
    /// Starting from `node`, the biggest selected node is replaced by its
    /// children until `k` nodes are selected. After that the biggest node is
    /// still split for as long as one of its children is bigger than the
    /// smallest selected node; the smallest nodes then make room.
    ///
    /// `k` is clamped to the number of leaves below `node`.
    ///
    /// # Errors
    ///
    /// * If `node` is not a node.
    pub fn find_x_biggest_clusters(&self, node: usize, k: usize) -> Result<Vec<usize>, TreeError> {
        self.biggest_clusters(node, k, false)
    }

    /// Like `find_x_biggest_clusters`, but after the first `k` nodes are
    /// selected a node is only split if both of its children are bigger than
    /// the smallest selected node.
    ///
    /// # Errors
    ///
    /// * If `node` is not a node.
    pub fn find_x_biggest_clusters2(&self, node: usize, k: usize) -> Result<Vec<usize>, TreeError> {
        self.biggest_clusters(node, k, true)
    }

    /// Shared implementation of the two greedy selections.
    fn biggest_clusters(&self, node: usize, k: usize, both_children: bool) -> Result<Vec<usize>, TreeError> {
        let k = k.min(self.size(node)?);
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut queue = DoublePriorityQueue::<usize, SizePriority>::new();
        queue.push(node, self.priority(node));

        while queue.len() < k {
            let Some((top, priority)) = queue.pop_max() else {
                break;
            };
            if let Some((c1, c2)) = self.nodes[top].children {
                queue.push(c1, self.priority(c1));
                queue.push(c2, self.priority(c2));
            } else {
                // Only leaves remain; they already cover `node`.
                queue.push(top, priority);
                break;
            }
        }

        loop {
            let Some((&top, _)) = queue.peek_max() else {
                break;
            };
            let Some((c1, c2)) = self.nodes[top].children else {
                break;
            };
            let smallest = queue.peek_min().map_or(0, |(_, &(size, _))| size);

            let qualifying = [c1, c2]
                .into_iter()
                .filter(|&c| self.nodes[c].leaves.len() > smallest)
                .collect::<Vec<_>>();
            if qualifying.is_empty() || (both_children && qualifying.len() < 2) {
                break;
            }

            queue.pop_max();
            for c in qualifying {
                queue.push(c, self.priority(c));
            }
            while queue.len() > k {
                queue.pop_min();
            }
        }

        let mut selected = Vec::with_capacity(queue.len());
        while let Some((id, _)) = queue.pop_max() {
            selected.push(id);
        }
        Ok(selected)
    }

    /// The nodes `level` merges below the top nodes, biggest first.
    ///
    /// Leaves met on the way down drop out of the selection, and with
    /// `hide_outliers` so do children made of a single leaf. Levels beyond the
    /// top of the tree are treated as one below the top. An empty tree gives
    /// an empty selection.
    pub fn down_x_levels_from_top(&self, level: usize, hide_outliers: bool) -> Vec<usize> {
        let level = if level > self.max_level {
            self.max_level.saturating_sub(1)
        } else {
            level
        };

        let mut current = self.tops();
        for _ in 0..level {
            current = current
                .into_iter()
                .filter_map(|n| self.nodes[n].children)
                .flat_map(|(c1, c2)| [c1, c2])
                .filter(|&c| !hide_outliers || self.nodes[c].leaves.len() > 1)
                .collect();
        }

        current.sort_by_key(|&n| Reverse(self.nodes[n].leaves.len()));
        current
    }

    /// The nodes reached by descending `levels` steps from `node`, only
    /// following children with at least `min_size` leaves. Leaves reached
    /// early are kept.
    ///
    /// # Errors
    ///
    /// * If `node` is not a node.
    pub fn select_sub_levels(&self, node: usize, levels: usize, min_size: usize) -> Result<Vec<usize>, TreeError> {
        self.assert_contains(node)?;

        let mut selected = Vec::new();
        let mut current = vec![node];
        for _ in 0..levels {
            let mut next = Vec::new();
            for n in current {
                match self.nodes[n].children {
                    Some((c1, c2)) => next.extend([c1, c2].into_iter().filter(|&c| self.nodes[c].leaves.len() >= min_size)),
                    None => selected.push(n),
                }
            }
            current = next;
        }
        selected.extend(current);

        Ok(selected)
    }

    /// Greys out the whole tree, then gives every selected node and its
    /// subtree a distinct color.
    ///
    /// # Errors
    ///
    /// * If any id is not a node. The tree is left untouched in that case.
    pub fn paint_selection(&mut self, ids: &[usize]) -> Result<(), TreeError> {
        for &id in ids {
            self.assert_contains(id)?;
        }

        self.nodes.iter_mut().for_each(|n| n.color = Color::GREY);
        for (i, &id) in ids.iter().enumerate() {
            self.color_cluster(id, Color::nth_hsv(i))?;
        }
        Ok(())
    }

    /// Sets which leaves lie in the region of interest.
    ///
    /// # Errors
    ///
    /// * If `bits` does not have one entry per leaf.
    pub fn set_roi_bitfield(&mut self, bits: Vec<bool>) -> Result<(), TreeError> {
        if bits.len() != self.leaf_count {
            return Err(TreeError::RoiLength(self.leaf_count, bits.len()));
        }
        self.roi = Some(bits);
        Ok(())
    }

    /// The share of the leaves below `id` that lie in the region of interest.
    ///
    /// # Errors
    ///
    /// * If `id` is not a node.
    /// * If no ROI was set.
    pub fn ratio(&self, id: usize) -> Result<f64, TreeError> {
        let roi = self.roi.as_ref().ok_or(TreeError::RoiNotSet)?;
        let leaves = self.leaves_for_cluster(id)?;
        let inside = leaves.iter().filter(|&&l| roi[l]).count();
        Ok(inside as f64 / leaves.len() as f64)
    }

    /// The `k` biggest of the highest nodes whose ROI ratio reaches `ratio`,
    /// biggest first.
    ///
    /// The tree is searched breadth first from the top nodes. Nodes that reach the
    /// ratio are collected without descending further; other merged nodes
    /// above level 1 pass the search on to their merged children. `k = 0` is
    /// treated as 1.
    ///
    /// # Errors
    ///
    /// * If the tree is not empty and no ROI was set.
    pub fn best_clusters_fitting_roi(&self, ratio: f64, k: usize) -> Result<Vec<usize>, TreeError> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        if self.roi.is_none() {
            return Err(TreeError::RoiNotSet);
        }
        let k = k.max(1);

        let mut candidates = Vec::new();
        let mut queue = VecDeque::from(self.tops());
        while let Some(n) = queue.pop_front() {
            if self.ratio(n)? >= ratio {
                candidates.push(n);
            } else if self.nodes[n].level > 1 {
                if let Some((c1, c2)) = self.nodes[n].children {
                    queue.extend([c1, c2].into_iter().filter(|&c| self.nodes[c].level > 0));
                }
            }
        }

        candidates.sort_by_key(|&n| Reverse(self.nodes[n].leaves.len()));
        candidates.truncate(k);
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::approx_eq;

    use crate::{Color, HierarchicalTree, TreeError};

    /// Eight leaves merged into an unbalanced tree:
    ///
    /// ```text
    ///              14
    ///          /        \
    ///        12          13
    ///       /  \        /  \
    ///      10   11     9    7
    ///     /  \   |\   / \
    ///    8    2  3 4 5   6
    ///   / \
    ///  0   1
    /// ```
    fn tree() -> HierarchicalTree {
        let mut tree = HierarchicalTree::new();
        for _ in 0..8 {
            tree.add_leaf();
        }
        for (c1, c2) in [(0, 1), (5, 6), (8, 2), (3, 4), (10, 11), (9, 7), (12, 13)] {
            tree.add_cluster(c1, c2, 0.).unwrap_or_else(|e| unreachable!("{e}"));
        }
        tree
    }

    #[test]
    fn biggest_clusters() {
        let tree = tree();
        assert_eq!(tree.size(14), Ok(8));
        assert_eq!(tree.find_x_biggest_clusters(14, 0), Ok(vec![]));
        assert_eq!(tree.find_x_biggest_clusters(14, 1), Ok(vec![14]));
        // 12 (5 leaves) splits into 10 (3) and 11 (2), both bigger than 1.
        assert_eq!(tree.find_x_biggest_clusters(14, 2), Ok(vec![12, 13]));
        assert_eq!(tree.find_x_biggest_clusters(14, 3), Ok(vec![10, 13, 11]));
        assert_eq!(tree.find_x_biggest_clusters(13, 10).map(|s| s.len()), Ok(3));
        assert_eq!(tree.find_x_biggest_clusters(3, 2), Ok(vec![3]));
        assert_eq!(tree.find_x_biggest_clusters(15, 2), Err(TreeError::InvalidCluster(15)));
    }

    #[test]
    fn biggest_clusters_splitting_both_children() {
        let tree = tree();
        assert_eq!(tree.find_x_biggest_clusters2(14, 3), Ok(vec![10, 13, 11]));
        assert_eq!(tree.find_x_biggest_clusters2(14, 1), Ok(vec![14]));
    }

    #[test]
    fn levels_from_top() {
        let tree = tree();
        assert_eq!(tree.max_level(), 4);
        assert_eq!(tree.down_x_levels_from_top(0, false), vec![14]);
        assert_eq!(tree.down_x_levels_from_top(1, false), vec![12, 13]);
        assert_eq!(tree.down_x_levels_from_top(2, false), vec![10, 11, 9, 7]);
        assert_eq!(tree.down_x_levels_from_top(2, true), vec![10, 11, 9]);
        // Past the top counts as max_level - 1, where the leaf 7 drops out.
        assert_eq!(tree.down_x_levels_from_top(9, false), vec![8, 2, 3, 4, 5, 6]);
        assert!(HierarchicalTree::new().down_x_levels_from_top(1, false).is_empty());
    }

    #[test]
    fn sub_levels() {
        let tree = tree();
        assert_eq!(tree.select_sub_levels(14, 2, 1), Ok(vec![10, 11, 9, 7]));
        assert_eq!(tree.select_sub_levels(14, 2, 3), Ok(vec![10]));
        assert_eq!(tree.select_sub_levels(13, 2, 1), Ok(vec![7, 5, 6]));
        assert_eq!(tree.select_sub_levels(14, 0, 1), Ok(vec![14]));
    }

    #[test]
    fn painting() {
        let mut tree = tree();
        tree.paint_selection(&[10, 13]).unwrap_or_else(|e| unreachable!("{e}"));
        assert_eq!(tree.color(0), Ok(Color::nth_hsv(0)));
        assert_eq!(tree.color(6), Ok(Color::nth_hsv(1)));
        assert_eq!(tree.color(3), Ok(Color::GREY));
        assert_eq!(tree.color(14), Ok(Color::GREY));

        assert_eq!(tree.paint_selection(&[20]), Err(TreeError::InvalidCluster(20)));
        assert_eq!(tree.color(0), Ok(Color::nth_hsv(0)));
    }

    #[test]
    fn roi() {
        let mut tree = tree();
        assert_eq!(tree.best_clusters_fitting_roi(0.5, 1), Err(TreeError::RoiNotSet));
        assert_eq!(tree.set_roi_bitfield(vec![true; 3]), Err(TreeError::RoiLength(8, 3)));

        // Leaves 0..3 and 5 are inside.
        let bits = vec![true, true, true, false, false, true, false, false];
        tree.set_roi_bitfield(bits).unwrap_or_else(|e| unreachable!("{e}"));
        assert!(approx_eq!(f64, tree.ratio(14).unwrap_or_default(), 0.5));
        assert!(approx_eq!(f64, tree.ratio(10).unwrap_or_default(), 1.));

        assert_eq!(tree.best_clusters_fitting_roi(0.5, 2), Ok(vec![14]));
        // 14, 12 and 13 fall short; below them only 10 is dense enough.
        assert_eq!(tree.best_clusters_fitting_roi(0.9, 0), Ok(vec![10]));
        assert_eq!(tree.best_clusters_fitting_roi(0.55, 5), Ok(vec![12]));

        // Leaves 0..3, 5 and 6 are inside.
        let bits = vec![true, true, true, false, false, true, true, false];
        tree.set_roi_bitfield(bits).unwrap_or_else(|e| unreachable!("{e}"));
        assert_eq!(tree.best_clusters_fitting_roi(0.7, 5), Ok(vec![10, 9]));
        assert_eq!(tree.best_clusters_fitting_roi(0.7, 1), Ok(vec![10]));

        assert_eq!(HierarchicalTree::new().best_clusters_fitting_roi(0.5, 1), Ok(vec![]));
    }

    #[test]
    fn selections_cover_every_top() {
        // Two trees side by side: 4 over (0, 1) and 5 over (2, 3).
        let mut forest = HierarchicalTree::new();
        for _ in 0..4 {
            forest.add_leaf();
        }
        forest.add_cluster(0, 1, 0.).unwrap_or_else(|e| unreachable!("{e}"));
        forest.add_cluster(2, 3, 0.).unwrap_or_else(|e| unreachable!("{e}"));

        assert_eq!(forest.tops(), vec![4, 5]);
        assert_eq!(forest.down_x_levels_from_top(0, false), vec![4, 5]);
        assert_eq!(forest.down_x_levels_from_top(1, false), vec![0, 1, 2, 3]);

        forest.set_roi_bitfield(vec![true, true, false, true]).unwrap_or_else(|e| unreachable!("{e}"));
        assert_eq!(forest.best_clusters_fitting_roi(0.5, 2), Ok(vec![4, 5]));
        assert_eq!(forest.best_clusters_fitting_roi(1., 2), Ok(vec![4]));
    }
}
