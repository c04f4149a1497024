use std::io::BufReader;

use tract_clam::{utils as synthetic, ClusteringCriteria, DetTractClustering, HierarchicalTree, TreeError};

mod utils;

fn sorted(leaves: &[usize]) -> Vec<usize> {
    let mut leaves = leaves.to_vec();
    leaves.sort_unstable();
    leaves
}

#[test]
fn three_leaves_two_merges() {
    let mut tree = HierarchicalTree::new();
    for _ in 0..3 {
        tree.add_leaf();
    }
    assert_eq!(tree.add_cluster(0, 1, 0.5), Ok(3));
    assert_eq!(tree.add_cluster(2, 3, 0.7), Ok(4));

    assert_eq!(tree.level(3), Ok(1));
    assert_eq!(tree.leaves_for_cluster(3).map(sorted), Ok(vec![0, 1]));
    assert_eq!(tree.level(4), Ok(2));
    assert_eq!(tree.leaves_for_cluster(4).map(sorted), Ok(vec![0, 1, 2]));
    assert_eq!(tree.parent(3), Ok(4));
    assert_eq!(tree.parent(4), Ok(4));
    assert_eq!(tree.root(), Some(4));
}

#[test]
fn leaves_come_first() {
    let mut tree = HierarchicalTree::new();
    assert_eq!(tree.add_leaf(), Some(0));
    assert_eq!(tree.add_leaf(), Some(1));
    assert_eq!(tree.add_cluster(0, 1, 1.), Ok(2));

    assert_eq!(tree.add_leaf(), None);
    assert_eq!(tree.leaf_count(), 2);
    assert_eq!(tree.cluster_count(), 3);
}

#[test]
fn ids_levels_and_leaves_of_a_clustering_run() {
    let (fibers, _) = synthetic::bundles(3, 5, 10, 1., 17);
    let clustering = DetTractClustering::new(ClusteringCriteria::new().with_min_cluster_size(1)).cluster(&fibers);
    let tree = HierarchicalTree::from_merges(fibers.len(), clustering.merges()).unwrap_or_else(|e| unreachable!("{e}"));

    let leaf_count = fibers.len();
    assert_eq!(tree.leaf_count(), leaf_count);
    // The three bundles never merge, so two extra nodes join them.
    assert_eq!(tree.cluster_count(), leaf_count + clustering.merges().len() + 2);

    for id in 0..leaf_count {
        assert_eq!(tree.is_leaf(id), Ok(true));
        assert_eq!(tree.level(id), Ok(0));
    }
    for id in leaf_count..tree.cluster_count() {
        let (c1, c2) = tree
            .children(id)
            .ok()
            .flatten()
            .unwrap_or_else(|| unreachable!("{id} is a merged node"));
        assert!(c1 < id && c2 < id);

        let level = tree.level(c1).unwrap_or_default().max(tree.level(c2).unwrap_or_default()) + 1;
        assert_eq!(tree.level(id), Ok(level));

        let size = tree.size(c1).unwrap_or_default() + tree.size(c2).unwrap_or_default();
        assert_eq!(tree.size(id), Ok(size));

        let mut union = tree.leaves_for_cluster(c1).map(<[usize]>::to_vec).unwrap_or_default();
        union.extend_from_slice(tree.leaves_for_cluster(c2).unwrap_or_default());
        assert_eq!(tree.leaves_for_cluster(id).map(sorted), Ok(sorted(&union)));
    }

    let root = tree.root().unwrap_or_else(|| unreachable!("the tree has nodes"));
    assert_eq!(tree.tops(), vec![root]);
    assert_eq!(tree.size(root), Ok(leaf_count));

    let bundles = tree.find_x_biggest_clusters(root, 3).unwrap_or_else(|e| unreachable!("{e}"));
    assert_eq!(bundles.len(), 3);
    for bundle in bundles {
        assert_eq!(tree.size(bundle), Ok(5));
        assert!(tree.custom_data(bundle).unwrap_or(f32::MAX) < f32::MAX);
        let bits = tree.output_bitfield(bundle).unwrap_or_else(|e| unreachable!("{e}"));
        assert_eq!(bits.iter().filter(|&&b| b).count(), 5);
    }
}

#[test]
fn root_of_a_run_covers_every_fiber() {
    let (fibers, _) = synthetic::bundles(2, 5, 10, 1., 3);
    let clustering = DetTractClustering::new(ClusteringCriteria::new().with_min_cluster_size(1)).cluster(&fibers);
    assert_eq!(clustering.len(), 2);

    let tree = HierarchicalTree::from_merges(fibers.len(), clustering.merges()).unwrap_or_else(|e| unreachable!("{e}"));
    let root = tree.root().unwrap_or_else(|| unreachable!("the tree has nodes"));
    assert_eq!(tree.size(root), Ok(fibers.len()));
    assert_eq!(tree.custom_data(root), Ok(f32::MAX));

    let top = tree.down_x_levels_from_top(1, false);
    assert_eq!(top.len(), 2);
    assert!(top.iter().all(|&id| tree.size(id) == Ok(5)));
    assert_eq!(tree.find_x_biggest_clusters(root, 2).map(|s| s.len()), Ok(2));
}

#[test]
fn invalid_ids() {
    let mut tree = HierarchicalTree::new();
    tree.add_leaf();
    assert_eq!(tree.parent(1), Err(TreeError::InvalidCluster(1)));
    assert_eq!(tree.find_x_biggest_clusters(3, 1), Err(TreeError::InvalidCluster(3)));
    assert_eq!(tree.output_bitfield_for(&[0, 2]), Err(TreeError::InvalidCluster(2)));
    assert_eq!(tree.add_cluster(0, 0, 0.), Err(TreeError::InvalidMerge(0, 0)));
}

#[test]
fn text_file_round_trip() {
    utils::init_logging();
    let mut tree = HierarchicalTree::new();
    for _ in 0..4 {
        tree.add_leaf();
    }
    for (c1, c2, d) in [(0, 1, 0.5), (3, 2, 1.25), (4, 5, 2.)] {
        tree.add_cluster(c1, c2, d).unwrap_or_else(|e| unreachable!("{e}"));
    }

    let dir = tempdir::TempDir::new("tract-clam").unwrap_or_else(|e| unreachable!("{e}"));
    let path = dir.path().join("dendrogram.txt");
    let file = std::fs::File::create(&path).unwrap_or_else(|e| unreachable!("{e}"));
    tree.write_ascii(file).unwrap_or_else(|e| unreachable!("{e}"));

    let file = std::fs::File::open(&path).unwrap_or_else(|e| unreachable!("{e}"));
    let reread = HierarchicalTree::from_ascii(BufReader::new(file)).unwrap_or_else(|e| unreachable!("{e}"));
    assert_eq!(reread, tree);
    assert_eq!(reread.leaves_for_cluster(5), Ok([3, 2].as_slice()));
}

#[test]
fn binary_round_trip() {
    let mut tree = HierarchicalTree::new();
    for _ in 0..3 {
        tree.add_leaf();
    }
    tree.add_cluster(1, 2, 0.1).unwrap_or_else(|e| unreachable!("{e}"));
    tree.set_roi_bitfield(vec![false, true, true]).unwrap_or_else(|e| unreachable!("{e}"));

    let bytes = bincode::serialize(&tree).unwrap_or_else(|e| unreachable!("{e}"));
    let decoded: HierarchicalTree = bincode::deserialize(&bytes).unwrap_or_else(|e| unreachable!("{e}"));
    assert_eq!(decoded, tree);
    assert_eq!(decoded.best_clusters_fitting_roi(1., 1), Ok(vec![3]));
}
