use std::num::NonZero;

use kiddo::{immutable::float::kdtree::ImmutableKdTree, NearestNeighbour, SquaredEuclidean};

/// A neighbour returned by a spatial query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Index of the point in the indexed point set.
    pub index: usize,
    /// Euclidean distance to the query.
    pub distance: f64,
}

impl From<NearestNeighbour<f64, u64>> for Neighbor {
    fn from(nn: NearestNeighbour<f64, u64>) -> Self {
        // kiddo reports squared distances
        Self {
            index: nn.item as usize,
            distance: nn.distance.sqrt(),
        }
    }
}

/// A 3D kd-tree over a fixed set of points.
///
/// Wraps a [`kiddo`] immutable tree. The tree cannot be modified after
/// construction and can be shared between threads for concurrent queries.
pub struct KdTree {
    points: Vec<[f64; 3]>,
    tree: ImmutableKdTree<f64, u64, 3, 32>,
}

impl KdTree {
    /// Build a kd-tree over `points`. Query results refer to indices into this slice.
    pub fn new(points: &[[f64; 3]]) -> Self {
        Self {
            points: points.to_vec(),
            tree: ImmutableKdTree::new_from_slice(points),
        }
    }

    /// Number of indexed points.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the tree indexes no points.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The indexed points.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// Find the `k` nearest neighbours of `query`, sorted by ascending distance.
    ///
    /// Returns fewer than `k` neighbours only when the tree holds fewer points.
    pub fn knn(&self, query: &[f64; 3], k: usize) -> Vec<Neighbor> {
        let Some(k) = NonZero::new(k.min(self.len())) else {
            return Vec::new();
        };
        self.tree
            .nearest_n::<SquaredEuclidean>(query, k)
            .into_iter()
            .map(Neighbor::from)
            .collect()
    }

    /// Find every point within `radius` of `query`, sorted by ascending distance.
    pub fn radius_search(&self, query: &[f64; 3], radius: f64) -> Vec<Neighbor> {
        if self.is_empty() || radius.is_nan() || radius < 0.0 {
            return Vec::new();
        }
        self.tree
            .within::<SquaredEuclidean>(query, radius * radius)
            .into_iter()
            .map(Neighbor::from)
            .collect()
    }

    /// Find up to `max_neighbors` nearest points within `radius` of `query`,
    /// sorted by ascending distance.
    pub fn hybrid_search(
        &self,
        query: &[f64; 3],
        radius: f64,
        max_neighbors: usize,
    ) -> Vec<Neighbor> {
        let Some(max_neighbors) = NonZero::new(max_neighbors.min(self.len())) else {
            return Vec::new();
        };
        if radius.is_nan() || radius < 0.0 {
            return Vec::new();
        }
        self.tree
            .nearest_n_within::<SquaredEuclidean>(query, radius * radius, max_neighbors, true)
            .into_iter()
            .map(Neighbor::from)
            .collect()
    }
}

/// A kd-tree restricted to a subset of the points it was built over.
///
/// Lets a tree built once over a cloud serve queries for a cloud derived from
/// it by index selection (for instance the inliers of an outlier filter).
/// Query results are expressed in the index space of the subset.
pub struct SubsetIndex<'a> {
    tree: &'a KdTree,
    // tree index -> subset index
    remap: Option<Vec<Option<usize>>>,
    len: usize,
}

impl<'a> SubsetIndex<'a> {
    /// View of the whole tree.
    pub fn full(tree: &'a KdTree) -> Self {
        Self {
            tree,
            remap: None,
            len: tree.len(),
        }
    }

    /// View of the tree restricted to `selected`, where `selected[j]` is the
    /// tree index of subset point `j`.
    ///
    /// PRECONDITION: every index is smaller than [`KdTree::len`] and appears once.
    pub fn new(tree: &'a KdTree, selected: &[usize]) -> Self {
        let mut remap = vec![None; tree.len()];
        for (j, &i) in selected.iter().enumerate() {
            remap[i] = Some(j);
        }
        Self {
            tree,
            remap: Some(remap),
            len: selected.len(),
        }
    }

    /// Number of points in the subset.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the subset is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Up to `max_neighbors` nearest subset points within `radius` of `query`.
    pub fn hybrid_search(
        &self,
        query: &[f64; 3],
        radius: f64,
        max_neighbors: usize,
    ) -> Vec<Neighbor> {
        let Some(remap) = &self.remap else {
            return self.tree.hybrid_search(query, radius, max_neighbors);
        };

        // widen the bounded search until enough subset points survive or the
        // ball is exhausted
        let mut cap = max_neighbors;
        loop {
            let found = self.tree.hybrid_search(query, radius, cap);
            let exhausted = found.len() < cap || cap >= self.tree.len();
            let kept = found
                .into_iter()
                .filter_map(|n| {
                    remap[n.index].map(|index| Neighbor {
                        index,
                        distance: n.distance,
                    })
                })
                .take(max_neighbors)
                .collect::<Vec<_>>();
            if kept.len() == max_neighbors || exhausted {
                return kept;
            }
            cap = cap.saturating_mul(2);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::euclidean_distance;

    fn grid_points(n: usize) -> Vec<[f64; 3]> {
        let mut points = Vec::new();
        for i in 0..n {
            for j in 0..n {
                for k in 0..n {
                    points.push([i as f64, j as f64 * 0.5, k as f64 * 0.25]);
                }
            }
        }
        points
    }

    fn brute_force_knn(points: &[[f64; 3]], query: &[f64; 3], k: usize) -> Vec<f64> {
        let mut d: Vec<f64> = points
            .iter()
            .map(|p| euclidean_distance(p, query))
            .collect();
        d.sort_by(|a, b| a.total_cmp(b));
        d.truncate(k);
        d
    }

    #[test]
    fn test_knn() {
        let points = vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ];
        let tree = KdTree::new(&points);

        let knn = tree.knn(&[0.0, 0.0, 0.0], 1);
        assert_eq!(
            knn,
            vec![Neighbor {
                index: 0,
                distance: 0.0
            }]
        );

        let knn = tree.knn(&[0.9, 0.0, 0.0], 2);
        assert_eq!(knn[0].index, 1);
        assert_eq!(knn[1].index, 0);
    }

    #[test]
    fn test_knn_matches_brute_force() {
        let points = grid_points(6);
        let tree = KdTree::new(&points);
        for query in [[2.3, 1.1, 0.4], [-1.0, 0.0, 0.0], [5.0, 2.5, 1.25]] {
            let knn: Vec<f64> = tree.knn(&query, 7).iter().map(|n| n.distance).collect();
            let expected = brute_force_knn(&points, &query, 7);
            assert_eq!(knn.len(), 7);
            for (a, b) in knn.iter().zip(expected.iter()) {
                assert!((a - b).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_knn_more_than_len() {
        let points = vec![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]];
        let tree = KdTree::new(&points);
        assert_eq!(tree.knn(&[0.0, 0.0, 0.0], 5).len(), 2);
        assert!(tree.knn(&[0.0, 0.0, 0.0], 0).is_empty());
    }

    #[test]
    fn test_empty_tree() {
        let tree = KdTree::new(&[]);
        assert!(tree.is_empty());
        assert!(tree.knn(&[0.0, 0.0, 0.0], 3).is_empty());
        assert!(tree.radius_search(&[0.0, 0.0, 0.0], 1.0).is_empty());
        assert!(tree.hybrid_search(&[0.0, 0.0, 0.0], 1.0, 3).is_empty());
    }

    #[test]
    fn test_radius_search() {
        let points = grid_points(5);
        let tree = KdTree::new(&points);
        let query = [2.0, 1.0, 0.5];
        let found = tree.radius_search(&query, 0.6);
        let expected = points
            .iter()
            .filter(|p| euclidean_distance(p, &query) <= 0.6)
            .count();
        assert_eq!(found.len(), expected);
        assert!(found.windows(2).all(|w| w[0].distance <= w[1].distance));
        assert_eq!(found[0].distance, 0.0);
    }

    #[test]
    fn test_hybrid_search() {
        let points = grid_points(5);
        let tree = KdTree::new(&points);
        let query = [2.0, 1.0, 0.5];
        let all = tree.radius_search(&query, 1.0);
        let capped = tree.hybrid_search(&query, 1.0, 4);
        assert_eq!(capped.len(), 4);
        for (a, b) in capped.iter().zip(all.iter()) {
            assert!((a.distance - b.distance).abs() < 1e-12);
        }
        assert!(capped.iter().all(|n| n.distance <= 1.0));
        assert!(tree.hybrid_search(&[100.0, 0.0, 0.0], 1.0, 4).is_empty());
    }

    #[test]
    fn test_duplicate_points() {
        let points = vec![[1.0, 1.0, 1.0]; 50];
        let tree = KdTree::new(&points);
        let knn = tree.knn(&[1.0, 1.0, 1.0], 10);
        assert_eq!(knn.len(), 10);
        assert!(knn.iter().all(|n| n.distance == 0.0));
        assert_eq!(tree.radius_search(&[1.0, 1.0, 1.0], 0.0).len(), 50);
    }

    #[test]
    fn test_flat_and_coincident_points() {
        // a depth frame of a wall: every point shares z
        let mut points = Vec::new();
        for i in 0..100 {
            for j in 0..100 {
                points.push([i as f64 * 0.01, j as f64 * 0.01, 2.0]);
            }
        }
        points.extend(vec![[0.5, 0.5, 2.0]; 500]);
        let tree = KdTree::new(&points);
        assert_eq!(tree.len(), 10_500);

        let found = tree.hybrid_search(&[0.2, 0.2, 2.0], 0.025, 30);
        assert_eq!(found.len(), 21);
        assert!(found.windows(2).all(|w| w[0].distance <= w[1].distance));

        let found = tree.hybrid_search(&[0.5, 0.5, 2.0], 0.1, 30);
        assert_eq!(found.len(), 30);
        assert!(found.iter().all(|n| n.distance == 0.0));
    }

    #[test]
    fn test_subset_index() {
        let points = vec![
            [0.0, 0.0, 0.0],
            [0.1, 0.0, 0.0],
            [0.2, 0.0, 0.0],
            [0.3, 0.0, 0.0],
        ];
        let tree = KdTree::new(&points);

        // keep points 1 and 3 only; they become subset indices 0 and 1
        let subset = SubsetIndex::new(&tree, &[1, 3]);
        assert_eq!(subset.len(), 2);
        let found = subset.hybrid_search(&[0.0, 0.0, 0.0], 1.0, 10);
        let indices: Vec<usize> = found.iter().map(|n| n.index).collect();
        assert_eq!(indices, vec![0, 1]);

        let full = SubsetIndex::full(&tree);
        assert_eq!(full.hybrid_search(&[0.0, 0.0, 0.0], 1.0, 10).len(), 4);
    }

    #[test]
    fn test_subset_index_skips_excluded_nearest() {
        // the nearest points to the query are excluded from the subset
        let points = (0..40)
            .map(|i| [i as f64 * 0.01, 0.0, 1.0])
            .collect::<Vec<_>>();
        let tree = KdTree::new(&points);
        let selected = (20..40).collect::<Vec<_>>();
        let subset = SubsetIndex::new(&tree, &selected);

        let found = subset.hybrid_search(&[0.0, 0.0, 1.0], 1.0, 5);
        let indices: Vec<usize> = found.iter().map(|n| n.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert!((found[0].distance - 0.2).abs() < 1e-12);

        // nothing of the subset inside the ball
        assert!(subset.hybrid_search(&[0.0, 0.0, 1.0], 0.1, 5).is_empty());
    }
}
