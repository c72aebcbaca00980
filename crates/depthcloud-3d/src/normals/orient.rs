use rayon::prelude::*;
use std::collections::VecDeque;

use super::NormalsError;
use crate::ops::{dot, negate};
use crate::union_find::UnionFind;

/// Summary of a normal orientation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrientationStats {
    /// Number of connected components of the neighbourhood graph.
    pub components: usize,
    /// Number of normals whose sign was flipped.
    pub flipped: usize,
}

// Undirected edge of the neighbourhood graph, `a < b`.
struct Edge {
    a: usize,
    b: usize,
    weight: f64,
}

// Spanning forest stored as compressed adjacency lists.
struct Forest {
    offsets: Vec<usize>,
    targets: Vec<usize>,
}

impl Forest {
    fn from_edges(num_nodes: usize, edges: &[(usize, usize)]) -> Self {
        let mut offsets = vec![0; num_nodes + 1];
        for &(a, b) in edges {
            offsets[a + 1] += 1;
            offsets[b + 1] += 1;
        }
        for i in 0..num_nodes {
            offsets[i + 1] += offsets[i];
        }

        let mut cursor = offsets.clone();
        let mut targets = vec![0; offsets[num_nodes]];
        for &(a, b) in edges {
            targets[cursor[a]] = b;
            cursor[a] += 1;
            targets[cursor[b]] = a;
            cursor[b] += 1;
        }

        Self { offsets, targets }
    }

    fn neighbors(&self, node: usize) -> &[usize] {
        &self.targets[self.offsets[node]..self.offsets[node + 1]]
    }
}

/// Make the signs of neighbouring normals agree.
///
/// Builds a graph linking every point to the neighbours it was estimated with,
/// weighted by `1 - |n_i · n_j|` so that nearly parallel normals are joined
/// first, and extracts a minimum spanning forest. Normals are then propagated
/// breadth-first from the lowest-index point of every component: that root is
/// first turned toward a camera at the origin, then each child is flipped when
/// it disagrees with its parent.
///
/// The traversal order only depends on the inputs, so the result is
/// deterministic.
///
/// # Arguments
///
/// * `points` - The point positions.
/// * `normals` - The unit normals to orient, in place.
/// * `neighborhoods` - Per point, the indices of its neighbours.
///
/// # Errors
///
/// [`NormalsError::LengthMismatch`] if `normals` or `neighborhoods` are not
/// aligned with `points`.
pub fn orient_normals_consistent(
    points: &[[f64; 3]],
    normals: &mut [[f64; 3]],
    neighborhoods: &[Vec<usize>],
) -> Result<OrientationStats, NormalsError> {
    let num_points = points.len();
    for actual in [normals.len(), neighborhoods.len()] {
        if actual != num_points {
            return Err(NormalsError::LengthMismatch {
                expected: num_points,
                actual,
            });
        }
    }

    // Riemannian graph over the estimation neighbourhoods
    let mut pairs = neighborhoods
        .iter()
        .enumerate()
        .flat_map(|(i, neighbors)| {
            neighbors
                .iter()
                .filter(move |&&j| j != i && j < num_points)
                .map(move |&j| (i.min(j), i.max(j)))
        })
        .collect::<Vec<_>>();
    pairs.sort_unstable();
    pairs.dedup();

    let mut edges = pairs
        .into_iter()
        .map(|(a, b)| Edge {
            a,
            b,
            weight: 1.0 - dot(&normals[a], &normals[b]).abs(),
        })
        .collect::<Vec<_>>();
    edges.sort_by(|x, y| {
        x.weight
            .total_cmp(&y.weight)
            .then(x.a.cmp(&y.a))
            .then(x.b.cmp(&y.b))
    });

    // Kruskal
    let mut uf = UnionFind::new(num_points);
    let tree_edges = edges
        .iter()
        .filter(|e| uf.union(e.a, e.b))
        .map(|e| (e.a, e.b))
        .collect::<Vec<_>>();
    let forest = Forest::from_edges(num_points, &tree_edges);

    let mut stats = OrientationStats::default();
    let mut visited = vec![false; num_points];
    let mut queue = VecDeque::new();

    for root in 0..num_points {
        if visited[root] {
            continue;
        }
        stats.components += 1;
        visited[root] = true;

        // the camera sits at the origin
        if dot(&normals[root], &points[root]) > 0.0 {
            normals[root] = negate(&normals[root]);
            stats.flipped += 1;
        }

        queue.push_back(root);
        while let Some(parent) = queue.pop_front() {
            for &child in forest.neighbors(parent) {
                if visited[child] {
                    continue;
                }
                visited[child] = true;
                if dot(&normals[parent], &normals[child]) < 0.0 {
                    normals[child] = negate(&normals[child]);
                    stats.flipped += 1;
                }
                queue.push_back(child);
            }
        }
    }

    log::debug!(
        "oriented {} normals over {} components, {} flipped",
        num_points,
        stats.components,
        stats.flipped
    );

    Ok(stats)
}

/// Flip every normal that points away from `camera_location`.
///
/// Returns the number of flipped normals.
///
/// # Errors
///
/// [`NormalsError::LengthMismatch`] if `normals` is not aligned with `points`.
pub fn orient_normals_towards_camera(
    points: &[[f64; 3]],
    normals: &mut [[f64; 3]],
    camera_location: &[f64; 3],
) -> Result<usize, NormalsError> {
    if normals.len() != points.len() {
        return Err(NormalsError::LengthMismatch {
            expected: points.len(),
            actual: normals.len(),
        });
    }

    let flipped = normals
        .par_iter_mut()
        .zip(points.par_iter())
        .map(|(n, p)| {
            let to_camera = [
                camera_location[0] - p[0],
                camera_location[1] - p[1],
                camera_location[2] - p[2],
            ];
            if dot(n, &to_camera) < 0.0 {
                *n = negate(n);
                1
            } else {
                0
            }
        })
        .sum::<usize>();

    Ok(flipped)
}
