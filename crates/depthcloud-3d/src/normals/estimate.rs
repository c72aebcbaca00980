use rayon::prelude::*;

use super::{NormalEstimation, NormalSearchParams, NormalsError, MIN_NEIGHBORHOOD_SIZE};
use crate::kdtree::{KdTree, SubsetIndex};
use crate::ops::{centroid_and_covariance, negate, normalize};
use crate::pointcloud::PointCloud;

// Ratio of the middle to the largest eigenvalue below which a neighbourhood is a line.
const COLLINEAR_RATIO: f64 = 1e-8;

/// Estimate a surface normal for every point of the cloud.
///
/// Builds a kd-tree over the cloud and calls [`estimate_normals_with_index`].
pub fn estimate_normals(
    cloud: &PointCloud,
    params: &NormalSearchParams,
) -> Result<NormalEstimation, NormalsError> {
    params.validate()?;
    let tree = KdTree::new(cloud.points());
    estimate_normals_with_index(cloud, &SubsetIndex::full(&tree), params)
}

/// Estimate normals using a spatial index over the cloud's points.
///
/// Each point's neighbourhood is the hybrid search of `params`. The normal is
/// the eigenvector of the neighbourhood covariance with the smallest
/// eigenvalue, so its sign is arbitrary; see
/// [`orient_normals_consistent`](super::orient_normals_consistent).
///
/// Every point keeps its place in the output. A point whose neighbourhood has
/// fewer than [`MIN_NEIGHBORHOOD_SIZE`] points, or is collinear or coincident,
/// takes the normal of the nearest point of its neighbourhood that has one, or
/// else the unit direction toward a camera at the origin. The neighbourhood of such a point
/// only lists the neighbour its normal was taken from, and no other
/// neighbourhood lists it, so orientation attaches it as a leaf.
///
/// # Errors
///
/// * [`NormalsError::InvalidParameter`] for an invalid search radius or neighbour cap.
/// * [`NormalsError::IndexMismatch`] if `index` does not cover exactly the cloud's points.
pub fn estimate_normals_with_index(
    cloud: &PointCloud,
    index: &SubsetIndex,
    params: &NormalSearchParams,
) -> Result<NormalEstimation, NormalsError> {
    params.validate()?;
    if index.len() != cloud.len() {
        return Err(NormalsError::IndexMismatch {
            index_len: index.len(),
            num_points: cloud.len(),
        });
    }
    if cloud.is_empty() {
        return Ok(NormalEstimation::Unavailable(cloud.clone()));
    }

    let points = cloud.points();
    let estimates = points
        .par_iter()
        .map(|p| {
            let neighborhood = index
                .hybrid_search(p, params.radius, params.max_neighbors)
                .into_iter()
                .map(|n| n.index)
                .collect::<Vec<_>>();
            let normal = if neighborhood.len() < MIN_NEIGHBORHOOD_SIZE {
                None
            } else {
                pca_normal(points, &neighborhood)
            };
            (normal, neighborhood)
        })
        .collect::<Vec<_>>();

    let estimated = estimates.iter().filter(|(n, _)| n.is_some()).count();
    if estimated == 0 {
        log::warn!(
            "no reliable normal for any of {} points (radius {}, max {} neighbours)",
            cloud.len(),
            params.radius,
            params.max_neighbors
        );
        return Ok(NormalEstimation::Unavailable(cloud.clone()));
    }

    let (normals, neighborhoods): (Vec<_>, Vec<_>) = estimates
        .par_iter()
        .enumerate()
        .map(|(i, (normal, neighborhood))| match normal {
            Some(normal) => {
                let linked = neighborhood
                    .iter()
                    .copied()
                    .filter(|&j| estimates[j].0.is_some())
                    .collect::<Vec<_>>();
                (*normal, linked)
            }
            // neighbourhoods are sorted by distance
            None => match neighborhood
                .iter()
                .find_map(|&j| estimates[j].0.map(|n| (n, j)))
            {
                Some((borrowed, j)) => (borrowed, vec![j]),
                None => (toward_camera(&points[i]), Vec::new()),
            },
        })
        .unzip();

    let fallback = cloud.len() - estimated;
    if fallback > 0 {
        log::debug!(
            "{} of {} points have no reliable neighbourhood; normals borrowed",
            fallback,
            cloud.len()
        );
    }

    let (points, colors, _) = cloud.clone().into_parts();
    Ok(NormalEstimation::Estimated {
        cloud: PointCloud::from_aligned(points, colors, Some(normals)),
        neighborhoods,
        fallback,
    })
}

// Unit direction from `point` to the origin.
fn toward_camera(point: &[f64; 3]) -> [f64; 3] {
    normalize(&negate(point)).unwrap_or([0.0, 0.0, -1.0])
}

/// Normal of the plane best fitting the selected points.
///
/// Returns `None` when the points are coincident or collinear.
pub fn pca_normal(points: &[[f64; 3]], indices: &[usize]) -> Option<[f64; 3]> {
    let (_, cov) = centroid_and_covariance(points, indices)?;

    // the covariance is symmetric positive semi-definite: its right singular
    // vectors are its eigenvectors
    let mat = faer::Mat::<f64>::from_fn(3, 3, |i, j| cov[i][j]);
    let svd = mat.svd();
    let v = svd.v();

    let mut eigen = (0..3)
        .map(|j| {
            let vec = [v.read(0, j), v.read(1, j), v.read(2, j)];
            let mut value = 0.0;
            for r in 0..3 {
                for c in 0..3 {
                    value += vec[r] * cov[r][c] * vec[c];
                }
            }
            (value, vec)
        })
        .collect::<Vec<_>>();
    eigen.sort_by(|a, b| a.0.total_cmp(&b.0));

    let (lambda_min, normal) = eigen[0];
    let lambda_mid = eigen[1].0;
    let lambda_max = eigen[2].0;

    if !(lambda_max > 0.0 && lambda_max.is_finite() && lambda_min.is_finite()) {
        return None;
    }
    if lambda_mid <= COLLINEAR_RATIO * lambda_max {
        return None;
    }

    normalize(&normal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{dot, norm};
    use approx::assert_relative_eq;

    fn tilted_plane(n: usize, spacing: f64) -> (PointCloud, [f64; 3]) {
        // z = 2 + 0.3 x - 0.2 y
        let mut points = Vec::new();
        for i in 0..n {
            for j in 0..n {
                let x = i as f64 * spacing;
                let y = j as f64 * spacing;
                points.push([x, y, 2.0 + 0.3 * x - 0.2 * y]);
            }
        }
        let colors = vec![[0.5; 3]; points.len()];
        let normal = normalize(&[-0.3, 0.2, 1.0]).unwrap();
        (PointCloud::new(points, colors, None).unwrap(), normal)
    }

    #[test]
    fn test_pca_normal() {
        let points = [
            [0.0, 0.0, 1.0],
            [1.0, 0.0, 1.0],
            [0.0, 1.0, 1.0],
            [1.0, 1.0, 1.0],
        ];
        let n = pca_normal(&points, &[0, 1, 2, 3]).unwrap();
        assert_relative_eq!(n[2].abs(), 1.0, epsilon = 1e-12);

        let line = [[0.0, 0.0, 0.0], [1.0, 1.0, 1.0], [2.0, 2.0, 2.0]];
        assert!(pca_normal(&line, &[0, 1, 2]).is_none());

        let same = [[1.0, 2.0, 3.0]; 4];
        assert!(pca_normal(&same, &[0, 1, 2, 3]).is_none());
    }

    #[test]
    fn test_plane_normals() -> Result<(), NormalsError> {
        let (cloud, expected) = tilted_plane(15, 0.05);
        let res = estimate_normals(&cloud, &NormalSearchParams::new(0.12, 20))?;
        let NormalEstimation::Estimated {
            cloud: out,
            neighborhoods,
            fallback,
        } = res
        else {
            panic!("normals should be available on a plane");
        };
        assert_eq!(fallback, 0);
        assert_eq!(out.len(), cloud.len());
        assert_eq!(neighborhoods.len(), cloud.len());
        for n in out.normals().unwrap() {
            assert_relative_eq!(norm(n), 1.0, epsilon = 1e-9);
            assert_relative_eq!(dot(n, &expected).abs(), 1.0, epsilon = 1e-9);
        }
        Ok(())
    }

    #[test]
    fn test_collinear_is_unavailable() -> Result<(), NormalsError> {
        let points = (0..50).map(|i| [i as f64 * 0.01, 0.0, 1.0]).collect();
        let cloud = PointCloud::new(points, vec![[0.0; 3]; 50], None).unwrap();
        let res = estimate_normals(&cloud, &NormalSearchParams::default())?;
        assert!(!res.is_available());
        assert_eq!(res.cloud(), &cloud);
        Ok(())
    }

    #[test]
    fn test_empty_and_isolated_are_unavailable() -> Result<(), NormalsError> {
        let res = estimate_normals(&PointCloud::empty(), &NormalSearchParams::default())?;
        assert!(!res.is_available());
        assert!(res.into_cloud().is_empty());

        let points = (0..10).map(|i| [i as f64, 0.0, (i % 3) as f64]).collect();
        let cloud = PointCloud::new(points, vec![[0.0; 3]; 10], None).unwrap();
        let res = estimate_normals(&cloud, &NormalSearchParams::new(0.3, 30))?;
        assert!(!res.is_available());
        Ok(())
    }

    #[test]
    fn test_isolated_point_keeps_its_place() -> Result<(), NormalsError> {
        let (plane, expected) = tilted_plane(10, 0.05);
        let (mut points, mut colors, _) = plane.into_parts();
        points.insert(3, [10.0, 10.0, 10.0]);
        colors.insert(3, [1.0, 0.0, 0.0]);
        let cloud = PointCloud::new(points, colors, None).unwrap();

        let res = estimate_normals(&cloud, &NormalSearchParams::new(0.12, 20))?;
        let NormalEstimation::Estimated {
            cloud: out,
            neighborhoods,
            fallback,
        } = res
        else {
            panic!("normals should be available");
        };
        assert_eq!(fallback, 1);
        assert_eq!(out.len(), cloud.len());
        assert_eq!(out.points(), cloud.points());
        assert_eq!(out.colors(), cloud.colors());

        let normals = out.normals().unwrap();
        // the isolated point looks at the camera and is linked to nothing
        let to_camera = normalize(&[-1.0, -1.0, -1.0]).unwrap();
        assert_relative_eq!(dot(&normals[3], &to_camera), 1.0, epsilon = 1e-12);
        assert!(neighborhoods[3].is_empty());
        assert!(neighborhoods.iter().flatten().all(|&j| j != 3));
        for (i, n) in normals.iter().enumerate().filter(|(i, _)| *i != 3) {
            assert_relative_eq!(dot(n, &expected).abs(), 1.0, epsilon = 1e-9);
            assert!(!neighborhoods[i].is_empty());
        }
        Ok(())
    }

    #[test]
    fn test_sparse_points_borrow_a_normal() -> Result<(), NormalsError> {
        // dense patch at 1 cm next to a sparse patch at 2 cm; with a 1.5 cm
        // radius the sparse points see at most 2 neighbours
        let mut points = Vec::new();
        for i in 0..20 {
            for j in 0..20 {
                points.push([i as f64 * 0.01, j as f64 * 0.01, 2.0]);
            }
        }
        for i in 0..20 {
            for j in 0..20 {
                points.push([0.2 + i as f64 * 0.02, j as f64 * 0.02, 2.0]);
            }
        }
        let cloud = PointCloud::new(points, vec![[0.5; 3]; 800], None).unwrap();

        let res = estimate_normals(&cloud, &NormalSearchParams::new(0.015, 30))?;
        let NormalEstimation::Estimated {
            cloud: out,
            neighborhoods,
            fallback,
        } = res
        else {
            panic!("normals should be available");
        };
        assert_eq!(out.len(), 800);
        assert!(fallback > 0);
        for (n, neighbors) in out.normals().unwrap().iter().zip(&neighborhoods) {
            assert_relative_eq!(norm(n), 1.0, epsilon = 1e-9);
            assert!(neighbors.iter().all(|&j| j < 800));
        }
        // points touching the dense patch copy a plane normal
        let borrowed = neighborhoods[400..]
            .iter()
            .zip(&out.normals().unwrap()[400..])
            .filter(|(neighbors, _)| neighbors.len() == 1);
        for (neighbors, n) in borrowed {
            assert_eq!(*n, out.normals().unwrap()[neighbors[0]]);
            assert_relative_eq!(n[2].abs(), 1.0, epsilon = 1e-9);
        }
        Ok(())
    }

    #[test]
    fn test_subset_index_matches_rebuilt_tree() -> Result<(), NormalsError> {
        let (plane, _) = tilted_plane(12, 0.05);
        let (mut points, mut colors, _) = plane.into_parts();
        points.push([3.0, 3.0, 3.0]);
        colors.push([0.0; 3]);
        let raw = PointCloud::new(points, colors, None).unwrap();
        let tree = KdTree::new(raw.points());

        let selected = (0..144).collect::<Vec<_>>();
        let subset = raw.select_by_index(&selected);
        let params = NormalSearchParams::new(0.12, 10);

        let shared = estimate_normals_with_index(
            &subset,
            &SubsetIndex::new(&tree, &selected),
            &params,
        )?;
        let rebuilt = estimate_normals(&subset, &params)?;
        let a = shared.cloud().normals().unwrap();
        let b = rebuilt.cloud().normals().unwrap();
        assert_eq!(a.len(), b.len());
        for (na, nb) in a.iter().zip(b) {
            assert_relative_eq!(dot(na, nb).abs(), 1.0, epsilon = 1e-9);
        }
        Ok(())
    }

    #[test]
    fn test_invalid_parameters() {
        let (cloud, _) = tilted_plane(4, 0.1);
        assert!(matches!(
            estimate_normals(&cloud, &NormalSearchParams::new(0.0, 30)),
            Err(NormalsError::InvalidParameter { name: "radius", .. })
        ));
        assert!(matches!(
            estimate_normals(&cloud, &NormalSearchParams::new(0.3, 2)),
            Err(NormalsError::InvalidParameter {
                name: "max_neighbors",
                ..
            })
        ));

        let tree = KdTree::new(&cloud.points()[..5]);
        assert!(matches!(
            estimate_normals_with_index(
                &cloud,
                &SubsetIndex::full(&tree),
                &NormalSearchParams::default()
            ),
            Err(NormalsError::IndexMismatch { .. })
        ));
    }
}
