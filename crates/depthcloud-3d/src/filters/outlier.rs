use rayon::prelude::*;

use super::FilterError;
use crate::kdtree::KdTree;
use crate::ops::mean_and_std;
use crate::pointcloud::PointCloud;

/// Result of a statistical outlier removal.
#[derive(Debug, Clone)]
pub struct OutlierRemoval {
    /// The inlier points, in their original relative order.
    pub cloud: PointCloud,
    /// Indices of the inliers in the input cloud.
    pub inlier_indices: Vec<usize>,
    /// Mean over the cloud of the per-point mean neighbour distance.
    pub mean_distance: f64,
    /// Sample standard deviation of the per-point mean neighbour distance.
    pub std_distance: f64,
}

/// Remove points that are further away from their neighbours than the rest of the cloud.
///
/// Builds a kd-tree over the cloud and calls [`remove_statistical_outliers_with_index`].
///
/// # Arguments
///
/// * `cloud` - The input point cloud.
/// * `neighbor_count` - Number of nearest neighbours used for the mean distance.
/// * `std_ratio` - Number of standard deviations above the mean distance a point may be.
///
/// Example:
/// ```
/// use depthcloud_3d::filters::remove_statistical_outliers;
/// use depthcloud_3d::pointcloud::PointCloud;
///
/// let mut points: Vec<[f64; 3]> = (0..100)
///     .map(|i| [(i % 10) as f64 * 0.1, (i / 10) as f64 * 0.1, 1.0])
///     .collect();
/// points.push([50.0, 50.0, 50.0]);
/// let colors = vec![[0.5f32; 3]; points.len()];
/// let cloud = PointCloud::new(points, colors, None).unwrap();
///
/// let res = remove_statistical_outliers(&cloud, 8, 2.0).unwrap();
/// assert_eq!(res.cloud.len(), 100);
/// ```
pub fn remove_statistical_outliers(
    cloud: &PointCloud,
    neighbor_count: usize,
    std_ratio: f64,
) -> Result<OutlierRemoval, FilterError> {
    if cloud.is_empty() {
        return Ok(identity(cloud));
    }
    validate(cloud, neighbor_count, std_ratio)?;
    let tree = KdTree::new(cloud.points());
    remove_statistical_outliers_with_index(cloud, &tree, neighbor_count, std_ratio)
}

/// Statistical outlier removal using a prebuilt kd-tree over `cloud`.
///
/// For each point the mean Euclidean distance to its `neighbor_count` nearest
/// neighbours (the point itself excluded) is computed. With `μ` and `σ` the
/// mean and sample standard deviation of those values over the whole cloud, a
/// point is kept iff its mean distance is `<= μ + std_ratio * σ`.
///
/// # Errors
///
/// * [`FilterError::InsufficientPoints`] if `cloud.len() <= neighbor_count`.
/// * [`FilterError::InvalidParameter`] if `neighbor_count` is zero or `std_ratio`
///   is not a positive finite number.
/// * [`FilterError::IndexMismatch`] if `tree` does not index exactly the cloud's points.
///
/// An empty cloud is returned unchanged.
pub fn remove_statistical_outliers_with_index(
    cloud: &PointCloud,
    tree: &KdTree,
    neighbor_count: usize,
    std_ratio: f64,
) -> Result<OutlierRemoval, FilterError> {
    if cloud.is_empty() {
        return Ok(identity(cloud));
    }
    validate(cloud, neighbor_count, std_ratio)?;
    if tree.len() != cloud.len() {
        return Err(FilterError::IndexMismatch {
            index_len: tree.len(),
            num_points: cloud.len(),
        });
    }

    let avg_distances = cloud
        .points()
        .par_iter()
        .enumerate()
        .map(|(i, point)| {
            let neighbors = tree.knn(point, neighbor_count + 1);
            let (sum, count) = neighbors
                .iter()
                .filter(|n| n.index != i)
                .take(neighbor_count)
                .fold((0.0, 0usize), |(sum, count), n| (sum + n.distance, count + 1));
            sum / count.max(1) as f64
        })
        .collect::<Vec<f64>>();

    let (mean_distance, std_distance) = mean_and_std(&avg_distances);
    let threshold = mean_distance + std_ratio * std_distance;

    let inlier_indices = avg_distances
        .iter()
        .enumerate()
        .filter(|(_, &d)| d <= threshold)
        .map(|(i, _)| i)
        .collect::<Vec<_>>();

    log::debug!(
        "outlier threshold {:.6} (mean {:.6}, std {:.6}); kept {} of {} points",
        threshold,
        mean_distance,
        std_distance,
        inlier_indices.len(),
        cloud.len()
    );

    Ok(OutlierRemoval {
        cloud: cloud.select_by_index(&inlier_indices),
        inlier_indices,
        mean_distance,
        std_distance,
    })
}

fn validate(cloud: &PointCloud, neighbor_count: usize, std_ratio: f64) -> Result<(), FilterError> {
    if neighbor_count == 0 {
        return Err(FilterError::InvalidParameter {
            name: "neighbor_count",
            value: 0.0,
        });
    }
    if !(std_ratio > 0.0 && std_ratio.is_finite()) {
        return Err(FilterError::InvalidParameter {
            name: "std_ratio",
            value: std_ratio,
        });
    }
    if cloud.len() <= neighbor_count {
        return Err(FilterError::InsufficientPoints {
            num_points: cloud.len(),
            neighbor_count,
        });
    }
    Ok(())
}

fn identity(cloud: &PointCloud) -> OutlierRemoval {
    OutlierRemoval {
        cloud: cloud.clone(),
        inlier_indices: (0..cloud.len()).collect(),
        mean_distance: 0.0,
        std_distance: 0.0,
    }
}
