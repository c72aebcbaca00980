use depthcloud_3d::{
    camera::CameraIntrinsics,
    filters::{remove_statistical_outliers_with_index, OutlierRemoval, VoxelGrid},
    kdtree::{KdTree, SubsetIndex},
    normals::{
        estimate_normals_with_index, orient_normals_consistent, orient_normals_towards_camera,
        NormalEstimation, NormalsError, OrientationStats,
    },
    pointcloud::PointCloud,
    rgbd::{backproject_depth, ColorImage, DepthMap},
};

use crate::config::{NormalOrientation, RefinementConfig};
use crate::error::PipelineError;

/// Point counts and diagnostics collected while refining a cloud.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefinementStats {
    /// Number of points given to the pipeline.
    pub input_points: usize,
    /// Number of points removed by the outlier filter.
    pub outliers_removed: usize,
    /// Mean of the per-point mean neighbour distance.
    pub mean_neighbor_distance: f64,
    /// Standard deviation of the per-point mean neighbour distance.
    pub std_neighbor_distance: f64,
    /// Number of points after downsampling, if it ran.
    pub downsampled_points: Option<usize>,
    /// Number of points whose normal was borrowed from a neighbour or set
    /// toward the camera for lack of a reliable neighbourhood.
    pub fallback_normals: usize,
    /// Outcome of the orientation pass, if it ran.
    pub orientation: Option<OrientationStats>,
}

/// A refined point cloud, ready for surface reconstruction.
#[derive(Debug, Clone)]
pub struct RefinedPointCloud {
    /// The refined cloud.
    pub cloud: PointCloud,
    /// Normals were requested but none could be computed.
    pub normals_unavailable: bool,
    /// Stage diagnostics.
    pub stats: RefinementStats,
}

/// Refine a point cloud: remove statistical outliers, optionally downsample,
/// then optionally estimate and orient normals.
///
/// A single kd-tree is built over the input cloud. The outlier filter queries
/// it directly, and the normal estimation reuses it restricted to the inliers
/// unless downsampling produced new points.
///
/// An empty cloud flows through every stage and comes out empty.
///
/// # Errors
///
/// Invalid parameters are rejected before any work is done. A stage failure
/// aborts the run with a [`PipelineError`] naming the stage, the size of its
/// input and its parameters.
pub fn refine_point_cloud(
    cloud: &PointCloud,
    config: &RefinementConfig,
) -> Result<RefinedPointCloud, PipelineError> {
    config.validate()?;

    let mut stats = RefinementStats {
        input_points: cloud.len(),
        ..Default::default()
    };

    let tree = KdTree::new(cloud.points());

    log::info!("Removing statistical outliers...");
    let OutlierRemoval {
        cloud: inliers,
        inlier_indices,
        mean_distance,
        std_distance,
    } = remove_statistical_outliers_with_index(
        cloud,
        &tree,
        config.neighbor_count,
        config.std_ratio,
    )
    .map_err(|source| PipelineError::OutlierRemoval {
        num_points: cloud.len(),
        neighbor_count: config.neighbor_count,
        std_ratio: config.std_ratio,
        source,
    })?;
    stats.outliers_removed = cloud.len() - inliers.len();
    stats.mean_neighbor_distance = mean_distance;
    stats.std_neighbor_distance = std_distance;
    log::info!("Kept {} points after outlier removal.", inliers.len());

    let (refined, downsampled) = match config.voxel_size {
        Some(voxel_size) => {
            log::info!("Downsampling with voxel size {}...", voxel_size);
            let grid =
                VoxelGrid::new(voxel_size).map_err(|source| PipelineError::Downsampling {
                    num_points: inliers.len(),
                    voxel_size,
                    source,
                })?;
            let refined = grid.downsample(&inliers);
            log::info!("{} points after downsampling.", refined.len());
            stats.downsampled_points = Some(refined.len());
            (refined, true)
        }
        None => (inliers, false),
    };

    if !config.estimate_normals {
        return Ok(RefinedPointCloud {
            cloud: refined,
            normals_unavailable: false,
            stats,
        });
    }

    log::info!("Estimating normals...");
    let params = config.normal_search_params();
    let num_points = refined.len();
    let normals_error = |source: NormalsError| PipelineError::NormalEstimation {
        num_points,
        radius: params.radius,
        max_neighbors: params.max_neighbors,
        source,
    };

    let estimation = if downsampled {
        // voxel centroids are new points: index them
        let tree = KdTree::new(refined.points());
        estimate_normals_with_index(&refined, &SubsetIndex::full(&tree), &params)
    } else {
        let index = SubsetIndex::new(&tree, &inlier_indices);
        estimate_normals_with_index(&refined, &index, &params)
    }
    .map_err(normals_error)?;

    let (mut cloud, neighborhoods) = match estimation {
        NormalEstimation::Estimated {
            cloud,
            neighborhoods,
            fallback,
        } => {
            stats.fallback_normals = fallback;
            (cloud, neighborhoods)
        }
        NormalEstimation::Unavailable(cloud) => {
            log::warn!("Normals were not computed. Skipping orientation.");
            return Ok(RefinedPointCloud {
                cloud,
                normals_unavailable: true,
                stats,
            });
        }
    };

    if let (points, Some(normals)) = cloud.points_and_normals_mut() {
        match config.normal_orientation {
            NormalOrientation::Consistent => {
                log::info!("Orienting normals...");
                let orientation = orient_normals_consistent(points, normals, &neighborhoods)
                    .map_err(normals_error)?;
                stats.orientation = Some(orientation);
            }
            NormalOrientation::TowardsCamera => {
                log::info!("Orienting normals towards the camera...");
                let flipped = orient_normals_towards_camera(points, normals, &[0.0; 3])
                    .map_err(normals_error)?;
                // no neighbourhood graph is built
                stats.orientation = Some(OrientationStats {
                    components: 0,
                    flipped,
                });
            }
            NormalOrientation::None => {}
        }
    }

    Ok(RefinedPointCloud {
        cloud,
        normals_unavailable: false,
        stats,
    })
}

/// Backproject a depth map with its color image and refine the resulting cloud.
///
/// # Errors
///
/// See [`refine_point_cloud`]; backprojection failures (invalid intrinsics,
/// mismatched frame sizes) are reported as [`PipelineError::Backprojection`].
pub fn reconstruct_point_cloud(
    depth: &DepthMap,
    color: &ColorImage,
    intrinsics: &CameraIntrinsics,
    config: &RefinementConfig,
) -> Result<RefinedPointCloud, PipelineError> {
    config.validate()?;

    let cloud = backproject_depth(depth, color, intrinsics).map_err(|source| {
        PipelineError::Backprojection {
            size: depth.size(),
            source,
        }
    })?;
    log::info!(
        "Backprojected {} points from a {} depth map.",
        cloud.len(),
        depth.size()
    );

    refine_point_cloud(&cloud, config)
}
