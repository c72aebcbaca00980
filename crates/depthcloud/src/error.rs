use depthcloud_3d::{
    filters::FilterError, normals::NormalsError, rgbd::ImageSize, rgbd::RgbdError,
};

use crate::config::ConfigError;

/// An error raised by one stage of the refinement pipeline.
///
/// Every stage variant carries the size of the cloud it received and the
/// parameters it ran with. The stage error is available through
/// [`std::error::Error::source`].
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The refinement parameters are invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The depth map could not be backprojected.
    #[error("backprojection failed for a {size} frame")]
    Backprojection {
        /// Size of the depth map
        size: ImageSize,
        /// Stage error
        #[source]
        source: RgbdError,
    },

    /// The statistical outlier filter failed.
    #[error(
        "outlier removal failed on {num_points} points \
         (neighbor_count {neighbor_count}, std_ratio {std_ratio})"
    )]
    OutlierRemoval {
        /// Number of points given to the stage
        num_points: usize,
        /// Number of neighbours requested
        neighbor_count: usize,
        /// Standard deviation multiplier
        std_ratio: f64,
        /// Stage error
        #[source]
        source: FilterError,
    },

    /// The voxel downsampler failed.
    #[error("voxel downsampling failed on {num_points} points (voxel_size {voxel_size})")]
    Downsampling {
        /// Number of points given to the stage
        num_points: usize,
        /// Voxel edge length
        voxel_size: f64,
        /// Stage error
        #[source]
        source: FilterError,
    },

    /// Normal estimation or orientation failed.
    #[error(
        "normal estimation failed on {num_points} points \
         (radius {radius}, max_neighbors {max_neighbors})"
    )]
    NormalEstimation {
        /// Number of points given to the stage
        num_points: usize,
        /// Search radius
        radius: f64,
        /// Neighbour cap
        max_neighbors: usize,
        /// Stage error
        #[source]
        source: NormalsError,
    },
}

impl PipelineError {
    /// Name of the stage that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Config(_) => "config",
            PipelineError::Backprojection { .. } => "backprojection",
            PipelineError::OutlierRemoval { .. } => "outlier_removal",
            PipelineError::Downsampling { .. } => "downsampling",
            PipelineError::NormalEstimation { .. } => "normal_estimation",
        }
    }
}
