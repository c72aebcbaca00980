mod outlier;
pub use outlier::*;

mod voxel_grid;
pub use voxel_grid::*;

use thiserror::Error;

/// Error types for point cloud filters.
#[derive(Debug, Error, PartialEq)]
pub enum FilterError {
    /// The cloud does not have more points than the requested neighbour count.
    #[error("Statistical outlier removal needs more than {neighbor_count} points, got {num_points}")]
    InsufficientPoints {
        /// Number of points in the cloud
        num_points: usize,
        /// Requested number of neighbours
        neighbor_count: usize,
    },

    /// A filter parameter is out of range.
    #[error("Invalid filter parameter `{name}`: {value}")]
    InvalidParameter {
        /// Name of the parameter
        name: &'static str,
        /// Offending value
        value: f64,
    },

    /// The spatial index was not built over the cloud being filtered.
    #[error("Spatial index holds {index_len} points but the cloud has {num_points}")]
    IndexMismatch {
        /// Number of points in the index
        index_len: usize,
        /// Number of points in the cloud
        num_points: usize,
    },
}
