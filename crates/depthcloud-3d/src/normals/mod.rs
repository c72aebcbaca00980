mod estimate;
pub use estimate::*;

mod orient;
pub use orient::*;

use thiserror::Error;

use crate::pointcloud::PointCloud;

/// Error types for normal estimation and orientation.
#[derive(Debug, Error, PartialEq)]
pub enum NormalsError {
    /// A search parameter is out of range.
    #[error("Invalid normal search parameter `{name}`: {value}")]
    InvalidParameter {
        /// Name of the parameter
        name: &'static str,
        /// Offending value
        value: f64,
    },

    /// The spatial index was not built over the cloud.
    #[error("Spatial index holds {index_len} points but the cloud has {num_points}")]
    IndexMismatch {
        /// Number of points in the index
        index_len: usize,
        /// Number of points in the cloud
        num_points: usize,
    },

    /// Points, normals and neighbourhoods are not index-aligned.
    #[error("Expected {expected} entries, got {actual}")]
    LengthMismatch {
        /// Number of points
        expected: usize,
        /// Number of normals or neighbourhoods
        actual: usize,
    },
}

/// Neighbourhood search used for normal estimation.
///
/// Each point gathers up to `max_neighbors` nearest points (itself included)
/// within `radius`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NormalSearchParams {
    /// Search radius.
    pub radius: f64,
    /// Maximum number of neighbours.
    pub max_neighbors: usize,
}

impl Default for NormalSearchParams {
    fn default() -> Self {
        Self {
            radius: 0.3,
            max_neighbors: 30,
        }
    }
}

impl NormalSearchParams {
    /// Create search parameters.
    pub fn new(radius: f64, max_neighbors: usize) -> Self {
        Self {
            radius,
            max_neighbors,
        }
    }

    /// Check that the radius is positive and finite, and that at least 3
    /// neighbours can be gathered.
    pub fn validate(&self) -> Result<(), NormalsError> {
        if !(self.radius > 0.0 && self.radius.is_finite()) {
            return Err(NormalsError::InvalidParameter {
                name: "radius",
                value: self.radius,
            });
        }
        if self.max_neighbors < MIN_NEIGHBORHOOD_SIZE {
            return Err(NormalsError::InvalidParameter {
                name: "max_neighbors",
                value: self.max_neighbors as f64,
            });
        }
        Ok(())
    }
}

/// Smallest neighbourhood (query point included) that defines a tangent plane.
pub const MIN_NEIGHBORHOOD_SIZE: usize = 3;

/// Outcome of a normal estimation.
#[derive(Debug, Clone)]
pub enum NormalEstimation {
    /// Normals were computed for at least one point.
    Estimated {
        /// The input points, each with a unit-length (unoriented) normal.
        cloud: PointCloud,
        /// Per point, the indices into `cloud` of the neighbours linked to it
        /// for orientation.
        neighborhoods: Vec<Vec<usize>>,
        /// Number of points whose normal was not estimated from their own
        /// neighbourhood.
        fallback: usize,
    },
    /// No point had a reliable neighbourhood; the input cloud is returned unchanged.
    Unavailable(PointCloud),
}

impl NormalEstimation {
    /// Whether any normal was computed.
    pub fn is_available(&self) -> bool {
        matches!(self, NormalEstimation::Estimated { .. })
    }

    /// The resulting cloud.
    pub fn cloud(&self) -> &PointCloud {
        match self {
            NormalEstimation::Estimated { cloud, .. } => cloud,
            NormalEstimation::Unavailable(cloud) => cloud,
        }
    }

    /// Consume the result and return the cloud.
    pub fn into_cloud(self) -> PointCloud {
        match self {
            NormalEstimation::Estimated { cloud, .. } => cloud,
            NormalEstimation::Unavailable(cloud) => cloud,
        }
    }
}
