use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use depthcloud_3d::normals::{NormalSearchParams, MIN_NEIGHBORHOOD_SIZE};

/// Errors raised while loading or validating a [`RefinementConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The JSON text could not be parsed.
    #[error(transparent)]
    Parse(#[from] serde_json::Error),

    /// The config file could not be read.
    #[error("Failed to read config file {path}")]
    Io {
        /// Path of the file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// A parameter is out of range.
    #[error("Invalid refinement parameter `{name}`: {value}")]
    InvalidParameter {
        /// Name of the parameter
        name: &'static str,
        /// Offending value
        value: f64,
    },
}

/// How estimated normals are oriented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalOrientation {
    /// Propagate a consistent sign over a spanning tree of the neighbourhood graph.
    #[default]
    Consistent,
    /// Turn every normal toward the camera at the origin.
    TowardsCamera,
    /// Keep the arbitrary signs produced by the estimation.
    None,
}

/// Parameters of the point cloud refinement.
///
/// Missing fields take their default value when deserializing.
///
/// Example:
/// ```
/// use depthcloud::RefinementConfig;
///
/// let config = RefinementConfig::from_json_str(r#"{ "voxel_size": 0.01 }"#).unwrap();
/// assert_eq!(config.neighbor_count, 20);
/// assert_eq!(config.voxel_size, Some(0.01));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RefinementConfig {
    /// Number of neighbours used by the statistical outlier filter.
    pub neighbor_count: usize,
    /// Standard deviation multiplier of the statistical outlier filter.
    pub std_ratio: f64,
    /// Voxel edge length of the downsampler; no downsampling when absent.
    pub voxel_size: Option<f64>,
    /// Whether to estimate normals.
    pub estimate_normals: bool,
    /// Search radius of the normal estimation.
    pub normal_search_radius: f64,
    /// Maximum number of neighbours of the normal estimation.
    pub normal_max_neighbors: usize,
    /// Orientation applied to the estimated normals.
    pub normal_orientation: NormalOrientation,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        let search = NormalSearchParams::default();
        Self {
            neighbor_count: 20,
            std_ratio: 2.0,
            voxel_size: None,
            estimate_normals: true,
            normal_search_radius: search.radius,
            normal_max_neighbors: search.max_neighbors,
            normal_orientation: NormalOrientation::Consistent,
        }
    }
}

impl RefinementConfig {
    /// Parse a config from JSON text and validate it.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a config from a JSON file and validate it.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Serialize the config as pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check every parameter. Out of range values are rejected, never replaced.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.neighbor_count == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "neighbor_count",
                value: 0.0,
            });
        }
        if !is_positive(self.std_ratio) {
            return Err(ConfigError::InvalidParameter {
                name: "std_ratio",
                value: self.std_ratio,
            });
        }
        if let Some(voxel_size) = self.voxel_size {
            if !is_positive(voxel_size) {
                return Err(ConfigError::InvalidParameter {
                    name: "voxel_size",
                    value: voxel_size,
                });
            }
        }
        if !is_positive(self.normal_search_radius) {
            return Err(ConfigError::InvalidParameter {
                name: "normal_search_radius",
                value: self.normal_search_radius,
            });
        }
        if self.normal_max_neighbors < MIN_NEIGHBORHOOD_SIZE {
            return Err(ConfigError::InvalidParameter {
                name: "normal_max_neighbors",
                value: self.normal_max_neighbors as f64,
            });
        }
        Ok(())
    }

    /// Neighbourhood search parameters of the normal estimation.
    pub fn normal_search_params(&self) -> NormalSearchParams {
        NormalSearchParams::new(self.normal_search_radius, self.normal_max_neighbors)
    }
}

fn is_positive(value: f64) -> bool {
    value > 0.0 && value.is_finite()
}
