use depthcloud_3d::{
    camera::CameraIntrinsics,
    pointcloud::PointCloud,
    rgbd::{ColorImage, DepthMap, ImageSize, RgbdError},
};

use crate::config::{ConfigError, RefinementConfig};
use crate::error::PipelineError;
use crate::pipeline::{reconstruct_point_cloud, RefinedPointCloud};

/// Error type returned by external collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Produces a depth map from a color image, e.g. a monocular depth model.
///
/// The depth map must have the size of the image. It may contain invalid
/// (non-positive or not-a-number) values.
pub trait DepthEstimator {
    /// Estimate the depth of every pixel of `image`.
    fn estimate_depth(&self, image: &ColorImage) -> Result<DepthMap, BoxError>;
}

/// Produces the pinhole intrinsics of the camera that took an image.
///
/// The returned values are validated by the pipeline before use.
pub trait IntrinsicsExtractor {
    /// Extract the intrinsics for `image`.
    fn extract_intrinsics(&self, image: &ColorImage) -> Result<CameraIntrinsics, BoxError>;
}

/// Turns a refined point cloud into a surface.
pub trait SurfaceReconstructor {
    /// The produced surface.
    type Mesh;

    /// Reconstruct a surface from `cloud`.
    fn reconstruct(&self, cloud: &PointCloud) -> Result<Self::Mesh, BoxError>;
}

/// An extractor returning known intrinsics for every image.
#[derive(Debug, Clone, Copy)]
pub struct FixedIntrinsics(pub CameraIntrinsics);

impl IntrinsicsExtractor for FixedIntrinsics {
    fn extract_intrinsics(&self, _image: &ColorImage) -> Result<CameraIntrinsics, BoxError> {
        Ok(self.0)
    }
}

/// An extractor deriving intrinsics from a horizontal field of view, with square
/// pixels and the principal point at the image centre.
#[derive(Debug, Clone, Copy)]
pub struct FieldOfViewIntrinsics {
    /// Horizontal field of view in degrees.
    pub horizontal_fov_degrees: f64,
}

impl IntrinsicsExtractor for FieldOfViewIntrinsics {
    fn extract_intrinsics(&self, image: &ColorImage) -> Result<CameraIntrinsics, BoxError> {
        Ok(CameraIntrinsics::from_field_of_view(
            image.size(),
            self.horizontal_fov_degrees,
        )?)
    }
}

/// Errors raised while processing a frame.
#[derive(Debug, thiserror::Error)]
pub enum ReconstructionError {
    /// The input image buffer is malformed.
    #[error(transparent)]
    Image(#[from] RgbdError),

    /// The depth estimator failed.
    #[error("depth estimation failed")]
    DepthEstimation(#[source] BoxError),

    /// The depth estimator returned a map of the wrong size.
    #[error("depth map is {depth} but the image is {image}")]
    DepthSizeMismatch {
        /// Size of the image
        image: ImageSize,
        /// Size of the depth map
        depth: ImageSize,
    },

    /// The intrinsics extractor failed.
    #[error("intrinsics extraction failed")]
    Intrinsics(#[source] BoxError),

    /// Backprojection or refinement failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The surface reconstructor failed.
    #[error("surface reconstruction failed on {num_points} points")]
    SurfaceReconstruction {
        /// Number of points given to the reconstructor
        num_points: usize,
        /// Reconstructor error
        #[source]
        source: BoxError,
    },
}

/// Everything produced for one frame.
#[derive(Debug)]
pub struct FrameOutput<M> {
    /// The reconstructed surface.
    pub mesh: M,
    /// The refined point cloud the surface was built from.
    pub cloud: RefinedPointCloud,
    /// The estimated depth map.
    pub depth: DepthMap,
}

/// Per-frame driver: depth estimation, intrinsics, backprojection, refinement
/// and surface reconstruction.
///
/// Frames are independent; no state is kept between calls.
pub struct Reconstruction<D, I, S> {
    depth_estimator: D,
    intrinsics_extractor: I,
    surface_reconstructor: S,
    config: RefinementConfig,
}

impl<D, I, S> Reconstruction<D, I, S>
where
    D: DepthEstimator,
    I: IntrinsicsExtractor,
    S: SurfaceReconstructor,
{
    /// Create a driver from its collaborators and a validated config.
    pub fn new(
        depth_estimator: D,
        intrinsics_extractor: I,
        surface_reconstructor: S,
        config: RefinementConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            depth_estimator,
            intrinsics_extractor,
            surface_reconstructor,
            config,
        })
    }

    /// The refinement parameters.
    pub fn config(&self) -> &RefinementConfig {
        &self.config
    }

    /// Process an interleaved 8-bit BGR frame.
    pub fn process_bgr8(
        &self,
        size: ImageSize,
        data: &[u8],
    ) -> Result<FrameOutput<S::Mesh>, ReconstructionError> {
        let image = ColorImage::from_bgr8(size, data)?;
        self.process(&image)
    }

    /// Process a normalised RGB frame.
    pub fn process(
        &self,
        image: &ColorImage,
    ) -> Result<FrameOutput<S::Mesh>, ReconstructionError> {
        let depth = self
            .depth_estimator
            .estimate_depth(image)
            .map_err(ReconstructionError::DepthEstimation)?;
        if depth.size() != image.size() {
            return Err(ReconstructionError::DepthSizeMismatch {
                image: image.size(),
                depth: depth.size(),
            });
        }

        let intrinsics = self
            .intrinsics_extractor
            .extract_intrinsics(image)
            .map_err(ReconstructionError::Intrinsics)?;
        log::debug!("camera intrinsics: {:?}", intrinsics);

        let cloud = reconstruct_point_cloud(&depth, image, &intrinsics, &self.config)?;

        let mesh = self
            .surface_reconstructor
            .reconstruct(&cloud.cloud)
            .map_err(|source| ReconstructionError::SurfaceReconstruction {
                num_points: cloud.cloud.len(),
                source,
            })?;

        Ok(FrameOutput { mesh, cloud, depth })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // fronto-parallel wall at 2 m
    struct Wall;

    impl DepthEstimator for Wall {
        fn estimate_depth(&self, image: &ColorImage) -> Result<DepthMap, BoxError> {
            Ok(DepthMap::from_size_val(image.size(), 2.0))
        }
    }

    struct Broken;

    impl DepthEstimator for Broken {
        fn estimate_depth(&self, _image: &ColorImage) -> Result<DepthMap, BoxError> {
            Err("model not loaded".into())
        }
    }

    struct HalfSize;

    impl DepthEstimator for HalfSize {
        fn estimate_depth(&self, image: &ColorImage) -> Result<DepthMap, BoxError> {
            let size = ImageSize {
                width: image.size().width / 2,
                height: image.size().height,
            };
            Ok(DepthMap::from_size_val(size, 1.0))
        }
    }

    // reports how many points it received
    struct CountPoints;

    impl SurfaceReconstructor for CountPoints {
        type Mesh = usize;

        fn reconstruct(&self, cloud: &PointCloud) -> Result<usize, BoxError> {
            if !cloud.has_normals() {
                return Err("normals required".into());
            }
            Ok(cloud.len())
        }
    }

    fn size() -> ImageSize {
        ImageSize {
            width: 24,
            height: 16,
        }
    }

    fn config() -> RefinementConfig {
        RefinementConfig {
            neighbor_count: 8,
            normal_search_radius: 0.2,
            ..Default::default()
        }
    }

    #[test]
    fn test_process_bgr8() -> Result<(), Box<dyn std::error::Error>> {
        let driver = Reconstruction::new(
            Wall,
            FieldOfViewIntrinsics {
                horizontal_fov_degrees: 60.0,
            },
            CountPoints,
            config(),
        )?;
        let data = [0u8, 128, 255].repeat(size().num_pixels());
        let out = driver.process_bgr8(size(), &data)?;

        assert_eq!(out.depth.size(), size());
        assert_eq!(out.mesh, out.cloud.cloud.len());
        assert!(out.cloud.cloud.len() <= size().num_pixels());
        // BGR input is stored as RGB
        assert!(out.cloud.cloud.colors().iter().all(|c| c[0] == 1.0 && c[2] == 0.0));
        Ok(())
    }

    #[test]
    fn test_collaborator_failures() -> Result<(), ConfigError> {
        let intrinsics = FixedIntrinsics(CameraIntrinsics::new(20.0, 20.0, 12.0, 8.0));
        let image = ColorImage::from_size_val(size(), [0.5; 3]);

        let driver = Reconstruction::new(Broken, intrinsics, CountPoints, config())?;
        assert!(matches!(
            driver.process(&image),
            Err(ReconstructionError::DepthEstimation(_))
        ));

        let driver = Reconstruction::new(HalfSize, intrinsics, CountPoints, config())?;
        assert!(matches!(
            driver.process(&image),
            Err(ReconstructionError::DepthSizeMismatch { .. })
        ));

        let degenerate = FixedIntrinsics(CameraIntrinsics::new(0.0, 20.0, 12.0, 8.0));
        let driver = Reconstruction::new(Wall, degenerate, CountPoints, config())?;
        assert!(matches!(
            driver.process(&image),
            Err(ReconstructionError::Pipeline(
                PipelineError::Backprojection { .. }
            ))
        ));

        let no_normals = RefinementConfig {
            estimate_normals: false,
            ..config()
        };
        let driver = Reconstruction::new(Wall, intrinsics, CountPoints, no_normals)?;
        assert!(matches!(
            driver.process(&image),
            Err(ReconstructionError::SurfaceReconstruction { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = RefinementConfig {
            std_ratio: 0.0,
            ..Default::default()
        };
        let intrinsics = FixedIntrinsics(CameraIntrinsics::new(1.0, 1.0, 0.0, 0.0));
        assert!(Reconstruction::new(Wall, intrinsics, CountPoints, config).is_err());
    }
}
