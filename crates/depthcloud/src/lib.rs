#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

#[doc(inline)]
pub use depthcloud_3d as k3d;

/// External collaborators and the per-frame reconstruction driver.
pub mod collaborators;

/// Refinement parameters and their loading from JSON.
pub mod config;

/// Errors raised by the pipeline, with stage context.
pub mod error;

/// Backprojection followed by outlier removal, downsampling and normal estimation.
pub mod pipeline;

pub use collaborators::{
    BoxError, DepthEstimator, FieldOfViewIntrinsics, FixedIntrinsics, FrameOutput,
    IntrinsicsExtractor, Reconstruction, ReconstructionError, SurfaceReconstructor,
};
pub use config::{ConfigError, NormalOrientation, RefinementConfig};
pub use error::PipelineError;
pub use pipeline::{
    reconstruct_point_cloud, refine_point_cloud, RefinedPointCloud, RefinementStats,
};
