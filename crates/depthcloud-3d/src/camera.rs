use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rgbd::ImageSize;

/// Error types for camera operations.
#[derive(Debug, Error, PartialEq)]
pub enum CameraError {
    /// The focal lengths are not strictly positive finite numbers.
    #[error("Invalid camera intrinsics: focal lengths must be positive, got fx={fx}, fy={fy}")]
    InvalidIntrinsics {
        /// Focal length in x direction
        fx: f64,
        /// Focal length in y direction
        fy: f64,
    },

    /// The field of view is outside the open interval (0, 180) degrees.
    #[error("Invalid field of view: {0} degrees")]
    InvalidFieldOfView(f64),
}

/// Represents the intrinsic parameters of a pinhole camera.
///
/// All values are in pixel units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    /// Focal length in x direction
    pub fx: f64,
    /// Focal length in y direction
    pub fy: f64,
    /// Principal point x coordinate
    pub cx: f64,
    /// Principal point y coordinate
    pub cy: f64,
}

impl CameraIntrinsics {
    /// Create camera intrinsics from focal lengths and principal point.
    ///
    /// The values are not validated here; call [`CameraIntrinsics::validate`]
    /// before using intrinsics that come from an untrusted source.
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// Create intrinsics for an image of `size` with the given horizontal field of view.
    ///
    /// Assumes square pixels and a principal point at the image centre.
    ///
    /// Example:
    /// ```
    /// use depthcloud_3d::camera::CameraIntrinsics;
    /// use depthcloud_3d::rgbd::ImageSize;
    ///
    /// let size = ImageSize { width: 640, height: 480 };
    /// let intrinsics = CameraIntrinsics::from_field_of_view(size, 90.0).unwrap();
    /// assert!((intrinsics.fx - 320.0).abs() < 1e-9);
    /// ```
    pub fn from_field_of_view(size: ImageSize, fov_x_degrees: f64) -> Result<Self, CameraError> {
        if !(fov_x_degrees > 0.0 && fov_x_degrees < 180.0) {
            return Err(CameraError::InvalidFieldOfView(fov_x_degrees));
        }
        let half_fov = (fov_x_degrees * 0.5).to_radians();
        let f = size.width as f64 * 0.5 / half_fov.tan();
        let intrinsics = Self::new(f, f, size.width as f64 * 0.5, size.height as f64 * 0.5);
        intrinsics.validate()?;
        Ok(intrinsics)
    }

    /// Check that both focal lengths are strictly positive and finite.
    pub fn validate(&self) -> Result<(), CameraError> {
        let valid = |f: f64| f > 0.0 && f.is_finite();
        if valid(self.fx) && valid(self.fy) {
            Ok(())
        } else {
            Err(CameraError::InvalidIntrinsics {
                fx: self.fx,
                fy: self.fy,
            })
        }
    }

    /// Backproject pixel `(u, v)` observed at `depth` into scene coordinates.
    ///
    /// The Y axis is negated so the output is right-handed with Y pointing up.
    #[inline]
    pub fn backproject(&self, u: f64, v: f64, depth: f64) -> [f64; 3] {
        let x = (u - self.cx) * depth / self.fx;
        let y = (v - self.cy) * depth / self.fy;
        [x, -y, depth]
    }

    /// Project a scene point back to pixel coordinates.
    ///
    /// Inverse of [`CameraIntrinsics::backproject`]. Returns `None` for points
    /// at or behind the camera plane.
    #[inline]
    pub fn project(&self, point: &[f64; 3]) -> Option<[f64; 2]> {
        let [x, y, z] = *point;
        if z <= 0.0 {
            return None;
        }
        Some([x * self.fx / z + self.cx, -y * self.fy / z + self.cy])
    }

    /// Convert to 3x3 intrinsics matrix.
    pub fn camera_matrix(&self) -> [[f64; 3]; 3] {
        [
            [self.fx, 0.0, self.cx],
            [0.0, self.fy, self.cy],
            [0.0, 0.0, 1.0],
        ]
    }
}
