use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::camera::{CameraError, CameraIntrinsics};
use crate::pointcloud::PointCloud;

/// An error type for RGB-D frames and backprojection.
#[derive(Debug, Error, PartialEq)]
pub enum RgbdError {
    /// The buffer length does not match the image size.
    #[error("Data length ({actual}) does not match the image size ({expected})")]
    InvalidDataLength {
        /// Expected number of elements
        expected: usize,
        /// Actual number of elements
        actual: usize,
    },

    /// The depth map and the color image have different sizes.
    #[error("Depth map size {depth} does not match color image size {color}")]
    DimensionMismatch {
        /// Size of the depth map
        depth: ImageSize,
        /// Size of the color image
        color: ImageSize,
    },

    /// The camera intrinsics are not usable.
    #[error(transparent)]
    InvalidIntrinsics(#[from] CameraError),
}

/// Image size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSize {
    /// Width of the image in pixels
    pub width: usize,
    /// Height of the image in pixels
    pub height: usize,
}

impl ImageSize {
    /// Number of pixels in the image.
    #[inline]
    pub fn num_pixels(&self) -> usize {
        self.width * self.height
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl From<[usize; 2]> for ImageSize {
    fn from(size: [usize; 2]) -> Self {
        ImageSize {
            width: size[0],
            height: size[1],
        }
    }
}

fn check_length(size: ImageSize, actual: usize) -> Result<(), RgbdError> {
    let expected = size.num_pixels();
    if expected != actual {
        return Err(RgbdError::InvalidDataLength { expected, actual });
    }
    Ok(())
}

/// A dense depth map stored row-major.
///
/// Non-positive, NaN or infinite values mark pixels without a measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthMap {
    size: ImageSize,
    data: Vec<f32>,
}

impl DepthMap {
    /// Create a depth map from a row-major buffer of `size.width * size.height` values.
    pub fn new(size: ImageSize, data: Vec<f32>) -> Result<Self, RgbdError> {
        check_length(size, data.len())?;
        Ok(Self { size, data })
    }

    /// Create a depth map where every pixel has the same value.
    pub fn from_size_val(size: ImageSize, val: f32) -> Self {
        Self {
            size,
            data: vec![val; size.num_pixels()],
        }
    }

    /// The size of the depth map.
    pub fn size(&self) -> ImageSize {
        self.size
    }

    /// The width of the depth map.
    pub fn width(&self) -> usize {
        self.size.width
    }

    /// The height of the depth map.
    pub fn height(&self) -> usize {
        self.size.height
    }

    /// The raw row-major depth values.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Get the depth value at pixel `(u, v)`, or `None` when out of bounds.
    #[inline]
    pub fn get(&self, u: usize, v: usize) -> Option<f32> {
        if u >= self.size.width || v >= self.size.height {
            return None;
        }
        self.data.get(v * self.size.width + u).copied()
    }
}

/// An RGB image with channels normalized to `[0, 1]`, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorImage {
    size: ImageSize,
    data: Vec<[f32; 3]>,
}

impl ColorImage {
    /// Create a color image from a row-major buffer of RGB triplets.
    pub fn new(size: ImageSize, data: Vec<[f32; 3]>) -> Result<Self, RgbdError> {
        check_length(size, data.len())?;
        Ok(Self { size, data })
    }

    /// Create a color image where every pixel has the same color.
    pub fn from_size_val(size: ImageSize, val: [f32; 3]) -> Self {
        Self {
            size,
            data: vec![val; size.num_pixels()],
        }
    }

    /// Create a color image from interleaved 8-bit RGB data.
    pub fn from_rgb8(size: ImageSize, data: &[u8]) -> Result<Self, RgbdError> {
        Self::from_interleaved_u8(size, data, [0, 1, 2])
    }

    /// Create a color image from interleaved 8-bit BGR data, as produced by
    /// most video capture backends.
    pub fn from_bgr8(size: ImageSize, data: &[u8]) -> Result<Self, RgbdError> {
        Self::from_interleaved_u8(size, data, [2, 1, 0])
    }

    fn from_interleaved_u8(
        size: ImageSize,
        data: &[u8],
        order: [usize; 3],
    ) -> Result<Self, RgbdError> {
        let expected = size.num_pixels() * 3;
        if data.len() != expected {
            return Err(RgbdError::InvalidDataLength {
                expected,
                actual: data.len(),
            });
        }
        let data = data
            .par_chunks_exact(3)
            .map(|px| {
                [
                    px[order[0]] as f32 / 255.0,
                    px[order[1]] as f32 / 255.0,
                    px[order[2]] as f32 / 255.0,
                ]
            })
            .collect();
        Ok(Self { size, data })
    }

    /// The size of the color image.
    pub fn size(&self) -> ImageSize {
        self.size
    }

    /// The raw row-major pixel values.
    pub fn as_slice(&self) -> &[[f32; 3]] {
        &self.data
    }

    /// Get the color at pixel `(u, v)`, or `None` when out of bounds.
    #[inline]
    pub fn get(&self, u: usize, v: usize) -> Option<[f32; 3]> {
        if u >= self.size.width || v >= self.size.height {
            return None;
        }
        self.data.get(v * self.size.width + u).copied()
    }
}

/// Whether a depth value corresponds to a measured surface.
#[inline]
pub fn is_valid_depth(z: f32) -> bool {
    z > 0.0 && z.is_finite()
}

/// Count the pixels of a depth map that hold a valid measurement.
pub fn count_valid_depth(depth: &DepthMap) -> usize {
    depth
        .as_slice()
        .par_iter()
        .filter(|&&z| is_valid_depth(z))
        .count()
}

/// Backproject a depth map and its aligned color image into a colored point cloud.
///
/// Every pixel `(u, v)` with a valid depth `z` produces the point
/// `((u - cx) * z / fx, -(v - cy) * z / fy, z)` colored with `color[v][u]`.
/// Pixels without a valid depth are dropped. Points are emitted in row-major
/// pixel order.
///
/// # Arguments
///
/// * `depth` - The depth map.
/// * `color` - The color image, same size as `depth`.
/// * `intrinsics` - The camera intrinsics.
///
/// # Errors
///
/// Fails with [`RgbdError::InvalidIntrinsics`] if the focal lengths are not
/// positive, and with [`RgbdError::DimensionMismatch`] if the frame sizes differ.
/// A frame without valid pixels yields an empty point cloud.
///
/// Example:
/// ```
/// use depthcloud_3d::camera::CameraIntrinsics;
/// use depthcloud_3d::rgbd::{backproject_depth, ColorImage, DepthMap, ImageSize};
///
/// let size = ImageSize { width: 2, height: 2 };
/// let depth = DepthMap::from_size_val(size, 1.0);
/// let color = ColorImage::from_size_val(size, [1.0, 0.0, 0.0]);
/// let intrinsics = CameraIntrinsics::new(1.0, 1.0, 0.0, 0.0);
///
/// let cloud = backproject_depth(&depth, &color, &intrinsics).unwrap();
/// assert_eq!(cloud.len(), 4);
/// ```
pub fn backproject_depth(
    depth: &DepthMap,
    color: &ColorImage,
    intrinsics: &CameraIntrinsics,
) -> Result<PointCloud, RgbdError> {
    intrinsics.validate()?;

    if depth.size() != color.size() {
        return Err(RgbdError::DimensionMismatch {
            depth: depth.size(),
            color: color.size(),
        });
    }

    let width = depth.width();

    let (points, colors): (Vec<[f64; 3]>, Vec<[f32; 3]>) = depth
        .as_slice()
        .par_iter()
        .zip(color.as_slice().par_iter())
        .enumerate()
        .filter(|&(_, (&z, _))| is_valid_depth(z))
        .map(|(idx, (&z, &rgb))| {
            let u = (idx % width) as f64;
            let v = (idx / width) as f64;
            (intrinsics.backproject(u, v, z as f64), rgb)
        })
        .unzip();

    let cloud = PointCloud::from_aligned(points, colors, None);

    log::debug!(
        "backprojected {} of {} pixels from a {} depth map",
        cloud.len(),
        depth.size().num_pixels(),
        depth.size()
    );

    Ok(cloud)
}
