use thiserror::Error;

/// Error types for point cloud construction.
#[derive(Debug, Error, PartialEq)]
pub enum PointCloudError {
    /// The number of colors does not match the number of points.
    #[error("Number of colors ({colors}) does not match the number of points ({points})")]
    ColorsLengthMismatch {
        /// Number of points
        points: usize,
        /// Number of colors
        colors: usize,
    },

    /// The number of normals does not match the number of points.
    #[error("Number of normals ({normals}) does not match the number of points ({points})")]
    NormalsLengthMismatch {
        /// Number of points
        points: usize,
        /// Number of normals
        normals: usize,
    },
}

/// A point cloud with points, colors, and normals.
///
/// Points are in camera space. Colors are RGB in `[0, 1]` and always present;
/// normals are optional. All attributes are index-aligned with the points.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    // The points in the point cloud.
    points: Vec<[f64; 3]>,
    // The colors of the points.
    colors: Vec<[f32; 3]>,
    // The normals of the points.
    normals: Option<Vec<[f64; 3]>>,
}

impl PointCloud {
    /// Create a new point cloud from points, colors, and normals (optional).
    ///
    /// Fails when the attribute lengths differ from the number of points.
    pub fn new(
        points: Vec<[f64; 3]>,
        colors: Vec<[f32; 3]>,
        normals: Option<Vec<[f64; 3]>>,
    ) -> Result<Self, PointCloudError> {
        if colors.len() != points.len() {
            return Err(PointCloudError::ColorsLengthMismatch {
                points: points.len(),
                colors: colors.len(),
            });
        }
        if let Some(normals) = &normals {
            if normals.len() != points.len() {
                return Err(PointCloudError::NormalsLengthMismatch {
                    points: points.len(),
                    normals: normals.len(),
                });
            }
        }
        Ok(Self {
            points,
            colors,
            normals,
        })
    }

    // Attributes built in lockstep with the points by this crate's stages.
    pub(crate) fn from_aligned(
        points: Vec<[f64; 3]>,
        colors: Vec<[f32; 3]>,
        normals: Option<Vec<[f64; 3]>>,
    ) -> Self {
        debug_assert_eq!(points.len(), colors.len());
        debug_assert!(normals.as_ref().map_or(true, |n| n.len() == points.len()));
        Self {
            points,
            colors,
            normals,
        }
    }

    /// Create an empty point cloud.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Get the number of points in the point cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Get as reference the points in the point cloud.
    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// Get as reference the colors of the points in the point cloud.
    pub fn colors(&self) -> &[[f32; 3]] {
        &self.colors
    }

    /// Get as reference the normals of the points in the point cloud.
    pub fn normals(&self) -> Option<&[[f64; 3]]> {
        self.normals.as_deref()
    }

    /// Borrow the points together with mutable normals, for in-place orientation.
    pub fn points_and_normals_mut(&mut self) -> (&[[f64; 3]], Option<&mut [[f64; 3]]>) {
        (&self.points, self.normals.as_deref_mut())
    }

    /// Check if the point cloud carries normals.
    #[inline]
    pub fn has_normals(&self) -> bool {
        self.normals.is_some()
    }

    /// Attach normals to the point cloud, replacing any existing ones.
    pub fn with_normals(self, normals: Vec<[f64; 3]>) -> Result<Self, PointCloudError> {
        Self::new(self.points, self.colors, Some(normals))
    }

    /// Drop the normals of the point cloud.
    pub fn without_normals(mut self) -> Self {
        self.normals = None;
        self
    }

    /// Build a new point cloud from the points at `indices`, in that order.
    ///
    /// Colors and normals are selected identically so the output stays
    /// index-aligned.
    ///
    /// PRECONDITION: every index is smaller than [`PointCloud::len`].
    pub fn select_by_index(&self, indices: &[usize]) -> Self {
        let points = indices.iter().map(|&i| self.points[i]).collect();
        let colors = indices.iter().map(|&i| self.colors[i]).collect();
        let normals = self
            .normals
            .as_ref()
            .map(|normals| indices.iter().map(|&i| normals[i]).collect());
        Self {
            points,
            colors,
            normals,
        }
    }

    /// Get the minimum bound of the point cloud. Returns zeros if empty.
    pub fn get_min_bound(&self) -> [f64; 3] {
        self.fold_bound(f64::min)
    }

    /// Get the maximum bound of the point cloud. Returns zeros if empty.
    pub fn get_max_bound(&self) -> [f64; 3] {
        self.fold_bound(f64::max)
    }

    fn fold_bound(&self, f: impl Fn(f64, f64) -> f64) -> [f64; 3] {
        let Some(first) = self.points.first() else {
            return [0.0; 3];
        };
        self.points.iter().fold(*first, |acc, p| {
            [f(acc[0], p[0]), f(acc[1], p[1]), f(acc[2], p[2])]
        })
    }

    /// Mean position of the points, or `None` if the cloud is empty.
    pub fn centroid(&self) -> Option<[f64; 3]> {
        if self.points.is_empty() {
            return None;
        }
        let inv_n = 1.0 / self.points.len() as f64;
        let sum = self.points.iter().fold([0.0; 3], |acc, p| {
            [acc[0] + p[0], acc[1] + p[1], acc[2] + p[2]]
        });
        Some([sum[0] * inv_n, sum[1] * inv_n, sum[2] * inv_n])
    }

    /// Consume the point cloud and return its points, colors and normals.
    #[allow(clippy::type_complexity)]
    pub fn into_parts(self) -> (Vec<[f64; 3]>, Vec<[f32; 3]>, Option<Vec<[f64; 3]>>) {
        (self.points, self.colors, self.normals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointcloud() -> Result<(), PointCloudError> {
        let pointcloud = PointCloud::new(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
            vec![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            Some(vec![[0.0, 1.0, 0.0], [1.0, 0.0, 0.0]]),
        )?;

        assert_eq!(pointcloud.len(), 2);
        assert_eq!(pointcloud.points().len(), 2);
        assert_eq!(pointcloud.colors().len(), 2);
        assert_eq!(pointcloud.normals().map(|n| n.len()), Some(2));

        if let Some(p1) = pointcloud.points().last() {
            assert_eq!(*p1, [1.0, 0.0, 0.0]);
        }
        Ok(())
    }

    #[test]
    fn test_length_mismatch() {
        let res = PointCloud::new(vec![[0.0; 3]; 2], vec![[0.0; 3]], None);
        assert_eq!(
            res,
            Err(PointCloudError::ColorsLengthMismatch {
                points: 2,
                colors: 1
            })
        );

        let res = PointCloud::new(vec![[0.0; 3]; 2], vec![[0.0; 3]; 2], Some(vec![]));
        assert!(matches!(
            res,
            Err(PointCloudError::NormalsLengthMismatch { normals: 0, .. })
        ));
    }

    #[test]
    fn test_select_by_index() -> Result<(), PointCloudError> {
        let pointcloud = PointCloud::new(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]],
            vec![[0.0; 3], [0.5; 3], [1.0; 3]],
            Some(vec![[0.0, 0.0, 1.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]]),
        )?;
        let selected = pointcloud.select_by_index(&[2, 0]);
        assert_eq!(selected.points(), &[[2.0, 0.0, 0.0], [0.0, 0.0, 0.0]]);
        assert_eq!(selected.colors(), &[[1.0; 3], [0.0; 3]]);
        assert_eq!(
            selected.normals(),
            Some(&[[1.0, 0.0, 0.0], [0.0, 0.0, 1.0]][..])
        );
        assert!(pointcloud.select_by_index(&[]).is_empty());
        Ok(())
    }

    #[test]
    fn test_bounds_and_centroid() -> Result<(), PointCloudError> {
        let pointcloud = PointCloud::new(
            vec![[0.0, -1.0, 2.0], [1.0, 1.0, 0.0]],
            vec![[0.0; 3]; 2],
            None,
        )?;
        assert_eq!(pointcloud.get_min_bound(), [0.0, -1.0, 0.0]);
        assert_eq!(pointcloud.get_max_bound(), [1.0, 1.0, 2.0]);
        assert_eq!(pointcloud.centroid(), Some([0.5, 0.0, 1.0]));

        let empty = PointCloud::empty();
        assert_eq!(empty.get_min_bound(), [0.0; 3]);
        assert!(empty.centroid().is_none());
        Ok(())
    }

    #[test]
    fn test_with_and_without_normals() -> Result<(), PointCloudError> {
        let pointcloud = PointCloud::new(vec![[0.0; 3]], vec![[0.0; 3]], None)?;
        let with = pointcloud.with_normals(vec![[0.0, 0.0, 1.0]])?;
        assert!(with.has_normals());
        assert!(!with.clone().without_normals().has_normals());
        assert!(with.clone().with_normals(vec![]).is_err());

        let mut flipped = with;
        if let (_, Some(normals)) = flipped.points_and_normals_mut() {
            normals[0][2] = -1.0;
        }
        assert_eq!(flipped.normals(), Some(&[[0.0, 0.0, -1.0]][..]));
        Ok(())
    }
}
