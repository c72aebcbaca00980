use rayon::prelude::*;
use std::collections::HashMap;

use super::FilterError;
use crate::ops::normalize;
use crate::pointcloud::PointCloud;

// Running sums for the points that fall in one voxel.
#[derive(Default)]
struct VoxelAccumulator {
    position: [f64; 3],
    color: [f64; 3],
    normal: [f64; 3],
    first_normal: [f64; 3],
    count: usize,
}

/// A 3D voxel grid for downsampling point clouds.
#[derive(Debug, Clone)]
pub struct VoxelGrid {
    /// Edge length of the cubic voxels.
    voxel_size: f64,
    /// Minimum number of points required per voxel.
    min_points_per_voxel: usize,
}

impl VoxelGrid {
    /// Creates a new `VoxelGrid` with cubic voxels of edge `voxel_size`.
    ///
    /// # Errors
    ///
    /// Fails if `voxel_size` is not a positive finite number.
    pub fn new(voxel_size: f64) -> Result<Self, FilterError> {
        if !(voxel_size > 0.0 && voxel_size.is_finite()) {
            return Err(FilterError::InvalidParameter {
                name: "voxel_size",
                value: voxel_size,
            });
        }
        Ok(VoxelGrid {
            voxel_size,
            min_points_per_voxel: 1,
        })
    }

    /// Gets the voxel edge length.
    pub fn voxel_size(&self) -> f64 {
        self.voxel_size
    }

    /// Sets the minimum number of points a voxel needs to produce an output point.
    ///
    /// A value of zero is treated as one.
    pub fn set_min_points_per_voxel(&mut self, min_points: usize) {
        self.min_points_per_voxel = min_points.max(1);
    }

    /// Gets the minimum number of points required per voxel.
    pub fn min_points_per_voxel(&self) -> usize {
        self.min_points_per_voxel
    }

    /// Computes the voxel index for a given point: `floor(p / voxel_size)` per axis.
    ///
    /// # Arguments
    /// * `point` - The input point as `[x, y, z]`.
    pub fn voxel_index(&self, point: &[f64; 3]) -> [i64; 3] {
        [
            (point[0] / self.voxel_size).floor() as i64,
            (point[1] / self.voxel_size).floor() as i64,
            (point[2] / self.voxel_size).floor() as i64,
        ]
    }

    /// Downsamples the input point cloud by replacing the points of every
    /// occupied voxel with their centroid.
    ///
    /// Colors are averaged per voxel. Normals, when present, are averaged and
    /// re-normalized. Output points follow the order in which voxels are first
    /// occupied while scanning the input.
    ///
    /// Example:
    /// ```
    /// use depthcloud_3d::filters::VoxelGrid;
    /// use depthcloud_3d::pointcloud::PointCloud;
    ///
    /// let cloud = PointCloud::new(
    ///     vec![[0.1, 0.1, 0.1], [0.3, 0.3, 0.3], [1.5, 0.1, 0.1]],
    ///     vec![[0.0; 3], [1.0; 3], [0.5; 3]],
    ///     None,
    /// )
    /// .unwrap();
    /// let grid = VoxelGrid::new(1.0).unwrap();
    /// let downsampled = grid.downsample(&cloud);
    /// assert_eq!(downsampled.len(), 2);
    /// ```
    pub fn downsample(&self, cloud: &PointCloud) -> PointCloud {
        let keys = cloud
            .points()
            .par_iter()
            .map(|p| self.voxel_index(p))
            .collect::<Vec<_>>();

        // Group points into voxels
        let mut slots: HashMap<[i64; 3], usize> = HashMap::new();
        let mut voxels: Vec<VoxelAccumulator> = Vec::new();
        let normals = cloud.normals();

        for (i, key) in keys.iter().enumerate() {
            let slot = *slots.entry(*key).or_insert_with(|| {
                voxels.push(VoxelAccumulator::default());
                voxels.len() - 1
            });
            let acc = &mut voxels[slot];
            let p = &cloud.points()[i];
            let c = &cloud.colors()[i];
            for k in 0..3 {
                acc.position[k] += p[k];
                acc.color[k] += c[k] as f64;
            }
            if let Some(normals) = normals {
                let n = &normals[i];
                if acc.count == 0 {
                    acc.first_normal = *n;
                }
                for k in 0..3 {
                    acc.normal[k] += n[k];
                }
            }
            acc.count += 1;
        }

        // Compute centroids for each voxel
        let mut points = Vec::with_capacity(voxels.len());
        let mut colors = Vec::with_capacity(voxels.len());
        let mut out_normals = normals.map(|_| Vec::with_capacity(voxels.len()));

        for acc in voxels
            .iter()
            .filter(|acc| acc.count >= self.min_points_per_voxel)
        {
            let inv_count = 1.0 / acc.count as f64;
            points.push(acc.position.map(|v| v * inv_count));
            colors.push(acc.color.map(|v| (v * inv_count) as f32));
            if let Some(out_normals) = out_normals.as_mut() {
                // opposite normals cancel: keep the first one
                let mean = acc.normal.map(|v| v * inv_count);
                out_normals.push(normalize(&mean).unwrap_or(acc.first_normal));
            }
        }

        PointCloud::from_aligned(points, colors, out_normals)
    }
}
