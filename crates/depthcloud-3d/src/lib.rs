#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Pinhole camera intrinsics.
pub mod camera;

/// Point cloud filters (statistical outlier removal, voxel downsampling).
pub mod filters;

/// Kd-tree spatial index.
pub mod kdtree;

/// Surface normal estimation and orientation.
pub mod normals;

/// Operations on 3D points.
pub mod ops;

/// Point cloud container.
pub mod pointcloud;

/// Depth and color frames, and depth backprojection.
pub mod rgbd;

/// Disjoint-set forest used by the orientation spanning tree.
pub mod union_find;
