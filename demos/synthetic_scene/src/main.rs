use argh::FromArgs;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::path::PathBuf;

use depthcloud::k3d::{
    ops::dot,
    pointcloud::PointCloud,
    rgbd::{ColorImage, DepthMap, ImageSize},
};
use depthcloud::{
    BoxError, DepthEstimator, FieldOfViewIntrinsics, IntrinsicsExtractor, Reconstruction,
    RefinementConfig, SurfaceReconstructor,
};

#[derive(FromArgs)]
/// Reconstruct a refined point cloud from a synthetic depth frame
struct Args {
    /// image width in pixels
    #[argh(option, default = "160")]
    width: usize,

    /// image height in pixels
    #[argh(option, default = "120")]
    height: usize,

    /// horizontal field of view in degrees
    #[argh(option, default = "60.0")]
    fov: f64,

    /// amplitude of the uniform depth noise
    #[argh(option, default = "0.002")]
    noise: f32,

    /// number of pixels replaced by a random depth
    #[argh(option, default = "200")]
    outliers: usize,

    /// fraction of pixels without a depth measurement
    #[argh(option, default = "0.05")]
    invalid_ratio: f64,

    /// voxel size of the downsampler
    #[argh(option)]
    voxel_size: Option<f64>,

    /// path to a JSON refinement config
    #[argh(option)]
    config: Option<PathBuf>,

    /// seed of the scene noise
    #[argh(option, default = "0")]
    seed: u64,
}

// A sphere in front of a slanted wall, with noise, holes and spikes.
struct SyntheticDepth {
    intrinsics: FieldOfViewIntrinsics,
    noise: f32,
    outliers: usize,
    invalid_ratio: f64,
    seed: u64,
}

const SPHERE_CENTER: [f64; 3] = [0.0, 0.0, 2.5];
const SPHERE_RADIUS: f64 = 0.6;
const WALL_NORMAL: [f64; 3] = [-0.2, 0.0, 1.0];
const WALL_OFFSET: f64 = 4.0;

fn scene_depth(ray: &[f64; 3]) -> f64 {
    let wall = WALL_OFFSET / dot(&WALL_NORMAL, ray);

    // nearest intersection of the ray with the sphere, if any
    let a = dot(ray, ray);
    let b = dot(ray, &SPHERE_CENTER);
    let c = dot(&SPHERE_CENTER, &SPHERE_CENTER) - SPHERE_RADIUS * SPHERE_RADIUS;
    let disc = b * b - a * c;
    if disc < 0.0 {
        return wall;
    }
    let t = (b - disc.sqrt()) / a;
    if t > 0.0 {
        t.min(wall)
    } else {
        wall
    }
}

impl DepthEstimator for SyntheticDepth {
    fn estimate_depth(&self, image: &ColorImage) -> Result<DepthMap, BoxError> {
        let size = image.size();
        let intrinsics = self.intrinsics.extract_intrinsics(image)?;
        let mut rng = StdRng::seed_from_u64(self.seed);

        let mut data = Vec::with_capacity(size.num_pixels());
        for v in 0..size.height {
            for u in 0..size.width {
                let ray = intrinsics.backproject(u as f64, v as f64, 1.0);
                let z = scene_depth(&ray) as f32;
                let z = if rng.random_bool(self.invalid_ratio) {
                    if rng.random_bool(0.5) {
                        f32::NAN
                    } else {
                        0.0
                    }
                } else {
                    z + rng.random_range(-self.noise..=self.noise)
                };
                data.push(z);
            }
        }

        for _ in 0..self.outliers.min(data.len()) {
            let idx = rng.random_range(0..data.len());
            data[idx] = rng.random_range(0.5..8.0);
        }

        Ok(DepthMap::new(size, data)?)
    }
}

// Stands in for a mesher: reports the bounding box of the cloud.
struct BoundingBox;

impl SurfaceReconstructor for BoundingBox {
    type Mesh = ([f64; 3], [f64; 3]);

    fn reconstruct(&self, cloud: &PointCloud) -> Result<Self::Mesh, BoxError> {
        Ok((cloud.get_min_bound(), cloud.get_max_bound()))
    }
}

// color gradient, interleaved BGR
fn gradient_bgr8(size: ImageSize) -> Vec<u8> {
    let mut data = Vec::with_capacity(size.num_pixels() * 3);
    for v in 0..size.height {
        for u in 0..size.width {
            let r = (255 * u / size.width.max(1)) as u8;
            let g = (255 * v / size.height.max(1)) as u8;
            data.extend_from_slice(&[128, g, r]);
        }
    }
    data
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let mut config = match &args.config {
        Some(path) => RefinementConfig::from_json_file(path)?,
        None => RefinementConfig::default(),
    };
    if args.voxel_size.is_some() {
        config.voxel_size = args.voxel_size;
    }
    log::debug!("refinement config: {:?}", config);

    if !(0.0..=1.0).contains(&args.invalid_ratio) {
        return Err(format!("invalid_ratio must be in [0, 1], got {}", args.invalid_ratio).into());
    }

    let size = ImageSize {
        width: args.width,
        height: args.height,
    };
    let intrinsics = FieldOfViewIntrinsics {
        horizontal_fov_degrees: args.fov,
    };
    let depth_estimator = SyntheticDepth {
        intrinsics,
        noise: args.noise.abs(),
        outliers: args.outliers,
        invalid_ratio: args.invalid_ratio,
        seed: args.seed,
    };

    let driver = Reconstruction::new(depth_estimator, intrinsics, BoundingBox, config)?;
    let frame = driver.process_bgr8(size, &gradient_bgr8(size))?;

    let stats = &frame.cloud.stats;
    println!("Depth map: {}", frame.depth.size());
    println!("Backprojected points: #{}", stats.input_points);
    println!(
        "Outliers removed: #{} (mean neighbour distance {:.4}, std {:.4})",
        stats.outliers_removed, stats.mean_neighbor_distance, stats.std_neighbor_distance
    );
    if let Some(n) = stats.downsampled_points {
        println!("After downsampling: #{}", n);
    }
    if frame.cloud.normals_unavailable {
        println!("Normals: unavailable");
    } else if frame.cloud.cloud.has_normals() {
        println!(
            "Normals: #{} (fallback #{})",
            frame.cloud.cloud.len(),
            stats.fallback_normals
        );
    }
    if let Some(orientation) = stats.orientation {
        println!(
            "Orientation: {} components, {} flipped",
            orientation.components, orientation.flipped
        );
    }
    let (min, max) = frame.mesh;
    println!("Refined cloud: #{} points", frame.cloud.cloud.len());
    println!("Bounds: {:?} .. {:?}", min, max);

    Ok(())
}
