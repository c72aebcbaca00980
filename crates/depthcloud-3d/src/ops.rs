/// Utility function to compute the Euclidean distance between two points.
///
/// # Arguments
///
/// * `a` - A point in 3D space.
/// * `b` - Another point in 3D space.
///
/// # Returns
///
/// The Euclidean distance between the two points.
///
/// Example:
/// ```
/// use depthcloud_3d::ops::euclidean_distance;
///
/// let a = [1.0, 2.0, 3.0];
/// let b = [4.0, 5.0, 6.0];
/// let dst = euclidean_distance(&a, &b);
/// ```
pub fn euclidean_distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    squared_distance(a, b).sqrt()
}

/// Squared Euclidean distance between two points.
#[inline]
pub fn squared_distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

/// Dot product of two 3D vectors.
#[inline]
pub fn dot(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Euclidean norm of a 3D vector.
#[inline]
pub fn norm(a: &[f64; 3]) -> f64 {
    dot(a, a).sqrt()
}

/// Scale a vector to unit length.
///
/// Returns `None` when the vector has zero or non-finite length.
pub fn normalize(a: &[f64; 3]) -> Option<[f64; 3]> {
    let n = norm(a);
    if n > 0.0 && n.is_finite() {
        Some([a[0] / n, a[1] / n, a[2] / n])
    } else {
        None
    }
}

/// Negate a 3D vector.
#[inline]
pub fn negate(a: &[f64; 3]) -> [f64; 3] {
    [-a[0], -a[1], -a[2]]
}

/// Mean and sample standard deviation of a set of values.
///
/// The standard deviation uses the `n - 1` denominator and is zero for fewer
/// than two values. Returns `(0.0, 0.0)` for an empty slice.
pub fn mean_and_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let sq_sum = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
    (mean, (sq_sum / (n - 1.0)).sqrt())
}

/// Centroid and covariance matrix of the points selected by `indices`.
///
/// The covariance is normalised by the number of points. Returns `None` for an
/// empty selection.
pub fn centroid_and_covariance(
    points: &[[f64; 3]],
    indices: &[usize],
) -> Option<([f64; 3], [[f64; 3]; 3])> {
    if indices.is_empty() {
        return None;
    }
    let inv_n = 1.0 / indices.len() as f64;

    let mut centroid = [0.0; 3];
    for &i in indices {
        let p = &points[i];
        centroid[0] += p[0];
        centroid[1] += p[1];
        centroid[2] += p[2];
    }
    centroid.iter_mut().for_each(|c| *c *= inv_n);

    let mut cov = [[0.0; 3]; 3];
    for &i in indices {
        let d = [
            points[i][0] - centroid[0],
            points[i][1] - centroid[1],
            points[i][2] - centroid[2],
        ];
        for r in 0..3 {
            for c in r..3 {
                cov[r][c] += d[r] * d[c];
            }
        }
    }
    for r in 0..3 {
        for c in r..3 {
            cov[r][c] *= inv_n;
            cov[c][r] = cov[r][c];
        }
    }

    Some((centroid, cov))
}
