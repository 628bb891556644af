/// Homogeneous 4x4 coordinate transforms applied to point sets.
use rayon::prelude::*;

/// Row-major 4x4 matrix, as carried by `filters.transformation`.
pub type Matrix4 = [f64; 16];

pub const IDENTITY: Matrix4 = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// Scale horizontal and vertical axes independently about the origin.
pub fn scale_matrix(horizontal: f64, vertical: f64) -> Matrix4 {
    [
        horizontal, 0.0, 0.0, 0.0, //
        0.0, horizontal, 0.0, 0.0, //
        0.0, 0.0, vertical, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]
}

/// Apply transformation matrix to a single point.
pub fn transform_coordinates(m: &Matrix4, x: f64, y: f64, z: f64) -> (f64, f64, f64) {
    let input = [x, y, z, 1.0];
    let mut output = [0.0; 4];

    for i in 0..4 {
        for j in 0..4 {
            output[i] += m[i * 4 + j] * input[j];
        }
    }

    let w = if output[3] != 0.0 { output[3] } else { 1.0 };
    (output[0] / w, output[1] / w, output[2] / w)
}

/// Apply transformation matrix to every point in place.
pub fn transform_points(m: &Matrix4, points: &mut [[f64; 3]]) {
    if *m == IDENTITY {
        return;
    }
    points.par_iter_mut().for_each(|p| {
        let (x, y, z) = transform_coordinates(m, p[0], p[1], p[2]);
        *p = [x, y, z];
    });
}
