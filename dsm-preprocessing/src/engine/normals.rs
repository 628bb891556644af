//! k-nearest-neighbour normal estimation.
use crate::error::{PrepError, PrepResult};
use nalgebra::{Matrix3, SymmetricEigen, Vector3};
use rayon::prelude::*;
use rstar::RTree;

/// Unit normal per point from the plane fitted to its `knn` nearest
/// neighbours (the point itself included). Normals are flipped to point up.
pub fn estimate_normals(points: &[[f64; 3]], knn: usize) -> PrepResult<Vec<[f64; 3]>> {
    let knn = knn.max(3);
    if points.len() < knn {
        return Err(PrepError::InsufficientPoints {
            required: knn,
            found: points.len(),
        });
    }
    let tree = RTree::bulk_load(points.to_vec());

    Ok(points
        .par_iter()
        .map(|p| {
            let neighbours: Vec<&[f64; 3]> = tree.nearest_neighbor_iter(p).take(knn).collect();
            plane_normal(&neighbours)
        })
        .collect())
}

fn plane_normal(neighbours: &[&[f64; 3]]) -> [f64; 3] {
    let n = neighbours.len() as f64;
    let centroid = neighbours
        .iter()
        .fold(Vector3::zeros(), |acc, p| acc + Vector3::new(p[0], p[1], p[2]))
        / n;

    let covariance = neighbours.iter().fold(Matrix3::zeros(), |acc, p| {
        let d = Vector3::new(p[0], p[1], p[2]) - centroid;
        acc + d * d.transpose()
    }) / n;

    let eigen = SymmetricEigen::new(covariance);
    let smallest = eigen.eigenvalues.imin();
    let mut normal: Vector3<f64> = eigen.eigenvectors.column(smallest).into_owned();
    if normal.z < 0.0 {
        normal = -normal;
    }
    let norm = normal.norm();
    if norm > 0.0 {
        normal /= norm;
    }
    [normal.x, normal.y, normal.z]
}
