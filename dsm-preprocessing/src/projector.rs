//! Grid to point cloud projection.
use crate::affine::AffineTransform;
use crate::grid::AreaOrPoint;
use ndarray::Array2;
use rayon::prelude::*;

/// Project every valid cell of `elevation` to a world `[x, y, z]` point.
///
/// Cells flagged false in `mask` are skipped. Under the Area convention the
/// cell index is shifted by half a pixel so the point lands on the cell
/// centre. Points come out in row-major order.
pub fn project_points(
    elevation: &Array2<f64>,
    mask: &Array2<bool>,
    transform: &AffineTransform,
    convention: AreaOrPoint,
) -> Vec<[f64; 3]> {
    let (rows, cols) = elevation.dim();
    let offset = convention.pixel_offset();
    (0..rows)
        .into_par_iter()
        .flat_map_iter(|r| {
            (0..cols).filter(move |c| mask[[r, *c]]).map(move |c| {
                let (x, y) = transform.apply(c as f64 + offset, r as f64 + offset);
                [x, y, elevation[[r, c]]]
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::validity_mask;
    use crate::heightmap::MaxBinRasterizer;

    #[test]
    fn area_convention_is_offset_by_half_a_pixel() {
        let elevation = Array2::from_shape_fn((3, 4), |(r, c)| (r * 4 + c) as f64);
        let mask = Array2::from_elem((3, 4), true);
        let t = AffineTransform::north_up(100.0, 50.0, 2.0);

        let area = project_points(&elevation, &mask, &t, AreaOrPoint::Area);
        let point = project_points(&elevation, &mask, &t, AreaOrPoint::Point);
        assert_eq!(area.len(), 12);
        for (a, p) in area.iter().zip(point.iter()) {
            // Half a 2 m pixel east and half a pixel south.
            assert!((a[0] - p[0] - 1.0).abs() < 1e-12);
            assert!((a[1] - p[1] + 1.0).abs() < 1e-12);
            assert_eq!(a[2], p[2]);
        }
        assert_eq!(point[0], [100.0, 50.0, 0.0]);
    }

    #[test]
    fn invalid_cells_are_skipped() {
        let elevation = ndarray::array![[1.0, -9999.0], [f64::NAN, 4.0]];
        let mask = validity_mask(&elevation, Some(-9999.0));
        let t = AffineTransform::north_up(0.0, 2.0, 1.0);
        let points = project_points(&elevation, &mask, &t, AreaOrPoint::Area);
        assert_eq!(points.len(), 2);
        assert_eq!(points.len(), mask.iter().filter(|v| **v).count());
        assert_eq!(points[0], [0.5, 1.5, 1.0]);
        assert_eq!(points[1], [1.5, 0.5, 4.0]);
    }

    #[test]
    fn rebinning_projected_points_reproduces_the_grid() {
        let elevation =
            Array2::from_shape_fn((6, 8), |(r, c)| 10.0 + (r as f64 * 0.7).sin() + c as f64 * 0.25);
        let mask = Array2::from_elem((6, 8), true);
        let t = AffineTransform::north_up(500.0, 300.0, 1.5);
        let points = project_points(&elevation, &mask, &t, AreaOrPoint::Area);

        let raster = MaxBinRasterizer::new(1.5).rasterize(&points).unwrap();
        assert_eq!(raster.values.dim(), (6, 8));
        for (a, b) in raster.values.iter().zip(elevation.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }
}
