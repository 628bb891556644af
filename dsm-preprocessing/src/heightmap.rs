/// Point to elevation raster binning
use crate::affine::AffineTransform;
use crate::bounds::PointCloudBounds;
use crate::error::{PrepError, PrepResult};
use crate::grid::RasterGrid;
use constants::registration::RASTER_NODATA;
use ndarray::Array2;

/// Bins points into square cells keeping the highest elevation per cell.
///
/// Cell centres sit on `min_x + i * resolution` and `max_y - j * resolution`,
/// so points lying on cell centres round-trip to the same cell. Empty cells
/// get the nodata sentinel.
pub struct MaxBinRasterizer {
    resolution: f64,
    nodata: f64,
}

impl MaxBinRasterizer {
    pub fn new(resolution: f64) -> Self {
        Self {
            resolution,
            nodata: RASTER_NODATA,
        }
    }

    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.nodata = nodata;
        self
    }

    /// Rasterize `points` over their own extent
    pub fn rasterize(&self, points: &[[f64; 3]]) -> PrepResult<RasterGrid> {
        if !(self.resolution.is_finite() && self.resolution > 0.0) {
            return Err(PrepError::configuration(format!(
                "raster resolution must be greater than 0, got {}",
                self.resolution
            )));
        }
        let bounds = PointCloudBounds::from_points(points);
        if !bounds.is_valid() {
            return Err(PrepError::EmptyData("no points to rasterize".to_string()));
        }

        let (width, height, _) = bounds.dimensions();
        let cols = (width / self.resolution).round() as usize + 1;
        let rows = (height / self.resolution).round() as usize + 1;

        let mut values = Array2::from_elem((rows, cols), f64::NEG_INFINITY);
        for p in points {
            let col = self.cell_index(p[0] - bounds.min_x, cols);
            let row = self.cell_index(bounds.max_y - p[1], rows);
            let cell = &mut values[[row, col]];
            if p[2] > *cell {
                *cell = p[2];
            }
        }
        let nodata = self.nodata;
        values.mapv_inplace(|v| if v == f64::NEG_INFINITY { nodata } else { v });

        let half = self.resolution / 2.0;
        Ok(RasterGrid {
            values,
            transform: AffineTransform::north_up(
                bounds.min_x - half,
                bounds.max_y + half,
                self.resolution,
            ),
            nodata: Some(self.nodata),
            crs: None,
            area_or_point: Some("Area".to_string()),
        })
    }

    fn cell_index(&self, offset: f64, len: usize) -> usize {
        ((offset / self.resolution).round().max(0.0) as usize).min(len - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_the_highest_point_per_cell() {
        let points = vec![
            [0.0, 0.0, 1.0],
            [0.2, 0.1, 3.0],
            [2.0, 0.0, 5.0],
            [2.0, 2.0, 7.0],
        ];
        let grid = MaxBinRasterizer::new(1.0).rasterize(&points).unwrap();
        assert_eq!(grid.values.dim(), (3, 3));
        // Row 0 is the northern edge (y = 2).
        assert_eq!(grid.values[[2, 0]], 3.0);
        assert_eq!(grid.values[[2, 2]], 5.0);
        assert_eq!(grid.values[[0, 2]], 7.0);
        assert_eq!(grid.values[[1, 1]], RASTER_NODATA);
        assert_eq!(grid.transform.origin(), (-0.5, 2.5));
    }

    #[test]
    fn empty_input_and_bad_resolution_fail() {
        assert!(matches!(
            MaxBinRasterizer::new(1.0).rasterize(&[]),
            Err(PrepError::EmptyData(_))
        ));
        assert!(matches!(
            MaxBinRasterizer::new(0.0).rasterize(&[[0.0, 0.0, 0.0]]),
            Err(PrepError::Configuration(_))
        ));
    }
}
