//! Elevation grid containers shared by the pipeline stages.
use crate::affine::AffineTransform;
use crate::crs::Crs;
use ndarray::{Array2, s};
use serde::{Deserialize, Serialize};

/// Whether a cell value describes the cell centre (Area) or its corner (Point).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AreaOrPoint {
    #[default]
    Area,
    Point,
}

impl AreaOrPoint {
    /// Interpret an `AREA_OR_POINT` tag. Returns `None` when the tag is
    /// missing or unrecognised so the caller can record the fallback.
    pub fn from_tag(tag: Option<&str>) -> Option<Self> {
        match tag.map(str::trim) {
            Some(t) if t.eq_ignore_ascii_case("area") => Some(AreaOrPoint::Area),
            Some(t) if t.eq_ignore_ascii_case("point") => Some(AreaOrPoint::Point),
            _ => None,
        }
    }

    /// Pixel offset applied before transforming an index to world space.
    pub fn pixel_offset(self) -> f64 {
        match self {
            AreaOrPoint::Area => 0.5,
            AreaOrPoint::Point => 0.0,
        }
    }
}

/// Rectangular pixel region of a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelWindow {
    pub col_off: usize,
    pub row_off: usize,
    pub width: usize,
    pub height: usize,
}

impl PixelWindow {
    pub fn new(col_off: usize, row_off: usize, width: usize, height: usize) -> Self {
        Self {
            col_off,
            row_off,
            width,
            height,
        }
    }

    /// Whole grid of `(rows, cols)`.
    pub fn full(shape: (usize, usize)) -> Self {
        Self::new(0, 0, shape.1, shape.0)
    }

    /// Build from fractional pixel bounds, flooring the start and ceiling the
    /// end, clamped to a grid of `(rows, cols)`.
    pub fn from_pixel_bounds(
        col_min: f64,
        row_min: f64,
        col_max: f64,
        row_max: f64,
        shape: (usize, usize),
    ) -> Self {
        let clamp = |v: f64, hi: usize| -> usize { v.max(0.0).min(hi as f64) as usize };
        let c0 = clamp(col_min.floor(), shape.1);
        let r0 = clamp(row_min.floor(), shape.0);
        let c1 = clamp(col_max.ceil(), shape.1).max(c0);
        let r1 = clamp(row_max.ceil(), shape.0).max(r0);
        Self::new(c0, r0, c1 - c0, r1 - r0)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// `(rows, cols)` of the window.
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Part of this window inside a grid of `(rows, cols)`.
    pub fn clamped_to(&self, shape: (usize, usize)) -> Self {
        let c0 = self.col_off.min(shape.1);
        let r0 = self.row_off.min(shape.0);
        let c1 = (self.col_off + self.width).min(shape.1);
        let r1 = (self.row_off + self.height).min(shape.0);
        Self::new(c0, r0, c1 - c0, r1 - r0)
    }
}

/// True where a cell is neither NaN nor the nodata sentinel.
pub fn validity_mask(values: &Array2<f64>, nodata: Option<f64>) -> Array2<bool> {
    values.mapv(|v| is_valid(v, nodata))
}

#[inline]
pub fn is_valid(value: f64, nodata: Option<f64>) -> bool {
    !value.is_nan() && nodata.is_none_or(|nd| value != nd)
}

/// Crop a grid to a window. The window must lie inside the grid.
pub fn crop(values: &Array2<f64>, window: &PixelWindow) -> Array2<f64> {
    values
        .slice(s![
            window.row_off..window.row_off + window.height,
            window.col_off..window.col_off + window.width
        ])
        .to_owned()
}

/// Raster as handed back by a raster or point cloud engine.
#[derive(Debug, Clone)]
pub struct RasterGrid {
    pub values: Array2<f64>,
    pub transform: AffineTransform,
    pub nodata: Option<f64>,
    pub crs: Option<Crs>,
    /// Raw `AREA_OR_POINT` tag, if the source carried one.
    pub area_or_point: Option<String>,
}

impl RasterGrid {
    pub fn shape(&self) -> (usize, usize) {
        self.values.dim()
    }
}

/// Resolution- and unit-normalized elevation surface.
///
/// The validity mask is derived once from the elevations at construction and
/// the snapshot is never mutated afterwards, so the mask cannot go stale.
#[derive(Debug, Clone)]
pub struct MaterializedGrid {
    elevation: Array2<f64>,
    mask: Array2<bool>,
    pub transform: AffineTransform,
    pub nodata: Option<f64>,
    pub crs: Option<Crs>,
    pub area_or_point: AreaOrPoint,
    /// Full-extent, native pixel frame (metres) that windows refer to.
    pub frame: AffineTransform,
    /// `(rows, cols)` of the native frame.
    pub frame_shape: (usize, usize),
    pub window: Option<PixelWindow>,
}

impl MaterializedGrid {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        elevation: Array2<f64>,
        transform: AffineTransform,
        nodata: Option<f64>,
        crs: Option<Crs>,
        area_or_point: AreaOrPoint,
        frame: AffineTransform,
        frame_shape: (usize, usize),
        window: Option<PixelWindow>,
    ) -> Self {
        let mask = validity_mask(&elevation, nodata);
        Self {
            elevation,
            mask,
            transform,
            nodata,
            crs,
            area_or_point,
            frame,
            frame_shape,
            window,
        }
    }

    pub fn elevation(&self) -> &Array2<f64> {
        &self.elevation
    }

    pub fn mask(&self) -> &Array2<bool> {
        &self.mask
    }

    /// `(rows, cols)`
    pub fn shape(&self) -> (usize, usize) {
        self.elevation.dim()
    }

    pub fn valid_count(&self) -> usize {
        self.mask.iter().filter(|v| **v).count()
    }
}
