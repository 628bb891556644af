//! Resolution- and unit-normalized rasters from any source representation.
//!
//! Windows always refer to the source's native frame. For rasters that is
//! the source pixel grid with its transform scaled to metres; for point
//! clouds and meshes it is the full-extent rasterization at the working
//! resolution.
use crate::affine::{AffineTransform, compose_output_transform};
use crate::coordinates::scale_matrix;
use crate::crs::Crs;
use crate::diagnostics::{Diagnostics, StageName};
use crate::engine::{Pipeline, PointCloudEngine, RasterDescription, RasterEngine, ReadRequest};
use crate::error::{PrepError, PrepResult};
use crate::grid::{AreaOrPoint, MaterializedGrid, PixelWindow, crop, is_valid};
use crate::resolution::{ResolvedUnits, validate_target_resolution};
use constants::registration::RASTER_NODATA;
use std::path::Path;

/// Tolerance under which a resample factor counts as one.
const UNIT_RESAMPLE_EPSILON: f64 = 1e-9;

/// Inputs shared by every materialization.
#[derive(Debug, Clone, Copy)]
pub struct MaterializeRequest<'a> {
    pub label: &'a str,
    pub resolved: &'a ResolvedUnits,
    pub target_resolution: f64,
    pub window: Option<PixelWindow>,
}

/// Where a point-based source gets its points from.
#[derive(Debug, Clone, Copy)]
pub enum PointSource<'a> {
    Las(&'a Path),
    Memory(&'a [[f64; 3]]),
}

/// Resolve the `AREA_OR_POINT` tag, defaulting to Area with a warning.
pub fn resolve_area_or_point(tag: Option<&str>, label: &str, diag: &mut Diagnostics) -> AreaOrPoint {
    match AreaOrPoint::from_tag(tag) {
        Some(convention) => convention,
        None => {
            diag.warn(
                StageName::Materialize,
                label,
                "AREA_OR_POINT undefined -> assumed Area",
            );
            AreaOrPoint::Area
        }
    }
}

/// Read a raster at the working resolution.
///
/// The output shape is the window shape times `native / target`, truncated.
/// Elevations of valid cells are converted to metres; the transform is
/// composed with the resample scale first and the unit scale second.
pub fn materialize_raster(
    engine: &dyn RasterEngine,
    path: &Path,
    description: &RasterDescription,
    request: &MaterializeRequest<'_>,
    diag: &mut Diagnostics,
) -> PrepResult<MaterializedGrid> {
    let target = validate_target_resolution(request.target_resolution)?;
    let resolved = request.resolved;
    let frame_shape = description.shape;
    let window = request
        .window
        .unwrap_or_else(|| PixelWindow::full(frame_shape))
        .clamped_to(frame_shape);
    if window.is_empty() {
        return Err(PrepError::EmptyData(format!(
            "{} window lies outside the raster",
            request.label
        )));
    }

    let resample_factor = resolved.native_resolution / target;
    let out_shape = if (resample_factor - 1.0).abs() < UNIT_RESAMPLE_EPSILON {
        window.shape()
    } else {
        (
            (window.height as f64 * resample_factor) as usize,
            (window.width as f64 * resample_factor) as usize,
        )
    };
    if out_shape.0 == 0 || out_shape.1 == 0 {
        return Err(PrepError::EmptyData(format!(
            "{} window of {}x{} pixels is smaller than one {target} m cell",
            request.label, window.width, window.height
        )));
    }

    let read = ReadRequest {
        window: request.window.map(|_| window),
        out_shape: (out_shape != window.shape()).then_some(out_shape),
    };
    let grid = engine.read(path, &read)?;
    if grid.shape() != out_shape {
        return Err(PrepError::engine(
            "raster",
            format!(
                "asked for a {}x{} read, got {}x{}",
                out_shape.0,
                out_shape.1,
                grid.shape().0,
                grid.shape().1
            ),
        ));
    }

    let pixel_scale = (
        window.width as f64 / out_shape.1 as f64,
        window.height as f64 / out_shape.0 as f64,
    );
    let windowed = description.transform.window_transform(&window);
    let transform = compose_output_transform(&windowed, pixel_scale, resolved.horizontal_factor);
    if transform.is_identity() {
        diag.warn(
            StageName::Materialize,
            request.label,
            "output transform is the identity, check the georeferencing",
        );
    }

    let nodata = description.nodata;
    let units_factor = resolved.units_factor;
    let elevation = grid
        .values
        .mapv(|v| if is_valid(v, nodata) { v * units_factor } else { v });
    let area_or_point = resolve_area_or_point(description.area_or_point.as_deref(), request.label, diag);
    let frame = AffineTransform::scale(resolved.horizontal_factor, resolved.horizontal_factor)
        * description.transform;

    diag.debug(
        StageName::Materialize,
        request.label,
        format!(
            "materialized {}x{} grid at {target} m (resample factor {resample_factor:.4})",
            out_shape.0, out_shape.1
        ),
    );
    Ok(MaterializedGrid::new(
        elevation,
        transform,
        nodata,
        description.crs.clone(),
        area_or_point,
        frame,
        frame_shape,
        request.window.map(|_| window),
    ))
}

/// Rasterize a point cloud or mesh at the working resolution.
///
/// Points are scaled to metres (horizontal and vertical factors apply
/// separately), max-binned over their full extent, then cropped to the
/// window.
pub fn materialize_points(
    engine: &dyn PointCloudEngine,
    source: PointSource<'_>,
    crs: Option<&Crs>,
    request: &MaterializeRequest<'_>,
    diag: &mut Diagnostics,
) -> PrepResult<MaterializedGrid> {
    let target = validate_target_resolution(request.target_resolution)?;
    let resolved = request.resolved;
    let (pipeline, memory) = match source {
        PointSource::Las(path) => (Pipeline::new().read_las(path), None),
        PointSource::Memory(points) => (Pipeline::new().read_memory(), Some(points)),
    };
    let pipeline = pipeline
        .transformation(scale_matrix(resolved.horizontal_factor, resolved.units_factor))
        .write_raster(target, RASTER_NODATA);

    let output = engine.execute(&pipeline, memory)?;
    let raster = output
        .raster
        .ok_or_else(|| PrepError::engine("pointcloud", "pipeline produced no raster"))?;

    let frame = raster.transform;
    let frame_shape = raster.shape();
    let window = request
        .window
        .unwrap_or_else(|| PixelWindow::full(frame_shape))
        .clamped_to(frame_shape);
    if window.is_empty() {
        return Err(PrepError::EmptyData(format!(
            "{} window lies outside the rasterized extent",
            request.label
        )));
    }
    let (values, transform) = match request.window {
        Some(_) => (crop(&raster.values, &window), frame.window_transform(&window)),
        None => (raster.values, frame),
    };

    diag.debug(
        StageName::Materialize,
        request.label,
        format!(
            "rasterized {} points to {}x{} cells at {target} m",
            output.points.len(),
            values.nrows(),
            values.ncols()
        ),
    );
    Ok(MaterializedGrid::new(
        values,
        transform,
        raster.nodata.or(Some(RASTER_NODATA)),
        raster.crs.or_else(|| crs.cloned()),
        AreaOrPoint::Area,
        frame,
        frame_shape,
        request.window.map(|_| window),
    ))
}
