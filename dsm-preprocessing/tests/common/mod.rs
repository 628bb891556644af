#![allow(dead_code)]

use dsm_preprocessing::affine::AffineTransform;
use dsm_preprocessing::crs::Crs;
use dsm_preprocessing::engine::geotiff::read_region;
use dsm_preprocessing::engine::{
    Engines, MeshData, MeshLoader, NativePointEngine, RasterDescription, RasterEngine, ReadRequest,
};
use dsm_preprocessing::grid::RasterGrid;
use dsm_preprocessing::{PrepError, PrepResult};
use ndarray::Array2;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const NODATA: f64 = -9999.0;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Smooth slope with short-wavelength bumps, evaluated in world coordinates
/// so overlapping datasets agree.
pub fn terrain(x: f64, y: f64) -> f64 {
    100.0 + 0.05 * x + 0.02 * y + 2.0 * (x / 3.0).sin() + 1.5 * (y / 4.0).cos()
}

pub fn utm() -> Crs {
    Crs::projected("EPSG:32615", "metre", 1.0)
}

/// North-up raster over `terrain` with a 3x3 nodata hole near its centre.
pub fn terrain_raster(left: f64, top: f64, resolution: f64, shape: (usize, usize), crs: Option<Crs>) -> RasterGrid {
    let (rows, cols) = shape;
    let values = Array2::from_shape_fn(shape, |(r, c)| {
        let hole_r = rows / 2;
        let hole_c = cols / 2;
        if r.abs_diff(hole_r) <= 1 && c.abs_diff(hole_c) <= 1 {
            return NODATA;
        }
        let x = left + (c as f64 + 0.5) * resolution;
        let y = top - (r as f64 + 0.5) * resolution;
        terrain(x, y)
    });
    RasterGrid {
        values,
        transform: AffineTransform::north_up(left, top, resolution),
        nodata: Some(NODATA),
        crs,
        area_or_point: Some("Area".to_string()),
    }
}

/// Mesh vertices on a regular grid over `terrain`.
pub fn terrain_mesh(left: f64, bottom: f64, spacing: f64, count: usize) -> MeshData {
    let vertices = (0..count)
        .flat_map(|j| {
            (0..count).map(move |i| {
                let x = left + i as f64 * spacing;
                let y = bottom + j as f64 * spacing;
                [x, y, terrain(x, y)]
            })
        })
        .collect();
    MeshData {
        vertices,
        units: None,
    }
}

/// Rasters held in memory, keyed by path.
#[derive(Default)]
pub struct MemoryRasters {
    grids: HashMap<PathBuf, RasterGrid>,
}

impl MemoryRasters {
    pub fn with(mut self, path: &str, grid: RasterGrid) -> Self {
        self.grids.insert(PathBuf::from(path), grid);
        self
    }

    fn get(&self, path: &Path) -> PrepResult<&RasterGrid> {
        self.grids
            .get(path)
            .ok_or_else(|| PrepError::engine("memory", format!("no raster at {}", path.display())))
    }
}

impl RasterEngine for MemoryRasters {
    fn describe(&self, path: &Path) -> PrepResult<RasterDescription> {
        let grid = self.get(path)?;
        Ok(RasterDescription {
            transform: grid.transform,
            shape: grid.shape(),
            nodata: grid.nodata,
            crs: grid.crs.clone(),
            area_or_point: grid.area_or_point.clone(),
        })
    }

    fn read(&self, path: &Path, request: &ReadRequest) -> PrepResult<RasterGrid> {
        read_region(self.get(path)?.clone(), request)
    }
}

#[derive(Default)]
pub struct MemoryMeshes {
    meshes: HashMap<PathBuf, MeshData>,
}

impl MemoryMeshes {
    pub fn with(mut self, path: &str, mesh: MeshData) -> Self {
        self.meshes.insert(PathBuf::from(path), mesh);
        self
    }
}

impl MeshLoader for MemoryMeshes {
    fn load(&self, path: &Path) -> PrepResult<MeshData> {
        self.meshes
            .get(path)
            .cloned()
            .ok_or_else(|| PrepError::engine("memory", format!("no mesh at {}", path.display())))
    }
}

pub fn engines(rasters: MemoryRasters, meshes: MemoryMeshes) -> Engines {
    Engines::new(
        Arc::new(rasters),
        Arc::new(NativePointEngine::new(false)),
        Arc::new(meshes),
    )
}
