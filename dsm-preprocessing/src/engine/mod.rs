//! Seams to the external raster, point cloud and mesh engines.
//!
//! The pipeline only talks to these traits. The bundled implementations read
//! GeoTIFF, LAS/LAZ and OBJ files; tests plug in in-memory engines.
pub mod geotiff;
pub mod hexbin;
pub mod native;
pub mod normals;
pub mod obj;
pub mod pipeline;

use crate::affine::AffineTransform;
use crate::crs::Crs;
use crate::error::PrepResult;
use crate::grid::{PixelWindow, RasterGrid};
use std::path::Path;
use std::sync::Arc;

pub use geotiff::GeoTiffEngine;
pub use native::NativePointEngine;
pub use obj::ObjVertexLoader;
pub use pipeline::{Pipeline, PipelineMetadata, PipelineOutput, Stage};

/// Georeferencing of a raster without its samples.
#[derive(Debug, Clone)]
pub struct RasterDescription {
    pub transform: AffineTransform,
    /// `(rows, cols)`
    pub shape: (usize, usize),
    pub nodata: Option<f64>,
    pub crs: Option<Crs>,
    pub area_or_point: Option<String>,
}

/// Which part of a raster to read and at what size.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReadRequest {
    /// Source pixel region; the whole raster when `None`.
    pub window: Option<PixelWindow>,
    /// `(rows, cols)` to resample the region to; native size when `None`.
    pub out_shape: Option<(usize, usize)>,
}

pub trait RasterEngine: Send + Sync {
    /// Whether this engine can read `path`. Checked before anything is opened.
    fn supports(&self, _path: &Path) -> bool {
        true
    }

    fn describe(&self, path: &Path) -> PrepResult<RasterDescription>;

    /// Read band 1. The returned transform maps output pixels to world
    /// coordinates in the raster's native units.
    fn read(&self, path: &Path, request: &ReadRequest) -> PrepResult<RasterGrid>;
}

pub trait PointCloudEngine: Send + Sync {
    /// Run `pipeline`. `points` feeds a `readers.memory` stage.
    fn execute(&self, pipeline: &Pipeline, points: Option<&[[f64; 3]]>) -> PrepResult<PipelineOutput>;
}

#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub vertices: Vec<[f64; 3]>,
    /// Declared unit name, if the file carries one.
    pub units: Option<String>,
}

pub trait MeshLoader: Send + Sync {
    fn supports(&self, _path: &Path) -> bool {
        true
    }

    fn load(&self, path: &Path) -> PrepResult<MeshData>;
}

pub(crate) fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

/// The engines a preparation run uses, shared between both surfaces.
#[derive(Clone)]
pub struct Engines {
    pub raster: Arc<dyn RasterEngine>,
    pub points: Arc<dyn PointCloudEngine>,
    pub mesh: Arc<dyn MeshLoader>,
}

impl Engines {
    pub fn new(
        raster: Arc<dyn RasterEngine>,
        points: Arc<dyn PointCloudEngine>,
        mesh: Arc<dyn MeshLoader>,
    ) -> Self {
        Self {
            raster,
            points,
            mesh,
        }
    }

    /// File-backed engines bundled with this crate: GeoTIFF rasters, LAS/LAZ
    /// point clouds and OBJ meshes. The other raster (`vrt`) and mesh (`ply`,
    /// `stl`, `off`, `glb`, `gltf`) extensions need a host engine passed to
    /// [`Engines::new`]; opening them with these engines is a configuration
    /// error.
    pub fn native(show_progress: bool) -> Self {
        Self::new(
            Arc::new(GeoTiffEngine),
            Arc::new(NativePointEngine::new(show_progress)),
            Arc::new(ObjVertexLoader),
        )
    }
}
