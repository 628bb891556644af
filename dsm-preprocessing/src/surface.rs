//! Geospatial surfaces and their preparation state.
//!
//! A surface is opened from a file, which resolves its native resolution and
//! unit factor once. Materialization may then run any number of times and
//! always replaces the previous grid. Preparation runs infill, bandpass
//! normalization and projection on a local copy of the state and only
//! commits the finished result, so a half-prepared surface is never
//! observable.
use crate::affine::AffineTransform;
use crate::bandpass::{self, BandpassFilters, BandpassStats, NormalizedRelief};
use crate::crs::Crs;
use crate::diagnostics::{Diagnostics, StageName};
use crate::engine::{Engines, MeshData, Pipeline, PointCloudEngine, RasterDescription};
use crate::error::{PrepError, PrepResult};
use crate::grid::{MaterializedGrid, PixelWindow};
use crate::infill::{InfilledGrid, infill};
use crate::materialize::{MaterializeRequest, PointSource, materialize_points, materialize_raster};
use crate::projector::project_points;
use crate::resolution::{
    ResolvedUnits, resolve_mesh, resolve_point_cloud, resolve_raster, validate_target_resolution,
};
use constants::registration::{
    DSM_FILETYPES, HEXBIN_EDGE_SIZE, HEXBIN_THRESHOLD, MESH_FILETYPES, NORMAL_KNN, PCLOUD_FILETYPES,
};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Which side of the registration a surface plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Foundation,
    Subject,
}

impl Role {
    /// Prefix used in log labels.
    pub fn tag(self) -> &'static str {
        match self {
            Role::Foundation => "Foundation",
            Role::Subject => "AOI",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurfaceKind {
    Raster,
    PointCloud,
    Mesh,
}

impl SurfaceKind {
    /// Pick the representation from the file extension.
    pub fn from_path(path: &Path) -> PrepResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if DSM_FILETYPES.contains(&ext.as_str()) {
            Ok(SurfaceKind::Raster)
        } else if PCLOUD_FILETYPES.contains(&ext.as_str()) {
            Ok(SurfaceKind::PointCloud)
        } else if MESH_FILETYPES.contains(&ext.as_str()) {
            Ok(SurfaceKind::Mesh)
        } else {
            Err(PrepError::configuration(format!(
                "file {} has an unsupported type",
                path.display()
            )))
        }
    }

    pub fn short_name(self) -> &'static str {
        match self {
            SurfaceKind::Raster => "DSM",
            SurfaceKind::PointCloud => "PCLOUD",
            SurfaceKind::Mesh => "MESH",
        }
    }
}

/// Source details captured when the surface is opened.
#[derive(Debug, Clone)]
enum SourceData {
    Raster(RasterDescription),
    PointCloud,
    Mesh(MeshData),
}

/// Output of preparation: relief image, points and optional normals.
#[derive(Debug, Clone)]
pub struct PreparedSurface {
    pub grid: Arc<MaterializedGrid>,
    pub infilled: Arc<InfilledGrid>,
    pub relief: Array2<u8>,
    pub bandpass: BandpassStats,
    pub point_cloud: Vec<[f64; 3]>,
    pub normals: Option<Vec<[f64; 3]>>,
}

impl PreparedSurface {
    /// 8-bit bandpassed relief.
    pub fn elevation_grid(&self) -> &Array2<u8> {
        &self.relief
    }

    pub fn point_cloud(&self) -> &[[f64; 3]] {
        &self.point_cloud
    }

    pub fn normal_vectors(&self) -> Option<&[[f64; 3]]> {
        self.normals.as_deref()
    }

    pub fn transform(&self) -> &AffineTransform {
        &self.grid.transform
    }

    pub fn validity_mask(&self) -> &Array2<bool> {
        self.grid.mask()
    }
}

/// Preparation state. Every transition yields a new snapshot.
#[derive(Debug, Clone, Default)]
pub enum SurfaceState {
    #[default]
    Raw,
    Windowed {
        window: PixelWindow,
    },
    Materialized(Arc<MaterializedGrid>),
    Infilled {
        grid: Arc<MaterializedGrid>,
        infilled: Arc<InfilledGrid>,
    },
    Normalized {
        grid: Arc<MaterializedGrid>,
        infilled: Arc<InfilledGrid>,
        relief: Arc<NormalizedRelief>,
    },
    Prepared(Arc<PreparedSurface>),
}

impl SurfaceState {
    pub fn name(&self) -> &'static str {
        match self {
            SurfaceState::Raw => "raw",
            SurfaceState::Windowed { .. } => "windowed",
            SurfaceState::Materialized(_) => "materialized",
            SurfaceState::Infilled { .. } => "infilled",
            SurfaceState::Normalized { .. } => "normalized",
            SurfaceState::Prepared(_) => "prepared",
        }
    }

    /// Latest materialized grid, if any.
    pub fn grid(&self) -> Option<&Arc<MaterializedGrid>> {
        match self {
            SurfaceState::Raw | SurfaceState::Windowed { .. } => None,
            SurfaceState::Materialized(grid)
            | SurfaceState::Infilled { grid, .. }
            | SurfaceState::Normalized { grid, .. } => Some(grid),
            SurfaceState::Prepared(prepared) => Some(&prepared.grid),
        }
    }

    pub(crate) fn infill(&self, label: &str, diag: &mut Diagnostics) -> PrepResult<SurfaceState> {
        let SurfaceState::Materialized(grid) = self else {
            return Err(PrepError::NotPrepared {
                stage: "infill",
                requires: "materialize",
            });
        };
        let infilled = diag.timed(StageName::Infill, label, |diag| {
            infill(grid.elevation(), grid.nodata, label, diag)
        })?;
        Ok(SurfaceState::Infilled {
            grid: Arc::clone(grid),
            infilled: Arc::new(infilled),
        })
    }

    pub(crate) fn normalize(
        &self,
        filters: &BandpassFilters,
        label: &str,
        diag: &mut Diagnostics,
    ) -> PrepResult<SurfaceState> {
        let SurfaceState::Infilled { grid, infilled } = self else {
            return Err(PrepError::NotPrepared {
                stage: "normalize",
                requires: "infill",
            });
        };
        let relief = diag.timed(StageName::Normalize, label, |_| {
            bandpass::normalize(&infilled.values, &grid.transform, filters.weak, filters.strong)
        })?;
        diag.debug(
            StageName::Normalize,
            label,
            format!(
                "bandpass sigmas {:.3}/{:.3} px, clipped to [{:.4}, {:.4}]",
                relief.stats.sigma_narrow,
                relief.stats.sigma_wide,
                relief.stats.clip_low,
                relief.stats.clip_high
            ),
        );
        Ok(SurfaceState::Normalized {
            grid: Arc::clone(grid),
            infilled: Arc::clone(infilled),
            relief: Arc::new(relief),
        })
    }

    /// Project valid cells to points; `normals` computes normal vectors.
    pub(crate) fn project(
        &self,
        normals: Option<&dyn PointCloudEngine>,
        label: &str,
        diag: &mut Diagnostics,
    ) -> PrepResult<SurfaceState> {
        let SurfaceState::Normalized {
            grid,
            infilled,
            relief,
        } = self
        else {
            return Err(PrepError::NotPrepared {
                stage: "project",
                requires: "normalize",
            });
        };
        let point_cloud = diag.timed(StageName::Project, label, |_| {
            project_points(grid.elevation(), grid.mask(), &grid.transform, grid.area_or_point)
        });
        diag.debug(
            StageName::Project,
            label,
            format!("projected {} points", point_cloud.len()),
        );

        let normals = match normals {
            Some(engine) => {
                let pipeline = Pipeline::new().read_memory().normal(NORMAL_KNN);
                let output = diag.timed(StageName::Normals, label, |_| {
                    engine.execute(&pipeline, Some(&point_cloud))
                })?;
                let normals = output.normals.ok_or_else(|| {
                    PrepError::engine("pointcloud", "normal stage returned no normals")
                })?;
                if normals.len() != point_cloud.len() {
                    return Err(PrepError::engine(
                        "pointcloud",
                        format!(
                            "{} normals for {} points",
                            normals.len(),
                            point_cloud.len()
                        ),
                    ));
                }
                Some(normals)
            }
            None => None,
        };

        Ok(SurfaceState::Prepared(Arc::new(PreparedSurface {
            grid: Arc::clone(grid),
            infilled: Arc::clone(infilled),
            relief: relief.image.clone(),
            bandpass: relief.stats,
            point_cloud,
            normals,
        })))
    }
}

/// A raster, point cloud or mesh taking part in a registration.
pub struct GeospatialSurface {
    source_path: PathBuf,
    role: Role,
    kind: SurfaceKind,
    label: String,
    source: SourceData,
    crs: Option<Crs>,
    resolved: ResolvedUnits,
    target_resolution: Option<f64>,
    window: Option<PixelWindow>,
    state: SurfaceState,
    engines: Engines,
}

impl GeospatialSurface {
    /// Open `path` and resolve its native resolution and unit factor.
    pub fn open(
        path: impl Into<PathBuf>,
        role: Role,
        engines: Engines,
        diag: &mut Diagnostics,
    ) -> PrepResult<Self> {
        let source_path = path.into();
        let kind = SurfaceKind::from_path(&source_path)?;
        let supported = match kind {
            SurfaceKind::Raster => engines.raster.supports(&source_path),
            SurfaceKind::PointCloud => true,
            SurfaceKind::Mesh => engines.mesh.supports(&source_path),
        };
        if !supported {
            return Err(PrepError::configuration(format!(
                "no {} engine configured for {}",
                kind.short_name(),
                source_path.display()
            )));
        }
        let label = format!("{}-{}", role.tag(), kind.short_name());
        diag.info(
            StageName::Resolve,
            &label,
            format!("opening {}", source_path.display()),
        );

        let (source, crs, resolved) = diag.timed(StageName::Resolve, &label, |diag| {
            Self::resolve(&source_path, kind, &label, &engines, diag)
        })?;

        Ok(Self {
            source_path,
            role,
            kind,
            label,
            source,
            crs,
            resolved,
            target_resolution: None,
            window: None,
            state: SurfaceState::Raw,
            engines,
        })
    }

    fn resolve(
        path: &Path,
        kind: SurfaceKind,
        label: &str,
        engines: &Engines,
        diag: &mut Diagnostics,
    ) -> PrepResult<(SourceData, Option<Crs>, ResolvedUnits)> {
        match kind {
            SurfaceKind::Raster => {
                let description = engines.raster.describe(path)?;
                let resolved = resolve_raster(
                    label,
                    &description.transform,
                    description.shape,
                    description.crs.as_ref(),
                    diag,
                )?;
                let crs = description.crs.clone();
                Ok((SourceData::Raster(description), crs, resolved))
            }
            SurfaceKind::PointCloud => {
                let pipeline = Pipeline::new()
                    .read_las(path)
                    .hexbin(HEXBIN_EDGE_SIZE, HEXBIN_THRESHOLD);
                let output = engines.points.execute(&pipeline, None)?;
                let spacing = output.metadata.avg_pt_spacing.ok_or_else(|| {
                    PrepError::EmptyData(format!("{label} has no points to estimate spacing from"))
                })?;
                let centre = output.metadata.bounds.as_ref().map(|b| b.centre());
                let crs = output.metadata.srs;
                let resolved = resolve_point_cloud(label, spacing, centre, crs.as_ref(), diag)?;
                Ok((SourceData::PointCloud, crs, resolved))
            }
            SurfaceKind::Mesh => {
                let mesh = engines.mesh.load(path)?;
                if mesh.vertices.is_empty() {
                    return Err(PrepError::EmptyData(format!("{label} has no vertices")));
                }
                let pipeline = Pipeline::new()
                    .read_memory()
                    .hexbin(HEXBIN_EDGE_SIZE, HEXBIN_THRESHOLD);
                let output = engines.points.execute(&pipeline, Some(&mesh.vertices))?;
                let spacing = output.metadata.avg_pt_spacing.ok_or_else(|| {
                    PrepError::EmptyData(format!("{label} has no vertices to estimate spacing from"))
                })?;
                let resolved = resolve_mesh(label, spacing, mesh.units.as_deref(), diag)?;
                Ok((SourceData::Mesh(mesh), None, resolved))
            }
        }
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn kind(&self) -> SurfaceKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn crs(&self) -> Option<&Crs> {
        self.crs.as_ref()
    }

    pub fn resolved(&self) -> &ResolvedUnits {
        &self.resolved
    }

    pub fn native_resolution(&self) -> f64 {
        self.resolved.native_resolution
    }

    pub fn units_factor(&self) -> f64 {
        self.resolved.units_factor
    }

    pub fn target_resolution(&self) -> Option<f64> {
        self.target_resolution
    }

    pub fn window(&self) -> Option<PixelWindow> {
        self.window
    }

    pub fn state(&self) -> &SurfaceState {
        &self.state
    }

    pub fn materialized(&self) -> Option<&MaterializedGrid> {
        self.state.grid().map(Arc::as_ref)
    }

    pub fn prepared(&self) -> Option<&PreparedSurface> {
        match &self.state {
            SurfaceState::Prepared(prepared) => Some(prepared.as_ref()),
            _ => None,
        }
    }

    /// Set the working resolution. Any existing grid is discarded.
    pub fn set_target_resolution(&mut self, resolution: f64) -> PrepResult<()> {
        self.target_resolution = Some(validate_target_resolution(resolution)?);
        self.reset();
        Ok(())
    }

    /// Convert angular units with `horizontal_factor` metres per unit instead
    /// of the factor estimated at this surface's centre. Any existing grid is
    /// discarded.
    pub fn set_horizontal_factor(&mut self, horizontal_factor: f64) {
        self.resolved = self.resolved.with_horizontal_factor(horizontal_factor);
        self.reset();
    }

    /// Restrict later materializations to `window` of the native frame.
    /// Any existing grid is discarded.
    pub fn set_window(&mut self, window: Option<PixelWindow>) {
        self.window = window;
        self.reset();
    }

    fn reset(&mut self) {
        self.state = match self.window {
            Some(window) => SurfaceState::Windowed { window },
            None => SurfaceState::Raw,
        };
    }

    /// Build the working grid, replacing any earlier grid or prepared output.
    pub fn materialize(&mut self, diag: &mut Diagnostics) -> PrepResult<&MaterializedGrid> {
        let target_resolution = self.target_resolution.ok_or(PrepError::NotPrepared {
            stage: "materialize",
            requires: "a target resolution",
        })?;
        let request = MaterializeRequest {
            label: &self.label,
            resolved: &self.resolved,
            target_resolution,
            window: self.window,
        };
        let engines = &self.engines;
        let grid = diag.timed(StageName::Materialize, &self.label, |diag| match &self.source {
            SourceData::Raster(description) => materialize_raster(
                engines.raster.as_ref(),
                &self.source_path,
                description,
                &request,
                diag,
            ),
            SourceData::PointCloud => materialize_points(
                engines.points.as_ref(),
                PointSource::Las(&self.source_path),
                self.crs.as_ref(),
                &request,
                diag,
            ),
            SourceData::Mesh(mesh) => materialize_points(
                engines.points.as_ref(),
                PointSource::Memory(&mesh.vertices),
                self.crs.as_ref(),
                &request,
                diag,
            ),
        })?;

        if grid.valid_count() == 0 {
            return Err(PrepError::EmptyData(format!(
                "{} materialized grid has no valid cells",
                self.label
            )));
        }
        diag.info(
            StageName::Materialize,
            &self.label,
            format!(
                "materialized {}x{} grid, {} valid cells",
                grid.shape().0,
                grid.shape().1,
                grid.valid_count()
            ),
        );
        self.state = SurfaceState::Materialized(Arc::new(grid));
        self.materialized().ok_or(PrepError::NotPrepared {
            stage: "materialize",
            requires: "a grid",
        })
    }

    /// Infill, normalize and project the latest grid. Foundation surfaces
    /// also get normal vectors. On failure the surface keeps its previous
    /// state.
    pub fn prepare(
        &mut self,
        filters: &BandpassFilters,
        diag: &mut Diagnostics,
    ) -> PrepResult<&PreparedSurface> {
        let start = match &self.state {
            SurfaceState::Raw | SurfaceState::Windowed { .. } => {
                return Err(PrepError::NotPrepared {
                    stage: "prepare",
                    requires: "materialize",
                });
            }
            SurfaceState::Materialized(_) => self.state.clone(),
            other => match other.grid() {
                Some(grid) => SurfaceState::Materialized(Arc::clone(grid)),
                None => self.state.clone(),
            },
        };

        diag.info(
            StageName::Infill,
            &self.label,
            format!("preparing {} for registration", self.label),
        );
        let infilled = start.infill(&self.label, diag)?;
        diag.info(
            StageName::Normalize,
            &self.label,
            format!("preparing {} for normalization", self.label),
        );
        let normalized = infilled.normalize(filters, &self.label, diag)?;
        diag.info(
            StageName::Project,
            &self.label,
            format!("preparing {} for point cloudification", self.label),
        );
        let normals_engine = match self.role {
            Role::Foundation => Some(self.engines.points.as_ref()),
            Role::Subject => None,
        };
        let prepared = normalized.project(normals_engine, &self.label, diag)?;

        self.state = prepared;
        self.prepared().ok_or(PrepError::NotPrepared {
            stage: "prepare",
            requires: "project",
        })
    }
}
