//! In-process point cloud engine.
use super::hexbin::average_spacing;
use super::normals::estimate_normals;
use super::pipeline::{Pipeline, PipelineOutput, Stage};
use super::PointCloudEngine;
use crate::bounds::PointCloudBounds;
use crate::coordinates::transform_points;
use crate::error::{PrepError, PrepResult};
use crate::heightmap::MaxBinRasterizer;
use crate::laz::read_points;

/// Runs pipelines over LAS/LAZ files or caller-supplied points.
pub struct NativePointEngine {
    show_progress: bool,
}

impl NativePointEngine {
    pub fn new(show_progress: bool) -> Self {
        Self { show_progress }
    }
}

impl Default for NativePointEngine {
    fn default() -> Self {
        Self::new(false)
    }
}

impl PointCloudEngine for NativePointEngine {
    fn execute(&self, pipeline: &Pipeline, points: Option<&[[f64; 3]]>) -> PrepResult<PipelineOutput> {
        if log::log_enabled!(log::Level::Debug) {
            log::debug!("executing pipeline {}", pipeline.to_json()?);
        }
        let mut output = PipelineOutput::default();
        let mut loaded = false;

        for stage in &pipeline.pipeline {
            match stage {
                Stage::ReadLas { filename } => {
                    let contents = read_points(filename, self.show_progress)?;
                    log::debug!("read {} points from {}", contents.points.len(), filename.display());
                    output.points = contents.points;
                    output.metadata.srs = contents.crs;
                    loaded = true;
                }
                Stage::ReadMemory => {
                    let points = points.ok_or_else(|| {
                        PrepError::engine("pointcloud", "readers.memory stage without input points")
                    })?;
                    output.points = points.to_vec();
                    loaded = true;
                }
                _ if !loaded => {
                    return Err(PrepError::engine(
                        "pointcloud",
                        "pipeline must start with a reader stage",
                    ));
                }
                Stage::Transformation { matrix } => transform_points(matrix, &mut output.points),
                Stage::Hexbin {
                    edge_size,
                    threshold,
                } => {
                    output.metadata.avg_pt_spacing =
                        average_spacing(&output.points, *edge_size, *threshold).map(|s| s.avg_pt_spacing);
                }
                Stage::Normal { knn } => {
                    output.normals = Some(estimate_normals(&output.points, *knn)?);
                }
                Stage::WriteRaster {
                    resolution,
                    output_type,
                    nodata,
                } => {
                    if output_type != "max" {
                        return Err(PrepError::engine(
                            "pointcloud",
                            format!("unsupported raster output_type '{output_type}'"),
                        ));
                    }
                    let mut raster = MaxBinRasterizer::new(*resolution)
                        .with_nodata(*nodata)
                        .rasterize(&output.points)?;
                    raster.crs = output.metadata.srs.clone();
                    output.raster = Some(raster);
                }
            }
        }

        if loaded {
            let bounds = PointCloudBounds::from_points(&output.points);
            output.metadata.bounds = bounds.is_valid().then_some(bounds);
        }
        Ok(output)
    }
}
