//! Point cloud pipeline description, serializable to PDAL-style JSON.
use crate::bounds::PointCloudBounds;
use crate::coordinates::Matrix4;
use crate::crs::Crs;
use crate::error::PrepResult;
use crate::grid::RasterGrid;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Stage {
    #[serde(rename = "readers.las")]
    ReadLas { filename: PathBuf },
    #[serde(rename = "readers.memory")]
    ReadMemory,
    /// Row-major homogeneous matrix applied to every point.
    #[serde(rename = "filters.transformation")]
    Transformation { matrix: Matrix4 },
    #[serde(rename = "filters.hexbin")]
    Hexbin { edge_size: f64, threshold: usize },
    #[serde(rename = "filters.normal")]
    Normal { knn: usize },
    #[serde(rename = "writers.raster")]
    WriteRaster {
        resolution: f64,
        output_type: String,
        nodata: f64,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub pipeline: Vec<Stage>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.pipeline.push(stage);
        self
    }

    pub fn read_las(self, filename: impl Into<PathBuf>) -> Self {
        self.stage(Stage::ReadLas {
            filename: filename.into(),
        })
    }

    pub fn read_memory(self) -> Self {
        self.stage(Stage::ReadMemory)
    }

    pub fn transformation(self, matrix: Matrix4) -> Self {
        self.stage(Stage::Transformation { matrix })
    }

    pub fn hexbin(self, edge_size: f64, threshold: usize) -> Self {
        self.stage(Stage::Hexbin {
            edge_size,
            threshold,
        })
    }

    pub fn normal(self, knn: usize) -> Self {
        self.stage(Stage::Normal { knn })
    }

    /// Max-binning rasterization at `resolution`.
    pub fn write_raster(self, resolution: f64, nodata: f64) -> Self {
        self.stage(Stage::WriteRaster {
            resolution,
            output_type: "max".to_string(),
            nodata,
        })
    }

    pub fn to_json(&self) -> PrepResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Summary statistics gathered while a pipeline runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineMetadata {
    pub avg_pt_spacing: Option<f64>,
    pub srs: Option<Crs>,
    pub bounds: Option<PointCloudBounds>,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineOutput {
    pub points: Vec<[f64; 3]>,
    pub metadata: PipelineMetadata,
    pub raster: Option<RasterGrid>,
    pub normals: Option<Vec<[f64; 3]>>,
}
