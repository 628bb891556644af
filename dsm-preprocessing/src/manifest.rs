//! Preparation manifest and relief image output.
use crate::affine::AffineTransform;
use crate::bandpass::BandpassStats;
use crate::diagnostics::Diagnostics;
use crate::error::{PrepError, PrepResult};
use crate::grid::PixelWindow;
use crate::preprocessor::PreparedPair;
use crate::resolution::ResolutionAccuracy;
use crate::surface::{GeospatialSurface, Role, SurfaceKind};
use crate::windower::TightSearchPlan;
use image::GrayImage;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Everything a registration step needs to know about one prepared surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceSummary {
    pub label: String,
    pub source: PathBuf,
    pub kind: SurfaceKind,
    pub role: Role,
    pub crs: Option<String>,
    pub native_resolution: f64,
    pub target_resolution: f64,
    pub units_factor: f64,
    pub horizontal_factor: f64,
    pub units: Option<String>,
    pub accuracy: ResolutionAccuracy,
    /// `[rows, cols]` of the prepared grid.
    pub shape: [usize; 2],
    pub transform: AffineTransform,
    pub window: Option<PixelWindow>,
    pub valid_cells: usize,
    pub infill_passes: usize,
    pub infilled_cells: usize,
    pub bandpass: BandpassStats,
    pub point_count: usize,
    pub has_normals: bool,
    /// Relief image file name, relative to the manifest.
    pub relief_image: String,
}

impl SurfaceSummary {
    pub fn from_surface(surface: &GeospatialSurface) -> PrepResult<Self> {
        let prepared = surface.prepared().ok_or(PrepError::NotPrepared {
            stage: "manifest",
            requires: "prepare",
        })?;
        let resolved = surface.resolved();
        let (rows, cols) = prepared.grid.shape();
        Ok(Self {
            label: surface.label().to_string(),
            source: surface.source_path().to_path_buf(),
            kind: surface.kind(),
            role: surface.role(),
            crs: surface.crs().map(|crs| crs.identifier.clone()),
            native_resolution: resolved.native_resolution,
            target_resolution: surface.target_resolution().unwrap_or(resolved.native_resolution),
            units_factor: resolved.units_factor,
            horizontal_factor: resolved.horizontal_factor,
            units: resolved.units.clone(),
            accuracy: resolved.accuracy,
            shape: [rows, cols],
            transform: *prepared.transform(),
            window: prepared.grid.window,
            valid_cells: prepared.grid.valid_count(),
            infill_passes: prepared.infilled.passes,
            infilled_cells: prepared.infilled.filled_cells,
            bandpass: prepared.bandpass,
            point_count: prepared.point_cloud().len(),
            has_normals: prepared.normal_vectors().is_some(),
            relief_image: relief_file_name(surface.label()),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparationManifest {
    pub target_resolution: f64,
    pub tight_search: Option<TightSearchPlan>,
    pub foundation: SurfaceSummary,
    pub subject: SurfaceSummary,
    pub diagnostics: Diagnostics,
}

impl PreparationManifest {
    pub fn new(pair: &PreparedPair, diagnostics: &Diagnostics) -> PrepResult<Self> {
        Ok(Self {
            target_resolution: pair.target_resolution,
            tight_search: pair.tight_search,
            foundation: SurfaceSummary::from_surface(&pair.foundation)?,
            subject: SurfaceSummary::from_surface(&pair.subject)?,
            diagnostics: diagnostics.clone(),
        })
    }
}

pub fn relief_file_name(label: &str) -> String {
    format!("{}_relief.png", label.to_lowercase())
}

/// Save an 8-bit relief as a grayscale PNG.
pub fn write_relief_png(relief: &Array2<u8>, path: &Path) -> PrepResult<()> {
    let (rows, cols) = relief.dim();
    let pixels: Vec<u8> = relief.iter().copied().collect();
    let image = GrayImage::from_raw(cols as u32, rows as u32, pixels)
        .ok_or_else(|| PrepError::engine("image", format!("cannot build a {cols}x{rows} image")))?;
    image.save(path)?;
    Ok(())
}

/// Writes the reliefs and `manifest.json` for a prepared pair.
pub struct ManifestGenerator {
    output_dir: PathBuf,
}

impl ManifestGenerator {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
        }
    }

    /// Returns the manifest path.
    pub fn write(&self, pair: &PreparedPair, diagnostics: &Diagnostics) -> PrepResult<PathBuf> {
        fs::create_dir_all(&self.output_dir)?;
        let manifest = PreparationManifest::new(pair, diagnostics)?;

        for surface in [&pair.foundation, &pair.subject] {
            if let Some(prepared) = surface.prepared() {
                let path = self.output_dir.join(relief_file_name(surface.label()));
                write_relief_png(prepared.elevation_grid(), &path)?;
                log::info!("wrote {} relief to {}", surface.label(), path.display());
            }
        }

        let manifest_path = self.output_dir.join("manifest.json");
        fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)?;
        log::info!("Generated preparation manifest: {}", manifest_path.display());
        self.log_summary(&manifest);

        Ok(manifest_path)
    }

    fn log_summary(&self, manifest: &PreparationManifest) {
        log::info!("Manifest Summary:");
        log::info!("  Working resolution: {:.3} m", manifest.target_resolution);
        for summary in [&manifest.foundation, &manifest.subject] {
            log::info!(
                "  {}: {}x{} cells, {} infilled in {} passes, {} points{}",
                summary.label,
                summary.shape[0],
                summary.shape[1],
                summary.infilled_cells,
                summary.infill_passes,
                summary.point_count,
                if summary.has_normals { " with normals" } else { "" }
            );
        }
        let warnings = manifest.diagnostics.warnings().count();
        if warnings > 0 {
            log::warn!("  {warnings} warnings recorded during preparation");
        }
    }
}
