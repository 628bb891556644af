//! Native resolution and unit factor detection.
use crate::affine::AffineTransform;
use crate::crs::{Crs, CrsKind};
use crate::diagnostics::{Diagnostics, StageName};
use crate::error::{PrepError, PrepResult};
use constants::registration::EARTH_MEAN_RADIUS_M;
use constants::units::find_linear_unit;
use serde::{Deserialize, Serialize};

/// How much the resolved numbers can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionAccuracy {
    /// Units read from a projected CRS or a declared mesh unit.
    Exact,
    /// No unit information; metres assumed.
    AssumedMeters,
    /// Angular units converted with a small-angle great-circle estimate.
    Approximate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedUnits {
    /// Ground sampling distance in metres.
    pub native_resolution: f64,
    /// Metres per native linear unit, applied to elevations.
    pub units_factor: f64,
    /// Metres per native horizontal unit, applied to the transform. Equals
    /// `units_factor` except for geographic systems.
    pub horizontal_factor: f64,
    pub units: Option<String>,
    pub accuracy: ResolutionAccuracy,
}

impl ResolvedUnits {
    /// Same source spacing expressed with another horizontal factor.
    pub fn with_horizontal_factor(&self, horizontal_factor: f64) -> Self {
        Self {
            native_resolution: self.native_resolution / self.horizontal_factor * horizontal_factor,
            horizontal_factor,
            ..self.clone()
        }
    }
}

/// Resolve a raster from its transform and CRS.
///
/// Rotated grids and grids with unequal X/Y pixel sizes are rejected.
pub fn resolve_raster(
    label: &str,
    transform: &AffineTransform,
    shape: (usize, usize),
    crs: Option<&Crs>,
    diag: &mut Diagnostics,
) -> PrepResult<ResolvedUnits> {
    if transform.is_identity() {
        diag.warn(
            StageName::Resolve,
            label,
            "identity transform, the grid is probably not georeferenced",
        );
    }
    if !transform.is_conformal() || !transform.is_rectilinear() {
        return Err(PrepError::unsupported_geometry(
            label,
            "transform cannot contain a rotation angle",
        ));
    }
    let (sx, sy) = transform.pixel_scale();
    if ((sx - sy) / sx.max(sy)).abs() > 1e-9 {
        return Err(PrepError::unsupported_geometry(
            label,
            format!("different X and Y scales ({sx} vs {sy}), they must be identical"),
        ));
    }

    let centre = transform.apply(shape.1 as f64 / 2.0, shape.0 as f64 / 2.0);
    resolve_spacing(label, transform.a.abs(), Some(centre), crs, diag)
}

/// Resolve a point cloud from the engine's average point spacing.
pub fn resolve_point_cloud(
    label: &str,
    avg_spacing: f64,
    centre: Option<(f64, f64)>,
    crs: Option<&Crs>,
    diag: &mut Diagnostics,
) -> PrepResult<ResolvedUnits> {
    resolve_spacing(label, avg_spacing, centre, crs, diag)
}

/// Resolve a mesh from its average vertex spacing and declared unit name.
pub fn resolve_mesh(
    label: &str,
    avg_spacing: f64,
    units: Option<&str>,
    diag: &mut Diagnostics,
) -> PrepResult<ResolvedUnits> {
    check_spacing(label, avg_spacing)?;
    let resolved = match units.map(|u| (u, find_linear_unit(u))) {
        Some((_, Some(unit))) => {
            diag.info(
                StageName::Resolve,
                label,
                format!("linear unit detected as {}", unit.name),
            );
            ResolvedUnits {
                native_resolution: avg_spacing * unit.meters,
                units_factor: unit.meters,
                horizontal_factor: unit.meters,
                units: Some(unit.name.to_string()),
                accuracy: ResolutionAccuracy::Exact,
            }
        }
        Some((name, None)) => {
            diag.warn(
                StageName::Resolve,
                label,
                format!("unrecognised linear unit '{name}' -> meters assumed"),
            );
            assumed_meters(avg_spacing)
        }
        None => {
            diag.warn(
                StageName::Resolve,
                label,
                "linear unit not detected -> meters assumed",
            );
            assumed_meters(avg_spacing)
        }
    };
    log_resolution(label, &resolved, diag);
    Ok(resolved)
}

fn resolve_spacing(
    label: &str,
    spacing: f64,
    centre: Option<(f64, f64)>,
    crs: Option<&Crs>,
    diag: &mut Diagnostics,
) -> PrepResult<ResolvedUnits> {
    check_spacing(label, spacing)?;
    let resolved = match crs.map(|c| &c.kind) {
        None => {
            diag.warn(
                StageName::Resolve,
                label,
                "linear unit not detected -> meters assumed",
            );
            assumed_meters(spacing)
        }
        Some(CrsKind::Geographic {
            angular_units,
            radians_per_unit,
        }) => {
            let latitude = centre.map(|(_, y)| y * radians_per_unit).unwrap_or(0.0);
            let per_unit = meters_per_angular_unit(latitude, *radians_per_unit);
            diag.warn(
                StageName::Resolve,
                label,
                format!(
                    "coordinate system not projected -> approximating {angular_units} as {per_unit:.3} meters; \
                     put the dataset in a projected coordinate system for accurate results"
                ),
            );
            ResolvedUnits {
                native_resolution: spacing * per_unit,
                units_factor: 1.0,
                horizontal_factor: per_unit,
                units: Some(angular_units.clone()),
                accuracy: ResolutionAccuracy::Approximate,
            }
        }
        Some(CrsKind::Projected {
            linear_units,
            units_factor,
        }) => {
            diag.info(
                StageName::Resolve,
                label,
                format!("linear unit detected as {linear_units}"),
            );
            ResolvedUnits {
                native_resolution: spacing * units_factor,
                units_factor: *units_factor,
                horizontal_factor: *units_factor,
                units: Some(linear_units.clone()),
                accuracy: ResolutionAccuracy::Exact,
            }
        }
    };
    log_resolution(label, &resolved, diag);
    Ok(resolved)
}

fn assumed_meters(spacing: f64) -> ResolvedUnits {
    ResolvedUnits {
        native_resolution: spacing,
        units_factor: 1.0,
        horizontal_factor: 1.0,
        units: None,
        accuracy: ResolutionAccuracy::AssumedMeters,
    }
}

fn check_spacing(label: &str, spacing: f64) -> PrepResult<()> {
    if spacing.is_finite() && spacing > 0.0 {
        Ok(())
    } else {
        Err(PrepError::EmptyData(format!(
            "{label} has no measurable sample spacing ({spacing})"
        )))
    }
}

fn log_resolution(label: &str, resolved: &ResolvedUnits, diag: &mut Diagnostics) {
    diag.info(
        StageName::Resolve,
        label,
        format!(
            "calculated native resolution as {:.3} meters",
            resolved.native_resolution
        ),
    );
}

/// Great-circle length of one angular unit of longitude at `latitude` (radians).
pub fn meters_per_angular_unit(latitude: f64, radians_per_unit: f64) -> f64 {
    let lat = latitude.clamp(-89.9_f64.to_radians(), 89.9_f64.to_radians());
    let half = (radians_per_unit / 2.0).sin();
    let a = lat.cos() * lat.cos() * half * half;
    2.0 * a.sqrt().asin() * EARTH_MEAN_RADIUS_M
}

/// Reject non-positive or non-finite working resolutions.
pub fn validate_target_resolution(value: f64) -> PrepResult<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(PrepError::configuration(format!(
            "resolution must be greater than 0, got {value}"
        )))
    }
}

/// Working resolution shared by both datasets: the coarser native resolution,
/// never finer than `min_resolution`.
pub fn select_target_resolution(foundation: f64, subject: f64, min_resolution: f64) -> f64 {
    foundation.max(subject).max(min_resolution)
}
