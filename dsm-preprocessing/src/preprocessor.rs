//! End-to-end preparation of a foundation and subject pair.
use crate::config::RegistrationConfig;
use crate::diagnostics::{Diagnostics, StageName};
use crate::engine::Engines;
use crate::error::PrepResult;
use crate::resolution::{ResolutionAccuracy, select_target_resolution};
use crate::surface::{GeospatialSurface, Role};
use crate::windower::{TightSearchPlan, apply_tight_search};

/// Both surfaces after a successful run.
pub struct PreparedPair {
    pub foundation: GeospatialSurface,
    pub subject: GeospatialSurface,
    pub target_resolution: f64,
    /// Windows used when the tight search ran.
    pub tight_search: Option<TightSearchPlan>,
}

pub struct RegistrationPreprocessor {
    config: RegistrationConfig,
    engines: Engines,
}

impl RegistrationPreprocessor {
    pub fn new(config: RegistrationConfig, engines: Engines) -> PrepResult<Self> {
        config.validate()?;
        Ok(Self { config, engines })
    }

    pub fn config(&self) -> &RegistrationConfig {
        &self.config
    }

    /// Open, resolve, materialize, optionally window, then prepare both
    /// surfaces. The first failure on either surface aborts the run.
    pub fn run(&self, diag: &mut Diagnostics) -> PrepResult<PreparedPair> {
        let (foundation, subject) = diag.join(
            |diag| {
                GeospatialSurface::open(
                    &self.config.fnd_file,
                    Role::Foundation,
                    self.engines.clone(),
                    diag,
                )
            },
            |diag| {
                GeospatialSurface::open(
                    &self.config.aoi_file,
                    Role::Subject,
                    self.engines.clone(),
                    diag,
                )
            },
        );
        let (mut foundation, mut subject) = (foundation?, subject?);
        share_angular_scale(&foundation, &mut subject, diag);

        let target_resolution = select_target_resolution(
            foundation.native_resolution(),
            subject.native_resolution(),
            self.config.min_resolution,
        );
        diag.info(
            StageName::Resolve,
            "pair",
            format!(
                "working resolution {target_resolution} m ({}: {}, {}: {})",
                foundation.label(),
                foundation.native_resolution(),
                subject.label(),
                subject.native_resolution()
            ),
        );
        foundation.set_target_resolution(target_resolution)?;
        subject.set_target_resolution(target_resolution)?;

        let (fnd, aoi) = diag.join(
            |diag| foundation.materialize(diag).map(|_| ()),
            |diag| subject.materialize(diag).map(|_| ()),
        );
        fnd?;
        aoi?;

        let tight_search = if self.config.tight_search {
            Some(apply_tight_search(&mut foundation, &mut subject, diag)?)
        } else {
            None
        };

        let filters = self.config.filters();
        let (fnd, aoi) = diag.join(
            |diag| foundation.prepare(&filters, diag).map(|_| ()),
            |diag| subject.prepare(&filters, diag).map(|_| ()),
        );
        fnd?;
        aoi?;

        Ok(PreparedPair {
            foundation,
            subject,
            target_resolution,
            tight_search,
        })
    }
}

/// Put a subject in the foundation's geographic CRS on the foundation's
/// degree to metre factor, so both grids land in one planar frame. The
/// foundation's centre latitude is the reference. Returns whether the
/// subject was rescaled.
pub fn share_angular_scale(
    foundation: &GeospatialSurface,
    subject: &mut GeospatialSurface,
    diag: &mut Diagnostics,
) -> bool {
    let approximate = |s: &GeospatialSurface| s.resolved().accuracy == ResolutionAccuracy::Approximate;
    if !approximate(foundation) || !approximate(subject) {
        return false;
    }
    match (foundation.crs(), subject.crs()) {
        (Some(fnd), Some(aoi)) if fnd.equals(aoi) => {}
        _ => return false,
    }

    let shared = foundation.resolved().horizontal_factor;
    let own = subject.resolved().horizontal_factor;
    subject.set_horizontal_factor(shared);
    diag.info(
        StageName::Resolve,
        subject.label(),
        format!(
            "sharing {}'s angular scale: {shared:.3} m per unit instead of {own:.3}",
            foundation.label()
        ),
    );
    true
}
