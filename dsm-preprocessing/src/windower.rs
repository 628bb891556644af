//! Tight search: restrict both surfaces to their mutual overlap plus an
//! oversize margin.
//!
//! Extents come from each surface's native frame. The oversized extent grows
//! each side by `(oversize - 1)` times the frame's width or height, which is
//! what scaling about the upper-left corner and then mirroring the measured
//! right and bottom growth onto the left and top gives. Each surface is then
//! clipped against the other's oversized extent, taking the larger of the
//! competing left and bottom edges and the smaller of the right and top
//! edges.
use crate::affine::AffineTransform;
use crate::bounds::BoundingBox;
use crate::diagnostics::{Diagnostics, StageName};
use crate::error::{PrepError, PrepResult};
use crate::grid::PixelWindow;
use crate::surface::GeospatialSurface;
use constants::registration::OVERSIZE_SCALE;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchExtents {
    pub original: BoundingBox,
    pub expanded: BoundingBox,
}

/// Exact and oversized world extents of a `(rows, cols)` frame.
pub fn search_extents(frame: &AffineTransform, shape: (usize, usize), oversize: f64) -> SearchExtents {
    let original = frame_bounds(frame, shape);
    let scaled = frame_bounds(&(*frame * AffineTransform::scale(oversize, oversize)), shape);

    let x_expanded = (scaled.right - original.right)
        .abs()
        .max((scaled.left - original.left).abs());
    let y_expanded = (scaled.bottom - original.bottom)
        .abs()
        .max((scaled.top - original.top).abs());

    SearchExtents {
        original,
        expanded: BoundingBox::new(
            original.left - x_expanded,
            original.bottom - y_expanded,
            original.right + x_expanded,
            original.top + y_expanded,
        ),
    }
}

fn frame_bounds(frame: &AffineTransform, shape: (usize, usize)) -> BoundingBox {
    let (rows, cols) = (shape.0 as f64, shape.1 as f64);
    BoundingBox::enclosing(&[
        frame.apply(0.0, 0.0),
        frame.apply(cols, 0.0),
        frame.apply(0.0, rows),
        frame.apply(cols, rows),
    ])
}

/// Clip `own` against the other surface's oversized extent.
pub fn clip_bounds(own: &BoundingBox, other_expanded: &BoundingBox) -> BoundingBox {
    BoundingBox::new(
        own.left.max(other_expanded.left),
        own.bottom.max(other_expanded.bottom),
        own.right.min(other_expanded.right),
        own.top.min(other_expanded.top),
    )
}

/// Pixel window of `frame` covering `bounds`, clamped to the frame.
pub fn bounds_to_window(
    bounds: &BoundingBox,
    frame: &AffineTransform,
    shape: (usize, usize),
) -> PrepResult<PixelWindow> {
    let inverse = frame.inverse()?;
    let pixels: Vec<(f64, f64)> = bounds
        .corners()
        .iter()
        .map(|&(x, y)| inverse.apply(x, y))
        .collect();
    let extent = BoundingBox::enclosing(&pixels);
    Ok(PixelWindow::from_pixel_bounds(
        extent.left,
        extent.bottom,
        extent.right,
        extent.top,
        shape,
    ))
}

/// Window for one surface of a tight search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceWindow {
    pub extents: SearchExtents,
    pub clipped: BoundingBox,
    pub window: PixelWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TightSearchPlan {
    pub foundation: SurfaceWindow,
    pub subject: SurfaceWindow,
}

/// Frame-level planning, independent of how the frames were obtained.
pub fn plan_windows(
    foundation: (&AffineTransform, (usize, usize)),
    subject: (&AffineTransform, (usize, usize)),
    oversize: f64,
) -> PrepResult<TightSearchPlan> {
    let fnd = search_extents(foundation.0, foundation.1, oversize);
    let aoi = search_extents(subject.0, subject.1, oversize);
    if fnd.expanded.is_disjoint(&aoi.expanded) {
        return Err(PrepError::DisjointExtent(format!(
            "foundation {:?} and subject {:?} do not overlap",
            fnd.expanded, aoi.expanded
        )));
    }

    let window_for = |extents: SearchExtents,
                      other: &SearchExtents,
                      (frame, shape): (&AffineTransform, (usize, usize)),
                      name: &str|
     -> PrepResult<SurfaceWindow> {
        let clipped = clip_bounds(&extents.original, &other.expanded);
        if clipped.width() <= 0.0 || clipped.height() <= 0.0 {
            return Err(PrepError::DisjointExtent(format!(
                "{name} extent does not reach the other surface's search extent"
            )));
        }
        let window = bounds_to_window(&clipped, frame, shape)?;
        if window.is_empty() {
            return Err(PrepError::DisjointExtent(format!(
                "{name} search window is empty"
            )));
        }
        Ok(SurfaceWindow {
            extents,
            clipped,
            window,
        })
    };

    Ok(TightSearchPlan {
        foundation: window_for(fnd, &aoi, foundation, "foundation")?,
        subject: window_for(aoi, &fnd, subject, "subject")?,
    })
}

/// Check coordinate systems and compute both windows. Read-only on both
/// surfaces, which must already be materialized.
pub fn plan_tight_search(
    foundation: &GeospatialSurface,
    subject: &GeospatialSurface,
    diag: &mut Diagnostics,
) -> PrepResult<TightSearchPlan> {
    let fnd_crs = foundation
        .crs()
        .ok_or_else(|| PrepError::UndefinedCrs(foundation.label().to_string()))?;
    let aoi_crs = subject
        .crs()
        .ok_or_else(|| PrepError::UndefinedCrs(subject.label().to_string()))?;
    if !fnd_crs.equals(aoi_crs) {
        return Err(PrepError::CrsMismatch {
            foundation: fnd_crs.identifier.clone(),
            subject: aoi_crs.identifier.clone(),
        });
    }

    let not_materialized = || PrepError::NotPrepared {
        stage: "tight search",
        requires: "materialize",
    };
    let fnd_grid = foundation.materialized().ok_or_else(not_materialized)?;
    let aoi_grid = subject.materialized().ok_or_else(not_materialized)?;

    let plan = plan_windows(
        (&fnd_grid.frame, fnd_grid.frame_shape),
        (&aoi_grid.frame, aoi_grid.frame_shape),
        OVERSIZE_SCALE,
    )?;
    for (label, side) in [
        (foundation.label(), &plan.foundation),
        (subject.label(), &plan.subject),
    ] {
        let w = side.window;
        diag.info(
            StageName::Window,
            label,
            format!(
                "search window {}x{} pixels at ({}, {})",
                w.width, w.height, w.col_off, w.row_off
            ),
        );
    }
    Ok(plan)
}

/// Plan the tight search, then re-materialize both surfaces against their
/// windows. The two re-materializations run in parallel.
pub fn apply_tight_search(
    foundation: &mut GeospatialSurface,
    subject: &mut GeospatialSurface,
    diag: &mut Diagnostics,
) -> PrepResult<TightSearchPlan> {
    let plan = diag.timed(StageName::Window, "tight search", |diag| {
        plan_tight_search(foundation, subject, diag)
    })?;

    foundation.set_window(Some(plan.foundation.window));
    subject.set_window(Some(plan.subject.window));

    let (fnd, aoi) = diag.join(
        |diag| foundation.materialize(diag).map(|_| ()),
        |diag| subject.materialize(diag).map(|_| ()),
    );
    fnd?;
    aoi?;
    Ok(plan)
}
