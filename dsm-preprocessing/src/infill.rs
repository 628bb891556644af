//! Iterative nodata infill.
//!
//! Each pass interpolates every invalid cell that can see a valid cell along
//! one of eight directions within the search distance, weighting the nearest
//! valid cell in each direction by inverse squared distance. Passes read
//! from a snapshot of the previous pass, so the result does not depend on
//! scan order. Valid values only spread outward from the invalid region's
//! boundary, which strictly shrinks it each pass.
use crate::diagnostics::{Diagnostics, StageName};
use crate::error::{PrepError, PrepResult};
use crate::grid::{is_valid, validity_mask};
use constants::registration::INFILL_MAX_SEARCH_DISTANCE;
use ndarray::Array2;
use rayon::prelude::*;

const DIRECTIONS: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

#[derive(Debug, Clone)]
pub struct InfilledGrid {
    pub values: Array2<f64>,
    pub passes: usize,
    pub filled_cells: usize,
}

/// Fill every NaN / nodata cell of `values`.
///
/// Fails with `EmptyData` when nothing is valid and with `Convergence` if a
/// pass leaves the invalid region unchanged.
pub fn infill(
    values: &Array2<f64>,
    nodata: Option<f64>,
    label: &str,
    diag: &mut Diagnostics,
) -> PrepResult<InfilledGrid> {
    infill_with_distance(values, nodata, INFILL_MAX_SEARCH_DISTANCE, label, diag)
}

pub fn infill_with_distance(
    values: &Array2<f64>,
    nodata: Option<f64>,
    max_distance: usize,
    label: &str,
    diag: &mut Diagnostics,
) -> PrepResult<InfilledGrid> {
    if nodata.is_none() {
        diag.info(StageName::Infill, label, "no nodata value, only NaN cells are filled");
    }

    let mut current = values.clone();
    let mut mask = validity_mask(&current, nodata);
    let total = mask.len();
    let mut invalid = total - mask.iter().filter(|v| **v).count();
    if invalid == total {
        return Err(PrepError::EmptyData(format!("{label} grid has no valid cells")));
    }

    let initially_invalid = invalid;
    let mut passes = 0;
    while invalid > 0 {
        current = fill_pass(&current, &mask, max_distance.max(1))?;
        passes += 1;
        mask = validity_mask(&current, nodata);
        let remaining = total - mask.iter().filter(|v| **v).count();
        if remaining >= invalid {
            return Err(PrepError::Convergence { passes, remaining });
        }
        diag.debug(
            StageName::Infill,
            label,
            format!("pass {passes}: {remaining} invalid cells remain"),
        );
        invalid = remaining;
    }

    if initially_invalid > 0 {
        diag.info(
            StageName::Infill,
            label,
            format!("filled {initially_invalid} cells in {passes} passes"),
        );
    }
    Ok(InfilledGrid {
        values: current,
        passes,
        filled_cells: initially_invalid,
    })
}

fn fill_pass(values: &Array2<f64>, mask: &Array2<bool>, max_distance: usize) -> PrepResult<Array2<f64>> {
    let (rows, cols) = values.dim();
    if mask.dim() != (rows, cols) {
        return Err(PrepError::engine(
            "infill",
            format!("mask is {:?} but the grid is {:?}", mask.dim(), (rows, cols)),
        ));
    }
    let filled: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map_iter(|r| {
            (0..cols).map(move |c| {
                if mask[[r, c]] {
                    values[[r, c]]
                } else {
                    interpolate(values, mask, r, c, max_distance)
                }
            })
        })
        .collect();
    Array2::from_shape_vec((rows, cols), filled).map_err(|e| PrepError::engine("infill", e.to_string()))
}

fn interpolate(
    values: &Array2<f64>,
    mask: &Array2<bool>,
    row: usize,
    col: usize,
    max_distance: usize,
) -> f64 {
    let (rows, cols) = values.dim();
    let mut weighted = 0.0;
    let mut weights = 0.0;
    for (dr, dc) in DIRECTIONS {
        for step in 1..=max_distance as isize {
            let r = row as isize + dr * step;
            let c = col as isize + dc * step;
            if r < 0 || c < 0 || r >= rows as isize || c >= cols as isize {
                break;
            }
            let (r, c) = (r as usize, c as usize);
            if mask[[r, c]] {
                let dist2 = ((dr * dr + dc * dc) * step * step) as f64;
                weighted += values[[r, c]] / dist2;
                weights += 1.0 / dist2;
                break;
            }
        }
    }
    if weights > 0.0 {
        weighted / weights
    } else {
        values[[row, col]]
    }
}

/// True when every cell of the grid is valid.
pub fn is_fully_valid(values: &Array2<f64>, nodata: Option<f64>) -> bool {
    values.iter().all(|v| is_valid(*v, nodata))
}
