//! Bandpass relief normalization.
//!
//! Two Gaussian smooths of the infilled surface are differenced to keep local
//! relief and drop the broad terrain trend, then the signal is clipped to its
//! 1st to 99th percentile range and quantized to 8 bits.
use crate::affine::AffineTransform;
use crate::error::{PrepError, PrepResult};
use constants::registration::{
    CLIP_PERCENTILE_HIGH, CLIP_PERCENTILE_LOW, DEFAULT_STRONG_FILTER, DEFAULT_WEAK_FILTER,
};
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Kernel sizes in object space (metres).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandpassFilters {
    pub weak: f64,
    pub strong: f64,
}

impl Default for BandpassFilters {
    fn default() -> Self {
        Self {
            weak: DEFAULT_WEAK_FILTER,
            strong: DEFAULT_STRONG_FILTER,
        }
    }
}

/// Quantized relief plus the numbers needed to reproduce it.
#[derive(Debug, Clone)]
pub struct NormalizedRelief {
    pub image: Array2<u8>,
    pub stats: BandpassStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BandpassStats {
    /// Narrow kernel sigma in pixels.
    pub sigma_narrow: f64,
    /// Wide kernel sigma in pixels.
    pub sigma_wide: f64,
    pub clip_low: f64,
    pub clip_high: f64,
}

/// Bandpass and quantize an infilled grid.
///
/// `weak_size` and `strong_size` are kernel sizes in object space (metres);
/// they are converted to pixels with the transform's kernel scale.
pub fn normalize(
    values: &Array2<f64>,
    transform: &AffineTransform,
    weak_size: f64,
    strong_size: f64,
) -> PrepResult<NormalizedRelief> {
    if values.is_empty() {
        return Err(PrepError::EmptyData("relief grid is empty".to_string()));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(PrepError::NotPrepared {
            stage: "normalize",
            requires: "infill",
        });
    }

    let scale = transform.kernel_scale();
    if !(scale.is_finite() && scale > 0.0) {
        return Err(PrepError::unsupported_geometry(
            "relief grid",
            format!("pixel scale {scale} cannot size the bandpass kernels"),
        ));
    }
    let sigma_narrow = weak_size / scale;
    let sigma_wide = strong_size / scale;

    let narrow = gaussian_blur(values, sigma_narrow)?;
    let wide = gaussian_blur(values, sigma_wide)?;
    let bandpassed = narrow - wide;

    let mut sorted: Vec<f64> = bandpassed.iter().copied().collect();
    sorted.par_sort_unstable_by(|a, b| a.total_cmp(b));
    let clip_low = percentile(&sorted, CLIP_PERCENTILE_LOW);
    let clip_high = percentile(&sorted, CLIP_PERCENTILE_HIGH);
    if clip_high <= clip_low {
        return Err(PrepError::DegenerateSurface { value: clip_low });
    }

    let range = clip_high - clip_low;
    let image = bandpassed.mapv(|v| {
        let unit = (v.clamp(clip_low, clip_high) - clip_low) / range;
        (unit * 255.0).round() as u8
    });

    Ok(NormalizedRelief {
        image,
        stats: BandpassStats {
            sigma_narrow,
            sigma_wide,
            clip_low,
            clip_high,
        },
    })
}

/// Separable Gaussian blur with reflect-101 borders.
///
/// The kernel spans `round(8 * sigma + 1)` taps, forced odd.
pub fn gaussian_blur(values: &Array2<f64>, sigma: f64) -> PrepResult<Array2<f64>> {
    if !(sigma.is_finite() && sigma > 0.0) {
        return Err(PrepError::configuration(format!(
            "filter sigma must be positive, got {sigma}"
        )));
    }
    let kernel = gaussian_kernel(sigma);
    let (rows, cols) = values.dim();

    let horizontal: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map_iter(|r| {
            let kernel = &kernel;
            (0..cols).map(move |c| convolve(kernel, cols, c, |i| values[[r, i]]))
        })
        .collect();

    let vertical: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map_iter(|r| {
            let (kernel, horizontal) = (&kernel, &horizontal);
            (0..cols).map(move |c| convolve(kernel, rows, r, |i| horizontal[i * cols + c]))
        })
        .collect();

    Array2::from_shape_vec((rows, cols), vertical)
        .map_err(|e| PrepError::engine("gaussian", e.to_string()))
}

fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let size = ((sigma * 8.0 + 1.0).round() as usize) | 1;
    let half = (size / 2) as f64;
    let taps: Vec<f64> = (0..size)
        .map(|i| {
            let x = i as f64 - half;
            (-(x * x) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f64 = taps.iter().sum();
    taps.into_iter().map(|t| t / sum).collect()
}

#[inline]
fn convolve(kernel: &[f64], len: usize, centre: usize, sample: impl Fn(usize) -> f64) -> f64 {
    let half = (kernel.len() / 2) as isize;
    kernel
        .iter()
        .enumerate()
        .map(|(k, w)| w * sample(reflect_101(centre as isize + k as isize - half, len)))
        .sum()
}

/// Mirror an out-of-range index without repeating the edge sample.
fn reflect_101(index: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len as isize - 1);
    let m = index.rem_euclid(period);
    if m >= len as isize {
        (period - m) as usize
    } else {
        m as usize
    }
}

/// Percentile of ascending `sorted` with linear interpolation between ranks.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}
