//! Hexagonal binning for average point spacing.
use std::collections::HashMap;

const SQRT_3: f64 = 1.732_050_807_568_877_2;

/// Occupied-area statistics of a hexbin pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HexbinSummary {
    pub occupied_cells: usize,
    pub counted_points: usize,
    pub area: f64,
    pub avg_pt_spacing: f64,
}

/// Bin points into pointy-top hexagons of `edge_size` and derive the average
/// point spacing as `sqrt(area / points)` over hexagons holding at least
/// `threshold` points. Returns `None` when no hexagon qualifies.
pub fn average_spacing(points: &[[f64; 3]], edge_size: f64, threshold: usize) -> Option<HexbinSummary> {
    if !(edge_size.is_finite() && edge_size > 0.0) {
        return None;
    }
    let mut counts: HashMap<(i64, i64), usize> = HashMap::new();
    for p in points {
        *counts.entry(hex_cell(p[0], p[1], edge_size)).or_insert(0) += 1;
    }

    let threshold = threshold.max(1);
    let (occupied_cells, counted_points) = counts
        .values()
        .filter(|c| **c >= threshold)
        .fold((0, 0), |(cells, pts), c| (cells + 1, pts + c));
    if counted_points == 0 {
        return None;
    }

    let hex_area = 1.5 * SQRT_3 * edge_size * edge_size;
    let area = occupied_cells as f64 * hex_area;
    Some(HexbinSummary {
        occupied_cells,
        counted_points,
        area,
        avg_pt_spacing: (area / counted_points as f64).sqrt(),
    })
}

/// Axial coordinates of the hexagon containing `(x, y)`.
fn hex_cell(x: f64, y: f64, size: f64) -> (i64, i64) {
    let q = (SQRT_3 / 3.0 * x - y / 3.0) / size;
    let r = (2.0 / 3.0 * y) / size;
    cube_round(q, r)
}

fn cube_round(q: f64, r: f64) -> (i64, i64) {
    let s = -q - r;
    let (mut rq, mut rr, rs) = (q.round(), r.round(), s.round());
    let (dq, dr, ds) = ((rq - q).abs(), (rr - r).abs(), (rs - s).abs());
    if dq > dr && dq > ds {
        rq = -rr - rs;
    } else if dr > ds {
        rr = -rq - rs;
    }
    (rq as i64, rr as i64)
}
