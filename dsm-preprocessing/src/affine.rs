//! Six-parameter pixel to world affine transform and the output transform
//! composer.
//!
//! ```text
//! x = a * col + b * row + c
//! y = d * col + e * row + f
//! ```
//!
//! Composition follows matrix order: `lhs * rhs` applies `rhs` first.
use crate::error::{PrepError, PrepResult};
use crate::grid::PixelWindow;
use serde::{Deserialize, Serialize};
use std::ops::Mul;

/// Tolerance for identity and conformality checks.
const EPSILON: f64 = 1e-5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl AffineTransform {
    pub const IDENTITY: AffineTransform = AffineTransform {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 0.0,
        e: 1.0,
        f: 0.0,
    };

    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    /// North-up grid with square pixels anchored at its upper-left corner.
    pub fn north_up(left: f64, top: f64, pixel_size: f64) -> Self {
        Self::new(pixel_size, 0.0, left, 0.0, -pixel_size, top)
    }

    /// Pure scale about the origin.
    pub fn scale(sx: f64, sy: f64) -> Self {
        Self::new(sx, 0.0, 0.0, 0.0, sy, 0.0)
    }

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self::new(1.0, 0.0, tx, 0.0, 1.0, ty)
    }

    #[inline]
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.a * col + self.b * row + self.c,
            self.d * col + self.e * row + self.f,
        )
    }

    pub fn determinant(&self) -> f64 {
        self.a * self.e - self.b * self.d
    }

    /// World to pixel mapping. Fails for singular transforms.
    pub fn inverse(&self) -> PrepResult<Self> {
        let det = self.determinant();
        if det.abs() < f64::EPSILON {
            return Err(PrepError::unsupported_geometry(
                "affine transform",
                "transform is singular and cannot be inverted",
            ));
        }
        let ia = self.e / det;
        let ib = -self.b / det;
        let id = -self.d / det;
        let ie = self.a / det;
        Ok(Self::new(
            ia,
            ib,
            -self.c * ia - self.f * ib,
            id,
            ie,
            -self.c * id - self.f * ie,
        ))
    }

    pub fn is_identity(&self) -> bool {
        [
            self.a - 1.0,
            self.b,
            self.c,
            self.d,
            self.e - 1.0,
            self.f,
        ]
        .iter()
        .all(|v| v.abs() < EPSILON)
    }

    /// Column and row basis vectors are orthogonal (no shear). Tolerance is
    /// relative to the pixel size.
    pub fn is_conformal(&self) -> bool {
        let (sx, sy) = self.pixel_scale();
        (self.a * self.b + self.d * self.e).abs() <= EPSILON * sx * sy
    }

    /// No rotation: the pixel axes are parallel to the world axes, whatever
    /// the pixel size.
    pub fn is_rectilinear(&self) -> bool {
        let (sx, sy) = self.pixel_scale();
        self.d.abs() <= EPSILON * sx && self.b.abs() <= EPSILON * sy
    }

    /// Length of the column and row basis vectors.
    pub fn pixel_scale(&self) -> (f64, f64) {
        (self.a.hypot(self.d), self.b.hypot(self.e))
    }

    /// Object-space size of one pixel along the first row of the linear part.
    pub fn kernel_scale(&self) -> f64 {
        self.a.hypot(self.b)
    }

    pub fn origin(&self) -> (f64, f64) {
        (self.c, self.f)
    }

    /// Transform of a sub-window whose upper-left pixel is `window`'s offset.
    pub fn window_transform(&self, window: &PixelWindow) -> Self {
        *self * Self::translation(window.col_off as f64, window.row_off as f64)
    }
}

impl Mul for AffineTransform {
    type Output = AffineTransform;

    fn mul(self, rhs: AffineTransform) -> AffineTransform {
        AffineTransform::new(
            self.a * rhs.a + self.b * rhs.d,
            self.a * rhs.b + self.b * rhs.e,
            self.a * rhs.c + self.b * rhs.f + self.c,
            self.d * rhs.a + self.e * rhs.d,
            self.d * rhs.b + self.e * rhs.e,
            self.d * rhs.c + self.e * rhs.f + self.f,
        )
    }
}

/// Build the output pixel to world transform.
///
/// `pixel_scale` is the ratio of source pixels to output pixels along each
/// axis. It is post-multiplied so the origin stays put while the pixel size
/// changes. The unit scale is then pre-multiplied so both the origin and the
/// pixel size end up in metres. Reversing the order leaves the origin in
/// native units.
pub fn compose_output_transform(
    source: &AffineTransform,
    pixel_scale: (f64, f64),
    units_factor: f64,
) -> AffineTransform {
    let resampled = *source * AffineTransform::scale(pixel_scale.0, pixel_scale.1);
    AffineTransform::scale(units_factor, units_factor) * resampled
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: &AffineTransform, b: &AffineTransform) {
        let pa = [a.a, a.b, a.c, a.d, a.e, a.f];
        let pb = [b.a, b.b, b.c, b.d, b.e, b.f];
        for (x, y) in pa.iter().zip(pb.iter()) {
            assert!((x - y).abs() < 1e-9, "{a:?} != {b:?}");
        }
    }

    #[test]
    fn inverse_round_trips_pixels() {
        let t = AffineTransform::new(0.5, 0.0, 1000.0, 0.0, -0.5, 2000.0);
        let inv = t.inverse().unwrap();
        let (x, y) = t.apply(12.0, 7.5);
        let (col, row) = inv.apply(x, y);
        assert!((col - 12.0).abs() < 1e-9);
        assert!((row - 7.5).abs() < 1e-9);
        assert_close(&(t * inv), &AffineTransform::IDENTITY);
    }

    #[test]
    fn singular_transform_has_no_inverse() {
        let t = AffineTransform::new(1.0, 2.0, 0.0, 2.0, 4.0, 0.0);
        assert!(matches!(
            t.inverse(),
            Err(PrepError::UnsupportedGeometry { .. })
        ));
    }

    #[test]
    fn detects_rotation_and_identity() {
        assert!(AffineTransform::IDENTITY.is_identity());
        assert!(!AffineTransform::north_up(10.0, 20.0, 1.0).is_identity());

        let angle = 0.3_f64;
        let rotated = AffineTransform::new(angle.cos(), -angle.sin(), 0.0, angle.sin(), angle.cos(), 0.0);
        assert!(rotated.is_conformal());
        assert!(!rotated.is_rectilinear());

        let sheared = AffineTransform::new(1.0, 0.5, 0.0, 0.0, 1.0, 0.0);
        assert!(!sheared.is_conformal());
    }

    #[test]
    fn small_pixels_keep_their_rotation() {
        let s = 1.0 / 3600.0;
        let angle = 1.0_f64.to_radians();
        let rotated = AffineTransform::new(
            s * angle.cos(),
            -s * angle.sin(),
            10.0,
            s * angle.sin(),
            s * angle.cos(),
            50.0,
        );
        assert!(rotated.is_conformal());
        assert!(!rotated.is_rectilinear());

        let sheared = AffineTransform::new(s, 0.5 * s, 10.0, 0.0, -s, 50.0);
        assert!(!sheared.is_conformal());

        let centimetre = AffineTransform::north_up(0.0, 0.0, 0.01);
        assert!(centimetre.is_conformal());
        assert!(centimetre.is_rectilinear());
    }

    #[test]
    fn composition_order_is_load_bearing() {
        let source = AffineTransform::north_up(1500.0, 9000.0, 3.0);
        let pixel_scale = (2.0, 2.0);
        let units = 0.3048;

        let composed = compose_output_transform(&source, pixel_scale, units);
        let swapped = source
            * AffineTransform::scale(units, units)
            * AffineTransform::scale(pixel_scale.0, pixel_scale.1);
        assert_ne!(composed, swapped);

        // Origin converted to metres, pixel size resampled then converted.
        assert!((composed.c - 1500.0 * units).abs() < 1e-9);
        assert!((composed.f - 9000.0 * units).abs() < 1e-9);
        assert!((composed.a - 3.0 * 2.0 * units).abs() < 1e-12);
        assert!((composed.e + 3.0 * 2.0 * units).abs() < 1e-12);
    }

    #[test]
    fn unit_factors_of_one_commute() {
        let source = AffineTransform::north_up(1500.0, 9000.0, 3.0);
        let composed = compose_output_transform(&source, (1.0, 1.0), 1.0);
        assert_close(&composed, &source);
    }

    #[test]
    fn window_transform_moves_origin() {
        let t = AffineTransform::north_up(100.0, 200.0, 2.0);
        let w = PixelWindow::new(3, 4, 10, 10);
        let wt = t.window_transform(&w);
        assert_eq!(wt.origin(), (106.0, 192.0));
        assert_eq!(wt.a, 2.0);
    }
}
