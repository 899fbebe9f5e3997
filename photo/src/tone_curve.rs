//! Tone-curve construction.
//!
//! A gain `k` is realized as a 256-entry lookup table. Plain linear
//! scaling with `k > 1` clips every bright value to 255; instead the
//! table follows a quadratic Bezier anchored at the black and white
//! points, which compresses the upper range smoothly while achieving
//! the same average-brightness correction.

/// A fixed 256-entry mapping from input sample value to output value.
///
/// Endpoints are pinned (`lut[0] == 0`, `lut[255] == 255`) by
/// construction; monotonicity is not guaranteed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToneCurve {
    table: [u8; 256],
}

impl ToneCurve {
    pub fn identity() -> Self {
        let mut table = [0u8; 256];
        for (i, v) in table.iter_mut().enumerate() {
            *v = i as u8;
        }
        Self { table }
    }

    /// Builds the curve realizing a multiplicative gain `k`.
    ///
    /// Within 2% of unity the mapping is plain saturating linear
    /// scaling; farther out it follows the quadratic Bezier through
    /// (0,0), the gain-derived control point, and (255,255).
    ///
    /// Panics if `k <= 0`; a non-positive gain is a solver bug.
    pub fn from_gain(k: f64) -> Self {
        assert!(k > 0.0, "gain must be strictly positive, got {k}");
        let mut table = [0u8; 256];
        if (k - 1.0).abs() < 0.02 {
            for (i, v) in table.iter_mut().enumerate() {
                *v = (i as f64 * k).round().clamp(0.0, 255.0) as u8;
            }
            return Self { table };
        }

        let (ctrl_x, ctrl_y) = if k > 1.0 {
            (255.0 / k, 255.0)
        } else {
            (255.0, k * 255.0)
        };
        table[0] = 0;
        table[255] = 255;
        for (i, v) in table.iter_mut().enumerate().take(255).skip(1) {
            let t = bezier_parameter(ctrl_x, i as f64);
            let y = 2.0 * (1.0 - t) * t * ctrl_y + t * t * 255.0 + 0.5;
            *v = y.clamp(0.0, 255.0) as u8;
        }
        Self { table }
    }

    /// Compatibility path for the historical affine correction:
    /// `out = a·i² + b·i + c`, saturating.
    pub fn from_quadratic(a: f64, b: f64, c: f64) -> Self {
        let mut table = [0u8; 256];
        for (i, v) in table.iter_mut().enumerate() {
            let x = i as f64;
            *v = (a * x * x + b * x + c).round().clamp(0.0, 255.0) as u8;
        }
        Self { table }
    }

    #[inline]
    pub fn map(&self, value: u8) -> u8 {
        self.table[value as usize]
    }

    pub fn as_table(&self) -> &[u8; 256] {
        &self.table
    }

    pub fn is_identity(&self) -> bool {
        self.table.iter().enumerate().all(|(i, &v)| v == i as u8)
    }
}

/// Solves the Bezier x-coordinate equation for the parameter `t` at
/// which the curve through (0,0), (ctrl_x, _), (255,255) reaches `x`.
/// Exactly one root must lie in (0,1); anything else is a builder bug.
fn bezier_parameter(ctrl_x: f64, x: f64) -> f64 {
    let a = 255.0 - 2.0 * ctrl_x;
    let b = 2.0 * ctrl_x;
    let c = -x;
    if a.abs() < 1e-9 {
        // Control point at midspan degenerates the quadratic to b·t + c.
        return -c / b;
    }
    let m = -b / (2.0 * a);
    let n = (b * b - 4.0 * a * c).sqrt() / (2.0 * a);
    let t0 = m - n;
    let t1 = m + n;
    if t0 > 0.0 && t0 < 1.0 {
        t0
    } else if t1 > 0.0 && t1 < 1.0 {
        t1
    } else {
        panic!("no Bezier root in (0,1) for x = {x}, ctrl_x = {ctrl_x}");
    }
}

/// Least-squares slope of a line through the origin fitted to
/// (input, target) sample pairs. Returns 0 when the inputs carry no
/// energy (all-black overlap).
pub fn fit_slope_through_origin(points: &[(f64, f64)]) -> f64 {
    assert!(points.len() >= 3, "slope fit needs at least 3 samples");
    let mut a = 0.0;
    let mut b = 0.0;
    for &(x, y) in points {
        a += x * x;
        b += x * y;
    }
    if a < f64::EPSILON {
        0.0
    } else {
        b / a
    }
}

/// Least-squares parabola through (0,0) and (255,255) fitted to
/// (input, target) pairs; returns `(a, b, c)` for `a·x² + b·x + c`.
/// Falls back to the identity coefficients for degenerate samples.
pub fn fit_parabola(points: &[(f64, f64)]) -> (f64, f64, f64) {
    assert!(points.len() >= 3, "parabola fit needs at least 3 samples");
    let mut acc_a = 0.0;
    let mut acc_b = 0.0;
    for &(x, y) in points {
        let t1 = x * x - 255.0 * x;
        let t2 = x - y;
        acc_a += t1 * t1;
        acc_b += t1 * t2;
    }
    if acc_a.abs() < 0.001 {
        (0.0, 1.0, 0.0)
    } else {
        let a = -acc_b / acc_a;
        (a, 1.0 - 255.0 * a, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_fixed_for_any_gain() {
        for &k in &[0.2, 0.5, 0.97, 1.0, 1.01, 1.5, 2.0, 3.0, 7.5] {
            let lut = ToneCurve::from_gain(k);
            assert_eq!(lut.map(0), 0, "k = {k}");
            assert_eq!(lut.map(255), 255, "k = {k}");
        }
    }

    #[test]
    fn near_identity_gain_is_linear() {
        let k = 1.015;
        let lut = ToneCurve::from_gain(k);
        for i in 0..=255u32 {
            let expect = (i as f64 * k).round().clamp(0.0, 255.0) as u8;
            assert_eq!(lut.map(i as u8), expect);
        }
    }

    #[test]
    fn far_gain_defined_everywhere() {
        for &k in &[0.1, 0.5, 1.5, 2.0, 4.0, 10.0] {
            let lut = ToneCurve::from_gain(k);
            // Every index resolved without panicking; spot-check the
            // curve brightens/darkens the midtones in the right
            // direction.
            if k > 1.0 {
                assert!(lut.map(128) > 128, "k = {k}");
            } else {
                assert!(lut.map(128) < 128, "k = {k}");
            }
        }
    }

    #[test]
    fn bright_gain_preserves_highlight_detail() {
        let lut = ToneCurve::from_gain(1.5);
        // Linear scaling would clip 200 and 250 both to 255.
        assert!(lut.map(200) < lut.map(250));
        assert!(lut.map(250) < 255 || lut.map(200) < 255);
    }

    #[test]
    #[should_panic(expected = "strictly positive")]
    fn non_positive_gain_is_rejected() {
        let _ = ToneCurve::from_gain(0.0);
    }

    #[test]
    fn identity_curve_maps_every_value_to_itself() {
        assert!(ToneCurve::identity().is_identity());
    }

    #[test]
    fn quadratic_identity_coefficients() {
        let lut = ToneCurve::from_quadratic(0.0, 1.0, 0.0);
        assert!(lut.is_identity());
    }

    #[test]
    fn slope_fit_recovers_exact_line() {
        let pts: Vec<(f64, f64)> = (1..50).map(|x| (x as f64, 1.3 * x as f64)).collect();
        let k = fit_slope_through_origin(&pts);
        assert!((k - 1.3).abs() < 1e-9);
    }

    #[test]
    fn slope_fit_of_dark_samples_is_zero() {
        let pts = vec![(0.0, 10.0), (0.0, 20.0), (0.0, 30.0)];
        assert_eq!(fit_slope_through_origin(&pts), 0.0);
    }

    #[test]
    fn parabola_fit_of_identity_samples() {
        let pts: Vec<(f64, f64)> = (0..=255).step_by(5).map(|x| (x as f64, x as f64)).collect();
        let (a, b, c) = fit_parabola(&pts);
        assert!(a.abs() < 1e-9);
        assert!((b - 1.0).abs() < 1e-9);
        assert_eq!(c, 0.0);
    }
}
