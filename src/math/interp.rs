use crate::error::{Error, Result};

// Slack for evaluation points that land a rounding error outside the grid.
const EDGE_TOL: f64 = 1e-9;

/// Piecewise-linear interpolation of `ys` sampled at increasing `xs`.
///
/// Points outside `[xs[0], xs[n-1]]` are an error rather than an extrapolation.
pub fn interp_linear(xs: &[f64], ys: &[f64], x: f64) -> Result<f64> {
    debug_assert_eq!(xs.len(), ys.len());
    let n = xs.len();
    if n == 0 {
        return Err(Error::OutOfRange { x, lo: f64::NAN, hi: f64::NAN });
    }
    let (lo, hi) = (xs[0], xs[n - 1]);
    if x < lo - EDGE_TOL || x > hi + EDGE_TOL {
        return Err(Error::OutOfRange { x, lo, hi });
    }
    if n == 1 {
        return Ok(ys[0]);
    }
    let x = x.clamp(lo, hi);
    // first index with xs[i] > x
    let upper = xs.partition_point(|v| *v <= x).clamp(1, n - 1);
    let i = upper - 1;
    let h = xs[upper] - xs[i];
    if h <= 0.0 {
        return Ok(ys[i]);
    }
    let frac = (x - xs[i]) / h;
    Ok(ys[i] + (ys[upper] - ys[i]) * frac)
}

/// Evaluate [`interp_linear`] at every point of `at`.
pub fn interp_linear_many(xs: &[f64], ys: &[f64], at: &[f64]) -> Result<Vec<f64>> {
    at.iter().map(|x| interp_linear(xs, ys, *x)).collect()
}

/// Shape-preserving piecewise cubic Hermite interpolant (Fritsch-Carlson slopes).
#[derive(Debug, Clone)]
pub struct Pchip {
    xs: Vec<f64>,
    ys: Vec<f64>,
    slopes: Vec<f64>,
}

impl Pchip {
    pub fn new(xs: Vec<f64>, ys: Vec<f64>) -> Result<Self> {
        if xs.len() != ys.len() {
            return Err(Error::invalid("interpolation knots and values differ in length"));
        }
        if xs.len() < 2 {
            return Err(Error::invalid("at least two knots are required"));
        }
        if xs.windows(2).any(|w| !(w[1] > w[0])) {
            return Err(Error::invalid("knots must be strictly increasing"));
        }
        let slopes = pchip_slopes(&xs, &ys);
        Ok(Self { xs, ys, slopes })
    }

    pub fn knots(&self) -> &[f64] {
        &self.xs
    }

    /// Evaluate the interpolant. Outside the knots the end cubic is extended.
    pub fn eval(&self, x: f64) -> f64 {
        let n = self.xs.len();
        let i = self.xs.partition_point(|v| *v <= x).clamp(1, n - 1) - 1;
        let h = self.xs[i + 1] - self.xs[i];
        let t = (x - self.xs[i]) / h;
        let t2 = t * t;
        let t3 = t2 * t;
        let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
        let h10 = t3 - 2.0 * t2 + t;
        let h01 = -2.0 * t3 + 3.0 * t2;
        let h11 = t3 - t2;
        h00 * self.ys[i]
            + h10 * h * self.slopes[i]
            + h01 * self.ys[i + 1]
            + h11 * h * self.slopes[i + 1]
    }
}

fn pchip_slopes(xs: &[f64], ys: &[f64]) -> Vec<f64> {
    let n = xs.len();
    let h: Vec<f64> = xs.windows(2).map(|w| w[1] - w[0]).collect();
    let m: Vec<f64> = (0..n - 1).map(|k| (ys[k + 1] - ys[k]) / h[k]).collect();

    if n == 2 {
        return vec![m[0], m[0]];
    }

    let mut d = vec![0.0; n];
    for k in 1..n - 1 {
        if m[k - 1] * m[k] <= 0.0 {
            continue;
        }
        let w1 = 2.0 * h[k] + h[k - 1];
        let w2 = h[k] + 2.0 * h[k - 1];
        d[k] = (w1 + w2) / (w1 / m[k - 1] + w2 / m[k]);
    }
    d[0] = edge_slope(h[0], h[1], m[0], m[1]);
    d[n - 1] = edge_slope(h[n - 2], h[n - 3], m[n - 2], m[n - 3]);
    d
}

fn edge_slope(h0: f64, h1: f64, m0: f64, m1: f64) -> f64 {
    let d = ((2.0 * h0 + h1) * m0 - h0 * m1) / (h0 + h1);
    if d.signum() != m0.signum() || m0 == 0.0 {
        0.0
    } else if m0.signum() != m1.signum() && d.abs() > 3.0 * m0.abs() {
        3.0 * m0
    } else {
        d
    }
}
