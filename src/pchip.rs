//! Monotone piecewise cubic Hermite interpolation (PCHIP).
//!
//! Used for drift correction of integrated velocity: the curve passes
//! through the velocity at stationary samples without overshooting between
//! them. Interior slopes use the weighted harmonic mean of adjacent secant
//! slopes (zero at local extrema); end slopes use the one-sided three-point
//! formula, clipped to preserve shape. Outside the knots the end cubics are
//! extended.

use crate::error::{GaitError, Result};

/// A fitted PCHIP curve.
#[derive(Debug, Clone)]
pub struct Pchip {
    x: Vec<f64>,
    y: Vec<f64>,
    d: Vec<f64>,
}

impl Pchip {
    /// Fit through strictly increasing knots `x` with values `y`.
    pub fn new(x: &[f64], y: &[f64]) -> Result<Self> {
        if x.len() != y.len() {
            return Err(GaitError::LengthMismatch {
                context: "pchip knots".into(),
                expected: x.len(),
                actual: y.len(),
            });
        }
        if x.is_empty() {
            return Err(GaitError::EmptyInput("pchip knots".into()));
        }
        if x.windows(2).any(|w| w[1] <= w[0]) {
            return Err(GaitError::Numerical(
                "pchip knots must be strictly increasing".into(),
            ));
        }

        let d = derivatives(x, y);
        Ok(Self {
            x: x.to_vec(),
            y: y.to_vec(),
            d,
        })
    }

    /// Evaluate at `xq`.
    pub fn evaluate(&self, xq: f64) -> f64 {
        let n = self.x.len();
        if n == 1 {
            return self.y[0];
        }
        // Interval index, clamped so out-of-range points use the end cubics.
        let k = self
            .x
            .partition_point(|&xi| xi <= xq)
            .saturating_sub(1)
            .min(n - 2);

        let h = self.x[k + 1] - self.x[k];
        let t = (xq - self.x[k]) / h;
        let t2 = t * t;
        let t3 = t2 * t;

        let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
        let h10 = t3 - 2.0 * t2 + t;
        let h01 = -2.0 * t3 + 3.0 * t2;
        let h11 = t3 - t2;

        h00 * self.y[k] + h10 * h * self.d[k] + h01 * self.y[k + 1] + h11 * h * self.d[k + 1]
    }

    /// Evaluate at every sample index `0..len`.
    pub fn evaluate_range(&self, len: usize) -> Vec<f64> {
        (0..len).map(|i| self.evaluate(i as f64)).collect()
    }
}

fn derivatives(x: &[f64], y: &[f64]) -> Vec<f64> {
    let n = x.len();
    if n == 1 {
        return vec![0.0];
    }
    let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
    let m: Vec<f64> = (0..n - 1).map(|k| (y[k + 1] - y[k]) / h[k]).collect();

    if n == 2 {
        return vec![m[0], m[0]];
    }

    let mut d = vec![0.0; n];
    for k in 1..n - 1 {
        let (m0, m1) = (m[k - 1], m[k]);
        if m0 == 0.0 || m1 == 0.0 || m0.signum() != m1.signum() {
            d[k] = 0.0;
        } else {
            let w1 = 2.0 * h[k] + h[k - 1];
            let w2 = h[k] + 2.0 * h[k - 1];
            d[k] = (w1 + w2) / (w1 / m0 + w2 / m1);
        }
    }
    d[0] = edge_slope(h[0], h[1], m[0], m[1]);
    d[n - 1] = edge_slope(h[n - 2], h[n - 3], m[n - 2], m[n - 3]);
    d
}

fn edge_slope(h0: f64, h1: f64, m0: f64, m1: f64) -> f64 {
    let d = ((2.0 * h0 + h1) * m0 - h0 * m1) / (h0 + h1);
    if sign(d) != sign(m0) {
        0.0
    } else if sign(m0) != sign(m1) && d.abs() > 3.0 * m0.abs() {
        3.0 * m0
    } else {
        d
    }
}

fn sign(v: f64) -> i8 {
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}
