//! Zero-phase low-pass filtering and integration primitives.
//!
//! This module provides the batch signal conditioning used by every detector:
//! - Butterworth low-pass design of any order (bilinear transform)
//! - Zero-phase forward-backward filtering with odd-extension padding and
//!   steady-state initial conditions
//! - Per-axis filtering of 3-vector series, optionally keeping the
//!   missing-marker sentinel intact
//! - Running-sum integration and linear drift removal
//!
//! Design note: event timing depends on zero phase lag, so only the
//! forward-backward path is exposed. There is no causal single-pass API.

use std::f64::consts::PI;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{GaitError, Result};
use crate::types::{MarkerTrajectories, Vec3};

/// Order and cutoff of one low-pass stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    /// Butterworth order. 2 nearly everywhere; 4 for force plates.
    pub order: usize,
    /// -3 dB cutoff in Hz.
    pub cutoff_hz: f64,
}

impl FilterSpec {
    pub const fn new(order: usize, cutoff_hz: f64) -> Self {
        Self { order, cutoff_hz }
    }

    /// Design this filter for a sample rate.
    pub fn design(&self, sample_rate: f64) -> Result<ButterworthLowpass> {
        ButterworthLowpass::new(self.order, self.cutoff_hz, sample_rate)
    }

    /// Design and apply in one step.
    pub fn apply(&self, signal: &[f64], sample_rate: f64) -> Result<Vec<f64>> {
        self.design(sample_rate)?.filtfilt(signal)
    }
}

/// Butterworth low-pass filter in transfer-function form.
///
/// Coefficients are normalised so that `a[0] == 1`.
#[derive(Debug, Clone)]
pub struct ButterworthLowpass {
    b: Vec<f64>,
    a: Vec<f64>,
    order: usize,
}

impl ButterworthLowpass {
    /// Design a low-pass filter.
    ///
    /// The cutoff is normalised against half the sample rate and must lie
    /// strictly inside (0, Nyquist).
    pub fn new(order: usize, cutoff_hz: f64, sample_rate: f64) -> Result<Self> {
        if order == 0 || order > 10 {
            return Err(GaitError::config(format!("filter order must be 1-10, got {order}")));
        }
        let nyquist = sample_rate / 2.0;
        if !(cutoff_hz > 0.0 && cutoff_hz < nyquist) {
            return Err(GaitError::config(format!(
                "cutoff {cutoff_hz} Hz must lie in (0, {nyquist}) Hz"
            )));
        }
        let wn = cutoff_hz / nyquist;

        // Analog prototype poles on the unit circle, left half-plane.
        let n = order as f64;
        let poles: Vec<Complex64> = (0..order)
            .map(|k| {
                let m = -(n - 1.0) + 2.0 * k as f64;
                -Complex64::from_polar(1.0, PI * m / (2.0 * n))
            })
            .collect();

        // Pre-warp with fs = 2 and scale the prototype.
        let fs2 = 4.0;
        let warped = fs2 * (PI * wn / 2.0).tan();
        let poles: Vec<Complex64> = poles.iter().map(|p| p * warped).collect();
        let k_analog = warped.powi(order as i32);

        // Bilinear transform; all zeros map to z = -1.
        let z_poles: Vec<Complex64> = poles.iter().map(|p| (fs2 + p) / (fs2 - p)).collect();
        let denom: Complex64 = poles.iter().map(|p| fs2 - p).product();
        let k_digital = k_analog / denom.re;

        let zeros = vec![Complex64::new(-1.0, 0.0); order];
        let b: Vec<f64> = poly(&zeros).iter().map(|c| c.re * k_digital).collect();
        let a: Vec<f64> = poly(&z_poles).iter().map(|c| c.re).collect();

        Ok(Self { b, a, order })
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Numerator coefficients.
    pub fn b(&self) -> &[f64] {
        &self.b
    }

    /// Denominator coefficients.
    pub fn a(&self) -> &[f64] {
        &self.a
    }

    /// Zero-phase filtering: forward pass, reverse, forward pass, reverse.
    ///
    /// The signal is padded on both ends by odd extension of
    /// `3 * (order + 1)` samples (clamped to the signal length), and each
    /// pass starts from the steady-state filter state scaled to its first
    /// sample, so constant inputs pass through unchanged.
    pub fn filtfilt(&self, x: &[f64]) -> Result<Vec<f64>> {
        if x.len() < 2 {
            return Ok(x.to_vec());
        }
        let padlen = (3 * self.b.len().max(self.a.len())).min(x.len() - 1);
        let zi = self.steady_state()?;

        let ext = odd_extension(x, padlen);
        let forward = self.lfilter(&ext, &scaled(&zi, ext[0]));
        let reversed: Vec<f64> = forward.into_iter().rev().collect();
        let backward = self.lfilter(&reversed, &scaled(&zi, reversed[0]));

        Ok(backward
            .into_iter()
            .rev()
            .skip(padlen)
            .take(x.len())
            .collect())
    }

    /// Direct form II transposed pass from initial state `zi`.
    fn lfilter(&self, x: &[f64], zi: &[f64]) -> Vec<f64> {
        let n = self.a.len();
        let mut z = zi.to_vec();
        let mut y = Vec::with_capacity(x.len());
        for &xi in x {
            let yi = self.b[0] * xi + z.first().copied().unwrap_or(0.0);
            for i in 0..n.saturating_sub(1) {
                let next = if i + 1 < n - 1 { z[i + 1] } else { 0.0 };
                z[i] = self.b[i + 1] * xi + next - self.a[i + 1] * yi;
            }
            y.push(yi);
        }
        y
    }

    /// Initial state giving a unit-step steady-state response.
    ///
    /// Solves `(I - Aᵀ) zi = b[1:] - a[1:] * b[0]` where `A` is the companion
    /// matrix of the denominator.
    fn steady_state(&self) -> Result<Vec<f64>> {
        let n = self.a.len() - 1;
        let mut m = vec![vec![0.0; n]; n];
        for (i, row) in m.iter_mut().enumerate() {
            row[i] = 1.0;
            row[0] += self.a[i + 1];
            if i + 1 < n {
                row[i + 1] -= 1.0;
            }
        }
        let rhs: Vec<f64> = (0..n)
            .map(|i| self.b[i + 1] - self.a[i + 1] * self.b[0])
            .collect();
        solve_linear(m, rhs)
    }
}

/// Filter each axis of a 3-vector series independently.
pub fn filtfilt_vec3(filter: &ButterworthLowpass, series: &[Vec3]) -> Result<Vec<Vec3>> {
    let mut out = vec![[0.0; 3]; series.len()];
    for axis in 0..3 {
        let channel: Vec<f64> = series.iter().map(|v| v[axis]).collect();
        let filtered = filter.filtfilt(&channel)?;
        for (o, f) in out.iter_mut().zip(filtered) {
            o[axis] = f;
        }
    }
    Ok(out)
}

/// Filter a marker trajectory and restore the `(0,0,0)` sentinel on samples
/// that were missing before filtering.
pub fn filtfilt_marker(filter: &ButterworthLowpass, series: &[Vec3]) -> Result<Vec<Vec3>> {
    let mut out = filtfilt_vec3(filter, series)?;
    for (o, raw) in out.iter_mut().zip(series) {
        if MarkerTrajectories::is_missing(raw) {
            *o = [0.0; 3];
        }
    }
    Ok(out)
}

/// Running-sum integral: `y[0] = 0`, `y[t] = y[t-1] + x[t] / fs`.
pub fn cumulative_integral(x: &[f64], sample_rate: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(x.len());
    let mut acc = 0.0;
    for (i, &v) in x.iter().enumerate() {
        if i > 0 {
            acc += v / sample_rate;
        }
        out.push(acc);
    }
    out
}

/// Remove a linear ramp so the series ends where it started:
/// `y[i] = x[i] - (x[last] - x[0]) / len * i`.
pub fn remove_linear_drift(x: &[f64]) -> Vec<f64> {
    let Some((first, last)) = x.first().zip(x.last()) else {
        return Vec::new();
    };
    let rate = (last - first) / x.len() as f64;
    x.iter()
        .enumerate()
        .map(|(i, v)| v - rate * i as f64)
        .collect()
}

/// Discrete derivative padded with a leading zero: `[0, x1-x0, x2-x1, ...]`.
pub fn padded_diff(x: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(x.len());
    if !x.is_empty() {
        out.push(0.0);
    }
    out.extend(x.windows(2).map(|w| w[1] - w[0]));
    out
}

// ===== PRIVATE HELPERS =====

fn scaled(v: &[f64], s: f64) -> Vec<f64> {
    v.iter().map(|c| c * s).collect()
}

fn odd_extension(x: &[f64], n: usize) -> Vec<f64> {
    let first = x[0];
    let last = x[x.len() - 1];
    let mut ext = Vec::with_capacity(x.len() + 2 * n);
    ext.extend((1..=n).rev().map(|i| 2.0 * first - x[i]));
    ext.extend_from_slice(x);
    ext.extend((1..=n).map(|i| 2.0 * last - x[x.len() - 1 - i]));
    ext
}

/// Coefficients of the monic polynomial with the given roots, highest power first.
fn poly(roots: &[Complex64]) -> Vec<Complex64> {
    let mut coeffs = vec![Complex64::new(1.0, 0.0)];
    for r in roots {
        let mut next = vec![Complex64::new(0.0, 0.0); coeffs.len() + 1];
        for (i, c) in coeffs.iter().enumerate() {
            next[i] += c;
            next[i + 1] -= c * r;
        }
        coeffs = next;
    }
    coeffs
}

/// Gaussian elimination with partial pivoting.
fn solve_linear(mut m: Vec<Vec<f64>>, mut rhs: Vec<f64>) -> Result<Vec<f64>> {
    let n = rhs.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| m[i][col].abs().total_cmp(&m[j][col].abs()))
            .unwrap_or(col);
        if m[pivot][col].abs() < 1e-14 {
            return Err(GaitError::Numerical("singular filter state matrix".into()));
        }
        m.swap(col, pivot);
        rhs.swap(col, pivot);
        for row in col + 1..n {
            let f = m[row][col] / m[col][col];
            for k in col..n {
                m[row][k] -= f * m[col][k];
            }
            rhs[row] -= f * rhs[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let s: f64 = (row + 1..n).map(|k| m[row][k] * x[k]).sum();
        x[row] = (rhs[row] - s) / m[row][row];
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_second_order_coefficients() {
        // scipy.signal.butter(2, 0.3)
        let f = ButterworthLowpass::new(2, 15.0, 100.0).unwrap();
        let b = f.b();
        let a = f.a();
        assert_abs_diff_eq!(b[0], 0.131_106_439_916_626_5, epsilon = 1e-9);
        assert_abs_diff_eq!(b[1], 0.262_212_879_833_253, epsilon = 1e-9);
        assert_abs_diff_eq!(b[2], 0.131_106_439_916_626_5, epsilon = 1e-9);
        assert_abs_diff_eq!(a[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(a[1], -0.747_789_178_258_503_4, epsilon = 1e-9);
        assert_abs_diff_eq!(a[2], 0.272_214_937_925_009_4, epsilon = 1e-9);
    }

    #[test]
    fn test_unity_dc_gain() {
        for order in 1..=4 {
            let f = ButterworthLowpass::new(order, 5.0, 100.0).unwrap();
            let gain = f.b().iter().sum::<f64>() / f.a().iter().sum::<f64>();
            assert_abs_diff_eq!(gain, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_constant_signal_passes_unchanged() {
        let f = ButterworthLowpass::new(2, 15.0, 100.0).unwrap();
        let y = f.filtfilt(&vec![3.5; 200]).unwrap();
        for v in y {
            assert_abs_diff_eq!(v, 3.5, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_zero_phase_preserves_peak_location() {
        let fs = 100.0;
        let x: Vec<f64> = (0..400)
            .map(|i| (2.0 * PI * 1.0 * i as f64 / fs).sin())
            .collect();
        let f = ButterworthLowpass::new(2, 15.0, fs).unwrap();
        let y = f.filtfilt(&x).unwrap();

        // Peak of the 1 Hz sine at sample 125 must not shift.
        let window = &y[100..150];
        let peak = crate::stats::argmax(window).unwrap() + 100;
        assert_eq!(peak, 125, "Zero-phase filter shifted the peak to {}", peak);
    }

    #[test]
    fn test_attenuates_high_frequency() {
        let fs = 100.0;
        let x: Vec<f64> = (0..500)
            .map(|i| (2.0 * PI * 40.0 * i as f64 / fs).sin())
            .collect();
        let y = FilterSpec::new(2, 5.0).apply(&x, fs).unwrap();
        let max = y[50..450].iter().fold(0.0f64, |m, v| m.max(v.abs()));
        assert!(max < 0.05, "40 Hz should be suppressed by a 5 Hz low-pass, got {}", max);
    }

    #[test]
    fn test_rejects_cutoff_above_nyquist() {
        assert!(ButterworthLowpass::new(2, 60.0, 100.0).is_err());
        assert!(ButterworthLowpass::new(0, 10.0, 100.0).is_err());
    }

    #[test]
    fn test_short_signal_does_not_panic() {
        let f = ButterworthLowpass::new(2, 15.0, 100.0).unwrap();
        assert_eq!(f.filtfilt(&[]).unwrap().len(), 0);
        assert_eq!(f.filtfilt(&[1.0]).unwrap(), vec![1.0]);
        assert_eq!(f.filtfilt(&[1.0, 2.0, 3.0]).unwrap().len(), 3);
    }

    #[test]
    fn test_marker_sentinel_preserved() {
        let f = ButterworthLowpass::new(2, 15.0, 100.0).unwrap();
        let mut series = vec![[10.0, 20.0, 30.0]; 50];
        series[25] = [0.0; 3];
        let out = filtfilt_marker(&f, &series).unwrap();
        assert_eq!(out[25], [0.0; 3]);
        assert!(out[10][0] > 0.0);
    }

    #[test]
    fn test_cumulative_integral_and_drift() {
        let y = cumulative_integral(&[5.0, 1.0, 1.0, 1.0], 2.0);
        assert_eq!(y, vec![0.0, 0.5, 1.0, 1.5]);

        let d = remove_linear_drift(&[0.0, 1.0, 2.0, 3.0]);
        assert_abs_diff_eq!(d[3], 3.0 - 3.0 / 4.0 * 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_padded_diff() {
        assert_eq!(padded_diff(&[1.0, 3.0, 6.0]), vec![0.0, 2.0, 3.0]);
        assert!(padded_diff(&[]).is_empty());
    }
}
