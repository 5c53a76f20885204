//! Orientation math for body-worn sensors.
//!
//! The recording already carries a per-sample sensor-to-earth orientation
//! (computed on the device). This module applies it:
//! - Rotating sensor-frame streams into the earth frame
//! - Removing gravity from earth-frame vertical acceleration
//! - Euler angle extraction (roll, pitch, yaw) in degrees
//! - Averaging a window of orientations (Markley's eigenvector method)

use serde::{Deserialize, Serialize};

use crate::error::{GaitError, Result};
use crate::types::Vec3;

/// Standard gravity removed from the earth-frame vertical axis (m/s²).
pub const GRAVITY: f64 = 9.81;

/// A simple quaternion representation for rotation.
///
/// Format: (w, x, y, z) where w is the scalar part.
/// Unit quaternions represent rotations in 3D space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    /// Scalar (real) part
    pub w: f64,
    /// Vector part (x, y, z)
    pub xyz: [f64; 3],
}

impl Quaternion {
    /// Create a quaternion from components.
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, xyz: [x, y, z] }
    }

    /// Identity quaternion (no rotation).
    pub fn identity() -> Self {
        Self {
            w: 1.0,
            xyz: [0.0, 0.0, 0.0],
        }
    }

    /// Rotation of `angle` radians about a unit `axis`.
    pub fn from_axis_angle(axis: Vec3, angle: f64) -> Self {
        let (s, c) = (angle / 2.0).sin_cos();
        Self::new(c, axis[0] * s, axis[1] * s, axis[2] * s)
    }

    fn as_array(&self) -> [f64; 4] {
        [self.w, self.xyz[0], self.xyz[1], self.xyz[2]]
    }

    fn from_array(a: [f64; 4]) -> Self {
        Self::new(a[0], a[1], a[2], a[3])
    }

    pub fn norm(&self) -> f64 {
        self.as_array().iter().map(|c| c * c).sum::<f64>().sqrt()
    }

    /// Normalize the quaternion to unit length.
    pub fn normalize(&mut self) {
        let len = self.norm();
        if len > 1e-12 {
            self.w /= len;
            self.xyz[0] /= len;
            self.xyz[1] /= len;
            self.xyz[2] /= len;
        }
    }

    /// Conjugate (inverse for unit quaternions).
    pub fn conjugate(&self) -> Quaternion {
        Quaternion {
            w: self.w,
            xyz: [-self.xyz[0], -self.xyz[1], -self.xyz[2]],
        }
    }

    /// Multiply two quaternions: result = self * other.
    pub fn multiply(&self, other: &Quaternion) -> Quaternion {
        let [x1, y1, z1] = self.xyz;
        let [x2, y2, z2] = other.xyz;
        Quaternion {
            w: self.w * other.w - x1 * x2 - y1 * y2 - z1 * z2,
            xyz: [
                self.w * x2 + x1 * other.w + y1 * z2 - z1 * y2,
                self.w * y2 - x1 * z2 + y1 * other.w + z1 * x2,
                self.w * z2 + x1 * y2 - y1 * x2 + z1 * other.w,
            ],
        }
    }

    /// Rotate a vector: result = q * v * q^*.
    pub fn rotate_vector(&self, v: Vec3) -> Vec3 {
        let v_quat = Quaternion { w: 0.0, xyz: v };
        self.multiply(&v_quat).multiply(&self.conjugate()).xyz
    }

    /// Euler angles `[roll, pitch, yaw]` in degrees (ZYX convention).
    pub fn euler_degrees(&self) -> Vec3 {
        let (w, [x, y, z]) = (self.w, self.xyz);

        let roll = (2.0 * (w * x + y * z)).atan2(1.0 - 2.0 * (x * x + y * y));
        let sinp = (2.0 * (w * y - z * x)).clamp(-1.0, 1.0);
        let pitch = sinp.asin();
        let yaw = (2.0 * (w * z + x * y)).atan2(1.0 - 2.0 * (y * y + z * z));

        [roll.to_degrees(), pitch.to_degrees(), yaw.to_degrees()]
    }

    /// Average orientation of a window.
    ///
    /// Dominant eigenvector of `Σ q qᵀ`, found by power iteration; insensitive
    /// to the sign ambiguity of unit quaternions.
    pub fn average(window: &[Quaternion]) -> Result<Quaternion> {
        let first = window
            .first()
            .ok_or_else(|| GaitError::EmptyInput("quaternion window".into()))?;

        let mut m = [[0.0f64; 4]; 4];
        for q in window {
            let a = q.as_array();
            for (r, row) in m.iter_mut().enumerate() {
                for (c, cell) in row.iter_mut().enumerate() {
                    *cell += a[r] * a[c];
                }
            }
        }

        let mut v = first.as_array();
        for _ in 0..100 {
            let mut next = [0.0; 4];
            for (r, row) in m.iter().enumerate() {
                next[r] = row.iter().zip(v.iter()).map(|(a, b)| a * b).sum();
            }
            let len = next.iter().map(|c| c * c).sum::<f64>().sqrt();
            if len < 1e-12 {
                return Err(GaitError::Numerical(
                    "degenerate quaternion window".into(),
                ));
            }
            next.iter_mut().for_each(|c| *c /= len);
            let converged = next
                .iter()
                .zip(v.iter())
                .all(|(a, b)| (a - b).abs() < 1e-12);
            v = next;
            if converged {
                break;
            }
        }
        Ok(Quaternion::from_array(v))
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

/// Rotate each sample of a sensor-frame series into the earth frame.
pub fn rotate_series(series: &[Vec3], orientation: &[Quaternion]) -> Result<Vec<Vec3>> {
    if series.len() != orientation.len() {
        return Err(GaitError::LengthMismatch {
            context: "orientation".into(),
            expected: series.len(),
            actual: orientation.len(),
        });
    }
    Ok(series
        .iter()
        .zip(orientation)
        .map(|(v, q)| q.rotate_vector(*v))
        .collect())
}

/// Earth-frame acceleration with gravity removed from the vertical axis.
pub fn earth_frame_acceleration(acc: &[Vec3], orientation: &[Quaternion]) -> Result<Vec<Vec3>> {
    let mut earth = rotate_series(acc, orientation)?;
    for v in earth.iter_mut() {
        v[2] -= GRAVITY;
    }
    Ok(earth)
}

/// Euler angles in degrees for every sample.
pub fn euler_series(orientation: &[Quaternion]) -> Vec<Vec3> {
    orientation.iter().map(Quaternion::euler_degrees).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_quaternion_rotate_identity() {
        let q = Quaternion::identity();
        let v = [1.0, 2.0, 3.0];
        let rotated = q.rotate_vector(v);

        for i in 0..3 {
            assert_abs_diff_eq!(rotated[i], v[i], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_quaternion_rotate_about_z() {
        let q = Quaternion::from_axis_angle([0.0, 0.0, 1.0], FRAC_PI_2);
        let rotated = q.rotate_vector([1.0, 0.0, 0.0]);

        assert_abs_diff_eq!(rotated[0], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(rotated[1], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(rotated[2], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_quaternion_normalization() {
        let mut q = Quaternion::new(2.0, 2.0, 2.0, 2.0);
        q.normalize();
        assert_abs_diff_eq!(q.norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_quaternion_conjugate_inverts() {
        let q = Quaternion::from_axis_angle([0.0, 1.0, 0.0], 0.7);
        let p = q.multiply(&q.conjugate());
        assert_abs_diff_eq!(p.w, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p.xyz[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_euler_pitch() {
        let q = Quaternion::from_axis_angle([0.0, 1.0, 0.0], 30f64.to_radians());
        let e = q.euler_degrees();
        assert_abs_diff_eq!(e[0], 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(e[1], 30.0, epsilon = 1e-9);
        assert_abs_diff_eq!(e[2], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_earth_frame_removes_gravity() {
        let acc = vec![[0.0, 0.0, GRAVITY]; 3];
        let quats = vec![Quaternion::identity(); 3];
        let earth = earth_frame_acceleration(&acc, &quats).unwrap();
        for v in earth {
            assert_abs_diff_eq!(v[2], 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_average_handles_sign_flip() {
        let q = Quaternion::from_axis_angle([1.0, 0.0, 0.0], 0.4);
        let flipped = Quaternion::new(-q.w, -q.xyz[0], -q.xyz[1], -q.xyz[2]);
        let avg = Quaternion::average(&[q, flipped, q]).unwrap();

        // Same rotation up to sign
        let dot = avg.w * q.w + avg.xyz[0] * q.xyz[0];
        assert_abs_diff_eq!(dot.abs(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_average_empty_window() {
        assert!(Quaternion::average(&[]).is_err());
    }
}
