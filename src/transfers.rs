//! Sit-to-stand transfer detection and trunk lean angle.
//!
//! Transfers are found on the trunk pitch rate (sensor Y gyroscope):
//! - Integrating the rate gives a drift-corrected tilt signal
//! - Prominent tilt peaks mark candidate transfers
//! - Each transfer spans the positive-slope zero crossings of the filtered
//!   pitch rate around its peak
//! - The lumbar vertical velocity and acceleration before and after the
//!   transfer decide between sit-to-stand and stand-to-sit
//!
//! The lean angle is the largest trunk pitch excursion relative to a short
//! quiet baseline next to the transfer.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{GaitError, Result};
use crate::filtering::{cumulative_integral, remove_linear_drift, FilterSpec};
use crate::orientation::Quaternion;
use crate::peaks::{find_peaks, PeakCriteria};
use crate::stats::{consecutive_runs, indices_to_mask, nanmean, nanstd, round_to, sorted_unique};
use crate::trajectory::{integrate_velocity, DriftCorrection};
use crate::types::{ImuRecording, ImuSensorData, SensorLocation, TrialSummary};

/// Direction of a postural transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferKind {
    SitToStand,
    StandToSit,
}

/// One classified transfer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    /// First sample of the transfer.
    pub start: usize,
    /// Last sample of the transfer.
    pub end: usize,
    pub kind: TransferKind,
    /// Peak trunk lean relative to the quiet baseline (deg).
    pub lean_angle_deg: f64,
}

/// Configuration for transfer detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Low-pass applied to the pitch rate before zero-crossing search.
    pub gyro_filter: FilterSpec,
    /// Minimum tilt peak prominence (rad).
    pub tilt_prominence: f64,
    /// Candidates starting closer than this to the previous one merge (s).
    pub merge_gap_s: f64,
    /// Vertical acceleration standard deviation of a quiet posture (m/s²).
    pub quiet_acc_std: f64,
    /// Length of the lean-angle baseline window (s).
    pub baseline_s: f64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            gyro_filter: FilterSpec::new(2, 5.0),
            tilt_prominence: 0.2,
            merge_gap_s: 0.1,
            quiet_acc_std: 1.0,
            baseline_s: 0.2,
        }
    }
}

/// Transfer detector for L-test and sit-to-stand trials.
#[derive(Debug, Clone, Default)]
pub struct TransferDetector {
    config: TransferConfig,
}

impl TransferDetector {
    pub fn new(config: TransferConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Detect and classify transfers in a recording.
    ///
    /// Needs a trunk sensor (sternum, else lumbar) for the pitch rate and
    /// orientation, and the lumbar sensor for the vertical motion.
    pub fn detect(&self, recording: &ImuRecording) -> Result<Vec<Transfer>> {
        let fs = recording.sample_rate;
        let (location, trunk) = recording.trunk_for_posture()?;
        let lumbar = recording.sensor(SensorLocation::Lumbar)?;

        let pitch_rate = ImuSensorData::axis(&trunk.gyro, 1);
        let segments = self.segments(&pitch_rate, fs)?;
        let vertical_velocity = lumbar_vertical_velocity(lumbar, fs)?;
        let vertical_acc = ImuSensorData::axis(&lumbar.acc_earth, 2);
        let baseline = (self.config.baseline_s * fs).round() as usize;

        let mut transfers = Vec::new();
        for (start, end) in segments {
            let Some(kind) = self.classify(start, end, &vertical_velocity, &vertical_acc) else {
                continue;
            };
            let lean_angle_deg = lean_angle(&trunk.orientation, start, end, kind, baseline)?;
            transfers.push(Transfer {
                start,
                end,
                kind,
                lean_angle_deg,
            });
        }

        debug!(?location, transfers = transfers.len(), "Transfer detection complete");
        Ok(transfers)
    }

    /// Candidate transfer intervals (inclusive) from the trunk pitch rate (rad/s).
    pub fn segments(&self, pitch_rate: &[f64], sample_rate: f64) -> Result<Vec<(usize, usize)>> {
        if pitch_rate.len() < 3 {
            return Ok(Vec::new());
        }
        let tilt = tilt(pitch_rate, sample_rate);
        let mut rate = self.config.gyro_filter.apply(pitch_rate, sample_rate)?;

        let criteria = PeakCriteria::new().prominence(self.config.tilt_prominence);
        let negated: Vec<f64> = tilt.iter().map(|v| -v).collect();
        let up = find_peaks(&tilt, &criteria);
        let down = find_peaks(&negated, &criteria);
        let mean_abs = |peaks: &[usize]| nanmean(&peaks.iter().map(|&p| tilt[p].abs()).collect::<Vec<_>>());

        // Lean direction depends on how the sensor was mounted.
        let (up_mean, down_mean) = (mean_abs(&up), mean_abs(&down));
        let peaks = if down_mean > up_mean || (up_mean.is_nan() && !down_mean.is_nan()) {
            rate.iter_mut().for_each(|v| *v = -*v);
            down
        } else {
            up
        };

        let merge_gap = self.config.merge_gap_s * sample_rate;
        let last = rate.len() - 1;
        let mut samples: Vec<usize> = Vec::new();
        let mut last_end: Option<usize> = None;

        for &peak in &peaks {
            let initial = rising_crossings(&rate, 0, peak - 1).last().copied().unwrap_or(0);
            let final_ = rising_crossings(&rate, peak, last).first().copied().unwrap_or(last);

            match last_end {
                Some(end) if (initial as f64) < end as f64 + merge_gap => {
                    if final_ >= end {
                        samples.extend(end..=final_);
                        last_end = Some(final_);
                    }
                }
                _ => {
                    samples.extend(initial..=final_);
                    last_end = Some(final_);
                }
            }
        }

        Ok(consecutive_runs(&sorted_unique(samples)))
    }

    /// Sit-to-stand when the trunk was quiet before and moves after; the
    /// reverse for stand-to-sit. `None` when neither holds.
    pub fn classify(&self, start: usize, end: usize, vertical_velocity: &[f64], vertical_acc: &[f64]) -> Option<TransferKind> {
        let n = vertical_velocity.len().min(vertical_acc.len());
        let (before, after) = (0..start.min(n), end.min(n)..n);
        let v_before = nanstd(&vertical_velocity[before.clone()]);
        let v_after = nanstd(&vertical_velocity[after.clone()]);

        if v_before < v_after && nanstd(&vertical_acc[before]) < self.config.quiet_acc_std {
            Some(TransferKind::SitToStand)
        } else if v_before > v_after && nanstd(&vertical_acc[after]) < self.config.quiet_acc_std {
            Some(TransferKind::StandToSit)
        } else {
            None
        }
    }
}

/// Drift-corrected trunk tilt (rad) from the pitch rate (rad/s).
pub fn tilt(pitch_rate: &[f64], sample_rate: f64) -> Vec<f64> {
    remove_linear_drift(&cumulative_integral(pitch_rate, sample_rate))
}

/// Lumbar vertical velocity with zero-velocity updates at the first and last sample.
pub fn lumbar_vertical_velocity(lumbar: &ImuSensorData, sample_rate: f64) -> Result<Vec<f64>> {
    let n = lumbar.acc_earth.len();
    if n == 0 {
        return Err(GaitError::EmptyInput("lumbar acceleration".into()));
    }
    let stationary = indices_to_mask(&[0, n - 1], n);
    let velocity = integrate_velocity(&lumbar.acc_earth, &stationary, sample_rate, DriftCorrection::Pchip)?;
    Ok(ImuSensorData::axis(&velocity, 2))
}

/// Largest pitch excursion (deg, 0.1° resolution) of a transfer relative to
/// the mean orientation of a `baseline`-sample quiet window.
///
/// Sit-to-stand uses the window before the transfer (or its first samples
/// when the transfer starts too early); stand-to-sit uses the window after
/// it (or its last samples).
pub fn lean_angle(orientation: &[Quaternion], start: usize, end: usize, kind: TransferKind, baseline: usize) -> Result<f64> {
    let n = orientation.len();
    let (window, reference, baseline_first) = match kind {
        TransferKind::SitToStand if start > baseline => (start - baseline..end, start - baseline..start, true),
        TransferKind::SitToStand => (start..end, start..start + baseline, true),
        TransferKind::StandToSit if end + baseline < n => (start..end + baseline, end..end + baseline, false),
        TransferKind::StandToSit => (start..end, end.saturating_sub(baseline)..end, false),
    };
    let clip = |r: std::ops::Range<usize>| r.start.min(n)..r.end.min(n);
    let (window, reference) = (clip(window), clip(reference));

    let mean = Quaternion::average(&orientation[reference])?.conjugate();
    let pitch: Vec<f64> = orientation[window]
        .iter()
        .map(|q| mean.multiply(q).euler_degrees()[1])
        .collect();
    if pitch.is_empty() {
        return Err(GaitError::EmptyInput("transfer orientation window".into()));
    }

    let quiet = baseline.clamp(1, pitch.len());
    let quiet_mean = if baseline_first {
        nanmean(&pitch[..quiet])
    } else {
        nanmean(&pitch[pitch.len() - quiet..])
    };
    let (min, max) = pitch
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &p| (lo.min(p), hi.max(p)));

    Ok(round_to((min - quiet_mean).abs().max((max - quiet_mean).abs()), 1))
}

/// Transfer summary of a trial.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferParameters {
    pub transfers: Vec<Transfer>,
}

impl TransferParameters {
    pub fn new(transfers: Vec<Transfer>) -> Self {
        if transfers.is_empty() {
            warn!("Processed as a transfer trial but no transfers were detected");
        }
        Self { transfers }
    }

    /// Mean lean angle of one transfer direction (deg); NaN when none occurred.
    pub fn mean_lean(&self, kind: TransferKind) -> f64 {
        let leans: Vec<f64> = self
            .transfers
            .iter()
            .filter(|t| t.kind == kind)
            .map(|t| t.lean_angle_deg)
            .collect();
        round_to(nanmean(&leans), 1)
    }

    /// No sit-to-stand transfer found in a trial expected to contain one.
    pub fn trial_type_mismatch(&self) -> bool {
        self.transfers.is_empty()
    }

    pub fn record(&self, summary: &mut TrialSummary) {
        summary.set_scalar("Number of transfers (#)", self.transfers.len() as f64);
        summary.set_scalar("Lean angle sit-to-stand (deg)", self.mean_lean(TransferKind::SitToStand));
        summary.set_scalar("Lean angle stand-to-sit (deg)", self.mean_lean(TransferKind::StandToSit));
    }
}

// ===== PRIVATE HELPERS =====

/// Indices `i` in `(from, to]` where the sign of `x` changes between `i - 1`
/// and `i` and `x` rises from `i` to `i + 1`.
fn rising_crossings(x: &[f64], from: usize, to: usize) -> Vec<usize> {
    let sign = |v: f64| (v > 0.0) as i8 - (v < 0.0) as i8;
    (from + 1..=to.min(x.len().saturating_sub(2)))
        .filter(|&i| sign(x[i]) != sign(x[i - 1]) && x[i + 1] > x[i])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const FS: f64 = 100.0;
    const LEN: usize = 1000;

    /// Pitch rate of one lean: forward half-sine over `[start, start+100)`,
    /// backward half-sine over the next 100 samples (rad/s).
    fn lean_rate(start: usize, amplitude: f64) -> Vec<f64> {
        (0..LEN)
            .map(|i| {
                if (start..start + 100).contains(&i) {
                    amplitude * ((i - start) as f64 / 100.0 * PI).sin()
                } else if (start + 100..start + 200).contains(&i) {
                    -amplitude * ((i - start - 100) as f64 / 100.0 * PI).sin()
                } else {
                    0.0
                }
            })
            .collect()
    }

    fn pitch_orientation(rate: &[f64]) -> Vec<Quaternion> {
        cumulative_integral(rate, FS)
            .into_iter()
            .map(|theta| Quaternion::from_axis_angle([0.0, 1.0, 0.0], theta))
            .collect()
    }

    fn quiet_then_walking(from: usize) -> Vec<[f64; 3]> {
        (0..LEN)
            .map(|i| {
                let z = if i >= from {
                    0.5 * (2.0 * PI * (i - from) as f64 / FS).cos()
                } else {
                    0.0
                };
                [0.0, 0.0, z]
            })
            .collect()
    }

    fn sensor(gyro: Vec<[f64; 3]>, acc_earth: Vec<[f64; 3]>, orientation: Vec<Quaternion>) -> ImuSensorData {
        ImuSensorData {
            acc: acc_earth.clone(),
            acc_earth,
            gyro_earth: gyro.clone(),
            gyro,
            mag: Vec::new(),
            orientation,
        }
    }

    #[test]
    fn test_tilt_returns_to_zero_after_lean() {
        let t = tilt(&lean_rate(300, 1.0), FS);
        assert!(t[400] > 0.6, "Tilt at peak {}", t[400]);
        assert!(t[600].abs() < 1e-2);
    }

    #[test]
    fn test_segment_brackets_lean() {
        let segments = TransferDetector::default().segments(&lean_rate(300, 1.0), FS).unwrap();
        assert_eq!(segments.len(), 1, "Segments: {:?}", segments);
        let (start, end) = segments[0];
        assert!((250..=320).contains(&start), "Start {} should precede the lean", start);
        assert!((480..=560).contains(&end), "End {} should follow the lean", end);
    }

    #[test]
    fn test_negative_mounting_detected() {
        let rate: Vec<f64> = lean_rate(300, 1.0).into_iter().map(|v| -v).collect();
        let segments = TransferDetector::default().segments(&rate, FS).unwrap();
        assert_eq!(segments.len(), 1, "Segments: {:?}", segments);
    }

    #[test]
    fn test_no_lean_no_segments() {
        let segments = TransferDetector::default().segments(&vec![0.0; LEN], FS).unwrap();
        assert!(segments.is_empty());
    }

    #[test]
    fn test_classify_directions() {
        let detector = TransferDetector::default();
        let quiet_first: Vec<f64> = (0..LEN).map(|i| if i > 500 { (i as f64 * 0.3).sin() } else { 0.0 }).collect();
        let zeros = vec![0.0; LEN];
        assert_eq!(
            detector.classify(300, 500, &quiet_first, &zeros),
            Some(TransferKind::SitToStand)
        );

        let quiet_last: Vec<f64> = quiet_first.iter().rev().copied().collect();
        assert_eq!(
            detector.classify(499, 699, &quiet_last, &zeros),
            Some(TransferKind::StandToSit)
        );
        assert_eq!(detector.classify(300, 500, &zeros, &zeros), None);
    }

    #[test]
    fn test_lean_angle_sit_to_stand() {
        let orientation: Vec<Quaternion> = (0..100)
            .map(|i| {
                let deg = if (40..60).contains(&i) { 30.0 } else { 0.0 };
                Quaternion::from_axis_angle([0.0, 1.0, 0.0], f64::to_radians(deg))
            })
            .collect();
        let lean = lean_angle(&orientation, 30, 70, TransferKind::SitToStand, 20).unwrap();
        assert!((lean - 30.0).abs() < 1e-9, "Lean {}", lean);

        let lean = lean_angle(&orientation, 30, 70, TransferKind::StandToSit, 20).unwrap();
        assert!((lean - 30.0).abs() < 1e-9, "Lean {}", lean);
    }

    #[test]
    fn test_lean_angle_early_transfer_uses_own_start() {
        let orientation: Vec<Quaternion> = (0..100)
            .map(|i| Quaternion::from_axis_angle([0.0, 1.0, 0.0], (i as f64 * 0.5).to_radians()))
            .collect();
        let lean = lean_angle(&orientation, 5, 45, TransferKind::SitToStand, 20).unwrap();
        assert!(lean > 10.0 && lean < 20.0, "Lean {}", lean);
    }

    #[test]
    fn test_detect_sit_to_stand() {
        let rate = lean_rate(300, 1.0);
        let gyro: Vec<[f64; 3]> = rate.iter().map(|&r| [0.0, r, 0.0]).collect();
        let orientation = pitch_orientation(&rate);
        let trunk = sensor(gyro, quiet_then_walking(500), orientation);
        let recording = ImuRecording::new(FS, crate::types::TrialKind::SitToStand)
            .with_sensor(SensorLocation::Lumbar, trunk);

        let transfers = TransferDetector::default().detect(&recording).unwrap();
        assert_eq!(transfers.len(), 1, "Transfers: {:?}", transfers);
        assert_eq!(transfers[0].kind, TransferKind::SitToStand);
        let peak_deg = (2.0 / PI).to_degrees();
        assert!(
            (transfers[0].lean_angle_deg - peak_deg).abs() < 1.0,
            "Lean {} should be close to {}",
            transfers[0].lean_angle_deg,
            peak_deg
        );

        let params = TransferParameters::new(transfers);
        assert!(!params.trial_type_mismatch());
        let mut summary = TrialSummary::new();
        params.record(&mut summary);
        assert!(summary.scalar("Lean angle stand-to-sit (deg)").is_some_and(f64::is_nan));
    }

    #[test]
    fn test_detect_requires_lumbar() {
        let trunk = sensor(vec![[0.0; 3]; 10], vec![[0.0; 3]; 10], vec![Quaternion::identity(); 10]);
        let recording = ImuRecording::new(FS, crate::types::TrialKind::LTest).with_sensor(SensorLocation::Sternum, trunk);
        assert_eq!(
            TransferDetector::default().detect(&recording).unwrap_err(),
            GaitError::MissingSensor(SensorLocation::Lumbar)
        );
    }
}
