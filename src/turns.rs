//! Turn identification and turn parameters.
//!
//! Turns are found on the vertical (earth-frame Z) angular velocity of the
//! trunk sensor:
//! - Only trials with at least one moment above the activation rate contain turns
//! - Candidate peaks of |ω| above a fraction of the maximum seed a turn
//! - A turn extends from the last sub-boundary sample before its peak to the
//!   first sub-boundary sample after it
//! - Turns separated by less than the merge gap with the same rotation
//!   direction combine into one
//!
//! A turn is accepted only when it lasts longer than one step and shorter
//! than the maximum duration.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::filtering::FilterSpec;
use crate::peaks::{find_peaks, PeakCriteria};
use crate::stats::{consecutive_runs, nanmean, nanstd, round_to, sorted_unique};
use crate::types::{ImuSensorData, TrialSummary, TurnSegment, Vec3};

/// Which straight strides around a turn are excluded from steady-state gait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SteadyStatePolicy {
    /// Drop the nearest stride before and after each turn.
    NoOneStep,
    /// Drop the nearest stride before and after each turn on both feet.
    NoTwoSteps,
}

impl SteadyStatePolicy {
    /// Number of strides trimmed at each end of the trial.
    pub const fn radius(self) -> usize {
        match self {
            SteadyStatePolicy::NoOneStep => 1,
            SteadyStatePolicy::NoTwoSteps => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SteadyStatePolicy::NoOneStep => "no 1 steps around turn",
            SteadyStatePolicy::NoTwoSteps => "no 2 steps around turn",
        }
    }
}

/// Configuration for turn identification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    /// Smoothing of the earth-frame trunk angular velocity.
    pub yaw_rate_filter: FilterSpec,
    /// Trials whose peak |ω| stays below this contain no turns (deg/s).
    pub activation_deg_s: f64,
    /// Peaks below this fraction of the trial maximum are ignored.
    pub peak_fraction: f64,
    /// |ω| below this marks the boundary of a turn (deg/s).
    pub boundary_deg_s: f64,
    /// Same-direction turns closer than this merge (s).
    pub merge_gap_s: f64,
    /// Turns lasting this long or longer are rejected (s).
    pub max_duration_s: f64,
    /// Heading change above which a turn counts as a 180° turn (deg).
    pub full_turn_deg: f64,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            yaw_rate_filter: FilterSpec::new(2, 1.5),
            activation_deg_s: 70.0,
            peak_fraction: 0.3,
            boundary_deg_s: 5.0,
            merge_gap_s: 0.1,
            max_duration_s: 10.0,
            full_turn_deg: 150.0,
        }
    }
}

/// Turn detector on trunk yaw rate.
#[derive(Debug, Clone, Default)]
pub struct TurnDetector {
    config: TurnConfig,
}

impl TurnDetector {
    pub fn new(config: TurnConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TurnConfig {
        &self.config
    }

    /// Identify turns from a trunk sensor: the earth-frame vertical angular
    /// velocity is smoothed and passed to [`TurnDetector::identify`].
    pub fn detect(&self, trunk: &ImuSensorData, sample_rate: f64, mean_step_time_s: f64) -> Result<Vec<TurnSegment>> {
        let yaw_rate = self
            .config
            .yaw_rate_filter
            .apply(&ImuSensorData::axis(&trunk.gyro_earth, 2), sample_rate)?;
        Ok(self.identify(&yaw_rate, sample_rate, mean_step_time_s))
    }

    /// Identify turns in the earth-frame vertical angular velocity (rad/s).
    ///
    /// `mean_step_time_s` is the minimum accepted turn duration; a NaN step
    /// time accepts no turn. Returned segments are disjoint, ascending and
    /// closed.
    pub fn identify(&self, yaw_rate: &[f64], sample_rate: f64, mean_step_time_s: f64) -> Vec<TurnSegment> {
        let magnitude: Vec<f64> = yaw_rate.iter().map(|v| v.abs()).collect();
        let max = magnitude.iter().copied().filter(|v| !v.is_nan()).fold(f64::NAN, f64::max);
        if !(max > self.config.activation_deg_s.to_radians()) {
            return Vec::new();
        }

        let threshold = self.config.peak_fraction * max;
        let peaks: Vec<usize> = find_peaks(&magnitude, &PeakCriteria::new())
            .into_iter()
            .filter(|&p| magnitude[p] > threshold)
            .collect();

        let boundary = self.config.boundary_deg_s.to_radians();
        let merge_gap = self.config.merge_gap_s * sample_rate;
        let n = magnitude.len();

        let mut samples: Vec<usize> = Vec::new();
        let mut last_end: Option<usize> = None;

        for (k, &peak) in peaks.iter().enumerate() {
            let initial = (0..peak)
                .rev()
                .find(|&i| magnitude[i] < boundary)
                .unwrap_or_else(|| peak.saturating_sub(1));
            let last = n.saturating_sub(1);
            let final_ = (peak..last).find(|&i| magnitude[i] < boundary).unwrap_or(last);

            match last_end {
                Some(end) if (initial as f64) < end as f64 + merge_gap => {
                    let same_direction = k > 0 && {
                        let (a, b) = (yaw_rate[peak], yaw_rate[peaks[k - 1]]);
                        (a < 0.0 && b < 0.0) || (a > 0.0 && b > 0.0)
                    };
                    if same_direction && final_ >= end {
                        samples.extend(end..=final_);
                        last_end = Some(final_);
                    }
                }
                _ => {
                    if self.accepts(initial, final_, sample_rate, mean_step_time_s) {
                        samples.extend(initial..=final_);
                        last_end = Some(final_);
                    }
                }
            }
        }

        let segments = segments_from_samples(&sorted_unique(samples), &magnitude);
        debug!(turns = segments.len(), "Turn identification complete");
        segments
    }

    // ===== PRIVATE METHODS =====

    fn accepts(&self, initial: usize, final_: usize, sample_rate: f64, mean_step_time_s: f64) -> bool {
        let duration = final_.saturating_sub(initial) as f64;
        duration < self.config.max_duration_s * sample_rate && duration > mean_step_time_s * sample_rate
    }
}

/// Closed segments from a sorted set of turn samples. The peak is the largest
/// `magnitude` (rad/s) inside each segment, reported in deg/s.
pub fn segments_from_samples(samples: &[usize], magnitude: &[f64]) -> Vec<TurnSegment> {
    consecutive_runs(samples)
        .into_iter()
        .map(|(start, end)| {
            let peak = magnitude
                .get(start..=end.min(magnitude.len().saturating_sub(1)))
                .unwrap_or(&[])
                .iter()
                .copied()
                .filter(|v| !v.is_nan())
                .fold(0.0, f64::max);
            TurnSegment {
                start,
                end,
                peak_deg_s: peak.to_degrees(),
            }
        })
        .collect()
}

/// All sample indices covered by the segments, ascending.
pub fn turn_samples(turns: &[TurnSegment]) -> Vec<usize> {
    sorted_unique(turns.iter().flat_map(|t| t.start..=t.end).collect())
}

/// Whether `idx` lies inside any turn.
pub fn in_turn(turns: &[TurnSegment], idx: usize) -> bool {
    turns.iter().any(|t| t.contains(idx))
}

/// Peak angular velocity statistics over identified turns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnParameters {
    /// Peak angular velocity of every turn (deg/s).
    pub peaks_deg_s: Vec<f64>,
    /// Peak angular velocity of the 180° turns (deg/s).
    pub full_turn_peaks_deg_s: Vec<f64>,
}

impl TurnParameters {
    /// Peaks use the sensor-frame gyroscope X axis (rad/s) over `[start, end)`
    /// of each turn; the heading change uses the unwrapped Euler yaw (deg).
    pub fn compute(turns: &[TurnSegment], gyro: &[Vec3], euler_deg: &[Vec3], config: &TurnConfig) -> Self {
        let yaw = unwrap_degrees(&euler_deg.iter().map(|e| e[2]).collect::<Vec<_>>());
        let mut params = Self::default();

        for turn in turns {
            if turn.start >= gyro.len() {
                continue;
            }
            let end = turn.end.clamp(turn.start + 1, gyro.len());
            let peak = gyro[turn.start..end]
                .iter()
                .map(|g| g[0].abs())
                .fold(0.0, f64::max)
                .to_degrees();
            params.peaks_deg_s.push(peak);

            if let (Some(a), Some(b)) = (yaw.get(turn.start), yaw.get(turn.end)) {
                if (a - b).abs() > config.full_turn_deg {
                    params.full_turn_peaks_deg_s.push(peak);
                }
            }
        }
        params
    }

    pub fn count(&self) -> usize {
        self.peaks_deg_s.len()
    }

    pub fn record(&self, summary: &mut TrialSummary) {
        summary.set_scalar("Number of turns (#)", self.count() as f64);
        summary.set_scalar(
            "Peak turn velocity - average all peaks (deg/s)",
            round_to(nanmean(&self.peaks_deg_s), 2),
        );
        summary.set_scalar(
            "Peak turn velocity - standard deviation all peaks (deg/s)",
            round_to(nanstd(&self.peaks_deg_s), 2),
        );
        summary.set_scalar(
            "Peak turn velocity - average 180 deg peaks (deg/s)",
            round_to(nanmean(&self.full_turn_peaks_deg_s), 2),
        );
        summary.set_scalar(
            "Peak turn velocity - standard deviation 180 deg peaks (deg/s)",
            round_to(nanstd(&self.full_turn_peaks_deg_s), 2),
        );
        summary.set_series("Peak turn velocity - all turns (deg/s)", self.peaks_deg_s.clone());
    }
}

/// Unwrap an angle series in degrees so successive samples never jump by more than 180°.
pub fn unwrap_degrees(values: &[f64]) -> Vec<f64> {
    let radians: Vec<f64> = values.iter().map(|v| v.to_radians()).collect();
    crate::stats::unwrap(&radians).into_iter().map(f64::to_degrees).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    const FS: f64 = 100.0;

    /// Yaw rate with a raised-cosine bump of `peak_deg_s` centred at each `centre`
    /// with half-width `half` samples.
    fn bumps(len: usize, bumps: &[(usize, usize, f64)]) -> Vec<f64> {
        let mut w = vec![0.0; len];
        for &(centre, half, peak_deg_s) in bumps {
            for i in centre - half..=centre + half {
                let phase = (i as f64 - centre as f64) / half as f64 * PI;
                w[i] += peak_deg_s.to_radians() * 0.5 * (1.0 + phase.cos());
            }
        }
        w
    }

    #[test]
    fn test_policy_radius() {
        assert_eq!(SteadyStatePolicy::NoOneStep.radius(), 1);
        assert_eq!(SteadyStatePolicy::NoTwoSteps.radius(), 2);
    }

    #[test]
    fn test_constant_slow_rotation_has_no_turns() {
        let w = vec![5f64.to_radians(); 2000];
        let turns = TurnDetector::default().identify(&w, FS, 0.5);
        assert!(turns.is_empty(), "Expected no turns, got {:?}", turns);
    }

    #[test]
    fn test_single_turn_identified() {
        let w = bumps(1000, &[(500, 100, 120.0)]);
        let turns = TurnDetector::default().identify(&w, FS, 0.5);
        assert_eq!(turns.len(), 1, "Turns: {:?}", turns);
        let t = turns[0];
        assert!(t.start < 500 && t.end > 500, "Turn {:?} should contain its peak", t);
        assert!(t.start >= 400 && t.end <= 600);
        assert_abs_diff_eq!(t.peak_deg_s, 120.0, epsilon = 1e-6);
    }

    #[test]
    fn test_short_turn_rejected_by_step_time() {
        let w = bumps(1000, &[(500, 20, 120.0)]);
        let turns = TurnDetector::default().identify(&w, FS, 0.5);
        assert!(turns.is_empty(), "A 0.4 s turn is shorter than one step: {:?}", turns);
    }

    #[test]
    fn test_nan_step_time_accepts_nothing() {
        let w = bumps(1000, &[(500, 100, 120.0)]);
        assert!(TurnDetector::default().identify(&w, FS, f64::NAN).is_empty());
    }

    #[test]
    fn test_separate_turns_kept_apart() {
        let w = bumps(2000, &[(500, 100, 120.0), (1400, 100, -120.0)]);
        let turns = TurnDetector::default().identify(&w, FS, 0.5);
        assert_eq!(turns.len(), 2, "Turns: {:?}", turns);
        assert!(turns[0].end < turns[1].start);
    }

    #[test]
    fn test_turn_samples_and_membership() {
        let turns = [
            TurnSegment { start: 3, end: 5, peak_deg_s: 0.0 },
            TurnSegment { start: 9, end: 10, peak_deg_s: 0.0 },
        ];
        assert_eq!(turn_samples(&turns), vec![3, 4, 5, 9, 10]);
        assert!(in_turn(&turns, 5));
        assert!(!in_turn(&turns, 6));
    }

    #[test]
    fn test_turn_parameters_full_turn() {
        let len = 400;
        let turns = [TurnSegment { start: 100, end: 300, peak_deg_s: 0.0 }];
        let gyro: Vec<Vec3> = (0..len)
            .map(|i| [if i == 200 { 2.0 } else { 0.5 }, 0.0, 0.0])
            .collect();
        // Yaw sweeps 180° inside the turn, wrapping at ±180.
        let euler: Vec<Vec3> = (0..len)
            .map(|i| {
                let progress = ((i as f64 - 100.0) / 200.0).clamp(0.0, 1.0);
                let yaw = 90.0 + 180.0 * progress;
                let wrapped = if yaw > 180.0 { yaw - 360.0 } else { yaw };
                [0.0, 0.0, wrapped]
            })
            .collect();

        let params = TurnParameters::compute(&turns, &gyro, &euler, &TurnConfig::default());
        assert_eq!(params.count(), 1);
        assert_abs_diff_eq!(params.peaks_deg_s[0], 2f64.to_degrees(), epsilon = 1e-9);
        assert_eq!(params.full_turn_peaks_deg_s.len(), 1, "A 180° heading change is a full turn");

        let mut summary = TrialSummary::new();
        params.record(&mut summary);
        assert_eq!(summary.scalar("Number of turns (#)"), Some(1.0));
        assert_eq!(
            summary.scalar("Peak turn velocity - standard deviation all peaks (deg/s)"),
            Some(0.0)
        );
    }

    #[test]
    fn test_no_turns_gives_nan_statistics() {
        let params = TurnParameters::compute(&[], &[], &[], &TurnConfig::default());
        let mut summary = TrialSummary::new();
        params.record(&mut summary);
        assert!(summary
            .scalar("Peak turn velocity - average all peaks (deg/s)")
            .is_some_and(f64::is_nan));
    }

    #[test]
    fn test_unwrap_degrees() {
        let out = unwrap_degrees(&[170.0, -170.0, -150.0]);
        assert_abs_diff_eq!(out[1], 190.0, epsilon = 1e-9);
        assert_abs_diff_eq!(out[2], 210.0, epsilon = 1e-9);
    }
}
