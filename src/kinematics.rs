//! Trunk range of motion and foot angles.
//!
//! Both measures read Euler angles from the per-sample orientation. Trunk
//! range of motion is restricted to steady-state walking: turns, the steps
//! leading into and out of each turn, and the start and end of the trial
//! are excluded.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::filtering::FilterSpec;
use crate::phases::{FootPhases, GaitPhase};
use crate::stats::{first_after, last_before, nanmean, round_to, sorted_unique};
use crate::trajectory::SteadyStrides;
use crate::types::{FootEvents, GaitEvents, Side, TrialSummary, TurnSegment, Vec3};

/// Configuration for the kinematic measures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KinematicsConfig {
    /// Low-pass applied to the trunk Euler angles.
    pub angle_filter: FilterSpec,
    /// Sample-to-sample angle jumps beyond this are wrap-arounds (deg).
    pub gimbal_jump_deg: f64,
    /// A stride spanning this many samples per second of stride time is rejected.
    pub max_stride_factor: f64,
    /// Per-stride ranges at or above this are rejected (deg).
    pub max_rom_deg: f64,
}

impl Default for KinematicsConfig {
    fn default() -> Self {
        Self {
            angle_filter: FilterSpec::new(2, 5.0),
            gimbal_jump_deg: 300.0,
            max_stride_factor: 150.0,
            max_rom_deg: 180.0,
        }
    }
}

/// Steady-state walking mask over `len` samples.
///
/// Starts from every sample outside a turn and removes:
/// - the initiation after each turn (turn end up to the next steady Terminal Contact)
/// - the termination before each turn (last steady Initial Contact up to the turn start)
/// - the trial start up to the first steady Terminal Contact
/// - the trial end from the last steady Initial Contact
pub fn steady_state_mask(len: usize, turns: &[TurnSegment], steady: &SteadyStrides) -> Vec<bool> {
    let tc = sorted_unique(steady.left.iter().chain(&steady.right).map(|s| s.start).collect());
    let ic = sorted_unique(steady.left.iter().chain(&steady.right).map(|s| s.end).collect());

    let mut mask = vec![true; len];
    let mut clear = |from: usize, to: usize| {
        let (from, to) = (from.min(len), to.min(len));
        if from < to {
            mask[from..to].iter_mut().for_each(|m| *m = false);
        }
    };

    for turn in turns {
        clear(turn.start, turn.end + 1);
        if let Some(next_tc) = first_after(&tc, turn.end) {
            clear(turn.end, next_tc);
        }
        if let Some(prev_ic) = last_before(&ic, turn.start) {
            clear(prev_ic, turn.start);
        }
    }
    clear(0, tc.first().copied().unwrap_or(0));
    if let Some(&last_ic) = ic.last() {
        clear(last_ic, len);
    }
    mask
}

/// Remove wrap-around jumps: every later sample is shifted by 360° against
/// each jump larger than `threshold`.
pub fn correct_gimbal_jumps(angles: &mut [f64], threshold: f64) {
    let mut offset = 0.0;
    let mut prev = match angles.first() {
        Some(&v) => v,
        None => return,
    };
    for a in angles.iter_mut().skip(1) {
        let raw = *a;
        let jump = raw - prev;
        if jump > threshold {
            offset -= 360.0;
        } else if jump < -threshold {
            offset += 360.0;
        }
        prev = raw;
        *a = raw + offset;
    }
}

/// Trunk range of motion per steady-state stride.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrunkRangeOfMotion {
    /// Roll range per stride (deg).
    pub per_stride_x: Vec<f64>,
    /// Yaw range per stride (deg).
    pub per_stride_z: Vec<f64>,
    pub transverse_deg: f64,
    pub coronal_deg: f64,
}

impl TrunkRangeOfMotion {
    /// Ranges of the trunk roll (X) and yaw (Z) between consecutive
    /// steady-state Initial Contacts of both feet.
    pub fn compute(
        euler: &[Vec3],
        steady_mask: &[bool],
        steady: &SteadyStrides,
        stride_time_s: f64,
        sample_rate: f64,
        config: &KinematicsConfig,
    ) -> Result<Self> {
        let filter = config.angle_filter.design(sample_rate)?;
        let mut roll: Vec<f64> = euler.iter().map(|e| e[0]).collect();
        let mut yaw: Vec<f64> = euler.iter().map(|e| e[2]).collect();
        correct_gimbal_jumps(&mut roll, config.gimbal_jump_deg);
        correct_gimbal_jumps(&mut yaw, config.gimbal_jump_deg);
        let roll = filter.filtfilt(&roll)?;
        let yaw = filter.filtfilt(&yaw)?;

        let ic = sorted_unique(steady.left.iter().chain(&steady.right).map(|s| s.end).collect());
        let max_span = config.max_stride_factor * stride_time_s;
        let valid = |r: f64| r > 0.0 && r < config.max_rom_deg;

        let mut params = Self::default();
        for w in ic.windows(2) {
            let (from, to) = (w[0], w[1].min(roll.len()));
            if from >= to || !(((to - from) as f64) < max_span) {
                continue;
            }
            if !steady_mask.get(from..to).is_some_and(|m| m.iter().all(|&s| s)) {
                continue;
            }
            let x = range(&roll[from..to]);
            let z = range(&yaw[from..to]);
            if valid(x) {
                params.per_stride_x.push(x);
            }
            if valid(z) {
                params.per_stride_z.push(z);
            }
        }

        params.transverse_deg = round_to(nanmean(&params.per_stride_x), 1);
        params.coronal_deg = round_to(nanmean(&params.per_stride_z), 1);
        debug!(strides = params.per_stride_x.len(), "Trunk range of motion computed");
        Ok(params)
    }

    pub fn record(&self, summary: &mut TrialSummary) {
        summary.set_scalar("Trunk transverse range of motion (deg)", self.transverse_deg);
        summary.set_scalar("Trunk coronal range of motion (deg)", self.coronal_deg);
    }
}

/// Foot pitch at contact relative to flat foot, per event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FootAngles {
    /// Pitch at each Initial Contact minus the pitch at the next mid-stance sample (deg).
    pub at_initial_contact: Vec<f64>,
    /// Pitch at each Terminal Contact minus the pitch at the previous mid-stance sample (deg).
    pub at_terminal_contact: Vec<f64>,
}

impl FootAngles {
    pub fn compute(pitch: &[f64], events: &FootEvents, mid_stance: &[usize]) -> Self {
        let angle = |event: usize, reference: Option<usize>| -> Option<f64> {
            let (e, r) = (pitch.get(event)?, pitch.get(reference?)?);
            Some(round_to(e - r, 1))
        };
        let at_initial_contact = events
            .initial_contact
            .iter()
            .filter_map(|&ic| {
                let reference = first_after(mid_stance, ic).or_else(|| last_before(mid_stance, ic));
                angle(ic, reference)
            })
            .collect();
        let at_terminal_contact = events
            .terminal_contact
            .iter()
            .filter_map(|&tc| {
                let reference = last_before(mid_stance, tc).or_else(|| first_after(mid_stance, tc));
                angle(tc, reference)
            })
            .collect();
        Self {
            at_initial_contact,
            at_terminal_contact,
        }
    }
}

/// Foot angles of both feet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FootAngleParameters {
    pub left: FootAngles,
    pub right: FootAngles,
}

impl FootAngleParameters {
    /// `pitch` holds the Euler pitch (deg) of the left and right foot sensors.
    pub fn compute(pitch: [&[f64]; 2], events: &GaitEvents, phases: [&FootPhases; 2]) -> Self {
        let foot = |i: usize, side: Side| {
            FootAngles::compute(pitch[i], events.foot(side), &phases[i].indices(GaitPhase::MidStance))
        };
        Self {
            left: foot(0, Side::Left),
            right: foot(1, Side::Right),
        }
    }

    pub fn record(&self, summary: &mut TrialSummary) {
        for (side, angles) in [(Side::Left, &self.left), (Side::Right, &self.right)] {
            let l = side.label();
            summary.set_scalar(
                format!("Foot angle at IC {l}"),
                round_to(nanmean(&angles.at_initial_contact), 1),
            );
            summary.set_scalar(
                format!("Foot angle at TC {l}"),
                round_to(nanmean(&angles.at_terminal_contact), 1),
            );
        }
    }
}

fn range(values: &[f64]) -> f64 {
    let (lo, hi) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    hi - lo
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::mask_indices;
    use crate::types::StrideRecord;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    const FS: f64 = 100.0;

    fn steady(ends: &[usize]) -> SteadyStrides {
        SteadyStrides {
            left: ends.iter().map(|&e| StrideRecord::new(e - 40, e, 1.0)).collect(),
            right: Vec::new(),
        }
    }

    #[test]
    fn test_gimbal_jump_correction() {
        let mut a = vec![170.0, 178.0, -174.0, -166.0, 175.0];
        correct_gimbal_jumps(&mut a, 300.0);
        assert_eq!(a, vec![170.0, 178.0, 186.0, 194.0, 175.0]);
    }

    #[test]
    fn test_steady_state_mask_excludes_turn_neighbourhood() {
        let strides = steady(&[200, 300, 600, 700]);
        let turns = [TurnSegment { start: 400, end: 450, peak_deg_s: 90.0 }];
        let mask = steady_state_mask(800, &turns, &strides);

        assert!(!mask[100], "Before the first steady Terminal Contact");
        assert!(mask[160] && mask[299]);
        assert!(!mask[300], "Termination from the last Initial Contact before the turn");
        assert!(!mask[420], "Inside the turn");
        assert!(!mask[500], "Initiation up to the next steady Terminal Contact");
        assert!(mask[560] && mask[699]);
        assert!(!mask[700], "Trial end from the last steady Initial Contact");
    }

    #[test]
    fn test_steady_state_mask_without_strides_is_turn_complement() {
        let turns = [TurnSegment { start: 10, end: 19, peak_deg_s: 90.0 }];
        let mask = steady_state_mask(30, &turns, &SteadyStrides::default());
        assert_eq!(mask_indices(&mask).len(), 20);
    }

    #[test]
    fn test_trunk_rom_of_sinusoidal_sway() {
        let len = 1000;
        let euler: Vec<Vec3> = (0..len)
            .map(|i| {
                let phase = 2.0 * PI * i as f64 / FS;
                [5.0 * phase.sin(), 0.0, 3.0 * phase.sin()]
            })
            .collect();
        let ends: Vec<usize> = (1..9).map(|k| k * 100).collect();
        let strides = steady(&ends);
        let mask = steady_state_mask(len, &[], &strides);
        let rom = TrunkRangeOfMotion::compute(&euler, &mask, &strides, 1.0, FS, &KinematicsConfig::default()).unwrap();

        assert_eq!(rom.per_stride_x.len(), 7);
        assert_abs_diff_eq!(rom.transverse_deg, 10.0, epsilon = 0.15);
        assert_abs_diff_eq!(rom.coronal_deg, 6.0, epsilon = 0.15);
    }

    #[test]
    fn test_trunk_rom_nan_without_stride_time() {
        let euler = vec![[0.0; 3]; 300];
        let strides = steady(&[100, 200]);
        let mask = vec![true; 300];
        let rom = TrunkRangeOfMotion::compute(&euler, &mask, &strides, f64::NAN, FS, &KinematicsConfig::default()).unwrap();
        assert!(rom.transverse_deg.is_nan());
    }

    #[test]
    fn test_foot_angles() {
        let pitch: Vec<f64> = (0..100).map(|i| i as f64 * 0.5).collect();
        let events = FootEvents::from_contacts(vec![10, 90], vec![60]);
        let mid_stance: Vec<usize> = (30..40).collect();
        let angles = FootAngles::compute(&pitch, &events, &mid_stance);

        // IC 10 -> first mid-stance 30; IC 90 -> none after, last before is 39.
        assert_eq!(angles.at_initial_contact, vec![-10.0, 25.5]);
        // TC 60 -> last mid-stance before is 39.
        assert_eq!(angles.at_terminal_contact, vec![10.5]);
    }

    #[test]
    fn test_foot_angles_without_mid_stance() {
        let events = FootEvents::from_contacts(vec![10], vec![20]);
        let angles = FootAngles::compute(&[0.0; 30], &events, &[]);
        assert!(angles.at_initial_contact.is_empty());

        let params = FootAngleParameters {
            left: angles,
            right: FootAngles::default(),
        };
        let mut summary = TrialSummary::new();
        params.record(&mut summary);
        assert!(summary.scalar("Foot angle at IC left").is_some_and(f64::is_nan));
    }
}
