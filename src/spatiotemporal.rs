//! Temporal gait parameters from detected events.
//!
//! - Walking / non-active sample masks and walking time
//! - Step count and cadence
//! - Swing, stance, stride, step and double-support time per foot
//! - Percentages of the gait cycle and single-limb support
//! - Left/right asymmetry ratios
//! - Sample-rate sanity check
//!
//! Durations are medians over all events of a foot; every quantity is NaN
//! when its event sequences are too short.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::stats::{
    diff_indices, first_after, last_before, mask_indices, median_duration, round_to, sorted_unique,
};
use crate::types::{FootEvents, GaitEvents, Side, TrialSummary};

/// Configuration for the temporal parameter engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatiotemporalConfig {
    /// Consecutive Terminal Contacts further apart than this end a walking bout (s).
    pub walking_gap_s: f64,
    /// Gait speed below which the sample rate is suspect (km/h).
    pub implausible_speed_kmh: f64,
    /// Double-support percentage above which the sample rate is suspect.
    pub implausible_double_support_pct: f64,
}

impl Default for SpatiotemporalConfig {
    fn default() -> Self {
        Self {
            walking_gap_s: 5.0,
            implausible_speed_kmh: 1.0,
            implausible_double_support_pct: 30.0,
        }
    }
}

/// Mask of walking samples.
///
/// Length equals the last Initial Contact over both feet. Every pair of
/// consecutive Terminal Contacts (feet merged) closer than the walking gap
/// marks `[TC_i, TC_{i+1})`, and the bout is extended up to the first
/// Initial Contact after the last marked sample.
pub fn walking_mask(events: &GaitEvents, sample_rate: f64, walking_gap_s: f64) -> Vec<bool> {
    let all_tc = merged(&events.left.terminal_contact, &events.right.terminal_contact);
    let all_ic = merged(&events.left.initial_contact, &events.right.initial_contact);
    let Some(&len) = all_ic.last() else {
        return Vec::new();
    };

    let max_gap = walking_gap_s * sample_rate;
    let mut mask = vec![false; len];
    let mut last_marked: Option<usize> = None;

    for pair in all_tc.windows(2) {
        let (start, stop) = (pair[0], pair[1]);
        if ((stop - start) as f64) >= max_gap {
            continue;
        }
        mark(&mut mask, start, stop);
        if stop > start {
            last_marked = Some(last_marked.map_or(stop - 1, |m| m.max(stop - 1)));
        }
        if let Some(last) = last_marked.filter(|&l| l < len) {
            let end = first_after(&all_ic, last).unwrap_or(len);
            mark(&mut mask, last, end);
            last_marked = Some(last.max(end.saturating_sub(1)));
        }
    }
    mask
}

/// Indices of the samples outside the walking mask, over `len` samples.
pub fn non_active_samples(walking: &[bool], len: usize) -> Vec<usize> {
    (0..len)
        .filter(|&i| !walking.get(i).copied().unwrap_or(false))
        .collect()
}

/// Total number of Terminal Contacts over both feet.
pub fn step_count(events: &GaitEvents) -> usize {
    events.left.terminal_contact.len() + events.right.terminal_contact.len()
}

/// Steps per minute of walking; NaN without walking samples.
pub fn cadence(steps: usize, walking_samples: usize, sample_rate: f64) -> f64 {
    if walking_samples == 0 {
        return f64::NAN;
    }
    let minutes = walking_samples as f64 / sample_rate / 60.0;
    steps as f64 / minutes
}

/// `left / (left + right)`: 0.5 is symmetric, above 0.5 left is larger.
pub fn asymmetry(left: f64, right: f64) -> f64 {
    left / (left + right)
}

/// For each `to` event, the distance back to the last `from` event before it.
pub fn durations_since_last(from: &[usize], to: &[usize]) -> Vec<usize> {
    to.iter()
        .filter_map(|&t| last_before(from, t).map(|f| t - f))
        .collect()
}

/// For each `from` event, the distance forward to the first `to` event after it.
pub fn durations_until_next(from: &[usize], to: &[usize]) -> Vec<usize> {
    from.iter()
        .filter_map(|&f| first_after(to, f).map(|t| t - f))
        .collect()
}

/// Temporal parameters of one foot (seconds and percent of the stride).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SideTemporal {
    pub swing_time_s: f64,
    pub stance_time_s: f64,
    pub stride_time_s: f64,
    pub step_time_s: f64,
    pub double_support_s: f64,
    pub single_support_s: f64,
    pub swing_pct: f64,
    pub stance_pct: f64,
    pub double_support_pct: f64,
    pub single_support_pct: f64,
}

impl Default for SideTemporal {
    fn default() -> Self {
        Self {
            swing_time_s: f64::NAN,
            stance_time_s: f64::NAN,
            stride_time_s: f64::NAN,
            step_time_s: f64::NAN,
            double_support_s: f64::NAN,
            single_support_s: f64::NAN,
            swing_pct: f64::NAN,
            stance_pct: f64::NAN,
            double_support_pct: f64::NAN,
            single_support_pct: f64::NAN,
        }
    }
}

/// Temporal parameters of a trial.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TemporalParameters {
    pub left: SideTemporal,
    pub right: SideTemporal,
    pub swing_asymmetry: f64,
    pub stance_asymmetry: f64,
    pub step_asymmetry: f64,
    pub stride_asymmetry: f64,
}

impl TemporalParameters {
    /// Compute all temporal parameters from both feet's events.
    pub fn compute(events: &GaitEvents, sample_rate: f64) -> Self {
        let mut left = own_foot(&events.left, sample_rate);
        let mut right = own_foot(&events.right, sample_rate);

        for side in Side::BOTH {
            let own = events.foot(side);
            let other = events.foot(side.opposite());
            let target = match side {
                Side::Left => &mut left,
                Side::Right => &mut right,
            };
            target.step_time_s = seconds(
                &durations_since_last(&other.initial_contact, &own.initial_contact),
                sample_rate,
            );
            target.double_support_s = seconds(
                &durations_until_next(&own.initial_contact, &other.terminal_contact),
                sample_rate,
            );
            target.double_support_pct = round_to(target.double_support_s / target.stride_time_s * 100.0, 1);
        }

        // Single-limb support of one foot is the other foot's swing.
        left.single_support_s = right.swing_time_s;
        right.single_support_s = left.swing_time_s;
        left.single_support_pct = round_to(left.single_support_s / left.stride_time_s * 100.0, 1);
        right.single_support_pct = round_to(right.single_support_s / right.stride_time_s * 100.0, 1);

        Self {
            swing_asymmetry: round_to(asymmetry(left.swing_time_s, right.swing_time_s), 2),
            stance_asymmetry: round_to(asymmetry(left.stance_time_s, right.stance_time_s), 2),
            step_asymmetry: round_to(asymmetry(left.step_time_s, right.step_time_s), 2),
            stride_asymmetry: round_to(asymmetry(left.stride_time_s, right.stride_time_s), 2),
            left,
            right,
        }
    }

    pub fn side(&self, side: Side) -> &SideTemporal {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    /// Write the parameters under their report names.
    pub fn record(&self, summary: &mut TrialSummary) {
        for side in Side::BOTH {
            let s = self.side(side);
            let l = side.label();
            summary.set_scalar(format!("Swing time {l} (s)"), s.swing_time_s);
            summary.set_scalar(format!("Stance time {l} (s)"), s.stance_time_s);
            summary.set_scalar(format!("Stride time {l} (s)"), s.stride_time_s);
            summary.set_scalar(format!("Step time {l} (s)"), s.step_time_s);
            summary.set_scalar(format!("Double support time {l} (s)"), s.double_support_s);
            summary.set_scalar(format!("Single-limb support time {l} (s)"), s.single_support_s);
            summary.set_scalar(format!("Swing time as percentage of gaitcycle {l} (%)"), s.swing_pct);
            summary.set_scalar(format!("Stance time as percentage of gaitcycle {l} (%)"), s.stance_pct);
            summary.set_scalar(
                format!("Double support time as percentage of gaitcycle {l} (%)"),
                s.double_support_pct,
            );
            summary.set_scalar(
                format!("Single-limb support time as percentage of gaitcycle {l} (%)"),
                s.single_support_pct,
            );
        }
        summary.set_scalar("Swing time asymmetry", self.swing_asymmetry);
        summary.set_scalar("Stance time asymmetry", self.stance_asymmetry);
        summary.set_scalar("Step time asymmetry", self.step_asymmetry);
        summary.set_scalar("Stride time asymmetry", self.stride_asymmetry);
    }
}

/// Walking-bout summary of a trial.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WalkingActivity {
    pub walking: Vec<bool>,
    pub non_active: Vec<usize>,
    pub walking_time_s: f64,
    pub non_active_time_s: f64,
    pub steps: usize,
    pub cadence: f64,
}

impl WalkingActivity {
    /// `len` is the shorter of the two foot recordings.
    pub fn compute(events: &GaitEvents, len: usize, sample_rate: f64, config: &SpatiotemporalConfig) -> Self {
        let walking = walking_mask(events, sample_rate, config.walking_gap_s);
        let walking_samples = walking.iter().filter(|w| **w).count();
        let non_active = non_active_samples(&walking, len);
        let steps = step_count(events);

        Self {
            walking_time_s: round_to(walking_samples as f64 / sample_rate, 2),
            non_active_time_s: round_to(non_active.len() as f64 / sample_rate, 2),
            cadence: round_to(cadence(steps, walking_samples, sample_rate), 2),
            steps,
            walking,
            non_active,
        }
    }

    pub fn walking_samples(&self) -> Vec<usize> {
        mask_indices(&self.walking)
    }

    pub fn record(&self, summary: &mut TrialSummary) {
        summary.set_scalar("Walking time (s)", self.walking_time_s);
        summary.set_scalar("Non-Active time (s)", self.non_active_time_s);
        summary.set_scalar("Number of steps (#)", self.steps as f64);
        summary.set_scalar("Cadence (steps/minute)", self.cadence);
    }
}

/// Very slow walking with a very high double-support fraction on both feet
/// points at a misconfigured sample rate.
pub fn implausible_sample_rate(
    gait_speed_kmh: f64,
    temporal: &TemporalParameters,
    config: &SpatiotemporalConfig,
) -> bool {
    let suspect = gait_speed_kmh < config.implausible_speed_kmh
        && temporal.left.double_support_pct > config.implausible_double_support_pct
        && temporal.right.double_support_pct > config.implausible_double_support_pct;
    if suspect {
        warn!(gait_speed_kmh, "implausible sample rate; check the recording settings");
    }
    suspect
}

// ===== PRIVATE HELPERS =====

fn own_foot(foot: &FootEvents, sample_rate: f64) -> SideTemporal {
    let swing = seconds(
        &durations_since_last(&foot.terminal_contact, &foot.initial_contact),
        sample_rate,
    );
    let stance = seconds(
        &durations_since_last(&foot.initial_contact, &foot.terminal_contact),
        sample_rate,
    );
    let stride = seconds(&diff_indices(&foot.initial_contact), sample_rate);

    SideTemporal {
        swing_time_s: swing,
        stance_time_s: stance,
        stride_time_s: stride,
        swing_pct: round_to(swing / stride * 100.0, 2),
        stance_pct: round_to(stance / stride * 100.0, 2),
        ..Default::default()
    }
}

/// Median duration in seconds, rounded to 0.01 s; NaN when empty.
fn seconds(durations: &[usize], sample_rate: f64) -> f64 {
    round_to(median_duration(durations, sample_rate), 2)
}

fn merged(a: &[usize], b: &[usize]) -> Vec<usize> {
    sorted_unique(a.iter().chain(b).copied().collect())
}

fn mark(mask: &mut [bool], start: usize, end: usize) {
    let end = end.min(mask.len());
    if start < end {
        mask[start..end].iter_mut().for_each(|m| *m = true);
    }
}
