//! Foot trajectory reconstruction and spatial gait parameters.
//!
//! Implements per-foot dead reckoning from earth-frame acceleration:
//! - Stationary detection from mid-stance and non-active samples
//! - ZUPT (Zero Velocity Update) velocity with linear or PCHIP drift removal
//! - Position by integrating the drift-free velocity
//! - Stride length between consecutive Initial Contacts
//! - Straight / in-turn classification and steady-state selection
//! - Gait speed and walked distance
//!
//! Stride records carry `(Terminal Contact, Initial Contact, value)` so that
//! they can be compared stride by stride with other modalities.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{GaitError, Result};
use crate::pchip::Pchip;
use crate::spatiotemporal::asymmetry;
use crate::stats::{first_after, last_before, mask_indices, nanmean, nanmedian, round_to};
use crate::turns::{in_turn, SteadyStatePolicy};
use crate::types::{FootEvents, GaitEvents, Side, StrideRecord, TrialSummary, TurnSegment, Vec3};

/// Velocity drift removal method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriftCorrection {
    /// Zero on stationary samples and remove a linear ramp from each moving run.
    Linear,
    /// Subtract a PCHIP curve fitted through the stationary samples.
    #[default]
    Pchip,
}

/// Configuration for trajectory and spatial parameter estimation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrajectoryConfig {
    /// Non-stationary gaps shorter than this many samples are filled.
    pub stationary_gap_tolerance: usize,
    /// Velocity drift removal method.
    pub drift_correction: DriftCorrection,
    /// Strides shorter than this are discarded (m).
    pub min_stride_m: f64,
    /// Strides longer than this multiple of the mean are discarded.
    pub max_stride_factor: f64,
    /// Stride times above this multiple of the median are invalid.
    pub stride_time_outlier_factor: f64,
}

impl Default for TrajectoryConfig {
    fn default() -> Self {
        Self {
            stationary_gap_tolerance: 10,
            drift_correction: DriftCorrection::Pchip,
            min_stride_m: 0.20,
            max_stride_factor: 1.6,
            stride_time_outlier_factor: 1.5,
        }
    }
}

/// Stationary mask: union of `mid_stance` and `non_active` samples, with
/// non-stationary gaps shorter than `tolerance` samples filled.
pub fn stationary_mask(mid_stance: &[usize], non_active: &[usize], len: usize, tolerance: usize) -> Vec<bool> {
    let mut mask = vec![false; len];
    for &i in mid_stance.iter().chain(non_active) {
        if i < len {
            mask[i] = true;
        }
    }

    for (start, end) in gaps(&mask) {
        let bounded = start > 0 && end < len;
        if bounded && end - start < tolerance {
            mask[start..end].iter_mut().for_each(|m| *m = true);
        }
    }
    mask
}

/// Half-open `[start, end)` runs of stationary samples. A run still open at
/// the end of the series is closed at `len`.
pub fn stationary_intervals(mask: &[bool]) -> Vec<(usize, usize)> {
    runs(mask, true)
}

/// Velocity from earth-frame acceleration (m/s²) with zero-velocity updates
/// on the stationary samples.
pub fn integrate_velocity(
    acc: &[Vec3],
    stationary: &[bool],
    sample_rate: f64,
    method: DriftCorrection,
) -> Result<Vec<Vec3>> {
    if acc.len() != stationary.len() {
        return Err(GaitError::LengthMismatch {
            context: "stationary mask".into(),
            expected: acc.len(),
            actual: stationary.len(),
        });
    }
    match method {
        DriftCorrection::Linear => Ok(linear_zupt(acc, stationary, sample_rate)),
        DriftCorrection::Pchip => pchip_zupt(acc, stationary, sample_rate),
    }
}

/// Running integral of velocity, starting at the origin.
pub fn integrate_position(velocity: &[Vec3], sample_rate: f64) -> Vec<Vec3> {
    let mut position = Vec::with_capacity(velocity.len());
    let mut p = [0.0; 3];
    for (t, v) in velocity.iter().enumerate() {
        if t > 0 {
            for k in 0..3 {
                p[k] += v[k] / sample_rate;
            }
        }
        position.push(p);
    }
    position
}

/// Velocity and position of one sensor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FootTrajectory {
    pub stationary: Vec<bool>,
    pub velocity: Vec<Vec3>,
    pub position: Vec<Vec3>,
}

impl FootTrajectory {
    pub fn estimate(
        acc_earth: &[Vec3],
        stationary: Vec<bool>,
        sample_rate: f64,
        method: DriftCorrection,
    ) -> Result<Self> {
        let velocity = integrate_velocity(acc_earth, &stationary, sample_rate, method)?;
        let position = integrate_position(&velocity, sample_rate);
        Ok(Self {
            stationary,
            velocity,
            position,
        })
    }
}

/// Stride lengths of one foot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FootStrides {
    /// All valid strides.
    pub all: Vec<StrideRecord>,
    /// Strides with neither bounding event inside a turn.
    pub straight: Vec<StrideRecord>,
    /// Strides touching a turn.
    pub in_turn: Vec<StrideRecord>,
    /// Median stride length (m).
    pub average_m: f64,
}

impl FootStrides {
    /// Planar stride length between consecutive Initial Contacts.
    ///
    /// Strides outside `[min_stride_m, max_stride_factor · mean]` are dropped.
    pub fn compute(position: &[Vec3], events: &FootEvents, turns: &[TurnSegment], config: &TrajectoryConfig) -> Self {
        let mut strides: Vec<StrideRecord> = events
            .initial_contact
            .windows(2)
            .filter(|w| w[0] != 0 && w[1] != 0)
            .map(|w| StrideRecord::new(w[0], w[1], planar_distance(position, w[0], w[1])))
            .collect();

        let values: Vec<f64> = strides.iter().map(|s| s.value).collect();
        let upper = config.max_stride_factor * nanmean(&values);
        for stride in &mut strides {
            if stride.value < config.min_stride_m || stride.value > upper {
                stride.value = f64::NAN;
            }
            if let Some(tc) = last_before(&events.terminal_contact, stride.end) {
                stride.start = tc;
            }
        }
        strides.retain(|s| !s.value.is_nan());

        let average_m = nanmedian(&strides.iter().map(|s| s.value).collect::<Vec<_>>());
        let (in_turn_strides, straight): (Vec<_>, Vec<_>) = strides
            .iter()
            .copied()
            .partition(|s| in_turn(turns, s.start) || in_turn(turns, s.end));

        Self {
            all: strides,
            straight,
            in_turn: in_turn_strides,
            average_m,
        }
    }

    pub fn total_m(&self) -> f64 {
        self.all.iter().map(|s| s.value).sum()
    }

    fn straight_ends(&self) -> Vec<usize> {
        self.straight.iter().map(|s| s.end).collect()
    }
}

/// Steady-state strides of both feet under one policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SteadyStrides {
    pub left: Vec<StrideRecord>,
    pub right: Vec<StrideRecord>,
}

impl SteadyStrides {
    pub fn foot(&self, side: Side) -> &[StrideRecord] {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub fn values(&self) -> Vec<f64> {
        self.left.iter().chain(&self.right).map(|s| s.value).collect()
    }
}

/// Select steady-state strides from the straight strides of both feet.
///
/// For every in-turn stride the nearest straight strides before and after
/// it are removed: on both feet with [`SteadyStatePolicy::NoTwoSteps`],
/// only the closer one on either side with [`SteadyStatePolicy::NoOneStep`].
/// The first and last `policy.radius()` straight strides of each foot are
/// always dropped.
pub fn steady_state_strides(left: &FootStrides, right: &FootStrides, policy: SteadyStatePolicy) -> SteadyStrides {
    let (ends_l, ends_r) = (left.straight_ends(), right.straight_ends());
    let before = |ends: &[usize], ic: usize| last_before(ends, ic).or_else(|| ends.first().copied());
    let after = |ends: &[usize], ic: usize| first_after(ends, ic).or_else(|| ends.last().copied());

    let mut removed: Vec<usize> = Vec::new();
    for turn_ic in left.in_turn.iter().chain(&right.in_turn).map(|s| s.end) {
        let (bl, br) = (before(&ends_l, turn_ic), before(&ends_r, turn_ic));
        let (al, ar) = (after(&ends_l, turn_ic), after(&ends_r, turn_ic));
        match policy {
            SteadyStatePolicy::NoTwoSteps => removed.extend([bl, br, al, ar].into_iter().flatten()),
            SteadyStatePolicy::NoOneStep => {
                removed.extend(bl.into_iter().chain(br).max());
                removed.extend(al.into_iter().chain(ar).min());
            }
        }
    }

    let keep = |strides: &[StrideRecord]| -> Vec<StrideRecord> {
        let n = policy.radius();
        if strides.len() <= 2 * n {
            return Vec::new();
        }
        strides[n..strides.len() - n]
            .iter()
            .filter(|s| !removed.contains(&s.end))
            .copied()
            .collect()
    };

    SteadyStrides {
        left: keep(&left.straight),
        right: keep(&right.straight),
    }
}

/// Speed of every stride of one foot, keyed like the stride records (m/s).
///
/// The first stride's time runs from the last Heel-Off before its Initial
/// Contact; later strides use the Initial Contact interval. Stride times
/// above `outlier_factor` times the median become NaN.
pub fn stride_speeds(strides: &[StrideRecord], heel_off: &[usize], sample_rate: f64, outlier_factor: f64) -> Vec<StrideRecord> {
    let Some(first) = strides.first() else {
        return Vec::new();
    };
    let first_time = first.end - last_before(heel_off, first.end).unwrap_or(0);
    let mut times: Vec<f64> = std::iter::once(first_time)
        .chain(strides.windows(2).map(|w| w[1].end.saturating_sub(w[0].end)))
        .map(|samples| samples as f64 / sample_rate)
        .collect();

    let limit = outlier_factor * nanmedian(&times);
    for t in &mut times {
        if *t > limit {
            *t = f64::NAN;
        }
    }

    strides
        .iter()
        .zip(&times)
        .map(|(s, t)| StrideRecord::new(s.start, s.end, s.value / t))
        .collect()
}

/// Spatial gait parameters of an IMU trial.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpatialParameters {
    pub left: FootStrides,
    pub right: FootStrides,
    pub no_one_step: SteadyStrides,
    pub no_two_steps: SteadyStrides,
    /// Per-stride speed of all strides (m/s).
    pub speed_left: Vec<StrideRecord>,
    pub speed_right: Vec<StrideRecord>,
    /// Median steady-state speed (km/h).
    pub gait_speed_kmh: f64,
    /// Gait speed fell back to all strides for lack of steady-state strides.
    pub no_steady_state: bool,
    pub stride_length_steady_m: f64,
    pub stride_length_all_m: f64,
    pub stride_length_asymmetry: f64,
    pub walked_distance_m: f64,
}

impl SpatialParameters {
    pub fn compute(
        left_position: &[Vec3],
        right_position: &[Vec3],
        events: &GaitEvents,
        turns: &[TurnSegment],
        sample_rate: f64,
        config: &TrajectoryConfig,
    ) -> Self {
        let left = FootStrides::compute(left_position, &events.left, turns, config);
        let right = FootStrides::compute(right_position, &events.right, turns, config);
        let no_one_step = steady_state_strides(&left, &right, SteadyStatePolicy::NoOneStep);
        let no_two_steps = steady_state_strides(&left, &right, SteadyStatePolicy::NoTwoSteps);

        let speed = |strides: &FootStrides, foot: &FootEvents| {
            stride_speeds(&strides.all, &foot.heel_off, sample_rate, config.stride_time_outlier_factor)
        };
        let speed_left = speed(&left, &events.left);
        let speed_right = speed(&right, &events.right);

        let steady_speeds: Vec<f64> = matching_speeds(&no_two_steps.left, &speed_left)
            .chain(matching_speeds(&no_two_steps.right, &speed_right))
            .collect();
        let mut gait_speed = nanmedian(&steady_speeds);
        let mut no_steady_state = false;
        if gait_speed.is_nan() {
            let all: Vec<f64> = speed_left.iter().chain(&speed_right).map(|s| s.value).collect();
            gait_speed = nanmedian(&all);
            no_steady_state = true;
            warn!("No steady-state strides; gait speed uses all strides");
        }

        debug!(
            left = left.all.len(),
            right = right.all.len(),
            steady = no_two_steps.left.len() + no_two_steps.right.len(),
            "Stride lengths computed"
        );

        Self {
            stride_length_steady_m: round_to(nanmedian(&no_two_steps.values()), 2),
            stride_length_all_m: round_to((left.average_m + right.average_m) / 2.0, 2),
            stride_length_asymmetry: round_to(asymmetry(left.average_m, right.average_m), 2),
            walked_distance_m: round_to((left.total_m() + right.total_m()) / 2.0, 2),
            gait_speed_kmh: round_to(gait_speed * 3.6, 2),
            no_steady_state,
            left,
            right,
            no_one_step,
            no_two_steps,
            speed_left,
            speed_right,
        }
    }

    pub fn foot(&self, side: Side) -> &FootStrides {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub fn record(&self, summary: &mut TrialSummary) {
        summary.set_scalar("Stride length - average steady state walking (m)", self.stride_length_steady_m);
        summary.set_scalar("Stride length - average all strides (m)", self.stride_length_all_m);
        summary.set_scalar("Stride length asymmetry", self.stride_length_asymmetry);
        summary.set_scalar("Gait speed (km/h)", self.gait_speed_kmh);
        summary.set_scalar("Walked distance (m)", self.walked_distance_m);

        for side in Side::BOTH {
            let l = side.label();
            let foot = self.foot(side);
            summary.set_strides(format!("Stride length {l} - all strides (m)"), foot.all.clone());
            summary.set_strides(format!("Stride length {l} - straight walking (m)"), foot.straight.clone());
            summary.set_strides(format!("Stride length {l} - in turn (m)"), foot.in_turn.clone());
            summary.set_strides(
                format!("Stride length {l} - {} (m)", SteadyStatePolicy::NoOneStep.label()),
                self.no_one_step.foot(side).to_vec(),
            );
            summary.set_strides(
                format!("Stride length {l} - {} (m)", SteadyStatePolicy::NoTwoSteps.label()),
                self.no_two_steps.foot(side).to_vec(),
            );
            let speeds = match side {
                Side::Left => &self.speed_left,
                Side::Right => &self.speed_right,
            };
            summary.set_strides(format!("Gait speed per stride {l} (m/s)"), speeds.clone());
        }
    }
}

// ===== PRIVATE HELPERS =====

fn matching_speeds<'a>(steady: &'a [StrideRecord], speeds: &'a [StrideRecord]) -> impl Iterator<Item = f64> + 'a {
    steady
        .iter()
        .filter_map(move |s| speeds.iter().find(|v| v.start == s.start).map(|v| v.value))
}

fn planar_distance(position: &[Vec3], from: usize, to: usize) -> f64 {
    match (position.get(from), position.get(to)) {
        (Some(a), Some(b)) => (b[0] - a[0]).hypot(b[1] - a[1]),
        _ => f64::NAN,
    }
}

/// Half-open runs where `mask == value`.
fn runs(mask: &[bool], value: bool) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut start = None;
    for (i, &m) in mask.iter().enumerate() {
        match (m == value, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                out.push((s, i));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        out.push((s, mask.len()));
    }
    out
}

fn gaps(mask: &[bool]) -> Vec<(usize, usize)> {
    runs(mask, false)
}

fn linear_zupt(acc: &[Vec3], stationary: &[bool], sample_rate: f64) -> Vec<Vec3> {
    let mut velocity = vec![[0.0; 3]; acc.len()];
    for t in 1..acc.len() {
        if stationary[t] {
            continue;
        }
        for k in 0..3 {
            velocity[t][k] = velocity[t - 1][k] + acc[t][k] / sample_rate;
        }
    }

    // Moving runs closed by a stationary interval end at zero velocity.
    for (start, end) in gaps(stationary) {
        if end >= stationary.len() {
            continue;
        }
        let span = (end - start) as f64;
        let rate = velocity[end - 1].map(|v| v / span);
        for (step, v) in velocity[start..end].iter_mut().enumerate() {
            let k = (step + 1) as f64;
            for axis in 0..3 {
                v[axis] -= k * rate[axis];
            }
        }
    }
    velocity
}

fn pchip_zupt(acc: &[Vec3], stationary: &[bool], sample_rate: f64) -> Result<Vec<Vec3>> {
    let knots = mask_indices(stationary);
    if knots.is_empty() {
        return Err(GaitError::InsufficientEvents {
            context: "stationary samples for velocity drift".into(),
            required: 1,
            found: 0,
        });
    }

    // Same running sum as position integration, applied to acceleration.
    let raw = integrate_position(acc, sample_rate);
    let x: Vec<f64> = knots.iter().map(|&i| i as f64).collect();
    let mut velocity = raw.clone();
    for axis in 0..3 {
        let y: Vec<f64> = knots.iter().map(|&i| raw[i][axis]).collect();
        let drift = Pchip::new(&x, &y)?.evaluate_range(raw.len());
        for (v, d) in velocity.iter_mut().zip(drift) {
            v[axis] -= d;
        }
    }
    for (v, &s) in velocity.iter_mut().zip(stationary) {
        if s {
            *v = [0.0; 3];
        }
    }
    Ok(velocity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    const FS: f64 = 100.0;

    fn strides_from_ends(ends: &[usize], value: f64) -> Vec<StrideRecord> {
        ends.iter().map(|&e| StrideRecord::new(e - 40, e, value)).collect()
    }

    fn foot(straight: &[usize], in_turn: &[usize]) -> FootStrides {
        let straight = strides_from_ends(straight, 1.0);
        let in_turn = strides_from_ends(in_turn, 1.0);
        let mut all: Vec<StrideRecord> = straight.iter().chain(&in_turn).copied().collect();
        all.sort_by_key(|s| s.end);
        FootStrides {
            all,
            straight,
            in_turn,
            average_m: 1.0,
        }
    }

    fn walking_foot() -> (Vec<Vec3>, FootEvents) {
        // Foot advances 1.2 m along X per 100-sample stride.
        let position: Vec<Vec3> = (0..1000).map(|i| [1.2 * i as f64 / 100.0, 0.0, 0.0]).collect();
        let ic: Vec<usize> = (1..9).map(|k| k * 100).collect();
        let tc: Vec<usize> = (1..9).map(|k| k * 100 - 40).collect();
        let mut events = FootEvents::from_contacts(ic, tc);
        events.heel_off = (1..9).map(|k| k * 100 - 60).collect();
        (position, events)
    }

    #[test]
    fn test_stationary_mask_fills_short_gaps() {
        let mid: Vec<usize> = (0..5).chain(12..20).chain(40..50).collect();
        let mask = stationary_mask(&mid, &[], 60, 10);
        assert!(mask[5..12].iter().all(|&m| m), "A 7-sample gap should be filled");
        assert!(!mask[25], "A 20-sample gap should stay open");
        assert!(!mask[55], "The trailing run is not bounded and stays open");
    }

    #[test]
    fn test_stationary_intervals() {
        let mask = [true, true, false, false, true, false, true, true];
        assert_eq!(stationary_intervals(&mask), vec![(0, 2), (4, 5), (6, 8)]);
        assert!(stationary_intervals(&[false; 4]).is_empty());
    }

    #[test]
    fn test_linear_zupt_removes_bias_drift() {
        let len = 60;
        let acc = vec![[0.5, 0.0, -0.2]; len];
        let stationary: Vec<bool> = (0..len).map(|i| i < 10 || (30..40).contains(&i)).collect();
        let v = integrate_velocity(&acc, &stationary, FS, DriftCorrection::Linear).unwrap();

        for i in (0..10).chain(30..40) {
            assert_eq!(v[i], [0.0; 3], "Stationary sample {} must be zero", i);
        }
        for (i, vi) in v.iter().enumerate().take(30).skip(10) {
            assert_abs_diff_eq!(vi[0], 0.0, epsilon = 1e-12);
            assert!(vi[2].abs() < 1e-12, "Constant bias should cancel at {}", i);
        }
        // Trailing run has no closing stationary interval.
        assert!(v[59][0] > 0.0);
    }

    #[test]
    fn test_pchip_zupt_removes_constant_bias() {
        let len = 200;
        let acc = vec![[0.3, -0.1, 0.05]; len];
        let stationary: Vec<bool> = (0..len).map(|i| (i / 25) % 2 == 0).collect();
        let v = integrate_velocity(&acc, &stationary, FS, DriftCorrection::Pchip).unwrap();
        for (i, vi) in v.iter().enumerate() {
            for axis in 0..3 {
                assert_abs_diff_eq!(vi[axis], 0.0, epsilon = 1e-9);
            }
            assert!(vi.iter().all(|c| c.is_finite()), "Sample {} not finite", i);
        }
    }

    #[test]
    fn test_pchip_zupt_requires_stationary_samples() {
        let acc = vec![[0.0; 3]; 10];
        let err = integrate_velocity(&acc, &[false; 10], FS, DriftCorrection::Pchip).unwrap_err();
        assert!(err.is_missing_data());
    }

    #[test]
    fn test_velocity_length_mismatch() {
        let acc = vec![[0.0; 3]; 10];
        assert!(matches!(
            integrate_velocity(&acc, &[true; 9], FS, DriftCorrection::Linear),
            Err(GaitError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_position_integration() {
        let v = vec![[1.0, 0.0, 0.0]; 101];
        let p = integrate_position(&v, FS);
        assert_eq!(p[0], [0.0; 3]);
        assert_abs_diff_eq!(p[100][0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_stride_lengths_from_position() {
        let (position, events) = walking_foot();
        let strides = FootStrides::compute(&position, &events, &[], &TrajectoryConfig::default());

        assert_eq!(strides.all.len(), 7);
        assert_eq!(strides.all[0].start, 160, "Stride starts at the preceding Terminal Contact");
        assert_eq!(strides.all[0].end, 200);
        for s in &strides.all {
            assert_abs_diff_eq!(s.value, 1.2, epsilon = 1e-9);
        }
        assert_abs_diff_eq!(strides.average_m, 1.2, epsilon = 1e-9);
        assert_eq!(strides.straight.len(), 7);
        assert!(strides.in_turn.is_empty());
    }

    #[test]
    fn test_stride_length_outliers_dropped() {
        let (mut position, events) = walking_foot();
        // Freeze the foot between 300 and 400: a zero-length stride.
        for p in position.iter_mut().take(401).skip(300) {
            *p = [3.6, 0.0, 0.0];
        }
        for p in position.iter_mut().skip(401) {
            p[0] -= 1.2;
        }
        let strides = FootStrides::compute(&position, &events, &[], &TrajectoryConfig::default());
        assert!(strides.all.iter().all(|s| s.end != 400), "Short stride ending at 400 should be dropped");
        assert!(strides.all.iter().all(|s| s.value >= 0.20));
    }

    #[test]
    fn test_turn_split() {
        let (position, events) = walking_foot();
        let turns = [TurnSegment { start: 350, end: 420, peak_deg_s: 100.0 }];
        let strides = FootStrides::compute(&position, &events, &turns, &TrajectoryConfig::default());
        let turn_ends: Vec<usize> = strides.in_turn.iter().map(|s| s.end).collect();
        assert_eq!(turn_ends, vec![400], "Only the stride with an event in the turn");
        assert_eq!(strides.straight.len(), 6);
    }

    #[test]
    fn test_steady_state_two_steps() {
        let left = foot(&[100, 200, 300, 500, 600, 700, 800], &[400]);
        let right = foot(&[150, 250, 350, 550, 650, 750, 850], &[450]);
        let steady = steady_state_strides(&left, &right, SteadyStatePolicy::NoTwoSteps);
        let ends = |s: &[StrideRecord]| s.iter().map(|r| r.end).collect::<Vec<_>>();
        assert_eq!(ends(&steady.left), vec![600]);
        assert_eq!(ends(&steady.right), vec![650]);
    }

    #[test]
    fn test_steady_state_one_step() {
        let left = foot(&[100, 200, 300, 500, 600, 700, 800], &[400]);
        let right = foot(&[150, 250, 350, 550, 650, 750, 850], &[450]);
        let steady = steady_state_strides(&left, &right, SteadyStatePolicy::NoOneStep);
        let ends = |s: &[StrideRecord]| s.iter().map(|r| r.end).collect::<Vec<_>>();
        assert_eq!(ends(&steady.left), vec![200, 300, 600, 700]);
        assert_eq!(ends(&steady.right), vec![250, 550, 650, 750]);
    }

    #[test]
    fn test_steady_state_short_trial_empty() {
        let left = foot(&[100, 200, 300], &[]);
        let right = foot(&[150, 250, 350, 450], &[]);
        let steady = steady_state_strides(&left, &right, SteadyStatePolicy::NoTwoSteps);
        assert!(steady.left.is_empty() && steady.right.is_empty());
    }

    #[test]
    fn test_stride_speeds() {
        let strides = strides_from_ends(&[100, 200, 300, 400], 1.2);
        let speeds = stride_speeds(&strides, &[80, 180, 280], FS, 1.5);
        assert_abs_diff_eq!(speeds[0].value, 1.2 / 0.2, epsilon = 1e-9);
        assert_abs_diff_eq!(speeds[1].value, 1.2, epsilon = 1e-9);

        let strides = strides_from_ends(&[100, 200, 400], 1.2);
        let speeds = stride_speeds(&strides, &[], FS, 1.5);
        assert!(speeds[2].value.is_nan(), "A 2 s stride is a time outlier");
    }

    #[test]
    fn test_spatial_parameters_straight_walking() {
        let (position, events) = walking_foot();
        let gait = GaitEvents {
            left: events.clone(),
            right: events,
        };
        let params = SpatialParameters::compute(&position, &position, &gait, &[], FS, &TrajectoryConfig::default());

        assert!(!params.no_steady_state);
        assert_abs_diff_eq!(params.gait_speed_kmh, 4.32, epsilon = 1e-9);
        assert_abs_diff_eq!(params.stride_length_steady_m, 1.2, epsilon = 1e-9);
        assert_abs_diff_eq!(params.stride_length_all_m, 1.2, epsilon = 1e-9);
        assert_abs_diff_eq!(params.walked_distance_m, 8.4, epsilon = 1e-9);
        assert_abs_diff_eq!(params.stride_length_asymmetry, 0.5, epsilon = 1e-9);

        let mut summary = TrialSummary::new();
        params.record(&mut summary);
        assert_eq!(summary.scalar("Gait speed (km/h)"), Some(4.32));
        assert_eq!(
            summary.strides("Stride length left - no 2 steps around turn (m)").map(<[_]>::len),
            Some(3)
        );
    }

    #[test]
    fn test_gait_speed_falls_back_when_all_in_turn() {
        let (position, events) = walking_foot();
        let gait = GaitEvents {
            left: events.clone(),
            right: events,
        };
        let turns = [TurnSegment { start: 0, end: 999, peak_deg_s: 90.0 }];
        let params = SpatialParameters::compute(&position, &position, &gait, &turns, FS, &TrajectoryConfig::default());
        assert!(params.no_steady_state);
        assert!(params.gait_speed_kmh.is_finite());
        assert!(params.stride_length_steady_m.is_nan());
    }

    proptest! {
        #[test]
        fn test_kept_strides_within_bounds(steps in proptest::collection::vec(0.0f64..3.0, 3..20)) {
            let mut position = vec![[0.0; 3]];
            let mut x = 0.0;
            let mut ic = Vec::new();
            for (k, s) in steps.iter().enumerate() {
                for _ in 0..100 {
                    x += s / 100.0;
                    position.push([x, 0.0, 0.0]);
                }
                ic.push((k + 1) * 100);
            }
            let events = FootEvents::from_contacts(ic, Vec::new());
            let strides = FootStrides::compute(&position, &events, &[], &TrajectoryConfig::default());
            let mean = nanmean(&steps[1..]);
            for s in &strides.all {
                prop_assert!(s.value >= 0.20 - 1e-9);
                prop_assert!(s.value <= 1.6 * mean + 1e-9);
            }
        }
    }
}
