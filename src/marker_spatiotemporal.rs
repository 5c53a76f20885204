//! Reference spatiotemporal parameters from optical markers.
//!
//! Two lab settings:
//! - **Treadmill**: the foot hardly moves in the lab frame, so stride length
//!   is belt displacement (contralateral ankle velocity during swing) minus
//!   the net heel drift between consecutive heel-strikes.
//! - **Overground**: stride length is the heel displacement along the walking
//!   axis between consecutive heel-strikes.
//!
//! Per-stride values are [`StrideRecord`]s keyed by the frames bounding the
//! stride, so they can be paired with sensor-derived strides. Positions are
//! millimetres; durations are seconds.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::filtering::FilterSpec;
use crate::marker_events::{heel_label, MarkerTrialType};
use crate::stats::{diff, first_after, last_before, nanmean, nanmedian};
use crate::types::{FootEvents, GaitEvents, MarkerTrajectories, Side, StrideRecord, TrialSummary};

fn ankle_label(side: Side) -> &'static str {
    match side {
        Side::Left => "LANK",
        Side::Right => "RANK",
    }
}

/// Configuration for marker-based stride parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerSpatiotemporalConfig {
    /// Low-pass on ankle position before differentiation (treadmill).
    pub ankle_filter: FilterSpec,
    /// Low-pass on ankle velocity (treadmill).
    pub velocity_filter: FilterSpec,
    /// Stance or swing phases longer than this are discarded (s).
    pub max_phase_s: f64,
    /// Fraction of swing where the belt-velocity window starts.
    pub belt_window_start: f64,
    /// Fraction of swing where the belt-velocity window ends.
    pub belt_window_end: f64,
    /// Strides shorter than this are discarded (mm).
    pub min_stride_mm: f64,
    /// Strides longer than this are discarded, overground only (mm).
    pub max_stride_mm: f64,
    /// Strides longer than this multiple of the median are discarded.
    pub stride_outlier_factor: f64,
    /// Swing longer than this multiple of the median swing voids the stride (treadmill).
    pub swing_outlier_factor: f64,
    /// Gait cycles shorter than this are discarded (s).
    pub min_cycle_s: f64,
    /// Longest plausible gait cycle on the treadmill (s).
    pub max_cycle_treadmill_s: f64,
    /// Longest plausible gait cycle overground (s).
    pub max_cycle_overground_s: f64,
    /// Gait cycles longer than this multiple of the median are discarded.
    pub cycle_outlier_factor: f64,
}

impl Default for MarkerSpatiotemporalConfig {
    fn default() -> Self {
        Self {
            ankle_filter: FilterSpec::new(2, 5.0),
            velocity_filter: FilterSpec::new(2, 8.0),
            max_phase_s: 1.8,
            belt_window_start: 0.1,
            belt_window_end: 0.6,
            min_stride_mm: 200.0,
            max_stride_mm: 1800.0,
            stride_outlier_factor: 1.6,
            swing_outlier_factor: 1.5,
            min_cycle_s: 0.3,
            max_cycle_treadmill_s: 3.0,
            max_cycle_overground_s: 2.3,
            cycle_outlier_factor: 1.5,
        }
    }
}

/// Marker-derived parameters of one foot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FootMarkerSpatiotemporals {
    /// Stride length (mm), keyed `(start of swing, heel-strike)`.
    pub stride_length_mm: Vec<StrideRecord>,
    /// Gait cycle duration (s), keyed `(previous heel-strike, heel-strike)`.
    pub gait_cycle_s: Vec<StrideRecord>,
    /// Stride velocity (m/s), keyed like `stride_length_mm`.
    pub speed_m_s: Vec<StrideRecord>,
    /// Stance durations (s); NaN where not measurable.
    pub stance_s: Vec<f64>,
    /// Swing durations (s); NaN where not measurable.
    pub swing_s: Vec<f64>,
}

/// Marker-derived parameters of both feet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkerSpatiotemporals {
    pub left: FootMarkerSpatiotemporals,
    pub right: FootMarkerSpatiotemporals,
}

/// One candidate stride before filtering.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    start_stride: usize,
    start_swing: usize,
    end: usize,
    length_mm: f64,
}

impl MarkerSpatiotemporals {
    /// Dispatch on the recording setting.
    pub fn compute(
        markers: &MarkerTrajectories,
        events: &GaitEvents,
        trial_type: MarkerTrialType,
        config: &MarkerSpatiotemporalConfig,
    ) -> Result<Self> {
        match trial_type {
            MarkerTrialType::Treadmill => Self::treadmill(markers, events, config),
            MarkerTrialType::Overground => Self::overground(markers, events, config),
        }
    }

    /// Treadmill parameters from belt displacement.
    pub fn treadmill(
        markers: &MarkerTrajectories,
        events: &GaitEvents,
        config: &MarkerSpatiotemporalConfig,
    ) -> Result<Self> {
        let fr = markers.sample_rate;
        let ap = MarkerTrialType::Treadmill.convention().ap_axis;
        let left_velocity = ankle_velocity(markers, Side::Left, ap, config)?;
        let right_velocity = ankle_velocity(markers, Side::Right, ap, config)?;

        let mut result = Self::default();
        for side in Side::BOTH {
            let contralateral = match side {
                Side::Left => &right_velocity,
                Side::Right => &left_velocity,
            };
            let heel = axis(markers.marker(heel_label(side))?, ap);
            *result.foot_mut(side) =
                treadmill_foot(events.foot(side), &heel, contralateral, fr, config);
        }
        Ok(result)
    }

    /// Overground parameters from heel displacement.
    pub fn overground(
        markers: &MarkerTrajectories,
        events: &GaitEvents,
        config: &MarkerSpatiotemporalConfig,
    ) -> Result<Self> {
        let fr = markers.sample_rate;
        let ap = MarkerTrialType::Overground.convention().ap_axis;
        let mut result = Self::default();
        for side in Side::BOTH {
            let heel = axis(markers.marker(heel_label(side))?, ap);
            *result.foot_mut(side) = overground_foot(events.foot(side), &heel, fr, config);
        }
        Ok(result)
    }

    pub fn foot(&self, side: Side) -> &FootMarkerSpatiotemporals {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    fn foot_mut(&mut self, side: Side) -> &mut FootMarkerSpatiotemporals {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    pub fn record(&self, summary: &mut TrialSummary) {
        for side in Side::BOTH {
            let l = side.label();
            let foot = self.foot(side);
            summary.set_strides(format!("Stride length {l} (mm)"), foot.stride_length_mm.clone());
            summary.set_strides(format!("Gait cycle duration {l} (s)"), foot.gait_cycle_s.clone());
            summary.set_strides(format!("Gait speed per stride {l} (m/s)"), foot.speed_m_s.clone());
            summary.set_series(format!("Stance time per stride {l} (s)"), foot.stance_s.clone());
            summary.set_series(format!("Swing time per stride {l} (s)"), foot.swing_s.clone());
        }
    }
}

// ===== PRIVATE HELPERS =====

fn axis(series: &[[f64; 3]], column: usize) -> Vec<f64> {
    series.iter().map(|v| v[column]).collect()
}

/// Filtered anterior-posterior ankle velocity (mm/s), one sample shorter than
/// the marker series.
fn ankle_velocity(
    markers: &MarkerTrajectories,
    side: Side,
    ap: usize,
    config: &MarkerSpatiotemporalConfig,
) -> Result<Vec<f64>> {
    let fr = markers.sample_rate;
    let position = config
        .ankle_filter
        .apply(&axis(markers.marker(ankle_label(side))?, ap), fr)?;
    let velocity: Vec<f64> = diff(&position).into_iter().map(|v| v * fr).collect();
    config.velocity_filter.apply(&velocity, fr)
}

/// Duration from each `from` event to the next `to` event, NaN beyond `max_frames`.
fn phase_durations(from: &[usize], to: &[usize], fr: f64, max_frames: f64) -> Vec<f64> {
    from.iter()
        .filter_map(|&f| first_after(to, f).map(|t| (t - f) as f64))
        .map(|d| if d > max_frames { f64::NAN } else { d / fr })
        .collect()
}

fn treadmill_foot(
    events: &FootEvents,
    heel: &[f64],
    contralateral_velocity: &[f64],
    fr: f64,
    config: &MarkerSpatiotemporalConfig,
) -> FootMarkerSpatiotemporals {
    let ic = &events.initial_contact;
    let tc = &events.terminal_contact;
    let max_frames = config.max_phase_s * fr;
    let stance_s = phase_durations(ic, tc, fr, max_frames);
    let swing_s = phase_durations(tc, ic, fr, max_frames);

    let mut candidates = Vec::new();
    for pair in ic.windows(2) {
        let (start_stride, end) = (pair[0], pair[1]);
        let Some(start_swing) = last_before(tc, end) else {
            continue;
        };
        let swing = (end - start_swing) as f64;
        let from = (start_swing as f64 + config.belt_window_start * swing) as usize;
        let to = ((start_swing as f64 + config.belt_window_end * swing) as usize)
            .min(contralateral_velocity.len());
        let belt_velocity = if from < to {
            nanmean(&contralateral_velocity[from..to])
        } else {
            f64::NAN
        };
        let (Some(&h_end), Some(&h_start)) = (heel.get(end), heel.get(start_stride)) else {
            continue;
        };
        let belt = (end - start_stride) as f64 / fr * belt_velocity;
        candidates.push(Candidate {
            start_stride,
            start_swing,
            end,
            length_mm: belt - (h_end - h_start),
        });
    }

    let median_length = nanmedian(&candidates.iter().map(|c| c.length_mm).collect::<Vec<_>>());
    let median_swing = nanmedian(&swing_s) * fr;
    candidates.retain(|c| {
        let swing = (c.end - c.start_swing) as f64;
        !(c.length_mm > config.stride_outlier_factor * median_length
            || c.length_mm < config.min_stride_mm
            || c.length_mm.is_nan()
            || swing > config.swing_outlier_factor * median_swing)
    });

    // Gait cycle between consecutive retained strides; the first has none.
    let mut cycles: Vec<f64> = std::iter::once(f64::NAN)
        .chain(candidates.windows(2).map(|w| (w[1].end - w[0].end) as f64))
        .take(candidates.len())
        .collect();
    let median_cycle = nanmedian(&cycles);
    for c in &mut cycles {
        if *c > config.max_cycle_treadmill_s * fr
            || *c < config.min_cycle_s * fr
            || *c > config.cycle_outlier_factor * median_cycle
        {
            *c = f64::NAN;
        }
    }

    let mut foot = FootMarkerSpatiotemporals {
        stance_s,
        swing_s,
        ..Default::default()
    };
    for (i, (c, &cycle)) in candidates.iter().zip(&cycles).enumerate() {
        foot.stride_length_mm
            .push(StrideRecord::new(c.start_swing, c.end, c.length_mm));
        if cycle.is_nan() {
            continue;
        }
        let previous_end = candidates[i - 1].end;
        foot.gait_cycle_s
            .push(StrideRecord::new(previous_end, c.end, cycle / fr));
        foot.speed_m_s.push(StrideRecord::new(
            c.start_swing,
            c.end,
            c.length_mm / 1000.0 / (cycle / fr),
        ));
    }
    debug!(
        strides = foot.stride_length_mm.len(),
        cycles = foot.gait_cycle_s.len(),
        "Treadmill stride parameters computed"
    );
    foot
}

fn overground_foot(
    events: &FootEvents,
    heel: &[f64],
    fr: f64,
    config: &MarkerSpatiotemporalConfig,
) -> FootMarkerSpatiotemporals {
    let ic = &events.initial_contact;
    let tc = &events.terminal_contact;

    let mut candidates: Vec<Candidate> = ic
        .windows(2)
        .filter_map(|pair| {
            let (start_stride, end) = (pair[0], pair[1]);
            let start_swing = last_before(tc, end)?;
            let length_mm = (heel.get(end)? - heel.get(start_stride)?).abs();
            Some(Candidate {
                start_stride,
                start_swing,
                end,
                length_mm,
            })
        })
        .collect();

    // A missed toe-off makes two strides share one swing; drop both.
    let unique = |key: fn(&Candidate) -> usize, all: &[Candidate]| -> Vec<Candidate> {
        all.iter()
            .filter(|c| all.iter().filter(|o| key(o) == key(c)).count() == 1)
            .copied()
            .collect()
    };
    candidates = unique(|c| c.start_stride, &candidates);
    candidates = unique(|c| c.start_swing, &candidates);

    candidates.retain(|c| c.length_mm >= config.min_stride_mm && c.length_mm <= config.max_stride_mm);
    let median_length = nanmedian(&candidates.iter().map(|c| c.length_mm).collect::<Vec<_>>());
    candidates.retain(|c| c.length_mm <= config.stride_outlier_factor * median_length);

    let stance_s: Vec<f64> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| match i.checked_sub(1) {
            Some(prev) => (c.start_swing as f64 - candidates[prev].end as f64) / fr,
            None => f64::NAN,
        })
        .collect();
    let swing_s: Vec<f64> = candidates
        .iter()
        .map(|c| (c.end - c.start_swing) as f64 / fr)
        .collect();

    let mut cycles: Vec<f64> = candidates
        .iter()
        .map(|c| (c.end - c.start_stride) as f64)
        .collect();
    let median_cycle = nanmedian(&cycles);
    for c in &mut cycles {
        if *c > config.max_cycle_overground_s * fr
            || *c < config.min_cycle_s * fr
            || *c > config.cycle_outlier_factor * median_cycle
            || *c == 0.0
        {
            *c = f64::NAN;
        }
    }

    let mut foot = FootMarkerSpatiotemporals {
        stance_s,
        swing_s,
        ..Default::default()
    };
    for (c, &cycle) in candidates.iter().zip(&cycles) {
        if cycle.is_nan() {
            continue;
        }
        foot.stride_length_mm
            .push(StrideRecord::new(c.start_swing, c.end, c.length_mm));
        foot.gait_cycle_s
            .push(StrideRecord::new(c.start_stride, c.end, cycle / fr));
        foot.speed_m_s.push(StrideRecord::new(
            c.start_swing,
            c.end,
            c.length_mm / 1000.0 / (cycle / fr),
        ));
    }
    debug!(
        strides = foot.stride_length_mm.len(),
        "Overground stride parameters computed"
    );
    foot
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const FR: f64 = 100.0;
    const FRAMES: usize = 900;

    fn heel_strikes() -> Vec<usize> {
        (0..7).map(|k| 100 + 110 * k).collect()
    }

    fn foot_events(skip_toe_off: Option<usize>) -> FootEvents {
        let ic = heel_strikes();
        let tc = ic
            .iter()
            .map(|&i| i + 70)
            .filter(|&t| Some(t) != skip_toe_off)
            .collect();
        FootEvents::from_contacts(ic, tc)
    }

    fn events(skip_toe_off: Option<usize>) -> GaitEvents {
        GaitEvents {
            left: foot_events(skip_toe_off),
            right: foot_events(skip_toe_off),
        }
    }

    /// Subject stays in place on a belt moving along +Y at 1 m/s.
    fn treadmill_markers(heel_y: impl Fn(usize) -> f64) -> MarkerTrajectories {
        let ankle: Vec<[f64; 3]> = (0..FRAMES).map(|i| [0.0, 10.0 * i as f64, 80.0]).collect();
        let heel: Vec<[f64; 3]> = (0..FRAMES).map(|i| [0.0, heel_y(i), 40.0]).collect();
        MarkerTrajectories::new(FR)
            .with_marker("LANK", ankle.clone())
            .with_marker("RANK", ankle)
            .with_marker("LHEE", heel.clone())
            .with_marker("RHEE", heel)
    }

    /// Heel advancing along +X at 12 mm per frame.
    fn overground_markers() -> MarkerTrajectories {
        let heel: Vec<[f64; 3]> = (0..FRAMES).map(|i| [12.0 * i as f64, 0.0, 40.0]).collect();
        MarkerTrajectories::new(FR)
            .with_marker("LHEE", heel.clone())
            .with_marker("RHEE", heel)
    }

    #[test]
    fn test_phase_durations() {
        let stance = phase_durations(&[100, 210, 320], &[170, 280], FR, 180.0);
        assert_eq!(stance, vec![0.7, 0.7], "last IC has no following TC");
        let long = phase_durations(&[100], &[300], FR, 180.0);
        assert!(long[0].is_nan(), "phase over the limit should be NaN");
    }

    #[test]
    fn test_treadmill_belt_displacement() {
        let markers = treadmill_markers(|_| 500.0);
        let cfg = MarkerSpatiotemporalConfig::default();
        let result = MarkerSpatiotemporals::treadmill(&markers, &events(None), &cfg).unwrap();

        let left = &result.left;
        assert_eq!(left.stride_length_mm.len(), 6, "one stride per heel-strike after the first");
        for s in &left.stride_length_mm {
            assert_abs_diff_eq!(s.value, 1100.0, epsilon = 1.0);
            assert_eq!(s.end - s.start, 40, "stride keyed from start of swing");
        }
        assert_eq!(left.gait_cycle_s.len(), 5, "first stride has no preceding cycle");
        assert_abs_diff_eq!(left.gait_cycle_s[0].value, 1.1, epsilon = 1e-9);
        for s in &left.speed_m_s {
            assert_abs_diff_eq!(s.value, 1.0, epsilon = 2e-3);
        }
        assert_eq!(left.stance_s.len(), 7);
        assert_abs_diff_eq!(left.stance_s[0], 0.7, epsilon = 1e-9);
        assert_eq!(left.swing_s.len(), 6, "last TC has no following IC");
        assert_abs_diff_eq!(left.swing_s[0], 0.4, epsilon = 1e-9);
    }

    #[test]
    fn test_treadmill_outlier_strides() {
        // A heel marker glitch at frame 430 lengthens one stride and shortens the next.
        let markers = treadmill_markers(|i| if i == 430 { -500.0 } else { 500.0 });
        let cfg = MarkerSpatiotemporalConfig::default();
        let result = MarkerSpatiotemporals::treadmill(&markers, &events(None), &cfg).unwrap();

        let ends: Vec<usize> = result.left.stride_length_mm.iter().map(|s| s.end).collect();
        assert_eq!(ends, vec![210, 320, 650, 760], "strides ending at 430 and 540 removed");
        let cycle_ends: Vec<usize> = result.left.gait_cycle_s.iter().map(|s| s.end).collect();
        assert_eq!(cycle_ends, vec![320, 760], "330-frame gap exceeds the median limit");
        assert_eq!(result.left.speed_m_s.len(), 2);
    }

    #[test]
    fn test_treadmill_missing_ankle() {
        let markers = MarkerTrajectories::new(FR).with_marker("LHEE", vec![[0.0; 3]; FRAMES]);
        let cfg = MarkerSpatiotemporalConfig::default();
        let err = MarkerSpatiotemporals::treadmill(&markers, &events(None), &cfg).unwrap_err();
        assert!(
            matches!(err, crate::error::GaitError::MissingMarker(ref m) if m == "LANK"),
            "unexpected error {err:?}"
        );
    }

    #[test]
    fn test_overground_heel_displacement() {
        let cfg = MarkerSpatiotemporalConfig::default();
        let result = MarkerSpatiotemporals::compute(
            &overground_markers(),
            &events(None),
            MarkerTrialType::Overground,
            &cfg,
        )
        .unwrap();

        let right = &result.right;
        assert_eq!(right.stride_length_mm.len(), 6);
        for (s, v) in right.stride_length_mm.iter().zip(&right.speed_m_s) {
            assert_abs_diff_eq!(s.value, 1320.0, epsilon = 1e-9);
            assert_abs_diff_eq!(v.value, 1.2, epsilon = 1e-9);
        }
        assert!(right.stance_s[0].is_nan(), "first stride has no previous heel-strike");
        assert_abs_diff_eq!(right.stance_s[1], 0.7, epsilon = 1e-9);
        assert_abs_diff_eq!(right.swing_s[0], 0.4, epsilon = 1e-9);
        assert_abs_diff_eq!(right.gait_cycle_s[0].value, 1.1, epsilon = 1e-9);
    }

    #[test]
    fn test_overground_shared_swing_removed() {
        // Without the toe-off at 390 the strides ending at 320 and 430 share one swing.
        let cfg = MarkerSpatiotemporalConfig::default();
        let result =
            MarkerSpatiotemporals::overground(&overground_markers(), &events(Some(390)), &cfg)
                .unwrap();
        let ends: Vec<usize> = result.left.stride_length_mm.iter().map(|s| s.end).collect();
        assert_eq!(ends, vec![210, 540, 650, 760], "ambiguous strides dropped");
    }

    #[test]
    fn test_record_keys() {
        let cfg = MarkerSpatiotemporalConfig::default();
        let result =
            MarkerSpatiotemporals::overground(&overground_markers(), &events(None), &cfg).unwrap();
        let mut summary = TrialSummary::new();
        result.record(&mut summary);
        assert_eq!(
            summary.strides("Stride length left (mm)").map(|s| s.len()),
            Some(6),
            "left stride lengths recorded"
        );
        assert!(summary.get("Swing time per stride right (s)").is_some(), "swing series recorded");
    }
}
