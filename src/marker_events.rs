//! Gait event detection from optical marker trajectories.
//!
//! Implements the Zeni family of kinematic event detectors:
//! - `Velocity` (default): sign changes of anterior-posterior heel/toe velocity
//! - `Coordinate`: extrema of heel/toe position relative to the pelvis
//! - `Smk`: sign changes of vertical heel/toe velocity
//! - `Pijnappels`: peaks of vertical toe/heel velocity
//!
//! Each algorithm is a [`MarkerEventStrategy`]; callers select one through
//! [`MarkerEventAlgorithm`] or pass their own strategy to
//! [`MarkerEventDetector::detect_with`]. All strategies share the same input
//! (filtered foot markers plus a pelvis reference) and the same
//! post-processing (edge trimming, contact bracketing, missing-marker removal).
//!
//! Units are millimetres and frames.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::filtering::{filtfilt_marker, padded_diff, FilterSpec};
use crate::peaks::{find_peaks, PeakCriteria};
use crate::stats::{diff, diff_indices, median_duration};
use crate::types::{FootEvents, GaitEvents, MarkerTrajectories, Side, Vec3};

/// Pelvis and foot marker labels.
pub const LPSI: &str = "LPSI";
pub const RPSI: &str = "RPSI";

pub(crate) fn heel_label(side: Side) -> &'static str {
    match side {
        Side::Left => "LHEE",
        Side::Right => "RHEE",
    }
}

fn toe_label(side: Side) -> &'static str {
    match side {
        Side::Left => "LTOE",
        Side::Right => "RTOE",
    }
}

/// Recording setting, which fixes the lab's axis conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarkerTrialType {
    Treadmill,
    Overground,
}

/// Anterior-posterior axis convention of a recording setting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisConvention {
    /// Column of the anterior-posterior coordinate.
    pub ap_axis: usize,
    /// +1 when walking runs along the positive axis, -1 otherwise.
    pub direction: f64,
    /// Express foot positions relative to the pelvis and correct for walking
    /// direction using pelvis velocity.
    pub pelvis_relative: bool,
}

impl MarkerTrialType {
    /// Axis convention table.
    pub const fn convention(self) -> AxisConvention {
        match self {
            MarkerTrialType::Treadmill => AxisConvention {
                ap_axis: 1,
                direction: -1.0,
                pelvis_relative: false,
            },
            MarkerTrialType::Overground => AxisConvention {
                ap_axis: 0,
                direction: 1.0,
                pelvis_relative: true,
            },
        }
    }
}

/// Selector of the built-in detection strategies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkerEventAlgorithm {
    #[default]
    Velocity,
    Coordinate,
    Smk,
    Pijnappels,
}

impl MarkerEventAlgorithm {
    pub fn strategy(self) -> Box<dyn MarkerEventStrategy> {
        match self {
            MarkerEventAlgorithm::Velocity => Box::new(VelocityStrategy),
            MarkerEventAlgorithm::Coordinate => Box::new(CoordinateStrategy),
            MarkerEventAlgorithm::Smk => Box::new(SmkStrategy),
            MarkerEventAlgorithm::Pijnappels => Box::new(PijnappelsStrategy),
        }
    }
}

/// Configuration for marker-based event detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerEventConfig {
    /// Detection strategy.
    pub algorithm: MarkerEventAlgorithm,
    /// Low-pass applied to foot markers.
    pub filter: FilterSpec,
    /// Heel must be below this height at heel-strike (mm). Calibrated per lab.
    pub heel_height_max_mm: f64,
    /// Toe must be below this height at toe-off (mm). Calibrated per lab.
    pub toe_height_max_mm: f64,
    /// AP velocities above this magnitude are marker swaps (mm/frame).
    pub velocity_outlier_mm: f64,
    /// Prominence for heel-height and coordinate peak finding (mm).
    pub reference_prominence_mm: f64,
    /// Minimum event spacing as a fraction of the median heel-height peak interval.
    pub spacing_fraction: f64,
    /// Events within this many frames of either end are dropped.
    pub edge_margin: usize,
}

impl Default for MarkerEventConfig {
    fn default() -> Self {
        Self {
            algorithm: MarkerEventAlgorithm::Velocity,
            filter: FilterSpec::new(2, 15.0),
            heel_height_max_mm: 120.0,     // Heel near floor
            toe_height_max_mm: 100.0,      // Toe near floor
            velocity_outlier_mm: 100.0,    // 10 m/s at 100 Hz
            reference_prominence_mm: 60.0,
            spacing_fraction: 0.6,
            edge_margin: 50,               // 0.5 s at 100 Hz
        }
    }
}

/// Filtered markers of one foot.
#[derive(Debug, Clone)]
pub struct FootMarkers {
    pub heel: Vec<Vec3>,
    pub toe: Vec<Vec3>,
}

/// Shared inputs handed to every strategy.
#[derive(Debug, Clone)]
pub struct DetectionContext<'a> {
    pub config: &'a MarkerEventConfig,
    pub convention: AxisConvention,
    /// Pelvis reference: mean of LPSI/RPSI, sentinel where either is missing.
    pub sacrum: &'a [Vec3],
    /// `[0, diff(direction * sacrum_ap)]`.
    pub sacrum_velocity: &'a [f64],
    /// Minimum spacing between events of one type (frames). `None` when the
    /// reference peak pass found fewer than two heel-height peaks.
    pub min_spacing: Option<f64>,
}

/// One marker-based detection algorithm.
pub trait MarkerEventStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Raw `(initial_contact, terminal_contact)` candidates for one foot,
    /// before common post-processing.
    fn detect_foot(&self, foot: &FootMarkers, ctx: &DetectionContext<'_>) -> (Vec<usize>, Vec<usize>);
}

/// Runs a strategy over both feet and applies common post-processing.
#[derive(Debug, Clone, Default)]
pub struct MarkerEventDetector {
    config: MarkerEventConfig,
}

impl MarkerEventDetector {
    pub fn new(config: MarkerEventConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MarkerEventConfig {
        &self.config
    }

    /// Detect events with the configured algorithm.
    pub fn detect(&self, markers: &MarkerTrajectories, trial_type: MarkerTrialType) -> Result<GaitEvents> {
        let strategy = self.config.algorithm.strategy();
        self.detect_with(strategy.as_ref(), markers, trial_type)
    }

    /// Detect events with an explicit strategy.
    pub fn detect_with(
        &self,
        strategy: &dyn MarkerEventStrategy,
        markers: &MarkerTrajectories,
        trial_type: MarkerTrialType,
    ) -> Result<GaitEvents> {
        let convention = trial_type.convention();
        let filter = self.config.filter.design(markers.sample_rate)?;

        let lpsi = markers.marker(LPSI)?;
        let rpsi = markers.marker(RPSI)?;
        let sacrum = pelvis_reference(lpsi, rpsi);
        let sacrum_ap: Vec<f64> = sacrum
            .iter()
            .map(|v| convention.direction * v[convention.ap_axis])
            .collect();
        let sacrum_velocity = padded_diff(&sacrum_ap);

        let mut feet = Vec::with_capacity(2);
        for side in Side::BOTH {
            let heel = filtfilt_marker(&filter, markers.marker(heel_label(side))?)?;
            let toe = filtfilt_marker(&filter, markers.marker(toe_label(side))?)?;
            feet.push((side, FootMarkers { heel, toe }));
        }

        // Event spacing from the left heel-height rhythm.
        let left_heel_z: Vec<f64> = feet[0].1.heel.iter().map(|v| v[2]).collect();
        let reference = find_peaks(
            &left_heel_z,
            &PeakCriteria::new().prominence(self.config.reference_prominence_mm),
        );
        let min_spacing = if reference.len() >= 2 {
            Some(self.config.spacing_fraction * median_duration(&diff_indices(&reference), 1.0))
        } else {
            None
        };

        let ctx = DetectionContext {
            config: &self.config,
            convention,
            sacrum: &sacrum,
            sacrum_velocity: &sacrum_velocity,
            min_spacing,
        };

        let mut events = GaitEvents::default();
        for (side, foot) in &feet {
            let (ic, tc) = strategy.detect_foot(foot, &ctx);
            let (ic, tc) = self.post_process(ic, tc, foot.heel.len(), markers, *side)?;
            debug!(
                algorithm = strategy.name(),
                side = side.label(),
                initial_contacts = ic.len(),
                terminal_contacts = tc.len(),
                "marker events detected"
            );
            *events.foot_mut(*side) = FootEvents::from_contacts(ic, tc);
        }
        Ok(events)
    }

    // ===== PRIVATE METHODS =====

    fn post_process(
        &self,
        mut ic: Vec<usize>,
        mut tc: Vec<usize>,
        len: usize,
        markers: &MarkerTrajectories,
        side: Side,
    ) -> Result<(Vec<usize>, Vec<usize>)> {
        let margin = self.config.edge_margin;
        let upper = len.saturating_sub(margin);
        tc.retain(|&i| i > margin && i < upper);
        ic.retain(|&i| i > margin && i < upper);

        // Contacts must be bracketed by the complementary event type.
        match tc.first().copied() {
            Some(first_tc) => ic.retain(|&i| i > first_tc),
            None => ic.clear(),
        }
        match ic.last().copied() {
            Some(last_ic) => tc.retain(|&i| i < last_ic),
            None => tc.clear(),
        }

        let references = [
            markers.marker(LPSI)?,
            markers.marker(RPSI)?,
            markers.marker(heel_label(side))?,
            markers.marker(toe_label(side))?,
        ];
        let visible = |i: &usize| {
            references
                .iter()
                .all(|m| m.get(*i).is_some_and(|s| !MarkerTrajectories::is_missing(s)))
        };
        ic.retain(visible);
        tc.retain(visible);

        ic.sort_unstable();
        ic.dedup();
        tc.sort_unstable();
        tc.dedup();
        Ok((ic, tc))
    }
}

/// Mean of the two posterior iliac spine markers; sentinel where either is missing.
pub fn pelvis_reference(lpsi: &[Vec3], rpsi: &[Vec3]) -> Vec<Vec3> {
    lpsi.iter()
        .zip(rpsi)
        .map(|(l, r)| {
            if MarkerTrajectories::is_missing(l) || MarkerTrajectories::is_missing(r) {
                [0.0; 3]
            } else {
                [(l[0] + r[0]) / 2.0, (l[1] + r[1]) / 2.0, (l[2] + r[2]) / 2.0]
            }
        })
        .collect()
}

/// AP heel/toe velocity sign changes (default algorithm).
#[derive(Debug, Clone, Copy, Default)]
pub struct VelocityStrategy;

impl VelocityStrategy {
    fn ap_velocity(&self, marker: &[Vec3], ctx: &DetectionContext<'_>) -> Vec<f64> {
        let conv = ctx.convention;
        let ap: Vec<f64> = marker
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let mut p = v[conv.ap_axis];
                if conv.pelvis_relative {
                    p -= ctx.sacrum.get(i).map_or(0.0, |s| s[conv.ap_axis]);
                }
                conv.direction * p
            })
            .collect();

        let mut vel = padded_diff(&ap);
        for (i, v) in vel.iter_mut().enumerate() {
            if conv.pelvis_relative && ctx.sacrum_velocity.get(i).is_some_and(|s| *s < 0.0) {
                *v = -*v;
            }
            if v.abs() > ctx.config.velocity_outlier_mm {
                *v = 0.0;
            }
        }
        vel
    }
}

impl MarkerEventStrategy for VelocityStrategy {
    fn name(&self) -> &'static str {
        "velocity"
    }

    fn detect_foot(&self, foot: &FootMarkers, ctx: &DetectionContext<'_>) -> (Vec<usize>, Vec<usize>) {
        let Some(spacing) = ctx.min_spacing else {
            return (Vec::new(), Vec::new());
        };
        let heel_vel = self.ap_velocity(&foot.heel, ctx);
        let toe_vel = self.ap_velocity(&foot.toe, ctx);

        // Heel-strike: AP velocity turns negative with the heel near the floor.
        let ic = closest_to_crossing(&heel_vel, spacing, |i, v| {
            v < 0.0 && foot.heel[i][2] < ctx.config.heel_height_max_mm
        });
        // Toe-off: AP velocity turns positive with the toe near the floor.
        let tc = closest_to_crossing(&toe_vel, spacing, |i, v| {
            v > 0.0 && foot.toe[i][2] < ctx.config.toe_height_max_mm
        });
        (ic, tc)
    }
}

/// Extrema of pelvis-relative AP position.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoordinateStrategy;

impl MarkerEventStrategy for CoordinateStrategy {
    fn name(&self) -> &'static str {
        "coordinate"
    }

    fn detect_foot(&self, foot: &FootMarkers, ctx: &DetectionContext<'_>) -> (Vec<usize>, Vec<usize>) {
        let conv = ctx.convention;
        let relative = |marker: &[Vec3], sign: f64| -> Vec<f64> {
            marker
                .iter()
                .zip(ctx.sacrum)
                .map(|(m, s)| sign * conv.direction * (m[conv.ap_axis] - s[conv.ap_axis]))
                .collect()
        };
        let criteria = PeakCriteria::new().prominence(ctx.config.reference_prominence_mm);

        // Heel most anterior at heel-strike, toe most posterior at toe-off.
        let mut ic = find_peaks(&relative(&foot.heel, 1.0), &criteria);
        let mut tc = find_peaks(&relative(&foot.toe, -1.0), &criteria);

        if let Some(&first_tc) = tc.first() {
            ic.retain(|&i| i >= first_tc);
        }
        if let Some(&last_ic) = ic.last() {
            tc.retain(|&i| i <= last_ic);
        }
        (ic, tc)
    }
}

/// Vertical heel/toe velocity sign changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmkStrategy;

impl MarkerEventStrategy for SmkStrategy {
    fn name(&self) -> &'static str {
        "SMK"
    }

    fn detect_foot(&self, foot: &FootMarkers, ctx: &DetectionContext<'_>) -> (Vec<usize>, Vec<usize>) {
        let Some(spacing) = ctx.min_spacing else {
            return (Vec::new(), Vec::new());
        };
        let heel_vz = diff(&foot.heel.iter().map(|v| v[2]).collect::<Vec<_>>());
        let toe_vz = diff(&foot.toe.iter().map(|v| v[2]).collect::<Vec<_>>());

        // Rising vertical velocity; the sample with the larger magnitude wins.
        let ic = rising_crossings(&heel_vz, spacing);
        let tc = rising_crossings(&toe_vz, spacing);
        (ic, tc)
    }
}

/// Peaks of vertical toe (contact) and heel (lift) velocity.
#[derive(Debug, Clone, Copy, Default)]
pub struct PijnappelsStrategy;

impl MarkerEventStrategy for PijnappelsStrategy {
    fn name(&self) -> &'static str {
        "pijnappels"
    }

    fn detect_foot(&self, foot: &FootMarkers, ctx: &DetectionContext<'_>) -> (Vec<usize>, Vec<usize>) {
        let Some(spacing) = ctx.min_spacing else {
            return (Vec::new(), Vec::new());
        };
        let criteria = PeakCriteria::new().distance(spacing);
        let toe_vz = diff(&foot.toe.iter().map(|v| v[2]).collect::<Vec<_>>());
        let heel_vz = diff(&foot.heel.iter().map(|v| v[2]).collect::<Vec<_>>());

        let falling_toe: Vec<f64> = toe_vz.iter().map(|v| -v).collect();
        let ic = find_peaks(&falling_toe, &criteria);
        let tc = find_peaks(&heel_vz, &criteria);
        (ic, tc)
    }
}

// ===== SHARED CROSSING LOGIC =====

/// Sign changes accepted by `accept(index, value)`, at least `spacing`
/// frames after the previous event. At each crossing the bracketing sample
/// with the smaller magnitude is reported; on a tie the post-crossing sample.
fn closest_to_crossing(
    vel: &[f64],
    spacing: f64,
    accept: impl Fn(usize, f64) -> bool,
) -> Vec<usize> {
    let mut events = Vec::new();
    let mut last = 0usize;
    for i in 1..vel.len() {
        if sign(vel[i]) == sign(vel[i - 1]) {
            continue;
        }
        if !accept(i, vel[i]) || (i as f64) <= last as f64 + spacing {
            continue;
        }
        let chosen = if vel[i].abs() <= vel[i - 1].abs() { i } else { i - 1 };
        events.push(chosen);
        last = chosen;
    }
    events
}

/// Rising sign changes of a velocity series, keeping the larger-magnitude
/// sample of each crossing pair.
fn rising_crossings(vel: &[f64], spacing: f64) -> Vec<usize> {
    let mut events = Vec::new();
    let mut last = 0usize;
    for i in 1..vel.len() {
        let changed = sign(vel[i]) != sign(vel[i - 1]);
        if !changed || vel[i] <= 0.0 || (i as f64) <= last as f64 + spacing {
            continue;
        }
        let chosen = if vel[i].abs() > vel[i - 1].abs() { i } else { i - 1 };
        events.push(chosen);
        last = chosen;
    }
    events
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
