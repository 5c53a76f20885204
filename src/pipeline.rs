/// Trial-level gait analysis pipelines.
///
/// This module orchestrates the stages from synchronized sensor streams (or
/// marker trajectories) to a [`TrialSummary`] of named parameters.
///
/// # Architecture
///
/// The IMU pipeline runs, per trial:
/// 1. **Event detection**: foot gyroscope/accelerometer events, contralateral aliases
/// 2. **Temporal parameters**: walking bout, cadence, swing/stance/step/double support
/// 3. **Turns**: trunk yaw-rate turn segments, optional event exclusion around turns
/// 4. **Phases**: per-sample gait phase masks
/// 5. **Trajectories**: zero-velocity-update integration of foot acceleration
/// 6. **Spatial parameters**: stride length, steady-state strides, gait speed
/// 7. **Trunk and foot kinematics**: turn peaks, trunk range of motion, foot angles
/// 8. **Transfers**: sit-to-stand detection and lean angle for transfer trials
///
/// The marker pipeline runs event detection, temporal parameters and the
/// lab-specific stride parameters.
///
/// Each trial's state lives in a [`TrialContext`] threaded through the stages.
/// Soft findings become [`TrialFlags`]; hard errors end the trial and are
/// kept on its [`TrialOutcome`] so a batch always completes.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{GaitError, Result, TrialFlags};
use crate::filtering::FilterSpec;
use crate::imu_events::{exclude_turns, ImuEventConfig, ImuEventDetector};
use crate::kinematics::{steady_state_mask, FootAngleParameters, KinematicsConfig, TrunkRangeOfMotion};
use crate::marker_events::{MarkerEventConfig, MarkerEventDetector, MarkerTrialType};
use crate::marker_spatiotemporal::{MarkerSpatiotemporalConfig, MarkerSpatiotemporals};
use crate::matching::MatchingConfig;
use crate::orientation::euler_series;
use crate::phases::{GaitPhase, GaitPhases};
use crate::spatiotemporal::{implausible_sample_rate, SpatiotemporalConfig, TemporalParameters, WalkingActivity};
use crate::stats::{nanmean, round_to};
use crate::trajectory::{integrate_velocity, stationary_mask, DriftCorrection, FootTrajectory, SpatialParameters, TrajectoryConfig};
use crate::transfers::{TransferConfig, TransferDetector, TransferParameters};
use crate::turns::{SteadyStatePolicy, TurnConfig, TurnDetector, TurnParameters};
use crate::types::{
    GaitEvents, ImuRecording, ImuSensorData, MarkerTrajectories, SensorLocation, Side, TrialKind,
    TrialSummary, TurnSegment, Vec3,
};

/// Configuration for the complete analysis.
///
/// Bundles all stage configurations so one JSON document can configure a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// IMU gait event detection.
    pub imu_events: ImuEventConfig,

    /// Marker gait event detection.
    pub marker_events: MarkerEventConfig,

    /// Walking bout and sample-rate sanity thresholds.
    pub spatiotemporal: SpatiotemporalConfig,

    /// Zero-velocity update and stride filtering.
    pub trajectory: TrajectoryConfig,

    /// Turn identification.
    pub turns: TurnConfig,

    /// Sit-to-stand transfer detection.
    pub transfers: TransferConfig,

    /// Trunk range of motion and foot angles.
    pub kinematics: KinematicsConfig,

    /// Marker-based stride parameters.
    pub marker_spatiotemporal: MarkerSpatiotemporalConfig,

    /// Cross-modality matching window.
    pub matching: MatchingConfig,

    /// Remove IMU events around turns before computing parameters.
    /// `None` keeps every detected event.
    pub turn_exclusion: Option<SteadyStatePolicy>,
}

impl PipelineConfig {
    /// Parse a JSON document; absent fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| GaitError::config(format!("malformed pipeline configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| GaitError::config(e.to_string()))
    }

    /// Check every threshold for a usable value.
    pub fn validate(&self) -> Result<()> {
        let filters = [
            ("imu_events.gyro_filter", self.imu_events.gyro_filter),
            ("imu_events.accel_filter", self.imu_events.accel_filter),
            ("marker_events.filter", self.marker_events.filter),
            ("turns.yaw_rate_filter", self.turns.yaw_rate_filter),
            ("transfers.gyro_filter", self.transfers.gyro_filter),
            ("kinematics.angle_filter", self.kinematics.angle_filter),
            ("marker_spatiotemporal.ankle_filter", self.marker_spatiotemporal.ankle_filter),
            ("marker_spatiotemporal.velocity_filter", self.marker_spatiotemporal.velocity_filter),
        ];
        for (name, spec) in filters {
            check_filter(name, spec)?;
        }

        let positive = [
            ("imu_events.mid_swing_min_interval_s", self.imu_events.mid_swing_min_interval_s),
            ("marker_events.heel_height_max_mm", self.marker_events.heel_height_max_mm),
            ("marker_events.toe_height_max_mm", self.marker_events.toe_height_max_mm),
            ("spatiotemporal.walking_gap_s", self.spatiotemporal.walking_gap_s),
            ("trajectory.min_stride_m", self.trajectory.min_stride_m),
            ("trajectory.max_stride_factor", self.trajectory.max_stride_factor),
            ("trajectory.stride_time_outlier_factor", self.trajectory.stride_time_outlier_factor),
            ("turns.activation_deg_s", self.turns.activation_deg_s),
            ("turns.boundary_deg_s", self.turns.boundary_deg_s),
            ("turns.max_duration_s", self.turns.max_duration_s),
            ("transfers.baseline_s", self.transfers.baseline_s),
            ("kinematics.gimbal_jump_deg", self.kinematics.gimbal_jump_deg),
            ("marker_spatiotemporal.max_phase_s", self.marker_spatiotemporal.max_phase_s),
            ("marker_spatiotemporal.min_cycle_s", self.marker_spatiotemporal.min_cycle_s),
            ("matching.window_s", self.matching.window_s),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(GaitError::config(format!("{name} must be positive, got {value}")));
            }
        }

        let fractions = [
            ("imu_events.toe_off_window_start", self.imu_events.toe_off_window_start),
            ("imu_events.terminal_swing_window", self.imu_events.terminal_swing_window),
            ("imu_events.terminal_swing_fraction", self.imu_events.terminal_swing_fraction),
            ("marker_events.spacing_fraction", self.marker_events.spacing_fraction),
            ("turns.peak_fraction", self.turns.peak_fraction),
            ("marker_spatiotemporal.belt_window_start", self.marker_spatiotemporal.belt_window_start),
            ("marker_spatiotemporal.belt_window_end", self.marker_spatiotemporal.belt_window_end),
        ];
        for (name, value) in fractions {
            if !(0.0..=1.0).contains(&value) {
                return Err(GaitError::config(format!("{name} must lie in [0, 1], got {value}")));
            }
        }
        let m = &self.marker_spatiotemporal;
        if m.belt_window_start >= m.belt_window_end {
            return Err(GaitError::config("belt window must start before it ends"));
        }
        if m.min_stride_mm >= m.max_stride_mm {
            return Err(GaitError::config("marker stride bounds are inverted"));
        }
        Ok(())
    }
}

/// Final result of one trial.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrialOutcome {
    /// Named parameters; empty when the trial failed.
    pub summary: TrialSummary,
    pub flags: TrialFlags,
    /// Events used for the parameters (after any turn exclusion).
    pub events: GaitEvents,
    /// Per-sample phases; IMU trials only.
    #[serde(skip)]
    pub phases: Option<GaitPhases>,
    pub turns: Vec<TurnSegment>,
    /// Hard failure that ended the trial.
    #[serde(skip)]
    pub error: Option<GaitError>,
}

impl TrialOutcome {
    /// Outcome of a trial that stopped on an error. Missing data is reported
    /// as a missing walking period rather than a fault.
    pub fn failed(error: GaitError) -> Self {
        let mut flags = TrialFlags::default();
        if error.is_missing_data() {
            flags.no_walking_period = true;
            warn!(%error, "Trial has no usable walking period");
        } else {
            warn!(%error, "Trial processing failed");
        }
        Self {
            flags,
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// JSON snapshot of the summary, flags, events and turns.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| GaitError::Numerical(e.to_string()))
    }
}

/// Mutable state of one IMU trial as it moves through the stages.
#[derive(Debug, Clone, Default)]
pub struct TrialContext {
    pub sample_rate: f64,
    /// Samples common to both feet.
    pub len: usize,
    pub events: GaitEvents,
    pub activity: WalkingActivity,
    pub temporal: TemporalParameters,
    pub turns: Vec<TurnSegment>,
    pub phases: GaitPhases,
    pub left: FootTrajectory,
    pub right: FootTrajectory,
    /// Foot velocity with linear drift correction, kept next to the configured method.
    pub left_velocity_linear: Vec<Vec3>,
    pub right_velocity_linear: Vec<Vec3>,
    pub spatial: SpatialParameters,
    pub turn_parameters: Option<TurnParameters>,
    pub trunk_rom: Option<TrunkRangeOfMotion>,
    pub foot_angles: FootAngleParameters,
    pub transfers: Option<TransferParameters>,
    pub summary: TrialSummary,
    pub flags: TrialFlags,
}

impl TrialContext {
    fn new(recording: &ImuRecording, len: usize) -> Self {
        Self {
            sample_rate: recording.sample_rate,
            len,
            flags: TrialFlags {
                high_missing_samples: recording.high_missing_samples,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn walking(&self) -> bool {
        !self.flags.no_walking_period
    }

    pub fn into_outcome(self) -> TrialOutcome {
        TrialOutcome {
            summary: self.summary,
            flags: self.flags,
            events: self.events,
            phases: Some(self.phases),
            turns: self.turns,
            error: None,
        }
    }
}

/// Complete IMU trial processor.
#[derive(Debug, Clone, Default)]
pub struct ImuTrialPipeline {
    config: PipelineConfig,
    events: ImuEventDetector,
    turns: TurnDetector,
    transfers: TransferDetector,
}

impl ImuTrialPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            events: ImuEventDetector::new(config.imu_events.clone()),
            turns: TurnDetector::new(config.turns.clone()),
            transfers: TransferDetector::new(config.transfers.clone()),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process one trial; never fails.
    pub fn run(&self, recording: &ImuRecording) -> TrialOutcome {
        info!(
            sample_rate = recording.sample_rate,
            trial_kind = ?recording.trial_kind,
            "Processing IMU trial"
        );
        let outcome = match self.process(recording) {
            Ok(ctx) => ctx.into_outcome(),
            Err(error) => TrialOutcome::failed(error),
        };
        info!(
            parameters = outcome.summary.len(),
            flags = ?outcome.flags.raised(),
            "IMU trial finished"
        );
        outcome
    }

    /// Process independent trials in parallel. Output order matches input order.
    pub fn process_batch(&self, recordings: &[ImuRecording]) -> Vec<TrialOutcome> {
        recordings.par_iter().map(|r| self.run(r)).collect()
    }

    /// Run every stage and return the full trial state.
    pub fn process(&self, recording: &ImuRecording) -> Result<TrialContext> {
        recording.validate()?;
        let fs = recording.sample_rate;
        let left_foot = recording.sensor(Side::Left.foot_sensor())?;
        let right_foot = recording.sensor(Side::Right.foot_sensor())?;
        let len = left_foot.len().min(right_foot.len());

        let mut ctx = TrialContext::new(recording, len);
        ctx.events = self.events.detect(recording)?;
        if ctx.events.left.initial_contact.is_empty() && ctx.events.right.initial_contact.is_empty() {
            ctx.flags.no_walking_period = true;
            warn!("No walking period detected; event-derived parameters are not available");
        }

        ctx.temporal = TemporalParameters::compute(&ctx.events, fs);
        self.identify_turns(recording, &mut ctx)?;
        if let Some(policy) = self.config.turn_exclusion {
            exclude_turns(&mut ctx.events, &ctx.turns, Some(policy));
            ctx.temporal = TemporalParameters::compute(&ctx.events, fs);
        }
        ctx.activity = WalkingActivity::compute(&ctx.events, len, fs, &self.config.spatiotemporal);
        ctx.phases = GaitPhases::segment(&ctx.events, len);

        self.estimate_trajectories(left_foot, right_foot, &mut ctx)?;
        ctx.spatial = SpatialParameters::compute(
            &ctx.left.position,
            &ctx.right.position,
            &ctx.events,
            &ctx.turns,
            fs,
            &self.config.trajectory,
        );
        if ctx.walking() && ctx.spatial.no_steady_state {
            ctx.flags.no_steady_state_gait = true;
        }

        self.trunk_kinematics(recording, &mut ctx)?;
        ctx.foot_angles = FootAngleParameters::compute(
            [&pitch(left_foot), &pitch(right_foot)],
            &ctx.events,
            [&ctx.phases.left, &ctx.phases.right],
        );
        self.detect_transfers(recording, &mut ctx)?;

        if ctx.walking() {
            ctx.flags.implausible_sample_rate =
                implausible_sample_rate(ctx.spatial.gait_speed_kmh, &ctx.temporal, &self.config.spatiotemporal);
        }
        self.summarize(recording, &mut ctx);
        Ok(ctx)
    }

    // ===== PRIVATE METHODS =====

    fn identify_turns(&self, recording: &ImuRecording, ctx: &mut TrialContext) -> Result<()> {
        let Ok((location, trunk)) = recording.trunk_for_turns() else {
            debug!("No trunk sensor; turns not identified");
            return Ok(());
        };
        let step_time = nanmean(&[ctx.temporal.left.step_time_s, ctx.temporal.right.step_time_s]);
        ctx.turns = self.turns.detect(trunk, ctx.sample_rate, step_time)?;
        debug!(?location, turns = ctx.turns.len(), "Turns identified");
        Ok(())
    }

    fn estimate_trajectories(
        &self,
        left_foot: &ImuSensorData,
        right_foot: &ImuSensorData,
        ctx: &mut TrialContext,
    ) -> Result<()> {
        let fs = ctx.sample_rate;
        let cfg = &self.config.trajectory;
        for side in Side::BOTH {
            let sensor = match side {
                Side::Left => left_foot,
                Side::Right => right_foot,
            };
            let acc = &sensor.acc_earth[..ctx.len.min(sensor.acc_earth.len())];
            let mid_stance = ctx.phases.foot(side).indices(GaitPhase::MidStance);
            let stationary = stationary_mask(&mid_stance, &ctx.activity.non_active, acc.len(), cfg.stationary_gap_tolerance);
            let linear = integrate_velocity(acc, &stationary, fs, DriftCorrection::Linear)?;
            let trajectory = FootTrajectory::estimate(acc, stationary, fs, cfg.drift_correction)?;
            match side {
                Side::Left => {
                    ctx.left = trajectory;
                    ctx.left_velocity_linear = linear;
                }
                Side::Right => {
                    ctx.right = trajectory;
                    ctx.right_velocity_linear = linear;
                }
            }
        }
        Ok(())
    }

    fn trunk_kinematics(&self, recording: &ImuRecording, ctx: &mut TrialContext) -> Result<()> {
        let fs = ctx.sample_rate;
        if let Ok((_, trunk)) = recording.trunk_for_turns() {
            ctx.turn_parameters = Some(TurnParameters::compute(
                &ctx.turns,
                &trunk.gyro,
                &euler_series(&trunk.orientation),
                &self.config.turns,
            ));
        }
        if let Ok(sternum) = recording.sensor(SensorLocation::Sternum) {
            let euler = euler_series(&sternum.orientation);
            let steady = &ctx.spatial.no_two_steps;
            let mask = steady_state_mask(euler.len(), &ctx.turns, steady);
            ctx.trunk_rom = Some(TrunkRangeOfMotion::compute(
                &euler,
                &mask,
                steady,
                ctx.temporal.left.stride_time_s,
                fs,
                &self.config.kinematics,
            )?);
        }
        Ok(())
    }

    fn detect_transfers(&self, recording: &ImuRecording, ctx: &mut TrialContext) -> Result<()> {
        let Some(kind) = recording.trial_kind.filter(|k| k.has_transfers()) else {
            return Ok(());
        };
        let transfers = match self.transfers.detect(recording) {
            Ok(transfers) => transfers,
            Err(error @ GaitError::MissingSensor(_)) => {
                warn!(%error, ?kind, "Transfers not analysed");
                return Ok(());
            }
            Err(error) => return Err(error),
        };
        let params = TransferParameters::new(transfers);
        ctx.flags.trial_type_mismatch = params.trial_type_mismatch();
        ctx.transfers = Some(params);
        Ok(())
    }

    fn summarize(&self, recording: &ImuRecording, ctx: &mut TrialContext) {
        let mut summary = TrialSummary::new();
        ctx.activity.record(&mut summary);
        ctx.temporal.record(&mut summary);
        ctx.spatial.record(&mut summary);
        if let Some(turns) = &ctx.turn_parameters {
            turns.record(&mut summary);
        }
        if let Some(rom) = &ctx.trunk_rom {
            rom.record(&mut summary);
        }
        ctx.foot_angles.record(&mut summary);
        if let Some(transfers) = &ctx.transfers {
            transfers.record(&mut summary);
            if recording.trial_kind == Some(TrialKind::LTest) {
                let transfer_samples: usize = transfers.transfers.iter().map(|t| t.end - t.start).sum();
                let duration = ctx.activity.walking_time_s + transfer_samples as f64 / ctx.sample_rate;
                summary.set_scalar("L-test time (s)", round_to(duration, 2));
            }
        }
        ctx.summary = summary;
    }
}

/// Complete marker trial processor.
#[derive(Debug, Clone, Default)]
pub struct MarkerTrialPipeline {
    config: PipelineConfig,
    events: MarkerEventDetector,
}

impl MarkerTrialPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            events: MarkerEventDetector::new(config.marker_events.clone()),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process one trial; never fails.
    pub fn run(&self, markers: &MarkerTrajectories, trial_type: MarkerTrialType) -> TrialOutcome {
        info!(frame_rate = markers.sample_rate, ?trial_type, "Processing marker trial");
        match self.process(markers, trial_type) {
            Ok(outcome) => outcome,
            Err(error) => TrialOutcome::failed(error),
        }
    }

    /// Process independent trials in parallel. Output order matches input order.
    pub fn process_batch(&self, trials: &[(MarkerTrajectories, MarkerTrialType)]) -> Vec<TrialOutcome> {
        trials.par_iter().map(|(m, t)| self.run(m, *t)).collect()
    }

    pub fn process(&self, markers: &MarkerTrajectories, trial_type: MarkerTrialType) -> Result<TrialOutcome> {
        if !(markers.sample_rate.is_finite() && markers.sample_rate > 0.0) {
            return Err(GaitError::config(format!(
                "frame rate must be positive, got {}",
                markers.sample_rate
            )));
        }
        if markers.frame_count() == 0 {
            return Err(GaitError::EmptyInput("marker trajectories".into()));
        }
        let events = self.events.detect(markers, trial_type)?;
        let mut flags = TrialFlags::default();
        if events.left.initial_contact.is_empty() && events.right.initial_contact.is_empty() {
            flags.no_walking_period = true;
            warn!("No heel-strikes detected in marker trial");
        }

        let mut summary = TrialSummary::new();
        TemporalParameters::compute(&events, markers.sample_rate).record(&mut summary);
        MarkerSpatiotemporals::compute(markers, &events, trial_type, &self.config.marker_spatiotemporal)?
            .record(&mut summary);

        Ok(TrialOutcome {
            summary,
            flags,
            events,
            ..Default::default()
        })
    }
}

// ===== PRIVATE HELPERS =====

fn check_filter(name: &str, spec: FilterSpec) -> Result<()> {
    if spec.order == 0 || !(spec.cutoff_hz.is_finite() && spec.cutoff_hz > 0.0) {
        return Err(GaitError::config(format!(
            "{name} needs a positive order and cutoff, got order {} at {} Hz",
            spec.order, spec.cutoff_hz
        )));
    }
    Ok(())
}

/// Euler pitch (deg) of a foot sensor.
fn pitch(sensor: &ImuSensorData) -> Vec<f64> {
    euler_series(&sensor.orientation).iter().map(|e| e[1]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_config_default_validates() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.turn_exclusion.is_none());
        assert_eq!(config.matching.window_s, 0.2);
    }

    #[test]
    fn test_pipeline_config_partial_json() {
        let json = r#"{ "turns": { "activation_deg_s": 60.0 }, "turn_exclusion": "NoOneStep" }"#;
        let config = PipelineConfig::from_json_str(json).unwrap();
        assert_eq!(config.turns.activation_deg_s, 60.0);
        assert_eq!(config.turns.boundary_deg_s, 5.0, "absent fields keep defaults");
        assert_eq!(config.turn_exclusion, Some(SteadyStatePolicy::NoOneStep));
    }

    #[test]
    fn test_pipeline_config_json_round_trip() {
        let config = PipelineConfig::default();
        let json = config.to_json_string().unwrap();
        let back = PipelineConfig::from_json_str(&json).unwrap();
        assert_eq!(back.trajectory.min_stride_m, config.trajectory.min_stride_m);
        assert_eq!(back.marker_events.heel_height_max_mm, 120.0);
    }

    #[test]
    fn test_pipeline_config_rejects_bad_values() {
        let mut config = PipelineConfig::default();
        config.turns.peak_fraction = 1.5;
        assert!(config.validate().is_err(), "fraction above one accepted");

        let mut config = PipelineConfig::default();
        config.imu_events.gyro_filter = FilterSpec::new(2, 0.0);
        assert!(config.validate().is_err(), "zero cutoff accepted");

        assert!(
            PipelineConfig::from_json_str("{ not json").is_err(),
            "malformed JSON accepted"
        );
        assert!(ImuTrialPipeline::new(PipelineConfig {
            matching: MatchingConfig { window_s: -1.0 },
            ..Default::default()
        })
        .is_err());
    }

    #[test]
    fn test_missing_foot_sensor_flags_no_walking() {
        let recording = ImuRecording::new(100.0, TrialKind::TwoMinuteWalk);
        let outcome = ImuTrialPipeline::default().run(&recording);
        assert!(!outcome.is_ok());
        assert!(outcome.flags.no_walking_period, "missing sensor is missing data");
        assert!(matches!(outcome.error, Some(GaitError::MissingSensor(SensorLocation::LeftFoot))));
    }

    #[test]
    fn test_bad_sample_rate_is_hard_failure() {
        let recording = ImuRecording::new(0.0, TrialKind::TwoMinuteWalk);
        let outcome = ImuTrialPipeline::default().run(&recording);
        assert!(matches!(outcome.error, Some(GaitError::InvalidConfig(_))));
        assert!(!outcome.flags.no_walking_period, "configuration fault is not missing data");
    }

    #[test]
    fn test_empty_marker_trial_fails_softly() {
        let outcome = MarkerTrialPipeline::default().run(&MarkerTrajectories::new(100.0), MarkerTrialType::Overground);
        assert!(outcome.flags.no_walking_period);
        assert!(outcome.summary.is_empty());
    }

    #[test]
    fn test_outcome_json_skips_error() {
        let outcome = TrialOutcome::failed(GaitError::EmptyInput("test".into()));
        let json = outcome.to_json().unwrap();
        assert!(json.contains("no_walking_period"));
        assert!(!json.contains("EmptyInput"));
    }
}
