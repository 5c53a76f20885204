//! Core data types for gait analysis.
//!
//! This module defines the input contracts (IMU recordings, marker
//! trajectories), the event and stride structures passed between stages,
//! and the trial-level output mapping.
//!
//! Design principle: if a concept exists, it gets a type. Event indices are
//! `usize` sample indices into the trial's common time base; derived scalars
//! use `f64::NAN` for "not available", never zero.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{GaitError, Result};
use crate::orientation::{self, Quaternion};

/// Three-component sample (x, y, z).
pub type Vec3 = [f64; 3];

/// Foot side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// Both sides, left first.
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    /// The contralateral side.
    pub fn opposite(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    /// Lowercase label used in parameter names.
    pub fn label(self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }

    /// Foot sensor on this side.
    pub fn foot_sensor(self) -> SensorLocation {
        match self {
            Side::Left => SensorLocation::LeftFoot,
            Side::Right => SensorLocation::RightFoot,
        }
    }
}

/// Body location of an inertial sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SensorLocation {
    LeftFoot,
    RightFoot,
    Lumbar,
    Sternum,
}

/// Protocol of a recorded trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrialKind {
    /// Two-minute overground walk test.
    TwoMinuteWalk,
    /// L-test: sit, walk an L-shaped course, sit.
    LTest,
    /// Repeated sit-to-stand transfers.
    SitToStand,
    /// Treadmill walking in a virtual-reality lab.
    Treadmill,
}

impl TrialKind {
    /// Whether sit-to-stand transfers are expected in the recording.
    pub fn has_transfers(self) -> bool {
        matches!(self, TrialKind::LTest | TrialKind::SitToStand)
    }
}

/// Synchronized streams of one body-worn sensor.
///
/// All channels share one sample count. Earth-frame channels are derived from
/// the sensor-frame channels and the orientation stream; earth-frame
/// acceleration has gravity removed from the vertical axis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImuSensorData {
    /// Accelerometer, sensor frame (m/s²).
    pub acc: Vec<Vec3>,
    /// Accelerometer, earth frame, gravity removed (m/s²).
    pub acc_earth: Vec<Vec3>,
    /// Gyroscope, sensor frame (rad/s).
    pub gyro: Vec<Vec3>,
    /// Gyroscope, earth frame (rad/s).
    pub gyro_earth: Vec<Vec3>,
    /// Magnetometer, sensor frame. May be empty.
    pub mag: Vec<Vec3>,
    /// Sensor-to-earth orientation per sample.
    pub orientation: Vec<Quaternion>,
}

impl ImuSensorData {
    /// Build a sensor bundle from sensor-frame streams, deriving the earth-frame
    /// channels from the orientation stream.
    pub fn from_sensor_frame(
        acc: Vec<Vec3>,
        gyro: Vec<Vec3>,
        orientation: Vec<Quaternion>,
    ) -> Result<Self> {
        check_len("gyroscope", acc.len(), gyro.len())?;
        check_len("orientation", acc.len(), orientation.len())?;
        let acc_earth = orientation::earth_frame_acceleration(&acc, &orientation)?;
        let gyro_earth = orientation::rotate_series(&gyro, &orientation)?;
        Ok(Self {
            acc,
            acc_earth,
            gyro,
            gyro_earth,
            mag: Vec::new(),
            orientation,
        })
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.gyro.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gyro.is_empty()
    }

    /// Check that every populated channel has the same sample count.
    pub fn validate(&self) -> Result<()> {
        let n = self.len();
        check_len("sensor-frame accelerometer", n, self.acc.len())?;
        check_len("earth-frame accelerometer", n, self.acc_earth.len())?;
        check_len("earth-frame gyroscope", n, self.gyro_earth.len())?;
        check_len("orientation", n, self.orientation.len())?;
        if !self.mag.is_empty() {
            check_len("magnetometer", n, self.mag.len())?;
        }
        Ok(())
    }

    /// One axis of a vector series.
    pub fn axis(series: &[Vec3], axis: usize) -> Vec<f64> {
        series.iter().map(|v| v[axis]).collect()
    }
}

/// Output contract of the IMU preprocessor: one bundle per body location,
/// synchronized to a common sample rate and sample range.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImuRecording {
    /// Common sample rate in Hz.
    pub sample_rate: f64,
    /// Protocol of the trial.
    pub trial_kind: Option<TrialKind>,
    /// Sensor bundles by location.
    pub sensors: BTreeMap<SensorLocation, ImuSensorData>,
    /// Locations that delivered no data.
    pub missing_sensors: Vec<SensorLocation>,
    /// Set by the preprocessor when many samples had to be interpolated.
    pub high_missing_samples: bool,
}

impl ImuRecording {
    pub fn new(sample_rate: f64, trial_kind: TrialKind) -> Self {
        Self {
            sample_rate,
            trial_kind: Some(trial_kind),
            ..Default::default()
        }
    }

    /// Add a sensor bundle.
    pub fn with_sensor(mut self, location: SensorLocation, data: ImuSensorData) -> Self {
        self.missing_sensors.retain(|l| *l != location);
        self.sensors.insert(location, data);
        self
    }

    /// Data of one sensor, or `MissingSensor`.
    pub fn sensor(&self, location: SensorLocation) -> Result<&ImuSensorData> {
        if self.missing_sensors.contains(&location) {
            return Err(GaitError::MissingSensor(location));
        }
        self.sensors
            .get(&location)
            .filter(|d| !d.is_empty())
            .ok_or(GaitError::MissingSensor(location))
    }

    pub fn has_sensor(&self, location: SensorLocation) -> bool {
        self.sensor(location).is_ok()
    }

    /// Trunk sensor for turn detection: lumbar, falling back to sternum.
    pub fn trunk_for_turns(&self) -> Result<(SensorLocation, &ImuSensorData)> {
        self.first_available(&[SensorLocation::Lumbar, SensorLocation::Sternum])
    }

    /// Trunk sensor for posture measures: sternum, falling back to lumbar.
    pub fn trunk_for_posture(&self) -> Result<(SensorLocation, &ImuSensorData)> {
        self.first_available(&[SensorLocation::Sternum, SensorLocation::Lumbar])
    }

    fn first_available(
        &self,
        order: &[SensorLocation],
    ) -> Result<(SensorLocation, &ImuSensorData)> {
        for &loc in order {
            if let Ok(data) = self.sensor(loc) {
                return Ok((loc, data));
            }
        }
        Err(GaitError::MissingSensor(order[order.len() - 1]))
    }

    /// Check the sample rate and that every present sensor is internally consistent.
    pub fn validate(&self) -> Result<()> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(GaitError::config(format!(
                "sample rate must be positive, got {}",
                self.sample_rate
            )));
        }
        for data in self.sensors.values() {
            data.validate()?;
        }
        Ok(())
    }
}

/// Output contract of the marker reader: labelled 3D trajectories in
/// millimetres at a fixed frame rate.
///
/// Missing samples are the sentinel `(0, 0, 0)`. A marker that is truly at
/// the origin is indistinguishable from an occluded one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarkerTrajectories {
    /// Frame rate in Hz.
    pub sample_rate: f64,
    /// Position series by marker label.
    pub markers: BTreeMap<String, Vec<Vec3>>,
    /// Analog channels (force plates etc.) by label.
    pub analog: BTreeMap<String, Vec<f64>>,
}

impl MarkerTrajectories {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            ..Default::default()
        }
    }

    pub fn with_marker(mut self, label: &str, series: Vec<Vec3>) -> Self {
        self.markers.insert(label.to_string(), series);
        self
    }

    /// Position series of one marker, or `MissingMarker`.
    pub fn marker(&self, label: &str) -> Result<&[Vec3]> {
        self.markers
            .get(label)
            .map(|v| v.as_slice())
            .ok_or_else(|| GaitError::MissingMarker(label.to_string()))
    }

    /// Frame count of the trial (length of the longest marker).
    pub fn frame_count(&self) -> usize {
        self.markers.values().map(|v| v.len()).max().unwrap_or(0)
    }

    /// True when the sample is the missing-data sentinel.
    pub fn is_missing(sample: &Vec3) -> bool {
        sample[0] == 0.0 && sample[1] == 0.0 && sample[2] == 0.0
    }
}

/// Named gait events of one foot, each an ascending deduplicated index list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FootEvents {
    /// Initial Contact (heel-strike).
    pub initial_contact: Vec<usize>,
    /// Terminal Contact (toe-off).
    pub terminal_contact: Vec<usize>,
    pub mid_swing_onset: Vec<usize>,
    pub terminal_swing_onset: Vec<usize>,
    /// Alias of the contralateral Terminal Contact.
    pub mid_stance_onset: Vec<usize>,
    /// Alias of the contralateral Mid-Swing Onset.
    pub heel_off: Vec<usize>,
    /// Alias of the contralateral Initial Contact.
    pub pre_swing_onset: Vec<usize>,
}

impl FootEvents {
    /// Events with only contacts populated (marker-based detection).
    pub fn from_contacts(initial_contact: Vec<usize>, terminal_contact: Vec<usize>) -> Self {
        Self {
            initial_contact,
            terminal_contact,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.initial_contact.is_empty() && self.terminal_contact.is_empty()
    }
}

/// Gait events of both feet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GaitEvents {
    pub left: FootEvents,
    pub right: FootEvents,
}

impl GaitEvents {
    pub fn foot(&self, side: Side) -> &FootEvents {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub fn foot_mut(&mut self, side: Side) -> &mut FootEvents {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty() && self.right.is_empty()
    }
}

/// One stride: `(start_index, end_index, value)`.
///
/// For IMU and marker stride lengths, `start` is the Terminal Contact that
/// opens the stride's swing and `end` the closing Initial Contact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrideRecord {
    pub start: usize,
    pub end: usize,
    pub value: f64,
}

impl StrideRecord {
    pub fn new(start: usize, end: usize, value: f64) -> Self {
        Self { start, end, value }
    }
}

/// Closed sample interval of non-straight walking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TurnSegment {
    pub start: usize,
    pub end: usize,
    /// Peak trunk angular velocity inside the turn (deg/s).
    pub peak_deg_s: f64,
}

impl TurnSegment {
    pub fn contains(&self, idx: usize) -> bool {
        idx >= self.start && idx <= self.end
    }
}

/// Value of one reported parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Scalar(f64),
    Series(Vec<f64>),
    Strides(Vec<StrideRecord>),
}

impl ParameterValue {
    /// Scalar value, if this is a scalar.
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            ParameterValue::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_strides(&self) -> Option<&[StrideRecord]> {
        match self {
            ParameterValue::Strides(s) => Some(s),
            _ => None,
        }
    }
}

/// Trial-level output: parameter name to value, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrialSummary {
    pub parameters: BTreeMap<String, ParameterValue>,
}

impl TrialSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_scalar(&mut self, name: impl Into<String>, value: f64) {
        self.parameters.insert(name.into(), ParameterValue::Scalar(value));
    }

    pub fn set_series(&mut self, name: impl Into<String>, value: Vec<f64>) {
        self.parameters.insert(name.into(), ParameterValue::Series(value));
    }

    pub fn set_strides(&mut self, name: impl Into<String>, value: Vec<StrideRecord>) {
        self.parameters.insert(name.into(), ParameterValue::Strides(value));
    }

    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.parameters.get(name)
    }

    /// Scalar lookup; `None` when absent or not a scalar.
    pub fn scalar(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(ParameterValue::as_scalar)
    }

    pub fn strides(&self, name: &str) -> Option<&[StrideRecord]> {
        self.get(name).and_then(ParameterValue::as_strides)
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

fn check_len(context: &str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(GaitError::LengthMismatch {
            context: context.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Left.opposite(), Side::Right);
        assert_eq!(Side::Right.opposite(), Side::Left);
        assert_eq!(Side::Left.foot_sensor(), SensorLocation::LeftFoot);
    }

    #[test]
    fn test_missing_sentinel() {
        assert!(MarkerTrajectories::is_missing(&[0.0, 0.0, 0.0]));
        assert!(!MarkerTrajectories::is_missing(&[0.0, 0.0, 1.0]));
    }

    #[test]
    fn test_marker_lookup() {
        let markers = MarkerTrajectories::new(100.0).with_marker("LHEE", vec![[1.0, 2.0, 3.0]; 10]);
        assert_eq!(markers.marker("LHEE").map(|m| m.len()), Ok(10));
        assert_eq!(
            markers.marker("RHEE"),
            Err(GaitError::MissingMarker("RHEE".into()))
        );
        assert_eq!(markers.frame_count(), 10);
    }

    #[test]
    fn test_trunk_fallback() {
        let data = ImuSensorData::from_sensor_frame(
            vec![[0.0, 0.0, 9.81]; 5],
            vec![[0.0; 3]; 5],
            vec![Quaternion::identity(); 5],
        )
        .unwrap();
        let rec = ImuRecording::new(100.0, TrialKind::TwoMinuteWalk)
            .with_sensor(SensorLocation::Sternum, data);

        let (loc, _) = rec.trunk_for_turns().unwrap();
        assert_eq!(loc, SensorLocation::Sternum, "Should fall back to sternum");
        assert!(rec.sensor(SensorLocation::Lumbar).is_err());
    }

    #[test]
    fn test_sensor_length_mismatch() {
        let res = ImuSensorData::from_sensor_frame(
            vec![[0.0; 3]; 5],
            vec![[0.0; 3]; 4],
            vec![Quaternion::identity(); 5],
        );
        assert!(matches!(res, Err(GaitError::LengthMismatch { .. })));
    }

    #[test]
    fn test_summary_accessors() {
        let mut summary = TrialSummary::new();
        summary.set_scalar("Cadence (steps/min)", 110.0);
        summary.set_strides("Stridelength left (mm)", vec![StrideRecord::new(10, 110, 1200.0)]);

        assert_eq!(summary.scalar("Cadence (steps/min)"), Some(110.0));
        assert_eq!(summary.scalar("Stridelength left (mm)"), None);
        assert_eq!(summary.strides("Stridelength left (mm)").map(|s| s.len()), Some(1));
    }

    #[test]
    fn test_recording_rejects_bad_sample_rate() {
        let rec = ImuRecording::new(0.0, TrialKind::LTest);
        assert!(matches!(rec.validate(), Err(GaitError::InvalidConfig(_))));
    }
}
