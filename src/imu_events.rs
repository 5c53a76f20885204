//! Gait event detection from foot-worn IMUs.
//!
//! Works on two filtered signals per foot:
//! - medio-lateral angular velocity (sensor-frame gyroscope, column 1)
//! - vertical acceleration (earth-frame accelerometer, column 2)
//!
//! Mid-Swing Onset is the swing peak of angular velocity. Initial Contact is
//! the following positive-to-negative zero crossing, Terminal Contact the
//! acceleration peak with the lowest angular velocity late in stance, and
//! Terminal-Swing Onset the point where angular velocity, falling from the
//! Mid-Swing peak of the same swing, drops to half that peak. The search
//! ends at 70% of the Terminal-Contact-to-Terminal-Contact cycle or at the
//! closing Initial Contact, whichever comes first, so Mid-Swing Onset <
//! Terminal-Swing Onset < Initial Contact within every stride.
//!
//! Mid-Stance Onset, Heel-Off and Pre-Swing Onset are not detected: they
//! alias the contralateral foot's Terminal Contact, Mid-Swing Onset and
//! Initial Contact respectively.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::filtering::FilterSpec;
use crate::peaks::{find_peaks, PeakCriteria};
use crate::stats::{argmax, argmin, first_after, last_before, sorted_unique};
use crate::turns::SteadyStatePolicy;
use crate::types::{FootEvents, GaitEvents, ImuRecording, ImuSensorData, Side, TurnSegment};

/// Configuration for IMU event detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImuEventConfig {
    /// Low-pass for the medio-lateral angular velocity.
    pub gyro_filter: FilterSpec,
    /// Low-pass for the vertical acceleration.
    pub accel_filter: FilterSpec,
    /// Minimum spacing of Mid-Swing peaks, in seconds.
    pub mid_swing_min_interval_s: f64,
    /// Minimum prominence of Mid-Swing peaks (rad/s).
    pub mid_swing_prominence: f64,
    /// Minimum height of Mid-Swing peaks (rad/s).
    pub mid_swing_height: f64,
    /// Terminal Contact search starts at this fraction of the Mid-Swing interval.
    pub toe_off_window_start: f64,
    /// Terminal Contact search ends this long before the next Mid-Swing (s).
    pub toe_off_guard_s: f64,
    /// Terminal-Swing search ends at this fraction of the TC-to-TC cycle.
    pub terminal_swing_window: f64,
    /// Terminal-Swing Onset is where angular velocity falls to this fraction
    /// of the Mid-Swing peak.
    pub terminal_swing_fraction: f64,
}

impl Default for ImuEventConfig {
    fn default() -> Self {
        Self {
            gyro_filter: FilterSpec::new(2, 15.0),
            accel_filter: FilterSpec::new(2, 17.0),
            mid_swing_min_interval_s: 0.7,
            mid_swing_prominence: 1.0,
            mid_swing_height: 0.3,
            toe_off_window_start: 0.4,  // 1 / 2.5
            toe_off_guard_s: 0.05,
            terminal_swing_window: 0.7,
            terminal_swing_fraction: 0.5,
        }
    }
}

/// Filtered detection signals of one foot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FootSignals {
    /// Medio-lateral angular velocity (rad/s).
    pub gyro_ml: Vec<f64>,
    /// Vertical acceleration, gravity removed (m/s²).
    pub acc_vertical: Vec<f64>,
}

impl FootSignals {
    pub fn len(&self) -> usize {
        self.gyro_ml.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gyro_ml.is_empty()
    }
}

/// Foot-IMU event detector.
#[derive(Debug, Clone, Default)]
pub struct ImuEventDetector {
    config: ImuEventConfig,
}

impl ImuEventDetector {
    pub fn new(config: ImuEventConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ImuEventConfig {
        &self.config
    }

    /// Filter the raw foot streams into detection signals.
    pub fn foot_signals(&self, sensor: &ImuSensorData, sample_rate: f64) -> Result<FootSignals> {
        let gyro = ImuSensorData::axis(&sensor.gyro, 1);
        let acc = ImuSensorData::axis(&sensor.acc_earth, 2);
        Ok(FootSignals {
            gyro_ml: self.config.gyro_filter.apply(&gyro, sample_rate)?,
            acc_vertical: self.config.accel_filter.apply(&acc, sample_rate)?,
        })
    }

    /// Detect events for both feet of a recording.
    pub fn detect(&self, recording: &ImuRecording) -> Result<GaitEvents> {
        let fs = recording.sample_rate;
        let left = self.foot_signals(recording.sensor(Side::Left.foot_sensor())?, fs)?;
        let right = self.foot_signals(recording.sensor(Side::Right.foot_sensor())?, fs)?;
        Ok(self.detect_from_signals(&left, &right, fs))
    }

    /// Detect events from already filtered signals.
    pub fn detect_from_signals(&self, left: &FootSignals, right: &FootSignals, sample_rate: f64) -> GaitEvents {
        let mut events = GaitEvents {
            left: self.detect_foot(left, sample_rate),
            right: self.detect_foot(right, sample_rate),
        };
        link_contralateral(&mut events);

        for side in Side::BOTH {
            let foot = events.foot(side);
            debug!(
                side = side.label(),
                mid_swing = foot.mid_swing_onset.len(),
                initial_contacts = foot.initial_contact.len(),
                terminal_contacts = foot.terminal_contact.len(),
                "IMU events detected"
            );
        }
        events
    }

    /// Own-foot events: Mid-Swing, Initial Contact, Terminal Contact and
    /// Terminal-Swing Onset.
    pub fn detect_foot(&self, signals: &FootSignals, sample_rate: f64) -> FootEvents {
        let mid_swing = self.mid_swing_onsets(&signals.gyro_ml, sample_rate);
        let initial_contact = initial_contacts(&signals.gyro_ml, &mid_swing);
        let terminal_contact = self.terminal_contacts(signals, &mid_swing, sample_rate);
        let terminal_swing_onset =
            self.terminal_swing_onsets(&signals.gyro_ml, &terminal_contact, &mid_swing, &initial_contact);

        FootEvents {
            initial_contact,
            terminal_contact,
            mid_swing_onset: mid_swing,
            terminal_swing_onset,
            ..Default::default()
        }
    }

    /// Peaks of medio-lateral angular velocity during swing.
    pub fn mid_swing_onsets(&self, gyro_ml: &[f64], sample_rate: f64) -> Vec<usize> {
        let criteria = PeakCriteria::new()
            .distance(self.config.mid_swing_min_interval_s * sample_rate)
            .prominence(self.config.mid_swing_prominence)
            .height(self.config.mid_swing_height);
        find_peaks(gyro_ml, &criteria)
    }

    // ===== PRIVATE METHODS =====

    fn terminal_contacts(&self, signals: &FootSignals, mid_swing: &[usize], sample_rate: f64) -> Vec<usize> {
        let guard = (self.config.toe_off_guard_s * sample_rate) as usize;
        let mut out = Vec::new();

        for pair in mid_swing.windows(2) {
            let (prev, next) = (pair[0], pair[1]);
            let start = prev + ((next - prev) as f64 * self.config.toe_off_window_start) as usize;
            let end = next.saturating_sub(guard);
            if end <= start {
                continue;
            }

            let candidates = find_peaks(&signals.acc_vertical[start..end], &PeakCriteria::new());
            let gyro_at: Vec<f64> = candidates
                .iter()
                .map(|&c| signals.gyro_ml[start + c])
                .collect();
            if let Some(best) = argmin(&gyro_at) {
                out.push(start + candidates[best]);
            }
        }
        sorted_unique(out)
    }

    /// One onset per Terminal Contact that has a successor. The last
    /// Terminal Contact has no cycle length and yields none, as does a swing
    /// whose Mid-Swing peak falls outside the search window.
    fn terminal_swing_onsets(
        &self,
        gyro_ml: &[f64],
        terminal_contact: &[usize],
        mid_swing: &[usize],
        initial_contact: &[usize],
    ) -> Vec<usize> {
        let mut out = Vec::new();
        for pair in terminal_contact.windows(2) {
            let (tc, next_tc) = (pair[0], pair[1]);
            let mut end = tc + ((next_tc - tc) as f64 * self.config.terminal_swing_window) as usize;
            end = end.min(gyro_ml.len());
            if let Some(ic) = first_after(initial_contact, tc) {
                end = end.min(ic);
            }

            let Some(peak) = first_after(mid_swing, tc).filter(|&m| m + 1 < end) else {
                continue;
            };
            let threshold = gyro_ml[peak] * self.config.terminal_swing_fraction;
            if let Some(offset) = gyro_ml[peak + 1..end].iter().position(|&g| g <= threshold) {
                out.push(peak + 1 + offset);
            }
        }
        sorted_unique(out)
    }
}

/// First positive-to-negative zero crossing after each Mid-Swing peak. The
/// bracketing sample with the smaller magnitude wins; ties go to the first
/// negative sample. With no negative sample left, the minimum is used.
fn initial_contacts(gyro_ml: &[f64], mid_swing: &[usize]) -> Vec<usize> {
    let mut out = Vec::with_capacity(mid_swing.len());
    for &peak in mid_swing {
        let tail = &gyro_ml[peak..];
        let first_negative = match tail.iter().position(|&g| g < 0.0) {
            Some(offset) => peak + offset,
            None => match argmin(tail) {
                Some(offset) => peak + offset,
                None => continue,
            },
        };
        let last_positive = first_negative.saturating_sub(1);
        let chosen = if gyro_ml[last_positive].abs() < gyro_ml[first_negative].abs() {
            last_positive
        } else {
            first_negative
        };
        out.push(chosen);
    }
    sorted_unique(out)
}

/// Fill the contralateral aliases: Mid-Stance Onset = other foot's Terminal
/// Contact, Heel-Off = other foot's Mid-Swing Onset, Pre-Swing Onset = other
/// foot's Initial Contact.
pub fn link_contralateral(events: &mut GaitEvents) {
    let (left, right) = (&mut events.left, &mut events.right);

    left.mid_stance_onset = right.terminal_contact.clone();
    left.heel_off = right.mid_swing_onset.clone();
    left.pre_swing_onset = right.initial_contact.clone();

    right.mid_stance_onset = left.terminal_contact.clone();
    right.heel_off = left.mid_swing_onset.clone();
    right.pre_swing_onset = left.initial_contact.clone();
}

/// Remove events around turns.
///
/// Events inside a turn are always dropped. Then, per turn and per foot, the
/// last Initial Contact and Mid-Swing Onset before the turn start are
/// dropped, and with [`SteadyStatePolicy::NoTwoSteps`] also the first ones
/// after the turn end. Contralateral aliases are rebuilt afterwards.
///
/// Terminal-Swing Onsets are filtered, not re-derived: an onset survives
/// only while its own swing keeps both the opening Terminal Contact and the
/// Mid-Swing Onset it was measured from.
pub fn exclude_turns(events: &mut GaitEvents, turns: &[TurnSegment], policy: Option<SteadyStatePolicy>) {
    if turns.is_empty() {
        return;
    }
    let in_turn = |i: &usize| turns.iter().any(|t| t.contains(*i));

    for side in Side::BOTH {
        let foot = events.foot_mut(side);
        for series in [
            &mut foot.initial_contact,
            &mut foot.terminal_contact,
            &mut foot.mid_swing_onset,
            &mut foot.terminal_swing_onset,
        ] {
            series.retain(|i| !in_turn(i));
        }
    }

    if let Some(policy) = policy {
        for turn in turns {
            for side in Side::BOTH {
                let foot = events.foot_mut(side);
                for series in [&mut foot.initial_contact, &mut foot.mid_swing_onset] {
                    let mut drop = Vec::with_capacity(2);
                    drop.extend(last_before(series, turn.start));
                    if policy == SteadyStatePolicy::NoTwoSteps {
                        drop.extend(first_after(series, turn.end));
                    }
                    series.retain(|i| !drop.contains(i));
                }
            }
        }
    }

    for side in Side::BOTH {
        let foot = events.foot_mut(side);
        let kept: Vec<usize> = foot
            .terminal_swing_onset
            .iter()
            .copied()
            .filter(|&tsw| swing_intact(foot, tsw))
            .collect();
        foot.terminal_swing_onset = kept;
    }

    link_contralateral(events);
}

/// Whether the swing ending in `tsw` still has its Terminal Contact and
/// Mid-Swing Onset, with no Initial Contact in between.
fn swing_intact(foot: &FootEvents, tsw: usize) -> bool {
    let (Some(tc), Some(msw)) = (
        last_before(&foot.terminal_contact, tsw),
        last_before(&foot.mid_swing_onset, tsw),
    ) else {
        return false;
    };
    let opened_after_contact = last_before(&foot.initial_contact, tsw).map_or(true, |ic| ic < tc);
    tc < msw && opened_after_contact
}
