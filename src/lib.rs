//! Gait Sensing Library
//!
//! Extracts gait events and spatiotemporal parameters from two measurement
//! modalities: optical motion-capture marker trajectories and body-worn
//! inertial sensors (feet, lumbar, sternum).
//!
//! # Design Philosophy
//!
//! - **Classical signal processing**: zero-phase Butterworth filtering, peak
//!   finding and zero-velocity-update integration with fixed, named thresholds.
//! - **Not available is not zero**: a parameter that cannot be computed is NaN,
//!   and the reason is raised as a [`TrialFlags`] entry.
//! - **Per-trial isolation**: a failing trial yields a [`TrialOutcome`] carrying
//!   its error; batches always complete.
//! - **Deterministic**: identical input gives identical events and parameters.
//!
//! # Example
//!
//! ```ignore
//! use gait_sensing::{ImuRecording, ImuTrialPipeline, PipelineConfig, SensorLocation, TrialKind};
//!
//! let recording = ImuRecording::new(100.0, TrialKind::TwoMinuteWalk)
//!     .with_sensor(SensorLocation::LeftFoot, left)
//!     .with_sensor(SensorLocation::RightFoot, right);
//!
//! let pipeline = ImuTrialPipeline::new(PipelineConfig::default())?;
//! let outcome = pipeline.run(&recording);
//! println!("{:?}", outcome.summary.scalar("Gait speed (km/h)"));
//! ```

pub mod error;
pub mod filtering;
pub mod imu_events;
pub mod kinematics;
pub mod marker_events;
pub mod marker_spatiotemporal;
pub mod matching;
pub mod orientation;
pub mod pchip;
pub mod peaks;
pub mod phases;
pub mod pipeline;
pub mod spatiotemporal;
pub mod stats;
pub mod trajectory;
pub mod transfers;
pub mod turns;
pub mod types;


// Re-export commonly used types
pub use error::{GaitError, Result, TrialFlags};
pub use marker_events::{MarkerEventAlgorithm, MarkerTrialType};
pub use matching::{match_events, stride_by_stride, EventMatch, StrideComparison};
pub use orientation::Quaternion;
pub use pipeline::{ImuTrialPipeline, MarkerTrialPipeline, PipelineConfig, TrialContext, TrialOutcome};
pub use turns::SteadyStatePolicy;
pub use types::{
    FootEvents, GaitEvents, ImuRecording, ImuSensorData, MarkerTrajectories, ParameterValue,
    SensorLocation, Side, StrideRecord, TrialKind, TrialSummary, TurnSegment, Vec3,
};
