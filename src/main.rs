//! Gait Sensing demo binary
//!
//! Runs the IMU pipeline on a synthetic walking trial and prints the trial
//! outcome as JSON. An optional first argument names a pipeline configuration
//! file; `RUST_LOG` controls log verbosity.
//!
//! For library use, see lib.rs.

use std::f64::consts::PI;
use std::process::ExitCode;

use gait_sensing::orientation::GRAVITY;
use gait_sensing::{
    ImuRecording, ImuSensorData, ImuTrialPipeline, PipelineConfig, Quaternion, Result,
    SensorLocation, TrialKind, Vec3,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const SAMPLE_RATE: f64 = 100.0;
const STRIDE: usize = 100;
const STRIDES: usize = 12;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Demo failed");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => {
            info!(%path, "Loading pipeline configuration");
            let json = std::fs::read_to_string(&path)
                .map_err(|e| gait_sensing::GaitError::config(format!("cannot read {path}: {e}")))?;
            PipelineConfig::from_json_str(&json)?
        }
        None => PipelineConfig::default(),
    };

    let pipeline = ImuTrialPipeline::new(config)?;
    let outcome = pipeline.run(&synthetic_trial()?);
    if let Some(e) = &outcome.error {
        error!(error = %e, "Trial did not complete");
    }
    println!("{}", outcome.to_json()?);
    Ok(())
}

/// Two feet walking at 1 stride/s and 1.2 m/stride between two standing
/// periods, right foot half a stride behind the left.
fn synthetic_trial() -> Result<ImuRecording> {
    let len = 200 + STRIDES * STRIDE + 250;
    let left = foot(len, 200)?;
    let right = foot(len, 250)?;
    Ok(ImuRecording::new(SAMPLE_RATE, TrialKind::TwoMinuteWalk)
        .with_sensor(SensorLocation::LeftFoot, left)
        .with_sensor(SensorLocation::RightFoot, right))
}

fn foot(len: usize, first_contact: usize) -> Result<ImuSensorData> {
    let end = first_contact + STRIDES * STRIDE;
    let swing_acc = 1.2 * 2.0 * PI / (0.4 * 0.4);
    let (acc, gyro): (Vec<Vec3>, Vec<Vec3>) = (0..len)
        .map(|i| {
            if i < first_contact || i >= end {
                return ([0.0, 0.0, GRAVITY], [0.0; 3]);
            }
            let c = ((i - first_contact) % STRIDE) as f64;
            let push_off = (-((c - 58.0) / 3.0).powi(2)).exp();
            if c < 60.0 {
                let gyro = -0.3 * (PI * c / 60.0).sin() - 2.0 * push_off;
                ([0.0, 0.0, GRAVITY + 3.0 * push_off], [0.0, gyro, 0.0])
            } else {
                let s = (c - 60.0) / 40.0;
                (
                    [swing_acc * (2.0 * PI * s).sin(), 0.0, GRAVITY + 3.0 * push_off],
                    [0.0, 4.0 * (PI * s).sin(), 0.0],
                )
            }
        })
        .unzip();
    ImuSensorData::from_sensor_frame(acc, gyro, vec![Quaternion::identity(); len])
}
