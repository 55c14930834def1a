//! Core types and settings for the AR fusion library

use core::time::Duration;

use nalgebra::Vector3;

/// Orientation fusion settings
///
/// Configuration for the complementary filter and for the periodic fuse
/// schedule. The schedule values are only consumed by the threaded fuse loop;
/// callers driving `fuse` from their own timer may ignore them.
///
/// # Example
/// ```
/// use core::time::Duration;
/// use ar_fusion::{FusionSettings, OrientationFusion};
///
/// let settings = FusionSettings {
///     filter_coefficient: 0.95,              // trust the absolute source a bit more
///     fuse_period: Duration::from_millis(20),
///     ..Default::default()
/// };
/// let fusion = OrientationFusion::with_settings(settings);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionSettings {
    /// Weight of the gyroscope term in the complementary filter (typically 0.98)
    ///
    /// The accelerometer/magnetometer term receives `1 - filter_coefficient`.
    pub filter_coefficient: f32,
    /// Angular speed in rad/s below which a gyroscope sample is treated as
    /// having no rotation axis
    pub gyro_epsilon: f32,
    /// Interval between two fuse steps
    pub fuse_period: Duration,
    /// Delay before the first fuse step, giving the sensors time to deliver
    /// an absolute orientation
    pub fuse_start_delay: Duration,
}

impl Default for FusionSettings {
    fn default() -> Self {
        Self {
            filter_coefficient: 0.98,
            gyro_epsilon: 1.0e-6,
            fuse_period: Duration::from_millis(50),
            fuse_start_delay: Duration::from_millis(1000),
        }
    }
}

/// Lifecycle of the orientation estimator
///
/// ```text
/// Uninitialized --accel/mag--> Seeding --first gyro--> Tracking
/// ```
///
/// `Tracking` is only left by `OrientationFusion::reset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FusionState {
    /// No absolute (accelerometer + magnetometer) orientation yet
    #[default]
    Uninitialized,
    /// Absolute orientation available, gyroscope matrix not yet seeded
    Seeding,
    /// Steady-state gyroscope integration with periodic fusion
    Tracking,
}

/// Fusion status flags
///
/// Diagnostic view of the estimator.
///
/// # Example
/// ```
/// use ar_fusion::OrientationFusion;
///
/// let fusion = OrientationFusion::new();
/// let flags = fusion.flags();
///
/// if !flags.acc_mag_available {
///     println!("waiting for accelerometer and magnetometer");
/// }
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FusionFlags {
    /// An absolute orientation has been derived at least once
    pub acc_mag_available: bool,
    /// The gyroscope matrix still waits to be seeded
    pub seeding: bool,
    /// The most recent accelerometer/magnetometer pair was degenerate and
    /// left the absolute orientation unchanged
    pub acc_mag_rejected: bool,
    /// At least one gyroscope sample has been integrated over a time step
    pub gyro_integrating: bool,
}

/// Orientation handed to the rendering consumer
///
/// The remap from the filter's (azimuth, pitch, roll) order is
/// `pitch = roll`, `roll = -azimuth`, `heading = pitch`, which is the camera
/// convention of the scene graph the estimator was built for.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RenderRotation {
    /// Rotation about the renderer's pitch axis in radians
    pub pitch: f32,
    /// Rotation about the renderer's roll axis in radians
    pub roll: f32,
    /// Rotation about the renderer's heading axis in radians
    pub heading: f32,
}

impl RenderRotation {
    /// Remap a fused (azimuth, pitch, roll) orientation to render order.
    pub fn from_orientation(orientation: Vector3<f32>) -> Self {
        Self {
            pitch: orientation.z,
            roll: -orientation.x,
            heading: orientation.y,
        }
    }
}

/// A single sample delivered by the platform sensor source
///
/// Units follow the platform: m/s² for the accelerometer, µT for the
/// magnetometer, rad/s for the gyroscope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorEvent {
    /// Accelerometer sample (gravity + linear acceleration)
    Accelerometer(Vector3<f32>),
    /// Magnetometer sample
    Magnetometer(Vector3<f32>),
    /// Gyroscope sample with its timestamp in nanoseconds
    Gyroscope {
        /// Angular velocity in rad/s
        rate: Vector3<f32>,
        /// Sample time in nanoseconds
        timestamp_ns: i64,
    },
    /// Platform rotation vector (vector part of a unit quaternion)
    RotationVector(Vector3<f32>),
}
