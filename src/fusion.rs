//! Complementary orientation filter for the AR fusion library

use core::f32::consts::{FRAC_PI_2, PI, TAU};

use log::{debug, trace};
use nalgebra::{Matrix3, Quaternion, Vector3};

use crate::compass::rotation_from_accel_mag;
use crate::math::{NS_TO_S, QuaternionExt, RotationMatrixExt};
use crate::types::{FusionFlags, FusionSettings, FusionState, RenderRotation, SensorEvent};

/// Gyroscope / accelerometer / magnetometer orientation estimator
///
/// Integrates gyroscope samples into a rotation matrix and, on every
/// [`fuse`](Self::fuse), blends the integrated angles with the absolute
/// orientation derived from the accelerometer and magnetometer. The fused
/// result is fed back as the new integration baseline, which bounds gyroscope
/// drift.
///
/// All orientation triples are (azimuth, pitch, roll) in radians.
///
/// The estimator has no internal synchronization: all ingestion and fuse
/// calls must come from one logical writer. Use
/// [`SharedFusion`](crate::SharedFusion) when sensor callbacks and the fuse
/// timer run on different threads.
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use ar_fusion::{FusionState, OrientationFusion};
///
/// let mut fusion = OrientationFusion::new();
/// fusion.ingest_accel_mag(Vector3::new(0.0, 0.0, 9.81), Vector3::new(0.0, 30.0, -30.0));
/// fusion.ingest_gyro(Vector3::new(0.0, 0.0, 0.1), 1_000_000);
/// fusion.ingest_gyro(Vector3::new(0.0, 0.0, 0.1), 21_000_000);
/// assert_eq!(fusion.state(), FusionState::Tracking);
///
/// let rotation = fusion.fuse();
/// println!("heading {:.3} rad", rotation.heading);
/// ```
#[derive(Debug, Clone)]
pub struct OrientationFusion {
    /// Filter settings
    settings: FusionSettings,
    /// Orientation integrated from the gyroscope
    gyro_orientation: Vector3<f32>,
    /// Absolute orientation from accelerometer and magnetometer
    acc_mag_orientation: Vector3<f32>,
    /// Output of the last fuse step
    fused_orientation: Vector3<f32>,
    /// Integrated gyroscope rotation, the authoritative gyro state
    gyro_matrix: Matrix3<f32>,
    /// Last valid accelerometer/magnetometer rotation
    rotation_matrix: Matrix3<f32>,
    /// Last accelerometer sample, for event-style ingestion
    accelerometer: Vector3<f32>,
    /// Last magnetometer sample, for event-style ingestion
    magnetometer: Vector3<f32>,
    /// An absolute orientation has been derived at least once
    acc_mag_available: bool,
    /// The last accelerometer/magnetometer pair was degenerate
    acc_mag_rejected: bool,
    /// Gyroscope matrix still waits for its seed
    init_state: bool,
    /// Timestamp of the previous gyroscope sample in nanoseconds
    last_gyro_timestamp: Option<i64>,
    /// Orientation reported by the platform rotation vector sensor
    rotation_vector_rotation: Option<RenderRotation>,
}

impl OrientationFusion {
    /// Create a new estimator with default settings
    pub fn new() -> Self {
        Self::with_settings(FusionSettings::default())
    }

    /// Create a new estimator with specified settings
    pub fn with_settings(settings: FusionSettings) -> Self {
        Self {
            settings,
            gyro_orientation: Vector3::zeros(),
            acc_mag_orientation: Vector3::zeros(),
            fused_orientation: Vector3::zeros(),
            gyro_matrix: Matrix3::identity(),
            rotation_matrix: Matrix3::identity(),
            accelerometer: Vector3::zeros(),
            magnetometer: Vector3::zeros(),
            acc_mag_available: false,
            acc_mag_rejected: false,
            init_state: true,
            last_gyro_timestamp: None,
            rotation_vector_rotation: None,
        }
    }

    /// Return to the freshly created state, keeping the settings
    pub fn reset(&mut self) {
        *self = Self::with_settings(self.settings);
    }

    /// Update filter settings
    pub fn set_settings(&mut self, settings: FusionSettings) {
        self.settings = settings;
    }

    /// Get current filter settings
    pub fn settings(&self) -> FusionSettings {
        self.settings
    }

    /// Update the absolute orientation from an accelerometer/magnetometer pair
    ///
    /// Degenerate pairs (free fall, field parallel to gravity) leave the
    /// absolute orientation at its previous value; this is not an error.
    ///
    /// # Arguments
    /// * `accelerometer` - Accelerometer reading in m/s²
    /// * `magnetometer` - Magnetometer reading in µT
    pub fn ingest_accel_mag(&mut self, accelerometer: Vector3<f32>, magnetometer: Vector3<f32>) {
        self.accelerometer = accelerometer;
        self.magnetometer = magnetometer;

        match rotation_from_accel_mag(accelerometer, magnetometer) {
            Some(rotation) => {
                self.rotation_matrix = rotation;
                self.acc_mag_orientation = rotation.orientation();
                if !self.acc_mag_available {
                    debug!(
                        "absolute orientation available: {:?}",
                        self.acc_mag_orientation
                    );
                }
                self.acc_mag_available = true;
                self.acc_mag_rejected = false;
            }
            None => {
                trace!("degenerate accel/mag pair, keeping previous absolute orientation");
                self.acc_mag_rejected = true;
            }
        }
    }

    /// Store an accelerometer sample and recompute the absolute orientation
    /// with the most recent magnetometer sample
    pub fn ingest_accelerometer(&mut self, accelerometer: Vector3<f32>) {
        self.ingest_accel_mag(accelerometer, self.magnetometer);
    }

    /// Store a magnetometer sample for the next accelerometer update
    pub fn ingest_magnetometer(&mut self, magnetometer: Vector3<f32>) {
        self.magnetometer = magnetometer;
    }

    /// Integrate a gyroscope sample
    ///
    /// Ignored until an absolute orientation is available. The first accepted
    /// sample seeds the gyroscope matrix from the absolute orientation; every
    /// sample after that integrates its angular velocity over the time since
    /// the previous sample.
    ///
    /// # Arguments
    /// * `angular_velocity` - Gyroscope reading in rad/s
    /// * `timestamp_ns` - Sample time in nanoseconds
    pub fn ingest_gyro(&mut self, angular_velocity: Vector3<f32>, timestamp_ns: i64) {
        if !self.acc_mag_available {
            return;
        }

        if self.init_state {
            let init_matrix = Matrix3::from_orientation(&self.acc_mag_orientation);
            self.gyro_matrix *= init_matrix;
            self.init_state = false;
            debug!(
                "gyroscope matrix seeded from {:?}",
                self.acc_mag_orientation
            );
        }

        let delta_matrix = match self.last_gyro_timestamp {
            Some(last) => {
                let dt = timestamp_ns.saturating_sub(last) as f32 * NS_TO_S;
                let delta = Quaternion::from_gyro(
                    &angular_velocity,
                    dt / 2.0,
                    self.settings.gyro_epsilon,
                );
                Matrix3::from_quaternion(&delta)
            }
            None => Matrix3::identity(),
        };
        self.last_gyro_timestamp = Some(timestamp_ns);

        self.gyro_matrix *= delta_matrix;
        self.gyro_orientation = self.gyro_matrix.orientation();
    }

    /// Run one complementary filter step
    ///
    /// Blends each axis as `c·gyro + (1 - c)·acc_mag` with
    /// `c = filter_coefficient`, unwrapping angles that straddle ±π first.
    /// The fused orientation then replaces both the gyroscope matrix and the
    /// gyroscope orientation.
    ///
    /// Returns the fused orientation remapped for the renderer.
    pub fn fuse(&mut self) -> RenderRotation {
        let coefficient = self.settings.filter_coefficient;

        for axis in 0..3 {
            self.fused_orientation[axis] = blend_angles(
                self.gyro_orientation[axis],
                self.acc_mag_orientation[axis],
                coefficient,
            );
        }

        // drift compensation
        self.gyro_matrix = Matrix3::from_orientation(&self.fused_orientation);
        self.gyro_orientation = self.fused_orientation;

        trace!("fused orientation {:?}", self.fused_orientation);
        RenderRotation::from_orientation(self.fused_orientation)
    }

    /// Dispatch a platform sensor sample to the matching ingestion call
    pub fn handle_event(&mut self, event: SensorEvent) {
        match event {
            SensorEvent::Accelerometer(accelerometer) => self.ingest_accelerometer(accelerometer),
            SensorEvent::Magnetometer(magnetometer) => self.ingest_magnetometer(magnetometer),
            SensorEvent::Gyroscope { rate, timestamp_ns } => self.ingest_gyro(rate, timestamp_ns),
            SensorEvent::RotationVector(vector) => {
                let q = Quaternion::from_rotation_vector(&vector);
                self.rotation_vector_rotation = Some(render_rotation_from_quaternion(&q));
            }
        }
    }

    /// Place an absolute orientation directly, as if derived from accelerometer
    /// and magnetometer
    pub fn set_acc_mag_orientation(&mut self, orientation: Vector3<f32>) {
        self.acc_mag_orientation = orientation;
        self.rotation_matrix = Matrix3::from_orientation(&orientation);
        self.acc_mag_available = true;
        self.acc_mag_rejected = false;
    }

    /// Overwrite the gyroscope orientation and matrix
    pub fn set_gyro_orientation(&mut self, orientation: Vector3<f32>) {
        self.gyro_orientation = orientation;
        self.gyro_matrix = Matrix3::from_orientation(&orientation);
    }

    /// Get the gyroscope-integrated orientation
    pub fn gyro_orientation(&self) -> Vector3<f32> {
        self.gyro_orientation
    }

    /// Get the accelerometer/magnetometer orientation
    pub fn acc_mag_orientation(&self) -> Vector3<f32> {
        self.acc_mag_orientation
    }

    /// Get the output of the last fuse step
    pub fn fused_orientation(&self) -> Vector3<f32> {
        self.fused_orientation
    }

    /// Get the integrated gyroscope rotation matrix
    pub fn gyro_matrix(&self) -> Matrix3<f32> {
        self.gyro_matrix
    }

    /// Get the last valid accelerometer/magnetometer rotation matrix
    pub fn rotation_matrix(&self) -> Matrix3<f32> {
        self.rotation_matrix
    }

    /// Get the orientation last reported by the platform rotation vector sensor
    pub fn rotation_vector_rotation(&self) -> Option<RenderRotation> {
        self.rotation_vector_rotation
    }

    /// Get the lifecycle state
    pub fn state(&self) -> FusionState {
        if !self.acc_mag_available {
            FusionState::Uninitialized
        } else if self.init_state {
            FusionState::Seeding
        } else {
            FusionState::Tracking
        }
    }

    /// Get status flags
    pub fn flags(&self) -> FusionFlags {
        FusionFlags {
            acc_mag_available: self.acc_mag_available,
            seeding: self.init_state,
            acc_mag_rejected: self.acc_mag_rejected,
            gyro_integrating: self.last_gyro_timestamp.is_some() && !self.init_state,
        }
    }
}

impl Default for OrientationFusion {
    fn default() -> Self {
        Self::new()
    }
}

/// Weighted blend of two angles that avoids averaging across the ±π seam
///
/// When one angle is below -π/2 and the other is non-negative, the negative
/// one is shifted by 2π before blending and the result is wrapped back into
/// (-π, π].
fn blend_angles(gyro: f32, acc_mag: f32, coefficient: f32) -> f32 {
    let one_minus_coefficient = 1.0 - coefficient;

    if gyro < -FRAC_PI_2 && acc_mag >= 0.0 {
        wrap_above_pi(coefficient * (gyro + TAU) + one_minus_coefficient * acc_mag)
    } else if acc_mag < -FRAC_PI_2 && gyro >= 0.0 {
        wrap_above_pi(coefficient * gyro + one_minus_coefficient * (acc_mag + TAU))
    } else {
        coefficient * gyro + one_minus_coefficient * acc_mag
    }
}

fn wrap_above_pi(angle: f32) -> f32 {
    if angle > PI { angle - TAU } else { angle }
}

/// Render orientation from a platform rotation-vector quaternion
fn render_rotation_from_quaternion(q: &Quaternion<f32>) -> RenderRotation {
    let (qw, qx, qy, qz) = (q.w, q.i, q.j, q.k);

    RenderRotation {
        pitch: (2.0 * qx * qy + 2.0 * qz * qw).asin(),
        roll: (2.0 * qx * qw - 2.0 * qy * qz).atan2(1.0 - 2.0 * qx * qx - 2.0 * qz * qz),
        heading: (2.0 * qy * qw - 2.0 * qx * qz).atan2(1.0 - 2.0 * qy * qy - 2.0 * qz * qz),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn flat_north() -> (Vector3<f32>, Vector3<f32>) {
        (Vector3::new(0.0, 0.0, 9.81), Vector3::new(0.0, 30.0, -30.0))
    }

    #[test]
    fn test_new_fusion() {
        let fusion = OrientationFusion::new();
        assert_eq!(fusion.gyro_matrix(), Matrix3::identity());
        assert_eq!(fusion.gyro_orientation(), Vector3::zeros());
        assert_eq!(fusion.acc_mag_orientation(), Vector3::zeros());
        assert_eq!(fusion.fused_orientation(), Vector3::zeros());
        assert_eq!(fusion.state(), FusionState::Uninitialized);
        assert!(fusion.flags().seeding);
    }

    #[test]
    fn test_gyro_ignored_until_acc_mag() {
        let mut fusion = OrientationFusion::new();
        fusion.ingest_gyro(Vector3::new(1.0, 0.0, 0.0), 1_000);
        fusion.ingest_gyro(Vector3::new(1.0, 0.0, 0.0), 50_000_000);

        assert_eq!(fusion.state(), FusionState::Uninitialized);
        assert_eq!(fusion.gyro_matrix(), Matrix3::identity());
        assert!(!fusion.flags().gyro_integrating);
    }

    #[test]
    fn test_state_transitions() {
        let mut fusion = OrientationFusion::new();
        let (accel, mag) = flat_north();

        fusion.ingest_accel_mag(accel, mag);
        assert_eq!(fusion.state(), FusionState::Seeding);

        fusion.ingest_gyro(Vector3::zeros(), 10);
        assert_eq!(fusion.state(), FusionState::Tracking);

        fusion.fuse();
        fusion.ingest_accel_mag(accel, mag);
        assert_eq!(fusion.state(), FusionState::Tracking);

        fusion.reset();
        assert_eq!(fusion.state(), FusionState::Uninitialized);
    }

    #[test]
    fn test_degenerate_acc_mag_keeps_previous() {
        let mut fusion = OrientationFusion::new();
        let (accel, mag) = flat_north();
        fusion.ingest_accel_mag(accel, mag);
        let before = fusion.acc_mag_orientation();

        fusion.ingest_accel_mag(accel, Vector3::new(0.0, 0.0, -50.0));
        assert_eq!(fusion.acc_mag_orientation(), before);
        assert!(fusion.flags().acc_mag_rejected);

        fusion.ingest_accel_mag(accel, mag);
        assert!(!fusion.flags().acc_mag_rejected);
    }

    #[test]
    fn test_event_style_ingestion() {
        let mut fusion = OrientationFusion::new();
        let (accel, mag) = flat_north();

        // accelerometer before any magnetometer sample is degenerate
        fusion.handle_event(SensorEvent::Accelerometer(accel));
        assert_eq!(fusion.state(), FusionState::Uninitialized);

        fusion.handle_event(SensorEvent::Magnetometer(mag));
        assert_eq!(fusion.state(), FusionState::Uninitialized);

        fusion.handle_event(SensorEvent::Accelerometer(accel));
        assert_eq!(fusion.state(), FusionState::Seeding);

        fusion.handle_event(SensorEvent::Gyroscope {
            rate: Vector3::zeros(),
            timestamp_ns: 5,
        });
        assert_eq!(fusion.state(), FusionState::Tracking);
    }

    #[test]
    fn test_gyro_integration_about_z() {
        let mut fusion = OrientationFusion::new();
        let (accel, mag) = flat_north();
        fusion.ingest_accel_mag(accel, mag);

        // 0.5 rad/s about the device z axis for one second in 10 ms steps
        let rate = Vector3::new(0.0, 0.0, 0.5);
        for step in 0..=100i64 {
            fusion.ingest_gyro(rate, step * 10_000_000);
        }

        let orientation = fusion.gyro_orientation();
        assert_relative_eq!(orientation.x.abs(), 0.5, epsilon = 1e-3);
        assert_relative_eq!(orientation.y, 0.0, epsilon = 1e-5);
        assert_relative_eq!(orientation.z, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn test_gyro_timestamps_far_apart() {
        let mut fusion = OrientationFusion::new();
        fusion.set_acc_mag_orientation(Vector3::zeros());

        fusion.ingest_gyro(Vector3::new(0.0, 0.0, 0.1), i64::MIN);
        fusion.ingest_gyro(Vector3::new(0.0, 0.0, 0.1), i64::MAX);
        fusion.ingest_gyro(Vector3::new(0.0, 0.0, 0.1), i64::MIN);

        assert_eq!(fusion.state(), FusionState::Tracking);
        assert!(fusion.gyro_matrix().iter().all(|v| v.is_finite()));
        assert!(fusion.gyro_orientation().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_blend_plain() {
        assert_relative_eq!(blend_angles(1.0, 0.0, 0.98), 0.98);
        assert_relative_eq!(blend_angles(-0.5, 0.5, 0.98), -0.48, epsilon = 1e-6);
    }

    #[test]
    fn test_blend_across_seam() {
        let fused = blend_angles(-3.0, 3.0, 0.98);
        assert!(fused < -3.0 && fused > -PI, "got {fused}");

        let fused = blend_angles(3.0, -3.0, 0.98);
        assert!(fused > 2.9 && fused <= PI, "got {fused}");
    }

    #[test]
    fn test_blend_zero_counts_as_non_negative() {
        // 0.98 * (-3 + 2π) wraps back below -π/2
        assert_relative_eq!(blend_angles(-3.0, 0.0, 0.98), 0.98 * (TAU - 3.0) - TAU, epsilon = 1e-5);
        assert_relative_eq!(blend_angles(-3.0, 0.0, 0.98), -3.065_664, epsilon = 1e-5);

        // 0.02 * (-3 + 2π), no wrap needed
        assert_relative_eq!(blend_angles(0.0, -3.0, 0.98), 0.02 * (TAU - 3.0), epsilon = 1e-5);
        assert_relative_eq!(blend_angles(0.0, -3.0, 0.98), 0.065_664, epsilon = 1e-5);
    }

    #[test]
    fn test_fuse_feeds_back_into_gyro() {
        let mut fusion = OrientationFusion::new();
        fusion.set_acc_mag_orientation(Vector3::new(0.4, 0.1, -0.2));
        fusion.set_gyro_orientation(Vector3::new(0.2, 0.0, 0.0));

        fusion.fuse();
        assert_eq!(fusion.gyro_orientation(), fusion.fused_orientation());
        assert_eq!(
            fusion.gyro_matrix(),
            Matrix3::from_orientation(&fusion.fused_orientation())
        );
    }

    #[test]
    fn test_render_remap() {
        let mut fusion = OrientationFusion::new();
        fusion.set_acc_mag_orientation(Vector3::new(0.3, 0.2, 0.1));
        fusion.set_gyro_orientation(Vector3::new(0.3, 0.2, 0.1));

        let rotation = fusion.fuse();
        assert_relative_eq!(rotation.pitch, 0.1, epsilon = 1e-6);
        assert_relative_eq!(rotation.roll, -0.3, epsilon = 1e-6);
        assert_relative_eq!(rotation.heading, 0.2, epsilon = 1e-6);
    }

    #[test]
    fn test_rotation_vector_event() {
        let mut fusion = OrientationFusion::new();
        assert!(fusion.rotation_vector_rotation().is_none());

        // 60° about the quaternion's y component
        let half = 30.0f32.to_radians();
        fusion.handle_event(SensorEvent::RotationVector(Vector3::new(0.0, half.sin(), 0.0)));

        let rotation = fusion.rotation_vector_rotation().unwrap();
        assert_relative_eq!(rotation.heading, 60.0f32.to_radians(), epsilon = 1e-5);
        assert_relative_eq!(rotation.pitch, 0.0, epsilon = 1e-6);
        assert_relative_eq!(rotation.roll, 0.0, epsilon = 1e-6);

        // the complementary filter is not touched
        assert_eq!(fusion.state(), FusionState::Uninitialized);
    }
}
