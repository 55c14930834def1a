//! Absolute orientation from accelerometer and magnetometer readings

use log::trace;
use nalgebra::{Matrix3, Vector3};

use crate::math::{RAD_TO_DEG, RotationMatrixExt};

/// Standard gravity in m/s²
pub const STANDARD_GRAVITY: f32 = 9.81;

/// Squared acceleration below which the device is considered in free fall
const FREE_FALL_GRAVITY_SQUARED: f32 = 0.01 * STANDARD_GRAVITY * STANDARD_GRAVITY;

/// Minimum magnitude of the horizontal (east) vector before normalization
const MIN_HORIZONTAL_MAGNITUDE: f32 = 0.1;

/// Calculate the device-to-world rotation matrix from gravity and geomagnetic vectors
///
/// Builds an orthonormal frame the way the platform sensor manager does:
/// east is `magnetometer × accelerometer`, up is the normalized accelerometer,
/// and north is `up × east`. The rows of the returned matrix are east, north
/// and up expressed in device coordinates.
///
/// Returns `None` when the readings cannot define a frame: the device is in
/// free fall (`|a|² < 0.01·g²`) or the magnetic field is (nearly) parallel
/// to gravity, including a zero-length magnetometer vector.
///
/// # Arguments
/// * `accelerometer` - Accelerometer reading in m/s²
/// * `magnetometer` - Magnetometer reading in µT
///
/// # Example
/// ```
/// use nalgebra::{Matrix3, Vector3};
/// use ar_fusion::compass::rotation_from_accel_mag;
///
/// // Flat on a table, top edge pointing north
/// let accel = Vector3::new(0.0, 0.0, 9.81);
/// let mag = Vector3::new(0.0, 22.0, -40.0);
/// let r = rotation_from_accel_mag(accel, mag).unwrap();
/// assert!((r - Matrix3::identity()).norm() < 1e-6);
/// ```
pub fn rotation_from_accel_mag(
    accelerometer: Vector3<f32>,
    magnetometer: Vector3<f32>,
) -> Option<Matrix3<f32>> {
    let norm_squared_a = accelerometer.norm_squared();
    if norm_squared_a < FREE_FALL_GRAVITY_SQUARED {
        trace!("rejecting accel/mag pair: free fall ({norm_squared_a} m²/s⁴)");
        return None;
    }

    let east = magnetometer.cross(&accelerometer);
    let norm_east = east.norm();
    if norm_east < MIN_HORIZONTAL_MAGNITUDE {
        trace!("rejecting accel/mag pair: field parallel to gravity ({norm_east})");
        return None;
    }

    let east = east / norm_east;
    let up = accelerometer / norm_squared_a.sqrt();
    let north = up.cross(&east);

    #[rustfmt::skip]
    let rotation = Matrix3::new(
        east.x, east.y, east.z,
        north.x, north.y, north.z,
        up.x, up.y, up.z,
    );
    Some(rotation)
}

/// Calculate tilt-compensated magnetic heading
///
/// The azimuth of the accelerometer/magnetometer rotation matrix, in degrees
/// (range: -180° to +180°, 0° = magnetic north, 90° = east).
///
/// Returns `None` for degenerate readings, see [`rotation_from_accel_mag`].
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use ar_fusion::compass::calculate_heading;
///
/// let accel = Vector3::new(0.0, 0.0, 9.81); // Level device
/// let mag = Vector3::new(0.0, 30.0, -30.0); // Top edge pointing north
/// let heading = calculate_heading(accel, mag).unwrap();
/// assert!(heading.abs() < 1.0);
/// ```
pub fn calculate_heading(accelerometer: Vector3<f32>, magnetometer: Vector3<f32>) -> Option<f32> {
    rotation_from_accel_mag(accelerometer, magnetometer).map(|r| r.orientation().x * RAD_TO_DEG)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use core::f32::consts::FRAC_PI_2;

    fn level() -> Vector3<f32> {
        Vector3::new(0.0, 0.0, 9.81)
    }

    #[test]
    fn test_compass_cardinal_directions() {
        // Field vectors as seen by a level device whose top edge faces each direction
        let cases = [
            (Vector3::new(0.0, 30.0, -30.0), 0.0),   // north
            (Vector3::new(-30.0, 0.0, -30.0), 90.0), // east
            (Vector3::new(30.0, 0.0, -30.0), -90.0), // west
        ];

        for (mag, expected) in cases {
            let heading = calculate_heading(level(), mag).unwrap();
            assert!(
                (heading - expected).abs() < 1.0,
                "expected {expected}°, got {heading}°"
            );
        }

        let south = calculate_heading(level(), Vector3::new(0.0, -30.0, -30.0)).unwrap();
        assert!(
            (south.abs() - 180.0).abs() < 1.0,
            "South heading should be ±180°, got {}",
            south
        );
    }

    #[test]
    fn test_rotation_is_orthonormal() {
        let accel = Vector3::new(1.2, 3.4, 8.9);
        let mag = Vector3::new(-12.0, 25.0, -31.0);
        let r = rotation_from_accel_mag(accel, mag).unwrap();

        assert_relative_eq!(r * r.transpose(), Matrix3::identity(), epsilon = 1e-5);
        assert_relative_eq!(r.determinant(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_free_fall_rejected() {
        let accel = Vector3::new(0.1, 0.2, 0.3);
        let mag = Vector3::new(0.0, 30.0, -30.0);
        assert!(rotation_from_accel_mag(accel, mag).is_none());
    }

    #[test]
    fn test_parallel_field_rejected() {
        // Magnetic field exactly vertical
        assert!(rotation_from_accel_mag(level(), Vector3::new(0.0, 0.0, -50.0)).is_none());
        // No field at all
        assert!(rotation_from_accel_mag(level(), Vector3::zeros()).is_none());
    }

    #[test]
    fn test_device_upright() {
        // Portrait, screen facing south, field horizontal component pointing north
        let accel = Vector3::new(0.0, 9.8, 0.0);
        let mag = Vector3::new(0.0, 0.0, -50.0);
        let r = rotation_from_accel_mag(accel, mag).unwrap();
        let orientation = r.orientation();

        assert_relative_eq!(orientation.y, -FRAC_PI_2, epsilon = 1e-4);
    }
}
