//! Rotation math and nalgebra extensions for the AR fusion library
//!
//! Rotation matrices follow the platform sensor convention: row-major, mapping
//! device coordinates to world coordinates, with orientation triples stored in
//! (azimuth, pitch, roll) order.

use nalgebra::{Matrix3, Quaternion, Vector3};

/// Mathematical constants
pub const DEG_TO_RAD: f32 = core::f32::consts::PI / 180.0;
pub const RAD_TO_DEG: f32 = 180.0 / core::f32::consts::PI;

/// Nanoseconds to seconds
pub const NS_TO_S: f32 = 1.0 / 1_000_000_000.0;

/// Extension trait for Vector3 operations
pub trait Vector3Ext {
    /// Normalize the vector, returning zero vector if magnitude is not above `epsilon`
    fn normalize_above(&self, epsilon: f32) -> Vector3<f32>;

    /// Convert degrees to radians
    fn deg_to_rad(&self) -> Vector3<f32>;

    /// Convert radians to degrees
    fn rad_to_deg(&self) -> Vector3<f32>;
}

impl Vector3Ext for Vector3<f32> {
    fn normalize_above(&self, epsilon: f32) -> Vector3<f32> {
        let mag = self.norm();
        if mag > epsilon {
            *self / mag
        } else {
            Vector3::zeros()
        }
    }

    fn deg_to_rad(&self) -> Vector3<f32> {
        *self * DEG_TO_RAD
    }

    fn rad_to_deg(&self) -> Vector3<f32> {
        *self * RAD_TO_DEG
    }
}

/// Extension trait for rotation matrices in the sensor convention
pub trait RotationMatrixExt {
    /// Compose a rotation matrix from (azimuth, pitch, roll) angles in radians
    ///
    /// Built from elementary rotations about z (azimuth), x (pitch) and
    /// y (roll), composed as `Rz · (Rx · Ry)`.
    fn from_orientation(orientation: &Vector3<f32>) -> Matrix3<f32>;

    /// Convert a quaternion to a rotation matrix
    ///
    /// A zero quaternion yields the identity, matching the platform routine.
    fn from_quaternion(q: &Quaternion<f32>) -> Matrix3<f32>;

    /// Decompose into (azimuth, pitch, roll) angles in radians
    ///
    /// Azimuth and roll are in [-π, π], pitch in [-π/2, π/2].
    fn orientation(&self) -> Vector3<f32>;
}

impl RotationMatrixExt for Matrix3<f32> {
    fn from_orientation(orientation: &Vector3<f32>) -> Matrix3<f32> {
        let (sin_z, cos_z) = orientation.x.sin_cos();
        let (sin_x, cos_x) = orientation.y.sin_cos();
        let (sin_y, cos_y) = orientation.z.sin_cos();

        // about x (pitch)
        #[rustfmt::skip]
        let x_m = Matrix3::new(
            1.0, 0.0, 0.0,
            0.0, cos_x, sin_x,
            0.0, -sin_x, cos_x,
        );

        // about y (roll)
        #[rustfmt::skip]
        let y_m = Matrix3::new(
            cos_y, 0.0, sin_y,
            0.0, 1.0, 0.0,
            -sin_y, 0.0, cos_y,
        );

        // about z (azimuth)
        #[rustfmt::skip]
        let z_m = Matrix3::new(
            cos_z, sin_z, 0.0,
            -sin_z, cos_z, 0.0,
            0.0, 0.0, 1.0,
        );

        z_m * (x_m * y_m)
    }

    fn from_quaternion(q: &Quaternion<f32>) -> Matrix3<f32> {
        let (q0, q1, q2, q3) = (q.w, q.i, q.j, q.k);

        let sq_q1 = 2.0 * q1 * q1;
        let sq_q2 = 2.0 * q2 * q2;
        let sq_q3 = 2.0 * q3 * q3;
        let q1_q2 = 2.0 * q1 * q2;
        let q3_q0 = 2.0 * q3 * q0;
        let q1_q3 = 2.0 * q1 * q3;
        let q2_q0 = 2.0 * q2 * q0;
        let q2_q3 = 2.0 * q2 * q3;
        let q1_q0 = 2.0 * q1 * q0;

        #[rustfmt::skip]
        let m = Matrix3::new(
            1.0 - sq_q2 - sq_q3, q1_q2 - q3_q0, q1_q3 + q2_q0,
            q1_q2 + q3_q0, 1.0 - sq_q1 - sq_q3, q2_q3 - q1_q0,
            q1_q3 - q2_q0, q2_q3 + q1_q0, 1.0 - sq_q1 - sq_q2,
        );
        m
    }

    fn orientation(&self) -> Vector3<f32> {
        Vector3::new(
            self[(0, 1)].atan2(self[(1, 1)]),
            (-self[(2, 1)]).asin(),
            (-self[(2, 0)]).atan2(self[(2, 2)]),
        )
    }
}

/// Extension trait for quaternions built from raw sensor values
pub trait QuaternionExt {
    /// Delta rotation for a gyroscope sample
    ///
    /// Integrates `rate` (rad/s) about its own axis over `time_factor` seconds,
    /// producing `(sin(θ/2)·axis, cos(θ/2))` with `θ/2 = |rate|·time_factor`.
    /// Below `epsilon` the axis is zero, so the result is the identity.
    fn from_gyro(rate: &Vector3<f32>, time_factor: f32, epsilon: f32) -> Quaternion<f32>;

    /// Quaternion from the vector part of a platform rotation vector
    ///
    /// The scalar part is recovered as `sqrt(1 - |v|²)`, clamped at zero.
    fn from_rotation_vector(v: &Vector3<f32>) -> Quaternion<f32>;
}

impl QuaternionExt for Quaternion<f32> {
    fn from_gyro(rate: &Vector3<f32>, time_factor: f32, epsilon: f32) -> Quaternion<f32> {
        let omega_magnitude = rate.norm();
        let axis = rate.normalize_above(epsilon);

        let theta_over_two = omega_magnitude * time_factor;
        let (sin_theta_over_two, cos_theta_over_two) = theta_over_two.sin_cos();

        Quaternion::from_parts(cos_theta_over_two, axis * sin_theta_over_two)
    }

    fn from_rotation_vector(v: &Vector3<f32>) -> Quaternion<f32> {
        let w_squared = 1.0 - v.x * v.x - v.y * v.y - v.z * v.z;
        let w = if w_squared > 0.0 { w_squared.sqrt() } else { 0.0 };
        Quaternion::new(w, v.x, v.y, v.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use core::f32::consts::{FRAC_PI_2, FRAC_PI_4};

    #[test]
    fn test_vector_extensions() {
        let v = Vector3::new(3.0f32, 4.0, 0.0);
        let normalized = v.normalize_above(1e-6);
        assert!((normalized.magnitude() - 1.0).abs() < 1e-6);

        let degrees = Vector3::new(180.0f32, -90.0, 0.0).deg_to_rad().rad_to_deg();
        assert_relative_eq!(degrees, Vector3::new(180.0, -90.0, 0.0), epsilon = 1e-4);

        let tiny = Vector3::new(1e-8f32, 0.0, 0.0);
        assert_eq!(tiny.normalize_above(1e-6), Vector3::zeros());
    }

    #[test]
    fn test_zero_orientation_is_identity() {
        let m = Matrix3::from_orientation(&Vector3::zeros());
        assert_eq!(m, Matrix3::identity());
    }

    #[test]
    fn test_orientation_round_trip() {
        let orientation = Vector3::new(0.3f32, -0.2, 0.5);
        let m = Matrix3::from_orientation(&orientation);
        assert_relative_eq!(m.orientation(), orientation, epsilon = 1e-5);
        assert_relative_eq!(m.determinant(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_azimuth_only_matrix() {
        // 90° azimuth rotates the device y axis onto world x
        let m = Matrix3::from_orientation(&Vector3::new(FRAC_PI_2, 0.0, 0.0));
        #[rustfmt::skip]
        let expected = Matrix3::new(
            0.0, 1.0, 0.0,
            -1.0, 0.0, 0.0,
            0.0, 0.0, 1.0,
        );
        assert_relative_eq!(m, expected, epsilon = 1e-6);
    }

    #[test]
    fn test_zero_quaternion_is_identity() {
        let m = Matrix3::from_quaternion(&Quaternion::new(0.0, 0.0, 0.0, 0.0));
        assert_eq!(m, Matrix3::identity());
    }

    #[test]
    fn test_quaternion_matrix_about_z() {
        let half = FRAC_PI_4 / 2.0;
        let q = Quaternion::new(half.cos(), 0.0, 0.0, half.sin());
        let m = Matrix3::from_quaternion(&q);

        let c = FRAC_PI_4.cos();
        let s = FRAC_PI_4.sin();
        #[rustfmt::skip]
        let expected = Matrix3::new(
            c, -s, 0.0,
            s, c, 0.0,
            0.0, 0.0, 1.0,
        );
        assert_relative_eq!(m, expected, epsilon = 1e-6);
    }

    #[test]
    fn test_gyro_delta_below_epsilon() {
        let q = Quaternion::from_gyro(&Vector3::new(1e-7, 0.0, 0.0), 0.025, 1e-6);
        assert_eq!(q.imag(), Vector3::zeros());
        assert_relative_eq!(q.w, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_gyro_delta_half_angle() {
        // 2 rad/s about x for a half step of 0.25 s: θ/2 = 0.5
        let q = Quaternion::from_gyro(&Vector3::new(2.0, 0.0, 0.0), 0.25, 1e-6);
        assert_relative_eq!(q.i, 0.5f32.sin(), epsilon = 1e-6);
        assert_relative_eq!(q.w, 0.5f32.cos(), epsilon = 1e-6);
        assert_relative_eq!(q.norm(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_rotation_vector_scalar_part() {
        let q = Quaternion::from_rotation_vector(&Vector3::new(0.0, 0.0, 0.6));
        assert_relative_eq!(q.w, 0.8, epsilon = 1e-6);

        // out-of-range vectors clamp instead of producing NaN
        let q = Quaternion::from_rotation_vector(&Vector3::new(1.0, 1.0, 0.0));
        assert_eq!(q.w, 0.0);
    }
}
