use ar_fusion::{OrientationFusion, RAD_TO_DEG};
use nalgebra::Vector3;

const SAMPLE_PERIOD_NS: i64 = 10_000_000; // 10 ms sample period
const FUSE_EVERY: i64 = 5; // fuse at 20 Hz

fn main() {
    let mut fusion = OrientationFusion::new();

    for step in 0..50 {
        // this loop should repeat each time new sensor data is available
        let accelerometer = Vector3::new(0.0, 0.0, 9.81); // replace this with actual accelerometer data in m/s²
        let magnetometer = Vector3::new(0.0, 30.0, -30.0); // replace this with actual magnetometer data in µT
        let gyroscope = Vector3::new(0.0, 0.0, -0.1); // replace this with actual gyroscope data in rad/s

        fusion.ingest_accel_mag(accelerometer, magnetometer);
        fusion.ingest_gyro(gyroscope, step * SAMPLE_PERIOD_NS);

        if step % FUSE_EVERY == FUSE_EVERY - 1 {
            let rotation = fusion.fuse();
            println!(
                "Pitch: {:.2}, Roll: {:.2}, Heading: {:.2}",
                rotation.pitch * RAD_TO_DEG,
                rotation.roll * RAD_TO_DEG,
                rotation.heading * RAD_TO_DEG
            );
        }
    }
}
