//! AR Fusion - camera frame conversion and orientation sensor fusion for augmented reality
//!
//! This library holds the two numeric cores an augmented reality viewer needs
//! between the platform (camera and sensors) and the renderer:
//!
//! - a YCbCr 4:2:0 to RGB565 converter that turns camera preview frames into
//!   16-bit texture data using fixed-point arithmetic
//! - a complementary filter that fuses gyroscope integration with the absolute
//!   orientation derived from the accelerometer and magnetometer
//!
//! Camera sessions, sensor registration, timers and rendering stay with the
//! caller: frames and sensor samples go in, RGB565 buffers and fused
//! orientations come out.
//!
//! # Features
//!
//! - Fixed-point YCbCr to RGB565 conversion into caller-owned buffers
//! - Gyroscope integration via axis-angle delta quaternions
//! - Accelerometer/magnetometer absolute orientation with degenerate-reading rejection
//! - Complementary filter with ±180° wraparound handling and drift feedback
//! - Lock-protected shared estimator and fixed-rate fuse loop for multi-threaded hosts
//!
//! # Quick Start
//!
//! ```rust
//! use nalgebra::Vector3;
//! use ar_fusion::{OrientationFusion, PixelConverter};
//!
//! // Orientation
//! let mut fusion = OrientationFusion::new();
//! fusion.ingest_accel_mag(Vector3::new(0.0, 0.0, 9.81), Vector3::new(0.0, 30.0, -30.0));
//! fusion.ingest_gyro(Vector3::new(0.01, 0.0, 0.0), 0);
//! fusion.ingest_gyro(Vector3::new(0.01, 0.0, 0.0), 20_000_000); // 20 ms later
//! let rotation = fusion.fuse();
//! println!("pitch {} roll {} heading {}", rotation.pitch, rotation.roll, rotation.heading);
//!
//! // Camera frame
//! let converter = PixelConverter::new(320, 240).unwrap();
//! let frame = vec![128u8; converter.source_len()];
//! let texture = converter.convert_to_vec(&frame).unwrap();
//! assert!(texture.len() >= 320 * 240 * 2);
//! ```

pub mod compass;
mod error;
mod fusion;
mod math;
pub mod pixel;
mod shared;
mod types;

// Re-export all public types and functions
pub use compass::{calculate_heading, rotation_from_accel_mag};
pub use error::ConvertError;
pub use fusion::OrientationFusion;
pub use math::{DEG_TO_RAD, NS_TO_S, QuaternionExt, RAD_TO_DEG, RotationMatrixExt, Vector3Ext};
pub use pixel::{
    PixelConverter, RGB565_SLACK, interleave_chroma_planes, rgb565_buffer_len, unpack_rgb565,
    ycbcr_to_rgb565,
};
pub use shared::{FuseLoop, MIN_FUSE_PERIOD, SharedFusion};
pub use types::*;
