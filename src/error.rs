//! Error types for frame conversion

/// Errors returned by the pixel conversion routines.
///
/// Every variant is a caller contract violation (an invalid argument). The
/// converter checks its preconditions up front and never writes partial output
/// when one of them fails.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertError {
    /// Frame dimensions are zero, or the width is odd.
    ///
    /// Luma is consumed two pixels at a time, so every scanline must hold an
    /// even number of pixels.
    #[error("invalid frame dimensions {width}x{height}")]
    InvalidDimensions {
        /// Requested frame width in pixels
        width: usize,
        /// Requested frame height in pixels
        height: usize,
    },

    /// The YCbCr source buffer is shorter than the frame it claims to hold.
    #[error("source buffer holds {actual} bytes, frame needs {expected}")]
    SourceTooSmall {
        /// Bytes required by the frame dimensions
        expected: usize,
        /// Bytes actually supplied
        actual: usize,
    },

    /// The RGB565 destination buffer cannot hold the converted frame.
    #[error("destination buffer holds {actual} bytes, frame needs {expected}")]
    DestinationTooSmall {
        /// Bytes required by the frame dimensions
        expected: usize,
        /// Bytes actually supplied
        actual: usize,
    },

    /// The two chroma planes of a planar image differ in length.
    #[error("chroma planes differ in length (u: {u}, v: {v})")]
    ChromaPlaneMismatch {
        /// Length of the U (Cb) plane
        u: usize,
        /// Length of the V (Cr) plane
        v: usize,
    },
}
