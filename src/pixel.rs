//! YCbCr 4:2:0 to RGB565 frame conversion
//!
//! Camera preview frames arrive as a full-resolution luma plane followed by a
//! half-resolution chroma plane of interleaved `Cr, Cb` byte pairs (one pair per
//! 2×2 luma block). The converter emits little-endian RGB565 pixels ready for
//! upload into a 16-bit texture.
//!
//! # Example
//! ```
//! use ar_fusion::{PixelConverter, unpack_rgb565};
//!
//! let (width, height) = (4, 2);
//! let mut frame = vec![200u8; width * height]; // luma
//! frame.extend_from_slice(&[128u8; 4]);         // neutral chroma
//!
//! let converter = PixelConverter::new(width, height).unwrap();
//! let rgb565 = converter.convert_to_vec(&frame).unwrap();
//!
//! let [r, g, b] = unpack_rgb565(rgb565[0], rgb565[1]);
//! assert_eq!((r, g, b), (200, 200, 200));
//! ```

use log::trace;

use crate::error::ConvertError;

/// Extra bytes appended to allocated RGB565 buffers
///
/// Texture uploads on some encoders read a little past the last pixel row.
pub const RGB565_SLACK: usize = 4096;

/// Bytes needed to hold a converted frame, including [`RGB565_SLACK`]
///
/// Saturates at `usize::MAX` for dimensions [`PixelConverter::new`] rejects.
pub fn rgb565_buffer_len(width: usize, height: usize) -> usize {
    width
        .saturating_mul(height)
        .saturating_mul(2)
        .saturating_add(RGB565_SLACK)
}

/// Converter for a fixed frame size
///
/// Stateless apart from the validated dimensions, so one converter can be
/// shared by any number of threads. Each destination buffer must still have a
/// single writer at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelConverter {
    width: usize,
    height: usize,
    luma_len: usize,
    source_len: usize,
    output_len: usize,
}

impl PixelConverter {
    /// Create a converter for `width`×`height` frames
    ///
    /// # Errors
    /// [`ConvertError::InvalidDimensions`] if either dimension is zero, the
    /// width is odd, or the frame buffers would not fit in `usize`.
    pub fn new(width: usize, height: usize) -> Result<Self, ConvertError> {
        let invalid = ConvertError::InvalidDimensions { width, height };
        if width == 0 || height == 0 || width % 2 != 0 {
            return Err(invalid);
        }

        let luma_len = width.checked_mul(height).ok_or(invalid)?;
        let source_len = width
            .checked_mul(height.div_ceil(2))
            .and_then(|chroma_len| chroma_len.checked_add(luma_len))
            .ok_or(invalid)?;
        let output_len = luma_len.checked_mul(2).ok_or(invalid)?;
        // convert_to_vec allocates the slack on top
        if output_len.checked_add(RGB565_SLACK).is_none() {
            return Err(invalid);
        }

        Ok(Self {
            width,
            height,
            luma_len,
            source_len,
            output_len,
        })
    }

    /// Frame width in pixels
    pub fn width(&self) -> usize {
        self.width
    }

    /// Frame height in pixels
    pub fn height(&self) -> usize {
        self.height
    }

    /// Bytes a source frame must hold: the luma plane plus one chroma row of
    /// `width` bytes for every pair of luma rows
    pub fn source_len(&self) -> usize {
        self.source_len
    }

    /// Bytes written to the destination, without slack
    pub fn output_len(&self) -> usize {
        self.output_len
    }

    /// Convert one frame into a caller-owned buffer
    ///
    /// Only the first [`output_len`](Self::output_len) bytes of `dst` are
    /// written. Identical inputs always produce identical output.
    ///
    /// # Errors
    /// [`ConvertError::SourceTooSmall`] or [`ConvertError::DestinationTooSmall`]
    /// when a buffer is shorter than the frame requires; `dst` is untouched.
    pub fn convert(&self, src: &[u8], dst: &mut [u8]) -> Result<(), ConvertError> {
        let expected = self.source_len();
        if src.len() < expected {
            return Err(ConvertError::SourceTooSmall {
                expected,
                actual: src.len(),
            });
        }
        let expected = self.output_len();
        if dst.len() < expected {
            return Err(ConvertError::DestinationTooSmall {
                expected,
                actual: dst.len(),
            });
        }

        trace!(
            "converting {}x{} frame ({} source bytes, {} destination bytes)",
            self.width,
            self.height,
            src.len(),
            dst.len()
        );

        let width = self.width;
        let lum_end = self.luma_len;
        let mut lum_ptr = 0;
        let mut chr_ptr = lum_end;
        let mut out_ptr = 0;
        let mut line_end = width;

        loop {
            // back to the start of the chroma row shared by this luma row pair
            if lum_ptr == line_end {
                if lum_ptr == lum_end {
                    break;
                }
                chr_ptr = lum_end + ((lum_ptr >> 1) / width) * width;
                line_end += width;
            }

            let y1 = i32::from(src[lum_ptr]);
            let y2 = i32::from(src[lum_ptr + 1]);
            let cr = i32::from(src[chr_ptr]) - 128;
            let cb = i32::from(src[chr_ptr + 1]) - 128;
            lum_ptr += 2;
            chr_ptr += 2;

            let [lo, hi] = ycbcr_pixel_to_rgb565(y1, cb, cr);
            dst[out_ptr] = lo;
            dst[out_ptr + 1] = hi;
            let [lo, hi] = ycbcr_pixel_to_rgb565(y2, cb, cr);
            dst[out_ptr + 2] = lo;
            dst[out_ptr + 3] = hi;
            out_ptr += 4;
        }

        Ok(())
    }

    /// Convert one frame into a freshly allocated buffer of
    /// [`rgb565_buffer_len`] bytes
    pub fn convert_to_vec(&self, src: &[u8]) -> Result<Vec<u8>, ConvertError> {
        let mut dst = vec![0u8; self.output_len + RGB565_SLACK];
        self.convert(src, &mut dst)?;
        Ok(dst)
    }
}

/// Convert a YCbCr 4:2:0 frame to little-endian RGB565
///
/// One-shot form of [`PixelConverter::convert`].
///
/// # Arguments
/// * `src` - Luma plane followed by interleaved `Cr, Cb` chroma pairs
/// * `width` - Frame width in pixels (even)
/// * `height` - Frame height in pixels
/// * `dst` - Output buffer of at least `width * height * 2` bytes
pub fn ycbcr_to_rgb565(
    src: &[u8],
    width: usize,
    height: usize,
    dst: &mut [u8],
) -> Result<(), ConvertError> {
    PixelConverter::new(width, height)?.convert(src, dst)
}

/// Fixed-point (8-bit fraction) YCbCr to RGB with chroma already centered,
/// packed as RGB565 `[low, high]`
#[inline]
fn ycbcr_pixel_to_rgb565(y: i32, cb: i32, cr: i32) -> [u8; 2] {
    let b = (y + ((454 * cb) >> 8)).clamp(0, 255);
    let g = (y - ((88 * cb + 183 * cr) >> 8)).clamp(0, 255);
    let r = (y + ((359 * cr) >> 8)).clamp(0, 255);

    [
        (((g & 0x3c) << 3) | (b >> 3)) as u8,
        ((r & 0xf8) | (g >> 5)) as u8,
    ]
}

/// Unpack a little-endian RGB565 pixel to 8-bit `[r, g, b]`
///
/// Channels are widened by shifting, so the low 3 (red, blue) or 2 (green)
/// bits of each result are zero.
pub fn unpack_rgb565(lo: u8, hi: u8) -> [u8; 3] {
    let pixel = u16::from_le_bytes([lo, hi]);
    let r = ((pixel >> 11) & 0x1f) as u8;
    let g = ((pixel >> 5) & 0x3f) as u8;
    let b = (pixel & 0x1f) as u8;
    [r << 3, g << 2, b << 3]
}

/// Pack a three-plane camera image into the semi-planar layout the converter reads
///
/// The luma plane is copied as is, followed by `u[i], v[i]` for every index
/// of the chroma planes. Row padding in the planes is carried over unchanged.
///
/// # Errors
/// [`ConvertError::ChromaPlaneMismatch`] if `u` and `v` differ in length.
pub fn interleave_chroma_planes(y: &[u8], u: &[u8], v: &[u8]) -> Result<Vec<u8>, ConvertError> {
    if u.len() != v.len() {
        return Err(ConvertError::ChromaPlaneMismatch {
            u: u.len(),
            v: v.len(),
        });
    }

    let mut packed = Vec::with_capacity(y.len() + u.len() + v.len());
    packed.extend_from_slice(y);
    for (&cb, &cr) in u.iter().zip(v) {
        packed.push(cb);
        packed.push(cr);
    }
    Ok(packed)
}
