//! Synthetic still frames
//!
//! Real JPEG bytes generated in memory, so storage and capture paths can be
//! exercised without hardware.

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

/// Encode a gradient that shifts with `frame_number` as a JPEG.
///
/// Returns an empty buffer for zero-sized frames.
pub fn synthetic_jpeg(width: u32, height: u32, frame_number: u64) -> Vec<u8> {
    let base = (frame_number % 256) as u8;
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            base.wrapping_add((x % 256) as u8),
            base.wrapping_add((y % 256) as u8),
            base.wrapping_add(((x + y) % 256) as u8),
        ])
    });

    let mut out = Cursor::new(Vec::new());
    match DynamicImage::ImageRgb8(img).write_to(&mut out, ImageFormat::Jpeg) {
        Ok(()) => out.into_inner(),
        Err(e) => {
            log::warn!("synthetic frame {}x{} not encoded: {}", width, height, e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_jpeg_is_decodable() {
        let bytes = synthetic_jpeg(64, 48, 3);
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }

    #[test]
    fn test_frames_differ_by_number() {
        assert_ne!(synthetic_jpeg(16, 16, 0), synthetic_jpeg(16, 16, 128));
    }
}
