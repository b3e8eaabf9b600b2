//! JPEG → RGB24 decoding for the display path.

use image::ImageFormat;

use crate::DisplayError;

/// Decodes JPEG frames into a reused packed-RGB24 buffer.
///
/// The decoder is created for one frame geometry; frames that decode to
/// a different size are rejected rather than stretched, since a
/// mid-stream geometry change means sender and receiver disagree about
/// the stream configuration.
pub struct JpegDecoder {
    width: u32,
    height: u32,
    rgb: Vec<u8>,
}

impl JpegDecoder {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            rgb: Vec::with_capacity(width as usize * height as usize * 3),
        }
    }

    /// Decode one JPEG frame. The returned slice is `width × height × 3`
    /// packed RGB, valid until the next call.
    pub fn decode(&mut self, jpeg: &[u8]) -> Result<&[u8], DisplayError> {
        let decoded = image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg)
            .map_err(|e| DisplayError::Decode(e.to_string()))?
            .into_rgb8();

        if decoded.width() != self.width || decoded.height() != self.height {
            return Err(DisplayError::Geometry {
                got_w: decoded.width(),
                got_h: decoded.height(),
                want_w: self.width,
                want_h: self.height,
            });
        }

        self.rgb = decoded.into_raw();
        Ok(&self.rgb)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::io::Cursor;

    fn jpeg_of(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x * 16) as u8, (y * 16) as u8, 128])
        });
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Jpeg).unwrap();
        out.into_inner()
    }

    #[test]
    fn decodes_matching_geometry() {
        let mut dec = JpegDecoder::new(16, 8);
        let rgb = dec.decode(&jpeg_of(16, 8)).unwrap();
        assert_eq!(rgb.len(), 16 * 8 * 3);
    }

    #[test]
    fn rejects_geometry_mismatch() {
        let mut dec = JpegDecoder::new(16, 8);
        let err = dec.decode(&jpeg_of(8, 8)).unwrap_err();
        assert!(matches!(err, DisplayError::Geometry { got_w: 8, .. }));
    }

    #[test]
    fn rejects_garbage() {
        let mut dec = JpegDecoder::new(16, 8);
        assert!(matches!(
            dec.decode(b"not a jpeg"),
            Err(DisplayError::Decode(_))
        ));
    }
}
