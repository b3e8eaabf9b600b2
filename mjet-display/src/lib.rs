//! # mjet-display
//!
//! Windowed display sink for the mjet pipeline: decodes each JPEG frame
//! to RGB24 and blits it into an SDL2 window. The window doubles as a
//! cancellation channel — closing it (or pressing Escape) reports the
//! sink as no longer open, which ends the pipeline run.

pub mod decode;
pub mod display;

pub use decode::JpegDecoder;
pub use display::DisplayRenderer;

use thiserror::Error;

/// Errors from display setup and per-frame rendering.
#[derive(Debug, Error)]
pub enum DisplayError {
    /// SDL or window/canvas/texture construction failed.
    #[error("display init: {0}")]
    Init(String),

    /// The frame is not a decodable JPEG.
    #[error("jpeg decode: {0}")]
    Decode(String),

    /// The decoded image does not match the configured frame geometry.
    #[error("frame geometry mismatch: got {got_w}x{got_h}, expected {want_w}x{want_h}")]
    Geometry {
        got_w: u32,
        got_h: u32,
        want_w: u32,
        want_h: u32,
    },

    /// Texture update or canvas copy failed.
    #[error("render: {0}")]
    Render(String),
}
