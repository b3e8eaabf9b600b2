//! Error types for pipeline setup and sink I/O.
//!
//! Only the *slow* paths are typed: socket binds, device configuration,
//! sink construction. The receive hot path treats the wire as lossy and
//! drops malformed input without constructing an error.

use std::net::SocketAddrV4;
use thiserror::Error;

/// The canonical error type for the mjet pipeline.
#[derive(Debug, Error)]
pub enum MjetError {
    // ── Setup errors ─────────────────────────────────────────────
    /// A UDP endpoint could not be created or bound.
    #[error("unavailable endpoint {addr}: {source}")]
    Endpoint {
        addr: SocketAddrV4,
        source: std::io::Error,
    },

    /// The capture device rejected a required capability or format.
    #[error("capture device {device}: {reason}")]
    Capture { device: String, reason: String },

    /// The recorder could not be set up or failed mid-write.
    #[error("recorder: {0}")]
    Record(String),

    /// The pipeline was assembled with an invalid consumer list.
    #[error("pipeline needs 1..={max} outputs, got {got}")]
    OutputCount { got: usize, max: usize },

    // ── Transmit errors ──────────────────────────────────────────
    /// A frame exceeds the sender's configured maximum.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The I/O layer reported a non-retryable error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
