//! # mjet-core
//!
//! Core library for the mjet low-latency MJPEG streaming pipeline.
//!
//! This crate contains:
//! - **Wire framing**: `PacketHeader`, segmentation math, the time source
//! - **Endpoint**: blocking IPv4 UDP socket construction
//! - **Sender**: frame → segmented datagrams with FEC repetition
//! - **Receiver**: datagram reassembly with duplicate suppression
//! - **Pipeline**: `FrameProducer`/`FrameConsumer` seams and the runtime
//! - **Capture**: V4L2 MJPEG producer over a four-buffer MMAP ring
//! - **Sinks**: framed pipe writer, Matroska recorder (feature `recording`)
//! - **Profile**: per-run latency/fps statistics
//! - **Error**: `MjetError` — typed, `thiserror`-based setup errors

pub mod capture;
pub mod endpoint;
pub mod error;
pub mod pipe;
pub mod pipeline;
pub mod profile;
pub mod receiver;
#[cfg(feature = "recording")]
pub mod record;
pub mod sender;
pub mod wire;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use capture::{CaptureConfig, CaptureSource};
pub use error::MjetError;
pub use pipe::PipeSink;
pub use pipeline::{Frame, FrameConsumer, FrameProducer, MAX_SINKS, Pipeline};
pub use profile::Profile;
pub use receiver::{FrameReceiver, Reassembly};
#[cfg(feature = "recording")]
pub use record::FrameRecorder;
pub use sender::FrameSender;
pub use wire::{HEADER_SIZE, MAX_SEGMENTS_PER_FRAME, PacketHeader};
