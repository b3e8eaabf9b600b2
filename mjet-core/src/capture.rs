//! V4L2 MJPEG capture producer.
//!
//! Frames come out of a ring of four memory-mapped buffers owned by the
//! device. Dequeuing hands one buffer to userspace; it returns to the
//! kernel when the next dequeue happens, so at most one buffer is
//! outside the ring at a time — the yielded frame borrow ends at the
//! next `next()` call.
//!
//! V4L2 stamps buffers with `CLOCK_MONOTONIC`. A one-time epoch offset
//! measured at startup translates those stamps onto the wall clock so
//! that downstream latency accounting works across hosts.
//!
//! # Platform
//!
//! Linux only — this module talks to `/dev/video*` via V4L2 ioctls.

use std::os::unix::fs::FileTypeExt;
use std::path::PathBuf;

use tracing::warn;
use v4l::buffer::Type;
use v4l::capability::Flags;
use v4l::frameinterval::FrameIntervalEnum;
use v4l::framesize::FrameSizeEnum;
use v4l::io::traits::{CaptureStream, Stream};
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::video::capture::parameters::Parameters;
use v4l::{Device, Format, FourCC, Fraction};

use crate::error::MjetError;
use crate::pipeline::{Frame, FrameProducer};
use crate::wire;

/// Size of the device's MMAP buffer ring.
pub const BUFFER_COUNT: u32 = 4;

const MJPG: FourCC = FourCC { repr: *b"MJPG" };

// ── Configuration ────────────────────────────────────────────────

/// Everything needed to open and configure one capture device.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Device node, e.g. `/dev/video0`.
    pub device: PathBuf,
    pub width: u32,
    pub height: u32,
    /// `timeperframe` numerator (1 for "30 fps" = 1/30 s per frame).
    pub fps_num: u32,
    /// `timeperframe` denominator.
    pub fps_den: u32,
}

// ── Device setup ─────────────────────────────────────────────────

/// Open and configure the device: capability check, MJPG format at the
/// requested geometry, requested frame interval.
///
/// Every rejection is a fatal setup error — a device that silently
/// captures the wrong format would poison every sink downstream.
pub fn open_device(config: &CaptureConfig) -> Result<Device, MjetError> {
    let fail = |reason: String| MjetError::Capture {
        device: config.device.display().to_string(),
        reason,
    };

    let meta = std::fs::metadata(&config.device).map_err(|e| fail(e.to_string()))?;
    if !meta.file_type().is_char_device() {
        return Err(fail("not a character device".into()));
    }

    let device = Device::with_path(&config.device).map_err(|e| fail(e.to_string()))?;

    let caps = device.query_caps().map_err(|e| fail(e.to_string()))?;
    if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
        return Err(fail("no video capture capability".into()));
    }
    if !caps.capabilities.contains(Flags::STREAMING) {
        return Err(fail("no streaming I/O capability".into()));
    }

    let requested = Format::new(config.width, config.height, MJPG);
    let actual = device
        .set_format(&requested)
        .map_err(|e| fail(e.to_string()))?;
    if actual.fourcc != MJPG {
        return Err(fail(format!("MJPG not accepted (driver chose {})", actual.fourcc)));
    }

    device
        .set_params(&Parameters::new(Fraction::new(config.fps_num, config.fps_den)))
        .map_err(|e| fail(e.to_string()))?;

    Ok(device)
}

// ── CaptureSource ────────────────────────────────────────────────

/// Streaming capture source over an opened device.
pub struct CaptureSource<'a> {
    stream: MmapStream<'a>,
    epoch_offset_us: u64,
}

impl<'a> CaptureSource<'a> {
    /// Map the buffer ring and start streaming.
    ///
    /// Streaming starts here, not lazily, so that a device that grants
    /// buffers but refuses to stream fails during setup.
    pub fn new(device: &'a Device, config: &CaptureConfig) -> Result<Self, MjetError> {
        let fail = |reason: String| MjetError::Capture {
            device: config.device.display().to_string(),
            reason,
        };

        let mut stream = MmapStream::with_buffers(device, Type::VideoCapture, BUFFER_COUNT)
            .map_err(|e| fail(e.to_string()))?;
        stream.start().map_err(|e| fail(e.to_string()))?;

        Ok(Self {
            stream,
            epoch_offset_us: wire::epoch_offset_us(),
        })
    }
}

impl FrameProducer for CaptureSource<'_> {
    fn next(&mut self) -> Option<Frame<'_>> {
        let epoch_offset_us = self.epoch_offset_us;
        match self.stream.next() {
            Ok((buf, meta)) => {
                let mono_us =
                    meta.timestamp.sec as u64 * 1_000_000 + meta.timestamp.usec as u64;
                Some(Frame {
                    timestamp_us: mono_us.wrapping_add(epoch_offset_us),
                    data: &buf[..meta.bytesused as usize],
                })
            }
            Err(e) => {
                warn!("frame capture failed: {e}");
                None
            }
        }
    }
}

// ── Device enumeration ───────────────────────────────────────────

/// Print every V4L2 device with MJPEG support, its discrete frame sizes
/// and the frame rates each size offers (the `devices` command).
pub fn list_devices() {
    for node in v4l::context::enum_devices() {
        let Ok(device) = Device::with_path(node.path()) else {
            continue;
        };
        if device.query_caps().is_err() {
            continue;
        }

        println!("{}:", node.path().display());

        let has_mjpeg = device
            .enum_formats()
            .map(|formats| formats.iter().any(|f| f.fourcc == MJPG))
            .unwrap_or(false);
        if !has_mjpeg {
            println!("  No MJPEG support");
            continue;
        }

        print_mjpeg_modes(&device);
    }
}

/// Only discrete modes are listed; stepwise sizes are rare on MJPEG
/// webcams and the CLI takes explicit dimensions anyway.
fn print_mjpeg_modes(device: &Device) {
    let Ok(sizes) = device.enum_framesizes(MJPG) else {
        return;
    };

    for size in sizes {
        let FrameSizeEnum::Discrete(discrete) = size.size else {
            continue;
        };
        print!("  {}x{}:", discrete.width, discrete.height);

        if let Ok(intervals) = device.enum_frameintervals(MJPG, discrete.width, discrete.height)
        {
            for interval in intervals {
                if let FrameIntervalEnum::Discrete(fraction) = interval.interval {
                    if fraction.numerator > 0 {
                        print!(" {}fps", fraction.denominator / fraction.numerator);
                    }
                }
            }
        }
        println!();
    }
}
