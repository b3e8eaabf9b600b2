//! Framed byte-pipe sink.
//!
//! Per frame: big-endian `u64` timestamp, big-endian `u32` length, then
//! the JPEG bytes, flushed in writes no larger than the configured chunk
//! size so a slow reader on the other end never sees one giant write.

use std::fs::File;
use std::io::Write;
use std::os::fd::{FromRawFd, RawFd};

use crate::error::MjetError;

const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Writes length-prefixed frame records to an inherited file descriptor.
pub struct PipeSink {
    file: File,
    chunk_size: usize,
}

impl PipeSink {
    /// Adopt `fd`, which the caller promises is open and writable; the
    /// sink owns it from here and closes it on drop. A `chunk_size` of 0
    /// selects the default.
    pub fn new(fd: RawFd, chunk_size: u32) -> Result<Self, MjetError> {
        if fd < 0 {
            return Err(MjetError::Io(std::io::Error::from_raw_os_error(
                libc::EBADF,
            )));
        }
        // Safety: ownership of the descriptor transfers to the File; the
        // caller hands it over exactly once (CLI-inherited fd).
        let file = unsafe { File::from_raw_fd(fd) };
        Ok(Self {
            file,
            chunk_size: match chunk_size {
                0 => DEFAULT_CHUNK_SIZE,
                n => n as usize,
            },
        })
    }

    /// Write one frame record. Partial writes loop to completion and
    /// EINTR is retried inside `write_all`; any other error fails the
    /// call (and is swallowed by the pipeline runtime).
    pub fn write_frame(&mut self, timestamp_us: u64, data: &[u8]) -> std::io::Result<()> {
        write_record(&mut self.file, self.chunk_size, timestamp_us, data)
    }
}

fn write_record<W: Write>(
    out: &mut W,
    chunk_size: usize,
    timestamp_us: u64,
    data: &[u8],
) -> std::io::Result<()> {
    out.write_all(&timestamp_us.to_be_bytes())?;
    out.write_all(&(data.len() as u32).to_be_bytes())?;
    for chunk in data.chunks(chunk_size) {
        out.write_all(chunk)?;
    }
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────
