//! Output specification parsing and the closed consumer set.
//!
//! The output list is a flat word sequence after the input arguments:
//!
//! ```text
//! send LOCAL_IP LOCAL_PORT REMOTE_IP REMOTE_PORT PACKET_LEN JPEG_LEN ROUNDS
//! record FILENAME
//! pipe FD CHUNK_SIZE
//! render WINDOW_WIDTH WINDOW_HEIGHT
//! ```
//!
//! The consumer set is closed and small, so [`Output`] is a sum type
//! with exhaustive dispatch rather than a boxed trait object.

use std::fmt::Display;
use std::net::SocketAddrV4;
use std::str::FromStr;

use tracing::warn;

use mjet_core::pipeline::{FrameConsumer, MAX_SINKS};
use mjet_core::{FrameSender, PipeSink};

#[cfg(feature = "recording")]
use mjet_core::FrameRecorder;

#[cfg(feature = "display")]
use mjet_display::DisplayRenderer;

/// Frame geometry shared by all outputs of one pipeline, taken from the
/// input arguments.
#[derive(Debug, Clone, Copy)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
}

// ── Output ───────────────────────────────────────────────────────

/// One configured pipeline output.
pub enum Output {
    Send { sender: FrameSender, rounds: u32 },
    #[cfg(feature = "recording")]
    Record(FrameRecorder),
    Pipe(PipeSink),
    #[cfg(feature = "display")]
    Render(DisplayRenderer),
}

impl FrameConsumer for Output {
    /// Sink failures degrade the stream, they never stop it: a failed
    /// send or write is logged and the sibling outputs still run.
    fn accept(&mut self, timestamp_us: u64, frame: &[u8]) {
        match self {
            Output::Send { sender, rounds } => {
                if let Err(e) = sender.transmit(timestamp_us, frame, *rounds) {
                    warn!("send to {} failed: {e}", sender.remote());
                }
            }
            #[cfg(feature = "recording")]
            Output::Record(recorder) => {
                if let Err(e) = recorder.write_frame(timestamp_us, frame) {
                    warn!("record failed: {e}");
                }
            }
            Output::Pipe(pipe) => {
                if let Err(e) = pipe.write_frame(timestamp_us, frame) {
                    warn!("pipe write failed: {e}");
                }
            }
            #[cfg(feature = "display")]
            Output::Render(renderer) => {
                if let Err(e) = renderer.render(frame) {
                    warn!("render failed: {e}");
                }
            }
        }
    }

    fn is_open(&mut self) -> bool {
        match self {
            #[cfg(feature = "display")]
            Output::Render(renderer) => renderer.is_open(),
            _ => true,
        }
    }
}

// ── Parsing ──────────────────────────────────────────────────────

/// Parse the trailing output words into configured outputs.
///
/// Construction happens during parsing, so a failure here unwinds the
/// outputs already built (sockets close, files finalize) before the
/// error reaches the caller.
pub fn parse_outputs(words: &[String], geometry: FrameGeometry) -> Result<Vec<Output>, String> {
    let mut outputs = Vec::new();
    let mut idx = 0;

    while idx < words.len() {
        if outputs.len() == MAX_SINKS {
            return Err(format!("at most {MAX_SINKS} outputs are supported"));
        }

        let spec = words[idx].as_str();
        idx += 1;
        let output = match spec {
            "send" => parse_send(words, &mut idx)?,
            "record" => parse_record(words, &mut idx, geometry)?,
            "pipe" => parse_pipe(words, &mut idx)?,
            "render" => parse_render(words, &mut idx, geometry)?,
            other => return Err(format!("unknown output: {other}")),
        };
        outputs.push(output);
    }

    Ok(outputs)
}

/// Take the next word and parse it as `T`.
fn arg<T>(words: &[String], idx: &mut usize, spec: &str, name: &str) -> Result<T, String>
where
    T: FromStr,
    T::Err: Display,
{
    let word = words
        .get(*idx)
        .ok_or_else(|| format!("{spec} is missing {name}"))?;
    *idx += 1;
    word.parse()
        .map_err(|e| format!("{spec} {name} '{word}': {e}"))
}

fn parse_send(words: &[String], idx: &mut usize) -> Result<Output, String> {
    let local_ip = arg(words, idx, "send", "LOCAL_IP")?;
    let local_port = arg(words, idx, "send", "LOCAL_PORT")?;
    let remote_ip = arg(words, idx, "send", "REMOTE_IP")?;
    let remote_port = arg(words, idx, "send", "REMOTE_PORT")?;
    let packet_len: u32 = arg(words, idx, "send", "PACKET_LEN")?;
    let jpeg_len: u32 = arg(words, idx, "send", "JPEG_LEN")?;
    let rounds: u32 = arg(words, idx, "send", "ROUNDS")?;

    if packet_len as usize <= mjet_core::HEADER_SIZE {
        return Err(format!(
            "send PACKET_LEN must exceed the {}-byte header",
            mjet_core::HEADER_SIZE
        ));
    }

    let sender = FrameSender::new(
        SocketAddrV4::new(local_ip, local_port),
        SocketAddrV4::new(remote_ip, remote_port),
        packet_len,
        jpeg_len,
    )
    .map_err(|e| e.to_string())?;

    Ok(Output::Send { sender, rounds })
}

#[cfg(feature = "recording")]
fn parse_record(
    words: &[String],
    idx: &mut usize,
    geometry: FrameGeometry,
) -> Result<Output, String> {
    let filename: std::path::PathBuf = arg(words, idx, "record", "FILENAME")?;
    let recorder = FrameRecorder::create(
        &filename,
        geometry.width,
        geometry.height,
        geometry.fps_num,
        geometry.fps_den,
    )
    .map_err(|e| e.to_string())?;
    Ok(Output::Record(recorder))
}

#[cfg(not(feature = "recording"))]
fn parse_record(
    _words: &[String],
    _idx: &mut usize,
    _geometry: FrameGeometry,
) -> Result<Output, String> {
    Err("this build has no recording support (rebuild with --features recording)".into())
}

fn parse_pipe(words: &[String], idx: &mut usize) -> Result<Output, String> {
    let fd: i32 = arg(words, idx, "pipe", "FD")?;
    let chunk_size: u32 = arg(words, idx, "pipe", "CHUNK_SIZE")?;
    let pipe = PipeSink::new(fd, chunk_size).map_err(|e| e.to_string())?;
    Ok(Output::Pipe(pipe))
}

#[cfg(feature = "display")]
fn parse_render(
    words: &[String],
    idx: &mut usize,
    geometry: FrameGeometry,
) -> Result<Output, String> {
    let window_width: u32 = arg(words, idx, "render", "WINDOW_WIDTH")?;
    let window_height: u32 = arg(words, idx, "render", "WINDOW_HEIGHT")?;
    let renderer = DisplayRenderer::new(
        geometry.width,
        geometry.height,
        window_width,
        window_height,
        "mjet",
    )
    .map_err(|e| e.to_string())?;
    Ok(Output::Render(renderer))
}

#[cfg(not(feature = "display"))]
fn parse_render(
    words: &[String],
    idx: &mut usize,
    _geometry: FrameGeometry,
) -> Result<Output, String> {
    // Consume the arguments so the error names the real problem.
    let _: u32 = arg(words, idx, "render", "WINDOW_WIDTH")?;
    let _: u32 = arg(words, idx, "render", "WINDOW_HEIGHT")?;
    Err("this build has no display support (rebuild with --features display)".into())
}

// ── Tests ────────────────────────────────────────────────────────
