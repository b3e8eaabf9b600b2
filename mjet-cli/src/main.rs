//! mjet — entry point.
//!
//! ```text
//! mjet devices
//! mjet [--profile] capture DEVICE WIDTH HEIGHT FPS_NUM FPS_DEN <outputs…>
//! mjet [--profile] receive IP PORT PACKET_LEN JPEG_LEN WIDTH HEIGHT FPS_NUM FPS_DEN <outputs…>
//! ```
//!
//! Outputs (one or more, up to 8):
//!
//! ```text
//! send LOCAL_IP LOCAL_PORT REMOTE_IP REMOTE_PORT PACKET_LEN JPEG_LEN ROUNDS
//! record FILENAME
//! pipe FD CHUNK_SIZE
//! render WINDOW_WIDTH WINDOW_HEIGHT
//! ```

mod output;

use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use mjet_core::capture::{self, CaptureConfig, CaptureSource};
use mjet_core::{FrameReceiver, Pipeline};

use crate::output::{FrameGeometry, parse_outputs};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "mjet", about = "Lean MJPEG streaming over UDP", version)]
struct Cli {
    /// Enable latency profiling (statistics printed on shutdown).
    #[arg(long)]
    profile: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List V4L2 devices with MJPEG support.
    Devices,

    /// Capture from a V4L2 device and feed the outputs.
    Capture {
        /// Device node, e.g. /dev/video0.
        device: PathBuf,
        width: u32,
        height: u32,
        fps_num: u32,
        fps_den: u32,
        /// Output specs: send …, record …, pipe …, render …
        #[arg(required = true, num_args = 1.., allow_hyphen_values = true)]
        outputs: Vec<String>,
    },

    /// Reassemble frames from the UDP wire and feed the outputs.
    Receive {
        /// Local address to bind.
        ip: Ipv4Addr,
        port: u16,
        packet_len: u32,
        jpeg_len: u32,
        width: u32,
        height: u32,
        fps_num: u32,
        fps_den: u32,
        /// Output specs: send …, record …, pipe …, render …
        #[arg(required = true, num_args = 1.., allow_hyphen_values = true)]
        outputs: Vec<String>,
    },
}

// ── Main ─────────────────────────────────────────────────────────

fn main() -> ExitCode {
    // Argument errors exit 1 (not clap's default 2); --help and
    // --version render normally and exit 0.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // SIGINT/SIGTERM clear the flag; the loop reads it once per
    // iteration. A signal during a blocking call takes effect when the
    // call returns.
    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        if let Err(e) = ctrlc::set_handler(move || running.store(false, Ordering::Relaxed)) {
            eprintln!("failed to install signal handler: {e}");
            return ExitCode::FAILURE;
        }
    }

    let result = match cli.command {
        Command::Devices => {
            capture::list_devices();
            Ok(())
        }
        Command::Capture {
            device,
            width,
            height,
            fps_num,
            fps_den,
            outputs,
        } => run_capture(
            CaptureConfig {
                device,
                width,
                height,
                fps_num,
                fps_den,
            },
            &outputs,
            cli.profile,
            &running,
        ),
        Command::Receive {
            ip,
            port,
            packet_len,
            jpeg_len,
            width,
            height,
            fps_num,
            fps_den,
            outputs,
        } => run_receive(
            SocketAddrV4::new(ip, port),
            packet_len,
            jpeg_len,
            FrameGeometry {
                width,
                height,
                fps_num,
                fps_den,
            },
            &outputs,
            cli.profile,
            &running,
        ),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

// ── Pipelines ────────────────────────────────────────────────────

fn run_capture(
    config: CaptureConfig,
    outputs: &[String],
    profile: bool,
    running: &AtomicBool,
) -> Result<(), String> {
    let geometry = FrameGeometry {
        width: config.width,
        height: config.height,
        fps_num: config.fps_num,
        fps_den: config.fps_den,
    };

    // The device outlives the pipeline: the capture source borrows its
    // buffer ring, and drop order (pipeline, then device) reflects that.
    let device = capture::open_device(&config).map_err(|e| e.to_string())?;
    let source = CaptureSource::new(&device, &config).map_err(|e| e.to_string())?;
    let sinks = parse_outputs(outputs, geometry)?;
    let mut pipeline = Pipeline::new(source, sinks, profile).map_err(|e| e.to_string())?;

    info!(
        "capturing from {} at {}x{} [{}/{}]",
        config.device.display(),
        config.width,
        config.height,
        config.fps_num,
        config.fps_den
    );

    pipeline.run(running);
    report(&pipeline);
    Ok(())
}

fn run_receive(
    local: SocketAddrV4,
    packet_len: u32,
    jpeg_len: u32,
    geometry: FrameGeometry,
    outputs: &[String],
    profile: bool,
    running: &AtomicBool,
) -> Result<(), String> {
    if packet_len as usize <= mjet_core::HEADER_SIZE {
        return Err(format!(
            "PACKET_LEN must exceed the {}-byte header",
            mjet_core::HEADER_SIZE
        ));
    }

    let receiver =
        FrameReceiver::new(local, packet_len, jpeg_len).map_err(|e| e.to_string())?;
    let sinks = parse_outputs(outputs, geometry)?;
    let mut pipeline = Pipeline::new(receiver, sinks, profile).map_err(|e| e.to_string())?;

    info!("receiving on {local}");

    pipeline.run(running);
    report(&pipeline);
    Ok(())
}

fn report<P, C>(pipeline: &Pipeline<P, C>)
where
    P: mjet_core::FrameProducer,
    C: mjet_core::FrameConsumer,
{
    if let Some(profile) = pipeline.profile() {
        print!("{profile}");
    }
}
