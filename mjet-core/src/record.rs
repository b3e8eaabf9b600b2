//! Matroska/MJPEG recording sink.
//!
//! Incoming frames are already complete JPEG images, so no encoding
//! happens here — each frame is muxed as one keyframe packet into an
//! MJPEG video stream. PTS is monotonic: the first frame's wire
//! timestamp becomes the zero point and later frames are rescaled from
//! microseconds into the stream time base.

use std::path::Path;

use ffmpeg_next as ffmpeg;

use ffmpeg::{Rational, Rescale};

use crate::error::MjetError;

/// Muxes timestamped JPEG frames into a Matroska file.
pub struct FrameRecorder {
    octx: ffmpeg::format::context::Output,
    /// Stream time base as the muxer finalized it at header time.
    time_base: Rational,
    /// Wire timestamp of the first recorded frame.
    base_ts: Option<u64>,
}

impl FrameRecorder {
    /// Create the container, declare one MJPEG video stream and write
    /// the header. Any failure is a fatal setup error.
    pub fn create(
        path: &Path,
        width: u32,
        height: u32,
        fps_num: u32,
        fps_den: u32,
    ) -> Result<Self, MjetError> {
        let fail = |e: ffmpeg::Error| MjetError::Record(e.to_string());

        ffmpeg::init().map_err(fail)?;

        let mut octx = ffmpeg::format::output_as(&path, "matroska").map_err(fail)?;

        {
            let mut stream = octx
                .add_stream(ffmpeg::encoder::find(ffmpeg::codec::Id::MJPEG))
                .map_err(fail)?;

            // Stream parameters are plain data here — there is no encoder
            // context to copy them from. Unsafe is confined to this block.
            unsafe {
                let par = (*stream.as_mut_ptr()).codecpar;
                (*par).codec_type = ffmpeg::ffi::AVMediaType::AVMEDIA_TYPE_VIDEO;
                (*par).codec_id = ffmpeg::ffi::AVCodecID::AV_CODEC_ID_MJPEG;
                (*par).width = width as i32;
                (*par).height = height as i32;
                (*par).format = ffmpeg::ffi::AVPixelFormat::AV_PIX_FMT_YUVJ420P as i32;
            }

            stream.set_time_base(Rational::new(fps_num as i32, fps_den as i32));
        }

        octx.write_header().map_err(fail)?;

        // The muxer may have adjusted the time base while writing the
        // header; use what it settled on.
        let time_base = octx
            .stream(0)
            .map(|s| s.time_base())
            .unwrap_or_else(|| Rational::new(fps_num as i32, fps_den as i32));

        Ok(Self {
            octx,
            time_base,
            base_ts: None,
        })
    }

    /// Mux one JPEG frame. Every frame is a keyframe — JPEG images are
    /// independently decodable.
    pub fn write_frame(&mut self, timestamp_us: u64, data: &[u8]) -> Result<(), MjetError> {
        if data.is_empty() {
            return Ok(());
        }

        let base = *self.base_ts.get_or_insert(timestamp_us);
        let rel_us = timestamp_us.saturating_sub(base) as i64;
        let pts = rel_us.rescale(Rational::new(1, 1_000_000), self.time_base);

        let mut packet = ffmpeg::Packet::copy(data);
        packet.set_stream(0);
        packet.set_pts(Some(pts));
        packet.set_dts(Some(pts));
        packet.set_flags(ffmpeg::codec::packet::Flags::KEY);

        packet
            .write_interleaved(&mut self.octx)
            .map_err(|e| MjetError::Record(e.to_string()))
    }
}

impl Drop for FrameRecorder {
    fn drop(&mut self) {
        let _ = self.octx.write_trailer();
    }
}

// ── Tests ────────────────────────────────────────────────────────
