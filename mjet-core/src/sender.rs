//! Frame transmission: one frame → segmented datagrams.
//!
//! The sender owns its socket and a single packet-sized scratch buffer
//! that is reused for every datagram; its contents are only valid inside
//! one `transmit` call.

use std::io::ErrorKind;
use std::net::{SocketAddrV4, UdpSocket};

use bytes::BytesMut;

use crate::endpoint;
use crate::error::MjetError;
use crate::wire::{self, HEADER_SIZE, PacketHeader};

/// Splits frames into header-tagged segments and emits them as UDP
/// datagrams to a pre-resolved remote address.
pub struct FrameSender {
    socket: UdpSocket,
    remote: SocketAddrV4,
    max_payload: usize,
    max_frame_size: usize,
    /// Scratch staging buffer, one packet large, reused across calls.
    scratch: BytesMut,
}

impl FrameSender {
    /// Bind `local` and target `remote`.
    ///
    /// `max_packet_size` bounds each datagram (header included) and must
    /// match the receiver's configuration; `max_frame_size` bounds a whole
    /// frame.
    pub fn new(
        local: SocketAddrV4,
        remote: SocketAddrV4,
        max_packet_size: u32,
        max_frame_size: u32,
    ) -> Result<Self, MjetError> {
        let socket = endpoint::bind(local)?;
        Ok(Self {
            socket,
            remote,
            max_payload: max_packet_size as usize - HEADER_SIZE,
            max_frame_size: max_frame_size as usize,
            scratch: BytesMut::with_capacity(max_packet_size as usize),
        })
    }

    /// Transmit one frame as `rounds` full emissions of its segments.
    ///
    /// Segments go out in ascending index order within each round, and
    /// rounds in order. Repetition is coarse forward-error correction:
    /// the datagrams are byte-identical and the receiver deduplicates by
    /// `(frame_ts_us, seg_idx)`. There is no pacing — the caller's frame
    /// cadence limits the rate.
    ///
    /// Fails with [`MjetError::FrameTooLarge`] for oversize frames and
    /// [`MjetError::Io`] on the first non-retryable send error, which
    /// aborts the remaining rounds.
    pub fn transmit(
        &mut self,
        timestamp_us: u64,
        frame: &[u8],
        rounds: u32,
    ) -> Result<(), MjetError> {
        if frame.len() > self.max_frame_size {
            return Err(MjetError::FrameTooLarge {
                size: frame.len(),
                max: self.max_frame_size,
            });
        }
        if frame.is_empty() {
            // Zero segments: nothing to put on the wire.
            return Ok(());
        }

        let seg_count = wire::segment_count(frame.len(), self.max_payload);

        for _round in 0..rounds {
            for (seg_idx, payload) in frame.chunks(self.max_payload).enumerate() {
                let header = PacketHeader {
                    frame_ts_us: timestamp_us,
                    seg_idx: seg_idx as u32,
                    seg_count,
                    payload_len: payload.len() as u32,
                };

                self.scratch.clear();
                header.encode_into(&mut self.scratch);
                self.scratch.extend_from_slice(payload);

                self.send_datagram()?;
            }
        }

        Ok(())
    }

    /// Send the staged scratch buffer, retrying transparently on EINTR.
    fn send_datagram(&self) -> Result<(), MjetError> {
        loop {
            match self.socket.send_to(&self.scratch, self.remote) {
                Ok(_) => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(MjetError::Io(e)),
            }
        }
    }

    /// The remote address this sender targets.
    pub fn remote(&self) -> SocketAddrV4 {
        self.remote
    }
}

// ── Tests ────────────────────────────────────────────────────────
