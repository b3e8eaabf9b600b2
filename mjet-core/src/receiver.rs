//! Frame reassembly: segmented datagrams → whole frames.
//!
//! The receiver tracks a **single in-flight frame**, keyed by the wire
//! timestamp. Any datagram carrying a different timestamp abandons the
//! partial frame and starts tracking the new one; late packets for the
//! old timestamp then fail the tracking check and are dropped. A frame
//! is therefore emitted only if it reassembles completely before any
//! later-timestamped packet arrives: completeness is traded for latency,
//! and fragments interleaved across frames are lost.
//!
//! The reassembly state machine ([`Reassembly`]) is socket-free so the
//! algorithm can be exercised without a network; [`FrameReceiver`] wraps
//! it with the blocking socket loop.

use std::io::ErrorKind;
use std::net::{SocketAddrV4, UdpSocket};

use crate::endpoint;
use crate::error::MjetError;
use crate::pipeline::{Frame, FrameProducer};
use crate::wire::{HEADER_SIZE, MAX_SEGMENTS_PER_FRAME, PacketHeader};

// ── SegmentBitmap ────────────────────────────────────────────────

const BITMAP_WORDS: usize = MAX_SEGMENTS_PER_FRAME as usize / 64;

/// Which segments of the tracked frame have been delivered.
///
/// 16 × 64-bit words cover [`MAX_SEGMENTS_PER_FRAME`] segments.
struct SegmentBitmap([u64; BITMAP_WORDS]);

impl SegmentBitmap {
    fn new() -> Self {
        Self([0; BITMAP_WORDS])
    }

    fn clear(&mut self) {
        self.0.fill(0);
    }

    fn set(&mut self, idx: u32) {
        self.0[(idx >> 6) as usize] |= 1 << (idx & 63);
    }

    fn test(&self, idx: u32) -> bool {
        self.0[(idx >> 6) as usize] & (1 << (idx & 63)) != 0
    }
}

// ── Reassembly ───────────────────────────────────────────────────

/// Socket-free reassembly state machine for one in-flight frame.
pub struct Reassembly {
    max_payload: usize,
    max_frame_size: usize,
    /// Segments land here at `seg_idx × max_payload`.
    frame_buf: Vec<u8>,
    /// Set by the tail segment; undefined until it arrives.
    frame_len: usize,
    frame_ts_us: u64,
    /// Timestamp of the frame currently being assembled.
    tracked_ts: u64,
    segments_received: u32,
    segments_expected: u32,
    bitmap: SegmentBitmap,
}

impl Reassembly {
    pub fn new(max_packet_size: u32, max_frame_size: u32) -> Self {
        Self {
            max_payload: max_packet_size as usize - HEADER_SIZE,
            max_frame_size: max_frame_size as usize,
            frame_buf: vec![0; max_frame_size as usize],
            frame_len: 0,
            frame_ts_us: 0,
            tracked_ts: 0,
            segments_received: 0,
            segments_expected: 0,
            bitmap: SegmentBitmap::new(),
        }
    }

    /// Feed one datagram into the state machine.
    ///
    /// Returns `true` when the tracked frame just completed; the frame is
    /// then available through [`frame`](Self::frame). Malformed,
    /// duplicate and out-of-bounds datagrams are silently dropped — every
    /// wire error is recoverable by waiting for the next frame.
    pub fn ingest(&mut self, datagram: &[u8]) -> bool {
        let Some(header) = PacketHeader::decode(datagram) else {
            return false;
        };

        // Frame switch: a new timestamp abandons the partial frame.
        // segments_expected is only ever assigned here, so the first
        // observed seg_count wins for the lifetime of the frame.
        if header.frame_ts_us != self.tracked_ts {
            self.tracked_ts = header.frame_ts_us;
            self.segments_received = 0;
            self.segments_expected = header.seg_count;
            self.bitmap.clear();
        }

        // Duplicate — a repeated FEC copy or a network echo.
        if self.bitmap.test(header.seg_idx) {
            return false;
        }

        let offset = header.seg_idx as usize * self.max_payload;
        let payload_len = header.payload_len as usize;
        if offset + payload_len > self.max_frame_size {
            return false;
        }

        self.frame_buf[offset..offset + payload_len]
            .copy_from_slice(&datagram[HEADER_SIZE..HEADER_SIZE + payload_len]);
        self.bitmap.set(header.seg_idx);
        self.segments_received += 1;

        // The tail segment determines the frame length; the frame is
        // still incomplete until every bit is set.
        if header.seg_idx + 1 == header.seg_count {
            self.frame_len = offset + payload_len;
            self.frame_ts_us = header.frame_ts_us;
        }

        self.segments_received == self.segments_expected
    }

    /// The completed frame. Valid after [`ingest`](Self::ingest) returned
    /// `true`, until the next datagram for a different frame is ingested.
    pub fn frame(&self) -> (u64, &[u8]) {
        (self.frame_ts_us, &self.frame_buf[..self.frame_len])
    }
}

// ── FrameReceiver ────────────────────────────────────────────────

/// Blocking UDP receiver yielding fully reassembled frames.
pub struct FrameReceiver {
    socket: UdpSocket,
    /// Scratch datagram buffer, one packet large, reused across reads.
    scratch: Vec<u8>,
    reassembly: Reassembly,
}

impl FrameReceiver {
    /// Bind `local` and prepare reassembly for the given size limits.
    ///
    /// `max_packet_size` and `max_frame_size` must match the sender's
    /// configuration — there is no negotiation on the wire.
    pub fn new(
        local: SocketAddrV4,
        max_packet_size: u32,
        max_frame_size: u32,
    ) -> Result<Self, MjetError> {
        let socket = endpoint::bind(local)?;
        Ok(Self {
            socket,
            scratch: vec![0; max_packet_size as usize],
            reassembly: Reassembly::new(max_packet_size, max_frame_size),
        })
    }

    /// Local address of the bound socket (useful with an OS-assigned
    /// port).
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.socket.local_addr()
    }

    /// Block until a frame is complete or the socket is gone.
    ///
    /// Returns the reassembled frame, borrowed until the next call, or
    /// `None` once the descriptor is closed (`EBADF`) — the only fatal
    /// condition. Every other receive error is a silent drop, like any
    /// other wire damage.
    pub fn next_frame(&mut self) -> Option<(u64, &[u8])> {
        loop {
            let n = match self.socket.recv(&mut self.scratch) {
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.raw_os_error() == Some(libc::EBADF) => return None,
                Err(_) => continue,
            };

            if n < HEADER_SIZE {
                continue;
            }

            if self.reassembly.ingest(&self.scratch[..n]) {
                return Some(self.reassembly.frame());
            }
        }
    }
}

impl FrameProducer for FrameReceiver {
    fn next(&mut self) -> Option<Frame<'_>> {
        self.next_frame()
            .map(|(timestamp_us, data)| Frame { timestamp_us, data })
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::segment_count;
    use bytes::BytesMut;

    const PACKET: u32 = 1400;
    const PAYLOAD: usize = PACKET as usize - HEADER_SIZE;
    const FRAME_MAX: u32 = 500_000;

    fn datagram(ts: u64, seg_idx: u32, seg_count: u32, payload: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        PacketHeader {
            frame_ts_us: ts,
            seg_idx,
            seg_count,
            payload_len: payload.len() as u32,
        }
        .encode_into(&mut buf);
        buf.extend_from_slice(payload);
        buf.to_vec()
    }

    /// Split `frame` into the datagrams a sender would emit.
    fn segmentize(ts: u64, frame: &[u8]) -> Vec<Vec<u8>> {
        let count = segment_count(frame.len(), PAYLOAD);
        frame
            .chunks(PAYLOAD)
            .enumerate()
            .map(|(i, chunk)| datagram(ts, i as u32, count, chunk))
            .collect()
    }

    fn reassembly() -> Reassembly {
        Reassembly::new(PACKET, FRAME_MAX)
    }

    #[test]
    fn roundtrip_multi_segment() {
        // 4140 = 3 × 1380: three full segments, no tail shortfall.
        let frame: Vec<u8> = (0..3 * PAYLOAD).map(|i| (i % 251) as u8).collect();
        let mut r = reassembly();

        let packets = segmentize(1_000_000, &frame);
        assert_eq!(packets.len(), 3);
        assert!(!r.ingest(&packets[0]));
        assert!(!r.ingest(&packets[1]));
        assert!(r.ingest(&packets[2]));

        let (ts, data) = r.frame();
        assert_eq!(ts, 1_000_000);
        assert_eq!(data, &frame[..]);
    }

    #[test]
    fn roundtrip_with_short_tail() {
        // Two full segments plus a one-byte tail.
        let frame: Vec<u8> = (0..2 * PAYLOAD + 1).map(|i| (i % 77) as u8).collect();
        let mut r = reassembly();

        let packets = segmentize(2_000_000, &frame);
        assert_eq!(packets.len(), 3);
        let tail = PacketHeader::decode(packets.last().unwrap()).unwrap();
        assert_eq!(tail.payload_len, 1);

        for (i, p) in packets.iter().enumerate() {
            assert_eq!(r.ingest(p), i == packets.len() - 1);
        }
        let (_, data) = r.frame();
        assert_eq!(data, &frame[..]);
    }

    #[test]
    fn single_byte_frame() {
        let mut r = reassembly();
        assert!(r.ingest(&datagram(5, 0, 1, &[0xEE])));
        let (ts, data) = r.frame();
        assert_eq!(ts, 5);
        assert_eq!(data, &[0xEE]);
    }

    #[test]
    fn out_of_order_segments_complete() {
        let frame: Vec<u8> = (0..2 * PAYLOAD + 10).map(|i| (i % 97) as u8).collect();
        let mut r = reassembly();
        let packets = segmentize(9, &frame);

        // Tail first: frame length is known early, completion still
        // requires every segment.
        assert!(!r.ingest(&packets[2]));
        assert!(!r.ingest(&packets[0]));
        assert!(r.ingest(&packets[1]));
        assert_eq!(r.frame().1, &frame[..]);
    }

    #[test]
    fn duplicates_are_idempotent() {
        let frame: Vec<u8> = (0..PAYLOAD + 100).map(|i| (i % 113) as u8).collect();
        let mut r = reassembly();
        let packets = segmentize(33, &frame);

        assert!(!r.ingest(&packets[0]));
        // FEC copies of an already-delivered segment must not be
        // double-counted toward completion.
        assert!(!r.ingest(&packets[0]));
        assert!(!r.ingest(&packets[0]));
        assert!(r.ingest(&packets[1]));
        assert_eq!(r.frame().1, &frame[..]);
    }

    #[test]
    fn frame_switch_discards_partial() {
        let old: Vec<u8> = vec![1; 2 * PAYLOAD];
        let new: Vec<u8> = vec![2; PAYLOAD / 2];
        let mut r = reassembly();

        // Segment 1 of the old frame is lost; the new frame's arrival
        // resets tracking, so the old frame is never emitted.
        let old_packets = segmentize(1000, &old);
        assert!(!r.ingest(&old_packets[0]));

        let new_packets = segmentize(2000, &new);
        assert!(r.ingest(&new_packets[0]));
        let (ts, data) = r.frame();
        assert_eq!(ts, 2000);
        assert_eq!(data, &new[..]);
    }

    #[test]
    fn late_packet_for_abandoned_frame_restarts_tracking() {
        let old = segmentize(1000, &vec![1u8; 2 * PAYLOAD]);
        let new = segmentize(2000, &vec![2u8; 2 * PAYLOAD]);
        let mut r = reassembly();

        assert!(!r.ingest(&old[0]));
        assert!(!r.ingest(&new[0]));
        // The straggler from ts=1000 re-switches tracking; neither frame
        // can now complete without a full re-delivery.
        assert!(!r.ingest(&old[1]));
        assert!(!r.ingest(&new[1]));
    }

    #[test]
    fn malformed_datagram_leaves_state_unchanged() {
        let frame = vec![7u8; PAYLOAD + 7];
        let mut r = reassembly();
        let packets = segmentize(50, &frame);
        assert!(!r.ingest(&packets[0]));

        // payload_len claims more than the datagram carries.
        let mut lying = datagram(50, 1, 2, &[0u8; 100]);
        lying[16..20].copy_from_slice(&2000u32.to_be_bytes());
        assert!(!r.ingest(&lying));

        // Reassembly still completes from the honest tail.
        assert!(r.ingest(&packets[1]));
        assert_eq!(r.frame().1, &frame[..]);
    }

    #[test]
    fn out_of_bounds_segment_dropped() {
        // Small frame limit: segment 3 would land past the buffer end.
        let mut r = Reassembly::new(PACKET, (2 * PAYLOAD) as u32);
        let full = vec![0u8; PAYLOAD];
        assert!(!r.ingest(&datagram(1, 2, 4, &full)));
        assert_eq!(r.segments_received, 0);
    }

    #[test]
    fn first_seg_count_wins() {
        let mut r = reassembly();
        // First packet for ts=1 claims 3 segments.
        assert!(!r.ingest(&datagram(1, 0, 3, &vec![0u8; PAYLOAD])));
        // A later packet claims 2 — ignored; expectation stays 3.
        assert!(!r.ingest(&datagram(1, 1, 2, &vec![0u8; PAYLOAD])));
        assert_eq!(r.segments_expected, 3);
        assert!(r.ingest(&datagram(1, 2, 3, &[9])));
    }

    #[test]
    fn bitmap_word_boundaries() {
        let mut bm = SegmentBitmap::new();
        for idx in [0, 63, 64, 127, 1023] {
            assert!(!bm.test(idx));
            bm.set(idx);
            assert!(bm.test(idx));
        }
        assert!(!bm.test(1));
        assert!(!bm.test(65));
        bm.clear();
        assert!(!bm.test(1023));
    }

    #[test]
    fn full_bitmap_frame_completes() {
        // Single-byte payloads keep the buffer tiny while every bitmap
        // bit gets used.
        let packet = (HEADER_SIZE + 1) as u32;
        let mut r = Reassembly::new(packet, 1024);
        for i in 0..1024u32 {
            let done = r.ingest(&datagram(77, i, 1024, &[i as u8]));
            assert_eq!(done, i == 1023);
        }
        let (_, data) = r.frame();
        assert_eq!(data.len(), 1024);
        assert_eq!(data[63], 63);
        assert_eq!(data[1023], (1023 % 256) as u8);
    }
}
