//! Wire framing for MJPEG frames over UDP.
//!
//! A frame is split into MTU-sized segments so it can traverse the link
//! without IP fragmentation. Each datagram carries a fixed header followed
//! by one contiguous slice of the frame.
//!
//! ## Wire format
//!
//! **Packet header** (20 bytes, network byte order, no padding):
//! ```text
//! frame_ts_us:   u64  (8)   frame identity key
//! seg_idx:       u32  (4)   zero-based segment index
//! seg_count:     u32  (4)   total segments in the frame
//! payload_len:   u32  (4)   payload bytes following the header
//! ```
//!
//! There is no magic, no version and no checksum beyond UDP's own; peers
//! must agree on `max_packet_size` and `max_frame_size` out of band.

use bytes::{Buf, BufMut};

// ── Constants ────────────────────────────────────────────────────

/// Fixed size of the on-wire packet header.
pub const HEADER_SIZE: usize = 20;

/// Upper bound on segments per frame; sizes the receiver's dedup bitmap.
pub const MAX_SEGMENTS_PER_FRAME: u32 = 1024;

// ── PacketHeader ─────────────────────────────────────────────────

/// Per-datagram metadata tagging one segment of one frame.
///
/// All multi-byte fields are stored **big-endian** on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Microsecond wall-clock timestamp identifying the frame.
    pub frame_ts_us: u64,
    /// Zero-based index of this segment within the frame.
    pub seg_idx: u32,
    /// Total number of segments comprising the frame.
    pub seg_count: u32,
    /// Length of the payload bytes following the header.
    pub payload_len: u32,
}

impl PacketHeader {
    /// Encoded size on the wire.
    pub const SIZE: usize = HEADER_SIZE;

    /// Serialize into `buf` (network byte order).
    pub fn encode_into(&self, buf: &mut impl BufMut) {
        buf.put_u64(self.frame_ts_us);
        buf.put_u32(self.seg_idx);
        buf.put_u32(self.seg_count);
        buf.put_u32(self.payload_len);
    }

    /// Parse and validate the header of a whole datagram.
    ///
    /// Returns `None` if the datagram is shorter than a header, if the
    /// declared payload length does not match the datagram size, or if
    /// either segment field exceeds [`MAX_SEGMENTS_PER_FRAME`]. The wire
    /// is lossy by design — rejected datagrams are dropped, not reported.
    pub fn decode(datagram: &[u8]) -> Option<Self> {
        if datagram.len() < Self::SIZE {
            return None;
        }

        let mut cursor = &datagram[..Self::SIZE];
        let header = Self {
            frame_ts_us: cursor.get_u64(),
            seg_idx: cursor.get_u32(),
            seg_count: cursor.get_u32(),
            payload_len: cursor.get_u32(),
        };

        if Self::SIZE + header.payload_len as usize != datagram.len() {
            return None;
        }
        if header.seg_idx >= MAX_SEGMENTS_PER_FRAME {
            return None;
        }
        if header.seg_count > MAX_SEGMENTS_PER_FRAME {
            return None;
        }

        Some(header)
    }
}

// ── Segmentation ─────────────────────────────────────────────────

/// Number of segments needed for a frame of `frame_len` bytes when each
/// datagram carries at most `max_payload` payload bytes.
///
/// Every segment except the last carries exactly `max_payload` bytes; the
/// last carries the remainder.
pub fn segment_count(frame_len: usize, max_payload: usize) -> u32 {
    frame_len.div_ceil(max_payload) as u32
}

// ── Time source ──────────────────────────────────────────────────

/// Current wall-clock time in microseconds since the Unix epoch.
pub fn now_us() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Current `CLOCK_MONOTONIC` reading in microseconds.
fn monotonic_us() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // clock_gettime(CLOCK_MONOTONIC) cannot fail with a valid timespec.
    unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    ts.tv_sec as u64 * 1_000_000 + (ts.tv_nsec as u64 + 500) / 1_000
}

/// Constant that maps `CLOCK_MONOTONIC` timestamps onto the wall clock.
///
/// V4L2 stamps buffers with the monotonic clock; adding this offset makes
/// receiver-side latency (`now_us() − frame_ts_us`) meaningful across
/// hosts with rough wall-clock sync. Measure once at capture startup.
pub fn epoch_offset_us() -> u64 {
    now_us().wrapping_sub(monotonic_us())
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn datagram(header: PacketHeader, payload: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
        header.encode_into(&mut buf);
        buf.extend_from_slice(payload);
        buf.to_vec()
    }

    #[test]
    fn header_roundtrip() {
        let header = PacketHeader {
            frame_ts_us: 1_700_000_000_000_000,
            seg_idx: 2,
            seg_count: 3,
            payload_len: 5,
        };
        let bytes = datagram(header, b"hello");
        assert_eq!(bytes.len(), HEADER_SIZE + 5);

        let parsed = PacketHeader::decode(&bytes).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn header_is_big_endian() {
        let header = PacketHeader {
            frame_ts_us: 0x0102_0304_0506_0708,
            seg_idx: 0,
            seg_count: 1,
            payload_len: 0,
        };
        let bytes = datagram(header, &[]);
        assert_eq!(&bytes[..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(&bytes[12..16], &[0, 0, 0, 1]);
    }

    #[test]
    fn short_datagram_rejected() {
        assert!(PacketHeader::decode(&[0u8; HEADER_SIZE - 1]).is_none());
        assert!(PacketHeader::decode(&[]).is_none());
    }

    #[test]
    fn length_mismatch_rejected() {
        let header = PacketHeader {
            frame_ts_us: 1,
            seg_idx: 0,
            seg_count: 1,
            payload_len: 2000,
        };
        // Claims 2000 payload bytes but carries only 100.
        let bytes = datagram(header, &[0u8; 100]);
        assert!(PacketHeader::decode(&bytes).is_none());
    }

    #[test]
    fn segment_bounds_rejected() {
        let over_idx = PacketHeader {
            frame_ts_us: 1,
            seg_idx: MAX_SEGMENTS_PER_FRAME,
            seg_count: MAX_SEGMENTS_PER_FRAME,
            payload_len: 0,
        };
        assert!(PacketHeader::decode(&datagram(over_idx, &[])).is_none());

        let over_count = PacketHeader {
            frame_ts_us: 1,
            seg_idx: 0,
            seg_count: MAX_SEGMENTS_PER_FRAME + 1,
            payload_len: 0,
        };
        assert!(PacketHeader::decode(&datagram(over_count, &[])).is_none());

        let at_limit = PacketHeader {
            frame_ts_us: 1,
            seg_idx: MAX_SEGMENTS_PER_FRAME - 1,
            seg_count: MAX_SEGMENTS_PER_FRAME,
            payload_len: 0,
        };
        assert!(PacketHeader::decode(&datagram(at_limit, &[])).is_some());
    }

    #[test]
    fn segment_count_boundaries() {
        let p = 1380;
        assert_eq!(segment_count(1, p), 1);
        assert_eq!(segment_count(p, p), 1);
        assert_eq!(segment_count(p + 1, p), 2);
        assert_eq!(segment_count(1024 * p, p), 1024);
        assert_eq!(segment_count(1024 * p + 1, p), 1025);
    }

    #[test]
    fn epoch_offset_translates_monotonic_to_wall() {
        let offset = epoch_offset_us();
        let translated = monotonic_us().wrapping_add(offset);
        let wall = now_us();
        // Both reads happen within the same millisecond on any sane box.
        assert!(wall.abs_diff(translated) < 1_000_000);
    }
}
