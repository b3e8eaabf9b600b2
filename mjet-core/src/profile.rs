//! Latency and throughput statistics for a pipeline run.
//!
//! Latency is `now − frame_ts` at the moment a frame reaches the
//! runtime, which is only meaningful when producer and consumer clocks
//! are roughly synchronized (the capture producer aligns V4L2 timestamps
//! to the wall clock for exactly this reason).

use std::fmt;

use crate::wire;

/// Per-run frame statistics, updated once per delivered frame.
#[derive(Debug, Default)]
pub struct Profile {
    first_ts: u64,
    last_ts: u64,
    frame_count: u64,
    total_latency: u64,
    min_latency: u64,
    max_latency: u64,
}

impl Profile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one delivered frame carrying `frame_ts` (wire timestamp).
    pub fn update(&mut self, frame_ts: u64) {
        let now = wire::now_us();

        if self.frame_count == 0 {
            self.first_ts = now;
            self.min_latency = u64::MAX;
        }

        self.last_ts = now;
        self.frame_count += 1;

        // frame_ts == 0 marks a frame without a usable timestamp. A
        // frame legitimately stamped at the epoch is misclassified by
        // this check; accepted, the epoch is half a century gone.
        if frame_ts > 0 && now > frame_ts {
            let latency = now - frame_ts;
            self.total_latency += latency;
            self.min_latency = self.min_latency.min(latency);
            self.max_latency = self.max_latency.max(latency);
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

impl fmt::Display for Profile {
    /// The shutdown report. Rates are printed only when more than one
    /// instant was observed, latency only when at least one frame
    /// carried a usable timestamp.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.frame_count == 0 {
            return Ok(());
        }

        writeln!(f, "\n--- Profiling Statistics ---")?;
        writeln!(f, "Frames:     {}", self.frame_count)?;

        if self.first_ts != self.last_ts {
            let duration_s = (self.last_ts - self.first_ts) as f64 / 1_000_000.0;
            let fps = self.frame_count as f64 / duration_s;
            writeln!(f, "Duration:   {duration_s:.2} seconds")?;
            writeln!(f, "Average:    {fps:.2} fps")?;
        }

        if self.total_latency > 0 {
            writeln!(f, "Latency:")?;
            writeln!(f, "  Average:  {} us", self.total_latency / self.frame_count)?;
            writeln!(f, "  Min:      {} us", self.min_latency)?;
            writeln!(f, "  Max:      {} us", self.max_latency)?;
        }

        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
