//! Pipeline runtime: one frame producer fanned out to N consumers.
//!
//! The runtime is single-threaded and cooperative. Each iteration blocks
//! in the producer, then hands the frame to every consumer in declared
//! order. Two cancellation channels gate the loop: a process-wide run
//! flag (set from signal handlers) and each consumer's `is_open`
//! liveness answer (a closed display window ends the run).

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::MjetError;
use crate::profile::Profile;

/// Compile-time maximum number of consumers per pipeline.
pub const MAX_SINKS: usize = 8;

// ── Frame ────────────────────────────────────────────────────────

/// One timestamped JPEG frame, borrowed from its producer.
///
/// The borrow is valid until the producer's next `next()` call — capture
/// buffers return to the device ring, and the receiver reuses its
/// reassembly buffer.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    /// Wall-clock microseconds; the identity key on the wire.
    pub timestamp_us: u64,
    /// Complete JPEG bytes.
    pub data: &'a [u8],
}

// ── Seams ────────────────────────────────────────────────────────

/// A source of timestamped frames (capture device or wire receiver).
pub trait FrameProducer {
    /// Block until the next frame is available.
    ///
    /// `None` means the stream has ended: the device failed or the
    /// socket closed. Producers do not resume after returning `None`.
    fn next(&mut self) -> Option<Frame<'_>>;
}

/// A sink accepting every produced frame.
///
/// `accept` is infallible at this boundary: a failing sink swallows its
/// own error so siblings keep running — a live stream prefers degraded
/// output over none.
pub trait FrameConsumer {
    fn accept(&mut self, timestamp_us: u64, frame: &[u8]);

    /// Liveness gate. A consumer with a user-facing surface (the display
    /// window) answers `false` once the user closed it.
    fn is_open(&mut self) -> bool {
        true
    }
}

// ── Pipeline ─────────────────────────────────────────────────────

/// Couples one producer to an ordered consumer list.
pub struct Pipeline<P, C> {
    // Field order is the teardown order: consumers drop first, the
    // producer last.
    sinks: Vec<C>,
    producer: P,
    profile: Option<Profile>,
}

impl<P: FrameProducer, C: FrameConsumer> Pipeline<P, C> {
    /// Assemble a pipeline. At least one consumer is required and at
    /// most [`MAX_SINKS`] are supported.
    pub fn new(producer: P, sinks: Vec<C>, profile: bool) -> Result<Self, MjetError> {
        if sinks.is_empty() || sinks.len() > MAX_SINKS {
            return Err(MjetError::OutputCount {
                got: sinks.len(),
                max: MAX_SINKS,
            });
        }
        Ok(Self {
            sinks,
            producer,
            profile: profile.then(Profile::new),
        })
    }

    /// Run until the producer ends, the flag clears, or a display
    /// consumer closes.
    ///
    /// The flag is read once per iteration with relaxed ordering; a
    /// signal arriving while the producer blocks takes effect when the
    /// blocking call returns.
    pub fn run(&mut self, running: &AtomicBool) {
        while running.load(Ordering::Relaxed) && self.sinks.iter_mut().all(FrameConsumer::is_open)
        {
            let Some(frame) = self.producer.next() else {
                break;
            };

            if let Some(profile) = &mut self.profile {
                profile.update(frame.timestamp_us);
            }

            for sink in &mut self.sinks {
                sink.accept(frame.timestamp_us, frame.data);
            }
        }
    }

    /// Collected statistics, when profiling was enabled.
    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    /// Producer yielding a fixed set of frames.
    struct ScriptedProducer {
        frames: Vec<(u64, Vec<u8>)>,
        cursor: usize,
    }

    impl ScriptedProducer {
        fn new(frames: Vec<(u64, Vec<u8>)>) -> Self {
            Self { frames, cursor: 0 }
        }
    }

    impl FrameProducer for ScriptedProducer {
        fn next(&mut self) -> Option<Frame<'_>> {
            let (timestamp_us, data) = self.frames.get(self.cursor)?;
            self.cursor += 1;
            Some(Frame {
                timestamp_us: *timestamp_us,
                data,
            })
        }
    }

    /// Consumer recording what it saw, with a scriptable liveness gate.
    struct RecordingSink {
        id: u8,
        seen: Vec<(u8, u64, usize)>,
        open_for: usize,
    }

    impl RecordingSink {
        fn new(id: u8) -> Self {
            Self {
                id,
                seen: Vec::new(),
                open_for: usize::MAX,
            }
        }
    }

    impl FrameConsumer for RecordingSink {
        fn accept(&mut self, timestamp_us: u64, frame: &[u8]) {
            self.seen.push((self.id, timestamp_us, frame.len()));
        }

        fn is_open(&mut self) -> bool {
            if self.open_for == 0 {
                return false;
            }
            self.open_for -= 1;
            true
        }
    }

    fn flag(value: bool) -> AtomicBool {
        AtomicBool::new(value)
    }

    #[test]
    fn fans_out_in_declared_order() {
        let producer = ScriptedProducer::new(vec![(10, vec![0; 4]), (20, vec![0; 8])]);
        let sinks = vec![RecordingSink::new(0), RecordingSink::new(1)];
        let mut pipeline = Pipeline::new(producer, sinks, false).unwrap();
        pipeline.run(&flag(true));

        assert_eq!(pipeline.sinks[0].seen, vec![(0, 10, 4), (0, 20, 8)]);
        assert_eq!(pipeline.sinks[1].seen, vec![(1, 10, 4), (1, 20, 8)]);
    }

    #[test]
    fn cleared_flag_stops_before_first_frame() {
        let producer = ScriptedProducer::new(vec![(10, vec![1])]);
        let mut pipeline =
            Pipeline::new(producer, vec![RecordingSink::new(0)], false).unwrap();
        pipeline.run(&flag(false));
        assert!(pipeline.sinks[0].seen.is_empty());
    }

    #[test]
    fn closed_sink_gates_the_loop() {
        let producer = ScriptedProducer::new(vec![(1, vec![0]), (2, vec![0]), (3, vec![0])]);
        let mut gated = RecordingSink::new(0);
        gated.open_for = 2; // open for two iterations, then closed
        let mut pipeline = Pipeline::new(producer, vec![gated], false).unwrap();
        pipeline.run(&flag(true));
        assert_eq!(pipeline.sinks[0].seen.len(), 2);
    }

    #[test]
    fn sink_count_bounds() {
        let empty: Vec<RecordingSink> = Vec::new();
        let err = Pipeline::new(ScriptedProducer::new(vec![]), empty, false).unwrap_err();
        assert!(matches!(err, MjetError::OutputCount { got: 0, .. }));

        let too_many: Vec<RecordingSink> = (0..MAX_SINKS as u8 + 1).map(RecordingSink::new).collect();
        let err = Pipeline::new(ScriptedProducer::new(vec![]), too_many, false).unwrap_err();
        assert!(matches!(err, MjetError::OutputCount { got: 9, .. }));
    }

    #[test]
    fn profile_counts_frames() {
        let producer = ScriptedProducer::new(vec![(1, vec![0]), (2, vec![0])]);
        let mut pipeline =
            Pipeline::new(producer, vec![RecordingSink::new(0)], true).unwrap();
        pipeline.run(&flag(true));
        assert_eq!(pipeline.profile().unwrap().frame_count(), 2);
    }
}
