//! Checkpoint timing for a single run.
//!
//! `TimingRecorder` is owned by exactly one run and written only from that
//! run's task, so it carries no lock. Marks are taken on `Instant` (monotonic);
//! only differences between marks are meaningful.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

use crate::error::{CoreError, CoreResult};

/// A named instant in a run's timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Checkpoint {
    RunStart,
    SessionReady,
    PlaceSent,
    PlaceAcked,
    PlaceConfirmed,
    CancelSent,
    CancelAcked,
    CancelConfirmed,
    RunEnd,
}

impl Checkpoint {
    /// Every checkpoint of a complete run, in timeline order.
    pub const ALL: [Checkpoint; 9] = [
        Self::RunStart,
        Self::SessionReady,
        Self::PlaceSent,
        Self::PlaceAcked,
        Self::PlaceConfirmed,
        Self::CancelSent,
        Self::CancelAcked,
        Self::CancelConfirmed,
        Self::RunEnd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RunStart => "run-start",
            Self::SessionReady => "session-ready",
            Self::PlaceSent => "place-sent",
            Self::PlaceAcked => "place-acked",
            Self::PlaceConfirmed => "place-confirmed",
            Self::CancelSent => "cancel-sent",
            Self::CancelAcked => "cancel-acked",
            Self::CancelConfirmed => "cancel-confirmed",
            Self::RunEnd => "run-end",
        }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contiguous slices of a run. Together they cover `run-start..run-end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    SessionSetup,
    PlaceLeg,
    PlaceConfirmWait,
    CancelLeg,
    CancelConfirmWait,
    Teardown,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Self::SessionSetup,
        Self::PlaceLeg,
        Self::PlaceConfirmWait,
        Self::CancelLeg,
        Self::CancelConfirmWait,
        Self::Teardown,
    ];

    /// Start and end checkpoints of the phase.
    pub fn bounds(&self) -> (Checkpoint, Checkpoint) {
        match self {
            Self::SessionSetup => (Checkpoint::RunStart, Checkpoint::SessionReady),
            Self::PlaceLeg => (Checkpoint::SessionReady, Checkpoint::PlaceAcked),
            Self::PlaceConfirmWait => (Checkpoint::PlaceAcked, Checkpoint::PlaceConfirmed),
            Self::CancelLeg => (Checkpoint::PlaceConfirmed, Checkpoint::CancelAcked),
            Self::CancelConfirmWait => (Checkpoint::CancelAcked, Checkpoint::CancelConfirmed),
            Self::Teardown => (Checkpoint::CancelConfirmed, Checkpoint::RunEnd),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionSetup => "session_setup",
            Self::PlaceLeg => "place_leg",
            Self::PlaceConfirmWait => "place_confirm_wait",
            Self::CancelLeg => "cancel_leg",
            Self::CancelConfirmWait => "cancel_confirm_wait",
            Self::Teardown => "teardown",
        }
    }
}

/// Elapsed time between two recorded checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub from: Checkpoint,
    pub to: Checkpoint,
    pub elapsed: Duration,
}

/// Append-only checkpoint record.
#[derive(Debug, Default)]
pub struct TimingRecorder {
    marks: Vec<(Checkpoint, Instant)>,
}

impl TimingRecorder {
    pub fn new() -> Self {
        Self {
            marks: Vec::with_capacity(Checkpoint::ALL.len()),
        }
    }

    /// Capture now under `checkpoint`.
    ///
    /// # Errors
    /// `CoreError::DuplicateCheckpoint` if the checkpoint was already set.
    /// The recorder is unchanged in that case.
    pub fn mark(&mut self, checkpoint: Checkpoint) -> CoreResult<Instant> {
        if self.contains(checkpoint) {
            return Err(CoreError::DuplicateCheckpoint(checkpoint));
        }
        let now = Instant::now();
        self.marks.push((checkpoint, now));
        Ok(now)
    }

    pub fn contains(&self, checkpoint: Checkpoint) -> bool {
        self.marks.iter().any(|(c, _)| *c == checkpoint)
    }

    pub fn get(&self, checkpoint: Checkpoint) -> Option<Instant> {
        self.marks
            .iter()
            .find(|(c, _)| *c == checkpoint)
            .map(|(_, at)| *at)
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    /// Immutable copy of the marks recorded so far.
    pub fn snapshot(&self) -> TimingSnapshot {
        TimingSnapshot {
            marks: self.marks.clone(),
        }
    }
}

/// Sealed copy of a recorder, in recording order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingSnapshot {
    marks: Vec<(Checkpoint, Instant)>,
}

impl TimingSnapshot {
    pub fn get(&self, checkpoint: Checkpoint) -> Option<Instant> {
        self.marks
            .iter()
            .find(|(c, _)| *c == checkpoint)
            .map(|(_, at)| *at)
    }

    /// Recorded checkpoints in recording order.
    pub fn checkpoints(&self) -> impl Iterator<Item = Checkpoint> + '_ {
        self.marks.iter().map(|(c, _)| *c)
    }

    /// Most recent mark; where a failed run stopped.
    pub fn last_checkpoint(&self) -> Option<Checkpoint> {
        self.marks.last().map(|(c, _)| *c)
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    /// True once every checkpoint of a full round trip is present.
    pub fn is_complete(&self) -> bool {
        Checkpoint::ALL.iter().all(|c| self.get(*c).is_some())
    }

    /// Instant of the first mark. Offsets are measured from here.
    pub fn origin(&self) -> Option<Instant> {
        self.marks.first().map(|(_, at)| *at)
    }

    /// Offset of `checkpoint` from the first mark.
    pub fn offset(&self, checkpoint: Checkpoint) -> Option<Duration> {
        let origin = self.origin()?;
        self.get(checkpoint).map(|at| at.duration_since(origin))
    }

    /// Offset of an arbitrary instant (e.g., a frame receipt) from the first mark.
    pub fn offset_of(&self, at: Instant) -> Option<Duration> {
        self.origin().map(|origin| at.saturating_duration_since(origin))
    }

    /// `(name, nanoseconds since first mark)` for every recorded checkpoint.
    pub fn offsets_ns(&self) -> Vec<(&'static str, u64)> {
        let Some(origin) = self.origin() else {
            return Vec::new();
        };
        self.marks
            .iter()
            .map(|(c, at)| (c.as_str(), duration_ns(at.duration_since(origin))))
            .collect()
    }

    /// Elapsed time from `from` to `to`, if both are recorded.
    pub fn between(&self, from: Checkpoint, to: Checkpoint) -> Option<Duration> {
        Some(self.get(to)?.duration_since(self.get(from)?))
    }

    /// Intervals between consecutive recorded checkpoints.
    pub fn intervals(&self) -> Vec<Interval> {
        self.marks
            .windows(2)
            .map(|w| Interval {
                from: w[0].0,
                to: w[1].0,
                elapsed: w[1].1.duration_since(w[0].1),
            })
            .collect()
    }

    /// Phases whose both bounds were recorded.
    pub fn phases(&self) -> Vec<(Phase, Duration)> {
        Phase::ALL
            .iter()
            .filter_map(|p| {
                let (from, to) = p.bounds();
                self.between(from, to).map(|d| (*p, d))
            })
            .collect()
    }

    /// `run-end - run-start`, only for a finished run.
    pub fn total(&self) -> Option<Duration> {
        self.between(Checkpoint::RunStart, Checkpoint::RunEnd)
    }
}

/// Nanoseconds in a duration, saturating at `u64::MAX`.
pub fn duration_ns(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}
