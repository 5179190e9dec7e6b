//! Run record emitted at the end of every run.
//!
//! Exactly one report per run: complete on `Done`, partial on `Failed`.

use std::fmt;
use std::process::ExitCode;
use std::time::Instant;

use chrono::{DateTime, Utc};
use roundbench_core::timing::duration_ns;
use roundbench_core::{Checkpoint, TimingSnapshot};
use roundbench_rest::RestError;
use roundbench_ws::WsError;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::coordinator::RunState;

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Done,
    Failed,
}

/// Why a run failed. None of these are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Auth,
    Network,
    Decode,
    Session,
    Timeout,
    DuplicateCheckpoint,
    Rejected,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Network => "network",
            Self::Decode => "decode",
            Self::Session => "session",
            Self::Timeout => "timeout",
            Self::DuplicateCheckpoint => "duplicate_checkpoint",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&RestError> for FailureKind {
    fn from(err: &RestError) -> Self {
        match err {
            RestError::Network(_) | RestError::HttpClient(_) => Self::Network,
            RestError::Auth { .. } | RestError::Credentials(_) => Self::Auth,
            RestError::Decode(_) => Self::Decode,
            RestError::Rejected { .. } => Self::Rejected,
        }
    }
}

impl From<&WsError> for FailureKind {
    fn from(err: &WsError) -> Self {
        match err {
            WsError::ListenKey(rest) => Self::from(rest),
            _ => Self::Session,
        }
    }
}

/// A terminal failure and the state it happened in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFailure {
    pub kind: FailureKind,
    pub reason: String,
    pub state: RunState,
}

impl RunFailure {
    pub fn new(kind: FailureKind, reason: impl Into<String>, state: RunState) -> Self {
        Self {
            kind,
            reason: reason.into(),
            state,
        }
    }

    pub fn rest(err: &RestError, state: RunState) -> Self {
        Self::new(FailureKind::from(err), err.to_string(), state)
    }

    pub fn session(err: &WsError, state: RunState) -> Self {
        Self::new(FailureKind::from(err), err.to_string(), state)
    }
}

/// Observations collected during a run besides the checkpoints.
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    /// Receipt instant of each confirmation that advanced the run.
    pub frames: Vec<(Checkpoint, Instant)>,
    /// REST response arrivals, e.g. `place-response-headers`.
    pub responses: Vec<(&'static str, Instant)>,
    pub decode_failures: u64,
    pub ignored_events: u64,
}

/// Structured record of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub reason: Option<String>,
    pub error_kind: Option<FailureKind>,
    pub client_order_id: String,
    /// Wall-clock start, for correlating with venue logs.
    pub started_at: DateTime<Utc>,
    /// Checkpoint name to nanoseconds since `run-start`, in recording order.
    pub checkpoints: Map<String, Value>,
    /// Phase name to elapsed nanoseconds.
    pub intervals_ns: Map<String, Value>,
    pub total_ns: Option<u64>,
    /// Confirmation checkpoint to the nanosecond offset at which its frame
    /// was read off the socket.
    pub push_frames_ns: Map<String, Value>,
    /// Headers and body arrival of each successful place/cancel response,
    /// in nanoseconds since `run-start`.
    pub responses_ns: Map<String, Value>,
    pub decode_failures: u64,
    /// Non-matching events skipped while waiting.
    pub ignored_events: u64,
    #[serde(skip)]
    pub final_state: RunState,
    #[serde(skip)]
    pub snapshot: TimingSnapshot,
}

impl RunReport {
    /// Build a report from a sealed snapshot.
    pub fn build(
        snapshot: TimingSnapshot,
        outcome: Result<(), RunFailure>,
        final_state: RunState,
        client_order_id: String,
        started_at: DateTime<Utc>,
        stats: &RunStats,
    ) -> Self {
        let checkpoints = snapshot
            .offsets_ns()
            .into_iter()
            .map(|(name, ns)| (name.to_string(), Value::from(ns)))
            .collect();

        let intervals_ns = snapshot
            .phases()
            .into_iter()
            .map(|(phase, d)| (phase.as_str().to_string(), Value::from(duration_ns(d))))
            .collect();

        let push_frames_ns = named_offsets_ns(
            &snapshot,
            stats.frames.iter().map(|(cp, at)| (cp.as_str(), *at)),
        );
        let responses_ns = named_offsets_ns(&snapshot, stats.responses.iter().copied());

        let (status, reason, error_kind) = match outcome {
            Ok(()) => (RunStatus::Done, None, None),
            Err(failure) => (RunStatus::Failed, Some(failure.reason), Some(failure.kind)),
        };

        Self {
            status,
            reason,
            error_kind,
            client_order_id,
            started_at,
            checkpoints,
            intervals_ns,
            total_ns: snapshot.total().map(duration_ns),
            push_frames_ns,
            responses_ns,
            decode_failures: stats.decode_failures,
            ignored_events: stats.ignored_events,
            final_state,
            snapshot,
        }
    }

    pub fn is_done(&self) -> bool {
        self.status == RunStatus::Done
    }

    /// Outcome label for metrics: "done" or the failure kind.
    pub fn outcome(&self) -> &'static str {
        match self.error_kind {
            Some(kind) => kind.as_str(),
            None => "done",
        }
    }

    /// Single-line JSON for stdout.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// 0 when done, 1 when failed.
    pub fn exit_code(&self) -> ExitCode {
        match self.status {
            RunStatus::Done => ExitCode::SUCCESS,
            RunStatus::Failed => ExitCode::from(1),
        }
    }
}

/// Name to nanoseconds since the first checkpoint.
fn named_offsets_ns<'a>(
    snapshot: &TimingSnapshot,
    marks: impl Iterator<Item = (&'a str, Instant)>,
) -> Map<String, Value> {
    marks
        .filter_map(|(name, at)| {
            snapshot
                .offset_of(at)
                .map(|d| (name.to_string(), Value::from(duration_ns(d))))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use roundbench_core::TimingRecorder;

    fn partial_snapshot() -> TimingSnapshot {
        let mut rec = TimingRecorder::new();
        rec.mark(Checkpoint::RunStart).unwrap();
        rec.mark(Checkpoint::SessionReady).unwrap();
        rec.snapshot()
    }

    #[test]
    fn test_failure_kind_from_rest_error() {
        assert_eq!(
            FailureKind::from(&RestError::Network("x".into())),
            FailureKind::Network
        );
        assert_eq!(
            FailureKind::from(&RestError::Decode("x".into())),
            FailureKind::Decode
        );
        assert_eq!(
            FailureKind::from(&RestError::Rejected {
                status: 400,
                code: Some(-2011),
                msg: "Unknown order".into()
            }),
            FailureKind::Rejected
        );
        assert_eq!(
            FailureKind::from(&RestError::Auth {
                status: 401,
                code: None,
                msg: String::new()
            }),
            FailureKind::Auth
        );
    }

    #[test]
    fn test_failure_kind_from_ws_error() {
        let listen_key = WsError::ListenKey(RestError::Decode("bad body".into()));
        assert_eq!(FailureKind::from(&listen_key), FailureKind::Decode);
        assert_eq!(FailureKind::from(&WsError::StreamEnded), FailureKind::Session);
        assert_eq!(
            FailureKind::from(&WsError::ListenKeyExpired),
            FailureKind::Session
        );
    }

    #[test]
    fn test_failed_report_json() {
        let failure = RunFailure::new(
            FailureKind::Timeout,
            "no confirmation",
            RunState::AwaitingPlaceConfirm,
        );
        let report = RunReport::build(
            partial_snapshot(),
            Err(failure),
            RunState::Failed,
            "rb_1".to_string(),
            Utc::now(),
            &RunStats {
                frames: Vec::new(),
                responses: vec![("place-response-headers", Instant::now())],
                decode_failures: 3,
                ignored_events: 1,
            },
        );

        assert!(!report.is_done());
        assert_eq!(report.outcome(), "timeout");

        let json: Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error_kind"], "timeout");
        assert_eq!(json["reason"], "no confirmation");
        assert_eq!(json["client_order_id"], "rb_1");
        assert_eq!(json["total_ns"], Value::Null);
        assert_eq!(json["decode_failures"], 3);
        assert_eq!(json["checkpoints"]["run-start"], 0);

        let keys: Vec<&String> = json["checkpoints"].as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["run-start", "session-ready"]);
        assert!(json["intervals_ns"]["session_setup"].is_u64());
        assert!(json["responses_ns"]["place-response-headers"].is_u64());
        assert!(json.get("snapshot").is_none());
    }

    #[test]
    fn test_done_report_status() {
        let report = RunReport::build(
            partial_snapshot(),
            Ok(()),
            RunState::Done,
            "rb_2".to_string(),
            Utc::now(),
            &RunStats::default(),
        );
        assert!(report.is_done());
        assert_eq!(report.outcome(), "done");
        assert_eq!(report.reason, None);
    }
}
