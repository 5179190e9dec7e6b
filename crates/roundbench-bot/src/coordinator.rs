//! Round-trip coordinator.
//!
//! One run is one sequential state machine:
//!
//! ```text
//! Idle -> SessionOpening -> Placing -> AwaitingPlaceConfirm
//!      -> Cancelling -> AwaitingCancelConfirm -> Done
//! ```
//!
//! with `Failed` reachable from every non-terminal state. Only the expected
//! confirmation (matching client order id and execution type) advances a
//! waiting state; every other event is dropped. Each confirm deadline is
//! fixed when the corresponding ack arrives.

use std::fmt;
use std::time::Duration;

use chrono::Utc;
use roundbench_core::{
    Action, ActionKind, Checkpoint, ConfirmationEvent, ExecutionType, TimingRecorder,
};
use roundbench_telemetry::Metrics;
use roundbench_ws::PushSession;
use tracing::{debug, error, info};

use crate::error::{AppError, AppResult};
use crate::report::{FailureKind, RunFailure, RunReport, RunStats};
use crate::venue::Venue;

/// Coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    SessionOpening,
    Placing,
    AwaitingPlaceConfirm,
    Cancelling,
    AwaitingCancelConfirm,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::SessionOpening => "session_opening",
            Self::Placing => "placing",
            Self::AwaitingPlaceConfirm => "awaiting_place_confirm",
            Self::Cancelling => "cancelling",
            Self::AwaitingCancelConfirm => "awaiting_cancel_confirm",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time bounds and cancel parameters of a run.
#[derive(Debug, Clone)]
pub struct RoundTripConfig {
    pub session_open_timeout: Duration,
    /// From each ack to its matching confirmation.
    pub confirm_timeout: Duration,
    pub cancel_recv_window_ms: u64,
}

impl Default for RoundTripConfig {
    fn default() -> Self {
        Self {
            session_open_timeout: Duration::from_secs(10),
            confirm_timeout: Duration::from_secs(10),
            cancel_recv_window_ms: 50_000,
        }
    }
}

/// A single place/cancel round trip.
pub struct RoundTrip<'a> {
    venue: &'a dyn Venue,
    place: Action,
    cancel: Action,
    config: RoundTripConfig,
    state: RunState,
    recorder: TimingRecorder,
    stats: RunStats,
}

impl<'a> RoundTrip<'a> {
    /// Prepare a run for `place`. The cancel is derived from it.
    pub fn new(venue: &'a dyn Venue, place: Action, config: RoundTripConfig) -> AppResult<Self> {
        let cancel = place
            .cancel_for(config.cancel_recv_window_ms)
            .ok_or_else(|| AppError::Config("a round trip starts from a place action".to_string()))?;

        Ok(Self {
            venue,
            place,
            cancel,
            config,
            state: RunState::Idle,
            recorder: TimingRecorder::new(),
            stats: RunStats::default(),
        })
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Execute the run to a terminal state and return its record.
    pub async fn run(mut self) -> RunReport {
        let started_at = Utc::now();
        let client_order_id = self.place.client_order_id().to_string();
        info!(
            client_order_id = %client_order_id,
            symbol = self.place.symbol(),
            "Starting round trip"
        );

        let mut session = None;
        let outcome = self.drive(&mut session).await;

        if let Some(session) = session.take() {
            self.stats.decode_failures = session.decode_failures();
            self.venue.close_session(session).await;
        }

        if let Err(ref failure) = outcome {
            error!(
                kind = %failure.kind,
                state = %failure.state,
                reason = %failure.reason,
                "Round trip failed"
            );
            self.state = RunState::Failed;
        }

        let report = RunReport::build(
            self.recorder.snapshot(),
            outcome,
            self.state,
            client_order_id,
            started_at,
            &self.stats,
        );

        Metrics::run_finished(report.outcome());
        Metrics::record_phases(&report.snapshot);
        Metrics::push_decode_failures(report.decode_failures);

        info!(
            outcome = report.outcome(),
            total_ns = ?report.total_ns,
            decode_failures = report.decode_failures,
            ignored_events = report.ignored_events,
            "Round trip finished"
        );
        report
    }

    async fn drive(&mut self, slot: &mut Option<PushSession>) -> Result<(), RunFailure> {
        self.mark(Checkpoint::RunStart)?;
        self.state = RunState::SessionOpening;

        let opened = self
            .venue
            .open_session(self.config.session_open_timeout)
            .await;
        let session = match opened {
            Ok(session) => slot.insert(session),
            Err(e) => return Err(RunFailure::session(&e, self.state)),
        };
        self.mark(Checkpoint::SessionReady)?;

        self.state = RunState::Placing;
        self.submit(ActionKind::Place).await?;
        self.state = RunState::AwaitingPlaceConfirm;
        self.await_confirmation(session).await?;

        self.submit(ActionKind::Cancel).await?;
        self.state = RunState::AwaitingCancelConfirm;
        self.await_confirmation(session).await?;

        self.mark(Checkpoint::RunEnd)?;
        Ok(())
    }

    /// Send one action with `*-sent` / `*-acked` marks around the call.
    async fn submit(&mut self, kind: ActionKind) -> Result<(), RunFailure> {
        let (action, sent, acked, labels) = match kind {
            ActionKind::Place => (
                self.place.clone(),
                Checkpoint::PlaceSent,
                Checkpoint::PlaceAcked,
                ("place-response-headers", "place-response-body"),
            ),
            ActionKind::Cancel => (
                self.cancel.clone(),
                Checkpoint::CancelSent,
                Checkpoint::CancelAcked,
                ("cancel-response-headers", "cancel-response-body"),
            ),
        };

        self.mark(sent)?;
        let result = self.venue.submit(&action).await;
        match result {
            Ok(response) => {
                self.mark(acked)?;
                self.stats.responses.push((labels.0, response.headers_at));
                self.stats.responses.push((labels.1, response.body_at));
                debug!(kind = %kind, ack = %response.body, "Action acknowledged");
                Ok(())
            }
            Err(e) => Err(RunFailure::rest(&e, self.state)),
        }
    }

    async fn await_confirmation(&mut self, session: &mut PushSession) -> Result<(), RunFailure> {
        let deadline = tokio::time::Instant::now() + self.config.confirm_timeout;

        loop {
            let event = match tokio::time::timeout_at(deadline, session.next_event()).await {
                Ok(Ok(event)) => event,
                Ok(Err(e)) => return Err(RunFailure::session(&e, self.state)),
                Err(_) => {
                    return Err(RunFailure::new(
                        FailureKind::Timeout,
                        format!(
                            "no matching confirmation within {}ms",
                            self.config.confirm_timeout.as_millis()
                        ),
                        self.state,
                    ))
                }
            };

            Metrics::push_event(event.execution.as_str());
            if self.apply_event(&event)? {
                return Ok(());
            }
        }
    }

    /// Advance on the expected confirmation; ignore everything else.
    ///
    /// Returns whether the state changed.
    fn apply_event(&mut self, event: &ConfirmationEvent) -> Result<bool, RunFailure> {
        let (expected, checkpoint, next) = match self.state {
            RunState::AwaitingPlaceConfirm => (
                ExecutionType::New,
                Checkpoint::PlaceConfirmed,
                RunState::Cancelling,
            ),
            RunState::AwaitingCancelConfirm => (
                ExecutionType::Canceled,
                Checkpoint::CancelConfirmed,
                RunState::Done,
            ),
            _ => {
                self.stats.ignored_events += 1;
                return Ok(false);
            }
        };

        if !event.confirms(self.place.client_order_id(), &expected) {
            self.stats.ignored_events += 1;
            debug!(
                state = %self.state,
                client_order_id = %event.client_order_id,
                execution = %event.execution,
                "Ignoring non-matching event"
            );
            return Ok(false);
        }

        self.mark(checkpoint)?;
        self.stats.frames.push((checkpoint, event.received_at));
        self.state = next;
        Ok(true)
    }

    fn mark(&mut self, checkpoint: Checkpoint) -> Result<(), RunFailure> {
        let state = self.state;
        self.recorder.mark(checkpoint).map(|_| ()).map_err(|e| {
            RunFailure::new(FailureKind::DuplicateCheckpoint, e.to_string(), state)
        })
    }
}
