//! # Stream Node
//!
//! Host-facing wrapper around one [`StreamContext`]. A trigger starts a run when the node
//! is idle and requests a stop when it is running, so the same input toggles streaming on
//! and off. Status, progress and failures go to a [`ProgressObserver`].
use crate::error::StreamError;
use crate::range::RangeSpec;
use crate::stream::progress::{ProgressObserver, ProgressTracker, StatusColor};
use crate::stream::projector::Record;
use crate::stream::{RecordSink, SheetStreamer, StreamContext, StreamOutcome};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Processing state of a node.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProcessingState {
    Idle,
    Running,
    Stopping,
    Error,
}

impl ProcessingState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Error => "error",
        }
    }
}

/// What a trigger did.
#[derive(Debug)]
pub enum TriggerOutcome {
    /// The trigger started a run, which has now ended
    Finished(StreamOutcome),
    /// The trigger asked the current run to stop
    StopRequested,
    /// No run to stop, or a stop is already pending
    Ignored,
}

/// State of the node and the cancellation token of its current run.
///
/// Both change together under one lock, so a stop request can only cancel the run that
/// was current when the request was accepted.
struct RunSlot {
    state: ProcessingState,
    token: CancellationToken,
}

/// A configured stream with start/stop toggle semantics.
pub struct StreamNode {
    streamer: Arc<SheetStreamer>,
    context: StreamContext,
    observer: Arc<dyn ProgressObserver>,
    slot: Mutex<RunSlot>,
    tracker: Mutex<ProgressTracker>,
}

impl StreamNode {
    /// Creates a node and reports the configured range as its initial status.
    pub fn new(
        streamer: Arc<SheetStreamer>,
        context: StreamContext,
        observer: Arc<dyn ProgressObserver>,
    ) -> Result<Self, StreamError> {
        let range = RangeSpec::try_from(context.range())?;
        let tracker = ProgressTracker::new(&range)?;
        observer.on_status(&format!("{}!{range}", context.sheet_title()), StatusColor::Gray);
        Ok(Self {
            streamer,
            context,
            observer,
            slot: Mutex::new(RunSlot {
                state: ProcessingState::Idle,
                token: CancellationToken::new(),
            }),
            tracker: Mutex::new(tracker),
        })
    }

    pub fn context(&self) -> &StreamContext {
        &self.context
    }

    pub fn state(&self) -> ProcessingState {
        self.slot().state
    }

    /// Starts a run when idle, or requests a stop when running.
    ///
    /// When this trigger starts the run it returns only once the run has ended. The sink
    /// is only used when a run is started.
    pub async fn trigger(&self, sink: &mut dyn RecordSink) -> TriggerOutcome {
        match self.start() {
            Ok(token) => self.run(sink, token).await,
            Err(outcome) => outcome,
        }
    }

    /// Requests a stop of the current run, if one is running.
    pub fn stop(&self) -> TriggerOutcome {
        let mut slot = self.slot();
        self.request_stop(&mut slot)
    }

    /// Moves an idle node to running with a fresh token, or turns the trigger into a stop.
    fn start(&self) -> Result<CancellationToken, TriggerOutcome> {
        let mut slot = self.slot();
        match slot.state {
            ProcessingState::Idle => {
                slot.state = ProcessingState::Running;
                slot.token = CancellationToken::new();
                Ok(slot.token.clone())
            }
            ProcessingState::Running => Err(self.request_stop(&mut slot)),
            ProcessingState::Stopping | ProcessingState::Error => Err(TriggerOutcome::Ignored),
        }
    }

    fn request_stop(&self, slot: &mut RunSlot) -> TriggerOutcome {
        if slot.state != ProcessingState::Running {
            return TriggerOutcome::Ignored;
        }
        slot.state = ProcessingState::Stopping;
        slot.token.cancel();
        debug!(range = self.context.range(), "Stop requested");
        TriggerOutcome::StopRequested
    }

    async fn run(&self, sink: &mut dyn RecordSink, token: CancellationToken) -> TriggerOutcome {
        self.observer.on_status("Process starting...", StatusColor::Blue);
        let mut sink = ProgressSink {
            inner: sink,
            tracker: &self.tracker,
            observer: self.observer.as_ref(),
        };
        let outcome = self.streamer.run(&self.context, &mut sink, &token).await;

        match &outcome {
            StreamOutcome::Completed { .. } => {}
            StreamOutcome::Stopped { .. } => {
                let report = self.tracker().stop();
                self.observer.on_stopped(&report);
            }
            StreamOutcome::Failed { error, .. } => {
                self.slot().state = ProcessingState::Error;
                self.tracker().reset();
                self.observer.on_status("Error", StatusColor::Red);
                self.observer.on_error(error);
            }
        }

        self.finish();
        TriggerOutcome::Finished(outcome)
    }

    /// Returns the node to idle. Stop requests from here on are ignored.
    fn finish(&self) {
        let mut slot = self.slot();
        debug!(range = self.context.range(), state = slot.state.as_str(), "Run finished");
        slot.state = ProcessingState::Idle;
    }

    fn slot(&self) -> MutexGuard<'_, RunSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tracker(&self) -> MutexGuard<'_, ProgressTracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Forwards records to the host sink and counts them as consumed.
struct ProgressSink<'a> {
    inner: &'a mut dyn RecordSink,
    tracker: &'a Mutex<ProgressTracker>,
    observer: &'a dyn ProgressObserver,
}

impl RecordSink for ProgressSink<'_> {
    fn accept(&mut self, record: Record) -> anyhow::Result<()> {
        self.inner.accept(record)?;
        let report = self.tracker.lock().unwrap_or_else(PoisonError::into_inner).advance();
        self.observer.on_progress(&report);
        Ok(())
    }
}
