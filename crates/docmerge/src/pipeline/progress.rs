use crossbeam_channel::Sender;

use crate::runlog::LogRecord;

use super::state::RunState;

/// Events emitted by the orchestrator while a run is in flight.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// `current` of `total` input files handled so far.
    Progress {
        current: usize,
        total: usize,
        message: String,
    },
    State(RunState),
    /// A record that was just written to the run log.
    Log(LogRecord),
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Discards every event.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Forwards events to a channel, typically drained by a UI thread while the
/// run executes on a worker thread. A disconnected receiver is ignored.
pub struct ChannelProgress {
    sender: Sender<ProgressEvent>,
}

impl ChannelProgress {
    pub fn new(sender: Sender<ProgressEvent>) -> Self {
        Self { sender }
    }
}

impl ProgressReporter for ChannelProgress {
    fn report(&self, event: ProgressEvent) {
        let _ = self.sender.send(event);
    }
}
