use tracing::debug;
use tunerelay_core::{ConsumerRequest, DownstreamLifecycle, MonitorCommand, SourceId, TrackInfo};

mod list;

pub use list::ActiveSourceList;

/// Effect the caller must carry out after feeding the arbiter an input.
/// The policy itself never performs I/O or owns timers; scheduling and
/// cancelling the pause-grace deadline is the caller's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArbiterAction {
    /// Send a request to the downstream consumer.
    Forward(ConsumerRequest),
    /// Send a command to one source monitor.
    Notify(SourceId, MonitorCommand),
    /// Start (or restart) the pause-grace timer.
    ScheduleClose,
    /// Cancel the pending pause-grace timer.
    CancelClose,
}

/// Process-wide arbitration over the active-source list.
///
/// Exactly one instance exists per process. Inputs are processed one at
/// a time to completion; every method returns the actions that follow
/// from that single input.
#[derive(Debug, Default)]
pub struct Arbiter {
    list: ActiveSourceList,
    lifecycle: DownstreamLifecycle,
}

impl Arbiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<SourceId> {
        self.list.front()
    }

    pub fn lifecycle(&self) -> DownstreamLifecycle {
        self.lifecycle
    }

    /// A source reported that it started playing.
    pub fn on_playing(&mut self, id: SourceId) -> Vec<ArbiterAction> {
        let mut actions = Vec::new();
        if self.lifecycle == DownstreamLifecycle::PendingClose {
            actions.push(ArbiterAction::CancelClose);
        }
        self.lifecycle = DownstreamLifecycle::Connected;
        self.list.promote(id);
        actions
    }

    /// A source reported settled track info. Forwarded only when the
    /// source is the current front; background sources are irrelevant.
    pub fn on_update(&mut self, id: SourceId, info: TrackInfo) -> Vec<ArbiterAction> {
        if self.active() == Some(id) {
            vec![ArbiterAction::Forward(info.into())]
        } else {
            debug!(source = id, "dropping update from background source");
            Vec::new()
        }
    }

    /// A source gracefully stopped playing; its channel is still open.
    pub fn on_stopped(&mut self, id: SourceId) -> Vec<ArbiterAction> {
        self.remove_source(id, true)
    }

    /// A source's channel went away. No grace period: a closed tab does
    /// not warrant waiting.
    pub fn on_disconnect(&mut self, id: SourceId) -> Vec<ArbiterAction> {
        self.remove_source(id, false)
    }

    /// The pause-grace timer elapsed with no new playing source.
    pub fn on_close_elapsed(&mut self) -> Vec<ArbiterAction> {
        if self.lifecycle != DownstreamLifecycle::PendingClose {
            return Vec::new();
        }
        self.lifecycle = DownstreamLifecycle::Disconnected;
        vec![ArbiterAction::Forward(ConsumerRequest::Quit)]
    }

    /// Process shutdown: tell the consumer to quit if it was ever told
    /// anything.
    pub fn shutdown(&mut self) -> Vec<ArbiterAction> {
        if self.lifecycle == DownstreamLifecycle::Disconnected {
            return Vec::new();
        }
        self.lifecycle = DownstreamLifecycle::Disconnected;
        vec![ArbiterAction::Forward(ConsumerRequest::Quit)]
    }

    fn remove_source(&mut self, id: SourceId, channel_open: bool) -> Vec<ArbiterAction> {
        let was_front = self.active() == Some(id);
        if !self.list.remove(id) {
            return Vec::new();
        }

        if self.list.is_empty() {
            if channel_open {
                self.lifecycle = DownstreamLifecycle::PendingClose;
                vec![
                    ArbiterAction::Forward(ConsumerRequest::Pause),
                    ArbiterAction::ScheduleClose,
                ]
            } else {
                self.lifecycle = DownstreamLifecycle::Disconnected;
                vec![ArbiterAction::Forward(ConsumerRequest::Quit)]
            }
        } else if was_front {
            // The authoritative source changed; make the new front
            // re-announce its full state. The list is non-empty here.
            match self.active() {
                Some(next) => vec![ArbiterAction::Notify(next, MonitorCommand::ForceUpdate)],
                None => Vec::new(),
            }
        } else {
            Vec::new()
        }
    }
}
