use crate::{PlayerSurface, SourceMonitor};
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::mpsc;
use tracing::debug;
use tunerelay_core::{ConfigIntervals, MonitorCommand, SourceEvent, SourceId};

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub poll: Duration,
    pub playing_settle: Duration,
}

impl MonitorConfig {
    pub fn from_intervals(intervals: &ConfigIntervals) -> Self {
        Self {
            poll: Duration::from_millis(intervals.poll_ms),
            playing_settle: Duration::from_millis(intervals.playing_settle_ms),
        }
    }
}

/// Drive one source monitor: poll the surface on a fixed period, settle
/// pending playing toggles on their deadline, and service `ForceUpdate`
/// commands from the arbiter.
///
/// The task ends when the command channel or the event channel closes.
pub async fn run_monitor<S: PlayerSurface>(
    mut surface: S,
    id: SourceId,
    events: mpsc::Sender<(SourceId, SourceEvent)>,
    mut commands: mpsc::Receiver<MonitorCommand>,
    cfg: MonitorConfig,
) {
    let mut monitor = SourceMonitor::new(cfg.playing_settle);
    let mut next_poll = tokio::time::Instant::now();
    let mut playing_deadline: Option<Instant> = None;

    loop {
        let settle_at = playing_deadline;
        let settle = async move {
            match settle_at {
                Some(deadline) => {
                    tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await
                }
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = tokio::time::sleep_until(next_poll) => {
                next_poll += cfg.poll;
                match surface.read().await {
                    Ok(reading) => {
                        let out = monitor.check_cycle(&reading, clock_now(), SystemTime::now());
                        playing_deadline = out.playing_deadline;
                        for event in out.events {
                            if events.send((id, event)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(err) => {
                        debug!(source = id, error = %err, "surface read failed; skipping cycle");
                    }
                }
            }
            _ = settle => {
                playing_deadline = None;
                if let Some(event) = monitor.settle_playing(clock_now()) {
                    let started = matches!(event, SourceEvent::Playing);
                    if events.send((id, event)).await.is_err() {
                        return;
                    }
                    // A freshly started session announces itself right
                    // away instead of waiting out a full settle cycle.
                    if started {
                        if let Some(update) = refresh(&mut surface, &mut monitor).await {
                            if events.send((id, update)).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
            cmd = commands.recv() => match cmd {
                Some(MonitorCommand::ForceUpdate) => {
                    if let Some(update) = refresh(&mut surface, &mut monitor).await {
                        if events.send((id, update)).await.is_err() {
                            return;
                        }
                    }
                }
                None => return,
            },
        }
    }
}

/// Monotonic "now" sourced from the tokio clock so settle deadlines
/// line up with `sleep_until` even under a test-paused clock.
fn clock_now() -> Instant {
    tokio::time::Instant::now().into_std()
}

async fn refresh<S: PlayerSurface>(
    surface: &mut S,
    monitor: &mut SourceMonitor,
) -> Option<SourceEvent> {
    match surface.read().await {
        Ok(reading) => monitor.force_refresh(&reading, SystemTime::now()),
        Err(err) => {
            debug!(error = %err, "surface read failed; skipping forced refresh");
            None
        }
    }
}
