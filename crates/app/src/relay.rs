use anyhow::{Context, Result};
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tunerelay_arbiter::{Arbiter, ArbiterAction};
use tunerelay_core::wire::decode_line;
use tunerelay_core::{AppConfig, ConsumerRequest, MonitorCommand, SourceEvent, SourceId, TrackInfo};
use tunerelay_host::HostClient;
use tunerelay_monitor::{run_monitor, MonitorConfig, SurfaceReading, WatchSurface};

/// Accept source connections, run one monitor per source, and drive the
/// arbiter until ctrl-c.
pub async fn run(cfg: AppConfig) -> Result<()> {
    let listener = TcpListener::bind(&cfg.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.listen_addr))?;
    info!(addr = %cfg.listen_addr, "tunerelay started");

    let monitor_cfg = MonitorConfig::from_intervals(&cfg.intervals);
    let grace = Duration::from_millis(cfg.intervals.pause_grace_ms);

    let mut arbiter = Arbiter::new();
    let mut registry: HashMap<SourceId, mpsc::Sender<MonitorCommand>> = HashMap::new();
    let mut host = HostClient::new(cfg.host_command.clone());
    let mut close_deadline: Option<tokio::time::Instant> = None;
    let mut next_id: SourceId = 1;

    let (event_tx, mut event_rx) = mpsc::channel::<(SourceId, SourceEvent)>(64);
    let (hangup_tx, mut hangup_rx) = mpsc::channel::<SourceId>(16);

    loop {
        let close_at = close_deadline;
        let close = async move {
            match close_at {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((socket, peer)) => {
                        let id = next_id;
                        next_id += 1;
                        let cmd_tx = spawn_source(
                            id,
                            socket,
                            event_tx.clone(),
                            hangup_tx.clone(),
                            monitor_cfg.clone(),
                        );
                        registry.insert(id, cmd_tx);
                        info!(source = id, peer = %peer, "source connected");
                    }
                    Err(err) => warn!(error = %err, "accept failed"),
                }
            }
            Some((id, event)) = event_rx.recv() => {
                if !registry.contains_key(&id) {
                    debug!(source = id, "event from disconnected source dropped");
                    continue;
                }
                let actions = match event {
                    SourceEvent::Playing => {
                        info!(source = id, "source is now playing");
                        arbiter.on_playing(id)
                    }
                    SourceEvent::Stopped => {
                        info!(source = id, "source is now stopped");
                        arbiter.on_stopped(id)
                    }
                    SourceEvent::Update { title, artist, album, finish_timestamp } => {
                        arbiter.on_update(id, TrackInfo { title, artist, album, finish_timestamp })
                    }
                };
                apply(actions, &mut host, &registry, &mut close_deadline, grace).await;
            }
            Some(id) = hangup_rx.recv() => {
                // Dropping the command sender stops the monitor task and
                // with it any pending settle timers.
                registry.remove(&id);
                info!(source = id, "source disconnected");
                let actions = arbiter.on_disconnect(id);
                apply(actions, &mut host, &registry, &mut close_deadline, grace).await;
            }
            _ = close => {
                close_deadline = None;
                let actions = arbiter.on_close_elapsed();
                apply(actions, &mut host, &registry, &mut close_deadline, grace).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received ctrl-c; shutting down");
                let actions = arbiter.shutdown();
                apply(actions, &mut host, &registry, &mut close_deadline, grace).await;
                break;
            }
        }
    }

    Ok(())
}

/// Wire up one accepted connection: a reader task feeding the latest
/// raw reading into a watch channel, and a monitor task polling it.
fn spawn_source(
    id: SourceId,
    socket: TcpStream,
    events: mpsc::Sender<(SourceId, SourceEvent)>,
    hangups: mpsc::Sender<SourceId>,
    cfg: MonitorConfig,
) -> mpsc::Sender<MonitorCommand> {
    let (cmd_tx, cmd_rx) = mpsc::channel(4);
    let (reading_tx, surface) = WatchSurface::channel();

    tokio::spawn(run_monitor(surface, id, events, cmd_rx, cfg));

    tokio::spawn(async move {
        let mut lines = BufReader::new(socket).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match decode_line::<SurfaceReading>(&line) {
                    Ok(reading) => {
                        let _ = reading_tx.send(reading);
                    }
                    Err(err) => {
                        debug!(source = id, error = %err, "ignoring malformed reading");
                    }
                },
                Ok(None) => break,
                Err(err) => {
                    debug!(source = id, error = %err, "source read error");
                    break;
                }
            }
        }
        let _ = hangups.send(id).await;
    });

    cmd_tx
}

async fn apply(
    actions: Vec<ArbiterAction>,
    host: &mut HostClient,
    registry: &HashMap<SourceId, mpsc::Sender<MonitorCommand>>,
    close_deadline: &mut Option<tokio::time::Instant>,
    grace: Duration,
) {
    for action in actions {
        match action {
            ArbiterAction::Forward(request) => forward(host, request).await,
            ArbiterAction::Notify(id, command) => match registry.get(&id) {
                Some(tx) => {
                    let _ = tx.try_send(command);
                }
                None => debug!(source = id, "command for unregistered source dropped"),
            },
            ArbiterAction::ScheduleClose => {
                *close_deadline = Some(tokio::time::Instant::now() + grace);
            }
            ArbiterAction::CancelClose => {
                *close_deadline = None;
            }
        }
    }
}

async fn forward(host: &mut HostClient, request: ConsumerRequest) {
    let quitting = request == ConsumerRequest::Quit;
    if quitting && !host.is_connected() {
        // Never spawn a consumer just to tell it to quit.
        return;
    }
    if let Err(err) = host.send(&request).await {
        warn!(error = %err, "host send failed; will retry on next request");
    }
    if quitting {
        host.disconnect();
    }
}
