use anyhow::{anyhow, Context, Result};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, warn};
use tunerelay_core::ConsumerRequest;

const BACKOFF_STEPS: [Duration; 4] = [
    Duration::from_secs(2),
    Duration::from_secs(5),
    Duration::from_secs(10),
    Duration::from_secs(30),
];

struct HostProcess {
    child: Child,
    stdin: ChildStdin,
}

/// Client for the single downstream consumer process.
///
/// The process is spawned lazily on the first request and fed
/// native-messaging frames on stdin: a 4-byte little-endian length
/// header followed by one JSON object. A failed write drops the child
/// and schedules reconnect backoff; the caller simply retries on the
/// next request.
pub struct HostClient {
    command: Vec<String>,
    process: Option<HostProcess>,
    backoff_idx: usize,
    next_retry_at: Instant,
}

impl HostClient {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            process: None,
            backoff_idx: 0,
            next_retry_at: Instant::now(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.process.is_some()
    }

    pub async fn send(&mut self, request: &ConsumerRequest) -> Result<()> {
        self.ensure_spawned()?;
        let frame = encode_frame(&serde_json::to_vec(request)?);

        let process = self
            .process
            .as_mut()
            .ok_or_else(|| anyhow!("host process not running"))?;
        if let Err(err) = write_frame(&mut process.stdin, &frame).await {
            warn!(error = %err, "host write failed; dropping process");
            self.disconnect();
            self.schedule_backoff();
            return Err(err);
        }
        Ok(())
    }

    /// Drop the stdin pipe and reap the child off-task. The consumer
    /// exits on its own once its stdin closes or it has handled `Quit`.
    pub fn disconnect(&mut self) {
        if let Some(process) = self.process.take() {
            let HostProcess { mut child, stdin } = process;
            drop(stdin);
            tokio::spawn(async move {
                let _ = child.wait().await;
            });
        }
    }

    fn ensure_spawned(&mut self) -> Result<()> {
        if self.process.is_some() {
            return Ok(());
        }
        if Instant::now() < self.next_retry_at {
            return Err(anyhow!("host respawn backoff active"));
        }

        let (program, args) = self
            .command
            .split_first()
            .map(|(p, rest)| (p.clone(), rest.to_vec()))
            .ok_or_else(|| anyhow!("host command is empty"))?;

        let spawned = Command::new(&program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to spawn host process {program}"));
        let mut child = match spawned {
            Ok(child) => child,
            Err(err) => {
                self.schedule_backoff();
                return Err(err);
            }
        };

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("host process has no stdin"))?;

        debug!(program = %program, "host process spawned");
        self.backoff_idx = 0;
        self.next_retry_at = Instant::now();
        self.process = Some(HostProcess { child, stdin });
        Ok(())
    }

    fn schedule_backoff(&mut self) {
        let idx = self.backoff_idx.min(BACKOFF_STEPS.len() - 1);
        self.next_retry_at = Instant::now() + BACKOFF_STEPS[idx];
        self.backoff_idx = (self.backoff_idx + 1).min(BACKOFF_STEPS.len() - 1);
    }
}

async fn write_frame(stdin: &mut ChildStdin, frame: &[u8]) -> Result<()> {
    stdin.write_all(frame).await?;
    stdin.flush().await?;
    Ok(())
}

fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(payload);
    frame
}
