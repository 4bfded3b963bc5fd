use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

mod monitor;
mod run;

pub use monitor::{CycleOutcome, SourceMonitor};
pub use run::{run_monitor, MonitorConfig};

/// One raw sample of an external playback surface.
///
/// Every field is optional: an absent field means the surface could not
/// be read this cycle and the corresponding check is skipped.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SurfaceReading {
    pub is_playing: Option<bool>,
    pub title: Option<String>,
    /// Combined "artist • album" line as the player renders it.
    pub subtitle: Option<String>,
    pub progress_value: Option<f64>,
    pub progress_max: Option<f64>,
}

/// Seam between a source monitor and whatever it observes. The concrete
/// implementation (a pushed snapshot, a scripted fixture) is an
/// external collaborator; the monitor only polls it.
#[async_trait]
pub trait PlayerSurface: Send {
    fn name(&self) -> &'static str;
    async fn read(&mut self) -> Result<SurfaceReading>;
}

/// Surface backed by a `watch` channel: the transport side pushes the
/// latest reading whenever it likes, the monitor samples on its own
/// period.
pub struct WatchSurface {
    rx: watch::Receiver<SurfaceReading>,
}

impl WatchSurface {
    pub fn new(rx: watch::Receiver<SurfaceReading>) -> Self {
        Self { rx }
    }

    pub fn channel() -> (watch::Sender<SurfaceReading>, Self) {
        let (tx, rx) = watch::channel(SurfaceReading::default());
        (tx, Self::new(rx))
    }
}

#[async_trait]
impl PlayerSurface for WatchSurface {
    fn name(&self) -> &'static str {
        "watch"
    }

    async fn read(&mut self) -> Result<SurfaceReading> {
        Ok(self.rx.borrow().clone())
    }
}
