pub mod config;
pub mod model;
pub mod wire;

pub use config::{AppConfig, ConfigIntervals};
pub use model::{DownstreamLifecycle, SourceId, TrackInfo};
pub use wire::{ConsumerRequest, MonitorCommand, SourceEvent, WireError};
