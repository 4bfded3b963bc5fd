use serde::{Deserialize, Serialize};

/// Identifier for one connected source, assigned by the transport layer.
/// Unique for the lifetime of the connection.
pub type SourceId = u64;

/// The fields a source announces for the item it is currently playing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackInfo {
    pub title: String,
    pub artist: String,
    pub album: String,
    /// Epoch-seconds estimate of when the current item ends.
    pub finish_timestamp: i64,
}

/// Lifecycle of the single downstream consumer channel.
///
/// `PendingClose` means the channel is still open but the pause-grace
/// timer is running; a new playing source cancels it, expiry quits.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum DownstreamLifecycle {
    #[default]
    Disconnected,
    Connected,
    PendingClose,
}
