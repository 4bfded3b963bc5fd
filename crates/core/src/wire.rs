use crate::model::TrackInfo;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Event emitted by a source monitor toward the arbiter.
///
/// `Playing`/`Stopped` announce the settled playing flag; `Update`
/// carries the settled track info. One JSON object per message, tagged
/// by `event`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SourceEvent {
    Playing,
    Stopped,
    Update {
        title: String,
        artist: String,
        album: String,
        #[serde(rename = "finishTimestamp")]
        finish_timestamp: i64,
    },
}

impl SourceEvent {
    pub fn update(info: TrackInfo) -> Self {
        SourceEvent::Update {
            title: info.title,
            artist: info.artist,
            album: info.album,
            finish_timestamp: info.finish_timestamp,
        }
    }
}

/// Command sent by the arbiter back down to one source monitor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "request")]
pub enum MonitorCommand {
    /// Bypass debounce and re-emit full current state.
    ForceUpdate,
}

/// Request forwarded to the downstream consumer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "request")]
pub enum ConsumerRequest {
    Update {
        title: String,
        artist: String,
        album: String,
        #[serde(rename = "finishTimestamp")]
        finish_timestamp: i64,
    },
    Pause,
    Quit,
}

impl From<TrackInfo> for ConsumerRequest {
    fn from(info: TrackInfo) -> Self {
        ConsumerRequest::Update {
            title: info.title,
            artist: info.artist,
            album: info.album,
            finish_timestamp: info.finish_timestamp,
        }
    }
}

#[derive(Debug, Error)]
pub enum WireError {
    /// Unknown tag, missing field, or otherwise not a valid message.
    /// Callers drop the message rather than propagate this.
    #[error("malformed wire message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Decode one inbound JSON line into `T`. Malformed input is an error
/// the caller is expected to ignore, never a crash.
pub fn decode_line<'a, T: Deserialize<'a>>(line: &'a str) -> Result<T, WireError> {
    Ok(serde_json::from_str(line)?)
}
