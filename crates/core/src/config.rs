use serde::{Deserialize, Serialize};

fn default_schema_version() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigIntervals {
    /// How often each source monitor samples its surface.
    pub poll_ms: u64,
    /// Settle window for the playing flag; rapid toggles inside it
    /// collapse to a single emitted transition.
    pub playing_settle_ms: u64,
    /// Grace period between the last source pausing and the downstream
    /// consumer being told to quit.
    pub pause_grace_ms: u64,
}

impl Default for ConfigIntervals {
    fn default() -> Self {
        Self {
            poll_ms: 2_000,
            playing_settle_ms: 500,
            pause_grace_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// Address the relay listens on for source connections.
    pub listen_addr: String,
    /// Downstream consumer program plus arguments, spawned lazily on
    /// first need.
    pub host_command: Vec<String>,
    pub intervals: ConfigIntervals,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            listen_addr: "127.0.0.1:7365".to_string(),
            host_command: vec!["tunerelay-presence-host".to_string()],
            intervals: ConfigIntervals::default(),
            log_level: "info".to_string(),
        }
    }
}
