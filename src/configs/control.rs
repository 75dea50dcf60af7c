use serde::{Deserialize, Serialize};

/// Control channel the bridge connects to.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ControlConfig {
    pub url: String,
    /// Account that owns the voice connections. Only logged and sent in
    /// the `User-Id` handshake header.
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,
    /// 0 retries forever.
    #[serde(default)]
    pub max_reconnect_attempts: u32,
    /// Outbound messages kept while disconnected.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost/".to_string(),
            user_id: None,
            reconnect_base_ms: default_reconnect_base_ms(),
            max_reconnect_attempts: 0,
            buffer_capacity: default_buffer_capacity(),
        }
    }
}

fn default_reconnect_base_ms() -> u64 {
    1_000
}

fn default_buffer_capacity() -> usize {
    1_000
}
