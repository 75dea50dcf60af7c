use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PlayerConfig {
    /// A playing track whose position does not move for this long is
    /// reported stuck and ended.
    #[serde(default = "default_stuck_threshold_ms")]
    pub stuck_threshold_ms: u64,
    /// Seconds between `PLAYER_UPDATE` messages. 0 disables them.
    #[serde(default = "default_update_interval_secs")]
    pub update_interval_secs: u64,
    #[serde(default = "default_load_timeout_secs")]
    pub load_timeout_secs: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            stuck_threshold_ms: default_stuck_threshold_ms(),
            update_interval_secs: default_update_interval_secs(),
            load_timeout_secs: default_load_timeout_secs(),
        }
    }
}

fn default_stuck_threshold_ms() -> u64 {
    10_000
}

fn default_update_interval_secs() -> u64 {
    5
}

fn default_load_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct SessionsConfig {
    /// 0 leaves the registry unbounded.
    #[serde(default)]
    pub max_sessions: usize,
}

impl SessionsConfig {
    pub fn limit(&self) -> Option<usize> {
        (self.max_sessions > 0).then_some(self.max_sessions)
    }
}
