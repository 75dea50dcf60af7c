use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SourcesConfig {
    #[serde(default = "enabled")]
    pub http: bool,
    #[serde(default = "enabled")]
    pub local: bool,
    /// Bytes fetched from a remote file when probing its metadata.
    #[serde(default = "default_probe_bytes")]
    pub http_probe_bytes: usize,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            http: true,
            local: true,
            http_probe_bytes: default_probe_bytes(),
        }
    }
}

fn enabled() -> bool {
    true
}

fn default_probe_bytes() -> usize {
    256 * 1024
}
