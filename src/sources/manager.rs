use std::time::Duration;

use super::{http::HttpSource, local::LocalSource, plugin::BoxedSource};
use crate::{configs::Config, protocol::LoadResult};

/// Fallback request timeout when loads are not bounded by the player.
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Source Manager
pub struct SourceManager {
  pub sources: Vec<BoxedSource>,
}

impl SourceManager {
  /// Create a new SourceManager with the sources enabled in `config`
  pub fn new(config: &Config) -> Self {
    let mut sources: Vec<BoxedSource> = Vec::new();
    let http_timeout = match config.player.load_timeout_secs {
      0 => DEFAULT_HTTP_TIMEOUT_SECS,
      secs => secs,
    };

    macro_rules! register_source {
      ($enabled:expr, $name:literal, $ctor:expr) => {
        if $enabled {
          match $ctor {
            Ok(src) => {
              tracing::info!("Loaded source: {}", $name);
              sources.push(Box::new(src));
            }
            Err(e) => {
              tracing::error!("{} source failed to initialize: {}", $name, e);
            }
          }
        }
      };
    }

    register_source!(
      config.sources.http,
      "http",
      HttpSource::new(&config.sources, Duration::from_secs(http_timeout))
    );

    if config.sources.local {
      tracing::info!("Loaded source: local");
      sources.push(Box::new(LocalSource::new()));
    }

    if sources.is_empty() {
      tracing::warn!("No sources enabled; every load will report no matches");
    }

    Self { sources }
  }

  pub fn with_sources(sources: Vec<BoxedSource>) -> Self {
    Self { sources }
  }

  pub fn names(&self) -> Vec<&str> {
    self.sources.iter().map(|s| s.name()).collect()
  }

  /// Load tracks using the first matching source
  pub async fn load(&self, identifier: &str) -> LoadResult {
    let identifier = identifier
      .trim()
      .trim_start_matches('<')
      .trim_end_matches('>');

    // Try each source in order
    for source in &self.sources {
      if source.can_handle(identifier) {
        tracing::trace!("Loading '{}' with source: {}", identifier, source.name());
        return source.load(identifier).await;
      }
    }

    tracing::debug!("No source could handle identifier: {}", identifier);
    LoadResult::Empty
  }
}
