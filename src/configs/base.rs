use serde::{Deserialize, Serialize};

use crate::configs::*;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
  pub control: ControlConfig,
  #[serde(default)]
  pub player: PlayerConfig,
  #[serde(default)]
  pub sessions: SessionsConfig,
  #[serde(default)]
  pub sources: SourcesConfig,
  pub logging: Option<LoggingConfig>,
}

use crate::common::types::AnyResult;

impl Config {
  pub fn load() -> AnyResult<Self> {
    let config_path = if let Ok(path) = std::env::var("VOICEBRIDGE_CONFIG") {
      path
    } else if std::path::Path::new("config.toml").exists() {
      "config.toml".to_string()
    } else if std::path::Path::new("config.default.toml").exists() {
      "config.default.toml".to_string()
    } else {
      return Err("config.toml or config.default.toml not found".into());
    };

    println!("Loading configuration from: {}", config_path);

    let config_str = std::fs::read_to_string(&config_path)?;
    if config_str.trim().is_empty() {
      return Err(format!("{} is empty", config_path).into());
    }

    Self::parse(&config_str)
  }

  pub fn parse(config_str: &str) -> AnyResult<Self> {
    let config: Config = toml::from_str(config_str)?;
    if config.control.url.trim().is_empty() {
      return Err("control.url must not be empty".into());
    }
    Ok(config)
  }
}
