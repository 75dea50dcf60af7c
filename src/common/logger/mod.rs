use std::{fs, path::Path};

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub mod formatter;
pub mod writer;

pub use formatter::*;
pub use writer::*;

use crate::configs::LoggingConfig;

fn filter_directive(config: Option<&LoggingConfig>) -> String {
    let level = config
        .and_then(|l| l.level.as_deref())
        .unwrap_or("info");
    let filters = config
        .and_then(|l| l.filters.as_deref())
        .unwrap_or("")
        .trim();

    // tungstenite and rustls are chatty at debug
    if filters.is_empty() {
        format!("{level},tungstenite=warn,rustls=warn")
    } else {
        format!("{level},tungstenite=warn,rustls=warn,{filters}")
    }
}

/// Installs the global subscriber. `RUST_LOG` takes precedence over the
/// configured level.
pub fn init(config: Option<&LoggingConfig>) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(config)));

    let stdout_layer = fmt::layer()
        .event_format(BridgeFormatter::new(true))
        .with_ansi(true);

    let file_layer = config.and_then(|l| l.file.as_ref()).map(|file| {
        if let Some(parent) = Path::new(&file.path).parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                eprintln!("Failed to create log directory: {e}");
            }
        }

        fmt::layer()
            .with_writer(RollingLineWriter::new(&file.path, file.max_lines))
            .event_format(BridgeFormatter::new(false))
            .with_ansi(false)
    });

    if let Err(e) = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
    {
        eprintln!("Logger already initialised: {e}");
    }
}
