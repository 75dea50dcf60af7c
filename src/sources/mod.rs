pub mod http;
pub mod local;
pub mod manager;
pub mod playlist;
pub mod plugin;
pub mod probe;

pub use manager::SourceManager;
pub use plugin::{BoxedSource, SourcePlugin};
