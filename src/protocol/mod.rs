pub mod commands;
pub mod events;
pub mod tracks;

pub use commands::{Command, Envelope};
pub use events::*;
pub use tracks::*;
