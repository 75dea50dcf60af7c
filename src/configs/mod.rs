pub mod base;
pub mod control;
pub mod logging;
pub mod player;
pub mod sources;

pub use base::*;
pub use control::*;
pub use logging::*;
pub use player::*;
pub use sources::*;
