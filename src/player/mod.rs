pub mod driver;
pub mod handle;
pub mod monitor;
pub mod queue;
pub mod scheduler;

pub use driver::{PacedDriver, PlaybackDriver};
pub use handle::{PlaybackState, TrackHandle};
pub use queue::TrackQueue;
pub use scheduler::{PlaybackScheduler, SchedulerState, Transition};
