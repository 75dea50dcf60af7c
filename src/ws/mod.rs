mod backoff;
pub mod client;
pub mod router;

pub use client::ControlClient;
pub use router::{CommandRouter, Outcome};
