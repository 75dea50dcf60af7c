pub mod common;
pub mod configs;
pub mod gateway;
pub mod player;
pub mod protocol;
pub mod server;
pub mod sources;
pub mod ws;

#[cfg(test)]
pub(crate) mod testing;
