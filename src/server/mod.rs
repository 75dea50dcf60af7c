use std::sync::Arc;

use crate::{
    configs::PlayerConfig, gateway::VoiceGateway, player::PlaybackDriver, sources::SourceManager,
};

pub mod outbound;
pub mod session;
pub mod session_manager;

pub use outbound::Outbound;
pub use session::GuildSession;
pub use session_manager::SessionRegistry;

/// Collaborators shared by every guild session.
pub struct SessionContext {
    pub gateway: Arc<dyn VoiceGateway>,
    pub driver: Arc<dyn PlaybackDriver>,
    pub sources: Arc<SourceManager>,
    pub outbound: Outbound,
    pub player: PlayerConfig,
}
