use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;

use crate::{
    common::{
        VoiceError,
        types::{ChannelId, SessionKey},
    },
    protocol::VoiceStatus,
};

pub mod constants;
pub mod relay;

pub use relay::RelayGateway;

/// Source of audio frames for one voice connection, polled every
/// [`constants::FRAME_DURATION_MS`] by the connection.
pub trait AudioSendHandler: Send + Sync {
    fn can_provide(&self) -> bool;
    fn provide_frame(&self) -> Option<Bytes>;
}

/// The gateway client that owns the voice connections.
pub trait VoiceGateway: Send + Sync {
    /// Joins `channel_id`, or moves there if already connected.
    fn open_connection(&self, key: &SessionKey, channel_id: &ChannelId);

    fn close_connection(&self, key: &SessionKey);

    /// Hands over the voice server details Discord sent for this guild.
    fn provide_voice_server_update(
        &self,
        key: &SessionKey,
        session_id: &str,
        payload: &Value,
    ) -> Result<(), VoiceError>;

    fn set_sending_handler(&self, key: &SessionKey, handler: Arc<dyn AudioSendHandler>);

    fn status(&self, key: &SessionKey) -> VoiceStatus;

    /// Forgets everything about `key`. Called when its session is destroyed.
    fn release(&self, key: &SessionKey);
}
