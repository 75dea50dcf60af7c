use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::{AudioSendHandler, VoiceGateway, constants::OP_VOICE_STATE_UPDATE};
use crate::{
    common::{
        VoiceError,
        types::{ChannelId, SessionKey},
    },
    protocol::{OutgoingMessage, VoiceStatus},
    server::outbound::Outbound,
};

#[derive(Default)]
struct VoiceConnection {
    channel_id: Option<ChannelId>,
    session_id: Option<String>,
    token: Option<String>,
    endpoint: Option<String>,
    handler: Option<Arc<dyn AudioSendHandler>>,
}

impl VoiceConnection {
    fn is_ready(&self) -> bool {
        self.channel_id.is_some() && self.token.is_some() && self.endpoint.is_some()
    }
}

/// Gateway client that has no gateway socket of its own: voice state
/// updates are handed back to the control channel as `SEND_WS` messages
/// for the controlling side to forward on the bot's main gateway.
///
/// It tracks what each session asked for and what Discord answered; the
/// voice websocket/UDP handshake that would follow is not performed here.
pub struct RelayGateway {
    outbound: Outbound,
    connections: DashMap<SessionKey, VoiceConnection>,
}

impl RelayGateway {
    pub fn new(outbound: Outbound) -> Self {
        Self {
            outbound,
            connections: DashMap::new(),
        }
    }

    fn send_voice_state(&self, key: &SessionKey, channel_id: Option<&ChannelId>) {
        let payload = json!({
            "op": OP_VOICE_STATE_UPDATE,
            "d": {
                "guild_id": key.guild_id,
                "channel_id": channel_id,
                "self_mute": false,
                "self_deaf": false,
            }
        });
        self.outbound
            .send(&OutgoingMessage::send_ws(&key.identifier, payload.to_string()));
    }
}

fn non_empty<'a>(payload: &'a Value, field: &str) -> Option<&'a str> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

impl VoiceGateway for RelayGateway {
    fn open_connection(&self, key: &SessionKey, channel_id: &ChannelId) {
        {
            let mut conn = self.connections.entry(key.clone()).or_default();
            if conn.channel_id.as_ref() == Some(channel_id) {
                debug!("[{}] Re-requesting voice channel {}", key, channel_id);
            } else if let Some(previous) = conn.channel_id.replace(channel_id.clone()) {
                info!("[{}] Moving voice connection {} -> {}", key, previous, channel_id);
            } else {
                info!("[{}] Opening voice connection to {}", key, channel_id);
            }
        }
        self.send_voice_state(key, Some(channel_id));
    }

    fn close_connection(&self, key: &SessionKey) {
        if let Some(mut conn) = self.connections.get_mut(key) {
            conn.channel_id = None;
            conn.session_id = None;
            conn.token = None;
            conn.endpoint = None;
        }
        info!("[{}] Closing voice connection", key);
        self.send_voice_state(key, None);
    }

    fn provide_voice_server_update(
        &self,
        key: &SessionKey,
        session_id: &str,
        payload: &Value,
    ) -> Result<(), VoiceError> {
        let token = non_empty(payload, "token").ok_or(VoiceError::InvalidServerUpdate("token"))?;
        // a null endpoint means Discord is still allocating a server
        let endpoint =
            non_empty(payload, "endpoint").ok_or(VoiceError::InvalidServerUpdate("endpoint"))?;

        let mut conn = self.connections.entry(key.clone()).or_default();
        conn.session_id = Some(session_id.to_string());
        conn.token = Some(token.to_string());
        conn.endpoint = Some(endpoint.to_string());

        if conn.channel_id.is_none() {
            warn!(
                "[{}] Voice server update for a session with no requested channel",
                key
            );
        } else {
            info!("[{}] Voice server update received: endpoint={}", key, endpoint);
        }
        Ok(())
    }

    fn set_sending_handler(&self, key: &SessionKey, handler: Arc<dyn AudioSendHandler>) {
        self.connections.entry(key.clone()).or_default().handler = Some(handler);
    }

    fn status(&self, key: &SessionKey) -> VoiceStatus {
        let Some(conn) = self.connections.get(key) else {
            return VoiceStatus::default();
        };
        VoiceStatus {
            channel_id: conn.channel_id.clone(),
            session_id: conn.session_id.clone(),
            endpoint: conn.endpoint.clone(),
            connected: conn.is_ready(),
            sending: conn.is_ready() && conn.handler.as_ref().is_some_and(|h| h.can_provide()),
        }
    }

    fn release(&self, key: &SessionKey) {
        self.connections.remove(key);
    }
}
