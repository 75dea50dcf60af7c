use serde::Serialize;

use crate::{
    common::{
        Severity,
        types::{ChannelId, GuildId, SessionKey},
    },
    protocol::tracks::TrackItem,
};

/// Messages sent from the bridge to the control channel. Every variant
/// serializes with its kind in the `action` field.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum OutgoingMessage {
    Gateway(GatewayMessage),
    Session {
        identifier: String,
        guild_id: GuildId,
        #[serde(flatten)]
        event: SessionEvent,
    },
}

impl OutgoingMessage {
    pub fn event(key: &SessionKey, event: SessionEvent) -> Self {
        Self::Session {
            identifier: key.identifier.clone(),
            guild_id: key.guild_id.clone(),
            event,
        }
    }

    pub fn send_ws(identifier: &str, message: String) -> Self {
        Self::Gateway(GatewayMessage::SendWs {
            identifier: identifier.to_string(),
            message,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayMessage {
    /// A gateway payload the controlling side must forward on our behalf.
    SendWs { identifier: String, message: String },
}

/// Everything a guild session reports.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionEvent {
    TrackQueued {
        track: TrackItem,
        /// 1-based position in the queue.
        position: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        nonce: Option<String>,
    },
    TrackStart {
        track: TrackItem,
    },
    TrackEnd {
        track: TrackItem,
        reason: TrackEndReason,
    },
    TrackException {
        track: TrackItem,
        #[serde(flatten)]
        exception: TrackException,
    },
    TrackStuck {
        track: TrackItem,
        threshold_ms: u64,
    },
    LoadFailed {
        source: String,
        reason: LoadFailureReason,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        nonce: Option<String>,
    },
    PlayerUpdate {
        state: PlayerState,
    },
    /// Reply to `GET_PLAYER`.
    #[serde(rename = "PLAYER_STATE")]
    PlayerReport {
        #[serde(skip_serializing_if = "Option::is_none")]
        nonce: Option<String>,
        #[serde(flatten)]
        snapshot: PlayerSnapshot,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TrackEndReason {
    Finished,
    LoadFailed,
    Stopped,
    Replaced,
    Cleanup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum LoadFailureReason {
    NoMatches,
    LoadFailed,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackException {
    pub message: String,
    pub severity: Severity,
}

/// Position report for an active player.
#[derive(Debug, Clone, Serialize)]
pub struct PlayerState {
    /// Unix timestamp in milliseconds.
    pub time: u64,
    /// Playback position in milliseconds.
    pub position: u64,
    /// Whether the voice connection is up.
    pub connected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerPhase {
    Idle,
    Playing,
    Transitioning,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayerSnapshot {
    pub state: SchedulerPhase,
    pub current: Option<TrackItem>,
    pub position: Option<u64>,
    pub queue: Vec<TrackItem>,
    pub voice: VoiceStatus,
    /// Why the most recent failed track failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<String>,
}

impl PlayerSnapshot {
    /// Snapshot of a guild without a session.
    pub fn idle(voice: VoiceStatus) -> Self {
        Self {
            state: SchedulerPhase::Idle,
            current: None,
            position: None,
            queue: Vec::new(),
            voice,
            last_failure: None,
        }
    }
}

/// What the gateway knows about one session's voice connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VoiceStatus {
    pub channel_id: Option<ChannelId>,
    pub session_id: Option<String>,
    pub endpoint: Option<String>,
    /// Channel requested and server update received.
    pub connected: bool,
    /// The registered send handler currently has audio.
    pub sending: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_carry_their_kind_as_action() {
        let key = SessionKey::new("bot", "42");
        let msg = OutgoingMessage::event(
            &key,
            SessionEvent::TrackEnd {
                track: TrackItem::new("a.mp3", "A"),
                reason: TrackEndReason::LoadFailed,
            },
        );

        let value = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(value["action"], "TRACK_END");
        assert!(value.get("type").is_none());
        assert_eq!(value["identifier"], "bot");
        assert_eq!(value["guild_id"], "42");
        assert_eq!(value["reason"], "loadFailed");
        assert_eq!(value["track"]["title"], "A");
    }

    #[test]
    fn exception_fields_sit_at_top_level() {
        let key = SessionKey::new("bot", "42");
        let msg = OutgoingMessage::event(
            &key,
            SessionEvent::TrackException {
                track: TrackItem::new("a.mp3", "A"),
                exception: TrackException {
                    message: "decoder died".into(),
                    severity: Severity::Fault,
                },
            },
        );

        let value = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(value["action"], "TRACK_EXCEPTION");
        assert_eq!(value["message"], "decoder died");
        assert_eq!(value["severity"], "fault");
    }

    #[test]
    fn player_report_flattens_snapshot() {
        let key = SessionKey::new("bot", "7");
        let msg = OutgoingMessage::event(
            &key,
            SessionEvent::PlayerReport {
                nonce: Some("n".into()),
                snapshot: PlayerSnapshot::idle(VoiceStatus::default()),
            },
        );

        let value = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(value["action"], "PLAYER_STATE");
        assert_eq!(value["guild_id"], "7");
        assert_eq!(value["state"], "idle");
        assert_eq!(value["nonce"], "n");
        assert_eq!(value["voice"]["connected"], false);
    }

    #[test]
    fn send_ws_wraps_gateway_payload() {
        let msg = OutgoingMessage::send_ws("bot", "{\"op\":4}".into());
        assert_eq!(
            serde_json::to_value(&msg).expect("serialize"),
            json!({"action": "SEND_WS", "identifier": "bot", "message": "{\"op\":4}"})
        );
    }

    #[test]
    fn load_failed_omits_absent_nonce() {
        let key = SessionKey::new("bot", "1");
        let msg = OutgoingMessage::event(
            &key,
            SessionEvent::LoadFailed {
                source: "nothing".into(),
                reason: LoadFailureReason::NoMatches,
                message: None,
                nonce: None,
            },
        );
        let value = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(value["action"], "LOAD_FAILED");
        assert_eq!(value["reason"], "noMatches");
        assert!(value.get("nonce").is_none());
        assert!(value.get("message").is_none());
    }
}
