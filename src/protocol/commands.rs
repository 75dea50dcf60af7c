use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::common::{
    BridgeError,
    types::{ChannelId, GuildId, SessionKey},
};

/// A validated inbound control message.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub key: SessionKey,
    /// Echoed back on notifications caused by this command.
    pub nonce: Option<String>,
    pub command: Command,
}

/// Every command the router understands.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    OpenConnection { channel_id: ChannelId },
    VoiceServerUpdate { session_id: String, payload: Value },
    CloseConnection,
    PlayTrack { source: String },
    SkipTrack,
    Stop,
    GetPlayer,
    Destroy,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenConnection { .. } => "OPEN_CONNECTION",
            Self::VoiceServerUpdate { .. } => "VOICE_SERVER_UPDATE",
            Self::CloseConnection => "CLOSE_CONNECTION",
            Self::PlayTrack { .. } => "PLAY_TRACK",
            Self::SkipTrack => "SKIP_TRACK",
            Self::Stop => "STOP",
            Self::GetPlayer => "GET_PLAYER",
            Self::Destroy => "DESTROY",
        }
    }
}

#[derive(Deserialize)]
struct RawEnvelope {
    identifier: String,
    #[serde(default)]
    nonce: Option<String>,
    #[serde(flatten)]
    command: RawCommand,
}

#[derive(Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
enum RawCommand {
    OpenConnection {
        #[serde(deserialize_with = "snowflake")]
        guild_id: String,
        #[serde(deserialize_with = "snowflake")]
        channel_id: String,
    },
    VoiceServerUpdate {
        #[serde(default, deserialize_with = "opt_snowflake")]
        guild_id: Option<String>,
        session_id: String,
        #[serde(deserialize_with = "voice_server_payload")]
        vsu: Value,
    },
    CloseConnection {
        #[serde(deserialize_with = "snowflake")]
        guild_id: String,
    },
    #[serde(alias = "PLAY_SONG")]
    PlayTrack {
        #[serde(deserialize_with = "snowflake")]
        guild_id: String,
        #[serde(alias = "track", alias = "url")]
        source: String,
    },
    SkipTrack {
        #[serde(deserialize_with = "snowflake")]
        guild_id: String,
    },
    Stop {
        #[serde(deserialize_with = "snowflake")]
        guild_id: String,
    },
    GetPlayer {
        #[serde(deserialize_with = "snowflake")]
        guild_id: String,
    },
    Destroy {
        #[serde(deserialize_with = "snowflake")]
        guild_id: String,
    },
}

/// Discord ids arrive either as strings or as bare numbers.
fn snowflake<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) if n.is_u64() => Ok(n.to_string()),
        _ => Err(serde::de::Error::custom("expected an id string or number")),
    }
}

fn opt_snowflake<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) if n.is_u64() => Ok(Some(n.to_string())),
        _ => Err(serde::de::Error::custom("expected an id string or number")),
    }
}

/// The server update is either an object or a string holding one.
fn voice_server_payload<'de, D>(deserializer: D) -> Result<Value, D::Error>
where
    D: Deserializer<'de>,
{
    let value = match Value::deserialize(deserializer)? {
        Value::String(s) => serde_json::from_str(&s).map_err(serde::de::Error::custom)?,
        other => other,
    };
    if value.is_object() {
        Ok(value)
    } else {
        Err(serde::de::Error::custom("vsu must be a JSON object"))
    }
}

fn required(field: &'static str, value: String) -> Result<String, BridgeError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(BridgeError::malformed(format!("`{field}` must not be empty")))
    } else {
        Ok(trimmed.to_string())
    }
}

impl Envelope {
    /// Parses and validates one text frame from the control channel.
    pub fn parse(raw: &str) -> Result<Self, BridgeError> {
        let RawEnvelope {
            identifier,
            nonce,
            command,
        } = serde_json::from_str(raw)?;
        let identifier = required("identifier", identifier)?;

        let (guild_id, command) = match command {
            RawCommand::OpenConnection {
                guild_id,
                channel_id,
            } => (
                guild_id,
                Command::OpenConnection {
                    channel_id: ChannelId(required("channel_id", channel_id)?),
                },
            ),
            RawCommand::VoiceServerUpdate {
                guild_id,
                session_id,
                vsu,
            } => {
                let guild_id = guild_id
                    .filter(|g| !g.trim().is_empty())
                    .or_else(|| payload_guild(&vsu))
                    .ok_or_else(|| {
                        BridgeError::malformed("`guild_id` missing from command and vsu payload")
                    })?;
                (
                    guild_id,
                    Command::VoiceServerUpdate {
                        session_id: required("session_id", session_id)?,
                        payload: vsu,
                    },
                )
            }
            RawCommand::CloseConnection { guild_id } => (guild_id, Command::CloseConnection),
            RawCommand::PlayTrack { guild_id, source } => (
                guild_id,
                Command::PlayTrack {
                    source: required("source", source)?,
                },
            ),
            RawCommand::SkipTrack { guild_id } => (guild_id, Command::SkipTrack),
            RawCommand::Stop { guild_id } => (guild_id, Command::Stop),
            RawCommand::GetPlayer { guild_id } => (guild_id, Command::GetPlayer),
            RawCommand::Destroy { guild_id } => (guild_id, Command::Destroy),
        };

        Ok(Self {
            key: SessionKey::new(identifier, GuildId(required("guild_id", guild_id)?)),
            nonce: nonce.filter(|n| !n.is_empty()),
            command,
        })
    }
}

fn payload_guild(vsu: &Value) -> Option<String> {
    match vsu.get("guild_id")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
