//! Fakes shared by the unit tests.

use std::{collections::HashSet, sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::{
    common::{
        DriverError, VoiceError,
        types::{ChannelId, SessionKey},
    },
    configs::PlayerConfig,
    gateway::{AudioSendHandler, VoiceGateway},
    player::{PlaybackDriver, TrackHandle},
    protocol::{LoadResult, TrackItem, VoiceStatus},
    server::{GuildSession, Outbound, SessionContext, SessionRegistry},
    sources::{SourceManager, SourcePlugin},
};

pub fn track(name: &str) -> TrackItem {
    TrackItem::new(format!("{name}.mp3"), name).with_duration(180_000)
}

/// Messages with the given action, in order.
pub fn events_of_type(messages: &[Value], kind: &str) -> Vec<Value> {
    messages
        .iter()
        .filter(|m| m["action"] == kind)
        .cloned()
        .collect()
}

/// Records calls as short strings per key.
#[derive(Default)]
pub struct FakeGateway {
    calls: Mutex<Vec<(SessionKey, String)>>,
    channels: Mutex<Vec<(SessionKey, ChannelId)>>,
    ready: Mutex<HashSet<SessionKey>>,
}

impl FakeGateway {
    pub fn calls_for(&self, key: &SessionKey) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, call)| call.clone())
            .collect()
    }

    fn record(&self, key: &SessionKey, call: impl Into<String>) {
        self.calls.lock().push((key.clone(), call.into()));
    }
}

impl VoiceGateway for FakeGateway {
    fn open_connection(&self, key: &SessionKey, channel_id: &ChannelId) {
        self.record(key, format!("open {channel_id}"));
        let mut channels = self.channels.lock();
        channels.retain(|(k, _)| k != key);
        channels.push((key.clone(), channel_id.clone()));
    }

    fn close_connection(&self, key: &SessionKey) {
        self.record(key, "close");
        self.channels.lock().retain(|(k, _)| k != key);
        self.ready.lock().remove(key);
    }

    fn provide_voice_server_update(
        &self,
        key: &SessionKey,
        session_id: &str,
        payload: &Value,
    ) -> Result<(), VoiceError> {
        if payload.get("token").and_then(Value::as_str).is_none() {
            return Err(VoiceError::InvalidServerUpdate("token"));
        }
        self.record(key, format!("vsu {session_id}"));
        self.ready.lock().insert(key.clone());
        Ok(())
    }

    fn set_sending_handler(&self, key: &SessionKey, _handler: Arc<dyn AudioSendHandler>) {
        self.record(key, "handler");
    }

    fn status(&self, key: &SessionKey) -> VoiceStatus {
        let channel_id = self
            .channels
            .lock()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, c)| c.clone());
        let connected = channel_id.is_some() && self.ready.lock().contains(key);
        VoiceStatus {
            channel_id,
            connected,
            ..Default::default()
        }
    }

    fn release(&self, key: &SessionKey) {
        self.record(key, "release");
    }
}

/// Hands out handles that only move when a test moves them.
#[derive(Default)]
pub struct ManualDriver {
    refused: Mutex<HashSet<String>>,
    started: Mutex<Vec<(String, TrackHandle)>>,
}

impl ManualDriver {
    pub fn refuse(&self, title: &str) {
        self.refused.lock().insert(title.to_string());
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().iter().map(|(t, _)| t.clone()).collect()
    }

    pub fn last_handle(&self) -> Option<TrackHandle> {
        self.started.lock().last().map(|(_, h)| h.clone())
    }
}

impl PlaybackDriver for ManualDriver {
    fn start(&self, _key: &SessionKey, item: &TrackItem) -> Result<TrackHandle, DriverError> {
        if self.refused.lock().contains(&item.title) {
            return Err(DriverError::Rejected(format!("cannot play {}", item.title)));
        }
        let handle = TrackHandle::new();
        self.started.lock().push((item.title.clone(), handle.clone()));
        Ok(handle)
    }
}

/// `slow:<name>` resolves after 50ms, `fast:<name>` at once, `list:<a>,<b>`
/// to a playlist, `fail:<msg>` to an error, `hang:<name>` never; anything
/// else finds nothing.
pub struct ScriptedSource;

#[async_trait]
impl SourcePlugin for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn can_handle(&self, identifier: &str) -> bool {
        identifier.contains(':')
    }

    async fn load(&self, identifier: &str) -> LoadResult {
        let (kind, rest) = identifier.split_once(':').unwrap_or((identifier, ""));
        match kind {
            "slow" => {
                tokio::time::sleep(Duration::from_millis(50)).await;
                LoadResult::Track(track(rest))
            }
            "fast" => LoadResult::Track(track(rest)),
            "hang" => futures::future::pending().await,
            "list" => LoadResult::Playlist(crate::protocol::PlaylistData {
                name: "list".into(),
                selected_track: None,
                tracks: rest.split(',').map(track).collect(),
            }),
            "fail" => LoadResult::Error(crate::protocol::LoadError::new(
                rest,
                crate::common::Severity::Common,
                "scripted",
            )),
            _ => LoadResult::Empty,
        }
    }
}

pub struct Harness {
    pub gateway: Arc<FakeGateway>,
    pub driver: Arc<ManualDriver>,
    pub outbound: Outbound,
    pub ctx: Arc<SessionContext>,
    rx: flume::Receiver<String>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_player(PlayerConfig {
            stuck_threshold_ms: 0,
            update_interval_secs: 0,
            load_timeout_secs: 5,
        })
    }

    pub fn with_player(player: PlayerConfig) -> Self {
        let gateway = Arc::new(FakeGateway::default());
        let driver = Arc::new(ManualDriver::default());
        let outbound = Outbound::new(1_000);
        let rx = outbound.attach();
        let ctx = Arc::new(SessionContext {
            gateway: gateway.clone(),
            driver: driver.clone(),
            sources: Arc::new(SourceManager::with_sources(vec![Box::new(ScriptedSource)])),
            outbound: outbound.clone(),
            player,
        });
        Self {
            gateway,
            driver,
            outbound,
            ctx,
            rx,
        }
    }

    pub fn session(&self, guild: &str) -> Arc<GuildSession> {
        GuildSession::new(SessionKey::new("bot", guild), self.ctx.clone())
    }

    pub fn registry(&self, limit: Option<usize>) -> SessionRegistry {
        SessionRegistry::new(self.ctx.clone(), limit)
    }

    /// Everything sent so far, parsed.
    pub fn drain(&self) -> Vec<Value> {
        self.rx
            .drain()
            .map(|json| serde_json::from_str(&json).expect("outbound json"))
            .collect()
    }

    /// Lets spawned load workers and monitors run.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(300)).await;
    }
}
