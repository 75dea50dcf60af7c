use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::{
    common::{BridgeError, types::SessionKey},
    protocol::{
        Command, Envelope, LoadFailureReason, OutgoingMessage, PlayerSnapshot, SessionEvent,
    },
    server::SessionRegistry,
};

/// What a command did, for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Opened,
    VoiceUpdated,
    Closed,
    LoadQueued { request_id: Uuid },
    /// `ended` is false when nothing was playing.
    Skipped { ended: bool },
    Stopped { cleared: usize },
    Reported,
    /// `existed` is false when the guild had no session.
    Destroyed { existed: bool },
}

/// Turns control-channel text frames into session operations.
///
/// Frames given to [`submit`](Self::submit) run in arrival order per
/// session; sessions do not wait on each other.
#[derive(Clone)]
pub struct CommandRouter {
    registry: Arc<SessionRegistry>,
    lanes: Arc<DashMap<SessionKey, flume::Sender<Envelope>>>,
}

impl CommandRouter {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            lanes: Arc::new(DashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Validates one frame and hands it to its session's lane. Never waits;
    /// failures are logged.
    pub fn submit(&self, raw: &str) {
        let envelope = match Envelope::parse(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Dropping command: {} (raw: {})", e, truncate(raw, 256));
                return;
            }
        };
        debug!("[{}] {} received", envelope.key, envelope.command.name());

        let key = envelope.key.clone();
        let mut lane = self
            .lanes
            .entry(key.clone())
            .or_insert_with(|| self.spawn_lane(&key));
        if lane.is_disconnected() {
            *lane = self.spawn_lane(&key);
        }
        if let Err(flume::SendError(envelope)) = lane.send(envelope) {
            warn!("[{}] Lane closed, dropping {}", key, envelope.command.name());
        }
    }

    fn spawn_lane(&self, key: &SessionKey) -> flume::Sender<Envelope> {
        let (tx, rx) = flume::unbounded();
        tokio::spawn(self.clone().run_lane(key.clone(), rx));
        tx
    }

    async fn run_lane(self, key: SessionKey, rx: flume::Receiver<Envelope>) {
        while let Ok(envelope) = rx.recv_async().await {
            let name = envelope.command.name();
            match self.dispatch(envelope).await {
                Ok(outcome) => trace!("[{}] {} handled: {:?}", key, name, outcome),
                Err(e) => warn!("[{}] {} failed: {}", key, name, e),
            }
            // an idle lane retires; the next frame opens a new one
            self.lanes.remove_if(&key, |_, tx| tx.is_empty());
        }
    }

    pub async fn handle(&self, raw: &str) -> Result<Outcome, BridgeError> {
        let envelope = Envelope::parse(raw)?;
        debug!("[{}] {} received", envelope.key, envelope.command.name());
        self.dispatch(envelope).await
    }

    pub async fn dispatch(&self, envelope: Envelope) -> Result<Outcome, BridgeError> {
        let Envelope {
            key,
            nonce,
            command,
        } = envelope;
        let ctx = self.registry.context();

        match command {
            Command::OpenConnection { channel_id } => {
                self.registry.try_get_or_create(&key)?.open(&channel_id);
                Ok(Outcome::Opened)
            }
            Command::VoiceServerUpdate {
                session_id,
                payload,
            } => {
                ctx.gateway
                    .provide_voice_server_update(&key, &session_id, &payload)?;
                Ok(Outcome::VoiceUpdated)
            }
            Command::CloseConnection => {
                self.registry.try_get_or_create(&key)?.close();
                Ok(Outcome::Closed)
            }
            Command::PlayTrack { source } => {
                let session = self.registry.try_get_or_create(&key)?;
                match session.load_ordered(source.clone(), nonce.clone()) {
                    Ok(request_id) => Ok(Outcome::LoadQueued { request_id }),
                    Err(e) => {
                        // raced with DESTROY
                        ctx.outbound.send(&OutgoingMessage::event(
                            &key,
                            SessionEvent::LoadFailed {
                                source,
                                reason: LoadFailureReason::LoadFailed,
                                message: Some(e.to_string()),
                                nonce,
                            },
                        ));
                        Err(e)
                    }
                }
            }
            Command::SkipTrack => {
                let ended = match self.registry.get(&key) {
                    Some(session) => session.skip().await,
                    None => false,
                };
                Ok(Outcome::Skipped { ended })
            }
            Command::Stop => {
                let cleared = match self.registry.get(&key) {
                    Some(session) => session.stop().await,
                    None => 0,
                };
                Ok(Outcome::Stopped { cleared })
            }
            Command::GetPlayer => {
                let snapshot = match self.registry.get(&key) {
                    Some(session) => session.snapshot().await,
                    None => PlayerSnapshot::idle(ctx.gateway.status(&key)),
                };
                ctx.outbound.send(&OutgoingMessage::event(
                    &key,
                    SessionEvent::PlayerReport { nonce, snapshot },
                ));
                Ok(Outcome::Reported)
            }
            Command::Destroy => {
                let existed = self.registry.remove(&key).await;
                if !existed {
                    ctx.gateway.close_connection(&key);
                    ctx.gateway.release(&key);
                }
                Ok(Outcome::Destroyed { existed })
            }
        }
    }
}

fn truncate(raw: &str, max: usize) -> &str {
    match raw.char_indices().nth(max) {
        Some((idx, _)) => &raw[..idx],
        None => raw,
    }
}
