use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::handle::{PlaybackState, TrackHandle};
use crate::{
    common::types::{SessionKey, now_ms},
    gateway::VoiceGateway,
    protocol::{OutgoingMessage, PlayerState, SessionEvent, TrackItem},
    server::{outbound::Outbound, session::GuildSession},
};

pub const MONITOR_TICK_MS: u64 = 500;

/// How a track ended, as seen by its monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    Finished,
    Failed(String),
    Stuck,
}

pub struct MonitorCtx {
    pub key: SessionKey,
    pub handle: TrackHandle,
    pub generation: u64,
    pub track: TrackItem,
    pub session: Weak<GuildSession>,
    pub outbound: Outbound,
    pub gateway: Arc<dyn VoiceGateway>,
    pub stuck_threshold_ms: u64,
    /// Ticks between position updates, 0 for none.
    pub update_every_n: u64,
    pub cancel: CancellationToken,
}

/// Watches one track until it ends or the session cancels it.
pub async fn monitor_loop(ctx: MonitorCtx) {
    let MonitorCtx {
        key,
        handle,
        generation,
        track,
        session,
        outbound,
        gateway,
        stuck_threshold_ms,
        update_every_n,
        cancel,
    } = ctx;

    let mut interval = tokio::time::interval(Duration::from_millis(MONITOR_TICK_MS));
    let mut tick: u64 = 0;
    let mut last_pos = handle.get_position();
    let mut stuck_ms: u64 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }
        tick = tick.wrapping_add(1);

        let outcome = match handle.get_state() {
            PlaybackState::Playing => None,
            PlaybackState::Finished => Some(TrackOutcome::Finished),
            PlaybackState::Failed => Some(TrackOutcome::Failed(
                handle
                    .take_error()
                    .unwrap_or_else(|| "playback failed".to_string()),
            )),
            // stopped by the session itself
            PlaybackState::Stopped => break,
        };
        if let Some(outcome) = outcome {
            report(&session, generation, outcome).await;
            break;
        }

        // -- Stuck detection ------------------------------------------------
        let cur_pos = handle.get_position();
        if stuck_threshold_ms > 0 && cur_pos == last_pos {
            stuck_ms += MONITOR_TICK_MS;
            // give the first frame longer to arrive
            let threshold = if cur_pos == 0 {
                stuck_threshold_ms.max(30_000)
            } else {
                stuck_threshold_ms
            };
            if stuck_ms >= threshold {
                warn!("[{}] Track '{}' got stuck at {}ms", key, track.title, cur_pos);
                outbound.send(&OutgoingMessage::event(
                    &key,
                    SessionEvent::TrackStuck {
                        track: track.clone(),
                        threshold_ms: stuck_threshold_ms,
                    },
                ));
                handle.stop();
                report(&session, generation, TrackOutcome::Stuck).await;
                break;
            }
        } else {
            stuck_ms = 0;
        }
        last_pos = cur_pos;

        // -- PlayerUpdate ---------------------------------------------------
        if update_every_n > 0 && tick % update_every_n == 0 {
            outbound.send(&OutgoingMessage::event(
                &key,
                SessionEvent::PlayerUpdate {
                    state: PlayerState {
                        time: now_ms(),
                        position: cur_pos,
                        connected: gateway.status(&key).connected,
                    },
                },
            ));
        }
    }
    debug!("[{}] Monitor for generation {} exited", key, generation);
}

async fn report(session: &Weak<GuildSession>, generation: u64, outcome: TrackOutcome) {
    match session.upgrade() {
        Some(session) => session.on_track_ended(generation, outcome).await,
        None => debug!("Session gone before track outcome {:?}", outcome),
    }
}
