use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::SessionContext;
use crate::{
    common::{
        BridgeError, Severity,
        types::{ChannelId, SessionKey},
    },
    gateway::{AudioSendHandler, constants::SILENCE_FRAME},
    player::{
        TrackHandle, TrackQueue,
        monitor::{MONITOR_TICK_MS, MonitorCtx, TrackOutcome, monitor_loop},
        scheduler::{PlaybackScheduler, Transition},
    },
    protocol::{
        LoadError, LoadFailureReason, LoadResult, OutgoingMessage, PlayerSnapshot, SessionEvent,
        TrackEndReason, TrackException, TrackItem,
    },
};

/// State guarded by the session lock.
#[derive(Default)]
struct GuildPlayer {
    queue: TrackQueue,
    scheduler: PlaybackScheduler,
    handle: Option<TrackHandle>,
    /// Cancels the monitor of the active track.
    monitor: Option<CancellationToken>,
}

struct LoadJob {
    id: Uuid,
    source: String,
    nonce: Option<String>,
}

/// Frames for the voice connection, taken from whatever track is active.
#[derive(Default)]
struct SessionAudio {
    current: parking_lot::Mutex<Option<TrackHandle>>,
}

impl SessionAudio {
    fn set(&self, handle: Option<TrackHandle>) {
        *self.current.lock() = handle;
    }
}

impl AudioSendHandler for SessionAudio {
    fn can_provide(&self) -> bool {
        self.current
            .lock()
            .as_ref()
            .is_some_and(TrackHandle::is_active)
    }

    fn provide_frame(&self) -> Option<Bytes> {
        self.can_provide()
            .then(|| Bytes::from_static(&SILENCE_FRAME))
    }
}

/// One guild's player: its queue, scheduler and voice connection.
pub struct GuildSession {
    key: SessionKey,
    ctx: Arc<SessionContext>,
    me: Weak<GuildSession>,
    player: Mutex<GuildPlayer>,
    loads: flume::Sender<LoadJob>,
    audio: Arc<SessionAudio>,
    cancel: CancellationToken,
}

impl GuildSession {
    /// Creates the session, starts its load worker and registers its audio
    /// handler with the gateway. Needs a tokio runtime.
    pub fn new(key: SessionKey, ctx: Arc<SessionContext>) -> Arc<Self> {
        let (loads, load_rx) = flume::unbounded();
        let session = Arc::new_cyclic(|me| Self {
            key,
            ctx,
            me: me.clone(),
            player: Mutex::new(GuildPlayer::default()),
            loads,
            audio: Arc::new(SessionAudio::default()),
            cancel: CancellationToken::new(),
        });

        tokio::spawn(load_worker(
            Arc::downgrade(&session),
            load_rx,
            session.cancel.clone(),
        ));
        session
            .ctx
            .gateway
            .set_sending_handler(&session.key, session.audio.clone());
        debug!("[{}] Session created", session.key);
        session
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Joins `channel_id`, or moves there when already connected.
    pub fn open(&self, channel_id: &ChannelId) {
        self.ctx.gateway.open_connection(&self.key, channel_id);
    }

    /// Leaves voice. Queue and current track are kept.
    pub fn close(&self) {
        self.ctx.gateway.close_connection(&self.key);
    }

    /// Queues a source for resolution. Loads complete in request order,
    /// each with exactly one submit or `LOAD_FAILED`.
    pub fn load_ordered(&self, source: String, nonce: Option<String>) -> Result<Uuid, BridgeError> {
        let id = Uuid::new_v4();
        debug!("[{}] Load {} queued: {}", self.key, id, source);
        self.loads
            .send(LoadJob { id, source, nonce })
            .map_err(|flume::SendError(job)| BridgeError::LoadFailure {
                source_ref: job.source,
                message: "session is shut down".into(),
            })?;
        Ok(id)
    }

    async fn run_load(&self, job: LoadJob) {
        let LoadJob { id, source, nonce } = job;
        let load = self.ctx.sources.load(&source);

        let result = match self.ctx.player.load_timeout_secs {
            0 => load.await,
            secs => match tokio::time::timeout(Duration::from_secs(secs), load).await {
                Ok(result) => result,
                Err(_) => LoadResult::Error(LoadError::new(
                    format!("Loading timed out after {secs}s"),
                    Severity::Common,
                    "timeout",
                )),
            },
        };

        debug!("[{}] Load {} completed", self.key, id);
        self.apply_load(&source, nonce, result).await;
    }

    /// Applies a finished load: tracks are submitted, everything else is
    /// reported as `LOAD_FAILED`.
    pub async fn apply_load(&self, source: &str, nonce: Option<String>, result: LoadResult) {
        let (reason, message) = match result {
            LoadResult::Track(item) => {
                self.submit(item, nonce).await;
                return;
            }
            LoadResult::Playlist(playlist) => match playlist.first_playable().cloned() {
                Some(item) => {
                    info!(
                        "[{}] Playlist '{}' loaded, playing '{}'",
                        self.key, playlist.name, item.title
                    );
                    self.submit(item, nonce).await;
                    return;
                }
                None => (
                    LoadFailureReason::NoMatches,
                    format!("Playlist '{}' has no tracks", playlist.name),
                ),
            },
            LoadResult::Empty => (
                LoadFailureReason::NoMatches,
                format!("Nothing found by {source}"),
            ),
            LoadResult::Error(e) => {
                warn!("[{}] Could not play '{}': {}", self.key, source, e.message);
                (LoadFailureReason::LoadFailed, e.message)
            }
        };

        self.emit(SessionEvent::LoadFailed {
            source: source.to_string(),
            reason,
            message: Some(message),
            nonce,
        });
    }

    /// Plays `item` now when idle, otherwise appends it to the queue.
    pub async fn submit(&self, item: TrackItem, nonce: Option<String>) -> Transition {
        let mut guard = self.player.lock().await;
        let player = &mut *guard;
        let transition = player.scheduler.submit(&mut player.queue, item.clone());

        match &transition {
            Transition::Queued { position } => {
                info!("[{}] Queued '{}' at {}", self.key, item.title, position);
                self.emit(SessionEvent::TrackQueued {
                    track: item,
                    position: *position,
                    nonce,
                });
            }
            Transition::Start { .. } => self.drive(player, transition.clone()),
            Transition::Idle | Transition::Ignored => {}
        }
        transition
    }

    /// Called by the monitor of the track started as `generation`.
    ///
    /// Boxed: it starts the next track's monitor, which calls back here.
    pub fn on_track_ended(&self, generation: u64, outcome: TrackOutcome) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let mut guard = self.player.lock().await;
            let player = &mut *guard;

            let current = player.scheduler.current().cloned();
            let Some(track) = current.filter(|_| player.scheduler.generation() == generation)
            else {
                debug!(
                    "[{}] Ignoring {:?} for stale generation {}",
                    self.key, outcome, generation
                );
                return;
            };

            // the reporting monitor exits on its own
            player.monitor = None;
            player.handle = None;
            self.audio.set(None);

            let transition = match outcome {
                TrackOutcome::Finished => {
                    self.emit(SessionEvent::TrackEnd {
                        track,
                        reason: TrackEndReason::Finished,
                    });
                    player.scheduler.on_track_finished(&mut player.queue, generation)
                }
                TrackOutcome::Failed(message) => {
                    warn!("[{}] Track '{}' failed: {}", self.key, track.title, message);
                    self.emit(SessionEvent::TrackException {
                        track: track.clone(),
                        exception: TrackException {
                            message: message.clone(),
                            severity: Severity::Fault,
                        },
                    });
                    self.emit(SessionEvent::TrackEnd {
                        track,
                        reason: TrackEndReason::LoadFailed,
                    });
                    player
                        .scheduler
                        .on_track_failed(&mut player.queue, generation, message)
                }
                TrackOutcome::Stuck => {
                    self.emit(SessionEvent::TrackEnd {
                        track,
                        reason: TrackEndReason::LoadFailed,
                    });
                    player
                        .scheduler
                        .on_track_failed(&mut player.queue, generation, "track got stuck")
                }
            };
            self.drive(player, transition);
        })
    }

    /// Ends the current track and starts the next one. Returns false when
    /// nothing was playing.
    pub async fn skip(&self) -> bool {
        let mut guard = self.player.lock().await;
        let player = &mut *guard;
        let Some(track) = player.scheduler.current().cloned() else {
            return false;
        };

        self.halt(player);
        let transition = player.scheduler.skip(&mut player.queue);
        let reason = match transition {
            Transition::Start { .. } => TrackEndReason::Replaced,
            _ => TrackEndReason::Stopped,
        };
        info!("[{}] Skipped '{}'", self.key, track.title);
        self.emit(SessionEvent::TrackEnd { track, reason });
        self.drive(player, transition);
        true
    }

    /// Stops playback and clears the queue. Returns how many queued tracks
    /// were dropped.
    pub async fn stop(&self) -> usize {
        let mut guard = self.player.lock().await;
        self.stop_locked(&mut guard, TrackEndReason::Stopped)
    }

    pub async fn snapshot(&self) -> PlayerSnapshot {
        let player = self.player.lock().await;
        PlayerSnapshot {
            state: player.scheduler.phase(),
            current: player.scheduler.current().cloned(),
            position: player.handle.as_ref().map(TrackHandle::get_position),
            queue: player.queue.iter().cloned().collect(),
            voice: self.ctx.gateway.status(&self.key),
            last_failure: player.scheduler.last_failure().map(str::to_string),
        }
    }

    /// Stops everything, leaves voice and forgets the connection. Load
    /// requests still queued are dropped.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        {
            let mut guard = self.player.lock().await;
            let cleared = self.stop_locked(&mut guard, TrackEndReason::Cleanup);
            if cleared > 0 {
                debug!("[{}] Dropped {} queued tracks", self.key, cleared);
            }
        }
        self.ctx.gateway.close_connection(&self.key);
        self.ctx.gateway.release(&self.key);
        info!("[{}] Session shut down", self.key);
    }

    /// Keeps the player locked until `release` fires.
    #[cfg(test)]
    pub(crate) async fn hold_lock_until(&self, release: tokio::sync::oneshot::Receiver<()>) {
        let _player = self.player.lock().await;
        let _ = release.await;
    }

    fn stop_locked(&self, player: &mut GuildPlayer, reason: TrackEndReason) -> usize {
        self.halt(player);
        let (current, cleared) = player.scheduler.stop(&mut player.queue);
        if let Some(track) = current {
            info!("[{}] Stopped '{}'", self.key, track.title);
            self.emit(SessionEvent::TrackEnd { track, reason });
        }
        cleared
    }

    /// Stops the active handle and its monitor.
    fn halt(&self, player: &mut GuildPlayer) {
        if let Some(monitor) = player.monitor.take() {
            monitor.cancel();
        }
        if let Some(handle) = player.handle.take() {
            handle.stop();
        }
        self.audio.set(None);
    }

    /// Starts what the scheduler asked for. A track the driver refuses
    /// counts as failed and the queue moves on.
    fn drive(&self, player: &mut GuildPlayer, mut transition: Transition) {
        loop {
            let Transition::Start { item, generation } = transition else {
                return;
            };

            match self.ctx.driver.start(&self.key, &item) {
                Ok(handle) => {
                    player.scheduler.started(generation);
                    if !self.ctx.gateway.status(&self.key).connected {
                        warn!(
                            "[{}] Starting '{}' without a voice connection",
                            self.key, item.title
                        );
                    }
                    self.spawn_monitor(player, handle, generation, item.clone());
                    info!("[{}] Now playing '{}'", self.key, item.title);
                    self.emit(SessionEvent::TrackStart { track: item });
                    return;
                }
                Err(e) => {
                    warn!("[{}] Driver refused '{}': {}", self.key, item.title, e);
                    self.emit(SessionEvent::TrackException {
                        track: item.clone(),
                        exception: TrackException {
                            message: e.to_string(),
                            severity: Severity::Common,
                        },
                    });
                    self.emit(SessionEvent::TrackEnd {
                        track: item,
                        reason: TrackEndReason::LoadFailed,
                    });
                    transition =
                        player
                            .scheduler
                            .on_track_failed(&mut player.queue, generation, e.to_string());
                }
            }
        }
    }

    fn spawn_monitor(
        &self,
        player: &mut GuildPlayer,
        handle: TrackHandle,
        generation: u64,
        track: TrackItem,
    ) {
        let cancel = self.cancel.child_token();
        if let Some(previous) = player.monitor.replace(cancel.clone()) {
            previous.cancel();
        }
        player.handle = Some(handle.clone());
        self.audio.set(Some(handle.clone()));

        let ticks_per_sec = 1_000 / MONITOR_TICK_MS;
        tokio::spawn(monitor_loop(MonitorCtx {
            key: self.key.clone(),
            handle,
            generation,
            track,
            session: self.me.clone(),
            outbound: self.ctx.outbound.clone(),
            gateway: self.ctx.gateway.clone(),
            stuck_threshold_ms: self.ctx.player.stuck_threshold_ms,
            update_every_n: self.ctx.player.update_interval_secs * ticks_per_sec,
            cancel,
        }));
    }

    fn emit(&self, event: SessionEvent) {
        self.ctx
            .outbound
            .send(&OutgoingMessage::event(&self.key, event));
    }
}

async fn load_worker(
    session: Weak<GuildSession>,
    jobs: flume::Receiver<LoadJob>,
    cancel: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            _ = cancel.cancelled() => break,
            job = jobs.recv_async() => match job {
                Ok(job) => job,
                Err(_) => break,
            },
        };
        let Some(session) = session.upgrade() else {
            break;
        };
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = session.run_load(job) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        configs::PlayerConfig,
        protocol::{PlaylistData, SchedulerPhase},
        testing::{Harness, events_of_type, track},
    };

    #[tokio::test]
    async fn first_track_starts_and_second_is_queued() {
        let h = Harness::new();
        let session = h.session("1");

        assert!(matches!(
            session.submit(track("A"), None).await,
            Transition::Start { generation: 1, .. }
        ));
        assert_eq!(
            session.submit(track("B"), Some("n-1".into())).await,
            Transition::Queued { position: 1 }
        );

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.state, SchedulerPhase::Playing);
        assert_eq!(snapshot.current.map(|t| t.title), Some("A".to_string()));
        assert_eq!(snapshot.queue.len(), 1);

        let messages = h.drain();
        assert_eq!(events_of_type(&messages, "TRACK_START").len(), 1);
        let queued = events_of_type(&messages, "TRACK_QUEUED");
        assert_eq!(queued[0]["position"], 1);
        assert_eq!(queued[0]["nonce"], "n-1");
    }

    #[tokio::test]
    async fn finished_track_advances_to_next() {
        let h = Harness::new();
        let session = h.session("1");
        session.submit(track("A"), None).await;
        session.submit(track("B"), None).await;

        session.on_track_ended(1, TrackOutcome::Finished).await;

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.current.map(|t| t.title), Some("B".to_string()));
        assert!(snapshot.queue.is_empty());
        assert_eq!(h.driver.started(), ["A", "B"]);

        let messages = h.drain();
        let ends = events_of_type(&messages, "TRACK_END");
        assert_eq!(ends.len(), 1);
        assert_eq!(ends[0]["reason"], "finished");
    }

    #[tokio::test]
    async fn stale_completion_is_ignored() {
        let h = Harness::new();
        let session = h.session("1");
        session.submit(track("A"), None).await;
        session.submit(track("B"), None).await;
        session.submit(track("C"), None).await;
        assert!(session.skip().await);

        session.on_track_ended(1, TrackOutcome::Finished).await;

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.current.map(|t| t.title), Some("B".to_string()));
        assert_eq!(snapshot.queue.len(), 1);
    }

    #[tokio::test]
    async fn refused_track_is_skipped() {
        let h = Harness::new();
        h.driver.refuse("bad");
        let session = h.session("1");
        session.submit(track("good-1"), None).await;
        session.submit(track("bad"), None).await;
        session.submit(track("good-2"), None).await;

        session.on_track_ended(1, TrackOutcome::Finished).await;

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.current.map(|t| t.title), Some("good-2".to_string()));
        let messages = h.drain();
        assert_eq!(events_of_type(&messages, "TRACK_EXCEPTION").len(), 1);
    }

    #[tokio::test]
    async fn failure_on_last_track_goes_idle() {
        let h = Harness::new();
        let session = h.session("1");
        session.submit(track("A"), None).await;

        session
            .on_track_ended(1, TrackOutcome::Failed("decoder error".into()))
            .await;

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.state, SchedulerPhase::Idle);
        assert_eq!(snapshot.last_failure.as_deref(), Some("decoder error"));
        let messages = h.drain();
        let ends = events_of_type(&messages, "TRACK_END");
        assert_eq!(ends[0]["reason"], "loadFailed");
        let exceptions = events_of_type(&messages, "TRACK_EXCEPTION");
        assert_eq!(exceptions[0]["severity"], "fault");
    }

    #[tokio::test]
    async fn empty_and_error_loads_report_once_and_keep_queue() {
        let h = Harness::new();
        let session = h.session("1");
        session.submit(track("A"), None).await;
        session.submit(track("B"), None).await;

        session.apply_load("nothing", None, LoadResult::Empty).await;
        session
            .apply_load(
                "broken",
                Some("n".into()),
                LoadResult::Error(LoadError::new("boom", Severity::Common, "test")),
            )
            .await;

        assert_eq!(session.snapshot().await.queue.len(), 1);
        let messages = h.drain();
        let failures = events_of_type(&messages, "LOAD_FAILED");
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0]["reason"], "noMatches");
        assert_eq!(failures[1]["reason"], "loadFailed");
        assert_eq!(failures[1]["nonce"], "n");
    }

    #[tokio::test]
    async fn playlist_submits_selected_track() {
        let h = Harness::new();
        let session = h.session("1");
        let playlist = PlaylistData {
            name: "Mix".into(),
            selected_track: Some(1),
            tracks: vec![track("A"), track("B")],
        };

        session
            .apply_load("mix.m3u", None, LoadResult::Playlist(playlist))
            .await;

        assert_eq!(h.driver.started(), ["B"]);
    }

    #[tokio::test]
    async fn stop_clears_queue_and_reports() {
        let h = Harness::new();
        let session = h.session("1");
        session.submit(track("A"), None).await;
        session.submit(track("B"), None).await;
        session.submit(track("C"), None).await;

        assert_eq!(session.stop().await, 2);
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.state, SchedulerPhase::Idle);
        assert!(snapshot.queue.is_empty());
        assert!(h.driver.last_handle().is_some_and(|h| !h.is_active()));

        let messages = h.drain();
        let ends = events_of_type(&messages, "TRACK_END");
        assert_eq!(ends[0]["reason"], "stopped");
    }

    #[tokio::test(start_paused = true)]
    async fn loads_complete_in_request_order() {
        let h = Harness::new();
        let session = h.session("1");
        // the first source resolves slowest
        session.load_ordered("slow:A".into(), None).expect("queued");
        session.load_ordered("fast:B".into(), None).expect("queued");
        session.load_ordered("missing".into(), None).expect("queued");

        h.settle().await;

        assert_eq!(h.driver.started(), ["A"]);
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.queue.iter().map(|t| t.title.as_str()).collect::<Vec<_>>(), ["B"]);
        assert_eq!(events_of_type(&h.drain(), "LOAD_FAILED").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn load_that_never_resolves_times_out() {
        let h = Harness::new();
        let session = h.session("1");
        session.load_ordered("hang:A".into(), Some("n-a".into())).expect("queued");
        session.load_ordered("fast:B".into(), None).expect("queued");

        h.settle().await;
        assert!(h.driver.started().is_empty());

        tokio::time::sleep(Duration::from_secs(6)).await;

        let failures = events_of_type(&h.drain(), "LOAD_FAILED");
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0]["source"], "hang:A");
        assert_eq!(failures[0]["reason"], "loadFailed");
        assert_eq!(failures[0]["nonce"], "n-a");
        assert!(
            failures[0]["message"]
                .as_str()
                .is_some_and(|m| m.contains("timed out"))
        );
        assert_eq!(h.driver.started(), ["B"]);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_track_ends_and_next_starts() {
        let h = Harness::with_player(PlayerConfig {
            stuck_threshold_ms: 1_000,
            update_interval_secs: 0,
            load_timeout_secs: 5,
        });
        let session = h.session("1");
        session.submit(track("A"), None).await;
        session.submit(track("B"), None).await;
        let first = h.driver.last_handle().expect("handle for A");

        // a handle that never moves gets 30s before it counts as stuck
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(events_of_type(&h.drain(), "TRACK_STUCK").is_empty());

        tokio::time::sleep(Duration::from_secs(11)).await;

        let messages = h.drain();
        let stuck = events_of_type(&messages, "TRACK_STUCK");
        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck[0]["track"]["title"], "A");
        assert_eq!(stuck[0]["threshold_ms"], 1_000);
        let ends = events_of_type(&messages, "TRACK_END");
        assert_eq!(ends.len(), 1);
        assert_eq!(ends[0]["reason"], "loadFailed");
        assert_eq!(events_of_type(&messages, "TRACK_START")[0]["track"]["title"], "B");

        assert!(!first.is_active());
        assert_eq!(h.driver.started(), ["A", "B"]);
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.current.map(|t| t.title), Some("B".to_string()));
        assert!(snapshot.queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_rejects_further_loads() {
        let h = Harness::new();
        let session = h.session("1");
        session.submit(track("A"), None).await;

        session.shutdown().await;

        assert!(session.is_shut_down());
        assert_eq!(session.snapshot().await.state, SchedulerPhase::Idle);
        h.settle().await;
        assert!(matches!(
            session.load_ordered("fast:B".into(), None),
            Err(BridgeError::LoadFailure { .. })
        ));
        let ends = events_of_type(&h.drain(), "TRACK_END");
        assert_eq!(ends[0]["reason"], "cleanup");
    }

    #[tokio::test]
    async fn audio_handler_follows_active_track() {
        let h = Harness::new();
        let session = h.session("1");
        assert!(!session.audio.can_provide());

        session.submit(track("A"), None).await;
        assert!(session.audio.can_provide());
        assert!(session.audio.provide_frame().is_some());

        session.stop().await;
        assert!(session.audio.provide_frame().is_none());
    }
}
