use std::sync::{
    Arc,
    atomic::{AtomicU8, AtomicU64, Ordering},
};

use parking_lot::Mutex;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PlaybackState {
    Playing = 0,
    Finished = 1,
    Failed = 2,
    Stopped = 3,
}

impl PlaybackState {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Playing,
            1 => Self::Finished,
            2 => Self::Failed,
            _ => Self::Stopped,
        }
    }
}

/// Shared view of one running track. The driver advances it, the monitor
/// and the audio handler read it.
#[derive(Clone, Debug)]
pub struct TrackHandle {
    state: Arc<AtomicU8>,
    position: Arc<AtomicU64>, // ms
    error: Arc<Mutex<Option<String>>>,
}

impl Default for TrackHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackHandle {
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(PlaybackState::Playing as u8)),
            position: Arc::new(AtomicU64::new(0)),
            error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn get_state(&self) -> PlaybackState {
        PlaybackState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_active(&self) -> bool {
        self.get_state() == PlaybackState::Playing
    }

    pub fn get_position(&self) -> u64 {
        self.position.load(Ordering::Acquire)
    }

    pub fn advance(&self, ms: u64) -> u64 {
        self.position.fetch_add(ms, Ordering::AcqRel) + ms
    }

    pub fn finish(&self) {
        self.settle(PlaybackState::Finished);
    }

    /// The reason is in place before anyone can observe `Failed`.
    pub fn fail(&self, reason: impl Into<String>) {
        let mut error = self.error.lock();
        if self.settle(PlaybackState::Failed) {
            *error = Some(reason.into());
        }
    }

    pub fn stop(&self) {
        self.settle(PlaybackState::Stopped);
    }

    pub fn take_error(&self) -> Option<String> {
        self.error.lock().take()
    }

    /// Only the first terminal state sticks.
    fn settle(&self, next: PlaybackState) -> bool {
        self.state
            .compare_exchange(
                PlaybackState::Playing as u8,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}
