use std::time::Duration;

use tracing::{debug, trace};

use super::handle::TrackHandle;
use crate::{
    common::{DriverError, types::SessionKey},
    gateway::constants::FRAME_DURATION_MS,
    protocol::TrackItem,
};

/// Starts playback of resolved tracks. Completion is observed through the
/// returned [`TrackHandle`].
pub trait PlaybackDriver: Send + Sync {
    fn start(&self, key: &SessionKey, item: &TrackItem) -> Result<TrackHandle, DriverError>;
}

/// Driver that advances a track in real time, one frame per
/// [`FRAME_DURATION_MS`], without decoding anything. Tracks with a known
/// duration finish on their own; streams run until stopped.
///
/// Must be called from within a tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct PacedDriver;

impl PacedDriver {
    pub fn new() -> Self {
        Self
    }
}

impl PlaybackDriver for PacedDriver {
    fn start(&self, key: &SessionKey, item: &TrackItem) -> Result<TrackHandle, DriverError> {
        if item.source_ref.trim().is_empty() {
            return Err(DriverError::Rejected("empty source reference".into()));
        }

        let handle = TrackHandle::new();
        let task_handle = handle.clone();
        let duration = item.duration_ms;
        let task_key = key.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(FRAME_DURATION_MS));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // first tick completes immediately
            interval.tick().await;

            while task_handle.is_active() {
                interval.tick().await;
                if !task_handle.is_active() {
                    break;
                }
                let position = task_handle.advance(FRAME_DURATION_MS);
                if duration.is_some_and(|d| position >= d) {
                    task_handle.finish();
                }
            }
            trace!(
                "[{}] paced playback ended at {}ms ({:?})",
                task_key,
                task_handle.get_position(),
                task_handle.get_state()
            );
        });

        if item.is_stream() {
            debug!("[{}] Driver started stream '{}'", key, item.title);
        } else {
            debug!("[{}] Driver started '{}'", key, item.title);
        }
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::handle::PlaybackState;

    fn key() -> SessionKey {
        SessionKey::new("bot", "1")
    }

    #[tokio::test(start_paused = true)]
    async fn finishes_after_duration() {
        let item = TrackItem::new("a.mp3", "A").with_duration(100);
        let handle = PacedDriver::new().start(&key(), &item).expect("started");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.is_active());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(handle.get_state(), PlaybackState::Finished);
        assert!(handle.get_position() >= 100);
    }

    #[tokio::test(start_paused = true)]
    async fn streams_run_until_stopped() {
        let item = TrackItem::new("http://radio/live", "Radio");
        let handle = PacedDriver::new().start(&key(), &item).expect("started");

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(handle.is_active());

        handle.stop();
        let at_stop = handle.get_position();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(handle.get_state(), PlaybackState::Stopped);
        assert_eq!(handle.get_position(), at_stop);
    }

    #[tokio::test]
    async fn rejects_empty_source() {
        let item = TrackItem::new("  ", "nothing");
        assert!(matches!(
            PacedDriver::new().start(&key(), &item),
            Err(DriverError::Rejected(_))
        ));
    }
}
