use crate::{
    player::queue::TrackQueue,
    protocol::{SchedulerPhase, TrackItem},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Playing(TrackItem),
    /// Between tracks: the next item has been chosen but the driver has
    /// not confirmed it yet.
    Transitioning(Option<TrackItem>),
}

/// What the owning session has to do after a scheduler call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Hand `item` to the playback driver, then confirm with
    /// [`PlaybackScheduler::started`] or report a failure.
    Start { item: TrackItem, generation: u64 },
    /// The item was appended to the queue at this 1-based position.
    Queued { position: usize },
    /// Nothing left to play.
    Idle,
    /// The report referred to a track that is no longer current.
    Ignored,
}

/// Drives a single player from a [`TrackQueue`].
///
/// Every started track gets a new generation number; completion reports
/// carry it back so late reports about replaced tracks are dropped.
#[derive(Debug)]
pub struct PlaybackScheduler {
    state: SchedulerState,
    generation: u64,
    last_failure: Option<String>,
}

impl Default for PlaybackScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackScheduler {
    pub fn new() -> Self {
        Self {
            state: SchedulerState::Idle,
            generation: 0,
            last_failure: None,
        }
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    pub fn phase(&self) -> SchedulerPhase {
        match self.state {
            SchedulerState::Idle => SchedulerPhase::Idle,
            SchedulerState::Playing(_) => SchedulerPhase::Playing,
            SchedulerState::Transitioning(_) => SchedulerPhase::Transitioning,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The active track, or the one about to start.
    pub fn current(&self) -> Option<&TrackItem> {
        match &self.state {
            SchedulerState::Playing(item) => Some(item),
            SchedulerState::Transitioning(item) => item.as_ref(),
            SchedulerState::Idle => None,
        }
    }

    pub fn last_failure(&self) -> Option<&str> {
        self.last_failure.as_deref()
    }

    /// Starts `item` right away when idle, otherwise queues it.
    pub fn submit(&mut self, queue: &mut TrackQueue, item: TrackItem) -> Transition {
        match self.state {
            SchedulerState::Idle => self.begin(item),
            SchedulerState::Playing(_) | SchedulerState::Transitioning(_) => Transition::Queued {
                position: queue.enqueue(item),
            },
        }
    }

    /// Confirms that the driver accepted the track of `generation`.
    pub fn started(&mut self, generation: u64) -> bool {
        if generation != self.generation {
            return false;
        }
        match std::mem::replace(&mut self.state, SchedulerState::Idle) {
            SchedulerState::Transitioning(Some(item)) => {
                self.state = SchedulerState::Playing(item);
                true
            }
            other => {
                self.state = other;
                false
            }
        }
    }

    pub fn on_track_finished(&mut self, queue: &mut TrackQueue, generation: u64) -> Transition {
        if !self.is_current(generation) {
            return Transition::Ignored;
        }
        self.advance(queue)
    }

    /// A failed track is skipped like a finished one; the reason is kept
    /// for the caller to report.
    pub fn on_track_failed(
        &mut self,
        queue: &mut TrackQueue,
        generation: u64,
        reason: impl Into<String>,
    ) -> Transition {
        if !self.is_current(generation) {
            return Transition::Ignored;
        }
        self.last_failure = Some(reason.into());
        self.advance(queue)
    }

    /// Ends the current track and moves to the next one.
    pub fn skip(&mut self, queue: &mut TrackQueue) -> Transition {
        if self.state == SchedulerState::Idle {
            return Transition::Ignored;
        }
        self.advance(queue)
    }

    /// Drops the current track and the whole queue. Returns the track that
    /// was active and how many queued items were cleared.
    pub fn stop(&mut self, queue: &mut TrackQueue) -> (Option<TrackItem>, usize) {
        let cleared = queue.clear();
        let current = match std::mem::replace(&mut self.state, SchedulerState::Idle) {
            SchedulerState::Playing(item) => Some(item),
            SchedulerState::Transitioning(item) => item,
            SchedulerState::Idle => None,
        };
        // outstanding reports for the stopped track must not match
        self.generation += 1;
        (current, cleared)
    }

    fn is_current(&self, generation: u64) -> bool {
        generation == self.generation && self.state != SchedulerState::Idle
    }

    fn begin(&mut self, item: TrackItem) -> Transition {
        self.generation += 1;
        self.state = SchedulerState::Transitioning(Some(item.clone()));
        Transition::Start {
            item,
            generation: self.generation,
        }
    }

    fn advance(&mut self, queue: &mut TrackQueue) -> Transition {
        self.state = SchedulerState::Transitioning(None);
        match queue.dequeue_next() {
            Some(next) => self.begin(next),
            None => {
                self.state = SchedulerState::Idle;
                Transition::Idle
            }
        }
    }
}
