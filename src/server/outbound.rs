use std::{collections::VecDeque, sync::Arc};

use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::protocol::OutgoingMessage;

/// Sender for everything the bridge writes to the control channel.
///
/// While the channel is down, messages are kept (oldest dropped past
/// `capacity`) and replayed in order when a new connection attaches.
/// Sending never fails.
#[derive(Clone)]
pub struct Outbound {
    inner: Arc<Inner>,
}

struct Inner {
    /// Held while sending so a concurrent attach cannot reorder messages.
    sender: Mutex<Option<flume::Sender<String>>>,
    backlog: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl Outbound {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                sender: Mutex::new(None),
                backlog: Mutex::new(VecDeque::new()),
                capacity: capacity.max(1),
            }),
        }
    }

    pub fn send(&self, msg: &OutgoingMessage) {
        match serde_json::to_string(msg) {
            Ok(json) => self.send_json(json),
            Err(e) => warn!("Failed to serialize outgoing message: {}", e),
        }
    }

    fn send_json(&self, json: String) {
        let mut sender = self.inner.sender.lock();
        let json = match sender.clone() {
            Some(tx) => match tx.send(json) {
                Ok(()) => return,
                Err(flume::SendError(json)) => {
                    *sender = None;
                    json
                }
            },
            None => json,
        };
        self.buffer(json);
    }

    /// Opens a fresh channel for a new connection, pre-filled with the
    /// backlog.
    pub fn attach(&self) -> flume::Receiver<String> {
        let mut sender = self.inner.sender.lock();
        let (tx, rx) = flume::unbounded();
        let backlog = std::mem::take(&mut *self.inner.backlog.lock());
        if !backlog.is_empty() {
            trace!("Replaying {} buffered messages", backlog.len());
        }
        for json in backlog {
            let _ = tx.send(json);
        }
        *sender = Some(tx);
        rx
    }

    /// Marks the channel as down and moves what the connection did not
    /// write back into the backlog: `unsent` first, then whatever is still
    /// waiting in `rx`. Later sends queue behind them.
    pub fn detach(&self, rx: &flume::Receiver<String>, unsent: Option<String>) {
        let mut sender = self.inner.sender.lock();
        *sender = None;
        let pending: Vec<String> = unsent.into_iter().chain(rx.drain()).collect();
        if !pending.is_empty() {
            trace!("Keeping {} unsent messages", pending.len());
        }
        for json in pending {
            self.buffer(json);
        }
    }

    pub fn backlog_len(&self) -> usize {
        self.inner.backlog.lock().len()
    }

    fn buffer(&self, json: String) {
        let mut backlog = self.inner.backlog.lock();
        if backlog.len() >= self.inner.capacity {
            backlog.pop_front();
        }
        backlog.push_back(json);
    }
}
