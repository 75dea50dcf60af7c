use std::sync::{
  Arc,
  atomic::{AtomicUsize, Ordering},
};

use dashmap::{DashMap, mapref::entry::Entry};
use tracing::{debug, info};

use super::{SessionContext, session::GuildSession};
use crate::common::{BridgeError, types::SessionKey};

/// Every live guild session, keyed by bot identifier and guild.
pub struct SessionRegistry {
  sessions: DashMap<SessionKey, Arc<GuildSession>>,
  /// Live sessions plus creations in flight.
  count: AtomicUsize,
  limit: Option<usize>,
  ctx: Arc<SessionContext>,
}

impl SessionRegistry {
  pub fn new(ctx: Arc<SessionContext>, limit: Option<usize>) -> Self {
    Self {
      sessions: DashMap::new(),
      count: AtomicUsize::new(0),
      limit,
      ctx,
    }
  }

  pub fn context(&self) -> &Arc<SessionContext> {
    &self.ctx
  }

  /// Returns the session for `key`, creating it on first use. Concurrent
  /// callers with the same key always get the same instance.
  pub fn get_or_create(&self, key: &SessionKey) -> Arc<GuildSession> {
    match self.sessions.entry(key.clone()) {
      Entry::Occupied(entry) => entry.get().clone(),
      Entry::Vacant(entry) => {
        self.count.fetch_add(1, Ordering::AcqRel);
        info!("[{}] Creating session", key);
        entry
          .insert(GuildSession::new(key.clone(), self.ctx.clone()))
          .clone()
      }
    }
  }

  /// Like [`Self::get_or_create`], but refuses to create a session past
  /// the configured limit. Existing sessions are always returned.
  pub fn try_get_or_create(&self, key: &SessionKey) -> Result<Arc<GuildSession>, BridgeError> {
    let Some(limit) = self.limit else {
      return Ok(self.get_or_create(key));
    };
    if let Some(existing) = self.get(key) {
      return Ok(existing);
    }

    self
      .count
      .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
        (n < limit).then_some(n + 1)
      })
      .map_err(|_| BridgeError::SessionLimit(limit))?;

    match self.sessions.entry(key.clone()) {
      Entry::Occupied(entry) => {
        // created concurrently; give the reservation back
        self.count.fetch_sub(1, Ordering::AcqRel);
        Ok(entry.get().clone())
      }
      Entry::Vacant(entry) => {
        info!("[{}] Creating session", key);
        Ok(
          entry
            .insert(GuildSession::new(key.clone(), self.ctx.clone()))
            .clone(),
        )
      }
    }
  }

  pub fn get(&self, key: &SessionKey) -> Option<Arc<GuildSession>> {
    self.sessions.get(key).map(|s| s.value().clone())
  }

  /// Removes and shuts down one session. Returns false if there was none.
  pub async fn remove(&self, key: &SessionKey) -> bool {
    let Some((_, session)) = self.sessions.remove(key) else {
      return false;
    };
    self.count.fetch_sub(1, Ordering::AcqRel);
    session.shutdown().await;
    true
  }

  pub fn len(&self) -> usize {
    self.sessions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.sessions.is_empty()
  }

  pub fn keys(&self) -> Vec<SessionKey> {
    self.sessions.iter().map(|e| e.key().clone()).collect()
  }

  /// Shuts down and forgets every session. The registry stays usable.
  pub async fn shutdown(&self) {
    let keys = self.keys();
    if keys.is_empty() {
      debug!("No sessions to shut down");
      return;
    }
    info!("Shutting down {} sessions", keys.len());
    for key in keys {
      self.remove(&key).await;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::{Harness, track};

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn concurrent_callers_share_one_session() {
    let h = Harness::new();
    let registry = Arc::new(h.registry(None));
    let key = SessionKey::new("bot", "1");

    let tasks: Vec<_> = (0..32)
      .map(|_| {
        let registry = registry.clone();
        let key = key.clone();
        tokio::spawn(async move { registry.get_or_create(&key) })
      })
      .collect();

    let sessions: Vec<_> = futures::future::join_all(tasks)
      .await
      .into_iter()
      .map(|r| r.expect("task"))
      .collect();

    assert!(sessions.iter().all(|s| Arc::ptr_eq(s, &sessions[0])));
    assert_eq!(registry.len(), 1);
  }

  #[tokio::test]
  async fn distinct_keys_get_distinct_sessions() {
    let h = Harness::new();
    let registry = h.registry(None);

    let a = registry.get_or_create(&SessionKey::new("bot", "1"));
    let b = registry.get_or_create(&SessionKey::new("bot", "2"));
    let c = registry.get_or_create(&SessionKey::new("other-bot", "1"));

    assert!(!Arc::ptr_eq(&a, &b));
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(registry.len(), 3);
  }

  #[tokio::test]
  async fn limit_rejects_new_keys_but_serves_existing() {
    let h = Harness::new();
    let registry = h.registry(Some(1));
    let first = SessionKey::new("bot", "1");

    let session = registry.try_get_or_create(&first).expect("first session");
    assert!(Arc::ptr_eq(
      &session,
      &registry.try_get_or_create(&first).expect("existing session")
    ));
    assert!(matches!(
      registry.try_get_or_create(&SessionKey::new("bot", "2")),
      Err(BridgeError::SessionLimit(1))
    ));

    assert!(registry.remove(&first).await);
    assert!(registry.try_get_or_create(&SessionKey::new("bot", "2")).is_ok());
  }

  #[tokio::test]
  async fn shutdown_stops_sessions_and_stays_usable() {
    let h = Harness::new();
    let registry = h.registry(None);
    let key = SessionKey::new("bot", "1");
    let session = registry.get_or_create(&key);
    session.submit(track("A"), None).await;

    registry.shutdown().await;

    assert!(registry.is_empty());
    assert!(session.is_shut_down());
    assert_eq!(h.gateway.calls_for(&key).last().map(String::as_str), Some("release"));

    let fresh = registry.get_or_create(&key);
    assert!(!Arc::ptr_eq(&fresh, &session));
    assert!(!fresh.is_shut_down());
  }
}
