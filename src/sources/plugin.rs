use async_trait::async_trait;

use crate::protocol::LoadResult;

/// Trait that all source plugins must implement.
///
/// Each source (HTTP, local files) resolves the identifiers it recognises
/// into tracks.
#[async_trait]
pub trait SourcePlugin: Send + Sync {
    /// Unique identifier for this source (e.g. "http", "local").
    fn name(&self) -> &str;

    /// Check if this source can handle the given identifier.
    fn can_handle(&self, identifier: &str) -> bool;

    /// Resolve the identifier into track(s). Never panics; failures are
    /// reported as [`LoadResult::Error`] or [`LoadResult::Empty`].
    async fn load(&self, identifier: &str) -> LoadResult;
}

pub type BoxedSource = Box<dyn SourcePlugin>;
