use serde::{Deserialize, Serialize};

use crate::common::Severity;

/// A resolved, playable track. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackItem {
    /// URL or identifier the track was resolved from.
    pub source_ref: String,
    pub title: String,
    #[serde(default)]
    pub author: String,
    /// `None` for live streams and sources that do not report a length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub source_name: String,
}

impl TrackItem {
    pub fn new(source_ref: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            source_ref: source_ref.into(),
            title: title.into(),
            author: String::new(),
            duration_ms: None,
            source_name: String::new(),
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_source(mut self, source_name: impl Into<String>) -> Self {
        self.source_name = source_name.into();
        self
    }

    pub fn is_stream(&self) -> bool {
        self.duration_ms.is_none()
    }
}

/// Result of a track load operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "load_type", content = "data", rename_all = "snake_case")]
pub enum LoadResult {
    /// A single track was loaded.
    Track(TrackItem),
    /// A playlist was loaded.
    Playlist(PlaylistData),
    /// No matches found.
    Empty,
    /// An error occurred during loading.
    Error(LoadError),
}

/// Playlist data returned from a load operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistData {
    pub name: String,
    /// Index of the track the source pointed at, if any.
    pub selected_track: Option<usize>,
    pub tracks: Vec<TrackItem>,
}

impl PlaylistData {
    /// The selected track, falling back to the first one.
    pub fn first_playable(&self) -> Option<&TrackItem> {
        self.selected_track
            .and_then(|i| self.tracks.get(i))
            .or_else(|| self.tracks.first())
    }
}

/// Error from a failed track load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadError {
    /// Human-readable error message.
    pub message: String,
    /// How severe the error is.
    pub severity: Severity,
    /// Short cause description.
    pub cause: String,
}

impl LoadError {
    pub fn new(message: impl Into<String>, severity: Severity, cause: impl ToString) -> Self {
        Self {
            message: message.into(),
            severity,
            cause: cause.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playlist(selected: Option<usize>) -> PlaylistData {
        PlaylistData {
            name: "Mix".into(),
            selected_track: selected,
            tracks: vec![
                TrackItem::new("a.mp3", "A"),
                TrackItem::new("b.mp3", "B"),
            ],
        }
    }

    #[test]
    fn playlist_prefers_selected_track() {
        let data = playlist(Some(1));
        assert_eq!(data.first_playable().map(|t| t.title.as_str()), Some("B"));
    }

    #[test]
    fn playlist_falls_back_to_first_track() {
        assert_eq!(playlist(None).first_playable().map(|t| t.title.as_str()), Some("A"));
        assert_eq!(playlist(Some(9)).first_playable().map(|t| t.title.as_str()), Some("A"));
    }

    #[test]
    fn empty_playlist_has_nothing_to_play() {
        let data = PlaylistData {
            name: "Nothing".into(),
            selected_track: None,
            tracks: Vec::new(),
        };
        assert!(data.first_playable().is_none());
    }

    #[test]
    fn stream_has_no_duration() {
        let stream = TrackItem::new("http://radio/live", "Radio");
        assert!(stream.is_stream());
        assert!(!stream.with_duration(1_000).is_stream());
    }
}
