use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, error, warn};

use super::{
    SourcePlugin,
    playlist::{is_playlist_extension, parse_m3u},
    probe::{ProbedMeta, extension_of, probe},
};
use crate::{
    common::{Severity, types::AnyResult},
    protocol::{LoadError, LoadResult, PlaylistData, TrackItem},
};

/// Files on the local disk, plus `.m3u` playlists of them.
pub struct LocalSource;

impl LocalSource {
    pub fn new() -> Self {
        Self
    }

    fn path_of(identifier: &str) -> &str {
        identifier.strip_prefix("file://").unwrap_or(identifier)
    }

    fn file_stem(path: &Path) -> String {
        path.file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Unknown")
            .to_string()
    }

    fn probe_file(path: &Path) -> AnyResult<TrackItem> {
        let file = std::fs::File::open(path)?;
        let ext = extension_of(&path.to_string_lossy());
        let ProbedMeta {
            title,
            author,
            duration_ms,
        } = probe(Box::new(file), ext.as_deref(), None)?;

        let mut item = TrackItem::new(
            path.to_string_lossy(),
            title.unwrap_or_else(|| Self::file_stem(path)),
        )
        .with_source("local")
        .with_author(author.unwrap_or_else(|| "Unknown Artist".to_string()));
        item.duration_ms = duration_ms;
        Ok(item)
    }

    fn read_playlist(path: &Path) -> AnyResult<PlaylistData> {
        let text = std::fs::read_to_string(path)?;
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();

        let tracks = parse_m3u(&text)
            .into_iter()
            .map(|entry| {
                let location = entry.location.clone();
                let source_ref = if location.contains("://") {
                    location
                } else {
                    let entry_path = PathBuf::from(Self::path_of(&location));
                    if entry_path.is_absolute() {
                        entry_path.to_string_lossy().into_owned()
                    } else {
                        base.join(entry_path).to_string_lossy().into_owned()
                    }
                };
                let fallback = Self::file_stem(Path::new(&source_ref));
                entry.into_track(source_ref, &fallback, "local")
            })
            .collect();

        Ok(PlaylistData {
            name: Self::file_stem(path),
            selected_track: None,
            tracks,
        })
    }
}

impl Default for LocalSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourcePlugin for LocalSource {
    fn name(&self) -> &str {
        "local"
    }

    fn can_handle(&self, identifier: &str) -> bool {
        Path::new(Self::path_of(identifier)).is_file()
    }

    async fn load(&self, identifier: &str) -> LoadResult {
        let path = PathBuf::from(Self::path_of(identifier));
        let is_playlist = extension_of(Self::path_of(identifier))
            .as_deref()
            .is_some_and(is_playlist_extension);

        debug!("Local source probing file: {}", path.display());

        let task_path = path.clone();
        let result = tokio::task::spawn_blocking(move || {
            if is_playlist {
                LocalSource::read_playlist(&task_path).map(LoadResult::Playlist)
            } else {
                LocalSource::probe_file(&task_path).map(LoadResult::Track)
            }
        })
        .await;

        match result {
            Ok(Ok(LoadResult::Playlist(playlist))) if playlist.tracks.is_empty() => {
                LoadResult::Empty
            }
            Ok(Ok(loaded)) => loaded,
            Ok(Err(e)) => {
                warn!("Local source: failed to probe '{}': {}", path.display(), e);
                LoadResult::Error(LoadError::new(
                    format!("Failed to load local file: {}", e),
                    Severity::Suspicious,
                    e,
                ))
            }
            Err(e) => {
                error!("Local source: task join error: {}", e);
                LoadResult::Error(LoadError::new(
                    "Internal error reading local file",
                    Severity::Fault,
                    e,
                ))
            }
        }
    }
}
