use crate::protocol::TrackItem;

/// One entry of an M3U playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct M3uEntry {
    pub location: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub duration_ms: Option<u64>,
}

pub fn is_playlist_extension(ext: &str) -> bool {
    ext.eq_ignore_ascii_case("m3u")
}

pub fn is_playlist_mime(mime: &str) -> bool {
    let mime = mime.split(';').next().unwrap_or_default().trim();
    mime.eq_ignore_ascii_case("audio/x-mpegurl")
        || mime.eq_ignore_ascii_case("audio/mpegurl")
        || mime.eq_ignore_ascii_case("application/x-mpegurl")
}

/// Parses plain and extended M3U. Comments other than `#EXTINF` are
/// skipped.
pub fn parse_m3u(text: &str) -> Vec<M3uEntry> {
    let mut entries = Vec::new();
    let mut pending: Option<(Option<u64>, Option<String>, Option<String>)> = None;

    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            continue;
        }
        if let Some(info) = line.strip_prefix("#EXTINF:") {
            pending = Some(parse_extinf(info));
            continue;
        }
        if line.starts_with('#') {
            continue;
        }

        let (duration_ms, author, title) = pending.take().unwrap_or_default();
        entries.push(M3uEntry {
            location: line.to_string(),
            title,
            author,
            duration_ms,
        });
    }
    entries
}

/// `#EXTINF:<seconds>,<artist> - <title>`; -1 seconds marks a stream.
fn parse_extinf(info: &str) -> (Option<u64>, Option<String>, Option<String>) {
    let (secs, label) = info.split_once(',').unwrap_or((info, ""));
    let duration_ms = secs
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|s| *s >= 0)
        .map(|s| s as u64 * 1000);

    let label = label.trim();
    if label.is_empty() {
        return (duration_ms, None, None);
    }
    match label.split_once(" - ") {
        Some((author, title)) => (
            duration_ms,
            Some(author.trim().to_string()),
            Some(title.trim().to_string()),
        ),
        None => (duration_ms, None, Some(label.to_string())),
    }
}

impl M3uEntry {
    /// Builds the track for this entry once its location has been resolved.
    pub fn into_track(self, source_ref: String, fallback_title: &str, source_name: &str) -> TrackItem {
        let mut item = TrackItem::new(
            source_ref,
            self.title.unwrap_or_else(|| fallback_title.to_string()),
        )
        .with_source(source_name);
        if let Some(author) = self.author {
            item = item.with_author(author);
        }
        if let Some(duration) = self.duration_ms {
            item = item.with_duration(duration);
        }
        item
    }
}
