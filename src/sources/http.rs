use std::{io::Cursor, time::Duration};

use async_trait::async_trait;
use reqwest::{
    Client, StatusCode, Url,
    header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, RANGE},
};
use tracing::{debug, error, warn};

use super::{
    SourcePlugin,
    playlist::{is_playlist_extension, is_playlist_mime, parse_m3u},
    probe::{ProbedMeta, extension_of, probe},
};
use crate::{
    common::{HttpClient, Severity},
    configs::SourcesConfig,
    protocol::{LoadError, LoadResult, PlaylistData, TrackItem},
};

/// What the response headers say the resource is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Playlist,
    /// Icecast/Shoutcast or another endless body.
    Stream,
    File,
    NotAudio,
}

/// Remote files, internet radio streams and M3U playlists over HTTP(S).
pub struct HttpSource {
    client: Client,
    probe_bytes: usize,
}

impl HttpSource {
    pub fn new(config: &SourcesConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: HttpClient::new(timeout)?,
            probe_bytes: config.http_probe_bytes.max(4096),
        })
    }

    async fn fetch(&self, url: &Url) -> Result<LoadResult, reqwest::Error> {
        let mut response = self
            .client
            .get(url.clone())
            .header(RANGE, format!("bytes=0-{}", self.probe_bytes - 1))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            return Ok(LoadResult::Empty);
        }
        if !status.is_success() {
            return Ok(LoadResult::Error(LoadError::new(
                format!("Server responded with {}", status),
                Severity::Suspicious,
                status,
            )));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let kind = classify(url, response.headers());
        debug!("HTTP source: {} looks like {:?} ({:?})", url, kind, content_type);

        match kind {
            Kind::NotAudio => Ok(LoadResult::Empty),
            Kind::Stream => {
                let title = response
                    .headers()
                    .get("icy-name")
                    .and_then(|v| v.to_str().ok())
                    .filter(|v| !v.trim().is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| title_from_url(url));
                Ok(LoadResult::Track(
                    TrackItem::new(url.as_str(), title)
                        .with_author("Unknown Artist")
                        .with_source("http"),
                ))
            }
            Kind::Playlist => {
                let text = response.text().await?;
                Ok(playlist_from(url, &text))
            }
            Kind::File => {
                let mut head = Vec::with_capacity(self.probe_bytes.min(64 * 1024));
                while head.len() < self.probe_bytes {
                    match response.chunk().await? {
                        Some(chunk) => head.extend_from_slice(&chunk),
                        None => break,
                    }
                }
                Ok(self.probe_head(url, head, content_type).await)
            }
        }
    }

    async fn probe_head(&self, url: &Url, head: Vec<u8>, content_type: Option<String>) -> LoadResult {
        let ext = extension_of(url.path());
        let mime = content_type.clone();
        let probed = tokio::task::spawn_blocking(move || {
            probe(Box::new(Cursor::new(head)), ext.as_deref(), mime.as_deref())
        })
        .await;

        let mut item = TrackItem::new(url.as_str(), title_from_url(url)).with_source("http");
        match probed {
            Ok(Ok(ProbedMeta {
                title,
                author,
                duration_ms,
            })) => {
                if let Some(title) = title {
                    item.title = title;
                }
                item.author = author.unwrap_or_else(|| "Unknown Artist".to_string());
                item.duration_ms = duration_ms;
                LoadResult::Track(item)
            }
            Ok(Err(e)) => {
                // declared audio we cannot read is still worth handing over
                if content_type.as_deref().is_some_and(|t| t.starts_with("audio/")) {
                    debug!("Probing failed for {}, keeping it as audio: {}", url, e);
                    item.author = "Unknown Artist".to_string();
                    LoadResult::Track(item)
                } else {
                    warn!("Probing failed for {}: {}", url, e);
                    LoadResult::Empty
                }
            }
            Err(e) => {
                error!("Task join error: {}", e);
                LoadResult::Error(LoadError::new(
                    "Internal error during probing",
                    Severity::Fault,
                    e,
                ))
            }
        }
    }
}

fn classify(url: &Url, headers: &HeaderMap) -> Kind {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if is_playlist_mime(&content_type)
        || extension_of(url.path())
            .as_deref()
            .is_some_and(is_playlist_extension)
    {
        return Kind::Playlist;
    }
    if headers.contains_key("icy-metaint") || headers.contains_key("icy-name") {
        return Kind::Stream;
    }
    if content_type.starts_with("text/") || content_type.contains("html") {
        return Kind::NotAudio;
    }
    if content_type.starts_with("audio/") && !headers.contains_key(CONTENT_LENGTH) {
        return Kind::Stream;
    }
    Kind::File
}

fn playlist_from(url: &Url, text: &str) -> LoadResult {
    let tracks: Vec<TrackItem> = parse_m3u(text)
        .into_iter()
        .filter_map(|entry| {
            let resolved = url.join(&entry.location).ok()?;
            let fallback = title_from_url(&resolved);
            Some(entry.into_track(resolved.to_string(), &fallback, "http"))
        })
        .collect();

    if tracks.is_empty() {
        return LoadResult::Empty;
    }
    LoadResult::Playlist(PlaylistData {
        name: title_from_url(url),
        selected_track: None,
        tracks,
    })
}

/// Last path segment, percent-decoded, or the host for bare URLs.
fn title_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
        .map(|segment| {
            urlencoding::decode(segment)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| segment.to_string())
        })
        .or_else(|| url.host_str().map(str::to_string))
        .unwrap_or_else(|| "Unknown Title".to_string())
}

#[async_trait]
impl SourcePlugin for HttpSource {
    fn name(&self) -> &str {
        "http"
    }

    fn can_handle(&self, identifier: &str) -> bool {
        let lower = identifier.get(..8).unwrap_or(identifier).to_ascii_lowercase();
        lower.starts_with("http://") || lower.starts_with("https://")
    }

    async fn load(&self, identifier: &str) -> LoadResult {
        let url = match Url::parse(identifier) {
            Ok(url) => url,
            Err(e) => {
                return LoadResult::Error(LoadError::new(
                    format!("Invalid URL: {}", e),
                    Severity::Common,
                    e,
                ));
            }
        };
        debug!("Probing HTTP source: {}", url);

        match self.fetch(&url).await {
            Ok(result) => result,
            Err(e) => {
                warn!("HTTP source: request to {} failed: {}", url, e);
                LoadResult::Error(LoadError::new(
                    format!("Failed to fetch {}: {}", url, e),
                    Severity::Common,
                    e,
                ))
            }
        }
    }
}
