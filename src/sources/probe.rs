use std::path::Path;

use symphonia::core::{
  codecs::CODEC_TYPE_NULL,
  formats::FormatOptions,
  io::{MediaSource, MediaSourceStream},
  meta::{MetadataOptions, StandardTagKey},
  probe::Hint,
};

use crate::common::types::AnyResult;

/// What a container told us about itself.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProbedMeta {
  pub title: Option<String>,
  pub author: Option<String>,
  pub duration_ms: Option<u64>,
}

/// Reads the container header and tags of `source`. Blocking.
pub fn probe(
  source: Box<dyn MediaSource>,
  extension: Option<&str>,
  mime_type: Option<&str>,
) -> AnyResult<ProbedMeta> {
  let mut hint = Hint::new();
  if let Some(ext) = extension {
    hint.with_extension(ext);
  }
  if let Some(mime) = mime_type {
    hint.mime_type(mime);
  }

  let mss = MediaSourceStream::new(source, Default::default());
  let mut probed = symphonia::default::get_probe().format(
    &hint,
    mss,
    &FormatOptions::default(),
    &MetadataOptions::default(),
  )?;

  let mut meta = ProbedMeta::default();
  {
    let format = &mut probed.format;
    let track = format
      .tracks()
      .iter()
      .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
      .ok_or("no audio track found")?;

    if let (Some(n_frames), Some(rate)) = (track.codec_params.n_frames, track.codec_params.sample_rate)
    {
      if rate > 0 {
        meta.duration_ms = Some(n_frames * 1000 / rate as u64);
      }
    }

    if let Some(current) = format.metadata().current() {
      read_tags(current.tags(), &mut meta);
    }
  }
  // some formats only expose tags found while probing
  if meta.title.is_none() || meta.author.is_none() {
    if let Some(current) = probed.metadata.get().as_ref().and_then(|m| m.current()) {
      read_tags(current.tags(), &mut meta);
    }
  }

  Ok(meta)
}

fn read_tags(tags: &[symphonia::core::meta::Tag], meta: &mut ProbedMeta) {
  for tag in tags {
    match tag.std_key {
      Some(StandardTagKey::TrackTitle) if meta.title.is_none() => {
        meta.title = Some(tag.value.to_string());
      }
      Some(StandardTagKey::Artist) | Some(StandardTagKey::AlbumArtist) if meta.author.is_none() => {
        meta.author = Some(tag.value.to_string());
      }
      _ => {}
    }
  }
}

/// Lower-cased extension of a path or URL path.
pub fn extension_of(path: &str) -> Option<String> {
  Path::new(path)
    .extension()
    .and_then(|e| e.to_str())
    .map(str::to_lowercase)
}
