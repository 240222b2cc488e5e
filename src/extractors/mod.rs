use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use url::Url;

pub mod youtube;

use crate::{Result, TranscriptError};

static VIDEO_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("static regex"));

/// Canonical reference to a single YouTube video.
///
/// Only constructed through [`VideoRef::parse`], so the id is always an 11-character
/// `[A-Za-z0-9_-]` token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct VideoRef {
    id: String,
}

impl VideoRef {
    /// Normalize a watch/short/embed URL or a bare video id.
    ///
    /// Checks run in a fixed order and the first shape that applies decides the result:
    /// `watch?v=`, `youtu.be/<id>`, `/embed/<id>` or `/v/<id>`, then a bare id.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();

        let candidate = parse_url(input)
            .and_then(|url| id_from_url(&url))
            .or_else(|| VIDEO_ID.is_match(input).then(|| input.to_string()));

        match candidate {
            Some(id) if VIDEO_ID.is_match(&id) => Ok(Self { id }),
            _ => Err(TranscriptError::InvalidReference(input.to_string())),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Canonical watch page URL
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.id)
    }
}

impl fmt::Display for VideoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

fn parse_url(input: &str) -> Option<Url> {
    if input.contains("://") {
        return Url::parse(input).ok();
    }
    // Scheme-less input such as "youtu.be/<id>"
    if input.contains('/') {
        return Url::parse(&format!("https://{}", input)).ok();
    }
    None
}

fn is_youtube_host(host: &str) -> bool {
    host == "youtube.com" || host.ends_with(".youtube.com")
}

fn id_from_url(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    let youtube = is_youtube_host(&host);

    if youtube && url.path().starts_with("/watch") {
        if let Some((_, v)) = url.query_pairs().find(|(k, _)| k == "v") {
            return Some(v.into_owned());
        }
    }

    if host == "youtu.be" || host == "www.youtu.be" {
        return url.path_segments()?.next().map(str::to_string);
    }

    if youtube {
        let mut segments = url.path_segments()?;
        if matches!(segments.next(), Some("embed") | Some("v")) {
            return segments.next().map(str::to_string);
        }
    }

    None
}

/// Playlist URLs switch the tool into batch mode
pub fn is_playlist_url(url: &str) -> bool {
    url.contains("list=") || url.contains("/playlist?")
}

/// Video metadata lookups that sit outside the transcript sources
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VideoCatalog: Send + Sync {
    /// Title of a video, or `None` when it can't be looked up
    async fn video_title(&self, video: &VideoRef) -> Option<String>;

    /// Watch URLs of every video in a playlist, in playlist order
    async fn playlist_videos(&self, playlist_url: &str) -> anyhow::Result<Vec<String>>;
}
