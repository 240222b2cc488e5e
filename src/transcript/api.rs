use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{ACCEPT_LANGUAGE, COOKIE};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use super::{FetchOutcome, PrimarySource, TimedSegment, TranscriptBody, TranscriptResult};
use crate::extractors::VideoRef;
use crate::{Result, TranscriptError};

const PLAYER_ENDPOINT: &str = "https://www.youtube.com/youtubei/v1/player";
const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

static API_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""INNERTUBE_API_KEY":\s*"([a-zA-Z0-9_-]+)""#).expect("static regex")
});

#[derive(Debug, Deserialize)]
struct PlayerResponse {
    #[serde(rename = "playabilityStatus")]
    playability_status: Option<PlayabilityStatus>,
    captions: Option<Captions>,
}

#[derive(Debug, Deserialize)]
struct PlayabilityStatus {
    status: String,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Captions {
    #[serde(rename = "playerCaptionsTracklistRenderer")]
    tracklist: Option<Tracklist>,
}

#[derive(Debug, Deserialize)]
struct Tracklist {
    #[serde(rename = "captionTracks", default)]
    caption_tracks: Vec<CaptionTrack>,
}

/// One caption track listed in the player response
#[derive(Debug, Clone, Deserialize)]
pub struct CaptionTrack {
    #[serde(rename = "baseUrl")]
    pub base_url: String,

    #[serde(rename = "languageCode")]
    pub language_code: String,

    /// `"asr"` for automatic speech recognition tracks
    #[serde(default)]
    pub kind: Option<String>,
}

impl CaptionTrack {
    pub fn is_generated(&self) -> bool {
        self.kind.as_deref() == Some("asr")
    }
}

#[derive(Debug, Deserialize)]
struct TimedText {
    #[serde(default)]
    events: Vec<TimedTextEvent>,
}

#[derive(Debug, Deserialize)]
struct TimedTextEvent {
    #[serde(rename = "tStartMs", default)]
    start_ms: u64,

    #[serde(rename = "dDurationMs", default)]
    duration_ms: u64,

    segs: Option<Vec<TimedTextSeg>>,
}

#[derive(Debug, Deserialize)]
struct TimedTextSeg {
    #[serde(default)]
    utf8: String,
}

/// Caption-track fetcher speaking YouTube's player API
pub struct ApiFetcher {
    client: Client,
}

impl ApiFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(DESKTOP_USER_AGENT)
            .build()?;

        Ok(Self { client })
    }

    async fn fetch_transcript(&self, video: &VideoRef, language: &str) -> Result<TranscriptResult> {
        let html = self.fetch_watch_page(video).await?;

        if is_captcha_page(&html) {
            return Err(unavailable(
                video,
                "YouTube is blocking requests from your IP (captcha challenge)",
            ));
        }

        let api_key = extract_api_key(&html)
            .ok_or_else(|| unavailable(video, "could not find the player API key on the watch page"))?;

        let player = self.fetch_player(video, &api_key).await?;
        let tracks = caption_tracks(video, player)?;

        let track = select_track(&tracks, language)
            .ok_or_else(|| unavailable(video, "no transcripts available"))?;
        tracing::debug!(
            "Selected {} track ({}) for {}",
            track.language_code,
            if track.is_generated() { "generated" } else { "manual" },
            video
        );

        let segments = self.fetch_segments(video, track).await?;
        if segments.is_empty() {
            return Err(unavailable(video, "transcript track is empty"));
        }

        Ok(TranscriptResult {
            video: video.clone(),
            body: TranscriptBody::Api {
                language_code: track.language_code.clone(),
                is_generated: track.is_generated(),
                segments,
            },
        })
    }

    async fn fetch_watch_page(&self, video: &VideoRef) -> Result<String> {
        let response = self
            .client
            .get(video.watch_url())
            .header(ACCEPT_LANGUAGE, "en-US")
            .header(COOKIE, "CONSENT=YES+cb")
            .send()
            .await?;

        Ok(check_status(video, response)?.text().await?)
    }

    async fn fetch_player(&self, video: &VideoRef, api_key: &str) -> Result<PlayerResponse> {
        let body = serde_json::json!({
            "context": {
                "client": {
                    "clientName": "ANDROID",
                    "clientVersion": "20.10.38",
                }
            },
            "videoId": video.id(),
        });

        let response = self
            .client
            .post(PLAYER_ENDPOINT)
            .query(&[("key", api_key)])
            .header(ACCEPT_LANGUAGE, "en-US")
            .json(&body)
            .send()
            .await?;

        let text = check_status(video, response)?.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn fetch_segments(&self, video: &VideoRef, track: &CaptionTrack) -> Result<Vec<TimedSegment>> {
        let url = json3_url(&track.base_url)
            .ok_or_else(|| unavailable(video, "caption track has a malformed URL"))?;

        let response = self.client.get(url).send().await?;
        let text = check_status(video, response)?.text().await?;

        parse_timed_text(&text)
    }
}

#[async_trait]
impl PrimarySource for ApiFetcher {
    async fn fetch(&self, video: &VideoRef, language: &str) -> FetchOutcome {
        match self.fetch_transcript(video, language).await {
            Ok(result) => {
                tracing::debug!("Fetched {} segments via API for {}", result.segment_count(), video);
                FetchOutcome::Fetched(result)
            }
            Err(e) => FetchOutcome::NeedsFallback(e),
        }
    }
}

fn unavailable(video: &VideoRef, reason: &str) -> TranscriptError {
    TranscriptError::TranscriptUnavailable {
        video_id: video.id().to_string(),
        reason: reason.to_string(),
    }
}

fn check_status(video: &VideoRef, response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status() == StatusCode::TOO_MANY_REQUESTS {
        return Err(unavailable(
            video,
            "YouTube blocked the request (HTTP 429 Too Many Requests)",
        ));
    }
    Ok(response.error_for_status()?)
}

fn is_captcha_page(html: &str) -> bool {
    html.contains(r#"class="g-recaptcha""#)
}

fn extract_api_key(html: &str) -> Option<String> {
    API_KEY.captures(html).map(|caps| caps[1].to_string())
}

fn caption_tracks(video: &VideoRef, player: PlayerResponse) -> Result<Vec<CaptionTrack>> {
    if let Some(status) = &player.playability_status {
        if status.status != "OK" {
            let reason = status.reason.as_deref().unwrap_or("unknown reason");
            if reason.contains("not a bot") {
                return Err(unavailable(
                    video,
                    &format!("YouTube is blocking requests from your IP ({})", reason),
                ));
            }
            return Err(unavailable(video, &format!("video is unplayable: {}", reason)));
        }
    }

    let tracks = player
        .captions
        .and_then(|c| c.tracklist)
        .map(|t| t.caption_tracks)
        .unwrap_or_default();

    if tracks.is_empty() {
        return Err(unavailable(video, "transcripts are disabled for this video"));
    }

    Ok(tracks)
}

/// Pick a track: requested language (manual before generated), then generated
/// English, then whatever is listed first.
pub fn select_track<'a>(tracks: &'a [CaptionTrack], language: &str) -> Option<&'a CaptionTrack> {
    tracks
        .iter()
        .find(|t| t.language_code == language && !t.is_generated())
        .or_else(|| tracks.iter().find(|t| t.language_code == language))
        .or_else(|| tracks.iter().find(|t| t.is_generated() && t.language_code == "en"))
        .or_else(|| tracks.first())
}

fn json3_url(base_url: &str) -> Option<String> {
    let mut url = Url::parse(base_url).ok()?;
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "fmt")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(pairs)
        .append_pair("fmt", "json3");

    Some(url.into())
}

fn parse_timed_text(body: &str) -> Result<Vec<TimedSegment>> {
    let timed: TimedText = serde_json::from_str(body)?;

    Ok(timed
        .events
        .into_iter()
        .filter_map(|event| {
            let text: String = event
                .segs?
                .into_iter()
                .map(|seg| seg.utf8)
                .collect::<String>()
                .replace('\n', " ");
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            Some(TimedSegment::new(
                event.start_ms as f64 / 1000.0,
                event.duration_ms as f64 / 1000.0,
                text,
            ))
        })
        .collect())
}
