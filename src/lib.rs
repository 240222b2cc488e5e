//! yt-transcript - download YouTube transcripts as markdown
//!
//! Transcripts are fetched from YouTube's caption tracks first. When that path fails
//! (missing tracks, IP blocks, rate limits) a headless Chromium session opens the watch
//! page and scrapes the transcript panel instead. Playlists are processed one video at a
//! time with pacing and exponential backoff.

pub mod cli;
pub mod config;
pub mod extractors;
pub mod output;
pub mod transcript;
pub mod utils;

pub use cli::Cli;
pub use config::Config;
pub use extractors::{VideoCatalog, VideoRef};
pub use transcript::{
    batch::{BatchOutcome, BatchReport, BatchRunner},
    FetchOutcome, SourceMethod, TranscriptBody, TranscriptResult, TranscriptService,
};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, TranscriptError>;

/// Error types specific to transcript acquisition
#[derive(thiserror::Error, Debug)]
pub enum TranscriptError {
    #[error("Invalid YouTube URL: {0}")]
    InvalidReference(String),

    #[error("Failed to fetch transcript for {video_id}: {reason}")]
    TranscriptUnavailable { video_id: String, reason: String },

    #[error("Could not find transcript button on page")]
    TranscriptControlNotFound,

    #[error("No transcript segments found")]
    NoSegmentsExtracted,

    #[error(
        "Both API and Playwright failed. API: {}, Playwright: {}",
        utils::truncate_chars(.primary, 50),
        utils::truncate_chars(.fallback, 50)
    )]
    FallbackFailed { primary: String, fallback: String },

    #[error("Rate limit exceeded after {attempts} attempts")]
    RateLimitExceeded { attempts: u32 },

    #[error("Browser automation failed: {0}")]
    Browser(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed response: {0}")]
    Json(#[from] serde_json::Error),
}

impl TranscriptError {
    /// Whether this failure looks like the provider throttling us.
    ///
    /// Aggregated failures are inspected on their full, untruncated reasons.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            TranscriptError::FallbackFailed { primary, fallback } => {
                utils::is_rate_limit_message(primary) || utils::is_rate_limit_message(fallback)
            }
            TranscriptError::RateLimitExceeded { .. } => true,
            other => utils::is_rate_limit_message(&other.to_string()),
        }
    }
}
