use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::extractors::VideoRef;
use crate::{Result, TranscriptError};

pub mod api;
pub mod batch;
pub mod browser;

/// Caption segment with numeric timing, as returned by the caption API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedSegment {
    /// Start time in seconds
    pub start: f64,

    /// Duration in seconds
    pub duration: f64,

    /// Segment text
    pub text: String,
}

impl TimedSegment {
    pub fn new(start: f64, duration: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            duration,
            text: text.into(),
        }
    }

    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Segment scraped from the transcript panel; timing is the displayed label only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedSegment {
    /// Timestamp exactly as rendered on the page, possibly empty
    pub timestamp: String,

    /// Segment text
    pub text: String,
}

/// Where a transcript came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceMethod {
    Api,
    BrowserFallback,
}

/// Segments plus whatever track metadata their source can vouch for
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TranscriptBody {
    Api {
        language_code: String,
        is_generated: bool,
        segments: Vec<TimedSegment>,
    },
    Browser {
        segments: Vec<ScrapedSegment>,
    },
}

/// A fetched transcript for one video
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptResult {
    pub video: VideoRef,
    pub body: TranscriptBody,
}

impl TranscriptResult {
    pub fn source_method(&self) -> SourceMethod {
        match self.body {
            TranscriptBody::Api { .. } => SourceMethod::Api,
            TranscriptBody::Browser { .. } => SourceMethod::BrowserFallback,
        }
    }

    pub fn segment_count(&self) -> usize {
        match &self.body {
            TranscriptBody::Api { segments, .. } => segments.len(),
            TranscriptBody::Browser { segments } => segments.len(),
        }
    }
}

/// Outcome of the primary source: a transcript, or the reason to try the fallback
#[derive(Debug)]
pub enum FetchOutcome {
    Fetched(TranscriptResult),
    NeedsFallback(TranscriptError),
}

/// Primary transcript source
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PrimarySource: Send + Sync {
    async fn fetch(&self, video: &VideoRef, language: &str) -> FetchOutcome;
}

/// Source used only after the primary one gave up
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FallbackSource: Send + Sync {
    async fn fetch(&self, video: &VideoRef) -> Result<TranscriptResult>;
}

/// Primary source with an optional fallback behind it
#[derive(Clone)]
pub struct TranscriptService {
    primary: Arc<dyn PrimarySource>,
    fallback: Option<Arc<dyn FallbackSource>>,
}

impl TranscriptService {
    pub fn new(primary: Arc<dyn PrimarySource>, fallback: Option<Arc<dyn FallbackSource>>) -> Self {
        Self { primary, fallback }
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// Fetch a transcript, falling back when the primary source can't deliver.
    ///
    /// Without a fallback the primary error is returned as-is; when both fail the
    /// reasons are combined into [`TranscriptError::FallbackFailed`].
    pub async fn acquire(&self, video: &VideoRef, language: &str) -> Result<TranscriptResult> {
        let primary_error = match self.primary.fetch(video, language).await {
            FetchOutcome::Fetched(result) => return Ok(result),
            FetchOutcome::NeedsFallback(err) => err,
        };

        let primary_reason = primary_error.to_string();
        tracing::warn!(
            "  API failed: {}",
            crate::utils::truncate_chars(&primary_reason, 100)
        );

        let Some(fallback) = &self.fallback else {
            return Err(primary_error);
        };

        tracing::info!("  Attempting browser fallback...");
        match fallback.fetch(video).await {
            Ok(result) => Ok(result),
            Err(fallback_error) => {
                let fallback_reason = fallback_error.to_string();
                tracing::error!(
                    "  Browser fallback also failed: {}",
                    crate::utils::truncate_chars(&fallback_reason, 100)
                );
                Err(TranscriptError::FallbackFailed {
                    primary: primary_reason,
                    fallback: fallback_reason,
                })
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use mockall::predicate::eq;

    fn unavailable(reason: &str) -> TranscriptError {
        TranscriptError::TranscriptUnavailable {
            video_id: "dQw4w9WgXcQ".to_string(),
            reason: reason.to_string(),
        }
    }

    #[tokio::test]
    async fn test_primary_success_skips_fallback() {
        let mut primary = MockPrimarySource::new();
        primary
            .expect_fetch()
            .with(eq(video()), eq("en"))
            .times(1)
            .returning(|v, _| FetchOutcome::Fetched(api_result(v)));
        let mut fallback = MockFallbackSource::new();
        fallback.expect_fetch().never();

        let service = TranscriptService::new(Arc::new(primary), Some(Arc::new(fallback)));
        let result = service.acquire(&video(), "en").await.unwrap();
        assert_eq!(result.source_method(), SourceMethod::Api);
    }

    #[tokio::test]
    async fn test_primary_failure_uses_fallback() {
        let mut primary = MockPrimarySource::new();
        primary
            .expect_fetch()
            .returning(|_, _| FetchOutcome::NeedsFallback(unavailable("no transcripts available")));
        let mut fallback = MockFallbackSource::new();
        fallback
            .expect_fetch()
            .times(1)
            .returning(|v| Ok(browser_result(v)));

        let service = TranscriptService::new(Arc::new(primary), Some(Arc::new(fallback)));
        let result = service.acquire(&video(), "en").await.unwrap();
        assert_eq!(result.source_method(), SourceMethod::BrowserFallback);
        assert_eq!(result.segment_count(), 1);
    }

    #[tokio::test]
    async fn test_without_fallback_primary_error_propagates() {
        let mut primary = MockPrimarySource::new();
        primary
            .expect_fetch()
            .returning(|_, _| FetchOutcome::NeedsFallback(unavailable("no transcripts available")));

        let service = TranscriptService::new(Arc::new(primary), None);
        let err = service.acquire(&video(), "en").await.unwrap_err();
        assert!(matches!(err, TranscriptError::TranscriptUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_both_failures_are_aggregated() {
        let mut primary = MockPrimarySource::new();
        primary
            .expect_fetch()
            .returning(|_, _| FetchOutcome::NeedsFallback(unavailable("video is private")));
        let mut fallback = MockFallbackSource::new();
        fallback
            .expect_fetch()
            .returning(|_| Err(TranscriptError::TranscriptControlNotFound));

        let service = TranscriptService::new(Arc::new(primary), Some(Arc::new(fallback)));
        let err = service.acquire(&video(), "en").await.unwrap_err();
        match &err {
            TranscriptError::FallbackFailed { primary, fallback } => {
                assert!(primary.contains("video is private"));
                assert_eq!(fallback, "Could not find transcript button on page");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().starts_with("Both API and Playwright failed."));
    }
}
