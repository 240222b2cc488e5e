use anyhow::Context;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use super::TranscriptService;
use crate::extractors::{VideoCatalog, VideoRef};
use crate::output::{self, FormatOptions};
use crate::utils::{sanitize_filename, truncate_chars};
use crate::TranscriptError;

/// Existing files at or below this size are treated as failed writes and redone
pub const MIN_CONTENT_BYTES: u64 = 100;

/// Per-run batch settings
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub language: String,
    pub format: FormatOptions,

    /// Pause after each saved transcript, and the base of the retry backoff
    pub delay: Duration,

    /// Attempts per video when the provider is rate limiting
    pub max_retries: u32,

    pub skip_existing: bool,
    pub show_progress: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            format: FormatOptions::default(),
            delay: Duration::from_secs(2),
            max_retries: 3,
            skip_existing: true,
            show_progress: true,
        }
    }
}

/// What happened to one input of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Saved(PathBuf),
    Skipped(PathBuf),
    Failed(String),
}

impl BatchOutcome {
    pub fn path(&self) -> Option<&Path> {
        match self {
            BatchOutcome::Saved(path) | BatchOutcome::Skipped(path) => Some(path),
            BatchOutcome::Failed(_) => None,
        }
    }
}

/// Outcomes in input order
#[derive(Debug, Default)]
pub struct BatchReport {
    entries: Vec<(String, BatchOutcome)>,
}

impl BatchReport {
    fn push(&mut self, input: String, outcome: BatchOutcome) {
        self.entries.push((input, outcome));
    }

    pub fn entries(&self) -> &[(String, BatchOutcome)] {
        &self.entries
    }

    /// Output path per input, `None` for failures
    pub fn paths(&self) -> Vec<(&str, Option<&Path>)> {
        self.entries
            .iter()
            .map(|(input, outcome)| (input.as_str(), outcome.path()))
            .collect()
    }

    pub fn total(&self) -> usize {
        self.entries.len()
    }

    /// Saved and skipped entries both count as success
    pub fn succeeded(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, outcome)| outcome.path().is_some())
            .count()
    }
}

/// Wait before retrying after rate-limited attempt `attempt` (0-indexed)
///
/// Saturates at [`Duration::MAX`] instead of overflowing.
pub fn backoff_delay(delay: Duration, attempt: u32) -> Duration {
    2u32.checked_pow(attempt)
        .and_then(|factor| delay.checked_mul(factor))
        .unwrap_or(Duration::MAX)
}

/// Whether a previous run already left a real transcript at `path`
pub fn has_content(path: &Path) -> bool {
    fs_err::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > MIN_CONTENT_BYTES)
        .unwrap_or(false)
}

/// Sequential, rate-limit-aware transcript downloads
pub struct BatchRunner {
    service: TranscriptService,
    catalog: Arc<dyn VideoCatalog>,
    options: BatchOptions,
}

impl BatchRunner {
    pub fn new(service: TranscriptService, catalog: Arc<dyn VideoCatalog>, options: BatchOptions) -> Self {
        Self {
            service,
            catalog,
            options,
        }
    }

    /// Download every video of a playlist into `output_dir`
    pub async fn run_playlist(&self, playlist_url: &str, output_dir: &Path) -> anyhow::Result<BatchReport> {
        println!("Fetching playlist videos...");
        let urls = self
            .catalog
            .playlist_videos(playlist_url)
            .await
            .context("Failed to fetch playlist videos")?;

        println!("Found {} videos in playlist", urls.len());
        println!(
            "Using {:.1}s delay between requests and max {} retries per video",
            self.options.delay.as_secs_f64(),
            self.options.max_retries
        );
        println!(
            "Browser fallback: {}\n",
            if self.service.has_fallback() { "Enabled" } else { "Disabled" }
        );

        fs_err::create_dir_all(output_dir)
            .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;

        Ok(self.run(&urls, output_dir).await)
    }

    /// Process `urls` one after another; a failed video never stops the batch
    pub async fn run(&self, urls: &[String], output_dir: &Path) -> BatchReport {
        let total = urls.len();
        let progress = self.progress_bar(total as u64);
        let mut report = BatchReport::default();

        for (i, url) in urls.iter().enumerate() {
            let idx = i + 1;
            tracing::info!("Processing video {}/{}: {}", idx, total, url);

            let outcome = self.process(idx, total, url, output_dir, &progress).await;
            report.push(url.clone(), outcome);
            progress.inc(1);
        }

        progress.finish_and_clear();
        report
    }

    async fn process(
        &self,
        idx: usize,
        total: usize,
        url: &str,
        output_dir: &Path,
        progress: &ProgressBar,
    ) -> BatchOutcome {
        let video = match VideoRef::parse(url) {
            Ok(video) => video,
            Err(e) => {
                tracing::warn!("Skipping invalid URL: {}", url);
                return BatchOutcome::Failed(e.to_string());
            }
        };

        let filename = match self.catalog.video_title(&video).await {
            Some(title) => {
                tracing::info!("  Title: {}", title);
                sanitize_filename(&title)
            }
            None => {
                tracing::warn!("  Could not fetch title, using video ID: {}", video);
                video.id().to_string()
            }
        };
        let output_file = output_dir.join(format!("{}.md", filename));

        if self.options.skip_existing && has_content(&output_file) {
            progress.suspend(|| {
                println!(
                    "{}  [{}/{}] Skipping (already exists): {}.md",
                    style("⏭").cyan(),
                    idx,
                    total,
                    filename
                )
            });
            return BatchOutcome::Skipped(output_file);
        }

        let max_retries = self.options.max_retries.max(1);
        for attempt in 0..max_retries {
            match self.save_transcript(&video, &output_file).await {
                Ok(()) => {
                    progress.suspend(|| {
                        println!("{} [{}/{}] Saved: {}.md", style("✓").green(), idx, total, filename)
                    });
                    if idx < total {
                        sleep(self.options.delay).await;
                    }
                    return BatchOutcome::Saved(output_file);
                }
                Err(e) if e.is_rate_limited() => {
                    let wait = backoff_delay(self.options.delay, attempt);
                    tracing::warn!(
                        "  Rate limited. Waiting {:.1}s before retry {}/{}",
                        wait.as_secs_f64(),
                        attempt + 1,
                        max_retries
                    );
                    sleep(wait).await;
                }
                Err(e) => {
                    let reason = e.to_string();
                    tracing::error!("✗ [{}/{}] Failed: {}", idx, total, filename);
                    tracing::error!("  Error: {}", truncate_chars(&reason, 100));
                    return BatchOutcome::Failed(reason);
                }
            }
        }

        tracing::error!(
            "✗ [{}/{}] Failed after {} attempts: {}",
            idx,
            total,
            max_retries,
            filename
        );
        tracing::error!("  Error: Rate limit exceeded");
        BatchOutcome::Failed(
            TranscriptError::RateLimitExceeded {
                attempts: max_retries,
            }
            .to_string(),
        )
    }

    async fn save_transcript(&self, video: &VideoRef, path: &Path) -> crate::Result<()> {
        let result = self.service.acquire(video, &self.options.language).await?;
        output::save_to_file(&result, path, &self.options.format)
    }

    fn progress_bar(&self, total: u64) -> ProgressBar {
        if !self.options.show_progress {
            return ProgressBar::hidden();
        }

        let progress = ProgressBar::new(total);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            progress.set_style(style);
        }
        progress
    }
}
