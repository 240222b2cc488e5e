use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::{VideoCatalog, VideoRef};

/// Titles and playlist listings via yt-dlp
pub struct YtDlpCatalog {
    yt_dlp_path: String,
    title_timeout: Duration,
}

impl YtDlpCatalog {
    pub fn new(yt_dlp_path: impl Into<String>, title_timeout: Duration) -> Self {
        Self {
            yt_dlp_path: yt_dlp_path.into(),
            title_timeout,
        }
    }

    /// Get video information using yt-dlp
    async fn get_video_info(&self, url: &str) -> anyhow::Result<Value> {
        tracing::debug!("Fetching video info for: {}", url);

        let mut command = Command::new(&self.yt_dlp_path);
        command
            .args(["--dump-json", "--no-download", "--quiet", url])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.title_timeout, command.output())
            .await
            .context("yt-dlp timed out")??;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp failed: {}", error);
        }

        let json_str = String::from_utf8(output.stdout)?;
        let info: Value = serde_json::from_str(&json_str)?;

        Ok(info)
    }
}

impl Default for YtDlpCatalog {
    fn default() -> Self {
        Self::new("yt-dlp", Duration::from_secs(10))
    }
}

#[async_trait]
impl VideoCatalog for YtDlpCatalog {
    async fn video_title(&self, video: &VideoRef) -> Option<String> {
        match self.get_video_info(&video.watch_url()).await {
            Ok(info) => info["title"]
                .as_str()
                .map(str::to_string)
                .filter(|t| !t.trim().is_empty()),
            Err(e) => {
                tracing::debug!("Title lookup failed for {}: {:#}", video, e);
                None
            }
        }
    }

    async fn playlist_videos(&self, playlist_url: &str) -> anyhow::Result<Vec<String>> {
        tracing::debug!("Listing playlist: {}", playlist_url);

        let output = Command::new(&self.yt_dlp_path)
            .args(["--flat-playlist", "--dump-single-json", "--quiet", playlist_url])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to run {}", self.yt_dlp_path))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Failed to fetch playlist videos: {}", error.trim());
        }

        let info: Value = serde_json::from_slice(&output.stdout)
            .context("Failed to parse playlist listing")?;

        Ok(playlist_entry_urls(&info))
    }
}

/// Watch URLs for the entries of a flat playlist dump
fn playlist_entry_urls(info: &Value) -> Vec<String> {
    info["entries"]
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry["id"].as_str())
                .map(|id| format!("https://www.youtube.com/watch?v={}", id))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_playlist_entry_urls() {
        let info = json!({
            "_type": "playlist",
            "id": "PLabc",
            "entries": [
                {"id": "dQw4w9WgXcQ", "title": "First"},
                {"title": "missing id"},
                {"id": "9bZkp7q19f0", "title": "Second"}
            ]
        });
        assert_eq!(
            playlist_entry_urls(&info),
            vec![
                "https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string(),
                "https://www.youtube.com/watch?v=9bZkp7q19f0".to_string(),
            ]
        );
    }

    #[test]
    fn test_playlist_without_entries_is_empty() {
        assert!(playlist_entry_urls(&json!({"_type": "playlist"})).is_empty());
    }

    #[tokio::test]
    async fn test_missing_binary_yields_no_title() {
        let catalog = YtDlpCatalog::new("yt-dlp-definitely-not-installed", Duration::from_secs(1));
        let video = VideoRef::parse("dQw4w9WgXcQ").unwrap();
        assert_eq!(catalog.video_title(&video).await, None);
        assert!(catalog.playlist_videos("https://www.youtube.com/playlist?list=PLabc").await.is_err());
    }
}
