use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "transcript",
    about = "Extract YouTube video transcripts as markdown. Supports both individual videos and playlists.",
    version,
    long_about = "Extract YouTube video transcripts as markdown. Caption tracks are fetched from YouTube directly; when that fails a headless Chromium session opens the video page and scrapes the transcript panel. Playlist URLs download one file per video with pacing, retries and resume."
)]
pub struct Cli {
    /// YouTube video URL, playlist URL, or video ID
    #[arg(value_name = "URL")]
    pub url: String,

    /// Output file for a single video (prints to stdout if not specified); output directory for playlists
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Include timestamps in output
    #[arg(short, long)]
    pub timestamps: bool,

    /// Preferred language code [default: en]
    #[arg(short, long, value_name = "LANG")]
    pub language: Option<String>,

    /// Disable paragraph formatting
    #[arg(long)]
    pub no_formatting: bool,

    /// Delay between requests in seconds to avoid rate limiting [default: 2.0]
    #[arg(long, value_name = "SECONDS")]
    pub delay: Option<f64>,

    /// Maximum number of attempts per video on rate-limit errors [default: 3]
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub max_retries: Option<u32>,

    /// Use browser automation as fallback when the API fails (true/false) [default: true]
    #[arg(
        long,
        value_name = "BOOL",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = parse_flag
    )]
    pub use_playwright_fallback: Option<bool>,

    /// Run the fallback browser in headless mode (true/false) [default: true]
    #[arg(
        long,
        value_name = "BOOL",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = parse_flag
    )]
    pub headless: Option<bool>,

    /// Configuration file (YAML)
    #[arg(long, value_name = "FILE", env = "TRANSCRIPT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// `true`, `1` and `yes` (any case) enable; anything else disables
fn parse_flag(value: &str) -> Result<bool, String> {
    Ok(matches!(
        value.to_ascii_lowercase().as_str(),
        "true" | "1" | "yes"
    ))
}
