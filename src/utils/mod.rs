use once_cell::sync::Lazy;
use regex::Regex;

static INVALID_FILENAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>:"/\\|?*]"#).expect("static regex"));
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// Maximum filename length produced by [`sanitize_filename`]
pub const MAX_FILENAME_LENGTH: usize = 100;

/// Format whole seconds as `MM:SS`, or `HH:MM:SS` once past the hour
pub fn format_timestamp(seconds: f64) -> String {
    let total_seconds = seconds.max(0.0) as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

/// Turn a video title into a filesystem-safe file stem.
///
/// Strips `<>:"/\|?*`, collapses whitespace, trims dots and spaces from both ends and
/// cuts anything longer than [`MAX_FILENAME_LENGTH`] at the last space before the limit.
pub fn sanitize_filename(title: &str) -> String {
    let stripped = INVALID_FILENAME_CHARS.replace_all(title, "");
    let collapsed = WHITESPACE_RUN.replace_all(&stripped, " ");
    let mut sanitized = collapsed
        .trim_matches(|c: char| c == '.' || c == ' ')
        .to_string();

    if sanitized.chars().count() > MAX_FILENAME_LENGTH {
        let head: String = sanitized.chars().take(MAX_FILENAME_LENGTH).collect();
        sanitized = match head.rfind(' ') {
            Some(idx) => head[..idx].to_string(),
            None => head,
        };
    }

    if sanitized.is_empty() {
        "untitled".to_string()
    } else {
        sanitized
    }
}

/// First `max` characters of `text`, never splitting a code point
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Provider throttling shows up as "blocking"/"blocked" in error text
pub fn is_rate_limit_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("blocking") || lower.contains("blocked")
}

/// Check if the current environment has the external tools batch mode relies on
pub async fn check_dependencies(yt_dlp_path: &str) -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available(yt_dlp_path).await {
        missing.push(format!(
            "{} - required for playlists and title-based filenames",
            yt_dlp_path
        ));
    }

    missing
}

/// Check if a command is available in PATH
async fn check_command_available(command: &str) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg("--version")
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}
