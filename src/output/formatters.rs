use crate::transcript::{ScrapedSegment, TimedSegment, TranscriptBody, TranscriptResult};
use crate::utils::format_timestamp;

/// A silence longer than this may start a new paragraph
pub const PARAGRAPH_GAP_SECS: f64 = 2.0;

/// Paragraphs are only closed once they are longer than this many characters
pub const PARAGRAPH_MIN_CHARS: usize = 100;

/// How the transcript body is laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    /// One `**[time]** text` line per segment
    pub timestamps: bool,

    /// Regroup text into paragraphs; otherwise emit a single flat block
    pub paragraphs: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            timestamps: false,
            paragraphs: true,
        }
    }
}

/// Render a transcript as a markdown document
pub fn format_as_markdown(result: &TranscriptResult, options: &FormatOptions) -> String {
    let mut lines = header_lines(result);

    match &result.body {
        TranscriptBody::Api { segments, .. } => lines.extend(api_body(segments, options)),
        TranscriptBody::Browser { segments } => lines.extend(browser_body(segments, options)),
    }

    lines.join("\n")
}

fn header_lines(result: &TranscriptResult) -> Vec<String> {
    let mut lines = vec![
        "# YouTube Transcript\n".to_string(),
        format!("**Video ID:** {}", result.video.id()),
        format!("**URL:** {}", result.video.watch_url()),
    ];

    match &result.body {
        TranscriptBody::Api {
            language_code,
            is_generated,
            ..
        } => {
            lines.push(format!("**Language:** {}", language_code));
            lines.push(format!(
                "**Generated:** {}\n",
                if *is_generated { "Yes" } else { "No" }
            ));
        }
        TranscriptBody::Browser { .. } => {
            lines.push("**Source:** Playwright Fallback\n".to_string());
        }
    }

    lines.push("---\n".to_string());
    lines
}

fn api_body(segments: &[TimedSegment], options: &FormatOptions) -> Vec<String> {
    if options.timestamps {
        return segments
            .iter()
            .map(|s| format!("**[{}]** {}\n", format_timestamp(s.start), s.text.trim()))
            .collect();
    }

    if options.paragraphs {
        paragraphs_by_timing(segments)
            .into_iter()
            .map(|p| p + "\n")
            .collect()
    } else {
        vec![flat_text(segments.iter().map(|s| s.text.as_str()))]
    }
}

fn browser_body(segments: &[ScrapedSegment], options: &FormatOptions) -> Vec<String> {
    if options.timestamps {
        return segments
            .iter()
            .map(|s| format!("**[{}]** {}\n", s.timestamp, s.text))
            .collect();
    }

    if options.paragraphs {
        paragraphs_by_sentence(segments.iter().map(|s| s.text.as_str()))
            .into_iter()
            .map(|p| p + "\n")
            .collect()
    } else {
        vec![flat_text(segments.iter().map(|s| s.text.as_str()))]
    }
}

fn ends_sentence(text: &str) -> bool {
    text.ends_with(['.', '!', '?'])
}

fn joined_len(parts: &[&str]) -> usize {
    let chars: usize = parts.iter().map(|p| p.chars().count()).sum();
    chars + parts.len().saturating_sub(1)
}

/// Group timed segments into paragraphs.
///
/// A paragraph closes after a segment when (the silence before it exceeds
/// [`PARAGRAPH_GAP_SECS`] or it ends a sentence) and the paragraph is longer than
/// [`PARAGRAPH_MIN_CHARS`]. Whatever is left at the end becomes the last paragraph.
pub fn paragraphs_by_timing(segments: &[TimedSegment]) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut last_end = 0.0;

    for segment in segments {
        let text = segment.text.trim();
        let gap = segment.start - last_end;

        current.push(text);

        if (gap > PARAGRAPH_GAP_SECS || ends_sentence(text))
            && joined_len(&current) > PARAGRAPH_MIN_CHARS
        {
            paragraphs.push(current.join(" "));
            current.clear();
        }

        last_end = segment.end();
    }

    if !current.is_empty() {
        paragraphs.push(current.join(" "));
    }

    paragraphs
}

/// Group untimed text into paragraphs at sentence ends past [`PARAGRAPH_MIN_CHARS`]
pub fn paragraphs_by_sentence<'a>(texts: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for text in texts {
        current.push(text);

        if ends_sentence(text) && joined_len(&current) > PARAGRAPH_MIN_CHARS {
            paragraphs.push(current.join(" "));
            current.clear();
        }
    }

    if !current.is_empty() {
        paragraphs.push(current.join(" "));
    }

    paragraphs
}

fn flat_text<'a>(texts: impl Iterator<Item = &'a str>) -> String {
    texts.map(str::trim).collect::<Vec<_>>().join(" ")
}
