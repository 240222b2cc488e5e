use std::path::Path;

use crate::transcript::TranscriptResult;
use crate::Result;

pub mod formatters;

pub use formatters::*;

/// Save transcript markdown to file
///
/// The document is fully rendered before the file is opened.
pub fn save_to_file(result: &TranscriptResult, path: &Path, options: &FormatOptions) -> Result<()> {
    let content = format_as_markdown(result, options);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs_err::create_dir_all(parent)?;
    }
    fs_err::write(path, content)?;

    tracing::debug!("Wrote {} segments to {}", result.segment_count(), path.display());
    Ok(())
}

/// Print transcript markdown to stdout
pub fn print_to_console(result: &TranscriptResult, options: &FormatOptions) {
    println!("{}", format_as_markdown(result, options));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::fixtures;

    #[test]
    fn test_save_to_file_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.md");
        let result = fixtures::api_result(&fixtures::video());

        save_to_file(&result, &path, &FormatOptions::default()).unwrap();

        let written = fs_err::read_to_string(&path).unwrap();
        assert!(written.starts_with("# YouTube Transcript\n"));
        assert!(written.ends_with("Hello there.\n"));
    }
}
