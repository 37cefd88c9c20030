use anyhow::{Context, Result};
use reqwest::Url;
use std::path::{Path, PathBuf};

const INVALID_FILENAME_CHARS: [char; 13] =
    ['/', '\\', '?', '%', '*', ':', '|', '"', '<', '>', ';', '=', '\n'];

/// Creates directory (and parents) if it doesn't exist
///
/// # Arguments
/// * `dir` - Path to the directory
pub fn create_dir(dir: &Path) -> Result<PathBuf> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }
    Ok(dir.to_path_buf())
}

/// Replaces characters that are not allowed in file names with spaces
pub fn sanitize_filename(input: &str) -> String {
    input
        .chars()
        .map(|c| if INVALID_FILENAME_CHARS.contains(&c) { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_owned()
}

/// Returns the last non-empty path segment of a URL
///
/// # Returns
/// `None` if the URL can't be parsed or has no file name in its path
pub fn filename_from_url(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    url.path_segments()?
        .rev()
        .find(|segment| !segment.is_empty())
        .map(str::to_owned)
}
