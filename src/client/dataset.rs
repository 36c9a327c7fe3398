//! # Dataset loading
//!
//! ## Responsibility
//! Collect the input texts for chunked runs from a datasets directory.
//!
//! ## Guarantees
//! - Every `*.txt` file under the directory is visited at most once;
//!   symbolic links are not followed, so link cycles cannot repeat files
//! - Results are sorted by path
//! - Empty, unreadable and non-UTF-8 files are skipped with a warning
//!
//! ## NOT Responsible For
//! - Splitting texts into chunks (that belongs to `chunking`)

use std::path::{Path, PathBuf};

use tracing::{info, warn};
use walkdir::WalkDir;

use crate::PipelineError;

/// One non-empty text file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextFile {
    /// Full path of the file.
    pub path: PathBuf,
    /// File name without directories.
    pub name: String,
    /// Size on disk, in bytes.
    pub size_bytes: u64,
    /// Contents with surrounding whitespace trimmed.
    pub content: String,
}

/// Collect every non-empty UTF-8 `*.txt` file under `dir`, recursively,
/// sorted by path.
///
/// A missing directory yields an empty list. Empty and undecodable files are
/// skipped with a warning, as are entries the walk cannot read.
///
/// # Errors
///
/// Returns [`PipelineError::Other`] if `dir` exists but cannot be listed.
///
/// # Panics
///
/// This function never panics.
pub fn read_text_files(dir: &Path) -> Result<Vec<TextFile>, PipelineError> {
    if !dir.is_dir() {
        warn!(dir = %dir.display(), "datasets directory not found");
        return Ok(Vec::new());
    }

    let mut paths = collect_txt(dir)?;
    paths.sort();

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(file = %name, error = %e, "skipping unreadable file");
                continue;
            }
        };
        let size_bytes = bytes.len() as u64;
        let content = match String::from_utf8(bytes) {
            Ok(text) => text.trim().to_string(),
            Err(_) => {
                warn!(file = %name, "skipping file that is not UTF-8");
                continue;
            }
        };
        if content.is_empty() {
            warn!(file = %name, "skipping empty file");
            continue;
        }
        info!(
            file = %name,
            size_bytes,
            chars = content.chars().count(),
            words = content.split_whitespace().count(),
            "loaded text file"
        );
        files.push(TextFile {
            path,
            name,
            size_bytes,
            content,
        });
    }
    Ok(files)
}

fn collect_txt(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                return Err(PipelineError::Other(format!(
                    "cannot list {}: {e}",
                    dir.display()
                )));
            }
            Err(e) => {
                warn!(error = %e, "skipping unreadable datasets entry");
                continue;
            }
        };
        if entry.file_type().is_file() && entry.path().extension().is_some_and(|ext| ext == "txt")
        {
            paths.push(entry.into_path());
        }
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_reads_txt_files_recursively_and_skips_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), "  second file \n").unwrap();
        fs::write(dir.path().join("a.txt"), "first").unwrap();
        fs::write(dir.path().join("empty.txt"), "   \n").unwrap();
        fs::write(dir.path().join("notes.md"), "ignored").unwrap();
        fs::write(dir.path().join("binary.txt"), [0xff, 0xfe, 0x00]).unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("c.txt"), "third").unwrap();

        let files = read_text_files(dir.path()).unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "c.txt"]);
        assert_eq!(files[1].content, "second file");
        assert_eq!(files[1].size_bytes, 15);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directory_cycle_is_not_followed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "only file").unwrap();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("loop")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("a.txt"), dir.path().join("alias.txt"))
            .unwrap();

        let files = read_text_files(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "a.txt");
    }

    #[test]
    fn test_missing_directory_yields_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let files = read_text_files(&dir.path().join("absent")).unwrap();
        assert!(files.is_empty());
    }
}
