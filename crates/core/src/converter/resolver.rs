//! Locates artifacts written by tools that do not guarantee their output name.
//!
//! The office converter may change the extension's case or decorate the base
//! name depending on version and platform, so a clean exit is only trusted
//! once a matching file is actually found.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

use super::error::ConversionError;

/// Number of directory entries included in a not-found diagnostic.
const LISTING_SAMPLE: usize = 10;

/// Entry names and modification times of a directory, taken before a tool
/// runs. Entries that are still unchanged afterwards were not written by it.
#[derive(Debug, Clone, Default)]
pub struct DirSnapshot {
    entries: HashMap<String, Option<SystemTime>>,
}

impl DirSnapshot {
    pub fn take(dir: &Path) -> Self {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries
                .flatten()
                .map(|e| {
                    let modified = e.metadata().and_then(|m| m.modified()).ok();
                    (e.file_name().to_string_lossy().into_owned(), modified)
                })
                .collect(),
            Err(_) => HashMap::new(),
        };
        Self { entries }
    }

    fn is_stale(&self, path: &Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };
        match self.entries.get(name.to_string_lossy().as_ref()) {
            None => false,
            Some(before) => {
                let now = std::fs::metadata(path).and_then(|m| m.modified()).ok();
                now == *before
            }
        }
    }
}

/// Finds the artifact named `<expected_base_name>.<expected_extension>` in
/// `output_dir`, tolerating extension case and suffixed base names.
pub fn resolve(
    expected_base_name: &str,
    expected_extension: &str,
    output_dir: &Path,
) -> Result<PathBuf, ConversionError> {
    resolve_since(
        expected_base_name,
        expected_extension,
        output_dir,
        &DirSnapshot::default(),
    )
}

/// Like [`resolve`], but only accepts files created or modified after
/// `before` was taken.
pub fn resolve_since(
    expected_base_name: &str,
    expected_extension: &str,
    output_dir: &Path,
    before: &DirSnapshot,
) -> Result<PathBuf, ConversionError> {
    let ext = expected_extension.trim_start_matches('.');
    let fresh = |path: &Path| path.is_file() && !before.is_stale(path);

    let exact = output_dir.join(format!("{expected_base_name}.{ext}"));
    if fresh(&exact) {
        return Ok(exact);
    }
    let lower = output_dir.join(format!("{expected_base_name}.{}", ext.to_lowercase()));
    if fresh(&lower) {
        return Ok(lower);
    }

    let names = list_names(output_dir);
    let suffix = format!(".{}", ext.to_lowercase());
    if let Some(path) = names
        .iter()
        .filter(|name| name.starts_with(expected_base_name) && name.to_lowercase().ends_with(&suffix))
        .map(|name| output_dir.join(name))
        .find(|path| fresh(path))
    {
        debug!(expected = %exact.display(), found = %path.display(), "Resolved output by directory scan");
        return Ok(path);
    }

    let sample: Vec<String> = names.into_iter().take(LISTING_SAMPLE).collect();
    warn!(
        expected = %exact.display(),
        directory = %output_dir.display(),
        sample = ?sample,
        "Output file not found"
    );
    Err(ConversionError::OutputNotFound {
        expected: exact.display().to_string(),
        command: None,
        directory_sample: sample,
    })
}

/// Sorted entry names of `dir`; unreadable directories yield nothing.
fn list_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect(),
        Err(e) => {
            warn!(directory = %dir.display(), error = %e, "Failed to read output directory");
            Vec::new()
        }
    };
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::ErrorKind;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"x").unwrap();
    }

    #[test]
    fn test_exact_match() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "report.pdf");
        let path = resolve("report", "pdf", dir.path()).unwrap();
        assert_eq!(path, dir.path().join("report.pdf"));
    }

    #[test]
    fn test_lowercase_variant_of_requested_extension() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "report.pdf");
        let path = resolve("report", "PDF", dir.path()).unwrap();
        assert_eq!(path, dir.path().join("report.pdf"));
    }

    #[test]
    fn test_uppercase_extension_on_disk() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "report.PDF");
        let path = resolve("report", "pdf", dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "report.PDF");
    }

    #[test]
    fn test_suffixed_base_name() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "other.pdf");
        touch(dir.path(), "report-1.pdf");
        let path = resolve("report", "pdf", dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "report-1.pdf");
    }

    #[test]
    fn test_wrong_extension_is_not_a_match() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "report.docx");
        let err = resolve("report", "pdf", dir.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutputNotFound);
    }

    #[test]
    fn test_not_found_lists_bounded_sample() {
        let dir = TempDir::new().unwrap();
        for i in 0..15 {
            touch(dir.path(), &format!("file{i:02}.txt"));
        }
        match resolve("report", "pdf", dir.path()).unwrap_err() {
            ConversionError::OutputNotFound {
                directory_sample, ..
            } => {
                assert_eq!(directory_sample.len(), 10);
                assert_eq!(directory_sample[0], "file00.txt");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_leftovers_from_earlier_runs_are_ignored() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "report.pdf");
        touch(dir.path(), "report_1700000000000-0a1b2c3d.pdf");
        let before = DirSnapshot::take(dir.path());

        let err = resolve_since("report", "pdf", dir.path(), &before).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutputNotFound);

        touch(dir.path(), "report-1.pdf");
        let path = resolve_since("report", "pdf", dir.path(), &before).unwrap();
        assert_eq!(path.file_name().unwrap(), "report-1.pdf");
    }

    #[test]
    fn test_missing_directory() {
        let err = resolve("report", "pdf", Path::new("/nonexistent/out")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutputNotFound);
    }
}
