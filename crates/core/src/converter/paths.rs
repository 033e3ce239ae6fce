//! Output path derivation.

use std::path::{Path, PathBuf};

use super::types::normalize_extension;

/// Derives a collision-resistant artifact path inside `output_dir`.
///
/// The base name is the input's stem followed by a token made of the current
/// UTC millisecond timestamp and eight random hex characters, so concurrent
/// conversions of the same input never share a path. Only the input's name is
/// consulted, never its content.
pub fn resolve_output_path(input: &Path, target_extension: &str, output_dir: &Path) -> PathBuf {
    output_dir.join(format!(
        "{}.{}",
        unique_stem(input),
        normalize_extension(target_extension)
    ))
}

/// Input stem plus a fresh uniqueness token, without an extension.
pub fn unique_stem(input: &Path) -> String {
    format!("{}_{}", stem_of(input), unique_token())
}

/// File stem of `input`, or `file` when it has none.
pub fn stem_of(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "file".to_string())
}

fn unique_token() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", millis, &random[..8])
}
