//! Static image assets: directory scan, reference normalization, and
//! duplicate detection by content hash.

pub mod hash;
pub mod index;

use std::path::{Path, PathBuf};

use tracing::warn;
use walkdir::WalkDir;

pub use hash::hash_file;
pub use index::DuplicateIndex;

/// Image extensions the pipeline will consider.
pub const SUPPORTED_EXTS: [&str; 5] = ["jpg", "jpeg", "png", "webp", "gif"];

/// Subdirectory segment all relative image references are rooted at.
pub const ASSET_SUBDIR: &str = "places";

/// List image files directly inside `dir` (no recursion).
pub fn list_images(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Skipping unreadable directory entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.into_path();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        if matches!(ext.as_deref(), Some(e) if SUPPORTED_EXTS.contains(&e)) {
            files.push(path);
        }
    }
    files
}

/// Normalize a stored image reference to the `places/<file>` form used for
/// duplicate lookup.
///
/// Absolute URLs are external and are never rewritten, so they normalize to
/// `None`. A leading `/` and a `static/` mount prefix are stripped; a bare
/// filename is assumed to live under the asset subdirectory.
pub fn normalize_ref(raw: &str) -> Option<String> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if s.starts_with("http://") || s.starts_with("https://") {
        return None;
    }

    let mut s = s.trim_start_matches('/');
    if let Some(rest) = s.strip_prefix("static/") {
        s = rest;
    }

    if !s.starts_with(&format!("{}/", ASSET_SUBDIR)) && !s.contains('/') {
        return Some(format!("{}/{}", ASSET_SUBDIR, s));
    }
    Some(s.to_string())
}

/// Relative reference for a file name under the asset subdirectory.
pub fn rel_ref(file_name: &str) -> String {
    format!("{}/{}", ASSET_SUBDIR, file_name)
}
