//! Duplicate asset index: content hash -> files, duplicate -> canonical.

use std::path::{Path, PathBuf};

use hashbrown::HashMap;
use tracing::{debug, warn};

use super::{hash_file, list_images, rel_ref};

/// Index of byte-identical image files in an asset directory.
///
/// Building the index twice over an unchanged directory yields the same
/// canonical mapping: groups are keyed by content hash and the canonical
/// member is the lexicographically smallest file name, case-insensitive.
#[derive(Debug, Default)]
pub struct DuplicateIndex {
    canonical_by_hash: HashMap<String, PathBuf>,
    /// duplicate `places/<file>` -> canonical `places/<file>`
    remap: HashMap<String, String>,
}

impl DuplicateIndex {
    pub fn build(dir: &Path) -> Self {
        let mut by_hash: HashMap<String, Vec<PathBuf>> = HashMap::new();

        for path in list_images(dir) {
            match hash_file(&path) {
                Ok(digest) => by_hash.entry(digest).or_default().push(path),
                Err(e) => {
                    // An unreadable file is never treated as anyone's duplicate.
                    warn!("Skipping unreadable asset {}: {}", path.display(), e);
                }
            }
        }

        let mut canonical_by_hash = HashMap::new();
        let mut remap = HashMap::new();

        for (digest, mut paths) in by_hash {
            paths.sort_by_key(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().to_lowercase())
                    .unwrap_or_default()
            });
            let canonical = paths[0].clone();
            let canonical_rel = rel_ref(&canonical.file_name().unwrap_or_default().to_string_lossy());

            for dup in &paths[1..] {
                let dup_rel = rel_ref(&dup.file_name().unwrap_or_default().to_string_lossy());
                debug!("Duplicate asset {} -> {}", dup_rel, canonical_rel);
                remap.insert(dup_rel, canonical_rel.clone());
            }
            canonical_by_hash.insert(digest, canonical);
        }

        Self {
            canonical_by_hash,
            remap,
        }
    }

    /// Canonical reference for a normalized `places/<file>` reference, when
    /// the reference points at a non-canonical duplicate.
    pub fn canonical_for(&self, rel: &str) -> Option<&str> {
        self.remap.get(rel).map(String::as_str)
    }

    /// Non-canonical file names, sorted, relative to the asset directory.
    pub fn duplicate_files(&self) -> Vec<String> {
        let mut files: Vec<String> = self
            .remap
            .keys()
            .filter_map(|rel| rel.rsplit('/').next().map(str::to_string))
            .collect();
        files.sort();
        files
    }

    pub fn duplicate_count(&self) -> usize {
        self.remap.len()
    }

    pub fn distinct_hashes(&self) -> usize {
        self.canonical_by_hash.len()
    }
}
