// File discovery: directory traversal with language detection and size caps

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::config::Config;
use crate::exclude::ExclusionFilter;
use crate::model::{normalize_path, SkippedFile};

/// A file accepted into the indexing pipeline
#[derive(Debug, Clone)]
pub struct WalkedFile {
    pub path: PathBuf,
    pub relative_path: String,
    pub language: String,
}

/// Outcome of a walk: accepted files plus skipped ones with reasons
#[derive(Debug, Default)]
pub struct WalkOutcome {
    pub files: Vec<WalkedFile>,
    pub skipped: Vec<SkippedFile>,
}

/// Recursive traversal yielding candidate files by extension.
pub struct FileWalker<'a> {
    root: &'a Path,
    config: &'a Config,
    filter: &'a ExclusionFilter,
    languages: Option<HashSet<String>>,
}

impl<'a> FileWalker<'a> {
    pub fn new(root: &'a Path, config: &'a Config, filter: &'a ExclusionFilter) -> Self {
        let languages = if config.indexing.languages.is_empty() {
            None
        } else {
            Some(config.indexing.languages.iter().cloned().collect())
        };
        Self {
            root,
            config,
            filter,
            languages,
        }
    }

    /// Walk the tree and classify every regular file.
    pub fn walk(&self) -> WalkOutcome {
        let mut outcome = WalkOutcome::default();

        for entry in WalkDir::new(self.root)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = match path.strip_prefix(self.root) {
                Ok(rel) => normalize_path(&rel.to_string_lossy()),
                Err(_) => continue,
            };

            if self.filter.should_exclude(&relative) {
                continue;
            }

            let Some(language) = self.config.language_for(path) else {
                continue;
            };

            if let Some(allowed) = &self.languages {
                if !allowed.contains(language) {
                    continue;
                }
            }

            match entry.metadata() {
                Ok(meta) if meta.len() > self.config.indexing.max_file_size_bytes => {
                    debug!("Skipping oversized file: {} ({} bytes)", relative, meta.len());
                    outcome.skipped.push(SkippedFile {
                        path: relative,
                        reason: format!(
                            "file size {} exceeds limit {}",
                            meta.len(),
                            self.config.indexing.max_file_size_bytes
                        ),
                    });
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    outcome.skipped.push(SkippedFile {
                        path: relative,
                        reason: format!("metadata unavailable: {e}"),
                    });
                    continue;
                }
            }

            outcome.files.push(WalkedFile {
                path: path.to_path_buf(),
                relative_path: relative,
                language: language.to_string(),
            });
        }

        // Deterministic pass order
        outcome.files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        outcome
    }
}
