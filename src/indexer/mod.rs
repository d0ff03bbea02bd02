// Indexing coordinator: walk, parse, and dual-write into both stores

pub mod watcher;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::embed::{embedding_text, split_chunks, Embedder};
use crate::error::{IndexError, Result};
use crate::exclude::ExclusionFilter;
use crate::model::{normalize_path, Element, IndexReport, ProjectManifest};
use crate::parsers;
use crate::store::{chunk_record_id, ChunkMetadata, StructuredIndex, VectorIndex, VectorRecord};
use crate::walker::FileWalker;

/// Orchestrates indexing for one project. The coordinator is the sole writer
/// into both stores; writes for a single file are atomic per store.
pub struct IndexingCoordinator {
    root: PathBuf,
    config: Config,
    exclude: ExclusionFilter,
    structured: StructuredIndex,
    vectors: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
}

impl IndexingCoordinator {
    /// Open the coordinator for a project root, creating persisted state
    /// under `<root>/.codectx/` as needed.
    pub fn open(root: impl AsRef<Path>, config: Config, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let root = root
            .as_ref()
            .canonicalize()
            .map_err(|e| IndexError::io(root.as_ref(), e))?;

        let exclude = ExclusionFilter::new(config.indexing.default_exclusions, &config.indexing.exclude)
            .map_err(|e| IndexError::InvalidInput(e.to_string()))?;

        let structured = StructuredIndex::open(Config::structured_db_path(&root))?;
        let vectors = Arc::new(VectorIndex::open(Config::vector_dir(&root))?);

        Ok(Self {
            root,
            config,
            exclude,
            structured,
            vectors,
            embedder,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn structured(&self) -> &StructuredIndex {
        &self.structured
    }

    pub fn vectors(&self) -> &Arc<VectorIndex> {
        &self.vectors
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Run a full indexing pass. With `rebuild` the existing collections are
    /// cleared in place first; otherwise files replace their own elements.
    pub async fn index_project(&self, rebuild: bool, cancel: &CancellationToken) -> Result<IndexReport> {
        let started = Instant::now();
        info!("Indexing project: {}", self.root.display());

        if rebuild {
            self.structured.clear()?;
            self.vectors.clear()?;
        }

        let outcome = FileWalker::new(&self.root, &self.config, &self.exclude).walk();
        let mut report = IndexReport {
            files_skipped: outcome.skipped,
            ..Default::default()
        };

        info!("Discovered {} candidate files", outcome.files.len());

        for file in &outcome.files {
            if cancel.is_cancelled() {
                return Err(IndexError::Cancelled);
            }

            match self
                .process_file(&file.path, &file.relative_path, &file.language, cancel)
                .await
            {
                Ok(stats) => {
                    report.files_indexed += 1;
                    report.elements_indexed += stats.elements;
                    report.chunks_embedded += stats.chunks;
                    report.batches_failed += stats.failed_batches;
                }
                Err(IndexError::Cancelled) => return Err(IndexError::Cancelled),
                Err(e) => {
                    warn!("Skipping {}: {}", file.relative_path, e);
                    report.record_skip(file.relative_path.clone(), e.to_string());
                }
            }
        }

        self.update_manifest()?;

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            "Pass complete: {} files, {} elements, {} chunks ({} batches failed) in {} ms",
            report.files_indexed,
            report.elements_indexed,
            report.chunks_embedded,
            report.batches_failed,
            report.duration_ms
        );
        Ok(report)
    }

    /// Incrementally (re-)index one file through the same per-file atomic
    /// replacement as a full pass.
    pub async fn index_file(&self, path: &Path) -> Result<usize> {
        let Some(relative) = self.relative_path(path) else {
            return Err(IndexError::InvalidInput(format!(
                "{} is outside the project root",
                path.display()
            )));
        };
        let Some(language) = self.config.language_for(path).map(str::to_string) else {
            return Ok(0);
        };

        let cancel = CancellationToken::new();
        let stats = self.process_file(path, &relative, &language, &cancel).await?;
        self.update_manifest()?;
        Ok(stats.elements)
    }

    /// Remove a deleted file from both stores
    pub async fn remove_file(&self, path: &Path) -> Result<()> {
        let Some(relative) = self.relative_path(path) else {
            return Ok(());
        };
        let removed = self.structured.delete_by_file(&relative)?;
        self.vectors.delete_by_file(&relative)?;
        if removed > 0 {
            info!("Removed {} elements of deleted file {}", removed, relative);
            self.update_manifest()?;
        }
        Ok(())
    }

    /// Project-relative normalized path, if inside the root
    pub fn relative_path(&self, path: &Path) -> Option<String> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        // A deleted file no longer canonicalizes; resolve through its parent
        let resolved = absolute.canonicalize().unwrap_or_else(|_| {
            match (absolute.parent(), absolute.file_name()) {
                (Some(parent), Some(name)) => parent
                    .canonicalize()
                    .map(|p| p.join(name))
                    .unwrap_or_else(|_| absolute.clone()),
                _ => absolute.clone(),
            }
        });
        resolved
            .strip_prefix(&self.root)
            .ok()
            .map(|rel| normalize_path(&rel.to_string_lossy()))
    }

    /// Whether the watcher should care about this path
    pub fn is_indexable(&self, path: &Path) -> bool {
        let Some(relative) = self.relative_path(path) else {
            return false;
        };
        !self.exclude.should_exclude(&relative) && self.config.language_for(path).is_some()
    }

    async fn process_file(
        &self,
        path: &Path,
        relative: &str,
        language: &str,
        cancel: &CancellationToken,
    ) -> Result<FileStats> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| IndexError::io(path, e))?;
        if meta.len() > self.config.indexing.max_file_size_bytes {
            return Err(IndexError::InvalidInput(format!(
                "file size {} exceeds limit {}",
                meta.len(),
                self.config.indexing.max_file_size_bytes
            )));
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| IndexError::io(path, e))?;

        // Parsing is CPU-bound; keep it off the async workers
        let elements = {
            let content = content.clone();
            let relative_owned = relative.to_string();
            let language = language.to_string();
            tokio::task::spawn_blocking(move || {
                parsers::parse_or_fallback(&content, &relative_owned, &language)
            })
            .await
            .map_err(|e| IndexError::Parse {
                path: relative.to_string(),
                message: e.to_string(),
            })?
        };

        debug!("Parsed {}: {} elements", relative, elements.len());

        // Structured write first; an embedder failure later must not lose it
        self.structured.replace_file(relative, &elements)?;

        let (records, chunks, failed_batches) = self.embed_elements(&elements, cancel).await?;
        self.vectors.replace_file(relative, records)?;

        Ok(FileStats {
            elements: elements.len(),
            chunks,
            failed_batches,
        })
    }

    /// Chunk element contents and embed them in batches. A failing batch is
    /// retried once, then dropped with the failure recorded; other batches
    /// proceed.
    async fn embed_elements(
        &self,
        elements: &[Element],
        cancel: &CancellationToken,
    ) -> Result<(Vec<VectorRecord>, usize, usize)> {
        struct ChunkSpec {
            id: String,
            metadata: ChunkMetadata,
            text: String,
            embed_input: String,
        }

        let chunk_size = self.config.embedding.chunk_size_chars;
        let mut specs = Vec::new();

        for element in elements {
            let chunks = split_chunks(&element.content, chunk_size);
            let total = chunks.len();
            for (i, chunk) in chunks.into_iter().enumerate() {
                // A lone chunk embeds the composed description of its
                // element; split chunks embed their own slice
                let embed_input = if total == 1 {
                    embedding_text(element)
                } else {
                    chunk.clone()
                };
                specs.push(ChunkSpec {
                    id: chunk_record_id(&element.id, i, total),
                    metadata: ChunkMetadata::from_element(element),
                    text: chunk,
                    embed_input,
                });
            }
        }

        let mut records = Vec::with_capacity(specs.len());
        let mut embedded = 0usize;
        let mut failed_batches = 0usize;

        for batch in specs.chunks(self.config.embedding.batch_size) {
            if cancel.is_cancelled() {
                return Err(IndexError::Cancelled);
            }

            let texts: Vec<String> = batch.iter().map(|s| s.embed_input.clone()).collect();
            let vectors = match self.embedder.embed_batch(&texts).await {
                Ok(vectors) => Some(vectors),
                Err(first_err) => {
                    debug!("Embedder batch failed, retrying once: {}", first_err);
                    match self.embedder.embed_batch(&texts).await {
                        Ok(vectors) => Some(vectors),
                        Err(second_err) => {
                            warn!("Dropping embedding batch after retry: {}", second_err);
                            failed_batches += 1;
                            None
                        }
                    }
                }
            };

            if let Some(vectors) = vectors {
                if vectors.len() != batch.len() {
                    warn!(
                        "Embedder returned {} vectors for {} texts; dropping batch",
                        vectors.len(),
                        batch.len()
                    );
                    failed_batches += 1;
                    continue;
                }
                for (spec, vector) in batch.iter().zip(vectors.into_iter()) {
                    records.push(VectorRecord {
                        id: spec.id.clone(),
                        vector,
                        metadata: spec.metadata.clone(),
                        text: spec.text.clone(),
                    });
                    embedded += 1;
                }
            }
        }

        Ok((records, embedded, failed_batches))
    }

    fn update_manifest(&self) -> Result<()> {
        let stats = self.structured.statistics()?;
        let mut manifest = self
            .structured
            .load_manifest()?
            .unwrap_or_else(|| ProjectManifest::new(self.root.to_string_lossy()));

        manifest.last_updated = Utc::now();
        manifest.total_elements = stats.total_elements;
        manifest.file_count = stats.file_count;
        manifest.languages = stats.by_language;
        self.structured.save_manifest(&manifest)
    }
}

struct FileStats {
    elements: usize,
    chunks: usize,
    failed_batches: usize,
}

/// Result of removing persisted state for a project
#[derive(Debug, Clone, Serialize)]
pub struct CleanReport {
    pub state_dir: String,
    pub elements: u64,
    pub vector_records: usize,
    pub removed: bool,
}

/// Remove (or preview removing) persisted index state for a project root.
pub fn clean_project(root: &Path, dry_run: bool) -> Result<CleanReport> {
    let state_dir = Config::state_dir(root);

    if !state_dir.exists() {
        return Ok(CleanReport {
            state_dir: state_dir.to_string_lossy().to_string(),
            elements: 0,
            vector_records: 0,
            removed: false,
        });
    }

    // Opening a store creates its files; only inspect what already exists
    let db_path = Config::structured_db_path(root);
    let elements = if db_path.exists() {
        StructuredIndex::open(&db_path)
            .and_then(|s| s.statistics())
            .map(|s| s.total_elements)
            .unwrap_or(0)
    } else {
        0
    };
    let vector_dir = Config::vector_dir(root);
    let vector_records = if vector_dir.exists() {
        VectorIndex::open(&vector_dir).map(|v| v.len()).unwrap_or(0)
    } else {
        0
    };

    if dry_run {
        return Ok(CleanReport {
            state_dir: state_dir.to_string_lossy().to_string(),
            elements,
            vector_records,
            removed: false,
        });
    }

    std::fs::remove_dir_all(&state_dir).map_err(|e| IndexError::io(&state_dir, e))?;
    info!("Removed index state at {}", state_dir.display());

    Ok(CleanReport {
        state_dir: state_dir.to_string_lossy().to_string(),
        elements,
        vector_records,
        removed: true,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;

    use crate::embed::Embedder;
    use crate::error::{IndexError, Result};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embedder mapping known keywords onto fixed axes, so tests control
    /// similarity exactly. Unknown texts land on a shared catch-all axis.
    pub struct KeywordEmbedder {
        keywords: Vec<&'static str>,
        pub calls: AtomicUsize,
        pub fail_first: AtomicUsize,
    }

    impl KeywordEmbedder {
        pub fn new(keywords: &[&'static str]) -> Self {
            Self {
                keywords: keywords.to_vec(),
                calls: AtomicUsize::new(0),
                fail_first: AtomicUsize::new(0),
            }
        }

        /// Make the next `n` embed_batch calls fail
        pub fn fail_next(&self, n: usize) {
            self.fail_first.store(n, Ordering::SeqCst);
        }

        fn embed_one(&self, text: &str) -> Vec<f32> {
            let dim = self.keywords.len() + 1;
            let mut v = vec![0.0f32; dim];
            let lowered = text.to_lowercase();
            let mut hit = false;
            for (i, kw) in self.keywords.iter().enumerate() {
                if lowered.contains(kw) {
                    v[i] = 1.0;
                    hit = true;
                }
            }
            if !hit {
                v[dim - 1] = 1.0;
            }
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            v.iter_mut().for_each(|x| *x /= norm);
            v
        }
    }

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        fn model_id(&self) -> &str {
            "keyword-test"
        }

        fn dimension(&self) -> usize {
            self.keywords.len() + 1
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first.load(Ordering::SeqCst) > 0 {
                self.fail_first.fetch_sub(1, Ordering::SeqCst);
                return Err(IndexError::Embedding("injected failure".to_string()));
            }
            Ok(texts.iter().map(|t| self.embed_one(t)).collect())
        }
    }
}
