// Vector index: content-addressed embedding store with cosine top-K search

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{IndexError, Result};
use crate::model::{Element, ElementKind};

/// Metadata carried by every chunk record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Owning element, even when the record id carries a chunk suffix
    pub element_id: String,
    pub kind: ElementKind,
    pub name: String,
    pub file_path: String,
    pub language: String,
    pub start_line: u32,
    pub end_line: u32,
}

impl ChunkMetadata {
    pub fn from_element(element: &Element) -> Self {
        Self {
            element_id: element.id.clone(),
            kind: element.kind,
            name: element.name.clone(),
            file_path: element.file_path.clone(),
            language: element.language.clone(),
            start_line: element.start_line,
            end_line: element.end_line,
        }
    }
}

/// One stored chunk: id, embedding, metadata and the chunk text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
    pub text: String,
}

/// Record id for the n-th chunk of an element: the element id itself for a
/// single chunk, `<id>#<n>` otherwise.
pub fn chunk_record_id(element_id: &str, index: usize, total: usize) -> String {
    if total <= 1 {
        element_id.to_string()
    } else {
        format!("{element_id}#{index}")
    }
}

/// Post-filters applied to semantic candidates
#[derive(Debug, Clone, Default)]
pub struct SemanticFilters {
    pub kind: Option<ElementKind>,
    pub language: Option<String>,
    pub path_prefix: Option<String>,
}

/// A semantic search hit: best-scoring chunk per element
#[derive(Debug, Clone, Serialize)]
pub struct SemanticHit {
    pub element_id: String,
    pub chunk_id: String,
    pub similarity: f32,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// In-process vector store persisted as a JSON-lines snapshot under the
/// vectors directory. Records are keyed by chunk id; search is exhaustive
/// cosine over unit-norm vectors.
pub struct VectorIndex {
    dir: PathBuf,
    records: RwLock<HashMap<String, VectorRecord>>,
}

const SNAPSHOT_FILE: &str = "records.jsonl";

impl VectorIndex {
    /// Open (or create) the store, loading any existing snapshot
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| IndexError::io(&dir, e))?;

        let snapshot = dir.join(SNAPSHOT_FILE);
        let mut records = HashMap::new();
        if snapshot.exists() {
            let file = std::fs::File::open(&snapshot).map_err(|e| IndexError::io(&snapshot, e))?;
            for line in BufReader::new(file).lines() {
                let line = line.map_err(|e| IndexError::io(&snapshot, e))?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<VectorRecord>(&line) {
                    Ok(record) => {
                        records.insert(record.id.clone(), record);
                    }
                    Err(e) => warn!("Skipping corrupt vector record: {}", e),
                }
            }
            info!("Loaded {} vector records from {}", records.len(), snapshot.display());
        }

        Ok(Self {
            dir,
            records: RwLock::new(records),
        })
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Replace every record of one file atomically, then persist
    pub fn replace_file(&self, file_path: &str, records: Vec<VectorRecord>) -> Result<()> {
        {
            let mut map = self.records.write();
            map.retain(|_, r| r.metadata.file_path != file_path);
            for record in records {
                map.insert(record.id.clone(), record);
            }
        }
        self.persist()
    }

    /// Remove every record of one file, then persist
    pub fn delete_by_file(&self, file_path: &str) -> Result<usize> {
        let removed = {
            let mut map = self.records.write();
            let before = map.len();
            map.retain(|_, r| r.metadata.file_path != file_path);
            before - map.len()
        };
        if removed > 0 {
            self.persist()?;
        }
        Ok(removed)
    }

    /// Clear the collection in place rather than dropping it, so external
    /// handles stay valid
    pub fn clear(&self) -> Result<usize> {
        let removed = {
            let mut map = self.records.write();
            let count = map.len();
            map.clear();
            count
        };
        self.persist()?;
        debug!("Cleared {} vector records", removed);
        Ok(removed)
    }

    /// Top-K nearest neighbours above a similarity threshold.
    ///
    /// Candidates are the top `max(limit*3, 10)` by cosine similarity; the
    /// metadata post-filters and the threshold are applied next, then hits
    /// deduplicate by owning element keeping the best-scoring chunk. Ties
    /// break on `(file_path, start_line)`.
    pub fn search(
        &self,
        query: &[f32],
        threshold: f32,
        limit: usize,
        filters: &SemanticFilters,
    ) -> Vec<SemanticHit> {
        let map = self.records.read();

        let mut scored: Vec<(&VectorRecord, f32)> = map
            .values()
            .map(|r| (r, cosine_similarity(query, &r.vector)))
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.metadata.file_path.cmp(&b.0.metadata.file_path))
                .then_with(|| a.0.metadata.start_line.cmp(&b.0.metadata.start_line))
        });

        let candidate_count = (limit * 3).max(10);
        scored.truncate(candidate_count);

        let mut best_per_element: HashMap<&str, (&VectorRecord, f32)> = HashMap::new();
        let mut order: Vec<&str> = Vec::new();
        for (record, similarity) in scored {
            if similarity < threshold {
                continue;
            }
            if let Some(kind) = filters.kind {
                if record.metadata.kind != kind {
                    continue;
                }
            }
            if let Some(language) = &filters.language {
                if &record.metadata.language != language {
                    continue;
                }
            }
            if let Some(prefix) = &filters.path_prefix {
                if !record.metadata.file_path.starts_with(prefix.as_str()) {
                    continue;
                }
            }

            let element_id = record.metadata.element_id.as_str();
            // First occurrence wins: candidates arrive best-first
            if !best_per_element.contains_key(element_id) {
                best_per_element.insert(element_id, (record, similarity));
                order.push(element_id);
            }
        }

        order
            .into_iter()
            .take(limit)
            .map(|element_id| {
                let (record, similarity) = best_per_element[element_id];
                SemanticHit {
                    element_id: record.metadata.element_id.clone(),
                    chunk_id: record.id.clone(),
                    similarity,
                    text: record.text.clone(),
                    metadata: record.metadata.clone(),
                }
            })
            .collect()
    }

    /// Write the snapshot atomically (write-then-rename)
    fn persist(&self) -> Result<()> {
        let snapshot = self.dir.join(SNAPSHOT_FILE);
        let tmp = self.dir.join(format!("{SNAPSHOT_FILE}.tmp"));

        {
            let file = std::fs::File::create(&tmp).map_err(|e| IndexError::io(&tmp, e))?;
            let mut writer = std::io::BufWriter::new(file);
            let map = self.records.read();
            let mut entries: Vec<&VectorRecord> = map.values().collect();
            entries.sort_by(|a, b| a.id.cmp(&b.id));
            for record in entries {
                let line = serde_json::to_string(record)?;
                writeln!(writer, "{line}").map_err(|e| IndexError::io(&tmp, e))?;
            }
            writer.flush().map_err(|e| IndexError::io(&tmp, e))?;
        }

        std::fs::rename(&tmp, &snapshot).map_err(|e| IndexError::io(&snapshot, e))?;
        Ok(())
    }
}

/// Cosine similarity mapped into [0, 1]: embeddings are unit-norm, so the
/// dot product is the cosine; negative correlation clamps to zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    dot.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(id: &str, element_id: &str, file: &str, line: u32, vector: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            vector,
            metadata: ChunkMetadata {
                element_id: element_id.to_string(),
                kind: ElementKind::Function,
                name: format!("fn_{element_id}"),
                file_path: file.to_string(),
                language: "python".to_string(),
                start_line: line,
                end_line: line + 3,
            },
            text: format!("chunk text for {id}"),
        }
    }

    fn axis(i: usize) -> Vec<f32> {
        let mut v = vec![0.0; 4];
        v[i] = 1.0;
        v
    }

    #[test]
    fn test_chunk_record_id() {
        assert_eq!(chunk_record_id("abc", 0, 1), "abc");
        assert_eq!(chunk_record_id("abc", 0, 3), "abc#0");
        assert_eq!(chunk_record_id("abc", 2, 3), "abc#2");
    }

    #[test]
    fn test_search_orders_by_similarity() {
        let dir = tempdir().unwrap();
        let index = VectorIndex::open(dir.path()).unwrap();

        index
            .replace_file(
                "a.py",
                vec![
                    record("e1", "e1", "a.py", 1, axis(0)),
                    record("e2", "e2", "a.py", 5, vec![0.8, 0.6, 0.0, 0.0]),
                    record("e3", "e3", "a.py", 9, axis(1)),
                ],
            )
            .unwrap();

        let hits = index.search(&axis(0), 0.5, 5, &SemanticFilters::default());
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].element_id, "e1");
        assert!(hits[0].similarity > 0.99);
        assert_eq!(hits[1].element_id, "e2");
        assert!((hits[1].similarity - 0.8).abs() < 1e-5);
    }

    #[test]
    fn test_threshold_excludes() {
        let dir = tempdir().unwrap();
        let index = VectorIndex::open(dir.path()).unwrap();

        index
            .replace_file(
                "a.py",
                vec![
                    record("fib", "fib", "a.py", 1, axis(0)),
                    record("db", "db", "a.py", 9, axis(1)),
                ],
            )
            .unwrap();

        let hits = index.search(&axis(0), 0.5, 5, &SemanticFilters::default());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].element_id, "fib");
    }

    #[test]
    fn test_dedupe_keeps_best_chunk() {
        let dir = tempdir().unwrap();
        let index = VectorIndex::open(dir.path()).unwrap();

        index
            .replace_file(
                "a.py",
                vec![
                    record("e1#0", "e1", "a.py", 1, vec![0.6, 0.8, 0.0, 0.0]),
                    record("e1#1", "e1", "a.py", 1, axis(0)),
                ],
            )
            .unwrap();

        let hits = index.search(&axis(0), 0.1, 5, &SemanticFilters::default());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, "e1#1");
        assert!(hits[0].similarity > 0.99);
    }

    #[test]
    fn test_filters() {
        let dir = tempdir().unwrap();
        let index = VectorIndex::open(dir.path()).unwrap();

        let mut js = record("e1", "e1", "web/app.js", 1, axis(0));
        js.metadata.language = "javascript".to_string();
        let py = record("e2", "e2", "srv/app.py", 1, axis(0));
        index.replace_file("web/app.js", vec![js]).unwrap();
        index.replace_file("srv/app.py", vec![py]).unwrap();

        let filters = SemanticFilters {
            language: Some("javascript".to_string()),
            ..Default::default()
        };
        let hits = index.search(&axis(0), 0.5, 5, &filters);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata.file_path, "web/app.js");

        let filters = SemanticFilters {
            path_prefix: Some("srv/".to_string()),
            ..Default::default()
        };
        let hits = index.search(&axis(0), 0.5, 5, &filters);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata.file_path, "srv/app.py");
    }

    #[test]
    fn test_tie_break_on_path_then_line() {
        let dir = tempdir().unwrap();
        let index = VectorIndex::open(dir.path()).unwrap();

        index
            .replace_file("b.py", vec![record("e2", "e2", "b.py", 1, axis(0))])
            .unwrap();
        index
            .replace_file(
                "a.py",
                vec![
                    record("e3", "e3", "a.py", 9, axis(0)),
                    record("e1", "e1", "a.py", 2, axis(0)),
                ],
            )
            .unwrap();

        let hits = index.search(&axis(0), 0.5, 5, &SemanticFilters::default());
        let keys: Vec<(&str, u32)> = hits
            .iter()
            .map(|h| (h.metadata.file_path.as_str(), h.metadata.start_line))
            .collect();
        assert_eq!(keys, vec![("a.py", 2), ("a.py", 9), ("b.py", 1)]);
    }

    #[test]
    fn test_replace_file_removes_stale_records() {
        let dir = tempdir().unwrap();
        let index = VectorIndex::open(dir.path()).unwrap();

        index
            .replace_file("x.py", vec![record("old", "old", "x.py", 1, axis(0))])
            .unwrap();
        index
            .replace_file("x.py", vec![record("new", "new", "x.py", 1, axis(1))])
            .unwrap();

        assert_eq!(index.len(), 1);
        let hits = index.search(&axis(0), 0.9, 5, &SemanticFilters::default());
        assert!(hits.is_empty());
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempdir().unwrap();
        {
            let index = VectorIndex::open(dir.path()).unwrap();
            index
                .replace_file("a.py", vec![record("e1", "e1", "a.py", 1, axis(0))])
                .unwrap();
        }

        let reopened = VectorIndex::open(dir.path()).unwrap();
        assert_eq!(reopened.len(), 1);
        let hits = reopened.search(&axis(0), 0.5, 5, &SemanticFilters::default());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].element_id, "e1");
    }

    #[test]
    fn test_clear_in_place() {
        let dir = tempdir().unwrap();
        let index = VectorIndex::open(dir.path()).unwrap();
        index
            .replace_file("a.py", vec![record("e1", "e1", "a.py", 1, axis(0))])
            .unwrap();

        assert_eq!(index.clear().unwrap(), 1);
        assert!(index.is_empty());

        // Store remains usable after a clear
        index
            .replace_file("a.py", vec![record("e2", "e2", "a.py", 1, axis(1))])
            .unwrap();
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        // Opposite vectors clamp to zero
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
        // Mismatched dimensions are not an error
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }
}
