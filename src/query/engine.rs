// Query execution over both stores

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::embed::Embedder;
use crate::error::{IndexError, Result};
use crate::indexer::IndexingCoordinator;
use crate::model::{normalize_path, Element, ElementKind};
use crate::store::{
    ChunkMetadata, SemanticFilters, StructuralFilters, StructuredIndex, VectorIndex,
};

/// A semantic hit hydrated with full element metadata. The structured row
/// can lag the vector store briefly; hits then carry chunk metadata alone.
#[derive(Debug, Clone, Serialize)]
pub struct SemanticSearchResult {
    pub element_id: String,
    pub similarity: f32,
    pub chunk_text: String,
    pub metadata: ChunkMetadata,
    pub element: Option<Element>,
}

/// Context around one file: its elements, who imports it, what it imports
#[derive(Debug, Clone, Serialize)]
pub struct FileContext {
    pub file_path: String,
    pub elements: Vec<Element>,
    pub importers: Vec<Element>,
    pub importees: Vec<String>,
    pub related_files: Vec<String>,
}

/// Union of import/export edges plus dependency-manifest entries
#[derive(Debug, Clone, Serialize)]
pub struct DependencyReport {
    pub edges: Vec<DependencyEdge>,
    pub manifest_files: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DependencyEdge {
    pub file_path: String,
    pub kind: String,
    pub name: String,
    pub symbols: Vec<String>,
}

/// Read-side entry point combining both stores
pub struct QueryEngine {
    structured: StructuredIndex,
    vectors: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    root: PathBuf,
    dependency_scan: bool,
}

impl QueryEngine {
    pub fn new(
        structured: StructuredIndex,
        vectors: Arc<VectorIndex>,
        embedder: Arc<dyn Embedder>,
        root: PathBuf,
        dependency_scan: bool,
    ) -> Self {
        Self {
            structured,
            vectors,
            embedder,
            root,
            dependency_scan,
        }
    }

    /// Build an engine over a coordinator's stores
    pub fn for_coordinator(coordinator: &IndexingCoordinator) -> Self {
        Self::new(
            coordinator.structured().clone(),
            Arc::clone(coordinator.vectors()),
            Arc::clone(coordinator.embedder()),
            coordinator.root().to_path_buf(),
            coordinator.config().indexing.dependency_scan,
        )
    }

    /// Semantic search: embed the query, rank by cosine similarity, hydrate
    /// hits from the structured index.
    pub async fn search_semantic(
        &self,
        query: &str,
        threshold: f32,
        limit: usize,
        filters: &SemanticFilters,
    ) -> Result<Vec<SemanticSearchResult>> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(IndexError::InvalidInput(format!(
                "threshold must be within [0, 1], got {threshold}"
            )));
        }
        if limit == 0 {
            return Err(IndexError::InvalidInput("limit must be greater than 0".to_string()));
        }
        if query.trim().is_empty() {
            return Err(IndexError::InvalidInput("query must not be empty".to_string()));
        }

        let vectors = self.embedder.embed_batch(&[query.to_string()]).await?;
        let query_vector = vectors
            .into_iter()
            .next()
            .ok_or_else(|| IndexError::Embedding("embedder returned no vector".to_string()))?;

        let hits = self.vectors.search(&query_vector, threshold, limit, filters);
        debug!("Semantic query '{}' produced {} hits", query, hits.len());

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            let element = self.structured.get_by_id(&hit.element_id)?;
            results.push(SemanticSearchResult {
                element_id: hit.element_id,
                similarity: hit.similarity,
                chunk_text: hit.text,
                metadata: hit.metadata,
                element,
            });
        }
        Ok(results)
    }

    /// Structural search over element metadata
    pub fn search_structural(
        &self,
        pattern: &str,
        filters: &StructuralFilters,
        limit: usize,
    ) -> Result<Vec<Element>> {
        if limit == 0 {
            return Err(IndexError::InvalidInput("limit must be greater than 0".to_string()));
        }
        self.structured.search_structural(pattern, filters, limit)
    }

    /// All elements of a file plus direct importers and importees, expanded
    /// transitively up to `radius` hops.
    pub fn context_for_file(&self, file_path: &str, radius: usize) -> Result<FileContext> {
        let file_path = normalize_path(file_path);
        let elements = self.structured.get_by_file(&file_path)?;

        // Importees: what this file's imports refer to
        let mut importees: Vec<String> = Vec::new();
        for element in &elements {
            if element.kind != ElementKind::Import {
                continue;
            }
            let module = element.metadata["module"]
                .as_str()
                .map(str::to_string)
                .or_else(|| element.dependencies.first().cloned());
            if let Some(module) = module {
                if !importees.contains(&module) {
                    importees.push(module);
                }
            }
        }

        // Importers: elements elsewhere whose dependencies mention a symbol
        // this file defines, breadth-first up to the radius
        let mut importers: Vec<Element> = Vec::new();
        let mut visited: HashSet<String> = HashSet::from([file_path.clone()]);
        let mut frontier_symbols = exported_symbols(&file_path, &elements);

        for _ in 0..radius.max(1) {
            if frontier_symbols.is_empty() {
                break;
            }
            let found = self
                .structured
                .find_elements_depending_on(&frontier_symbols, &file_path)?;

            let mut next_files: Vec<String> = Vec::new();
            for element in found {
                if visited.contains(&element.file_path) {
                    continue;
                }
                next_files.push(element.file_path.clone());
                importers.push(element);
            }

            frontier_symbols = Vec::new();
            for file in next_files {
                visited.insert(file.clone());
                let file_elements = self.structured.get_by_file(&file)?;
                frontier_symbols.extend(exported_symbols(&file, &file_elements));
            }
        }

        let mut related_files: Vec<String> =
            importers.iter().map(|e| e.file_path.clone()).collect();
        related_files.sort();
        related_files.dedup();

        Ok(FileContext {
            file_path,
            elements,
            importers,
            importees,
            related_files,
        })
    }

    /// Directory/file tree with per-file element counts by kind
    pub fn project_structure(&self) -> Result<serde_json::Value> {
        let rows = self.structured.file_kind_counts()?;
        let mut root = serde_json::json!({ "directories": {}, "files": {} });

        for (file_path, kind, count) in rows {
            let parts: Vec<&str> = file_path.split('/').collect();
            let (dirs, file_name) = parts.split_at(parts.len() - 1);

            let mut node = &mut root;
            for dir in dirs {
                node = &mut node["directories"][*dir];
                if node.get("directories").is_none() {
                    node["directories"] = serde_json::json!({});
                }
                if node.get("files").is_none() {
                    node["files"] = serde_json::json!({});
                }
            }
            node["files"][file_name[0]][kind] = serde_json::json!(count);
        }

        Ok(root)
    }

    /// Union of import/require edges plus parsed dependency-manifest entries
    pub fn dependencies(&self) -> Result<DependencyReport> {
        let mut edges = Vec::new();
        for kind in [ElementKind::Import, ElementKind::Export] {
            for element in self.structured.get_by_kind(kind)? {
                edges.push(DependencyEdge {
                    file_path: element.file_path,
                    kind: kind.as_str().to_string(),
                    name: element.name,
                    symbols: element.dependencies,
                });
            }
        }
        edges.sort_by(|a, b| a.file_path.cmp(&b.file_path).then(a.name.cmp(&b.name)));

        let manifest_files = if self.dependency_scan {
            crate::exclude::scan_dependency_files(&self.root)
                .into_iter()
                .filter_map(|p| {
                    p.strip_prefix(&self.root)
                        .ok()
                        .map(|rel| normalize_path(&rel.to_string_lossy()))
                })
                .collect()
        } else {
            Vec::new()
        };

        Ok(DependencyReport {
            edges,
            manifest_files,
        })
    }

    pub fn statistics(&self) -> Result<crate::store::IndexStatistics> {
        self.structured.statistics()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Symbols a file offers to importers: the names it defines plus its stem
fn exported_symbols(file_path: &str, elements: &[Element]) -> Vec<String> {
    let mut symbols: Vec<String> = elements
        .iter()
        .filter(|e| {
            matches!(
                e.kind,
                ElementKind::Function | ElementKind::Class | ElementKind::Variable | ElementKind::Module
            )
        })
        .map(|e| e.name.clone())
        .collect();
    let stem = crate::parsers::file_stem(file_path);
    if !symbols.contains(&stem) {
        symbols.push(stem);
    }
    symbols.sort();
    symbols.dedup();
    symbols
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::indexer::test_support::KeywordEmbedder;
    use tokio_util::sync::CancellationToken;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    async fn indexed_engine(
        root: &Path,
        keywords: &[&'static str],
    ) -> (IndexingCoordinator, QueryEngine) {
        let embedder = Arc::new(KeywordEmbedder::new(keywords));
        let coordinator = IndexingCoordinator::open(root, Config::default(), embedder).unwrap();
        coordinator
            .index_project(false, &CancellationToken::new())
            .await
            .unwrap();
        let engine = QueryEngine::for_coordinator(&coordinator);
        (coordinator, engine)
    }

    #[tokio::test]
    async fn test_search_semantic_hydrates_elements() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "fib.py",
            "def fib(n):\n    \"\"\"compute fibonacci numbers\"\"\"\n    return n\n",
        );
        write(
            dir.path(),
            "db.py",
            "def connect():\n    \"\"\"connect to the database\"\"\"\n    return None\n",
        );

        let (_c, engine) = indexed_engine(dir.path(), &["fibonacci", "database"]).await;

        let results = engine
            .search_semantic("fibonacci", 0.5, 5, &SemanticFilters::default())
            .await
            .unwrap();

        assert!(!results.is_empty());
        let top = &results[0];
        assert!(top.similarity > 0.5);
        assert_eq!(top.metadata.file_path, "fib.py");
        let element = top.element.as_ref().expect("hydrated element");
        assert_eq!(element.file_path, "fib.py");
        assert!(results.iter().all(|r| r.metadata.file_path != "db.py"));
    }

    #[tokio::test]
    async fn test_search_semantic_rejects_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.py", "def f():\n    pass\n");
        let (_c, engine) = indexed_engine(dir.path(), &[]).await;

        let err = engine
            .search_semantic("x", 1.5, 5, &SemanticFilters::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::InvalidInput(_)));

        let err = engine
            .search_semantic("x", 0.5, 0, &SemanticFilters::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::InvalidInput(_)));

        let err = engine
            .search_semantic("  ", 0.5, 5, &SemanticFilters::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_search_semantic_empty_results_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.py", "def f():\n    \"\"\"plain helper\"\"\"\n    pass\n");
        let (_c, engine) = indexed_engine(dir.path(), &["zeppelin"]).await;

        let results = engine
            .search_semantic("zeppelin", 0.99, 5, &SemanticFilters::default())
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_structural_glob_ordering() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "users.py",
            "def get_user(id):\n    pass\n\ndef get_users():\n    pass\n\ndef set_user(u):\n    pass\n",
        );
        write(dir.path(), "legacy.js", "function getUser(id) {\n  return id;\n}\n");

        let (_c, engine) = indexed_engine(dir.path(), &[]).await;

        let filters = StructuralFilters {
            kind: Some(ElementKind::Function),
            ..Default::default()
        };
        let results = engine.search_structural("get_*", &filters, 10).unwrap();
        let names: Vec<&str> = results.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["get_user", "get_users"]);
    }

    #[tokio::test]
    async fn test_context_for_file() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "lib/a.py",
            "import os\n\ndef greet(name):\n    return name\n",
        );
        write(dir.path(), "main.py", "from lib.a import greet\n\ngreet(\"x\")\n");

        let (_c, engine) = indexed_engine(dir.path(), &[]).await;

        let context = engine.context_for_file("lib/a.py", 1).unwrap();
        assert!(!context.elements.is_empty());
        assert_eq!(context.importees, vec!["os".to_string()]);
        assert_eq!(context.related_files, vec!["main.py".to_string()]);
        assert!(context
            .importers
            .iter()
            .any(|e| e.kind == ElementKind::Import && e.file_path == "main.py"));
    }

    #[tokio::test]
    async fn test_context_for_unknown_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.py", "def f():\n    pass\n");
        let (_c, engine) = indexed_engine(dir.path(), &[]).await;

        let context = engine.context_for_file("missing.py", 1).unwrap();
        assert!(context.elements.is_empty());
        assert!(context.importers.is_empty());
        assert!(context.importees.is_empty());
    }

    #[tokio::test]
    async fn test_project_structure() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/app.py", "def f():\n    pass\n");
        write(dir.path(), "README.md", "# Title\nBody text.\n");

        let (_c, engine) = indexed_engine(dir.path(), &[]).await;
        let structure = engine.project_structure().unwrap();

        assert_eq!(
            structure["directories"]["src"]["files"]["app.py"]["function"],
            serde_json::json!(1)
        );
        assert_eq!(
            structure["directories"]["src"]["files"]["app.py"]["module"],
            serde_json::json!(1)
        );
        assert_eq!(
            structure["files"]["README.md"]["heading"],
            serde_json::json!(1)
        );
    }

    #[tokio::test]
    async fn test_dependencies_include_manifests_in_excluded_dirs() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "main.py", "import requests\n");
        write(dir.path(), "node_modules/pkg/index.js", "module.exports = 1;\n");
        write(dir.path(), "node_modules/pkg/package.json", "{\"name\": \"pkg\"}\n");

        let (_c, engine) = indexed_engine(dir.path(), &[]).await;

        // The excluded file itself is not indexed
        let indexed = engine
            .search_structural("", &StructuralFilters::default(), 100)
            .unwrap();
        assert!(indexed.iter().all(|e| !e.file_path.starts_with("node_modules")));

        // ...but its manifest is still surfaced by the dependency scan
        let report = engine.dependencies().unwrap();
        assert!(report
            .manifest_files
            .contains(&"node_modules/pkg/package.json".to_string()));
        assert!(report
            .edges
            .iter()
            .any(|e| e.file_path == "main.py" && e.symbols.contains(&"requests".to_string())));
    }

    #[tokio::test]
    async fn test_dependency_scan_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "package.json", "{}\n");
        write(dir.path(), "a.py", "import os\n");

        let embedder = Arc::new(KeywordEmbedder::new(&[]));
        let mut config = Config::default();
        config.indexing.dependency_scan = false;
        let coordinator = IndexingCoordinator::open(dir.path(), config, embedder).unwrap();
        coordinator
            .index_project(false, &CancellationToken::new())
            .await
            .unwrap();
        let engine = QueryEngine::for_coordinator(&coordinator);

        let report = engine.dependencies().unwrap();
        assert!(report.manifest_files.is_empty());
    }
}
