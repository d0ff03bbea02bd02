// Core element model shared by parsers, stores and the query layer

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upper bound on stored element content. Larger elements keep their span but
/// the stored slice is cut here; embedding chunks are produced from the
/// bounded slice.
pub const MAX_ELEMENT_CONTENT: usize = 65_536;

/// Kinds of elements produced by the parsers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Function,
    Method,
    Class,
    Module,
    Variable,
    Import,
    Export,
    Heading,
    Section,
    Block,
    Document,
}

impl ElementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::Function => "function",
            ElementKind::Method => "method",
            ElementKind::Class => "class",
            ElementKind::Module => "module",
            ElementKind::Variable => "variable",
            ElementKind::Import => "import",
            ElementKind::Export => "export",
            ElementKind::Heading => "heading",
            ElementKind::Section => "section",
            ElementKind::Block => "block",
            ElementKind::Document => "document",
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        match s {
            "function" => Ok(ElementKind::Function),
            "method" => Ok(ElementKind::Method),
            "class" => Ok(ElementKind::Class),
            "module" => Ok(ElementKind::Module),
            "variable" => Ok(ElementKind::Variable),
            "import" => Ok(ElementKind::Import),
            "export" => Ok(ElementKind::Export),
            "heading" => Ok(ElementKind::Heading),
            "section" => Ok(ElementKind::Section),
            "block" => Ok(ElementKind::Block),
            "document" => Ok(ElementKind::Document),
            _ => anyhow::bail!("Unknown element kind: {}", s),
        }
    }
}

/// A structural element extracted from a source or document file.
///
/// Identity is deterministic: re-parsing an unchanged file yields the same
/// ids in the same order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Element {
    pub id: String,
    pub kind: ElementKind,
    pub name: String,
    pub file_path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub content: String,
    pub language: String,
    pub parent_id: Option<String>,
    pub children_ids: Vec<String>,
    pub signature: Option<String>,
    pub docstring: Option<String>,
    pub dependencies: Vec<String>,
    pub metadata: serde_json::Value,
}

impl Element {
    /// Construct an element with an id minted by the given generator.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ids: &mut ElementIdGenerator,
        kind: ElementKind,
        name: impl Into<String>,
        file_path: &str,
        start_line: u32,
        end_line: u32,
        content: impl Into<String>,
        language: &str,
    ) -> Self {
        let name = name.into();
        let id = ids.mint(file_path, kind, &name, start_line);
        Self {
            id,
            kind,
            name,
            file_path: file_path.to_string(),
            start_line,
            end_line,
            content: bound_content(&content.into()),
            language: language.to_string(),
            parent_id: None,
            children_ids: Vec::new(),
            signature: None,
            docstring: None,
            dependencies: Vec::new(),
            metadata: serde_json::json!({}),
        }
    }
}

/// Mints deterministic element ids.
///
/// An id is the blake3 hash of `(file_path, kind, name, start_line)`. Two
/// elements with the same key in one file (nested lambdas, duplicated
/// headings) disambiguate by appending a within-file ordinal to the hash
/// input, so ids stay stable as long as the parser emits elements in
/// document order.
#[derive(Debug, Default)]
pub struct ElementIdGenerator {
    seen: HashMap<(ElementKind, String, u32), u32>,
}

impl ElementIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mint(&mut self, file_path: &str, kind: ElementKind, name: &str, start_line: u32) -> String {
        let ordinal = self
            .seen
            .entry((kind, name.to_string(), start_line))
            .and_modify(|n| *n += 1)
            .or_insert(0);

        let mut input = format!("{}|{}|{}|{}", file_path, kind.as_str(), name, start_line);
        if *ordinal > 0 {
            input.push_str(&format!("#{}", ordinal));
        }
        blake3::hash(input.as_bytes()).to_hex().to_string()
    }
}

/// Normalise a repository-relative path to forward slashes.
pub fn normalize_path(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    normalized
        .strip_prefix("./")
        .map(str::to_string)
        .unwrap_or(normalized)
}

/// Cut content at the storage bound, respecting char boundaries.
pub fn bound_content(content: &str) -> String {
    if content.len() <= MAX_ELEMENT_CONTENT {
        return content.to_string();
    }
    let mut cut = MAX_ELEMENT_CONTENT;
    while !content.is_char_boundary(cut) {
        cut -= 1;
    }
    content[..cut].to_string()
}

/// Per-project manifest stored alongside the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectManifest {
    pub root_path: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub total_elements: u64,
    pub file_count: u64,
    pub languages: HashMap<String, u64>,
}

impl ProjectManifest {
    pub fn new(root_path: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            root_path: root_path.into(),
            created_at: now,
            last_updated: now,
            total_elements: 0,
            file_count: 0,
            languages: HashMap::new(),
        }
    }
}

/// A file skipped during a pass, with the reason recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

/// Report produced by a full or incremental indexing pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexReport {
    pub files_indexed: usize,
    pub files_skipped: Vec<SkippedFile>,
    pub elements_indexed: usize,
    pub chunks_embedded: usize,
    pub batches_failed: usize,
    pub duration_ms: u64,
}

impl IndexReport {
    pub fn record_skip(&mut self, path: impl Into<String>, reason: impl Into<String>) {
        self.files_skipped.push(SkippedFile {
            path: path.into(),
            reason: reason.into(),
        });
    }
}
