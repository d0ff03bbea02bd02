// Embedding pipeline: the Embedder seam, chunking, and embedding text

pub mod local;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Element, ElementKind};

pub use local::HashingEmbedder;

/// Pluggable embedding backend.
///
/// Contract: `embed_batch` is idempotent and order-preserving, returns one
/// unit-norm vector of fixed dimension per input text, and fails the whole
/// batch atomically.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_id(&self) -> &str;
    fn dimension(&self) -> usize;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Build an embedder from a configured model id.
pub fn embedder_for_model(model_id: &str) -> std::sync::Arc<dyn Embedder> {
    // Every id currently resolves to the local deterministic model; remote
    // backends slot in here.
    std::sync::Arc::new(HashingEmbedder::new(model_id))
}

/// Split element content into contiguous, non-overlapping chunks of at most
/// `chunk_size` characters, preferring boundaries at line breaks. A single
/// line longer than the chunk size is split mid-line.
pub fn split_chunks(content: &str, chunk_size: usize) -> Vec<String> {
    if content.is_empty() {
        return Vec::new();
    }
    if content.chars().count() <= chunk_size {
        return vec![content.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0;

    for line in content.split_inclusive('\n') {
        let line_chars = line.chars().count();

        if line_chars > chunk_size {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_chars = 0;
            }
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(chunk_size) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        if current_chars + line_chars > chunk_size && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_chars = 0;
        }
        current.push_str(line);
        current_chars += line_chars;
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Compose the text submitted to the embedder for an element: kind and name
/// first, then the docstring and a bounded slice of the content. Mirrors how
/// search queries describe code in natural language.
pub fn embedding_text(element: &Element) -> String {
    let mut parts = vec![format!("{} {}", element.kind.as_str(), element.name)];

    if let Some(stem) = std::path::Path::new(&element.file_path)
        .file_stem()
        .and_then(|s| s.to_str())
    {
        parts.push(format!("in {stem}"));
    }
    if let Some(docstring) = &element.docstring {
        if !docstring.is_empty() {
            parts.push(format!("description: {docstring}"));
        }
    }
    if let Some(signature) = &element.signature {
        parts.push(signature.clone());
    }
    if element.kind == ElementKind::Import {
        return parts.join(" ");
    }

    let head: String = element.content.chars().take(400).collect();
    if !head.is_empty() {
        parts.push(head);
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ElementIdGenerator;

    #[test]
    fn test_split_chunks_small_content() {
        assert_eq!(split_chunks("short", 100), vec!["short".to_string()]);
        assert!(split_chunks("", 100).is_empty());
    }

    #[test]
    fn test_split_chunks_prefers_line_breaks() {
        let content = "aaaa\nbbbb\ncccc\ndddd\n";
        let chunks = split_chunks(content, 10);
        assert_eq!(chunks, vec!["aaaa\nbbbb\n", "cccc\ndddd\n"]);
        // Chunks are contiguous and lossless
        assert_eq!(chunks.concat(), content);
    }

    #[test]
    fn test_split_chunks_hard_splits_long_lines() {
        let content = "x".repeat(25);
        let chunks = split_chunks(&content, 10);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 10);
        assert_eq!(chunks[2].len(), 5);
        assert_eq!(chunks.concat(), content);
    }

    #[test]
    fn test_embedding_text_includes_docstring() {
        let mut ids = ElementIdGenerator::new();
        let mut element = Element::new(
            &mut ids,
            ElementKind::Function,
            "fibonacci",
            "lib/math.py",
            1,
            5,
            "def fibonacci(n):\n    return n",
            "python",
        );
        element.docstring = Some("compute fibonacci numbers".to_string());

        let text = embedding_text(&element);
        assert!(text.starts_with("function fibonacci"));
        assert!(text.contains("compute fibonacci numbers"));
        assert!(text.contains("in math"));
    }

    #[test]
    fn test_embedding_text_import_stays_short() {
        let mut ids = ElementIdGenerator::new();
        let element = Element::new(
            &mut ids,
            ElementKind::Import,
            "os",
            "a.py",
            1,
            1,
            "import os",
            "python",
        );
        let text = embedding_text(&element);
        assert_eq!(text, "import os in a");
    }
}
