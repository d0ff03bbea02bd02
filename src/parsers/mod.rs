// Language parsers and the dispatch registry

pub mod generic;
pub mod markdown;
pub mod pattern;
pub mod python;

use tracing::warn;

use crate::error::Result;
use crate::model::{Element, ElementIdGenerator, ElementKind};

pub use generic::GenericParser;
pub use markdown::MarkdownParser;
pub use pattern::PatternParser;
pub use python::PythonParser;

/// Languages routed to the pattern (curly-brace) parser
const PATTERN_LANGUAGES: &[&str] = &[
    "javascript",
    "typescript",
    "java",
    "c",
    "cpp",
    "csharp",
    "go",
    "rust",
    "php",
    "swift",
    "kotlin",
    "scala",
];

/// The parser registry is a lookup over a closed set of variants rather than
/// trait objects; parsers are pure and bounded.
pub enum LanguageParser {
    Structured(PythonParser),
    Pattern(PatternParser),
    Markdown(MarkdownParser),
    Generic(GenericParser),
}

impl LanguageParser {
    /// Select the parser for a detected language tag
    pub fn for_language(language: &str) -> Self {
        match language {
            "python" => Self::Structured(PythonParser::new()),
            "markdown" => Self::Markdown(MarkdownParser::new()),
            lang if PATTERN_LANGUAGES.contains(&lang) => Self::Pattern(PatternParser::new()),
            _ => Self::Generic(GenericParser::new()),
        }
    }

    /// Parse file content into an ordered element sequence.
    pub fn parse(&self, content: &str, file_path: &str, language: &str) -> Result<Vec<Element>> {
        if content.trim().is_empty() {
            return Ok(vec![empty_file_element(content, file_path, language)]);
        }
        match self {
            Self::Structured(p) => p.parse(content, file_path),
            Self::Pattern(p) => Ok(p.parse(content, file_path, language)),
            Self::Markdown(p) => Ok(p.parse(content, file_path)),
            Self::Generic(p) => Ok(p.parse(content, file_path, language)),
        }
    }
}

/// Parse a file, degrading to a whole-file `document` element when the
/// language parser fails. The failure is recorded, not fatal.
pub fn parse_or_fallback(content: &str, file_path: &str, language: &str) -> Vec<Element> {
    let parser = LanguageParser::for_language(language);
    match parser.parse(content, file_path, language) {
        Ok(elements) => elements,
        Err(e) => {
            warn!("Parser failed for {} ({}): {}; indexing as document", file_path, language, e);
            vec![fallback_document(content, file_path, language)]
        }
    }
}

/// An empty file still produces exactly one element.
fn empty_file_element(content: &str, file_path: &str, language: &str) -> Element {
    let kind = match language {
        "python" => ElementKind::Module,
        _ => ElementKind::Document,
    };
    let mut ids = ElementIdGenerator::new();
    Element::new(&mut ids, kind, file_stem(file_path), file_path, 1, 1, content, language)
}

fn fallback_document(content: &str, file_path: &str, language: &str) -> Element {
    let mut ids = ElementIdGenerator::new();
    let end_line = content.lines().count().max(1) as u32;
    Element::new(
        &mut ids,
        ElementKind::Document,
        file_stem(file_path),
        file_path,
        1,
        end_line,
        content,
        language,
    )
}

/// Stem of a (normalized, relative) file path
pub fn file_stem(file_path: &str) -> String {
    std::path::Path::new(file_path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| file_path.to_string())
}
