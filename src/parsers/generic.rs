// Generic fallback parser for languages without a specialised implementation

use crate::model::{Element, ElementIdGenerator, ElementKind};
use crate::parsers::file_stem;

/// Fallback parser: one `document` element spanning the whole file, plus
/// `block` elements for heuristically detected comment/doc blocks.
pub struct GenericParser;

/// Minimum consecutive comment lines to count as a block
const MIN_BLOCK_LINES: usize = 2;

const LINE_COMMENT_PREFIXES: &[&str] = &["//", "#", "--", ";;"];

impl GenericParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, content: &str, file_path: &str, language: &str) -> Vec<Element> {
        let lines: Vec<&str> = content.lines().collect();
        let mut ids = ElementIdGenerator::new();
        let mut elements = Vec::new();

        let document = Element::new(
            &mut ids,
            ElementKind::Document,
            file_stem(file_path),
            file_path,
            1,
            lines.len().max(1) as u32,
            content,
            language,
        );
        let document_id = document.id.clone();
        elements.push(document);

        for (start, end) in comment_blocks(&lines) {
            let body = lines[start..=end].join("\n");
            let name = block_name(lines[start]);
            let mut block = Element::new(
                &mut ids,
                ElementKind::Block,
                name,
                file_path,
                start as u32 + 1,
                end as u32 + 1,
                body,
                language,
            );
            block.parent_id = Some(document_id.clone());
            let block_id = block.id.clone();
            elements.push(block);
            elements[0].children_ids.push(block_id);
        }

        elements
    }
}

impl Default for GenericParser {
    fn default() -> Self {
        Self::new()
    }
}

fn is_comment_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    LINE_COMMENT_PREFIXES.iter().any(|p| trimmed.starts_with(p))
        || trimmed.starts_with("/*")
        || trimmed.starts_with('*')
}

/// Runs of consecutive comment lines, inclusive index ranges
fn comment_blocks(lines: &[&str]) -> Vec<(usize, usize)> {
    let mut blocks = Vec::new();
    let mut run_start: Option<usize> = None;

    for (i, line) in lines.iter().enumerate() {
        if is_comment_line(line) {
            run_start.get_or_insert(i);
        } else if let Some(start) = run_start.take() {
            if i - start >= MIN_BLOCK_LINES {
                blocks.push((start, i - 1));
            }
        }
    }
    if let Some(start) = run_start {
        if lines.len() - start >= MIN_BLOCK_LINES {
            blocks.push((start, lines.len() - 1));
        }
    }

    blocks
}

/// First comment line with markers stripped, truncated for use as a name
fn block_name(first_line: &str) -> String {
    let text = first_line
        .trim_start()
        .trim_start_matches(|c: char| "/#*-;! ".contains(c))
        .trim();
    let name: String = text.chars().take(60).collect();
    if name.is_empty() {
        "comment".to_string()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Vec<Element> {
        GenericParser::new().parse(content, "conf/settings.yaml", "yaml")
    }

    #[test]
    fn test_document_element() {
        let elements = parse("key: value\nother: 2\n");
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].kind, ElementKind::Document);
        assert_eq!(elements[0].name, "settings");
        assert_eq!(elements[0].start_line, 1);
        assert_eq!(elements[0].end_line, 2);
    }

    #[test]
    fn test_comment_block_extraction() {
        let source = "# Main settings file\n# controls the runtime\nkey: value\n# single trailing comment\n";
        let elements = parse(source);

        let blocks: Vec<&Element> =
            elements.iter().filter(|e| e.kind == ElementKind::Block).collect();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].start_line, 1);
        assert_eq!(blocks[0].end_line, 2);
        assert_eq!(blocks[0].name, "Main settings file");
        assert_eq!(blocks[0].parent_id.as_deref(), Some(elements[0].id.as_str()));
        assert!(elements[0].children_ids.contains(&blocks[0].id));
    }

    #[test]
    fn test_single_comment_line_is_not_a_block() {
        let elements = parse("# lone comment\nkey: value\n");
        assert!(!elements.iter().any(|e| e.kind == ElementKind::Block));
    }
}
