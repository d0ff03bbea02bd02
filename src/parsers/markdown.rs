// Markdown parser: heading hierarchy and content sections

use regex::Regex;

use crate::model::{Element, ElementIdGenerator, ElementKind};

#[derive(Debug, Clone)]
struct HeadingInfo {
    level: u8,
    raw_text: String,
    clean_text: String,
    /// 1-based line of the heading itself
    line: u32,
}

/// Markdown parser recognising ATX (`#`..`######`) and Setext (`===`/`---`)
/// headings. Each heading yields a `heading` element plus a companion
/// `section` element spanning the content up to the next heading of equal or
/// higher level. Parent links mirror the heading tree.
pub struct MarkdownParser {
    re_atx: Regex,
    re_setext_h1: Regex,
    re_setext_h2: Regex,
    re_inline: Regex,
}

impl MarkdownParser {
    pub fn new() -> Self {
        Self {
            re_atx: Regex::new(r"^(#{1,6})\s+(.+?)(?:\s+#+\s*)?$").expect("atx pattern"),
            re_setext_h1: Regex::new(r"^=+\s*$").expect("setext h1 pattern"),
            re_setext_h2: Regex::new(r"^-+\s*$").expect("setext h2 pattern"),
            re_inline: Regex::new(
                r"\*\*([^*]+)\*\*|\*([^*]+)\*|`([^`]+)`|\[([^\]]+)\]\([^)]*\)",
            )
            .expect("inline markup pattern"),
        }
    }

    pub fn parse(&self, content: &str, file_path: &str) -> Vec<Element> {
        let lines: Vec<&str> = content.lines().collect();
        let headings = self.collect_headings(&lines);
        let mut ids = ElementIdGenerator::new();
        let mut elements: Vec<Element> = Vec::new();

        // Stack of (level, heading element index) for parent wiring
        let mut stack: Vec<(u8, usize)> = Vec::new();

        for (i, heading) in headings.iter().enumerate() {
            while stack.last().is_some_and(|(level, _)| *level >= heading.level) {
                stack.pop();
            }

            let mut element = Element::new(
                &mut ids,
                ElementKind::Heading,
                heading.clean_text.clone(),
                file_path,
                heading.line,
                heading.line,
                heading.raw_text.clone(),
                "markdown",
            );
            element.signature = Some(format!("h{}", heading.level));
            element.metadata = serde_json::json!({
                "level": heading.level,
                "raw_heading": heading.raw_text,
            });
            if let Some((_, parent_index)) = stack.last() {
                let parent_id = elements[*parent_index].id.clone();
                element.parent_id = Some(parent_id);
            }

            let heading_index = elements.len();
            let heading_id = element.id.clone();
            elements.push(element);
            if let Some((_, parent_index)) = stack.last() {
                let child_id = heading_id.clone();
                elements[*parent_index].children_ids.push(child_id);
            }
            stack.push((heading.level, heading_index));

            // Section: content after the heading up to (not including) the
            // next heading of level <= current, or end of file
            let section_start = heading.line + 1;
            let section_end = headings[i + 1..]
                .iter()
                .find(|next| next.level <= heading.level)
                .map(|next| next.line - 1)
                .unwrap_or(lines.len() as u32);
            // Setext headings carry an underline on the following line
            let section_start = if self.is_setext(&lines, heading) {
                section_start + 1
            } else {
                section_start
            };

            if section_start <= section_end {
                let body: Vec<&str> = lines
                    [(section_start as usize - 1)..(section_end as usize).min(lines.len())]
                    .to_vec();
                let body_text = body.join("\n");
                if !body_text.trim().is_empty() {
                    let mut section = Element::new(
                        &mut ids,
                        ElementKind::Section,
                        heading.clean_text.clone(),
                        file_path,
                        section_start,
                        section_end,
                        body_text,
                        "markdown",
                    );
                    section.parent_id = Some(heading_id.clone());
                    section.metadata = serde_json::json!({ "level": heading.level });
                    let section_id = section.id.clone();
                    elements.push(section);
                    elements[heading_index].children_ids.insert(0, section_id);
                }
            }
        }

        elements
    }

    fn collect_headings(&self, lines: &[&str]) -> Vec<HeadingInfo> {
        let mut headings = Vec::new();
        let mut in_fence = false;

        for (i, line) in lines.iter().enumerate() {
            let trimmed = line.trim_start();
            if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
                in_fence = !in_fence;
                continue;
            }
            if in_fence {
                continue;
            }

            if let Some(caps) = self.re_atx.captures(line) {
                let level = caps[1].len() as u8;
                let raw = caps[2].trim().to_string();
                headings.push(HeadingInfo {
                    level,
                    clean_text: self.strip_inline_markup(&raw),
                    raw_text: raw,
                    line: i as u32 + 1,
                });
                continue;
            }

            // Setext: a non-empty text line underlined by === or ---
            if i + 1 < lines.len() && !line.trim().is_empty() && !line.starts_with('#') {
                let underline = lines[i + 1];
                let level = if self.re_setext_h1.is_match(underline) {
                    Some(1)
                } else if self.re_setext_h2.is_match(underline) && !line.trim_start().starts_with('-')
                {
                    Some(2)
                } else {
                    None
                };
                if let Some(level) = level {
                    let raw = line.trim().to_string();
                    headings.push(HeadingInfo {
                        level,
                        clean_text: self.strip_inline_markup(&raw),
                        raw_text: raw,
                        line: i as u32 + 1,
                    });
                }
            }
        }

        headings
    }

    fn is_setext(&self, lines: &[&str], heading: &HeadingInfo) -> bool {
        let index = heading.line as usize - 1;
        !lines[index].trim_start().starts_with('#')
            && lines
                .get(index + 1)
                .is_some_and(|l| self.re_setext_h1.is_match(l) || self.re_setext_h2.is_match(l))
    }

    /// Strip bold, italic, code spans and links from heading text
    fn strip_inline_markup(&self, text: &str) -> String {
        let mut current = text.to_string();
        // Nested markup unwraps one layer per pass
        for _ in 0..3 {
            let next = self
                .re_inline
                .replace_all(&current, |caps: &regex::Captures| {
                    caps.get(1)
                        .or_else(|| caps.get(2))
                        .or_else(|| caps.get(3))
                        .or_else(|| caps.get(4))
                        .map(|m| m.as_str().to_string())
                        .unwrap_or_default()
                })
                .to_string();
            if next == current {
                break;
            }
            current = next;
        }
        current.trim().to_string()
    }
}

impl Default for MarkdownParser {
    fn default() -> Self {
        Self::new()
    }
}
