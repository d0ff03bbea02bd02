// Pattern-based parser for curly-brace languages

use regex::Regex;

use crate::model::{Element, ElementIdGenerator, ElementKind};

/// Regex-driven extraction for the curly-brace family (JavaScript,
/// TypeScript, Java, Go, Rust, C-likes). Recognises function and class
/// declarations, imports/requires, exports, and top-level variables. Bodies
/// are delimited by matching braces; declarations whose braces never balance
/// are skipped rather than mis-bracketed.
pub struct PatternParser {
    re_function: Regex,
    re_arrow: Regex,
    re_method_like: Regex,
    re_class: Regex,
    re_import_from: Regex,
    re_import_bare: Regex,
    re_require: Regex,
    re_export_brace: Regex,
    re_export_default: Regex,
    re_variable: Regex,
}

impl PatternParser {
    pub fn new() -> Self {
        Self {
            re_function: Regex::new(
                r"^\s*(?:export\s+)?(?:pub\s+)?(?:async\s+)?(?:function\s+|fn\s+|func\s+)(\w+)\s*\(([^)]*)\)",
            )
            .expect("function pattern"),
            re_arrow: Regex::new(
                r"^\s*(?:export\s+)?(?:const|let|var)\s+(\w+)\s*=\s*(?:async\s*)?\(([^)]*)\)\s*=>",
            )
            .expect("arrow pattern"),
            // Plain `name(...) {` declarations, top level only
            re_method_like: Regex::new(r"^(\w+)\s*\(([^)]*)\)\s*\{").expect("method pattern"),
            re_class: Regex::new(
                r"^\s*(?:export\s+)?(?:abstract\s+)?(?:public\s+|final\s+)?class\s+(\w+)(?:\s+extends\s+([\w.]+))?",
            )
            .expect("class pattern"),
            re_import_from: Regex::new(r#"^\s*import\s+(.+?)\s+from\s+['"]([^'"]+)['"]"#)
                .expect("import-from pattern"),
            re_import_bare: Regex::new(r#"^\s*import\s+['"]([^'"]+)['"]"#).expect("bare import pattern"),
            re_require: Regex::new(
                r#"^\s*(?:const|let|var)\s+(\w+|\{[^}]*\})\s*=\s*require\(\s*['"]([^'"]+)['"]\s*\)"#,
            )
            .expect("require pattern"),
            re_export_brace: Regex::new(r"^\s*export\s*\{([^}]*)\}").expect("export pattern"),
            re_export_default: Regex::new(r"^\s*export\s+default\s+(.+)").expect("export default pattern"),
            re_variable: Regex::new(r"^(?:export\s+)?(?:const|let|var)\s+(\w+)\s*=").expect("variable pattern"),
        }
    }

    pub fn parse(&self, content: &str, file_path: &str, language: &str) -> Vec<Element> {
        let lines: Vec<&str> = content.lines().collect();
        let mut ids = ElementIdGenerator::new();
        let mut elements = Vec::new();
        // Lines already consumed by a multi-line declaration
        let mut claimed = vec![false; lines.len()];

        for (i, line) in lines.iter().enumerate() {
            if let Some(element) = self.match_import(line, i, file_path, language, &mut ids) {
                elements.push(element);
                continue;
            }
            if let Some(element) = self.match_export(line, i, file_path, language, &mut ids) {
                elements.push(element);
                continue;
            }

            if claimed[i] {
                continue;
            }

            if let Some(caps) = self.re_class.captures(line) {
                let name = caps.get(1).map(|m| m.as_str().to_string()).unwrap();
                let extends = caps.get(2).map(|m| m.as_str().to_string());
                let Some(end) = find_block_end(&lines, i) else {
                    continue;
                };
                let body = lines[i..=end].join("\n");
                let mut element = Element::new(
                    &mut ids,
                    ElementKind::Class,
                    name,
                    file_path,
                    i as u32 + 1,
                    end as u32 + 1,
                    body,
                    language,
                );
                if let Some(base) = &extends {
                    element.metadata = serde_json::json!({ "extends": base });
                    element.dependencies = vec![base.clone()];
                }
                claim(&mut claimed, i, end);
                elements.push(element);
                continue;
            }

            if let Some((name, params)) = self.match_function_decl(line, i) {
                let Some(end) = find_block_end(&lines, i) else {
                    continue;
                };
                let body = lines[i..=end].join("\n");
                let mut element = Element::new(
                    &mut ids,
                    ElementKind::Function,
                    name,
                    file_path,
                    i as u32 + 1,
                    end as u32 + 1,
                    body,
                    language,
                );
                element.signature = Some(format!("({})", params.trim()));
                if line.contains("async") {
                    element.metadata = serde_json::json!({ "async": true });
                }
                claim(&mut claimed, i, end);
                elements.push(element);
                continue;
            }

            if let Some(caps) = self.re_arrow.captures(line) {
                let name = caps[1].to_string();
                let params = caps[2].to_string();
                // Block-bodied arrows span to the matching brace, expression
                // bodies are single-line
                let end = if line.contains('{') {
                    match find_block_end(&lines, i) {
                        Some(end) => end,
                        None => continue,
                    }
                } else {
                    i
                };
                let body = lines[i..=end].join("\n");
                let mut element = Element::new(
                    &mut ids,
                    ElementKind::Function,
                    name,
                    file_path,
                    i as u32 + 1,
                    end as u32 + 1,
                    body,
                    language,
                );
                element.signature = Some(format!("({})", params.trim()));
                claim(&mut claimed, i, end);
                elements.push(element);
                continue;
            }

            // Top-level const/let/var that is not an arrow function
            if !line.starts_with(char::is_whitespace) {
                if let Some(caps) = self.re_variable.captures(line) {
                    let element = Element::new(
                        &mut ids,
                        ElementKind::Variable,
                        caps[1].to_string(),
                        file_path,
                        i as u32 + 1,
                        i as u32 + 1,
                        line.to_string(),
                        language,
                    );
                    elements.push(element);
                }
            }
        }

        elements
    }

    /// `function foo(...)` anywhere, or a bare `foo(...) {` at column zero.
    fn match_function_decl(&self, line: &str, _index: usize) -> Option<(String, String)> {
        if let Some(caps) = self.re_function.captures(line) {
            return Some((caps[1].to_string(), caps[2].to_string()));
        }
        if !line.starts_with(char::is_whitespace) {
            if let Some(caps) = self.re_method_like.captures(line) {
                let name = caps[1].to_string();
                if !matches!(name.as_str(), "if" | "for" | "while" | "switch" | "catch" | "return") {
                    return Some((name, caps[2].to_string()));
                }
            }
        }
        None
    }

    fn match_import(
        &self,
        line: &str,
        index: usize,
        file_path: &str,
        language: &str,
        ids: &mut ElementIdGenerator,
    ) -> Option<Element> {
        let (symbols_text, module) = if let Some(caps) = self.re_import_from.captures(line) {
            (caps[1].to_string(), caps[2].to_string())
        } else if let Some(caps) = self.re_require.captures(line) {
            (caps[1].to_string(), caps[2].to_string())
        } else if let Some(caps) = self.re_import_bare.captures(line) {
            (String::new(), caps[1].to_string())
        } else {
            return None;
        };

        let symbols = split_symbols(&symbols_text);
        let name = if symbols.is_empty() {
            module.clone()
        } else {
            symbols.join(", ")
        };

        let mut element = Element::new(
            ids,
            ElementKind::Import,
            name,
            file_path,
            index as u32 + 1,
            index as u32 + 1,
            line.trim().to_string(),
            language,
        );
        let mut deps = vec![module.clone()];
        if let Some(stem) = module_stem(&module) {
            deps.push(stem);
        }
        deps.extend(symbols.iter().cloned());
        deps.dedup();
        element.dependencies = deps;
        element.metadata = serde_json::json!({ "module": module, "symbols": symbols });
        Some(element)
    }

    fn match_export(
        &self,
        line: &str,
        index: usize,
        file_path: &str,
        language: &str,
        ids: &mut ElementIdGenerator,
    ) -> Option<Element> {
        let (name, symbols) = if let Some(caps) = self.re_export_brace.captures(line) {
            let symbols = split_symbols(&caps[1]);
            (symbols.join(", "), symbols)
        } else if let Some(caps) = self.re_export_default.captures(line) {
            let target = caps[1].trim().trim_end_matches(';').to_string();
            (format!("default {}", target), vec![target])
        } else {
            return None;
        };

        let mut element = Element::new(
            ids,
            ElementKind::Export,
            name,
            file_path,
            index as u32 + 1,
            index as u32 + 1,
            line.trim().to_string(),
            language,
        );
        element.dependencies = symbols.clone();
        element.metadata = serde_json::json!({ "symbols": symbols });
        Some(element)
    }
}

impl Default for PatternParser {
    fn default() -> Self {
        Self::new()
    }
}

fn claim(claimed: &mut [bool], start: usize, end: usize) {
    for flag in claimed.iter_mut().take(end + 1).skip(start) {
        *flag = true;
    }
}

/// Find the line holding the brace matching the first `{` at or after
/// `start_line`. Returns None when braces never balance.
fn find_block_end(lines: &[&str], start_line: usize) -> Option<usize> {
    let mut depth: i32 = 0;
    let mut found_open = false;

    for (offset, line) in lines.iter().enumerate().skip(start_line) {
        for ch in line.chars() {
            match ch {
                '{' => {
                    depth += 1;
                    found_open = true;
                }
                '}' => {
                    depth -= 1;
                    if found_open && depth == 0 {
                        return Some(offset);
                    }
                }
                _ => {}
            }
        }
        // A declaration without an opening brace within two lines is not a block
        if !found_open && offset > start_line + 1 {
            return None;
        }
    }
    None
}

fn split_symbols(text: &str) -> Vec<String> {
    text.trim_matches(|c| c == '{' || c == '}' || char::is_whitespace(c))
        .split(',')
        .map(|s| {
            // Strip aliases and default/namespace markers
            let s = s.trim();
            let s = s.split_whitespace().next().unwrap_or(s);
            s.trim_matches(|c| c == '{' || c == '}' || c == '*').to_string()
        })
        .filter(|s| !s.is_empty() && s != "as")
        .collect()
}

fn module_stem(module: &str) -> Option<String> {
    let stem = module.rsplit('/').next()?;
    let stem = stem.strip_suffix(".js").or(stem.strip_suffix(".ts")).unwrap_or(stem);
    if stem == module {
        None
    } else {
        Some(stem.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Vec<Element> {
        PatternParser::new().parse(content, "src/app.js", "javascript")
    }

    #[test]
    fn test_function_declarations() {
        let source = "function add(a, b) {\n  return a + b;\n}\n\nasync function load(url) {\n  return fetch(url);\n}\n";
        let elements = parse(source);

        let funcs: Vec<&Element> =
            elements.iter().filter(|e| e.kind == ElementKind::Function).collect();
        assert_eq!(funcs.len(), 2);
        assert_eq!(funcs[0].name, "add");
        assert_eq!(funcs[0].signature.as_deref(), Some("(a, b)"));
        assert_eq!(funcs[0].start_line, 1);
        assert_eq!(funcs[0].end_line, 3);
        assert_eq!(funcs[1].name, "load");
        assert_eq!(funcs[1].metadata["async"], serde_json::json!(true));
    }

    #[test]
    fn test_arrow_function() {
        let source = "const double = (x) => x * 2;\nconst wrap = (v) => {\n  return [v];\n};\n";
        let elements = parse(source);

        let funcs: Vec<&Element> =
            elements.iter().filter(|e| e.kind == ElementKind::Function).collect();
        assert_eq!(funcs.len(), 2);
        assert_eq!(funcs[0].name, "double");
        assert_eq!(funcs[0].end_line, 1);
        assert_eq!(funcs[1].name, "wrap");
        assert_eq!(funcs[1].end_line, 4);
    }

    #[test]
    fn test_class_with_extends() {
        let source = "class Widget extends Base {\n  render() {\n    return null;\n  }\n}\n";
        let elements = parse(source);

        let class = elements.iter().find(|e| e.kind == ElementKind::Class).unwrap();
        assert_eq!(class.name, "Widget");
        assert_eq!(class.metadata["extends"], serde_json::json!("Base"));
        assert_eq!(class.start_line, 1);
        assert_eq!(class.end_line, 5);

        // Indented methods are not extracted as top-level functions
        assert!(!elements.iter().any(|e| e.name == "render"));
    }

    #[test]
    fn test_imports_and_exports() {
        let source = "import { readFile, writeFile } from 'fs';\nimport 'polyfill';\nconst path = require('path');\nexport { readFile };\nexport default app;\n";
        let elements = parse(source);

        let imports: Vec<&Element> =
            elements.iter().filter(|e| e.kind == ElementKind::Import).collect();
        assert_eq!(imports.len(), 3);
        assert_eq!(imports[0].metadata["module"], serde_json::json!("fs"));
        assert!(imports[0].dependencies.contains(&"readFile".to_string()));
        assert_eq!(imports[1].metadata["module"], serde_json::json!("polyfill"));
        assert_eq!(imports[2].metadata["module"], serde_json::json!("path"));

        let exports: Vec<&Element> =
            elements.iter().filter(|e| e.kind == ElementKind::Export).collect();
        assert_eq!(exports.len(), 2);
        assert!(exports[0].dependencies.contains(&"readFile".to_string()));
        assert_eq!(exports[1].name, "default app");
    }

    #[test]
    fn test_top_level_variables() {
        let source = "const MAX = 10;\nlet counter = 0;\nfunction f() {\n  const inner = 1;\n}\n";
        let elements = parse(source);

        let vars: Vec<&Element> =
            elements.iter().filter(|e| e.kind == ElementKind::Variable).collect();
        assert_eq!(vars.len(), 2);
        assert_eq!(vars[0].name, "MAX");
        assert_eq!(vars[1].name, "counter");
    }

    #[test]
    fn test_unbalanced_braces_skipped() {
        let source = "function broken(a) {\n  if (a) {\n    return 1;\n";
        let elements = parse(source);
        assert!(!elements.iter().any(|e| e.kind == ElementKind::Function));
    }

    #[test]
    fn test_find_block_end() {
        let lines = vec!["fn x() {", "  { nested }", "}"];
        assert_eq!(find_block_end(&lines, 0), Some(2));

        let unbalanced = vec!["fn x() {", "  {"];
        assert_eq!(find_block_end(&unbalanced, 0), None);

        let no_brace = vec!["let a = 1;", "let b = 2;", "let c = 3;", "let d = 4;"];
        assert_eq!(find_block_end(&no_brace, 0), None);
    }
}
