// Structured Python parser built on a full syntactic tree

use tree_sitter::{Node, Parser as TreeParser, Tree};

use crate::error::{IndexError, Result};
use crate::model::{Element, ElementIdGenerator, ElementKind};
use crate::parsers::file_stem;

/// Python parser using tree-sitter.
///
/// Emits one `module` element for the file, `class` elements with their
/// `method` children, top-level `function` and `variable` elements, and one
/// `import` element per imported symbol. Parent/child links follow lexical
/// nesting.
pub struct PythonParser;

impl PythonParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, content: &str, file_path: &str) -> Result<Vec<Element>> {
        let tree = self.parse_tree(content, file_path)?;
        let mut ids = ElementIdGenerator::new();
        let mut elements = Vec::new();

        let line_count = content.lines().count().max(1) as u32;
        let mut module = Element::new(
            &mut ids,
            ElementKind::Module,
            file_stem(file_path),
            file_path,
            1,
            line_count,
            content,
            "python",
        );
        module.docstring = self.module_docstring(tree.root_node(), content);
        let module_id = module.id.clone();
        elements.push(module);

        let root = tree.root_node();
        let mut cursor = root.walk();
        for node in root.children(&mut cursor) {
            self.extract_top_level(node, content, file_path, &module_id, &mut ids, &mut elements);
        }

        // Wire module children in document order
        let child_ids: Vec<String> = elements
            .iter()
            .skip(1)
            .filter(|e| e.parent_id.as_deref() == Some(module_id.as_str()))
            .map(|e| e.id.clone())
            .collect();
        elements[0].children_ids = child_ids;

        Ok(elements)
    }

    fn parse_tree(&self, content: &str, file_path: &str) -> Result<Tree> {
        let mut parser = TreeParser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| IndexError::parse(file_path, e.to_string()))?;

        parser
            .parse(content, None)
            .ok_or_else(|| IndexError::parse(file_path, "tree-sitter produced no tree"))
    }

    fn extract_top_level(
        &self,
        node: Node,
        content: &str,
        file_path: &str,
        module_id: &str,
        ids: &mut ElementIdGenerator,
        elements: &mut Vec<Element>,
    ) {
        match node.kind() {
            "function_definition" => {
                if let Some(mut f) =
                    self.extract_callable(node, content, file_path, ids, ElementKind::Function, &[])
                {
                    f.parent_id = Some(module_id.to_string());
                    elements.push(f);
                }
            }
            "class_definition" => {
                self.extract_class(node, content, file_path, module_id, ids, elements, &[]);
            }
            "decorated_definition" => {
                let decorators = self.decorator_names(node, content);
                if let Some(inner) = node.child_by_field_name("definition") {
                    match inner.kind() {
                        "function_definition" => {
                            if let Some(mut f) = self.extract_callable(
                                inner,
                                content,
                                file_path,
                                ids,
                                ElementKind::Function,
                                &decorators,
                            ) {
                                f.parent_id = Some(module_id.to_string());
                                elements.push(f);
                            }
                        }
                        "class_definition" => {
                            self.extract_class(
                                inner, content, file_path, module_id, ids, elements, &decorators,
                            );
                        }
                        _ => {}
                    }
                }
            }
            "expression_statement" => {
                if let Some(v) = self.extract_variable(node, content, file_path, ids) {
                    let mut v = v;
                    v.parent_id = Some(module_id.to_string());
                    elements.push(v);
                }
            }
            "import_statement" | "import_from_statement" => {
                let mut imports = self.extract_imports(node, content, file_path, ids);
                for imp in &mut imports {
                    imp.parent_id = Some(module_id.to_string());
                }
                elements.extend(imports);
            }
            _ => {}
        }
    }

    fn extract_class(
        &self,
        node: Node,
        content: &str,
        file_path: &str,
        module_id: &str,
        ids: &mut ElementIdGenerator,
        elements: &mut Vec<Element>,
        decorators: &[String],
    ) {
        let Some(name) = self.get_node_text(node.child_by_field_name("name"), content) else {
            return;
        };
        let (start_line, end_line) = self.node_span(node);

        let mut class = Element::new(
            &mut *ids,
            ElementKind::Class,
            name,
            file_path,
            start_line,
            end_line,
            self.node_text(node, content),
            "python",
        );
        class.parent_id = Some(module_id.to_string());
        class.docstring = self.body_docstring(node, content);

        let bases = self.base_classes(node, content);
        class.metadata = serde_json::json!({ "bases": bases });
        if !decorators.is_empty() {
            class.metadata["decorators"] = serde_json::json!(decorators);
        }

        let class_id = class.id.clone();
        let class_index = elements.len();
        elements.push(class);

        // Methods are the callables directly inside the class body
        let mut method_ids = Vec::new();
        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for child in body.children(&mut cursor) {
                let (def_node, method_decorators) = match child.kind() {
                    "function_definition" => (Some(child), Vec::new()),
                    "decorated_definition" => (
                        child
                            .child_by_field_name("definition")
                            .filter(|n| n.kind() == "function_definition"),
                        self.decorator_names(child, content),
                    ),
                    _ => (None, Vec::new()),
                };
                if let Some(def) = def_node {
                    if let Some(mut m) = self.extract_callable(
                        def,
                        content,
                        file_path,
                        ids,
                        ElementKind::Method,
                        &method_decorators,
                    ) {
                        m.parent_id = Some(class_id.clone());
                        method_ids.push(m.id.clone());
                        elements.push(m);
                    }
                }
            }
        }
        elements[class_index].children_ids = method_ids;
    }

    fn extract_callable(
        &self,
        node: Node,
        content: &str,
        file_path: &str,
        ids: &mut ElementIdGenerator,
        kind: ElementKind,
        decorators: &[String],
    ) -> Option<Element> {
        let name = self.get_node_text(node.child_by_field_name("name"), content)?;
        let (start_line, end_line) = self.node_span(node);

        let mut element = Element::new(
            ids,
            kind,
            name,
            file_path,
            start_line,
            end_line,
            self.node_text(node, content),
            "python",
        );

        let params = self
            .get_node_text(node.child_by_field_name("parameters"), content)
            .unwrap_or_else(|| "()".to_string());
        let signature = match self.get_node_text(node.child_by_field_name("return_type"), content) {
            Some(ret) => format!("{} -> {}", params, ret),
            None => params,
        };
        element.signature = Some(signature);
        element.docstring = self.body_docstring(node, content);

        let is_async = node.child(0).map(|c| c.kind() == "async").unwrap_or(false);
        let mut metadata = serde_json::json!({ "async": is_async });
        if !decorators.is_empty() {
            metadata["decorators"] = serde_json::json!(decorators);
        }
        element.metadata = metadata;

        Some(element)
    }

    fn extract_variable(
        &self,
        node: Node,
        content: &str,
        file_path: &str,
        ids: &mut ElementIdGenerator,
    ) -> Option<Element> {
        let assignment = node.child(0).filter(|c| c.kind() == "assignment")?;
        let left = assignment.child_by_field_name("left")?;
        if left.kind() != "identifier" {
            return None;
        }
        let name = self.get_node_text(Some(left), content)?;
        let (start_line, end_line) = self.node_span(node);

        let mut element = Element::new(
            ids,
            ElementKind::Variable,
            name,
            file_path,
            start_line,
            end_line,
            self.node_text(node, content),
            "python",
        );
        if let Some(type_text) = self.get_node_text(assignment.child_by_field_name("type"), content) {
            element.metadata = serde_json::json!({ "annotation": type_text });
        }
        Some(element)
    }

    /// One import element per imported symbol, capturing module and symbol.
    fn extract_imports(
        &self,
        node: Node,
        content: &str,
        file_path: &str,
        ids: &mut ElementIdGenerator,
    ) -> Vec<Element> {
        let mut elements = Vec::new();
        let (start_line, end_line) = self.node_span(node);
        let statement = self.node_text(node, content);

        let mut push = |ids: &mut ElementIdGenerator, symbol: String, module: String| {
            let mut element = Element::new(
                ids,
                ElementKind::Import,
                symbol.clone(),
                file_path,
                start_line,
                end_line,
                statement.clone(),
                "python",
            );
            element.dependencies = dependency_symbols(&module, &symbol);
            element.metadata = serde_json::json!({ "module": module, "symbol": symbol });
            elements.push(element);
        };

        if node.kind() == "import_statement" {
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                match child.kind() {
                    "dotted_name" => {
                        if let Some(module) = self.get_node_text(Some(child), content) {
                            push(ids, module.clone(), module);
                        }
                    }
                    "aliased_import" => {
                        if let Some(module) =
                            self.get_node_text(child.child_by_field_name("name"), content)
                        {
                            push(ids, module.clone(), module);
                        }
                    }
                    _ => {}
                }
            }
        } else {
            let module = self
                .get_node_text(node.child_by_field_name("module_name"), content)
                .unwrap_or_default();
            let mut cursor = node.walk();
            let mut saw_import_kw = false;
            for child in node.children(&mut cursor) {
                if child.kind() == "import" {
                    saw_import_kw = true;
                    continue;
                }
                if !saw_import_kw {
                    continue;
                }
                match child.kind() {
                    "dotted_name" => {
                        if let Some(symbol) = self.get_node_text(Some(child), content) {
                            push(ids, symbol, module.clone());
                        }
                    }
                    "aliased_import" => {
                        if let Some(symbol) =
                            self.get_node_text(child.child_by_field_name("name"), content)
                        {
                            push(ids, symbol, module.clone());
                        }
                    }
                    "wildcard_import" => push(ids, "*".to_string(), module.clone()),
                    _ => {}
                }
            }
        }

        elements
    }

    fn base_classes(&self, class_node: Node, content: &str) -> Vec<String> {
        let mut bases = Vec::new();
        if let Some(superclasses) = class_node.child_by_field_name("superclasses") {
            let mut cursor = superclasses.walk();
            for child in superclasses.children(&mut cursor) {
                if matches!(child.kind(), "identifier" | "attribute") {
                    if let Some(base) = self.get_node_text(Some(child), content) {
                        bases.push(base);
                    }
                }
            }
        }
        bases
    }

    fn decorator_names(&self, decorated: Node, content: &str) -> Vec<String> {
        let mut decorators = Vec::new();
        let mut cursor = decorated.walk();
        for child in decorated.children(&mut cursor) {
            if child.kind() == "decorator" {
                if let Some(text) = self.get_node_text(Some(child), content) {
                    decorators.push(text.trim_start_matches('@').trim().to_string());
                }
            }
        }
        decorators
    }

    /// Docstring of a definition: first statement in the body, if a string.
    fn body_docstring(&self, def_node: Node, content: &str) -> Option<String> {
        let body = def_node.child_by_field_name("body")?;
        let first = body.named_child(0)?;
        self.string_expression(first, content)
    }

    /// Module docstring: leading string expression of the file.
    fn module_docstring(&self, root: Node, content: &str) -> Option<String> {
        let first = root.named_child(0)?;
        self.string_expression(first, content)
    }

    fn string_expression(&self, node: Node, content: &str) -> Option<String> {
        if node.kind() != "expression_statement" {
            return None;
        }
        let string = node.child(0).filter(|c| c.kind() == "string")?;
        let raw = self.node_text(string, content);
        Some(strip_string_quotes(&raw))
    }

    fn get_node_text(&self, node: Option<Node>, content: &str) -> Option<String> {
        node.map(|n| content[n.byte_range()].to_string())
    }

    fn node_text(&self, node: Node, content: &str) -> String {
        content[node.byte_range()].to_string()
    }

    /// 1-based inclusive line span
    fn node_span(&self, node: Node) -> (u32, u32) {
        let start = node.start_position().row as u32 + 1;
        let end = node.end_position().row as u32 + 1;
        (start, end.max(start))
    }
}

fn strip_string_quotes(raw: &str) -> String {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .trim_start_matches(|c| c == 'r' || c == 'b' || c == 'u' || c == 'f' || c == 'R' || c == 'B');
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if trimmed.starts_with(quote) && trimmed.ends_with(quote) && trimmed.len() >= 2 * quote.len()
        {
            return trimmed[quote.len()..trimmed.len() - quote.len()].trim().to_string();
        }
    }
    trimmed.to_string()
}

/// Symbols an import contributes to the element's dependency set: the module
/// path, its final segment, and the imported symbol.
fn dependency_symbols(module: &str, symbol: &str) -> Vec<String> {
    let mut deps = vec![module.to_string()];
    if let Some(last) = module.rsplit('.').next() {
        if last != module {
            deps.push(last.to_string());
        }
    }
    if symbol != module && symbol != "*" {
        deps.push(symbol.to_string());
    }
    deps.dedup();
    deps
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Vec<Element> {
        PythonParser::new().parse(content, "lib/a.py").unwrap()
    }

    #[test]
    fn test_function_extraction() {
        let source = "def greet(name: str) -> str:\n    \"\"\"Return a greeting.\"\"\"\n    return f\"Hello, {name}\"\n";
        let elements = parse(source);

        assert_eq!(elements.len(), 2);

        let module = &elements[0];
        assert_eq!(module.kind, ElementKind::Module);
        assert_eq!(module.name, "a");
        assert_eq!(module.start_line, 1);
        assert_eq!(module.end_line, 3);

        let func = &elements[1];
        assert_eq!(func.kind, ElementKind::Function);
        assert_eq!(func.name, "greet");
        assert_eq!(func.signature.as_deref(), Some("(name: str) -> str"));
        assert_eq!(func.docstring.as_deref(), Some("Return a greeting."));
        assert_eq!(func.start_line, 1);
        assert_eq!(func.end_line, 3);
        assert_eq!(func.parent_id.as_deref(), Some(module.id.as_str()));
        assert_eq!(module.children_ids, vec![func.id.clone()]);
    }

    #[test]
    fn test_class_with_methods() {
        let source = r#"class Greeter(Base):
    """Says hello."""

    def __init__(self, name):
        self.name = name

    async def greet(self):
        return self.name
"#;
        let elements = parse(source);

        let class = elements.iter().find(|e| e.kind == ElementKind::Class).unwrap();
        assert_eq!(class.name, "Greeter");
        assert_eq!(class.docstring.as_deref(), Some("Says hello."));
        assert_eq!(class.metadata["bases"], serde_json::json!(["Base"]));

        let methods: Vec<&Element> =
            elements.iter().filter(|e| e.kind == ElementKind::Method).collect();
        assert_eq!(methods.len(), 2);
        assert_eq!(methods[0].name, "__init__");
        assert_eq!(methods[1].name, "greet");
        assert_eq!(methods[1].metadata["async"], serde_json::json!(true));
        for m in &methods {
            assert_eq!(m.parent_id.as_deref(), Some(class.id.as_str()));
        }
        assert_eq!(class.children_ids.len(), 2);
    }

    #[test]
    fn test_imports_one_element_per_symbol() {
        let source = "import os\nfrom pathlib import Path, PurePath\n";
        let elements = parse(source);

        let imports: Vec<&Element> =
            elements.iter().filter(|e| e.kind == ElementKind::Import).collect();
        assert_eq!(imports.len(), 3);

        assert_eq!(imports[0].name, "os");
        assert_eq!(imports[0].metadata["module"], serde_json::json!("os"));

        assert_eq!(imports[1].name, "Path");
        assert_eq!(imports[1].metadata["module"], serde_json::json!("pathlib"));
        assert!(imports[1].dependencies.contains(&"pathlib".to_string()));
        assert!(imports[1].dependencies.contains(&"Path".to_string()));

        assert_eq!(imports[2].name, "PurePath");
    }

    #[test]
    fn test_top_level_variable() {
        let source = "VERSION = \"1.0\"\n\ndef main():\n    local = 1\n";
        let elements = parse(source);

        let vars: Vec<&Element> =
            elements.iter().filter(|e| e.kind == ElementKind::Variable).collect();
        assert_eq!(vars.len(), 1);
        assert_eq!(vars[0].name, "VERSION");
    }

    #[test]
    fn test_decorated_function() {
        let source = "@app.route(\"/\")\ndef handler():\n    return 1\n";
        let elements = parse(source);

        let func = elements.iter().find(|e| e.kind == ElementKind::Function).unwrap();
        assert_eq!(func.name, "handler");
        assert_eq!(
            func.metadata["decorators"],
            serde_json::json!(["app.route(\"/\")"])
        );
    }

    #[test]
    fn test_reparse_yields_identical_ids() {
        let source = "import os\n\nclass A:\n    def m(self):\n        pass\n\ndef f():\n    pass\n";
        let first = parse(source);
        let second = parse(source);

        let first_ids: Vec<&String> = first.iter().map(|e| &e.id).collect();
        let second_ids: Vec<&String> = second.iter().map(|e| &e.id).collect();
        assert_eq!(first_ids, second_ids);
    }

    #[test]
    fn test_spans_are_ordered() {
        let source = "def a():\n    pass\n\ndef b():\n    pass\n";
        for element in parse(source) {
            assert!(element.start_line <= element.end_line);
        }
    }

    #[test]
    fn test_strip_string_quotes() {
        assert_eq!(strip_string_quotes("\"\"\"Doc.\"\"\""), "Doc.");
        assert_eq!(strip_string_quotes("'single'"), "single");
        assert_eq!(strip_string_quotes("f\"formatted\""), "formatted");
    }
}
