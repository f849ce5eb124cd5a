use std::path::Path;

use tree_sitter::{Node, Parser, TreeCursor};

use kgraph_core::{Error, Result};

use super::{AstNode, ExtractedCallSite, ExtractedClass, ExtractedFunction, ExtractedImport, FileAst, LanguageParser};

/// Java parser backed by tree-sitter.
pub struct JavaParser;

impl JavaParser {
    pub fn new() -> Self {
        Self
    }

    fn parse_tree(source: &[u8], file_path: &Path) -> Result<tree_sitter::Tree> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_java::LANGUAGE.into())
            .map_err(|e| Error::Bug(format!("failed to load Java grammar: {e}")))?;
        parser.parse(source, None).ok_or_else(|| Error::Parse {
            path: file_path.display().to_string(),
            message: "tree-sitter parse returned None".into(),
        })
    }

    fn node_text<'a>(node: &Node, source: &'a [u8]) -> &'a str {
        std::str::from_utf8(&source[node.start_byte()..node.end_byte()]).unwrap_or("")
    }

    fn line(node: &Node) -> u32 {
        node.start_position().row as u32 + 1
    }

    fn end_line(node: &Node) -> u32 {
        node.end_position().row as u32 + 1
    }

    /// The preceding block comment (`/** ... */`) or line comments, treated
    /// as the docstring — Java's closest equivalent.
    fn preceding_doc_comment(node: &Node, source: &[u8]) -> Option<String> {
        let prev = node.prev_sibling()?;
        if prev.kind() != "block_comment" && prev.kind() != "line_comment" {
            return None;
        }
        let text = Self::node_text(&prev, source);
        let trimmed = text
            .trim_start_matches("/**")
            .trim_start_matches("/*")
            .trim_end_matches("*/")
            .trim_start_matches("//")
            .trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    fn enclosing_class_name(node: &Node, source: &[u8]) -> Option<String> {
        let mut current = node.parent();
        while let Some(parent) = current {
            if matches!(parent.kind(), "class_declaration" | "interface_declaration") {
                return parent
                    .child_by_field_name("name")
                    .map(|n| Self::node_text(&n, source).to_string());
            }
            current = parent.parent();
        }
        None
    }

    fn enclosing_function_name(node: &Node, source: &[u8]) -> Option<String> {
        let mut current = node.parent();
        while let Some(parent) = current {
            if parent.kind() == "method_declaration" {
                return parent
                    .child_by_field_name("name")
                    .map(|n| Self::node_text(&n, source).to_string());
            }
            current = parent.parent();
        }
        None
    }

    fn extract_class(node: &Node, source: &[u8]) -> Option<ExtractedClass> {
        let name = node
            .child_by_field_name("name")
            .map(|n| Self::node_text(&n, source).to_string())?;

        let mut bases = Vec::new();
        if let Some(superclass) = node.child_by_field_name("superclass") {
            // `superclass` wraps a `type_identifier` child.
            if let Some(ty) = superclass.named_child(0) {
                bases.push(Self::node_text(&ty, source).to_string());
            }
        }
        if let Some(interfaces) = node.child_by_field_name("interfaces") {
            let mut cursor = interfaces.walk();
            for ty in interfaces.named_children(&mut cursor) {
                bases.push(Self::node_text(&ty, source).to_string());
            }
        }

        Some(ExtractedClass {
            name,
            start_line: Self::line(node),
            end_line: Self::end_line(node),
            docstring: Self::preceding_doc_comment(node, source),
            bases,
        })
    }

    fn extract_function(node: &Node, source: &[u8]) -> Option<ExtractedFunction> {
        let name = node
            .child_by_field_name("name")
            .map(|n| Self::node_text(&n, source).to_string())?;

        let params = node
            .child_by_field_name("parameters")
            .map(|params_node| {
                let mut cursor = params_node.walk();
                params_node
                    .named_children(&mut cursor)
                    .filter_map(|p| p.child_by_field_name("name").map(|n| Self::node_text(&n, source).to_string()))
                    .collect()
            })
            .unwrap_or_default();

        let return_type = node
            .child_by_field_name("type")
            .map(|n| Self::node_text(&n, source).to_string());

        Some(ExtractedFunction {
            name,
            start_line: Self::line(node),
            end_line: Self::end_line(node),
            params,
            docstring: Self::preceding_doc_comment(node, source),
            return_type,
            enclosing_class: Self::enclosing_class_name(node, source),
        })
    }

    fn callee_info(node: &Node, source: &[u8]) -> (String, Option<String>, bool) {
        // method_invocation has optional `object` field and required `name`.
        let name = node
            .child_by_field_name("name")
            .map(|n| Self::node_text(&n, source).to_string())
            .unwrap_or_default();
        let object = node.child_by_field_name("object");
        match object {
            Some(obj) => (name, Some(Self::node_text(&obj, source).to_string()), true),
            None => (name, None, false),
        }
    }

    fn walk_calls(cursor: &mut TreeCursor, source: &[u8], calls: &mut Vec<ExtractedCallSite>) {
        let node = cursor.node();

        match node.kind() {
            "method_invocation" => {
                let (name, module, is_attr) = Self::callee_info(&node, source);
                if !name.is_empty() {
                    calls.push(ExtractedCallSite {
                        call_name: name,
                        call_module: module,
                        is_attribute_call: is_attr,
                        enclosing_function: Self::enclosing_function_name(&node, source),
                        enclosing_class: Self::enclosing_class_name(&node, source),
                        start_line: Self::line(&node),
                        start_col: node.start_position().column as u32,
                        end_line: Self::end_line(&node),
                        end_col: node.end_position().column as u32,
                    });
                }
            }
            "object_creation_expression" => {
                if let Some(ty) = node.child_by_field_name("type") {
                    let name = Self::node_text(&ty, source).to_string();
                    if !name.is_empty() {
                        calls.push(ExtractedCallSite {
                            call_name: name,
                            call_module: None,
                            is_attribute_call: false,
                            enclosing_function: Self::enclosing_function_name(&node, source),
                            enclosing_class: Self::enclosing_class_name(&node, source),
                            start_line: Self::line(&node),
                            start_col: node.start_position().column as u32,
                            end_line: Self::end_line(&node),
                            end_col: node.end_position().column as u32,
                        });
                    }
                }
            }
            _ => {}
        }

        if cursor.goto_first_child() {
            loop {
                Self::walk_calls(cursor, source, calls);
                if !cursor.goto_next_sibling() {
                    break;
                }
            }
            cursor.goto_parent();
        }
    }
}

impl Default for JavaParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageParser for JavaParser {
    fn extensions(&self) -> &[&str] {
        &["java"]
    }

    fn parse_file(&self, source: &[u8], file_path: &Path) -> Result<FileAst> {
        let tree = Self::parse_tree(source, file_path)?;
        Ok(FileAst {
            tree: Some(AstNode::from_tree_sitter(&tree.root_node(), source)),
            classes: self.extract_classes(source, file_path)?,
            functions: self.extract_functions(source, file_path)?,
            imports: self.extract_imports(source, file_path)?,
            calls: self.extract_calls(source, file_path)?,
        })
    }

    fn extract_classes(&self, source: &[u8], file_path: &Path) -> Result<Vec<ExtractedClass>> {
        if source.is_empty() {
            return Ok(vec![]);
        }
        let tree = Self::parse_tree(source, file_path)?;
        let mut classes = Vec::new();
        let mut stack = vec![tree.root_node()];
        while let Some(node) = stack.pop() {
            if matches!(node.kind(), "class_declaration" | "interface_declaration") {
                if let Some(c) = Self::extract_class(&node, source) {
                    classes.push(c);
                }
            }
            let mut cursor = node.walk();
            stack.extend(node.children(&mut cursor));
        }
        Ok(classes)
    }

    fn extract_functions(&self, source: &[u8], file_path: &Path) -> Result<Vec<ExtractedFunction>> {
        if source.is_empty() {
            return Ok(vec![]);
        }
        let tree = Self::parse_tree(source, file_path)?;
        let mut functions = Vec::new();
        let mut stack = vec![tree.root_node()];
        while let Some(node) = stack.pop() {
            if node.kind() == "method_declaration" {
                if let Some(f) = Self::extract_function(&node, source) {
                    functions.push(f);
                }
            }
            let mut cursor = node.walk();
            stack.extend(node.children(&mut cursor));
        }
        Ok(functions)
    }

    fn extract_calls(&self, source: &[u8], file_path: &Path) -> Result<Vec<ExtractedCallSite>> {
        if source.is_empty() {
            return Ok(vec![]);
        }
        let tree = Self::parse_tree(source, file_path)?;
        let mut calls = Vec::new();
        let mut cursor = tree.root_node().walk();
        Self::walk_calls(&mut cursor, source, &mut calls);
        Ok(calls)
    }

    fn extract_imports(&self, source: &[u8], file_path: &Path) -> Result<Vec<ExtractedImport>> {
        if source.is_empty() {
            return Ok(vec![]);
        }
        let tree = Self::parse_tree(source, file_path)?;
        let root = tree.root_node();
        let mut imports = Vec::new();
        let mut cursor = root.walk();

        for node in root.children(&mut cursor) {
            if node.kind() != "import_declaration" {
                continue;
            }
            let line = Self::line(&node);
            // scoped_identifier, e.g. java.util.List
            if let Some(path_node) = node.named_child(0) {
                let full = Self::node_text(&path_node, source).to_string();
                let (module, imported_name) = match full.rsplit_once('.') {
                    Some((m, n)) => (m.to_string(), n.to_string()),
                    None => (String::new(), full),
                };
                imports.push(ExtractedImport {
                    module,
                    imported_name,
                    alias: None,
                    is_from_import: false,
                    start_line: line,
                });
            }
        }

        Ok(imports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_class_with_superclass_and_interfaces() {
        let parser = JavaParser::new();
        let source = b"class Dog extends Animal implements Runnable {\n  void bark() {}\n}\n";
        let classes = parser.extract_classes(source, Path::new("Dog.java")).unwrap();
        assert_eq!(classes.len(), 1);
        assert!(classes[0].bases.contains(&"Animal".to_string()));
        assert!(classes[0].bases.contains(&"Runnable".to_string()));
    }

    #[test]
    fn extracts_method_invocation() {
        let parser = JavaParser::new();
        let source = b"class C {\n  void g() {\n    System.out.println(\"hi\");\n  }\n}\n";
        let calls = parser.extract_calls(source, Path::new("C.java")).unwrap();
        assert!(calls.iter().any(|c| c.call_name == "println"));
    }

    #[test]
    fn extracts_import_declaration() {
        let parser = JavaParser::new();
        let source = b"import java.util.List;\nclass C {}\n";
        let imports = parser.extract_imports(source, Path::new("C.java")).unwrap();
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].imported_name, "List");
        assert_eq!(imports[0].module, "java.util");
    }
}
