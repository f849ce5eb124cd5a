use std::path::Path;

use tree_sitter::Parser;

use kgraph_core::{Error, Result};

use super::javascript_parser::JavaScriptParser;
use super::{AstNode, ExtractedCallSite, ExtractedClass, ExtractedFunction, ExtractedImport, FileAst, LanguageParser};

/// TypeScript parser backed by tree-sitter. The TypeScript grammar is a
/// strict superset of the JavaScript one for the node kinds this pipeline
/// cares about (calls, classes, functions, imports), so extraction reuses
/// [`JavaScriptParser`]'s traversal helpers against a tree produced by the
/// TypeScript grammar.
pub struct TypeScriptParser;

impl TypeScriptParser {
    pub fn new() -> Self {
        Self
    }

    fn parse_tree(source: &[u8], file_path: &Path) -> Result<tree_sitter::Tree> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())
            .map_err(|e| Error::Bug(format!("failed to load TypeScript grammar: {e}")))?;
        parser.parse(source, None).ok_or_else(|| Error::Parse {
            path: file_path.display().to_string(),
            message: "tree-sitter parse returned None".into(),
        })
    }
}

impl Default for TypeScriptParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageParser for TypeScriptParser {
    fn extensions(&self) -> &[&str] {
        &["ts", "tsx"]
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
            if node.kind() == "class_declaration" {
                if let Some(c) = JavaScriptParser::extract_class(&node, source) {
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
            if matches!(node.kind(), "function_declaration" | "method_definition" | "method_signature") {
                if let Some(f) = JavaScriptParser::extract_function(&node, source) {
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
        JavaScriptParser::walk_calls(&mut cursor, source, &mut calls);
        Ok(calls)
    }

    fn extract_imports(&self, source: &[u8], file_path: &Path) -> Result<Vec<ExtractedImport>> {
        if source.is_empty() {
            return Ok(vec![]);
        }
        let tree = Self::parse_tree(source, file_path)?;
        Ok(JavaScriptParser::extract_imports_from_tree(&tree.root_node(), source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_typed_class_and_method() {
        let parser = TypeScriptParser::new();
        let source = b"class Repo<T> {\n  find(id: string): T {\n    return this.items.get(id);\n  }\n}\n";
        let classes = parser.extract_classes(source, Path::new("a.ts")).unwrap();
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].name, "Repo");

        let functions = parser.extract_functions(source, Path::new("a.ts")).unwrap();
        let find = functions.iter().find(|f| f.name == "find").unwrap();
        assert_eq!(find.enclosing_class.as_deref(), Some("Repo"));
    }

    #[test]
    fn extracts_attribute_call_in_method_body() {
        let parser = TypeScriptParser::new();
        let source = b"class Repo {\n  find(id: string) {\n    return this.items.get(id);\n  }\n}\n";
        let calls = parser.extract_calls(source, Path::new("a.ts")).unwrap();
        assert!(calls.iter().any(|c| c.call_name == "get" && c.is_attribute_call));
    }
}
