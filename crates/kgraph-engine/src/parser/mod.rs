pub mod java_parser;
pub mod javascript_parser;
pub mod python_parser;
pub mod registry;
pub mod typescript_parser;

pub use registry::ParserRegistry;

use std::path::Path;

use serde::{Deserialize, Serialize};
use tree_sitter::Node;

use kgraph_core::Result;

/// A single node of the uniform AST every backend produces. Rows/columns are
/// 0-based tree-sitter coordinates; callers convert to 1-based line numbers
/// for human-facing output and entity records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AstNode {
    pub kind: String,
    pub start_byte: usize,
    pub end_byte: usize,
    pub start_point: Point,
    pub end_point: Point,
    pub text: Option<String>,
    pub children: Vec<AstNode>,
}

impl AstNode {
    /// Walks a tree-sitter node into the uniform `AstNode` shape. Leaf nodes
    /// carry their source text; interior nodes don't, since their text is
    /// just the concatenation of their children's.
    pub fn from_tree_sitter(node: &Node, source: &[u8]) -> AstNode {
        let mut cursor = node.walk();
        let children: Vec<AstNode> =
            node.children(&mut cursor).map(|c| AstNode::from_tree_sitter(&c, source)).collect();
        let text = if children.is_empty() {
            std::str::from_utf8(&source[node.start_byte()..node.end_byte()]).ok().map(str::to_string)
        } else {
            None
        };
        AstNode {
            kind: node.kind().to_string(),
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            start_point: Point { row: node.start_position().row, column: node.start_position().column },
            end_point: Point { row: node.end_position().row, column: node.end_position().column },
            text,
            children,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub row: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedClass {
    pub name: String,
    pub start_line: u32,
    pub end_line: u32,
    pub docstring: Option<String>,
    pub bases: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedFunction {
    pub name: String,
    pub start_line: u32,
    pub end_line: u32,
    /// Parameter names, excluding the implicit receiver (`self`/`cls`) on
    /// class methods.
    pub params: Vec<String>,
    pub docstring: Option<String>,
    pub return_type: Option<String>,
    /// `None` for free functions.
    pub enclosing_class: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedImport {
    pub module: String,
    pub imported_name: String,
    pub alias: Option<String>,
    pub is_from_import: bool,
    pub start_line: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedCallSite {
    pub call_name: String,
    pub call_module: Option<String>,
    pub is_attribute_call: bool,
    pub enclosing_function: Option<String>,
    pub enclosing_class: Option<String>,
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

/// Everything extracted from a single source file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileAst {
    pub tree: Option<AstNode>,
    pub classes: Vec<ExtractedClass>,
    pub functions: Vec<ExtractedFunction>,
    pub imports: Vec<ExtractedImport>,
    pub calls: Vec<ExtractedCallSite>,
}

/// The capability set every language backend implements: parse bytes into a
/// tree, then traverse that tree into language-agnostic records. No backend
/// holds mutable state shared across files, so parsing is embarrassingly
/// parallel.
pub trait LanguageParser: Send + Sync {
    /// File extensions this parser handles, without the leading dot.
    fn extensions(&self) -> &[&str];

    fn extract_classes(&self, source: &[u8], file_path: &Path) -> Result<Vec<ExtractedClass>>;

    fn extract_functions(&self, source: &[u8], file_path: &Path) -> Result<Vec<ExtractedFunction>>;

    fn extract_imports(&self, source: &[u8], file_path: &Path) -> Result<Vec<ExtractedImport>>;

    fn extract_calls(&self, source: &[u8], file_path: &Path) -> Result<Vec<ExtractedCallSite>>;

    /// Parse a file and return everything extracted. Failures (e.g. a syntax
    /// error so severe tree-sitter cannot produce a tree) are returned as
    /// `Err`; a best-effort partial tree from tree-sitter's own error
    /// recovery is still a success. Every backend in this crate overrides
    /// this to populate `FileAst.tree` via [`AstNode::from_tree_sitter`];
    /// the `None` here is only a fallback for a backend that has no
    /// tree-sitter grammar to walk.
    fn parse_file(&self, source: &[u8], file_path: &Path) -> Result<FileAst> {
        Ok(FileAst {
            tree: None,
            classes: self.extract_classes(source, file_path)?,
            functions: self.extract_functions(source, file_path)?,
            imports: self.extract_imports(source, file_path)?,
            calls: self.extract_calls(source, file_path)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_tree_sitter_gives_leaves_text_and_interior_nodes_none() {
        let mut parser = tree_sitter::Parser::new();
        parser.set_language(&tree_sitter_python::LANGUAGE.into()).unwrap();
        let source = b"def f():\n    pass\n";
        let tree = parser.parse(source, None).unwrap();
        let root = AstNode::from_tree_sitter(&tree.root_node(), source);

        assert_eq!(root.kind, "module");
        assert!(root.text.is_none());
        assert!(!root.children.is_empty());

        let mut stack = root.children.clone();
        let mut found_leaf_text = false;
        while let Some(node) = stack.pop() {
            if node.children.is_empty() {
                if let Some(text) = &node.text {
                    if text == "def" {
                        found_leaf_text = true;
                    }
                }
            } else {
                assert!(node.text.is_none());
            }
            stack.extend(node.children);
        }
        assert!(found_leaf_text, "expected to find the `def` keyword leaf with its source text");
    }
}
