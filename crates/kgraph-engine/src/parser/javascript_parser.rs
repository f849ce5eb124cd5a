use std::path::Path;

use tree_sitter::{Node, Parser, TreeCursor};

use kgraph_core::{Error, Result};

use super::{AstNode, ExtractedCallSite, ExtractedClass, ExtractedFunction, ExtractedImport, FileAst, LanguageParser};

/// JavaScript parser backed by tree-sitter. Shares its traversal shape with
/// [`super::typescript_parser::TypeScriptParser`]; the two grammars diverge
/// mainly in type annotations, which neither backend needs to resolve calls
/// or containment.
pub struct JavaScriptParser;

impl JavaScriptParser {
    pub fn new() -> Self {
        Self
    }

    fn create_parser() -> Result<Parser> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_javascript::LANGUAGE.into())
            .map_err(|e| Error::Bug(format!("failed to load JavaScript grammar: {e}")))?;
        Ok(parser)
    }

    fn parse_tree(source: &[u8], file_path: &Path) -> Result<tree_sitter::Tree> {
        let mut parser = Self::create_parser()?;
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

    pub(super) fn enclosing_class_name(node: &Node, source: &[u8]) -> Option<String> {
        let mut current = node.parent();
        while let Some(parent) = current {
            if matches!(parent.kind(), "class_declaration" | "class") {
                if let Some(name) = parent.child_by_field_name("name") {
                    return Some(Self::node_text(&name, source).to_string());
                }
                return None;
            }
            current = parent.parent();
        }
        None
    }

    pub(super) fn enclosing_function_name(node: &Node, source: &[u8]) -> Option<String> {
        let mut current = node.parent();
        while let Some(parent) = current {
            match parent.kind() {
                "function_declaration" | "method_definition" | "function" => {
                    let name = parent
                        .child_by_field_name("name")
                        .or_else(|| parent.child_by_field_name("key"))
                        .map(|n| Self::node_text(&n, source).to_string());
                    return name;
                }
                _ => {}
            }
            current = parent.parent();
        }
        None
    }

    fn extract_params(node: &Node, source: &[u8]) -> Vec<String> {
        let Some(params_node) = node.child_by_field_name("parameters") else {
            return Vec::new();
        };
        let mut cursor = params_node.walk();
        params_node
            .named_children(&mut cursor)
            .filter_map(|p| match p.kind() {
                "identifier" => Some(Self::node_text(&p, source).to_string()),
                "required_parameter" | "optional_parameter" | "assignment_pattern" | "rest_pattern" => p
                    .child_by_field_name("pattern")
                    .or_else(|| p.child_by_field_name("left"))
                    .map(|n| Self::node_text(&n, source).to_string()),
                _ => None,
            })
            .collect()
    }

    pub(super) fn extract_class(node: &Node, source: &[u8]) -> Option<ExtractedClass> {
        let name = node
            .child_by_field_name("name")
            .map(|n| Self::node_text(&n, source).to_string())?;

        let bases = node
            .child_by_field_name("heritage")
            .map(|heritage| {
                let mut cursor = heritage.walk();
                heritage
                    .named_children(&mut cursor)
                    .map(|c| Self::node_text(&c, source).to_string())
                    .collect()
            })
            .unwrap_or_default();

        Some(ExtractedClass {
            name,
            start_line: Self::line(node),
            end_line: Self::end_line(node),
            docstring: None,
            bases,
        })
    }

    pub(super) fn extract_function(node: &Node, source: &[u8]) -> Option<ExtractedFunction> {
        let name = node
            .child_by_field_name("name")
            .or_else(|| node.child_by_field_name("key"))
            .map(|n| Self::node_text(&n, source).to_string())?;

        Some(ExtractedFunction {
            name,
            start_line: Self::line(node),
            end_line: Self::end_line(node),
            params: Self::extract_params(node, source),
            docstring: None,
            return_type: None,
            enclosing_class: Self::enclosing_class_name(node, source),
        })
    }

    fn callee_info(node: &Node, source: &[u8]) -> (String, Option<String>, bool) {
        match node.kind() {
            "member_expression" => {
                let name = node
                    .child_by_field_name("property")
                    .map(|p| Self::node_text(&p, source).to_string())
                    .unwrap_or_default();
                // `object` can itself be a call or `new` expression (chained
                // call on a fresh value, e.g. `new Widget().render()` or
                // `foo().bar()`) — its own text is not the name being
                // resolved against, so recurse into the constructor/callee.
                let module = node.child_by_field_name("object").map(|o| match o.kind() {
                    "new_expression" => o
                        .child_by_field_name("constructor")
                        .map(|c| Self::node_text(&c, source).to_string())
                        .unwrap_or_else(|| Self::node_text(&o, source).to_string()),
                    "call_expression" => o
                        .child_by_field_name("function")
                        .map(|f| Self::callee_info(&f, source).0)
                        .unwrap_or_else(|| Self::node_text(&o, source).to_string()),
                    _ => Self::node_text(&o, source).to_string(),
                });
                (name, module, true)
            }
            "identifier" => (Self::node_text(node, source).to_string(), None, false),
            _ => (Self::node_text(node, source).to_string(), None, false),
        }
    }

    pub(super) fn walk_calls(cursor: &mut TreeCursor, source: &[u8], calls: &mut Vec<ExtractedCallSite>) {
        let node = cursor.node();

        if node.kind() == "call_expression" {
            if let Some(func) = node.child_by_field_name("function") {
                let (name, module, is_attr) = Self::callee_info(&func, source);
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

    pub(super) fn extract_imports_from_tree(root: &Node, source: &[u8]) -> Vec<ExtractedImport> {
        let mut imports = Vec::new();
        let mut cursor = root.walk();

        for node in root.children(&mut cursor) {
            if node.kind() != "import_statement" {
                continue;
            }
            let line = Self::line(&node);
            let module = node
                .child_by_field_name("source")
                .map(|s| Self::node_text(&s, source).trim_matches(|c| c == '"' || c == '\'').to_string())
                .unwrap_or_default();

            let Some(clause) = node.child_by_field_name("import") else {
                continue;
            };

            match clause.kind() {
                "identifier" => {
                    // default import: `import Foo from "mod"`
                    imports.push(ExtractedImport {
                        module: module.clone(),
                        imported_name: Self::node_text(&clause, source).to_string(),
                        alias: None,
                        is_from_import: false,
                        start_line: line,
                    });
                }
                "namespace_import" => {
                    if let Some(id) = clause.named_child(0) {
                        imports.push(ExtractedImport {
                            module: module.clone(),
                            imported_name: "*".to_string(),
                            alias: Some(Self::node_text(&id, source).to_string()),
                            is_from_import: false,
                            start_line: line,
                        });
                    }
                }
                "named_imports" => {
                    let mut spec_cursor = clause.walk();
                    for spec in clause.named_children(&mut spec_cursor) {
                        if spec.kind() != "import_specifier" {
                            continue;
                        }
                        let name_node = spec.child_by_field_name("name");
                        let alias_node = spec.child_by_field_name("alias");
                        if let Some(n) = name_node {
                            imports.push(ExtractedImport {
                                module: module.clone(),
                                imported_name: Self::node_text(&n, source).to_string(),
                                alias: alias_node.map(|a| Self::node_text(&a, source).to_string()),
                                is_from_import: true,
                                start_line: line,
                            });
                        }
                    }
                }
                _ => {}
            }
        }

        imports
    }
}

impl Default for JavaScriptParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageParser for JavaScriptParser {
    fn extensions(&self) -> &[&str] {
        &["js", "jsx", "mjs", "cjs"]
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
            if matches!(node.kind(), "function_declaration" | "method_definition") {
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
        Ok(Self::extract_imports_from_tree(&tree.root_node(), source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_class_with_extends() {
        let parser = JavaScriptParser::new();
        let source = b"class Dog extends Animal {\n  bark() {}\n}\n";
        let classes = parser.extract_classes(source, Path::new("a.js")).unwrap();
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].name, "Dog");
        assert_eq!(classes[0].bases, vec!["Animal"]);
    }

    #[test]
    fn extracts_method_call_on_instance() {
        let parser = JavaScriptParser::new();
        let source = b"function g() {\n  const d = new Dog();\n  d.bark();\n}\n";
        let calls = parser.extract_calls(source, Path::new("a.js")).unwrap();
        let bark = calls.iter().find(|c| c.call_name == "bark").unwrap();
        assert!(bark.is_attribute_call);
        assert_eq!(bark.call_module.as_deref(), Some("d"));
    }

    #[test]
    fn chained_call_on_a_fresh_instance_resolves_module_to_the_constructor_name() {
        let parser = JavaScriptParser::new();
        let source = b"function g() {\n  new Widget().render();\n}\n";
        let calls = parser.extract_calls(source, Path::new("a.js")).unwrap();
        let render = calls.iter().find(|c| c.call_name == "render").unwrap();
        assert!(render.is_attribute_call);
        assert_eq!(render.call_module.as_deref(), Some("Widget"));
    }

    #[test]
    fn chained_call_on_a_call_result_resolves_module_to_the_inner_callee_name() {
        let parser = JavaScriptParser::new();
        let source = b"function g() {\n  foo().bar();\n}\n";
        let calls = parser.extract_calls(source, Path::new("a.js")).unwrap();
        let bar = calls.iter().find(|c| c.call_name == "bar").unwrap();
        assert!(bar.is_attribute_call);
        assert_eq!(bar.call_module.as_deref(), Some("foo"));
    }

    #[test]
    fn extracts_named_imports() {
        let parser = JavaScriptParser::new();
        let source = b"import { foo, bar as baz } from \"./util\";\n";
        let imports = parser.extract_imports(source, Path::new("a.js")).unwrap();
        assert!(imports.iter().any(|i| i.imported_name == "foo" && i.module == "./util"));
        assert!(imports
            .iter()
            .any(|i| i.imported_name == "bar" && i.alias.as_deref() == Some("baz")));
    }
}
