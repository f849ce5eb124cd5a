use std::path::Path;

use tree_sitter::{Node, Parser, TreeCursor};

use kgraph_core::{Error, Result};

use super::{AstNode, ExtractedCallSite, ExtractedClass, ExtractedFunction, ExtractedImport, FileAst, LanguageParser};

/// Python parser backed by tree-sitter.
pub struct PythonParser;

impl PythonParser {
    pub fn new() -> Self {
        Self
    }

    fn create_parser() -> Result<Parser> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| Error::Bug(format!("failed to load Python grammar: {e}")))?;
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

    fn node_name(node: &Node, source: &[u8]) -> Option<String> {
        node.child_by_field_name("name")
            .map(|n| Self::node_text(&n, source).to_string())
    }

    fn extract_docstring(node: &Node, source: &[u8]) -> Option<String> {
        let body = node.child_by_field_name("body")?;
        let first_stmt = body.child(0)?;
        if first_stmt.kind() != "expression_statement" {
            return None;
        }
        let expr = first_stmt.child(0)?;
        if expr.kind() != "string" {
            return None;
        }
        let raw = Self::node_text(&expr, source);
        let content = raw
            .strip_prefix("\"\"\"")
            .and_then(|s| s.strip_suffix("\"\"\""))
            .or_else(|| raw.strip_prefix("'''").and_then(|s| s.strip_suffix("'''")))
            .unwrap_or(raw);
        let trimmed = content.trim().to_string();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    }

    /// 1-based line number for a tree-sitter (0-based) point.
    fn line(node: &Node) -> u32 {
        node.start_position().row as u32 + 1
    }

    fn end_line(node: &Node) -> u32 {
        node.end_position().row as u32 + 1
    }

    fn extract_class(node: &Node, source: &[u8]) -> Option<ExtractedClass> {
        let name = Self::node_name(node, source)?;
        let bases = node
            .child_by_field_name("superclasses")
            .map(|args| {
                let mut cursor = args.walk();
                args.named_children(&mut cursor)
                    .map(|c| Self::node_text(&c, source).to_string())
                    .collect()
            })
            .unwrap_or_default();

        Some(ExtractedClass {
            name,
            start_line: Self::line(node),
            end_line: Self::end_line(node),
            docstring: Self::extract_docstring(node, source),
            bases,
        })
    }

    fn extract_function(node: &Node, source: &[u8], enclosing_class: Option<String>) -> Option<ExtractedFunction> {
        let name = Self::node_name(node, source)?;
        let params = node
            .child_by_field_name("parameters")
            .map(|params_node| {
                let mut cursor = params_node.walk();
                params_node
                    .named_children(&mut cursor)
                    .filter_map(|p| {
                        let pname = match p.kind() {
                            "identifier" => Self::node_text(&p, source).to_string(),
                            "typed_parameter" | "default_parameter" | "typed_default_parameter" => p
                                .child_by_field_name("name")
                                .map(|n| Self::node_text(&n, source).to_string())
                                .unwrap_or_else(|| Self::node_text(&p, source).to_string()),
                            "list_splat_pattern" | "dictionary_splat_pattern" => {
                                Self::node_text(&p, source).to_string()
                            }
                            _ => return None,
                        };
                        Some(pname)
                    })
                    .filter(|p| p != "self" && p != "cls")
                    .collect()
            })
            .unwrap_or_default();

        let return_type = node
            .child_by_field_name("return_type")
            .map(|n| Self::node_text(&n, source).to_string());

        Some(ExtractedFunction {
            name,
            start_line: Self::line(node),
            end_line: Self::end_line(node),
            params,
            docstring: Self::extract_docstring(node, source),
            return_type,
            enclosing_class,
        })
    }

    fn enclosing_function_name(node: &Node, source: &[u8]) -> Option<String> {
        let mut current = node.parent();
        while let Some(parent) = current {
            if parent.kind() == "function_definition" {
                return Self::node_name(&parent, source);
            }
            current = parent.parent();
        }
        None
    }

    fn enclosing_class_name(node: &Node, source: &[u8]) -> Option<String> {
        let mut current = node.parent();
        while let Some(parent) = current {
            if parent.kind() == "class_definition" {
                return Self::node_name(&parent, source);
            }
            current = parent.parent();
        }
        None
    }

    /// Returns `(call_name, call_module, is_attribute_call)` for a call's
    /// `function` field.
    fn extract_callee_info(node: &Node, source: &[u8]) -> (String, Option<String>, bool) {
        match node.kind() {
            "attribute" => {
                let name = node
                    .child_by_field_name("attribute")
                    .map(|a| Self::node_text(&a, source).to_string())
                    .unwrap_or_default();
                // `object` is a `call` for a chained call on a fresh instance
                // (`C().m()`) — its own text is `"C()"`, not the class name,
                // so recurse into its callee to get the name being resolved.
                let module = node.child_by_field_name("object").map(|o| {
                    if o.kind() == "call" {
                        o.child_by_field_name("function")
                            .map(|f| Self::extract_callee_info(&f, source).0)
                            .unwrap_or_else(|| Self::node_text(&o, source).to_string())
                    } else {
                        Self::node_text(&o, source).to_string()
                    }
                });
                (name, module, true)
            }
            "identifier" => (Self::node_text(node, source).to_string(), None, false),
            _ => (Self::node_text(node, source).to_string(), None, false),
        }
    }

    fn push_call(calls: &mut Vec<ExtractedCallSite>, node: &Node, source: &[u8], call_name: String, call_module: Option<String>, is_attribute_call: bool) {
        if call_name.is_empty() {
            return;
        }
        calls.push(ExtractedCallSite {
            call_name,
            call_module,
            is_attribute_call,
            enclosing_function: Self::enclosing_function_name(node, source),
            enclosing_class: Self::enclosing_class_name(node, source),
            start_line: Self::line(node),
            start_col: node.start_position().column as u32,
            end_line: Self::end_line(node),
            end_col: node.end_position().column as u32,
        });
    }

    fn walk_calls(cursor: &mut TreeCursor, source: &[u8], calls: &mut Vec<ExtractedCallSite>) {
        let node = cursor.node();

        match node.kind() {
            "call" => {
                if let Some(func_node) = node.child_by_field_name("function") {
                    let (name, module, is_attr) = Self::extract_callee_info(&func_node, source);
                    Self::push_call(calls, &node, source, name, module, is_attr);
                }
            }
            "decorator" => {
                let mut inner = node.walk();
                for child in node.children(&mut inner) {
                    match child.kind() {
                        "identifier" => {
                            let name = Self::node_text(&child, source).to_string();
                            Self::push_call(calls, &node, source, name, None, false);
                        }
                        "attribute" => {
                            let (name, module, _) = Self::extract_callee_info(&child, source);
                            Self::push_call(calls, &node, source, name, module, true);
                        }
                        _ => {}
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

    fn extract_from_module_path(node: &Node, source: &[u8]) -> String {
        if let Some(module_node) = node.child_by_field_name("module_name") {
            return Self::node_text(&module_node, source).to_string();
        }
        String::new()
    }

    fn extract_import_statement(node: &Node, source: &[u8]) -> Vec<ExtractedImport> {
        let mut imports = Vec::new();
        let mut cursor = node.walk();
        let line = Self::line(node);

        for child in node.children(&mut cursor) {
            match child.kind() {
                "dotted_name" => {
                    let module = Self::node_text(&child, source).to_string();
                    if !module.is_empty() {
                        imports.push(ExtractedImport {
                            module: module.clone(),
                            imported_name: module,
                            alias: None,
                            is_from_import: false,
                            start_line: line,
                        });
                    }
                }
                "aliased_import" => {
                    if let Some(name_n) = child.child_by_field_name("name") {
                        let module = Self::node_text(&name_n, source).to_string();
                        let alias = child
                            .child_by_field_name("alias")
                            .map(|a| Self::node_text(&a, source).to_string());
                        imports.push(ExtractedImport {
                            module: module.clone(),
                            imported_name: module,
                            alias,
                            is_from_import: false,
                            start_line: line,
                        });
                    }
                }
                _ => {}
            }
        }

        imports
    }

    fn extract_import_from_statement(node: &Node, source: &[u8]) -> Vec<ExtractedImport> {
        let mut imports = Vec::new();
        let module_path = Self::extract_from_module_path(node, source);
        let line = Self::line(node);

        let mut found_import_keyword = false;
        let mut cursor = node.walk();

        for child in node.children(&mut cursor) {
            let text = Self::node_text(&child, source);

            if text == "import" {
                found_import_keyword = true;
                continue;
            }
            if !found_import_keyword {
                continue;
            }

            match child.kind() {
                "dotted_name" | "identifier" => {
                    let imported_name = text.to_string();
                    if !imported_name.is_empty() && imported_name != "," {
                        imports.push(ExtractedImport {
                            module: module_path.clone(),
                            imported_name,
                            alias: None,
                            is_from_import: true,
                            start_line: line,
                        });
                    }
                }
                "aliased_import" => {
                    if let Some(name_n) = child.child_by_field_name("name") {
                        let imported_name = Self::node_text(&name_n, source).to_string();
                        let alias = child
                            .child_by_field_name("alias")
                            .map(|a| Self::node_text(&a, source).to_string());
                        imports.push(ExtractedImport {
                            module: module_path.clone(),
                            imported_name,
                            alias,
                            is_from_import: true,
                            start_line: line,
                        });
                    }
                }
                "wildcard_import" => {
                    imports.push(ExtractedImport {
                        module: module_path.clone(),
                        imported_name: "*".to_string(),
                        alias: None,
                        is_from_import: true,
                        start_line: line,
                    });
                }
                _ => {}
            }
        }

        imports
    }
}

impl Default for PythonParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageParser for PythonParser {
    fn extensions(&self) -> &[&str] {
        &["py"]
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
            let target = if node.kind() == "decorated_definition" {
                node.child_by_field_name("definition")
            } else {
                Some(node)
            };
            if let Some(t) = target {
                if t.kind() == "class_definition" {
                    if let Some(c) = Self::extract_class(&t, source) {
                        classes.push(c);
                    }
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
            let target = if node.kind() == "decorated_definition" {
                node.child_by_field_name("definition")
            } else {
                Some(node)
            };
            if let Some(t) = target {
                if t.kind() == "function_definition" {
                    let enclosing_class = Self::enclosing_class_name(&t, source);
                    if let Some(f) = Self::extract_function(&t, source, enclosing_class) {
                        functions.push(f);
                    }
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
            match node.kind() {
                "import_statement" => imports.extend(Self::extract_import_statement(&node, source)),
                "import_from_statement" => imports.extend(Self::extract_import_from_statement(&node, source)),
                _ => {}
            }
        }

        Ok(imports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_class_with_bases_and_docstring() {
        let parser = PythonParser::new();
        let source = b"class Dog(Animal):\n    \"\"\"A dog.\"\"\"\n    def bark(self):\n        pass\n";
        let classes = parser.extract_classes(source, Path::new("a.py")).unwrap();
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].name, "Dog");
        assert_eq!(classes[0].bases, vec!["Animal"]);
        assert_eq!(classes[0].docstring.as_deref(), Some("A dog."));
    }

    #[test]
    fn excludes_self_from_method_params() {
        let parser = PythonParser::new();
        let source = b"class C:\n    def m(self, x, y):\n        pass\n";
        let functions = parser.extract_functions(source, Path::new("a.py")).unwrap();
        let m = functions.iter().find(|f| f.name == "m").unwrap();
        assert_eq!(m.params, vec!["x", "y"]);
        assert_eq!(m.enclosing_class.as_deref(), Some("C"));
    }

    #[test]
    fn attribute_call_captures_module_and_name() {
        let parser = PythonParser::new();
        let source = b"def g():\n    C().m()\n";
        let calls = parser.extract_calls(source, Path::new("a.py")).unwrap();
        let m_call = calls.iter().find(|c| c.call_name == "m").unwrap();
        assert!(m_call.is_attribute_call);
        assert_eq!(m_call.enclosing_function.as_deref(), Some("g"));
        // The object is a fresh-instance call (`C()`), not a bare identifier —
        // the module must be the class being instantiated, not the object's
        // full text "C()", or resolution against the Class graph never matches.
        assert_eq!(m_call.call_module.as_deref(), Some("C"));
    }

    #[test]
    fn attribute_call_on_plain_identifier_keeps_object_text_as_module() {
        let parser = PythonParser::new();
        let source = b"def g(obj):\n    obj.m()\n";
        let calls = parser.extract_calls(source, Path::new("a.py")).unwrap();
        let m_call = calls.iter().find(|c| c.call_name == "m").unwrap();
        assert_eq!(m_call.call_module.as_deref(), Some("obj"));
    }

    #[test]
    fn direct_call_has_no_module() {
        let parser = PythonParser::new();
        let source = b"def f():\n    pass\ndef g():\n    f()\n";
        let calls = parser.extract_calls(source, Path::new("a.py")).unwrap();
        let f_call = calls.iter().find(|c| c.call_name == "f").unwrap();
        assert!(!f_call.is_attribute_call);
        assert_eq!(f_call.call_module, None);
    }

    #[test]
    fn from_import_relative_module_keeps_leading_dots() {
        let parser = PythonParser::new();
        let source = b"from .local_module import helper\n";
        let imports = parser.extract_imports(source, Path::new("a.py")).unwrap();
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].module, ".local_module");
        assert_eq!(imports[0].imported_name, "helper");
        assert!(imports[0].is_from_import);
    }
}
