use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use kgraph_core::{Error, Language, Result};

use super::java_parser::JavaParser;
use super::javascript_parser::JavaScriptParser;
use super::python_parser::PythonParser;
use super::typescript_parser::TypeScriptParser;
use super::{FileAst, LanguageParser};

/// Central registry mapping file extensions (and, on miss, shebang/content
/// heuristics) to language parsers. Initialized once at startup and treated
/// as immutable thereafter — the only shared state the parser component has.
pub struct ParserRegistry {
    parsers: HashMap<String, (Language, Arc<dyn LanguageParser>)>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        let mut parsers: HashMap<String, (Language, Arc<dyn LanguageParser>)> = HashMap::new();

        let py = Arc::new(PythonParser::new()) as Arc<dyn LanguageParser>;
        for ext in py.extensions() {
            parsers.insert((*ext).to_string(), (Language::Python, Arc::clone(&py)));
        }

        let js = Arc::new(JavaScriptParser::new()) as Arc<dyn LanguageParser>;
        for ext in js.extensions() {
            parsers.insert((*ext).to_string(), (Language::JavaScript, Arc::clone(&js)));
        }

        let ts = Arc::new(TypeScriptParser::new()) as Arc<dyn LanguageParser>;
        for ext in ts.extensions() {
            parsers.insert((*ext).to_string(), (Language::TypeScript, Arc::clone(&ts)));
        }

        let java = Arc::new(JavaParser::new()) as Arc<dyn LanguageParser>;
        for ext in java.extensions() {
            parsers.insert((*ext).to_string(), (Language::Java, Arc::clone(&java)));
        }

        Self { parsers }
    }

    fn extension(path: &Path) -> Option<&str> {
        path.extension().and_then(|e| e.to_str())
    }

    /// Detect a language by shebang or crude content heuristics when the
    /// extension is missing or unrecognized. Returns `None` if nothing
    /// matches — the file is then skipped, per spec.
    fn detect_by_content(source: &[u8]) -> Option<Language> {
        let head = std::str::from_utf8(&source[..source.len().min(256)]).ok()?;
        let first_line = head.lines().next().unwrap_or("");

        if first_line.starts_with("#!") {
            if first_line.contains("python") {
                return Some(Language::Python);
            }
            if first_line.contains("node") {
                return Some(Language::JavaScript);
            }
        }

        if head.contains("package ") && head.contains("class ") {
            return Some(Language::Java);
        }
        if head.contains("function ") || head.contains("const ") || head.contains("import ") && head.contains("from ") {
            return Some(Language::JavaScript);
        }

        None
    }

    fn parser_for(&self, language: Language) -> Option<&Arc<dyn LanguageParser>> {
        self.parsers
            .values()
            .find(|(lang, _)| *lang == language)
            .map(|(_, p)| p)
    }

    /// `true` if this path's extension is handled by a registered parser.
    /// Does not attempt the content-based fallback (no source available).
    pub fn supports_file(&self, path: &Path) -> bool {
        Self::extension(path)
            .map(|ext| self.parsers.contains_key(ext))
            .unwrap_or(false)
    }

    /// Detect the language for `path`/`source`, preferring the extension and
    /// falling back to shebang/content heuristics.
    pub fn detect_language(&self, path: &Path, source: &[u8]) -> Option<Language> {
        if let Some(ext) = Self::extension(path) {
            if let Some((lang, _)) = self.parsers.get(ext) {
                return Some(*lang);
            }
        }
        Self::detect_by_content(source)
    }

    /// Parse a source file, selecting the parser by extension, then by
    /// shebang/content heuristic. Returns `Error::IngestFile` when the
    /// language cannot be determined by either means.
    pub fn parse_file(&self, path: &Path, source: &[u8]) -> Result<(Language, FileAst)> {
        let language = self.detect_language(path, source).ok_or_else(|| Error::IngestFile {
            path: path.display().to_string(),
            reason: "undetectable_language".into(),
        })?;

        let parser = self.parser_for(language).ok_or_else(|| Error::IngestFile {
            path: path.display().to_string(),
            reason: "undetectable_language".into(),
        })?;

        Ok((language, parser.parse_file(source, path)?))
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_by_extension() {
        let registry = ParserRegistry::new();
        assert!(registry.supports_file(Path::new("a.py")));
        assert!(registry.supports_file(Path::new("a.ts")));
        assert!(registry.supports_file(Path::new("a.java")));
        assert!(!registry.supports_file(Path::new("a.rb")));
    }

    #[test]
    fn falls_back_to_shebang_for_missing_extension() {
        let registry = ParserRegistry::new();
        let source = b"#!/usr/bin/env python3\ndef f():\n    pass\n";
        let lang = registry.detect_language(Path::new("script"), source);
        assert_eq!(lang, Some(Language::Python));
    }

    #[test]
    fn falls_back_to_content_heuristic_for_java() {
        let registry = ParserRegistry::new();
        let source = b"package com.example;\n\nclass Main {}\n";
        let lang = registry.detect_language(Path::new("noext"), source);
        assert_eq!(lang, Some(Language::Java));
    }

    #[test]
    fn unrecognized_file_is_undetectable() {
        let registry = ParserRegistry::new();
        let err = registry.parse_file(Path::new("data.bin"), b"\x00\x01\x02").unwrap_err();
        assert!(matches!(err, Error::IngestFile { .. }));
    }

    #[test]
    fn parse_file_extracts_python_symbols() {
        let registry = ParserRegistry::new();
        let (lang, ast) = registry
            .parse_file(Path::new("a.py"), b"def f():\n    pass\n")
            .unwrap();
        assert_eq!(lang, Language::Python);
        assert_eq!(ast.functions.len(), 1);
    }

    #[test]
    fn parse_file_populates_the_ast_tree_for_every_language() {
        let registry = ParserRegistry::new();
        let cases: &[(&str, &[u8])] = &[
            ("a.py", b"def f():\n    pass\n"),
            ("a.js", b"function f() {}\n"),
            ("a.ts", b"function f(): void {}\n"),
            ("a.java", b"class A { void f() {} }\n"),
        ];
        for (path, source) in cases {
            let (_, ast) = registry.parse_file(Path::new(path), source).unwrap();
            let tree = ast.tree.unwrap_or_else(|| panic!("{path} produced no AST tree"));
            assert!(!tree.children.is_empty(), "{path}'s root node had no children");
        }
    }
}
