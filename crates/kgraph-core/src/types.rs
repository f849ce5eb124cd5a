use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A source language recognized by the parser registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    Java,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Java => "java",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "python" => Ok(Language::Python),
            "javascript" => Ok(Language::JavaScript),
            "typescript" => Ok(Language::TypeScript),
            "java" => Ok(Language::Java),
            other => Err(format!("unrecognized language: {other}")),
        }
    }
}

/// A stable content-derived id. Re-hashing the same parts always yields the
/// same string, which is what makes upserts idempotent across runs.
pub fn derive_id(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, p) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(b"\0");
        }
        hasher.update(p.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// `repo_url + "#" + branch`, the key used for the persisted
/// `last_indexed_commit` mapping.
pub fn repo_key(repo_url: &str, branch: &str) -> String {
    format!("{repo_url}#{branch}")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntity {
    pub id: String,
    pub path: String,
    pub name: String,
    pub language: Language,
    pub repository: String,
    pub repository_url: String,
    pub commit: String,
    pub branch: String,
    pub last_updated: chrono::DateTime<chrono::Utc>,
}

impl FileEntity {
    pub fn derive_id(repository: &str, relative_path: &str) -> String {
        derive_id(&[repository, relative_path])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassEntity {
    pub id: String,
    pub name: String,
    pub file_id: String,
    pub start_line: u32,
    pub end_line: u32,
    pub docstring: Option<String>,
    pub bases: Vec<String>,
}

impl ClassEntity {
    pub fn derive_id(file_id: &str, class_name: &str) -> String {
        derive_id(&[file_id, class_name])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionEntity {
    pub id: String,
    pub name: String,
    pub file_id: String,
    /// Empty for free functions.
    pub class_id: String,
    pub start_line: u32,
    pub end_line: u32,
    pub params: Vec<String>,
    pub docstring: Option<String>,
    pub is_method: bool,
}

impl FunctionEntity {
    pub fn derive_id(file_id: &str, function_name: &str, class_id: &str) -> String {
        derive_id(&[file_id, function_name, class_id])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSite {
    pub id: String,
    pub caller_file_id: String,
    pub caller_function_id: Option<String>,
    pub caller_class_id: Option<String>,
    pub call_name: String,
    pub call_module: Option<String>,
    pub position: Position,
    pub is_attribute_call: bool,
}

impl CallSite {
    pub fn derive_id(file_id: &str, start_line: u32, start_col: u32, call_name: &str) -> String {
        derive_id(&[
            file_id,
            &start_line.to_string(),
            &start_col.to_string(),
            call_name,
        ])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSite {
    pub id: String,
    pub file_id: String,
    pub import_name: String,
    pub module_name: Option<String>,
    pub alias: Option<String>,
    pub is_from_import: bool,
    pub position: Position,
}

impl ImportSite {
    pub fn derive_id(file_id: &str, kind: &str, start_line: u32, qualified_name: &str) -> String {
        derive_id(&[file_id, kind, &start_line.to_string(), qualified_name])
    }
}

/// A resolved reference: `CallSite -> Function` or `ImportSite -> File|Class`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_id_is_stable() {
        let a = derive_id(&["repo", "src/main.py"]);
        let b = derive_id(&["repo", "src/main.py"]);
        assert_eq!(a, b);
    }

    #[test]
    fn derive_id_distinguishes_part_boundaries() {
        // Without a separator "ab" + "c" would collide with "a" + "bc".
        let a = derive_id(&["ab", "c"]);
        let b = derive_id(&["a", "bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn language_round_trips_through_display_and_fromstr() {
        for lang in [
            Language::Python,
            Language::JavaScript,
            Language::TypeScript,
            Language::Java,
        ] {
            let s = lang.to_string();
            assert_eq!(Language::from_str(&s).unwrap(), lang);
        }
    }

    #[test]
    fn repo_key_joins_url_and_branch() {
        assert_eq!(
            repo_key("https://example.com/r.git", "main"),
            "https://example.com/r.git#main"
        );
    }
}
