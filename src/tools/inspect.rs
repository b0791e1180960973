//! Repository inspection tools: file tree and lines of code per language.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use walkdir::{DirEntry, WalkDir};

use super::git::run_git_command;
use super::Tool;

const IGNORED_DIRS: &[&str] = &[
    ".git",
    "__pycache__",
    ".mypy_cache",
    ".pytest_cache",
    ".venv",
    "node_modules",
];

const IGNORED_FILES: &[&str] = &[".DS_Store", "Thumbs.db"];

/// Extension to language label. Extensions not listed here are not counted.
const LANGUAGE_TABLE: &[(&str, &str)] = &[
    ("py", "Python"),
    ("js", "JavaScript"),
    ("ts", "TypeScript"),
    ("java", "Java"),
    ("c", "C"),
    ("h", "C"),
    ("cpp", "C++"),
    ("hpp", "C++"),
    ("cs", "C#"),
    ("go", "Go"),
    ("rs", "Rust"),
    ("md", "Markdown"),
    ("html", "HTML"),
    ("css", "CSS"),
];

/// One node of the scanned repository tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FileNode {
    Directory {
        name: String,
        path: String,
        children: Vec<FileNode>,
    },
    File {
        name: String,
        path: String,
        size: u64,
    },
}

impl FileNode {
    pub fn name(&self) -> &str {
        match self {
            FileNode::Directory { name, .. } | FileNode::File { name, .. } => name,
        }
    }

    fn push_child(&mut self, child: FileNode) {
        if let FileNode::Directory { children, .. } = self {
            children.push(child);
        }
    }
}

/// Scan the repository's file tree.
pub struct ScanFileTree;

#[async_trait]
impl Tool for ScanFileTree {
    fn name(&self) -> &str {
        "scan_file_tree"
    }

    fn description(&self) -> &str {
        "Return the repository's file and directory tree (names, relative paths, file sizes)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _args: Value, repo: &Path) -> anyhow::Result<Value> {
        tracing::info!(repo = %repo.display(), "Scanning file tree");
        let root = repo.to_path_buf();
        let tree = tokio::task::spawn_blocking(move || scan_file_tree(&root)).await?;

        match tree {
            Ok(tree) => Ok(serde_json::to_value(tree)?),
            Err(e) => {
                tracing::error!("File tree scan failed: {}", e);
                Ok(json!({ "error": e.to_string() }))
            }
        }
    }
}

/// Walk `repo` into a nested tree, directories before files, each group
/// ordered case-insensitively by name.
pub fn scan_file_tree(repo: &Path) -> Result<FileNode, walkdir::Error> {
    let root_name = repo
        .canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        .unwrap_or_else(|| "repository".to_string());

    // stack[d] is the open directory at depth d; pre-order traversal means a
    // new entry at depth d closes every directory deeper than d - 1.
    let mut stack = vec![FileNode::Directory {
        name: root_name,
        path: ".".to_string(),
        children: Vec::new(),
    }];

    let walker = WalkDir::new(repo)
        .min_depth(1)
        .sort_by(directories_first)
        .into_iter()
        .filter_entry(|entry| !is_ignored(entry));

    for entry in walker {
        let entry = entry?;
        let depth = entry.depth();
        while stack.len() > depth {
            close_directory(&mut stack);
        }

        let name = entry.file_name().to_string_lossy().to_string();
        let path = relative_path(repo, entry.path());

        if entry.file_type().is_dir() {
            stack.push(FileNode::Directory {
                name,
                path,
                children: Vec::new(),
            });
            continue;
        }

        let size = match entry.metadata() {
            Ok(meta) => meta.len(),
            Err(e) => {
                tracing::warn!(path = %path, "Cannot read file size: {}", e);
                continue;
            }
        };
        if let Some(parent) = stack.last_mut() {
            parent.push_child(FileNode::File { name, path, size });
        }
    }

    while stack.len() > 1 {
        close_directory(&mut stack);
    }
    Ok(stack.remove(0))
}

fn close_directory(stack: &mut Vec<FileNode>) {
    if let Some(done) = stack.pop() {
        if let Some(parent) = stack.last_mut() {
            parent.push_child(done);
        }
    }
}

fn directories_first(a: &DirEntry, b: &DirEntry) -> Ordering {
    b.file_type()
        .is_dir()
        .cmp(&a.file_type().is_dir())
        .then_with(|| {
            a.file_name()
                .to_string_lossy()
                .to_lowercase()
                .cmp(&b.file_name().to_string_lossy().to_lowercase())
        })
}

fn is_ignored(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    // A worktree or submodule keeps `.git` as a plain file.
    if name == ".git" {
        return true;
    }
    if entry.file_type().is_dir() {
        IGNORED_DIRS.contains(&name.as_ref())
    } else {
        IGNORED_FILES.contains(&name.as_ref())
    }
}

fn relative_path(repo: &Path, path: &Path) -> String {
    path.strip_prefix(repo)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Count lines of code per language over the files tracked by git.
pub struct CalculateLocPerLanguage;

#[async_trait]
impl Tool for CalculateLocPerLanguage {
    fn name(&self) -> &str {
        "calculate_loc_per_language"
    }

    fn description(&self) -> &str {
        "Count non-blank lines of code per programming language across tracked files."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _args: Value, repo: &Path) -> anyhow::Result<Value> {
        tracing::info!(repo = %repo.display(), "Calculating LOC per language");

        let listing = match run_git_command(&["ls-files", "-z"], repo).await {
            Ok(listing) => listing,
            Err(e) => {
                tracing::error!("git ls-files failed: {}", e);
                return Ok(json!({ "error": format!("Git command failed: {}", e) }));
            }
        };

        let stats = loc_per_language(repo, listing.split('\0')).await;
        tracing::info!(?stats, "LOC calculation finished");
        Ok(serde_json::to_value(stats)?)
    }
}

/// Language label for a path, if its extension is in the table.
pub fn language_for(path: &str) -> Option<&'static str> {
    let ext = Path::new(path).extension()?.to_str()?;
    LANGUAGE_TABLE
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, language)| *language)
}

async fn loc_per_language<'a>(
    repo: &Path,
    tracked: impl Iterator<Item = &'a str>,
) -> BTreeMap<String, u64> {
    let mut stats = BTreeMap::new();

    for file in tracked.filter(|f| !f.is_empty()) {
        let Some(language) = language_for(file) else {
            continue;
        };

        let full_path = repo.join(file);
        let bytes = match tokio::fs::read(&full_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %full_path.display(), "Tracked file missing on disk");
                continue;
            }
            Err(e) => {
                tracing::error!(path = %full_path.display(), "Failed to read file: {}", e);
                continue;
            }
        };

        *stats.entry(language.to_string()).or_insert(0) += count_non_blank_lines(&bytes);
    }

    stats
}

fn count_non_blank_lines(bytes: &[u8]) -> u64 {
    String::from_utf8_lossy(bytes)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .count() as u64
}
