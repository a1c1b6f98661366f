//! Discovering and parsing markdown notes from the vault.
//!
//! The vault is only ever read. A parsed [`Note`] carries its front matter, body,
//! tags and outbound wikilinks; rewriting happens later in [`crate::rewrite`].

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use glob::Pattern;
use regex::Regex;
use serde_yaml::{Mapping, Value};
use walkdir::WalkDir;

use crate::pipeline::FileReport;

/// `#tag`: one or more ASCII letters, digits, `_` or `-`.
pub(crate) static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#([a-zA-Z0-9_-]+)").expect("tag regex"));

/// `[[target]]` or `[[target|display]]`.
pub(crate) static WIKILINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[([^|\]]+)(?:\|([^\]]+))?\]\]").expect("wikilink regex"));

const FENCE: &str = "---";

/// A parsed note. Produced once per file and discarded after it is written.
#[derive(Debug, Clone)]
pub struct Note {
    pub source_path: PathBuf,
    pub title: String,
    /// Front matter as written, in its original key order.
    pub metadata: Mapping,
    /// Content without the front matter block.
    pub body: String,
    /// Front matter tags and inline `#tags`, without the `#`.
    pub tags: BTreeSet<String>,
    /// Wikilink targets in body order, duplicates kept. Section anchors (`#...`) are left out.
    pub outbound_links: Vec<String>,
    pub created_date: Option<String>,
    pub modified_date: Option<String>,
    /// Set when a front matter block was present but could not be read.
    pub metadata_warning: Option<String>,
}

/// Reads and parses the note at `path`.
pub fn parse_note(path: &Path) -> Result<Note, ParseError> {
    if !path.is_file() {
        return Err(ParseError::NotFound(path.to_path_buf()));
    }
    let content =
        std::fs::read_to_string(path).map_err(|e| ParseError::Read(path.to_path_buf(), e))?;
    Ok(parse_note_str(path, &content))
}

/// Parses note `content` as if it had been read from `path`.
pub fn parse_note_str(path: &Path, content: &str) -> Note {
    let (block, body) = split_front_matter(content);
    let (metadata, metadata_warning) = match block {
        Some(yaml) => match parse_metadata(yaml) {
            Ok(m) => (m, None),
            Err(msg) => {
                tracing::warn!(path = %path.display(), "malformed front matter, using none: {msg}");
                (Mapping::new(), Some(msg))
            }
        },
        None => (Mapping::new(), None),
    };

    let title = metadata
        .get("title")
        .and_then(scalar_to_string)
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| file_stem(path));

    let mut tags = metadata_tags(&metadata);
    tags.extend(extract_inline_tags(body));

    Note {
        source_path: path.to_path_buf(),
        title,
        created_date: metadata.get("created").and_then(scalar_to_string),
        modified_date: metadata.get("modified").and_then(scalar_to_string),
        tags,
        outbound_links: extract_links(body),
        body: body.to_string(),
        metadata,
        metadata_warning,
    }
}

/// Splits a leading `---` fenced block from the body.
///
/// The opening fence must be the very first line. Without a closing fence the
/// whole content is body.
fn split_front_matter(content: &str) -> (Option<&str>, &str) {
    let Some(first_nl) = content.find('\n') else {
        return (None, content);
    };
    if content[..first_nl].trim_end() != FENCE {
        return (None, content);
    }
    let rest = &content[first_nl + 1..];
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == FENCE {
            let yaml = &rest[..offset];
            let body = rest[offset + line.len()..].trim_start_matches(|c: char| c == '\n' || c == '\r');
            return (Some(yaml), body);
        }
        offset += line.len();
    }
    (None, content)
}

fn parse_metadata(yaml: &str) -> Result<Mapping, String> {
    if yaml.trim().is_empty() {
        return Ok(Mapping::new());
    }
    match serde_yaml::from_str::<Value>(yaml) {
        Ok(Value::Mapping(m)) => Ok(m),
        Ok(Value::Null) => Ok(Mapping::new()),
        Ok(_) => Err("front matter is not a key/value mapping".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

/// Strings as-is, numbers and booleans stringified; null and collections give `None`.
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Tagged(t) => scalar_to_string(&t.value),
        _ => None,
    }
}

fn metadata_tags(metadata: &Mapping) -> BTreeSet<String> {
    let raw: Vec<String> = match metadata.get("tags") {
        Some(Value::Sequence(items)) => items.iter().filter_map(scalar_to_string).collect(),
        Some(other) => scalar_to_string(other).into_iter().collect(),
        None => Vec::new(),
    };
    raw.iter()
        .map(|t| t.trim().trim_start_matches('#').to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

fn extract_inline_tags(body: &str) -> impl Iterator<Item = String> + '_ {
    TAG_RE.captures_iter(body).map(|c| c[1].to_string())
}

fn extract_links(body: &str) -> Vec<String> {
    WIKILINK_RE
        .captures_iter(body)
        .map(|c| c[1].trim().to_string())
        .filter(|t| !t.is_empty() && !t.starts_with('#'))
        .collect()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// True for `.md` files, the only files treated as notes.
pub fn is_note_file(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "md")
}

/// Include/exclude glob rules, applied to vault-relative paths.
///
/// A pattern containing `/` matches the whole relative path; a bare pattern
/// such as `*.md` matches the file name at any depth.
#[derive(Debug, Clone)]
pub struct FileFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl FileFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self, ScanError> {
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
        })
    }

    /// Included by at least one pattern and excluded by none.
    pub fn matches(&self, relative: &Path) -> bool {
        self.include.iter().any(|p| pattern_matches(p, relative))
            && !self.exclude.iter().any(|p| pattern_matches(p, relative))
    }

    /// [`matches`](Self::matches) for a path under `root`; false for paths outside it.
    pub fn matches_under(&self, root: &Path, path: &Path) -> bool {
        path.strip_prefix(root).is_ok_and(|relative| self.matches(relative))
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Pattern>, ScanError> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|e| ScanError::Pattern {
                pattern: p.clone(),
                message: e.to_string(),
            })
        })
        .collect()
}

fn pattern_matches(pattern: &Pattern, relative: &Path) -> bool {
    if pattern.as_str().contains('/') {
        pattern.matches_path(relative)
    } else {
        relative
            .file_name()
            .is_some_and(|name| pattern.matches(&name.to_string_lossy()))
    }
}

/// Files found under the vault, plus the entries below the root that could not be read.
#[derive(Debug, Default)]
pub struct VaultScan {
    pub files: Vec<PathBuf>,
    pub unreadable: Vec<FileReport>,
}

/// Walks `root` and returns every regular file passing `filter`, sorted by path.
/// Hidden entries below the root (`.obsidian`, `.git`, ...) and anything under `skip`
/// are left out; symlinks are not followed.
pub fn discover_files(root: &Path, filter: &FileFilter, skip: &[PathBuf]) -> Result<VaultScan, ScanError> {
    let mut scan = walk_files(root, skip)?;
    scan.files.retain(|path| filter.matches_under(root, path));
    Ok(scan)
}

/// Every regular file under `root` in sorted walk order, hidden entries and `skip` trees left out.
///
/// Only a failure on `root` itself is an error. Subdirectories that cannot be read are
/// reported in [`VaultScan::unreadable`] and the walk continues past them.
pub fn walk_files(root: &Path, skip: &[PathBuf]) -> Result<VaultScan, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }
    let mut scan = VaultScan::default();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_hidden(e) && !skip.iter().any(|s| e.path().starts_with(s)))
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(ScanError::Walk(e.to_string())),
            Err(e) => {
                let path = e.path().unwrap_or(root).to_path_buf();
                tracing::warn!(path = %path.display(), "skipping unreadable entry: {e}");
                scan.unreadable.push(FileReport::new(&path, e));
                continue;
            }
        };
        if entry.file_type().is_file() {
            scan.files.push(entry.into_path());
        }
    }
    Ok(scan)
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|s| s.starts_with('.'))
            .unwrap_or(false)
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("file not found: {0}")]
    NotFound(PathBuf),
    #[error("read error for {0}: {1}")]
    Read(PathBuf, std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("walk error: {0}")]
    Walk(String),
    #[error("invalid glob pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },
}
