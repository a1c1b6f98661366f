//! Vault-wide link map: note stem → output path. Built once per run, before any rewrite.

use std::collections::HashMap;
use std::path::{Component, Path};

use crate::notes::is_note_file;

/// Names used for section landing pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexNames {
    /// Kept as-is (`_index`).
    pub explicit: String,
    /// Renamed to `explicit` (`index`).
    pub implicit: String,
}

impl Default for IndexNames {
    fn default() -> Self {
        Self {
            explicit: "_index".to_string(),
            implicit: "index".to_string(),
        }
    }
}

/// Output path for a vault-relative note path: extension dropped, `/`-separated,
/// and an implicit index page renamed to the explicit index name.
pub fn to_output_path(relative: &Path, names: &IndexNames) -> String {
    let stripped = relative.with_extension("");
    let mut segments: Vec<String> = stripped
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if let Some(last) = segments.last_mut() {
        if *last == names.implicit {
            *last = names.explicit.clone();
        }
    }
    segments.join("/")
}

/// Maps a note's file stem to its output path (no extension).
///
/// Keys are bare stems, so two notes with the same name in different folders
/// collide; the one enumerated last wins.
#[derive(Debug, Clone, Default)]
pub struct LinkMap {
    entries: HashMap<String, String>,
}

impl LinkMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the map from every `.md` file in `files`, in order.
    pub fn build(vault_root: &Path, files: &[impl AsRef<Path>], names: &IndexNames) -> Self {
        let mut map = Self::new();
        for file in files {
            let file = file.as_ref();
            if !is_note_file(file) {
                continue;
            }
            let Ok(relative) = file.strip_prefix(vault_root) else {
                tracing::warn!(path = %file.display(), "note outside the vault, not linkable");
                continue;
            };
            let Some(stem) = file.file_stem() else {
                continue;
            };
            map.insert(stem.to_string_lossy(), to_output_path(relative, names));
        }
        map
    }

    pub fn insert(&mut self, key: impl Into<String>, output_path: impl Into<String>) {
        let key = key.into();
        let output_path = output_path.into();
        if let Some(previous) = self.entries.get(&key) {
            tracing::debug!(%key, %previous, replacement = %output_path, "link target collision");
        }
        self.entries.insert(key, output_path);
    }

    /// Exact, case-sensitive lookup.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
