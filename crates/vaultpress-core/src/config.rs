//! Conversion settings, with optional persistence in the app data directory.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app_data;

const CONFIG_FILENAME: &str = "config.toml";

/// Attachment extensions copied by default (compared lowercase, without the dot).
pub const DEFAULT_ATTACHMENT_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "svg", "pdf", "mp4", "mp3", "zip", "gltf", "glb",
];

/// Everything one conversion run needs. Built by the CLI, or loaded from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Root of the notes vault.
    pub vault_path: PathBuf,
    /// Hugo `content/` directory; converted notes land here.
    pub content_path: PathBuf,
    /// Hugo `static/` directory; attachments land here.
    pub static_path: PathBuf,
    pub archetypes_path: PathBuf,
    pub theme_name: String,
    /// Keep the note's own front matter fields in the output.
    pub preserve_front_matter: bool,
    pub convert_wikilinks: bool,
    /// Strip inline `#tags` from bodies (they are kept in front matter).
    pub convert_tags: bool,
    pub convert_attachments: bool,
    pub create_toc: bool,
    pub toc_max_depth: u32,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub attachment_extensions: BTreeSet<String>,
    /// Section landing page name (`_index`).
    pub index_name: String,
    /// Page name renamed to [`index_name`](Self::index_name) on output (`index`).
    pub implicit_index_name: String,
    /// Worker threads for per-file conversion. `None` uses rayon's default.
    pub concurrency: Option<usize>,
    /// Per-path debounce window for the change monitor, in seconds.
    pub debounce_secs: u64,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            vault_path: PathBuf::from("."),
            content_path: PathBuf::from("./content"),
            static_path: PathBuf::from("./static"),
            archetypes_path: PathBuf::from("./archetypes"),
            theme_name: "hugo-papermod".to_string(),
            preserve_front_matter: true,
            convert_wikilinks: true,
            convert_tags: true,
            convert_attachments: true,
            create_toc: true,
            toc_max_depth: 3,
            include_patterns: vec!["*.md".to_string()],
            exclude_patterns: Vec::new(),
            attachment_extensions: DEFAULT_ATTACHMENT_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
            index_name: "_index".to_string(),
            implicit_index_name: "index".to_string(),
            concurrency: None,
            debounce_secs: 2,
        }
    }
}

impl ConversionConfig {
    /// Defaults for everything except the vault root.
    pub fn new(vault_path: impl Into<PathBuf>) -> Self {
        Self {
            vault_path: vault_path.into(),
            ..Self::default()
        }
    }

    /// Places `content/`, `static/` and `archetypes/` under one Hugo site root.
    pub fn with_site_root(mut self, site_root: &Path) -> Self {
        self.content_path = site_root.join("content");
        self.static_path = site_root.join("static");
        self.archetypes_path = site_root.join("archetypes");
        self
    }

    /// True when `ext` (with or without a leading dot, any case) is a configured attachment type.
    pub fn is_attachment_extension(&self, ext: &str) -> bool {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        self.attachment_extensions
            .iter()
            .any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(&ext))
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }

    /// The three output roots, in the order they are created.
    pub fn output_roots(&self) -> [&Path; 3] {
        [
            self.content_path.as_path(),
            self.static_path.as_path(),
            self.archetypes_path.as_path(),
        ]
    }
}

/// Load the saved config from the app data directory. Returns the defaults if missing or invalid.
pub fn load_config() -> ConversionConfig {
    let Some(data_dir) = app_data::app_data_dir() else {
        return ConversionConfig::default();
    };
    let path = data_dir.join(CONFIG_FILENAME);
    if !path.is_file() {
        return ConversionConfig::default();
    }
    match load_config_from(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(path = %path.display(), "ignoring saved config: {e}");
            ConversionConfig::default()
        }
    }
}

/// Load a config from an explicit TOML file. Missing keys take their defaults.
pub fn load_config_from(path: &Path) -> Result<ConversionConfig, ConfigError> {
    let s = std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
    toml::from_str(&s).map_err(ConfigError::Parse)
}

/// Save config to the app data directory. Returns the file written.
pub fn save_config(config: &ConversionConfig) -> Result<PathBuf, ConfigError> {
    let data_dir = app_data::app_data_dir().ok_or(ConfigError::NoDataDir)?;
    let path = data_dir.join(CONFIG_FILENAME);
    save_config_to(config, &path)?;
    Ok(path)
}

pub fn save_config_to(config: &ConversionConfig, path: &Path) -> Result<(), ConfigError> {
    let s = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;
    std::fs::write(path, s).map_err(ConfigError::Write)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine app data directory")]
    NoDataDir,
    #[error("failed to read config {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("invalid config: {0}")]
    Parse(toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("failed to write config: {0}")]
    Write(std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_papermod_site_layout() {
        let config = ConversionConfig::new("vault");
        assert_eq!(config.vault_path, PathBuf::from("vault"));
        assert_eq!(config.include_patterns, vec!["*.md"]);
        assert_eq!(config.toc_max_depth, 3);
        assert_eq!(config.attachment_extensions.len(), 11);
        assert_eq!(config.debounce_window(), Duration::from_secs(2));
    }

    #[test]
    fn attachment_extensions_ignore_case_and_dot() {
        let config = ConversionConfig::default();
        assert!(config.is_attachment_extension("PNG"));
        assert!(config.is_attachment_extension(".glb"));
        assert!(!config.is_attachment_extension("md"));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: ConversionConfig = toml::from_str(
            "vault_path = \"/notes\"\ncreate_toc = false\nexclude_patterns = [\"**/draft/*\"]\n",
        )
        .unwrap();
        assert_eq!(config.vault_path, PathBuf::from("/notes"));
        assert!(!config.create_toc);
        assert_eq!(config.exclude_patterns, vec!["**/draft/*"]);
        assert!(config.convert_wikilinks);
        assert_eq!(config.index_name, "_index");
    }

    #[test]
    fn save_then_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = ConversionConfig::new("/vault").with_site_root(Path::new("/site"));
        config.concurrency = Some(4);
        save_config_to(&config, &path).unwrap();
        assert_eq!(load_config_from(&path).unwrap(), config);
    }

    #[test]
    fn load_from_missing_file_is_read_error() {
        let err = load_config_from(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read(..)));
    }
}
