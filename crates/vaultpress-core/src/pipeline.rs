//! Conversion pipeline: walk → link map → parse, rewrite and write each note → copy attachments.
//!
//! Discovery and the link map are vault-wide barriers. After the map is frozen, notes
//! are converted in parallel; each worker returns a [`FileOutcome`] and the outcomes
//! are folded into one [`ConversionStats`] at the end.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;

use crate::config::ConversionConfig;
use crate::front_matter::{build_front_matter, ConvertedDocument};
use crate::links::{to_output_path, IndexNames, LinkMap};
use crate::notes::{is_note_file, parse_note, walk_files, FileFilter, ParseError, ScanError};
use crate::rewrite::rewrite_note;

/// Counters for one run. A fresh value comes out of every [`convert`] call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversionStats {
    pub total_files: usize,
    pub converted_files: usize,
    pub skipped_files: usize,
    pub error_files: usize,
    pub attachments_copied: usize,
    pub links_converted: usize,
    pub tags_processed: usize,
    pub elapsed: Duration,
    /// Failed notes and attachments.
    pub errors: Vec<FileReport>,
    /// Recovered problems, such as unreadable front matter.
    pub warnings: Vec<FileReport>,
}

impl fmt::Display for ConversionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Conversion completed in {:.2}s", self.elapsed.as_secs_f64())?;
        writeln!(
            f,
            "Files: {}/{} converted, {} skipped, {} errors",
            self.converted_files, self.total_files, self.skipped_files, self.error_files
        )?;
        writeln!(f, "Attachments: {} copied", self.attachments_copied)?;
        writeln!(f, "Links: {} converted", self.links_converted)?;
        write!(f, "Tags: {} processed", self.tags_processed)
    }
}

/// A file path and what went wrong with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub message: String,
}

impl FileReport {
    pub(crate) fn new(path: &Path, message: impl fmt::Display) -> Self {
        Self {
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }
}

/// What happened to one discovered file.
#[derive(Debug)]
pub enum FileOutcome {
    Converted {
        links_converted: usize,
        tags_processed: usize,
        warning: Option<FileReport>,
    },
    Skipped,
    Failed(FileReport),
}

/// Converts the whole vault described by `config`.
///
/// Only vault-level problems return `Err`; per-file failures are counted in the stats.
pub fn convert(config: &ConversionConfig) -> Result<ConversionStats, PipelineError> {
    let started = Instant::now();
    let root = config.vault_path.as_path();
    if !root.is_dir() {
        return Err(PipelineError::VaultNotFound(root.to_path_buf()));
    }
    tracing::info!(vault = %root.display(), theme = %config.theme_name, "starting conversion");

    for dir in config.output_roots() {
        std::fs::create_dir_all(dir).map_err(|e| PipelineError::CreateDir(dir.to_path_buf(), e))?;
    }

    let filter = FileFilter::new(&config.include_patterns, &config.exclude_patterns)?;
    let scan = walk_files(root, &nested_output_roots(config))?;
    let files: Vec<PathBuf> = scan
        .files
        .iter()
        .filter(|path| filter.matches_under(root, path))
        .cloned()
        .collect();
    let mut stats = ConversionStats {
        total_files: files.len(),
        errors: scan.unreadable,
        ..ConversionStats::default()
    };
    if files.is_empty() {
        tracing::warn!(vault = %root.display(), "no markdown files found");
    }

    let names = IndexNames {
        explicit: config.index_name.clone(),
        implicit: config.implicit_index_name.clone(),
    };
    let link_map = LinkMap::build(root, &files, &names);
    tracing::debug!(entries = link_map.len(), "link map built");

    let outcomes = convert_all(&files, &link_map, &names, config)?;
    for outcome in outcomes {
        stats.record(outcome);
    }

    if config.convert_attachments {
        copy_attachments(config, &scan.files, &mut stats);
    }

    stats.elapsed = started.elapsed();
    tracing::info!(
        converted = stats.converted_files,
        total = stats.total_files,
        errors = stats.error_files,
        attachments = stats.attachments_copied,
        elapsed_ms = stats.elapsed.as_millis() as u64,
        "conversion finished"
    );
    Ok(stats)
}

impl ConversionStats {
    fn record(&mut self, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Converted {
                links_converted,
                tags_processed,
                warning,
            } => {
                self.converted_files += 1;
                self.links_converted += links_converted;
                self.tags_processed += tags_processed;
                self.warnings.extend(warning);
            }
            FileOutcome::Skipped => self.skipped_files += 1,
            FileOutcome::Failed(report) => {
                self.error_files += 1;
                self.errors.push(report);
            }
        }
    }
}

fn convert_all(
    files: &[PathBuf],
    link_map: &LinkMap,
    names: &IndexNames,
    config: &ConversionConfig,
) -> Result<Vec<FileOutcome>, PipelineError> {
    let run = || -> Vec<FileOutcome> {
        files
            .par_iter()
            .map(|file| convert_one(file, link_map, names, config))
            .collect()
    };
    match config.concurrency {
        Some(threads) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(PipelineError::ThreadPool)?;
            Ok(pool.install(run))
        }
        None => Ok(run()),
    }
}

/// Converts a single discovered file. Never fails the run.
pub fn convert_one(
    file: &Path,
    link_map: &LinkMap,
    names: &IndexNames,
    config: &ConversionConfig,
) -> FileOutcome {
    if !is_note_file(file) {
        tracing::debug!(path = %file.display(), "not a note, skipping");
        return FileOutcome::Skipped;
    }
    match convert_note(file, link_map, names, config) {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(path = %file.display(), "conversion failed: {e}");
            FileOutcome::Failed(FileReport::new(file, e))
        }
    }
}

fn convert_note(
    file: &Path,
    link_map: &LinkMap,
    names: &IndexNames,
    config: &ConversionConfig,
) -> Result<FileOutcome, FileError> {
    let note = parse_note(file)?;
    let rewritten = rewrite_note(&note, link_map, config);

    let relative = file
        .strip_prefix(&config.vault_path)
        .map_err(|_| FileError::OutsideVault(file.to_path_buf()))?;
    let url = to_output_path(relative, names);
    let document = ConvertedDocument {
        output_path: config.content_path.join(format!("{url}.md")),
        body: rewritten.body,
        front_matter: build_front_matter(&note, config),
        url,
    };
    write_document(&document)?;
    tracing::debug!(path = %file.display(), output = %document.output_path.display(), "converted");

    Ok(FileOutcome::Converted {
        links_converted: rewritten.links_converted,
        tags_processed: rewritten.tags_processed,
        warning: note.metadata_warning.map(|w| FileReport::new(file, w)),
    })
}

/// Renders `document` and writes it in one call, creating parent directories first.
fn write_document(document: &ConvertedDocument) -> Result<(), FileError> {
    let text = document.render().map_err(FileError::Render)?;
    if let Some(parent) = document.output_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| FileError::CreateDir(parent.to_path_buf(), e))?;
    }
    std::fs::write(&document.output_path, text)
        .map_err(|e| FileError::Write(document.output_path.clone(), e))
}

/// Output roots that lie inside the vault, rebased onto `config.vault_path` so they
/// compare directly against walked paths.
fn nested_output_roots(config: &ConversionConfig) -> Vec<PathBuf> {
    let vault = config.vault_path.as_path();
    let Ok(vault_real) = vault.canonicalize() else {
        return Vec::new();
    };
    config
        .output_roots()
        .iter()
        .filter_map(|dir| {
            let real = dir.canonicalize().ok()?;
            let relative = real.strip_prefix(&vault_real).ok()?;
            (!relative.as_os_str().is_empty()).then(|| vault.join(relative))
        })
        .collect()
}

/// Copies every attachment among `files` to the same relative path under the static root.
fn copy_attachments(config: &ConversionConfig, files: &[PathBuf], stats: &mut ConversionStats) {
    let root = config.vault_path.as_path();
    for file in files {
        let is_attachment = file
            .extension()
            .is_some_and(|e| config.is_attachment_extension(&e.to_string_lossy()));
        if !is_attachment {
            continue;
        }
        let Ok(relative) = file.strip_prefix(root) else {
            continue;
        };
        let target = config.static_path.join(relative);
        match copy_file(file, &target) {
            Ok(()) => stats.attachments_copied += 1,
            Err(e) => {
                tracing::error!(path = %file.display(), "attachment copy failed: {e}");
                stats.errors.push(FileReport::new(file, e));
            }
        }
    }
}

fn copy_file(src: &Path, dest: &Path) -> Result<(), FileError> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|e| FileError::CreateDir(parent.to_path_buf(), e))?;
    }
    std::fs::copy(src, dest)
        .map(|_| ())
        .map_err(|e| FileError::Copy(dest.to_path_buf(), e))
}

/// Why a single file could not be converted or copied.
#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("not inside the vault: {0}")]
    OutsideVault(PathBuf),
    #[error("failed to create {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),
    #[error("failed to render front matter: {0}")]
    Render(serde_yaml::Error),
    #[error("failed to write {0}: {1}")]
    Write(PathBuf, std::io::Error),
    #[error("failed to copy to {0}: {1}")]
    Copy(PathBuf, std::io::Error),
}

/// Errors that stop a run before any file is converted.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("vault not found: {0}")]
    VaultNotFound(PathBuf),
    #[error("scan error: {0}")]
    Scan(#[from] ScanError),
    #[error("failed to create {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),
    #[error("failed to start worker pool: {0}")]
    ThreadPool(rayon::ThreadPoolBuildError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_summarizes_counts() {
        let stats = ConversionStats {
            total_files: 3,
            converted_files: 2,
            error_files: 1,
            links_converted: 5,
            ..ConversionStats::default()
        };
        let text = stats.to_string();
        assert!(text.contains("Files: 2/3 converted, 0 skipped, 1 errors"));
        assert!(text.contains("Links: 5 converted"));
    }

    #[test]
    fn record_folds_outcomes() {
        let mut stats = ConversionStats::default();
        stats.record(FileOutcome::Converted {
            links_converted: 2,
            tags_processed: 1,
            warning: Some(FileReport::new(Path::new("a.md"), "bad yaml")),
        });
        stats.record(FileOutcome::Skipped);
        stats.record(FileOutcome::Failed(FileReport::new(Path::new("b.md"), "boom")));
        assert_eq!(stats.converted_files, 1);
        assert_eq!(stats.skipped_files, 1);
        assert_eq!(stats.error_files, 1);
        assert_eq!(stats.links_converted, 2);
        assert_eq!(stats.warnings.len(), 1);
        assert_eq!(stats.errors[0].message, "boom");
    }

    #[test]
    fn missing_vault_aborts() {
        let config = ConversionConfig::new("/no/such/vault");
        assert!(matches!(convert(&config), Err(PipelineError::VaultNotFound(_))));
    }

    #[test]
    fn missing_note_is_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConversionConfig::new(dir.path()).with_site_root(&dir.path().join("site"));
        let outcome = convert_one(
            &dir.path().join("gone.md"),
            &LinkMap::new(),
            &IndexNames::default(),
            &config,
        );
        match outcome {
            FileOutcome::Failed(report) => assert!(report.message.contains("not found")),
            other => panic!("expected failure, got {other:?}"),
        }
    }
}
