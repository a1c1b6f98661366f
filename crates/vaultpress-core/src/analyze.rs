//! Quick inventory of a vault: how many notes, which tags and link targets they use.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::notes::{discover_files, parse_note, FileFilter, ScanError};
use crate::pipeline::FileReport;

#[derive(Debug, Clone, Default, Serialize)]
pub struct VaultAnalysis {
    pub vault_path: PathBuf,
    pub total_files: usize,
    pub tags: BTreeSet<String>,
    pub links: BTreeSet<String>,
    pub errors: Vec<FileReport>,
}

/// Parses every `.md` file under `root` and collects the unique tags and link targets.
pub fn analyze_vault(root: &Path) -> Result<VaultAnalysis, ScanError> {
    let filter = FileFilter::new(&["*.md".to_string()], &[])?;
    let scan = discover_files(root, &filter, &[])?;
    let files = scan.files;
    let mut analysis = VaultAnalysis {
        vault_path: root.to_path_buf(),
        total_files: files.len(),
        errors: scan.unreadable,
        ..VaultAnalysis::default()
    };
    for file in &files {
        match parse_note(file) {
            Ok(note) => {
                analysis.tags.extend(note.tags);
                analysis.links.extend(note.outbound_links);
            }
            Err(e) => {
                tracing::warn!(path = %file.display(), "could not analyze: {e}");
                analysis.errors.push(FileReport {
                    path: file.clone(),
                    message: e.to_string(),
                });
            }
        }
    }
    Ok(analysis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_unique_tags_and_links() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "#one [[b]] [[c]]").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/b.md"), "---\ntags: [two]\n---\n#one [[c]]").unwrap();
        std::fs::write(dir.path().join("c.txt"), "#ignored").unwrap();

        let analysis = analyze_vault(dir.path()).unwrap();
        assert_eq!(analysis.total_files, 2);
        assert_eq!(analysis.tags.iter().collect::<Vec<_>>(), vec!["one", "two"]);
        assert_eq!(analysis.links.iter().collect::<Vec<_>>(), vec!["b", "c"]);
        assert!(analysis.errors.is_empty());
    }

    #[test]
    fn not_a_directory() {
        assert!(matches!(
            analyze_vault(Path::new("/no/such/vault")),
            Err(ScanError::NotADirectory(_))
        ));
    }
}
