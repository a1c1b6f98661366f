//! Where vaultpress keeps its own data (saved conversion settings).
//!
//! Vaults and generated sites stay wherever the user points us. Only app state lives here.

use std::path::PathBuf;

/// Returns the directory where vaultpress stores its saved config.
/// On macOS: `~/Library/Application Support/vaultpress/`.
/// Creates the directory if it doesn't exist; returns `None` if we can't determine the path.
pub fn app_data_dir() -> Option<PathBuf> {
    let dir = directories::ProjectDirs::from("app", "vaultpress", "vaultpress")?
        .config_dir()
        .to_path_buf();
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir)
}
