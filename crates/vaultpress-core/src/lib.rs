//! All conversion logic, independent of how it is driven (CLI or a future GUI).
//!
//! A vault of markdown notes is converted into a Hugo content tree. The vault is
//! only read; saved settings live in the app data directory (see [app_data]).

pub mod analyze;
pub mod app_data;
pub mod config;
pub mod front_matter;
pub mod links;
pub mod notes;
pub mod pipeline;
pub mod rewrite;
pub mod watcher;

pub use analyze::{analyze_vault, VaultAnalysis};
pub use app_data::app_data_dir;
pub use config::{load_config, load_config_from, save_config, ConfigError, ConversionConfig};
pub use front_matter::{build_front_matter, ConvertedDocument};
pub use links::{to_output_path, IndexNames, LinkMap};
pub use notes::{discover_files, parse_note, parse_note_str, walk_files, FileFilter, Note, ParseError, ScanError, VaultScan};
pub use pipeline::{convert, ConversionStats, FileError, FileReport, PipelineError};
pub use rewrite::{rewrite_note, RewrittenBody};
pub use watcher::{ChangeMonitor, DebounceTable, MonitorExit, WatchError};
