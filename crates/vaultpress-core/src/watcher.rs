//! Change monitor for the vault. Re-runs the whole conversion when notes change.
//!
//! Filesystem events arrive through `notify-debouncer-mini` and are forwarded to a
//! single consumer thread, so two conversions never run at the same time. Each path
//! then goes through a per-path debounce before it may trigger a run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use notify_debouncer_mini::notify::{self, RecommendedWatcher, Watcher};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, Debouncer};

use crate::config::ConversionConfig;
use crate::notes::{FileFilter, ScanError};
use crate::pipeline::{convert, ConversionStats, PipelineError};

/// How long the backend batches raw events before handing them over.
const BATCH_WINDOW: Duration = Duration::from_millis(250);

/// Remembers when each path last triggered a run.
#[derive(Debug)]
pub struct DebounceTable {
    window: Duration,
    last_trigger: HashMap<PathBuf, Instant>,
}

impl DebounceTable {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_trigger: HashMap::new(),
        }
    }

    /// True if `path` may trigger at `now`; records the trigger when it does.
    pub fn should_trigger(&mut self, path: &Path, now: Instant) -> bool {
        if let Some(last) = self.last_trigger.get(path) {
            if now.saturating_duration_since(*last) < self.window {
                return false;
            }
        }
        self.last_trigger.insert(path.to_path_buf(), now);
        true
    }
}

/// How a monitor ended.
#[derive(Debug)]
pub enum MonitorExit {
    /// [`ChangeMonitor::stop`] was called.
    Stopped,
    /// The watch backend failed; the monitor cannot continue.
    Failed(WatchError),
}

enum Signal {
    Changed(Vec<PathBuf>),
    WatchFailed(String),
    Stop,
}

/// Decides which events qualify and when to run the pipeline.
struct MonitorLoop<F> {
    config: ConversionConfig,
    vault_root: PathBuf,
    ignored_roots: Vec<PathBuf>,
    filter: FileFilter,
    debounce: DebounceTable,
    stopping: Arc<AtomicBool>,
    on_run: F,
}

impl<F> MonitorLoop<F>
where
    F: FnMut(Result<ConversionStats, PipelineError>),
{
    fn new(config: ConversionConfig, vault_root: PathBuf, on_run: F) -> Result<Self, WatchError> {
        let filter = FileFilter::new(&config.include_patterns, &config.exclude_patterns)
            .map_err(WatchError::Filter)?;
        let ignored_roots = config
            .output_roots()
            .iter()
            .map(|p| p.canonicalize().unwrap_or_else(|_| p.to_path_buf()))
            .collect();
        Ok(Self {
            debounce: DebounceTable::new(config.debounce_window()),
            config,
            vault_root,
            ignored_roots,
            filter,
            stopping: Arc::new(AtomicBool::new(false)),
            on_run,
        })
    }

    /// Flag that, once set, keeps queued batches from starting another run.
    fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stopping)
    }

    fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    fn qualifies(&self, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(&self.vault_root) else {
            return false;
        };
        if self.ignored_roots.iter().any(|r| path.starts_with(r)) || path.is_dir() {
            return false;
        }
        self.filter.matches(relative)
    }

    /// Runs the pipeline once if any qualifying path passes the debounce. Returns whether it ran.
    fn handle_changes(&mut self, paths: &[PathBuf], now: Instant) -> bool {
        let mut triggered = false;
        for path in paths {
            if self.qualifies(path) && self.debounce.should_trigger(path, now) {
                tracing::info!(path = %path.display(), "change detected");
                triggered = true;
            }
        }
        if triggered && self.is_stopping() {
            tracing::debug!("stop requested, dropping queued changes");
            return false;
        }
        if triggered {
            let result = convert(&self.config);
            if let Err(e) = &result {
                tracing::error!("conversion failed: {e}");
            }
            (self.on_run)(result);
        }
        triggered
    }

    fn run(mut self, rx: mpsc::Receiver<Signal>) -> MonitorExit {
        while let Ok(signal) = rx.recv() {
            if self.is_stopping() {
                break;
            }
            match signal {
                Signal::Changed(paths) => {
                    self.handle_changes(&paths, Instant::now());
                }
                Signal::WatchFailed(e) => {
                    tracing::error!("watch failed: {e}");
                    return MonitorExit::Failed(WatchError::Backend(e));
                }
                Signal::Stop => break,
            }
        }
        tracing::info!("change monitor stopped");
        MonitorExit::Stopped
    }
}

/// A running watch over the vault. Once it has stopped, start a new one to resume.
pub struct ChangeMonitor {
    tx: mpsc::Sender<Signal>,
    stopping: Arc<AtomicBool>,
    worker: JoinHandle<MonitorExit>,
    _debouncer: Debouncer<RecommendedWatcher>,
}

impl ChangeMonitor {
    /// Starts watching `config.vault_path` recursively. `on_run` receives the result
    /// of every pipeline run the monitor triggers.
    pub fn start<F>(config: ConversionConfig, on_run: F) -> Result<Self, WatchError>
    where
        F: FnMut(Result<ConversionStats, PipelineError>) + Send + 'static,
    {
        let root = config.vault_path.clone();
        if !root.is_dir() {
            return Err(WatchError::NotADirectory(root));
        }
        let root = root.canonicalize().map_err(WatchError::Canonicalize)?;
        let worker_loop = MonitorLoop::new(config, root.clone(), on_run)?;
        let stopping = worker_loop.stop_handle();

        let (tx, rx) = mpsc::channel::<Signal>();
        let events_tx = tx.clone();
        let mut debouncer = new_debouncer(BATCH_WINDOW, move |res: DebounceEventResult| {
            let signal = match res {
                Ok(events) => Signal::Changed(events.into_iter().map(|e| e.path).collect()),
                Err(e) => Signal::WatchFailed(e.to_string()),
            };
            let _ = events_tx.send(signal);
        })
        .map_err(|e| WatchError::Notify(e.to_string()))?;

        debouncer
            .watcher()
            .watch(&root, notify::RecursiveMode::Recursive)
            .map_err(|e| WatchError::Watch(e.to_string()))?;

        let worker = std::thread::Builder::new()
            .name("vaultpress-monitor".to_string())
            .spawn(move || worker_loop.run(rx))
            .map_err(WatchError::Thread)?;

        tracing::info!(vault = %root.display(), "watching for changes");
        Ok(Self {
            tx,
            stopping,
            worker,
            _debouncer: debouncer,
        })
    }

    /// False once the monitor has stopped on its own (watch failure).
    pub fn is_running(&self) -> bool {
        !self.worker.is_finished()
    }

    /// Stops event processing. A run already in progress finishes first; changes
    /// queued behind it are dropped.
    pub fn stop(self) -> MonitorExit {
        self.stopping.store(true, Ordering::SeqCst);
        let _ = self.tx.send(Signal::Stop);
        drop(self._debouncer);
        join(self.worker)
    }

    /// Blocks until the monitor ends on its own, which only a watch failure causes.
    pub fn wait(self) -> MonitorExit {
        let Self {
            tx,
            worker,
            _debouncer,
            ..
        } = self;
        drop(tx);
        join(worker)
    }
}

fn join(worker: JoinHandle<MonitorExit>) -> MonitorExit {
    worker
        .join()
        .unwrap_or_else(|_| MonitorExit::Failed(WatchError::Backend("monitor thread panicked".to_string())))
}

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("failed to resolve path: {0}")]
    Canonicalize(std::io::Error),
    #[error("invalid watch patterns: {0}")]
    Filter(ScanError),
    #[error("watcher init: {0}")]
    Notify(String),
    #[error("watch failed: {0}")]
    Watch(String),
    #[error("watch backend error: {0}")]
    Backend(String),
    #[error("failed to spawn monitor thread: {0}")]
    Thread(std::io::Error),
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn debounce_is_per_path() {
        let mut table = DebounceTable::new(Duration::from_secs(2));
        let t0 = Instant::now();
        assert!(table.should_trigger(Path::new("a.md"), t0));
        assert!(!table.should_trigger(Path::new("a.md"), t0 + Duration::from_millis(500)));
        assert!(table.should_trigger(Path::new("b.md"), t0 + Duration::from_millis(500)));
        assert!(table.should_trigger(Path::new("a.md"), t0 + Duration::from_secs(2)));
    }

    #[test]
    fn suppressed_events_do_not_extend_the_window() {
        let mut table = DebounceTable::new(Duration::from_secs(2));
        let t0 = Instant::now();
        assert!(table.should_trigger(Path::new("a.md"), t0));
        assert!(!table.should_trigger(Path::new("a.md"), t0 + Duration::from_millis(1900)));
        assert!(table.should_trigger(Path::new("a.md"), t0 + Duration::from_millis(2100)));
    }

    fn vault_config(dir: &Path) -> ConversionConfig {
        let vault = dir.join("vault");
        std::fs::create_dir_all(vault.join("draft")).unwrap();
        std::fs::write(vault.join("a.md"), "# A").unwrap();
        let mut config = ConversionConfig::new(vault.canonicalize().unwrap())
            .with_site_root(&dir.join("site"));
        config.exclude_patterns = vec!["**/draft/*".to_string()];
        config
    }

    #[test]
    fn loop_runs_pipeline_once_per_qualifying_batch() {
        let dir = tempfile::tempdir().unwrap();
        let config = vault_config(dir.path());
        let root = config.vault_path.clone();
        let runs = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&runs);
        let mut monitor = MonitorLoop::new(config, root.clone(), move |res| {
            sink.lock().unwrap().push(res.map(|s| s.converted_files).ok());
        })
        .unwrap();

        let t0 = Instant::now();
        assert!(monitor.handle_changes(&[root.join("a.md"), root.join("b.md")], t0));
        assert!(!monitor.handle_changes(&[root.join("a.md")], t0 + Duration::from_secs(1)));
        assert!(!monitor.handle_changes(&[root.join("draft/x.md")], t0));
        assert!(!monitor.handle_changes(&[root.join("pic.png")], t0));
        assert!(!monitor.handle_changes(&[PathBuf::from("/elsewhere/a.md")], t0));
        assert!(monitor.handle_changes(&[root.join("a.md")], t0 + Duration::from_secs(3)));

        assert_eq!(*runs.lock().unwrap(), vec![Some(1), Some(1)]);
    }

    #[test]
    fn output_tree_inside_vault_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = vault_config(dir.path());
        let root = config.vault_path.clone();
        config = config.with_site_root(&root.join("site"));
        std::fs::create_dir_all(root.join("site/content")).unwrap();
        let mut monitor = MonitorLoop::new(config, root.clone(), |_| {}).unwrap();
        assert!(!monitor.handle_changes(&[root.join("site/content/a.md")], Instant::now()));
    }

    #[test]
    fn start_requires_existing_vault() {
        let err = ChangeMonitor::start(ConversionConfig::new("/no/such/vault"), |_| {}).err();
        assert!(matches!(err, Some(WatchError::NotADirectory(_))));
    }

    #[test]
    fn stop_ends_in_stopped_state() {
        let dir = tempfile::tempdir().unwrap();
        let config = vault_config(dir.path());
        let monitor = ChangeMonitor::start(config, |_| {}).unwrap();
        assert!(monitor.is_running());
        assert!(matches!(monitor.stop(), MonitorExit::Stopped));
    }

    #[test]
    fn stop_drops_batches_queued_behind_the_current_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = vault_config(dir.path());
        let root = config.vault_path.clone();
        let flag = Arc::new(AtomicBool::new(false));
        let stop_during_run = Arc::clone(&flag);
        let runs = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&runs);
        let mut monitor = MonitorLoop::new(config, root.clone(), move |_| {
            *sink.lock().unwrap() += 1;
            stop_during_run.store(true, Ordering::SeqCst);
        })
        .unwrap();
        monitor.stopping = flag;

        let (tx, rx) = mpsc::channel();
        for name in ["a.md", "b.md", "c.md"] {
            tx.send(Signal::Changed(vec![root.join(name)])).unwrap();
        }
        tx.send(Signal::Stop).unwrap();

        assert!(matches!(monitor.run(rx), MonitorExit::Stopped));
        assert_eq!(*runs.lock().unwrap(), 1);
    }

    #[test]
    fn stop_requested_before_any_run_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = vault_config(dir.path());
        let root = config.vault_path.clone();
        let mut monitor = MonitorLoop::new(config, root.clone(), |_| panic!("no run expected")).unwrap();
        monitor.stop_handle().store(true, Ordering::SeqCst);
        assert!(!monitor.handle_changes(&[root.join("a.md")], Instant::now()));
    }

    #[test]
    fn watch_failure_ends_in_failed_state() {
        let dir = tempfile::tempdir().unwrap();
        let config = vault_config(dir.path());
        let root = config.vault_path.clone();
        let monitor = MonitorLoop::new(config, root.clone(), |_| panic!("no run expected")).unwrap();

        let (tx, rx) = mpsc::channel();
        tx.send(Signal::WatchFailed("inotify watch limit reached".to_string())).unwrap();
        tx.send(Signal::Changed(vec![root.join("a.md")])).unwrap();

        assert!(matches!(
            monitor.run(rx),
            MonitorExit::Failed(WatchError::Backend(msg)) if msg.contains("inotify")
        ));
    }

    #[test]
    fn wait_returns_after_backend_failure() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = ChangeMonitor::start(vault_config(dir.path()), |_| {}).unwrap();
        monitor
            .tx
            .send(Signal::WatchFailed("backend gone".to_string()))
            .unwrap();
        assert!(matches!(monitor.wait(), MonitorExit::Failed(WatchError::Backend(_))));
    }
}
