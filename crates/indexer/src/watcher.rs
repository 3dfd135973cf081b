use crate::error::{IndexerError, Result};
use crate::indexer::ProjectIndexer;
use crate::scanner;
use crate::stats::IndexStats;
use log::{error, warn};
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::{broadcast, mpsc, watch, Mutex as TokioMutex};
use tokio::time;

const FS_EVENT_REASON: &str = "fs_event";
const DIR_EVENT_REASON: &str = "directory_change";

/// One completed sync cycle, broadcast to subscribers.
#[derive(Debug, Clone)]
pub struct SyncUpdate {
    pub completed_at: SystemTime,
    pub duration_ms: u64,
    pub stats: Option<IndexStats>,
    pub success: bool,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WatcherHealth {
    pub last_success: Option<SystemTime>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub last_duration_ms: Option<u64>,
    pub pending_paths: usize,
    pub indexing: bool,
}

impl WatcherHealth {
    fn initial() -> Self {
        Self {
            last_success: None,
            last_error: None,
            consecutive_failures: 0,
            last_duration_ms: None,
            pending_paths: 0,
            indexing: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub debounce: Duration,
    pub max_batch_wait: Duration,
    pub notify_poll_interval: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(400),
            max_batch_wait: Duration::from_secs(2),
            notify_poll_interval: Duration::from_secs(2),
        }
    }
}

/// Debounced filesystem watcher that drives per-path incremental sync.
///
/// Events for the same path collapse into one pending entry; quiet time
/// (`debounce`) flushes the batch, and `max_batch_wait` caps how long a
/// steady stream of events can defer a flush.
#[derive(Clone)]
pub struct ChangeWatcher {
    inner: Arc<ChangeWatcherInner>,
}

struct ChangeWatcherInner {
    command_tx: mpsc::Sender<WatcherCommand>,
    update_tx: broadcast::Sender<SyncUpdate>,
    health_tx: watch::Sender<WatcherHealth>,
    _watcher: Arc<std::sync::Mutex<Option<RecommendedWatcher>>>,
    _health_guard: TokioMutex<watch::Receiver<WatcherHealth>>,
}

enum WatcherCommand {
    FullSync { reason: String },
    Shutdown,
}

impl ChangeWatcher {
    pub fn start(indexer: Arc<ProjectIndexer>, config: WatcherConfig) -> Result<Self> {
        let (event_tx, event_rx) = mpsc::channel(1024);
        let (command_tx, command_rx) = mpsc::channel(16);
        let (health_tx, health_rx) = watch::channel(WatcherHealth::initial());
        let (update_tx, _) = broadcast::channel(32);

        let watcher = create_fs_watcher(indexer.root(), event_tx, config.notify_poll_interval)?;
        let watcher = Arc::new(std::sync::Mutex::new(Some(watcher)));

        spawn_sync_loop(
            indexer,
            config,
            event_rx,
            command_rx,
            update_tx.clone(),
            health_tx.clone(),
        );

        Ok(Self {
            inner: Arc::new(ChangeWatcherInner {
                command_tx,
                update_tx,
                health_tx,
                _watcher: watcher,
                _health_guard: TokioMutex::new(health_rx),
            }),
        })
    }

    /// Queue a full project sweep, bypassing the debounce window.
    pub async fn trigger_full_sync(&self, reason: impl Into<String>) -> Result<()> {
        self.inner
            .command_tx
            .send(WatcherCommand::FullSync {
                reason: reason.into(),
            })
            .await
            .map_err(|e| IndexerError::Other(format!("failed to send sync command: {e}")))?;
        Ok(())
    }

    #[must_use]
    pub fn subscribe_updates(&self) -> broadcast::Receiver<SyncUpdate> {
        self.inner.update_tx.subscribe()
    }

    #[must_use]
    pub fn health_snapshot(&self) -> WatcherHealth {
        self.inner.health_tx.subscribe().borrow().clone()
    }

    #[must_use]
    pub fn health_stream(&self) -> watch::Receiver<WatcherHealth> {
        self.inner.health_tx.subscribe()
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        if Arc::strong_count(&self.inner) == 1 {
            let _ = self.inner.command_tx.try_send(WatcherCommand::Shutdown);
        }
    }
}

fn create_fs_watcher(
    root: &Path,
    sender: mpsc::Sender<notify::Result<Event>>,
    poll_interval: Duration,
) -> Result<RecommendedWatcher> {
    let root = root.to_path_buf();
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = sender.blocking_send(res);
        },
        NotifyConfig::default().with_poll_interval(poll_interval),
    )
    .map_err(|e| IndexerError::Other(format!("watcher init failed: {e}")))?;
    watcher
        .watch(&root, RecursiveMode::Recursive)
        .map_err(|e| IndexerError::Other(format!("failed to watch {}: {e}", root.display())))?;
    Ok(watcher)
}

fn spawn_sync_loop(
    indexer: Arc<ProjectIndexer>,
    config: WatcherConfig,
    mut event_rx: mpsc::Receiver<notify::Result<Event>>,
    mut command_rx: mpsc::Receiver<WatcherCommand>,
    update_tx: broadcast::Sender<SyncUpdate>,
    health_tx: watch::Sender<WatcherHealth>,
) {
    tokio::spawn(async move {
        let mut state = DebounceState::new(config.debounce, config.max_batch_wait);
        let mut health = WatcherHealth::initial();

        loop {
            let next_deadline = state.next_deadline();

            tokio::select! {
                Some(event) = event_rx.recv() => {
                    if handle_event(indexer.root(), event, &mut state) {
                        health.pending_paths = state.pending();
                        let _ = health_tx.send(health.clone());
                    }
                }
                Some(cmd) = command_rx.recv() => {
                    match cmd {
                        WatcherCommand::FullSync { reason } => {
                            state.force_full(reason);
                            health.pending_paths = state.pending();
                            let _ = health_tx.send(health.clone());
                        }
                        WatcherCommand::Shutdown => break,
                    }
                }
                () = async {
                    if let Some(deadline) = next_deadline {
                        time::sleep_until(deadline).await;
                    }
                }, if state.should_run() && next_deadline.is_some() => {
                    health.indexing = true;
                    let _ = health_tx.send(health.clone());

                    let batch = state.take_batch();
                    let started = Instant::now();
                    let outcome = run_sync_cycle(&indexer, &batch).await;
                    #[allow(clippy::cast_possible_truncation)]
                    let duration = started.elapsed().as_millis() as u64;

                    health.indexing = false;
                    health.pending_paths = state.pending();
                    health.last_duration_ms = Some(duration);

                    match outcome {
                        Ok(stats) => {
                            health.last_success = Some(SystemTime::now());
                            health.last_error = None;
                            health.consecutive_failures = 0;
                            let _ = health_tx.send(health.clone());
                            let _ = update_tx.send(SyncUpdate {
                                completed_at: SystemTime::now(),
                                duration_ms: duration,
                                stats: Some(stats),
                                success: true,
                                reason: batch.reason,
                            });
                        }
                        Err(err) => {
                            error!("Sync cycle failed: {err}");
                            health.last_error = Some(err.to_string());
                            health.consecutive_failures += 1;
                            let _ = health_tx.send(health.clone());
                            let _ = update_tx.send(SyncUpdate {
                                completed_at: SystemTime::now(),
                                duration_ms: duration,
                                stats: None,
                                success: false,
                                reason: batch.reason,
                            });
                        }
                    }
                }
            }
        }
    });
}

async fn run_sync_cycle(indexer: &Arc<ProjectIndexer>, batch: &SyncBatch) -> Result<IndexStats> {
    if batch.full {
        return indexer.index().await;
    }

    let started = Instant::now();
    let mut stats = IndexStats::new();
    for rel in &batch.paths {
        match indexer.sync_path(rel).await {
            Ok(result) if result.file_removed => {
                stats.record_removal(&result);
            }
            Ok(result) => stats.record_commit(&result),
            Err(err) => {
                warn!("Failed to sync {rel}: {err}");
                stats.add_error(format!("{rel}: {err}"));
            }
        }
    }
    indexer.coordinator().persist_caches().await?;
    #[allow(clippy::cast_possible_truncation)]
    {
        stats.time_ms = (started.elapsed().as_millis() as u64).max(1);
    }
    Ok(stats)
}

fn handle_event(root: &Path, event: notify::Result<Event>, state: &mut DebounceState) -> bool {
    match event {
        Ok(evt) => {
            let mut relevant = false;
            for path in evt.paths {
                if in_ignored_subtree(root, &path) {
                    continue;
                }
                if scanner::is_indexable(&path) {
                    let rel = path
                        .strip_prefix(root)
                        .unwrap_or(&path)
                        .to_string_lossy()
                        .replace('\\', "/");
                    state.record_path(rel);
                    relevant = true;
                } else if path.is_dir() || (!path.exists() && path.extension().is_none()) {
                    // A directory moved in, renamed, or deleted produces one
                    // event for the directory and none for the files inside
                    // it. A full pass both scans the arrivals and sweeps out
                    // paths that no longer exist.
                    state.request_full(DIR_EVENT_REASON);
                    relevant = true;
                }
            }
            relevant
        }
        Err(err) => {
            warn!("Watcher error: {err}");
            false
        }
    }
}

fn in_ignored_subtree(root: &Path, path: &Path) -> bool {
    const IGNORED: &[&str] = &[
        ".git",
        ".hg",
        ".svn",
        ".scout",
        "target",
        "node_modules",
        "dist",
        "build",
        "out",
    ];

    if let Ok(relative) = path.strip_prefix(root) {
        if let Some(first) = relative.components().next() {
            let first = first.as_os_str().to_string_lossy().to_lowercase();
            if IGNORED.iter().any(|ignore| first.starts_with(ignore)) {
                return true;
            }
        }
    }

    false
}

struct SyncBatch {
    paths: Vec<String>,
    full: bool,
    reason: String,
}

struct DebounceState {
    debounce: Duration,
    max_batch: Duration,
    dirty: HashMap<String, Instant>,
    first_event: Option<Instant>,
    full_requested: bool,
    force_immediate: bool,
    reason: Option<String>,
}

impl DebounceState {
    fn new(debounce: Duration, max_batch: Duration) -> Self {
        Self {
            debounce,
            max_batch,
            dirty: HashMap::new(),
            first_event: None,
            full_requested: false,
            force_immediate: false,
            reason: None,
        }
    }

    fn record_path(&mut self, rel: String) {
        let now = Instant::now();
        self.dirty.insert(rel, now);
        self.first_event.get_or_insert(now);
        self.reason.get_or_insert_with(|| FS_EVENT_REASON.to_string());
    }

    /// Schedule a full sweep on the normal debounce clock. Unlike
    /// [`force_full`](Self::force_full) this does not bypass the quiet
    /// period, so a burst of directory events still coalesces.
    fn request_full(&mut self, reason: &str) {
        self.full_requested = true;
        self.first_event.get_or_insert_with(Instant::now);
        self.reason.get_or_insert_with(|| reason.to_string());
    }

    fn force_full(&mut self, reason: String) {
        self.full_requested = true;
        self.force_immediate = true;
        self.reason = Some(reason);
        self.first_event.get_or_insert_with(Instant::now);
    }

    fn pending(&self) -> usize {
        self.dirty.len()
    }

    fn should_run(&self) -> bool {
        self.full_requested || !self.dirty.is_empty()
    }

    fn next_deadline(&self) -> Option<time::Instant> {
        if !self.should_run() {
            return None;
        }

        if self.force_immediate {
            return Some(time::Instant::now());
        }

        // Quiet-period deadline, capped so a stream of events cannot
        // defer a flush past max_batch.
        let mut deadline = self.dirty.values().max().map(|last| *last + self.debounce);
        if deadline.is_none() && self.full_requested {
            deadline = self.first_event.map(|first| first + self.debounce);
        }

        if let Some(first) = self.first_event {
            let forced = first + self.max_batch;
            deadline = Some(match deadline {
                Some(current) if forced < current => forced,
                Some(current) => current,
                None => forced,
            });
        }

        deadline.map(time::Instant::from_std)
    }

    fn take_batch(&mut self) -> SyncBatch {
        let mut paths: Vec<String> = self.dirty.drain().map(|(path, _)| path).collect();
        paths.sort();
        let batch = SyncBatch {
            paths,
            full: self.full_requested,
            reason: self
                .reason
                .take()
                .unwrap_or_else(|| FS_EVENT_REASON.to_string()),
        };
        self.first_event = None;
        self.full_requested = false;
        self.force_immediate = false;
        batch
    }
}
