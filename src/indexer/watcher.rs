// File watcher: debounced incremental re-indexing

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::IndexingCoordinator;
use crate::error::{IndexError, Result};

/// Kind of a pending change; the latest event for a path wins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Upsert,
    Remove,
}

#[derive(Debug, Clone)]
struct PendingChange {
    kind: ChangeKind,
    first_seen: Instant,
    last_seen: Instant,
}

/// In-memory event buffer keyed by absolute path. A path flushes once it has
/// been quiet for the debounce window, or unconditionally after the maximum
/// hold time.
pub struct DebounceBuffer {
    entries: HashMap<PathBuf, PendingChange>,
    debounce: Duration,
    max_hold: Duration,
}

impl DebounceBuffer {
    pub fn new(debounce: Duration, max_hold: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            debounce,
            max_hold,
        }
    }

    pub fn record(&mut self, path: PathBuf, kind: ChangeKind, now: Instant) {
        self.entries
            .entry(path)
            .and_modify(|e| {
                e.kind = kind;
                e.last_seen = now;
            })
            .or_insert(PendingChange {
                kind,
                first_seen: now,
                last_seen: now,
            });
    }

    /// Remove and return every entry due for processing
    pub fn drain_due(&mut self, now: Instant) -> Vec<(PathBuf, ChangeKind)> {
        let due: Vec<PathBuf> = self
            .entries
            .iter()
            .filter(|(_, e)| {
                now.duration_since(e.last_seen) >= self.debounce
                    || now.duration_since(e.first_seen) >= self.max_hold
            })
            .map(|(p, _)| p.clone())
            .collect();

        let mut flushed = Vec::with_capacity(due.len());
        for path in due {
            if let Some(entry) = self.entries.remove(&path) {
                flushed.push((path, entry.kind));
            }
        }
        // Deterministic processing order
        flushed.sort_by(|a, b| a.0.cmp(&b.0));
        flushed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Watches the indexed root and feeds debounced changes through the
/// coordinator, one file at a time.
pub struct ProjectWatcher {
    coordinator: Arc<IndexingCoordinator>,
}

impl ProjectWatcher {
    pub fn new(coordinator: Arc<IndexingCoordinator>) -> Self {
        Self { coordinator }
    }

    /// Run until cancelled. The notify backend delivers events on its own
    /// thread; they funnel through a channel into this task's buffer.
    pub async fn watch(self, cancel: CancellationToken) -> Result<()> {
        let root = self.coordinator.root().to_path_buf();
        info!("Watching {} for changes", root.display());

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Event>();

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| match res {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(e) => error!("File watch error: {}", e),
            },
            NotifyConfig::default(),
        )
        .map_err(|e| IndexError::Store(format!("failed to create watcher: {e}")))?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| IndexError::Store(format!("failed to watch {}: {e}", root.display())))?;

        let config = self.coordinator.config().watcher.clone();
        let mut buffer = DebounceBuffer::new(
            Duration::from_millis(config.debounce_ms),
            Duration::from_millis(config.max_hold_ms),
        );
        let mut tick = tokio::time::interval(Duration::from_millis(config.debounce_ms.min(200)));

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Watcher stopping");
                    break;
                }
                maybe_event = rx.recv() => {
                    let Some(event) = maybe_event else { break };
                    self.buffer_event(&mut buffer, event);
                }
                _ = tick.tick() => {
                    for (path, kind) in buffer.drain_due(Instant::now()) {
                        self.apply_change(&path, kind).await;
                    }
                }
            }
        }

        drop(watcher);
        Ok(())
    }

    fn buffer_event(&self, buffer: &mut DebounceBuffer, event: Event) {
        let kind = match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) => ChangeKind::Upsert,
            EventKind::Remove(_) => ChangeKind::Remove,
            _ => return,
        };

        for path in event.paths {
            if !self.coordinator.is_indexable(&path) {
                continue;
            }
            debug!("Buffering {:?} for {}", kind, path.display());
            buffer.record(path, kind, Instant::now());
        }
    }

    async fn apply_change(&self, path: &Path, kind: ChangeKind) {
        // A rapid create-then-delete can leave an Upsert for a missing file
        let effective = if kind == ChangeKind::Upsert && !path.is_file() {
            ChangeKind::Remove
        } else {
            kind
        };

        let result = match effective {
            ChangeKind::Upsert => match self.coordinator.index_file(path).await {
                Ok(elements) => {
                    info!("Re-indexed {}: {} elements", path.display(), elements);
                    Ok(())
                }
                Err(e) => Err(e),
            },
            ChangeKind::Remove => self.coordinator.remove_file(path).await,
        };

        if let Err(e) = result {
            // Watcher errors are per-file and never fatal
            warn!("Failed to apply change for {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer() -> DebounceBuffer {
        DebounceBuffer::new(Duration::from_millis(500), Duration::from_millis(5000))
    }

    #[test]
    fn test_nothing_due_before_debounce() {
        let mut b = buffer();
        let start = Instant::now();
        b.record(PathBuf::from("/p/a.py"), ChangeKind::Upsert, start);

        assert!(b.drain_due(start + Duration::from_millis(100)).is_empty());
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn test_due_after_quiet_window() {
        let mut b = buffer();
        let start = Instant::now();
        b.record(PathBuf::from("/p/a.py"), ChangeKind::Upsert, start);

        let flushed = b.drain_due(start + Duration::from_millis(600));
        assert_eq!(flushed, vec![(PathBuf::from("/p/a.py"), ChangeKind::Upsert)]);
        assert!(b.is_empty());
    }

    #[test]
    fn test_latest_kind_wins() {
        let mut b = buffer();
        let start = Instant::now();
        let path = PathBuf::from("/p/a.py");
        b.record(path.clone(), ChangeKind::Upsert, start);
        b.record(path.clone(), ChangeKind::Remove, start + Duration::from_millis(100));

        let flushed = b.drain_due(start + Duration::from_millis(700));
        assert_eq!(flushed, vec![(path, ChangeKind::Remove)]);
    }

    #[test]
    fn test_repeated_events_extend_quiet_window() {
        let mut b = buffer();
        let start = Instant::now();
        let path = PathBuf::from("/p/a.py");
        b.record(path.clone(), ChangeKind::Upsert, start);
        b.record(path.clone(), ChangeKind::Upsert, start + Duration::from_millis(400));

        // 600ms after the first event but only 200ms after the second
        assert!(b.drain_due(start + Duration::from_millis(600)).is_empty());
        assert_eq!(
            b.drain_due(start + Duration::from_millis(1000)),
            vec![(path, ChangeKind::Upsert)]
        );
    }

    #[test]
    fn test_max_hold_forces_flush() {
        let mut b = buffer();
        let start = Instant::now();
        let path = PathBuf::from("/p/a.py");

        // Keep the file noisy: events every 200ms, never quiet for 500ms
        let mut now = start;
        for _ in 0..25 {
            b.record(path.clone(), ChangeKind::Upsert, now);
            now += Duration::from_millis(200);
        }

        // Despite the noise, 5s of hold flushes it
        let flushed = b.drain_due(start + Duration::from_millis(5100));
        assert_eq!(flushed, vec![(path, ChangeKind::Upsert)]);
    }

    #[test]
    fn test_independent_paths_flush_independently() {
        let mut b = buffer();
        let start = Instant::now();
        b.record(PathBuf::from("/p/a.py"), ChangeKind::Upsert, start);
        b.record(
            PathBuf::from("/p/b.py"),
            ChangeKind::Upsert,
            start + Duration::from_millis(400),
        );

        let flushed = b.drain_due(start + Duration::from_millis(600));
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].0, PathBuf::from("/p/a.py"));
        assert_eq!(b.len(), 1);
    }
}
