//! Bounded background size computation.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

use nestfs_core::{normalize_internal_path, EngineConfig, EntryKind, VfsError};
use nestfs_list::{total_file_size, Lister, Resolution};

use crate::cache::{SizeCache, SizeCacheEntry};

/// Where a path stands in the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeState {
    Uncached,
    Queued,
    InFlight,
    Cached,
}

/// Broadcast when a computation finishes. `size` is `None` if it failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeUpdate {
    pub path: PathBuf,
    pub size: Option<u64>,
}

/// Queue and bookkeeping, mutated only under the scheduler lock.
#[derive(Debug)]
struct SchedulerState {
    cache: SizeCache,
    queue: VecDeque<PathBuf>,
    queued: HashSet<PathBuf>,
    in_flight: HashSet<PathBuf>,
    workers: usize,
}

struct Shared {
    lister: Lister,
    state: Mutex<SchedulerState>,
    updates: broadcast::Sender<SizeUpdate>,
    cancel: CancellationToken,
    tracker: TaskTracker,
    max_workers: usize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Computes aggregate sizes in the background and caches the results.
///
/// At most one computation runs per path, and at most
/// `max_concurrent_sizes` run at once. Results are delivered through
/// [`subscribe`](Self::subscribe).
#[derive(Clone)]
pub struct SizeScheduler {
    shared: Arc<Shared>,
}

impl SizeScheduler {
    pub fn new(lister: Lister, config: &EngineConfig) -> Self {
        let (updates, _) = broadcast::channel(config.progress_channel_size.max(16));
        let state = SchedulerState {
            cache: SizeCache::new(config.size_cache_capacity, config.size_cache_ttl()),
            queue: VecDeque::new(),
            queued: HashSet::new(),
            in_flight: HashSet::new(),
            workers: 0,
        };

        Self {
            shared: Arc::new(Shared {
                lister,
                state: Mutex::new(state),
                updates,
                cancel: CancellationToken::new(),
                tracker: TaskTracker::new(),
                max_workers: config.max_concurrent_sizes.max(1),
            }),
        }
    }

    /// Subscribe to size updates.
    pub fn subscribe(&self) -> broadcast::Receiver<SizeUpdate> {
        self.shared.updates.subscribe()
    }

    /// Ask for the size of `path`.
    ///
    /// Returns the cached size if it is still fresh. Otherwise the path is
    /// queued, unless it is already queued or in flight, and the result
    /// arrives later as a [`SizeUpdate`]. Workers are spawned onto the
    /// current tokio runtime.
    pub async fn request_size(&self, path: impl Into<PathBuf>) -> Option<u64> {
        if self.shared.cancel.is_cancelled() {
            return None;
        }

        let path = path.into();
        let lister = self.shared.lister.clone();
        let stamp_path = path.clone();
        let modified = tokio::task::spawn_blocking(move || source_modified(&lister, &stamp_path))
            .await
            .unwrap_or_default();

        let spawn_worker = {
            let mut state = self.shared.lock();

            if state.in_flight.contains(&path) || state.queued.contains(&path) {
                return None;
            }
            if let Some(entry) = state.cache.get(&path, modified) {
                return Some(entry.size_bytes);
            }

            debug!(path = %path.display(), "queued size computation");
            state.queued.insert(path.clone());
            state.queue.push_back(path);

            if state.workers < self.shared.max_workers {
                state.workers += 1;
                true
            } else {
                false
            }
        };

        if spawn_worker {
            let shared = Arc::clone(&self.shared);
            self.shared.tracker.spawn(run_worker(shared));
        }
        None
    }

    /// Request every path and wait until each has a result.
    ///
    /// Updates missed because the receiver lagged are recovered from the
    /// cache once their computation has settled. Failed paths map to `None`.
    pub async fn measure_all(&self, paths: &[PathBuf]) -> HashMap<PathBuf, Option<u64>> {
        let mut updates = self.subscribe();
        let mut sizes = HashMap::new();
        let mut pending = HashSet::new();

        for path in paths {
            if sizes.contains_key(path) {
                continue;
            }
            let size = self.request_size(path.clone()).await;
            if size.is_none() && !self.shared.cancel.is_cancelled() {
                pending.insert(path.clone());
            }
            sizes.insert(path.clone(), size);
        }

        while !pending.is_empty() {
            match updates.recv().await {
                Ok(update) => {
                    if pending.remove(&update.path) {
                        sizes.insert(update.path, update.size);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    debug!(missed, "size updates lagged, reading cache");
                    pending.retain(|path| match self.state(path) {
                        SizeState::Queued | SizeState::InFlight => true,
                        SizeState::Cached | SizeState::Uncached => {
                            sizes.insert(path.clone(), self.lookup(path));
                            false
                        }
                    });
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }

        sizes
    }

    /// Cached size within its TTL, without re-checking the source.
    pub fn lookup(&self, path: &Path) -> Option<u64> {
        self.shared.lock().cache.peek(path).map(|entry| entry.size_bytes)
    }

    pub fn state(&self, path: &Path) -> SizeState {
        let state = self.shared.lock();
        if state.in_flight.contains(path) {
            SizeState::InFlight
        } else if state.queued.contains(path) {
            SizeState::Queued
        } else if state.cache.peek(path).is_some() {
            SizeState::Cached
        } else {
            SizeState::Uncached
        }
    }

    /// Drop queued, not yet started computations for paths under `dir`.
    ///
    /// In-flight work is left to finish. Returns how many were dropped.
    pub fn cancel_queued_in(&self, dir: &Path) -> usize {
        let mut state = self.shared.lock();
        let before = state.queue.len();

        let SchedulerState { queue, queued, .. } = &mut *state;
        queue.retain(|path| {
            let keep = !path.starts_with(dir);
            if !keep {
                queued.remove(path);
            }
            keep
        });

        let dropped = before - state.queue.len();
        if dropped > 0 {
            debug!(dir = %dir.display(), dropped, "cancelled queued size computations");
        }
        dropped
    }

    /// Number of computations currently running.
    pub fn in_flight(&self) -> usize {
        self.shared.lock().in_flight.len()
    }

    /// Stop accepting work, clear the queue and wait for workers to exit.
    ///
    /// Running computations are abandoned, not interrupted; their results
    /// are discarded.
    pub async fn shutdown(&self) {
        self.shared.cancel.cancel();
        {
            let mut state = self.shared.lock();
            state.queue.clear();
            state.queued.clear();
        }
        self.shared.tracker.close();
        self.shared.tracker.wait().await;
        debug!("size scheduler stopped");
    }
}

impl std::fmt::Debug for SizeScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("SizeScheduler")
            .field("cached", &state.cache.len())
            .field("queued", &state.queue.len())
            .field("in_flight", &state.in_flight.len())
            .field("max_workers", &self.shared.max_workers)
            .finish()
    }
}

/// Pull queued paths until the queue drains or the scheduler stops.
async fn run_worker(shared: Arc<Shared>) {
    loop {
        let next = {
            let mut state = shared.lock();
            let next = if shared.cancel.is_cancelled() {
                None
            } else {
                state.queue.pop_front()
            };
            match next {
                Some(path) => {
                    state.queued.remove(&path);
                    state.in_flight.insert(path.clone());
                    Some(path)
                }
                None => {
                    state.workers -= 1;
                    None
                }
            }
        };
        let Some(path) = next else { break };

        let lister = shared.lister.clone();
        let work_path = path.clone();
        let work = tokio::task::spawn_blocking(move || measure(&lister, &work_path));

        let result = tokio::select! {
            _ = shared.cancel.cancelled() => {
                shared.lock().in_flight.remove(&path);
                continue;
            }
            joined = work => joined.map_err(VfsError::task).and_then(|r| r),
        };

        let size = {
            let mut state = shared.lock();
            state.in_flight.remove(&path);
            match result {
                Ok(measured) => {
                    state.cache.insert(SizeCacheEntry::new(
                        &path,
                        measured.size,
                        measured.modified,
                    ));
                    Some(measured.size)
                }
                Err(err) => {
                    debug!(path = %path.display(), error = %err, "size computation failed");
                    state.cache.remove(&path);
                    None
                }
            }
        };

        let _ = shared.updates.send(SizeUpdate { path, size });
    }
}

/// A size and the source modification time it was computed against.
#[derive(Debug, Clone, Copy)]
struct Measured {
    size: u64,
    modified: Option<SystemTime>,
}

/// Modification time used to validate cache entries.
///
/// For paths inside an archive this is the archive file's own time.
fn source_modified(lister: &Lister, path: &Path) -> Option<SystemTime> {
    match lister.resolver().resolve(path).ok()? {
        Resolution::Real(real) => real.stat.modified,
        Resolution::Archive(location) => lister
            .filesystem()
            .metadata(&location.archive_file_path)
            .ok()?
            .modified,
    }
}

fn measure(lister: &Lister, path: &Path) -> Result<Measured, VfsError> {
    let modified = source_modified(lister, path);

    let size = match lister.resolver().resolve(path)? {
        Resolution::Real(real) => {
            let stat = lister
                .filesystem()
                .metadata(&real.path)
                .map_err(|e| VfsError::io(&real.path, e))?;
            if stat.is_dir() {
                directory_size(lister, &real.path)?
            } else {
                stat.len
            }
        }
        Resolution::Archive(location) => {
            let records = lister.archive_records(&location)?;
            let member = records.iter().find(|record| {
                !record.is_dir() && normalize_internal_path(&record.path) == location.internal_path
            });
            match member {
                Some(record) => record.size,
                None => total_file_size(&records, &location),
            }
        }
    };

    Ok(Measured { size, modified })
}

/// Recursive sum of file sizes. Unreadable subdirectories count as zero.
fn directory_size(lister: &Lister, root: &Path) -> Result<u64, VfsError> {
    let mut total = 0;
    let mut pending = vec![root.to_path_buf()];
    let mut first = true;

    while let Some(dir) = pending.pop() {
        let entries = match lister.list_real(&dir) {
            Ok(entries) => entries,
            Err(err) if first => return Err(err),
            Err(err) => {
                debug!(path = %dir.display(), error = %err, "skipping unreadable directory");
                continue;
            }
        };
        first = false;

        for entry in entries {
            match entry.kind {
                EntryKind::Directory => pending.push(entry.path),
                EntryKind::File => total += entry.size,
                EntryKind::Symlink => {}
            }
        }
    }

    Ok(total)
}
