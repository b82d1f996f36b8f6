//! Polling directory watcher producing file-created events.
//!
//! The watched directory is scanned (non-recursively) on a fixed interval.
//! Files present when the watcher starts form the baseline and never fire.
//! A new regular file fires exactly one [`FileCreated`] event once its size
//! is unchanged across two consecutive scans, so a file still being written
//! is not handed to the pipeline. Directories never fire.

use std::{
    collections::{HashMap, HashSet},
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Result};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, info, warn};

// ---

/// A regular file appeared in the watched directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCreated {
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct DirectoryWatcher {
    directory: PathBuf,
    poll_interval: Duration,
}

/// Bookkeeping between two scans.
#[derive(Debug, Default)]
struct ScanState {
    /// Paths already reported (or part of the baseline).
    seen: HashSet<PathBuf>,
    /// New paths waiting for a stable size.
    pending: HashMap<PathBuf, u64>,
}

impl ScanState {
    fn with_baseline(snapshot: &HashMap<PathBuf, u64>) -> Self {
        ScanState {
            seen: snapshot.keys().cloned().collect(),
            pending: HashMap::new(),
        }
    }

    /// Feed one directory snapshot, returning the paths that are now ready.
    fn observe(&mut self, snapshot: &HashMap<PathBuf, u64>) -> Vec<PathBuf> {
        // ---
        let mut ready = Vec::new();

        for (path, &len) in snapshot {
            if self.seen.contains(path) {
                continue;
            }
            match self.pending.get(path) {
                Some(&previous) if previous == len => {
                    self.pending.remove(path);
                    self.seen.insert(path.clone());
                    ready.push(path.clone());
                }
                _ => {
                    self.pending.insert(path.clone(), len);
                }
            }
        }

        // Forget vanished paths so a later file with the same name fires again
        self.seen.retain(|p| snapshot.contains_key(p));
        self.pending.retain(|p, _| snapshot.contains_key(p));

        ready.sort();
        ready
    }
}

/// Regular files directly inside `directory`, with their sizes.
fn scan(directory: &Path) -> io::Result<HashMap<PathBuf, u64>> {
    // ---
    let mut files = HashMap::new();
    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        let metadata = match entry.metadata() {
            Ok(m) => m,
            // Removed between listing and stat
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        if metadata.is_file() {
            files.insert(entry.path(), metadata.len());
        }
    }
    Ok(files)
}

impl DirectoryWatcher {
    pub fn new(directory: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        DirectoryWatcher {
            directory: directory.into(),
            poll_interval,
        }
    }

    /// Take the baseline scan and start polling on a background task.
    ///
    /// Fails immediately when the directory cannot be scanned. The task ends
    /// when `shutdown` turns `true` (or its sender is dropped) or when the
    /// event receiver is gone.
    pub fn spawn(
        self,
        events: mpsc::Sender<FileCreated>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<JoinHandle<()>> {
        // ---
        if !self.directory.is_dir() {
            bail!("watched directory {} does not exist", self.directory.display());
        }
        let baseline = scan(&self.directory)?;
        let mut state = ScanState::with_baseline(&baseline);

        info!(
            "Monitoring folder: {} ({} existing entries ignored)",
            self.directory.display(),
            baseline.len()
        );

        let handle = tokio::spawn(async move {
            // ---
            let mut ticker = tokio::time::interval(self.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            'poll: loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break 'poll;
                        }
                        continue 'poll;
                    }
                }

                let directory = self.directory.clone();
                let snapshot = match tokio::task::spawn_blocking(move || scan(&directory)).await {
                    Ok(Ok(snapshot)) => snapshot,
                    Ok(Err(e)) => {
                        warn!("Scan of {} failed: {}", self.directory.display(), e);
                        continue;
                    }
                    Err(e) => {
                        warn!("Scan task failed: {}", e);
                        continue;
                    }
                };

                for path in state.observe(&snapshot) {
                    debug!("File created: {}", path.display());
                    if events.send(FileCreated { path }).await.is_err() {
                        break 'poll;
                    }
                }
            }

            info!("Stopped monitoring folder: {}", self.directory.display());
        });

        Ok(handle)
    }
}
