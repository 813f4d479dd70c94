//! Persisted view state.
//!
//! The route parameters of the last `watch` session are kept in
//! `view.json` next to the config file, so the next run starts with the
//! same page size, chart metric and cadences.
//!
//! # Concurrency Safety
//!
//! Two `watch` processes may write at once. Writes go through `with_lock()`,
//! which holds an advisory lock on `view.lock` for the read-modify-write.
//! Waiting on that lock blocks, so a running view saves through
//! [`RouteWriter`], which does the waiting on the blocking pool.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use nodestats_core::{AddressBar, RouteParams};

/// Default timeout for acquiring the state file lock.
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// What `view.json` holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewState {
    /// Schema version for future migrations
    #[serde(default = "default_version")]
    pub version: u32,
    /// Route parameters in query-string form.
    #[serde(default)]
    pub route: Option<String>,
    /// When the route was last written.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            version: default_version(),
            route: None,
            updated_at: None,
        }
    }
}

fn default_version() -> u32 {
    1
}

/// Reads and writes `view.json`.
#[derive(Debug, Clone)]
pub struct ViewStateStore {
    state_path: PathBuf,
    lock_path: PathBuf,
}

impl ViewStateStore {
    /// Store in `dir`, creating it if needed.
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create config dir: {}", dir.display()))?;
        Ok(Self {
            state_path: dir.join("view.json"),
            lock_path: dir.join("view.lock"),
        })
    }

    /// Load the current state, returning default if the file doesn't exist.
    pub fn load(&self) -> Result<ViewState> {
        if !self.state_path.exists() {
            return Ok(ViewState::default());
        }

        let contents = std::fs::read_to_string(&self.state_path)
            .with_context(|| format!("Failed to read state file: {}", self.state_path.display()))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse state file: {}", self.state_path.display()))
    }

    /// Route saved by the last session, layered over `defaults`.
    pub fn saved_route(&self, defaults: RouteParams) -> RouteParams {
        match self.load() {
            Ok(ViewState {
                route: Some(query), ..
            }) => RouteParams::parse_over(defaults, &query),
            Ok(_) => defaults,
            Err(e) => {
                tracing::warn!("Ignoring saved view state: {e:#}");
                defaults
            }
        }
    }

    /// Persist route parameters.
    pub fn save_route(&self, params: &RouteParams) -> Result<()> {
        let query = params.to_query_string();
        self.with_lock(|state| {
            state.route = Some(query);
            state.updated_at = Some(Utc::now());
            Ok(())
        })
    }

    /// Execute a function while holding an exclusive lock on the state file.
    fn with_lock<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut ViewState) -> Result<R>,
    {
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)
            .with_context(|| format!("Failed to open lock file: {}", self.lock_path.display()))?;

        let start = Instant::now();
        loop {
            match lock_file.try_lock_exclusive() {
                Ok(()) => break,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if start.elapsed() > LOCK_TIMEOUT {
                        anyhow::bail!(
                            "Timed out waiting for view state lock after {LOCK_TIMEOUT:?}. \
                             Another nodestats process may be holding the lock."
                        );
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to lock: {}", self.lock_path.display()));
                }
            }
        }

        let mut state = self.load()?;
        let result = f(&mut state)?;

        let contents = serde_json::to_string_pretty(&state)?;
        std::fs::write(&self.state_path, contents)
            .with_context(|| format!("Failed to write state file: {}", self.state_path.display()))?;

        let _ = lock_file.unlock();
        Ok(result)
    }
}

/// [`AddressBar`] that hands route writes to a background saver.
///
/// Saves happen in order; a burst of writes is collapsed to its last entry.
#[derive(Debug, Clone)]
pub struct RouteWriter {
    tx: mpsc::UnboundedSender<RouteParams>,
}

impl RouteWriter {
    /// Spawn the saver for `store`.
    ///
    /// The returned handle completes once every `RouteWriter` clone is
    /// dropped and the queue is drained.
    pub fn spawn(store: ViewStateStore) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<RouteParams>();
        let saving = tokio::spawn(async move {
            while let Some(mut params) = rx.recv().await {
                while let Ok(newer) = rx.try_recv() {
                    params = newer;
                }
                let store = store.clone();
                match tokio::task::spawn_blocking(move || store.save_route(&params)).await {
                    Ok(Ok(())) => tracing::trace!("Saved view state"),
                    Ok(Err(e)) => tracing::warn!("Failed to save view state: {e:#}"),
                    Err(e) => tracing::warn!("View state save task failed: {e}"),
                }
            }
        });
        (Self { tx }, saving)
    }
}

impl AddressBar for RouteWriter {
    fn write(&self, params: &RouteParams) {
        if self.tx.send(params.clone()).is_err() {
            tracing::warn!("View state saver is gone, route not saved");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(length: usize) -> RouteParams {
        RouteParams {
            length,
            ..RouteParams::default()
        }
    }

    #[test]
    fn test_route_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ViewStateStore::new(dir.path()).unwrap();
        assert!(store.load().unwrap().route.is_none());

        let params = RouteParams {
            length: 200,
            graph_type: "cpu".to_string(),
            graph_step: 60,
            data_interval: 0,
        };
        store.save_route(&params).unwrap();

        let state = store.load().unwrap();
        assert!(state.updated_at.is_some());
        assert_eq!(store.saved_route(RouteParams::default()), params);
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("view.json"), "{not json").unwrap();
        let store = ViewStateStore::new(dir.path()).unwrap();

        let defaults = RouteParams {
            length: 25,
            ..RouteParams::default()
        };
        assert_eq!(store.saved_route(defaults.clone()), defaults);
    }

    #[tokio::test]
    async fn test_route_writes_do_not_wait_for_held_lock() {
        let dir = tempfile::tempdir().unwrap();
        let store = ViewStateStore::new(dir.path()).unwrap();
        let held = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(dir.path().join("view.lock"))
            .unwrap();
        FileExt::lock_exclusive(&held).unwrap();

        let (writer, saving) = RouteWriter::spawn(store.clone());
        let started = Instant::now();
        writer.write(&route(100));
        writer.write(&route(200));
        assert!(started.elapsed() < Duration::from_millis(50));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(store.load().unwrap().route.is_none());

        FileExt::unlock(&held).unwrap();
        drop(writer);
        saving.await.unwrap();
        assert_eq!(store.saved_route(RouteParams::default()), route(200));
    }

    #[tokio::test]
    async fn test_saver_finishes_queued_writes_after_last_writer_drops() {
        let dir = tempfile::tempdir().unwrap();
        let store = ViewStateStore::new(dir.path()).unwrap();
        let (writer, saving) = RouteWriter::spawn(store.clone());

        writer.clone().write(&route(75));
        drop(writer);
        saving.await.unwrap();
        assert_eq!(store.saved_route(RouteParams::default()).length, 75);
    }
}
