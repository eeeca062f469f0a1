//! In-memory todo cache.
//!
//! The cache holds the last scan of the notes directory. It is refreshed on
//! startup, after every debounced notes change, after a todo toggle and on
//! `POST /refresh`. Each refresh bumps a monotonic `version` so clients can
//! tell whether their copy is stale.
//!
//! Scanning is blocking filesystem work and runs on tokio's blocking pool.
//! Readers get an [`Arc`] to the current list, so a refresh never blocks
//! behind a slow response.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tickbook_core::todo::ScanFailure;
use tickbook_core::{TodoRecord, TodoScanner};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::ServerError;

/// A consistent view of the cache at one version.
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    pub todos: Arc<Vec<TodoRecord>>,
    pub failures: Arc<Vec<ScanFailure>>,
    /// 0 until the first refresh.
    pub version: u64,
    pub last_update: Option<DateTime<Utc>>,
    pub file_count: usize,
}

/// Outcome of one refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    pub version: u64,
    pub count: usize,
    pub failures: usize,
    pub last_update: DateTime<Utc>,
}

/// Shared, cloneable todo cache.
#[derive(Debug, Clone)]
pub struct TodoCache {
    scanner: Arc<TodoScanner>,
    state: Arc<RwLock<CacheSnapshot>>,
}

impl TodoCache {
    /// Creates an empty cache over `notes_dir`. Call [`refresh`](Self::refresh)
    /// to populate it.
    pub fn new(notes_dir: impl Into<PathBuf>) -> Self {
        Self {
            scanner: Arc::new(TodoScanner::new(notes_dir)),
            state: Arc::new(RwLock::new(CacheSnapshot::default())),
        }
    }

    /// The notes directory this cache scans.
    #[must_use]
    pub fn notes_dir(&self) -> &Path {
        self.scanner.root()
    }

    /// Rescans every markdown file and replaces the cached list.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Core`] if the notes directory cannot be
    /// enumerated. Unreadable individual files do not fail the refresh.
    pub async fn refresh(&self) -> Result<RefreshSummary, ServerError> {
        let scanner = Arc::clone(&self.scanner);
        let report = tokio::task::spawn_blocking(move || scanner.scan_all()).await??;

        for failure in &report.failures {
            warn!(path = %failure.path.display(), error = %failure.error, "File skipped during scan");
        }

        let file_count = report.file_count();
        let count = report.todos.len();
        let failures = report.failures.len();
        let last_update = Utc::now();

        let mut state = self.state.write().await;
        state.version += 1;
        state.todos = Arc::new(report.todos);
        state.failures = Arc::new(report.failures);
        state.last_update = Some(last_update);
        state.file_count = file_count;
        let version = state.version;
        drop(state);

        info!(version, count, files = file_count, failures, "Todo cache refreshed");

        Ok(RefreshSummary {
            version,
            count,
            failures,
            last_update,
        })
    }

    /// Returns the current contents.
    pub async fn snapshot(&self) -> CacheSnapshot {
        let snapshot = self.state.read().await.clone();
        debug!(version = snapshot.version, "Cache snapshot taken");
        snapshot
    }

    /// Looks up a todo by id.
    pub async fn get(&self, id: &str) -> Option<TodoRecord> {
        self.state
            .read()
            .await
            .todos
            .iter()
            .find(|todo| todo.id == id)
            .cloned()
    }
}
