//! File watcher for the notes directory.
//!
//! Watches the notes directory recursively (and the checklist's directory,
//! when the checklist lives elsewhere) and turns relevant filesystem events
//! into [`ChangeKind`] keys for the [`Debouncer`]. A separate task,
//! [`process_changes`], receives the debounced keys and re-parses the
//! checklist or refreshes the todo cache.
//!
//! Only `.md` files count. Hidden entries (including the `.flatnotes` index
//! directory) are ignored.
//!
//! # Example
//!
//! ```no_run
//! use tokio::sync::mpsc;
//! use tickbook_server::config::Config;
//! use tickbook_server::debounce::Debouncer;
//! use tickbook_server::routes::AppState;
//! use tickbook_server::watcher::{process_changes, NotesWatcher};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let state = AppState::new(config.clone());
//!
//!     let (tx, rx) = mpsc::channel(16);
//!     let debouncer = Debouncer::new(config.debounce, tx);
//!     let _watcher = NotesWatcher::start(&config.notes_dir, &config.checklist_path, debouncer)?;
//!
//!     process_changes(rx, state).await;
//!     Ok(())
//! }
//! ```

use std::path::{Component, Path, PathBuf};

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::debounce::Debouncer;
use crate::routes::AppState;

/// What a debounced change should trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// The checklist file changed; re-parse and broadcast it.
    Checklist,
    /// Some notes file changed; refresh the todo cache.
    Notes,
}

/// Errors that can occur while setting up the watcher.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Failed to initialize the file system watcher.
    #[error("failed to create watcher: {0}")]
    WatcherInit(#[from] notify::Error),

    /// The watch directory does not exist or is inaccessible.
    #[error("watch directory does not exist: {0}")]
    DirectoryNotFound(PathBuf),
}

/// Result type for watcher operations.
pub type Result<T> = std::result::Result<T, WatcherError>;

/// Decides which change kinds a path belongs to.
#[derive(Debug, Clone)]
pub struct ChangeClassifier {
    notes_dir: PathBuf,
    checklist_path: PathBuf,
}

impl ChangeClassifier {
    pub fn new(notes_dir: impl Into<PathBuf>, checklist_path: impl Into<PathBuf>) -> Self {
        Self {
            notes_dir: notes_dir.into(),
            checklist_path: checklist_path.into(),
        }
    }

    /// Returns the kinds `path` triggers; empty if it is irrelevant.
    ///
    /// The checklist is also a notes file, so it triggers both kinds when it
    /// lives under the notes directory.
    #[must_use]
    pub fn classify(&self, path: &Path) -> Vec<ChangeKind> {
        if path.extension().is_none_or(|ext| ext != "md") {
            return Vec::new();
        }

        let is_checklist = path == self.checklist_path;
        let in_notes = path
            .strip_prefix(&self.notes_dir)
            .is_ok_and(|relative| !is_hidden(relative));

        let mut kinds = Vec::with_capacity(2);
        if is_checklist {
            kinds.push(ChangeKind::Checklist);
        }
        if in_notes {
            kinds.push(ChangeKind::Notes);
        }
        kinds
    }
}

fn is_hidden(relative: &Path) -> bool {
    relative.components().any(|component| match component {
        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
        _ => false,
    })
}

/// Keeps the notify subscription alive. Dropping it stops watching.
#[derive(Debug)]
pub struct NotesWatcher {
    #[allow(dead_code)]
    watcher: RecommendedWatcher,
    notes_dir: PathBuf,
}

impl NotesWatcher {
    /// Starts watching and feeds classified changes into `debouncer`.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::DirectoryNotFound`] if the notes directory is
    /// missing, or [`WatcherError::WatcherInit`] if notify fails.
    pub fn start(
        notes_dir: &Path,
        checklist_path: &Path,
        debouncer: Debouncer<ChangeKind, PathBuf>,
    ) -> Result<Self> {
        let notes_dir = notes_dir
            .canonicalize()
            .map_err(|_| WatcherError::DirectoryNotFound(notes_dir.to_path_buf()))?;
        let checklist_path = checklist_path
            .canonicalize()
            .unwrap_or_else(|_| checklist_path.to_path_buf());

        let classifier = ChangeClassifier::new(&notes_dir, &checklist_path);
        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| {
                handle_notify_event(res, &classifier, &debouncer);
            },
            Config::default(),
        )?;

        watcher.watch(&notes_dir, RecursiveMode::Recursive)?;

        if !checklist_path.starts_with(&notes_dir) {
            if let Some(parent) = checklist_path.parent() {
                watcher.watch(parent, RecursiveMode::NonRecursive)?;
                debug!(dir = %parent.display(), "Watching checklist directory");
            }
        }

        info!(notes_dir = %notes_dir.display(), "Started watching notes");

        Ok(Self { watcher, notes_dir })
    }

    /// The canonical directory being watched.
    #[must_use]
    pub fn notes_dir(&self) -> &Path {
        &self.notes_dir
    }
}

/// Runs inside the notify callback thread, so it only classifies and queues.
fn handle_notify_event(
    res: std::result::Result<Event, notify::Error>,
    classifier: &ChangeClassifier,
    debouncer: &Debouncer<ChangeKind, PathBuf>,
) {
    let event = match res {
        Ok(event) => event,
        Err(e) => {
            error!(error = %e, "File watcher error");
            return;
        }
    };

    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        trace!(kind = ?event.kind, "Ignoring event kind");
        return;
    }

    for path in &event.paths {
        for kind in classifier.classify(path) {
            trace!(path = %path.display(), ?kind, "Queueing change");
            if !debouncer.try_send(kind, path.clone()) {
                warn!(path = %path.display(), "Failed to queue change: debouncer full or closed");
            }
        }
    }
}

/// Acts on debounced changes until the channel closes.
pub async fn process_changes(mut rx: mpsc::Receiver<(ChangeKind, PathBuf)>, state: AppState) {
    debug!("Starting change processor");

    while let Some((kind, path)) = rx.recv().await {
        debug!(?kind, path = %path.display(), "Processing debounced change");
        match kind {
            ChangeKind::Checklist => {
                if let Err(e) = state.publish_checklist().await {
                    warn!(error = %e, "Failed to reload checklist");
                }
            }
            ChangeKind::Notes => {
                if let Err(e) = state.refresh_todos().await {
                    warn!(error = %e, "Failed to refresh todos");
                }
            }
        }
    }

    debug!("Change processor stopped");
}
