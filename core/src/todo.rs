//! Flat todo scanner.
//!
//! Walks every markdown file under a notes directory and turns each checkbox
//! line into a [`TodoRecord`]. Records carry the metadata from
//! [`crate::metadata`], the nearest preceding heading, a short context
//! snippet and membership in a contiguous group of checkbox lines.
//!
//! # Example
//!
//! ```no_run
//! use tickbook_core::todo::TodoScanner;
//!
//! let scanner = TodoScanner::new("/home/me/notes");
//! let report = scanner.scan_all()?;
//! for todo in &report.todos {
//!     println!("{}:{} {}", todo.file, todo.line_number, todo.text);
//! }
//! for failure in &report.failures {
//!     eprintln!("skipped {}: {}", failure.path.display(), failure.error);
//! }
//! # Ok::<(), tickbook_core::CoreError>(())
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::metadata::{extract_metadata, render_inline};

/// Namespace for todo ids, so the same line content always maps to the same id.
const TODO_NAMESPACE: Uuid = Uuid::from_bytes([
    0x74, 0x69, 0x63, 0x6b, // "tick"
    0x62, 0x6f, 0x6f, 0x6b, // "book"
    0x2d, 0x74, 0x6f, 0x64, // "-tod"
    0x6f, 0x2d, 0x69, 0x64, // "o-id"
]);

/// Hex characters kept from the namespaced hash.
const ID_LEN: usize = 12;

/// Lines of context taken on each side of a todo.
const CONTEXT_RADIUS: usize = 2;

/// Maximum context length, in characters.
const CONTEXT_MAX_CHARS: usize = 200;

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.+)$").expect("heading regex is valid"));

static TODO_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*)-\s+\[([ xX])\]\s+(.+)$").expect("todo line regex is valid")
});

/// One checkbox line found in a notes file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoRecord {
    /// Stable hash of path, line number and raw text.
    pub id: String,
    /// Path relative to the notes root, `/`-separated.
    pub file: String,
    /// Absolute path of the file.
    pub file_path: PathBuf,
    /// 1-based line number.
    pub line_number: usize,
    pub indent_level: usize,
    pub completed: bool,
    /// Text with tag and priority markers removed.
    pub text: String,
    /// Text after the checkbox, exactly as written.
    pub raw_text: String,
    /// `text` rendered as inline HTML.
    pub html_text: String,
    pub tags: Vec<String>,
    pub due_date: Option<String>,
    pub priority: u8,
    pub context: String,
    pub modified_at: Option<DateTime<Utc>>,
    pub heading: Option<String>,
    pub heading_level: Option<u8>,
    pub group_id: String,
    /// 1-based line of the first todo in this record's group.
    pub group_start: usize,
    /// `true` when the previous line was also a todo.
    pub continues_group: bool,
}

/// A file the scanner could not read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Result of scanning several files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    /// Records from every readable file, in input order.
    pub todos: Vec<TodoRecord>,
    pub failures: Vec<ScanFailure>,
}

impl ScanReport {
    /// Number of distinct files that produced at least one record.
    #[must_use]
    pub fn file_count(&self) -> usize {
        let mut files: Vec<&str> = self.todos.iter().map(|t| t.file.as_str()).collect();
        files.sort_unstable();
        files.dedup();
        files.len()
    }
}

/// Scans markdown files under a notes root.
#[derive(Debug, Clone)]
pub struct TodoScanner {
    root: PathBuf,
}

impl TodoScanner {
    /// Creates a scanner rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the notes root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lists every `*.md` file under the root, skipping hidden entries.
    ///
    /// Order follows the filesystem. Directories that cannot be read because
    /// of permissions are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::RootNotFound`] if the root is not a directory, or
    /// [`CoreError::Io`] if a directory cannot be listed for another reason.
    pub fn markdown_files(&self) -> Result<Vec<PathBuf>> {
        if !self.root.is_dir() {
            return Err(CoreError::RootNotFound(self.root.clone()));
        }

        let mut files = Vec::new();
        collect_markdown_files(&self.root, &mut files)?;
        debug!(root = %self.root.display(), count = files.len(), "Enumerated markdown files");
        Ok(files)
    }

    /// Scans one file.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Io`] if the file cannot be read as UTF-8.
    pub fn scan_file(&self, path: &Path) -> Result<Vec<TodoRecord>> {
        let content = fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
        let modified_at = fs::metadata(path)
            .and_then(|meta| meta.modified())
            .ok()
            .map(DateTime::<Utc>::from);

        Ok(parse_todos(
            &content,
            &self.relative_name(path),
            path,
            modified_at,
        ))
    }

    /// Scans `paths` in order. Unreadable files are logged and reported in
    /// [`ScanReport::failures`] without affecting the others.
    pub fn scan_files<P: AsRef<Path>>(&self, paths: &[P]) -> ScanReport {
        let mut report = ScanReport::default();

        for path in paths {
            let path = path.as_ref();
            match self.scan_file(path) {
                Ok(todos) => report.todos.extend(todos),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable notes file");
                    report.failures.push(ScanFailure {
                        path: path.to_path_buf(),
                        error: e.to_string(),
                    });
                }
            }
        }

        report
    }

    /// Enumerates and scans every markdown file under the root.
    ///
    /// # Errors
    ///
    /// Fails only if enumeration fails; per-file errors land in the report.
    pub fn scan_all(&self) -> Result<ScanReport> {
        let files = self.markdown_files()?;
        Ok(self.scan_files(&files))
    }

    fn relative_name(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Scans every markdown file under `root`.
///
/// # Errors
///
/// See [`TodoScanner::scan_all`].
pub fn scan_all_todos(root: impl Into<PathBuf>) -> Result<ScanReport> {
    TodoScanner::new(root).scan_all()
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'))
}

fn collect_markdown_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            warn!(dir = %dir.display(), "Permission denied, skipping directory");
            return Ok(());
        }
        Err(e) => return Err(CoreError::io(dir, e)),
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if is_hidden(&path) {
            continue;
        }
        let Ok(file_type) = entry.file_type() else {
            continue;
        };

        // Directory links are never followed, so a link cycle cannot recurse.
        if file_type.is_symlink() && path.is_dir() {
            debug!(path = %path.display(), "Skipping symlinked directory");
            continue;
        }

        if file_type.is_dir() {
            collect_markdown_files(&path, files)?;
        } else if path.extension().is_some_and(|ext| ext == "md") {
            files.push(path);
        }
    }

    Ok(())
}

/// Parses the todos in one document.
///
/// `file` is the display name used in records and group ids; `file_path` is
/// stored as-is.
#[must_use]
pub fn parse_todos(
    content: &str,
    file: &str,
    file_path: &Path,
    modified_at: Option<DateTime<Utc>>,
) -> Vec<TodoRecord> {
    let lines: Vec<&str> = content.lines().collect();
    let stem = file_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.to_string());

    let mut todos = Vec::new();
    let mut heading: Option<(u8, String)> = None;
    let mut last_todo_index: Option<usize> = None;
    let mut group: Option<(String, usize)> = None;

    for (index, line) in lines.iter().enumerate() {
        if let Some(caps) = HEADING.captures(line) {
            heading = Some((caps[1].len() as u8, caps[2].trim().to_string()));
            continue;
        }

        let Some(caps) = TODO_LINE.captures(line) else {
            continue;
        };

        let continues_group = last_todo_index.is_some_and(|last| last + 1 == index);
        let (group_id, group_start) = match group.take() {
            Some(current) if continues_group => current,
            _ => (format!("{stem}_{index}"), index + 1),
        };
        group = Some((group_id.clone(), group_start));
        last_todo_index = Some(index);

        let line_number = index + 1;
        let raw_text = caps[3].to_string();
        let context = gather_context(&lines, index);
        let meta = extract_metadata(&raw_text, &context);

        todos.push(TodoRecord {
            id: todo_id(file_path, line_number, &raw_text),
            file: file.to_string(),
            file_path: file_path.to_path_buf(),
            line_number,
            indent_level: caps[1].len() / 2,
            completed: !caps[2].trim().is_empty(),
            html_text: render_inline(&meta.text),
            text: meta.text,
            raw_text,
            tags: meta.tags,
            due_date: meta.due_date,
            priority: meta.priority,
            context,
            modified_at,
            heading: heading.as_ref().map(|(_, text)| text.clone()),
            heading_level: heading.as_ref().map(|(level, _)| *level),
            group_id,
            group_start,
            continues_group,
        });
    }

    todos
}

/// Derives the 12-hex-char id of a todo line.
#[must_use]
pub fn todo_id(file_path: &Path, line_number: usize, raw_text: &str) -> String {
    let key = format!("{}:{line_number}:{raw_text}", file_path.display());
    let mut id = Uuid::new_v5(&TODO_NAMESPACE, key.as_bytes())
        .simple()
        .to_string();
    id.truncate(ID_LEN);
    id
}

fn gather_context(lines: &[&str], index: usize) -> String {
    let start = index.saturating_sub(CONTEXT_RADIUS);
    let end = (index + CONTEXT_RADIUS + 1).min(lines.len());

    let joined = (start..end)
        .filter(|&i| i != index)
        .map(|i| lines[i].trim())
        .filter(|line| !line.is_empty() && !line.starts_with("- ["))
        .collect::<Vec<_>>()
        .join(" ");

    joined.chars().take(CONTEXT_MAX_CHARS).collect()
}
