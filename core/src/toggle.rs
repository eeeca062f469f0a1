//! In-place checkbox toggling.
//!
//! Every operation here rewrites at most one line, and on that line only the
//! character between the brackets of the first `- [ ]` / `- [x]` marker.
//! Line terminators and all other bytes survive untouched.
//!
//! Two addressing modes exist:
//!
//! - **by text**: used by the checklist, whose tree has no line numbers. The
//!   first line containing the task text and a checkbox marker is patched.
//! - **by location**: used by the todo dashboard, whose records carry a file
//!   path and a 1-based line number.
//!
//! There is no locking. A file edited between read and write loses one of the
//! two edits.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use crate::checklist::{parse_checklist, TaskPath};
use crate::error::{CoreError, ToggleError};

static MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"- \[([ xX])\]").expect("marker regex is valid"));

/// Byte offset of the state character inside a marker match.
const STATE_OFFSET: usize = 3;

/// What a toggle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToggleOutcome {
    /// The line now carries `completed`. The file is not rewritten when the
    /// line already had that state.
    Toggled {
        /// 1-based line that was addressed.
        line_number: usize,
        /// Resulting state.
        completed: bool,
    },
    /// No line matched.
    NotFound,
}

impl ToggleOutcome {
    /// Returns `true` if a line was found.
    #[must_use]
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Toggled { .. })
    }

    /// Resulting state, if a line was found.
    #[must_use]
    pub fn completed(&self) -> Option<bool> {
        match self {
            Self::Toggled { completed, .. } => Some(*completed),
            Self::NotFound => None,
        }
    }
}

// ============================================================================
// Line-level edits
// ============================================================================

/// Returns the checked state of the first marker on `line`.
#[must_use]
pub fn marker_state(line: &str) -> Option<bool> {
    MARKER.captures(line).map(|caps| &caps[1] != " ")
}

/// Rewrites the first marker on `line` to `completed`.
///
/// Returns `None` if the line has no marker.
///
/// # Example
///
/// ```
/// use tickbook_core::toggle::set_marker;
///
/// assert_eq!(
///     set_marker("  - [ ] Paint wall #interior !!", true).as_deref(),
///     Some("  - [x] Paint wall #interior !!")
/// );
/// ```
#[must_use]
pub fn set_marker(line: &str, completed: bool) -> Option<String> {
    let found = MARKER.find(line)?;
    let state_at = found.start() + STATE_OFFSET;
    let state = if completed { 'x' } else { ' ' };

    let mut out = String::with_capacity(line.len());
    out.push_str(&line[..state_at]);
    out.push(state);
    out.push_str(&line[state_at + 1..]);
    Some(out)
}

/// Flips the first marker on `line`, returning the new line and its state.
#[must_use]
pub fn flip_marker(line: &str) -> Option<(String, bool)> {
    let completed = !marker_state(line)?;
    set_marker(line, completed).map(|line| (line, completed))
}

/// Result of a content-level edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    /// Full document after the edit.
    pub content: String,
    /// 1-based line that was addressed.
    pub line_number: usize,
    /// Resulting state of that line.
    pub completed: bool,
    /// `false` when the line already had the requested state.
    pub changed: bool,
}

/// Sets the marker of the first checkbox line whose text contains `text`.
///
/// Only the part after the checkbox is compared, with bold markers removed,
/// since parsed task text has them stripped. Returns `None` if no line
/// matches or `text` is blank. Duplicate task texts always resolve to the
/// first occurrence.
#[must_use]
pub fn set_marker_by_text(content: &str, text: &str, completed: bool) -> Option<Edit> {
    if text.trim().is_empty() {
        return None;
    }

    let index = content
        .split_inclusive('\n')
        .position(|line| task_text_contains(line, text))?;

    apply_at(content, index, |line| {
        let before = marker_state(line)?;
        set_marker(line, completed).map(|edited| (edited, before != completed))
    })
    .map(|(content, changed)| Edit {
        content,
        line_number: index + 1,
        completed,
        changed,
    })
}

fn task_text_contains(line: &str, text: &str) -> bool {
    MARKER
        .find(line)
        .is_some_and(|found| line[found.end()..].replace("**", "").contains(text))
}

/// Line lookup failure for [`flip_marker_at`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineLookup {
    /// The line number is 0 or past the end.
    OutOfRange,
    /// The line exists but holds no marker.
    NoMarker,
}

/// Flips the marker on the 1-based `line_number`.
///
/// # Errors
///
/// Returns [`LineLookup`] describing why the line could not be flipped.
pub fn flip_marker_at(content: &str, line_number: usize) -> Result<Edit, LineLookup> {
    let index = line_number.checked_sub(1).ok_or(LineLookup::OutOfRange)?;
    let line = content
        .split_inclusive('\n')
        .nth(index)
        .ok_or(LineLookup::OutOfRange)?;
    let completed = !marker_state(line).ok_or(LineLookup::NoMarker)?;

    let (content, _) = apply_at(content, index, |line| {
        set_marker(line, completed).map(|edited| (edited, true))
    })
    .ok_or(LineLookup::NoMarker)?;

    Ok(Edit {
        content,
        line_number,
        completed,
        changed: true,
    })
}

/// Rebuilds `content` with the line at `index` replaced by `edit`'s output.
fn apply_at<F>(content: &str, index: usize, edit: F) -> Option<(String, bool)>
where
    F: FnOnce(&str) -> Option<(String, bool)>,
{
    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    let (edited, changed) = edit(lines.get(index)?)?;

    let mut out = String::with_capacity(content.len());
    out.push_str(&lines[..index].concat());
    out.push_str(&edited);
    out.push_str(&lines[index + 1..].concat());
    Some((out, changed))
}

// ============================================================================
// File-level operations
// ============================================================================

fn read(path: &Path) -> Result<String, CoreError> {
    fs::read_to_string(path).map_err(|e| CoreError::io(path, e))
}

fn write(path: &Path, content: &str) -> Result<(), CoreError> {
    fs::write(path, content).map_err(|e| CoreError::io(path, e))
}

/// Sets the checklist task at `task_path` to `completed`.
///
/// The file is parsed fresh to resolve the path to its text, then the first
/// line holding that text is patched.
///
/// # Errors
///
/// Returns [`ToggleError::Io`] if the file cannot be read or written.
pub fn toggle_task(
    checklist_path: &Path,
    task_path: &TaskPath,
    completed: bool,
) -> Result<ToggleOutcome, ToggleError> {
    let content = read(checklist_path)?;
    let checklist = parse_checklist(&content);

    let Some(task) = checklist.task_at(task_path) else {
        debug!(path = %checklist_path.display(), ?task_path, "Task path does not resolve");
        return Ok(ToggleOutcome::NotFound);
    };

    apply_by_text(checklist_path, &content, &task.text, completed)
}

/// Sets the first task line containing `text` to `completed`.
///
/// # Errors
///
/// Returns [`ToggleError::Io`] if the file cannot be read or written.
pub fn toggle_task_by_text(
    path: &Path,
    text: &str,
    completed: bool,
) -> Result<ToggleOutcome, ToggleError> {
    let content = read(path)?;
    apply_by_text(path, &content, text, completed)
}

fn apply_by_text(
    path: &Path,
    content: &str,
    text: &str,
    completed: bool,
) -> Result<ToggleOutcome, ToggleError> {
    let Some(edit) = set_marker_by_text(content, text, completed) else {
        debug!(path = %path.display(), text, "No checkbox line contains task text");
        return Ok(ToggleOutcome::NotFound);
    };

    if edit.changed {
        write(path, &edit.content)?;
        info!(
            path = %path.display(),
            line = edit.line_number,
            completed,
            "Toggled task"
        );
    } else {
        debug!(path = %path.display(), line = edit.line_number, "Task already in requested state");
    }

    Ok(ToggleOutcome::Toggled {
        line_number: edit.line_number,
        completed: edit.completed,
    })
}

/// Flips the checkbox on `line_number` (1-based) of `path`.
///
/// # Errors
///
/// Returns [`ToggleError::MalformedLine`] if the line has no marker, or
/// [`ToggleError::Io`] if the file cannot be read or written.
pub fn toggle_todo(path: &Path, line_number: usize) -> Result<ToggleOutcome, ToggleError> {
    let content = read(path)?;

    let edit = match flip_marker_at(&content, line_number) {
        Ok(edit) => edit,
        Err(LineLookup::OutOfRange) => {
            debug!(path = %path.display(), line_number, "Line out of range");
            return Ok(ToggleOutcome::NotFound);
        }
        Err(LineLookup::NoMarker) => {
            return Err(ToggleError::MalformedLine {
                path: path.to_path_buf(),
                line_number,
            });
        }
    };

    write(path, &edit.content)?;
    info!(
        path = %path.display(),
        line = line_number,
        completed = edit.completed,
        "Toggled todo"
    );

    Ok(ToggleOutcome::Toggled {
        line_number,
        completed: edit.completed,
    })
}
