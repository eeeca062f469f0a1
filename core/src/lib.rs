//! Tickbook Core - markdown checkbox parsing and in-place toggling.
//!
//! This crate turns plain markdown files into structured task data and writes
//! checkbox changes back to them. The markdown file is the only storage.
//!
//! # Modules
//!
//! - [`checklist`]: hierarchical parser for the house checklist document
//! - [`todo`]: flat scanner for checkbox lines across a notes directory
//! - [`metadata`]: tags, due dates and priorities embedded in todo text
//! - [`toggle`]: single-line checkbox rewrites, by text or by line number
//! - [`stats`]: completion counts and percentages
//! - [`query`]: filtering, sorting and grouping of todo records
//! - [`error`]: error types
//!
//! # Example
//!
//! ```
//! use tickbook_core::{checklist_stats, parse_checklist};
//!
//! let doc = "\
//! **Interior Tasks (Post-Drywall)**
//! **Phase 1: Framing**
//! - [x] Inspect studs
//! - [ ] Patch holes
//! ";
//! let stats = checklist_stats(&parse_checklist(doc));
//! assert_eq!(stats.overall.total, 2);
//! assert_eq!(stats.overall.percentage, 50.0);
//! ```

pub mod checklist;
pub mod error;
pub mod metadata;
pub mod query;
pub mod stats;
pub mod todo;
pub mod toggle;

pub use checklist::{parse_checklist, parse_checklist_file, Checklist, SectionKind, TaskPath};
pub use error::{CoreError, Result, ToggleError};
pub use stats::{checklist_stats, todo_stats, ChecklistStats, Tally, TodoStats};
pub use todo::{scan_all_todos, ScanReport, TodoRecord, TodoScanner};
pub use toggle::{toggle_task, toggle_todo, ToggleOutcome};
