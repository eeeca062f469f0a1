//! Hierarchical checklist parser.
//!
//! Turns the house checklist document into a tree of sections, phases,
//! sub-phases, rooms and tasks. The document has a fixed shape:
//!
//! ```text
//! # House Checklist
//!
//! **Interior Tasks (Post-Drywall)**
//!
//! **Phase 1: Painting**
//!     - [ ] **Upstairs**
//!       - [ ] **Primary Bedroom**
//!         - [x] Prime walls
//!
//! **Phase 2: Flooring**
//! - [ ] Order hardwood
//!
//! **Exterior Tasks**
//! ...
//! ---
//! ## Notes
//! ```
//!
//! Structure is inferred from bold markers and indentation only. Lines the
//! parser does not recognise are skipped; the parser never fails.
//!
//! # Example
//!
//! ```
//! use tickbook_core::checklist::{parse_checklist, PhaseBody};
//!
//! let doc = "**Interior Tasks**\n**Phase 1: Flooring**\n- [x] Order hardwood\n";
//! let checklist = parse_checklist(doc);
//!
//! let phase = &checklist.interior.phases[0];
//! assert_eq!(phase.title, "Phase 1: Flooring");
//! assert!(matches!(&phase.body, PhaseBody::Tasks(tasks) if tasks[0].completed));
//! ```

use std::ops::ControlFlow;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::{CoreError, Result};

/// Title given to the interior section.
pub const INTERIOR_TITLE: &str = "Interior Tasks (Post-Drywall)";

/// Title given to the exterior section.
pub const EXTERIOR_TITLE: &str = "Exterior Tasks";

/// Indent of a floor-level entry inside a painting phase.
const FLOOR_INDENT: usize = 4;

/// Indent of a room entry inside a painting phase.
const ROOM_INDENT: usize = 6;

/// Indent of a task under a room inside a painting phase.
const ROOM_TASK_INDENT: usize = 8;

static PHASE_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*\*(Phase \d+: .+?)\*\*").expect("phase title regex is valid")
});

static TASK_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*- \[([ xX])\] (.+)").expect("task line regex is valid"));

// ============================================================================
// Model
// ============================================================================

/// The two top-level sections of the checklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    Interior,
    Exterior,
}

impl SectionKind {
    /// Both sections, in document order.
    pub const ALL: [SectionKind; 2] = [SectionKind::Interior, SectionKind::Exterior];

    /// The lowercase key used in JSON and statistics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Interior => "interior",
            Self::Exterior => "exterior",
        }
    }
}

impl std::fmt::Display for SectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed checklist document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checklist {
    pub interior: Section,
    pub exterior: Section,
}

impl Default for Checklist {
    fn default() -> Self {
        Self {
            interior: Section::new(INTERIOR_TITLE),
            exterior: Section::new(EXTERIOR_TITLE),
        }
    }
}

impl Checklist {
    /// Returns the section of the given kind.
    #[must_use]
    pub fn section(&self, kind: SectionKind) -> &Section {
        match kind {
            SectionKind::Interior => &self.interior,
            SectionKind::Exterior => &self.exterior,
        }
    }

    fn section_mut(&mut self, kind: SectionKind) -> &mut Section {
        match kind {
            SectionKind::Interior => &mut self.interior,
            SectionKind::Exterior => &mut self.exterior,
        }
    }

    /// Resolves a [`TaskPath`] to the task it addresses.
    ///
    /// Returns `None` when any index is out of range, or when the path names a
    /// sub-phase of a phase that only holds flat tasks (and vice versa).
    #[must_use]
    pub fn task_at(&self, path: &TaskPath) -> Option<&Task> {
        let phase = self.section(path.section).phases.get(path.phase_index)?;

        match (&phase.body, path.sub_phase_index) {
            (PhaseBody::SubPhases(sub_phases), Some(sub_index)) => {
                let sub_phase = sub_phases.get(sub_index)?;
                match path.room_index {
                    Some(room_index) => sub_phase.rooms.get(room_index)?.tasks.get(path.task_index),
                    None => sub_phase.tasks.get(path.task_index),
                }
            }
            (PhaseBody::Tasks(tasks), _) => tasks.get(path.task_index),
            (PhaseBody::SubPhases(_), None) => None,
        }
    }
}

/// One of the two top-level sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub phases: Vec<Phase>,
}

impl Section {
    fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            phases: Vec::new(),
        }
    }
}

/// A numbered phase (`**Phase N: Title**`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub title: String,

    /// Either flat tasks or sub-phases, never both.
    #[serde(flatten)]
    pub body: PhaseBody,
}

/// The children of a phase.
///
/// A phase starts out as `Tasks`. The first sub-phase header turns it into
/// `SubPhases` for good.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PhaseBody {
    Tasks(Vec<Task>),
    SubPhases(Vec<SubPhase>),
}

impl Phase {
    fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: PhaseBody::Tasks(Vec::new()),
        }
    }

    /// Painting phases nest floors and rooms below the phase.
    #[must_use]
    pub fn is_painting(&self) -> bool {
        self.title.contains("Painting")
    }

    /// Appends a sub-phase and returns its index, converting the body from
    /// flat tasks on first use.
    fn push_sub_phase(&mut self, sub_phase: SubPhase) -> usize {
        match &mut self.body {
            PhaseBody::SubPhases(sub_phases) => {
                sub_phases.push(sub_phase);
                sub_phases.len() - 1
            }
            PhaseBody::Tasks(tasks) => {
                if !tasks.is_empty() {
                    warn!(
                        phase = %self.title,
                        discarded = tasks.len(),
                        "Sub-phase header after flat tasks; flat tasks dropped"
                    );
                }
                self.body = PhaseBody::SubPhases(vec![sub_phase]);
                0
            }
        }
    }

    fn sub_phase_mut(&mut self, index: usize) -> Option<&mut SubPhase> {
        match &mut self.body {
            PhaseBody::SubPhases(sub_phases) => sub_phases.get_mut(index),
            PhaseBody::Tasks(_) => None,
        }
    }
}

/// A sub-phase, or a floor level when inside a painting phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubPhase {
    pub title: String,

    /// Rooms, only ever filled inside painting phases.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rooms: Vec<Room>,

    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl SubPhase {
    fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            rooms: Vec::new(),
            tasks: Vec::new(),
        }
    }
}

/// A room inside a painting floor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub title: String,
    pub tasks: Vec<Task>,
}

/// A single checkbox item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Display text with bold markers removed.
    pub text: String,
    pub completed: bool,
}

/// Addresses one task inside a parsed [`Checklist`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPath {
    pub section: SectionKind,
    pub phase_index: usize,
    #[serde(default)]
    pub sub_phase_index: Option<usize>,
    #[serde(default)]
    pub room_index: Option<usize>,
    pub task_index: usize,
}

// ============================================================================
// Parser
// ============================================================================

/// Parses checklist markdown into a [`Checklist`].
#[must_use]
pub fn parse_checklist(content: &str) -> Checklist {
    let mut parser = ChecklistParser::default();

    for line in content.lines() {
        if parser.feed(line).is_break() {
            break;
        }
    }

    parser.finish()
}

/// Reads and parses a checklist file.
///
/// # Errors
///
/// Returns [`CoreError::Io`] if the file cannot be read as UTF-8 text.
pub fn parse_checklist_file(path: &Path) -> Result<Checklist> {
    let content = std::fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
    let checklist = parse_checklist(&content);

    debug!(
        path = %path.display(),
        interior_phases = checklist.interior.phases.len(),
        exterior_phases = checklist.exterior.phases.len(),
        "Parsed checklist"
    );

    Ok(checklist)
}

/// Where the parser currently is in the tree.
///
/// Each level is either absent or the index of the active node in its parent.
#[derive(Debug, Default, Clone, Copy)]
struct Cursor {
    section: Option<SectionKind>,
    phase: Option<usize>,
    sub_phase: Option<usize>,
    room: Option<usize>,
}

impl Cursor {
    fn enter_section(&mut self, kind: SectionKind) {
        *self = Self {
            section: Some(kind),
            ..Self::default()
        };
    }

    fn enter_phase(&mut self, index: usize) {
        self.phase = Some(index);
        self.sub_phase = None;
        self.room = None;
    }

    fn enter_sub_phase(&mut self, index: usize) {
        self.sub_phase = Some(index);
        self.room = None;
    }
}

#[derive(Debug, Default)]
struct ChecklistParser {
    checklist: Checklist,
    cursor: Cursor,
}

impl ChecklistParser {
    fn feed(&mut self, line: &str) -> ControlFlow<()> {
        if line.trim().is_empty() || line.starts_with("# House") {
            return ControlFlow::Continue(());
        }

        if line.starts_with("---") || line.starts_with("## Notes") {
            trace!("Reached notes section, stopping");
            return ControlFlow::Break(());
        }

        if line.contains("**Interior Tasks") {
            self.cursor.enter_section(SectionKind::Interior);
            return ControlFlow::Continue(());
        }
        if line.contains("**Exterior Tasks") {
            self.cursor.enter_section(SectionKind::Exterior);
            return ControlFlow::Continue(());
        }

        let Some(section) = self.cursor.section else {
            return ControlFlow::Continue(());
        };

        if line.contains("**Phase") && line.contains(':') {
            if let Some(caps) = PHASE_TITLE.captures(line) {
                let phases = &mut self.checklist.section_mut(section).phases;
                phases.push(Phase::new(&caps[1]));
                self.cursor.enter_phase(phases.len() - 1);
            }
            return ControlFlow::Continue(());
        }

        if let Some(caps) = TASK_LINE.captures(line) {
            let indent = line.len() - line.trim_start().len();
            let completed = caps[1].eq_ignore_ascii_case("x");
            self.checkbox(section, indent, completed, caps[2].trim());
        }

        ControlFlow::Continue(())
    }

    fn checkbox(&mut self, section: SectionKind, indent: usize, completed: bool, text: &str) {
        let Some(phase_index) = self.cursor.phase else {
            trace!(text, "Checkbox outside any phase, skipping");
            return;
        };

        let bold = text.contains("**");
        let plain = text.replace("**", "");
        let task = Task {
            text: plain.clone(),
            completed,
        };
        let cursor = &mut self.cursor;
        let phase = &mut self.checklist.section_mut(section).phases[phase_index];

        if phase.is_painting() {
            match (cursor.sub_phase, cursor.room) {
                _ if bold && indent == FLOOR_INDENT => {
                    let index = phase.push_sub_phase(SubPhase::new(plain.trim()));
                    cursor.enter_sub_phase(index);
                }
                (Some(sub_index), _) if bold && indent == ROOM_INDENT => {
                    if let Some(sub_phase) = phase.sub_phase_mut(sub_index) {
                        sub_phase.rooms.push(Room {
                            title: plain.trim().to_string(),
                            tasks: Vec::new(),
                        });
                        cursor.room = Some(sub_phase.rooms.len() - 1);
                    }
                }
                (Some(sub_index), Some(room_index)) if indent == ROOM_TASK_INDENT => {
                    if let Some(room) = phase
                        .sub_phase_mut(sub_index)
                        .and_then(|sub_phase| sub_phase.rooms.get_mut(room_index))
                    {
                        room.tasks.push(task);
                    }
                }
                (Some(sub_index), _) => {
                    if let Some(sub_phase) = phase.sub_phase_mut(sub_index) {
                        sub_phase.tasks.push(task);
                    }
                }
                (None, _) => trace!(text, indent, "Painting task without a floor, skipping"),
            }
            return;
        }

        if bold {
            let index = phase.push_sub_phase(SubPhase::new(plain.trim()));
            cursor.enter_sub_phase(index);
            return;
        }

        if let Some(sub_index) = cursor.sub_phase.filter(|_| indent > FLOOR_INDENT) {
            if let Some(sub_phase) = phase.sub_phase_mut(sub_index) {
                sub_phase.tasks.push(task);
            }
            return;
        }

        match &mut phase.body {
            PhaseBody::Tasks(tasks) => tasks.push(task),
            PhaseBody::SubPhases(_) => {
                trace!(text, indent, "Shallow task in a phase with sub-phases, skipping");
            }
        }
    }

    fn finish(self) -> Checklist {
        self.checklist
    }
}
