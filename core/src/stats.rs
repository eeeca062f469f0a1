//! Completion statistics for the checklist tree and the todo list.
//!
//! Every bucket is a [`Tally`]. Percentages are rounded to one decimal place
//! and are `0.0` for an empty bucket.

use std::collections::BTreeMap;

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::checklist::{Checklist, Phase, PhaseBody, Section, Task};
use crate::todo::TodoRecord;

/// Priority at or above which an open todo counts as high priority.
pub const HIGH_PRIORITY: u8 = 2;

/// Completed-versus-total counts for one bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Tally {
    pub total: usize,
    pub completed: usize,
    pub percentage: f64,
}

impl Tally {
    /// Builds a tally from raw counts.
    #[must_use]
    pub fn new(total: usize, completed: usize) -> Self {
        Self {
            total,
            completed,
            percentage: percentage(completed, total),
        }
    }

    /// Adds one item.
    pub fn record(&mut self, completed: bool) {
        self.total += 1;
        if completed {
            self.completed += 1;
        }
        self.percentage = percentage(self.completed, self.total);
    }

    /// Adds another tally's counts to this one.
    pub fn absorb(&mut self, other: Tally) {
        *self = Self::new(self.total + other.total, self.completed + other.completed);
    }

    /// Items not yet completed.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.total - self.completed
    }
}

/// `completed / total * 100`, rounded to one decimal; `0.0` when `total` is 0.
#[must_use]
pub fn percentage(completed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (completed as f64 / total as f64 * 1000.0).round() / 10.0
}

// ============================================================================
// Checklist
// ============================================================================

/// Statistics for the whole checklist.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChecklistStats {
    #[serde(flatten)]
    pub overall: Tally,
    pub interior: Tally,
    pub exterior: Tally,
    /// Keyed by phase title. Phases sharing a title are summed.
    pub phases: BTreeMap<String, Tally>,
}

/// Counts every task in the checklist, including room tasks and loose
/// sub-phase tasks.
#[must_use]
pub fn checklist_stats(checklist: &Checklist) -> ChecklistStats {
    let mut stats = ChecklistStats::default();

    for (section, bucket) in [
        (&checklist.interior, &mut stats.interior),
        (&checklist.exterior, &mut stats.exterior),
    ] {
        *bucket = section_tally(section, &mut stats.phases);
        stats.overall.absorb(*bucket);
    }

    stats
}

fn section_tally(section: &Section, phases: &mut BTreeMap<String, Tally>) -> Tally {
    let mut tally = Tally::default();
    for phase in &section.phases {
        let phase_tally = phase_tally(phase);
        phases
            .entry(phase.title.clone())
            .or_default()
            .absorb(phase_tally);
        tally.absorb(phase_tally);
    }
    tally
}

/// Counts the tasks of one phase.
#[must_use]
pub fn phase_tally(phase: &Phase) -> Tally {
    let mut tally = Tally::default();
    let mut count = |tasks: &[Task]| {
        for task in tasks {
            tally.record(task.completed);
        }
    };

    match &phase.body {
        PhaseBody::Tasks(tasks) => count(tasks),
        PhaseBody::SubPhases(sub_phases) => {
            for sub_phase in sub_phases {
                count(&sub_phase.tasks);
                for room in &sub_phase.rooms {
                    count(&room.tasks);
                }
            }
        }
    }

    tally
}

// ============================================================================
// Todos
// ============================================================================

/// Statistics for a todo list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TodoStats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub completion_rate: f64,
    pub by_file: BTreeMap<String, Tally>,
    /// A todo with several tags counts once in each.
    pub by_tag: BTreeMap<String, Tally>,
    /// Open todos with priority of at least [`HIGH_PRIORITY`].
    pub high_priority: usize,
    /// Open todos whose due date is before today.
    pub overdue: usize,
}

/// Computes todo statistics relative to `today` (`YYYY-MM-DD`).
///
/// # Example
///
/// ```
/// use tickbook_core::stats::todo_stats;
///
/// let stats = todo_stats(&[], "2026-01-01");
/// assert_eq!((stats.total, stats.completed), (0, 0));
/// assert_eq!(stats.completion_rate, 0.0);
/// ```
#[must_use]
pub fn todo_stats(todos: &[TodoRecord], today: &str) -> TodoStats {
    let mut overall = Tally::default();
    let mut stats = TodoStats::default();

    for todo in todos {
        overall.record(todo.completed);
        stats
            .by_file
            .entry(todo.file.clone())
            .or_default()
            .record(todo.completed);
        for tag in &todo.tags {
            stats
                .by_tag
                .entry(tag.clone())
                .or_default()
                .record(todo.completed);
        }

        if todo.completed {
            continue;
        }
        if todo.priority >= HIGH_PRIORITY {
            stats.high_priority += 1;
        }
        if todo.due_date.as_deref().is_some_and(|due| due < today) {
            stats.overdue += 1;
        }
    }

    stats.total = overall.total;
    stats.completed = overall.completed;
    stats.pending = overall.pending();
    stats.completion_rate = overall.percentage;
    stats
}

/// Computes todo statistics relative to the local date.
#[must_use]
pub fn todo_stats_today(todos: &[TodoRecord]) -> TodoStats {
    let today = Local::now().format("%Y-%m-%d").to_string();
    todo_stats(todos, &today)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::checklist::parse_checklist;
    use crate::todo::parse_todos;

    const CHECKLIST: &str = "\
# House Checklist

**Interior Tasks (Post-Drywall)**

**Phase 1: Painting**
    - [ ] **First Floor**
      - [ ] **Kitchen**
        - [x] Prime walls
        - [ ] Paint walls
      - [x] Touch up trim

**Phase 2: Flooring**
- [x] Install underlayment
- [ ] Lay tile

**Exterior Tasks**

**Phase 3: Siding**
- [ ] Pressure wash
";

    #[test]
    fn percentage_rounds_to_one_decimal() {
        assert_eq!(percentage(1, 3), 33.3);
        assert_eq!(percentage(2, 3), 66.7);
        assert_eq!(percentage(3, 3), 100.0);
        assert_eq!(percentage(0, 0), 0.0);
    }

    #[test]
    fn tally_records_and_absorbs() {
        let mut a = Tally::default();
        a.record(true);
        a.record(false);
        assert_eq!(a, Tally::new(2, 1));

        a.absorb(Tally::new(2, 2));
        assert_eq!(a.total, 4);
        assert_eq!(a.completed, 3);
        assert_eq!(a.percentage, 75.0);
        assert_eq!(a.pending(), 1);
    }

    #[test]
    fn checklist_stats_count_rooms_and_loose_tasks() {
        let stats = checklist_stats(&parse_checklist(CHECKLIST));

        assert_eq!(stats.phases["Phase 1: Painting"], Tally::new(3, 2));
        assert_eq!(stats.phases["Phase 2: Flooring"], Tally::new(2, 1));
        assert_eq!(stats.interior, Tally::new(5, 3));
        assert_eq!(stats.exterior, Tally::new(1, 0));
        assert_eq!(stats.overall, Tally::new(6, 3));
        assert_eq!(stats.overall.percentage, 50.0);
    }

    #[test]
    fn completed_never_exceeds_total() {
        let stats = checklist_stats(&parse_checklist(CHECKLIST));
        let all = [stats.overall, stats.interior, stats.exterior]
            .into_iter()
            .chain(stats.phases.values().copied());
        for tally in all {
            assert!(tally.completed <= tally.total);
        }
    }

    #[test]
    fn empty_checklist_has_zero_stats() {
        let stats = checklist_stats(&parse_checklist(""));
        assert_eq!(stats.overall, Tally::new(0, 0));
        assert!(stats.phases.is_empty());
    }

    #[test]
    fn checklist_stats_serialize_flat_totals() {
        let stats = checklist_stats(&parse_checklist(CHECKLIST));
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["total"], 6);
        assert_eq!(json["completed"], 3);
        assert_eq!(json["interior"]["total"], 5);
    }

    fn todos(content: &str, file: &str) -> Vec<TodoRecord> {
        let path = Path::new("/notes").join(file);
        parse_todos(content, file, &path, None)
    }

    #[test]
    fn todo_stats_buckets() {
        let mut all = todos(
            "- [ ] Call plumber #house !!\n- [x] Buy paint #house #errand\n- [ ] Renew 2026-01-05\n",
            "home.md",
        );
        all.extend(todos("- [ ] Ship report !!! 2026-02-01\n", "work.md"));

        let stats = todo_stats(&all, "2026-01-10");

        assert_eq!(stats.total, 4);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.pending, 3);
        assert_eq!(stats.completion_rate, 25.0);
        assert_eq!(stats.by_file["home.md"], Tally::new(3, 1));
        assert_eq!(stats.by_file["work.md"], Tally::new(1, 0));
        assert_eq!(stats.by_tag["house"], Tally::new(2, 1));
        assert_eq!(stats.by_tag["errand"], Tally::new(1, 1));
        assert_eq!(stats.high_priority, 2);
        assert_eq!(stats.overdue, 1);
    }

    #[test]
    fn completed_todos_are_neither_overdue_nor_high_priority() {
        let all = todos("- [x] Old !!! 2020-01-01\n", "a.md");
        let stats = todo_stats(&all, "2026-01-01");
        assert_eq!(stats.high_priority, 0);
        assert_eq!(stats.overdue, 0);
    }

    #[test]
    fn no_todos_yields_zero_stats() {
        let stats = todo_stats(&todos("# Just a heading\n", "a.md"), "2026-01-01");
        assert_eq!(stats, TodoStats::default());
    }
}
