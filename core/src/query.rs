//! Filtering, sorting and grouping of todo records.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::todo::TodoRecord;

/// Priority at which an open todo is considered in progress.
const IN_PROGRESS_PRIORITY: u8 = 3;

/// Sort orders for [`TodoQuery`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// File, then line number.
    #[default]
    File,
    /// Highest priority first.
    Priority,
    /// Earliest due date first; undated todos last.
    Date,
    /// Most recently modified file first.
    Recent,
}

/// Filters, sort order and limit for a todo listing.
///
/// All filters are optional and combine with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TodoQuery {
    pub completed: Option<bool>,
    /// Exact tag, without `#`.
    pub tag: Option<String>,
    /// Substring of the relative file name.
    pub file: Option<String>,
    /// Minimum priority.
    pub priority: Option<u8>,
    /// Case-insensitive substring of the text or context.
    pub search: Option<String>,
    pub sort: SortOrder,
    pub limit: Option<usize>,
}

impl TodoQuery {
    /// Returns `true` if `todo` passes every filter.
    #[must_use]
    pub fn matches(&self, todo: &TodoRecord) -> bool {
        if self.completed.is_some_and(|c| c != todo.completed) {
            return false;
        }
        if let Some(tag) = &self.tag {
            if !todo.tags.iter().any(|t| t == tag) {
                return false;
            }
        }
        if let Some(file) = &self.file {
            if !todo.file.contains(file.as_str()) {
                return false;
            }
        }
        if self.priority.is_some_and(|p| todo.priority < p) {
            return false;
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            if !todo.text.to_lowercase().contains(&needle)
                && !todo.context.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        true
    }

    /// Filters, sorts and truncates `todos`.
    #[must_use]
    pub fn apply(&self, todos: &[TodoRecord]) -> Vec<TodoRecord> {
        let mut selected: Vec<TodoRecord> =
            todos.iter().filter(|t| self.matches(t)).cloned().collect();
        sort_todos(&mut selected, self.sort);
        // A limit of 0 means no limit.
        if let Some(limit) = self.limit.filter(|&limit| limit > 0) {
            selected.truncate(limit);
        }
        selected
    }
}

/// Sorts `todos` in place. Ties keep file order.
pub fn sort_todos(todos: &mut [TodoRecord], order: SortOrder) {
    todos.sort_by(|a, b| {
        a.file
            .cmp(&b.file)
            .then(a.line_number.cmp(&b.line_number))
    });

    match order {
        SortOrder::File => {}
        SortOrder::Priority => todos.sort_by_key(|t| Reverse(t.priority)),
        SortOrder::Date => todos.sort_by(|a, b| match (&a.due_date, &b.due_date) {
            (Some(x), Some(y)) => x.cmp(y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        }),
        SortOrder::Recent => todos.sort_by_key(|t| Reverse(t.modified_at)),
    }
}

/// Todos of one file, in line order.
#[must_use]
pub fn todos_in_file(todos: &[TodoRecord], file: &str) -> Vec<TodoRecord> {
    let mut selected: Vec<TodoRecord> = todos.iter().filter(|t| t.file == file).cloned().collect();
    selected.sort_by_key(|t| t.line_number);
    selected
}

/// Sorted distinct relative file names.
#[must_use]
pub fn files(todos: &[TodoRecord]) -> Vec<String> {
    todos
        .iter()
        .map(|t| t.file.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// A tag and the number of todos carrying it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCount {
    pub name: String,
    pub count: usize,
}

/// Tag usage, most used first, then by name.
#[must_use]
pub fn tag_counts(todos: &[TodoRecord]) -> Vec<TagCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for tag in todos.iter().flat_map(|t| &t.tags) {
        *counts.entry(tag.as_str()).or_default() += 1;
    }

    let mut tags: Vec<TagCount> = counts
        .into_iter()
        .map(|(name, count)| TagCount {
            name: name.to_string(),
            count,
        })
        .collect();
    tags.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    tags
}

/// Todos grouped into kanban columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Kanban {
    pub backlog: Vec<TodoRecord>,
    pub todo: Vec<TodoRecord>,
    pub in_progress: Vec<TodoRecord>,
    pub done: Vec<TodoRecord>,
}

/// Places each todo in one column: done if completed, in progress at
/// priority 3, todo at priority 1 or 2, backlog otherwise.
#[must_use]
pub fn kanban(todos: &[TodoRecord]) -> Kanban {
    let mut board = Kanban::default();
    for todo in todos {
        let column = match todo.priority {
            _ if todo.completed => &mut board.done,
            p if p >= IN_PROGRESS_PRIORITY => &mut board.in_progress,
            p if p >= 1 => &mut board.todo,
            _ => &mut board.backlog,
        };
        column.push(todo.clone());
    }
    board
}

/// Todos with a due date, keyed by that date.
#[must_use]
pub fn calendar(todos: &[TodoRecord]) -> BTreeMap<String, Vec<TodoRecord>> {
    let mut days: BTreeMap<String, Vec<TodoRecord>> = BTreeMap::new();
    for todo in todos {
        if let Some(due) = &todo.due_date {
            days.entry(due.clone()).or_default().push(todo.clone());
        }
    }
    days
}
