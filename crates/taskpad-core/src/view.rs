use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::task::Task;

/// Status tab selection. Tab order in the UI is all, pending, completed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Completed,
    Pending,
}

impl StatusFilter {
    pub const TABS: [StatusFilter; 3] = [StatusFilter::All, StatusFilter::Pending, StatusFilter::Completed];

    pub fn as_str(self) -> &'static str {
        match self {
            StatusFilter::All => "all",
            StatusFilter::Completed => "completed",
            StatusFilter::Pending => "pending",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StatusFilter::All => "All",
            StatusFilter::Completed => "Completed",
            StatusFilter::Pending => "Pending",
        }
    }

    pub fn admits(self, task: &Task) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Completed => task.completed,
            StatusFilter::Pending => !task.completed,
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusFilter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(StatusFilter::All),
            "completed" | "done" => Ok(StatusFilter::Completed),
            "pending" => Ok(StatusFilter::Pending),
            other => Err(anyhow!("unknown filter: {other} (expected all, completed or pending)")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskCounts {
    pub all: usize,
    pub completed: usize,
    pub pending: usize,
}

impl TaskCounts {
    pub fn for_filter(&self, filter: StatusFilter) -> usize {
        match filter {
            StatusFilter::All => self.all,
            StatusFilter::Completed => self.completed,
            StatusFilter::Pending => self.pending,
        }
    }
}

/// Case-insensitive substring match on title or description.
/// `needle` must already be lowercased.
fn matches_search(task: &Task, needle: &str) -> bool {
    task.title.to_lowercase().contains(needle) || task.description.to_lowercase().contains(needle)
}

/// The visible subset: search first, then status, source order kept.
#[tracing::instrument(skip(tasks), fields(total = tasks.len()))]
pub fn project<'a>(tasks: &'a [Task], filter: StatusFilter, search: &str) -> Vec<&'a Task> {
    let needle = search.to_lowercase();
    let visible: Vec<&Task> = tasks
        .iter()
        .filter(|task| search.is_empty() || matches_search(task, &needle))
        .filter(|task| filter.admits(task))
        .collect();
    trace!(visible = visible.len(), "projected tasks");
    visible
}

/// Tallies over the whole collection; filter and search do not apply.
pub fn counts(tasks: &[Task]) -> TaskCounts {
    let completed = tasks.iter().filter(|task| task.completed).count();
    TaskCounts {
        all: tasks.len(),
        completed,
        pending: tasks.len() - completed,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::Utc;
    use pretty_assertions::assert_eq;

    use super::{StatusFilter, TaskCounts, counts, project};
    use crate::task::{NewTask, Task, TaskId};

    fn task(id: u64, title: &str, description: &str, completed: bool) -> Task {
        let mut draft = NewTask::new(title, description);
        draft.completed = completed;
        Task::from_draft(TaskId(id), draft, Utc::now())
    }

    fn ids(tasks: &[&Task]) -> Vec<u64> {
        tasks.iter().map(|t| t.id.0).collect()
    }

    fn mixed() -> Vec<Task> {
        vec![
            task(1, "Write report", "", true),
            task(2, "Buy Milk", "", false),
            task(3, "Walk dog", "buy leash", false),
            task(4, "File taxes", "before april", true),
        ]
    }

    #[test]
    fn status_filters_partition_in_source_order() {
        let tasks = mixed();
        let done = project(&tasks, StatusFilter::Completed, "");
        let pending = project(&tasks, StatusFilter::Pending, "");
        let all = project(&tasks, StatusFilter::All, "");

        assert_eq!(ids(&done), vec![1, 4]);
        assert_eq!(ids(&pending), vec![2, 3]);
        assert_eq!(ids(&all), vec![1, 2, 3, 4]);

        let union: BTreeSet<u64> = ids(&done).into_iter().chain(ids(&pending)).collect();
        assert_eq!(union, ids(&all).into_iter().collect::<BTreeSet<_>>());
    }

    #[test]
    fn search_is_case_insensitive_over_title_and_description() {
        let tasks = vec![task(1, "Buy Milk", "", false), task(2, "Walk dog", "buy leash", false)];
        assert_eq!(ids(&project(&tasks, StatusFilter::All, "buy")), vec![1, 2]);
        assert_eq!(ids(&project(&tasks, StatusFilter::All, "LEASH")), vec![2]);
        assert!(project(&tasks, StatusFilter::All, "cat").is_empty());
    }

    #[test]
    fn search_and_status_combine() {
        let tasks = mixed();
        assert_eq!(ids(&project(&tasks, StatusFilter::Completed, "ax")), vec![4]);
        assert!(project(&tasks, StatusFilter::Pending, "report").is_empty());
    }

    #[test]
    fn counts_ignore_filter_and_search() {
        let tasks = vec![
            task(1, "a", "", true),
            task(2, "b", "", false),
            task(3, "c", "", false),
        ];
        let tally = counts(&tasks);
        assert_eq!(
            tally,
            TaskCounts {
                all: 3,
                completed: 1,
                pending: 2
            }
        );
        assert_eq!(tally.for_filter(StatusFilter::Pending), 2);
        assert_eq!(counts(&[]), TaskCounts::default());
    }

    #[test]
    fn filter_names_parse_and_display() {
        for filter in StatusFilter::TABS {
            assert_eq!(filter.as_str().parse::<StatusFilter>().expect("parse"), filter);
        }
        assert_eq!(" Pending ".parse::<StatusFilter>().expect("parse"), StatusFilter::Pending);
        assert!("someday".parse::<StatusFilter>().is_err());
        assert_eq!(StatusFilter::default().to_string(), "all");
    }
}
