use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::datetime::{epoch_millis, iso8601_serde, stamp, unknown_stamp};
use crate::error::TaskpadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = TaskpadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(TaskId)
            .map_err(|_| TaskpadError::InvalidId(s.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,

    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub completed: bool,

    #[serde(default = "unknown_stamp", with = "iso8601_serde")]
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Builds a stored task from an already validated draft.
    pub fn from_draft(id: TaskId, draft: NewTask, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: draft.title,
            description: draft.description,
            completed: draft.completed,
            created_at: stamp(now),
        }
    }
}

/// What the add form submits: everything except the id and creation stamp.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub completed: bool,
}

impl NewTask {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            completed: false,
        }
    }

    /// Trims both text fields and rejects a blank title.
    pub fn normalized(self) -> Result<Self, TaskpadError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(TaskpadError::EmptyTitle);
        }
        Ok(Self {
            title: title.to_string(),
            description: self.description.trim().to_string(),
            completed: self.completed,
        })
    }
}

/// Hands out timestamp-shaped ids that never repeat within a session,
/// even when two tasks land in the same millisecond.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    last: u64,
}

impl IdGenerator {
    pub fn seeded(tasks: &[Task]) -> Self {
        Self {
            last: tasks.iter().map(|t| t.id.0).max().unwrap_or(0),
        }
    }

    /// `existing` is the current collection; it is only consulted once
    /// the counter has run off the end of `u64`.
    pub fn next_id(&mut self, now: DateTime<Utc>, existing: &[Task]) -> TaskId {
        let Some(next) = self.last.checked_add(1) else {
            return lowest_free_id(existing);
        };
        let id = epoch_millis(&now).max(next);
        self.last = id;
        TaskId(id)
    }
}

fn lowest_free_id(existing: &[Task]) -> TaskId {
    let taken: BTreeSet<u64> = existing.iter().map(|t| t.id.0).collect();
    let id = (1..=u64::MAX)
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or(0);
    TaskId(id)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    use super::{IdGenerator, NewTask, Task, TaskId};
    use crate::error::TaskpadError;

    #[test]
    fn serializes_with_original_field_names() {
        let now = Utc
            .with_ymd_and_hms(2024, 5, 1, 9, 30, 0)
            .single()
            .expect("valid now");
        let task = Task::from_draft(TaskId(1714555800000), NewTask::new("Buy milk", "2 litres"), now);

        let json = serde_json::to_value(&task).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "id": 1714555800000u64,
                "title": "Buy milk",
                "description": "2 litres",
                "completed": false,
                "createdAt": "2024-05-01T09:30:00.000Z"
            })
        );
    }

    #[test]
    fn reads_tasks_written_by_the_browser_app() {
        let raw = r#"{"id":1700000000123,"title":"Walk dog","description":"buy leash","completed":true,"createdAt":"2023-11-14T22:13:20.123Z"}"#;
        let task: Task = serde_json::from_str(raw).expect("parse");
        assert_eq!(task.id, TaskId(1700000000123));
        assert!(task.completed);
        assert_eq!(task.created_at.timestamp_millis(), 1700000000123);
    }

    #[test]
    fn normalized_trims_and_rejects_blank_titles() {
        let draft = NewTask::new("  Buy milk ", "  soon  ").normalized().expect("valid");
        assert_eq!(draft.title, "Buy milk");
        assert_eq!(draft.description, "soon");

        assert_eq!(NewTask::new(" \t ", "x").normalized(), Err(TaskpadError::EmptyTitle));
    }

    #[test]
    fn generator_never_repeats_within_one_tick() {
        let now = Utc::now();
        let mut ids = IdGenerator::default();
        let a = ids.next_id(now, &[]);
        let b = ids.next_id(now, &[]);
        let c = ids.next_id(now, &[]);
        assert!(a < b && b < c);
    }

    #[test]
    fn generator_skips_past_loaded_ids() {
        let now = Utc
            .with_ymd_and_hms(2020, 1, 1, 0, 0, 0)
            .single()
            .expect("valid now");
        let future = Task::from_draft(TaskId(u64::MAX / 2), NewTask::new("later", ""), now);
        let existing = [future];
        let mut ids = IdGenerator::seeded(&existing);
        assert_eq!(ids.next_id(now, &existing), TaskId(u64::MAX / 2 + 1));
    }

    #[test]
    fn generator_wraps_to_free_ids_at_u64_max() {
        let now = Utc::now();
        let mut existing = vec![
            Task::from_draft(TaskId(u64::MAX), NewTask::new("last", ""), now),
            Task::from_draft(TaskId(1), NewTask::new("first", ""), now),
        ];
        let mut ids = IdGenerator::seeded(&existing);

        let a = ids.next_id(now, &existing);
        assert_eq!(a, TaskId(2));
        existing.push(Task::from_draft(a, NewTask::new("a", ""), now));
        assert_eq!(ids.next_id(now, &existing), TaskId(3));
    }

    #[test]
    fn parses_ids_from_text() {
        assert_eq!(" 42 ".parse::<TaskId>(), Ok(TaskId(42)));
        assert_eq!("abc".parse::<TaskId>(), Err(TaskpadError::InvalidId("abc".to_string())));
    }
}
