use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::error::TaskpadError;
use crate::storage::{self, KeyValueStorage};
use crate::task::{IdGenerator, NewTask, Task, TaskId};
use crate::view::{self, StatusFilter, TaskCounts};

/// Per-session view state. Never persisted; logout puts it back to default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewState {
    pub filter: StatusFilter,
    pub search: String,
    pub editing: Option<TaskId>,
}

/// Owns the task list and the session, and writes every change straight
/// through to `S`. A failed write is logged and memory stays authoritative.
#[derive(Debug)]
pub struct TaskStore<S> {
    storage: S,
    tasks: Vec<Task>,
    username: Option<String>,
    ids: IdGenerator,
    view: ViewState,
}

/// Startup load. Unreadable storage yields an empty, logged-out store.
pub fn initialize<S: KeyValueStorage>(storage: S) -> TaskStore<S> {
    TaskStore::load(storage)
}

impl<S: KeyValueStorage> TaskStore<S> {
    #[tracing::instrument(skip(storage))]
    pub fn load(storage: S) -> Self {
        let tasks = storage::load_tasks(&storage);
        let username = storage::load_username(&storage);
        info!(
            tasks = tasks.len(),
            logged_in = username.is_some(),
            "loaded initial state"
        );

        Self {
            ids: IdGenerator::seeded(&tasks),
            storage,
            tasks,
            username,
            view: ViewState::default(),
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    #[tracing::instrument(skip(self))]
    pub fn login(&mut self, username: &str) -> Result<(), TaskpadError> {
        let name = username.trim();
        if name.is_empty() {
            return Err(TaskpadError::EmptyUsername);
        }

        self.username = Some(name.to_string());
        if let Err(err) = storage::save_username(&mut self.storage, name) {
            error!(error = %format!("{err:#}"), "failed to persist username");
        }
        info!(username = %name, "logged in");
        Ok(())
    }

    /// Ends the session and returns the view to its pristine state.
    #[tracing::instrument(skip(self))]
    pub fn logout(&mut self) {
        self.username = None;
        if let Err(err) = storage::clear_username(&mut self.storage) {
            error!(error = %format!("{err:#}"), "failed to clear stored username");
        }
        self.view = ViewState::default();
        info!("logged out");
    }

    pub fn add_task(&mut self, draft: NewTask) -> Result<&Task, TaskpadError> {
        self.add_task_at(draft, Utc::now())
    }

    #[tracing::instrument(skip(self, draft, now))]
    pub fn add_task_at(&mut self, draft: NewTask, now: DateTime<Utc>) -> Result<&Task, TaskpadError> {
        let draft = draft.normalized()?;
        let id = self.ids.next_id(now, &self.tasks);
        self.tasks.push(Task::from_draft(id, draft, now));
        debug!(%id, count = self.tasks.len(), "task added");
        self.persist_tasks();

        let added = self.tasks.len() - 1;
        Ok(&self.tasks[added])
    }

    /// Replaces title, description and completion of the task with the
    /// same id; `id` and `created_at` of the stored task are kept.
    /// Returns `Ok(false)` when no such task exists, whatever the title.
    #[tracing::instrument(skip(self, task), fields(id = %task.id))]
    pub fn update_task(&mut self, task: Task) -> Result<bool, TaskpadError> {
        let Some(existing) = self.tasks.iter_mut().find(|t| t.id == task.id) else {
            warn!("update for unknown task ignored");
            return Ok(false);
        };

        let title = task.title.trim();
        if title.is_empty() {
            return Err(TaskpadError::EmptyTitle);
        }
        existing.title = title.to_string();
        existing.description = task.description.trim().to_string();
        existing.completed = task.completed;

        self.persist_tasks();
        self.view.editing = None;
        Ok(true)
    }

    #[tracing::instrument(skip(self))]
    pub fn toggle_complete(&mut self, id: TaskId) -> bool {
        let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) else {
            warn!("toggle for unknown task ignored");
            return false;
        };
        task.completed = !task.completed;
        debug!(completed = task.completed, "toggled task");

        self.persist_tasks();
        true
    }

    #[tracing::instrument(skip(self))]
    pub fn delete_task(&mut self, id: TaskId) -> bool {
        let Some(idx) = self.tasks.iter().position(|t| t.id == id) else {
            warn!("delete for unknown task ignored");
            return false;
        };
        self.tasks.remove(idx);
        if self.view.editing == Some(id) {
            self.view.editing = None;
        }

        self.persist_tasks();
        true
    }

    pub fn begin_edit(&mut self, id: TaskId) -> bool {
        if self.task(id).is_none() {
            return false;
        }
        self.view.editing = Some(id);
        true
    }

    pub fn cancel_edit(&mut self) {
        self.view.editing = None;
    }

    pub fn editing_task(&self) -> Option<&Task> {
        self.view.editing.and_then(|id| self.task(id))
    }

    pub fn set_filter(&mut self, filter: StatusFilter) {
        self.view.filter = filter;
    }

    pub fn set_search(&mut self, term: impl Into<String>) {
        self.view.search = term.into();
    }

    pub fn clear_search(&mut self) {
        self.view.search.clear();
    }

    pub fn visible_tasks(&self) -> Vec<&Task> {
        view::project(&self.tasks, self.view.filter, &self.view.search)
    }

    pub fn counts(&self) -> TaskCounts {
        view::counts(&self.tasks)
    }

    /// Wipes both storage keys along with the in-memory tasks and session.
    #[tracing::instrument(skip(self))]
    pub fn clear_all_data(&mut self) {
        if let Err(err) = storage::clear_all(&mut self.storage) {
            error!(error = %format!("{err:#}"), "failed to clear storage");
        }
        self.tasks.clear();
        self.username = None;
        self.view = ViewState::default();
        info!("cleared all data");
    }

    fn persist_tasks(&mut self) {
        if let Err(err) = storage::save_tasks(&mut self.storage, &self.tasks) {
            error!(
                error = %format!("{err:#}"),
                count = self.tasks.len(),
                "failed to persist tasks; keeping in-memory state"
            );
        }
    }
}
