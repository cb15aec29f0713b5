use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use tempfile::NamedTempFile;
use tracing::{debug, error, info};

use crate::task::Task;

pub const TASKS_KEY: &str = "task-tracker-tasks";
pub const USERNAME_KEY: &str = "task-tracker-username";

/// String-valued key-value storage that survives restarts, shaped like
/// the browser's `localStorage`.
pub trait KeyValueStorage {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()>;
    fn remove(&mut self, key: &str) -> anyhow::Result<()>;
}

/// One file per key inside a data directory.
#[derive(Debug)]
pub struct FileStorage {
    pub data_dir: PathBuf,
}

impl FileStorage {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        info!(data_dir = %data_dir.display(), "opened file storage");
        Ok(Self { data_dir })
    }

    fn path_for(&self, key: &str) -> anyhow::Result<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(anyhow!("invalid storage key: {key:?}"));
        }
        Ok(self.data_dir.join(key))
    }
}

impl KeyValueStorage for FileStorage {
    #[tracing::instrument(skip(self))]
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(text) => {
                debug!(file = %path.display(), bytes = text.len(), "read key");
                Ok(Some(text))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("failed reading {}", path.display())),
        }
    }

    #[tracing::instrument(skip(self, value))]
    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        debug!(file = %path.display(), bytes = value.len(), "writing key atomically");

        let mut temp = NamedTempFile::new_in(&self.data_dir)?;
        temp.write_all(value.as_bytes())?;
        temp.flush()?;
        temp.persist(&path)
            .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn remove(&mut self, key: &str) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("failed removing {}", path.display())),
        }
    }
}

/// Process-local storage. Writes can be switched to fail so the
/// unpersisted path can be exercised.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: BTreeMap<String, String>,
    fail_writes: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    fn check_writable(&self) -> anyhow::Result<()> {
        if self.fail_writes {
            return Err(anyhow!("storage quota exceeded"));
        }
        Ok(())
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        self.check_writable()?;
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> anyhow::Result<()> {
        self.check_writable()?;
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(feature = "web")]
pub use web::WebStorage;

#[cfg(feature = "web")]
mod web {
    use std::fmt;

    use anyhow::anyhow;

    use super::KeyValueStorage;

    /// `window.localStorage`, for builds that run in a browser.
    pub struct WebStorage {
        inner: web_sys::Storage,
    }

    impl fmt::Debug for WebStorage {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("WebStorage").finish_non_exhaustive()
        }
    }

    impl WebStorage {
        pub fn open() -> anyhow::Result<Self> {
            let window = web_sys::window().ok_or_else(|| anyhow!("no browser window"))?;
            let inner = window
                .local_storage()
                .map_err(|err| anyhow!("localStorage unavailable: {err:?}"))?
                .ok_or_else(|| anyhow!("localStorage unavailable"))?;
            Ok(Self { inner })
        }
    }

    impl KeyValueStorage for WebStorage {
        fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
            self.inner
                .get_item(key)
                .map_err(|err| anyhow!("failed reading {key}: {err:?}"))
        }

        fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
            self.inner
                .set_item(key, value)
                .map_err(|err| anyhow!("failed writing {key}: {err:?}"))
        }

        fn remove(&mut self, key: &str) -> anyhow::Result<()> {
            self.inner
                .remove_item(key)
                .map_err(|err| anyhow!("failed removing {key}: {err:?}"))
        }
    }
}

#[tracing::instrument(skip(storage))]
pub fn read_tasks<S: KeyValueStorage + ?Sized>(storage: &S) -> anyhow::Result<Vec<Task>> {
    let Some(raw) = storage.get(TASKS_KEY)? else {
        debug!("no stored tasks");
        return Ok(Vec::new());
    };
    let entries: Vec<serde_json::Value> =
        serde_json::from_str(&raw).with_context(|| format!("failed parsing {TASKS_KEY}"))?;

    let total = entries.len();
    let tasks: Vec<Task> = entries
        .into_iter()
        .enumerate()
        .filter_map(|(idx, entry)| match serde_json::from_value::<Task>(entry) {
            Ok(task) => Some(task),
            Err(err) => {
                error!(index = idx, error = %err, "skipping unreadable stored task");
                None
            }
        })
        .collect();
    debug!(count = tasks.len(), skipped = total - tasks.len(), "loaded tasks");
    Ok(tasks)
}

/// Like [`read_tasks`], but unreadable or corrupt data becomes an empty
/// collection.
pub fn load_tasks<S: KeyValueStorage + ?Sized>(storage: &S) -> Vec<Task> {
    read_tasks(storage).unwrap_or_else(|err| {
        error!(error = %format!("{err:#}"), "failed loading tasks from storage");
        Vec::new()
    })
}

#[tracing::instrument(skip(storage, tasks), fields(count = tasks.len()))]
pub fn save_tasks<S: KeyValueStorage + ?Sized>(storage: &mut S, tasks: &[Task]) -> anyhow::Result<()> {
    let json = serde_json::to_string(tasks)?;
    storage
        .set(TASKS_KEY, &json)
        .with_context(|| format!("failed saving {TASKS_KEY}"))
}

/// A missing, unreadable, or blank username all mean "logged out".
pub fn load_username<S: KeyValueStorage + ?Sized>(storage: &S) -> Option<String> {
    match storage.get(USERNAME_KEY) {
        Ok(Some(name)) if !name.trim().is_empty() => Some(name),
        Ok(_) => None,
        Err(err) => {
            error!(error = %format!("{err:#}"), "failed loading username from storage");
            None
        }
    }
}

pub fn save_username<S: KeyValueStorage + ?Sized>(storage: &mut S, username: &str) -> anyhow::Result<()> {
    storage
        .set(USERNAME_KEY, username)
        .with_context(|| format!("failed saving {USERNAME_KEY}"))
}

pub fn clear_username<S: KeyValueStorage + ?Sized>(storage: &mut S) -> anyhow::Result<()> {
    storage
        .remove(USERNAME_KEY)
        .with_context(|| format!("failed clearing {USERNAME_KEY}"))
}

#[tracing::instrument(skip(storage))]
pub fn clear_all<S: KeyValueStorage + ?Sized>(storage: &mut S) -> anyhow::Result<()> {
    storage
        .remove(TASKS_KEY)
        .with_context(|| format!("failed clearing {TASKS_KEY}"))?;
    clear_username(storage)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;
    use crate::task::{NewTask, TaskId};

    fn sample_tasks() -> Vec<Task> {
        let now = Utc::now();
        vec![
            Task::from_draft(TaskId(1), NewTask::new("Buy milk", ""), now),
            Task::from_draft(TaskId(2), NewTask::new("Walk dog", "buy leash"), now),
        ]
    }

    #[test]
    fn file_storage_get_set_remove() {
        let temp = tempdir().expect("tempdir");
        let mut storage = FileStorage::open(temp.path()).expect("open storage");

        assert_eq!(storage.get(USERNAME_KEY).expect("get"), None);
        storage.set(USERNAME_KEY, "ada").expect("set");
        assert_eq!(storage.get(USERNAME_KEY).expect("get"), Some("ada".to_string()));
        storage.remove(USERNAME_KEY).expect("remove");
        storage.remove(USERNAME_KEY).expect("removing twice is fine");
        assert_eq!(storage.get(USERNAME_KEY).expect("get"), None);
    }

    #[test]
    fn file_storage_rejects_path_like_keys() {
        let temp = tempdir().expect("tempdir");
        let mut storage = FileStorage::open(temp.path()).expect("open storage");
        assert!(storage.set("../escape", "x").is_err());
        assert!(storage.get("").is_err());
    }

    #[test]
    fn tasks_round_trip_in_order() {
        let mut storage = MemoryStorage::new();
        let tasks = sample_tasks();
        save_tasks(&mut storage, &tasks).expect("save");
        assert_eq!(read_tasks(&storage).expect("read"), tasks);
    }

    #[test]
    fn corrupt_tasks_degrade_to_empty() {
        let mut storage = MemoryStorage::new();
        storage.set(TASKS_KEY, "{not json").expect("set");
        assert!(read_tasks(&storage).is_err());
        assert!(load_tasks(&storage).is_empty());
    }

    #[test]
    fn one_bad_entry_does_not_discard_the_rest() {
        let mut storage = MemoryStorage::new();
        storage
            .set(
                TASKS_KEY,
                r#"[
                    {"id":1,"title":"Good","description":"","completed":false,"createdAt":"2024-01-01T00:00:00.000Z"},
                    {"id":2,"title":"No stamp","completed":true},
                    {"id":3,"title":"Bad stamp","description":"x","completed":false,"createdAt":"soon"},
                    {"id":"four","title":"Broken id"},
                    {"id":5,"description":"no title"}
                ]"#,
            )
            .expect("set");

        let tasks = load_tasks(&storage);
        let ids: Vec<u64> = tasks.iter().map(|t| t.id.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(tasks[1].created_at, crate::datetime::unknown_stamp());
        assert!(tasks[1].completed);
        assert_eq!(tasks[2].description, "x");
    }

    #[test]
    fn blank_username_reads_as_absent() {
        let mut storage = MemoryStorage::new();
        assert_eq!(load_username(&storage), None);
        storage.set(USERNAME_KEY, "   ").expect("set");
        assert_eq!(load_username(&storage), None);
        save_username(&mut storage, "grace").expect("save");
        assert_eq!(load_username(&storage), Some("grace".to_string()));
    }

    #[test]
    fn clear_all_removes_both_keys() {
        let mut storage = MemoryStorage::new();
        save_tasks(&mut storage, &sample_tasks()).expect("save tasks");
        save_username(&mut storage, "grace").expect("save username");

        clear_all(&mut storage).expect("clear");
        assert_eq!(storage.get(TASKS_KEY).expect("get"), None);
        assert_eq!(storage.get(USERNAME_KEY).expect("get"), None);
    }

    #[test]
    fn failing_writes_surface_as_errors() {
        let mut storage = MemoryStorage::new();
        storage.fail_writes(true);
        assert!(save_tasks(&mut storage, &sample_tasks()).is_err());
        assert_eq!(storage.get(TASKS_KEY).expect("get"), None);
    }
}
