use thiserror::Error;

use crate::task::TaskId;

/// Failures a caller can act on. Storage trouble is not in here: it is
/// logged and absorbed by the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskpadError {
    #[error("task title is required")]
    EmptyTitle,

    #[error("please enter a username")]
    EmptyUsername,

    #[error("not logged in; run `taskpad login <name>` first")]
    NotLoggedIn,

    #[error("no task with id {0}")]
    UnknownTask(TaskId),

    #[error("invalid task id: {0}")]
    InvalidId(String),
}
