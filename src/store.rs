use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::mirror::Mirror;
use crate::models::{now_rfc3339, Comment, Task, TaskStatus};
use crate::notify::Notifier;
use crate::remote::{Remote, RetrievalError};
use crate::sync::Syncer;

/// Raised when a mutating operation runs without an authenticated subject.
/// Nothing is written and nothing is pushed.
#[derive(Debug, thiserror::Error)]
#[error("user id not found")]
pub struct NoUserError;

/// Client-side view filter. Never applied to stored data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterStatus {
    #[default]
    All,
    Incomplete,
    Complete,
}

/// One mutation of the task list. Applying an action is pure; all I/O happens
/// around [`reduce`].
#[derive(Debug, Clone)]
pub enum Action {
    AddTask(Task),
    UpdateTask(Task),
    DeleteTask(String),
    AddComment { task_id: String, comment: Comment },
    UpdateComment { task_id: String, index: usize, text: String },
    DeleteComment { task_id: String, index: usize },
    SetAll(Vec<Task>),
}

/// Applies `action` to `list`. Returns `None` when the action does not apply
/// (unknown task id, out-of-range comment index); such actions are complete
/// no-ops at the store level.
pub fn reduce(list: &[Task], action: Action) -> Option<Vec<Task>> {
    match action {
        Action::AddTask(task) => {
            let mut next = Vec::with_capacity(list.len() + 1);
            next.push(task);
            next.extend_from_slice(list);
            Some(next)
        }
        Action::UpdateTask(updated) => {
            let pos = list.iter().position(|task| task.id == updated.id)?;
            let mut next = list.to_vec();
            next[pos].title = updated.title;
            next[pos].status = updated.status;
            next[pos].comments = updated.comments;
            Some(next)
        }
        Action::DeleteTask(id) => {
            let pos = list.iter().position(|task| task.id == id)?;
            let mut next = list.to_vec();
            next.remove(pos);
            Some(next)
        }
        Action::AddComment { task_id, comment } => {
            let pos = list.iter().position(|task| task.id == task_id)?;
            let mut next = list.to_vec();
            next[pos]
                .comments
                .get_or_insert_with(Vec::new)
                .insert(0, comment);
            Some(next)
        }
        Action::UpdateComment { task_id, index, text } => {
            let pos = list.iter().position(|task| task.id == task_id)?;
            let mut next = list.to_vec();
            let comment = next[pos].comments.as_mut()?.get_mut(index)?;
            comment.comment = text;
            Some(next)
        }
        Action::DeleteComment { task_id, index } => {
            let pos = list.iter().position(|task| task.id == task_id)?;
            let mut next = list.to_vec();
            let comments = next[pos].comments.as_mut()?;
            if index >= comments.len() {
                return None;
            }
            comments.remove(index);
            Some(next)
        }
        Action::SetAll(new) => Some(new),
    }
}

struct StoreState {
    filter_status: FilterStatus,
    todo_list: Option<Vec<Task>>,
    initial_load_complete: bool,
}

/// The synchronization store: authoritative in-memory task list, write-through
/// local mirror, background whole-list push to the remote service.
///
/// Mutations are serialized through one lock and applied by the pure
/// [`reduce`] function, so memory and mirror cannot diverge. `todo_list` is
/// `None` until the initial load resolves, and stays `None` when the server
/// holds no record for this subject ("no list yet", distinct from an empty
/// list).
///
/// Writes are optimistic: the local copy lands before the push is scheduled,
/// and a failed push keeps the local copy and surfaces a notification. No
/// automatic retry.
pub struct Store {
    state: Mutex<StoreState>,
    mirror: Arc<dyn Mirror>,
    remote: Arc<dyn Remote>,
    syncer: Syncer,
}

impl Store {
    pub fn new(
        mirror: Arc<dyn Mirror>,
        remote: Arc<dyn Remote>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let syncer = Syncer::new(Arc::clone(&remote), notifier);
        Store {
            state: Mutex::new(StoreState {
                filter_status: FilterStatus::All,
                todo_list: None,
                initial_load_complete: false,
            }),
            mirror,
            remote,
            syncer,
        }
    }

    pub fn with_reorder_debounce(mut self, debounce: Duration) -> Self {
        self.syncer = self.syncer.with_debounce(debounce);
        self
    }

    pub fn syncer(&self) -> &Syncer {
        &self.syncer
    }

    pub fn filter_status(&self) -> FilterStatus {
        self.state.lock().unwrap().filter_status
    }

    pub fn todo_list(&self) -> Option<Vec<Task>> {
        self.state.lock().unwrap().todo_list.clone()
    }

    pub fn initial_load_complete(&self) -> bool {
        self.state.lock().unwrap().initial_load_complete
    }

    /// The current list as seen through the filter. Empty when no list exists.
    pub fn visible_tasks(&self) -> Vec<Task> {
        let state = self.state.lock().unwrap();
        let Some(list) = &state.todo_list else {
            return Vec::new();
        };
        list.iter()
            .filter(|task| match state.filter_status {
                FilterStatus::All => true,
                FilterStatus::Incomplete => task.status == TaskStatus::Incomplete,
                FilterStatus::Complete => task.status == TaskStatus::Complete,
            })
            .cloned()
            .collect()
    }

    pub fn set_filter_status(&self, filter_status: FilterStatus) {
        self.state.lock().unwrap().filter_status = filter_status;
    }

    /// Fetches the subject's list from the remote service. An absent record
    /// leaves `todo_list` as `None` and does not touch the mirror; a returned
    /// list (including an empty one) lands in memory and the mirror.
    ///
    /// Call once after authentication; calling again is wasteful but harmless.
    pub async fn load_initial_list(&self) -> Result<(), RetrievalError> {
        let fetched = self.remote.get_list().await?;

        let mut state = self.state.lock().unwrap();
        match fetched {
            Some(list) => {
                self.mirror.store(&list);
                state.todo_list = Some(list);
            }
            None => state.todo_list = None,
        }
        state.initial_load_complete = true;
        Ok(())
    }

    /// Prepends the task: the newest addition is always the list head.
    pub fn add_task(&self, user_id: &str, task: Task) -> Result<(), NoUserError> {
        self.apply(user_id, Action::AddTask(task), "Task added successfully", false)
    }

    /// Replaces the stored task's title, status and comments. Silently skipped
    /// when no task carries the given id.
    pub fn update_task(&self, user_id: &str, task: Task) -> Result<(), NoUserError> {
        self.apply(
            user_id,
            Action::UpdateTask(task),
            "Task updated successfully",
            false,
        )
    }

    pub fn delete_task(&self, user_id: &str, id: &str) -> Result<(), NoUserError> {
        self.apply(
            user_id,
            Action::DeleteTask(id.to_string()),
            "Task deleted successfully",
            false,
        )
    }

    /// Prepends a comment with the current timestamp, creating the comment
    /// list if the task has none. No-op when the task is absent.
    pub fn add_comment(&self, user_id: &str, task_id: &str, text: &str) -> Result<(), NoUserError> {
        let comment = Comment {
            comment: text.to_string(),
            time: now_rfc3339(),
        };
        self.apply(
            user_id,
            Action::AddComment {
                task_id: task_id.to_string(),
                comment,
            },
            "Comment added successfully",
            false,
        )
    }

    /// Replaces the comment text at `index`, leaving its timestamp untouched.
    pub fn update_comment(
        &self,
        user_id: &str,
        task_id: &str,
        index: usize,
        text: &str,
    ) -> Result<(), NoUserError> {
        self.apply(
            user_id,
            Action::UpdateComment {
                task_id: task_id.to_string(),
                index,
                text: text.to_string(),
            },
            "Comment updated successfully",
            false,
        )
    }

    pub fn delete_comment(
        &self,
        user_id: &str,
        task_id: &str,
        index: usize,
    ) -> Result<(), NoUserError> {
        self.apply(
            user_id,
            Action::DeleteComment {
                task_id: task_id.to_string(),
                index,
            },
            "Comment deleted successfully",
            false,
        )
    }

    /// Replaces the whole list verbatim; order is meaningful and persisted as
    /// given. Used for drag-reorder, so the push is debounced.
    pub fn set_tasks(&self, user_id: &str, list: Vec<Task>) -> Result<(), NoUserError> {
        self.apply(user_id, Action::SetAll(list), "Task order saved", true)
    }

    fn apply(
        &self,
        user_id: &str,
        action: Action,
        success_message: &'static str,
        debounced: bool,
    ) -> Result<(), NoUserError> {
        if user_id.is_empty() {
            return Err(NoUserError);
        }

        let mut state = self.state.lock().unwrap();
        let current = match &state.todo_list {
            Some(list) => list.clone(),
            // Not loaded yet: recover whatever a previous session mirrored,
            // tolerating absent or corrupt content as an empty list.
            None => self.mirror.load().unwrap_or_default(),
        };

        let Some(next) = reduce(&current, action) else {
            return Ok(());
        };

        self.mirror.store(&next);
        state.todo_list = Some(next.clone());
        drop(state);

        if debounced {
            self.syncer.push_debounced(next, success_message);
        } else {
            self.syncer.push(next, success_message);
        }
        Ok(())
    }
}
