use std::path::PathBuf;
use std::sync::Mutex;

use tracing::warn;

use crate::models::Task;

/// Persistent single-slot cache of the full task list. Best-effort: the store
/// treats whatever is here as disposable, so implementations log failures
/// instead of surfacing them.
pub trait Mirror: Send + Sync {
    /// The cached list, or `None` when nothing usable is cached.
    fn load(&self) -> Option<Vec<Task>>;

    /// Replace the cached list.
    fn store(&self, list: &[Task]);
}

/// Mirror backed by one JSON file.
pub struct FileMirror {
    path: PathBuf,
}

impl FileMirror {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileMirror { path: path.into() }
    }
}

impl Mirror for FileMirror {
    fn load(&self) -> Option<Vec<Task>> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(list) => Some(list),
            Err(err) => {
                warn!(%err, path = %self.path.display(), "ignoring unreadable mirror content");
                None
            }
        }
    }

    fn store(&self, list: &[Task]) {
        let raw = match serde_json::to_string(list) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(%err, "failed to serialize task list for mirror");
                return;
            }
        };
        if let Err(err) = std::fs::write(&self.path, raw) {
            warn!(%err, path = %self.path.display(), "failed to write mirror");
        }
    }
}

/// Mirror held in memory. Stores the serialized form so corrupt content is
/// representable, which the file-backed mirror has to tolerate too.
#[derive(Default)]
pub struct MemoryMirror {
    slot: Mutex<Option<String>>,
}

impl MemoryMirror {
    pub fn new() -> Self {
        MemoryMirror::default()
    }

    pub fn with_raw(raw: &str) -> Self {
        MemoryMirror {
            slot: Mutex::new(Some(raw.to_string())),
        }
    }

    /// The raw serialized slot, for inspection.
    pub fn raw(&self) -> Option<String> {
        self.slot.lock().unwrap().clone()
    }
}

impl Mirror for MemoryMirror {
    fn load(&self) -> Option<Vec<Task>> {
        let slot = self.slot.lock().unwrap();
        let raw = slot.as_ref()?;
        match serde_json::from_str(raw) {
            Ok(list) => Some(list),
            Err(err) => {
                warn!(%err, "ignoring unreadable mirror content");
                None
            }
        }
    }

    fn store(&self, list: &[Task]) {
        match serde_json::to_string(list) {
            Ok(raw) => *self.slot.lock().unwrap() = Some(raw),
            Err(err) => warn!(%err, "failed to serialize task list for mirror"),
        }
    }
}
