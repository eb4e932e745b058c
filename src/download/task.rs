//! Download task records

use std::path::PathBuf;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Submitted, waiting for a monitor slot
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Canceled
        )
    }
}

/// Snapshot of a task, as returned by inspection calls
#[derive(Debug, Clone)]
pub struct TaskInfo {
    /// Handle returned by the downloader on submission
    pub id: String,
    pub name: String,
    pub uri: String,
    /// Destination virtual directory
    pub dst_dir: String,
    pub temp_dir: PathBuf,
    pub state: TaskState,
    pub retry_count: u32,
    /// Percent, as last reported by the downloader
    pub progress: f64,
    pub status: String,
    pub error: Option<String>,
}

/// A live task shared by the manager and its monitor
pub(crate) struct Task {
    info: RwLock<TaskInfo>,
    /// Current downloader handle; changes when the URI is re-issued
    handle: Mutex<String>,
    cancel: watch::Sender<bool>,
    state: watch::Sender<TaskState>,
}

impl Task {
    pub(crate) fn new(id: String, name: String, uri: String, dst_dir: String, temp_dir: PathBuf) -> Self {
        let (cancel, _) = watch::channel(false);
        let (state, _) = watch::channel(TaskState::Pending);
        Self {
            handle: Mutex::new(id.clone()),
            info: RwLock::new(TaskInfo {
                id,
                name,
                uri,
                dst_dir,
                temp_dir,
                state: TaskState::Pending,
                retry_count: 0,
                progress: 0.0,
                status: "pending".to_string(),
                error: None,
            }),
            cancel,
            state,
        }
    }

    pub(crate) fn info(&self) -> TaskInfo {
        self.info.read().clone()
    }

    pub(crate) fn id(&self) -> String {
        self.info.read().id.clone()
    }

    pub(crate) fn handle(&self) -> String {
        self.handle.lock().clone()
    }

    pub(crate) fn set_handle(&self, handle: String) {
        *self.handle.lock() = handle;
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut TaskInfo)) {
        f(&mut *self.info.write());
    }

    /// Record a state change and wake waiters. Terminal states are final.
    pub(crate) fn set_state(&self, state: TaskState) {
        {
            let mut info = self.info.write();
            if info.state.is_terminal() {
                return;
            }
            info.state = state;
        }
        self.state.send_replace(state);
    }

    /// Wake waiters with the recorded state
    pub(crate) fn publish_state(&self) {
        let state = self.info.read().state;
        self.state.send_replace(state);
    }

    pub(crate) fn request_cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub(crate) fn cancel_signal(&self) -> watch::Receiver<bool> {
        self.cancel.subscribe()
    }

    pub(crate) fn state_signal(&self) -> watch::Receiver<TaskState> {
        self.state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> Task {
        Task::new(
            "gid-1".to_string(),
            "download".to_string(),
            "http://example.com/f".to_string(),
            "/dst".to_string(),
            PathBuf::from("/tmp/x"),
        )
    }

    #[test]
    fn test_terminal_state_is_final() {
        let task = task();
        task.set_state(TaskState::Running);
        task.set_state(TaskState::Failed);
        task.set_state(TaskState::Succeeded);
        assert_eq!(task.info().state, TaskState::Failed);
        assert_eq!(*task.state_signal().borrow(), TaskState::Failed);
    }

    #[test]
    fn test_handle_tracks_reissue_but_id_is_stable() {
        let task = task();
        task.set_handle("gid-2".to_string());
        assert_eq!(task.handle(), "gid-2");
        assert_eq!(task.id(), "gid-1");
    }
}
