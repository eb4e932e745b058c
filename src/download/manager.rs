//! Download task registry and submission

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::client::Downloader;
use super::monitor;
use super::task::{Task, TaskInfo};
use super::DownloadConfig;
use crate::error::{HubError, Result, ResultExt};
use crate::fs::Fs;

pub(super) struct Inner {
    pub(super) fs: Arc<Fs>,
    pub(super) client: Arc<dyn Downloader>,
    pub(super) config: DownloadConfig,
    pub(super) slots: Arc<Semaphore>,
    pub(super) active: DashMap<String, Arc<Task>>,
    pub(super) done: Mutex<Vec<TaskInfo>>,
    temp_root: PathBuf,
}

impl Inner {
    /// Move a task from the active set to the completed record
    pub(super) fn retire(&self, task: &Task) {
        let info = task.info();
        self.done.lock().push(info.clone());
        self.active.remove(&info.id);
    }
}

/// Accepts download requests and supervises their monitors
#[derive(Clone)]
pub struct DownloadManager {
    inner: Arc<Inner>,
}

impl DownloadManager {
    /// Check the downloader is reachable and build a manager around it
    ///
    /// Fails with [`HubError::DownloaderNotReady`] when the downloader does
    /// not answer its version call.
    pub async fn connect(
        fs: Arc<Fs>,
        client: Arc<dyn Downloader>,
        config: DownloadConfig,
        temp_root: PathBuf,
    ) -> Result<Self> {
        let version = client.version().await.map_err(|e| {
            warn!("downloader version check failed: {}", e);
            HubError::DownloaderNotReady
        })?;
        info!("using downloader version: {}", version);
        if config.max_concurrent == 0 {
            return Err(HubError::Config(
                "downloader max_concurrent must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            inner: Arc::new(Inner {
                fs,
                client,
                slots: Arc::new(Semaphore::new(config.max_concurrent)),
                config,
                active: DashMap::new(),
                done: Mutex::new(Vec::new()),
                temp_root,
            }),
        })
    }

    /// Submit `uri` for download into the virtual directory `dst_dir`
    ///
    /// Only pre-flight checks fail here; transfer failures show up in the
    /// task's terminal state.
    pub async fn add_uri(&self, uri: &str, dst_dir: &str) -> Result<String> {
        let fs = &self.inner.fs;
        let (driver, actual) = fs.mounts().resolve(dst_dir)?;
        if driver.config().no_upload {
            return Err(HubError::UploadNotSupported(
                driver.account().virtual_path.clone(),
            ));
        }
        match fs.ops().get(driver.as_ref(), &actual).await {
            Ok(obj) if !obj.is_dir() => return Err(HubError::NotFolder(dst_dir.to_string())),
            Ok(_) => {}
            Err(e) if e.is_object_not_found() => {}
            Err(e) => return Err(e.context("add uri", dst_dir)),
        }

        let temp_dir = self
            .inner
            .temp_root
            .join("aria2")
            .join(Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&temp_dir)
            .await
            .map_err(HubError::from)
            .context("add uri", temp_dir.to_string_lossy())?;

        let gid = match self
            .inner
            .client
            .add_uri(&[uri.to_string()], &temp_dir)
            .await
        {
            Ok(gid) => gid,
            Err(e) => {
                monitor::remove_temp_dir(&temp_dir).await;
                return Err(e.context("add uri", uri));
            }
        };

        let name = format!(
            "download {} to [{}]({})",
            uri,
            driver.account().virtual_path,
            actual
        );
        debug!("submitted {}: {}", gid, name);
        let task = Arc::new(Task::new(
            gid.clone(),
            name,
            uri.to_string(),
            dst_dir.to_string(),
            temp_dir,
        ));
        self.inner.active.insert(gid.clone(), task.clone());
        tokio::spawn(monitor::run(self.inner.clone(), task));
        Ok(gid)
    }

    /// Ask a task to stop; the monitor reacts at its next poll boundary
    pub fn cancel(&self, id: &str) -> Result<()> {
        let task = self
            .inner
            .active
            .get(id)
            .map(|t| t.clone())
            .ok_or_else(|| HubError::TaskNotFound(id.to_string()))?;
        info!("canceling task {}", id);
        task.request_cancel();
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<TaskInfo> {
        if let Some(task) = self.inner.active.get(id) {
            return Some(task.info());
        }
        self.inner
            .done
            .lock()
            .iter()
            .rev()
            .find(|t| t.id == id)
            .cloned()
    }

    pub fn list_active(&self) -> Vec<TaskInfo> {
        self.inner.active.iter().map(|t| t.info()).collect()
    }

    pub fn list_done(&self) -> Vec<TaskInfo> {
        self.inner.done.lock().clone()
    }

    pub fn clear_done(&self) {
        self.inner.done.lock().clear();
    }

    /// Resolve once the task reaches a terminal state
    pub async fn wait(&self, id: &str) -> Result<TaskInfo> {
        let task = self.inner.active.get(id).map(|t| t.clone());
        if let Some(task) = task {
            let mut state = task.state_signal();
            // The sender lives in the task we hold, so this cannot close.
            let _ = state.wait_for(|s| s.is_terminal()).await;
        }
        self.get(id)
            .ok_or_else(|| HubError::TaskNotFound(id.to_string()))
    }
}
