//! Per-task monitor loop

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_stream::try_stream;
use futures::{pin_mut, Stream, StreamExt};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::client::DownloadState;
use super::manager::Inner;
use super::task::{Task, TaskState};
use crate::error::{HubError, Result};
use crate::model::FileStream;
use crate::path;

enum Outcome {
    Succeeded,
    Failed(String),
    Canceled,
}

/// Drive a task from submission to a terminal state
pub(super) async fn run(inner: Arc<Inner>, task: Arc<Task>) {
    let mut cancel = task.cancel_signal();
    let slot = tokio::select! {
        permit = inner.slots.clone().acquire_owned() => permit.ok(),
        _ = cancel_requested(&mut cancel) => None,
    };

    let outcome = match slot {
        Some(permit) => {
            task.set_state(TaskState::Running);
            let outcome = Monitor {
                inner: &inner,
                task: &task,
            }
            .watch()
            .await;
            drop(permit);
            outcome
        }
        None => {
            abort_handle(&inner, &task).await;
            Outcome::Canceled
        }
    };
    finish(&inner, &task, outcome).await;
}

/// Resolve once cancellation has been requested.
///
/// The borrow guard of the watch value is released before returning so the
/// caller's future stays `Send` across its own awaits.
async fn cancel_requested(cancel: &mut watch::Receiver<bool>) {
    let _ = cancel.wait_for(|c| *c).await;
}

struct Monitor<'a> {
    inner: &'a Inner,
    task: &'a Task,
}

impl Monitor<'_> {
    async fn watch(&self) -> Outcome {
        let mut cancel = self.task.cancel_signal();
        loop {
            tokio::select! {
                _ = cancel_requested(&mut cancel) => {
                    abort_handle(self.inner, self.task).await;
                    return Outcome::Canceled;
                }
                _ = tokio::time::sleep(self.inner.config.poll_interval) => {}
            }

            let handle = self.task.handle();
            let status = match self.inner.client.status(&handle).await {
                Ok(status) => status,
                Err(e) => {
                    warn!("status of {} failed: {}", handle, e);
                    if let Some(outcome) = self.count_retry(e.to_string()) {
                        return outcome;
                    }
                    continue;
                }
            };

            match status.state {
                DownloadState::Active => {
                    let progress = status.progress();
                    self.task.update(|info| {
                        info.progress = progress;
                        info.status = format!("downloading {:.1}%", progress);
                    });
                }
                DownloadState::Complete => return self.complete().await,
                DownloadState::Removed => {
                    warn!("download {} removed by the downloader", handle);
                    return Outcome::Canceled;
                }
                DownloadState::Error {
                    message,
                    retryable: false,
                } => return Outcome::Failed(message),
                DownloadState::Error {
                    message,
                    retryable: true,
                } => {
                    if let Some(outcome) = self.count_retry(message) {
                        return outcome;
                    }
                    if let Err(e) = self.reissue().await {
                        return Outcome::Failed(e.to_string());
                    }
                }
            }
        }
    }

    /// Count a transient error; returns the terminal outcome once the retry
    /// limit is reached.
    fn count_retry(&self, message: String) -> Option<Outcome> {
        let max = self.inner.config.max_retries;
        let mut retries = 0;
        self.task.update(|info| {
            info.retry_count += 1;
            info.status = format!("retrying after: {}", message);
            retries = info.retry_count;
        });
        if retries >= max {
            return Some(Outcome::Failed(format!(
                "gave up after {} retries: {}",
                retries, message
            )));
        }
        None
    }

    async fn reissue(&self) -> Result<()> {
        let info = self.task.info();
        let handle = self
            .inner
            .client
            .add_uri(&[info.uri.clone()], &info.temp_dir)
            .await?;
        debug!("re-issued {} as {}", info.id, handle);
        self.task.set_handle(handle);
        Ok(())
    }

    /// Hand every staged file to the destination directory
    async fn complete(&self) -> Outcome {
        let info = self.task.info();
        self.task.update(|info| {
            info.progress = 100.0;
            info.status = "transferring".to_string();
        });
        let files = staged_files(info.temp_dir.clone());
        pin_mut!(files);
        let mut transferred = 0;
        while let Some(file) = files.next().await {
            let result = match file {
                Ok(path) => {
                    let dst = staged_destination(&info.temp_dir, &path, &info.dst_dir);
                    self.transfer(path, &dst).await
                }
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                return Outcome::Failed(e.to_string());
            }
            transferred += 1;
        }
        if transferred == 0 {
            return Outcome::Failed("download completed without any file".to_string());
        }
        Outcome::Succeeded
    }

    async fn transfer(&self, path: PathBuf, dst_dir: &str) -> Result<()> {
        debug!("transferring {:?} to {}", path, dst_dir);
        let stream = FileStream::from_temp_file(path).await?;
        self.inner.fs.put(dst_dir, stream, None).await
    }
}

/// Virtual directory a staged file goes to, keeping its layout below the
/// staging directory
fn staged_destination(temp_dir: &Path, file: &Path, dst_dir: &str) -> String {
    let rel = file
        .parent()
        .and_then(|dir| dir.strip_prefix(temp_dir).ok())
        .map(|dir| dir.to_string_lossy().to_string())
        .unwrap_or_default();
    path::join(dst_dir, &rel)
}

/// Regular files below `root`, depth first
fn staged_files(root: PathBuf) -> impl Stream<Item = Result<PathBuf>> {
    try_stream! {
        let mut pending = vec![root];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await.map_err(HubError::from)?;
            while let Some(entry) = entries.next_entry().await.map_err(HubError::from)? {
                let file_type = entry.file_type().await.map_err(HubError::from)?;
                if file_type.is_dir() {
                    pending.push(entry.path());
                } else if file_type.is_file() {
                    yield entry.path();
                }
            }
        }
    }
}

async fn abort_handle(inner: &Inner, task: &Task) {
    let handle = task.handle();
    if let Err(e) = inner.client.remove(&handle).await {
        warn!("failed to remove download {}: {}", handle, e);
    }
}

pub(super) async fn remove_temp_dir(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            error!("failed to remove temp dir {:?}: {}", dir, e);
        }
    }
}

async fn finish(inner: &Inner, task: &Task, outcome: Outcome) {
    let info = task.info();
    remove_temp_dir(&info.temp_dir).await;
    let state = match outcome {
        Outcome::Succeeded => {
            info!("task {} succeeded: {}", info.id, info.name);
            task.update(|i| i.status = "succeeded".to_string());
            TaskState::Succeeded
        }
        Outcome::Failed(message) => {
            error!("task {} failed: {}", info.id, message);
            task.update(|i| {
                i.status = "failed".to_string();
                i.error = Some(message);
            });
            TaskState::Failed
        }
        Outcome::Canceled => {
            info!("task {} canceled", info.id);
            task.update(|i| i.status = "canceled".to_string());
            TaskState::Canceled
        }
    };
    task.update(|i| {
        if !i.state.is_terminal() {
            i.state = state;
        }
    });
    // Record before waking waiters so they find the task among finished ones.
    inner.retire(task);
    task.publish_state();
}
