//! External downloader contract

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;

/// Downloader-side state of a transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadState {
    /// Queued, transferring or paused
    Active,
    Complete,
    /// Removed on the downloader side
    Removed,
    Error { message: String, retryable: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadStatus {
    pub gid: String,
    pub state: DownloadState,
    pub total_length: u64,
    pub completed_length: u64,
}

impl DownloadStatus {
    /// Completion in percent, 0 while the size is unknown
    pub fn progress(&self) -> f64 {
        if self.total_length == 0 {
            return 0.0;
        }
        self.completed_length as f64 * 100.0 / self.total_length as f64
    }
}

/// A process that downloads URIs into local directories
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Start downloading `uris` into `dir`, returning the transfer handle
    async fn add_uri(&self, uris: &[String], dir: &Path) -> Result<String>;

    async fn status(&self, gid: &str) -> Result<DownloadStatus>;

    /// Abort a transfer
    async fn remove(&self, gid: &str) -> Result<()>;

    /// Reachability check, returns the downloader version
    async fn version(&self) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress() {
        let mut status = DownloadStatus {
            gid: "1".to_string(),
            state: DownloadState::Active,
            total_length: 0,
            completed_length: 0,
        };
        assert_eq!(status.progress(), 0.0);
        status.total_length = 200;
        status.completed_length = 50;
        assert_eq!(status.progress(), 25.0);
    }
}
