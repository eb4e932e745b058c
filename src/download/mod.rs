//! Background download engine
//!
//! Fetches remote URIs through an external downloader into private staging
//! directories, then hands the staged files to the virtual filesystem.

pub mod aria2;
pub mod client;
pub mod manager;
mod monitor;
pub mod task;

use std::time::Duration;

use serde::Deserialize;

pub use client::{DownloadState, DownloadStatus, Downloader};
pub use manager::DownloadManager;
pub use task::{TaskInfo, TaskState};

/// Downloader connection and monitor policy
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadConfig {
    /// JSON-RPC endpoint of the downloader
    #[serde(default = "default_uri")]
    pub uri: String,

    /// RPC secret token, empty when the downloader has none
    #[serde(default)]
    pub secret: String,

    /// Timeout of a single RPC call
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Monitors allowed to run at once; further tasks wait in `Pending`
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Transient errors tolerated per task before it fails
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between two status polls
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
}

fn default_uri() -> String {
    "http://localhost:6800/jsonrpc".to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_max_concurrent() -> usize {
    3
}

fn default_max_retries() -> u32 {
    3
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            secret: String::new(),
            timeout: default_timeout(),
            max_concurrent: default_max_concurrent(),
            max_retries: default_max_retries(),
            poll_interval: default_poll_interval(),
        }
    }
}
