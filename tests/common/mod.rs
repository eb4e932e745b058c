//! Common test utilities and fixtures
//!
//! Builds a virtual filesystem over in-memory accounts and provides a
//! scripted downloader for exercising the download engine without aria2.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use mounthub::cache::{CacheConfig, ObjectCache};
use mounthub::config::MemoryDriverConfig;
use mounthub::download::{DownloadState, DownloadStatus, Downloader};
use mounthub::driver::memory::MemoryDriver;
use mounthub::driver::DriverConfig;
use mounthub::fs::Fs;
use mounthub::model::Account;
use mounthub::mount::MountTable;
use mounthub::operations::StorageOps;
use mounthub::{HubError, Result};

// ============================================================================
// Filesystem fixtures
// ============================================================================

/// Build a memory account mounted at `virtual_path`
pub fn memory_driver(id: u32, virtual_path: &str, config: DriverConfig) -> Arc<MemoryDriver> {
    Arc::new(MemoryDriver::new(
        Account::new(id, virtual_path, "memory"),
        MemoryDriverConfig::default(),
        config,
    ))
}

/// A virtual filesystem plus handles on the drivers mounted into it
pub struct Fixture {
    pub fs: Arc<Fs>,
    pub drivers: Vec<Arc<MemoryDriver>>,
}

impl Fixture {
    pub fn driver(&self, idx: usize) -> &MemoryDriver {
        &self.drivers[idx]
    }
}

/// Mount every driver into a fresh table with a default cache
pub fn fixture(drivers: Vec<Arc<MemoryDriver>>) -> Fixture {
    fixture_with_cache(drivers, CacheConfig::default())
}

pub fn fixture_with_cache(drivers: Vec<Arc<MemoryDriver>>, cache: CacheConfig) -> Fixture {
    let table = MountTable::new();
    for driver in &drivers {
        table
            .mount(driver.clone())
            .expect("Failed to mount test driver");
    }
    let ops = Arc::new(StorageOps::new(Arc::new(ObjectCache::new(cache))));
    Fixture {
        fs: Arc::new(Fs::new(Arc::new(table), ops)),
        drivers,
    }
}

pub fn names(objs: &[mounthub::model::Object]) -> Vec<String> {
    objs.iter().map(|o| o.name.clone()).collect()
}

// ============================================================================
// Scripted downloader
// ============================================================================

/// What the downloader does with one submission
#[derive(Debug, Clone)]
pub enum Plan {
    /// Write each `(relative path, body)` into the staging directory and
    /// report success
    Complete { files: Vec<(String, String)> },
    /// Report success without producing any file
    CompleteEmpty,
    /// Fail with an error worth retrying
    Transient,
    /// Fail with an error that is not worth retrying
    Fatal,
    /// Stay active forever
    Hang,
}

impl Plan {
    pub fn complete(name: &str, body: &str) -> Self {
        Self::tree(&[(name, body)])
    }

    pub fn tree(files: &[(&str, &str)]) -> Self {
        Plan::Complete {
            files: files
                .iter()
                .map(|(name, body)| (name.to_string(), body.to_string()))
                .collect(),
        }
    }
}

#[derive(Default)]
struct Script {
    plans: VecDeque<Plan>,
    /// Plan assigned to each handle, indexed by submission order
    assigned: Vec<Plan>,
    add_calls: Vec<PathBuf>,
    removed: Vec<String>,
}

/// Downloader double that follows a list of plans, one per submission
#[derive(Default)]
pub struct FakeDownloader {
    script: Mutex<Script>,
}

impl FakeDownloader {
    pub fn new(plans: Vec<Plan>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(Script {
                plans: plans.into(),
                ..Default::default()
            }),
        })
    }

    /// Staging directories passed to every submission, in order
    pub fn add_calls(&self) -> Vec<PathBuf> {
        self.script.lock().add_calls.clone()
    }

    pub fn removed(&self) -> Vec<String> {
        self.script.lock().removed.clone()
    }

    fn handle_index(gid: &str) -> Option<usize> {
        gid.strip_prefix("gid-")?.parse::<usize>().ok()?.checked_sub(1)
    }
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn add_uri(&self, _uris: &[String], dir: &Path) -> Result<String> {
        let mut script = self.script.lock();
        let plan = script.plans.pop_front().unwrap_or(Plan::Hang);
        if let Plan::Complete { files } = &plan {
            for (name, body) in files {
                let target = dir.join(name);
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(target, body)?;
            }
        }
        script.assigned.push(plan);
        script.add_calls.push(dir.to_path_buf());
        Ok(format!("gid-{}", script.assigned.len()))
    }

    async fn status(&self, gid: &str) -> Result<DownloadStatus> {
        let script = self.script.lock();
        let plan = Self::handle_index(gid)
            .and_then(|i| script.assigned.get(i))
            .ok_or_else(|| HubError::Downloader(format!("unknown gid {}", gid)))?;
        let (state, completed_length) = match plan {
            Plan::Complete { .. } | Plan::CompleteEmpty => (DownloadState::Complete, 100),
            Plan::Transient => (
                DownloadState::Error {
                    message: "connection reset".to_string(),
                    retryable: true,
                },
                0,
            ),
            Plan::Fatal => (
                DownloadState::Error {
                    message: "resource not found".to_string(),
                    retryable: false,
                },
                0,
            ),
            Plan::Hang => (DownloadState::Active, 40),
        };
        Ok(DownloadStatus {
            gid: gid.to_string(),
            state,
            total_length: 100,
            completed_length,
        })
    }

    async fn remove(&self, gid: &str) -> Result<()> {
        self.script.lock().removed.push(gid.to_string());
        Ok(())
    }

    async fn version(&self) -> Result<String> {
        Ok("1.37.0".to_string())
    }
}

/// Monitor policy with a short poll so tests finish quickly
pub fn download_config(max_concurrent: usize, max_retries: u32) -> mounthub::download::DownloadConfig {
    mounthub::download::DownloadConfig {
        max_concurrent,
        max_retries,
        poll_interval: Duration::from_millis(10),
        ..Default::default()
    }
}

/// Number of entries left under the staging root
pub fn staged_dirs(temp_root: &Path) -> usize {
    match std::fs::read_dir(temp_root.join("aria2")) {
        Ok(entries) => entries.count(),
        Err(_) => 0,
    }
}
