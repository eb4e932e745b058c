//! mounthub: many storage backends behind one virtual path namespace
//!
//! This library mounts heterogeneous storage accounts under a single tree of
//! virtual paths and serves list/read/write operations through a uniform
//! contract, with backend latency hidden behind a listing cache and request
//! deduplication. A background engine fetches remote URIs into the tree
//! through an external downloader.
//!
//! # Architecture
//!
//! - **Drivers**: Storage backends implementing the `Driver` trait, which
//!   works on resolved objects rather than paths.
//! - **Mount Table**: Maps virtual paths to accounts and synthesizes folders
//!   for mount points.
//! - **Cache Layer**: TTL caches for listings and links plus singleflight
//!   groups so concurrent misses reach the backend once.
//! - **Storage Operations**: Path-based operations on one account, composed
//!   from the cache layer and a driver.
//! - **Virtual Filesystem**: Operations over full virtual paths, with mount
//!   overlay, visibility rules and sorting.
//! - **Download Engine**: Bounded background monitors that stage downloads
//!   and upload the results.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mounthub::cache::ObjectCache;
//! use mounthub::config::Config;
//! use mounthub::fs::{Fs, ListContext};
//! use mounthub::mount::MountTable;
//! use mounthub::operations::StorageOps;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_file(&"config.yaml".into())?;
//!
//! let mounts = Arc::new(MountTable::new());
//! for account in &config.accounts {
//!     let driver = mounthub::driver::build(
//!         account.account.clone(),
//!         &account.driver,
//!         account.config.clone(),
//!     )?;
//!     mounts.mount(driver)?;
//! }
//!
//! let ops = Arc::new(StorageOps::new(Arc::new(ObjectCache::new(config.cache.clone()))));
//! let fs = Fs::new(mounts, ops).with_metas(config.metas.clone());
//! let entries = fs.list("/", ListContext::default(), false).await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod download;
pub mod driver;
pub mod env;
pub mod error;
pub mod fs;
pub mod model;
pub mod mount;
pub mod operations;
pub mod path;

pub use error::{HubError, Result};
