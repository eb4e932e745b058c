//! Local filesystem driver
//!
//! Serves a directory of the host filesystem. Object ids are absolute host
//! paths, so the root folder is advertised by path.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, trace};

use crate::config::LocalDriverConfig;
use crate::driver::{Driver, DriverConfig, Getter, RootFolder};
use crate::error::{HubError, Result};
use crate::model::{Account, FileStream, Link, LinkArgs, Object, UpdateProgress};
use crate::path;

/// Upload buffer size
const COPY_CHUNK: usize = 64 * 1024;

pub struct LocalDriver {
    account: Account,
    config: DriverConfig,
    root: PathBuf,
}

impl LocalDriver {
    pub fn new(account: Account, local: LocalDriverConfig, config: DriverConfig) -> Result<Self> {
        if !local.root_folder_path.is_absolute() {
            return Err(HubError::Config(format!(
                "local root_folder_path must be absolute: {:?}",
                local.root_folder_path
            )));
        }
        Ok(Self {
            account,
            config,
            root: local.root_folder_path,
        })
    }

    /// Map an account-relative path to a host path under the root
    fn host_path(&self, rel: &str) -> PathBuf {
        let rel = path::standardize(rel);
        let rel = rel.trim_start_matches('/');
        if rel.is_empty() {
            self.root.clone()
        } else {
            self.root.join(rel)
        }
    }

    /// Host path stored in an object's id
    fn object_path(obj: &Object) -> Result<PathBuf> {
        if obj.id.is_empty() {
            return Err(HubError::InvalidPath(format!(
                "local object {} has no id",
                obj.name
            )));
        }
        Ok(PathBuf::from(&obj.id))
    }

    async fn to_object(host: &Path, name: String) -> Result<Object> {
        let meta = match tokio::fs::metadata(host).await {
            Ok(meta) => meta,
            // Dangling symlinks are reported as the link itself.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tokio::fs::symlink_metadata(host).await?
            }
            Err(e) => return Err(e.into()),
        };
        let modified: DateTime<Utc> = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        let obj = if meta.is_dir() {
            Object::folder(name, modified)
        } else {
            Object::file(name, meta.len(), modified)
        };
        Ok(obj.with_id(host.to_string_lossy()))
    }

    /// Recursively copy a file or directory tree
    async fn copy_tree(from: PathBuf, to: PathBuf) -> Result<()> {
        let mut pending = vec![(from, to)];
        while let Some((src, dst)) = pending.pop() {
            if tokio::fs::metadata(&src).await?.is_dir() {
                tokio::fs::create_dir_all(&dst).await?;
                let mut entries = tokio::fs::read_dir(&src).await?;
                while let Some(entry) = entries.next_entry().await? {
                    pending.push((entry.path(), dst.join(entry.file_name())));
                }
            } else {
                tokio::fs::copy(&src, &dst).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Getter for LocalDriver {
    async fn get(&self, rel: &str) -> Result<Object> {
        let host = self.host_path(rel);
        trace!("local get: {} -> {:?}", rel, host);
        let name = if path::is_root(rel) {
            "root".to_string()
        } else {
            path::split(rel).1
        };
        Self::to_object(&host, name).await
    }
}

#[async_trait]
impl Driver for LocalDriver {
    fn account(&self) -> &Account {
        &self.account
    }

    fn config(&self) -> &DriverConfig {
        &self.config
    }

    fn root(&self) -> Option<RootFolder> {
        Some(RootFolder::Path(self.root.to_string_lossy().to_string()))
    }

    fn as_getter(&self) -> Option<&dyn Getter> {
        Some(self)
    }

    async fn list(&self, dir: &Object) -> Result<Vec<Object>> {
        let host = Self::object_path(dir)?;
        debug!("local list: {:?}", host);
        let mut entries = tokio::fs::read_dir(&host).await?;
        let mut objects = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            objects.push(Self::to_object(&entry.path(), name).await?);
        }
        Ok(objects)
    }

    async fn link(&self, file: &Object, _args: &LinkArgs) -> Result<Link> {
        let host = Self::object_path(file)?;
        Ok(Link::new(host.to_string_lossy()))
    }

    async fn make_dir(&self, parent: &Object, name: &str) -> Result<()> {
        let host = Self::object_path(parent)?.join(name);
        debug!("local mkdir: {:?}", host);
        tokio::fs::create_dir(&host).await?;
        Ok(())
    }

    async fn move_to(&self, src: &Object, dst_dir: &Object) -> Result<()> {
        let from = Self::object_path(src)?;
        let to = Self::object_path(dst_dir)?.join(&src.name);
        tokio::fs::rename(&from, &to).await?;
        Ok(())
    }

    async fn rename(&self, src: &Object, new_name: &str) -> Result<()> {
        let from = Self::object_path(src)?;
        let to = from
            .parent()
            .map(|p| p.join(new_name))
            .ok_or_else(|| HubError::InvalidPath(from.to_string_lossy().to_string()))?;
        tokio::fs::rename(&from, &to).await?;
        Ok(())
    }

    async fn copy(&self, src: &Object, dst_dir: &Object) -> Result<()> {
        let from = Self::object_path(src)?;
        let to = Self::object_path(dst_dir)?.join(&src.name);
        Self::copy_tree(from, to).await
    }

    async fn remove(&self, obj: &Object) -> Result<()> {
        let host = Self::object_path(obj)?;
        if obj.is_dir() {
            tokio::fs::remove_dir_all(&host).await?;
        } else {
            tokio::fs::remove_file(&host).await?;
        }
        Ok(())
    }

    async fn put(
        &self,
        dst_dir: &Object,
        stream: &mut FileStream,
        progress: &UpdateProgress,
    ) -> Result<()> {
        let host = Self::object_path(dst_dir)?.join(&stream.name);
        debug!("local put: {:?} ({} bytes)", host, stream.size);
        let mut out = tokio::fs::File::create(&host).await?;
        let mut buf = vec![0u8; COPY_CHUNK];
        let mut written: u64 = 0;
        loop {
            let n = stream.reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n]).await?;
            written += n as u64;
            if stream.size > 0 {
                progress(written as f64 * 100.0 / stream.size as f64);
            }
        }
        out.flush().await?;
        progress(100.0);
        Ok(())
    }
}
