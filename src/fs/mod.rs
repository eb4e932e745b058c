//! Virtual filesystem facade
//!
//! Operations over full virtual paths. Each call resolves the owning account
//! through the mount table and delegates to [`StorageOps`]; listings are then
//! merged with mount-point entries, filtered and sorted for presentation.

pub mod filter;

use std::sync::Arc;

use tracing::{debug, error};

use crate::driver::Driver;
use crate::error::{HubError, Result};
use crate::model::{ExtractFolder, FileStream, Link, LinkArgs, Meta, Object, UpdateProgress};
use crate::mount::MountTable;
use crate::operations::StorageOps;
use crate::path;

/// Viewer and policy for one listing request
#[derive(Debug, Clone, Copy, Default)]
pub struct ListContext<'a> {
    /// Viewer is privileged to see hidden entries
    pub can_see_hides: bool,
    /// Visibility policy governing the listed directory
    pub meta: Option<&'a Meta>,
}

pub struct Fs {
    mounts: Arc<MountTable>,
    ops: Arc<StorageOps>,
    metas: Vec<Meta>,
}

impl Fs {
    pub fn new(mounts: Arc<MountTable>, ops: Arc<StorageOps>) -> Self {
        Self {
            mounts,
            ops,
            metas: Vec::new(),
        }
    }

    pub fn with_metas(mut self, metas: Vec<Meta>) -> Self {
        self.metas = metas
            .into_iter()
            .map(|mut m| {
                m.path = path::standardize(&m.path);
                m
            })
            .collect();
        self
    }

    pub fn mounts(&self) -> &MountTable {
        &self.mounts
    }

    pub fn ops(&self) -> &StorageOps {
        &self.ops
    }

    /// Policy of `path` or of its closest ancestor that has one
    pub fn nearest_meta(&self, raw_path: &str) -> Option<&Meta> {
        let target = path::standardize(raw_path);
        self.metas
            .iter()
            .filter(|m| m.path == target || path::is_sub_path(&m.path, &target))
            .max_by_key(|m| m.path.len())
    }

    /// List a virtual directory
    pub async fn list(&self, raw_path: &str, ctx: ListContext<'_>, refresh: bool) -> Result<Vec<Object>> {
        let path = path::standardize(raw_path);
        debug!("fs list: {}", path);
        let virtual_objs = self.mounts.virtual_children(&path);
        let (driver, actual) = match self.mounts.resolve(&path) {
            Ok(resolved) => resolved,
            Err(_) if !virtual_objs.is_empty() => return Ok(virtual_objs),
            Err(e) => return Err(e),
        };

        let objs = match self.ops.list(driver.as_ref(), &actual, refresh).await {
            Ok(objs) => objs,
            Err(e) => {
                error!("list {} failed: {}", path, e);
                if !virtual_objs.is_empty() {
                    return Ok(virtual_objs);
                }
                return Err(e);
            }
        };

        let hide_meta = ctx
            .meta
            .filter(|meta| filter::whether_hide(ctx.can_see_hides, Some(*meta), &path));
        let mut objs = filter::merge_virtual(objs, virtual_objs);
        if let Some(meta) = hide_meta {
            objs = filter::hide(objs, meta);
        }

        let sort = &driver.account().sort;
        if driver.config().local_sort {
            if let Some(order_by) = sort.order_by {
                filter::sort_objects(&mut objs, order_by, sort.order_direction);
            }
        }
        match sort.extract_folder {
            ExtractFolder::Flatten => {
                let objs = self.flatten(driver.as_ref(), &actual, objs).await?;
                // Lifted children face the same policy as the listing itself.
                Ok(match hide_meta {
                    Some(meta) => filter::hide(objs, meta),
                    None => objs,
                })
            }
            extract => {
                filter::group_folders(&mut objs, extract);
                Ok(objs)
            }
        }
    }

    /// Replace folders holding exactly one entry by that entry
    async fn flatten(&self, driver: &dyn Driver, actual: &str, objs: Vec<Object>) -> Result<Vec<Object>> {
        let mut flattened = Vec::with_capacity(objs.len());
        for obj in objs {
            if !obj.is_folder {
                flattened.push(obj);
                continue;
            }
            let child_path = path::join(actual, &obj.name);
            match self.ops.list(driver, &child_path, false).await {
                Ok(mut children) if children.len() == 1 => flattened.append(&mut children),
                // Mount-point entries have no backend folder to look into.
                _ => flattened.push(obj),
            }
        }
        Ok(flattened)
    }

    /// Resolve a virtual path to an object
    ///
    /// Paths that only lead to mount points resolve to synthetic folders.
    pub async fn get(&self, raw_path: &str) -> Result<Object> {
        let path = path::standardize(raw_path);
        let found = match self.mounts.resolve(&path) {
            Ok((driver, actual)) => self.ops.get(driver.as_ref(), &actual).await,
            Err(e) => Err(e),
        };
        match found {
            Err(_) if self.is_virtual_dir(&path) => {
                let name = if path::is_root(&path) {
                    "root".to_string()
                } else {
                    path::split(&path).1
                };
                Ok(Object::folder(name, chrono::Utc::now()))
            }
            result => result,
        }
    }

    fn is_virtual_dir(&self, path: &str) -> bool {
        !self.mounts.virtual_children(path).is_empty()
    }

    pub async fn link(&self, raw_path: &str, args: &LinkArgs) -> Result<(Link, Object)> {
        let (driver, actual) = self.mounts.resolve(raw_path)?;
        self.ops.link(driver.as_ref(), &actual, args).await
    }

    pub async fn make_dir(&self, raw_path: &str) -> Result<()> {
        let (driver, actual) = self.mounts.resolve(raw_path)?;
        self.ops.make_dir(driver.as_ref(), &actual).await
    }

    /// Move an object into a directory of the same account
    pub async fn move_to(&self, src_path: &str, dst_dir_path: &str) -> Result<()> {
        let (driver, src, dst) = self.resolve_pair("move", src_path, dst_dir_path)?;
        self.ops.move_to(driver.as_ref(), &src, &dst).await
    }

    pub async fn rename(&self, src_path: &str, new_name: &str) -> Result<()> {
        let (driver, actual) = self.mounts.resolve(src_path)?;
        self.ops.rename(driver.as_ref(), &actual, new_name).await
    }

    /// Copy an object into a directory of the same account
    pub async fn copy(&self, src_path: &str, dst_dir_path: &str) -> Result<()> {
        let (driver, src, dst) = self.resolve_pair("copy", src_path, dst_dir_path)?;
        self.ops.copy(driver.as_ref(), &src, &dst).await
    }

    pub async fn remove(&self, raw_path: &str) -> Result<()> {
        let (driver, actual) = self.mounts.resolve(raw_path)?;
        self.ops.remove(driver.as_ref(), &actual).await
    }

    /// Upload a stream into a virtual directory
    ///
    /// The stream is released even when the account rejects the upload.
    pub async fn put(
        &self,
        dst_dir_path: &str,
        stream: FileStream,
        progress: Option<UpdateProgress>,
    ) -> Result<()> {
        let (driver, actual) = match self.mounts.resolve(dst_dir_path) {
            Ok(resolved) => resolved,
            Err(e) => {
                stream.release();
                return Err(e);
            }
        };
        if driver.config().no_upload {
            stream.release();
            return Err(HubError::UploadNotSupported(driver.account().virtual_path.clone()));
        }
        self.ops
            .put(driver.as_ref(), &actual, stream, progress)
            .await
    }

    fn resolve_pair(
        &self,
        op: &str,
        src_path: &str,
        dst_dir_path: &str,
    ) -> Result<(Arc<dyn Driver>, String, String)> {
        let (src_driver, src) = self.mounts.resolve(src_path)?;
        let (dst_driver, dst) = self.mounts.resolve(dst_dir_path)?;
        if src_driver.account().virtual_path != dst_driver.account().virtual_path {
            return Err(HubError::NotSupported(format!(
                "{} between accounts: {} -> {}",
                op, src_path, dst_dir_path
            )));
        }
        Ok((src_driver, src, dst))
    }
}
