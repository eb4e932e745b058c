//! In-process driver
//!
//! Keeps a tree in memory. Listings leave object ids empty and the root is
//! advertised by id, so every lookup goes through the facade's listing scan.
//! Backend call counters make it usable as a test double.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::io::AsyncReadExt;
use tracing::trace;

use crate::config::MemoryDriverConfig;
use crate::driver::{Driver, DriverConfig, RootFolder};
use crate::error::{HubError, Result};
use crate::model::{Account, FileStream, Link, LinkArgs, Object, UpdateProgress};
use crate::path;

#[derive(Debug, Clone)]
struct Node {
    is_folder: bool,
    data: Bytes,
    modified: DateTime<Utc>,
}

pub struct MemoryDriver {
    account: Account,
    config: DriverConfig,
    root_id: String,
    link_ttl: Option<Duration>,
    /// Artificial latency added to every list call
    list_delay: Duration,
    /// Keyed by standardized path, root included
    nodes: RwLock<BTreeMap<String, Node>>,
    list_calls: AtomicUsize,
    link_calls: AtomicUsize,
    /// Paths created through `make_dir`, in creation order
    created_dirs: Mutex<Vec<String>>,
}

impl MemoryDriver {
    pub fn new(account: Account, memory: MemoryDriverConfig, config: DriverConfig) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            "/".to_string(),
            Node {
                is_folder: true,
                data: Bytes::new(),
                modified: account.modified,
            },
        );
        Self {
            account,
            config,
            root_id: memory.root_folder_id,
            link_ttl: memory.link_ttl,
            list_delay: Duration::ZERO,
            nodes: RwLock::new(nodes),
            list_calls: AtomicUsize::new(0),
            link_calls: AtomicUsize::new(0),
            created_dirs: Mutex::new(Vec::new()),
        }
    }

    pub fn with_list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = delay;
        self
    }

    /// Seed a folder, creating missing ancestors
    pub fn add_folder(&self, p: &str) {
        let p = path::standardize(p);
        let mut nodes = self.nodes.write();
        let mut current = String::new();
        for segment in p.split('/').filter(|s| !s.is_empty()) {
            current = format!("{}/{}", current, segment);
            nodes.entry(current.clone()).or_insert_with(|| Node {
                is_folder: true,
                data: Bytes::new(),
                modified: Utc::now(),
            });
        }
    }

    /// Seed a file, creating missing ancestors
    pub fn add_file(&self, p: &str, data: impl Into<Bytes>) {
        let (parent, _) = path::split(p);
        self.add_folder(&parent);
        self.nodes.write().insert(
            path::standardize(p),
            Node {
                is_folder: false,
                data: data.into(),
                modified: Utc::now(),
            },
        );
    }

    pub fn contains(&self, p: &str) -> bool {
        self.nodes.read().contains_key(&path::standardize(p))
    }

    pub fn read(&self, p: &str) -> Option<Bytes> {
        self.nodes
            .read()
            .get(&path::standardize(p))
            .filter(|n| !n.is_folder)
            .map(|n| n.data.clone())
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn link_calls(&self) -> usize {
        self.link_calls.load(Ordering::SeqCst)
    }

    pub fn created_dirs(&self) -> Vec<String> {
        self.created_dirs.lock().clone()
    }

    /// Path an object refers to; folders reach the driver with the root id
    /// or with their path assigned as id.
    fn object_path(&self, obj: &Object) -> Result<String> {
        if obj.id == self.root_id {
            return Ok("/".to_string());
        }
        if obj.id.is_empty() {
            return Err(HubError::InvalidPath(format!(
                "memory object {} has no id",
                obj.name
            )));
        }
        Ok(path::standardize(&obj.id))
    }

    fn to_object(name: &str, node: &Node) -> Object {
        if node.is_folder {
            Object::folder(name, node.modified)
        } else {
            Object::file(name, node.data.len() as u64, node.modified)
        }
    }

    fn children(nodes: &BTreeMap<String, Node>, dir: &str) -> Vec<String> {
        nodes
            .keys()
            .filter(|k| k.as_str() != "/" && path::split(k).0 == dir)
            .cloned()
            .collect()
    }

    /// Move every node at or below `from` to `to`
    fn relocate(nodes: &mut BTreeMap<String, Node>, from: &str, to: &str, keep_source: bool) {
        let affected: Vec<String> = nodes
            .keys()
            .filter(|k| k.as_str() == from || path::is_sub_path(from, k))
            .cloned()
            .collect();
        for key in affected {
            let target = format!("{}{}", to, &key[from.len()..]);
            let node = if keep_source {
                nodes.get(&key).cloned()
            } else {
                nodes.remove(&key)
            };
            if let Some(node) = node {
                nodes.insert(target, node);
            }
        }
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    fn account(&self) -> &Account {
        &self.account
    }

    fn config(&self) -> &DriverConfig {
        &self.config
    }

    fn root(&self) -> Option<RootFolder> {
        Some(RootFolder::Id(self.root_id.clone()))
    }

    fn settable_id(&self) -> bool {
        true
    }

    async fn list(&self, dir: &Object) -> Result<Vec<Object>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if !self.list_delay.is_zero() {
            tokio::time::sleep(self.list_delay).await;
        }
        let dir_path = self.object_path(dir)?;
        trace!("memory list: {}", dir_path);
        let nodes = self.nodes.read();
        match nodes.get(&dir_path) {
            Some(n) if n.is_folder => {}
            Some(_) => return Err(HubError::NotFolder(dir_path)),
            None => return Err(HubError::ObjectNotFound(dir_path)),
        }
        Ok(Self::children(&nodes, &dir_path)
            .iter()
            .map(|k| Self::to_object(&path::split(k).1, &nodes[k]))
            .collect())
    }

    async fn link(&self, file: &Object, _args: &LinkArgs) -> Result<Link> {
        self.link_calls.fetch_add(1, Ordering::SeqCst);
        let p = self.object_path(file)?;
        let mut link = Link::new(format!("memory://{}{}", self.account.virtual_path, p));
        link.expiration = self.link_ttl;
        Ok(link)
    }

    async fn make_dir(&self, parent: &Object, name: &str) -> Result<()> {
        let target = path::join(&self.object_path(parent)?, name);
        let mut nodes = self.nodes.write();
        if nodes.contains_key(&target) {
            return Err(HubError::AlreadyExists(target));
        }
        nodes.insert(
            target.clone(),
            Node {
                is_folder: true,
                data: Bytes::new(),
                modified: Utc::now(),
            },
        );
        self.created_dirs.lock().push(target);
        Ok(())
    }

    async fn move_to(&self, src: &Object, dst_dir: &Object) -> Result<()> {
        let from = self.object_path(src)?;
        let to = path::join(&self.object_path(dst_dir)?, &src.name);
        Self::relocate(&mut self.nodes.write(), &from, &to, false);
        Ok(())
    }

    async fn rename(&self, src: &Object, new_name: &str) -> Result<()> {
        let from = self.object_path(src)?;
        let to = path::join(&path::split(&from).0, new_name);
        Self::relocate(&mut self.nodes.write(), &from, &to, false);
        Ok(())
    }

    async fn copy(&self, src: &Object, dst_dir: &Object) -> Result<()> {
        let from = self.object_path(src)?;
        let to = path::join(&self.object_path(dst_dir)?, &src.name);
        Self::relocate(&mut self.nodes.write(), &from, &to, true);
        Ok(())
    }

    async fn remove(&self, obj: &Object) -> Result<()> {
        let target = self.object_path(obj)?;
        self.nodes
            .write()
            .retain(|k, _| k != &target && !path::is_sub_path(&target, k));
        Ok(())
    }

    async fn put(
        &self,
        dst_dir: &Object,
        stream: &mut FileStream,
        progress: &UpdateProgress,
    ) -> Result<()> {
        let target = path::join(&self.object_path(dst_dir)?, &stream.name);
        let mut data = Vec::with_capacity(stream.size as usize);
        stream.reader.read_to_end(&mut data).await?;
        self.nodes.write().insert(
            target,
            Node {
                is_folder: false,
                data: Bytes::from(data),
                modified: Utc::now(),
            },
        );
        progress(100.0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver() -> MemoryDriver {
        let account = Account::new(1, "/mem", "memory");
        MemoryDriver::new(account, MemoryDriverConfig::default(), DriverConfig::default())
    }

    fn root(d: &MemoryDriver) -> Object {
        Object::folder("root", Utc::now()).with_id(d.root_id.clone())
    }

    #[tokio::test]
    async fn test_list_leaves_ids_empty() {
        let d = driver();
        d.add_file("/a/b.txt", "data");
        d.add_folder("/c");

        let objs = d.list(&root(&d)).await.unwrap();
        let names: Vec<_> = objs.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
        assert!(objs.iter().all(|o| o.id.is_empty()));
        assert_eq!(d.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_rename_moves_subtree() {
        let d = driver();
        d.add_file("/a/b.txt", "data");
        let a = Object::folder("a", Utc::now()).with_id("/a");
        d.rename(&a, "z").await.unwrap();
        assert!(!d.contains("/a"));
        assert_eq!(d.read("/z/b.txt"), Some(Bytes::from("data")));
    }

    #[tokio::test]
    async fn test_make_dir_rejects_duplicates() {
        let d = driver();
        d.make_dir(&root(&d), "x").await.unwrap();
        let err = d.make_dir(&root(&d), "x").await.unwrap_err();
        assert!(matches!(err, HubError::AlreadyExists(_)));
        assert_eq!(d.created_dirs(), vec!["/x".to_string()]);
    }

    #[tokio::test]
    async fn test_remove_subtree() {
        let d = driver();
        d.add_file("/a/b/c.txt", "x");
        d.add_file("/ab.txt", "y");
        let a = Object::folder("a", Utc::now()).with_id("/a");
        d.remove(&a).await.unwrap();
        assert!(!d.contains("/a/b/c.txt"));
        assert!(d.contains("/ab.txt"));
    }
}
