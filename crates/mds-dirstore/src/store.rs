//! `DirStore`: the entry point that ties the directory table, the fetch and
//! commit coordinators, and the collaborators together.

use std::sync::Arc;

use mds_types::status_code::MetaCode;
use mds_types::{make_error, make_error_msg, InodeId, Result, Status};
use tokio::sync::oneshot;

use crate::cache::{Authority, InodeCache};
use crate::codec::validate_name;
use crate::commit::{CommitCoordinator, CommitOutcome};
use crate::config::DirStoreConfig;
use crate::context::StoreContext;
use crate::directory::{Directory, DirectoryEntry, DirectoryInfo};
use crate::fetch::{FetchCoordinator, FetchOutcome};
use crate::inode::InodeSnapshot;
use crate::object_store::{ObjectStore, Placement};
use crate::waiter::Continuation;

pub struct DirStore {
    ctx: Arc<StoreContext>,
    fetcher: FetchCoordinator,
    committer: CommitCoordinator,
}

impl DirStore {
    pub fn new(
        config: DirStoreConfig,
        objects: Arc<dyn ObjectStore>,
        placement: Arc<dyn Placement>,
        cache: Arc<dyn InodeCache>,
        authority: Arc<dyn Authority>,
    ) -> Result<Self> {
        config.validate()?;
        let ctx = Arc::new(StoreContext::new(config, objects, placement, cache, authority));
        let fetcher = FetchCoordinator::new(ctx.clone());
        let committer = CommitCoordinator::new(ctx.clone(), fetcher.clone());
        Ok(Self {
            ctx,
            fetcher,
            committer,
        })
    }

    pub fn config(&self) -> &DirStoreConfig {
        &self.ctx.config
    }

    /// See [`FetchCoordinator::fetch`].
    pub fn fetch(&self, dir: InodeId, waiter: Option<Continuation>) -> FetchOutcome {
        self.fetcher.fetch(dir, waiter)
    }

    /// See [`CommitCoordinator::commit`].
    pub fn commit(&self, dir: InodeId, waiter: Option<Continuation>) -> CommitOutcome {
        self.committer.commit(dir, waiter)
    }

    /// Fetch `dir` and wait for the read it joins or issues.
    pub async fn fetch_and_wait(&self, dir: InodeId) -> Result<()> {
        let (cont, rx) = channel_waiter();
        self.fetch(dir, Some(cont));
        wait(dir, rx).await
    }

    /// Commit `dir` and wait for the outcome, including any fetch or
    /// unfreeze the commit defers on. A commit already in flight is reported
    /// as `MetaCode::BUSY`.
    pub async fn commit_and_wait(&self, dir: InodeId) -> Result<()> {
        let (cont, rx) = channel_waiter();
        if let CommitOutcome::Busy(_) = self.commit(dir, Some(cont)) {
            return make_error_msg(
                MetaCode::BUSY,
                format!("directory {} already committing", dir),
            );
        }
        wait(dir, rx).await
    }

    /// Register a new, empty directory. It starts complete and dirty.
    pub fn create_directory(&self, dir: InodeId) -> Result<()> {
        let mut dirs = self.ctx.dirs.lock();
        if dirs.contains_key(&dir) {
            return make_error_msg(MetaCode::EXISTS, format!("directory {} exists", dir));
        }
        dirs.insert(dir, Directory::new_empty(dir));
        tracing::debug!(dir = %dir, "directory created");
        Ok(())
    }

    /// Bind `name` in `dir` to a new inode, adding the inode to the cache.
    pub fn add_entry(&self, dir: InodeId, name: &str, inode: InodeSnapshot) -> Result<()> {
        validate_name(name)?;
        let mut dirs = self.ctx.dirs.lock();
        let directory = loaded(&mut dirs, dir)?;
        if directory.get(name).is_some() {
            return make_error_msg(
                MetaCode::EXISTS,
                format!("{:?} already exists in directory {}", name, dir),
            );
        }
        let ino = inode.id();
        self.ctx.cache.insert(inode);
        self.ctx.cache.link(dir, name, ino);
        directory.link(name.to_owned(), DirectoryEntry::inode(ino));
        tracing::trace!(dir = %dir, name, ino = %ino, version = directory.version(), "entry added");
        Ok(())
    }

    /// Remove `name` from `dir`, returning the inode it was bound to.
    pub fn remove_entry(&self, dir: InodeId, name: &str) -> Result<InodeId> {
        let mut dirs = self.ctx.dirs.lock();
        let directory = loaded(&mut dirs, dir)?;
        let Some(entry) = directory.unlink(name) else {
            return make_error_msg(
                MetaCode::NOT_FOUND,
                format!("{:?} not found in directory {}", name, dir),
            );
        };
        self.ctx.cache.unlink(dir, name, entry.inode_id);
        tracing::trace!(dir = %dir, name, ino = %entry.inode_id, version = directory.version(), "entry removed");
        Ok(entry.inode_id)
    }

    /// Drop the directory record. Queued fetch waiters are released without
    /// being resumed. Refused while a commit holds a pin.
    pub fn evict(&self, dir: InodeId) -> Result<()> {
        let removed = {
            let mut dirs = self.ctx.dirs.lock();
            let pins = match dirs.get(&dir) {
                Some(d) => d.pins(),
                None => return make_error(MetaCode::NOT_FOUND),
            };
            if pins > 0 {
                return make_error_msg(
                    MetaCode::PINNED,
                    format!("directory {} is pinned by {} commit(s)", dir, pins),
                );
            }
            dirs.remove(&dir)
        };
        if let Some(d) = removed {
            tracing::debug!(dir = %dir, dirty = d.is_dirty(), waiters = d.waiter_count(), "directory evicted");
        }
        Ok(())
    }

    pub fn info(&self, dir: InodeId) -> Option<DirectoryInfo> {
        self.ctx.dirs.info(dir)
    }

    pub fn lookup(&self, dir: InodeId, name: &str) -> Option<DirectoryEntry> {
        self.ctx.dirs.lock().get(&dir)?.get(name).copied()
    }

    /// Entries of `dir` in name order.
    pub fn entries(&self, dir: InodeId) -> Option<Vec<(String, DirectoryEntry)>> {
        let dirs = self.ctx.dirs.lock();
        let directory = dirs.get(&dir)?;
        Some(
            directory
                .entries()
                .map(|(name, entry)| (name.clone(), *entry))
                .collect(),
        )
    }

    /// Number of directory records held.
    pub fn len(&self) -> usize {
        self.ctx.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ctx.dirs.is_empty()
    }
}

fn loaded<'a>(
    dirs: &'a mut std::collections::HashMap<InodeId, Directory>,
    dir: InodeId,
) -> Result<&'a mut Directory> {
    match dirs.get_mut(&dir) {
        None => make_error_msg(MetaCode::NOT_FOUND, format!("directory {} not found", dir)),
        Some(d) if !d.is_complete() => make_error_msg(
            MetaCode::INCONSISTENT,
            format!("directory {} is not loaded", dir),
        ),
        Some(d) => Ok(d),
    }
}

fn channel_waiter() -> (Continuation, oneshot::Receiver<Status>) {
    let (tx, rx) = oneshot::channel();
    let cont = Continuation::new(move |status| {
        // The receiver may have given up.
        let _ = tx.send(status);
    });
    (cont, rx)
}

async fn wait(dir: InodeId, rx: oneshot::Receiver<Status>) -> Result<()> {
    match rx.await {
        Ok(status) => status.into_result(),
        Err(_) => make_error_msg(
            MetaCode::REQUEST_CANCELED,
            format!("directory {} evicted while waiting", dir),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::Completeness;
    use crate::inode::InodeAttr;
    use crate::test_util::Harness;
    use mds_types::status_code::StatusCode;

    #[tokio::test]
    async fn test_example_scenario() {
        let h = Harness::new();
        h.seed(100, &[("a", 101), ("b", 102)]);
        assert!(h.store.info(InodeId(100)).is_none());

        h.store.commit_and_wait(InodeId(100)).await.unwrap();

        let info = h.store.info(InodeId(100)).unwrap();
        assert_eq!(info.completeness, Completeness::Complete);
        assert!(!info.dirty);
        assert_eq!(info.entries, 2);
        assert_eq!(h.objects.read_count(), 1);
        assert_eq!(h.objects.write_count(), 1);
        assert_eq!(h.store.lookup(InodeId(100), "a").map(|e| e.inode_id), Some(InodeId(101)));
        assert_eq!(h.store.lookup(InodeId(100), "b").map(|e| e.inode_id), Some(InodeId(102)));

        let mut names: Vec<_> = h.decode_stored(100).into_iter().map(|r| r.name).collect();
        names.sort();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_create_directory_twice() {
        let h = Harness::new();
        h.store.create_directory(InodeId(5)).unwrap();
        let err = h.store.create_directory(InodeId(5)).unwrap_err();
        assert_eq!(err.code(), MetaCode::EXISTS);
        assert_eq!(h.store.len(), 1);
    }

    #[tokio::test]
    async fn test_add_and_remove_entries() {
        let h = Harness::new();
        h.store.create_directory(InodeId(5)).unwrap();
        h.store
            .add_entry(InodeId(5), "f", InodeAttr::file(InodeId(50), 1).into())
            .unwrap();
        assert_eq!(
            h.store
                .add_entry(InodeId(5), "f", InodeAttr::file(InodeId(51), 1).into())
                .unwrap_err()
                .code(),
            MetaCode::EXISTS
        );
        assert_eq!(
            h.store
                .add_entry(InodeId(5), "", InodeAttr::file(InodeId(52), 1).into())
                .unwrap_err()
                .code(),
            StatusCode::INVALID_ARG
        );
        assert_eq!(h.store.info(InodeId(5)).unwrap().version, 1);

        assert_eq!(h.store.remove_entry(InodeId(5), "f").unwrap(), InodeId(50));
        assert_eq!(
            h.store.remove_entry(InodeId(5), "f").unwrap_err().code(),
            MetaCode::NOT_FOUND
        );
        assert_eq!(h.store.info(InodeId(5)).unwrap().version, 2);
        assert!(h.cache.parent_of(InodeId(50)).is_none());
    }

    #[tokio::test]
    async fn test_mutating_unloaded_directory_rejected() {
        let h = Harness::new();
        let err = h
            .store
            .add_entry(InodeId(9), "x", InodeAttr::file(InodeId(90), 0).into())
            .unwrap_err();
        assert_eq!(err.code(), MetaCode::NOT_FOUND);

        h.cache.set_authoritative(InodeId(9), false);
        h.seed(9, &[]);
        h.store.fetch_and_wait(InodeId(9)).await.unwrap();
        let err = h.store.remove_entry(InodeId(9), "x").unwrap_err();
        assert_eq!(err.code(), MetaCode::INCONSISTENT);
    }

    #[tokio::test]
    async fn test_commit_then_reload_roundtrips() {
        let h = Harness::new();
        h.store.create_directory(InodeId(5)).unwrap();
        for (i, name) in ["one", "two", "three"].iter().enumerate() {
            let ino = InodeId(500 + i as u64);
            h.store
                .add_entry(InodeId(5), name, InodeAttr::file(ino, i as u64).into())
                .unwrap();
        }
        h.store.commit_and_wait(InodeId(5)).await.unwrap();

        // A second node with an empty cache sees the same entries.
        let other = Harness::new();
        other.objects.put(h.location(5), h.objects.get(&h.location(5)).unwrap());
        other.store.fetch_and_wait(InodeId(5)).await.unwrap();
        assert_eq!(other.store.entries(InodeId(5)), h.store.entries(InodeId(5)));
    }

    #[tokio::test]
    async fn test_dropped_waiter_reports_cancel() {
        let (tx, rx) = oneshot::channel::<Status>();
        drop(tx);
        let err = wait(InodeId(100), rx).await.unwrap_err();
        assert_eq!(err.code(), MetaCode::REQUEST_CANCELED);
    }

    #[tokio::test]
    async fn test_evict_missing() {
        let h = Harness::new();
        assert_eq!(h.store.evict(InodeId(3)).unwrap_err().code(), MetaCode::NOT_FOUND);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = DirStoreConfig {
            max_object_size: 0,
            ..Default::default()
        };
        let cache = Arc::new(crate::mem::MemCache::new());
        let result = DirStore::new(
            config,
            Arc::new(crate::mem::MemObjectStore::new()),
            Arc::new(crate::object_store::HashPlacement::new(1)),
            cache.clone(),
            cache,
        );
        assert_eq!(result.err().map(|s| s.code()), Some(StatusCode::INVALID_CONFIG));
    }
}
