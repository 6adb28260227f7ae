//! Loading a directory's entries from its backing object.
//!
//! Concurrent fetches of one directory share a single read: every caller's
//! continuation is queued on the directory, and the first caller issues the
//! I/O. When the read completes, the whole queue is resumed with one status.

use std::sync::Arc;

use bytes::Bytes;
use mds_types::{InodeId, Result, Status};

use crate::codec::{DirRecord, EntryPayload};
use crate::context::StoreContext;
use crate::directory::{Directory, DirectoryEntry};
use crate::waiter::Continuation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A new read was issued.
    Issued,
    /// A read was already in flight; the caller waits on it.
    Joined,
}

#[derive(Clone)]
pub struct FetchCoordinator {
    ctx: Arc<StoreContext>,
}

impl FetchCoordinator {
    pub fn new(ctx: Arc<StoreContext>) -> Self {
        Self { ctx }
    }

    /// Load directory `dir_id` into the cache, creating its record if needed.
    ///
    /// `waiter` is queued whether or not a read is already in flight and is
    /// resumed once when that read completes. Must be called from within a
    /// Tokio runtime.
    pub fn fetch(&self, dir_id: InodeId, waiter: Option<Continuation>) -> FetchOutcome {
        let ticket = self.ctx.dirs.next_fetch_ticket();
        {
            let mut dirs = self.ctx.dirs.lock();
            let dir = dirs
                .entry(dir_id)
                .or_insert_with(|| Directory::new(dir_id));
            if let Some(waiter) = waiter {
                dir.add_waiter(waiter);
            }
            if !dir.begin_fetch(ticket) {
                tracing::debug!(dir = %dir_id, waiters = dir.waiter_count(), "joined in-flight fetch");
                return FetchOutcome::Joined;
            }
        }

        let location = self.ctx.locate(dir_id);
        tracing::debug!(dir = %dir_id, %location, "fetch issued");
        let this = self.clone();
        tokio::spawn(async move {
            let result = this.ctx.read_object(location).await;
            this.complete_fetch(dir_id, ticket, result);
        });
        FetchOutcome::Issued
    }

    fn complete_fetch(&self, dir_id: InodeId, ticket: u64, result: Result<Bytes>) {
        let mut dirs = self.ctx.dirs.lock();
        // A record recreated after eviction may have its own read in flight;
        // this completion belongs to neither it nor its waiters.
        let Some(dir) = dirs.get_mut(&dir_id).filter(|d| d.owns_fetch(ticket)) else {
            tracing::debug!(dir = %dir_id, ticket, "directory evicted before fetch completed");
            return;
        };

        let mut populated = false;
        let status = match result {
            Err(status) => {
                tracing::warn!(dir = %dir_id, error = %status, "directory read failed");
                status
            }
            Ok(_) if !self.ctx.authority.is_authoritative(dir_id) => {
                tracing::debug!(dir = %dir_id, "not authoritative, skipping population");
                Status::ok()
            }
            Ok(buf) => match self.ctx.codec.decode(&buf) {
                Ok(records) => {
                    self.populate(dir, records);
                    populated = true;
                    Status::ok()
                }
                Err(err) => {
                    tracing::error!(dir = %dir_id, error = %err, "failed to decode directory object");
                    err.into()
                }
            },
        };

        dir.io_mut().end_fetch();
        let waiters = dir.take_waiters();
        drop(dirs);

        if populated && self.ctx.config.trim_after_fetch {
            self.ctx.cache.on_population_complete();
        }
        waiters.resume_all(&status);
    }

    fn populate(&self, dir: &mut Directory, records: Vec<DirRecord>) {
        let dir_id = dir.id();
        let total = records.len();
        let mut linked = 0;
        dir.entries_mut();
        for record in records {
            let EntryPayload::Inode(snapshot) = record.payload else {
                // Rejected by the decoder.
                continue;
            };
            let ino = snapshot.id();
            // Cached inodes win over stored snapshots; the name is bound
            // either way.
            if self.ctx.cache.lookup(ino).is_none() {
                self.ctx.cache.insert(snapshot);
                self.ctx.cache.link(dir_id, &record.name, ino);
                linked += 1;
            }
            dir.populate(record.name, DirectoryEntry::inode(ino));
        }
        dir.mark_complete();
        tracing::info!(dir = %dir_id, entries = total, linked, "directory populated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InodeCache;
    use crate::directory::{Completeness, IoState};
    use crate::config::DirStoreConfig;
    use crate::inode::InodeAttr;
    use crate::test_util::{encode_dir, Harness};
    use mds_types::status_code::{StatusCode, StorageCode};

    #[tokio::test]
    async fn test_fetch_populates_directory() {
        let h = Harness::new();
        h.seed(100, &[("a", 101), ("b", 102)]);

        let (cont, rx) = h.waiter();
        assert_eq!(h.store.fetch(InodeId(100), Some(cont)), FetchOutcome::Issued);
        assert_eq!(
            h.store.info(InodeId(100)).unwrap().completeness,
            Completeness::Loading
        );
        assert!(rx.await.unwrap().is_ok());

        let info = h.store.info(InodeId(100)).unwrap();
        assert_eq!(info.completeness, Completeness::Complete);
        assert_eq!(info.io_state, IoState::Idle);
        assert_eq!(info.entries, 2);
        assert_eq!(info.version, 0);
        assert!(!info.dirty);
        assert!(h.cache.lookup(InodeId(101)).is_some());
        assert_eq!(h.cache.parent_of(InodeId(102)), Some((InodeId(100), "b".into())));
        assert_eq!(h.cache.trim_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_fetch_joins() {
        let h = Harness::new();
        h.seed(100, &[("a", 101)]);

        let (c1, rx1) = h.waiter();
        let (c2, rx2) = h.waiter();
        assert_eq!(h.store.fetch(InodeId(100), Some(c1)), FetchOutcome::Issued);
        assert_eq!(h.store.fetch(InodeId(100), Some(c2)), FetchOutcome::Joined);
        assert_eq!(h.store.info(InodeId(100)).unwrap().waiters, 2);

        assert!(rx1.await.unwrap().is_ok());
        assert!(rx2.await.unwrap().is_ok());
        assert_eq!(h.objects.read_count(), 1);
        assert_eq!(h.store.info(InodeId(100)).unwrap().waiters, 0);
    }

    #[tokio::test]
    async fn test_waiters_resumed_in_order() {
        let h = Harness::new();
        h.seed(100, &[]);
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for tag in 0..3 {
            let order = Arc::clone(&order);
            h.store
                .fetch(InodeId(100), Some(Continuation::new(move |_| order.lock().push(tag))));
        }
        h.store.fetch_and_wait(InodeId(100)).await.unwrap();
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_fetch_after_eviction_is_noop() {
        let h = Harness::new();
        h.seed(100, &[("a", 101)]);

        let (cont, rx) = h.waiter();
        h.store.fetch(InodeId(100), Some(cont));
        h.store.evict(InodeId(100)).unwrap();
        h.settle().await;

        // The waiter was dropped with the directory.
        assert!(rx.await.is_err());
        assert!(h.store.info(InodeId(100)).is_none());
        assert!(h.cache.lookup(InodeId(101)).is_none());
        assert_eq!(h.objects.read_count(), 1);
    }

    #[tokio::test]
    async fn test_existing_inode_not_overwritten() {
        let h = Harness::new();
        h.seed(100, &[("a", 101), ("b", 102)]);
        h.cache.insert(InodeAttr::file(InodeId(101), 4242).into());

        h.store.fetch_and_wait(InodeId(100)).await.unwrap();

        assert_eq!(h.cache.lookup(InodeId(101)).unwrap().attr().size, 4242);
        assert!(h.cache.parent_of(InodeId(101)).is_none());
        assert_eq!(
            h.cache.parent_of(InodeId(102)),
            Some((InodeId(100), "b".into()))
        );
        let entries = h.store.entries(InodeId(100)).unwrap();
        assert_eq!(
            entries,
            vec![
                ("a".to_string(), DirectoryEntry::inode(InodeId(101))),
                ("b".to_string(), DirectoryEntry::inode(InodeId(102))),
            ]
        );
        assert_eq!(h.store.info(InodeId(100)).unwrap().completeness, Completeness::Complete);
    }

    #[tokio::test]
    async fn test_refetch_after_eviction_keeps_entries() {
        let h = Harness::new();
        h.seed(100, &[("a", 101), ("b", 102)]);
        h.store.fetch_and_wait(InodeId(100)).await.unwrap();
        h.store.evict(InodeId(100)).unwrap();

        // The inodes outlive the directory record in the cache.
        h.store.fetch_and_wait(InodeId(100)).await.unwrap();
        let info = h.store.info(InodeId(100)).unwrap();
        assert_eq!(info.completeness, Completeness::Complete);
        assert_eq!(info.entries, 2);

        h.store
            .add_entry(InodeId(100), "c", InodeAttr::file(InodeId(103), 0).into())
            .unwrap();
        h.store.commit_and_wait(InodeId(100)).await.unwrap();

        let mut names: Vec<_> = h.decode_stored(100).into_iter().map(|r| r.name).collect();
        names.sort();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_stale_read_ignored_by_recreated_directory() {
        let h = Harness::gated();
        h.seed(100, &[("a", 101)]);

        assert_eq!(h.store.fetch(InodeId(100), None), FetchOutcome::Issued);
        h.settle().await;
        h.store.evict(InodeId(100)).unwrap();

        let (cont, mut rx) = h.waiter();
        assert_eq!(h.store.fetch(InodeId(100), Some(cont)), FetchOutcome::Issued);
        h.settle().await;
        assert_eq!(h.reads_started(), 2);

        // The read issued before eviction finishes first.
        h.release_reads(1);
        h.settle().await;
        assert_eq!(h.objects.read_count(), 1);
        assert!(rx.try_recv().is_err());
        let info = h.store.info(InodeId(100)).unwrap();
        assert_eq!(info.io_state, IoState::Fetching);
        assert_eq!(info.completeness, Completeness::Loading);
        assert_eq!(h.store.fetch(InodeId(100), None), FetchOutcome::Joined);
        assert_eq!(h.reads_started(), 2);

        h.release_reads(1);
        assert!(rx.await.unwrap().is_ok());
        let info = h.store.info(InodeId(100)).unwrap();
        assert_eq!(info.io_state, IoState::Idle);
        assert_eq!(info.completeness, Completeness::Complete);
        assert_eq!(info.entries, 1);
    }

    #[tokio::test]
    async fn test_not_authoritative_skips_population() {
        let h = Harness::new();
        h.seed(100, &[("a", 101)]);
        h.cache.set_authoritative(InodeId(100), false);

        h.store.fetch_and_wait(InodeId(100)).await.unwrap();

        let info = h.store.info(InodeId(100)).unwrap();
        assert_eq!(info.completeness, Completeness::NotLoaded);
        assert_eq!(info.entries, 0);
        assert!(h.cache.is_empty());
        assert_eq!(h.cache.trim_count(), 0);
    }

    #[tokio::test]
    async fn test_truncated_object_reported_to_all_waiters() {
        let h = Harness::new();
        let mut buf = encode_dir(&[("a", 101), ("b", 102)]).to_vec();
        buf.truncate(buf.len() - 10);
        h.objects.put(h.location(100), buf);

        let (c1, rx1) = h.waiter();
        let (c2, rx2) = h.waiter();
        h.store.fetch(InodeId(100), Some(c1));
        h.store.fetch(InodeId(100), Some(c2));

        assert_eq!(rx1.await.unwrap().code(), StatusCode::DATA_CORRUPTION);
        assert_eq!(rx2.await.unwrap().code(), StatusCode::DATA_CORRUPTION);
        let info = h.store.info(InodeId(100)).unwrap();
        assert_eq!(info.completeness, Completeness::NotLoaded);
        assert_eq!(info.io_state, IoState::Idle);
        // Nothing from the readable prefix leaked into the cache.
        assert!(h.cache.is_empty());
    }

    #[tokio::test]
    async fn test_read_failure_passes_status_through() {
        let h = Harness::new();
        h.seed(100, &[("a", 101)]);
        h.objects.fail_next_read(StorageCode::TARGET_OFFLINE);

        let err = h.store.fetch_and_wait(InodeId(100)).await.unwrap_err();
        assert_eq!(err.code(), StorageCode::TARGET_OFFLINE);
        assert!(!h.store.info(InodeId(100)).unwrap().io_state.is_fetching());

        // A later fetch is free to try again.
        h.store.fetch_and_wait(InodeId(100)).await.unwrap();
        assert_eq!(h.store.info(InodeId(100)).unwrap().entries, 1);
    }

    #[tokio::test]
    async fn test_refetch_of_complete_directory_reads_again() {
        let h = Harness::new();
        h.seed(100, &[("a", 101)]);
        h.store.fetch_and_wait(InodeId(100)).await.unwrap();
        h.store.fetch_and_wait(InodeId(100)).await.unwrap();

        assert_eq!(h.objects.read_count(), 2);
        let info = h.store.info(InodeId(100)).unwrap();
        assert_eq!(info.completeness, Completeness::Complete);
        assert_eq!(info.entries, 1);
    }

    #[tokio::test]
    async fn test_fetch_without_waiter() {
        let h = Harness::new();
        h.seed(100, &[("a", 101)]);
        assert_eq!(h.store.fetch(InodeId(100), None), FetchOutcome::Issued);
        h.settle().await;
        assert_eq!(h.objects.read_count(), 1);
        assert!(h.cache.lookup(InodeId(101)).is_some());
    }

    #[tokio::test]
    async fn test_trim_hook_can_be_disabled() {
        let h = Harness::with_config(DirStoreConfig {
            trim_after_fetch: false,
            ..Default::default()
        });
        h.seed(100, &[("a", 101)]);
        h.store.fetch_and_wait(InodeId(100)).await.unwrap();
        assert_eq!(h.cache.trim_count(), 0);
        assert!(h.cache.lookup(InodeId(101)).is_some());
    }
}
