//! Persisting a directory's entries to its backing object.
//!
//! A commit checks its preconditions in order and may defer instead of
//! proceeding:
//!
//! 1. another commit in flight: refuse with [`CommitOutcome::Busy`], handing
//!    the continuation back to the caller;
//! 2. the directory cannot be pinned: retry once the freeze above it lifts;
//! 3. the directory is not complete: fetch it, then retry.
//!
//! Otherwise the entries are encoded, the directory is pinned, and the write
//! is issued. The version captured at that point decides whether the write
//! completion may clear `dirty`.

use std::sync::Arc;

use mds_types::status_code::{MetaCode, StatusCode};
use mds_types::{InodeId, Result, Status};

use crate::codec::DirRecord;
use crate::context::StoreContext;
use crate::directory::{Directory, EntryKind};
use crate::fetch::FetchCoordinator;
use crate::waiter::{resume_if_some, Continuation};

#[derive(Debug)]
pub enum CommitOutcome {
    /// The write was issued.
    Issued,
    /// A commit is already in flight. The continuation was not queued and is
    /// returned to the caller.
    Busy(Option<Continuation>),
    /// The directory cannot be pinned yet; the commit retries once it can.
    DeferredUntilUnfrozen,
    /// The directory is incomplete; the commit retries after a fetch.
    FetchingFirst,
    /// The commit could not start. The continuation, if any, has already
    /// been resumed with this status.
    Failed(Status),
}

impl CommitOutcome {
    pub fn is_busy(&self) -> bool {
        matches!(self, CommitOutcome::Busy(_))
    }
}

#[derive(Clone)]
pub struct CommitCoordinator {
    ctx: Arc<StoreContext>,
    fetcher: FetchCoordinator,
}

/// Whether a commit may create the directory record when it is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Missing {
    Create,
    Cancel,
}

impl CommitCoordinator {
    pub fn new(ctx: Arc<StoreContext>, fetcher: FetchCoordinator) -> Self {
        Self { ctx, fetcher }
    }

    /// Write directory `dir_id` to its backing object.
    ///
    /// A directory not yet in the table is created unloaded and fetched
    /// first. Must be called from within a Tokio runtime.
    pub fn commit(&self, dir_id: InodeId, waiter: Option<Continuation>) -> CommitOutcome {
        self.start(dir_id, waiter, Missing::Create)
    }

    fn start(&self, dir_id: InodeId, waiter: Option<Continuation>, missing: Missing) -> CommitOutcome {
        let mut dirs = self.ctx.dirs.lock();
        if missing == Missing::Cancel && !dirs.contains_key(&dir_id) {
            drop(dirs);
            tracing::debug!(dir = %dir_id, "directory evicted before commit retry");
            let status = Status::with_message(
                MetaCode::REQUEST_CANCELED,
                format!("directory {} evicted", dir_id),
            );
            resume_if_some(waiter, status.clone());
            return CommitOutcome::Failed(status);
        }
        let dir = dirs
            .entry(dir_id)
            .or_insert_with(|| Directory::new(dir_id));

        if dir.io_state().is_committing() {
            tracing::debug!(dir = %dir_id, "commit already in flight");
            return CommitOutcome::Busy(waiter);
        }

        if !self.ctx.authority.can_pin(dir_id) {
            drop(dirs);
            tracing::debug!(dir = %dir_id, "cannot pin, deferring commit until unfrozen");
            let this = self.clone();
            self.ctx.authority.wait_for_unfreeze(
                dir_id,
                Continuation::new(move |_| this.retry_after_unfreeze(dir_id, waiter)),
            );
            return CommitOutcome::DeferredUntilUnfrozen;
        }

        if !dir.is_complete() {
            drop(dirs);
            tracing::debug!(dir = %dir_id, "directory incomplete, fetching before commit");
            let this = self.clone();
            self.fetcher.fetch(
                dir_id,
                Some(Continuation::new(move |status| {
                    this.retry_after_fetch(dir_id, status, waiter)
                })),
            );
            return CommitOutcome::FetchingFirst;
        }

        let data = match self.encode(dir) {
            Ok(data) => data,
            Err(status) => {
                drop(dirs);
                tracing::error!(dir = %dir_id, error = %status, "failed to encode directory");
                resume_if_some(waiter, status.clone());
                return CommitOutcome::Failed(status);
            }
        };
        let baseline = dir.version();
        dir.pin();
        dir.io_mut().begin_commit();
        drop(dirs);

        let location = self.ctx.locate(dir_id);
        tracing::debug!(dir = %dir_id, %location, version = baseline, bytes = data.len(), "commit issued");
        let this = self.clone();
        tokio::spawn(async move {
            let result = this.ctx.write_object(location, data).await;
            this.complete_commit(dir_id, baseline, result, waiter);
        });
        CommitOutcome::Issued
    }

    fn encode(&self, dir: &Directory) -> Result<bytes::Bytes> {
        let mut records = Vec::with_capacity(dir.len());
        for (name, entry) in dir.entries() {
            if entry.kind == EntryKind::HardLink {
                return Err(Status::with_message(
                    StatusCode::NOT_IMPLEMENTED,
                    format!("hard link entry {:?}", name),
                ));
            }
            let snapshot = self.ctx.cache.lookup(entry.inode_id).ok_or_else(|| {
                Status::with_message(
                    MetaCode::INCONSISTENT,
                    format!("inode {} for entry {:?} missing from cache", entry.inode_id, name),
                )
            })?;
            records.push(DirRecord::inode(name.clone(), snapshot));
        }
        Ok(self.ctx.codec.encode(&records)?)
    }

    fn complete_commit(
        &self,
        dir_id: InodeId,
        baseline: u64,
        result: Result<()>,
        waiter: Option<Continuation>,
    ) {
        let status = Status::from(result);
        {
            let mut dirs = self.ctx.dirs.lock();
            match dirs.get_mut(&dir_id) {
                Some(dir) => {
                    if !status.is_ok() {
                        tracing::warn!(dir = %dir_id, error = %status, "directory write failed");
                    } else if dir.version() == baseline {
                        dir.clear_dirty();
                        tracing::debug!(dir = %dir_id, version = baseline, "commit completed");
                    } else {
                        tracing::debug!(
                            dir = %dir_id,
                            baseline,
                            version = dir.version(),
                            "directory changed during commit, still dirty"
                        );
                    }
                    dir.io_mut().end_commit();
                    dir.unpin();
                }
                None => {
                    tracing::warn!(dir = %dir_id, "pinned directory vanished during commit");
                }
            }
        }
        resume_if_some(waiter, status);
    }

    fn retry_after_unfreeze(&self, dir_id: InodeId, waiter: Option<Continuation>) {
        tracing::debug!(dir = %dir_id, "retrying commit after unfreeze");
        self.resubmit(dir_id, waiter);
    }

    fn retry_after_fetch(&self, dir_id: InodeId, status: Status, waiter: Option<Continuation>) {
        if !status.is_ok() {
            tracing::warn!(dir = %dir_id, error = %status, "fetch before commit failed");
            resume_if_some(waiter, status);
            return;
        }

        let complete = self.ctx.dirs.lock().get(&dir_id).map(Directory::is_complete);
        match complete {
            // Handled by the cancel path in `start`.
            None | Some(true) => self.resubmit(dir_id, waiter),
            Some(false) => {
                tracing::debug!(dir = %dir_id, "fetch did not load directory, abandoning commit");
                resume_if_some(
                    waiter,
                    Status::with_message(
                        MetaCode::NOT_AUTHORITY,
                        format!("directory {} was not loaded by this node", dir_id),
                    ),
                );
            }
        }
    }

    fn resubmit(&self, dir_id: InodeId, waiter: Option<Continuation>) {
        if let CommitOutcome::Busy(waiter) = self.start(dir_id, waiter, Missing::Cancel) {
            resume_if_some(
                waiter,
                Status::with_message(MetaCode::BUSY, format!("directory {} already committing", dir_id)),
            );
        }
    }
}
