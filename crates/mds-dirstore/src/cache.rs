//! Boundaries to the inode cache and to the authority/migration subsystem.
//!
//! The directory store never owns inodes. It asks the cache whether an inode
//! is present, hands it new ones from fetched directory objects, and tells it
//! which directory each new inode is linked under. Which node may write a
//! directory, and whether the hierarchy above it is frozen, are decided by the
//! [`Authority`] implementation.

use mds_types::InodeId;

use crate::inode::InodeSnapshot;
use crate::waiter::Continuation;

pub trait InodeCache: Send + Sync {
    /// The cached snapshot of inode `id`, if present.
    fn lookup(&self, id: InodeId) -> Option<InodeSnapshot>;

    /// Add an inode. Callers check [`lookup`](Self::lookup) first; an inode
    /// already in the cache is never overwritten by a fetch.
    fn insert(&self, snapshot: InodeSnapshot);

    /// Record that `id` is bound to `name` inside directory `dir`.
    fn link(&self, dir: InodeId, name: &str, id: InodeId);

    /// Drop the binding of `name` inside `dir`.
    fn unlink(&self, dir: InodeId, name: &str, id: InodeId);

    /// Maintenance hook run once after a fetch populated a directory.
    fn on_population_complete(&self);
}

pub trait Authority: Send + Sync {
    /// Whether this node may populate and write directory `dir`.
    fn is_authoritative(&self, dir: InodeId) -> bool;

    /// Whether `dir` can be pinned now, i.e. nothing above it is frozen.
    fn can_pin(&self, dir: InodeId) -> bool;

    /// Resume `waiter` once whatever blocks pinning `dir` has thawed.
    ///
    /// Implementations must not hold internal locks while resuming.
    fn wait_for_unfreeze(&self, dir: InodeId, waiter: Continuation);
}
