//! mds-dirstore: directory persistence for the metadata server.
//!
//! Moves each directory's entry set between the in-memory cache and one
//! object in the backing object store, with at most one fetch and one commit
//! in flight per directory.
//!
//! Architecture:
//! - [`DirectoryCodec`] - flat binary encoding of a directory object
//! - [`DirectoryTable`] - every cached [`Directory`] behind one lock
//! - [`FetchCoordinator`] - deduplicated loads from the object store
//! - [`CommitCoordinator`] - writes, deferred on freezes and incomplete directories
//! - [`DirStore`] - the facade callers use, plus direct mutation and eviction
//! - [`ObjectStore`], [`Placement`], [`InodeCache`], [`Authority`] - collaborator boundaries,
//!   with in-memory versions under [`mem`]

pub mod cache;
pub mod codec;
pub mod commit;
pub mod config;
pub mod context;
pub mod directory;
pub mod fetch;
pub mod inode;
pub mod mem;
pub mod object_store;
pub mod store;
pub mod waiter;

#[cfg(test)]
mod test_util;

pub use cache::{Authority, InodeCache};
pub use codec::{CodecError, DirRecord, DirectoryCodec, EntryPayload};
pub use commit::{CommitCoordinator, CommitOutcome};
pub use config::DirStoreConfig;
pub use directory::{
    Completeness, Directory, DirectoryEntry, DirectoryInfo, DirectoryTable, EntryKind, IoState,
};
pub use fetch::{FetchCoordinator, FetchOutcome};
pub use inode::{InodeAttr, InodeSnapshot, INODE_SNAPSHOT_SIZE};
pub use object_store::{HashPlacement, ObjectLocation, ObjectStore, Placement};
pub use store::DirStore;
pub use waiter::{Continuation, WaiterQueue};
