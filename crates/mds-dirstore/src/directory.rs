//! In-memory directory records and the table that owns them.
//!
//! A [`Directory`] tracks one directory's cached entries plus the bookkeeping
//! the fetch and commit paths rely on: a mutation `version`, the `dirty` and
//! `complete` flags, which I/O is in flight, a pin count, and the queue of
//! waiters for the current fetch.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use mds_types::InodeId;
use parking_lot::{Mutex, MutexGuard};

use crate::waiter::{Continuation, WaiterQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Inode,
    /// Reserved. Never produced by a fetch and rejected by commit.
    HardLink,
}

/// A name's binding inside a directory. References the inode by id only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub inode_id: InodeId,
    pub kind: EntryKind,
}

impl DirectoryEntry {
    pub fn inode(inode_id: InodeId) -> Self {
        Self {
            inode_id,
            kind: EntryKind::Inode,
        }
    }
}

/// Which object-store operations are outstanding for a directory.
///
/// At most one fetch and one commit may be in flight at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IoState {
    #[default]
    Idle,
    Fetching,
    Committing,
    FetchingAndCommitting,
}

impl IoState {
    pub fn is_fetching(self) -> bool {
        matches!(self, IoState::Fetching | IoState::FetchingAndCommitting)
    }

    pub fn is_committing(self) -> bool {
        matches!(self, IoState::Committing | IoState::FetchingAndCommitting)
    }

    /// Mark a fetch as started. Returns false if one is already in flight.
    pub fn begin_fetch(&mut self) -> bool {
        *self = match *self {
            IoState::Idle => IoState::Fetching,
            IoState::Committing => IoState::FetchingAndCommitting,
            IoState::Fetching | IoState::FetchingAndCommitting => return false,
        };
        true
    }

    pub fn end_fetch(&mut self) {
        *self = match *self {
            IoState::Fetching => IoState::Idle,
            IoState::FetchingAndCommitting => IoState::Committing,
            other => {
                tracing::warn!(state = ?other, "end_fetch without a fetch in flight");
                other
            }
        };
    }

    /// Mark a commit as started. Returns false if one is already in flight.
    pub fn begin_commit(&mut self) -> bool {
        *self = match *self {
            IoState::Idle => IoState::Committing,
            IoState::Fetching => IoState::FetchingAndCommitting,
            IoState::Committing | IoState::FetchingAndCommitting => return false,
        };
        true
    }

    pub fn end_commit(&mut self) {
        *self = match *self {
            IoState::Committing => IoState::Idle,
            IoState::FetchingAndCommitting => IoState::Fetching,
            other => {
                tracing::warn!(state = ?other, "end_commit without a commit in flight");
                other
            }
        };
    }
}

/// How much of a directory's entry set is in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completeness {
    NotLoaded,
    Loading,
    Complete,
}

/// Point-in-time summary of a directory, safe to hand out of the table lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryInfo {
    pub id: InodeId,
    pub version: u64,
    pub dirty: bool,
    pub completeness: Completeness,
    pub io_state: IoState,
    pub pins: u32,
    pub entries: usize,
    pub waiters: usize,
}

#[derive(Debug)]
pub struct Directory {
    id: InodeId,
    /// Allocated on first population or mutation.
    entries: Option<BTreeMap<String, DirectoryEntry>>,
    version: u64,
    dirty: bool,
    /// Only ever cleared by dropping the whole record.
    complete: bool,
    io: IoState,
    /// Identifies the read behind the current fetch. Meaningless while idle.
    fetch_ticket: u64,
    pins: u32,
    waiters: WaiterQueue,
}

impl Directory {
    /// A directory known to exist whose entries have not been loaded.
    pub fn new(id: InodeId) -> Self {
        Self {
            id,
            entries: None,
            version: 0,
            dirty: false,
            complete: false,
            io: IoState::Idle,
            fetch_ticket: 0,
            pins: 0,
            waiters: WaiterQueue::default(),
        }
    }

    /// A freshly created directory: empty, complete, and not yet persisted.
    pub fn new_empty(id: InodeId) -> Self {
        Self {
            entries: Some(BTreeMap::new()),
            dirty: true,
            complete: true,
            ..Self::new(id)
        }
    }

    pub fn id(&self) -> InodeId {
        self.id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn io_state(&self) -> IoState {
        self.io
    }

    pub fn pins(&self) -> u32 {
        self.pins
    }

    pub fn completeness(&self) -> Completeness {
        if self.complete {
            Completeness::Complete
        } else if self.io.is_fetching() {
            Completeness::Loading
        } else {
            Completeness::NotLoaded
        }
    }

    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, name: &str) -> Option<&DirectoryEntry> {
        self.entries.as_ref()?.get(name)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &DirectoryEntry)> + '_ {
        self.entries.iter().flat_map(|m| m.iter())
    }

    pub fn waiter_count(&self) -> usize {
        self.waiters.len()
    }

    pub fn info(&self) -> DirectoryInfo {
        DirectoryInfo {
            id: self.id,
            version: self.version,
            dirty: self.dirty,
            completeness: self.completeness(),
            io_state: self.io,
            pins: self.pins,
            entries: self.len(),
            waiters: self.waiters.len(),
        }
    }

    /// Bind `name`, bumping the version and marking the directory dirty.
    /// Returns the previous binding, if any.
    pub fn link(&mut self, name: String, entry: DirectoryEntry) -> Option<DirectoryEntry> {
        let prev = self.entries_mut().insert(name, entry);
        self.touch();
        prev
    }

    /// Remove `name`, bumping the version and marking the directory dirty if
    /// it was present.
    pub fn unlink(&mut self, name: &str) -> Option<DirectoryEntry> {
        let prev = self.entries.as_mut()?.remove(name);
        if prev.is_some() {
            self.touch();
        }
        prev
    }

    fn touch(&mut self) {
        self.version += 1;
        self.dirty = true;
    }

    pub(crate) fn entries_mut(&mut self) -> &mut BTreeMap<String, DirectoryEntry> {
        self.entries.get_or_insert_with(BTreeMap::new)
    }

    /// Insert an entry loaded from storage. Does not change version or dirty.
    pub(crate) fn populate(&mut self, name: String, entry: DirectoryEntry) {
        self.entries_mut().insert(name, entry);
    }

    pub(crate) fn mark_complete(&mut self) {
        self.complete = true;
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    pub(crate) fn io_mut(&mut self) -> &mut IoState {
        &mut self.io
    }

    /// Start a fetch identified by `ticket`. Returns false if one is
    /// already in flight.
    pub(crate) fn begin_fetch(&mut self, ticket: u64) -> bool {
        if !self.io.begin_fetch() {
            return false;
        }
        self.fetch_ticket = ticket;
        true
    }

    /// Whether the in-flight fetch is the one issued with `ticket`.
    pub(crate) fn owns_fetch(&self, ticket: u64) -> bool {
        self.io.is_fetching() && self.fetch_ticket == ticket
    }

    pub(crate) fn pin(&mut self) {
        self.pins += 1;
    }

    pub(crate) fn unpin(&mut self) {
        debug_assert!(self.pins > 0, "unpin of unpinned directory {}", self.id);
        self.pins = self.pins.saturating_sub(1);
    }

    pub(crate) fn add_waiter(&mut self, waiter: Continuation) {
        self.waiters.push(waiter);
    }

    pub(crate) fn take_waiters(&mut self) -> WaiterQueue {
        self.waiters.take()
    }
}

/// Every directory record held by this node, behind one lock.
///
/// All directory state transitions happen under this lock; continuations are
/// always resumed after it is released.
#[derive(Debug, Default)]
pub struct DirectoryTable {
    dirs: Mutex<HashMap<InodeId, Directory>>,
    fetch_tickets: AtomicU64,
}

impl DirectoryTable {
    pub fn lock(&self) -> MutexGuard<'_, HashMap<InodeId, Directory>> {
        self.dirs.lock()
    }

    pub fn contains(&self, id: InodeId) -> bool {
        self.dirs.lock().contains_key(&id)
    }

    pub fn info(&self, id: InodeId) -> Option<DirectoryInfo> {
        self.dirs.lock().get(&id).map(Directory::info)
    }

    /// A ticket no earlier fetch on any record has used.
    pub(crate) fn next_fetch_ticket(&self) -> u64 {
        self.fetch_tickets.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn len(&self) -> usize {
        self.dirs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_state_transitions() {
        let mut io = IoState::Idle;
        assert!(io.begin_fetch());
        assert!(!io.begin_fetch());
        assert!(io.begin_commit());
        assert_eq!(io, IoState::FetchingAndCommitting);
        assert!(!io.begin_commit());
        io.end_fetch();
        assert_eq!(io, IoState::Committing);
        assert!(io.is_committing());
        assert!(!io.is_fetching());
        io.end_commit();
        assert_eq!(io, IoState::Idle);
    }

    #[test]
    fn test_unbalanced_end_is_noop() {
        let mut io = IoState::Committing;
        io.end_fetch();
        assert_eq!(io, IoState::Committing);
    }

    #[test]
    fn test_new_directory_is_not_loaded() {
        let mut dir = Directory::new(InodeId(7));
        assert_eq!(dir.completeness(), Completeness::NotLoaded);
        assert!(!dir.is_dirty());
        assert!(dir.is_empty());
        dir.io_mut().begin_fetch();
        assert_eq!(dir.completeness(), Completeness::Loading);
        dir.mark_complete();
        assert_eq!(dir.completeness(), Completeness::Complete);
    }

    #[test]
    fn test_new_empty_directory() {
        let dir = Directory::new_empty(InodeId(8));
        assert!(dir.is_complete());
        assert!(dir.is_dirty());
        assert_eq!(dir.len(), 0);
        assert_eq!(dir.version(), 0);
    }

    #[test]
    fn test_link_and_unlink_bump_version() {
        let mut dir = Directory::new_empty(InodeId(1));
        dir.clear_dirty();
        assert!(dir.link("a".into(), DirectoryEntry::inode(InodeId(2))).is_none());
        assert_eq!(dir.version(), 1);
        assert!(dir.is_dirty());

        dir.clear_dirty();
        assert!(dir.unlink("missing").is_none());
        assert_eq!(dir.version(), 1);
        assert!(!dir.is_dirty());

        assert_eq!(dir.unlink("a"), Some(DirectoryEntry::inode(InodeId(2))));
        assert_eq!(dir.version(), 2);
        assert!(dir.is_dirty());
    }

    #[test]
    fn test_populate_keeps_version_and_dirty() {
        let mut dir = Directory::new(InodeId(1));
        dir.populate("x".into(), DirectoryEntry::inode(InodeId(5)));
        assert_eq!(dir.version(), 0);
        assert!(!dir.is_dirty());
        assert_eq!(dir.get("x").map(|e| e.inode_id), Some(InodeId(5)));
    }

    #[test]
    fn test_fetch_ticket_ownership() {
        let table = DirectoryTable::default();
        let first = table.next_fetch_ticket();
        let second = table.next_fetch_ticket();
        assert_ne!(first, second);

        let mut dir = Directory::new(InodeId(4));
        assert!(!dir.owns_fetch(first));
        assert!(dir.begin_fetch(first));
        assert!(!dir.begin_fetch(second));
        assert!(dir.owns_fetch(first));
        assert!(!dir.owns_fetch(second));
        dir.io_mut().end_fetch();
        assert!(!dir.owns_fetch(first));
    }

    #[test]
    fn test_table_info() {
        let table = DirectoryTable::default();
        assert!(table.is_empty());
        table
            .lock()
            .insert(InodeId(3), Directory::new_empty(InodeId(3)));
        assert!(table.contains(InodeId(3)));
        let info = table.info(InodeId(3)).unwrap();
        assert_eq!(info.completeness, Completeness::Complete);
        assert_eq!(info.io_state, IoState::Idle);
        assert_eq!(table.len(), 1);
    }
}
