//! In-memory inode cache that also answers authority questions.
//!
//! Authority is modelled with two sets: directories this node is not
//! authoritative for, and frozen subtree roots. A directory can be pinned
//! only if neither it nor any ancestor reachable through recorded parent
//! links is frozen.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use mds_types::{InodeId, Status};
use parking_lot::{Mutex, RwLock};

use crate::cache::{Authority, InodeCache};
use crate::inode::InodeSnapshot;
use crate::waiter::{Continuation, WaiterQueue};

#[derive(Debug, Default)]
struct State {
    inodes: HashMap<InodeId, InodeSnapshot>,
    /// child -> (parent directory, name)
    parents: HashMap<InodeId, (InodeId, String)>,
    not_authoritative: HashSet<InodeId>,
    frozen: HashSet<InodeId>,
}

impl State {
    fn is_frozen_above(&self, dir: InodeId) -> bool {
        let mut cur = dir;
        // Bounded by the number of links, so a cycle cannot spin forever.
        for _ in 0..=self.parents.len() {
            if self.frozen.contains(&cur) {
                return true;
            }
            match self.parents.get(&cur) {
                Some((parent, _)) if *parent != cur => cur = *parent,
                _ => return false,
            }
        }
        false
    }
}

#[derive(Debug, Default)]
pub struct MemCache {
    state: RwLock<State>,
    /// Pushed to and drained only while `state` is held, so a freeze check
    /// and the enqueue that follows it cannot straddle a `thaw`.
    unfreeze_waiters: Mutex<WaiterQueue>,
    trims: AtomicU64,
}

impl MemCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.state.read().inodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().inodes.is_empty()
    }

    /// Drop inode `id` and its parent link.
    pub fn remove(&self, id: InodeId) -> Option<InodeSnapshot> {
        let mut state = self.state.write();
        state.parents.remove(&id);
        state.inodes.remove(&id)
    }

    /// Parent directory and name `id` is linked under, if any.
    pub fn parent_of(&self, id: InodeId) -> Option<(InodeId, String)> {
        self.state.read().parents.get(&id).cloned()
    }

    /// How many times the post-population maintenance hook has run.
    pub fn trim_count(&self) -> u64 {
        self.trims.load(Ordering::SeqCst)
    }

    pub fn set_authoritative(&self, dir: InodeId, authoritative: bool) {
        let mut state = self.state.write();
        if authoritative {
            state.not_authoritative.remove(&dir);
        } else {
            state.not_authoritative.insert(dir);
        }
    }

    /// Freeze the subtree rooted at `dir`.
    pub fn freeze(&self, dir: InodeId) {
        self.state.write().frozen.insert(dir);
    }

    /// Lift the freeze on `dir` and resume everything that was waiting for
    /// a freeze to lift. Waiters re-check their own conditions.
    pub fn thaw(&self, dir: InodeId) {
        let waiters = {
            let mut state = self.state.write();
            state.frozen.remove(&dir);
            let taken = self.unfreeze_waiters.lock().take();
            taken
        };
        tracing::debug!(dir = %dir, waiters = waiters.len(), "thawed");
        waiters.resume_all(&Status::ok());
    }

    pub fn unfreeze_waiter_count(&self) -> usize {
        self.unfreeze_waiters.lock().len()
    }
}

impl InodeCache for MemCache {
    fn lookup(&self, id: InodeId) -> Option<InodeSnapshot> {
        self.state.read().inodes.get(&id).copied()
    }

    fn insert(&self, snapshot: InodeSnapshot) {
        self.state
            .write()
            .inodes
            .entry(snapshot.id())
            .or_insert(snapshot);
    }

    fn link(&self, dir: InodeId, name: &str, id: InodeId) {
        self.state
            .write()
            .parents
            .insert(id, (dir, name.to_owned()));
    }

    fn unlink(&self, dir: InodeId, name: &str, id: InodeId) {
        let mut state = self.state.write();
        if state
            .parents
            .get(&id)
            .is_some_and(|(p, n)| *p == dir && n == name)
        {
            state.parents.remove(&id);
        }
    }

    fn on_population_complete(&self) {
        self.trims.fetch_add(1, Ordering::SeqCst);
    }
}

impl Authority for MemCache {
    fn is_authoritative(&self, dir: InodeId) -> bool {
        !self.state.read().not_authoritative.contains(&dir)
    }

    fn can_pin(&self, dir: InodeId) -> bool {
        !self.state.read().is_frozen_above(dir)
    }

    fn wait_for_unfreeze(&self, dir: InodeId, waiter: Continuation) {
        let state = self.state.read();
        if state.is_frozen_above(dir) {
            self.unfreeze_waiters.lock().push(waiter);
            return;
        }
        drop(state);
        // Thawed between the caller's check and now.
        waiter.resume(Status::ok());
    }
}
