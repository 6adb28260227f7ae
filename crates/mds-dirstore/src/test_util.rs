//! Shared fixtures for the coordinator tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use mds_types::{InodeId, Result, Status};
use tokio::sync::{oneshot, Semaphore};

use crate::codec::{DirRecord, DirectoryCodec};
use crate::config::DirStoreConfig;
use crate::inode::InodeAttr;
use crate::mem::{MemCache, MemObjectStore};
use crate::object_store::{HashPlacement, ObjectLocation, ObjectStore, Placement};
use crate::store::DirStore;
use crate::waiter::Continuation;

pub fn encode_dir(entries: &[(&str, u64)]) -> Bytes {
    let records: Vec<_> = entries
        .iter()
        .map(|(name, ino)| DirRecord::inode(*name, InodeAttr::file(InodeId(*ino), 0).into()))
        .collect();
    DirectoryCodec::default().encode(&records).unwrap()
}

/// Holds every read until a permit is released for it, in issue order.
/// Writes pass straight through.
pub struct GatedStore {
    inner: Arc<MemObjectStore>,
    gate: Semaphore,
    started: AtomicU64,
}

#[async_trait]
impl ObjectStore for GatedStore {
    async fn read(&self, location: &ObjectLocation) -> Result<Bytes> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let permit = self.gate.acquire().await.unwrap();
        permit.forget();
        self.inner.read(location).await
    }

    async fn write(&self, location: &ObjectLocation, data: Bytes) -> Result<()> {
        self.inner.write(location, data).await
    }
}

pub struct Harness {
    pub store: DirStore,
    pub objects: Arc<MemObjectStore>,
    pub cache: Arc<MemCache>,
    pub placement: HashPlacement,
    gated: Option<Arc<GatedStore>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(DirStoreConfig::default())
    }

    pub fn with_config(config: DirStoreConfig) -> Self {
        Self::build(config, false)
    }

    /// A harness whose reads block until [`release_reads`](Self::release_reads).
    pub fn gated() -> Self {
        Self::build(DirStoreConfig::default(), true)
    }

    fn build(config: DirStoreConfig, gate_reads: bool) -> Self {
        let objects = Arc::new(MemObjectStore::new());
        let cache = Arc::new(MemCache::new());
        let placement = HashPlacement::new(4);
        let gated = gate_reads.then(|| {
            Arc::new(GatedStore {
                inner: objects.clone(),
                gate: Semaphore::new(0),
                started: AtomicU64::new(0),
            })
        });
        let backend: Arc<dyn ObjectStore> = match &gated {
            Some(g) => g.clone(),
            None => objects.clone(),
        };
        let store = DirStore::new(
            config,
            backend,
            Arc::new(placement),
            cache.clone(),
            cache.clone(),
        )
        .unwrap();
        Self {
            store,
            objects,
            cache,
            placement,
            gated,
        }
    }

    fn gate(&self) -> &GatedStore {
        self.gated.as_deref().expect("harness built without gated reads")
    }

    /// Reads that reached the object store, blocked or not.
    pub fn reads_started(&self) -> u64 {
        self.gate().started.load(Ordering::SeqCst)
    }

    /// Let the `n` oldest blocked reads proceed.
    pub fn release_reads(&self, n: usize) {
        self.gate().gate.add_permits(n);
    }

    pub fn location(&self, dir: u64) -> ObjectLocation {
        self.placement.resolve(InodeId(dir))
    }

    /// Store a directory object for `dir` holding the given entries.
    pub fn seed(&self, dir: u64, entries: &[(&str, u64)]) {
        self.objects.put(self.location(dir), encode_dir(entries));
    }

    /// A continuation whose status arrives on the returned channel.
    pub fn waiter(&self) -> (Continuation, oneshot::Receiver<Status>) {
        let (tx, rx) = oneshot::channel();
        let cont = Continuation::new(move |status| {
            let _ = tx.send(status);
        });
        (cont, rx)
    }

    /// Let every spawned I/O task run to completion.
    pub async fn settle(&self) {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    pub fn decode_stored(&self, dir: u64) -> Vec<DirRecord> {
        let buf = self.objects.get(&self.location(dir)).unwrap();
        DirectoryCodec::default().decode(&buf).unwrap()
    }
}
