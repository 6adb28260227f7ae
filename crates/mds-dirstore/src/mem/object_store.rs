//! In-memory object store.
//!
//! Objects live in a `DashMap` keyed by location. Reads and writes are
//! counted, and the next read or write can be made to fail with a chosen
//! status code.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use mds_types::status_code::{status_code_t, StorageCode};
use mds_types::{make_error_msg, Result, Status};
use parking_lot::Mutex;

use crate::object_store::{ObjectLocation, ObjectStore};

#[derive(Debug, Default)]
pub struct MemObjectStore {
    objects: DashMap<ObjectLocation, Bytes>,
    reads: AtomicU64,
    writes: AtomicU64,
    fail_read: Mutex<Option<status_code_t>>,
    fail_write: Mutex<Option<status_code_t>>,
}

impl MemObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data` at `location` directly, bypassing counters.
    pub fn put(&self, location: ObjectLocation, data: impl Into<Bytes>) {
        self.objects.insert(location, data.into());
    }

    pub fn get(&self, location: &ObjectLocation) -> Option<Bytes> {
        self.objects.get(location).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Number of reads issued through [`ObjectStore::read`].
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of writes issued through [`ObjectStore::write`].
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make the next read fail with `code`.
    pub fn fail_next_read(&self, code: status_code_t) {
        *self.fail_read.lock() = Some(code);
    }

    /// Make the next write fail with `code`. The stored object is unchanged.
    pub fn fail_next_write(&self, code: status_code_t) {
        *self.fail_write.lock() = Some(code);
    }
}

#[async_trait]
impl ObjectStore for MemObjectStore {
    async fn read(&self, location: &ObjectLocation) -> Result<Bytes> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(code) = self.fail_read.lock().take() {
            return make_error_msg(code, format!("injected read failure on {}", location));
        }
        self.get(location).ok_or_else(|| {
            Status::with_message(
                StorageCode::OBJECT_NOT_FOUND,
                format!("object {} not found", location),
            )
        })
    }

    async fn write(&self, location: &ObjectLocation, data: Bytes) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if let Some(code) = self.fail_write.lock().take() {
            return make_error_msg(code, format!("injected write failure on {}", location));
        }
        self.objects.insert(*location, data);
        Ok(())
    }
}
