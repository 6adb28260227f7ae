//! State and collaborators shared by the fetch and commit coordinators.

use std::sync::Arc;

use bytes::Bytes;
use mds_types::status_code::StorageCode;
use mds_types::{make_error_msg, InodeId, Result};

use crate::cache::{Authority, InodeCache};
use crate::codec::DirectoryCodec;
use crate::config::DirStoreConfig;
use crate::directory::DirectoryTable;
use crate::object_store::{ObjectLocation, ObjectStore, Placement};

pub struct StoreContext {
    pub config: DirStoreConfig,
    pub codec: DirectoryCodec,
    pub dirs: DirectoryTable,
    pub objects: Arc<dyn ObjectStore>,
    pub placement: Arc<dyn Placement>,
    pub cache: Arc<dyn InodeCache>,
    pub authority: Arc<dyn Authority>,
}

impl StoreContext {
    pub fn new(
        config: DirStoreConfig,
        objects: Arc<dyn ObjectStore>,
        placement: Arc<dyn Placement>,
        cache: Arc<dyn InodeCache>,
        authority: Arc<dyn Authority>,
    ) -> Self {
        Self {
            codec: DirectoryCodec::new(config.max_object_size),
            config,
            dirs: DirectoryTable::default(),
            objects,
            placement,
            cache,
            authority,
        }
    }

    pub fn locate(&self, dir: InodeId) -> ObjectLocation {
        self.placement.resolve(dir)
    }

    /// Read a directory object, bounded by the configured I/O timeout.
    pub async fn read_object(&self, location: ObjectLocation) -> Result<Bytes> {
        match tokio::time::timeout(self.config.io_timeout, self.objects.read(&location)).await {
            Ok(result) => result,
            Err(_) => make_error_msg(
                StorageCode::IO_TIMEOUT,
                format!("read of {} timed out after {:?}", location, self.config.io_timeout),
            ),
        }
    }

    /// Write a directory object, bounded by the configured I/O timeout.
    pub async fn write_object(&self, location: ObjectLocation, data: Bytes) -> Result<()> {
        match tokio::time::timeout(self.config.io_timeout, self.objects.write(&location, data))
            .await
        {
            Ok(result) => result,
            Err(_) => make_error_msg(
                StorageCode::IO_TIMEOUT,
                format!("write of {} timed out after {:?}", location, self.config.io_timeout),
            ),
        }
    }
}
