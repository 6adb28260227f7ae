//! Boundary to the remote object store that holds one object per directory.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use mds_types::{InodeId, NodeId, ObjectId, Result};

/// Where a directory's backing object lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectLocation {
    pub node: NodeId,
    pub object: ObjectId,
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "osd{}/{:x}.dir", self.node, self.object)
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read a whole object.
    async fn read(&self, location: &ObjectLocation) -> Result<Bytes>;

    /// Replace a whole object.
    async fn write(&self, location: &ObjectLocation, data: Bytes) -> Result<()>;
}

/// Maps a directory to the location of its backing object.
pub trait Placement: Send + Sync {
    fn resolve(&self, dir: InodeId) -> ObjectLocation;
}

/// Spreads directory objects across `nodes` storage nodes by inode number;
/// the object id is the directory's inode number.
#[derive(Debug, Clone, Copy)]
pub struct HashPlacement {
    nodes: u32,
}

impl HashPlacement {
    pub fn new(nodes: u32) -> Self {
        Self {
            nodes: nodes.max(1),
        }
    }
}

impl Placement for HashPlacement {
    fn resolve(&self, dir: InodeId) -> ObjectLocation {
        ObjectLocation {
            node: NodeId((dir.get() % u64::from(self.nodes)) as u32),
            object: ObjectId(dir.get()),
        }
    }
}
