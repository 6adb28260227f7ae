//! Fixed-size inode snapshot stored inline in directory objects.
//!
//! The directory layer treats a snapshot as an opaque, fixed-size byte record:
//! it copies the bytes verbatim on encode and decode. The only field it reads
//! is the leading inode id, which keys the inode cache.
//!
//! Layout (little-endian, 48 bytes):
//!
//! | offset | size | field      |
//! |--------|------|------------|
//! | 0      | 8    | ino        |
//! | 8      | 4    | mode       |
//! | 12     | 4    | uid        |
//! | 16     | 4    | gid        |
//! | 20     | 4    | nlink      |
//! | 24     | 8    | size       |
//! | 32     | 8    | mtime (ns) |
//! | 40     | 8    | ctime (ns) |

use std::fmt;

use byteorder::{ByteOrder, LittleEndian};
use mds_types::InodeId;

/// Size in bytes of an encoded [`InodeSnapshot`].
pub const INODE_SNAPSHOT_SIZE: usize = 48;

/// File type bits for a directory, as in `st_mode`.
pub const S_IFDIR: u32 = 0o040000;

/// File type bits for a regular file, as in `st_mode`.
pub const S_IFREG: u32 = 0o100000;

const S_IFMT: u32 = 0o170000;

/// Decoded view of an inode snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InodeAttr {
    pub id: InodeId,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u32,
    pub size: u64,
    pub mtime_ns: i64,
    pub ctime_ns: i64,
}

impl InodeAttr {
    /// A directory inode owned by root with mode 0755.
    pub fn directory(id: InodeId) -> Self {
        Self {
            id,
            mode: S_IFDIR | 0o755,
            nlink: 2,
            ..Default::default()
        }
    }

    /// A regular file inode owned by root with mode 0644.
    pub fn file(id: InodeId, size: u64) -> Self {
        Self {
            id,
            mode: S_IFREG | 0o644,
            nlink: 1,
            size,
            ..Default::default()
        }
    }

    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }
}

/// Fixed-size binary inode record, copied by value.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct InodeSnapshot([u8; INODE_SNAPSHOT_SIZE]);

impl InodeSnapshot {
    pub fn from_bytes(bytes: [u8; INODE_SNAPSHOT_SIZE]) -> Self {
        Self(bytes)
    }

    /// Copy a snapshot out of `bytes`, which must be exactly
    /// [`INODE_SNAPSHOT_SIZE`] long.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; INODE_SNAPSHOT_SIZE] = bytes.try_into().ok()?;
        Some(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; INODE_SNAPSHOT_SIZE] {
        &self.0
    }

    pub fn id(&self) -> InodeId {
        InodeId(LittleEndian::read_u64(&self.0[0..8]))
    }

    pub fn attr(&self) -> InodeAttr {
        let b = &self.0;
        InodeAttr {
            id: self.id(),
            mode: LittleEndian::read_u32(&b[8..12]),
            uid: LittleEndian::read_u32(&b[12..16]),
            gid: LittleEndian::read_u32(&b[16..20]),
            nlink: LittleEndian::read_u32(&b[20..24]),
            size: LittleEndian::read_u64(&b[24..32]),
            mtime_ns: LittleEndian::read_i64(&b[32..40]),
            ctime_ns: LittleEndian::read_i64(&b[40..48]),
        }
    }
}

impl From<InodeAttr> for InodeSnapshot {
    fn from(attr: InodeAttr) -> Self {
        let mut b = [0u8; INODE_SNAPSHOT_SIZE];
        LittleEndian::write_u64(&mut b[0..8], attr.id.get());
        LittleEndian::write_u32(&mut b[8..12], attr.mode);
        LittleEndian::write_u32(&mut b[12..16], attr.uid);
        LittleEndian::write_u32(&mut b[16..20], attr.gid);
        LittleEndian::write_u32(&mut b[20..24], attr.nlink);
        LittleEndian::write_u64(&mut b[24..32], attr.size);
        LittleEndian::write_i64(&mut b[32..40], attr.mtime_ns);
        LittleEndian::write_i64(&mut b[40..48], attr.ctime_ns);
        Self(b)
    }
}

impl fmt::Debug for InodeSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let attr = self.attr();
        f.debug_struct("InodeSnapshot")
            .field("id", &attr.id)
            .field("mode", &format_args!("{:o}", attr.mode))
            .field("size", &attr.size)
            .finish()
    }
}
