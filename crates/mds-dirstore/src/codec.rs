//! Binary encoding of a directory's entry set.
//!
//! A directory object is a little-endian `u32` entry count followed by that
//! many entries. Each entry is:
//!
//! ```text
//! name bytes | 0x00 | marker | payload
//! ```
//!
//! where `marker` is `'I'` for an inline inode (payload: a fixed-size
//! [`InodeSnapshot`]) or `'L'` for a hard link. Hard links are reserved:
//! neither encoded nor decoded.
//!
//! Entry order is whatever the caller supplies; decoding preserves buffer
//! order. Every read is bounds-checked, so a short or corrupt buffer yields a
//! [`CodecError`] rather than a panic.

use byteorder::{ByteOrder, LittleEndian};
use bytes::{BufMut, Bytes, BytesMut};
use mds_types::status_code::{StatusCode, StorageCode};
use mds_types::{InodeId, Status};
use thiserror::Error;

use crate::inode::{InodeSnapshot, INODE_SNAPSHOT_SIZE};

pub const INODE_MARKER: u8 = b'I';
pub const HARD_LINK_MARKER: u8 = b'L';

const COUNT_SIZE: usize = 4;

/// Smallest possible encoded entry: empty name, terminator, marker, snapshot.
const MIN_ENTRY_SIZE: usize = 1 + 1 + INODE_SNAPSHOT_SIZE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryPayload {
    Inode(InodeSnapshot),
    HardLink(InodeId),
}

/// One (name, payload) pair as stored in a directory object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirRecord {
    pub name: String,
    pub payload: EntryPayload,
}

impl DirRecord {
    pub fn inode(name: impl Into<String>, snapshot: InodeSnapshot) -> Self {
        Self {
            name: name.into(),
            payload: EntryPayload::Inode(snapshot),
        }
    }

    pub fn inode_id(&self) -> InodeId {
        match &self.payload {
            EntryPayload::Inode(snapshot) => snapshot.id(),
            EntryPayload::HardLink(id) => *id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("truncated directory object: entry {index} of {count} needs {need} bytes but only {have} remain")]
    Truncated {
        index: u32,
        count: u32,
        need: usize,
        have: usize,
    },
    #[error("hard link entry {name:?} is not supported")]
    HardLinkUnsupported { name: String },
    #[error("unknown entry marker {marker:#04x} after name {name:?}")]
    UnknownMarker { name: String, marker: u8 },
    #[error("invalid entry name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },
    #[error("corrupt name in stored entry {index}: {name:?} is {reason}")]
    CorruptName {
        index: u32,
        name: String,
        reason: &'static str,
    },
    #[error("directory object of {size} bytes exceeds limit of {limit} bytes")]
    TooLarge { size: usize, limit: usize },
}

impl From<CodecError> for Status {
    fn from(err: CodecError) -> Self {
        let code = match err {
            CodecError::HardLinkUnsupported { .. } => StatusCode::NOT_IMPLEMENTED,
            CodecError::TooLarge { .. } => StorageCode::OBJECT_TOO_LARGE,
            CodecError::InvalidName { .. } => StatusCode::INVALID_ARG,
            CodecError::Truncated { .. }
            | CodecError::UnknownMarker { .. }
            | CodecError::CorruptName { .. } => StatusCode::DATA_CORRUPTION,
        };
        Status::with_message(code, err.to_string())
    }
}

/// Stateless encoder/decoder for directory objects, bounded by a maximum
/// object size.
#[derive(Debug, Clone, Copy)]
pub struct DirectoryCodec {
    max_object_size: usize,
}

impl Default for DirectoryCodec {
    fn default() -> Self {
        Self {
            max_object_size: usize::MAX,
        }
    }
}

impl DirectoryCodec {
    pub fn new(max_object_size: usize) -> Self {
        Self { max_object_size }
    }

    pub fn max_object_size(&self) -> usize {
        self.max_object_size
    }

    /// Exact encoded size of `records`, or an error if any of them cannot be
    /// encoded.
    pub fn encoded_size(&self, records: &[DirRecord]) -> Result<usize, CodecError> {
        let mut size = COUNT_SIZE;
        for record in records {
            validate_name(&record.name)?;
            match record.payload {
                EntryPayload::Inode(_) => size += record.name.len() + 1 + 1 + INODE_SNAPSHOT_SIZE,
                EntryPayload::HardLink(_) => {
                    return Err(CodecError::HardLinkUnsupported {
                        name: record.name.clone(),
                    })
                }
            }
        }
        Ok(size)
    }

    pub fn encode(&self, records: &[DirRecord]) -> Result<Bytes, CodecError> {
        let size = self.encoded_size(records)?;
        if size > self.max_object_size {
            return Err(CodecError::TooLarge {
                size,
                limit: self.max_object_size,
            });
        }
        let count = u32::try_from(records.len()).map_err(|_| CodecError::TooLarge {
            size,
            limit: self.max_object_size,
        })?;

        let mut buf = BytesMut::with_capacity(size);
        buf.put_u32_le(count);
        for record in records {
            buf.put_slice(record.name.as_bytes());
            buf.put_u8(0);
            if let EntryPayload::Inode(snapshot) = &record.payload {
                buf.put_u8(INODE_MARKER);
                buf.put_slice(snapshot.as_bytes());
            }
        }
        debug_assert_eq!(buf.len(), size);
        Ok(buf.freeze())
    }

    pub fn decode(&self, buf: &[u8]) -> Result<Vec<DirRecord>, CodecError> {
        if buf.len() > self.max_object_size {
            return Err(CodecError::TooLarge {
                size: buf.len(),
                limit: self.max_object_size,
            });
        }

        let mut offset = 0;
        let count = LittleEndian::read_u32(read_bytes(buf, &mut offset, COUNT_SIZE, 0, 0)?);

        // Never trust the declared count for the allocation.
        let plausible = (buf.len() - offset) / MIN_ENTRY_SIZE;
        let mut records = Vec::with_capacity((count as usize).min(plausible));

        for index in 0..count {
            let name = read_name(buf, &mut offset, index, count)?;
            let marker = read_bytes(buf, &mut offset, 1, index, count)?[0];
            match marker {
                INODE_MARKER => {
                    let raw = read_bytes(buf, &mut offset, INODE_SNAPSHOT_SIZE, index, count)?;
                    let snapshot = InodeSnapshot::from_slice(raw).ok_or(CodecError::Truncated {
                        index,
                        count,
                        need: INODE_SNAPSHOT_SIZE,
                        have: raw.len(),
                    })?;
                    records.push(DirRecord::inode(name, snapshot));
                }
                HARD_LINK_MARKER => return Err(CodecError::HardLinkUnsupported { name }),
                marker => return Err(CodecError::UnknownMarker { name, marker }),
            }
        }

        Ok(records)
    }
}

/// Names must be non-empty and free of NUL bytes.
pub fn validate_name(name: &str) -> Result<(), CodecError> {
    let reason = if name.is_empty() {
        "empty"
    } else if name.as_bytes().contains(&0) {
        "contains NUL"
    } else {
        return Ok(());
    };
    Err(CodecError::InvalidName {
        name: name.to_string(),
        reason,
    })
}

fn read_bytes<'a>(
    buf: &'a [u8],
    offset: &mut usize,
    n: usize,
    index: u32,
    count: u32,
) -> Result<&'a [u8], CodecError> {
    let have = buf.len() - *offset;
    if have < n {
        return Err(CodecError::Truncated {
            index,
            count,
            need: n,
            have,
        });
    }
    let slice = &buf[*offset..*offset + n];
    *offset += n;
    Ok(slice)
}

/// Read a NUL-terminated name, consuming the terminator.
fn read_name(buf: &[u8], offset: &mut usize, index: u32, count: u32) -> Result<String, CodecError> {
    let rest = &buf[*offset..];
    let len = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or(CodecError::Truncated {
            index,
            count,
            need: rest.len() + 1,
            have: rest.len(),
        })?;
    let name = std::str::from_utf8(&rest[..len]).map_err(|_| CodecError::CorruptName {
        index,
        name: String::from_utf8_lossy(&rest[..len]).into_owned(),
        reason: "not UTF-8",
    })?;
    // Anything encode would refuse must not load either.
    validate_name(name).map_err(|err| match err {
        CodecError::InvalidName { name, reason } => CodecError::CorruptName {
            index,
            name,
            reason,
        },
        other => other,
    })?;
    *offset += len + 1;
    Ok(name.to_string())
}
