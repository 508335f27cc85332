// Byte sources backing trace pages: a read-only file mapping or an owned
// in-memory buffer. Pages hold shared handles; the mapping is released when
// the last handle is dropped.

use std::fmt;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;

use crate::error::{Result, TraceError};

/// Read-only memory mapping of a trace file.
pub struct TraceMapping {
    mmap: Mmap,
}

impl TraceMapping {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        // SAFETY: the mapping is read-only and the file is opened read-only;
        // callers must not truncate the file while the trace is open.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(TraceMapping { mmap })
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.len() == 0
    }

    fn bytes(&self) -> &[u8] {
        &self.mmap
    }
}

impl fmt::Debug for TraceMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceMapping")
            .field("len", &self.len())
            .finish()
    }
}

/// Shared handle to the bytes a trace's pages point into.
#[derive(Debug, Clone)]
pub enum ByteSource {
    Mapped(Arc<TraceMapping>),
    Owned(Arc<[u8]>),
}

impl ByteSource {
    /// Memory-map a trace file.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(ByteSource::Mapped(Arc::new(TraceMapping::open(path)?)))
    }

    /// Wrap an in-memory buffer, for embedders and tests.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        ByteSource::Owned(bytes.into())
    }

    pub fn len(&self) -> usize {
        match self {
            ByteSource::Mapped(mapping) => mapping.len(),
            ByteSource::Owned(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bounds-checked view of one page's region.
    pub fn slice(&self, offset: u64, length: u32) -> Result<&[u8]> {
        let bytes = match self {
            ByteSource::Mapped(mapping) => mapping.bytes(),
            ByteSource::Owned(owned) => owned,
        };
        let start = usize::try_from(offset).ok();
        let end = start.and_then(|start| start.checked_add(length as usize));
        match (start, end) {
            (Some(start), Some(end)) if end <= bytes.len() => Ok(&bytes[start..end]),
            _ => Err(TraceError::PageOutOfBounds {
                offset,
                length,
                source_len: bytes.len(),
            }),
        }
    }
}
