// Error types for trace decoding and cursor operations

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("page region at offset {offset} ({length} bytes) out of bounds (source size: {source_len})")]
    PageOutOfBounds {
        offset: u64,
        length: u32,
        source_len: usize,
    },

    #[error("truncated record at page offset {offset} (page data is {page_len} bytes)")]
    TruncatedRecord { offset: usize, page_len: usize },

    #[error("record payload of {length} bytes at page offset {offset} runs past the page data region ({page_len} bytes)")]
    InconsistentLength {
        offset: usize,
        length: usize,
        page_len: usize,
    },

    #[error("no event format registered for id {format_id}")]
    UnknownEventFormat { format_id: u16 },

    #[error("field `{field}` needs {need} bytes at payload offset {offset}, payload is {payload_len} bytes")]
    FieldOutOfBounds {
        field: String,
        offset: usize,
        need: usize,
        payload_len: usize,
    },

    #[error("unsupported size {size} for integer field `{field}`")]
    UnsupportedFieldSize { field: String, size: usize },
}

pub type Result<T> = std::result::Result<T, TraceError>;
