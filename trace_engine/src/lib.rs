// Decoder and time-ordered iteration engine for per-CPU binary ring-buffer
// traces: pages of delta-timestamped records are decoded lazily, walked per
// CPU, and merged into one globally time-ordered event stream.

pub mod decoder;
pub mod error;
pub mod event;
pub mod format;
pub mod merge;
pub mod page;
pub mod reader;
pub mod section;
pub mod source;

#[cfg(test)]
pub(crate) mod testutil;

pub use decoder::{PageDecoder, RingBufferDecoder};
pub use error::{Result, TraceError};
pub use event::{FieldValue, TraceEvent, BIG_BANG_TIMESTAMP};
pub use format::{EventFormat, EventRegistry, FormatField};
pub use merge::{MergeCursor, TraceLocation, UNKNOWN_RANK};
pub use page::{DataPage, PageCursor, PageDescriptor, Response};
pub use reader::{TraceMetadata, TraceReader};
pub use section::{CpuSection, SectionCursor};
pub use source::{ByteSource, TraceMapping};
