// Top-level facade over a parsed trace: owns the per-CPU cursors, the merge,
// and the lifetime of the underlying byte source.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::decoder::PageDecoder;
use crate::error::Result;
use crate::event::{TraceEvent, BIG_BANG_TIMESTAMP};
use crate::merge::MergeCursor;
use crate::section::{CpuSection, SectionCursor};
use crate::source::ByteSource;

/// The parsed-header view of a trace: one section per CPU, each with its
/// ordered page descriptors. Produced by the external file/header parser.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceMetadata {
    pub sections: Vec<CpuSection>,
}

impl TraceMetadata {
    pub fn new(sections: Vec<CpuSection>) -> Self {
        TraceMetadata { sections }
    }

    pub fn cpu_count(&self) -> usize {
        self.sections.len()
    }

    pub fn page_count(&self) -> usize {
        self.sections.iter().map(|section| section.pages.len()).sum()
    }
}

/// Reader over one trace. The byte source is acquired at construction and
/// every cursor holding it is dropped on `close`, releasing the mapping.
pub struct TraceReader {
    cursor: Option<MergeCursor>,
    start_time: u64,
    end_time: u64,
}

impl TraceReader {
    /// Memory-map the trace file and build the reader.
    pub fn open(
        path: &Path,
        metadata: &TraceMetadata,
        decoder: Arc<dyn PageDecoder>,
    ) -> Result<Self> {
        Ok(Self::new(metadata, ByteSource::open(path)?, decoder))
    }

    pub fn new(metadata: &TraceMetadata, source: ByteSource, decoder: Arc<dyn PageDecoder>) -> Self {
        let sections: Vec<SectionCursor> = metadata
            .sections
            .iter()
            .map(|section| SectionCursor::new(section, source.clone(), Arc::clone(&decoder)))
            .collect();
        let cursor = MergeCursor::new(sections);

        // Timestamp of the earliest event across all CPUs; the big-bang
        // sentinel for an empty trace.
        let start_time = cursor.next_timestamp().unwrap_or(BIG_BANG_TIMESTAMP);
        TraceReader {
            cursor: Some(cursor),
            start_time,
            end_time: start_time,
        }
    }

    /// The timestamp of the very first event in the trace, fixed at
    /// construction.
    pub fn start_time(&self) -> u64 {
        self.start_time
    }

    /// The timestamp high-water mark of what has been read so far; moves as
    /// `advance` and `seek` are called. This is not the trace's last event.
    pub fn end_time(&self) -> u64 {
        self.end_time
    }

    pub fn has_more_events(&self) -> bool {
        self.cursor
            .as_ref()
            .is_some_and(MergeCursor::has_more_events)
    }

    /// The event produced by the last advance/seek.
    pub fn current_event(&self) -> Option<&TraceEvent> {
        self.cursor.as_ref().and_then(MergeCursor::current_event)
    }

    /// The section cursor that produced the current event, for callers that
    /// want per-CPU context on top of the merged view.
    pub fn top_stream(&self) -> Option<&SectionCursor> {
        self.cursor.as_ref().and_then(MergeCursor::top_stream)
    }

    /// Read the next event in global time order. No-op returning false once
    /// closed or exhausted.
    pub fn advance(&mut self) -> bool {
        let Some(cursor) = self.cursor.as_mut() else {
            return false;
        };
        if cursor.advance() {
            self.end_time = self.end_time.max(cursor.current_timestamp());
            true
        } else {
            false
        }
    }

    /// Position at the first event with timestamp >= `timestamp`. No-op
    /// returning false once closed or when no such event exists.
    pub fn seek(&mut self, timestamp: u64) -> bool {
        let Some(cursor) = self.cursor.as_mut() else {
            return false;
        };
        if cursor.seek(timestamp) {
            self.end_time = self.end_time.max(cursor.current_timestamp());
            true
        } else {
            false
        }
    }

    /// Release every cursor and the underlying byte source. Idempotent;
    /// after closing, all positioning calls fail gracefully.
    pub fn close(&mut self) {
        self.cursor = None;
    }

    pub fn is_closed(&self) -> bool {
        self.cursor.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::RingBufferDecoder;
    use crate::page::PageDescriptor;
    use crate::testutil::{test_registry, PageBuilder, FMT_CPU_IDLE, FMT_TIMER_ENTRY};

    /// Builds a two-CPU trace in one shared byte source: CPU 0 events at
    /// 1100/1300/1500, CPU 1 events at 1200/1400/1600.
    fn two_cpu_reader() -> TraceReader {
        let mut bytes = Vec::new();
        let mut sections = Vec::new();

        let cpu0 = PageBuilder::new()
            .event(FMT_TIMER_ENTRY, 100, &[7, 0, 0, 0])
            .event(FMT_CPU_IDLE, 200, &[])
            .event(FMT_CPU_IDLE, 200, &[])
            .build();
        sections.push(CpuSection {
            cpu_id: 0,
            pages: vec![PageDescriptor {
                start_timestamp: 1_000,
                byte_offset: 0,
                byte_length: cpu0.len() as u32,
            }],
        });
        bytes.extend_from_slice(&cpu0);

        let cpu1 = PageBuilder::new()
            .event(FMT_CPU_IDLE, 200, &[])
            .event(FMT_CPU_IDLE, 200, &[])
            .event(FMT_CPU_IDLE, 200, &[])
            .build();
        sections.push(CpuSection {
            cpu_id: 1,
            pages: vec![PageDescriptor {
                start_timestamp: 1_000,
                byte_offset: cpu0.len() as u64,
                byte_length: cpu1.len() as u32,
            }],
        });
        bytes.extend_from_slice(&cpu1);

        let metadata = TraceMetadata::new(sections);
        let decoder = Arc::new(RingBufferDecoder::new(test_registry()));
        TraceReader::new(&metadata, ByteSource::from_vec(bytes), decoder)
    }

    #[test]
    fn test_trace_reader__construction__then_start_time_of_first_event() {
        let reader = two_cpu_reader();
        assert_eq!(reader.start_time(), 1_100);
        assert_eq!(reader.end_time(), 1_100);
        assert!(reader.has_more_events());
        assert!(reader.current_event().is_none());
        assert_eq!(reader.top_stream().unwrap().cpu_id(), 0);
    }

    #[test]
    fn test_trace_reader__advance__then_merged_order_and_end_time_moves() {
        let mut reader = two_cpu_reader();
        assert!(reader.advance());
        let first = reader.current_event().unwrap();
        assert_eq!(first.timestamp(), 1_100);
        assert_eq!(first.name(), "local_timer_entry");

        assert!(reader.advance());
        let second = reader.current_event().unwrap();
        assert_eq!(second.timestamp(), 1_200);
        assert_eq!(second.cpu(), 1);
        assert_eq!(reader.end_time(), 1_200);
    }

    #[test]
    fn test_trace_reader__seek__then_end_time_tracks_position() {
        let mut reader = two_cpu_reader();
        assert!(reader.seek(1_350));
        assert_eq!(reader.current_event().unwrap().timestamp(), 1_400);
        assert_eq!(reader.start_time(), 1_100);
        assert_eq!(reader.end_time(), 1_400);
    }

    #[test]
    fn test_trace_reader__seek_backwards__then_end_time_keeps_high_water() {
        let mut reader = two_cpu_reader();
        assert!(reader.seek(1_600));
        assert_eq!(reader.end_time(), 1_600);
        assert!(reader.seek(0));
        assert_eq!(reader.current_event().unwrap().timestamp(), 1_100);
        assert_eq!(reader.end_time(), 1_600);
    }

    #[test]
    fn test_trace_reader__drain__then_no_more_events() {
        let mut reader = two_cpu_reader();
        let mut count = 0;
        while reader.advance() {
            count += 1;
        }
        assert_eq!(count, 6);
        assert!(!reader.has_more_events());
        assert!(!reader.advance());
    }

    #[test]
    fn test_trace_reader__seek_last_then_advance__then_exhausted() {
        let mut reader = two_cpu_reader();
        assert!(reader.seek(1_600));
        assert!(!reader.advance());
        assert!(!reader.has_more_events());
    }

    #[test]
    fn test_trace_reader__empty_trace__then_graceful() {
        let metadata = TraceMetadata::default();
        let decoder = Arc::new(RingBufferDecoder::new(test_registry()));
        let mut reader = TraceReader::new(&metadata, ByteSource::from_vec(Vec::new()), decoder);

        assert_eq!(reader.start_time(), BIG_BANG_TIMESTAMP);
        assert!(!reader.has_more_events());
        assert!(!reader.seek(42));
        assert!(!reader.advance());
        assert_eq!(metadata.cpu_count(), 0);
        assert_eq!(metadata.page_count(), 0);
    }

    #[test]
    fn test_trace_reader__close__then_idempotent_and_all_calls_fail() {
        let mut reader = two_cpu_reader();
        assert!(!reader.is_closed());

        reader.close();
        assert!(reader.is_closed());
        assert!(!reader.has_more_events());
        assert!(!reader.advance());
        assert!(!reader.seek(0));
        assert!(reader.current_event().is_none());
        assert!(reader.top_stream().is_none());

        reader.close();
        assert!(reader.is_closed());
    }

    #[test]
    fn test_trace_reader__metadata_serde__then_round_trips() {
        let metadata = TraceMetadata::new(vec![CpuSection {
            cpu_id: 2,
            pages: vec![PageDescriptor {
                start_timestamp: 10,
                byte_offset: 0,
                byte_length: 64,
            }],
        }]);
        let json = serde_json::to_string(&metadata).unwrap();
        let back: TraceMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, metadata);
    }
}
