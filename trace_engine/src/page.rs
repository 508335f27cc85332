// A CPU data page and the cursor that walks its events.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::decoder::PageDecoder;
use crate::error::TraceError;
use crate::event::TraceEvent;
use crate::source::ByteSource;

/// Outcome of a page-level advance/seek step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// The current event was updated.
    Ok,
    /// No more events at this level; the current event is cleared.
    Finish,
    /// The page bytes are malformed; decoding cannot continue for this page.
    Error,
}

/// Where one page's bytes live inside the trace, and the page's base
/// timestamp. Produced by the external file/header parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageDescriptor {
    pub start_timestamp: u64,
    pub byte_offset: u64,
    pub byte_length: u32,
}

/// Decode cache of a page: raw until first access, then either the decoded
/// event list or the terminal decode error.
#[derive(Debug)]
enum PageState {
    Undecoded,
    Decoded(Vec<TraceEvent>),
    Poisoned(TraceError),
}

/// One page of a CPU section. Read-only after creation except for the decode
/// cache, which is written at most once.
#[derive(Debug)]
pub struct DataPage {
    descriptor: PageDescriptor,
    cpu: u32,
    source: ByteSource,
    state: PageState,
}

impl DataPage {
    pub fn new(descriptor: PageDescriptor, cpu: u32, source: ByteSource) -> Self {
        DataPage {
            descriptor,
            cpu,
            source,
            state: PageState::Undecoded,
        }
    }

    pub fn descriptor(&self) -> &PageDescriptor {
        &self.descriptor
    }

    pub fn start_timestamp(&self) -> u64 {
        self.descriptor.start_timestamp
    }

    pub fn cpu(&self) -> u32 {
        self.cpu
    }

    fn ensure_decoded(&mut self, decoder: &dyn PageDecoder) {
        if !matches!(self.state, PageState::Undecoded) {
            return;
        }
        let result = self
            .source
            .slice(self.descriptor.byte_offset, self.descriptor.byte_length)
            .and_then(|bytes| decoder.decode(bytes, self.descriptor.start_timestamp, self.cpu));
        self.state = match result {
            Ok(events) => PageState::Decoded(events),
            Err(err) => {
                warn!(
                    cpu = self.cpu,
                    page_offset = self.descriptor.byte_offset,
                    error = %err,
                    "failed to decode trace page"
                );
                PageState::Poisoned(err)
            }
        };
    }

    fn events(&self) -> Option<&[TraceEvent]> {
        match &self.state {
            PageState::Decoded(events) => Some(events),
            _ => None,
        }
    }

    fn error(&self) -> Option<&TraceError> {
        match &self.state {
            PageState::Poisoned(err) => Some(err),
            _ => None,
        }
    }
}

/// Position of a page cursor within its decoded event list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    /// Before the first positioning call; reports the page start timestamp.
    Start,
    At(usize),
    /// Past the last event; the current event is cleared.
    End,
}

/// Sequential and random access to the events inside one page. The first
/// positioning call decodes the whole page into the page's cache; seeks then
/// binary-search the decoded list.
pub struct PageCursor {
    page: DataPage,
    decoder: Arc<dyn PageDecoder>,
    pos: Position,
    current_ts: u64,
}

impl PageCursor {
    pub fn new(page: DataPage, decoder: Arc<dyn PageDecoder>) -> Self {
        let current_ts = page.start_timestamp();
        PageCursor {
            page,
            decoder,
            pos: Position::Start,
            current_ts,
        }
    }

    pub fn descriptor(&self) -> &PageDescriptor {
        self.page.descriptor()
    }

    /// The event at the cursor's position, or none before the first advance,
    /// past the end, or on a poisoned page.
    pub fn current_event(&self) -> Option<&TraceEvent> {
        match self.pos {
            Position::At(index) => self.page.events().and_then(|events| events.get(index)),
            _ => None,
        }
    }

    /// The page start timestamp before the first advance/seek, the current
    /// event's timestamp thereafter. An exhausted cursor keeps reporting the
    /// last event's timestamp.
    pub fn current_timestamp(&self) -> u64 {
        self.current_ts
    }

    /// The decode error that poisoned this page, if any.
    pub fn last_error(&self) -> Option<&TraceError> {
        self.page.error()
    }

    fn decoded(&mut self) -> Option<&[TraceEvent]> {
        self.page.ensure_decoded(self.decoder.as_ref());
        self.page.events()
    }

    /// Step to the next event. Idempotent once finished; a poisoned page
    /// stays in the error state.
    pub fn advance(&mut self) -> Response {
        let next = match self.pos {
            Position::Start => 0,
            Position::At(index) => index + 1,
            Position::End => return Response::Finish,
        };
        let (next_ts, last_ts) = {
            let Some(events) = self.decoded() else {
                return Response::Error;
            };
            (
                events.get(next).map(TraceEvent::timestamp),
                events.last().map(TraceEvent::timestamp),
            )
        };
        match next_ts {
            Some(ts) => {
                self.pos = Position::At(next);
                self.current_ts = ts;
                Response::Ok
            }
            None => {
                self.pos = Position::End;
                if let Some(ts) = last_ts {
                    self.current_ts = ts;
                }
                Response::Finish
            }
        }
    }

    /// Position at the first event with timestamp >= `target` (ceiling
    /// semantics). Finishes and clears the current event when every event in
    /// the page is earlier than `target`.
    pub fn seek(&mut self, target: u64) -> Response {
        let (index, hit_ts, last_ts) = {
            let Some(events) = self.decoded() else {
                return Response::Error;
            };
            let index = events.partition_point(|event| event.timestamp() < target);
            (
                index,
                events.get(index).map(TraceEvent::timestamp),
                events.last().map(TraceEvent::timestamp),
            )
        };
        match hit_ts {
            Some(ts) => {
                self.pos = Position::At(index);
                self.current_ts = ts;
                Response::Ok
            }
            None => {
                self.pos = Position::End;
                if let Some(ts) = last_ts {
                    self.current_ts = ts;
                }
                Response::Finish
            }
        }
    }

    /// Reset to the before-first position. The decode cache is kept.
    pub(crate) fn rewind(&mut self) {
        self.pos = Position::Start;
        self.current_ts = self.page.start_timestamp();
    }
}
