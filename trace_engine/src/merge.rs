// Globally time-ordered iteration over all CPU sections.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::TraceError;
use crate::event::{TraceEvent, BIG_BANG_TIMESTAMP};
use crate::page::Response;
use crate::section::SectionCursor;

/// Rank value of a cursor that has not produced any event and never will
/// (empty trace) or whose rank was explicitly invalidated.
pub const UNKNOWN_RANK: i64 = -1;

/// A persistable cursor position: a timestamp plus a tie index
/// disambiguating multiple events that share it. The tie index of an event
/// is its position among the events with the same timestamp, in merge order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceLocation {
    pub timestamp: u64,
    pub tie_index: u32,
}

impl TraceLocation {
    /// The fallback location of an unpositioned or exhausted cursor.
    pub const INVALID: TraceLocation = TraceLocation {
        timestamp: u64::MAX,
        tie_index: u32::MAX,
    };

    pub fn new(timestamp: u64, tie_index: u32) -> Self {
        TraceLocation {
            timestamp,
            tie_index,
        }
    }

    pub fn is_valid(&self) -> bool {
        *self != TraceLocation::INVALID
    }
}

/// K-way merge over the per-CPU section cursors, keyed by each section's
/// current timestamp with the CPU id as the deterministic tie-break (lower
/// CPU id first). Construction leaves the cursor before the first event;
/// each advance emits the globally earliest remaining event.
pub struct MergeCursor {
    sections: Vec<SectionCursor>,
    /// Min-heap over (current timestamp, cpu id, section index).
    heap: BinaryHeap<Reverse<(u64, u32, usize)>>,
    current: Option<TraceEvent>,
    winner: Option<usize>,
    location: TraceLocation,
    rank: i64,
    error_section: Option<usize>,
}

impl MergeCursor {
    pub fn new(sections: Vec<SectionCursor>) -> Self {
        let mut cursor = MergeCursor {
            sections,
            heap: BinaryHeap::new(),
            current: None,
            winner: None,
            location: TraceLocation::INVALID,
            rank: UNKNOWN_RANK,
            error_section: None,
        };
        cursor.populate();
        if cursor.has_more_events() {
            cursor.rank = 0;
        }
        cursor
    }

    /// Advance every section to its first event and seed the heap. Sections
    /// that fail are dropped; the remaining CPUs keep iterating.
    fn populate(&mut self) {
        for (index, section) in self.sections.iter_mut().enumerate() {
            match section.advance() {
                Response::Ok => self.heap.push(Reverse((
                    section.current_timestamp(),
                    section.cpu_id(),
                    index,
                ))),
                Response::Finish => {}
                Response::Error => {
                    warn!(
                        cpu = section.cpu_id(),
                        "trace section failed to produce its first event; dropping it from the merge"
                    );
                    self.error_section = Some(index);
                }
            }
        }
    }

    /// The event produced by the last advance/seek, cloned out of the
    /// producing section.
    pub fn current_event(&self) -> Option<&TraceEvent> {
        self.current.as_ref()
    }

    /// The timestamp of the current event, or the big-bang sentinel before
    /// the first advance and after exhaustion.
    pub fn current_timestamp(&self) -> u64 {
        self.current
            .as_ref()
            .map(TraceEvent::timestamp)
            .unwrap_or(BIG_BANG_TIMESTAMP)
    }

    pub fn has_more_events(&self) -> bool {
        !self.heap.is_empty()
    }

    /// The section that produced the current event; before the first
    /// advance, the section holding the earliest event.
    pub fn top_stream(&self) -> Option<&SectionCursor> {
        if let Some(index) = self.winner {
            return self.sections.get(index);
        }
        self.heap
            .peek()
            .map(|Reverse((_, _, index))| &self.sections[*index])
    }

    /// The page decode error of the most recently failed section, if any.
    pub fn last_error(&self) -> Option<&TraceError> {
        self.error_section
            .and_then(|index| self.sections[index].last_error())
    }

    /// The timestamp the next advance would emit.
    pub(crate) fn next_timestamp(&self) -> Option<u64> {
        self.heap.peek().map(|Reverse((ts, _, _))| *ts)
    }

    /// Pop the earliest section, take its current event as ours, advance it,
    /// and reinsert it under its new timestamp. No rank/location bookkeeping.
    fn emit_earliest(&mut self) -> bool {
        let Some(Reverse((_, cpu_id, index))) = self.heap.pop() else {
            self.current = None;
            return false;
        };
        let event = self.sections[index].current_event().cloned();
        match self.sections[index].advance() {
            Response::Ok => {
                let ts = self.sections[index].current_timestamp();
                self.heap.push(Reverse((ts, cpu_id, index)));
            }
            Response::Finish => {}
            Response::Error => {
                warn!(
                    cpu = cpu_id,
                    "trace section failed while advancing; dropping it from the merge"
                );
                self.error_section = Some(index);
            }
        }
        self.winner = Some(index);
        self.current = event;
        self.current.is_some()
    }

    fn update_location(&mut self, timestamp: u64) {
        self.location = if self.location.is_valid() && self.location.timestamp == timestamp {
            TraceLocation::new(timestamp, self.location.tie_index + 1)
        } else {
            TraceLocation::new(timestamp, 0)
        };
    }

    /// Emit the next event in global time order. Returns false only when all
    /// sections are exhausted. Each produced event increases the rank by 1.
    pub fn advance(&mut self) -> bool {
        if !self.emit_earliest() {
            self.location = TraceLocation::INVALID;
            return false;
        }
        let timestamp = match self.current.as_ref() {
            Some(event) => event.timestamp(),
            None => return false,
        };
        self.update_location(timestamp);
        self.increase_rank();
        true
    }

    /// Land on the first event with timestamp >= `target` across all CPUs:
    /// every section seeks independently, the heap is rebuilt from the
    /// landed positions, and one advance-equivalent step picks the globally
    /// earliest. Equivalent to scanning forward linearly from the start.
    /// The rank is not modified.
    pub fn seek(&mut self, target: u64) -> bool {
        self.heap.clear();
        for (index, section) in self.sections.iter_mut().enumerate() {
            if section.seek(target) {
                self.heap.push(Reverse((
                    section.current_timestamp(),
                    section.cpu_id(),
                    index,
                )));
            } else if section.last_error().is_some() {
                warn!(
                    cpu = section.cpu_id(),
                    "trace section failed while seeking; dropping it from the merge"
                );
                self.error_section = Some(index);
            }
        }
        if self.emit_earliest() {
            self.location = TraceLocation::new(self.current_timestamp(), 0);
            true
        } else {
            self.location = TraceLocation::INVALID;
            false
        }
    }

    /// The externally persistable resume point for the current position.
    pub fn location(&self) -> TraceLocation {
        self.location
    }

    /// Restore a previously captured location: seek to its timestamp, then
    /// walk forward through same-timestamp events until the tie index
    /// matches. Setting the current location is a no-op.
    pub fn set_location(&mut self, location: TraceLocation) -> bool {
        if !location.is_valid() {
            self.current = None;
            self.location = TraceLocation::INVALID;
            return false;
        }
        if self.location == location {
            return self.current.is_some();
        }
        if !self.seek(location.timestamp) {
            self.location = TraceLocation::INVALID;
            return false;
        }
        while self.location.timestamp == location.timestamp
            && self.location.tie_index < location.tie_index
        {
            if !self.advance() {
                return false;
            }
        }
        true
    }

    /// Number of events emitted since construction (or the last set_rank).
    pub fn rank(&self) -> i64 {
        self.rank
    }

    pub fn set_rank(&mut self, rank: i64) {
        self.rank = rank;
    }

    pub fn increase_rank(&mut self) {
        if self.has_valid_rank() {
            self.rank += 1;
        }
    }

    pub fn has_valid_rank(&self) -> bool {
        self.rank >= 0
    }

    /// Order two cursors by emission order (rank) only, independent of
    /// timestamps. Used to interleave multiple readers deterministically.
    pub fn compare(&self, other: &MergeCursor) -> Ordering {
        self.rank.cmp(&other.rank)
    }
}
