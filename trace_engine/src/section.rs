// One CPU's pages presented as a single ordered event stream.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::decoder::PageDecoder;
use crate::error::TraceError;
use crate::event::{TraceEvent, BIG_BANG_TIMESTAMP};
use crate::page::{DataPage, PageCursor, PageDescriptor, Response};
use crate::source::ByteSource;

/// The ordered pages of one CPU, as located by the external file/header
/// parser. Pages are ordered by non-decreasing start timestamp and do not
/// overlap in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuSection {
    pub cpu_id: u32,
    pub pages: Vec<PageDescriptor>,
}

/// Cursor over one CPU section, crossing page boundaries transparently. All
/// page cursors are built up front so their decode caches survive
/// section-level seeks.
pub struct SectionCursor {
    cpu_id: u32,
    pages: Vec<PageCursor>,
    active: Option<usize>,
}

impl SectionCursor {
    pub fn new(section: &CpuSection, source: ByteSource, decoder: Arc<dyn PageDecoder>) -> Self {
        let pages: Vec<PageCursor> = section
            .pages
            .iter()
            .map(|descriptor| {
                let page = DataPage::new(*descriptor, section.cpu_id, source.clone());
                PageCursor::new(page, Arc::clone(&decoder))
            })
            .collect();
        let active = if pages.is_empty() { None } else { Some(0) };
        SectionCursor {
            cpu_id: section.cpu_id,
            pages,
            active,
        }
    }

    pub fn cpu_id(&self) -> u32 {
        self.cpu_id
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn current_event(&self) -> Option<&TraceEvent> {
        self.active
            .and_then(|index| self.pages[index].current_event())
    }

    /// The active page cursor's timestamp, or the big-bang sentinel for a
    /// section with no pages.
    pub fn current_timestamp(&self) -> u64 {
        match self.active {
            Some(index) => self.pages[index].current_timestamp(),
            None => BIG_BANG_TIMESTAMP,
        }
    }

    /// The decode error of the active page, if it is poisoned.
    pub fn last_error(&self) -> Option<&TraceError> {
        self.active.and_then(|index| self.pages[index].last_error())
    }

    /// Step to the next event, moving into the following page when the
    /// active one is exhausted. Finishes only once the last page is drained;
    /// a section with no pages is immediately finished.
    pub fn advance(&mut self) -> Response {
        let Some(mut index) = self.active else {
            return Response::Finish;
        };
        loop {
            match self.pages[index].advance() {
                Response::Ok => {
                    self.active = Some(index);
                    return Response::Ok;
                }
                Response::Error => {
                    self.active = Some(index);
                    return Response::Error;
                }
                Response::Finish => {
                    if index + 1 < self.pages.len() {
                        index += 1;
                        self.pages[index].rewind();
                    } else {
                        self.active = Some(index);
                        return Response::Finish;
                    }
                }
            }
        }
    }

    /// Position at the first event with timestamp >= `target` anywhere in the
    /// section. Binary-searches the page start timestamps for the bracketing
    /// page, seeks into it, and spills into the following page when the
    /// target falls in the gap between two pages. Returns false when no such
    /// event exists (the current event is then cleared).
    pub fn seek(&mut self, target: u64) -> bool {
        if self.pages.is_empty() {
            return false;
        }

        // Last page whose start timestamp is <= target; ceiling targets
        // before the first page resolve to the first page.
        let bracket = self
            .pages
            .partition_point(|page| page.descriptor().start_timestamp <= target)
            .saturating_sub(1);

        match self.pages[bracket].seek(target) {
            Response::Ok => {
                self.active = Some(bracket);
                true
            }
            Response::Error => {
                self.active = Some(bracket);
                false
            }
            Response::Finish => {
                // Every event of a later page is at or after that page's
                // start timestamp, which is > target here, so the first
                // non-empty page wins.
                let mut index = bracket;
                while index + 1 < self.pages.len() {
                    index += 1;
                    match self.pages[index].seek(target) {
                        Response::Ok => {
                            self.active = Some(index);
                            return true;
                        }
                        Response::Error => {
                            self.active = Some(index);
                            return false;
                        }
                        Response::Finish => {}
                    }
                }
                self.active = Some(index);
                false
            }
        }
    }
}
