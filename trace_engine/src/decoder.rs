// Record decoder for ring-buffer pages.

use crate::error::{Result, TraceError};
use crate::event::TraceEvent;
use crate::format::{
    payload_format_id, EventRegistry, EXTEND_SHIFT, TIME_DELTA_SHIFT, TYPE_LEN_CUSTOM,
    TYPE_LEN_DATA_MAX, TYPE_LEN_MASK, TYPE_LEN_PADDING, TYPE_LEN_TIME_EXTEND, TYPE_LEN_TIME_STAMP,
};

/// Turns one page's raw bytes plus its base timestamp into the ordered list
/// of events the page contains.
pub trait PageDecoder {
    fn decode(&self, bytes: &[u8], base_timestamp: u64, cpu: u32) -> Result<Vec<TraceEvent>>;
}

/// Production decoder for the ring-buffer record encoding: a u32 header per
/// record (5-bit type length, 27-bit timestamp delta), with pseudo-records
/// for padding, time extension and absolute timestamps.
#[derive(Debug, Clone)]
pub struct RingBufferDecoder {
    registry: EventRegistry,
}

impl RingBufferDecoder {
    pub fn new(registry: EventRegistry) -> Self {
        RingBufferDecoder { registry }
    }

    pub fn registry(&self) -> &EventRegistry {
        &self.registry
    }

    fn read_u32(bytes: &[u8], offset: &mut usize) -> Result<u32> {
        let end = *offset + 4;
        let word = bytes
            .get(*offset..end)
            .ok_or(TraceError::TruncatedRecord {
                offset: *offset,
                page_len: bytes.len(),
            })?;
        *offset = end;
        Ok(u32::from_le_bytes([word[0], word[1], word[2], word[3]]))
    }
}

impl PageDecoder for RingBufferDecoder {
    fn decode(&self, bytes: &[u8], base_timestamp: u64, cpu: u32) -> Result<Vec<TraceEvent>> {
        let mut events = Vec::new();
        let mut timestamp = base_timestamp;
        let mut offset = 0usize;

        while offset + 4 <= bytes.len() {
            let header = Self::read_u32(bytes, &mut offset)?;
            let type_len = header & TYPE_LEN_MASK;
            let delta = (header >> TIME_DELTA_SHIFT) as u64;

            match type_len {
                TYPE_LEN_PADDING => {
                    // A zero delta pads out the rest of the page; otherwise
                    // the next word holds the number of bytes to skip.
                    if delta == 0 {
                        break;
                    }
                    let skip = Self::read_u32(bytes, &mut offset)? as usize;
                    let end = offset.checked_add(skip).filter(|end| *end <= bytes.len());
                    match end {
                        Some(end) => offset = end,
                        None => {
                            return Err(TraceError::InconsistentLength {
                                offset,
                                length: skip,
                                page_len: bytes.len(),
                            })
                        }
                    }
                }
                TYPE_LEN_TIME_EXTEND => {
                    let upper = Self::read_u32(bytes, &mut offset)? as u64;
                    timestamp += (upper << EXTEND_SHIFT) | delta;
                }
                TYPE_LEN_TIME_STAMP => {
                    let upper = Self::read_u32(bytes, &mut offset)? as u64;
                    timestamp = (upper << EXTEND_SHIFT) + delta;
                }
                _ => {
                    let record_offset = offset - 4;
                    let length = if type_len == TYPE_LEN_CUSTOM {
                        let length = Self::read_u32(bytes, &mut offset)? as usize;
                        // An all-zero header word followed by a zero length is
                        // trailing page fill, not a record.
                        if header == 0 && length == 0 {
                            break;
                        }
                        length
                    } else {
                        debug_assert!(type_len <= TYPE_LEN_DATA_MAX);
                        type_len as usize * 4
                    };

                    let end = offset.checked_add(length).filter(|end| *end <= bytes.len());
                    let payload = match end {
                        Some(end) => &bytes[offset..end],
                        None => {
                            return Err(TraceError::InconsistentLength {
                                offset,
                                length,
                                page_len: bytes.len(),
                            })
                        }
                    };
                    offset += length;
                    timestamp += delta;

                    let format_id =
                        payload_format_id(payload).ok_or(TraceError::TruncatedRecord {
                            offset: record_offset,
                            page_len: bytes.len(),
                        })?;
                    let format = self
                        .registry
                        .format_by_id(format_id)
                        .ok_or(TraceError::UnknownEventFormat { format_id })?;
                    let fields = format.parse_payload(payload)?;
                    events.push(TraceEvent::new(timestamp, format.name(), cpu, fields));
                }
            }
        }

        Ok(events)
    }
}
