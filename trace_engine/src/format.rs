// Binary record layout and event format registry.
//
// Each record in a page starts with a little-endian u32 header: the low 5
// bits hold the type length, the upper 27 bits the timestamp delta. Type
// length values 29/30/31 mark padding, time-extend and absolute-timestamp
// pseudo-records; 1..=28 is the payload length in 4-byte words; 0 means the
// next u32 carries the payload length in bytes.

use std::collections::HashMap;

use crate::error::{Result, TraceError};
use crate::event::FieldValue;

pub(crate) const TYPE_LEN_MASK: u32 = 0x1f;
pub(crate) const TIME_DELTA_SHIFT: u32 = 5;
pub(crate) const EXTEND_SHIFT: u32 = 27;

pub(crate) const TYPE_LEN_CUSTOM: u32 = 0;
pub(crate) const TYPE_LEN_DATA_MAX: u32 = 28;
pub(crate) const TYPE_LEN_PADDING: u32 = 29;
pub(crate) const TYPE_LEN_TIME_EXTEND: u32 = 30;
pub(crate) const TYPE_LEN_TIME_STAMP: u32 = 31;

/// Every payload starts with the common_type field: a little-endian u16 at
/// offset 0 identifying the event format.
pub(crate) fn payload_format_id(payload: &[u8]) -> Option<u16> {
    let bytes = payload.get(0..2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Integer { signed: bool },
    CharArray,
}

/// Extraction rule for one field of an event payload.
#[derive(Debug, Clone)]
pub struct FormatField {
    name: String,
    offset: usize,
    size: usize,
    kind: FieldKind,
}

impl FormatField {
    /// An integer field of 1, 2, 4 or 8 bytes.
    pub fn integer(name: impl Into<String>, offset: usize, size: usize, signed: bool) -> Self {
        FormatField {
            name: name.into(),
            offset,
            size,
            kind: FieldKind::Integer { signed },
        }
    }

    /// A fixed-size char array, decoded up to the first NUL byte.
    pub fn char_array(name: impl Into<String>, offset: usize, size: usize) -> Self {
        FormatField {
            name: name.into(),
            offset,
            size,
            kind: FieldKind::CharArray,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn extract(&self, payload: &[u8]) -> Result<FieldValue> {
        let end = self.offset + self.size;
        if end > payload.len() {
            return Err(TraceError::FieldOutOfBounds {
                field: self.name.clone(),
                offset: self.offset,
                need: self.size,
                payload_len: payload.len(),
            });
        }
        let bytes = &payload[self.offset..end];

        match self.kind {
            FieldKind::CharArray => {
                let terminated = bytes
                    .iter()
                    .position(|byte| *byte == 0)
                    .map_or(bytes, |nul| &bytes[..nul]);
                Ok(FieldValue::Str(
                    String::from_utf8_lossy(terminated).into_owned(),
                ))
            }
            FieldKind::Integer { signed } => self.extract_integer(bytes, signed),
        }
    }

    fn extract_integer(&self, bytes: &[u8], signed: bool) -> Result<FieldValue> {
        let value = match (self.size, signed) {
            (1, true) => FieldValue::Int(bytes[0] as i8 as i64),
            (1, false) => FieldValue::UInt(bytes[0] as u64),
            (2, true) => FieldValue::Int(i16::from_le_bytes([bytes[0], bytes[1]]) as i64),
            (2, false) => FieldValue::UInt(u16::from_le_bytes([bytes[0], bytes[1]]) as u64),
            (4, true) => {
                FieldValue::Int(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as i64)
            }
            (4, false) => FieldValue::UInt(u32::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3],
            ]) as u64),
            (8, true) => FieldValue::Int(i64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ])),
            (8, false) => FieldValue::UInt(u64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ])),
            (size, _) => {
                return Err(TraceError::UnsupportedFieldSize {
                    field: self.name.clone(),
                    size,
                })
            }
        };
        Ok(value)
    }
}

/// Layout of one event kind: its format id, name, and payload fields.
#[derive(Debug, Clone)]
pub struct EventFormat {
    id: u16,
    name: String,
    fields: Vec<FormatField>,
}

impl EventFormat {
    pub fn new(id: u16, name: impl Into<String>, fields: Vec<FormatField>) -> Self {
        EventFormat {
            id,
            name: name.into(),
            fields,
        }
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Extract all fields from a payload, in format-declared order.
    pub fn parse_payload(&self, payload: &[u8]) -> Result<Vec<(String, FieldValue)>> {
        let mut values = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            values.push((field.name.clone(), field.extract(payload)?));
        }
        Ok(values)
    }
}

/// Format-id → event format lookup, built from the trace header's format
/// descriptions by the external header parser.
#[derive(Debug, Clone, Default)]
pub struct EventRegistry {
    formats: HashMap<u16, EventFormat>,
}

impl EventRegistry {
    pub fn new() -> Self {
        EventRegistry::default()
    }

    pub fn register(&mut self, format: EventFormat) {
        self.formats.insert(format.id(), format);
    }

    pub fn format_by_id(&self, id: u16) -> Option<&EventFormat> {
        self.formats.get(&id)
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_field__integer_sizes__then_correct_values() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&0xfeu8.to_le_bytes());
        payload.extend_from_slice(&(-2i16).to_le_bytes());
        payload.extend_from_slice(&0xdead_beefu32.to_le_bytes());
        payload.extend_from_slice(&(-5i64).to_le_bytes());

        let byte = FormatField::integer("byte", 0, 1, false);
        let short = FormatField::integer("short", 1, 2, true);
        let word = FormatField::integer("word", 3, 4, false);
        let long = FormatField::integer("long", 7, 8, true);

        assert_eq!(byte.extract(&payload).unwrap(), FieldValue::UInt(0xfe));
        assert_eq!(short.extract(&payload).unwrap(), FieldValue::Int(-2));
        assert_eq!(word.extract(&payload).unwrap(), FieldValue::UInt(0xdead_beef));
        assert_eq!(long.extract(&payload).unwrap(), FieldValue::Int(-5));
    }

    #[test]
    fn test_format_field__char_array__then_nul_terminated() {
        let payload = *b"swapper/0\0\0\0\0\0\0\0";
        let field = FormatField::char_array("comm", 0, 16);
        assert_eq!(
            field.extract(&payload).unwrap(),
            FieldValue::Str("swapper/0".to_string())
        );
    }

    #[test]
    fn test_format_field__out_of_bounds__then_error() {
        let field = FormatField::integer("pid", 4, 4, true);
        let result = field.extract(&[0u8; 6]);
        assert!(matches!(result, Err(TraceError::FieldOutOfBounds { .. })));
    }

    #[test]
    fn test_format_field__unsupported_size__then_error() {
        let field = FormatField::integer("odd", 0, 3, false);
        let result = field.extract(&[0u8; 8]);
        assert!(matches!(
            result,
            Err(TraceError::UnsupportedFieldSize { size: 3, .. })
        ));
    }

    #[test]
    fn test_registry__lookup_by_id__then_found() {
        let mut registry = EventRegistry::new();
        registry.register(EventFormat::new(5, "cpu_idle", Vec::new()));
        assert_eq!(registry.format_by_id(5).map(EventFormat::name), Some("cpu_idle"));
        assert!(registry.format_by_id(6).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_payload_format_id__short_payload__then_none() {
        assert_eq!(payload_format_id(&[1]), None);
        assert_eq!(payload_format_id(&[0x2a, 0x00, 0xff]), Some(42));
    }
}
