// Decoded trace event values

use std::fmt;

/// Sentinel timestamp for "before any event" positions (the trace big bang).
pub const BIG_BANG_TIMESTAMP: u64 = 0;

/// A single decoded field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    UInt(u64),
    Int(i64),
    Str(String),
}

impl FieldValue {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            FieldValue::UInt(value) => Some(*value),
            FieldValue::Int(value) => u64::try_from(*value).ok(),
            FieldValue::Str(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::UInt(value) => i64::try_from(*value).ok(),
            FieldValue::Int(value) => Some(*value),
            FieldValue::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::UInt(value) => write!(f, "{value}"),
            FieldValue::Int(value) => write!(f, "{value}"),
            FieldValue::Str(value) => write!(f, "{value}"),
        }
    }
}

/// One decoded event record. Immutable once decoded; cursors hand out clones
/// so consumers are not tied to cursor lifetimes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    timestamp: u64,
    name: String,
    cpu: u32,
    fields: Vec<(String, FieldValue)>,
}

impl TraceEvent {
    pub fn new(
        timestamp: u64,
        name: impl Into<String>,
        cpu: u32,
        fields: Vec<(String, FieldValue)>,
    ) -> Self {
        TraceEvent {
            timestamp,
            name: name.into(),
            cpu,
            fields,
        }
    }

    /// Nanoseconds since the trace epoch.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The CPU whose section this event was decoded from.
    pub fn cpu(&self) -> u32 {
        self.cpu
    }

    /// Fields in format-declared order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}
