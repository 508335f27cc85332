// Shared fixtures for unit tests: a small event format registry and a
// byte-level builder for ring-buffer pages.

use crate::format::{
    EventFormat, EventRegistry, FormatField, EXTEND_SHIFT, TIME_DELTA_SHIFT, TYPE_LEN_CUSTOM,
    TYPE_LEN_PADDING, TYPE_LEN_TIME_EXTEND, TYPE_LEN_TIME_STAMP,
};

pub(crate) const FMT_TIMER_ENTRY: u16 = 1;
pub(crate) const FMT_CPU_IDLE: u16 = 2;
pub(crate) const FMT_RCU_UTILIZATION: u16 = 3;
pub(crate) const FMT_SYS_ENTER_EVENTFD2: u16 = 4;
pub(crate) const FMT_CPU_FREQUENCY: u16 = 5;

pub(crate) fn test_registry() -> EventRegistry {
    let mut registry = EventRegistry::new();
    registry.register(EventFormat::new(
        FMT_TIMER_ENTRY,
        "local_timer_entry",
        vec![
            FormatField::integer("common_type", 0, 2, false),
            FormatField::integer("vector", 2, 4, false),
        ],
    ));
    registry.register(EventFormat::new(
        FMT_CPU_IDLE,
        "cpu_idle",
        vec![FormatField::integer("common_type", 0, 2, false)],
    ));
    registry.register(EventFormat::new(
        FMT_RCU_UTILIZATION,
        "rcu_utilization",
        vec![FormatField::integer("common_type", 0, 2, false)],
    ));
    registry.register(EventFormat::new(
        FMT_SYS_ENTER_EVENTFD2,
        "sys_enter_eventfd2",
        vec![
            FormatField::integer("common_type", 0, 2, false),
            FormatField::integer("count", 2, 8, true),
            FormatField::integer("flags", 10, 8, true),
        ],
    ));
    registry.register(EventFormat::new(
        FMT_CPU_FREQUENCY,
        "cpu_frequency",
        vec![
            FormatField::integer("common_type", 0, 2, false),
            FormatField::integer("state", 2, 4, false),
        ],
    ));
    registry
}

/// Builds the raw bytes of one ring-buffer page, record by record.
pub(crate) struct PageBuilder {
    bytes: Vec<u8>,
}

impl PageBuilder {
    pub(crate) fn new() -> Self {
        PageBuilder { bytes: Vec::new() }
    }

    fn push_u32(&mut self, word: u32) {
        self.bytes.extend_from_slice(&word.to_le_bytes());
    }

    /// A data record: common_type + extra payload bytes, padded to a whole
    /// number of 4-byte words.
    pub(crate) fn event(mut self, format_id: u16, delta: u32, extra: &[u8]) -> Self {
        let mut payload = Vec::with_capacity(2 + extra.len());
        payload.extend_from_slice(&format_id.to_le_bytes());
        payload.extend_from_slice(extra);
        while payload.len() % 4 != 0 {
            payload.push(0);
        }
        let words = (payload.len() / 4) as u32;
        assert!((1..=28).contains(&words), "payload too large for type_len");
        assert!(delta < (1 << 27), "delta exceeds 27 bits");
        self.push_u32((delta << TIME_DELTA_SHIFT) | words);
        self.bytes.extend_from_slice(&payload);
        self
    }

    /// A custom-length data record (type_len 0, explicit byte length).
    pub(crate) fn custom_event(mut self, delta: u32, payload: &[u8]) -> Self {
        assert!(delta > 0, "zero header + zero length reads as page fill");
        self.push_u32((delta << TIME_DELTA_SHIFT) | TYPE_LEN_CUSTOM);
        self.push_u32(payload.len() as u32);
        self.bytes.extend_from_slice(payload);
        self
    }

    /// A time-extend pseudo-record adding `amount` to the running timestamp.
    pub(crate) fn time_extend(mut self, amount: u64) -> Self {
        let delta = (amount & ((1 << EXTEND_SHIFT) - 1)) as u32;
        let upper = (amount >> EXTEND_SHIFT) as u32;
        self.push_u32((delta << TIME_DELTA_SHIFT) | TYPE_LEN_TIME_EXTEND);
        self.push_u32(upper);
        self
    }

    /// An absolute-timestamp pseudo-record rebasing the running timestamp.
    pub(crate) fn absolute_timestamp(mut self, timestamp: u64) -> Self {
        let delta = (timestamp & ((1 << EXTEND_SHIFT) - 1)) as u32;
        let upper = (timestamp >> EXTEND_SHIFT) as u32;
        self.push_u32((delta << TIME_DELTA_SHIFT) | TYPE_LEN_TIME_STAMP);
        self.push_u32(upper);
        self
    }

    /// A padding record skipping `skip` bytes.
    pub(crate) fn padding(mut self, skip: u32) -> Self {
        self.push_u32((1 << TIME_DELTA_SHIFT) | TYPE_LEN_PADDING);
        self.push_u32(skip);
        self.bytes.extend(std::iter::repeat(0u8).take(skip as usize));
        self
    }

    /// A padding record declaring the rest of the page as padding.
    pub(crate) fn padding_to_end(mut self) -> Self {
        self.push_u32(TYPE_LEN_PADDING);
        self
    }

    /// Raw bytes that decode as a malformed record (payload length past the
    /// end of the page).
    pub(crate) fn corrupt_tail(mut self) -> Self {
        self.push_u32((1 << TIME_DELTA_SHIFT) | 28);
        self.bytes.extend_from_slice(&[0u8; 8]);
        self
    }

    pub(crate) fn build(self) -> Vec<u8> {
        self.bytes
    }
}
