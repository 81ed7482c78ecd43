// Debug telemetry ring buffer. Real firmware overlays a packed struct
// directly onto a byte buffer for this; here the header and event layout
// are explicit serialize/deserialize functions instead.
//
// Only the buffer itself lives here. Routing events to USB-CDC/disk/crash
// store is out of scope - `Simulator::record_event` is the single entry
// point an embedder would wire that routing to.

pub const MAGIC: u32 = 0x5A50_4454; // "ZPDT"
pub const VERSION: u16 = 1;
pub const HEADER_LEN: usize = 32;
pub const EVENT_LEN: usize = 12;
pub const DEFAULT_CAPACITY: usize = 1360;

/// Event-type tag ranges, grouped by subsystem.
pub mod tag {
    pub const SYSTEM_BASE: u8 = 0x01;
    pub const AUDIO_BASE: u8 = 0x10;
    pub const STORAGE_BASE: u8 = 0x20;
    pub const DISPLAY_BASE: u8 = 0x30;
    pub const INPUT_BASE: u8 = 0x40;
    pub const POWER_BASE: u8 = 0x50;
    pub const ERROR_BASE: u8 = 0x60;
    pub const PERF_BASE: u8 = 0x70;
    pub const DEBUG_BASE: u8 = 0xf0;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub timestamp_ms: u32,
    pub event_type: u8,
    pub flags: u8,
    pub data: u16,
    pub extended: u32,
}

impl Event {
    pub fn new(timestamp_ms: u32, event_type: u8, flags: u8, data: u16, extended: u32) -> Self {
        Event { timestamp_ms, event_type, flags, data, extended }
    }

    fn write_to(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.timestamp_ms.to_le_bytes());
        out[4] = self.event_type;
        out[5] = self.flags;
        out[6..8].copy_from_slice(&self.data.to_le_bytes());
        out[8..12].copy_from_slice(&self.extended.to_le_bytes());
    }

    fn read_from(raw: &[u8]) -> Self {
        Event {
            timestamp_ms: u32::from_le_bytes(raw[0..4].try_into().unwrap()),
            event_type: raw[4],
            flags: raw[5],
            data: u16::from_le_bytes(raw[6..8].try_into().unwrap()),
            extended: u32::from_le_bytes(raw[8..12].try_into().unwrap()),
        }
    }
}

/// Fixed-capacity ring of telemetry events. Recording past capacity
/// overwrites the oldest entry; `total_events` keeps counting regardless.
pub struct TelemetryLog {
    capacity: usize,
    records: Vec<Event>,
    write_index: usize,
    occupancy: usize,
    total_events: u32,
    boot_count: u32,
}

impl TelemetryLog {
    pub fn new(capacity: usize) -> Self {
        TelemetryLog {
            capacity,
            records: vec![Event::new(0, 0, 0, 0, 0); capacity],
            write_index: 0,
            occupancy: 0,
            total_events: 0,
            boot_count: 0,
        }
    }

    pub fn note_boot(&mut self) {
        self.boot_count += 1;
    }

    pub fn record(&mut self, event: Event) {
        self.records[self.write_index] = event;
        self.write_index = (self.write_index + 1) % self.capacity;
        self.occupancy = (self.occupancy + 1).min(self.capacity);
        self.total_events += 1;
    }

    pub fn total_events(&self) -> u32 {
        self.total_events
    }

    pub fn occupancy(&self) -> usize {
        self.occupancy
    }

    pub fn boot_count(&self) -> u32 {
        self.boot_count
    }

    /// Iterates recorded events oldest-first.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        let start = if self.occupancy < self.capacity { 0 } else { self.write_index };
        (0..self.occupancy).map(move |i| &self.records[(start + i) % self.capacity])
    }

    fn event_array_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; self.occupancy * EVENT_LEN];
        for (i, event) in self.iter().enumerate() {
            event.write_to(&mut bytes[i * EVENT_LEN..(i + 1) * EVENT_LEN]);
        }
        bytes
    }

    fn checksum(event_bytes: &[u8]) -> u32 {
        event_bytes.iter().fold(0u32, |acc, &b| acc.wrapping_add(b as u32))
    }

    /// Serializes the 32-byte header followed by the event array, matching
    /// the persisted buffer external parsers read.
    pub fn to_bytes(&self) -> Vec<u8> {
        let event_bytes = self.event_array_bytes();
        let checksum = Self::checksum(&event_bytes);

        let mut out = Vec::with_capacity(HEADER_LEN + event_bytes.len());
        out.extend_from_slice(&MAGIC.to_le_bytes());
        out.extend_from_slice(&VERSION.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // flags
        out.extend_from_slice(&self.total_events.to_le_bytes());
        out.extend_from_slice(&(self.write_index as u32).to_le_bytes());
        out.extend_from_slice(&(self.occupancy as u32).to_le_bytes());
        out.extend_from_slice(&self.boot_count.to_le_bytes());
        out.extend_from_slice(&checksum.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes()); // reserved
        out.extend_from_slice(&event_bytes);
        out
    }

    /// Parses a buffer produced by `to_bytes`, validating magic and checksum.
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_LEN {
            return None;
        }
        let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        if magic != MAGIC {
            return None;
        }
        let total_events = u32::from_le_bytes(buf[8..12].try_into().unwrap());
        // write_index (bytes 12..16) isn't needed on the way back in: the
        // event array is already oldest-first, so it's replayed from slot 0.
        let occupancy = u32::from_le_bytes(buf[16..20].try_into().unwrap()) as usize;
        let boot_count = u32::from_le_bytes(buf[20..24].try_into().unwrap());
        let checksum = u32::from_le_bytes(buf[24..28].try_into().unwrap());

        let event_bytes = &buf[HEADER_LEN..];
        if event_bytes.len() < occupancy * EVENT_LEN {
            return None;
        }
        if Self::checksum(&event_bytes[..occupancy * EVENT_LEN]) != checksum {
            return None;
        }

        let capacity = occupancy.max(DEFAULT_CAPACITY);
        let mut log = TelemetryLog::new(capacity);
        log.total_events = total_events;
        log.occupancy = occupancy;
        log.boot_count = boot_count;
        // `event_bytes` is already oldest-first (that's what `to_bytes` wrote
        // via `iter()`), so replaying it from slot 0 reproduces the same
        // order regardless of what the original ring's capacity was.
        for (i, raw) in event_bytes[..occupancy * EVENT_LEN].chunks(EVENT_LEN).enumerate() {
            log.records[i] = Event::read_from(raw);
        }
        log.write_index = occupancy % capacity;
        Some(log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn under_capacity_iterates_in_insertion_order() {
        let mut log = TelemetryLog::new(4);
        for i in 0..3 {
            log.record(Event::new(i, tag::SYSTEM_BASE, 0, 0, 0));
        }
        let seen: Vec<u32> = log.iter().map(|e| e.timestamp_ms).collect();
        assert_eq!(seen, vec![0, 1, 2]);
        assert_eq!(log.total_events(), 3);
    }

    #[test]
    fn over_capacity_keeps_last_n_in_order() {
        let mut log = TelemetryLog::new(4);
        for i in 0..10u32 {
            log.record(Event::new(i, tag::SYSTEM_BASE, 0, 0, 0));
        }
        let seen: Vec<u32> = log.iter().map(|e| e.timestamp_ms).collect();
        assert_eq!(seen, vec![6, 7, 8, 9]);
        assert_eq!(log.total_events(), 10);
    }

    #[test]
    fn round_trips_through_bytes() {
        let mut log = TelemetryLog::new(4);
        log.note_boot();
        for i in 0..6u32 {
            log.record(Event::new(i, tag::STORAGE_BASE, 1, i as u16, i * 10));
        }
        let bytes = log.to_bytes();
        let restored = TelemetryLog::from_bytes(&bytes).expect("valid buffer");
        assert_eq!(restored.total_events(), 6);
        assert_eq!(restored.boot_count(), 1);
        let original: Vec<_> = log.iter().collect();
        let restored_events: Vec<_> = restored.iter().collect();
        assert_eq!(original.len(), restored_events.len());
        for (a, b) in original.iter().zip(restored_events.iter()) {
            assert_eq!(a.timestamp_ms, b.timestamp_ms);
            assert_eq!(a.extended, b.extended);
        }
    }

    #[test]
    fn rejects_bad_magic() {
        let buf = vec![0u8; HEADER_LEN];
        assert!(TelemetryLog::from_bytes(&buf).is_none());
    }
}
