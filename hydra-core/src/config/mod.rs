//! Operating configuration and the persisted blob codec.
//!
//! The persistence layer stores an opaque fixed-layout blob guarded by a
//! format signature. Decoding never fails: a short buffer or a signature
//! mismatch yields the defaults wholesale, and individual out-of-range
//! fields are defaulted one by one, so a corrupted cell can never take the
//! unit out of service.

use crate::port::PortId;

/// Persistence format signature (tracks the on-blob layout revision).
pub const PERSIST_SIG: u16 = 2411;

/// Ampacity floor of the fixed wiring from distribution block to plug, in
/// milliamps. Never part of the UI; `max_amps` clamps to it.
pub const MAXIMUM_OUTLET_CURRENT: u32 = 30_000;

/// Number of scheduled event slots.
pub const EVENT_COUNT: usize = 4;

/// Ammeter calibration bound, in 0.1 A units.
pub const CALIB_AMM_MAX: i8 = 5;
/// Pilot derate bound, in percent (always applied as a negative derate).
pub const CALIB_PILOT_MAX: i8 = 10;

/// Encoded blob length in bytes.
pub const BLOB_LEN: usize = 28;

/// How incoming current is split between the two cables.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum OperatingMode {
    /// Both ports may charge at once, splitting the allocation.
    #[default]
    Shared,
    /// One port charges at a time; the pilot is offered around.
    Sequential,
}

/// What a scheduled event does when its minute arrives.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum EventKind {
    #[default]
    None,
    Pause,
    Unpause,
}

/// One scheduled pause/unpause slot.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ScheduledEvent {
    pub hour: u8,
    pub minute: u8,
    /// Day-of-week mask, bit 0 = Sunday.
    pub dow_mask: u8,
    pub kind: EventKind,
}

impl ScheduledEvent {
    /// Resets out-of-range fields to their defaults, one by one.
    pub fn validate(&mut self) {
        if self.hour > 23 {
            self.hour = 0;
        }
        if self.minute > 59 {
            self.minute = 0;
        }
        self.dow_mask &= 0x7f;
    }

    /// Whether this event fires at the given local hour/minute/day-of-week
    /// (0 = Sunday).
    pub fn matches(&self, hour: u8, minute: u8, dow: u8) -> bool {
        !matches!(self.kind, EventKind::None)
            && self.hour == hour
            && self.minute == minute
            && self.dow_mask & (1 << dow) != 0
    }
}

/// Per-port meter and pilot calibration.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Calibration {
    /// Ammeter offsets in 0.1 A units.
    pub amm_a: i8,
    pub amm_b: i8,
    /// Pilot derates in percent, −10…0.
    pub pilot_a: i8,
    pub pilot_b: i8,
}

impl Calibration {
    pub fn validate(&mut self) {
        if self.amm_a.unsigned_abs() > CALIB_AMM_MAX as u8 {
            self.amm_a = 0;
        }
        if self.amm_b.unsigned_abs() > CALIB_AMM_MAX as u8 {
            self.amm_b = 0;
        }
        if self.pilot_a > 0 || self.pilot_a < -CALIB_PILOT_MAX {
            self.pilot_a = 0;
        }
        if self.pilot_b > 0 || self.pilot_b < -CALIB_PILOT_MAX {
            self.pilot_b = 0;
        }
    }

    pub const fn amm_offset(&self, port: PortId) -> i8 {
        match port {
            PortId::A => self.amm_a,
            PortId::B => self.amm_b,
        }
    }

    pub const fn pilot_derate(&self, port: PortId) -> i8 {
        match port {
            PortId::A => self.pilot_a,
            PortId::B => self.pilot_b,
        }
    }
}

/// Everything the persistence layer round-trips.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Config {
    pub mode: OperatingMode,
    /// Whole-EVSE ceiling in milliamps, ≤ [`MAXIMUM_OUTLET_CURRENT`].
    pub max_amps_ma: u32,
    pub enable_dst: bool,
    pub events: [ScheduledEvent; EVENT_COUNT],
    pub calib: Calibration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mode: OperatingMode::Shared,
            max_amps_ma: MAXIMUM_OUTLET_CURRENT,
            enable_dst: false,
            events: [ScheduledEvent::default(); EVENT_COUNT],
            calib: Calibration::default(),
        }
    }
}

impl Config {
    /// Clamps and defaults every field into its legal range.
    pub fn validate(&mut self) {
        if self.max_amps_ma == 0 || self.max_amps_ma > MAXIMUM_OUTLET_CURRENT {
            self.max_amps_ma = MAXIMUM_OUTLET_CURRENT;
        }
        for event in &mut self.events {
            event.validate();
        }
        self.calib.validate();
    }

    /// Encodes into the persisted layout.
    pub fn encode(&self) -> [u8; BLOB_LEN] {
        let mut blob = [0u8; BLOB_LEN];
        blob[0..2].copy_from_slice(&PERSIST_SIG.to_le_bytes());
        blob[2] = match self.mode {
            OperatingMode::Shared => 0,
            OperatingMode::Sequential => 1,
        };
        blob[3..7].copy_from_slice(&self.max_amps_ma.to_le_bytes());
        blob[7] = self.enable_dst as u8;
        for (i, event) in self.events.iter().enumerate() {
            let at = 8 + i * 4;
            blob[at] = event.hour;
            blob[at + 1] = event.minute;
            blob[at + 2] = event.dow_mask;
            blob[at + 3] = match event.kind {
                EventKind::None => 0,
                EventKind::Pause => 1,
                EventKind::Unpause => 2,
            };
        }
        blob[24] = self.calib.amm_a as u8;
        blob[25] = self.calib.amm_b as u8;
        blob[26] = self.calib.pilot_a as u8;
        blob[27] = self.calib.pilot_b as u8;
        blob
    }

    /// Decodes a persisted blob, falling back to defaults on a short buffer
    /// or signature mismatch, then validating field by field.
    pub fn decode(blob: &[u8]) -> Self {
        if blob.len() < BLOB_LEN {
            return Config::default();
        }
        let sig = u16::from_le_bytes([blob[0], blob[1]]);
        if sig != PERSIST_SIG {
            return Config::default();
        }

        let mut events = [ScheduledEvent::default(); EVENT_COUNT];
        for (i, event) in events.iter_mut().enumerate() {
            let at = 8 + i * 4;
            *event = ScheduledEvent {
                hour: blob[at],
                minute: blob[at + 1],
                dow_mask: blob[at + 2],
                kind: match blob[at + 3] {
                    1 => EventKind::Pause,
                    2 => EventKind::Unpause,
                    _ => EventKind::None,
                },
            };
        }

        let mut config = Config {
            mode: if blob[2] == 1 {
                OperatingMode::Sequential
            } else {
                OperatingMode::Shared
            },
            max_amps_ma: u32::from_le_bytes([blob[3], blob[4], blob[5], blob[6]]),
            enable_dst: blob[7] != 0,
            events,
            calib: Calibration {
                amm_a: blob[24] as i8,
                amm_b: blob[25] as i8,
                pilot_a: blob[26] as i8,
                pilot_b: blob[27] as i8,
            },
        };
        config.validate();
        config
    }
}
