//! Typed event log shared by firmware and host targets.
//!
//! Every externally visible action of the coordinator (pilot changes,
//! relay actuations, state transitions, fault events) is recorded into a
//! fixed-size ring. Hosts drain the ring into transcripts; firmware can
//! forward it over a diagnostics channel. The ring is the core's entire
//! logging surface, so nothing here formats strings.

use core::fmt;

use heapless::HistoryBuf;

use crate::clock::Millis;
use crate::pilot::PilotLevel;
use crate::port::{PortId, PortState};
use crate::status::ErrorKind;

/// Identifier attached to each recorded event.
pub type EventId = u32;

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 64;

/// Discriminated coordinator events.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TelemetryEventKind {
    PilotChanged(PortId),
    RelayClosed(PortId),
    RelayOpened(PortId),
    StateChanged(PortId),
    CurrentSampled(PortId),
    OfferSwapped(PortId),
    GfiTripped,
    GfiCleared,
    Paused,
    Unpaused,
    FatalLatched,
    Custom(u16),
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::PilotChanged(port) => write!(f, "pilot-changed {port}"),
            TelemetryEventKind::RelayClosed(port) => write!(f, "relay-closed {port}"),
            TelemetryEventKind::RelayOpened(port) => write!(f, "relay-opened {port}"),
            TelemetryEventKind::StateChanged(port) => write!(f, "state-changed {port}"),
            TelemetryEventKind::CurrentSampled(port) => write!(f, "current {port}"),
            TelemetryEventKind::OfferSwapped(port) => write!(f, "offer-swapped {port}"),
            TelemetryEventKind::GfiTripped => f.write_str("gfi-tripped"),
            TelemetryEventKind::GfiCleared => f.write_str("gfi-cleared"),
            TelemetryEventKind::Paused => f.write_str("paused"),
            TelemetryEventKind::Unpaused => f.write_str("unpaused"),
            TelemetryEventKind::FatalLatched => f.write_str("fatal-latched"),
            TelemetryEventKind::Custom(code) => write!(f, "custom({code})"),
        }
    }
}

impl TelemetryEventKind {
    const PILOT_CHANGED_BASE: u16 = 0x0000;
    const RELAY_CLOSED_BASE: u16 = 0x0002;
    const RELAY_OPENED_BASE: u16 = 0x0004;
    const STATE_CHANGED_BASE: u16 = 0x0006;
    const CURRENT_SAMPLED_BASE: u16 = 0x0008;
    const OFFER_SWAPPED_BASE: u16 = 0x000A;
    const GFI_TRIPPED_CODE: u16 = 0x0010;
    const GFI_CLEARED_CODE: u16 = 0x0011;
    const PAUSED_CODE: u16 = 0x0012;
    const UNPAUSED_CODE: u16 = 0x0013;
    const FATAL_LATCHED_CODE: u16 = 0x0014;

    /// Encodes the event into a compact transport-friendly discriminant.
    #[must_use]
    pub const fn to_raw(self) -> u16 {
        match self {
            TelemetryEventKind::PilotChanged(port) => Self::PILOT_CHANGED_BASE + port_index(port),
            TelemetryEventKind::RelayClosed(port) => Self::RELAY_CLOSED_BASE + port_index(port),
            TelemetryEventKind::RelayOpened(port) => Self::RELAY_OPENED_BASE + port_index(port),
            TelemetryEventKind::StateChanged(port) => Self::STATE_CHANGED_BASE + port_index(port),
            TelemetryEventKind::CurrentSampled(port) => {
                Self::CURRENT_SAMPLED_BASE + port_index(port)
            }
            TelemetryEventKind::OfferSwapped(port) => Self::OFFER_SWAPPED_BASE + port_index(port),
            TelemetryEventKind::GfiTripped => Self::GFI_TRIPPED_CODE,
            TelemetryEventKind::GfiCleared => Self::GFI_CLEARED_CODE,
            TelemetryEventKind::Paused => Self::PAUSED_CODE,
            TelemetryEventKind::Unpaused => Self::UNPAUSED_CODE,
            TelemetryEventKind::FatalLatched => Self::FATAL_LATCHED_CODE,
            TelemetryEventKind::Custom(code) => code,
        }
    }

    /// Decodes a raw discriminant, falling back to [`Custom`].
    ///
    /// [`Custom`]: TelemetryEventKind::Custom
    #[must_use]
    pub fn from_raw(code: u16) -> Self {
        match code {
            Self::GFI_TRIPPED_CODE => TelemetryEventKind::GfiTripped,
            Self::GFI_CLEARED_CODE => TelemetryEventKind::GfiCleared,
            Self::PAUSED_CODE => TelemetryEventKind::Paused,
            Self::UNPAUSED_CODE => TelemetryEventKind::Unpaused,
            Self::FATAL_LATCHED_CODE => TelemetryEventKind::FatalLatched,
            value if (Self::PILOT_CHANGED_BASE..Self::RELAY_CLOSED_BASE).contains(&value) => {
                let offset = value - Self::PILOT_CHANGED_BASE;
                port_from_index(offset).map_or(TelemetryEventKind::Custom(value), |port| {
                    TelemetryEventKind::PilotChanged(port)
                })
            }
            value if (Self::RELAY_CLOSED_BASE..Self::RELAY_OPENED_BASE).contains(&value) => {
                let offset = value - Self::RELAY_CLOSED_BASE;
                port_from_index(offset).map_or(TelemetryEventKind::Custom(value), |port| {
                    TelemetryEventKind::RelayClosed(port)
                })
            }
            value if (Self::RELAY_OPENED_BASE..Self::STATE_CHANGED_BASE).contains(&value) => {
                let offset = value - Self::RELAY_OPENED_BASE;
                port_from_index(offset).map_or(TelemetryEventKind::Custom(value), |port| {
                    TelemetryEventKind::RelayOpened(port)
                })
            }
            value if (Self::STATE_CHANGED_BASE..Self::CURRENT_SAMPLED_BASE).contains(&value) => {
                let offset = value - Self::STATE_CHANGED_BASE;
                port_from_index(offset).map_or(TelemetryEventKind::Custom(value), |port| {
                    TelemetryEventKind::StateChanged(port)
                })
            }
            value if (Self::CURRENT_SAMPLED_BASE..Self::OFFER_SWAPPED_BASE).contains(&value) => {
                let offset = value - Self::CURRENT_SAMPLED_BASE;
                port_from_index(offset).map_or(TelemetryEventKind::Custom(value), |port| {
                    TelemetryEventKind::CurrentSampled(port)
                })
            }
            value
                if (Self::OFFER_SWAPPED_BASE..Self::OFFER_SWAPPED_BASE + 2).contains(&value) =>
            {
                let offset = value - Self::OFFER_SWAPPED_BASE;
                port_from_index(offset).map_or(TelemetryEventKind::Custom(value), |port| {
                    TelemetryEventKind::OfferSwapped(port)
                })
            }
            other => TelemetryEventKind::Custom(other),
        }
    }
}

const fn port_index(port: PortId) -> u16 {
    match port {
        PortId::A => 0,
        PortId::B => 1,
    }
}

fn port_from_index(index: u16) -> Option<PortId> {
    match index {
        0 => Some(PortId::A),
        1 => Some(PortId::B),
        _ => None,
    }
}

/// Extra metadata carried alongside an event.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum TelemetryPayload {
    None,
    Pilot(PilotLevel, u32),
    State(PortState),
    Milliamps(u32),
    Error(ErrorKind),
}

/// One ring entry.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TelemetryRecord {
    pub id: EventId,
    pub at: Millis,
    pub event: TelemetryEventKind,
    pub details: TelemetryPayload,
}

/// Records coordinator events into a bounded ring buffer.
pub struct TelemetryRecorder<const CAPACITY: usize = TELEMETRY_RING_CAPACITY> {
    ring: HistoryBuf<TelemetryRecord, CAPACITY>,
    next_event_id: EventId,
}

impl<const CAPACITY: usize> TelemetryRecorder<CAPACITY> {
    pub const fn new() -> Self {
        TelemetryRecorder {
            ring: HistoryBuf::new(),
            next_event_id: 0,
        }
    }

    /// Appends an event, overwriting the oldest entry when full.
    pub fn record(
        &mut self,
        event: TelemetryEventKind,
        details: TelemetryPayload,
        at: Millis,
    ) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);
        self.ring.write(TelemetryRecord {
            id,
            at,
            event,
            details,
        });
        id
    }

    /// Returns the most recent record, if any.
    pub fn latest(&self) -> Option<&TelemetryRecord> {
        self.ring.recent()
    }

    /// Iterates records in chronological order.
    pub fn oldest_first(&self) -> impl Iterator<Item = &TelemetryRecord> {
        self.ring.oldest_ordered()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn clear(&mut self) {
        self.ring.clear();
    }
}

impl<const CAPACITY: usize> Default for TelemetryRecorder<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_sequenced_and_ordered() {
        let mut recorder = TelemetryRecorder::<8>::new();
        let id0 = recorder.record(
            TelemetryEventKind::RelayClosed(PortId::A),
            TelemetryPayload::None,
            Millis::new(100),
        );
        let id1 = recorder.record(
            TelemetryEventKind::RelayOpened(PortId::A),
            TelemetryPayload::None,
            Millis::new(250),
        );
        assert_eq!((id0, id1), (0, 1));

        let order: std::vec::Vec<EventId> = recorder.oldest_first().map(|r| r.id).collect();
        assert_eq!(order, [0, 1]);
        assert_eq!(
            recorder.latest().unwrap().event,
            TelemetryEventKind::RelayOpened(PortId::A)
        );
    }

    #[test]
    fn event_codes_round_trip() {
        let fixtures = [
            TelemetryEventKind::PilotChanged(PortId::A),
            TelemetryEventKind::PilotChanged(PortId::B),
            TelemetryEventKind::RelayClosed(PortId::A),
            TelemetryEventKind::RelayClosed(PortId::B),
            TelemetryEventKind::RelayOpened(PortId::A),
            TelemetryEventKind::RelayOpened(PortId::B),
            TelemetryEventKind::StateChanged(PortId::A),
            TelemetryEventKind::StateChanged(PortId::B),
            TelemetryEventKind::CurrentSampled(PortId::A),
            TelemetryEventKind::CurrentSampled(PortId::B),
            TelemetryEventKind::OfferSwapped(PortId::A),
            TelemetryEventKind::OfferSwapped(PortId::B),
            TelemetryEventKind::GfiTripped,
            TelemetryEventKind::GfiCleared,
            TelemetryEventKind::Paused,
            TelemetryEventKind::Unpaused,
            TelemetryEventKind::FatalLatched,
        ];

        for event in fixtures {
            assert_eq!(TelemetryEventKind::from_raw(event.to_raw()), event);
        }

        // Codes are distinct across the whole catalog.
        for (i, a) in fixtures.iter().enumerate() {
            for b in &fixtures[i + 1..] {
                assert_ne!(a.to_raw(), b.to_raw());
            }
        }
    }

    #[test]
    fn unknown_codes_decode_as_custom() {
        let decoded = TelemetryEventKind::from_raw(0x0300);
        assert_eq!(decoded, TelemetryEventKind::Custom(0x0300));
        assert_eq!(decoded.to_raw(), 0x0300);
    }

    #[test]
    fn ring_overwrites_oldest_when_full() {
        let mut recorder = TelemetryRecorder::<4>::new();
        for i in 0..6u32 {
            recorder.record(
                TelemetryEventKind::GfiTripped,
                TelemetryPayload::None,
                Millis::new(i),
            );
        }
        assert_eq!(recorder.len(), 4);
        let ids: std::vec::Vec<EventId> = recorder.oldest_first().map(|r| r.id).collect();
        assert_eq!(ids, [2, 3, 4, 5]);
    }
}
