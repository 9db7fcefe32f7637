//! Per-port charging lifecycle.
//!
//! Each port owns its pilot level, relay intent, debounced pilot reading,
//! and the deadlines attached to in-flight transitions. Cross-port policy
//! (who may advertise what) lives in the arbitrator; faults and timer
//! expiry are driven by the tick loop. The two ports are fixed entries of a
//! two-element array and reach each other by index only.

use core::fmt;

use crate::clock::Millis;
use crate::meter::{AMM_DISPLAY_HALF_PERIOD, EwaSum};
use crate::pilot::{PilotLevel, PilotRead};
use crate::relay::RelayState;
use crate::status::{DisplayStatus, ErrorKind};

/// How long a vehicle may draw past its allowance after a pilot reduction
/// before it is errored out, in ms. The standard gives the vehicle 5 s to
/// comply but also caps our own response times, so something has to give.
pub const OVERDRAW_GRACE_PERIOD: u32 = 4_000;

/// Slop on the enforced allowance, in milliamps.
pub const OVERDRAW_GRACE_AMPS: u32 = 1_000;

/// Time between withdrawing a pilot and opening its relay, in ms. The
/// standard requires at least 3 s.
pub const ERROR_DELAY: u32 = 3_000;

/// Longest a newly requesting port waits for the peer to drop to half power
/// before its relay may close, in ms. Must exceed [`OVERDRAW_GRACE_PERIOD`]
/// and stay under the standard's 5 s response bound.
pub const TRANSITION_DELAY: u32 = 4_500;

/// Consecutive identical sampling windows required to accept a new pilot
/// reading (two 20 ms windows, 40 ms worst case).
const DEBOUNCE_READS: u8 = 2;

/// Port identity. Car A is on the left of the display.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PortId {
    A,
    B,
}

impl PortId {
    pub const fn as_index(self) -> usize {
        match self {
            PortId::A => 0,
            PortId::B => 1,
        }
    }

    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(PortId::A),
            1 => Some(PortId::B),
            _ => None,
        }
    }

    pub const fn peer(self) -> Self {
        match self {
            PortId::A => PortId::B,
            PortId::B => PortId::A,
        }
    }

    pub const fn letter(self) -> char {
        match self {
            PortId::A => 'A',
            PortId::B => 'B',
        }
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Lifecycle states. J1772 names in parens where they differ.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PortState {
    /// No vehicle (J A).
    Unplugged,
    /// Vehicle connected, not offered current (J B1).
    Plugged,
    /// Current on offer, vehicle not yet requesting (J B2).
    Offered,
    /// Debounced B→C/D read this tick, not yet resolved by policy.
    Requesting,
    /// Relay closed, vehicle drawing (J C/D).
    Charging,
    /// Waiting for the peer to drop to half power before our relay closes.
    Transition,
    /// Sequential mode only: finished charging, sticky until replug.
    Done,
    /// Terminal until cleared by unplug, GFI timeout, or power cycle.
    Error(ErrorKind),
}

impl PortState {
    /// A vehicle is on the cable and participates in allocation. Errored
    /// ports count as absent so the peer can reclaim the full allocation.
    pub const fn vehicle_present(self) -> bool {
        matches!(
            self,
            PortState::Plugged
                | PortState::Offered
                | PortState::Requesting
                | PortState::Charging
                | PortState::Transition
                | PortState::Done
        )
    }

    pub const fn is_charging(self) -> bool {
        matches!(self, PortState::Charging)
    }

    pub const fn is_error(self) -> bool {
        matches!(self, PortState::Error(_))
    }

    pub const fn error_kind(self) -> Option<ErrorKind> {
        match self {
            PortState::Error(kind) => Some(kind),
            _ => None,
        }
    }

    pub const fn display(self) -> DisplayStatus {
        match self {
            PortState::Unplugged => DisplayStatus::Unplugged,
            PortState::Plugged | PortState::Offered => DisplayStatus::Off,
            PortState::Requesting | PortState::Transition => DisplayStatus::Wait,
            PortState::Charging => DisplayStatus::On,
            PortState::Done => DisplayStatus::Done,
            PortState::Error(_) => DisplayStatus::Err,
        }
    }
}

/// Two-sample debouncer for classified pilot windows.
#[derive(Copy, Clone, Debug, Default)]
struct ReadDebounce {
    candidate: PilotRead,
    seen: u8,
}

impl ReadDebounce {
    /// Feeds one window classification; returns a newly accepted reading.
    fn observe(&mut self, raw: PilotRead, stable: PilotRead) -> Option<PilotRead> {
        if raw == stable {
            self.candidate = raw;
            self.seen = 0;
            return None;
        }
        if raw == self.candidate {
            self.seen = self.seen.saturating_add(1);
        } else {
            self.candidate = raw;
            self.seen = 1;
        }
        if self.seen >= DEBOUNCE_READS {
            self.seen = 0;
            Some(raw)
        } else {
            None
        }
    }
}

/// All state owned by one charging port.
pub struct Port {
    pub id: PortId,
    pub state: PortState,
    pub pilot_level: PilotLevel,
    /// Currently advertised current in milliamps (0 while not advertising).
    pub advertised_ma: u32,
    pub relay: RelayState,
    /// Most recent debounced pilot reading.
    pub last_read: PilotRead,
    debounce: ReadDebounce,
    /// Set on the most recent B→C transition.
    pub request_time: Option<Millis>,
    /// Set when an error reply began; anchors the pilot-withdrawal delay.
    pub error_time: Option<Millis>,
    /// Deferred relay-open deadline during a teardown.
    pub relay_open_at: Option<Millis>,
    /// Deadline for the peer to halve while we sit in `Transition`.
    pub transition_deadline: Option<Millis>,
    /// When draw first exceeded the allowance; `None` while within.
    pub overdraw_begin: Option<Millis>,
    /// Sequential mode: finished, don't re-offer until replug.
    pub seq_done: bool,
    /// Raw RMS measurement from the latest closed-relay tick.
    pub last_drawn_ma: Option<u32>,
    /// Last time this port's draw was recorded to telemetry.
    pub last_current_log: Option<Millis>,
    /// Display-only rolling average of the measured current.
    pub ammeter: EwaSum,
}

impl Port {
    pub fn new(id: PortId) -> Self {
        Port {
            id,
            state: PortState::Unplugged,
            pilot_level: PilotLevel::Off,
            advertised_ma: 0,
            relay: RelayState::new(),
            last_read: PilotRead::Unknown,
            debounce: ReadDebounce::default(),
            request_time: None,
            error_time: None,
            relay_open_at: None,
            transition_deadline: None,
            overdraw_begin: None,
            seq_done: false,
            last_drawn_ma: None,
            last_current_log: None,
            ammeter: EwaSum::new(AMM_DISPLAY_HALF_PERIOD),
        }
    }

    /// Feeds one raw window classification through the debouncer. On
    /// acceptance, updates `last_read` and returns the new reading.
    pub fn observe(&mut self, raw: PilotRead) -> Option<PilotRead> {
        let accepted = self.debounce.observe(raw, self.last_read)?;
        self.last_read = accepted;
        Some(accepted)
    }

    /// Starts the pilot-then-relay error teardown.
    ///
    /// The pilot withdrawal is applied on this same tick; a closed relay
    /// stays in until [`ERROR_DELAY`] has passed so the vehicle can stop
    /// drawing first.
    pub fn begin_error(&mut self, kind: ErrorKind, now: Millis) {
        self.state = PortState::Error(kind);
        self.error_time = Some(now);
        self.relay_open_at = if self.relay.is_closed() {
            Some(now + ERROR_DELAY)
        } else {
            None
        };
        self.request_time = None;
        self.transition_deadline = None;
        self.overdraw_begin = None;
    }

    /// Clears everything back to the boot state after an unplug (or a GFI
    /// hold expiry).
    pub fn reset_to_unplugged(&mut self) {
        self.state = PortState::Unplugged;
        self.seq_done = false;
        self.request_time = None;
        self.error_time = None;
        self.relay_open_at = None;
        self.transition_deadline = None;
        self.overdraw_begin = None;
        self.last_drawn_ma = None;
        self.last_current_log = None;
        self.ammeter.reset();
    }

    /// Tracks a raw current measurement against the advertised allowance.
    /// Returns `true` once the overdraw has outlived its grace window.
    pub fn note_draw(&mut self, drawn_ma: u32, now: Millis) -> bool {
        self.last_drawn_ma = Some(drawn_ma);
        if drawn_ma > self.advertised_ma + OVERDRAW_GRACE_AMPS {
            match self.overdraw_begin {
                None => {
                    self.overdraw_begin = Some(now);
                    false
                }
                Some(begin) => now.since(begin) > OVERDRAW_GRACE_PERIOD,
            }
        } else {
            self.overdraw_begin = None;
            false
        }
    }
}
