//! Fault taxonomy and the packed display status word.
//!
//! Internally a port's status is the tagged record [`PortStatus`]; the
//! 16-bit word layout expected by the display sink is produced only at the
//! boundary via [`PortStatus::pack`]:
//!
//! - bits 0–1: port selector (0 = both, 1 = A, 2 = B)
//! - bit 2: tiebreak flag
//! - bits 3–5: mutually exclusive status
//! - bits 6–8: error subcode

use core::fmt;

use heapless::String;

use crate::port::PortId;

/// Enumerated fault conditions. The one-letter display code is derived by a
/// total function so adding a variant forces a code choice.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// GFI self-test failed at boot; fatal, no charging offered.
    SelfTestFailed,
    /// A port drew past its allowance beyond the grace window.
    Overdraw,
    /// Ground fault, either the GFI interrupt or the ground-continuity test.
    Ground,
    /// Vehicle failed to present its diode or held an invalid pilot state.
    PilotFault,
    /// Relay sense contradicted the commanded state past the grace window.
    RelayStuck,
    /// Vehicle requested ventilation (state D) on hardware without it.
    VentRequired,
}

impl ErrorKind {
    /// User-visible single-letter code.
    pub const fn code(self) -> char {
        match self {
            ErrorKind::SelfTestFailed => 'F',
            ErrorKind::Overdraw => 'O',
            ErrorKind::Ground => 'G',
            ErrorKind::PilotFault => 'T',
            ErrorKind::RelayStuck => 'R',
            ErrorKind::VentRequired => 'E',
        }
    }

    /// Numeric subcode packed into status word bits 6–8.
    pub const fn subcode(self) -> u16 {
        match self {
            ErrorKind::SelfTestFailed => 0,
            ErrorKind::Overdraw => 1,
            ErrorKind::Ground => 2,
            ErrorKind::PilotFault => 3,
            ErrorKind::RelayStuck => 4,
            ErrorKind::VentRequired => 5,
        }
    }

    /// Clears on an unplug observation, as opposed to requiring the GFI
    /// timer or a power cycle.
    pub const fn clears_on_unplug(self) -> bool {
        matches!(
            self,
            ErrorKind::Overdraw | ErrorKind::PilotFault | ErrorKind::VentRequired
        )
    }

    const fn from_subcode(code: u16) -> Option<Self> {
        match code {
            0 => Some(ErrorKind::SelfTestFailed),
            1 => Some(ErrorKind::Overdraw),
            2 => Some(ErrorKind::Ground),
            3 => Some(ErrorKind::PilotFault),
            4 => Some(ErrorKind::RelayStuck),
            5 => Some(ErrorKind::VentRequired),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Mutually exclusive display statuses, packed into bits 3–5.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DisplayStatus {
    Unplugged,
    Off,
    On,
    Wait,
    Done,
    Err,
}

impl DisplayStatus {
    const fn bits(self) -> u16 {
        match self {
            DisplayStatus::Unplugged => 0,
            DisplayStatus::Off => 1,
            DisplayStatus::On => 2,
            DisplayStatus::Wait => 3,
            DisplayStatus::Done => 4,
            DisplayStatus::Err => 5,
        }
    }

    const fn from_bits(bits: u16) -> Option<Self> {
        match bits {
            0 => Some(DisplayStatus::Unplugged),
            1 => Some(DisplayStatus::Off),
            2 => Some(DisplayStatus::On),
            3 => Some(DisplayStatus::Wait),
            4 => Some(DisplayStatus::Done),
            5 => Some(DisplayStatus::Err),
            _ => None,
        }
    }
}

/// Which port(s) a status word addresses.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StatusScope {
    Both,
    Port(PortId),
}

impl StatusScope {
    const fn bits(self) -> u16 {
        match self {
            StatusScope::Both => 0,
            StatusScope::Port(PortId::A) => 1,
            StatusScope::Port(PortId::B) => 2,
        }
    }
}

/// One port's status at the core/display boundary.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PortStatus {
    pub scope: StatusScope,
    pub status: DisplayStatus,
    pub error: Option<ErrorKind>,
    pub tiebreak: bool,
}

impl PortStatus {
    /// Packs into the display word layout.
    pub const fn pack(self) -> u16 {
        let mut word = self.scope.bits();
        if self.tiebreak {
            word |= 1 << 2;
        }
        word |= self.status.bits() << 3;
        if let Some(error) = self.error {
            word |= error.subcode() << 6;
        }
        word
    }

    /// Decodes a packed word; `None` on a reserved status value.
    pub fn unpack(word: u16) -> Option<Self> {
        let scope = match word & 0x3 {
            0 => StatusScope::Both,
            1 => StatusScope::Port(PortId::A),
            2 => StatusScope::Port(PortId::B),
            _ => return None,
        };
        let status = DisplayStatus::from_bits((word >> 3) & 0x7)?;
        let error = if matches!(status, DisplayStatus::Err) {
            Some(ErrorKind::from_subcode((word >> 6) & 0x7)?)
        } else {
            None
        };
        Some(PortStatus {
            scope,
            status,
            error,
            tiebreak: word & (1 << 2) != 0,
        })
    }
}

/// Formats milliamps as `"12.3A"` for the display.
pub fn format_milliamps(milliamps: u32) -> String<8> {
    let mut out = String::new();
    let amps = milliamps / 1_000;
    let tenths = (milliamps % 1_000) / 100;
    let _ = core::fmt::write(&mut out, format_args!("{amps}.{tenths}A"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_places_fields_in_documented_bits() {
        let word = PortStatus {
            scope: StatusScope::Port(PortId::B),
            status: DisplayStatus::Err,
            error: Some(ErrorKind::RelayStuck),
            tiebreak: true,
        }
        .pack();

        assert_eq!(word & 0x3, 2);
        assert_eq!(word & (1 << 2), 1 << 2);
        assert_eq!((word >> 3) & 0x7, 5);
        assert_eq!((word >> 6) & 0x7, 4);
    }

    #[test]
    fn pack_unpack_round_trips() {
        let all_status = [
            DisplayStatus::Unplugged,
            DisplayStatus::Off,
            DisplayStatus::On,
            DisplayStatus::Wait,
            DisplayStatus::Done,
        ];
        for status in all_status {
            let original = PortStatus {
                scope: StatusScope::Port(PortId::A),
                status,
                error: None,
                tiebreak: false,
            };
            assert_eq!(PortStatus::unpack(original.pack()), Some(original));
        }

        let errored = PortStatus {
            scope: StatusScope::Both,
            status: DisplayStatus::Err,
            error: Some(ErrorKind::Ground),
            tiebreak: false,
        };
        assert_eq!(PortStatus::unpack(errored.pack()), Some(errored));
    }

    #[test]
    fn every_error_kind_has_a_distinct_code() {
        let kinds = [
            ErrorKind::SelfTestFailed,
            ErrorKind::Overdraw,
            ErrorKind::Ground,
            ErrorKind::PilotFault,
            ErrorKind::RelayStuck,
            ErrorKind::VentRequired,
        ];
        for (i, a) in kinds.iter().enumerate() {
            for b in &kinds[i + 1..] {
                assert_ne!(a.code(), b.code());
                assert_ne!(a.subcode(), b.subcode());
            }
        }
    }

    #[test]
    fn milliamp_formatting_truncates_to_tenths() {
        assert_eq!(format_milliamps(12_345).as_str(), "12.3A");
        assert_eq!(format_milliamps(900).as_str(), "0.9A");
        assert_eq!(format_milliamps(0).as_str(), "0.0A");
    }
}
