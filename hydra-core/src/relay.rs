//! Contactor intent tracking and the post-change consistency test.
//!
//! The sense line must read "AC present" exactly when the relay is
//! commanded closed. Contactors bounce, so mismatches are suppressed for a
//! grace period after every commanded change; a mismatch that survives the
//! grace is a wiring-level fault.

use crate::clock::Millis;
use crate::status::ErrorKind;

/// How long after a relay change test failures are suppressed, in ms.
pub const RELAY_TEST_GRACE_TIME: u32 = 500;

/// How the relay sense line is wired on this build.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum RelayCheckMode {
    /// Sense only proves the contactor position.
    #[default]
    RelayOnly,
    /// Sense runs through the ground path, so a closed-but-dead reading
    /// also indicates lost ground continuity.
    RelayTestsGround,
}

/// Commanded relay position plus the grace bookkeeping.
#[derive(Copy, Clone, Debug, Default)]
pub struct RelayState {
    closed: bool,
    changed_at: Option<Millis>,
}

impl RelayState {
    pub const fn new() -> Self {
        RelayState {
            closed: false,
            changed_at: None,
        }
    }

    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Records a commanded change; returns `false` when already in position.
    pub fn command(&mut self, closed: bool, now: Millis) -> bool {
        if self.closed == closed {
            return false;
        }
        self.closed = closed;
        self.changed_at = Some(now);
        true
    }

    /// Consistency test against the sense line.
    ///
    /// `None` while in grace or consistent. A closed relay without AC reads
    /// as a ground failure when the sense line doubles as the ground test;
    /// AC on an open relay is always welded contacts.
    pub fn check(&self, now: Millis, ac_sensed: bool, mode: RelayCheckMode) -> Option<ErrorKind> {
        if let Some(changed_at) = self.changed_at {
            if now.since(changed_at) < RELAY_TEST_GRACE_TIME {
                return None;
            }
        }

        match (self.closed, ac_sensed) {
            (true, false) => Some(match mode {
                RelayCheckMode::RelayTestsGround => ErrorKind::Ground,
                RelayCheckMode::RelayOnly => ErrorKind::RelayStuck,
            }),
            (false, true) => Some(ErrorKind::RelayStuck),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatch_is_suppressed_during_grace() {
        let mut relay = RelayState::new();
        let t0 = Millis::new(10_000);
        assert!(relay.command(true, t0));

        assert_eq!(relay.check(t0 + 499, false, RelayCheckMode::RelayOnly), None);
        assert_eq!(
            relay.check(t0 + 500, false, RelayCheckMode::RelayOnly),
            Some(ErrorKind::RelayStuck)
        );
    }

    #[test]
    fn redundant_commands_do_not_restart_grace() {
        let mut relay = RelayState::new();
        let t0 = Millis::new(0);
        relay.command(true, t0);
        assert!(!relay.command(true, t0 + 400));
        assert_eq!(
            relay.check(t0 + 600, false, RelayCheckMode::RelayOnly),
            Some(ErrorKind::RelayStuck)
        );
    }

    #[test]
    fn ground_variant_maps_dead_closed_relay_to_ground_fault() {
        let mut relay = RelayState::new();
        relay.command(true, Millis::ZERO);
        let now = Millis::new(1_000);
        assert_eq!(
            relay.check(now, false, RelayCheckMode::RelayTestsGround),
            Some(ErrorKind::Ground)
        );
        // Welded contacts are stuck-relay in both variants.
        relay.command(false, now);
        assert_eq!(
            relay.check(now + 1_000, true, RelayCheckMode::RelayTestsGround),
            Some(ErrorKind::RelayStuck)
        );
    }

    #[test]
    fn consistent_states_pass() {
        let mut relay = RelayState::new();
        let now = Millis::new(5_000);
        assert_eq!(relay.check(now, false, RelayCheckMode::RelayOnly), None);
        relay.command(true, Millis::ZERO);
        assert_eq!(relay.check(now, true, RelayCheckMode::RelayOnly), None);
    }
}
