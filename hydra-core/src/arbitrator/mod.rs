//! Per-tick current allocation across the two ports.
//!
//! [`allocate`] is a pure function from the port records plus the global
//! view to one output triple per port; running it twice over unchanged
//! inputs yields unchanged outputs. It never mutates state: resolving
//! requests, arming deadlines, and swapping offers are tick-loop actions
//! that feed back into the next allocation.

use crate::clock::{MILLIS_PER_MINUTE, Millis};
use crate::config::OperatingMode;
use crate::pilot::{MIN_PWM_MILLIAMPS, PilotLevel};
use crate::port::{ERROR_DELAY, Port, PortId, PortState};

/// Sequential mode: how long an unanswered offer sits on one port before it
/// is flipped to the other, in ms.
pub const SEQ_MODE_OFFER_TIMEOUT: u32 = 5 * MILLIS_PER_MINUTE;

/// Shared-mode quick-cycling workaround: how long to hold a departing
/// vehicle's slot before restoring the survivor to full power, in minutes.
pub const PILOT_RELEASE_HOLDOFF_MINUTES: u32 = 5;

/// Global inputs to one allocation pass.
#[derive(Copy, Clone, Debug)]
pub struct GlobalView {
    pub mode: OperatingMode,
    pub max_amps_ma: u32,
    pub paused: bool,
    /// Sequential mode: the port currently holding the offer.
    pub seq_offer: PortId,
    /// Shared mode: suppress restore-to-full per port until these instants
    /// (quick-cycling workaround).
    pub restore_full_at: [Option<Millis>; 2],
}

/// Desired pilot and relay outputs for one port.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PortCommand {
    pub level: PilotLevel,
    pub milliamps: u32,
    pub relay_closed: bool,
}

impl PortCommand {
    const fn standby() -> Self {
        PortCommand {
            level: PilotLevel::Standby,
            milliamps: 0,
            relay_closed: false,
        }
    }
}

/// Computes both ports' pilot and relay outputs.
pub fn allocate(ports: &[Port; 2], view: &GlobalView, now: Millis) -> [PortCommand; 2] {
    [
        allocate_port(&ports[0], &ports[1], 0, view, now),
        allocate_port(&ports[1], &ports[0], 1, view, now),
    ]
}

fn allocate_port(
    port: &Port,
    peer: &Port,
    index: usize,
    view: &GlobalView,
    now: Millis,
) -> PortCommand {
    if let PortState::Error(kind) = port.state {
        // Pilot withdrawn at once; a closed relay holds until the deferred
        // open deadline so the vehicle can stop drawing first. Once the
        // teardown is over, recoverable faults go back to standby so the
        // unplug that clears them can be observed.
        let relay_closed = relay_held_for_teardown(port, now);
        let teardown_over = port
            .error_time
            .map(|began| now.reached(began + ERROR_DELAY))
            .unwrap_or(true);
        let level = if kind.clears_on_unplug() && teardown_over && !relay_closed {
            PilotLevel::Standby
        } else {
            PilotLevel::Off
        };
        return PortCommand {
            level,
            milliamps: 0,
            relay_closed,
        };
    }

    if view.paused {
        // Vehicles see an idle EVSE; sessions resume on unpause.
        return PortCommand {
            relay_closed: relay_held_for_teardown(port, now),
            ..PortCommand::standby()
        };
    }

    if !port.state.vehicle_present() {
        return PortCommand::standby();
    }

    match view.mode {
        OperatingMode::Shared => shared_command(port, peer, index, view, now),
        OperatingMode::Sequential => sequential_command(port, peer, view),
    }
}

/// A present vehicle either claims a share of the allocation or has
/// finished its session and is only kept warm for a possible resume.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum SharedClass {
    Active,
    Finished,
}

fn shared_class(port: &Port) -> SharedClass {
    if port.state == PortState::Done {
        SharedClass::Finished
    } else {
        SharedClass::Active
    }
}

fn holdoff_pending(slot: Option<Millis>, now: Millis) -> bool {
    slot.map(|until| !now.reached(until)).unwrap_or(false)
}

fn shared_command(
    port: &Port,
    peer: &Port,
    index: usize,
    view: &GlobalView,
    now: Millis,
) -> PortCommand {
    let max = view.max_amps_ma;
    let half = max / 2;
    let my_holdoff = holdoff_pending(view.restore_full_at[index], now);
    let peer_holdoff = holdoff_pending(view.restore_full_at[1 - index], now);

    let (level, milliamps) = if !peer.state.vehicle_present() {
        if my_holdoff {
            (PilotLevel::Half, half)
        } else {
            (PilotLevel::Full, max)
        }
    } else {
        match (shared_class(port), shared_class(peer)) {
            (SharedClass::Active, SharedClass::Active) => {
                if half >= MIN_PWM_MILLIAMPS {
                    (PilotLevel::Half, half)
                } else {
                    // The split would fall under the J1772 floor; only one
                    // port can be served. Priority goes to the port already
                    // drawing, then to A.
                    let priority = if port.relay.is_closed() != peer.relay.is_closed() {
                        port.relay.is_closed()
                    } else {
                        index == 0
                    };
                    if priority {
                        (PilotLevel::Full, max)
                    } else {
                        return PortCommand::standby();
                    }
                }
            }
            // A finished peer stops claiming its share once the
            // quick-cycling holdoff has lapsed.
            (SharedClass::Active, SharedClass::Finished) => {
                if my_holdoff {
                    (PilotLevel::Half, half)
                } else {
                    (PilotLevel::Full, max)
                }
            }
            // A finished port keeps a half offer only while the survivor's
            // holdoff leaves room for it.
            (SharedClass::Finished, SharedClass::Active) => {
                if peer_holdoff {
                    (PilotLevel::Half, half)
                } else {
                    return PortCommand::standby();
                }
            }
            (SharedClass::Finished, SharedClass::Finished) => (PilotLevel::Half, half),
        }
    };

    if milliamps < MIN_PWM_MILLIAMPS {
        return PortCommand::standby();
    }

    PortCommand {
        level,
        milliamps,
        relay_closed: port.state.is_charging(),
    }
}

fn sequential_command(port: &Port, peer: &Port, view: &GlobalView) -> PortCommand {
    if port.state.is_charging() {
        return PortCommand {
            level: PilotLevel::Full,
            milliamps: view.max_amps_ma,
            relay_closed: true,
        };
    }

    let may_offer = !port.seq_done
        && !peer.state.is_charging()
        && view.seq_offer == port.id
        && matches!(
            port.state,
            PortState::Plugged | PortState::Offered | PortState::Requesting
        );

    if may_offer && view.max_amps_ma >= MIN_PWM_MILLIAMPS {
        PortCommand {
            level: PilotLevel::Full,
            milliamps: view.max_amps_ma,
            relay_closed: false,
        }
    } else {
        PortCommand::standby()
    }
}

fn relay_held_for_teardown(port: &Port, now: Millis) -> bool {
    port.relay.is_closed()
        && port
            .relay_open_at
            .map(|deadline| !now.reached(deadline))
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Millis;
    use crate::port::ERROR_DELAY;
    use crate::status::ErrorKind;

    fn view(mode: OperatingMode) -> GlobalView {
        GlobalView {
            mode,
            max_amps_ma: 30_000,
            paused: false,
            seq_offer: PortId::A,
            restore_full_at: [None; 2],
        }
    }

    fn ports() -> [Port; 2] {
        [Port::new(PortId::A), Port::new(PortId::B)]
    }

    #[test]
    fn lone_vehicle_gets_full_allocation() {
        let mut ports = ports();
        ports[0].state = PortState::Offered;

        let out = allocate(&ports, &view(OperatingMode::Shared), Millis::ZERO);
        assert_eq!(out[0].level, PilotLevel::Full);
        assert_eq!(out[0].milliamps, 30_000);
        assert!(!out[0].relay_closed);
        assert_eq!(out[1].level, PilotLevel::Standby);
    }

    #[test]
    fn two_vehicles_split_the_allocation() {
        let mut ports = ports();
        ports[0].state = PortState::Charging;
        ports[0].relay.command(true, Millis::ZERO);
        ports[1].state = PortState::Plugged;

        let out = allocate(&ports, &view(OperatingMode::Shared), Millis::ZERO);
        assert_eq!(out[0].level, PilotLevel::Half);
        assert_eq!(out[0].milliamps, 15_000);
        assert!(out[0].relay_closed);
        assert_eq!(out[1].level, PilotLevel::Half);
        assert!(!out[1].relay_closed);
        assert!(out[0].milliamps + out[1].milliamps <= 30_000);
    }

    #[test]
    fn errored_peer_is_absent_for_allocation() {
        let mut ports = ports();
        let now = Millis::new(20_000);
        ports[0].state = PortState::Charging;
        ports[0].relay.command(true, Millis::ZERO);
        ports[1].begin_error(ErrorKind::Overdraw, now);

        let out = allocate(&ports, &view(OperatingMode::Shared), now);
        assert_eq!(out[0].level, PilotLevel::Full);
        assert_eq!(out[1].level, PilotLevel::Off);
    }

    #[test]
    fn recoverable_error_returns_to_standby_after_teardown() {
        let mut ports = ports();
        let now = Millis::new(20_000);
        ports[0].relay.command(true, Millis::ZERO);
        ports[0].begin_error(ErrorKind::Overdraw, now);

        let during = allocate(&ports, &view(OperatingMode::Shared), now + 1_000);
        assert_eq!(during[0].level, PilotLevel::Off);

        // Relay released by the tick loop once its deadline passed.
        ports[0].relay.command(false, now + ERROR_DELAY);
        let after = allocate(&ports, &view(OperatingMode::Shared), now + ERROR_DELAY);
        assert_eq!(after[0].level, PilotLevel::Standby);

        // Ground faults stay dark until the hold clears them.
        ports[0].state = PortState::Error(ErrorKind::Ground);
        let ground = allocate(&ports, &view(OperatingMode::Shared), now + ERROR_DELAY);
        assert_eq!(ground[0].level, PilotLevel::Off);
    }

    #[test]
    fn finished_vehicle_releases_its_share() {
        let mut ports = ports();
        ports[0].state = PortState::Done;
        ports[1].state = PortState::Charging;
        ports[1].relay.command(true, Millis::ZERO);

        // No holdoff configured: survivor restores to full at once and the
        // finished port drops to standby.
        let out = allocate(&ports, &view(OperatingMode::Shared), Millis::new(1_000));
        assert_eq!(out[0].level, PilotLevel::Standby);
        assert_eq!(out[1].level, PilotLevel::Full);
        assert!(out[0].milliamps + out[1].milliamps <= 30_000);
    }

    #[test]
    fn finished_vehicle_keeps_half_during_holdoff() {
        let mut ports = ports();
        ports[0].state = PortState::Done;
        ports[1].state = PortState::Charging;
        ports[1].relay.command(true, Millis::ZERO);

        let mut v = view(OperatingMode::Shared);
        v.restore_full_at[1] = Some(Millis::new(60_000));

        let out = allocate(&ports, &v, Millis::new(1_000));
        assert_eq!(out[0].level, PilotLevel::Half);
        assert_eq!(out[1].level, PilotLevel::Half);

        let after = allocate(&ports, &v, Millis::new(60_000));
        assert_eq!(after[0].level, PilotLevel::Standby);
        assert_eq!(after[1].level, PilotLevel::Full);
    }

    #[test]
    fn restore_holdoff_keeps_survivor_at_half() {
        let mut ports = ports();
        ports[0].state = PortState::Charging;
        ports[0].relay.command(true, Millis::ZERO);

        let mut v = view(OperatingMode::Shared);
        v.restore_full_at[0] = Some(Millis::new(10_000));

        let before = allocate(&ports, &v, Millis::new(5_000));
        assert_eq!(before[0].level, PilotLevel::Half);
        let after = allocate(&ports, &v, Millis::new(10_000));
        assert_eq!(after[0].level, PilotLevel::Full);
    }

    #[test]
    fn error_teardown_holds_relay_until_deadline() {
        let mut ports = ports();
        let now = Millis::new(1_000);
        ports[0].relay.command(true, Millis::ZERO);
        ports[0].begin_error(ErrorKind::Overdraw, now);

        let mid = allocate(&ports, &view(OperatingMode::Shared), now + 1_000);
        assert_eq!(mid[0].level, PilotLevel::Off);
        assert!(mid[0].relay_closed);

        let done = allocate(&ports, &view(OperatingMode::Shared), now + ERROR_DELAY);
        assert!(!done[0].relay_closed);
        assert_eq!(
            done[0].level,
            PilotLevel::Standby,
            "standby resumes with the relay-open command so the unplug can be seen"
        );
    }

    #[test]
    fn pause_idles_both_ports() {
        let mut ports = ports();
        ports[0].state = PortState::Offered;
        ports[1].state = PortState::Plugged;

        let mut v = view(OperatingMode::Shared);
        v.paused = true;

        let out = allocate(&ports, &v, Millis::ZERO);
        for command in out {
            assert_eq!(command.level, PilotLevel::Standby);
            assert!(!command.relay_closed);
        }
    }

    #[test]
    fn sequential_offers_one_port_at_a_time() {
        let mut ports = ports();
        ports[0].state = PortState::Plugged;
        ports[1].state = PortState::Plugged;

        let mut v = view(OperatingMode::Sequential);
        let out = allocate(&ports, &v, Millis::ZERO);
        assert_eq!(out[0].level, PilotLevel::Full);
        assert_eq!(out[1].level, PilotLevel::Standby);

        v.seq_offer = PortId::B;
        let out = allocate(&ports, &v, Millis::ZERO);
        assert_eq!(out[0].level, PilotLevel::Standby);
        assert_eq!(out[1].level, PilotLevel::Full);
    }

    #[test]
    fn sequential_charging_port_shuts_out_the_peer() {
        let mut ports = ports();
        ports[0].state = PortState::Charging;
        ports[0].relay.command(true, Millis::ZERO);
        ports[1].state = PortState::Plugged;

        // Even with the offer pointed at B, a charging A keeps it standby.
        let mut v = view(OperatingMode::Sequential);
        v.seq_offer = PortId::B;

        let out = allocate(&ports, &v, Millis::ZERO);
        assert!(out[0].relay_closed);
        assert_eq!(out[1].level, PilotLevel::Standby);
        assert!(!out[1].relay_closed);
    }

    #[test]
    fn sequential_done_port_is_not_reoffered() {
        let mut ports = ports();
        ports[0].state = PortState::Done;
        ports[0].seq_done = true;
        ports[1].state = PortState::Plugged;

        let v = GlobalView {
            seq_offer: PortId::B,
            ..view(OperatingMode::Sequential)
        };
        let out = allocate(&ports, &v, Millis::ZERO);
        assert_eq!(out[0].level, PilotLevel::Standby);
        assert_eq!(out[1].level, PilotLevel::Full);
    }

    #[test]
    fn narrow_service_cannot_split_below_the_pwm_floor() {
        let mut ports = ports();
        ports[0].state = PortState::Charging;
        ports[0].relay.command(true, Millis::ZERO);
        ports[1].state = PortState::Plugged;

        let mut v = view(OperatingMode::Shared);
        v.max_amps_ma = 10_000;

        let out = allocate(&ports, &v, Millis::ZERO);
        assert_eq!(out[0].level, PilotLevel::Full);
        assert_eq!(out[1].level, PilotLevel::Standby);
    }

    #[test]
    fn allocation_is_idempotent() {
        let mut ports = ports();
        ports[0].state = PortState::Charging;
        ports[0].relay.command(true, Millis::ZERO);
        ports[1].state = PortState::Transition;

        let v = view(OperatingMode::Shared);
        let now = Millis::new(42);
        assert_eq!(allocate(&ports, &v, now), allocate(&ports, &v, now));
    }
}
