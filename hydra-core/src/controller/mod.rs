//! The cooperative tick loop that owns all coordinator state.
//!
//! One [`Controller`] value holds both port records, the global arbitration
//! state, and the configuration, and is threaded through every tick; there
//! are no singletons. Each tick runs, in order: GFI service, pilot
//! sampling, current sampling, relay consistency checks, port state
//! advancement, arbitration plus actuator writes, then the deferred timers.
//! Sensor reads always happen-before state updates happen-before actuator
//! writes within a tick.
//!
//! The monotonic millisecond instant and the optional wall-clock second
//! count are passed in by the caller; the wall clock feeds only the
//! scheduled pause/unpause events.

use crate::arbitrator::{self, GlobalView, PortCommand};
use crate::clock::Millis;
use crate::config::{Config, EventKind, OperatingMode};
use crate::dst::{self, US_DST_RULES};
use crate::gfi::{self, GFI_CLEAR_ATTEMPTS, GFI_CLEAR_MS, GfiLatch, SelfTestError};
use crate::hal::{DisplaySink, EvseHal};
use crate::meter::{self, CURRENT_BUF_LEN, CurrentSample};
use crate::pilot::{self, PilotLevel, PilotOutput, PilotRead};
use crate::port::{ERROR_DELAY, Port, PortId, PortState, TRANSITION_DELAY};
use crate::relay::RelayCheckMode;
use crate::status::{ErrorKind, PortStatus, StatusScope};
use crate::telemetry::{TelemetryEventKind, TelemetryPayload, TelemetryRecorder};

/// Default winner of a simultaneous-arrival contest on cold start.
pub const DEFAULT_TIEBREAK: PortId = PortId::A;

/// Minimum spacing of per-port current telemetry records, in ms.
pub const CURRENT_LOG_INTERVAL: u32 = 1_000;

/// Build-time hardware variants, not part of the persisted config.
#[derive(Copy, Clone, Debug)]
pub struct HardwareOptions {
    pub relay_check: RelayCheckMode,
    /// Shared mode: hold the survivor at half power for this long after the
    /// peer stops charging, so a quick-cycling vehicle can resume without a
    /// pilot renegotiation. `None` restores full power immediately.
    pub pilot_release_holdoff_ms: Option<u32>,
}

impl Default for HardwareOptions {
    fn default() -> Self {
        HardwareOptions {
            relay_check: RelayCheckMode::RelayTestsGround,
            pilot_release_holdoff_ms: None,
        }
    }
}

impl HardwareOptions {
    /// Enables the quick-cycling workaround with its stock holdoff.
    pub fn with_release_holdoff(mut self) -> Self {
        self.pilot_release_holdoff_ms =
            Some(arbitrator::PILOT_RELEASE_HOLDOFF_MINUTES * crate::clock::MILLIS_PER_MINUTE);
        self
    }
}

/// The whole coordinator.
pub struct Controller {
    ports: [Port; 2],
    config: Config,
    options: HardwareOptions,
    paused: bool,
    tiebreak_owner: PortId,
    seq_offer: PortId,
    seq_offer_deadline: Option<Millis>,
    restore_full_at: [Option<Millis>; 2],
    gfi_tripped_at: Option<Millis>,
    gfi_retry_count: u8,
    fatal: Option<ErrorKind>,
    last_event_minute: Option<i64>,
    telemetry: TelemetryRecorder,
}

impl Controller {
    pub fn new(mut config: Config, options: HardwareOptions) -> Self {
        config.validate();
        Controller {
            ports: [Port::new(PortId::A), Port::new(PortId::B)],
            config,
            options,
            paused: false,
            tiebreak_owner: DEFAULT_TIEBREAK,
            seq_offer: DEFAULT_TIEBREAK,
            seq_offer_deadline: None,
            restore_full_at: [None; 2],
            gfi_tripped_at: None,
            gfi_retry_count: 0,
            fatal: None,
            last_event_minute: None,
            telemetry: TelemetryRecorder::new(),
        }
    }

    pub fn port(&self, id: PortId) -> &Port {
        &self.ports[id.as_index()]
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn telemetry(&self) -> &TelemetryRecorder {
        &self.telemetry
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn tiebreak_owner(&self) -> PortId {
        self.tiebreak_owner
    }

    pub fn seq_offer(&self) -> PortId {
        self.seq_offer
    }

    pub fn gfi_retry_count(&self) -> u8 {
        self.gfi_retry_count
    }

    /// Latched unrecoverable fault, if any.
    pub fn fatal_error(&self) -> Option<ErrorKind> {
        self.fatal
    }

    /// Smoothed current for the ammeter display, in milliamps.
    pub fn display_current(&self, id: PortId) -> u32 {
        self.ports[id.as_index()].ammeter.ewa() as u32
    }

    /// Runs the GFI self-test. Must pass at boot before any current is
    /// offered; a failure latches both ports fatally.
    pub fn power_on_self_test<H: EvseHal>(
        &mut self,
        hal: &mut H,
        latch: &GfiLatch,
    ) -> Result<(), SelfTestError> {
        match gfi::self_test(hal, latch) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.fatal_latch(hal, ErrorKind::SelfTestFailed, Millis::ZERO);
                Err(err)
            }
        }
    }

    /// Manual pause control (front panel or host).
    pub fn set_paused(&mut self, paused: bool, now: Millis) {
        if paused {
            self.enter_pause(now);
        } else {
            self.exit_pause(now);
        }
    }

    /// One scheduler iteration. `wall` is the wall-clock second count used
    /// only for scheduled events; protocol timing runs entirely off `now`.
    pub fn tick<H: EvseHal, D: DisplaySink>(
        &mut self,
        hal: &mut H,
        display: &mut D,
        latch: &GfiLatch,
        now: Millis,
        wall: Option<i64>,
    ) {
        self.service_gfi(hal, latch, now);

        if self.fatal.is_none() {
            let accepted = self.sample_pilots(hal);
            self.sample_currents(hal, now);
            self.check_relays(hal, now);
            if self.fatal.is_none() {
                self.advance_ports(accepted, now);
                let view = self.global_view();
                let commands = arbitrator::allocate(&self.ports, &view, now);
                self.apply(hal, commands, now);
                self.service_timers(now, wall);
            }
        }

        self.publish_status(display);
    }

    fn global_view(&self) -> GlobalView {
        GlobalView {
            mode: self.config.mode,
            max_amps_ma: self.config.max_amps_ma,
            paused: self.paused,
            seq_offer: self.seq_offer,
            restore_full_at: self.restore_full_at,
        }
    }

    // ---- step 1: ground fault service ----

    fn service_gfi<H: EvseHal>(&mut self, hal: &mut H, latch: &GfiLatch, now: Millis) {
        if self.fatal.is_some() {
            return;
        }

        if latch.is_tripped() && self.gfi_tripped_at.is_none() {
            self.trip_ground(hal, now);
        }

        if let Some(tripped_at) = self.gfi_tripped_at {
            if now.since(tripped_at) >= GFI_CLEAR_MS {
                latch.clear();
                self.gfi_tripped_at = None;
                if self.gfi_retry_count < GFI_CLEAR_ATTEMPTS {
                    for port in &mut self.ports {
                        port.reset_to_unplugged();
                    }
                    self.telemetry.record(
                        TelemetryEventKind::GfiCleared,
                        TelemetryPayload::None,
                        now,
                    );
                } else {
                    self.fatal = Some(ErrorKind::Ground);
                    self.telemetry.record(
                        TelemetryEventKind::FatalLatched,
                        TelemetryPayload::Error(ErrorKind::Ground),
                        now,
                    );
                }
            }
        }
    }

    /// Immediate dual teardown for a ground fault, from the GFI latch or
    /// the ground-continuity variant of the relay test.
    fn trip_ground<H: EvseHal>(&mut self, hal: &mut H, now: Millis) {
        self.telemetry
            .record(TelemetryEventKind::GfiTripped, TelemetryPayload::None, now);
        self.gfi_tripped_at = Some(now);
        self.gfi_retry_count = (self.gfi_retry_count + 1).min(GFI_CLEAR_ATTEMPTS);

        for port in &mut self.ports {
            hal.set_pilot(port.id, PilotOutput::Low);
            hal.set_relay(port.id, false);
            port.pilot_level = PilotLevel::Off;
            port.advertised_ma = 0;
            port.relay.command(false, now);
            port.state = PortState::Error(ErrorKind::Ground);
            port.error_time = Some(now);
            port.relay_open_at = None;
            port.transition_deadline = None;
            port.request_time = None;
            port.overdraw_begin = None;
        }
        self.seq_offer_deadline = None;
        self.restore_full_at = [None; 2];
    }

    /// Unrecoverable fault: kill both ports and latch until power cycle.
    fn fatal_latch<H: EvseHal>(&mut self, hal: &mut H, kind: ErrorKind, now: Millis) {
        self.fatal = Some(kind);
        for port in &mut self.ports {
            hal.set_pilot(port.id, PilotOutput::Low);
            hal.set_relay(port.id, false);
            port.pilot_level = PilotLevel::Off;
            port.advertised_ma = 0;
            port.relay.command(false, now);
            port.state = PortState::Error(kind);
            port.error_time = Some(now);
            port.relay_open_at = None;
        }
        self.telemetry.record(
            TelemetryEventKind::FatalLatched,
            TelemetryPayload::Error(kind),
            now,
        );
    }

    // ---- step 2: pilot sampling ----

    fn sample_pilots<H: EvseHal>(&mut self, hal: &mut H) -> [Option<PilotRead>; 2] {
        let mut accepted = [None, None];
        for (i, slot) in accepted.iter_mut().enumerate() {
            let port = &mut self.ports[i];
            if port.pilot_level == PilotLevel::Off {
                // No state can be derived while the pilot is driven low.
                continue;
            }
            let window = hal.sample_pilot(port.id);
            let read = pilot::classify(window, port.pilot_level.is_pwm());
            *slot = port.observe(read);
        }
        accepted
    }

    // ---- step 3: current sampling and overdraw ----

    fn sample_currents<H: EvseHal>(&mut self, hal: &mut H, now: Millis) {
        for i in 0..2 {
            if !self.ports[i].relay.is_closed() {
                continue;
            }
            let id = self.ports[i].id;
            let mut buf = [CurrentSample::default(); CURRENT_BUF_LEN];
            let filled = hal.sample_current(id, &mut buf);
            let calib = self.config.calib.amm_offset(id);
            // No complete cycle means no AC is flowing.
            let drawn = meter::rms_from_window(&buf[..filled], calib).unwrap_or(0);

            let overdrawn = {
                let port = &mut self.ports[i];
                port.ammeter.update(drawn as f32, now.ticks() as f32);
                port.note_draw(drawn, now)
            };

            let due = self.ports[i]
                .last_current_log
                .map(|at| now.since(at) >= CURRENT_LOG_INTERVAL)
                .unwrap_or(true);
            if due {
                self.ports[i].last_current_log = Some(now);
                self.telemetry.record(
                    TelemetryEventKind::CurrentSampled(id),
                    TelemetryPayload::Milliamps(drawn),
                    now,
                );
            }

            // A port already tearing down is past enforcement.
            if overdrawn && !self.ports[i].state.is_error() {
                self.port_error(i, ErrorKind::Overdraw, now);
            }
        }
    }

    // ---- step 4: relay consistency ----

    fn check_relays<H: EvseHal>(&mut self, hal: &mut H, now: Millis) {
        for i in 0..2 {
            let id = self.ports[i].id;
            let sensed = hal.relay_sense(id);
            match self.ports[i].relay.check(now, sensed, self.options.relay_check) {
                Some(ErrorKind::RelayStuck) => {
                    self.fatal_latch(hal, ErrorKind::RelayStuck, now);
                    return;
                }
                Some(ErrorKind::Ground) => {
                    if self.gfi_tripped_at.is_none() {
                        self.trip_ground(hal, now);
                    }
                    return;
                }
                _ => {}
            }
        }
    }

    // ---- step 5: port state machines ----

    fn advance_ports(&mut self, accepted: [Option<PilotRead>; 2], now: Millis) {
        for (i, read) in accepted.into_iter().enumerate() {
            if let Some(read) = read {
                self.handle_read(i, read, now);
            }
        }

        // A vehicle holding state C against a standing offer keeps
        // requesting; this re-arms a transition that aborted on deadline.
        for port in &mut self.ports {
            if port.state == PortState::Offered && port.last_read == PilotRead::StateC {
                port.state = PortState::Requesting;
                if port.request_time.is_none() {
                    port.request_time = Some(now);
                }
            }
        }

        // Resolve this tick's requests, the tiebreak winner first when both
        // vehicles arrived simultaneously.
        let requesting = [
            self.ports[0].state == PortState::Requesting,
            self.ports[1].state == PortState::Requesting,
        ];
        match requesting {
            [true, true] => {
                let winner = self.tiebreak_owner.as_index();
                self.resolve_request(winner, now);
                self.resolve_request(1 - winner, now);
                self.tiebreak_owner = self.tiebreak_owner.peer();
            }
            [true, false] => self.resolve_request(0, now),
            [false, true] => self.resolve_request(1, now),
            [false, false] => {}
        }
    }

    fn handle_read(&mut self, index: usize, read: PilotRead, now: Millis) {
        let state = self.ports[index].state;
        match read {
            PilotRead::StateA => {
                if let PortState::Error(kind) = state {
                    if !kind.clears_on_unplug() {
                        return;
                    }
                }
                if state.is_charging() {
                    self.arm_restore_holdoff(1 - index, now);
                }
                self.ports[index].reset_to_unplugged();
                self.state_telemetry(index, now);
            }
            PilotRead::StateB => match state {
                PortState::Unplugged => {
                    self.ports[index].state = PortState::Plugged;
                    self.state_telemetry(index, now);
                }
                PortState::Charging => self.finish_charging(index, now),
                PortState::Transition | PortState::Requesting => {
                    // Vehicle backed out before our relay closed.
                    let port = &mut self.ports[index];
                    port.state = PortState::Offered;
                    port.transition_deadline = None;
                    port.request_time = None;
                    self.state_telemetry(index, now);
                }
                _ => {}
            },
            PilotRead::StateC => match state {
                PortState::Plugged | PortState::Offered | PortState::Unplugged => {
                    self.ports[index].state = PortState::Requesting;
                    self.ports[index].request_time = Some(now);
                }
                PortState::Done => {
                    // In shared mode a finished vehicle may change its mind;
                    // sequentially it stays done until replug.
                    if self.config.mode == OperatingMode::Shared {
                        self.ports[index].state = PortState::Requesting;
                        self.ports[index].request_time = Some(now);
                    }
                }
                _ => {}
            },
            PilotRead::StateD => {
                // Ventilation isn't supported on this hardware.
                if !state.is_error() {
                    self.port_error(index, ErrorKind::VentRequired, now);
                }
            }
            PilotRead::StateE | PilotRead::DiodeFault => {
                if !state.is_error() {
                    self.port_error(index, ErrorKind::PilotFault, now);
                }
            }
            PilotRead::Unknown => {}
        }
    }

    /// Turns a `Requesting` port into `Charging` or `Transition` according
    /// to policy. Always leaves the transient state.
    fn resolve_request(&mut self, index: usize, now: Millis) {
        let peer_charging = self.ports[1 - index].state.is_charging();

        if self.paused {
            self.ports[index].state = PortState::Plugged;
            self.ports[index].request_time = None;
            return;
        }

        match self.config.mode {
            OperatingMode::Sequential => {
                let port = &self.ports[index];
                if self.seq_offer == port.id && !port.seq_done && !peer_charging {
                    self.ports[index].state = PortState::Charging;
                    self.seq_offer_deadline = None;
                    self.state_telemetry(index, now);
                } else {
                    // Not this port's turn; the pilot it sees is standby.
                    self.ports[index].state = PortState::Plugged;
                    self.ports[index].request_time = None;
                }
            }
            OperatingMode::Shared => {
                if self.ports[1 - index].relay.is_closed() {
                    // Wait for the peer's draw to come down to its reduced
                    // allowance before closing our relay. If it already
                    // fits, the transition resolves on this same tick.
                    self.ports[index].state = PortState::Transition;
                    self.ports[index].transition_deadline = Some(now + TRANSITION_DELAY);
                    self.state_telemetry(index, now);
                } else {
                    self.ports[index].state = PortState::Charging;
                    self.state_telemetry(index, now);
                }
            }
        }
    }

    /// Vehicle went C→B: session over.
    fn finish_charging(&mut self, index: usize, now: Millis) {
        {
            let port = &mut self.ports[index];
            port.state = PortState::Done;
            port.request_time = None;
            port.overdraw_begin = None;
        }
        self.state_telemetry(index, now);

        match self.config.mode {
            OperatingMode::Sequential => {
                self.ports[index].seq_done = true;
                let peer = &self.ports[1 - index];
                if peer.state.vehicle_present() && !peer.seq_done {
                    self.seq_offer = peer.id;
                    self.telemetry.record(
                        TelemetryEventKind::OfferSwapped(peer.id),
                        TelemetryPayload::None,
                        now,
                    );
                }
                self.seq_offer_deadline = None;
            }
            OperatingMode::Shared => {
                self.arm_restore_holdoff(1 - index, now);
            }
        }
    }

    /// Starts the pilot-then-relay teardown for a per-port fault.
    fn port_error(&mut self, index: usize, kind: ErrorKind, now: Millis) {
        let was_charging = self.ports[index].state.is_charging();
        self.ports[index].begin_error(kind, now);
        self.telemetry.record(
            TelemetryEventKind::StateChanged(self.ports[index].id),
            TelemetryPayload::Error(kind),
            now,
        );
        if was_charging {
            self.arm_restore_holdoff(1 - index, now);
        }
    }

    /// Arms the quick-cycling holdoff on the surviving port, if configured.
    fn arm_restore_holdoff(&mut self, survivor: usize, now: Millis) {
        if self.config.mode != OperatingMode::Shared {
            return;
        }
        if let Some(holdoff) = self.options.pilot_release_holdoff_ms {
            if self.ports[survivor].state.vehicle_present() {
                self.restore_full_at[survivor] = Some(now + holdoff);
            }
        }
    }

    // ---- step 6: actuator writes ----

    fn apply<H: EvseHal>(&mut self, hal: &mut H, commands: [PortCommand; 2], now: Millis) {
        for (i, command) in commands.into_iter().enumerate() {
            let id = self.ports[i].id;
            let derate = self.config.calib.pilot_derate(id);

            let (level, milliamps, output) = match command.level {
                PilotLevel::Off => (PilotLevel::Off, 0, PilotOutput::Low),
                PilotLevel::Standby => (PilotLevel::Standby, 0, PilotOutput::High),
                level => match pilot::duty_for_amps(command.milliamps, derate) {
                    Some(duty) => (level, command.milliamps, PilotOutput::Pwm(duty)),
                    // Below the PWM floor nothing may be advertised.
                    None => (PilotLevel::Standby, 0, PilotOutput::High),
                },
            };

            {
                let port = &mut self.ports[i];
                if port.pilot_level != level || port.advertised_ma != milliamps {
                    port.pilot_level = level;
                    port.advertised_ma = milliamps;
                    hal.set_pilot(id, output);
                    self.telemetry.record(
                        TelemetryEventKind::PilotChanged(id),
                        TelemetryPayload::Pilot(level, milliamps),
                        now,
                    );
                }

                // Advertising toggles a plugged port between B1 and B2.
                if level.is_pwm() && port.state == PortState::Plugged {
                    port.state = PortState::Offered;
                } else if level == PilotLevel::Standby && port.state == PortState::Offered {
                    port.state = PortState::Plugged;
                }

                if command.relay_closed != port.relay.is_closed() {
                    port.relay.command(command.relay_closed, now);
                    hal.set_relay(id, command.relay_closed);
                    if !command.relay_closed {
                        port.relay_open_at = None;
                    }
                    self.telemetry.record(
                        if command.relay_closed {
                            TelemetryEventKind::RelayClosed(id)
                        } else {
                            TelemetryEventKind::RelayOpened(id)
                        },
                        TelemetryPayload::None,
                        now,
                    );
                }
            }
        }
    }

    // ---- step 7: deferred timers ----

    fn service_timers(&mut self, now: Millis, wall: Option<i64>) {
        self.service_transitions(now);
        self.service_sequential_offer(now);
        self.service_events(now, wall);

        for slot in &mut self.restore_full_at {
            if slot.map(|until| now.reached(until)).unwrap_or(false) {
                *slot = None;
            }
        }
    }

    fn service_transitions(&mut self, now: Millis) {
        for i in 0..2 {
            if self.ports[i].state != PortState::Transition {
                continue;
            }
            let deadline = match self.ports[i].transition_deadline {
                Some(deadline) => deadline,
                None => now,
            };

            // The peer has made room once its relay is open or its draw
            // fits the reduced allowance; an errored peer still drawing
            // through its teardown has not.
            let peer = &self.ports[1 - i];
            let peer_complies = !peer.relay.is_closed()
                || peer
                    .last_drawn_ma
                    .map(|drawn| drawn <= peer.advertised_ma + crate::port::OVERDRAW_GRACE_AMPS)
                    .unwrap_or(true);

            if peer_complies {
                self.ports[i].state = PortState::Charging;
                self.ports[i].transition_deadline = None;
                self.state_telemetry(i, now);
            } else if now.reached(deadline) {
                // Peer never halved; abort rather than overload the feed.
                self.ports[i].state = PortState::Offered;
                self.ports[i].transition_deadline = None;
                self.ports[i].request_time = None;
                self.state_telemetry(i, now);
            }
        }
    }

    fn service_sequential_offer(&mut self, now: Millis) {
        if self.config.mode != OperatingMode::Sequential || self.paused {
            return;
        }
        let busy = self
            .ports
            .iter()
            .any(|port| port.state.is_charging() || port.state == PortState::Transition);
        if busy {
            self.seq_offer_deadline = None;
            return;
        }

        let eligible = |port: &Port| {
            matches!(port.state, PortState::Plugged | PortState::Offered) && !port.seq_done
        };
        match (eligible(&self.ports[0]), eligible(&self.ports[1])) {
            (true, true) => match self.seq_offer_deadline {
                None => {
                    self.seq_offer_deadline = Some(now + arbitrator::SEQ_MODE_OFFER_TIMEOUT);
                }
                Some(deadline) if now.reached(deadline) => {
                    // Neither vehicle is biting; let the other one try.
                    self.seq_offer = self.seq_offer.peer();
                    self.seq_offer_deadline = Some(now + arbitrator::SEQ_MODE_OFFER_TIMEOUT);
                    self.telemetry.record(
                        TelemetryEventKind::OfferSwapped(self.seq_offer),
                        TelemetryPayload::None,
                        now,
                    );
                }
                Some(_) => {}
            },
            (true, false) => {
                self.seq_offer = PortId::A;
                self.seq_offer_deadline = None;
            }
            (false, true) => {
                self.seq_offer = PortId::B;
                self.seq_offer_deadline = None;
            }
            (false, false) => {
                self.seq_offer_deadline = None;
            }
        }
    }

    fn service_events(&mut self, now: Millis, wall: Option<i64>) {
        let wall = match wall {
            Some(wall) => wall,
            None => return,
        };
        let local = if self.config.enable_dst {
            dst::to_dst(&US_DST_RULES, wall)
        } else {
            wall
        };

        let minute_index = local.div_euclid(60);
        if self.last_event_minute == Some(minute_index) {
            return;
        }
        self.last_event_minute = Some(minute_index);

        let (hour, minute, dow) = dst::clock_fields(local);
        for slot in 0..self.config.events.len() {
            let event = self.config.events[slot];
            if event.matches(hour, minute, dow) {
                match event.kind {
                    EventKind::Pause => self.enter_pause(now),
                    EventKind::Unpause => self.exit_pause(now),
                    EventKind::None => {}
                }
            }
        }
    }

    fn enter_pause(&mut self, now: Millis) {
        if self.paused {
            return;
        }
        self.paused = true;
        self.telemetry
            .record(TelemetryEventKind::Paused, TelemetryPayload::None, now);

        // Withdraw pilots now; closed relays open after the standard delay
        // so vehicles can stop drawing first. Done flags survive the pause.
        for port in &mut self.ports {
            match port.state {
                PortState::Charging => {
                    port.state = PortState::Plugged;
                    port.relay_open_at = Some(now + ERROR_DELAY);
                }
                PortState::Transition | PortState::Requesting => {
                    port.state = PortState::Plugged;
                    port.transition_deadline = None;
                    port.request_time = None;
                }
                _ => {}
            }
        }
        self.seq_offer_deadline = None;
    }

    fn exit_pause(&mut self, now: Millis) {
        if !self.paused {
            return;
        }
        self.paused = false;
        self.telemetry
            .record(TelemetryEventKind::Unpaused, TelemetryPayload::None, now);
    }

    // ---- status publication ----

    fn state_telemetry(&mut self, index: usize, now: Millis) {
        self.telemetry.record(
            TelemetryEventKind::StateChanged(self.ports[index].id),
            TelemetryPayload::State(self.ports[index].state),
            now,
        );
    }

    fn publish_status<D: DisplaySink>(&self, display: &mut D) {
        for port in &self.ports {
            let status = PortStatus {
                scope: StatusScope::Port(port.id),
                status: port.state.display(),
                error: port.state.error_kind(),
                tiebreak: self.tiebreak_owner == port.id,
            };
            display.show(status.pack());
        }
    }
}
