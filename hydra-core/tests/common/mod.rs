//! Shared test rig: a scripted two-vehicle HAL plus a tick driver that
//! checks the universal invariants after every iteration.

// Each scenario crate compiles this module separately and uses a different
// subset of the rig.
#![allow(dead_code)]

use hydra_core::clock::Millis;
use hydra_core::config::{Config, OperatingMode};
use hydra_core::controller::{Controller, HardwareOptions};
use hydra_core::gfi::{GFI_CLEAR_ATTEMPTS, GfiLatch};
use hydra_core::hal::{DisplaySink, EvseHal};
use hydra_core::meter::{CURRENT_SCALE_FACTOR, CurrentSample};
use hydra_core::pilot::{PilotOutput, PilotWindow};
use hydra_core::port::PortId;

/// J1772 state the simulated vehicle presents on its pilot line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VehicleState {
    Unplugged,
    Plugged,
    Requesting,
    RequestingVent,
    Shorted,
}

/// One scripted vehicle.
pub struct SimVehicle {
    pub state: VehicleState,
    pub diode_ok: bool,
    /// RMS draw synthesized while the relay is closed, in milliamps.
    pub draw_ma: u32,
}

impl SimVehicle {
    fn new() -> Self {
        SimVehicle {
            state: VehicleState::Unplugged,
            diode_ok: true,
            draw_ma: 0,
        }
    }

    fn window(&self) -> PilotWindow {
        let v_hi = match self.state {
            VehicleState::Unplugged => 900,
            VehicleState::Plugged => 820,
            VehicleState::Requesting => 700,
            VehicleState::RequestingVent => 650,
            VehicleState::Shorted => 300,
        };
        let v_lo = if self.diode_ok { 100 } else { 600 };
        PilotWindow { v_hi, v_lo }
    }
}

/// HAL backed by two scripted vehicles and ideal wiring.
pub struct SimHal {
    pub vehicles: [SimVehicle; 2],
    pub relay_closed: [bool; 2],
    pub pilot_out: [PilotOutput; 2],
    /// Forces the AC sense reading for a port, overriding the ideal mirror
    /// of the relay command.
    pub relay_sense_override: [Option<bool>; 2],
}

impl SimHal {
    pub fn new() -> Self {
        SimHal {
            vehicles: [SimVehicle::new(), SimVehicle::new()],
            relay_closed: [false; 2],
            pilot_out: [PilotOutput::Low; 2],
            relay_sense_override: [None; 2],
        }
    }
}

impl EvseHal for SimHal {
    fn set_pilot(&mut self, port: PortId, output: PilotOutput) {
        self.pilot_out[port.as_index()] = output;
    }

    fn sample_pilot(&mut self, port: PortId) -> PilotWindow {
        self.vehicles[port.as_index()].window()
    }

    fn sample_current(&mut self, port: PortId, buf: &mut [CurrentSample]) -> usize {
        let i = port.as_index();
        if !self.relay_closed[i] || self.vehicles[i].draw_ma == 0 {
            return 0;
        }
        let amplitude =
            self.vehicles[i].draw_ma as f32 / CURRENT_SCALE_FACTOR as f32 * core::f32::consts::SQRT_2;
        let count = buf.len().min(350);
        for (n, sample) in buf[..count].iter_mut().enumerate() {
            let t_us = (n as u32) * 100;
            let phase = 2.0 * core::f32::consts::PI * 60.0 * (t_us as f32 / 1.0e6);
            *sample = CurrentSample {
                offset_us: t_us,
                value: (512 + (amplitude * phase.sin()) as i32).clamp(0, 1023) as u16,
            };
        }
        count
    }

    fn set_relay(&mut self, port: PortId, closed: bool) {
        self.relay_closed[port.as_index()] = closed;
    }

    fn relay_sense(&mut self, port: PortId) -> bool {
        let i = port.as_index();
        self.relay_sense_override[i].unwrap_or(self.relay_closed[i])
    }

    fn set_gfi_test(&mut self, _: bool) {}

    fn delay_us(&mut self, _: u32) {}
}

/// Captures packed status words.
#[derive(Default)]
pub struct WordLog(pub Vec<u16>);

impl DisplaySink for WordLog {
    fn show(&mut self, word: u16) {
        self.0.push(word);
    }
}

/// Controller + simulated hardware stepped at the 20 ms tick.
pub struct Rig {
    pub controller: Controller,
    pub hal: SimHal,
    pub latch: GfiLatch,
    pub display: WordLog,
    pub now: Millis,
}

impl Rig {
    pub fn new(config: Config, options: HardwareOptions) -> Self {
        Rig {
            controller: Controller::new(config, options),
            hal: SimHal::new(),
            latch: GfiLatch::new(),
            display: WordLog::default(),
            now: Millis::ZERO,
        }
    }

    pub fn shared() -> Self {
        Rig::new(Config::default(), HardwareOptions::default())
    }

    pub fn sequential() -> Self {
        let config = Config {
            mode: OperatingMode::Sequential,
            ..Config::default()
        };
        Rig::new(config, HardwareOptions::default())
    }

    pub fn vehicle(&mut self, port: PortId) -> &mut SimVehicle {
        &mut self.hal.vehicles[port.as_index()]
    }

    pub fn tick_once(&mut self) {
        self.display.0.clear();
        self.controller
            .tick(&mut self.hal, &mut self.display, &self.latch, self.now, None);
        self.check_invariants();
        self.now = self.now + 20;
    }

    /// Steps ticks until the rig clock reaches `target_ms`.
    pub fn run_until(&mut self, target_ms: u32) {
        while self.now.ticks() < target_ms {
            self.tick_once();
        }
    }

    pub fn relay_closed(&self, port: PortId) -> bool {
        self.hal.relay_closed[port.as_index()]
    }

    pub fn advertised(&self, port: PortId) -> u32 {
        self.controller.port(port).advertised_ma
    }

    /// Universal properties that must hold after every tick.
    fn check_invariants(&self) {
        let a = self.controller.port(PortId::A);
        let b = self.controller.port(PortId::B);

        let advertised_sum = a.advertised_ma + b.advertised_ma;
        assert!(
            advertised_sum <= self.controller.config().max_amps_ma,
            "advertised sum {advertised_sum} over the ceiling at t={}",
            self.now.ticks()
        );

        for port in [a, b] {
            let in_teardown =
                port.state.is_error() || port.relay_open_at.is_some() || self.controller.is_paused();
            if port.relay.is_closed() && !in_teardown {
                assert!(
                    matches!(
                        port.last_read,
                        hydra_core::pilot::PilotRead::StateC | hydra_core::pilot::PilotRead::StateD
                    ),
                    "relay {} closed without a C/D read at t={}",
                    port.id,
                    self.now.ticks()
                );
                assert!(
                    port.advertised_ma >= 6_000,
                    "relay {} closed below the PWM floor at t={}",
                    port.id,
                    self.now.ticks()
                );
            }
        }

        if self.controller.config().mode == OperatingMode::Sequential {
            assert!(
                !(a.relay.is_closed() && b.relay.is_closed()),
                "both relays closed in sequential mode at t={}",
                self.now.ticks()
            );
        }

        assert!(self.controller.gfi_retry_count() <= GFI_CLEAR_ATTEMPTS);
    }
}
