use std::fmt::Write as _;

use hydra_core::clock::Millis;
use hydra_core::config::{Config, OperatingMode};
use hydra_core::controller::{Controller, HardwareOptions};
use hydra_core::gfi::GfiLatch;
use hydra_core::hal::{DisplaySink, EvseHal};
use hydra_core::meter::{CURRENT_SCALE_FACTOR, CurrentSample};
use hydra_core::pilot::{PilotLevel, PilotOutput, PilotWindow};
use hydra_core::port::PortId;
use hydra_core::status::format_milliamps;
use hydra_core::telemetry::{TelemetryPayload, TelemetryRecord};

/// Scenario selected on the command line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Profile {
    Shared,
    Sequential,
    Gfi,
}

impl Profile {
    pub fn from_tag(tag: &str) -> Result<Self, String> {
        match tag.to_ascii_lowercase().as_str() {
            "shared" => Ok(Profile::Shared),
            "sequential" => Ok(Profile::Sequential),
            "gfi" => Ok(Profile::Gfi),
            other => Err(format!("Unknown profile `{other}`")),
        }
    }
}

/// J1772 state a simulated vehicle presents.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum VehicleState {
    Unplugged,
    Plugged,
    Requesting,
}

struct SimVehicle {
    state: VehicleState,
    draw_ma: u32,
}

impl SimVehicle {
    fn window(&self) -> PilotWindow {
        let v_hi = match self.state {
            VehicleState::Unplugged => 900,
            VehicleState::Plugged => 820,
            VehicleState::Requesting => 700,
        };
        PilotWindow { v_hi, v_lo: 100 }
    }
}

/// Ideal-wiring HAL over two scripted vehicles.
struct SimHal {
    vehicles: [SimVehicle; 2],
    relay_closed: [bool; 2],
}

impl EvseHal for SimHal {
    fn set_pilot(&mut self, _: PortId, _: PilotOutput) {}

    fn sample_pilot(&mut self, port: PortId) -> PilotWindow {
        self.vehicles[port.as_index()].window()
    }

    fn sample_current(&mut self, port: PortId, buf: &mut [CurrentSample]) -> usize {
        let i = port.as_index();
        if !self.relay_closed[i] || self.vehicles[i].draw_ma == 0 {
            return 0;
        }
        let amplitude = self.vehicles[i].draw_ma as f32 / CURRENT_SCALE_FACTOR as f32
            * std::f32::consts::SQRT_2;
        let count = buf.len().min(350);
        for (n, sample) in buf[..count].iter_mut().enumerate() {
            let t_us = (n as u32) * 100;
            let phase = 2.0 * std::f32::consts::PI * 60.0 * (t_us as f32 / 1.0e6);
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
        self.relay_closed[port.as_index()]
    }

    fn set_gfi_test(&mut self, _: bool) {}

    fn delay_us(&mut self, _: u32) {}
}

struct NullDisplay;

impl DisplaySink for NullDisplay {
    fn show(&mut self, _: u16) {}
}

/// One scripted stimulus.
enum Stimulus {
    Vehicle(PortId, VehicleState, u32),
    TripGfi,
}

struct ScriptEntry {
    at_ms: u32,
    stimulus: Stimulus,
    note: &'static str,
}

/// Runs one scenario against the real coordinator and collects the
/// transcript.
pub struct Session {
    controller: Controller,
    hal: SimHal,
    latch: GfiLatch,
    now: Millis,
    seen_events: u32,
    lines: Vec<String>,
}

impl Session {
    pub fn new(profile: Profile) -> Self {
        let config = Config {
            mode: match profile {
                Profile::Sequential => OperatingMode::Sequential,
                _ => OperatingMode::Shared,
            },
            ..Config::default()
        };
        Session {
            controller: Controller::new(config, HardwareOptions::default()),
            hal: SimHal {
                vehicles: [
                    SimVehicle {
                        state: VehicleState::Unplugged,
                        draw_ma: 0,
                    },
                    SimVehicle {
                        state: VehicleState::Unplugged,
                        draw_ma: 0,
                    },
                ],
                relay_closed: [false; 2],
            },
            latch: GfiLatch::new(),
            now: Millis::ZERO,
            seen_events: 0,
            lines: Vec::new(),
        }
    }

    pub fn run(mut self, profile: Profile) -> Vec<String> {
        let (script, end_ms) = script_for(profile);
        let mut cursor = 0;

        while self.now.ticks() < end_ms {
            while cursor < script.len() && script[cursor].at_ms <= self.now.ticks() {
                let entry = &script[cursor];
                match entry.stimulus {
                    Stimulus::Vehicle(port, state, draw_ma) => {
                        let vehicle = &mut self.hal.vehicles[port.as_index()];
                        vehicle.state = state;
                        vehicle.draw_ma = draw_ma;
                    }
                    Stimulus::TripGfi => self.latch.trip(),
                }
                let note = entry.note;
                self.log_note(note);
                cursor += 1;
            }

            let mut display = NullDisplay;
            self.controller
                .tick(&mut self.hal, &mut display, &self.latch, self.now, None);
            self.drain_telemetry();
            self.now = self.now + 20;
        }

        self.summarize();
        self.lines
    }

    fn log_note(&mut self, note: &str) {
        let line = format!("[{}] >> {note}", stamp(self.now.ticks()));
        self.lines.push(line);
    }

    fn drain_telemetry(&mut self) {
        let records: Vec<TelemetryRecord> = self
            .controller
            .telemetry()
            .oldest_first()
            .filter(|record| record.id >= self.seen_events)
            .copied()
            .collect();
        for record in records {
            self.seen_events = record.id + 1;
            let mut line = format!("[{}] {}", stamp(record.at.ticks()), record.event);
            match record.details {
                TelemetryPayload::Pilot(level, milliamps) => {
                    let tag = match level {
                        PilotLevel::Off => "off",
                        PilotLevel::Standby => "standby",
                        PilotLevel::Full => "full",
                        PilotLevel::Half => "half",
                    };
                    let _ = write!(line, " -> {tag}");
                    if milliamps > 0 {
                        let _ = write!(line, " {}", format_milliamps(milliamps));
                    }
                }
                TelemetryPayload::State(state) => {
                    let _ = write!(line, " -> {state:?}");
                }
                TelemetryPayload::Milliamps(milliamps) => {
                    let _ = write!(line, " {}", format_milliamps(milliamps));
                }
                TelemetryPayload::Error(kind) => {
                    let _ = write!(line, " -> error {kind}");
                }
                TelemetryPayload::None => {}
            }
            self.lines.push(line);
        }
    }

    fn summarize(&mut self) {
        self.lines.push(String::from("--"));
        for id in [PortId::A, PortId::B] {
            let port = self.controller.port(id);
            let line = format!(
                "port {id}: {:?}, ammeter {}",
                port.state,
                format_milliamps(self.controller.display_current(id)),
            );
            self.lines.push(line);
        }
    }
}

fn stamp(ms: u32) -> String {
    format!("{:4}.{:03}", ms / 1_000, ms % 1_000)
}

fn script_for(profile: Profile) -> (Vec<ScriptEntry>, u32) {
    use Stimulus::*;
    use VehicleState::*;

    match profile {
        Profile::Shared => (
            vec![
                entry(100, Vehicle(PortId::A, Plugged, 0), "car A plugs in"),
                entry(1_500, Vehicle(PortId::A, Requesting, 14_000), "car A requests"),
                entry(5_000, Vehicle(PortId::B, Plugged, 0), "car B plugs in"),
                entry(6_000, Vehicle(PortId::B, Requesting, 14_000), "car B requests"),
                entry(20_000, Vehicle(PortId::A, Plugged, 0), "car A finishes"),
                entry(25_000, Vehicle(PortId::A, Unplugged, 0), "car A unplugs"),
                entry(30_000, Vehicle(PortId::B, Plugged, 0), "car B finishes"),
                entry(32_000, Vehicle(PortId::B, Unplugged, 0), "car B unplugs"),
            ],
            35_000,
        ),
        Profile::Sequential => (
            vec![
                entry(0, Vehicle(PortId::A, Plugged, 0), "car A plugs in"),
                entry(0, Vehicle(PortId::B, Plugged, 0), "car B plugs in"),
                entry(500, Vehicle(PortId::A, Requesting, 20_000), "car A requests"),
                entry(8_000, Vehicle(PortId::A, Plugged, 0), "car A finishes"),
                entry(9_000, Vehicle(PortId::B, Requesting, 20_000), "car B requests"),
                entry(15_000, Vehicle(PortId::B, Plugged, 0), "car B finishes"),
                entry(16_000, Vehicle(PortId::A, Unplugged, 0), "car A unplugs"),
                entry(16_000, Vehicle(PortId::B, Unplugged, 0), "car B unplugs"),
            ],
            18_000,
        ),
        Profile::Gfi => (
            vec![
                entry(100, Vehicle(PortId::A, Plugged, 0), "car A plugs in"),
                entry(1_500, Vehicle(PortId::A, Requesting, 14_000), "car A requests"),
                entry(10_000, TripGfi, "ground fault interrupt"),
            ],
            12_000,
        ),
    }
}

fn entry(at_ms: u32, stimulus: Stimulus, note: &'static str) -> ScriptEntry {
    ScriptEntry {
        at_ms,
        stimulus,
        note,
    }
}
