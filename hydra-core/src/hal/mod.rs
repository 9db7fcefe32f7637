//! Hardware contracts consumed by the coordinator.
//!
//! The core never touches pins, timers, or ADCs directly. Firmware and host
//! harnesses implement [`EvseHal`] over the per-port channels (pilot out,
//! pilot sense, current sense, relay drive, relay sense) plus the global GFI
//! self-test line, and the tick loop drives everything through it. Pin
//! bindings and sampling plumbing are the implementation's business; the
//! contracts below only fix the units.

use crate::meter::CurrentSample;
use crate::pilot::{PilotOutput, PilotWindow};
use crate::port::PortId;

/// Abstraction over the per-port channels and the shared GFI test line.
pub trait EvseHal {
    /// Drives a port's control-pilot output.
    fn set_pilot(&mut self, port: PortId, output: PilotOutput);

    /// Captures positive and negative pilot feedback peaks over one
    /// `STATE_CHECK_INTERVAL` window.
    fn sample_pilot(&mut self, port: PortId) -> PilotWindow;

    /// Fills `buf` with CT samples covering up to `CURRENT_SAMPLE_INTERVAL`
    /// of wall time and returns the number written. Sample offsets are
    /// microseconds from the start of the window.
    fn sample_current(&mut self, port: PortId, buf: &mut [CurrentSample]) -> usize;

    /// Commands a port's contactor.
    fn set_relay(&mut self, port: PortId, closed: bool);

    /// Reads a port's AC-presence sense line.
    fn relay_sense(&mut self, port: PortId) -> bool;

    /// Drives the GFI self-test pulse line.
    fn set_gfi_test(&mut self, asserted: bool);

    /// Busy-waits. Used only by the boot-time GFI self-test; the tick loop
    /// itself never sleeps.
    fn delay_us(&mut self, us: u32);
}

/// Sink for packed per-port status words (see [`crate::status`]).
pub trait DisplaySink {
    fn show(&mut self, word: u16);
}

/// HAL that performs no hardware interaction.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopHal;

impl NoopHal {
    pub const fn new() -> Self {
        Self
    }
}

impl EvseHal for NoopHal {
    fn set_pilot(&mut self, _: PortId, _: PilotOutput) {}

    fn sample_pilot(&mut self, _: PortId) -> PilotWindow {
        PilotWindow::idle()
    }

    fn sample_current(&mut self, _: PortId, _: &mut [CurrentSample]) -> usize {
        0
    }

    fn set_relay(&mut self, _: PortId, _: bool) {}

    fn relay_sense(&mut self, _: PortId) -> bool {
        false
    }

    fn set_gfi_test(&mut self, _: bool) {}

    fn delay_us(&mut self, _: u32) {}
}

/// Display sink that discards every status word.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopDisplay;

impl DisplaySink for NoopDisplay {
    fn show(&mut self, _: u16) {}
}
