//! Ground-fault interrupt latch and self-test.
//!
//! The GFI interrupt handler is the only asynchronous producer in the
//! system. Its contract: command both pilot outputs off (safe and
//! idempotent at the hardware layer) and call [`GfiLatch::trip`], nothing
//! else. All policy (teardown sequencing, the 15-minute hold, the retry
//! budget) runs on the main tick.

use portable_atomic::{AtomicBool, Ordering};

use crate::clock::MILLIS_PER_MINUTE;
use crate::hal::EvseHal;

/// Self-test pulse cycles at roughly 60 Hz.
pub const GFI_TEST_CYCLES: u32 = 50;
/// Half-cycle pulse width in microseconds.
pub const GFI_PULSE_DURATION_US: u32 = 8_000;
/// Time the GFCI takes to clear after a test trip, in ms.
pub const GFI_TEST_CLEAR_TIME: u32 = 100;
/// Extra settling time to confirm the trip stays cleared, in ms.
pub const GFI_TEST_DEBOUNCE_TIME: u32 = 400;

/// Post-trip hold before charging may be retried (UL 2231), in ms.
/// Must exceed the pilot-withdrawal error delay.
pub const GFI_CLEAR_MS: u32 = 15 * MILLIS_PER_MINUTE;
/// Trips tolerated before the unit latches until power cycle.
pub const GFI_CLEAR_ATTEMPTS: u8 = 4;

/// Word-sized flag shared between the GFI interrupt and the tick loop.
#[derive(Debug, Default)]
pub struct GfiLatch {
    tripped: AtomicBool,
}

impl GfiLatch {
    pub const fn new() -> Self {
        GfiLatch {
            tripped: AtomicBool::new(false),
        }
    }

    /// Interrupt-side entry point. Safe to call from any context.
    pub fn trip(&self) {
        self.tripped.store(true, Ordering::SeqCst);
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.tripped.store(false, Ordering::SeqCst);
    }
}

/// Why the GFI self-test failed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SelfTestError {
    /// The interrupt never fired despite the injected imbalance.
    NoTrip,
    /// The interrupt would not stay cleared afterwards.
    StuckTripped,
}

/// Exercises the GFI by pulsing the dedicated self-test line.
///
/// Run at startup and again before enabling charging. Blocks for roughly
/// a second, which is acceptable only outside the tick loop.
pub fn self_test<H: EvseHal>(hal: &mut H, latch: &GfiLatch) -> Result<(), SelfTestError> {
    latch.clear();

    for _ in 0..GFI_TEST_CYCLES {
        hal.set_gfi_test(true);
        hal.delay_us(GFI_PULSE_DURATION_US);
        hal.set_gfi_test(false);
        hal.delay_us(GFI_PULSE_DURATION_US);
        if latch.is_tripped() {
            break;
        }
    }

    if !latch.is_tripped() {
        return Err(SelfTestError::NoTrip);
    }

    latch.clear();
    hal.delay_us(GFI_TEST_CLEAR_TIME * 1_000);
    hal.delay_us(GFI_TEST_DEBOUNCE_TIME * 1_000);

    if latch.is_tripped() {
        return Err(SelfTestError::StuckTripped);
    }
    Ok(())
}
