//! Control-pilot output encoding and feedback classification.
//!
//! The pilot driver side maps an advertised current to a 1 kHz PWM duty per
//! J1772 §A4 (duty% = amps / 0.6 over the 6–51 A range), with an optional
//! calibration derate. The sensor side is a pure classifier from one sampled
//! feedback window to a J1772 state; debouncing is the port state machine's
//! job.

/// Length of one pilot feedback sampling window, in milliseconds.
pub const STATE_CHECK_INTERVAL: u32 = 20;

// Expected ADC ranges for pilot read-back, scaled from the divider network
// voltages onto 0–1023. The 0 V point sits at 556, not 512.
pub const STATE_A_MIN: u16 = 870;
pub const STATE_B_MAX: u16 = 869;
pub const STATE_B_MIN: u16 = 775;
pub const STATE_C_MAX: u16 = 774;
pub const STATE_C_MIN: u16 = 682;
pub const STATE_D_MAX: u16 = 681;
pub const STATE_D_MIN: u16 = 610;
pub const PILOT_0V: u16 = 556;
/// Highest reading the negative peak may take while the vehicle diode is
/// present and a PWM is being advertised.
pub const PILOT_DIODE_MAX: u16 = 250;

/// Smallest current J1772 allows to be advertised via PWM.
pub const MIN_PWM_MILLIAMPS: u32 = 6_000;

/// Floor and ceiling for the encoded duty, in tenths of a percent
/// (10% = 6 A, 85% = 51 A).
const DUTY_FLOOR_TENTHS: u16 = 100;
const DUTY_CEIL_TENTHS: u16 = 850;

/// PWM duty in tenths of a percent.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DutyTenths(u16);

impl DutyTenths {
    pub const fn tenths(self) -> u16 {
        self.0
    }
}

/// What a port's pilot line is advertising.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum PilotLevel {
    /// Output driven low (−12 V outward); no vehicle state can be derived.
    #[default]
    Off,
    /// Steady +12 V: EVSE present, no current on offer.
    Standby,
    /// PWM advertising the full allocation.
    Full,
    /// PWM advertising half the allocation.
    Half,
}

impl PilotLevel {
    /// Returns `true` when the level produces a PWM waveform.
    pub const fn is_pwm(self) -> bool {
        matches!(self, PilotLevel::Full | PilotLevel::Half)
    }
}

/// Physical output command handed to the HAL.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PilotOutput {
    Low,
    High,
    Pwm(DutyTenths),
}

/// Classified pilot feedback.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum PilotRead {
    StateA,
    StateB,
    StateC,
    StateD,
    StateE,
    DiodeFault,
    #[default]
    Unknown,
}

/// Positive and negative feedback peaks captured over one sampling window.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PilotWindow {
    pub v_hi: u16,
    pub v_lo: u16,
}

impl PilotWindow {
    /// Window as read from an unterminated pilot: +12 V steady.
    pub const fn idle() -> Self {
        PilotWindow {
            v_hi: STATE_A_MIN,
            v_lo: STATE_A_MIN,
        }
    }
}

/// Encodes an advertised current as a PWM duty.
///
/// `derate_pct` is the per-port pilot calibration in the −10…0 range; it is
/// applied first and the result clamped up to the 10% floor, so a derated
/// pilot never advertises below 6 A. Currents under 6 A cannot be encoded at
/// all and the caller must hold the pilot in standby instead.
pub fn duty_for_amps(milliamps: u32, derate_pct: i8) -> Option<DutyTenths> {
    if milliamps < MIN_PWM_MILLIAMPS {
        return None;
    }

    // duty% = amps / 0.6, so tenths-of-percent = milliamps / 60.
    let base = milliamps / 60;
    let derate = derate_pct.clamp(-10, 0) as i32;
    let derated = (base as i32 * (100 + derate) / 100) as u32;

    let clamped = derated.clamp(DUTY_FLOOR_TENTHS as u32, DUTY_CEIL_TENTHS as u32);
    Some(DutyTenths(clamped as u16))
}

/// Classifies one feedback window into a J1772 state.
///
/// The diode check only applies while a PWM is being advertised: with a
/// steady output the line never swings negative, so `v_lo` carries no
/// information. The caller must not classify at all while the pilot is
/// driven [`PilotLevel::Off`].
pub fn classify(window: PilotWindow, pwm_active: bool) -> PilotRead {
    if pwm_active && window.v_lo > PILOT_DIODE_MAX {
        return PilotRead::DiodeFault;
    }

    match window.v_hi {
        v if v >= STATE_A_MIN => PilotRead::StateA,
        v if v >= STATE_B_MIN && v <= STATE_B_MAX => PilotRead::StateB,
        v if v >= STATE_C_MIN && v <= STATE_C_MAX => PilotRead::StateC,
        v if v >= STATE_D_MIN && v <= STATE_D_MAX => PilotRead::StateD,
        v if v <= PILOT_0V => PilotRead::StateE,
        _ => PilotRead::Unknown,
    }
}
