//! Current transformer sampling and display averaging.
//!
//! [`rms_from_window`] turns one CT sampling window into an RMS milliamp
//! figure: it locates debounced zero crossings, accumulates squared samples
//! over exactly one complete AC cycle, and scales by the burden-resistor
//! factor plus the per-port calibration offset. Overdraw enforcement reads
//! that raw figure; [`EwaSum`] smooths it for the display only.

use libm::{expf, fabsf, sqrtf};

/// Longest time the HAL may spend filling one CT window, in milliseconds.
/// One and a half cycles at 50 Hz is 30 ms.
pub const CURRENT_SAMPLE_INTERVAL: u32 = 35;

/// Lockout after a detected zero crossing, roughly a quarter cycle at 50 Hz.
pub const CURRENT_ZERO_DEBOUNCE_US: u32 = 5_000;

/// Milliamps per ADC count for the reference 47 Ω burden resistor.
pub const CURRENT_SCALE_FACTOR: u32 = 106;

/// Buffer capacity covering a full window at ~0.1 ms per conversion.
pub const CURRENT_BUF_LEN: usize = 384;

/// EWA half-weight period for the ammeter display, in milliseconds.
pub const AMM_DISPLAY_HALF_PERIOD: f32 = 1_500.0;

/// ADC midpoint of the CT divider.
const CURRENT_ZERO: i32 = 512;

/// One CT conversion: microseconds from window start plus the raw reading.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct CurrentSample {
    pub offset_us: u32,
    pub value: u16,
}

/// Computes RMS milliamps from one sampling window.
///
/// `calib_tenths` is the per-port ammeter calibration in 0.1 A units,
/// clamped to ±0.5 A. Returns `None` unless three debounced zero crossings
/// (one complete cycle) fit inside the window, which is the case whenever AC
/// is actually flowing.
pub fn rms_from_window(samples: &[CurrentSample], calib_tenths: i8) -> Option<u32> {
    let mut crossings = 0u8;
    let mut last_crossing_us = 0u32;
    let mut last_sign: Option<bool> = None;
    let mut sum_sq = 0.0f32;
    let mut count = 0u32;

    for sample in samples {
        let delta = sample.value as i32 - CURRENT_ZERO;
        let sign = delta >= 0;

        if let Some(previous) = last_sign {
            if sign != previous
                && (crossings == 0
                    || sample.offset_us.wrapping_sub(last_crossing_us)
                        >= CURRENT_ZERO_DEBOUNCE_US)
            {
                crossings += 1;
                last_crossing_us = sample.offset_us;
                if crossings == 3 {
                    break;
                }
            }
        }
        last_sign = Some(sign);

        if crossings >= 1 {
            sum_sq += (delta * delta) as f32;
            count += 1;
        }
    }

    if crossings < 3 || count == 0 {
        return None;
    }

    let rms_counts = sqrtf(sum_sq / count as f32);
    let milliamps = rms_counts * CURRENT_SCALE_FACTOR as f32;
    let calib_ma = i32::from(calib_tenths.clamp(-5, 5)) * 100;
    Some((milliamps as i32 + calib_ma).max(0) as u32)
}

/// Exponentially weighted average for irregularly sampled data.
///
/// `half_period` is the distance into the past at which an observation
/// weighs exactly half of one taken now. Updates may arrive out of
/// timeline order; older points are folded in at their discounted weight
/// without disturbing the reference time.
#[derive(Copy, Clone, Debug)]
pub struct EwaSum {
    alpha: f32,
    w: f32,
    s: f32,
    tn: f32,
}

/// −ln(0.5)
const MINUS_LOG_05: f32 = 0.693_147_2;

impl EwaSum {
    pub fn new(half_period: f32) -> Self {
        EwaSum {
            alpha: half_period / MINUS_LOG_05,
            w: 0.0,
            s: 0.0,
            tn: 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.w = 0.0;
        self.s = 0.0;
        self.tn = 0.0;
    }

    /// Folds in observation `x` taken at timeline point `t`.
    pub fn update(&mut self, x: f32, t: f32) {
        let pi = expf(-fabsf(self.tn - t) / self.alpha);
        if t > self.tn {
            self.s = pi * self.s + x;
            self.w = pi * self.w + 1.0;
            self.tn = t;
        } else {
            self.s += pi * x;
            self.w += pi;
        }
    }

    /// Evaluates the average; 0 with no samples. The most recent sample is
    /// never discounted, so `w ≥ 1` whenever any sample exists.
    pub fn ewa(&self) -> f32 {
        if fabsf(self.w) < 1e-6 {
            0.0
        } else {
            self.s / self.w
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_window(rms_counts: f32, hz: f32) -> std::vec::Vec<CurrentSample> {
        let amplitude = rms_counts * core::f32::consts::SQRT_2;
        (0..350)
            .map(|i| {
                let t_us = i * 100;
                let t_s = t_us as f32 / 1.0e6;
                let v = amplitude * (2.0 * core::f32::consts::PI * hz * t_s).sin();
                CurrentSample {
                    offset_us: t_us,
                    value: (CURRENT_ZERO + v as i32) as u16,
                }
            })
            .collect()
    }

    #[test]
    fn rms_recovers_sine_amplitude() {
        // 100 RMS counts should scale to ~10.6 A.
        let window = sine_window(100.0, 60.0);
        let ma = rms_from_window(&window, 0).expect("cycle should be found");
        assert!((10_000..11_200).contains(&ma), "got {ma}");
    }

    #[test]
    fn calibration_offset_shifts_result() {
        let window = sine_window(100.0, 60.0);
        let base = rms_from_window(&window, 0).unwrap();
        let up = rms_from_window(&window, 3).unwrap();
        let down = rms_from_window(&window, -3).unwrap();
        assert_eq!(up, base + 300);
        assert_eq!(down, base - 300);
        // Out-of-range calibration clamps to ±0.5 A.
        assert_eq!(rms_from_window(&window, 100).unwrap(), base + 500);
    }

    #[test]
    fn flat_window_yields_nothing() {
        let window: std::vec::Vec<_> = (0..350)
            .map(|i| CurrentSample {
                offset_us: i * 100,
                value: CURRENT_ZERO as u16,
            })
            .collect();
        assert_eq!(rms_from_window(&window, 0), None);
    }

    #[test]
    fn ewa_weighs_half_period_sample_at_half() {
        let mut sum = EwaSum::new(1_500.0);
        sum.update(10.0, 0.0);
        sum.update(20.0, 1_500.0);
        // (0.5 * 10 + 20) / 1.5
        assert!((sum.ewa() - 16.666_7).abs() < 0.01);
    }

    #[test]
    fn ewa_accepts_out_of_order_updates() {
        let mut forward = EwaSum::new(1_500.0);
        forward.update(10.0, 0.0);
        forward.update(20.0, 1_500.0);

        let mut backward = EwaSum::new(1_500.0);
        backward.update(20.0, 1_500.0);
        backward.update(10.0, 0.0);

        assert!((forward.ewa() - backward.ewa()).abs() < 0.01);
    }

    #[test]
    fn ewa_defaults_to_zero() {
        let sum = EwaSum::new(1_500.0);
        assert_eq!(sum.ewa(), 0.0);
    }
}
