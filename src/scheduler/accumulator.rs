//! Fractional admission accumulator

use std::time::Duration;

/// Slack for floating point sums that land just below a whole number
const ADMIT_EPSILON: f64 = 1e-9;

/// Admission rate in units per second, `None` for unusable inputs
pub fn units_per_second(target_units: u64, window_minutes: f64) -> Option<f64> {
    if target_units == 0 || !window_minutes.is_finite() || window_minutes <= 0.0 {
        return None;
    }
    Some(target_units as f64 / window_minutes / 60.0)
}

/// Carries the fractional remainder of admissions between ticks
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RateAccumulator {
    carried: f64,
}

impl RateAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn carried(&self) -> f64 {
        self.carried
    }

    pub fn reset(&mut self) {
        self.carried = 0.0;
    }

    /// Add one tick of admission and return the whole units to admit now
    ///
    /// A non-positive or non-finite window leaves the accumulator untouched.
    pub fn advance(&mut self, target_units: u64, window_minutes: f64, tick: Duration) -> u64 {
        let Some(per_second) = units_per_second(target_units, window_minutes) else {
            return 0;
        };
        self.carried += per_second * tick.as_secs_f64();
        let admit = (self.carried + ADMIT_EPSILON).floor();
        self.carried = (self.carried - admit).max(0.0);
        admit as u64
    }
}
