//! Knob-to-gain mapping.
//!
//! The volume knob is a 15-bit ADC reading. A new reading only takes
//! effect after it has been seen [`VOLUME_DEBOUNCE`] times in a row and has
//! moved by more than [`VOLUME_HYSTERESIS`] counts from the applied value,
//! so pot noise never reaches the samples.

use platform::config::{KNOB_RES, VOLUME_DEBOUNCE, VOLUME_HYSTERESIS};

use crate::format::Multiplier;

/// Full-scale knob reading.
pub const KNOB_MAX: i16 = ((1u32 << KNOB_RES) - 1) as i16;

/// Map a knob reading linearly onto `0 ..= UNITY`.
pub fn knob_to_multiplier(raw: i16) -> Multiplier {
    let clamped = u32::try_from(raw.clamp(0, KNOB_MAX)).unwrap_or(0);
    let scaled = clamped
        .saturating_mul(u32::from(Multiplier::UNITY.raw()))
        .checked_div(u32::try_from(KNOB_MAX).unwrap_or(1))
        .unwrap_or(0);
    Multiplier::from_raw(u16::try_from(scaled).unwrap_or(u16::MAX))
}

/// Debounced volume state, owned by the main loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeState {
    multiplier: Multiplier,
    applied: Option<i16>,
    candidate: i16,
    agree: u8,
}

impl VolumeState {
    /// Unity gain, no knob reading applied yet.
    pub const fn new() -> Self {
        Self {
            multiplier: Multiplier::UNITY,
            applied: None,
            candidate: 0,
            agree: 0,
        }
    }

    /// Gain currently in effect.
    pub fn multiplier(&self) -> Multiplier {
        self.multiplier
    }

    /// Knob reading the gain was derived from.
    pub fn last_knob(&self) -> Option<i16> {
        self.applied
    }

    /// Feed one new-data reading. Returns the new gain when it changes.
    pub fn update(&mut self, raw: i16) -> Option<Multiplier> {
        if self.applied.is_some_and(|a| !moved(a, raw)) {
            self.agree = 0;
            return None;
        }
        if self.agree > 0 && !moved(self.candidate, raw) {
            self.agree = self.agree.saturating_add(1);
        } else {
            self.candidate = raw;
            self.agree = 1;
        }
        if self.agree < VOLUME_DEBOUNCE {
            return None;
        }
        self.agree = 0;
        self.applied = Some(raw);
        self.multiplier = knob_to_multiplier(raw);
        Some(self.multiplier)
    }
}

impl Default for VolumeState {
    fn default() -> Self {
        Self::new()
    }
}

fn moved(from: i16, to: i16) -> bool {
    i32::from(from).abs_diff(i32::from(to)) > u32::from(VOLUME_HYSTERESIS.unsigned_abs())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_knob_extremes() {
        assert_eq!(knob_to_multiplier(0), Multiplier::MUTE);
        assert_eq!(knob_to_multiplier(KNOB_MAX), Multiplier::UNITY);
        assert_eq!(knob_to_multiplier(-5), Multiplier::MUTE);
    }

    #[test]
    fn test_knob_midpoint() {
        let m = knob_to_multiplier(KNOB_MAX / 2);
        assert_eq!(m.raw(), 8191);
    }

    #[test]
    fn test_first_reading_applies_after_debounce() {
        let mut v = VolumeState::new();
        assert_eq!(v.update(16_000), None);
        assert_eq!(v.update(16_010), None);
        assert!(v.update(16_020).is_some());
        assert_eq!(v.last_knob(), Some(16_020));
    }

    #[test]
    fn test_jitter_inside_hysteresis_is_ignored() {
        let mut v = VolumeState::new();
        for _ in 0..3 {
            v.update(10_000);
        }
        let before = v.multiplier();
        for r in [10_030, 9_970, 10_064, 9_936] {
            assert_eq!(v.update(r), None);
        }
        assert_eq!(v.multiplier(), before);
    }

    #[test]
    fn test_disagreeing_readings_restart_debounce() {
        let mut v = VolumeState::new();
        v.update(1_000);
        v.update(1_000);
        assert_eq!(v.update(20_000), None);
        assert_eq!(v.update(20_000), None);
        assert_eq!(v.update(20_000), Some(knob_to_multiplier(20_000)));
    }
}
