//! Asynchronous rate feedback.
//!
//! Full-speed USB audio feedback is a 10.14 fixed-point count of samples
//! per 1 ms frame, sent as three little-endian bytes. The device reports
//! the nominal rate trimmed by how far the audio ring sits from half full:
//! an emptying ring asks the host for up to one extra sample per frame, a
//! filling ring for up to one fewer.

use platform::config::FRAMES_PER_USB_FRAME;

/// One sample per frame in 10.14.
const ONE_FRAME: i64 = 1 << 14;

/// Nominal feedback value at the configured sample rate.
pub const NOMINAL_RATE: u32 = FRAMES_PER_USB_FRAME << 14;

/// Buffer state captured when the feedback endpoint was serviced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FeedbackSample {
    /// Bytes queued in the audio ring, landed but not yet transmitted.
    pub occupancy: u16,
    /// Requested rate, 10.14 samples per frame.
    pub rate: u32,
}

impl FeedbackSample {
    /// Derive the feedback value for `occupancy` bytes in a ring of `capacity`.
    pub fn from_occupancy(occupancy: u32, capacity: u32) -> Self {
        Self {
            occupancy: u16::try_from(occupancy).unwrap_or(u16::MAX),
            rate: rate_for(occupancy, capacity),
        }
    }

    /// The three bytes the feedback endpoint sends.
    pub fn endpoint_bytes(&self) -> [u8; 3] {
        let [b0, b1, b2, _] = self.rate.to_le_bytes();
        [b0, b1, b2]
    }
}

fn rate_for(occupancy: u32, capacity: u32) -> u32 {
    let target = i64::from(capacity / 2);
    if target == 0 {
        return NOMINAL_RATE;
    }
    let error = target.saturating_sub(i64::from(occupancy));
    let trim = error
        .saturating_mul(ONE_FRAME)
        .checked_div(target)
        .unwrap_or(0)
        .clamp(-ONE_FRAME, ONE_FRAME);
    let rate = i64::from(NOMINAL_RATE).saturating_add(trim);
    u32::try_from(rate).unwrap_or(NOMINAL_RATE)
}
