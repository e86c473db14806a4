//! Sample wire formats and fixed-point gain.
//!
//! USB delivers little-endian PCM. The byte-swap block reverses every
//! sample on its way into the audio ring, so everything the CPU touches
//! in the ring is big-endian, MSB first, as the I2S transmitter shifts it.
//!
//! | Format | Sample bytes | Frame bytes (stereo) | Range                |
//! |--------|--------------|----------------------|----------------------|
//! | `S16`  | 2            | 4                    | −32768 … 32767       |
//! | `S24`  | 3            | 6                    | −8388608 … 8388607   |

/// Channels per frame.
pub const CHANNELS: u16 = 2;

/// Signed PCM layout of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SampleFormat {
    /// 16-bit signed.
    S16,
    /// 24-bit signed, packed.
    #[default]
    S24,
}

impl SampleFormat {
    /// Bytes per sample.
    pub const fn sample_bytes(self) -> u16 {
        match self {
            SampleFormat::S16 => 2,
            SampleFormat::S24 => 3,
        }
    }

    /// Bytes per stereo frame.
    pub const fn frame_bytes(self) -> u16 {
        match self {
            SampleFormat::S16 => 4,
            SampleFormat::S24 => 6,
        }
    }

    /// Smallest representable sample.
    pub const fn min(self) -> i32 {
        match self {
            SampleFormat::S16 => -32_768,
            SampleFormat::S24 => -8_388_608,
        }
    }

    /// Largest representable sample.
    pub const fn max(self) -> i32 {
        match self {
            SampleFormat::S16 => 32_767,
            SampleFormat::S24 => 8_388_607,
        }
    }

    /// Decode one big-endian sample. Short input reads as silence.
    pub fn decode(self, bytes: &[u8]) -> i32 {
        match (self, bytes) {
            (SampleFormat::S16, [hi, lo, ..]) => i32::from(i16::from_be_bytes([*hi, *lo])),
            (SampleFormat::S24, [hi, mid, lo, ..]) => {
                let ext = if hi & 0x80 != 0 { 0xFF } else { 0x00 };
                i32::from_be_bytes([ext, *hi, *mid, *lo])
            }
            _ => 0,
        }
    }

    /// Encode one sample big-endian, clamped to the format's range.
    pub fn encode(self, value: i32, out: &mut [u8]) {
        let [_, b1, b2, b3] = value.clamp(self.min(), self.max()).to_be_bytes();
        match (self, out) {
            (SampleFormat::S16, [hi, lo, ..]) => {
                *hi = b2;
                *lo = b3;
            }
            (SampleFormat::S24, [hi, mid, lo, ..]) => {
                *hi = b1;
                *mid = b2;
                *lo = b3;
            }
            _ => {}
        }
    }

    /// Scale every sample of a big-endian buffer in place.
    ///
    /// A trailing partial sample is left untouched.
    pub fn scale_in_place(self, buf: &mut [u8], gain: Multiplier) {
        for sample in buf.chunks_exact_mut(usize::from(self.sample_bytes())) {
            let scaled = gain.apply(self.decode(sample), self);
            self.encode(scaled, sample);
        }
    }
}

/// Unsigned Q2.14 volume multiplier.
///
/// `0` mutes, [`Multiplier::UNITY`] passes samples through, the largest
/// value is just under 4.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Multiplier(u16);

impl Multiplier {
    /// Fractional bits.
    pub const FRAC_BITS: u32 = 14;
    /// Silence.
    pub const MUTE: Self = Self(0);
    /// 1.0
    pub const UNITY: Self = Self(1 << 14);
    /// 2.0
    pub const DOUBLE: Self = Self(2 << 14);

    /// Wrap a raw Q2.14 value.
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    /// Raw Q2.14 value.
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// `sample * self`, saturated to the range of `format`.
    pub fn apply(self, sample: i32, format: SampleFormat) -> i32 {
        let product = i64::from(sample).saturating_mul(i64::from(self.0));
        let scaled = product.wrapping_shr(Self::FRAC_BITS);
        let clamped = scaled.clamp(i64::from(format.min()), i64::from(format.max()));
        i32::try_from(clamped).unwrap_or(0)
    }
}

impl Default for Multiplier {
    fn default() -> Self {
        Self::UNITY
    }
}
