//! Board collaborators the main loop polls.
//!
//! The USB device stack and the knob ADC live outside this crate. The main
//! loop only needs their current state, so each is reduced to a small
//! polling trait that hardware drivers and test doubles implement alike.

use audio_out::SampleFormat;
use platform::config::N_KNOBS;

/// One completed scan of every knob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KnobSample {
    /// Raw conversions, one per knob.
    pub values: [i16; N_KNOBS],
    /// Channel the scanner will convert next; 0 once a full pass wrapped.
    pub channel: u8,
}

impl KnobSample {
    /// Raw value of knob `index`, 0 if there is no such knob.
    pub fn value(&self, index: usize) -> i16 {
        self.values.get(index).copied().unwrap_or(0)
    }
}

/// Source of knob conversions.
pub trait KnobSampler {
    /// Take the newest scan if one completed since the last call.
    fn take(&mut self) -> Option<KnobSample>;
}

/// Alternate setting of the audio streaming interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AltSetting {
    /// Zero bandwidth, no isochronous traffic.
    #[default]
    Idle,
    /// 16-bit stereo.
    Pcm16,
    /// 24-bit stereo.
    Pcm24,
}

impl AltSetting {
    /// Map the host-selected alternate setting number.
    ///
    /// Unknown numbers read as [`AltSetting::Idle`].
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => AltSetting::Pcm16,
            2 => AltSetting::Pcm24,
            _ => AltSetting::Idle,
        }
    }

    /// Sample format streamed in this setting, if any.
    pub fn format(self) -> Option<SampleFormat> {
        match self {
            AltSetting::Idle => None,
            AltSetting::Pcm16 => Some(SampleFormat::S16),
            AltSetting::Pcm24 => Some(SampleFormat::S24),
        }
    }
}

/// The USB device stack as seen by the main loop.
pub trait UsbAudio {
    /// Whether the host has configured the device.
    fn is_configured(&self) -> bool;

    /// Alternate setting of the streaming interface.
    fn alt_setting(&self) -> AltSetting;

    /// Format the host is streaming right now, if any.
    fn active_format(&self) -> Option<SampleFormat> {
        if self.is_configured() {
            self.alt_setting().format()
        } else {
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    struct Host {
        configured: bool,
        alt: u8,
    }

    impl UsbAudio for Host {
        fn is_configured(&self) -> bool {
            self.configured
        }

        fn alt_setting(&self) -> AltSetting {
            AltSetting::from_raw(self.alt)
        }
    }

    #[test]
    fn alt_settings_map_to_formats() {
        assert_eq!(AltSetting::from_raw(0).format(), None);
        assert_eq!(AltSetting::from_raw(1).format(), Some(SampleFormat::S16));
        assert_eq!(AltSetting::from_raw(2).format(), Some(SampleFormat::S24));
        assert_eq!(AltSetting::from_raw(7), AltSetting::Idle);
    }

    #[test]
    fn unconfigured_device_streams_nothing() {
        let host = Host { configured: false, alt: 2 };
        assert_eq!(host.active_format(), None);
        let host = Host { configured: true, alt: 2 };
        assert_eq!(host.active_format(), Some(SampleFormat::S24));
    }

    #[test]
    fn missing_knob_reads_zero() {
        let sample = KnobSample { values: [1, 2, 3], channel: 0 };
        assert_eq!(sample.value(2), 3);
        assert_eq!(sample.value(9), 0);
    }
}
