//! Boot sequence for HP-DAC.
//!
//! Initialization order (must be respected):
//!   1. Derive both subsystem configurations from the hardware design
//!   2. Serial channel: allocate and program its descriptors
//!   3. Spy: arm delimiter detection with the receive sizing
//!   4. Serial channel: start the receive chain
//!   5. Audio pipeline: allocate and program its descriptors
//!   6. Audio pipeline: start accepting packets
//!
//! Nothing here allocates at run time. Descriptor exhaustion or an
//! inconsistent design is reported as a [`BootError`] and nothing is
//! started past the failing step.

use audio_out::{AudioError, AudioOut, AudioOutConfig, AudioShared};
use comm::{rx_spy_start, Comm, CommConfig, CommError, CommShared};
use platform::{Bus, Design};
use thiserror_no_std::Error;

use crate::app::{Firmware, Interrupts};

/// Ordered list of boot sequence steps for documentation and testing.
///
/// # Correctness Invariants
///
/// - The spy must be armed before the receive chain starts, or the first
///   delimiter after power-up is not seen.
/// - The serial channel comes up before audio so faults hit during audio
///   bring-up can already be reported.
pub const BOOT_SEQUENCE_STEPS: &[&str] = &[
    "1. Config: derive serial and audio configuration from the design",
    "2. Comm: allocate TX and RX descriptor chains",
    "3. Spy: arm delimiter detection",
    "4. Comm: start the receive chain",
    "5. Audio: allocate USB, byte-swap and I2S descriptors",
    "6. Audio: start the stream",
];

/// Failure during bring-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootError {
    /// The serial channel could not be created.
    #[error("comm: {0}")]
    Comm(#[from] CommError),
    /// The audio pipeline could not be created.
    #[error("audio: {0}")]
    Audio(#[from] AudioError),
}

/// State shared between the main loop and interrupt handlers, suitable
/// for a `static`.
pub struct Shared {
    /// Serial channel.
    pub comm: CommShared,
    /// Audio pipeline.
    pub audio: AudioShared,
}

impl Shared {
    /// Empty state.
    pub const fn new() -> Self {
        Self {
            comm: CommShared::new(),
            audio: AudioShared::new(),
        }
    }
}

impl Default for Shared {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration of every subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootConfig {
    /// Serial channel.
    pub comm: CommConfig,
    /// Audio pipeline.
    pub audio: AudioOutConfig,
}

impl BootConfig {
    /// Production sizing applied to `design`.
    pub fn from_design(design: &Design) -> Self {
        Self {
            comm: CommConfig::from_design(design),
            audio: AudioOutConfig::from_design(design),
        }
    }
}

/// Bring everything up, returning the main-loop and interrupt halves.
pub fn boot<'a, B: Bus + ?Sized>(
    bus: &mut B,
    shared: &'a Shared,
    config: BootConfig,
) -> Result<(Firmware<'a>, Interrupts<'a>), BootError> {
    let (mut comm, comm_isr) = Comm::create(bus, &shared.comm, config.comm)?;
    rx_spy_start(bus, config.comm.delimiter, config.comm.rx_transfer_size);
    comm.start(bus);

    let (mut audio, audio_isr) = AudioOut::create(bus, &shared.audio, config.audio)?;
    audio.start(bus);

    #[cfg(feature = "defmt")]
    defmt::info!("boot: {} steps complete", BOOT_SEQUENCE_STEPS.len());

    Ok((
        Firmware::new(shared, comm, audio, Some(config.audio.format)),
        Interrupts::new(comm_isr, audio_isr),
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn spy_is_armed_before_receive_starts() {
        let position =
            |needle: &str| BOOT_SEQUENCE_STEPS.iter().position(|s| s.contains(needle)).unwrap();
        assert!(position("Spy") < position("receive chain"));
        assert!(position("Comm: allocate") < position("Audio: allocate"));
    }

    #[test]
    fn steps_are_numbered_in_order() {
        for (i, step) in BOOT_SEQUENCE_STEPS.iter().enumerate() {
            assert!(step.starts_with(&format!("{}.", i + 1)), "{step}");
        }
    }
}
