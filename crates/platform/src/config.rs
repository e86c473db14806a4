//! Application configuration and constants
//!
//! Buffer sizes, descriptor budgets and timing shared by the firmware and
//! the host tools. Everything is a compile-time constant; there is no
//! runtime configuration store on the device.

/// The application name
pub const APP_NAME: &str = "HP-DAC";

/// Application version (synchronized with Cargo.toml)
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// ── Serial channel ──────────────────────────────────────────────────────────

/// Receive ring size in bytes.
pub const RX_BUF_SIZE: u16 = 1024;

/// Bytes per receive descriptor.
pub const RX_TRANSFER_SIZE: u16 = 255;

/// Transmit ring size in bytes.
pub const TX_BUF_SIZE: u16 = 1024;

/// Largest byte count of one transmit descriptor.
pub const TX_TRANSFER_SIZE: u16 = 255;

/// Transmit descriptors, the most chunks that can be queued at once.
pub const COMM_MAX_TX_TD: usize = 8;

/// Receive descriptor budget. Must cover `ceil(RX_BUF_SIZE / RX_TRANSFER_SIZE)`.
pub const COMM_MAX_RX_TD: usize = 8;

/// Frame delimiter on the serial line.
pub const COMM_DELIM: u8 = b'\n';

/// Line-idle time, in spy clock ticks, after which pending bytes are flushed.
pub const IDLE_FLUSH_TICKS: u32 = 4;

// ── Audio ───────────────────────────────────────────────────────────────────

/// Nominal stream sample rate.
pub const SAMPLE_RATE_HZ: u32 = 48_000;

/// Largest isochronous OUT packet: 49 stereo 24-bit frames.
pub const USB_MAX_BUF_SIZE: u16 = 294;

/// Bytes per I2S descriptor: one millisecond of 24-bit stereo.
pub const AUDIO_OUT_TRANSFER_SIZE: u16 = 288;

/// I2S descriptors in the output ring.
pub const AUDIO_OUT_N_TD: usize = 8;

/// Output ring size in bytes.
pub const AUDIO_OUT_BUF_SIZE: u16 = 2304;

/// Audio frames per USB (micro)frame at the nominal rate.
pub const FRAMES_PER_USB_FRAME: u32 = SAMPLE_RATE_HZ / 1000;

// ── Controls ────────────────────────────────────────────────────────────────

/// Analog knobs sampled by the ADC sequencer.
pub const N_KNOBS: usize = 3;

/// Knob ADC resolution in bits.
pub const KNOB_RES: u32 = 15;

/// Knob index that drives the volume.
pub const VOLUME_KNOB: usize = 0;

/// Knob index reported as periodic telemetry.
pub const TELEMETRY_KNOB: usize = 2;

/// Consecutive agreeing knob readings before a volume change is applied.
pub const VOLUME_DEBOUNCE: u8 = 3;

/// Knob movement (in ADC counts) that counts as a change.
pub const VOLUME_HYSTERESIS: i16 = 64;

// Compile-time layout checks.
const _: () =
    assert!(AUDIO_OUT_BUF_SIZE as usize == AUDIO_OUT_TRANSFER_SIZE as usize * AUDIO_OUT_N_TD);
const _: () = assert!(RX_BUF_SIZE.div_ceil(RX_TRANSFER_SIZE) as usize <= COMM_MAX_RX_TD);
const _: () = assert!(AUDIO_OUT_TRANSFER_SIZE % 6 == 0);
const _: () = assert!(USB_MAX_BUF_SIZE % 6 == 0);
