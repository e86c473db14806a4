//! HP-DAC Emulator
//!
//! The firmware on the simulated SoC, paced by a 1 ms tokio interval that
//! stands in for USB start-of-frame. Every tick the host delivers one
//! packet of a 1 kHz sine, the I2S clock shifts one transfer out and the
//! UART moves what 115200 baud would. A scripted serial host sends
//! commands and logs every frame that comes back.
//!
//! Run with: cargo run -p firmware --example emulator --features emulator -- [ms]
//! Filter with RUST_LOG, e.g. RUST_LOG=debug for telemetry frames.

#![allow(clippy::print_stdout)]
#![allow(clippy::arithmetic_side_effects)]
#![allow(clippy::indexing_slicing)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::use_debug)]

use std::time::Duration;

use comm::FrameSplitter;
use firmware::{boot, AltSetting, BootConfig, KnobSample, KnobSampler, Shared, UsbAudio};
use platform::config::{self, AUDIO_OUT_TRANSFER_SIZE, FRAMES_PER_USB_FRAME, N_KNOBS};
use platform::sim::SimSoc;
use platform::Memory;
use tracing_subscriber::EnvFilter;

/// Bytes 115200 baud 8N1 moves per millisecond, rounded up.
const UART_BYTES_PER_MS: usize = 12;

/// Feedback endpoint polling interval.
const FEEDBACK_PERIOD_MS: u32 = 8;

static SHARED: Shared = Shared::new();

/// Host commands and when to send them.
const SCRIPT: &[(u32, &str)] = &[
    (50, "PING"),
    (200, "STATUS"),
    (400, "STATS"),
    (600, "FAULTS"),
    (800, "BOGUS"),
];

struct Host;

impl UsbAudio for Host {
    fn is_configured(&self) -> bool {
        true
    }

    fn alt_setting(&self) -> AltSetting {
        AltSetting::Pcm24
    }
}

/// Knob scanner converting one channel per millisecond, round robin.
/// The volume knob sweeps down slowly, the telemetry knob counts up.
struct Knobs {
    channel: u8,
    values: [i16; N_KNOBS],
    fresh: bool,
}

impl Knobs {
    fn tick(&mut self, ms: u32) {
        let index = usize::from(self.channel);
        self.values[index] = match index {
            0 => (32_767 - (ms as i32 * 8).min(24_000)) as i16,
            2 => (ms % 1000) as i16,
            _ => 0,
        };
        self.channel = (self.channel + 1) % N_KNOBS as u8;
        self.fresh = true;
    }
}

impl KnobSampler for Knobs {
    fn take(&mut self) -> Option<KnobSample> {
        if !std::mem::take(&mut self.fresh) {
            return None;
        }
        Some(KnobSample {
            values: self.values,
            channel: self.channel,
        })
    }
}

/// One millisecond of a 1 kHz sine, little-endian 24-bit stereo.
fn sine_packet() -> Vec<u8> {
    let frames = FRAMES_PER_USB_FRAME as usize;
    let amplitude = f64::from(0x7F_FFFF / 4);
    let mut out = Vec::with_capacity(frames * 6);
    for n in 0..frames {
        let phase = std::f64::consts::TAU * n as f64 / frames as f64;
        let sample = (amplitude * phase.sin()) as i32;
        let bytes = sample.to_le_bytes();
        out.extend_from_slice(&bytes[..3]);
        out.extend_from_slice(&bytes[..3]);
    }
    out
}

fn log_frame(frame: &[u8]) {
    match std::str::from_utf8(frame) {
        Ok(text) if text.is_ascii() && frame.len() > 2 => tracing::info!("host <- {text}"),
        _ if frame.len() == 2 => {
            tracing::debug!("host <- telemetry {}", u16::from_le_bytes([frame[0], frame[1]]));
        }
        _ => tracing::debug!("host <- {} raw bytes {frame:02x?}", frame.len()),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let run_ms: u32 = std::env::args().nth(1).and_then(|a| a.parse().ok()).unwrap_or(1000);
    println!("{} {} - Emulator ({run_ms} ms)\n", config::APP_NAME, config::APP_VERSION);

    let mut soc = SimSoc::new();
    let design = soc.design();
    let (mut fw, mut irqs) =
        boot(&mut soc, &SHARED, BootConfig::from_design(&design)).map_err(|e| e.to_string())?;
    tracing::info!("booted: {} steps", firmware::BOOT_SEQUENCE_STEPS.len());

    let usb = Host;
    let mut knobs = Knobs {
        channel: 0,
        values: [0; N_KNOBS],
        fresh: false,
    };
    let mut host_rx: FrameSplitter<128> = FrameSplitter::new(config::COMM_DELIM);
    let packet = sine_packet();
    let mut played = 0usize;

    let mut ticker = tokio::time::interval(Duration::from_millis(1));
    for ms in 1..=run_ms {
        ticker.tick().await;

        soc.write(design.usb_buf.base(), &packet);
        irqs.on_usb_packet(&mut soc, 0, packet.len() as u16);
        if ms % FEEDBACK_PERIOD_MS == 0 {
            let fb = irqs.on_feedback_poll();
            tracing::trace!("feedback {fb:02x?}");
        }
        if let Some((_, line)) = SCRIPT.iter().find(|(at, _)| *at == ms) {
            tracing::info!("host -> {line}");
            soc.uart_receive(format!("{line}\n").as_bytes());
        }
        knobs.tick(ms);
        while let Some(irq) = soc.take_irq() {
            irqs.dispatch(&mut soc, irq.into());
        }

        let report = fw.step(&mut soc, &mut knobs, &usb);
        if report.fault_report {
            tracing::warn!("faults changed at {ms} ms");
        }

        soc.clock_i2s(usize::from(AUDIO_OUT_TRANSFER_SIZE));
        soc.clock_uart_tx(UART_BYTES_PER_MS);
        while let Some(irq) = soc.take_irq() {
            irqs.dispatch(&mut soc, irq.into());
        }
        played += soc.take_i2s_output().len();
        host_rx.push(&soc.take_wire_output(), log_frame);
    }

    let status = fw.status();
    println!();
    let played_ms = played / usize::from(AUDIO_OUT_TRANSFER_SIZE);
    println!("played:    {played} bytes ({played_ms} ms of audio)");
    println!("occupancy: {} bytes", status.occupancy);
    println!("gain:      {}", status.multiplier.raw());
    println!("blocks:    {}", status.blocks);
    println!("faults:    {}", firmware::telemetry::fault_report(&status.faults));
    Ok(())
}
