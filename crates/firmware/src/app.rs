//! Main loop and interrupt routing.
//!
//! [`Firmware::step`] is one pass of the cooperative main loop:
//!   1. follow the USB streaming interface (start, stop, format changes)
//!   2. service the audio pipeline
//!   3. report the rate feedback level after each feedback poll
//!   4. apply the volume knob, report the telemetry knob after each full scan
//!   5. answer host commands up to the last receive boundary
//!   6. report faults once their counts change
//!
//! [`Interrupts`] owns the interrupt halves and routes each line to its
//! handler.

use audio_out::{AudioBlock, AudioIsr, AudioOut, SampleFormat, VolumeState};
use comm::{Comm, CommIsr, FrameSplitter};
use heapless::Vec;
use platform::config::{TELEMETRY_KNOB, VOLUME_KNOB};
use platform::{Bus, ChannelId, DmaController, FaultKind, FaultSnapshot};

use crate::boot::Shared;
use crate::command::{self, Command, Status, COMMAND_MAX};
use crate::peripherals::{KnobSampler, UsbAudio};
use crate::telemetry;

/// Receive bytes copied out per read.
const RX_CHUNK: usize = 16;

/// An interrupt line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Interrupt {
    /// A DMA channel finished a descriptor with completion signalling.
    Dma(ChannelId),
    /// The receive spy saw a delimiter or overflowed.
    Spy,
}

#[cfg(feature = "std")]
impl From<platform::sim::Irq> for Interrupt {
    fn from(irq: platform::sim::Irq) -> Self {
        match irq {
            platform::sim::Irq::Dma(ch) => Interrupt::Dma(ch),
            platform::sim::Irq::Spy => Interrupt::Spy,
        }
    }
}

/// What one pass of the main loop did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepReport {
    /// Audio block processed this pass.
    pub block: Option<AudioBlock>,
    /// Host commands answered.
    pub commands: u8,
    /// Telemetry frames queued.
    pub telemetry: u8,
    /// Whether a fault report was queued.
    pub fault_report: bool,
}

/// Main-loop half of the firmware.
pub struct Firmware<'a> {
    shared: &'a Shared,
    comm: Comm<'a>,
    audio: AudioOut<'a>,
    volume: VolumeState,
    splitter: FrameSplitter<COMMAND_MAX>,
    streaming: Option<SampleFormat>,
    reported: FaultSnapshot,
}

impl<'a> Firmware<'a> {
    pub(crate) fn new(
        shared: &'a Shared,
        comm: Comm<'a>,
        audio: AudioOut<'a>,
        streaming: Option<SampleFormat>,
    ) -> Self {
        let delimiter = comm.delimiter();
        Self {
            shared,
            comm,
            audio,
            volume: VolumeState::new(),
            splitter: FrameSplitter::new(delimiter),
            streaming,
            reported: FaultSnapshot::default(),
        }
    }

    /// One pass of the main loop.
    pub fn step<B, K, U>(&mut self, bus: &mut B, knobs: &mut K, usb: &U) -> StepReport
    where
        B: Bus + ?Sized,
        K: KnobSampler + ?Sized,
        U: UsbAudio + ?Sized,
    {
        let mut report = StepReport::default();

        self.follow_usb(bus, usb.active_format());
        report.block = self.audio.service(bus);

        if let Some(feedback) = self.audio.take_feedback() {
            if self.comm.send(bus, &telemetry::scalar(feedback.occupancy)).is_ok() {
                report.telemetry = report.telemetry.saturating_add(1);
            }
        }

        if let Some(sample) = knobs.take() {
            if let Some(gain) = self.volume.update(sample.value(VOLUME_KNOB)) {
                self.audio.set_multiplier(gain);
            }
            if sample.channel == 0
                && self
                    .comm
                    .send(bus, &telemetry::signed_scalar(sample.value(TELEMETRY_KNOB)))
                    .is_ok()
            {
                report.telemetry = report.telemetry.saturating_add(1);
            }
        }

        report.commands = self.serve_commands(bus);
        report.fault_report = self.report_faults(bus);
        report
    }

    /// Everything a `STATUS` or `STATS` reply reports.
    pub fn status(&self) -> Status {
        Status {
            state: self.audio.state(),
            occupancy: self.audio.occupancy(),
            multiplier: self.audio.multiplier(),
            comm: self.comm.stats(),
            blocks: self.audio.blocks(),
            faults: self.faults(),
        }
    }

    /// Faults from both subsystems.
    pub fn faults(&self) -> FaultSnapshot {
        self.shared.comm.faults().merge(&self.shared.audio.faults())
    }

    /// Serial channel.
    pub fn comm(&self) -> &Comm<'a> {
        &self.comm
    }

    /// Audio pipeline.
    pub fn audio(&self) -> &AudioOut<'a> {
        &self.audio
    }

    /// Volume knob state.
    pub fn volume(&self) -> &VolumeState {
        &self.volume
    }

    fn follow_usb<D: DmaController + ?Sized>(&mut self, dma: &mut D, format: Option<SampleFormat>) {
        if format == self.streaming {
            return;
        }
        self.audio.on_usb_deconfigured(dma);
        if let Some(format) = format {
            // Idle now, so the format is accepted.
            if self.audio.set_format(format).is_ok() {
                self.audio.start(dma);
            }
        }
        self.streaming = format;

        #[cfg(feature = "defmt")]
        defmt::info!("usb: streaming {}", format);
    }

    fn serve_commands<B: Bus + ?Sized>(&mut self, bus: &mut B) -> u8 {
        let mut served = 0u8;
        let mut chunk = [0u8; RX_CHUNK];
        loop {
            let n = self.comm.rx_service(&*bus, &mut chunk);
            if n == 0 {
                break;
            }
            // Every frame takes at least its delimiter, so a chunk holds
            // no more than RX_CHUNK of them.
            let mut commands: Vec<Command, RX_CHUNK> = Vec::new();
            let dropped = self.splitter.push(chunk.get(..n).unwrap_or_default(), |frame| {
                if let Some(command) = Command::parse(frame) {
                    let _ = commands.push(command);
                }
            });
            for _ in 0..dropped {
                self.shared.comm.record_fault(FaultKind::MalformedFrame);
            }
            for command in commands {
                self.execute(bus, command);
                served = served.saturating_add(1);
            }
        }
        self.comm.rx_resume(bus);
        served
    }

    fn execute<B: Bus + ?Sized>(&mut self, bus: &mut B, command: Command) {
        if command == Command::Clear {
            self.shared.comm.clear_faults();
            self.shared.audio.clear_faults();
            self.reported = FaultSnapshot::default();
        }
        let reply = command::respond(command, &self.status());
        // A reply that does not fit is counted as BufferFull.
        let _ = self.comm.send(bus, reply.as_bytes());
    }

    fn report_faults<B: Bus + ?Sized>(&mut self, bus: &mut B) -> bool {
        let now = self.faults();
        if now == self.reported {
            return false;
        }
        let sent = self.comm.send(bus, telemetry::fault_report(&now).as_bytes()).is_ok();

        #[cfg(feature = "defmt")]
        defmt::warn!("faults: {}", now);

        // Includes the BufferFull of a report that did not fit.
        self.reported = self.faults();
        sent
    }
}

/// Interrupt half of the firmware.
pub struct Interrupts<'a> {
    comm: CommIsr<'a>,
    audio: AudioIsr<'a>,
}

impl<'a> Interrupts<'a> {
    pub(crate) fn new(comm: CommIsr<'a>, audio: AudioIsr<'a>) -> Self {
        Self { comm, audio }
    }

    /// Route one interrupt to its handler.
    pub fn dispatch<B: Bus + ?Sized>(&mut self, bus: &mut B, irq: Interrupt) {
        match irq {
            Interrupt::Spy => self.comm.rx_isr(bus),
            Interrupt::Dma(ch) if ch == self.comm.tx_channel() => self.comm.tx_isr(bus),
            Interrupt::Dma(ch) if ch == self.comm.rx_channel() => self.comm.rx_isr(bus),
            Interrupt::Dma(ch) if ch == self.audio.bs_channel() => self.audio.bs_done(),
            Interrupt::Dma(ch) if ch == self.audio.i2s_channel() => self.audio.i2s_done(bus),
            Interrupt::Dma(_) => {}
        }
    }

    /// The USB stack wrote `count` bytes at `offset` of the endpoint buffer.
    pub fn on_usb_packet<D: DmaController + ?Sized>(&self, dma: &mut D, offset: u16, count: u16) {
        self.audio.on_samples_received(dma, offset, count);
    }

    /// The host polled the feedback endpoint; returns the bytes to answer with.
    pub fn on_feedback_poll(&self) -> [u8; 3] {
        self.audio.on_feedback_endpoint_serviced().endpoint_bytes()
    }
}
