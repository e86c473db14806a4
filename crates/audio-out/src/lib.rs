//! Real-time audio streaming pipeline.
//!
//! Moves isochronous USB audio to the I2S transmitter through three DMA
//! channels and one CPU pass:
//!
//! ```text
//!   USB packet ──usb──▶ byte swap ──bs──▶ audio ring ──i2s (cyclic)──▶ I2S
//!                                             ▲
//!                                    service(): scale in place
//! ```
//!
//! 1. **Intake** ([`AudioIsr::on_samples_received`]): arms the `usb` and
//!    `bs` descriptors for exactly the packet just received. The `bs`
//!    completion ([`AudioIsr::bs_done`]) publishes it as the shadow count.
//! 2. **Processing** ([`AudioOut::service`]): the main loop applies the
//!    volume to every sample between its read cursor and the shadow count.
//!    This must finish before the next packet lands. A late pass is counted
//!    as [`FaultKind::DeadlineMissed`] and caught up on the next call.
//! 3. **Output** ([`AudioIsr::i2s_done`]): the cyclic I2S chain is started
//!    once half the ring is processed, and stopped with
//!    [`FaultKind::Underrun`] if it catches up with processing.
//!
//! As with the serial channel, state is split between [`AudioOut`] for
//! the main loop and [`AudioIsr`] for the interrupt handlers, meeting in a
//! `const`-constructible [`AudioShared`].
//!
//! [`FaultKind::DeadlineMissed`]: platform::FaultKind::DeadlineMissed
//! [`FaultKind::Underrun`]: platform::FaultKind::Underrun

#![cfg_attr(not(test), no_std)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

pub mod feedback;
pub mod format;
mod intake;
mod output;
pub mod volume;

use core::cell::Cell;

use critical_section::Mutex;
use platform::config::{AUDIO_OUT_N_TD, AUDIO_OUT_TRANSFER_SIZE};
use platform::dma::{cyclic_pieces, DmaError, MAX_TD_COUNT};
use platform::ring::RingCursor;
use platform::{ChannelId, Design, DmaController, FaultCounters, FaultSnapshot, Memory, Region};
use thiserror_no_std::Error;

pub use feedback::FeedbackSample;
pub use format::{Multiplier, SampleFormat};
pub use volume::VolumeState;

use intake::{Intake, IntakeState};
use output::{Output, OutputState};

/// Bytes scaled per read-modify-write of ring memory.
const SCRATCH_BYTES: u16 = 288;

/// Errors reported by the audio pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AudioError {
    /// Descriptor allocation or programming failed.
    #[error("DMA: {0}")]
    Dma(#[from] DmaError),
    /// Buffer sizes, descriptor counts or the sample format do not fit together.
    #[error("invalid audio configuration")]
    InvalidConfig,
    /// The operation is only allowed while idle.
    #[error("stream is running")]
    Busy,
}

/// Pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StreamState {
    /// Not configured by the host. Packets are ignored.
    #[default]
    Idle,
    /// Moving audio.
    Streaming,
}

/// Channels, FIFOs and buffers of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioOutConfig {
    /// USB endpoint buffer into the byte-swap block.
    pub usb_dma_ch: ChannelId,
    /// Byte-swap block into the audio ring.
    pub bs_dma_ch: ChannelId,
    /// Audio ring into the I2S transmitter.
    pub i2s_dma_ch: ChannelId,
    /// Isochronous OUT endpoint buffer.
    pub usb_buf: Region,
    /// Byte-swap input FIFO.
    pub bs_fifo_in: u32,
    /// Byte-swap output FIFO.
    pub bs_fifo_out: u32,
    /// I2S transmit FIFO.
    pub i2s_fifo: u32,
    /// Audio ring.
    pub out_buf: Region,
    /// Bytes per I2S descriptor.
    pub i2s_transfer_size: u16,
    /// I2S descriptors tiling the ring.
    pub i2s_n_td: usize,
    /// Sample layout of the stream.
    pub format: SampleFormat,
}

impl AudioOutConfig {
    /// Default sizes on the channels and buffers of `design`.
    pub fn from_design(design: &Design) -> Self {
        Self {
            usb_dma_ch: design.usb_dma_ch,
            bs_dma_ch: design.bs_dma_ch,
            i2s_dma_ch: design.i2s_dma_ch,
            usb_buf: design.usb_buf,
            bs_fifo_in: design.bs_fifo_in,
            bs_fifo_out: design.bs_fifo_out,
            i2s_fifo: design.i2s_fifo,
            out_buf: design.audio_buf,
            i2s_transfer_size: AUDIO_OUT_TRANSFER_SIZE,
            i2s_n_td: AUDIO_OUT_N_TD,
            format: SampleFormat::S24,
        }
    }

    fn validate(&self) -> Result<(), AudioError> {
        let pieces = cyclic_pieces(self.out_buf.len(), self.i2s_transfer_size)
            .map_err(|_| AudioError::InvalidConfig)?;
        let tiles = self.out_buf.len().checked_rem(self.i2s_transfer_size) == Some(0);
        let ok = tiles
            && pieces == self.i2s_n_td
            && (2..=AUDIO_OUT_N_TD).contains(&self.i2s_n_td)
            && !self.usb_buf.is_empty()
            && self.usb_buf.len() <= MAX_TD_COUNT
            && fits_format(self.i2s_transfer_size, self.format);
        if ok {
            Ok(())
        } else {
            Err(AudioError::InvalidConfig)
        }
    }
}

fn fits_format(transfer_size: u16, format: SampleFormat) -> bool {
    transfer_size.checked_rem(format.frame_bytes()) == Some(0)
}

/// Processed run of the ring returned by [`AudioOut::service`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AudioBlock {
    /// Ring offset of the first byte.
    pub offset: u16,
    /// Bytes processed.
    pub len: u16,
    /// Samples processed, all channels.
    pub samples: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Stream {
    pub(crate) state: StreamState,
    pub(crate) format: SampleFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct FeedbackSlot {
    latest: FeedbackSample,
    fresh: bool,
}

/// State shared between the main loop and the interrupt handlers.
///
/// | Field       | Writer                          |
/// |-------------|---------------------------------|
/// | `intake`    | packet callback, `bs` interrupt |
/// | `processed` | main loop                       |
/// | `output`    | `i2s` interrupt, main loop arm  |
/// | `stream`    | main loop                       |
/// | `feedback`  | feedback endpoint callback      |
pub struct AudioShared {
    stream: Mutex<Cell<Stream>>,
    intake: Mutex<Cell<IntakeState>>,
    processed: Mutex<Cell<u32>>,
    output: Mutex<Cell<OutputState>>,
    feedback: Mutex<Cell<FeedbackSlot>>,
    faults: FaultCounters,
}

impl AudioShared {
    /// Idle pipeline, suitable for a `static`.
    pub const fn new() -> Self {
        Self {
            stream: Mutex::new(Cell::new(Stream {
                state: StreamState::Idle,
                format: SampleFormat::S24,
            })),
            intake: Mutex::new(Cell::new(IntakeState::new())),
            processed: Mutex::new(Cell::new(0)),
            output: Mutex::new(Cell::new(OutputState::new())),
            feedback: Mutex::new(Cell::new(FeedbackSlot {
                latest: FeedbackSample { occupancy: 0, rate: 0 },
                fresh: false,
            })),
            faults: FaultCounters::new(),
        }
    }

    /// Faults counted by either half.
    pub fn faults(&self) -> FaultSnapshot {
        self.faults.snapshot()
    }

    /// Reset the fault counters.
    pub fn clear_faults(&self) {
        self.faults.clear();
    }

    pub(crate) fn stream(&self) -> Stream {
        critical_section::with(|cs| self.stream.borrow(cs).get())
    }

    fn occupancy(&self) -> u32 {
        critical_section::with(|cs| {
            let landed = self.intake.borrow(cs).get().landed;
            landed.wrapping_sub(self.output.borrow(cs).get().transmitted)
        })
    }
}

impl Default for AudioShared {
    fn default() -> Self {
        Self::new()
    }
}

/// Main-loop half of the pipeline.
pub struct AudioOut<'a> {
    shared: &'a AudioShared,
    config: AudioOutConfig,
    output: Output,
    multiplier: Multiplier,
    processed: u32,
    blocks: u32,
}

/// Interrupt half of the pipeline.
pub struct AudioIsr<'a> {
    shared: &'a AudioShared,
    intake: Intake,
    output: Output,
    capacity: u32,
}

impl<'a> AudioOut<'a> {
    /// Allocate and program every descriptor the pipeline needs.
    ///
    /// The pipeline stays [`StreamState::Idle`] until [`AudioOut::start`].
    pub fn create<D>(
        dma: &mut D,
        shared: &'a AudioShared,
        config: AudioOutConfig,
    ) -> Result<(AudioOut<'a>, AudioIsr<'a>), AudioError>
    where
        D: DmaController + ?Sized,
    {
        config.validate()?;
        let intake = Intake::create(dma, &config)?;
        let output = Output::create(dma, &config)?;
        critical_section::with(|cs| {
            let cell = shared.stream.borrow(cs);
            cell.set(Stream {
                state: StreamState::Idle,
                format: config.format,
            });
        });

        #[cfg(feature = "defmt")]
        defmt::info!(
            "audio: ring {}B, {} x {}B out TDs",
            config.out_buf.len(),
            config.i2s_n_td,
            config.i2s_transfer_size
        );

        Ok((
            AudioOut {
                shared,
                config,
                output: output.clone(),
                multiplier: Multiplier::UNITY,
                processed: 0,
                blocks: 0,
            },
            AudioIsr {
                shared,
                intake,
                output,
                capacity: u32::from(config.out_buf.len()),
            },
        ))
    }

    /// Reset every cursor and start accepting packets.
    pub fn start<D: DmaController + ?Sized>(&mut self, dma: &mut D) {
        self.halt(dma);
        self.processed = 0;
        critical_section::with(|cs| {
            self.shared.intake.borrow(cs).set(IntakeState::new());
            self.shared.processed.borrow(cs).set(0);
            self.shared.output.borrow(cs).set(OutputState::new());
            let cell = self.shared.stream.borrow(cs);
            let mut stream = cell.get();
            stream.state = StreamState::Streaming;
            cell.set(stream);
        });
        #[cfg(feature = "defmt")]
        defmt::info!("audio: streaming {}", self.config.format);
    }

    /// The host dropped the streaming interface: stop every channel.
    pub fn on_usb_deconfigured<D: DmaController + ?Sized>(&mut self, dma: &mut D) {
        self.halt(dma);
        #[cfg(feature = "defmt")]
        defmt::info!("audio: idle");
    }

    fn halt<D: DmaController + ?Sized>(&mut self, dma: &mut D) {
        critical_section::with(|cs| {
            let cell = self.shared.stream.borrow(cs);
            let mut stream = cell.get();
            stream.state = StreamState::Idle;
            cell.set(stream);
            let out = self.shared.output.borrow(cs);
            out.set(OutputState {
                active: false,
                ..out.get()
            });
            let intake = self.shared.intake.borrow(cs);
            intake.set(IntakeState {
                in_flight: 0,
                ..intake.get()
            });
        });
        dma.ch_disable(self.config.usb_dma_ch);
        dma.ch_disable(self.config.bs_dma_ch);
        self.output.stop(dma);
    }

    /// Select the sample layout of the next stream.
    pub fn set_format(&mut self, format: SampleFormat) -> Result<(), AudioError> {
        if !fits_format(self.config.i2s_transfer_size, format) {
            return Err(AudioError::InvalidConfig);
        }
        critical_section::with(|cs| {
            let cell = self.shared.stream.borrow(cs);
            let mut stream = cell.get();
            if stream.state == StreamState::Streaming {
                return Err(AudioError::Busy);
            }
            stream.format = format;
            cell.set(stream);
            Ok(())
        })?;
        self.config.format = format;
        Ok(())
    }

    /// Scale everything that landed since the last call, then start the
    /// output if enough is processed.
    ///
    /// Returns the processed run, `None` when nothing was pending.
    pub fn service<B>(&mut self, bus: &mut B) -> Option<AudioBlock>
    where
        B: DmaController + Memory + ?Sized,
    {
        let stream = self.shared.stream();
        if stream.state != StreamState::Streaming {
            return None;
        }
        let landed = critical_section::with(|cs| self.shared.intake.borrow(cs).get().landed);
        let pending = landed.wrapping_sub(self.processed);
        let block = if pending > 0 {
            Some(self.process(bus, stream.format, pending))
        } else {
            None
        };
        self.output.arm_if_ready(bus, self.shared);
        block
    }

    fn process<M: Memory + ?Sized>(
        &mut self,
        mem: &mut M,
        format: SampleFormat,
        pending: u32,
    ) -> AudioBlock {
        let ring = RingCursor::new(u32::from(self.config.out_buf.len()));
        let (head, tail) = ring.spans(self.processed, pending);
        let mut scratch = [0u8; SCRATCH_BYTES as usize];
        for span in [head, tail] {
            let mut done = 0u32;
            while done < span.len {
                let n = span.len.saturating_sub(done).min(u32::from(SCRATCH_BYTES));
                let addr = self.config.out_buf.base().wrapping_add(span.offset).wrapping_add(done);
                if let Some(buf) = scratch.get_mut(..usize::try_from(n).unwrap_or(0)) {
                    mem.read(addr, buf);
                    format.scale_in_place(buf, self.multiplier);
                    mem.write(addr, buf);
                }
                done = done.saturating_add(n);
            }
        }

        self.processed = self.processed.wrapping_add(pending);
        let processed = self.processed;
        critical_section::with(|cs| self.shared.processed.borrow(cs).set(processed));
        self.blocks = self.blocks.wrapping_add(1);

        let len = u16::try_from(pending).unwrap_or(u16::MAX);
        AudioBlock {
            offset: u16::try_from(head.offset).unwrap_or(0),
            len,
            samples: len.checked_div(format.sample_bytes()).unwrap_or(0),
        }
    }

    /// Gain applied by the next [`AudioOut::service`].
    pub fn set_multiplier(&mut self, multiplier: Multiplier) {
        self.multiplier = multiplier;
    }

    /// Gain currently applied.
    pub fn multiplier(&self) -> Multiplier {
        self.multiplier
    }

    /// Idle or streaming.
    pub fn state(&self) -> StreamState {
        self.shared.stream().state
    }

    /// Sample layout in use.
    pub fn format(&self) -> SampleFormat {
        self.config.format
    }

    /// Bytes landed in the ring and not yet processed.
    pub fn pending(&self) -> u32 {
        let landed = critical_section::with(|cs| self.shared.intake.borrow(cs).get().landed);
        landed.wrapping_sub(self.processed)
    }

    /// Bytes landed in the ring and not yet transmitted.
    pub fn occupancy(&self) -> u32 {
        self.shared.occupancy()
    }

    /// Whether the I2S chain is running.
    pub fn output_active(&self) -> bool {
        critical_section::with(|cs| self.shared.output.borrow(cs).get().active)
    }

    /// Processing passes since boot.
    pub fn blocks(&self) -> u32 {
        self.blocks
    }

    /// Most recent feedback snapshot.
    pub fn feedback(&self) -> FeedbackSample {
        critical_section::with(|cs| self.shared.feedback.borrow(cs).get().latest)
    }

    /// The feedback snapshot, once per feedback endpoint service.
    pub fn take_feedback(&mut self) -> Option<FeedbackSample> {
        critical_section::with(|cs| {
            let cell = self.shared.feedback.borrow(cs);
            let mut slot = cell.get();
            let fresh = slot.fresh.then_some(slot.latest);
            slot.fresh = false;
            cell.set(slot);
            fresh
        })
    }

    /// Faults counted by either half.
    pub fn faults(&self) -> FaultSnapshot {
        self.shared.faults()
    }
}

impl AudioIsr<'_> {
    /// USB delivered `count` bytes at `offset` in the endpoint buffer.
    pub fn on_samples_received<D: DmaController + ?Sized>(
        &self,
        dma: &mut D,
        offset: u16,
        count: u16,
    ) {
        self.intake.receive(dma, self.shared, offset, count);
    }

    /// Byte-swap descriptor chain completed.
    pub fn bs_done(&self) {
        self.intake.on_reordered(self.shared);
    }

    /// I2S descriptor completed.
    pub fn i2s_done<D: DmaController + ?Sized>(&self, dma: &mut D) {
        self.output.on_complete(dma, self.shared);
    }

    /// The host polled the feedback endpoint.
    pub fn on_feedback_endpoint_serviced(&self) -> FeedbackSample {
        let sample = FeedbackSample::from_occupancy(self.shared.occupancy(), self.capacity);
        critical_section::with(|cs| {
            self.shared.feedback.borrow(cs).set(FeedbackSlot {
                latest: sample,
                fresh: true,
            });
        });
        sample
    }

    /// Channel whose completion feeds [`AudioIsr::bs_done`].
    pub fn bs_channel(&self) -> ChannelId {
        self.intake.channel()
    }

    /// Channel whose completion feeds [`AudioIsr::i2s_done`].
    pub fn i2s_channel(&self) -> ChannelId {
        self.output.channel()
    }
}
