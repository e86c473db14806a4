//! Framed serial channel to the host.
//!
//! A delimiter-terminated byte stream over the UART, moved entirely by DMA:
//!
//! ```text
//!   send() ──▶ TX ring ──uart_tx TDs──▶ UART TX ──▶ host
//!   host ──▶ UART RX ──▶ spy ──spy TDs (cyclic)──▶ RX ring ──▶ rx_service()
//! ```
//!
//! Transmit copies the payload plus delimiter into a ring and queues it as
//! up to [`config::COMM_MAX_TX_TD`] standalone descriptors, each at most
//! `tx_transfer_size` bytes and never crossing the ring's end. The TX
//! completion interrupt retires one descriptor and arms the next.
//!
//! Receive runs a cyclic descriptor chain over the RX ring forever. The spy
//! interrupts on the delimiter and on line idle; the handler turns the
//! channel's current descriptor and residual count into a write position
//! and publishes the new frame boundary. The main loop copies everything
//! up to the boundary out, then re-arms the spy.
//!
//! The channel is split into two halves at creation:
//!
//! - [`Comm`], owned by the main loop
//! - [`CommIsr`], owned by the UART TX and spy interrupt handlers
//!
//! They meet only through a [`CommShared`], which is `const`-constructible
//! for use in a `static`. Every field in it is guarded by a
//! `critical_section::Mutex`.
//!
//! [`config::COMM_MAX_TX_TD`]: platform::config::COMM_MAX_TX_TD

#![cfg_attr(not(test), no_std)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

pub mod frame;
mod rx;
pub mod stats;
mod tx;

use core::cell::{Cell, RefCell};

use critical_section::Mutex;
use platform::config::{
    COMM_DELIM, COMM_MAX_RX_TD, COMM_MAX_TX_TD, RX_TRANSFER_SIZE, TX_TRANSFER_SIZE,
};
use platform::dma::{cyclic_pieces, DmaError, MAX_TD_COUNT};
use platform::{
    ChannelId, Design, DmaController, FaultCounters, FaultKind, FaultSnapshot, Memory, Region,
    SpyPeripheral,
};
use thiserror_no_std::Error;

pub use frame::FrameSplitter;
pub use stats::CommStats;

use rx::{RxProgress, RxReader, RxTracker};
use tx::{TxDrain, TxQueue, TxWriter};

/// Errors reported by the serial channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommError {
    /// Descriptor allocation or programming failed.
    #[error("DMA: {0}")]
    Dma(#[from] DmaError),
    /// The send did not fit in the transmit ring or descriptor budget.
    #[error("transmit buffer full")]
    BufferFull,
    /// A size or descriptor budget in [`CommConfig`] is unusable.
    #[error("invalid channel configuration")]
    InvalidConfig,
}

/// Channels, FIFOs and buffers of one serial channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommConfig {
    /// Transmit ring into UART channel.
    pub uart_tx_ch: ChannelId,
    /// Transmit descriptors, the most chunks queued at once.
    pub uart_tx_n_td: usize,
    /// UART transmit FIFO.
    pub uart_tx_fifo: u32,
    /// Transmit ring.
    pub tx_buffer: Region,
    /// Largest byte count of one transmit descriptor.
    pub tx_transfer_size: u16,

    /// UART receiver into spy channel.
    pub uart_rx_ch: ChannelId,
    /// UART receive FIFO.
    pub uart_rx_fifo: u32,
    /// Spy into receive ring channel.
    pub spy_ch: ChannelId,
    /// Receive descriptor budget.
    pub spy_n_td: usize,
    /// Spy input FIFO.
    pub spy_fifo_in: u32,
    /// Spy output FIFO.
    pub spy_fifo_out: u32,
    /// Receive ring.
    pub rx_buffer: Region,
    /// Bytes per receive descriptor.
    pub rx_transfer_size: u16,

    /// Frame delimiter.
    pub delimiter: u8,
}

impl CommConfig {
    /// Default sizes on the channels and buffers of `design`.
    pub fn from_design(design: &Design) -> Self {
        Self {
            uart_tx_ch: design.uart_tx_ch,
            uart_tx_n_td: COMM_MAX_TX_TD,
            uart_tx_fifo: design.uart_tx_fifo,
            tx_buffer: design.tx_buf,
            tx_transfer_size: TX_TRANSFER_SIZE,
            uart_rx_ch: design.uart_rx_ch,
            uart_rx_fifo: design.uart_rx_fifo,
            spy_ch: design.spy_ch,
            spy_n_td: COMM_MAX_RX_TD,
            spy_fifo_in: design.spy_fifo_in,
            spy_fifo_out: design.spy_fifo_out,
            rx_buffer: design.rx_buf,
            rx_transfer_size: RX_TRANSFER_SIZE,
            delimiter: COMM_DELIM,
        }
    }

    fn validate(&self) -> Result<usize, CommError> {
        let sizes_ok = (1..=MAX_TD_COUNT).contains(&self.tx_transfer_size)
            && !self.tx_buffer.is_empty()
            && (1..=COMM_MAX_TX_TD).contains(&self.uart_tx_n_td)
            && self.spy_n_td <= COMM_MAX_RX_TD;
        if !sizes_ok {
            return Err(CommError::InvalidConfig);
        }
        let rx_pieces = cyclic_pieces(self.rx_buffer.len(), self.rx_transfer_size)
            .map_err(|_| CommError::InvalidConfig)?;
        if rx_pieces > self.spy_n_td {
            return Err(CommError::InvalidConfig);
        }
        Ok(rx_pieces)
    }
}

/// State shared between the main loop and the interrupt handlers.
pub struct CommShared {
    tx: Mutex<RefCell<TxQueue>>,
    rx_progress: Mutex<Cell<RxProgress>>,
    rx_read: Mutex<Cell<u32>>,
    faults: FaultCounters,
}

impl CommShared {
    /// Idle channel, suitable for a `static`.
    pub const fn new() -> Self {
        Self {
            tx: Mutex::new(RefCell::new(TxQueue::new())),
            rx_progress: Mutex::new(Cell::new(RxProgress::new())),
            rx_read: Mutex::new(Cell::new(0)),
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

    /// Count a fault detected above the channel, e.g. by frame reassembly.
    pub fn record_fault(&self, kind: FaultKind) {
        self.faults.record(kind);
    }

    fn progress(&self) -> RxProgress {
        critical_section::with(|cs| self.rx_progress.borrow(cs).get())
    }
}

impl Default for CommShared {
    fn default() -> Self {
        Self::new()
    }
}

/// Main-loop half of the serial channel.
pub struct Comm<'a> {
    shared: &'a CommShared,
    config: CommConfig,
    tx: TxWriter,
    rx: RxReader,
}

/// Interrupt half of the serial channel.
pub struct CommIsr<'a> {
    shared: &'a CommShared,
    tx: TxDrain,
    rx: RxTracker,
}

impl<'a> Comm<'a> {
    /// Allocate and program every descriptor the channel needs.
    ///
    /// Nothing moves until [`Comm::start`].
    pub fn create<D>(
        dma: &mut D,
        shared: &'a CommShared,
        config: CommConfig,
    ) -> Result<(Comm<'a>, CommIsr<'a>), CommError>
    where
        D: DmaController + ?Sized,
    {
        let rx_pieces = config.validate()?;
        let writer = TxWriter::create(dma, &config)?;
        let drain = writer.drain();
        let (tracker, rx_entry) = RxTracker::create(dma, &config, rx_pieces)?;

        #[cfg(feature = "defmt")]
        defmt::info!(
            "comm: tx {}B x{} TDs, rx {}B x{} TDs",
            config.tx_buffer.len(),
            config.uart_tx_n_td,
            config.rx_buffer.len(),
            rx_pieces
        );

        Ok((
            Comm {
                shared,
                config,
                tx: writer,
                rx: RxReader::new(rx_entry, config.rx_buffer),
            },
            CommIsr {
                shared,
                tx: drain,
                rx: tracker,
            },
        ))
    }

    /// Start the receive path.
    pub fn start<D: DmaController + ?Sized>(&mut self, dma: &mut D) {
        self.rx.start(dma, &self.config);
    }

    /// Frame delimiter in use.
    pub fn delimiter(&self) -> u8 {
        self.config.delimiter
    }

    /// Queue `payload` followed by the delimiter.
    ///
    /// All or nothing: on [`CommError::BufferFull`] no byte is queued.
    pub fn send<B>(&mut self, bus: &mut B, payload: &[u8]) -> Result<usize, CommError>
    where
        B: DmaController + Memory + ?Sized,
    {
        let delim = [self.config.delimiter];
        self.tx.send_parts(bus, self.shared, &[payload, &delim])
    }

    /// Queue `bytes` exactly as given, without a delimiter.
    pub fn send_raw<B>(&mut self, bus: &mut B, bytes: &[u8]) -> Result<usize, CommError>
    where
        B: DmaController + Memory + ?Sized,
    {
        self.tx.send_parts(bus, self.shared, &[bytes])
    }

    /// Bytes that can be queued right now.
    pub fn tx_free(&self) -> u32 {
        self.tx.free(self.shared)
    }

    /// Whether the transmitter has nothing queued or in flight.
    pub fn tx_idle(&self) -> bool {
        self.tx.is_idle(self.shared)
    }

    /// Copy up to `out.len()` bytes that are ready for consumption.
    pub fn rx_service<M: Memory + ?Sized>(&mut self, mem: &M, out: &mut [u8]) -> usize {
        self.rx.service(mem, self.shared, out)
    }

    /// Bytes ready for consumption.
    pub fn rx_available(&self) -> u32 {
        self.rx.available(self.shared)
    }

    /// Whether a boundary was published that has not been acknowledged.
    pub fn rx_pending(&self) -> bool {
        self.rx.pending(self.shared)
    }

    /// Re-arm the spy once everything up to the last boundary is consumed.
    ///
    /// Returns whether the spy was resumed.
    pub fn rx_resume<S: SpyPeripheral + ?Sized>(&mut self, spy: &mut S) -> bool {
        self.rx.resume(spy, self.shared)
    }

    /// Running totals for both directions.
    pub fn stats(&self) -> CommStats {
        let (bytes_sent, chunks_sent) = self.tx.sent(self.shared);
        let progress = self.shared.progress();
        CommStats {
            frames_queued: self.tx.frames(),
            bytes_sent,
            chunks_sent,
            bytes_received: self.rx.consumed(),
            boundaries: progress.boundary_seq,
        }
    }

    /// Faults counted by either half.
    pub fn faults(&self) -> FaultSnapshot {
        self.shared.faults()
    }
}

impl CommIsr<'_> {
    /// UART TX descriptor completed.
    pub fn tx_isr<D: DmaController + ?Sized>(&mut self, dma: &mut D) {
        self.tx.on_complete(dma, self.shared);
    }

    /// Spy event or receive descriptor completed.
    pub fn rx_isr<B>(&mut self, bus: &mut B)
    where
        B: DmaController + Memory + SpyPeripheral + ?Sized,
    {
        self.rx.on_event(bus, self.shared);
    }

    /// Channel the TX completion interrupt belongs to.
    pub fn tx_channel(&self) -> ChannelId {
        self.tx.channel()
    }

    /// Channel whose completion interrupt feeds [`CommIsr::rx_isr`].
    pub fn rx_channel(&self) -> ChannelId {
        self.rx.channel()
    }
}

/// Arm delimiter detection on the spy with the channel's receive sizing.
pub fn rx_spy_start<S: SpyPeripheral + ?Sized>(spy: &mut S, delimiter: u8, transfer_size: u16) {
    spy.start(delimiter, transfer_size);
}
