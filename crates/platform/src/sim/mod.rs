//! Simulated SoC for host tests and the desktop emulator.
//!
//! Models just enough of the target to run the real streaming and serial
//! state machines unmodified:
//!
//! - a flat SRAM with a bump allocator for DMA regions
//! - a transfer descriptor pool and DMA channels that move one byte per
//!   step, follow chains, raise termout and stop at the end of a chain
//! - the peripheral FIFOs of the hardware design: UART TX/RX, the receive
//!   spy, the byte-swap block and the I2S transmitter
//! - a pending-interrupt queue that the harness drains and dispatches
//!
//! Time only moves when the harness says so. [`SimSoc::uart_receive`],
//! [`SimSoc::clock_uart_tx`], [`SimSoc::clock_i2s`] and
//! [`SimSoc::uart_idle`] feed or drain the outside world; every register
//! write that can unblock a channel runs the DMA engine to quiescence.
//!
//! # Example
//!
//! ```ignore
//! use platform::sim::{Irq, SimSoc};
//! use platform::{DmaController, Memory, TdFlags};
//!
//! let mut soc = SimSoc::new();
//! let buf = soc.alloc(4);
//! soc.write(buf.base(), b"ping");
//! let td = soc.td_allocate().unwrap();
//! let ch = soc.design().uart_tx_ch;
//! soc.td_configure(td, 4, None, TdFlags::MEM_TO_PERIPH.with_termout(true));
//! soc.td_set_address(td, buf.base(), soc.design().uart_tx_fifo);
//! soc.ch_set_initial_td(ch, td);
//! soc.ch_enable(ch);
//! soc.clock_uart_tx(16);
//! assert_eq!(soc.take_wire_output(), b"ping");
//! assert_eq!(soc.take_irq(), Some(Irq::Dma(ch)));
//! ```

// Simulation bookkeeping runs on the host only; counters are bounded by the
// SRAM and FIFO sizes modelled here.
#![allow(clippy::arithmetic_side_effects)]
#![allow(clippy::cast_possible_truncation)]

mod fifo;

use std::collections::VecDeque;
use std::vec::Vec;

use fifo::Fifo;

use crate::config::{
    AUDIO_OUT_BUF_SIZE, IDLE_FLUSH_TICKS, RX_BUF_SIZE, TX_BUF_SIZE, USB_MAX_BUF_SIZE,
};
use crate::design::Design;
use crate::dma::{ChannelId, ChannelStatus, Descriptor, DmaController, TdFlags, TdHandle};
use crate::memory::{Memory, Region};
use crate::spy::{SpyPeripheral, SpyStatus};

/// First SRAM address.
pub const SRAM_BASE: u32 = 0x2000_0000;
/// SRAM size in bytes.
pub const SRAM_SIZE: usize = 16 * 1024;
/// Transfer descriptors in the controller pool.
pub const TD_POOL_SIZE: usize = 128;
/// DMA channels.
pub const CHANNEL_COUNT: usize = 24;

/// UART transmit FIFO.
pub const UART_TX_FIFO: u32 = 0x4000_0000;
/// UART receive FIFO.
pub const UART_RX_FIFO: u32 = 0x4000_0004;
/// Spy input FIFO.
pub const SPY_FIFO_IN: u32 = 0x4000_0008;
/// Spy output FIFO.
pub const SPY_FIFO_OUT: u32 = 0x4000_000C;
/// Byte-swap input FIFO.
pub const BS_FIFO_IN: u32 = 0x4000_0010;
/// Byte-swap output FIFO.
pub const BS_FIFO_OUT: u32 = 0x4000_0014;
/// I2S transmit FIFO.
pub const I2S_TX_FIFO: u32 = 0x4000_0018;

const UART_TX_DEPTH: usize = 4;
const UART_RX_DEPTH: usize = 4;
const SPY_DEPTH: usize = 4;
const BS_OUT_DEPTH: usize = 8;
const I2S_DEPTH: usize = 8;

// Hard stop for a runaway chain (e.g. a memory-to-memory loop).
const PUMP_LIMIT: usize = 1 << 20;

/// Interrupt lines the simulator can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Irq {
    /// A descriptor with termout completed on this channel.
    Dma(ChannelId),
    /// The receive spy has a pending cause.
    Spy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Port {
    UartTx,
    UartRx,
    SpyIn,
    SpyOut,
    BsIn,
    BsOut,
    I2s,
}

fn port(addr: u32) -> Option<Port> {
    match addr {
        UART_TX_FIFO => Some(Port::UartTx),
        UART_RX_FIFO => Some(Port::UartRx),
        SPY_FIFO_IN => Some(Port::SpyIn),
        SPY_FIFO_OUT => Some(Port::SpyOut),
        BS_FIFO_IN => Some(Port::BsIn),
        BS_FIFO_OUT => Some(Port::BsOut),
        I2S_TX_FIFO => Some(Port::I2s),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Channel {
    initial: Option<TdHandle>,
    current: Option<TdHandle>,
    remaining: u16,
    enabled: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct SpyState {
    delimiter: u8,
    transfer_size: u16,
    started: bool,
    armed: bool,
    status: SpyStatus,
    idle: u32,
    unflushed: bool,
    delivered: u32,
}

/// The simulated SoC.
pub struct SimSoc {
    sram: Vec<u8>,
    next_free: u32,
    tds: Vec<Descriptor>,
    allocated: usize,
    channels: Vec<Channel>,

    uart_tx: Fifo,
    uart_rx: Fifo,
    spy_fifo: Fifo,
    bs_in: Fifo,
    bs_out: Fifo,
    i2s: Fifo,
    swap_width: usize,
    spy: SpyState,

    pending: VecDeque<Irq>,
    wire_out: Vec<u8>,
    i2s_out: Vec<u8>,
    rx_dropped: usize,
    design: Design,
}

impl SimSoc {
    /// Fresh SoC with the default hardware design laid out in SRAM.
    pub fn new() -> Self {
        let mut soc = Self {
            sram: std::vec![0; SRAM_SIZE],
            next_free: SRAM_BASE,
            tds: std::vec![Descriptor::default(); TD_POOL_SIZE],
            allocated: 0,
            channels: std::vec![Channel::default(); CHANNEL_COUNT],
            uart_tx: Fifo::new(UART_TX_DEPTH),
            uart_rx: Fifo::new(UART_RX_DEPTH),
            spy_fifo: Fifo::new(SPY_DEPTH),
            bs_in: Fifo::new(3),
            bs_out: Fifo::new(BS_OUT_DEPTH),
            i2s: Fifo::new(I2S_DEPTH),
            swap_width: 3,
            spy: SpyState::default(),
            pending: VecDeque::new(),
            wire_out: Vec::new(),
            i2s_out: Vec::new(),
            rx_dropped: 0,
            design: Design {
                usb_dma_ch: ChannelId::new(0),
                bs_dma_ch: ChannelId::new(1),
                i2s_dma_ch: ChannelId::new(2),
                uart_tx_ch: ChannelId::new(3),
                uart_rx_ch: ChannelId::new(4),
                spy_ch: ChannelId::new(5),
                bs_fifo_in: BS_FIFO_IN,
                bs_fifo_out: BS_FIFO_OUT,
                i2s_fifo: I2S_TX_FIFO,
                uart_tx_fifo: UART_TX_FIFO,
                uart_rx_fifo: UART_RX_FIFO,
                spy_fifo_in: SPY_FIFO_IN,
                spy_fifo_out: SPY_FIFO_OUT,
                usb_buf: Region::new(0, 0),
                audio_buf: Region::new(0, 0),
                tx_buf: Region::new(0, 0),
                rx_buf: Region::new(0, 0),
            },
        };
        soc.design.usb_buf = soc.alloc(USB_MAX_BUF_SIZE);
        soc.design.audio_buf = soc.alloc(AUDIO_OUT_BUF_SIZE);
        soc.design.tx_buf = soc.alloc(TX_BUF_SIZE);
        soc.design.rx_buf = soc.alloc(RX_BUF_SIZE);
        soc
    }

    /// Channel and buffer assignment of the simulated design.
    pub fn design(&self) -> Design {
        self.design
    }

    /// Reserve a word-aligned SRAM region.
    pub fn alloc(&mut self, len: u16) -> Region {
        let region = Region::new(self.next_free, len);
        self.next_free = (self.next_free + u32::from(len) + 3) & !3;
        region
    }

    /// Sample width the byte-swap block reverses, in bytes.
    pub fn set_swap_width(&mut self, width: usize) {
        self.swap_width = width.max(1);
        self.bs_in = Fifo::new(self.swap_width);
    }

    // ── Outside world ───────────────────────────────────────────────────

    /// Bytes arrive on the UART line, one at a time.
    pub fn uart_receive(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if !self.uart_rx.push(b) {
                self.rx_dropped += 1;
            }
            self.pump();
        }
    }

    /// The UART line stays idle for `ticks` spy clock periods.
    pub fn uart_idle(&mut self, ticks: u32) {
        if !self.spy.started {
            return;
        }
        self.spy.idle = self.spy.idle.saturating_add(ticks);
        if self.spy.unflushed && self.spy.idle >= IDLE_FLUSH_TICKS {
            self.spy.unflushed = false;
            self.spy.status = self.spy.status.union(SpyStatus::FLUSH);
            self.raise(Irq::Spy);
        }
    }

    /// Shift up to `max` bytes out of the UART transmitter.
    pub fn clock_uart_tx(&mut self, max: usize) -> usize {
        let mut shifted = 0;
        while shifted < max {
            let Some(b) = self.uart_tx.pop() else { break };
            self.wire_out.push(b);
            shifted += 1;
            self.pump();
        }
        shifted
    }

    /// Shift up to `max` bytes out of the I2S transmitter.
    pub fn clock_i2s(&mut self, max: usize) -> usize {
        let mut shifted = 0;
        while shifted < max {
            let Some(b) = self.i2s.pop() else { break };
            self.i2s_out.push(b);
            shifted += 1;
            self.pump();
        }
        shifted
    }

    /// Bytes the UART has put on the wire since the last call.
    pub fn take_wire_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.wire_out)
    }

    /// Bytes the I2S transmitter has clocked out since the last call.
    pub fn take_i2s_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.i2s_out)
    }

    /// Next pending interrupt, oldest first.
    pub fn take_irq(&mut self) -> Option<Irq> {
        self.pending.pop_front()
    }

    /// Number of pending interrupts.
    pub fn pending_irqs(&self) -> usize {
        self.pending.len()
    }

    /// Bytes lost because the UART receive FIFO was full.
    pub fn rx_dropped(&self) -> usize {
        self.rx_dropped
    }

    /// Transfer descriptors still available in the pool.
    pub fn free_tds(&self) -> usize {
        TD_POOL_SIZE - self.allocated
    }

    /// Whether the spy currently has delimiter detection armed.
    pub fn spy_armed(&self) -> bool {
        self.spy.armed
    }

    /// Line noise trips the delimiter compare: the spy reports a delimiter
    /// and disarms although none passed.
    pub fn spy_false_match(&mut self) {
        if !self.spy.armed {
            return;
        }
        self.spy.armed = false;
        self.spy.status = self.spy.status.union(SpyStatus::DELIMITER);
        self.raise(Irq::Spy);
    }

    /// RX descriptor length the spy was started with.
    pub fn spy_transfer_size(&self) -> u16 {
        self.spy.transfer_size
    }

    /// Bytes buffered in the UART transmit FIFO.
    pub fn uart_tx_level(&self) -> usize {
        self.uart_tx.len()
    }

    // ── DMA engine ──────────────────────────────────────────────────────

    fn raise(&mut self, irq: Irq) {
        if !self.pending.contains(&irq) {
            self.pending.push_back(irq);
        }
    }

    fn can_read(&self, addr: u32) -> bool {
        match port(addr) {
            Some(Port::UartRx) => !self.uart_rx.is_empty(),
            Some(Port::SpyOut) => !self.spy_fifo.is_empty(),
            Some(Port::BsOut) => !self.bs_out.is_empty(),
            Some(_) => false,
            None => self.sram_index(addr).is_some(),
        }
    }

    fn can_write(&self, addr: u32) -> bool {
        match port(addr) {
            Some(Port::UartTx) => !self.uart_tx.is_full(),
            Some(Port::SpyIn) => !self.spy_fifo.is_full(),
            Some(Port::BsIn) => {
                let completes_group = self.bs_in.len() + 1 >= self.swap_width;
                !self.bs_in.is_full() && (!completes_group || self.bs_out.free() >= self.swap_width)
            }
            Some(Port::I2s) => !self.i2s.is_full(),
            Some(_) => false,
            None => self.sram_index(addr).is_some(),
        }
    }

    fn load(&mut self, addr: u32) -> u8 {
        match port(addr) {
            Some(Port::UartRx) => self.uart_rx.pop().unwrap_or(0),
            Some(Port::SpyOut) => match self.spy_fifo.pop() {
                Some(b) => {
                    self.spy.delivered = self.spy.delivered.wrapping_add(1);
                    b
                }
                None => 0,
            },
            Some(Port::BsOut) => self.bs_out.pop().unwrap_or(0),
            Some(_) => 0,
            None => self.read_u8(addr),
        }
    }

    fn store(&mut self, addr: u32, byte: u8) {
        match port(addr) {
            Some(Port::UartTx) => {
                self.uart_tx.push(byte);
            }
            Some(Port::SpyIn) => self.spy_accept(byte),
            Some(Port::BsIn) => {
                self.bs_in.push(byte);
                if self.bs_in.len() >= self.swap_width {
                    let mut group = Vec::with_capacity(self.swap_width);
                    while let Some(b) = self.bs_in.pop() {
                        group.push(b);
                    }
                    for b in group.into_iter().rev() {
                        self.bs_out.push(b);
                    }
                }
            }
            Some(Port::I2s) => {
                self.i2s.push(byte);
            }
            Some(_) => {}
            None => self.write(addr, &[byte]),
        }
    }

    fn spy_accept(&mut self, byte: u8) {
        self.spy_fifo.push(byte);
        self.spy.idle = 0;
        if self.spy.armed && byte == self.spy.delimiter {
            self.spy.armed = false;
            self.spy.unflushed = false;
            self.spy.status = self.spy.status.union(SpyStatus::DELIMITER);
            self.raise(Irq::Spy);
        } else {
            self.spy.unflushed = true;
        }
    }

    /// Move one byte on channel `idx`. Returns whether anything moved.
    fn step(&mut self, idx: usize) -> bool {
        let Some(ch) = self.channels.get(idx).copied() else {
            return false;
        };
        let Some(td) = ch.current.filter(|_| ch.enabled && ch.remaining > 0) else {
            return false;
        };
        let desc = self.td_descriptor(td);
        let done = u32::from(desc.count.saturating_sub(ch.remaining));
        let src = if desc.flags.inc_src { desc.src + done } else { desc.src };
        let dst = if desc.flags.inc_dst { desc.dst + done } else { desc.dst };
        if !self.can_read(src) || !self.can_write(dst) {
            return false;
        }
        let byte = self.load(src);
        self.store(dst, byte);

        let mut next = ch;
        next.remaining -= 1;
        if next.remaining == 0 {
            if desc.flags.termout {
                self.raise(Irq::Dma(ChannelId::new(idx as u8)));
            }
            match desc.next {
                Some(n) => {
                    next.current = Some(n);
                    next.remaining = self.td_descriptor(n).count;
                }
                None => {
                    next.current = None;
                    next.enabled = false;
                }
            }
        }
        if let Some(slot) = self.channels.get_mut(idx) {
            *slot = next;
        }
        true
    }

    /// Run every channel until none can make progress.
    fn pump(&mut self) {
        let mut budget = PUMP_LIMIT;
        loop {
            let mut moved = false;
            for idx in 0..CHANNEL_COUNT {
                while budget > 0 && self.step(idx) {
                    moved = true;
                    budget -= 1;
                }
            }
            if !moved || budget == 0 {
                break;
            }
        }
    }

    fn sram_index(&self, addr: u32) -> Option<usize> {
        let idx = addr.checked_sub(SRAM_BASE)? as usize;
        (idx < self.sram.len()).then_some(idx)
    }

    fn channel_mut(&mut self, ch: ChannelId) -> Option<&mut Channel> {
        self.channels.get_mut(ch.index())
    }
}

impl Default for SimSoc {
    fn default() -> Self {
        Self::new()
    }
}

impl DmaController for SimSoc {
    fn td_allocate(&mut self) -> Option<TdHandle> {
        if self.allocated >= TD_POOL_SIZE {
            return None;
        }
        let td = TdHandle::new(self.allocated as u8);
        self.allocated += 1;
        Some(td)
    }

    fn td_configure(&mut self, td: TdHandle, count: u16, next: Option<TdHandle>, flags: TdFlags) {
        if let Some(d) = self.tds.get_mut(td.index()) {
            d.count = count;
            d.next = next;
            d.flags = flags;
        }
    }

    fn td_set_address(&mut self, td: TdHandle, src: u32, dst: u32) {
        if let Some(d) = self.tds.get_mut(td.index()) {
            d.src = src;
            d.dst = dst;
        }
    }

    fn td_descriptor(&self, td: TdHandle) -> Descriptor {
        self.tds.get(td.index()).copied().unwrap_or_default()
    }

    fn ch_set_initial_td(&mut self, ch: ChannelId, td: TdHandle) {
        if let Some(c) = self.channel_mut(ch) {
            c.initial = Some(td);
        }
    }

    fn ch_enable(&mut self, ch: ChannelId) {
        let initial = self.channels.get(ch.index()).and_then(|c| c.initial);
        let count = initial.map_or(0, |td| self.td_descriptor(td).count);
        if let Some(c) = self.channel_mut(ch) {
            c.current = initial;
            c.remaining = count;
            c.enabled = initial.is_some();
        }
        self.pump();
    }

    fn ch_disable(&mut self, ch: ChannelId) {
        if let Some(c) = self.channel_mut(ch) {
            c.enabled = false;
            c.current = None;
            c.remaining = 0;
        }
    }

    fn ch_status(&self, ch: ChannelId) -> ChannelStatus {
        self.channels
            .get(ch.index())
            .map(|c| ChannelStatus {
                current_td: c.current,
                remaining: c.remaining,
                active: c.enabled,
            })
            .unwrap_or_default()
    }
}

impl Memory for SimSoc {
    fn read(&self, addr: u32, out: &mut [u8]) {
        for (i, b) in out.iter_mut().enumerate() {
            *b = self
                .sram_index(addr.wrapping_add(i as u32))
                .and_then(|idx| self.sram.get(idx).copied())
                .unwrap_or(0);
        }
    }

    fn write(&mut self, addr: u32, data: &[u8]) {
        for (i, &b) in data.iter().enumerate() {
            if let Some(idx) = self.sram_index(addr.wrapping_add(i as u32)) {
                if let Some(slot) = self.sram.get_mut(idx) {
                    *slot = b;
                }
            }
        }
    }
}

impl SpyPeripheral for SimSoc {
    fn start(&mut self, delimiter: u8, transfer_size: u16) {
        self.spy = SpyState {
            delimiter,
            transfer_size,
            started: true,
            armed: true,
            ..SpyState::default()
        };
        self.spy_fifo.clear();
    }

    fn service(&mut self) -> SpyStatus {
        std::mem::take(&mut self.spy.status)
    }

    fn resume(&mut self) {
        self.spy.armed = true;
    }

    fn delivered(&self) -> u32 {
        self.spy.delivered
    }
}
