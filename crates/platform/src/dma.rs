//! DMA abstraction layer
//!
//! The DMA controller executes chains of transfer descriptors (TDs). Each TD
//! moves `count` bytes from a source address to a destination address,
//! optionally incrementing either side, then either stops the channel or
//! continues with the next TD in the chain. A TD may raise the channel's
//! completion interrupt ("termout") when it finishes.
//!
//! ```text
//!   channel ──▶ TD0 ──▶ TD1 ──▶ … ──▶ TDn-1 ─┐
//!                ▲                          │   cyclic chain
//!                └──────────────────────────┘
//! ```
//!
//! Consumers own their TD handles for the whole program lifetime. The pool
//! is allocated once at boot and never returned.
//!
//! [`DescriptorChain`] is the building block every data path uses: a fixed
//! set of TDs on one channel, configured either as a cyclic ring over a
//! buffer or as independent one-shot transfers.

use thiserror_no_std::Error;

use crate::memory::Region;

/// Largest byte count a single transfer descriptor can carry.
pub const MAX_TD_COUNT: u16 = 4095;

/// Opaque handle to a hardware transfer descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TdHandle(u8);

impl TdHandle {
    /// Wrap a raw descriptor index.
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    /// Raw descriptor index in the controller's pool.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Hardware DMA channel number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelId(u8);

impl ChannelId {
    /// Wrap a raw channel number.
    pub const fn new(channel: u8) -> Self {
        Self(channel)
    }

    /// Raw channel number.
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Per-descriptor transfer options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TdFlags {
    /// Raise the channel's completion interrupt when this TD finishes.
    pub termout: bool,
    /// Advance the source address after every byte.
    pub inc_src: bool,
    /// Advance the destination address after every byte.
    pub inc_dst: bool,
}

impl TdFlags {
    /// SRAM buffer into a peripheral FIFO.
    pub const MEM_TO_PERIPH: Self = Self {
        termout: false,
        inc_src: true,
        inc_dst: false,
    };

    /// Peripheral FIFO into an SRAM buffer.
    pub const PERIPH_TO_MEM: Self = Self {
        termout: false,
        inc_src: false,
        inc_dst: true,
    };

    /// FIFO to FIFO, no address movement on either side.
    pub const PERIPH_TO_PERIPH: Self = Self {
        termout: false,
        inc_src: false,
        inc_dst: false,
    };

    /// Same options with the completion interrupt enabled (or not).
    #[must_use]
    pub const fn with_termout(self, termout: bool) -> Self {
        Self {
            termout,
            inc_src: self.inc_src,
            inc_dst: self.inc_dst,
        }
    }
}

/// Which side of a buffer transfer the peripheral FIFO sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// FIFO into the buffer.
    ToMemory,
    /// Buffer into the FIFO.
    FromMemory,
}

/// Full contents of one transfer descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Descriptor {
    /// Bytes moved by this TD.
    pub count: u16,
    /// Source address.
    pub src: u32,
    /// Destination address.
    pub dst: u32,
    /// TD executed after this one, `None` ends the chain.
    pub next: Option<TdHandle>,
    /// Transfer options.
    pub flags: TdFlags,
}

/// Snapshot of a channel's progress through its chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelStatus {
    /// TD currently loaded into the channel.
    pub current_td: Option<TdHandle>,
    /// Bytes the current TD has yet to move.
    pub remaining: u16,
    /// Whether the channel is enabled and has a TD loaded.
    pub active: bool,
}

/// DMA configuration errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DmaError {
    /// The controller has no free transfer descriptors left.
    #[error("transfer descriptor pool exhausted")]
    ResourceExhausted,
    /// A descriptor was asked to carry zero bytes or more than [`MAX_TD_COUNT`].
    #[error("transfer count {0} outside 1..=4095")]
    InvalidCount(u16),
    /// More descriptors were requested than the caller can hold.
    #[error("descriptor chain capacity exceeded")]
    ChainTooLong,
}

/// Register-level operations of the DMA controller.
///
/// Mirrors the controller's own vocabulary: allocate a TD, write its
/// configuration and addresses, point a channel at a TD, enable.
pub trait DmaController {
    /// Take one descriptor from the free pool.
    fn td_allocate(&mut self) -> Option<TdHandle>;

    /// Write byte count, chain link and flags of `td`.
    fn td_configure(&mut self, td: TdHandle, count: u16, next: Option<TdHandle>, flags: TdFlags);

    /// Write source and destination addresses of `td`.
    fn td_set_address(&mut self, td: TdHandle, src: u32, dst: u32);

    /// Read back the full descriptor.
    fn td_descriptor(&self, td: TdHandle) -> Descriptor;

    /// Select the TD a channel loads when it is next enabled.
    fn ch_set_initial_td(&mut self, ch: ChannelId, td: TdHandle);

    /// Load the initial TD and start moving data.
    fn ch_enable(&mut self, ch: ChannelId);

    /// Stop the channel. An in-flight TD is abandoned.
    fn ch_disable(&mut self, ch: ChannelId);

    /// Current TD and residual count of the channel.
    fn ch_status(&self, ch: ChannelId) -> ChannelStatus;
}

/// Allocate `count` descriptors.
///
/// Fails with [`DmaError::ResourceExhausted`] when the pool runs dry. The
/// descriptors taken before the failure stay allocated; callers treat this
/// as a boot-time fault.
pub fn allocate<D, const N: usize>(
    dma: &mut D,
    count: usize,
) -> Result<heapless::Vec<TdHandle, N>, DmaError>
where
    D: DmaController + ?Sized,
{
    if count > N {
        return Err(DmaError::ChainTooLong);
    }
    let mut tds = heapless::Vec::new();
    for _ in 0..count {
        let td = dma.td_allocate().ok_or(DmaError::ResourceExhausted)?;
        tds.push(td).map_err(|_| DmaError::ChainTooLong)?;
    }
    Ok(tds)
}

/// Configure one descriptor after validating its byte count.
pub fn configure<D>(
    dma: &mut D,
    td: TdHandle,
    count: u16,
    next: Option<TdHandle>,
    flags: TdFlags,
) -> Result<(), DmaError>
where
    D: DmaController + ?Sized,
{
    if count == 0 || count > MAX_TD_COUNT {
        return Err(DmaError::InvalidCount(count));
    }
    dma.td_configure(td, count, next, flags);
    Ok(())
}

/// Point `ch` at `td` and start it.
pub fn start<D: DmaController + ?Sized>(dma: &mut D, ch: ChannelId, td: TdHandle) {
    dma.ch_set_initial_td(ch, td);
    dma.ch_enable(ch);
}

// ── Descriptor chains ───────────────────────────────────────────────────────

/// A fixed set of descriptors owned by one channel.
#[derive(Debug, Clone)]
pub struct DescriptorChain<const N: usize> {
    channel: ChannelId,
    tds: heapless::Vec<TdHandle, N>,
}

impl<const N: usize> DescriptorChain<N> {
    /// Allocate `count` descriptors for `channel`.
    pub fn allocate<D: DmaController + ?Sized>(
        dma: &mut D,
        channel: ChannelId,
        count: usize,
    ) -> Result<Self, DmaError> {
        Ok(Self {
            channel,
            tds: allocate(dma, count)?,
        })
    }

    /// Channel the chain runs on.
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Number of descriptors.
    pub fn len(&self) -> usize {
        self.tds.len()
    }

    /// Whether the chain holds no descriptors.
    pub fn is_empty(&self) -> bool {
        self.tds.is_empty()
    }

    /// Descriptor at `slot`.
    pub fn td(&self, slot: usize) -> Option<TdHandle> {
        self.tds.get(slot).copied()
    }

    /// Slot of `td` within this chain.
    pub fn slot_of(&self, td: TdHandle) -> Option<usize> {
        self.tds.iter().position(|&t| t == td)
    }

    /// Link every descriptor into a ring that covers `buffer` in
    /// `segment`-byte pieces, the last piece taking the remainder.
    ///
    /// `fifo` is the peripheral side of every transfer. Every descriptor
    /// raises termout when `termout` is set.
    pub fn configure_cyclic<D: DmaController + ?Sized>(
        &self,
        dma: &mut D,
        buffer: Region,
        segment: u16,
        fifo: u32,
        direction: Direction,
        termout: bool,
    ) -> Result<(), DmaError> {
        let pieces = cyclic_pieces(buffer.len(), segment)?;
        if pieces != self.tds.len() {
            return Err(DmaError::ChainTooLong);
        }
        let flags = match direction {
            Direction::ToMemory => TdFlags::PERIPH_TO_MEM,
            Direction::FromMemory => TdFlags::MEM_TO_PERIPH,
        }
        .with_termout(termout);

        let mut offset: u16 = 0;
        for (slot, &td) in self.tds.iter().enumerate() {
            let count = segment.min(buffer.len().saturating_sub(offset));
            let next = self.tds.get(slot.wrapping_add(1)).or(self.tds.first()).copied();
            configure(dma, td, count, next, flags)?;
            let addr = buffer.addr(offset);
            match direction {
                Direction::ToMemory => dma.td_set_address(td, fifo, addr),
                Direction::FromMemory => dma.td_set_address(td, addr, fifo),
            }
            offset = offset.saturating_add(count);
        }
        Ok(())
    }

    /// Start the channel at the descriptor in `slot`.
    pub fn start_at<D: DmaController + ?Sized>(
        &self,
        dma: &mut D,
        slot: usize,
    ) -> Result<(), DmaError> {
        let td = self.td(slot).ok_or(DmaError::ChainTooLong)?;
        start(dma, self.channel, td);
        Ok(())
    }

    /// Stop the channel.
    pub fn stop<D: DmaController + ?Sized>(&self, dma: &mut D) {
        dma.ch_disable(self.channel);
    }
}

/// Number of `segment`-byte descriptors needed to cover `len` bytes.
pub fn cyclic_pieces(len: u16, segment: u16) -> Result<usize, DmaError> {
    if segment == 0 || segment > MAX_TD_COUNT {
        return Err(DmaError::InvalidCount(segment));
    }
    if len == 0 {
        return Err(DmaError::InvalidCount(len));
    }
    Ok(usize::from(len.div_ceil(segment)))
}
