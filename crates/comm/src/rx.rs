//! Receive path.
//!
//! ```text
//!            read        flushed            written
//!             │             │                  │
//!   RX ring  [·····█████████████░░░░░░░░░░░░░░░·····]
//!                  ◀ consumable ▶◀ not delimited ▶
//! ```
//!
//! `written` is the spy's delivered-byte counter, so a burst longer than
//! the ring still shows up as a lap. The channel's current descriptor and
//! residual count must map to the same ring offset; if they do not, the
//! event is malformed. `flushed` is the last published frame boundary; the
//! main loop may consume up to it and no further. `read` belongs to the
//! main loop alone.
//!
//! On a delimiter event the boundary is the byte after the last delimiter
//! between `flushed` and `written`. On an idle flush it is `written`
//! itself. Each new boundary bumps `boundary_seq`; the main loop
//! acknowledges it by resuming the spy once drained.
//!
//! An overrun or a malformed event discards everything up to `written`:
//! the handler publishes `discard_to` together with a boundary there, so
//! the main loop skips the bytes and re-arms the spy for the next frame.

use platform::dma::{self, cyclic_pieces, DescriptorChain, Direction};
use platform::ring::{distance, is_ahead, RingCursor};
use platform::{
    ChannelId, ChannelStatus, DmaController, DmaError, FaultKind, Memory, Region, SpyPeripheral,
    SpyStatus, TdFlags, TdHandle,
};

use crate::{CommConfig, CommError, CommShared};
use platform::config::COMM_MAX_RX_TD;

/// Counters published by the interrupt half.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RxProgress {
    pub(crate) written: u32,
    pub(crate) flushed: u32,
    pub(crate) boundary_seq: u32,
    pub(crate) discard_to: u32,
    pub(crate) discard_seq: u32,
}

impl RxProgress {
    pub(crate) const fn new() -> Self {
        Self {
            written: 0,
            flushed: 0,
            boundary_seq: 0,
            discard_to: 0,
            discard_seq: 0,
        }
    }
}

/// Interrupt side: tracks the DMA write position and frame boundaries.
pub(crate) struct RxTracker {
    chain: DescriptorChain<COMM_MAX_RX_TD>,
    /// `(offset, len)` of each descriptor's slice of the ring.
    pieces: heapless::Vec<(u16, u16), COMM_MAX_RX_TD>,
    buffer: Region,
    delimiter: u8,
    progress: RxProgress,
    overrun_at_read: Option<u32>,
}

/// Descriptors the main loop starts the receive path with.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RxStart {
    spy_first: TdHandle,
    pass: TdHandle,
}

/// Main-loop side: owns the read counter.
pub(crate) struct RxReader {
    entry: RxStart,
    buffer: Region,
    read: u32,
    resumed_seq: u32,
    seen_discard_seq: u32,
    consumed: u32,
}

impl RxTracker {
    pub(crate) fn create<D: DmaController + ?Sized>(
        dma: &mut D,
        config: &CommConfig,
        n_pieces: usize,
    ) -> Result<(Self, RxStart), CommError> {
        let chain = DescriptorChain::allocate(dma, config.spy_ch, n_pieces)?;
        chain.configure_cyclic(
            dma,
            config.rx_buffer,
            config.rx_transfer_size,
            config.spy_fifo_out,
            Direction::ToMemory,
            true,
        )?;

        let mut pieces = heapless::Vec::new();
        let mut offset: u16 = 0;
        for _ in 0..cyclic_pieces(config.rx_buffer.len(), config.rx_transfer_size)? {
            let len = config.rx_transfer_size.min(config.rx_buffer.len().saturating_sub(offset));
            pieces.push((offset, len)).map_err(|_| CommError::InvalidConfig)?;
            offset = offset.saturating_add(len);
        }

        // UART RX to spy: one byte, forever.
        let pass = dma.td_allocate().ok_or(DmaError::ResourceExhausted)?;
        dma::configure(dma, pass, 1, Some(pass), TdFlags::PERIPH_TO_PERIPH)?;
        dma.td_set_address(pass, config.uart_rx_fifo, config.spy_fifo_in);

        let spy_first = chain.td(0).ok_or(CommError::InvalidConfig)?;
        Ok((
            Self {
                chain,
                pieces,
                buffer: config.rx_buffer,
                delimiter: config.delimiter,
                progress: RxProgress::new(),
                overrun_at_read: None,
            },
            RxStart { spy_first, pass },
        ))
    }

    pub(crate) fn channel(&self) -> ChannelId {
        self.chain.channel()
    }

    fn capacity(&self) -> u32 {
        u32::from(self.buffer.len())
    }

    /// Ring offset of stream counter `at`.
    #[allow(clippy::arithmetic_side_effects)] // capacity is non-zero, checked in `create`
    fn offset_of(&self, at: u32) -> u32 {
        at % self.capacity()
    }

    /// Ring offset the spy channel writes next, `None` if the channel state
    /// does not belong to this chain.
    fn position(&self, st: ChannelStatus) -> Option<u32> {
        let slot = self.chain.slot_of(st.current_td?)?;
        let &(offset, len) = self.pieces.get(slot)?;
        if st.remaining > len {
            return None;
        }
        let pos = u32::from(offset).saturating_add(u32::from(len.saturating_sub(st.remaining)));
        Some(self.offset_of(pos))
    }

    /// Boundary just past the last delimiter in `(floor, written]`.
    fn scan_back<M: Memory + ?Sized>(&self, mem: &M, floor: u32, written: u32) -> Option<u32> {
        let ring = RingCursor::new(self.capacity());
        let mut at = written;
        while is_ahead(at, floor) {
            let prev = at.wrapping_sub(1);
            let (span, _) = ring.spans(prev, 1);
            let offset = u16::try_from(span.offset).ok()?;
            if mem.read_u8(self.buffer.addr(offset)) == self.delimiter {
                return Some(at);
            }
            at = prev;
        }
        None
    }

    pub(crate) fn on_event<B>(&mut self, bus: &mut B, shared: &CommShared)
    where
        B: DmaController + Memory + SpyPeripheral + ?Sized,
    {
        let status = bus.service();
        let written = bus.delivered();
        self.progress.written = written;
        let cap = self.capacity();

        let read = critical_section::with(|cs| shared.rx_read.borrow(cs).get());
        if distance(read, written) > cap && self.overrun_at_read != Some(read) {
            self.overrun_at_read = Some(read);
            shared.faults.record(FaultKind::Overrun);
            self.discard(written);
        } else {
            match self.resolve(&*bus, status, read, written) {
                Ok(Some(b)) => self.publish_boundary(b),
                Ok(None) => {}
                Err(kind) => {
                    shared.faults.record(kind);
                    self.discard(written);
                }
            }
        }

        let progress = self.progress;
        critical_section::with(|cs| shared.rx_progress.borrow(cs).set(progress));
    }

    /// Frame boundary this event establishes, if any.
    fn resolve<B>(
        &self,
        bus: &B,
        status: SpyStatus,
        read: u32,
        written: u32,
    ) -> Result<Option<u32>, FaultKind>
    where
        B: DmaController + Memory + ?Sized,
    {
        if self.position(bus.ch_status(self.chain.channel())) != Some(self.offset_of(written)) {
            return Err(FaultKind::MalformedFrame);
        }
        if status.contains(SpyStatus::FLUSH) {
            return Ok(Some(written));
        }
        if !status.contains(SpyStatus::DELIMITER) {
            return Ok(None);
        }

        // Never look further back than one lap, nor behind what is already
        // published or consumed.
        let lap_start = written.wrapping_sub(self.capacity());
        let floor = [self.progress.flushed, read]
            .into_iter()
            .filter(|&c| !is_ahead(c, written))
            .fold(lap_start, |acc, c| if is_ahead(c, acc) { c } else { acc });
        self.scan_back(bus, floor, written).map(Some).ok_or(FaultKind::MalformedFrame)
    }

    fn publish_boundary(&mut self, at: u32) {
        if is_ahead(at, self.progress.flushed) {
            self.progress.flushed = at;
            self.progress.boundary_seq = self.progress.boundary_seq.wrapping_add(1);
        }
    }

    /// Everything before `at` is unusable.
    fn discard(&mut self, at: u32) {
        self.progress.discard_to = at;
        self.progress.discard_seq = self.progress.discard_seq.wrapping_add(1);
        self.publish_boundary(at);
    }
}

impl RxReader {
    pub(crate) fn new(entry: RxStart, buffer: Region) -> Self {
        Self {
            entry,
            buffer,
            read: 0,
            resumed_seq: 0,
            seen_discard_seq: 0,
            consumed: 0,
        }
    }

    /// Spy channel first so the pass-through never finds it idle.
    pub(crate) fn start<D: DmaController + ?Sized>(&mut self, dma: &mut D, config: &CommConfig) {
        dma::start(dma, config.spy_ch, self.entry.spy_first);
        dma::start(dma, config.uart_rx_ch, self.entry.pass);
    }

    fn publish_read(&self, shared: &CommShared) {
        let read = self.read;
        critical_section::with(|cs| shared.rx_read.borrow(cs).set(read));
    }

    /// Read counter once any pending discard is applied.
    fn read_after_discard(&self, progress: &RxProgress) -> u32 {
        let fresh = progress.discard_seq != self.seen_discard_seq;
        if fresh && is_ahead(progress.discard_to, self.read) {
            progress.discard_to
        } else {
            self.read
        }
    }

    fn apply_discard(&mut self, shared: &CommShared, progress: &RxProgress) {
        if progress.discard_seq == self.seen_discard_seq {
            return;
        }
        self.read = self.read_after_discard(progress);
        self.seen_discard_seq = progress.discard_seq;
        self.publish_read(shared);
    }

    pub(crate) fn available(&self, shared: &CommShared) -> u32 {
        let progress = shared.progress();
        distance(self.read_after_discard(&progress), progress.flushed)
    }

    pub(crate) fn pending(&self, shared: &CommShared) -> bool {
        shared.progress().boundary_seq != self.resumed_seq
    }

    pub(crate) fn consumed(&self) -> u32 {
        self.consumed
    }

    pub(crate) fn service<M>(&mut self, mem: &M, shared: &CommShared, out: &mut [u8]) -> usize
    where
        M: Memory + ?Sized,
    {
        let progress = shared.progress();
        self.apply_discard(shared, &progress);

        let avail = distance(self.read, progress.flushed);
        let n = avail.min(u32::try_from(out.len()).unwrap_or(u32::MAX));
        if n == 0 {
            return 0;
        }
        let ring = RingCursor::new(u32::from(self.buffer.len()));
        let (a, b) = ring.spans(self.read, n);
        let (head, rest) = out.split_at_mut(a.len as usize);
        mem.read(self.buffer.addr(u16::try_from(a.offset).unwrap_or(0)), head);
        if let Some(tail) = rest.get_mut(..b.len as usize) {
            mem.read(self.buffer.addr(0), tail);
        }
        self.read = self.read.wrapping_add(n);
        self.consumed = self.consumed.wrapping_add(n);
        self.publish_read(shared);
        n as usize
    }

    pub(crate) fn resume<S>(&mut self, spy: &mut S, shared: &CommShared) -> bool
    where
        S: SpyPeripheral + ?Sized,
    {
        let progress = shared.progress();
        self.apply_discard(shared, &progress);
        if progress.boundary_seq == self.resumed_seq || distance(self.read, progress.flushed) != 0 {
            return false;
        }
        self.resumed_seq = progress.boundary_seq;
        spy.resume();
        true
    }
}
