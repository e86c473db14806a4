//! Transmit path.
//!
//! The main loop owns the ring's write counter and the descriptor
//! round-robin. The TX interrupt owns the read counter. The queue of
//! programmed-but-unfinished chunks sits between them under a critical
//! section; whoever finds the channel idle after touching the queue arms it.

use platform::dma::{self, DescriptorChain};
use platform::ring::RingCursor;
use platform::{ChannelId, DmaController, FaultKind, Memory, Region, TdFlags};

use crate::{CommConfig, CommError, CommShared};
use platform::config::COMM_MAX_TX_TD;

/// One programmed descriptor awaiting completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TxChunk {
    slot: u8,
    len: u16,
}

pub(crate) struct TxQueue {
    chunks: heapless::Deque<TxChunk, COMM_MAX_TX_TD>,
    active: bool,
    read: u32,
    bytes_sent: u32,
    chunks_sent: u32,
}

impl TxQueue {
    pub(crate) const fn new() -> Self {
        Self {
            chunks: heapless::Deque::new(),
            active: false,
            read: 0,
            bytes_sent: 0,
            chunks_sent: 0,
        }
    }
}

/// Main-loop side.
pub(crate) struct TxWriter {
    chain: DescriptorChain<COMM_MAX_TX_TD>,
    buffer: Region,
    fifo: u32,
    transfer_size: u16,
    write: u32,
    next_slot: usize,
    frames: u32,
}

/// Interrupt side.
pub(crate) struct TxDrain {
    chain: DescriptorChain<COMM_MAX_TX_TD>,
}

impl TxWriter {
    pub(crate) fn create<D: DmaController + ?Sized>(
        dma: &mut D,
        config: &CommConfig,
    ) -> Result<Self, CommError> {
        let chain = DescriptorChain::allocate(dma, config.uart_tx_ch, config.uart_tx_n_td)?;
        Ok(Self {
            chain,
            buffer: config.tx_buffer,
            fifo: config.uart_tx_fifo,
            transfer_size: config.tx_transfer_size,
            write: 0,
            next_slot: 0,
            frames: 0,
        })
    }

    pub(crate) fn drain(&self) -> TxDrain {
        TxDrain {
            chain: self.chain.clone(),
        }
    }

    fn cursor(&self, shared: &CommShared) -> (RingCursor, usize) {
        let (read, queued) = critical_section::with(|cs| {
            let q = shared.tx.borrow_ref(cs);
            (q.read, q.chunks.len())
        });
        (
            RingCursor::from_counters(u32::from(self.buffer.len()), self.write, read),
            queued,
        )
    }

    pub(crate) fn free(&self, shared: &CommShared) -> u32 {
        self.cursor(shared).0.free()
    }

    pub(crate) fn is_idle(&self, shared: &CommShared) -> bool {
        critical_section::with(|cs| {
            let q = shared.tx.borrow_ref(cs);
            !q.active && q.chunks.is_empty()
        })
    }

    pub(crate) fn frames(&self) -> u32 {
        self.frames
    }

    pub(crate) fn sent(&self, shared: &CommShared) -> (u32, u32) {
        critical_section::with(|cs| {
            let q = shared.tx.borrow_ref(cs);
            (q.bytes_sent, q.chunks_sent)
        })
    }

    /// Split `total` bytes from the write counter into descriptor-sized,
    /// non-wrapping segments.
    fn plan(&self, total: u32) -> Result<heapless::Vec<(u16, u16), COMM_MAX_TX_TD>, CommError> {
        let ring = RingCursor::new(u32::from(self.buffer.len()));
        let mut segments = heapless::Vec::new();
        let mut at = self.write;
        let mut left = total;
        while left > 0 {
            let (span, _) = ring.spans(at, left);
            let len = span.len.min(u32::from(self.transfer_size));
            let seg = (
                u16::try_from(span.offset).map_err(|_| CommError::InvalidConfig)?,
                u16::try_from(len).map_err(|_| CommError::InvalidConfig)?,
            );
            segments.push(seg).map_err(|_| CommError::BufferFull)?;
            at = at.wrapping_add(len);
            left = left.saturating_sub(len);
        }
        Ok(segments)
    }

    pub(crate) fn send_parts<B>(
        &mut self,
        bus: &mut B,
        shared: &CommShared,
        parts: &[&[u8]],
    ) -> Result<usize, CommError>
    where
        B: DmaController + Memory + ?Sized,
    {
        let total = parts.iter().fold(0usize, |acc, p| acc.saturating_add(p.len()));
        if total == 0 {
            return Ok(0);
        }
        let total32 = u32::try_from(total).map_err(|_| CommError::BufferFull)?;

        let (ring, queued) = self.cursor(shared);
        let free_tds = self.chain.len().saturating_sub(queued);
        let segments = match self.plan(total32) {
            Ok(s) if total32 <= ring.free() && s.len() <= free_tds => s,
            Ok(_) | Err(CommError::BufferFull) => {
                shared.faults.record(FaultKind::BufferFull);
                return Err(CommError::BufferFull);
            }
            Err(e) => return Err(e),
        };

        // Copy payload into the ring, split where it wraps.
        let mut at = self.write;
        for part in parts {
            let part_len = u32::try_from(part.len()).map_err(|_| CommError::BufferFull)?;
            let (a, b) = ring.spans(at, part_len);
            let head_len = usize::try_from(a.len).unwrap_or(part.len()).min(part.len());
            let (head, tail) = part.split_at(head_len);
            bus.write(self.buffer.addr(u16::try_from(a.offset).unwrap_or(0)), head);
            if b.len > 0 {
                bus.write(self.buffer.addr(0), tail);
            }
            at = at.wrapping_add(a.len.wrapping_add(b.len));
        }

        // Program one standalone descriptor per segment.
        let n_td = self.chain.len();
        let mut chunks: heapless::Vec<TxChunk, COMM_MAX_TX_TD> = heapless::Vec::new();
        for (i, &(offset, len)) in segments.iter().enumerate() {
            let slot = self.next_slot.wrapping_add(i).checked_rem(n_td).unwrap_or(0);
            let td = self.chain.td(slot).ok_or(CommError::InvalidConfig)?;
            dma::configure(bus, td, len, None, TdFlags::MEM_TO_PERIPH.with_termout(true))?;
            bus.td_set_address(td, self.buffer.addr(offset), self.fifo);
            let slot = u8::try_from(slot).map_err(|_| CommError::InvalidConfig)?;
            chunks.push(TxChunk { slot, len }).map_err(|_| CommError::BufferFull)?;
        }
        self.next_slot = self.next_slot.wrapping_add(chunks.len()).checked_rem(n_td).unwrap_or(0);
        self.write = self.write.wrapping_add(total32);
        self.frames = self.frames.wrapping_add(1);

        let chain = &self.chain;
        critical_section::with(|cs| {
            let mut q = shared.tx.borrow_ref_mut(cs);
            for c in &chunks {
                // Capacity was checked against `queued` above and only the
                // interrupt can shrink the queue in between.
                let _ = q.chunks.push_back(*c);
            }
            if !q.active {
                if let Some(first) = q.chunks.front().and_then(|c| chain.td(usize::from(c.slot))) {
                    q.active = true;
                    dma::start(bus, chain.channel(), first);
                }
            }
        });
        Ok(total)
    }
}

impl TxDrain {
    pub(crate) fn channel(&self) -> ChannelId {
        self.chain.channel()
    }

    pub(crate) fn on_complete<D: DmaController + ?Sized>(
        &mut self,
        dma: &mut D,
        shared: &CommShared,
    ) {
        let chain = &self.chain;
        critical_section::with(|cs| {
            let mut q = shared.tx.borrow_ref_mut(cs);
            if !q.active {
                return;
            }
            if let Some(done) = q.chunks.pop_front() {
                q.read = q.read.wrapping_add(u32::from(done.len));
                q.bytes_sent = q.bytes_sent.wrapping_add(u32::from(done.len));
                q.chunks_sent = q.chunks_sent.wrapping_add(1);
            }
            match q.chunks.front().and_then(|c| chain.td(usize::from(c.slot))) {
                Some(next) => dma::start(dma, chain.channel(), next),
                None => q.active = false,
            }
        });
    }
}
