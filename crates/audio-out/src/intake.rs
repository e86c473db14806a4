//! Intake stage.
//!
//! Each isochronous OUT packet is moved by two channels in lockstep:
//!
//! ```text
//!   usb_buf[offset..] ─usb TD─▶ BS in ═swap═ BS out ─bs TD0 ─▶ ring[w..cap]
//!                                                  └─bs TD1 ─▶ ring[0..]   (wrap only)
//! ```
//!
//! The packet callback and the `bs` completion interrupt are the only
//! writers of [`IntakeState`]. `in_flight` is non-zero exactly while the
//! descriptors are programmed, so it also guards them against re-entry.

use platform::dma::{self, DescriptorChain};
use platform::ring::RingCursor;
use platform::{ChannelId, DmaController, DmaError, FaultKind, Region, TdFlags, TdHandle};

use crate::{AudioError, AudioOutConfig, AudioShared, StreamState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct IntakeState {
    /// Bytes the reorder stage has delivered into the ring.
    pub(crate) landed: u32,
    /// Bytes of the packet currently being reordered.
    pub(crate) in_flight: u16,
}

impl IntakeState {
    pub(crate) const fn new() -> Self {
        Self {
            landed: 0,
            in_flight: 0,
        }
    }
}

pub(crate) struct Intake {
    usb_ch: ChannelId,
    usb_td: TdHandle,
    usb_buf: Region,
    bs_fifo_in: u32,
    bs: DescriptorChain<2>,
    bs_fifo_out: u32,
    ring: Region,
}

impl Intake {
    pub(crate) fn create<D: DmaController + ?Sized>(
        dma: &mut D,
        config: &AudioOutConfig,
    ) -> Result<Self, AudioError> {
        let usb_td = dma.td_allocate().ok_or(DmaError::ResourceExhausted)?;
        let bs = DescriptorChain::allocate(dma, config.bs_dma_ch, 2)?;
        Ok(Self {
            usb_ch: config.usb_dma_ch,
            usb_td,
            usb_buf: config.usb_buf,
            bs_fifo_in: config.bs_fifo_in,
            bs,
            bs_fifo_out: config.bs_fifo_out,
            ring: config.out_buf,
        })
    }

    /// A packet of `count` bytes landed at `offset` in the USB buffer.
    pub(crate) fn receive<D: DmaController + ?Sized>(
        &self,
        dma: &mut D,
        shared: &AudioShared,
        offset: u16,
        count: u16,
    ) {
        let stream = shared.stream();
        if stream.state != StreamState::Streaming || count == 0 {
            return;
        }
        let end = u32::from(offset).saturating_add(u32::from(count));
        let whole_frames = count.checked_rem(stream.format.frame_bytes()) == Some(0);
        if !whole_frames || end > u32::from(self.usb_buf.len()) {
            shared.faults.record(FaultKind::MalformedFrame);
            return;
        }

        let capacity = u32::from(self.ring.len());
        let accepted = critical_section::with(|cs| {
            let cell = shared.intake.borrow(cs);
            let mut intake = cell.get();
            let transmitted = shared.output.borrow(cs).get().transmitted;
            let queued = intake.landed.wrapping_sub(transmitted);
            if intake.in_flight != 0 || queued.saturating_add(u32::from(count)) > capacity {
                return None;
            }
            intake.in_flight = count;
            cell.set(intake);
            Some(intake.landed)
        });
        let Some(landed) = accepted else {
            shared.faults.record(FaultKind::Overrun);
            return;
        };

        if self.program(dma, landed, offset, count).is_err() {
            critical_section::with(|cs| {
                let cell = shared.intake.borrow(cs);
                let mut intake = cell.get();
                intake.in_flight = 0;
                cell.set(intake);
            });
            shared.faults.record(FaultKind::MalformedFrame);
        }
    }

    fn program<D: DmaController + ?Sized>(
        &self,
        dma: &mut D,
        landed: u32,
        offset: u16,
        count: u16,
    ) -> Result<(), AudioError> {
        let (td0, td1) = match (self.bs.td(0), self.bs.td(1)) {
            (Some(a), Some(b)) => (a, b),
            _ => return Err(AudioError::InvalidConfig),
        };
        let ring = RingCursor::new(u32::from(self.ring.len()));
        let (head, tail) = ring.spans(landed, u32::from(count));
        let head_len = u16::try_from(head.len).map_err(|_| AudioError::InvalidConfig)?;
        let head_at = u16::try_from(head.offset).map_err(|_| AudioError::InvalidConfig)?;
        let tail_len = u16::try_from(tail.len).map_err(|_| AudioError::InvalidConfig)?;

        if tail_len == 0 {
            dma::configure(dma, td0, head_len, None, TdFlags::PERIPH_TO_MEM.with_termout(true))?;
        } else {
            dma::configure(dma, td0, head_len, Some(td1), TdFlags::PERIPH_TO_MEM)?;
            dma::configure(dma, td1, tail_len, None, TdFlags::PERIPH_TO_MEM.with_termout(true))?;
            dma.td_set_address(td1, self.bs_fifo_out, self.ring.addr(0));
        }
        dma.td_set_address(td0, self.bs_fifo_out, self.ring.addr(head_at));

        dma::configure(dma, self.usb_td, count, None, TdFlags::MEM_TO_PERIPH)?;
        dma.td_set_address(self.usb_td, self.usb_buf.addr(offset), self.bs_fifo_in);

        // Reorder side first so it is waiting on the swap FIFO.
        self.bs.start_at(dma, 0)?;
        dma::start(dma, self.usb_ch, self.usb_td);
        Ok(())
    }

    /// The reorder chain finished: publish the packet as the new shadow count.
    pub(crate) fn on_reordered(&self, shared: &AudioShared) {
        let missed = critical_section::with(|cs| {
            let cell = shared.intake.borrow(cs);
            let mut intake = cell.get();
            if intake.in_flight == 0 {
                return None;
            }
            let processed = shared.processed.borrow(cs).get();
            let missed = intake.landed != processed;
            intake.landed = intake.landed.wrapping_add(u32::from(intake.in_flight));
            intake.in_flight = 0;
            cell.set(intake);
            Some(missed)
        });
        if missed == Some(true) {
            shared.faults.record(FaultKind::DeadlineMissed);
        }
    }

    pub(crate) fn channel(&self) -> ChannelId {
        self.bs.channel()
    }
}
