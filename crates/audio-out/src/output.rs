//! Output stage.
//!
//! A cyclic chain of descriptors tiles the audio ring and feeds the I2S
//! transmitter forever once started. The main loop starts it when half the
//! ring holds processed audio; every completion retires one transfer. When
//! the next transfer is not fully processed the chain is stopped instead of
//! playing stale samples, and restarted at the same slot after a refill.

use platform::dma::{DescriptorChain, Direction};
use platform::config::AUDIO_OUT_N_TD;
use platform::{ChannelId, DmaController, FaultKind, Region};

use crate::{AudioError, AudioOutConfig, AudioShared, StreamState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct OutputState {
    /// Bytes the I2S chain has finished.
    pub(crate) transmitted: u32,
    /// Whether the chain is running.
    pub(crate) active: bool,
}

impl OutputState {
    pub(crate) const fn new() -> Self {
        Self {
            transmitted: 0,
            active: false,
        }
    }
}

#[derive(Clone)]
pub(crate) struct Output {
    chain: DescriptorChain<AUDIO_OUT_N_TD>,
    ring: Region,
    transfer_size: u16,
}

impl Output {
    pub(crate) fn create<D: DmaController + ?Sized>(
        dma: &mut D,
        config: &AudioOutConfig,
    ) -> Result<Self, AudioError> {
        let chain = DescriptorChain::allocate(dma, config.i2s_dma_ch, config.i2s_n_td)?;
        chain.configure_cyclic(
            dma,
            config.out_buf,
            config.i2s_transfer_size,
            config.i2s_fifo,
            Direction::FromMemory,
            true,
        )?;
        Ok(Self {
            chain,
            ring: config.out_buf,
            transfer_size: config.i2s_transfer_size,
        })
    }

    /// Start the chain if it is stopped and half the ring is processed.
    ///
    /// Returns whether the chain was started.
    pub(crate) fn arm_if_ready<D: DmaController + ?Sized>(
        &self,
        dma: &mut D,
        shared: &AudioShared,
    ) -> bool {
        let half = u32::from(self.ring.len()) / 2;
        critical_section::with(|cs| {
            if shared.stream.borrow(cs).get().state != StreamState::Streaming {
                return false;
            }
            let cell = shared.output.borrow(cs);
            let mut out = cell.get();
            let processed = shared.processed.borrow(cs).get();
            if out.active || processed.wrapping_sub(out.transmitted) < half {
                return false;
            }
            if self.chain.start_at(dma, self.slot_at(out.transmitted)).is_err() {
                return false;
            }
            out.active = true;
            cell.set(out);
            true
        })
    }

    /// One transfer completed.
    pub(crate) fn on_complete<D: DmaController + ?Sized>(&self, dma: &mut D, shared: &AudioShared) {
        let ts = u32::from(self.transfer_size);
        let starved = critical_section::with(|cs| {
            let cell = shared.output.borrow(cs);
            let mut out = cell.get();
            if !out.active {
                return false;
            }
            out.transmitted = out.transmitted.wrapping_add(ts);
            let processed = shared.processed.borrow(cs).get();
            let starved = processed.wrapping_sub(out.transmitted) < ts;
            if starved {
                self.chain.stop(dma);
                out.active = false;
            }
            cell.set(out);
            starved
        });
        if starved {
            shared.faults.record(FaultKind::Underrun);
        }
    }

    pub(crate) fn stop<D: DmaController + ?Sized>(&self, dma: &mut D) {
        self.chain.stop(dma);
    }

    pub(crate) fn channel(&self) -> ChannelId {
        self.chain.channel()
    }

    fn slot_at(&self, transmitted: u32) -> usize {
        let offset = transmitted.checked_rem(u32::from(self.ring.len())).unwrap_or(0);
        let slot = offset.checked_div(u32::from(self.transfer_size)).unwrap_or(0);
        usize::try_from(slot).unwrap_or(0)
    }
}
