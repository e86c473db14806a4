//! Hardware design description.
//!
//! The schematic fixes which DMA channel serves which path and where each
//! peripheral FIFO lives. Boot code reads these assignments from a
//! [`Design`] instead of hard-coding them, so the same firmware runs on the
//! target and on the simulated SoC (see `sim::SimSoc::design`).
//!
//! ```text
//!   USB EP buf ─usb_dma─▶ BS in ═byte swap═ BS out ─bs_dma─▶ audio ring ─i2s_dma─▶ I2S
//!
//!   UART RX ─uart_rx─▶ spy in ═spy═ spy out ─spy_dma─▶ RX ring
//!   TX ring ─uart_tx─▶ UART TX
//! ```

use crate::dma::ChannelId;
use crate::memory::Region;

/// Channel, FIFO and buffer assignment of one hardware design.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Design {
    /// USB endpoint buffer into the byte-swap block.
    pub usb_dma_ch: ChannelId,
    /// Byte-swap block into the audio ring.
    pub bs_dma_ch: ChannelId,
    /// Audio ring into the I2S transmitter.
    pub i2s_dma_ch: ChannelId,
    /// Transmit ring into the UART.
    pub uart_tx_ch: ChannelId,
    /// UART receiver into the spy.
    pub uart_rx_ch: ChannelId,
    /// Spy into the receive ring.
    pub spy_ch: ChannelId,

    /// Byte-swap input FIFO.
    pub bs_fifo_in: u32,
    /// Byte-swap output FIFO.
    pub bs_fifo_out: u32,
    /// I2S transmit FIFO.
    pub i2s_fifo: u32,
    /// UART transmit FIFO.
    pub uart_tx_fifo: u32,
    /// UART receive FIFO.
    pub uart_rx_fifo: u32,
    /// Spy input FIFO.
    pub spy_fifo_in: u32,
    /// Spy output FIFO.
    pub spy_fifo_out: u32,

    /// USB isochronous OUT endpoint buffer.
    pub usb_buf: Region,
    /// Audio output ring.
    pub audio_buf: Region,
    /// Serial transmit ring.
    pub tx_buf: Region,
    /// Serial receive ring.
    pub rx_buf: Region,
}
