//! Serial channel counters.

/// Running totals, all wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CommStats {
    /// Successful `send` / `send_raw` calls.
    pub frames_queued: u32,
    /// Bytes the UART transmitter has taken.
    pub bytes_sent: u32,
    /// Transmit descriptors completed.
    pub chunks_sent: u32,
    /// Bytes handed to the consumer by `rx_service`.
    pub bytes_received: u32,
    /// Frame boundaries published by the receive interrupt.
    pub boundaries: u32,
}
