//! Receive spy.
//!
//! A small hardware block that sits between the UART RX FIFO and the RX
//! DMA channel. Every byte that passes through is compared against a
//! configured delimiter. The spy raises its interrupt when:
//!
//! - the delimiter passes while detection is armed (one-shot, re-armed by
//!   [`SpyPeripheral::resume`])
//! - the line has been idle long enough that bytes received since the last
//!   event should be released (flush)
//!
//! The interrupt handler reads and clears the cause with
//! [`SpyPeripheral::service`]. Alongside the cause bits the spy keeps a
//! free-running count of the bytes it has handed to the receive channel,
//! which is the receive ring's write counter.

/// Cause bits reported by the spy, cleared on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpyStatus(u8);

impl SpyStatus {
    /// No event.
    pub const NONE: Self = Self(0);
    /// The delimiter byte passed through.
    pub const DELIMITER: Self = Self(0x01);
    /// The line went idle with bytes outstanding.
    pub const FLUSH: Self = Self(0x02);

    /// Whether every bit of `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no cause bit is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Combine two statuses.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// Control and status of the receive spy.
pub trait SpyPeripheral {
    /// Arm detection of `delimiter`.
    ///
    /// `transfer_size` is the RX descriptor length, which the spy uses to
    /// bound how long it holds bytes before forcing a flush.
    fn start(&mut self, delimiter: u8, transfer_size: u16);

    /// Read and clear the pending cause bits.
    fn service(&mut self) -> SpyStatus;

    /// Re-arm delimiter detection after the consumer has drained.
    fn resume(&mut self);

    /// Bytes passed to the receive channel since [`SpyPeripheral::start`].
    ///
    /// Free-running, wraps at `u32::MAX`.
    fn delivered(&self) -> u32;
}
