//! Ring cursor arithmetic.
//!
//! Every ring buffer in the firmware is tracked by two free-running `u32`
//! byte counters: `write` advanced only by the producer, `read` advanced
//! only by the consumer. Offsets into storage are the counters modulo the
//! capacity, occupancy is their wrapping difference.
//!
//! ```text
//!            read % cap          write % cap
//!                │                    │
//!   [ . . . . . .█████████████████████. . . . ]
//!                 ◀──── occupancy ────▶
//! ```
//!
//! Because each counter has exactly one writer, the pair can be published
//! across interrupt boundaries without a lock held over the whole update:
//! the consumer reads a stale `write` at worst, which only under-reports
//! what is available.

/// Snapshot of one ring's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RingCursor {
    capacity: u32,
    write: u32,
    read: u32,
}

/// A contiguous run of ring storage, at most two per transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Span {
    /// Offset into storage.
    pub offset: u32,
    /// Length in bytes.
    pub len: u32,
}

impl RingCursor {
    /// Empty ring of `capacity` bytes.
    pub const fn new(capacity: u32) -> Self {
        Self {
            capacity,
            write: 0,
            read: 0,
        }
    }

    /// Rebuild a cursor from counters published by two contexts.
    pub const fn from_counters(capacity: u32, write: u32, read: u32) -> Self {
        Self { capacity, write, read }
    }

    /// Storage size in bytes.
    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Producer counter.
    pub const fn write(&self) -> u32 {
        self.write
    }

    /// Consumer counter.
    pub const fn read(&self) -> u32 {
        self.read
    }

    /// Bytes written and not yet consumed.
    pub const fn occupancy(&self) -> u32 {
        self.write.wrapping_sub(self.read)
    }

    /// Bytes the producer may still write, zero when overrun.
    pub const fn free(&self) -> u32 {
        self.capacity.saturating_sub(self.occupancy())
    }

    /// Whether the producer has lapped the consumer.
    pub const fn is_overrun(&self) -> bool {
        self.occupancy() > self.capacity
    }

    /// Storage offset the producer writes next.
    pub fn write_offset(&self) -> u32 {
        self.write.checked_rem(self.capacity).unwrap_or(0)
    }

    /// Storage offset the consumer reads next.
    pub fn read_offset(&self) -> u32 {
        self.read.checked_rem(self.capacity).unwrap_or(0)
    }

    /// Record `n` produced bytes.
    pub fn produce(&mut self, n: u32) {
        self.write = self.write.wrapping_add(n);
    }

    /// Record `n` consumed bytes, never passing the producer.
    pub fn consume(&mut self, n: u32) {
        self.read = self.read.wrapping_add(n.min(self.occupancy()));
    }

    /// Storage spans covering the next `len` bytes from counter `at`,
    /// split where the ring wraps.
    pub fn spans(&self, at: u32, len: u32) -> (Span, Span) {
        let offset = at.checked_rem(self.capacity).unwrap_or(0);
        let first = len.min(self.capacity.saturating_sub(offset));
        (
            Span { offset, len: first },
            Span {
                offset: 0,
                len: len.saturating_sub(first),
            },
        )
    }
}

/// Whether counter `a` is ahead of counter `b` under wrapping.
pub const fn is_ahead(a: u32, b: u32) -> bool {
    let d = a.wrapping_sub(b);
    d != 0 && d < (1 << 31)
}

/// Forward distance from `from` to `to`, zero when `to` is behind.
pub const fn distance(from: u32, to: u32) -> u32 {
    if is_ahead(to, from) {
        to.wrapping_sub(from)
    } else {
        0
    }
}
