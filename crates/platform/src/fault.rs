//! Fault taxonomy and counters.
//!
//! Streaming and serial faults are never fatal. Each one is counted where
//! it is detected (often in interrupt context) and surfaced later by the
//! main loop. Counters only move by [`FaultCounters::record`] and
//! [`FaultCounters::clear`], both inside a critical section.

use core::cell::Cell;

use critical_section::Mutex;

/// Everything that can go wrong at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FaultKind {
    /// No free transfer descriptors at configuration time.
    ResourceExhausted,
    /// A send did not fit in the transmit ring or descriptor budget.
    BufferFull,
    /// A producer lapped its consumer, data was dropped.
    Overrun,
    /// Received data could not be delimited or sized as expected.
    MalformedFrame,
    /// A block landed before the previous one was processed.
    DeadlineMissed,
    /// The output drained below one transfer while running.
    Underrun,
}

impl FaultKind {
    /// Number of fault kinds.
    pub const COUNT: usize = 6;

    /// All kinds in reporting order.
    pub const ALL: [FaultKind; Self::COUNT] = [
        FaultKind::ResourceExhausted,
        FaultKind::BufferFull,
        FaultKind::Overrun,
        FaultKind::MalformedFrame,
        FaultKind::DeadlineMissed,
        FaultKind::Underrun,
    ];

    const fn slot(self) -> usize {
        match self {
            FaultKind::ResourceExhausted => 0,
            FaultKind::BufferFull => 1,
            FaultKind::Overrun => 2,
            FaultKind::MalformedFrame => 3,
            FaultKind::DeadlineMissed => 4,
            FaultKind::Underrun => 5,
        }
    }

    /// Short tag used in host-facing reports.
    pub const fn tag(self) -> &'static str {
        match self {
            FaultKind::ResourceExhausted => "res",
            FaultKind::BufferFull => "full",
            FaultKind::Overrun => "ovr",
            FaultKind::MalformedFrame => "mal",
            FaultKind::DeadlineMissed => "ddl",
            FaultKind::Underrun => "udr",
        }
    }
}

/// Point-in-time copy of every fault count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FaultSnapshot {
    counts: [u16; FaultKind::COUNT],
}

impl FaultSnapshot {
    /// Count for one kind.
    pub fn get(&self, kind: FaultKind) -> u16 {
        self.counts.get(kind.slot()).copied().unwrap_or(0)
    }

    /// Sum over all kinds, saturating.
    pub fn total(&self) -> u32 {
        self.counts.iter().fold(0u32, |acc, &c| acc.saturating_add(u32::from(c)))
    }

    /// Whether nothing has been recorded.
    pub fn is_clear(&self) -> bool {
        self.counts.iter().all(|&c| c == 0)
    }

    /// Element-wise saturating sum of two snapshots.
    #[must_use]
    pub fn merge(&self, other: &FaultSnapshot) -> FaultSnapshot {
        let mut out = *self;
        for (mine, theirs) in out.counts.iter_mut().zip(other.counts.iter()) {
            *mine = mine.saturating_add(*theirs);
        }
        out
    }

    fn bump(&mut self, kind: FaultKind) {
        if let Some(c) = self.counts.get_mut(kind.slot()) {
            *c = c.saturating_add(1);
        }
    }
}

/// Interrupt-safe fault counters, suitable for a `static`.
pub struct FaultCounters {
    inner: Mutex<Cell<FaultSnapshot>>,
}

impl FaultCounters {
    /// All counts zero.
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(Cell::new(FaultSnapshot {
                counts: [0; FaultKind::COUNT],
            })),
        }
    }

    /// Count one occurrence of `kind`.
    pub fn record(&self, kind: FaultKind) {
        critical_section::with(|cs| {
            let cell = self.inner.borrow(cs);
            let mut snap = cell.get();
            snap.bump(kind);
            cell.set(snap);
        });
        #[cfg(feature = "defmt")]
        defmt::warn!("fault: {}", kind.tag());
    }

    /// Copy of all counts.
    pub fn snapshot(&self) -> FaultSnapshot {
        critical_section::with(|cs| self.inner.borrow(cs).get())
    }

    /// Reset every count to zero.
    pub fn clear(&self) {
        critical_section::with(|cs| self.inner.borrow(cs).set(FaultSnapshot::default()));
    }
}

impl Default for FaultCounters {
    fn default() -> Self {
        Self::new()
    }
}
