//! Bounded byte FIFO used for every simulated peripheral port.

use std::collections::VecDeque;

#[derive(Debug)]
pub(crate) struct Fifo {
    bytes: VecDeque<u8>,
    depth: usize,
}

impl Fifo {
    pub(crate) fn new(depth: usize) -> Self {
        Self {
            bytes: VecDeque::with_capacity(depth),
            depth,
        }
    }

    /// Returns `false` without storing when full.
    pub(crate) fn push(&mut self, byte: u8) -> bool {
        if self.is_full() {
            return false;
        }
        self.bytes.push_back(byte);
        true
    }

    pub(crate) fn pop(&mut self) -> Option<u8> {
        self.bytes.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.bytes.len()
    }

    pub(crate) fn free(&self) -> usize {
        self.depth.saturating_sub(self.bytes.len())
    }

    pub(crate) fn is_full(&self) -> bool {
        self.bytes.len() >= self.depth
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.bytes.clear();
    }
}
