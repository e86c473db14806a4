//! Delimiter framing on top of the byte stream.
//!
//! [`Comm::rx_service`](crate::Comm::rx_service) hands out raw bytes up to
//! the last boundary, which may end mid-frame after an idle flush.
//! [`FrameSplitter`] reassembles them into whole frames.
//!
//! Frame layout on the wire:
//! - payload bytes (any value except the delimiter)
//! - one delimiter byte, `b'\n'` by default

// ─────────────────────────────────────────────────────────────────────────────
// Public types
// ─────────────────────────────────────────────────────────────────────────────

/// Reassembles delimiter-terminated frames of at most `N` payload bytes.
pub struct FrameSplitter<const N: usize> {
    partial: heapless::Vec<u8, N>,
    delimiter: u8,
    discarding: bool,
}

impl<const N: usize> FrameSplitter<N> {
    /// Empty splitter for `delimiter`.
    pub const fn new(delimiter: u8) -> Self {
        Self {
            partial: heapless::Vec::new(),
            delimiter,
            discarding: false,
        }
    }

    /// Feed bytes, calling `on_frame` with each completed payload.
    ///
    /// Returns how many frames were dropped for exceeding `N` bytes. Those
    /// are skipped through their terminating delimiter.
    pub fn push(&mut self, bytes: &[u8], mut on_frame: impl FnMut(&[u8])) -> usize {
        let mut dropped = 0usize;
        for &b in bytes {
            if b == self.delimiter {
                if self.discarding {
                    self.discarding = false;
                } else if !self.partial.is_empty() {
                    on_frame(&self.partial);
                }
                self.partial.clear();
                continue;
            }
            if self.discarding {
                continue;
            }
            if self.partial.push(b).is_err() {
                self.partial.clear();
                self.discarding = true;
                dropped = dropped.saturating_add(1);
            }
        }
        dropped
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::FrameSplitter;

    fn collect<const N: usize>(s: &mut FrameSplitter<N>, bytes: &[u8]) -> (Vec<Vec<u8>>, usize) {
        let mut frames = Vec::new();
        let dropped = s.push(bytes, |f| frames.push(f.to_vec()));
        (frames, dropped)
    }

    #[test]
    fn test_single_frame() {
        let mut s: FrameSplitter<16> = FrameSplitter::new(b'\n');
        let (frames, dropped) = collect(&mut s, b"PING\n");
        assert_eq!(frames, vec![b"PING".to_vec()]);
        assert_eq!(dropped, 0);
    }

    #[test]
    fn test_frame_split_across_pushes() {
        let mut s: FrameSplitter<16> = FrameSplitter::new(b'\n');
        let (frames, _) = collect(&mut s, b"STA");
        assert!(frames.is_empty());
        let (frames, _) = collect(&mut s, b"TUS\nPI");
        assert_eq!(frames, vec![b"STATUS".to_vec()]);
        let (frames, _) = collect(&mut s, b"NG\n");
        assert_eq!(frames, vec![b"PING".to_vec()]);
    }

    #[test]
    fn test_empty_lines_are_skipped() {
        let mut s: FrameSplitter<16> = FrameSplitter::new(b'\n');
        let (frames, _) = collect(&mut s, b"\n\nA\n");
        assert_eq!(frames, vec![b"A".to_vec()]);
    }

    #[test]
    fn test_oversized_frame_is_dropped_up_to_next_delimiter() {
        let mut s: FrameSplitter<4> = FrameSplitter::new(b'\n');
        let (frames, dropped) = collect(&mut s, b"TOOLONG\nOK\n");
        assert_eq!(frames, vec![b"OK".to_vec()]);
        assert_eq!(dropped, 1);
    }

    #[test]
    fn test_custom_delimiter() {
        let mut s: FrameSplitter<8> = FrameSplitter::new(0);
        let (frames, _) = collect(&mut s, &[1, 2, 0, 3, 0]);
        assert_eq!(frames, vec![vec![1, 2], vec![3]]);
    }
}
