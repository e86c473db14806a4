//! Property-based tests for ring cursor arithmetic.
//! The occupancy relation must hold for every interleaving of producer and
//! consumer steps, including runs that wrap the `u32` counters.

#![allow(clippy::arithmetic_side_effects)]

use platform::ring::{distance, is_ahead, RingCursor};
use proptest::prelude::*;

#[derive(Debug, Clone, Copy)]
enum Op {
    Produce(u32),
    Consume(u32),
}

fn op(capacity: u32) -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..=capacity).prop_map(Op::Produce),
        (0..=capacity).prop_map(Op::Consume),
    ]
}

proptest! {
    /// occupancy == (write - read) mod 2^32 and never exceeds capacity when
    /// the producer respects `free()`.
    #[test]
    fn occupancy_matches_counter_difference(
        capacity in 1u32..=4096,
        start in any::<u32>(),
        ops in prop::collection::vec(op(4096), 1..200),
    ) {
        let mut ring = RingCursor::from_counters(capacity, start, start);
        for op in ops {
            match op {
                Op::Produce(n) => ring.produce(n.min(ring.free())),
                Op::Consume(n) => ring.consume(n),
            }
            prop_assert_eq!(ring.occupancy(), ring.write().wrapping_sub(ring.read()));
            prop_assert!(ring.occupancy() <= capacity);
            prop_assert!(!ring.is_overrun());
            prop_assert_eq!(ring.free() + ring.occupancy(), capacity);
        }
    }

    /// Offsets always index inside storage.
    #[test]
    fn offsets_stay_in_bounds(
        capacity in 1u32..=4096,
        write in any::<u32>(),
        read in any::<u32>(),
    ) {
        let ring = RingCursor::from_counters(capacity, write, read);
        prop_assert!(ring.write_offset() < capacity);
        prop_assert!(ring.read_offset() < capacity);
    }

    /// Wrap spans cover exactly the requested bytes and stay inside storage.
    #[test]
    fn spans_cover_request(capacity in 1u32..=4096, at in any::<u32>(), len_frac in 0u32..=100) {
        let ring = RingCursor::new(capacity);
        let len = capacity * len_frac / 100;
        let (a, b) = ring.spans(at, len);
        prop_assert_eq!(a.len + b.len, len);
        prop_assert!(a.offset + a.len <= capacity);
        prop_assert!(b.len <= capacity);
        if b.len > 0 {
            prop_assert_eq!(a.offset + a.len, capacity);
        }
    }

    /// `distance` agrees with `is_ahead` across the wrap.
    #[test]
    fn distance_is_forward_only(from in any::<u32>(), step in 0u32..(1 << 30)) {
        let to = from.wrapping_add(step);
        prop_assert_eq!(distance(from, to), step);
        prop_assert_eq!(is_ahead(to, from), step != 0);
        prop_assert_eq!(distance(to, from), 0);
    }
}
