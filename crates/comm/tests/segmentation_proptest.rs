//! Property-based tests for transmit segmentation.
//! Whatever the payload sizes and ring position, the wire carries every
//! accepted payload intact and in order, and no descriptor exceeds the
//! transfer size or crosses the end of the ring.

#![allow(clippy::unwrap_used)]
#![allow(clippy::arithmetic_side_effects)]
#![allow(clippy::indexing_slicing)]
#![allow(clippy::panic)]

mod common;

use comm::CommShared;
use common::Rig;
use proptest::prelude::*;

/// Descriptors one send needs when the ring's write offset is `at`.
fn expected_chunks(mut at: u32, mut len: u32, cap: u32, ts: u32) -> u32 {
    let mut n = 0;
    while len > 0 {
        let run = len.min(cap - at % cap).min(ts);
        at += run;
        len -= run;
        n += 1;
    }
    n
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn wire_matches_queued_payloads(sizes in prop::collection::vec(0usize..700, 1..12)) {
        let shared = CommShared::new();
        let mut rig = Rig::new(&shared);
        let mut written = 0u32;
        let mut chunks = 0u32;

        for (i, &size) in sizes.iter().enumerate() {
            let payload: Vec<u8> = (0..size).map(|j| b'A' + ((i + j) % 26) as u8).collect();
            rig.comm.send(&mut rig.soc, &payload).unwrap();
            chunks += expected_chunks(written, size as u32 + 1, 1024, 255);
            written += size as u32 + 1;

            let wire = rig.drain_wire();
            prop_assert_eq!(wire.len(), size + 1);
            prop_assert_eq!(&wire[..size], payload.as_slice());
            prop_assert_eq!(wire[size], b'\n');
        }
        prop_assert_eq!(rig.comm.stats().chunks_sent, chunks);
        prop_assert_eq!(rig.comm.stats().bytes_sent, written);
    }

    #[test]
    fn smaller_transfer_size_still_delivers(size in 1usize..400, ts in 1u16..64) {
        let shared = CommShared::new();
        let mut rig = Rig::with_config(&shared, |c| c.tx_transfer_size = ts);
        let payload = vec![0x5Au8; size];
        let fits = expected_chunks(0, size as u32 + 1, 1024, u32::from(ts)) <= 8;
        let result = rig.comm.send(&mut rig.soc, &payload);
        prop_assert_eq!(result.is_ok(), fits);
        let wire = rig.drain_wire();
        if fits {
            prop_assert_eq!(wire.len(), size + 1);
        } else {
            prop_assert!(wire.is_empty());
        }
    }
}
